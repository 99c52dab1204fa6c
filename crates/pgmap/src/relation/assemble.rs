use super::planner::{RelationPlan, Strategy};
use crate::scan::{Node, Related, ScannedRow};
use crate::schema::RelationKind;
use crate::value::Value;
use std::collections::{HashMap, HashSet};

/// A follow-up plan together with the joined path leading to its parents.
#[derive(Debug, Clone, Copy)]
pub struct Pending<'a> {
    pub path: &'a [&'static str],
    pub plan: &'a RelationPlan,
}

/// Follow-up plans whose parents are the given level's nodes or nodes joined below them.
pub fn pending(plans: &[RelationPlan]) -> Vec<(Vec<&'static str>, &RelationPlan)> {
    fn walk<'a>(
        plans: &'a [RelationPlan],
        path: &mut Vec<&'static str>,
        out: &mut Vec<(Vec<&'static str>, &'a RelationPlan)>,
    ) {
        for plan in plans {
            match plan.strategy {
                Strategy::FollowUp => out.push((path.clone(), plan)),
                Strategy::Join => {
                    path.push(plan.field());
                    walk(&plan.children, path, out);
                    path.pop();
                }
            }
        }
    }

    let mut out = Vec::new();
    walk(plans, &mut Vec::new(), &mut out);
    out
}

fn visit<'n>(nodes: &'n [Node], path: &[&str], f: &mut impl FnMut(&'n Node)) {
    let Some((first, rest)) = path.split_first() else {
        nodes.iter().for_each(f);
        return;
    };
    for node in nodes {
        if let Some(Related::One(Some(child))) = node.relation(first) {
            visit(std::slice::from_ref(child.as_ref()), rest, f);
        }
    }
}

fn visit_mut(nodes: &mut [Node], path: &[&str], f: &mut impl FnMut(&mut Node)) {
    let Some((first, rest)) = path.split_first() else {
        nodes.iter_mut().for_each(f);
        return;
    };
    for node in nodes {
        if let Some(Related::One(Some(child))) = node.relation_mut(first) {
            visit_mut(std::slice::from_mut(child.as_mut()), rest, f);
        }
    }
}

/// Distinct non-NULL parent keys for `pending`, in first-seen order.
pub fn parent_keys(nodes: &[Node], pending: Pending<'_>) -> Vec<Vec<Value>> {
    let columns = &pending.plan.relation.local_columns;
    let mut seen = HashSet::new();
    let mut keys = Vec::new();
    visit(nodes, pending.path, &mut |node| {
        if let Some(key) = node.key(columns) {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
    });
    keys
}

/// Distribute follow-up rows over their parents.
///
/// Rows are matched by key equality; a parent without matches (or with a NULL key) gets
/// an empty collection.
pub fn attach(nodes: &mut [Node], pending: Pending<'_>, rows: Vec<ScannedRow>) {
    let relation = &pending.plan.relation;
    let mut groups: HashMap<Vec<Value>, Vec<Node>> = HashMap::new();
    for row in rows {
        let key = match relation.kind {
            RelationKind::ManyToMany => Some(row.lead),
            _ => row.node.key(&relation.foreign_columns),
        };
        if let Some(key) = key {
            groups.entry(key).or_default().push(row.node);
        }
    }

    let field = relation.field;
    visit_mut(nodes, pending.path, &mut |node| {
        let children = node
            .key(&relation.local_columns)
            .and_then(|key| groups.get(&key).cloned())
            .unwrap_or_default();
        node.set_relation(field, Related::Many(children));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::relation::plan;
    use crate::schema::describe;

    fn story(id: i64) -> Node {
        Node::new(
            describe::<Story>().unwrap(),
            vec![Value::Int(id), Value::from("t"), Value::Int(1)],
        )
        .unwrap()
    }

    fn comment(id: i64, story_id: i64) -> ScannedRow {
        ScannedRow {
            lead: Vec::new(),
            node: Node::new(
                describe::<Comment>().unwrap(),
                vec![
                    Value::Int(id),
                    Value::Int(story_id),
                    Value::Null,
                    Value::from("c"),
                ],
            )
            .unwrap(),
        }
    }

    #[test]
    fn pending_crosses_joins_only() {
        let root = describe::<Comment>().unwrap();
        let plans = plan(&root, &["story.comments".into(), "author".into()]).unwrap();
        let pending = pending(&plans);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, ["story"]);
        assert_eq!(pending[0].1.path, "story.comments");
    }

    #[test]
    fn children_are_grouped_by_parent_key() {
        let root = describe::<Story>().unwrap();
        let plans = plan(&root, &["comments".into()]).unwrap();
        let pending = Pending {
            path: &[],
            plan: &plans[0],
        };

        let mut stories = vec![story(1), story(2), story(1)];
        assert_eq!(
            parent_keys(&stories, pending),
            [vec![Value::Int(1)], vec![Value::Int(2)]]
        );

        attach(&mut stories, pending, vec![comment(10, 1), comment(11, 1)]);
        let first: Story = stories[0].decode().unwrap();
        assert_eq!(first.comments.len(), 2);
        let second: Story = stories[1].decode().unwrap();
        assert!(second.comments.is_empty());
        assert_eq!(stories[1].relation("comments"), Some(&Related::Many(vec![])));
    }
}
