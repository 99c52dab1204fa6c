use crate::error::{OrmError, OrmResult};
use crate::schema::{RelationDescriptor, RelationKind, SchemaDescriptor};
use std::sync::Arc;

/// How a relation is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Folded into the parent statement as a `LEFT JOIN`.
    Join,
    /// Fetched by one extra statement keyed by all parent keys of its level.
    FollowUp,
}

impl Strategy {
    pub fn for_kind(kind: RelationKind) -> Self {
        if kind.is_single() {
            Strategy::Join
        } else {
            Strategy::FollowUp
        }
    }
}

/// A requested relation together with its nested requests.
#[derive(Debug, Clone)]
pub struct RelationPlan {
    /// Dotted path from the query root, e.g. `comments.author`.
    pub path: String,
    /// Model owning the relation field.
    pub owner: &'static str,
    pub relation: RelationDescriptor,
    /// Descriptor of the related model.
    pub schema: Arc<SchemaDescriptor>,
    pub strategy: Strategy,
    pub children: Vec<RelationPlan>,
}

impl RelationPlan {
    pub fn field(&self) -> &'static str {
        self.relation.field
    }

    pub fn is_join(&self) -> bool {
        self.strategy == Strategy::Join
    }

    /// Depth of the deepest follow-up chain below and including this plan.
    pub fn follow_up_depth(&self) -> usize {
        let own = usize::from(self.strategy == Strategy::FollowUp);
        own + self
            .children
            .iter()
            .map(RelationPlan::follow_up_depth)
            .max()
            .unwrap_or(0)
    }
}

/// Resolve requested relation names against `root`.
///
/// Names are dotted paths (`"Comments.Author"`) resolved one segment at a time; each
/// segment accepts the field name or its type-style spelling. Shared prefixes are merged,
/// and plans keep the order in which they were first requested.
pub fn plan(root: &Arc<SchemaDescriptor>, requested: &[String]) -> OrmResult<Vec<RelationPlan>> {
    let mut plans: Vec<RelationPlan> = Vec::new();
    for name in requested {
        insert_path(root, &mut plans, name)?;
    }
    Ok(plans)
}

fn insert_path(root: &Arc<SchemaDescriptor>, plans: &mut Vec<RelationPlan>, name: &str) -> OrmResult<()> {
    let mut schema = root.clone();
    let mut level = plans;
    let mut path = String::new();

    for segment in name.split('.') {
        if segment.trim().is_empty() {
            return Err(OrmError::relation(
                root.model(),
                name,
                "empty segment in relation path",
            ));
        }
        let relation = schema
            .relation(segment.trim())
            .ok_or_else(|| {
                OrmError::relation(
                    schema.model(),
                    segment,
                    format!("no relation `{segment}` on table `{}`", schema.table()),
                )
            })?
            .clone();

        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(relation.field);

        let current = level;
        let idx = match current.iter().position(|p| p.field() == relation.field) {
            Some(idx) => idx,
            None => {
                current.push(new_plan(&schema, relation, path.clone())?);
                current.len() - 1
            }
        };
        schema = current[idx].schema.clone();
        level = &mut current[idx].children;
    }
    Ok(())
}

fn new_plan(
    owner: &SchemaDescriptor,
    relation: RelationDescriptor,
    path: String,
) -> OrmResult<RelationPlan> {
    let target = relation.target()?;

    if relation.kind == RelationKind::ManyToMany {
        let resolved = relation.join_table.as_ref().is_some_and(|jt| {
            !jt.table.is_empty()
                && jt.parent_columns.len() == relation.local_columns.len()
                && jt.target_columns.len() == relation.foreign_columns.len()
        });
        if !resolved {
            return Err(OrmError::relation(
                owner.model(),
                relation.field,
                "join table cannot be resolved",
            ));
        }
    }

    tracing::trace!(
        target: "pgmap.sql",
        model = owner.model(),
        relation = relation.field,
        kind = %relation.kind,
        "planned relation {path}"
    );
    Ok(RelationPlan {
        path,
        owner: owner.model(),
        strategy: Strategy::for_kind(relation.kind),
        relation,
        schema: target,
        children: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, FieldKind};
    use crate::fixtures::*;
    use crate::model::{FieldShape, ModelRef, ModelShape};
    use crate::schema::describe;

    fn names(plans: &[RelationPlan]) -> Vec<&str> {
        plans.iter().map(|p| p.path.as_str()).collect()
    }

    #[test]
    fn strategies_follow_relation_kind() {
        let story = describe::<Story>().unwrap();
        let plans = plan(
            &story,
            &["Author".into(), "comments".into(), "tags".into()],
        )
        .unwrap();
        assert_eq!(names(&plans), ["author", "comments", "tags"]);
        assert_eq!(plans[0].strategy, Strategy::Join);
        assert_eq!(plans[1].strategy, Strategy::FollowUp);
        assert_eq!(plans[2].strategy, Strategy::FollowUp);
        assert_eq!(plans[2].schema.table(), "tags");
    }

    #[test]
    fn dotted_paths_merge_into_one_tree() {
        let story = describe::<Story>().unwrap();
        let plans = plan(
            &story,
            &[
                "Comments.Author".into(),
                "comments".into(),
                "comments.story.author".into(),
            ],
        )
        .unwrap();
        assert_eq!(plans.len(), 1);
        let comments = &plans[0];
        assert_eq!(names(&comments.children), ["comments.author", "comments.story"]);
        assert_eq!(
            names(&comments.children[1].children),
            ["comments.story.author"]
        );
        assert_eq!(comments.follow_up_depth(), 1);
    }

    struct Broken;
    crate::shape_only_model!(
        Broken,
        ModelShape::new("Broken")
            .field(FieldShape::new("id", i64::kind()))
            .field(FieldShape::new("user_id", i64::kind()))
            .field(FieldShape::new("user", User::kind()))
    );

    impl Field for Broken {
        fn kind() -> FieldKind {
            FieldKind::One {
                target: ModelRef::of::<Self>(),
                optional: false,
            }
        }
    }

    struct Holder;
    crate::shape_only_model!(
        Holder,
        ModelShape::new("Holder")
            .field(FieldShape::new("id", i64::kind()))
            .field(FieldShape::new("broken_id", i64::kind()))
            .field(FieldShape::new("broken", Option::<Broken>::kind()))
    );

    #[test]
    fn target_schema_errors_keep_their_class() {
        let holder = describe::<Holder>().unwrap();
        let err = plan(&holder, &["broken".into()]).unwrap_err();
        assert!(err.is_schema(), "{err}");
        assert!(err.to_string().contains("Broken"), "{err}");
    }

    #[test]
    fn unknown_relation_is_relation_error() {
        let story = describe::<Story>().unwrap();
        let err = plan(&story, &["Editor".into()]).unwrap_err();
        assert!(err.is_relation());
        assert!(err.to_string().contains("Editor"), "{err}");

        let err = plan(&story, &["comments.likes".into()]).unwrap_err();
        assert!(err.is_relation());
        assert!(err.to_string().contains("comments"), "{err}");

        assert!(plan(&story, &["comments..author".into()]).unwrap_err().is_relation());
    }
}
