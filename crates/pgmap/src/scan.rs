//! Result scanning.
//!
//! A statement built for a model (plus any joined relations) returns rows whose columns
//! are laid out in fixed segments: optional lead columns (parent keys of a follow-up
//! statement), then the root model's columns, then one segment per joined relation in
//! depth-first order. The scanner splits every row at those offsets into a tree of
//! [`Node`]s. Typed structs are produced from nodes by [`Model::decode`].

use crate::error::{OrmError, OrmResult};
use crate::field::{Field, FieldKind};
use crate::model::Model;
use crate::row::Record;
use crate::schema::SchemaDescriptor;
use crate::value::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Relation data attached to a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// A single relation; `None` when no related row exists.
    One(Option<Box<Node>>),
    Many(Vec<Node>),
}

/// One model row with its loaded relations.
#[derive(Debug, Clone)]
pub struct Node {
    schema: Arc<SchemaDescriptor>,
    values: Vec<Value>,
    relations: BTreeMap<&'static str, Related>,
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.schema, &other.schema)
            && self.values == other.values
            && self.relations == other.relations
    }
}

impl Node {
    /// Build a node from column values in descriptor order.
    pub fn new(schema: Arc<SchemaDescriptor>, values: Vec<Value>) -> OrmResult<Self> {
        if values.len() != schema.columns().len() {
            return Err(OrmError::scan(
                schema.table(),
                "<row>",
                format!(
                    "expected {} columns, got {}",
                    schema.columns().len(),
                    values.len()
                ),
            ));
        }
        Ok(Self {
            schema,
            values,
            relations: BTreeMap::new(),
        })
    }

    /// Build a node from a record, matching columns by SQL name.
    pub fn from_record(schema: Arc<SchemaDescriptor>, record: &Record) -> OrmResult<Self> {
        let values = schema
            .columns()
            .iter()
            .map(|c| {
                record.get(&c.name).cloned().ok_or_else(|| {
                    OrmError::scan(schema.table(), &c.name, "column missing from result")
                })
            })
            .collect::<OrmResult<Vec<_>>>()?;
        Self::new(schema, values)
    }

    pub fn schema(&self) -> &Arc<SchemaDescriptor> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of a column field.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.schema.column_index(field).map(|i| &self.values[i])
    }

    /// Value of a column by SQL name.
    pub fn column_value(&self, column: &str) -> Option<&Value> {
        self.schema
            .column_index_by_name(column)
            .map(|i| &self.values[i])
    }

    /// Values of the named columns; `None` if any is missing or NULL.
    pub fn key(&self, columns: &[String]) -> Option<Vec<Value>> {
        columns
            .iter()
            .map(|c| self.column_value(c).filter(|v| !v.is_null()).cloned())
            .collect()
    }

    pub fn primary_key(&self) -> Vec<Value> {
        self.schema
            .primary_key_indices()
            .iter()
            .map(|&i| self.values[i].clone())
            .collect()
    }

    pub fn relation(&self, field: &str) -> Option<&Related> {
        self.relations.get(field)
    }

    pub fn relations(&self) -> impl Iterator<Item = (&'static str, &Related)> {
        self.relations.iter().map(|(k, v)| (*k, v))
    }

    pub fn set_relation(&mut self, field: &'static str, related: Related) {
        self.relations.insert(field, related);
    }

    pub(crate) fn relation_mut(&mut self, field: &str) -> Option<&mut Related> {
        self.relations.get_mut(field)
    }

    /// Read a field, dispatching on its kind: columns convert from the stored value,
    /// relation fields from what was loaded for them.
    pub fn get<T: Field>(&self, field: &str) -> OrmResult<T> {
        match T::kind() {
            FieldKind::Column { .. } => {
                let idx = self.schema.column_index(field).ok_or_else(|| {
                    OrmError::scan(self.schema.table(), field, "field is not a mapped column")
                })?;
                let column = &self.schema.columns()[idx];
                T::from_value(&self.values[idx])
                    .map_err(|m| OrmError::scan(self.schema.table(), &column.name, m))
            }
            FieldKind::One { .. } | FieldKind::Many { .. } => {
                T::from_related(self.relations.get(field)).map_err(|e| match e {
                    OrmError::Other(m) | OrmError::NotFound(m) => {
                        OrmError::scan(self.schema.table(), field, m)
                    }
                    other => other,
                })
            }
            FieldKind::Unsupported(reason) => {
                Err(OrmError::schema(self.schema.model(), reason.to_string()))
            }
        }
    }

    /// Overwrite a column field from this node; relation fields are left untouched.
    pub fn assign<T: Field>(&self, field: &str, slot: &mut T) -> OrmResult<()> {
        if T::kind().is_column() && self.schema.column_index(field).is_some() {
            *slot = self.get(field)?;
        }
        Ok(())
    }

    pub fn decode<M: Model>(&self) -> OrmResult<M> {
        M::decode(self)
    }
}

/// A column segment of a row.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Relation field the segment is attached under; `None` for the root.
    pub field: Option<&'static str>,
    /// Index of the parent segment.
    pub parent: Option<usize>,
    pub schema: Arc<SchemaDescriptor>,
    pub start: usize,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.schema.columns().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Column layout of a statement result.
#[derive(Debug, Clone)]
pub struct SelectLayout {
    /// Number of leading key columns before the root segment.
    pub lead: usize,
    /// Root first, then joined segments with parents before children.
    pub segments: Vec<Segment>,
}

impl SelectLayout {
    pub fn width(&self) -> usize {
        self.lead + self.segments.iter().map(Segment::len).sum::<usize>()
    }

    pub fn root(&self) -> &Arc<SchemaDescriptor> {
        &self.segments[0].schema
    }
}

/// A scanned root node with the lead values it was selected under.
#[derive(Debug, Clone)]
pub struct ScannedRow {
    pub lead: Vec<Value>,
    pub node: Node,
}

/// Split rows into node trees, dropping repeated roots.
pub fn scan_rows(records: &[Record], layout: &SelectLayout) -> OrmResult<Vec<ScannedRow>> {
    let width = layout.width();
    let mut seen: HashSet<(Vec<Value>, Vec<Value>)> = HashSet::new();
    let mut out = Vec::with_capacity(records.len());

    for record in records {
        if record.len() != width {
            return Err(OrmError::scan(
                layout.root().table(),
                "<row>",
                format!("expected {width} columns, got {}", record.len()),
            ));
        }
        let values = record.values();
        let lead = values[..layout.lead].to_vec();

        let mut nodes: Vec<Option<Node>> = Vec::with_capacity(layout.segments.len());
        for segment in &layout.segments {
            let slice = &values[segment.start..segment.start + segment.len()];
            let absent = segment.parent.is_some()
                && segment
                    .schema
                    .primary_key_indices()
                    .iter()
                    .all(|&i| slice[i].is_null());
            if absent {
                nodes.push(None);
            } else {
                nodes.push(Some(Node::new(segment.schema.clone(), slice.to_vec())?));
            }
        }

        // Attach children bottom-up so each subtree is complete before it moves.
        for idx in (1..layout.segments.len()).rev() {
            let segment = &layout.segments[idx];
            let (Some(parent), Some(field)) = (segment.parent, segment.field) else {
                continue;
            };
            let child = nodes[idx].take();
            if let Some(parent_node) = nodes[parent].as_mut() {
                parent_node.set_relation(field, Related::One(child.map(Box::new)));
            }
        }

        let Some(node) = nodes.into_iter().next().flatten() else {
            return Err(OrmError::scan(layout.root().table(), "<row>", "empty layout"));
        };
        if seen.insert((lead.clone(), node.primary_key())) {
            out.push(ScannedRow { lead, node });
        }
    }
    Ok(out)
}

/// Decode typed values from nodes; any failure discards the whole batch.
pub fn decode_all<M: Model>(nodes: &[Node]) -> OrmResult<Vec<M>> {
    nodes.iter().map(M::decode).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::*;
    use crate::schema::describe;

    fn story_author_layout() -> SelectLayout {
        let story = describe::<Story>().unwrap();
        let user = describe::<User>().unwrap();
        let story_width = story.columns().len();
        SelectLayout {
            lead: 0,
            segments: vec![
                Segment {
                    field: None,
                    parent: None,
                    schema: story,
                    start: 0,
                },
                Segment {
                    field: Some("author"),
                    parent: Some(0),
                    schema: user,
                    start: story_width,
                },
            ],
        }
    }

    fn story_row(id: i64, author: Option<(i64, &str)>) -> Record {
        let (aid, aname, emails) = match author {
            Some((aid, name)) => (
                Value::Int(aid),
                Value::from(name),
                Value::from(vec!["a@x"]),
            ),
            None => (Value::Null, Value::Null, Value::Null),
        };
        Record::from_pairs([
            ("id", Value::Int(id)),
            ("title", Value::from("t")),
            ("author_id", Value::Int(1)),
            ("author__id", aid),
            ("author__name", aname),
            ("author__emails", emails),
        ])
    }

    #[test]
    fn splits_joined_rows_into_segments() {
        let layout = story_author_layout();
        let rows = scan_rows(&[story_row(1, Some((1, "admin")))], &layout).unwrap();
        assert_eq!(rows.len(), 1);
        let story: Story = rows[0].node.decode().unwrap();
        let author = story.author.unwrap();
        assert_eq!(author.name, "admin");
        assert_eq!(author.emails, ["a@x"]);
        // Relations not loaded stay at their zero value.
        assert!(story.comments.is_empty());
    }

    #[test]
    fn all_null_segment_is_absent() {
        let layout = story_author_layout();
        let rows = scan_rows(&[story_row(1, None)], &layout).unwrap();
        assert_eq!(
            rows[0].node.relation("author"),
            Some(&Related::One(None))
        );
        let story: Story = rows[0].node.decode().unwrap();
        assert!(story.author.is_none());
    }

    #[test]
    fn column_count_mismatch_is_scan_error() {
        let layout = story_author_layout();
        let short = Record::from_pairs([("id", Value::Int(1))]);
        let err = scan_rows(&[short], &layout).unwrap_err();
        assert!(err.is_scan());
        assert!(err.to_string().contains("stories"));
    }

    #[test]
    fn repeated_roots_are_dropped() {
        let layout = story_author_layout();
        let row = story_row(1, Some((1, "admin")));
        let rows = scan_rows(&[row.clone(), row, story_row(2, None)], &layout).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.node.primary_key()).collect();
        assert_eq!(ids, [vec![Value::Int(1)], vec![Value::Int(2)]]);
    }

    #[test]
    fn decode_failure_discards_everything() {
        let user = describe::<User>().unwrap();
        let good = Node::new(
            user.clone(),
            vec![Value::Int(1), Value::from("a"), Value::from(Vec::<String>::new())],
        )
        .unwrap();
        let bad = Node::new(
            user,
            vec![Value::Int(2), Value::Int(5), Value::from(Vec::<String>::new())],
        )
        .unwrap();
        let err = decode_all::<User>(&[good, bad]).unwrap_err();
        assert!(err.is_scan());
        assert!(err.to_string().contains("users.name"), "{err}");
    }

    #[test]
    fn null_column_stays_distinct_from_zero() {
        let person = describe::<Profile>().unwrap();
        let node = Node::new(
            person,
            vec![Value::Int(1), Value::Int(3), Value::Null],
        )
        .unwrap();
        let profile: Profile = node.decode().unwrap();
        assert_eq!(profile.bio, None);
    }
}
