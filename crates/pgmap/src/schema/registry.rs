//! Process-wide descriptor registry.
//!
//! Descriptors are built on first use and published once; later callers get the same
//! `Arc`. Building happens outside the lock, so two threads racing on a new model may
//! both build it, and the first to publish wins.

use super::naming;
use super::{
    ColumnDescriptor, JoinTableDescriptor, RelationDescriptor, RelationKind, SchemaDescriptor,
};
use crate::error::{OrmError, OrmResult};
use crate::field::{ColumnType, FieldKind};
use crate::model::{FieldShape, JoinTableRegistration, Model, ModelRef, ModelShape, RelationHint};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

type Registry = RwLock<HashMap<TypeId, Arc<SchemaDescriptor>>>;

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Describe a model, building and caching its descriptor on first use.
///
/// Shape problems (no primary key, duplicate column names, relations whose keys do not
/// exist) surface here as [`OrmError::Schema`].
pub fn describe<M: Model>() -> OrmResult<Arc<SchemaDescriptor>> {
    describe_ref(ModelRef::of::<M>())
}

/// Type-erased [`describe`].
pub fn describe_ref(model: ModelRef) -> OrmResult<Arc<SchemaDescriptor>> {
    let id = model.type_id();
    if let Some(found) = registry()
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
    {
        return Ok(found.clone());
    }

    let built = Arc::new(build(model)?);
    let mut map = registry().write().unwrap_or_else(PoisonError::into_inner);
    Ok(map.entry(id).or_insert(built).clone())
}

/// Column layout of a shape, computed without looking at relation targets.
struct Layout {
    type_name: &'static str,
    table: String,
    alias: String,
    columns: Vec<ColumnDescriptor>,
    primary_key: Vec<usize>,
}

impl Layout {
    fn from_shape(shape: &ModelShape) -> Result<Self, String> {
        let mut columns: Vec<ColumnDescriptor> = Vec::new();
        let mut seen: HashMap<String, &'static str> = HashMap::new();

        for field in &shape.fields {
            match &field.kind {
                FieldKind::Unsupported(reason) => {
                    return Err(format!("field `{}`: {reason}", field.name));
                }
                FieldKind::Column { ty, nullable } => {
                    let name = field
                        .column
                        .map(str::to_string)
                        .unwrap_or_else(|| naming::column_name(field.name));
                    if let Some(other) = seen.insert(name.clone(), field.name) {
                        return Err(format!(
                            "fields `{other}` and `{}` both map to column `{name}`",
                            field.name
                        ));
                    }
                    columns.push(ColumnDescriptor {
                        field: field.name,
                        name,
                        ty: ty.clone(),
                        nullable: *nullable,
                        primary_key: false,
                        generated: false,
                    });
                }
                FieldKind::One { .. } | FieldKind::Many { .. } => {
                    if field.pk {
                        return Err(format!(
                            "relation field `{}` cannot be a primary key",
                            field.name
                        ));
                    }
                }
            }
        }

        let mut primary_key: Vec<usize> = shape
            .fields
            .iter()
            .filter(|f| f.pk)
            .filter_map(|f| columns.iter().position(|c| c.field == f.name))
            .collect();
        if primary_key.is_empty() {
            if let Some(idx) = columns.iter().position(|c| c.field == "id") {
                primary_key.push(idx);
            }
        }
        if primary_key.is_empty() {
            return Err("no primary key; mark a field with #[orm(pk)] or name it `id`".into());
        }
        for &idx in &primary_key {
            let col = &mut columns[idx];
            if col.nullable {
                return Err(format!("primary key `{}` cannot be nullable", col.field));
            }
            col.primary_key = true;
        }
        if let [idx] = primary_key[..] {
            columns[idx].generated = columns[idx].ty.is_integer();
        }

        Ok(Self {
            type_name: shape.type_name,
            table: shape
                .table
                .map(str::to_string)
                .unwrap_or_else(|| naming::table_name(shape.type_name)),
            alias: shape
                .alias
                .map(str::to_string)
                .unwrap_or_else(|| naming::alias_name(shape.type_name)),
            columns,
            primary_key,
        })
    }

    fn has_columns(&self, names: &[String]) -> bool {
        names
            .iter()
            .all(|n| self.columns.iter().any(|c| &c.name == n))
    }

    fn pk_names(&self) -> Vec<String> {
        self.primary_key
            .iter()
            .map(|&i| self.columns[i].name.clone())
            .collect()
    }

    fn column_types(&self, names: &[String]) -> Vec<ColumnType> {
        names
            .iter()
            .filter_map(|n| self.columns.iter().find(|c| &c.name == n))
            .map(|c| c.ty.clone())
            .collect()
    }
}

fn build(model: ModelRef) -> OrmResult<SchemaDescriptor> {
    let shape = model.shape();
    let layout =
        Layout::from_shape(&shape).map_err(|m| OrmError::schema(shape.type_name, m))?;

    let mut relations = Vec::new();
    for field in &shape.fields {
        let relation = match &field.kind {
            FieldKind::One { target, optional } => {
                if !optional {
                    return Err(OrmError::schema(
                        shape.type_name,
                        format!(
                            "relation field `{}` must be an Option<_> so an absent row has a value",
                            field.name
                        ),
                    ));
                }
                single(&layout, field, *target)?
            }
            FieldKind::Many { target, .. } => collection(model, &layout, field, *target)?,
            _ => continue,
        };
        tracing::trace!(
            target: "pgmap.schema",
            model = shape.type_name,
            relation = relation.field,
            kind = %relation.kind,
            "inferred relation"
        );
        relations.push(relation);
    }

    tracing::debug!(
        target: "pgmap.schema",
        model = shape.type_name,
        table = %layout.table,
        columns = layout.columns.len(),
        relations = relations.len(),
        "described model"
    );

    Ok(SchemaDescriptor {
        model: layout.type_name,
        model_ref: model,
        table: layout.table,
        alias: layout.alias,
        columns: layout.columns,
        primary_key: layout.primary_key,
        relations,
    })
}

fn split_columns(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn target_layout(this: &Layout, field: &FieldShape, target: ModelRef) -> OrmResult<Layout> {
    let shape = target.shape();
    Layout::from_shape(&shape).map_err(|m| {
        OrmError::schema(
            this.type_name,
            format!(
                "relation `{}`: target {} is invalid: {m}",
                field.name, shape.type_name
            ),
        )
    })
}

fn key_error(this: &Layout, field: &FieldShape, message: String) -> OrmError {
    OrmError::schema(this.type_name, format!("relation `{}`: {message}", field.name))
}

/// Check that a key pairs up with the primary key it references.
fn check_key_pairing(
    this: &Layout,
    field: &FieldShape,
    key_side: (&Layout, &[String]),
    pk_side: &Layout,
) -> OrmResult<()> {
    let (key_layout, key) = key_side;
    let pk = pk_side.pk_names();
    if key.len() != pk.len() {
        return Err(key_error(
            this,
            field,
            format!(
                "key ({}) has {} columns but {} primary key has {}",
                key.join(", "),
                key.len(),
                pk_side.table,
                pk.len()
            ),
        ));
    }
    let key_types = key_layout.column_types(key);
    let pk_types = pk_side.column_types(&pk);
    for (k, p) in key_types.iter().zip(&pk_types) {
        let compatible = k == p || (k.is_integer() && p.is_integer());
        if !compatible {
            return Err(key_error(
                this,
                field,
                format!("key type {k} does not match primary key type {p}"),
            ));
        }
    }
    Ok(())
}

fn belongs_to(
    this: &Layout,
    target_layout: &Layout,
    field: &FieldShape,
    target: ModelRef,
    local: Vec<String>,
) -> OrmResult<RelationDescriptor> {
    if !this.has_columns(&local) {
        return Err(key_error(
            this,
            field,
            format!(
                "belongs-to key ({}) does not exist on {}",
                local.join(", "),
                this.table
            ),
        ));
    }
    check_key_pairing(this, field, (this, &local), target_layout)?;
    Ok(RelationDescriptor {
        field: field.name,
        kind: RelationKind::BelongsTo,
        local_columns: local,
        foreign_columns: target_layout.pk_names(),
        join_table: None,
        target,
    })
}

fn has(
    kind: RelationKind,
    this: &Layout,
    target_layout: &Layout,
    field: &FieldShape,
    target: ModelRef,
    foreign: Vec<String>,
) -> OrmResult<RelationDescriptor> {
    if !target_layout.has_columns(&foreign) {
        return Err(key_error(
            this,
            field,
            format!(
                "{kind} key ({}) does not exist on {}",
                foreign.join(", "),
                target_layout.table
            ),
        ));
    }
    check_key_pairing(this, field, (target_layout, &foreign), this)?;
    Ok(RelationDescriptor {
        field: field.name,
        kind,
        local_columns: this.pk_names(),
        foreign_columns: foreign,
        join_table: None,
        target,
    })
}

fn single(
    this: &Layout,
    field: &FieldShape,
    target: ModelRef,
) -> OrmResult<RelationDescriptor> {
    let target_layout = target_layout(this, field, target)?;
    let override_key = field.fk.map(split_columns);
    let local_default = vec![naming::foreign_key(field.name)];
    let foreign_default = vec![naming::foreign_key(this.type_name)];

    match &field.relation {
        Some(RelationHint::BelongsTo) => belongs_to(
            this,
            &target_layout,
            field,
            target,
            override_key.unwrap_or(local_default),
        ),
        Some(RelationHint::HasOne) => has(
            RelationKind::HasOne,
            this,
            &target_layout,
            field,
            target,
            override_key.unwrap_or(foreign_default),
        ),
        Some(hint) => Err(key_error(
            this,
            field,
            format!("{hint:?} requires a collection field"),
        )),
        None => {
            if let Some(key) = override_key {
                if this.has_columns(&key) {
                    belongs_to(this, &target_layout, field, target, key)
                } else if target_layout.has_columns(&key) {
                    has(RelationKind::HasOne, this, &target_layout, field, target, key)
                } else {
                    Err(key_error(
                        this,
                        field,
                        format!(
                            "fk ({}) exists on neither {} nor {}",
                            key.join(", "),
                            this.table,
                            target_layout.table
                        ),
                    ))
                }
            } else if this.has_columns(&local_default) {
                belongs_to(this, &target_layout, field, target, local_default)
            } else if target_layout.has_columns(&foreign_default) {
                has(
                    RelationKind::HasOne,
                    this,
                    &target_layout,
                    field,
                    target,
                    foreign_default,
                )
            } else {
                Err(key_error(
                    this,
                    field,
                    format!(
                        "cannot infer relation kind: neither {}.{} nor {}.{} exists",
                        this.table, local_default[0], target_layout.table, foreign_default[0]
                    ),
                ))
            }
        }
    }
}

fn registered_join_table(
    model: ModelRef,
    target: ModelRef,
) -> Option<(&'static str, &'static str, &'static str)> {
    let this_id = model.type_id();
    let target_id = target.type_id();
    inventory::iter::<JoinTableRegistration>
        .into_iter()
        .find_map(|reg| {
            let (left, right) = ((reg.left)(), (reg.right)());
            if left == this_id && right == target_id {
                Some((reg.table, reg.left_column, reg.right_column))
            } else if left == target_id && right == this_id {
                Some((reg.table, reg.right_column, reg.left_column))
            } else {
                None
            }
        })
}

fn many_to_many(
    this: &Layout,
    target_layout: &Layout,
    field: &FieldShape,
    target: ModelRef,
    table: &str,
    parent: Option<&str>,
    other: Option<&str>,
) -> OrmResult<RelationDescriptor> {
    let conventional = |layout: &Layout| -> OrmResult<Vec<String>> {
        if layout.primary_key.len() == 1 {
            Ok(vec![naming::foreign_key(layout.type_name)])
        } else {
            Err(key_error(
                this,
                field,
                format!(
                    "{} has a composite primary key; set join_fk/join_target_fk",
                    layout.table
                ),
            ))
        }
    };
    let parent_columns = match parent {
        Some(list) => split_columns(list),
        None => conventional(this)?,
    };
    let target_columns = match other {
        Some(list) => split_columns(list),
        None => conventional(target_layout)?,
    };
    if parent_columns.len() != this.primary_key.len()
        || target_columns.len() != target_layout.primary_key.len()
    {
        return Err(key_error(
            this,
            field,
            format!("join table {table} columns do not match the primary keys they reference"),
        ));
    }
    if parent_columns.iter().any(|c| target_columns.contains(c)) {
        return Err(key_error(
            this,
            field,
            format!("join table {table} uses the same column for both sides; set join_fk/join_target_fk"),
        ));
    }
    Ok(RelationDescriptor {
        field: field.name,
        kind: RelationKind::ManyToMany,
        local_columns: this.pk_names(),
        foreign_columns: target_layout.pk_names(),
        join_table: Some(JoinTableDescriptor {
            table: table.to_string(),
            parent_columns,
            target_columns,
        }),
        target,
    })
}

fn collection(
    model: ModelRef,
    this: &Layout,
    field: &FieldShape,
    target: ModelRef,
) -> OrmResult<RelationDescriptor> {
    let target_layout = target_layout(this, field, target)?;
    let foreign = field
        .fk
        .map(split_columns)
        .unwrap_or_else(|| vec![naming::foreign_key(this.type_name)]);

    match &field.relation {
        Some(RelationHint::ManyToMany { join_table }) => many_to_many(
            this,
            &target_layout,
            field,
            target,
            join_table,
            field.join_fk,
            field.join_target_fk,
        ),
        Some(RelationHint::HasMany) => has(
            RelationKind::HasMany,
            this,
            &target_layout,
            field,
            target,
            foreign,
        ),
        Some(hint) => Err(key_error(
            this,
            field,
            format!("{hint:?} requires a single (Option<_>) field"),
        )),
        None => {
            if let Some((table, parent, other)) = registered_join_table(model, target) {
                many_to_many(
                    this,
                    &target_layout,
                    field,
                    target,
                    table,
                    Some(field.join_fk.unwrap_or(parent)),
                    Some(field.join_target_fk.unwrap_or(other)),
                )
            } else if target_layout.has_columns(&foreign) {
                has(
                    RelationKind::HasMany,
                    this,
                    &target_layout,
                    field,
                    target,
                    foreign,
                )
            } else {
                Err(key_error(
                    this,
                    field,
                    format!(
                        "cannot infer relation kind: {}.{} does not exist and no join table links {} and {}",
                        target_layout.table,
                        foreign.join(", "),
                        this.type_name,
                        target_layout.type_name
                    ),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::fixtures::*;
    use crate::shape_only_model;

    #[test]
    fn describe_is_idempotent() {
        let a = describe::<User>().unwrap();
        let b = describe::<User>().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.table(), "users");
        assert_eq!(a.alias(), "user");
        let cols: Vec<_> = a.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cols, ["id", "name", "emails"]);
        assert_eq!(a.primary_key_names(), ["id"]);
        assert!(a.generated_key().is_some());
        assert!(a.relations().is_empty());
    }

    #[test]
    fn relation_kinds_follow_the_decision_table() {
        let story = describe::<Story>().unwrap();
        let author = story.relation("Author").unwrap();
        assert_eq!(author.kind, RelationKind::BelongsTo);
        assert_eq!(author.local_columns, ["author_id"]);
        assert_eq!(author.foreign_columns, ["id"]);

        let comments = story.relation("comments").unwrap();
        assert_eq!(comments.kind, RelationKind::HasMany);
        assert_eq!(comments.local_columns, ["id"]);
        assert_eq!(comments.foreign_columns, ["story_id"]);

        let tags = story.relation("Tags").unwrap();
        assert_eq!(tags.kind, RelationKind::ManyToMany);
        let join = tags.join_table.as_ref().unwrap();
        assert_eq!(join.table, "story_tags");
        assert_eq!(join.parent_columns, ["story_id"]);
        assert_eq!(join.target_columns, ["tag_id"]);

        let person = describe::<Person>().unwrap();
        assert_eq!(person.table(), "people");
        let profile = person.relation("profile").unwrap();
        assert_eq!(profile.kind, RelationKind::HasOne);
        assert_eq!(profile.foreign_columns, ["person_id"]);
    }

    #[test]
    fn mutual_references_describe() {
        let comment = describe::<Comment>().unwrap();
        let story = comment.relation("story").unwrap();
        assert_eq!(story.kind, RelationKind::BelongsTo);
        let target = story.target().unwrap();
        assert_eq!(target.table(), "stories");
        let back = target.relation("comments").unwrap().target().unwrap();
        assert!(Arc::ptr_eq(&back, &comment));
    }

    struct NoKey;
    shape_only_model!(
        NoKey,
        ModelShape::new("NoKey").field(FieldShape::new("name", String::kind()))
    );

    struct Duplicate;
    shape_only_model!(
        Duplicate,
        ModelShape::new("Duplicate")
            .field(FieldShape::new("id", i64::kind()))
            .field(FieldShape::new("name", String::kind()))
            .field(FieldShape::new("label", String::kind()).column("name"))
    );

    struct Dangling;
    shape_only_model!(
        Dangling,
        ModelShape::new("Dangling")
            .field(FieldShape::new("id", i64::kind()))
            .field(FieldShape::new("owner", Option::<User>::kind()))
    );

    struct Required;
    shape_only_model!(
        Required,
        ModelShape::new("Required")
            .field(FieldShape::new("id", i64::kind()))
            .field(FieldShape::new("user_id", i64::kind()))
            .field(FieldShape::new("user", User::kind()))
    );

    struct Mistyped;
    shape_only_model!(
        Mistyped,
        ModelShape::new("Mistyped")
            .field(FieldShape::new("id", i64::kind()))
            .field(FieldShape::new("user_id", String::kind()))
            .field(FieldShape::new("user", Option::<User>::kind()))
    );

    #[test]
    fn bad_shapes_fail_at_describe_time() {
        let err = describe::<NoKey>().unwrap_err();
        assert!(err.is_schema(), "{err}");
        assert!(err.to_string().contains("primary key"));

        let err = describe::<Duplicate>().unwrap_err();
        assert!(err.to_string().contains("both map to column `name`"), "{err}");

        let err = describe::<Dangling>().unwrap_err();
        assert!(err.is_schema());
        assert!(err.to_string().contains("owner"), "{err}");

        let err = describe::<Required>().unwrap_err();
        assert!(err.to_string().contains("Option"), "{err}");

        let err = describe::<Mistyped>().unwrap_err();
        assert!(err.to_string().contains("does not match"), "{err}");
    }
}
