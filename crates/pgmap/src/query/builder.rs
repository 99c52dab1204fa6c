//! Statement assembly.
//!
//! Every function here is a pure transformation from descriptors, plans and caller
//! fragments to a [`Statement`]. Values are always bound; descriptor names are always
//! double-quoted.
//!
//! Column order of a SELECT is fixed: lead key columns (many-to-many follow-ups only),
//! the root model's columns, then each joined relation's columns in depth-first plan
//! order. The returned [`SelectLayout`] records those offsets for the scanner.

use super::spec::{Filter, Operation, QuerySpec, Target};
use crate::error::{OrmError, OrmResult};
use crate::monitor::QueryType;
use crate::relation::RelationPlan;
use crate::scan::{Segment, SelectLayout};
use crate::schema::{RelationKind, SchemaDescriptor, naming};
use crate::sql::{Sql, Statement};
use crate::value::Value;
use std::sync::Arc;

/// Alias of the n-th parent key column selected by a many-to-many follow-up.
pub(crate) fn parent_key_alias(n: usize) -> String {
    format!("__parent_{n}")
}

struct Join<'a> {
    alias: String,
    parent_alias: String,
    parent_segment: usize,
    plan: &'a RelationPlan,
}

/// Flatten the join-strategy plans reachable from `plans` without crossing a follow-up.
fn joins_for<'a>(root: &SchemaDescriptor, plans: &'a [RelationPlan]) -> OrmResult<Vec<Join<'a>>> {
    fn walk<'a>(
        plans: &'a [RelationPlan],
        parent_alias: &str,
        parent_segment: usize,
        path: &mut Vec<&'static str>,
        out: &mut Vec<Join<'a>>,
    ) {
        for plan in plans.iter().filter(|p| p.is_join()) {
            path.push(plan.field());
            let alias = naming::path_alias(path);
            out.push(Join {
                alias: alias.clone(),
                parent_alias: parent_alias.to_string(),
                parent_segment,
                plan,
            });
            let segment = out.len();
            walk(&plan.children, &alias, segment, path, out);
            path.pop();
        }
    }

    let mut out = Vec::new();
    walk(plans, root.alias(), 0, &mut Vec::new(), &mut out);
    if let Some(clash) = out.iter().find(|j| j.alias == root.alias()) {
        return Err(OrmError::query_build(
            root.table(),
            format!(
                "relation alias `{}` collides with the table alias of `{}`",
                clash.alias,
                root.table()
            ),
        ));
    }
    Ok(out)
}

fn layout(root: &Arc<SchemaDescriptor>, joins: &[Join<'_>], lead: usize) -> SelectLayout {
    let mut segments = vec![Segment {
        field: None,
        parent: None,
        schema: root.clone(),
        start: lead,
    }];
    let mut start = lead + root.columns().len();
    for join in joins {
        segments.push(Segment {
            field: Some(join.plan.field()),
            parent: Some(join.parent_segment),
            schema: join.plan.schema.clone(),
            start,
        });
        start += join.plan.schema.columns().len();
    }
    SelectLayout { lead, segments }
}

fn push_columns(sql: &mut Sql, alias: &str, schema: &SchemaDescriptor, joined: bool) {
    for (i, column) in schema.columns().iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_qualified(alias, &column.name);
        if joined {
            sql.push(" AS ")
                .push_quoted(&naming::joined_column_alias(alias, &column.name));
        }
    }
}

fn push_select_list(sql: &mut Sql, root: &SchemaDescriptor, joins: &[Join<'_>]) {
    push_columns(sql, root.alias(), root, false);
    for join in joins {
        sql.push(", ");
        push_columns(sql, &join.alias, &join.plan.schema, true);
    }
}

fn push_from(sql: &mut Sql, root: &SchemaDescriptor) {
    sql.push(" FROM ")
        .push_quoted(root.table())
        .push(" AS ")
        .push_quoted(root.alias());
}

/// `"l"."a" = "r"."b" AND ...`
fn push_key_match(sql: &mut Sql, left: &str, left_cols: &[String], right: &str, right_cols: &[String]) {
    for (i, (l, r)) in left_cols.iter().zip(right_cols).enumerate() {
        if i > 0 {
            sql.push(" AND ");
        }
        sql.push_qualified(left, l).push(" = ").push_qualified(right, r);
    }
}

fn push_joins(sql: &mut Sql, joins: &[Join<'_>]) {
    for join in joins {
        let relation = &join.plan.relation;
        sql.push(" LEFT JOIN ")
            .push_quoted(join.plan.schema.table())
            .push(" AS ")
            .push_quoted(&join.alias)
            .push(" ON ");
        push_key_match(
            sql,
            &join.alias,
            &relation.foreign_columns,
            &join.parent_alias,
            &relation.local_columns,
        );
    }
}

fn push_filters(sql: &mut Sql, spec: &QuerySpec, mut first: bool) -> OrmResult<()> {
    for filter in &spec.filters {
        sql.push(if first { " WHERE (" } else { " AND (" });
        match filter {
            Filter::Fragment(fragment) => {
                sql.push_fragment(fragment, spec.schema.table())?;
            }
            Filter::Condition(condition) => {
                sql.push_condition(condition);
            }
        }
        sql.push(")");
        first = false;
    }
    Ok(())
}

fn push_group_having(sql: &mut Sql, spec: &QuerySpec) -> OrmResult<()> {
    let table = spec.schema.table();
    for (i, fragment) in spec.group.iter().enumerate() {
        sql.push(if i == 0 { " GROUP BY " } else { ", " });
        sql.push_fragment(fragment, table)?;
    }
    for (i, fragment) in spec.having.iter().enumerate() {
        sql.push(if i == 0 { " HAVING (" } else { " AND (" });
        sql.push_fragment(fragment, table)?;
        sql.push(")");
    }
    Ok(())
}

fn push_order_page(sql: &mut Sql, spec: &QuerySpec) -> OrmResult<()> {
    let table = spec.schema.table();
    for (i, fragment) in spec.order.iter().enumerate() {
        sql.push(if i == 0 { " ORDER BY " } else { ", " });
        sql.push_fragment(fragment, table)?;
    }
    let limit = match (spec.limit, spec.target) {
        (None, Target::One) => Some(1),
        (limit, _) => limit,
    };
    if let Some(limit) = limit {
        sql.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = spec.offset {
        sql.push(" OFFSET ").push_bind(offset);
    }
    Ok(())
}

fn finish(mut sql: Sql, tag: Option<&String>, kind: QueryType) -> Statement {
    if let Some(tag) = tag {
        sql.tag(tag.clone());
    }
    sql.into_statement(kind)
}

/// The root SELECT of a query; join-strategy relations are folded in.
pub fn select(spec: &QuerySpec, plans: &[RelationPlan]) -> OrmResult<(Statement, SelectLayout)> {
    spec.check(Operation::Select)?;
    let root = &spec.schema;
    let joins = joins_for(root, plans)?;

    let mut sql = Sql::new("SELECT ");
    push_select_list(&mut sql, root, &joins);
    push_from(&mut sql, root);
    push_joins(&mut sql, &joins);
    push_filters(&mut sql, spec, true)?;
    push_group_having(&mut sql, spec)?;
    push_order_page(&mut sql, spec)?;

    let layout = layout(root, &joins, 0);
    Ok((finish(sql, spec.tag.as_ref(), QueryType::Select), layout))
}

/// `SELECT count(*)` over the rows `select` would return, ignoring ordering and paging.
pub fn count(spec: &QuerySpec, plans: &[RelationPlan]) -> OrmResult<Statement> {
    spec.check(Operation::Count)?;
    let root = &spec.schema;
    let joins = joins_for(root, plans)?;

    let mut sql = if spec.group.is_empty() {
        Sql::new("SELECT count(*) AS \"count\"")
    } else {
        Sql::new("SELECT count(*) AS \"count\" FROM (SELECT 1")
    };
    push_from(&mut sql, root);
    push_joins(&mut sql, &joins);
    push_filters(&mut sql, spec, true)?;
    if !spec.group.is_empty() {
        push_group_having(&mut sql, spec)?;
        sql.push(") AS \"grouped\"");
    }
    Ok(finish(sql, spec.tag.as_ref(), QueryType::Select))
}

/// `SELECT EXISTS (...)` over the rows `select` would return.
pub fn exists(spec: &QuerySpec, plans: &[RelationPlan]) -> OrmResult<Statement> {
    spec.check(Operation::Exists)?;
    let root = &spec.schema;
    let joins = joins_for(root, plans)?;

    let mut sql = Sql::new("SELECT EXISTS (SELECT 1");
    push_from(&mut sql, root);
    push_joins(&mut sql, &joins);
    push_filters(&mut sql, spec, true)?;
    push_group_having(&mut sql, spec)?;
    sql.push(") AS \"exists\"");
    Ok(finish(sql, spec.tag.as_ref(), QueryType::Select))
}

/// The batched statement of a has-many or many-to-many plan for all `keys` of its level.
///
/// `keys` are parent values of the relation's local columns and must not be empty.
pub fn follow_up(plan: &RelationPlan, keys: &[Vec<Value>]) -> OrmResult<(Statement, SelectLayout)> {
    let relation = &plan.relation;
    let target = &plan.schema;
    if keys.is_empty() {
        return Err(OrmError::query_build(
            target.table(),
            "follow-up statement needs at least one parent key",
        ));
    }
    let joins = joins_for(target, &plan.children)?;

    let mut sql = Sql::new("SELECT ");
    let lead;
    match relation.kind {
        RelationKind::HasMany => {
            lead = 0;
            push_select_list(&mut sql, target, &joins);
            push_from(&mut sql, target);
            push_joins(&mut sql, &joins);
            sql.push(" WHERE ");
            push_key_filter(&mut sql, target.alias(), &relation.foreign_columns, keys);
        }
        RelationKind::ManyToMany => {
            let join_table = relation.join_table.as_ref().ok_or_else(|| {
                OrmError::relation(plan.owner, relation.field, "join table cannot be resolved")
            })?;
            lead = join_table.parent_columns.len();
            for (i, column) in join_table.parent_columns.iter().enumerate() {
                sql.push_qualified(&join_table.table, column)
                    .push(" AS ")
                    .push_quoted(&parent_key_alias(i))
                    .push(", ");
            }
            push_select_list(&mut sql, target, &joins);
            push_from(&mut sql, target);
            sql.push(" JOIN ").push_quoted(&join_table.table).push(" ON ");
            push_key_match(
                &mut sql,
                &join_table.table,
                &join_table.target_columns,
                target.alias(),
                &relation.foreign_columns,
            );
            push_joins(&mut sql, &joins);
            sql.push(" WHERE ");
            push_key_filter(&mut sql, &join_table.table, &join_table.parent_columns, keys);
        }
        RelationKind::BelongsTo | RelationKind::HasOne => {
            return Err(OrmError::relation(
                plan.owner,
                relation.field,
                format!("{} relations are joined, not fetched separately", relation.kind),
            ));
        }
    }

    for (i, column) in target.primary_key().enumerate() {
        sql.push(if i == 0 { " ORDER BY " } else { ", " });
        sql.push_qualified(target.alias(), &column.name);
    }
    sql.tag(format!("{}.{}", plan.owner, relation.field));

    let layout = layout(target, &joins, lead);
    Ok((sql.into_statement(QueryType::Select), layout))
}

/// `col = ANY($1)` for single keys, `(a, b) IN (($1, $2), ...)` for composite keys.
fn push_key_filter(sql: &mut Sql, alias: &str, columns: &[String], keys: &[Vec<Value>]) {
    if let [column] = columns {
        let values: Vec<Value> = keys.iter().filter_map(|k| k.first().cloned()).collect();
        sql.push_qualified(alias, column)
            .push(" = ANY(")
            .push_bind(Value::Array(values))
            .push(")");
        return;
    }
    sql.push("(");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_qualified(alias, column);
    }
    sql.push(") IN (");
    for (i, key) in keys.iter().enumerate() {
        sql.push(if i == 0 { "(" } else { ", (" });
        sql.push_bind_list(key.iter().cloned());
        sql.push(")");
    }
    sql.push(")");
}

fn push_returning(sql: &mut Sql, schema: &SchemaDescriptor) {
    sql.push(" RETURNING ");
    for (i, column) in schema.columns().iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_quoted(&column.name);
    }
}

fn lookup<'v>(
    schema: &SchemaDescriptor,
    values: &'v [(&'static str, Value)],
    field: &str,
) -> OrmResult<&'v Value> {
    values
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, v)| v)
        .ok_or_else(|| OrmError::query_build(schema.table(), format!("no value for field `{field}`")))
}

/// Multi-row `INSERT ... RETURNING` with every column, in descriptor order.
///
/// A generated key is left out while its value is zero in every row; when only some
/// rows carry a key, the others insert `DEFAULT`.
pub fn insert(
    schema: &Arc<SchemaDescriptor>,
    rows: &[Vec<(&'static str, Value)>],
) -> OrmResult<Statement> {
    if rows.is_empty() {
        return Err(OrmError::query_build(schema.table(), "nothing to insert"));
    }

    let mut columns = Vec::new();
    for column in schema.columns() {
        if column.generated {
            let mut any_set = false;
            for row in rows {
                any_set |= !lookup(schema, row, column.field)?.is_zero();
            }
            if !any_set {
                continue;
            }
        }
        columns.push(column);
    }

    let mut sql = Sql::new("INSERT INTO ");
    sql.push_quoted(schema.table());
    if columns.is_empty() {
        if rows.len() == 1 {
            sql.push(" DEFAULT VALUES");
        } else {
            sql.push(" VALUES ");
            for i in 0..rows.len() {
                sql.push(if i == 0 { "(DEFAULT)" } else { ", (DEFAULT)" });
            }
        }
    } else {
        sql.push(" (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                sql.push(", ");
            }
            sql.push_quoted(&column.name);
        }
        sql.push(") VALUES ");
        for (r, row) in rows.iter().enumerate() {
            sql.push(if r == 0 { "(" } else { ", (" });
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                let value = lookup(schema, row, column.field)?;
                if column.generated && value.is_zero() {
                    sql.push("DEFAULT");
                } else {
                    sql.push_bind(value.clone());
                }
            }
            sql.push(")");
        }
    }
    push_returning(&mut sql, schema);
    Ok(sql.into_statement(QueryType::Insert))
}

fn push_key_equals(
    sql: &mut Sql,
    schema: &SchemaDescriptor,
    values: &[(&'static str, Value)],
) -> OrmResult<()> {
    for (i, column) in schema.primary_key().enumerate() {
        let value = lookup(schema, values, column.field)?;
        if value.is_null() {
            return Err(OrmError::validation(format!(
                "primary key `{}.{}` is NULL",
                schema.table(),
                column.name
            )));
        }
        sql.push(if i == 0 { " WHERE " } else { " AND " });
        sql.push_qualified(schema.alias(), &column.name)
            .push(" = ")
            .push_bind(value.clone());
    }
    Ok(())
}

/// `UPDATE` of every non-key column, matched by primary key plus any extra filters.
pub fn update(spec: &QuerySpec, values: &[(&'static str, Value)]) -> OrmResult<Statement> {
    spec.check(Operation::Update)?;
    let schema = &spec.schema;
    let set: Vec<_> = schema.columns().iter().filter(|c| !c.primary_key).collect();
    if set.is_empty() {
        return Err(OrmError::query_build(
            schema.table(),
            "model has no columns besides its primary key to update",
        ));
    }

    let mut sql = Sql::new("UPDATE ");
    sql.push_quoted(schema.table())
        .push(" AS ")
        .push_quoted(schema.alias())
        .push(" SET ");
    for (i, column) in set.iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_quoted(&column.name)
            .push(" = ")
            .push_bind(lookup(schema, values, column.field)?.clone());
    }
    push_key_equals(&mut sql, schema, values)?;
    push_filters(&mut sql, spec, false)?;
    Ok(finish(sql, spec.tag.as_ref(), QueryType::Update))
}

/// `DELETE` of one row by primary key.
pub fn delete_by_key(
    schema: &SchemaDescriptor,
    values: &[(&'static str, Value)],
) -> OrmResult<Statement> {
    let mut sql = Sql::new("DELETE FROM ");
    sql.push_quoted(schema.table())
        .push(" AS ")
        .push_quoted(schema.alias());
    push_key_equals(&mut sql, schema, values)?;
    Ok(sql.into_statement(QueryType::Delete))
}

/// `DELETE` of every row matching the query's filters.
pub fn delete(spec: &QuerySpec) -> OrmResult<Statement> {
    spec.check(Operation::Delete)?;
    let schema = &spec.schema;
    let mut sql = Sql::new("DELETE FROM ");
    sql.push_quoted(schema.table())
        .push(" AS ")
        .push_quoted(schema.alias());
    push_filters(&mut sql, spec, true)?;
    Ok(finish(sql, spec.tag.as_ref(), QueryType::Delete))
}

/// Options for [`create_table`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateTableOptions {
    pub temp: bool,
    pub if_not_exists: bool,
}

/// Options for [`drop_table`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropTableOptions {
    pub if_exists: bool,
    pub cascade: bool,
}

/// `CREATE TABLE` from a descriptor. Relations produce no constraints.
pub fn create_table(schema: &SchemaDescriptor, opts: CreateTableOptions) -> Statement {
    let mut sql = Sql::new("CREATE ");
    if opts.temp {
        sql.push("TEMP ");
    }
    sql.push("TABLE ");
    if opts.if_not_exists {
        sql.push("IF NOT EXISTS ");
    }
    sql.push_quoted(schema.table()).push(" (");
    for (i, column) in schema.columns().iter().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        let ty = match (&column.ty, column.generated) {
            (crate::field::ColumnType::BigInt, true) => "bigserial".to_string(),
            (crate::field::ColumnType::Integer, true) => "serial".to_string(),
            (crate::field::ColumnType::SmallInt, true) => "smallserial".to_string(),
            (ty, _) => ty.sql_name(),
        };
        sql.push_quoted(&column.name).push(" ").push(&ty);
        if !column.nullable {
            sql.push(" NOT NULL");
        }
    }
    sql.push(", PRIMARY KEY (");
    for (i, column) in schema.primary_key().enumerate() {
        if i > 0 {
            sql.push(", ");
        }
        sql.push_quoted(&column.name);
    }
    sql.push("))");
    sql.into_statement(QueryType::Other)
}

pub fn drop_table(schema: &SchemaDescriptor, opts: DropTableOptions) -> Statement {
    let mut sql = Sql::new("DROP TABLE ");
    if opts.if_exists {
        sql.push("IF EXISTS ");
    }
    sql.push_quoted(schema.table());
    if opts.cascade {
        sql.push(" CASCADE");
    }
    sql.into_statement(QueryType::Other)
}
