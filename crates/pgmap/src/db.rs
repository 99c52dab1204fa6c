//! The entry point tying models, statements and an executor together.
//!
//! ```ignore
//! use pgmap::{Db, Model};
//!
//! let db = Db::new(client);
//! let mut user = User { id: 0, name: "admin".into(), emails: vec!["a@x".into()] };
//! db.insert(&mut user).await?;          // user.id is now set
//! let same: User = db.find(user.id).await?;
//! ```

use crate::client::Executor;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::monitor::{DbConfig, NoopMonitor, QueryContext, QueryMonitor, QueryResult};
use crate::query::builder::{self, CreateTableOptions, DropTableOptions};
use crate::query::{Query, QuerySpec};
use crate::relation::{self, RelationPlan, assemble};
use crate::row::Record;
use crate::scan::{Node, ScannedRow, scan_rows};
use crate::schema::describe;
use crate::sql::{Fragment, Sql, Statement};
use crate::value::Value;
use crate::{ident, monitor::QueryType};
use futures_util::future::{BoxFuture, FutureExt, try_join_all};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A statement that has been sent; reports to the monitor exactly once, including when
/// the caller stops waiting for it.
struct InFlight<'a> {
    monitor: &'a dyn QueryMonitor,
    slow_threshold: Option<Duration>,
    ctx: QueryContext,
    start: Instant,
    reported: bool,
}

impl<'a> InFlight<'a> {
    fn start(db: &'a Db<impl Executor>, stmt: &Statement) -> Self {
        let mut ctx = QueryContext::new(stmt.sql.clone(), stmt.params.clone())
            .with_query_type(stmt.kind);
        if let Some(tag) = &stmt.tag {
            ctx = ctx.with_tag(tag.clone());
        }
        tracing::debug!(
            target: "pgmap.sql",
            query_type = ?stmt.kind,
            tag = stmt.tag.as_deref().unwrap_or("-"),
            params = stmt.params.len(),
            "{}",
            stmt.sql
        );
        db.monitor.on_query_start(&ctx);
        Self {
            monitor: db.monitor.as_ref(),
            slow_threshold: db.config.slow_query_threshold,
            ctx,
            start: Instant::now(),
            reported: false,
        }
    }

    fn report(&mut self, result: &QueryResult) {
        if self.reported {
            return;
        }
        self.reported = true;
        let elapsed = self.start.elapsed();
        if self.slow_threshold.is_some_and(|t| elapsed >= t) {
            self.monitor.on_slow_query(&self.ctx, elapsed);
        }
        self.monitor.on_query_complete(&self.ctx, elapsed, result);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.reported {
            self.report(&QueryResult::error("cancelled before completion"));
        }
    }
}

/// A database handle: an [`Executor`] plus monitoring and execution settings.
pub struct Db<C> {
    client: C,
    monitor: Arc<dyn QueryMonitor>,
    config: DbConfig,
}

impl<C: Executor> Db<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            monitor: Arc::new(NoopMonitor),
            config: DbConfig::default(),
        }
    }

    pub fn with_monitor<M: QueryMonitor + 'static>(mut self, monitor: M) -> Self {
        self.monitor = Arc::new(monitor);
        self
    }

    /// Use an Arc-wrapped monitor, e.g. a `StatsMonitor` that is read elsewhere.
    pub fn with_monitor_arc(mut self, monitor: Arc<dyn QueryMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_config(mut self, config: DbConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_inner(self) -> C {
        self.client
    }

    /// A handle over another executor (usually a transaction) that shares this
    /// handle's monitor and settings.
    pub fn share<D: Executor>(&self, client: D) -> Db<D> {
        Db {
            client,
            monitor: Arc::clone(&self.monitor),
            config: self.config,
        }
    }

    /// Start a query against model `T`.
    pub fn model<T: Model>(&self) -> Query<'_, C, T> {
        Query::new(self)
    }

    async fn timed<T>(&self, future: impl Future<Output = OrmResult<T>> + Send) -> OrmResult<T> {
        match self.config.query_timeout {
            Some(timeout) => {
                tokio::pin!(future);
                tokio::select! {
                    result = &mut future => result,
                    _ = tokio::time::sleep(timeout) => {
                        if let Some(cancel_token) = self.client.cancel_token() {
                            tokio::spawn(async move {
                                let _ = cancel_token.cancel_query(tokio_postgres::NoTls).await;
                            });
                        }
                        Err(OrmError::Timeout(timeout))
                    }
                }
            }
            None => future.await,
        }
    }

    /// Run a row-returning statement.
    pub async fn fetch(&self, stmt: &Statement) -> OrmResult<Vec<Record>> {
        let mut in_flight = InFlight::start(self, stmt);
        let result = self
            .timed(self.client.query(&stmt.sql, &stmt.params))
            .await;
        in_flight.report(&match &result {
            Ok(rows) => QueryResult::Rows(rows.len()),
            Err(e) => QueryResult::error(e.to_string()),
        });
        result
    }

    /// Run a statement and return the number of affected rows.
    pub async fn exec(&self, stmt: &Statement) -> OrmResult<u64> {
        let mut in_flight = InFlight::start(self, stmt);
        let result = self
            .timed(self.client.execute(&stmt.sql, &stmt.params))
            .await;
        in_flight.report(&match &result {
            Ok(n) => QueryResult::Affected(*n),
            Err(e) => QueryResult::error(e.to_string()),
        });
        result
    }

    fn raw_statement(sql: &str, args: Vec<Value>) -> OrmResult<Statement> {
        let mut built = Sql::empty();
        built.push_fragment(&Fragment::new(sql, args), "<raw>")?;
        Ok(built.into_statement(QueryType::from_sql(sql)))
    }

    /// Run hand-written SQL with `?` placeholders and return its rows.
    pub async fn query_raw(&self, sql: &str, args: Vec<Value>) -> OrmResult<Vec<Record>> {
        self.fetch(&Self::raw_statement(sql, args)?).await
    }

    /// Run hand-written SQL with `?` placeholders and return the affected row count.
    pub async fn execute_raw(&self, sql: &str, args: Vec<Value>) -> OrmResult<u64> {
        self.exec(&Self::raw_statement(sql, args)?).await
    }

    /// Root statement plus one follow-up statement per collection plan and level.
    ///
    /// Relation names are resolved before anything is sent. When a statement fails or
    /// times out, the statements not yet started are never issued and nothing is
    /// returned.
    pub(crate) async fn select_nodes(&self, spec: &QuerySpec) -> OrmResult<Vec<Node>> {
        let plans = relation::plan(&spec.schema, &spec.relations)?;
        let (stmt, layout) = builder::select(spec, &plans)?;
        let records = self.fetch(&stmt).await?;
        let mut nodes: Vec<Node> = scan_rows(&records, &layout)?
            .into_iter()
            .map(|row| row.node)
            .collect();
        self.load_follow_ups(&mut nodes, &plans).await?;
        Ok(nodes)
    }

    fn load_follow_ups<'a>(
        &'a self,
        nodes: &'a mut [Node],
        plans: &'a [RelationPlan],
    ) -> BoxFuture<'a, OrmResult<()>> {
        async move {
            let pending = assemble::pending(plans);
            if pending.is_empty() {
                return Ok(());
            }

            // Plans of one level are independent and read-only, so they run together.
            let parents: &[Node] = nodes;
            let batches = pending
                .iter()
                .map(|(path, plan)| {
                    let plan: &RelationPlan = plan;
                    let keys = assemble::parent_keys(
                        parents,
                        assemble::Pending {
                            path: path.as_slice(),
                            plan,
                        },
                    );
                    self.fetch_related(plan, keys)
                })
                .collect::<Vec<_>>();
            let results = try_join_all(batches).await?;

            for ((path, plan), rows) in pending.iter().zip(results) {
                assemble::attach(
                    nodes,
                    assemble::Pending {
                        path: path.as_slice(),
                        plan: *plan,
                    },
                    rows,
                );
            }
            Ok(())
        }
        .boxed()
    }

    async fn fetch_related(
        &self,
        plan: &RelationPlan,
        keys: Vec<Vec<Value>>,
    ) -> OrmResult<Vec<ScannedRow>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let (stmt, layout) = builder::follow_up(plan, &keys)?;
        let records = self.fetch(&stmt).await?;
        let rows = scan_rows(&records, &layout)?;

        let (leads, mut children): (Vec<_>, Vec<_>) =
            rows.into_iter().map(|row| (row.lead, row.node)).unzip();
        self.load_follow_ups(&mut children, &plan.children).await?;
        Ok(leads
            .into_iter()
            .zip(children)
            .map(|(lead, node)| ScannedRow { lead, node })
            .collect())
    }

    /// Find a row by its single-column primary key.
    pub async fn find<T: Model>(&self, key: impl Into<Value>) -> OrmResult<T> {
        self.find_by_key(vec![key.into()]).await
    }

    /// Find a row by primary key values in key-column order.
    pub async fn find_by_key<T: Model>(&self, key: Vec<Value>) -> OrmResult<T> {
        let schema = describe::<T>()?;
        let columns: Vec<_> = schema.primary_key().collect();
        if columns.len() != key.len() {
            return Err(OrmError::query_build(
                schema.table(),
                format!(
                    "primary key has {} columns, got {} values",
                    columns.len(),
                    key.len()
                ),
            ));
        }
        let mut query = self.model::<T>();
        for (column, value) in columns.into_iter().zip(key) {
            query = query.filter(
                format!("{} = ?", ident::qualified(schema.alias(), &column.name)),
                vec![value],
            );
        }
        query.select_one().await
    }

    /// Insert one row and write generated columns back into `value`.
    pub async fn insert<T: Model>(&self, value: &mut T) -> OrmResult<()> {
        self.model::<T>().insert(value).await
    }

    /// Insert all rows in one statement; each value receives its generated columns.
    pub async fn insert_many<T: Model>(&self, values: &mut [T]) -> OrmResult<()> {
        if values.is_empty() {
            return Ok(());
        }
        let spec = QuerySpec::new(describe::<T>()?);
        self.insert_with(&spec, values).await
    }

    pub(crate) async fn insert_with<T: Model>(
        &self,
        spec: &QuerySpec,
        values: &mut [T],
    ) -> OrmResult<()> {
        spec.check(crate::query::Operation::Insert)?;
        let schema = &spec.schema;
        let rows = values
            .iter()
            .map(Model::to_values)
            .collect::<OrmResult<Vec<_>>>()?;
        let stmt = builder::insert(schema, &rows)?;
        let records = self.fetch(&stmt).await?;
        if records.len() != values.len() {
            return Err(OrmError::scan(
                schema.table(),
                "<row>",
                format!(
                    "INSERT returned {} rows for {} values",
                    records.len(),
                    values.len()
                ),
            ));
        }
        // Decode everything before touching any value.
        let nodes = records
            .into_iter()
            .map(|r| Node::new(schema.clone(), r.into_values()))
            .collect::<OrmResult<Vec<_>>>()?;
        for (value, node) in values.iter_mut().zip(&nodes) {
            value.apply_node(node)?;
        }
        Ok(())
    }

    /// Update every non-key column of `value`, matched by primary key.
    pub async fn update<T: Model>(&self, value: &T) -> OrmResult<()> {
        self.model::<T>().update(value).await
    }

    pub(crate) async fn update_with<T: Model>(&self, spec: &QuerySpec, value: &T) -> OrmResult<()> {
        let stmt = builder::update(spec, &value.to_values()?)?;
        match self.exec(&stmt).await? {
            0 => Err(OrmError::not_found(format!(
                "no row in `{}` matched the update",
                spec.schema.table()
            ))),
            _ => Ok(()),
        }
    }

    /// Delete the row of `value` by primary key.
    pub async fn delete<T: Model>(&self, value: &T) -> OrmResult<()> {
        let schema = describe::<T>()?;
        let stmt = builder::delete_by_key(&schema, &value.to_values()?)?;
        match self.exec(&stmt).await? {
            0 => Err(OrmError::not_found(format!(
                "no row in `{}` matched the delete",
                schema.table()
            ))),
            _ => Ok(()),
        }
    }

    pub async fn create_table<T: Model>(&self, opts: CreateTableOptions) -> OrmResult<()> {
        let schema = describe::<T>()?;
        self.exec(&builder::create_table(&schema, opts)).await?;
        Ok(())
    }

    pub async fn drop_table<T: Model>(&self, opts: DropTableOptions) -> OrmResult<()> {
        let schema = describe::<T>()?;
        self.exec(&builder::drop_table(&schema, opts)).await?;
        Ok(())
    }
}
