//! SELECT query builder.

use crate::expr::{Dialect, Expr};
use crate::join::{ResolvedJoin, resolve_joins};
use crate::queryset::{Prefetch, QuerySet};
use aggressivequery_core::{EntityName, Result, Schema, SchemaError, Value};
use std::sync::Arc;

/// A SELECT over one entity, with joins, a column projection and prefetches.
///
/// `Select` renders SQL but never executes it. Each prefetch renders as one
/// extra statement, so `round_trips()` is what a backend would execute.
#[derive(Debug, Clone)]
pub struct Select {
    schema: Arc<Schema>,
    model: EntityName,
    dialect: Dialect,
    /// Restricted projection (None = every concrete column)
    columns: Option<Vec<String>>,
    /// Joined relation paths
    joins: Vec<String>,
    prefetches: Vec<Prefetch<Select>>,
    /// WHERE clause conditions
    where_clause: Option<Expr>,
}

impl Select {
    /// Select every row of `model`.
    pub fn new(schema: Arc<Schema>, model: EntityName) -> Self {
        Self {
            schema,
            model,
            dialect: Dialect::default(),
            columns: None,
            joins: Vec::new(),
            prefetches: Vec::new(),
            where_clause: None,
        }
    }

    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Add a WHERE condition, ANDed with existing conditions.
    #[must_use]
    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_clause = Some(match self.where_clause {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn columns(&self) -> Option<&[String]> {
        self.columns.as_deref()
    }

    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    pub fn prefetches(&self) -> &[Prefetch<Select>] {
        &self.prefetches
    }

    pub fn where_clause(&self) -> Option<&Expr> {
        self.where_clause.as_ref()
    }

    /// Build the root statement and its parameters.
    pub fn build(&self) -> Result<(String, Vec<Value>)> {
        let def = self.schema.lookup(self.model)?;
        let joins = resolve_joins(&self.schema, self.model, &self.joins)?;
        let projection = self.projection(def.primary_key, &joins)?;

        let mut params = Vec::new();
        let mut sql = format!(
            "SELECT {} FROM {}",
            projection.join(", "),
            self.dialect.quote_identifier(self.model)
        );
        for join in &joins {
            sql.push_str(&join.join.build_with_dialect(self.dialect, &mut params, 0));
        }
        if let Some(expr) = &self.where_clause {
            let where_sql = expr
                .clone()
                .qualify(self.model)
                .build_with_dialect(self.dialect, &mut params, 0);
            sql.push_str(" WHERE ");
            sql.push_str(&where_sql);
        }

        Ok((sql, params))
    }

    pub fn to_sql(&self) -> Result<String> {
        Ok(self.build()?.0)
    }

    /// The root statement followed by every prefetch statement, depth first.
    pub fn statements(&self) -> Result<Vec<String>> {
        let mut statements = vec![self.to_sql()?];
        for prefetch in &self.prefetches {
            match &prefetch.query {
                Some(query) => statements.extend(query.statements()?),
                None => {
                    let target = self.lookup_target(&prefetch.lookup)?;
                    statements.push(self.for_entity(target).to_sql()?);
                }
            }
        }
        Ok(statements)
    }

    /// Number of statements a backend executes to materialize this query.
    pub fn round_trips(&self) -> Result<usize> {
        Ok(self.statements()?.len())
    }

    fn projection(&self, primary_key: &str, joins: &[ResolvedJoin]) -> Result<Vec<String>> {
        let q = |name: &str| self.dialect.quote_identifier(name);
        let root = |column: &str| format!("{}.{}", q(self.model), q(column));
        let joined = |alias: &str, column: &str| {
            format!(
                "{}.{} AS {}",
                q(alias),
                q(column),
                q(&format!("{alias}__{column}"))
            )
        };

        let mut out: Vec<String> = Vec::new();
        let mut push = |column: String| {
            if !out.contains(&column) {
                out.push(column);
            }
        };

        let Some(columns) = &self.columns else {
            for column in self.schema.lookup(self.model)?.concrete_columns() {
                push(root(&column));
            }
            for join in joins {
                for column in self.schema.lookup(join.entity)?.concrete_columns() {
                    push(joined(&join.path, &column));
                }
            }
            return Ok(out);
        };

        push(root(primary_key));
        for column in columns {
            match column.rsplit_once("__") {
                None => push(root(column)),
                Some((path, name)) => {
                    if !joins.iter().any(|j| j.path == path) {
                        return Err(SchemaError::invalid(format!(
                            "column '{column}' addresses '{path}', which is not joined"
                        ))
                        .into());
                    }
                    push(joined(path, name));
                }
            }
        }
        for join in joins {
            let pk = self.schema.lookup(join.entity)?.primary_key;
            push(joined(&join.path, pk));
        }
        Ok(out)
    }

    fn lookup_target(&self, lookup: &str) -> Result<EntityName> {
        let mut entity = self.model;
        for segment in lookup.split("__") {
            entity = self.schema.relation(entity, segment)?.target;
        }
        Ok(entity)
    }
}

impl QuerySet for Select {
    fn model(&self) -> EntityName {
        self.model
    }

    fn for_entity(&self, entity: EntityName) -> Self {
        Select::new(Arc::clone(&self.schema), entity).dialect(self.dialect)
    }

    fn restrict_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    fn set_joins(mut self, paths: Vec<String>) -> Self {
        self.joins = paths;
        self
    }

    fn joined_paths(&self) -> &[String] {
        &self.joins
    }

    fn set_prefetches(mut self, prefetches: Vec<Prefetch<Self>>) -> Self {
        self.prefetches = prefetches;
        self
    }
}
