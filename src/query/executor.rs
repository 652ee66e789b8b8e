//! Read-only execution of generated SQL for a single scalar.
//!
//! Model output is untrusted. Before anything reaches the database the
//! statement must parse as exactly one query; it then runs inside a
//! `READ ONLY` transaction with a `statement_timeout`, optionally behind a
//! planner row estimate, and is wrapped so at most one value comes back.

use std::future::Future;

use diesel::deserialize::{self, QueryableByName};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::row::NamedRow;
use diesel::sql_types::{Nullable, Text};
use serde_json::Value;
use sqlparser::ast::{Query, SetExpr, Statement};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use tracing::debug;

use crate::diesel_runtime::{Database, DbConnection};
use crate::query::QueryError;

/// Runs a statement and returns the first column of its first row as text.
pub trait ScalarExecutor: Send + Sync {
    fn fetch_scalar(
        &self,
        sql: &str,
    ) -> impl Future<Output = Result<Option<String>, QueryError>> + Send;
}

impl<E: ScalarExecutor> ScalarExecutor for &E {
    fn fetch_scalar(
        &self,
        sql: &str,
    ) -> impl Future<Output = Result<Option<String>, QueryError>> + Send {
        (**self).fetch_scalar(sql)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorLimits {
    pub statement_timeout_ms: u64,
    /// Reject statements the planner expects to scan more rows than this
    pub max_scan_rows: Option<u64>,
}

impl Default for ExecutorLimits {
    fn default() -> Self {
        Self {
            statement_timeout_ms: 10_000,
            max_scan_rows: None,
        }
    }
}

/// Accept exactly one plain query (`SELECT`, `WITH`, `VALUES`, set operations).
///
/// Returns the parsed statement; its `Display` rendering carries no trailing
/// semicolon or comments.
pub fn validate_statement(sql: &str) -> Result<Statement, QueryError> {
    let mut statements = Parser::parse_sql(&PostgreSqlDialect {}, sql)
        .map_err(|e| QueryError::Rejected(e.to_string()))?;

    let statement = match (statements.pop(), statements.is_empty()) {
        (Some(statement), true) => statement,
        (None, _) => return Err(QueryError::Rejected("empty statement".to_string())),
        (Some(_), false) => {
            return Err(QueryError::Rejected(format!(
                "expected one statement, found {}",
                statements.len() + 1
            )))
        }
    };

    match &statement {
        Statement::Query(query) => check_query(query)?,
        _ => return Err(QueryError::Rejected("only queries are allowed".to_string())),
    }
    Ok(statement)
}

fn check_query(query: &Query) -> Result<(), QueryError> {
    if !query.locks.is_empty() {
        return Err(QueryError::Rejected("locking clauses are not allowed".to_string()));
    }
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            check_query(&cte.query)?;
        }
    }
    check_set_expr(&query.body)
}

fn check_set_expr(expr: &SetExpr) -> Result<(), QueryError> {
    match expr {
        SetExpr::Select(select) if select.into.is_some() => {
            Err(QueryError::Rejected("SELECT INTO is not allowed".to_string()))
        }
        SetExpr::Select(_) | SetExpr::Values(_) | SetExpr::Table(_) => Ok(()),
        SetExpr::Query(query) => check_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            check_set_expr(left)?;
            check_set_expr(right)
        }
        _ => Err(QueryError::Rejected(
            "data-modifying statements are not allowed".to_string(),
        )),
    }
}

#[derive(QueryableByName)]
struct ScalarRow {
    #[diesel(sql_type = Nullable<Text>)]
    value: Option<String>,
}

/// Single-row output of `EXPLAIN (FORMAT JSON)`.
struct QueryPlan {
    plan: String,
}

impl QueryableByName<Pg> for QueryPlan {
    fn build<'a>(row: &impl NamedRow<'a, Pg>) -> deserialize::Result<Self> {
        let plan = NamedRow::get::<Text, String>(row, "QUERY PLAN")?;
        Ok(Self { plan })
    }
}

/// Sum of `Plan Rows` over every scan node in an `EXPLAIN (FORMAT JSON)` tree.
fn scan_rows(node: &Value) -> f64 {
    let own = match (
        node.get("Node Type").and_then(Value::as_str),
        node.get("Plan Rows").and_then(Value::as_f64),
    ) {
        (Some(kind), Some(rows)) if kind.contains("Scan") => rows,
        _ => 0.0,
    };

    let children: f64 = node
        .get("Plans")
        .and_then(Value::as_array)
        .map(|plans| plans.iter().map(scan_rows).sum())
        .unwrap_or(0.0);

    own + children
}

fn estimate_scan_rows(conn: &mut DbConnection, statement: &str) -> Result<f64, QueryError> {
    let explained = diesel::sql_query(format!("EXPLAIN (FORMAT JSON) {}", statement))
        .get_result::<QueryPlan>(conn)?;
    let plan: Value = serde_json::from_str(&explained.plan)
        .map_err(|e| QueryError::Rejected(format!("unreadable query plan: {}", e)))?;

    Ok(plan
        .as_array()
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("Plan"))
        .map(scan_rows)
        .unwrap_or(0.0))
}

/// First column of the first row, as text.
fn scalar_query(statement: &str) -> String {
    format!(
        "SELECT CAST(scalar_source.v AS TEXT) AS value FROM (\n{}\n) AS scalar_source(v) LIMIT 1",
        statement
    )
}

fn run_scalar(
    db: &Database,
    statement: &str,
    limits: ExecutorLimits,
) -> Result<Option<String>, QueryError> {
    let mut conn = db.get_connection()?;

    conn.build_transaction()
        .read_only()
        .run::<_, QueryError, _>(|conn| {
            diesel::sql_query(format!(
                "SET LOCAL statement_timeout = {}",
                limits.statement_timeout_ms
            ))
            .execute(conn)?;

            if let Some(limit) = limits.max_scan_rows {
                let estimated = estimate_scan_rows(conn, statement)?;
                debug!("Planner estimates {:.0} scanned rows", estimated);
                if estimated > limit as f64 {
                    return Err(QueryError::ScanLimit { estimated, limit });
                }
            }

            let row = diesel::sql_query(scalar_query(statement))
                .get_result::<ScalarRow>(conn)
            .optional()?;

            Ok(row.and_then(|r| r.value))
        })
}

/// [`ScalarExecutor`] over the shared PostgreSQL pool.
#[derive(Clone)]
pub struct PgExecutor {
    db: Database,
    limits: ExecutorLimits,
}

impl PgExecutor {
    pub fn new(db: Database, limits: ExecutorLimits) -> Self {
        Self { db, limits }
    }
}

impl ScalarExecutor for PgExecutor {
    async fn fetch_scalar(&self, sql: &str) -> Result<Option<String>, QueryError> {
        let statement = validate_statement(sql)?.to_string();
        let db = self.db.clone();
        let limits = self.limits;

        tokio::task::spawn_blocking(move || run_scalar(&db, &statement, limits))
            .await
            .map_err(|e| QueryError::Store(e.into()))?
    }
}
