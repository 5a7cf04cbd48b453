//! PostgreSQL backend.
//!
//! Built on tokio-postgres: each opened handle owns a `Client` plus a
//! spawned task driving the wire connection. Statements are prepared first
//! so arguments can be coerced to the parameter types the server expects,
//! and so empty result sets still carry column metadata.
//!
//! `last_insert_id` is always -1: the PostgreSQL protocol has no
//! last-inserted-identity channel (callers use `RETURNING`).

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Row as PgRow, Statement};
use tracing::{debug, info};

use sqlgrid_pool::{Driver, Dsn, Handle, PoolError, PoolResult, QueryResult, StatementResult};

/// Driver for `postgres://` / `postgresql://` / `pg://` DSNs.
#[derive(Debug, Default)]
pub struct PostgresDriver;

impl PostgresDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn open(&self, dsn: &Dsn) -> PoolResult<Box<dyn Handle>> {
        let mut config = tokio_postgres::Config::new();
        config.host(if dsn.host().is_empty() {
            "localhost"
        } else {
            dsn.host()
        });
        config.port(dsn.port().unwrap_or(5432));
        if !dsn.database_name().is_empty() {
            config.dbname(dsn.database_name());
        }
        if let Some(user) = dsn.user() {
            config.user(user);
        }
        if let Some(password) = dsn.password() {
            config.password(password);
        }
        if let Some(name) = dsn.option("application_name") {
            config.application_name(name);
        }

        info!(host = dsn.host(), database = dsn.database_name(), "connecting to PostgreSQL");
        let (client, connection) = config
            .connect(NoTls)
            .await
            .map_err(|e| PoolError::Open(e.to_string()))?;

        // Drive the wire connection until the client is dropped.
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!(error = %err, "postgres connection task ended");
            }
        });

        Ok(Box::new(PostgresHandle {
            client: RwLock::new(Some(client)),
        }))
    }
}

/// An open PostgreSQL session. The client is taken out of the option on
/// close, which also ends the background connection task.
struct PostgresHandle {
    client: RwLock<Option<Client>>,
}

#[async_trait]
impl Handle for PostgresHandle {
    async fn ping(&self) -> PoolResult<()> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(PoolError::Closed)?;
        client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| PoolError::Unreachable(e.to_string()))
    }

    async fn query(&self, sql: &str, args: &[serde_json::Value]) -> PoolResult<QueryResult> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(PoolError::Closed)?;

        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| PoolError::Query(e.to_string()))?;

        let params = bind_args(&statement, args)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| PoolError::Query(e.to_string()))?;

        let (columns, column_types) = column_metadata(&statement)?;

        let mut rows = Vec::with_capacity(pg_rows.len());
        for pg_row in &pg_rows {
            let mut values = Vec::with_capacity(columns.len());
            for idx in 0..columns.len() {
                values.push(decode_cell(pg_row, idx)?);
            }
            rows.push(values);
        }

        Ok(QueryResult {
            columns,
            column_types,
            rows,
        })
    }

    async fn exec(&self, sql: &str, args: &[serde_json::Value]) -> PoolResult<StatementResult> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or(PoolError::Closed)?;

        let statement = client
            .prepare(sql)
            .await
            .map_err(|e| PoolError::Statement(e.to_string()))?;

        let params = bind_args(&statement, args)?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let rows_affected = client
            .execute(&statement, &param_refs)
            .await
            .map_err(|e| PoolError::Statement(e.to_string()))?;

        Ok(StatementResult {
            rows_affected: rows_affected as i64,
            last_insert_id: -1,
        })
    }

    async fn close(&self) -> PoolResult<()> {
        // Dropping the client hangs up the session and stops the
        // connection task.
        self.client.write().await.take();
        Ok(())
    }
}

fn column_metadata(statement: &Statement) -> PoolResult<(Vec<String>, Vec<String>)> {
    let mut columns = Vec::with_capacity(statement.columns().len());
    let mut column_types = Vec::with_capacity(statement.columns().len());
    for col in statement.columns() {
        columns.push(col.name().to_string());
        column_types.push(col.type_().name().to_uppercase());
    }
    Ok((columns, column_types))
}

/// Coerce JSON arguments to the parameter types the prepared statement
/// expects. Unknown target types fall back to the argument's text form.
fn bind_args(
    statement: &Statement,
    args: &[serde_json::Value],
) -> PoolResult<Vec<Box<dyn ToSql + Sync + Send>>> {
    let param_types = statement.params();
    args.iter()
        .enumerate()
        .map(|(i, value)| bind_arg(value, param_types.get(i)))
        .collect()
}

fn bind_arg(
    value: &serde_json::Value,
    target: Option<&Type>,
) -> PoolResult<Box<dyn ToSql + Sync + Send>> {
    use serde_json::Value as Json;

    if value.is_null() {
        return Ok(Box::new(Option::<String>::None));
    }

    let target_name = target.map(Type::name).unwrap_or("");
    let boxed: Box<dyn ToSql + Sync + Send> = match (value, target_name) {
        (other, "json" | "jsonb") => Box::new(other.clone()),
        (Json::Bool(b), _) => Box::new(*b),
        (Json::Number(n), "int2") => Box::new(coerce_i64(n)? as i16),
        (Json::Number(n), "int4") => Box::new(coerce_i64(n)? as i32),
        (Json::Number(n), "int8") => Box::new(coerce_i64(n)?),
        (Json::Number(n), "float4") => Box::new(coerce_f64(n) as f32),
        (Json::Number(n), "float8") => Box::new(coerce_f64(n)),
        (Json::Number(n), _) => {
            if let Some(i) = n.as_i64() {
                Box::new(i)
            } else {
                Box::new(coerce_f64(n))
            }
        }
        (Json::String(s), "int2") => Box::new(parse_number::<i16>(s)?),
        (Json::String(s), "int4") => Box::new(parse_number::<i32>(s)?),
        (Json::String(s), "int8") => Box::new(parse_number::<i64>(s)?),
        (Json::String(s), "float4") => Box::new(parse_number::<f32>(s)?),
        (Json::String(s), "float8") => Box::new(parse_number::<f64>(s)?),
        (Json::String(s), "bool") => Box::new(parse_number::<bool>(s)?),
        (Json::String(s), _) => Box::new(s.clone()),
        (other, _) => Box::new(other.to_string()),
    };
    Ok(boxed)
}

fn coerce_i64(n: &serde_json::Number) -> PoolResult<i64> {
    n.as_i64()
        .ok_or_else(|| PoolError::Query(format!("argument {n} is not an integer")))
}

fn coerce_f64(n: &serde_json::Number) -> f64 {
    n.as_f64().unwrap_or_default()
}

fn parse_number<T: std::str::FromStr>(s: &str) -> PoolResult<T> {
    s.parse()
        .map_err(|_| PoolError::Query(format!("argument {s:?} does not fit the parameter type")))
}

/// Decode one result cell to its JSON transport form, keyed off the
/// column's wire type. `bytea` converts to text; unsupported types fail
/// the row decode rather than silently dropping data.
fn decode_cell(row: &PgRow, idx: usize) -> PoolResult<serde_json::Value> {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "bool" => json_from(row.try_get::<_, Option<bool>>(idx))?,
        "int2" => json_from(row.try_get::<_, Option<i16>>(idx))?,
        "int4" => json_from(row.try_get::<_, Option<i32>>(idx))?,
        "int8" => json_from(row.try_get::<_, Option<i64>>(idx))?,
        "float4" => float_json(row.try_get::<_, Option<f32>>(idx).map(|v| v.map(f64::from)))?,
        "float8" => float_json(row.try_get::<_, Option<f64>>(idx))?,
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| match v {
                Some(bytes) => {
                    serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                None => serde_json::Value::Null,
            })
            .map_err(|e| PoolError::RowDecode(e.to_string()))?,
        "json" | "jsonb" => row
            .try_get::<_, Option<serde_json::Value>>(idx)
            .map(|v| v.unwrap_or(serde_json::Value::Null))
            .map_err(|e| PoolError::RowDecode(e.to_string()))?,
        _ => json_from(row.try_get::<_, Option<String>>(idx))?,
    };
    Ok(value)
}

fn json_from<T: Into<serde_json::Value>>(
    result: Result<Option<T>, tokio_postgres::Error>,
) -> PoolResult<serde_json::Value> {
    result
        .map(|v| v.map(Into::into).unwrap_or(serde_json::Value::Null))
        .map_err(|e| PoolError::RowDecode(e.to_string()))
}

fn float_json(
    result: Result<Option<f64>, tokio_postgres::Error>,
) -> PoolResult<serde_json::Value> {
    result
        .map(|v| {
            v.and_then(serde_json::Number::from_f64)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null)
        })
        .map_err(|e| PoolError::RowDecode(e.to_string()))
}
