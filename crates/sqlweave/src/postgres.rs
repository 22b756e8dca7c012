//! tokio-postgres driver.
//!
//! [`PgDriver`] owns one `tokio_postgres::Client`. Statements outside a transaction share
//! the connection freely; an open transaction takes it exclusively until it finishes, so
//! autocommit statements never leak into someone else's `BEGIN`.
//!
//! A statement run on the driver (or a `Db` over it) from the task that holds the open
//! transaction would wait on itself forever, so it fails with [`SqlError::Driver`]
//! instead. Run it on the transaction. Only spawned tasks can be told apart this way;
//! from a runtime's `block_on` future the statement still waits.

use crate::driver::{Driver, TxOptions};
use crate::error::{SqlError, SqlResult};
use crate::value::Value;
use bytes::BytesMut;
use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, RwLockReadGuard};
use tokio::task;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row, Statement};

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            // Integers are stored as i64; narrow to the column's width.
            Value::Int(v) => match *ty {
                Type::CHAR => i8::try_from(*v)?.to_sql(ty, out),
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Text(v) => v.to_sql(ty, out),
            Value::Bytes(v) => v.to_sql(ty, out),
            Value::Timestamp(v) => match *ty {
                Type::TIMESTAMP => v.naive_utc().to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            Value::Date(v) => v.to_sql(ty, out),
            Value::Uuid(v) => v.to_sql(ty, out),
            Value::Json(v) => v.to_sql(ty, out),
            Value::Array(items) => match ty.kind() {
                Kind::Array(_) => items.to_sql(ty, out),
                _ => Err(format!("cannot bind an array to a {ty} parameter").into()),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

fn bind(params: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}

fn begin_sql(options: &TxOptions) -> String {
    let mut modes = Vec::new();
    if let Some(level) = options.isolation {
        modes.push(format!("ISOLATION LEVEL {}", level.as_sql()));
    }
    if options.read_only {
        modes.push("READ ONLY".to_string());
    }
    if options.deferrable {
        modes.push("DEFERRABLE".to_string());
    }

    if modes.is_empty() {
        "BEGIN".to_string()
    } else {
        format!("BEGIN {}", modes.join(", "))
    }
}

/// Whether `err` reports a server-side prepared statement that can no longer be used.
pub fn is_stale_statement_error(err: &SqlError) -> bool {
    let SqlError::Postgres(e) = err else {
        return false;
    };
    let Some(db_err) = e.as_db_error() else {
        return false;
    };

    match db_err.code().code() {
        // feature_not_supported, raised after a schema change
        "0A000" => db_err
            .message()
            .to_ascii_lowercase()
            .contains("cached plan must not change result type"),
        // invalid_sql_statement_name
        "26000" => true,
        _ => false,
    }
}

/// Shared or exclusive use of the connection. Remembers which task holds it exclusively.
struct ConnectionGate {
    lock: Arc<RwLock<()>>,
    owner: Arc<Mutex<Option<task::Id>>>,
}

struct ExclusiveGuard {
    owner: Arc<Mutex<Option<task::Id>>>,
    _guard: OwnedRwLockWriteGuard<()>,
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl ConnectionGate {
    fn new() -> Self {
        Self {
            lock: Arc::new(RwLock::new(())),
            owner: Arc::new(Mutex::new(None)),
        }
    }

    async fn shared(&self) -> SqlResult<RwLockReadGuard<'_, ()>> {
        if let Ok(guard) = self.lock.try_read() {
            return Ok(guard);
        }
        let owner = *self.owner.lock().unwrap_or_else(PoisonError::into_inner);
        if owner.is_some() && owner == task::try_id() {
            return Err(SqlError::driver(
                "connection is held by a transaction opened on this task; run the statement on the transaction",
            ));
        }
        Ok(self.lock.read().await)
    }

    async fn exclusive(&self) -> ExclusiveGuard {
        let guard = Arc::clone(&self.lock).write_owned().await;
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner) = task::try_id();
        ExclusiveGuard {
            owner: Arc::clone(&self.owner),
            _guard: guard,
        }
    }
}

/// Driver over a single tokio-postgres connection.
pub struct PgDriver {
    client: Arc<Client>,
    gate: ConnectionGate,
}

impl PgDriver {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
            gate: ConnectionGate::new(),
        }
    }

    /// Connect without TLS and drive the connection on a background task.
    pub async fn connect(database_url: &str) -> SqlResult<Self> {
        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                #[cfg(feature = "tracing")]
                tracing::error!(target: "sqlweave.sql", error = %err, "postgres connection closed");
                #[cfg(not(feature = "tracing"))]
                let _ = err;
            }
        });
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// An open transaction; holds the connection exclusively.
pub struct PgTransaction {
    client: Arc<Client>,
    guard: Option<ExclusiveGuard>,
}

impl PgTransaction {
    async fn finish(&mut self, sql: &str) -> SqlResult<()> {
        let result = self.client.batch_execute(sql).await;
        self.guard.take();
        Ok(result?)
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        // Abandoned mid-transaction: roll back before releasing the connection.
        let Some(guard) = self.guard.take() else {
            return;
        };
        let client = Arc::clone(&self.client);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = client.batch_execute("ROLLBACK").await;
                drop(guard);
            });
        }
    }
}

impl Driver for PgDriver {
    type Statement = Statement;
    type Row = Row;
    type Transaction = PgTransaction;

    fn name(&self) -> &str {
        "postgres"
    }

    async fn prepare(&self, sql: &str) -> SqlResult<Statement> {
        let _shared = self.gate.shared().await?;
        Ok(self.client.prepare(sql).await?)
    }

    async fn execute(&self, stmt: &Statement, params: &[Value]) -> SqlResult<u64> {
        let _shared = self.gate.shared().await?;
        Ok(self.client.execute(stmt, &bind(params)).await?)
    }

    async fn query(&self, stmt: &Statement, params: &[Value]) -> SqlResult<Vec<Row>> {
        let _shared = self.gate.shared().await?;
        Ok(self.client.query(stmt, &bind(params)).await?)
    }

    fn close_statement(&self, _stmt: &Statement) {
        // Dropping the last `Statement` clone closes it on the server.
    }

    async fn begin(&self, options: &TxOptions) -> SqlResult<PgTransaction> {
        let guard = self.gate.exclusive().await;
        self.client.batch_execute(&begin_sql(options)).await?;
        Ok(PgTransaction {
            client: Arc::clone(&self.client),
            guard: Some(guard),
        })
    }

    async fn execute_in(&self, tx: &mut PgTransaction, sql: &str, params: &[Value]) -> SqlResult<u64> {
        Ok(tx.client.execute(sql, &bind(params)).await?)
    }

    async fn query_in(
        &self,
        tx: &mut PgTransaction,
        sql: &str,
        params: &[Value],
    ) -> SqlResult<Vec<Row>> {
        Ok(tx.client.query(sql, &bind(params)).await?)
    }

    async fn commit(&self, mut tx: PgTransaction) -> SqlResult<()> {
        tx.finish("COMMIT").await
    }

    async fn rollback(&self, mut tx: PgTransaction) -> SqlResult<()> {
        tx.finish("ROLLBACK").await
    }

    fn is_stale_statement(&self, err: &SqlError) -> bool {
        is_stale_statement_error(err)
    }
}
