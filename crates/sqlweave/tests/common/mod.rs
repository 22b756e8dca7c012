//! In-memory driver that records every call.

#![allow(dead_code)]

use sqlweave::{Driver, FromRow, SqlError, SqlResult, TxOptions, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Prepare(String),
    Execute(String, Vec<Value>),
    Query(String, Vec<Value>),
    Close(String),
    Begin(TxOptions),
    ExecuteIn(u64, String, Vec<Value>),
    QueryIn(u64, String, Vec<Value>),
    Commit(u64),
    Rollback(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct MockRow(pub Vec<(String, Value)>);

impl MockRow {
    pub fn new<const N: usize>(columns: [(&str, Value); N]) -> Self {
        Self(
            columns
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    pub fn get(&self, column: &str) -> SqlResult<&Value> {
        self.0
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v)
            .ok_or_else(|| SqlError::decode(column, "no such column"))
    }
}

#[derive(Debug, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl FromRow<MockRow> for User {
    fn from_row(row: &MockRow) -> SqlResult<Self> {
        let id = match row.get("id")? {
            Value::Int(v) => *v,
            other => return Err(SqlError::decode("id", format!("expected int, got {}", other.kind()))),
        };
        let name = match row.get("name")? {
            Value::Text(v) => v.clone(),
            other => {
                return Err(SqlError::decode("name", format!("expected text, got {}", other.kind())));
            }
        };
        Ok(User { id, name })
    }
}

pub struct MockTx(pub u64);

pub struct RecordingDriver {
    name: &'static str,
    events: Mutex<Vec<Event>>,
    results: Mutex<VecDeque<Vec<MockRow>>>,
    next_tx: AtomicU64,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
}

impl RecordingDriver {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            events: Mutex::new(Vec::new()),
            results: Mutex::new(VecDeque::new()),
            next_tx: AtomicU64::new(1),
            fail_commit: AtomicBool::new(false),
            fail_rollback: AtomicBool::new(false),
        }
    }

    /// Queue the rows returned by the next query.
    pub fn push_rows(&self, rows: Vec<MockRow>) {
        self.results.lock().unwrap().push_back(rows);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().unwrap().iter().filter(|e| pred(e)).count()
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    fn next_rows(&self) -> Vec<MockRow> {
        self.results.lock().unwrap().pop_front().unwrap_or_default()
    }
}

impl Driver for RecordingDriver {
    type Statement = String;
    type Row = MockRow;
    type Transaction = MockTx;

    fn name(&self) -> &str {
        self.name
    }

    async fn prepare(&self, sql: &str) -> SqlResult<String> {
        self.record(Event::Prepare(sql.to_string()));
        Ok(sql.to_string())
    }

    async fn execute(&self, stmt: &String, params: &[Value]) -> SqlResult<u64> {
        self.record(Event::Execute(stmt.clone(), params.to_vec()));
        Ok(1)
    }

    async fn query(&self, stmt: &String, params: &[Value]) -> SqlResult<Vec<MockRow>> {
        self.record(Event::Query(stmt.clone(), params.to_vec()));
        Ok(self.next_rows())
    }

    fn close_statement(&self, stmt: &String) {
        self.record(Event::Close(stmt.clone()));
    }

    async fn begin(&self, options: &TxOptions) -> SqlResult<MockTx> {
        self.record(Event::Begin(*options));
        Ok(MockTx(self.next_tx.fetch_add(1, Ordering::SeqCst)))
    }

    async fn execute_in(&self, tx: &mut MockTx, sql: &str, params: &[Value]) -> SqlResult<u64> {
        self.record(Event::ExecuteIn(tx.0, sql.to_string(), params.to_vec()));
        Ok(1)
    }

    async fn query_in(
        &self,
        tx: &mut MockTx,
        sql: &str,
        params: &[Value],
    ) -> SqlResult<Vec<MockRow>> {
        self.record(Event::QueryIn(tx.0, sql.to_string(), params.to_vec()));
        Ok(self.next_rows())
    }

    async fn commit(&self, tx: MockTx) -> SqlResult<()> {
        self.record(Event::Commit(tx.0));
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(SqlError::driver("serialization failure"));
        }
        Ok(())
    }

    async fn rollback(&self, tx: MockTx) -> SqlResult<()> {
        self.record(Event::Rollback(tx.0));
        if self.fail_rollback.load(Ordering::SeqCst) {
            return Err(SqlError::driver("connection reset"));
        }
        Ok(())
    }
}
