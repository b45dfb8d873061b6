//! A scripted in-memory driver that records every call.

#![allow(dead_code)]

use sqlmapper_core::error::{BatchUpdateError, QueryError, QueryErrorKind};
use sqlmapper_core::{ColumnInfo, Connection, Error, Result, Row, Statement, StatementOptions, Value};
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

/// Produces `(column names, rows)` for a query.
pub type Responder = Rc<dyn Fn(&str, &[Value]) -> (Vec<String>, Vec<Vec<Value>>)>;

#[derive(Debug, Default)]
pub struct MockState {
    pub prepared: Vec<String>,
    pub queries: Vec<(String, Vec<Value>)>,
    pub updates: Vec<(String, Vec<Value>)>,
    /// `(sql, items)` per executed batch.
    pub batches: Vec<(String, usize)>,
    pub commits: usize,
    pub rollbacks: usize,
    pub statements_closed: usize,
    pub rows_fetched: usize,
    pub failing: HashSet<String>,
    pub next_key: i64,
    pub connection_closed: bool,
}

impl MockState {
    pub fn open_statements(&self) -> usize {
        self.prepared.len() - self.statements_closed
    }

    pub fn round_trips(&self) -> usize {
        self.queries.len()
    }
}

pub struct MockConnection {
    pub state: Rc<RefCell<MockState>>,
    responder: Responder,
}

impl MockConnection {
    pub fn new(responder: impl Fn(&str, &[Value]) -> (Vec<String>, Vec<Vec<Value>>) + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState::default())),
            responder: Rc::new(responder),
        }
    }

    /// Answers every query with one `(id, name)` row echoing the first
    /// parameter.
    pub fn echo() -> Self {
        Self::new(|_, params| {
            let id = params.first().cloned().unwrap_or(Value::BigInt(0));
            let name = Value::Text(format!("user-{}", id));
            (vec!["id".into(), "name".into()], vec![vec![id, name]])
        })
    }

    pub fn state(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }

    /// Make every execution of `sql` fail.
    pub fn fail_on(&self, sql: &str) {
        self.state.borrow_mut().failing.insert(sql.to_string());
    }
}

fn driver_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Constraint,
        sql: None,
        statement_id: None,
        message: format!("scripted failure for {}", sql),
        source: None,
    })
}

impl Connection for MockConnection {
    type Statement = MockStatement;

    fn prepare(&mut self, sql: &str, _options: &StatementOptions) -> Result<MockStatement> {
        self.state.borrow_mut().prepared.push(sql.to_string());
        Ok(MockStatement {
            sql: sql.to_string(),
            state: Rc::clone(&self.state),
            responder: Rc::clone(&self.responder),
            params: Vec::new(),
            queued: Vec::new(),
            rows: VecDeque::new(),
            keys: Vec::new(),
            closed: false,
        })
    }

    fn commit(&mut self) -> Result<()> {
        self.state.borrow_mut().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.state.borrow_mut().rollbacks += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state.borrow_mut().connection_closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.borrow().connection_closed
    }
}

pub struct MockStatement {
    sql: String,
    state: Rc<RefCell<MockState>>,
    responder: Responder,
    params: Vec<Value>,
    queued: Vec<Vec<Value>>,
    rows: VecDeque<Row>,
    keys: Vec<Value>,
    closed: bool,
}

impl MockStatement {
    fn fails(&self) -> bool {
        self.state.borrow().failing.contains(&self.sql)
    }

    fn next_key(&self) -> Value {
        let mut state = self.state.borrow_mut();
        state.next_key += 1;
        Value::BigInt(state.next_key)
    }
}

impl Statement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&mut self, params: &[Value]) -> Result<()> {
        self.params = params.to_vec();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<u64> {
        if self.fails() {
            return Err(driver_error(&self.sql));
        }
        self.state
            .borrow_mut()
            .updates
            .push((self.sql.clone(), self.params.clone()));
        let key = self.next_key();
        self.keys = vec![key];
        Ok(1)
    }

    fn execute_query(&mut self) -> Result<Arc<ColumnInfo>> {
        if self.fails() {
            return Err(driver_error(&self.sql));
        }
        self.state
            .borrow_mut()
            .queries
            .push((self.sql.clone(), self.params.clone()));
        let (names, rows) = (self.responder)(&self.sql, &self.params);
        let columns = Arc::new(ColumnInfo::new(names));
        self.rows = rows
            .into_iter()
            .map(|values| Row::with_columns(Arc::clone(&columns), values))
            .collect();
        Ok(columns)
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.rows.pop_front();
        if row.is_some() {
            self.state.borrow_mut().rows_fetched += 1;
        }
        Ok(row)
    }

    fn add_batch(&mut self) -> Result<()> {
        self.queued.push(self.params.clone());
        Ok(())
    }

    fn execute_batch(&mut self) -> std::result::Result<Vec<u64>, BatchUpdateError> {
        if self.fails() {
            self.queued.clear();
            return Err(driver_error(&self.sql).into());
        }
        let items = std::mem::take(&mut self.queued);
        let keys: Vec<Value> = items.iter().map(|_| self.next_key()).collect();
        self.keys = keys;
        self.state
            .borrow_mut()
            .batches
            .push((self.sql.clone(), items.len()));
        Ok(vec![1; items.len()])
    }

    fn generated_keys(&self) -> Vec<Value> {
        self.keys.clone()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.state.borrow_mut().statements_closed += 1;
        }
        Ok(())
    }
}

impl Drop for MockStatement {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
