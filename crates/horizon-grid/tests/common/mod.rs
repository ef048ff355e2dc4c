//! Shared fixtures for proxy tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use horizon_grid::config::RollupConfig;
use horizon_grid::model::{
    Column, ColumnType, Columns, FilterCondition, GridModel, GridModelEvent, GridModelEventKind,
    SortDescriptor, Value,
};
use horizon_grid::source::{SourceHandle, TableSource, TreeSource};
use horizon_grid::{GridError, Result};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Lets spawned transitions run to their next suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// Columns used by [`StubTable`].
pub fn trade_columns() -> Columns {
    vec![
        Column::new("Sym", ColumnType::String),
        Column::new("Qty", ColumnType::Int),
    ]
    .into()
}

type Reply = oneshot::Sender<Result<SourceHandle>>;

/// A flat table whose derivations wait until the test replies.
///
/// Each `rollup` or `select_distinct` call queues a reply slot; the test
/// answers them in call order with [`resolve_next`](Self::resolve_next) or
/// [`fail_next`](Self::fail_next).
#[derive(Debug)]
pub struct StubTable {
    columns: Columns,
    rows: Vec<Vec<Value>>,
    rollup_available: AtomicBool,
    select_distinct_available: AtomicBool,
    panic_on_rollup: AtomicBool,
    replies: Mutex<VecDeque<Reply>>,
    rollup_calls: AtomicUsize,
    select_distinct_calls: AtomicUsize,
    closes: AtomicUsize,
}

impl StubTable {
    pub fn new() -> Arc<Self> {
        Self::with_columns(trade_columns())
    }

    pub fn with_columns(columns: Columns) -> Arc<Self> {
        let rows = (0..3)
            .map(|i| {
                columns
                    .iter()
                    .map(|c| match c.column_type {
                        ColumnType::Int => Value::Int(i),
                        _ => Value::String(format!("v{i}")),
                    })
                    .collect()
            })
            .collect();
        Arc::new(Self {
            columns,
            rows,
            rollup_available: AtomicBool::new(true),
            select_distinct_available: AtomicBool::new(true),
            panic_on_rollup: AtomicBool::new(false),
            replies: Mutex::new(VecDeque::new()),
            rollup_calls: AtomicUsize::new(0),
            select_distinct_calls: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        })
    }

    pub fn handle(self: &Arc<Self>) -> SourceHandle {
        SourceHandle::Table(self.clone())
    }

    /// The column `Arc` this table hands out.
    pub fn columns_arc(&self) -> Columns {
        self.columns.clone()
    }

    pub fn set_rollup_available(&self, available: bool) {
        self.rollup_available.store(available, Ordering::SeqCst);
    }

    pub fn set_select_distinct_available(&self, available: bool) {
        self.select_distinct_available.store(available, Ordering::SeqCst);
    }

    /// Makes every later `rollup` panic instead of waiting for a reply.
    pub fn set_panic_on_rollup(&self, panic: bool) {
        self.panic_on_rollup.store(panic, Ordering::SeqCst);
    }

    pub fn rollup_calls(&self) -> usize {
        self.rollup_calls.load(Ordering::SeqCst)
    }

    pub fn select_distinct_calls(&self) -> usize {
        self.select_distinct_calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn pending_replies(&self) -> usize {
        self.replies.lock().len()
    }

    /// Answers the oldest outstanding derivation with `source`.
    pub fn resolve_next(&self, source: SourceHandle) {
        let reply = self.replies.lock().pop_front();
        let reply = reply.expect("no derivation is waiting");
        let _ = reply.send(Ok(source));
    }

    /// Answers the newest outstanding derivation with `source`.
    pub fn resolve_last(&self, source: SourceHandle) {
        let reply = self.replies.lock().pop_back();
        let reply = reply.expect("no derivation is waiting");
        let _ = reply.send(Ok(source));
    }

    /// Fails the oldest outstanding derivation.
    pub fn fail_next(&self, message: &str) {
        let reply = self.replies.lock().pop_front();
        let reply = reply.expect("no derivation is waiting");
        let _ = reply.send(Err(GridError::source_failed(message)));
    }

    async fn await_reply(&self) -> Result<SourceHandle> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().push_back(tx);
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(GridError::source_failed("reply dropped")),
        }
    }
}

#[async_trait]
impl TableSource for StubTable {
    fn name(&self) -> &str {
        "stub"
    }

    fn columns(&self) -> Columns {
        self.columns.clone()
    }

    fn size(&self) -> usize {
        self.rows.len()
    }

    fn value(&self, row: usize, column: usize) -> Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or_default()
    }

    fn is_rollup_available(&self) -> bool {
        self.rollup_available.load(Ordering::SeqCst)
    }

    fn is_select_distinct_available(&self) -> bool {
        self.select_distinct_available.load(Ordering::SeqCst)
    }

    async fn rollup(&self, _config: &RollupConfig) -> Result<SourceHandle> {
        self.rollup_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_rollup.load(Ordering::SeqCst) {
            panic!("rollup of {} rows exploded", self.rows.len());
        }
        self.await_reply().await
    }

    async fn select_distinct(&self, _columns: &[String]) -> Result<Arc<dyn TableSource>> {
        self.select_distinct_calls.fetch_add(1, Ordering::SeqCst);
        match self.await_reply().await? {
            SourceHandle::Table(table) => Ok(table),
            other => Err(GridError::source_failed(format!(
                "expected a table, got {}",
                other.name()
            ))),
        }
    }

    async fn filtered(&self, _filters: &[FilterCondition]) -> Result<Arc<dyn TableSource>> {
        Err(GridError::source_failed("stub tables cannot be filtered"))
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closes() > 0
    }
}

/// A hierarchical table that only records how often it was closed.
#[derive(Debug)]
pub struct StubTree {
    name: String,
    columns: Columns,
    closes: AtomicUsize,
}

impl StubTree {
    pub fn new(name: &str, columns: Columns) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            columns,
            closes: AtomicUsize::new(0),
        })
    }

    pub fn handle(self: &Arc<Self>) -> SourceHandle {
        SourceHandle::Tree(self.clone())
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl TreeSource for StubTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn columns(&self) -> Columns {
        self.columns.clone()
    }

    fn size(&self) -> usize {
        2
    }

    fn value(&self, _row: usize, _column: usize) -> Value {
        Value::Null
    }

    fn depth(&self, _row: usize) -> usize {
        0
    }

    fn is_expandable(&self, _row: usize) -> bool {
        true
    }

    fn is_expanded(&self, _row: usize) -> bool {
        false
    }

    fn set_expanded(&self, _row: usize, _expanded: bool, _descendants: bool) {}

    fn expand_all(&self) {}

    fn collapse_all(&self) {}

    fn set_sort(&self, _sort: &[SortDescriptor]) -> Result<()> {
        Ok(())
    }

    fn set_filter(&self, _filter: &[FilterCondition]) -> Result<()> {
        Ok(())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closes() > 0
    }
}

/// Records every event a model emits.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<GridModelEvent>>>,
}

impl EventLog {
    pub fn attach(model: &dyn GridModel) -> Self {
        let log = Self::default();
        let events = log.events.clone();
        model.events().connect(move |event| events.lock().push(event.clone()));
        log
    }

    pub fn kinds(&self) -> Vec<GridModelEventKind> {
        self.events.lock().iter().map(GridModelEvent::kind).collect()
    }

    pub fn events(&self) -> Vec<GridModelEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}
