//! Grid model proxy.
//!
//! [`GridModelProxy`] presents one stable grid model while the backing model
//! underneath is replaced in response to rollup, partition and select-distinct
//! changes.
//!
//! # Transformations
//!
//! Every transformation is derived from the *original* model, never chained
//! onto an already transformed one. A setter validates the request, records
//! the new configuration, then starts a [`CancelableTransition`] that derives
//! a source and builds a model through the [`ModelFactory`]. Starting a
//! transition cancels the previous one, so a superseded build can never
//! overwrite a later one; its model is disposed instead.
//!
//! # Swapping
//!
//! When a transition completes, the proxy:
//!
//! 1. replaces the active model, closing the old one unless it is the original
//! 2. moves its event relay to the new model if anyone is listening
//! 3. emits [`GridModelEvent::ColumnsChanged`] if the columns differ by
//!    identity, otherwise reapplies the last viewport
//! 4. emits [`GridModelEvent::TableChanged`] if the new model is table backed
//!
//! A failed transition leaves the active model in place and emits
//! [`GridModelEvent::RequestFailed`].
//!
//! # Example
//!
//! ```no_run
//! use horizon_grid::config::RollupConfig;
//! use horizon_grid::model::{GridModel, GridModelProxy};
//! use horizon_grid::source::memory::MemoryTable;
//! # fn source() -> MemoryTable { unimplemented!() }
//!
//! # async fn run() -> horizon_grid::Result<()> {
//! let proxy = GridModelProxy::new(source().into_handle())?;
//! proxy.events().connect(|event| println!("{event:?}"));
//! proxy.set_rollup_config(Some(RollupConfig::group_by(["Sym"])))?;
//! # Ok(())
//! # }
//! ```

use std::mem;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{self, BoxFuture};
use horizon_grid_core::logging::{span_names, targets};
use horizon_grid_core::{AsyncRuntime, ConnectionId, PerfSpan};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::events::{GridEvents, GridModelEvent};
use super::factory::{ModelFactory, default_factory};
use super::formatter::Formatter;
use super::traits::{
    DeletableGridModel, EditableGridModel, ExpandableGridModel, GridModel, ModelHandle,
    PartitionedGridModelProvider, TableBackedGridModel,
};
use super::transition::CancelableTransition;
use super::value::{
    CellAlignment, CellColor, CellEdit, Column, ColumnStatistics, ColumnType, Columns,
    ExportOptions, FilterCondition, GridRange, SortDescriptor, Value, Viewport,
};
use crate::config::{GridSettings, PartitionConfig, PartitionMode, RollupConfig, TransformState};
use crate::error::{GridError, Result};
use crate::source::{InputTable, SourceHandle, TableSource};

const ROLLUP_NOT_AVAILABLE: &str = "Rollup not available";
const PARTITIONS_NOT_AVAILABLE: &str = "Partitions are not available";
const SELECT_DISTINCT_NOT_AVAILABLE: &str = "Select distinct not available";

/// How the next model is obtained.
enum Derivation {
    /// Switch back to the original model.
    Original,
    /// Build a model from a derived source.
    Source(BoxFuture<'static, Result<SourceHandle>>),
}

enum Phase {
    Idle,
    Transitioning {
        id: u64,
        transition: CancelableTransition<ModelHandle>,
    },
}

struct ProxyState {
    active: ModelHandle,
    phase: Phase,
    rollup_config: Option<RollupConfig>,
    partition_config: Option<PartitionConfig>,
    select_distinct_columns: Vec<String>,
    viewport: Option<Viewport>,
    /// Relay connection on the active model's events.
    relay: Option<ConnectionId>,
    next_transition_id: u64,
    closed: bool,
}

struct ProxyInner {
    original: ModelHandle,
    state: Mutex<ProxyState>,
    events: GridEvents,
    runtime: Handle,
    factory: ModelFactory,
}

/// A grid model that forwards to a swappable backing model.
///
/// Cloning yields another handle to the same proxy.
#[derive(Clone)]
pub struct GridModelProxy {
    inner: Arc<ProxyInner>,
}

impl GridModelProxy {
    /// Creates a proxy over `source` with default settings.
    ///
    /// Transitions run on the ambient tokio runtime, or the global runtime
    /// when called outside one.
    pub fn new(source: SourceHandle) -> Result<Self> {
        GridModelProxyBuilder::new(source).build()
    }

    /// Starts building a proxy over `source`.
    pub fn builder(source: SourceHandle) -> GridModelProxyBuilder {
        GridModelProxyBuilder::new(source)
    }

    /// The model built directly from the caller's source.
    pub fn original_model(&self) -> ModelHandle {
        self.inner.original.clone()
    }

    /// The model currently forwarded to.
    pub fn active_model(&self) -> ModelHandle {
        self.inner.active()
    }

    /// Whether a transition is in flight.
    pub fn is_transition_pending(&self) -> bool {
        matches!(self.inner.state.lock().phase, Phase::Transitioning { .. })
    }

    pub fn rollup_config(&self) -> Option<RollupConfig> {
        self.inner.state.lock().rollup_config.clone()
    }

    /// Rolls the original table up, or switches back to it with `None`.
    ///
    /// Fails with [`GridError::ConfigurationRejected`] while rollup is not
    /// available.
    pub fn set_rollup_config(&self, config: Option<RollupConfig>) -> Result<()> {
        let mut state = self.inner.state.lock();
        self.inner.check_open(&state)?;
        if !self.inner.rollup_available(&state) {
            return Err(GridError::ConfigurationRejected(ROLLUP_NOT_AVAILABLE));
        }
        if state.rollup_config == config {
            tracing::trace!(target: targets::PROXY, "rollup config unchanged");
            return Ok(());
        }
        tracing::debug!(target: targets::PROXY, rollup = ?config, "setting rollup config");
        state.rollup_config = config.clone();
        let derivation = match config {
            Some(config) => self.inner.rollup(config),
            None => Derivation::Original,
        };
        self.inner.start_transition(&mut state, derivation);
        Ok(())
    }

    /// The partition selection; always `None` unless a partition is required.
    pub fn partition_config(&self) -> Option<PartitionConfig> {
        if !self.inner.partition_required() {
            return None;
        }
        self.inner.state.lock().partition_config.clone()
    }

    /// Selects a partition view of the original model.
    ///
    /// Fails with [`GridError::ConfigurationRejected`] unless the original
    /// model requires a partition.
    pub fn set_partition_config(&self, config: Option<PartitionConfig>) -> Result<()> {
        let mut state = self.inner.state.lock();
        self.inner.check_open(&state)?;
        if !self.inner.partition_required() {
            return Err(GridError::ConfigurationRejected(PARTITIONS_NOT_AVAILABLE));
        }
        if state.partition_config == config {
            tracing::trace!(target: targets::PROXY, "partition config unchanged");
            return Ok(());
        }
        tracing::debug!(target: targets::PROXY, partition = ?config, "setting partition config");
        state.partition_config = config.clone();
        let derivation = match config {
            Some(config) => self.inner.partition(config),
            None => Derivation::Original,
        };
        self.inner.start_transition(&mut state, derivation);
        Ok(())
    }

    pub fn select_distinct_columns(&self) -> Vec<String> {
        self.inner.state.lock().select_distinct_columns.clone()
    }

    /// Reduces the original table to the distinct values of `columns`, or
    /// switches back to it with an empty list.
    pub fn set_select_distinct_columns(&self, columns: Vec<String>) -> Result<()> {
        let mut state = self.inner.state.lock();
        self.inner.check_open(&state)?;
        if !self.inner.select_distinct_available(&state) {
            return Err(GridError::ConfigurationRejected(SELECT_DISTINCT_NOT_AVAILABLE));
        }
        if state.select_distinct_columns == columns {
            tracing::trace!(target: targets::PROXY, "select distinct columns unchanged");
            return Ok(());
        }
        tracing::debug!(target: targets::PROXY, ?columns, "setting select distinct columns");
        state.select_distinct_columns = columns.clone();
        let derivation = if columns.is_empty() {
            Derivation::Original
        } else {
            self.inner.select_distinct(columns)
        };
        self.inner.start_transition(&mut state, derivation);
        Ok(())
    }

    /// Snapshot of the transformation state.
    pub fn transform_state(&self) -> TransformState {
        let partition = self.partition_config();
        let state = self.inner.state.lock();
        TransformState {
            rollup: state.rollup_config.clone(),
            partition,
            select_distinct: state.select_distinct_columns.clone(),
        }
    }

    /// Replaces the whole transformation state with a single transition.
    ///
    /// A rollup takes precedence over select-distinct, which takes precedence
    /// over a partition, when choosing what to derive.
    pub fn apply_transform_state(&self, transforms: TransformState) -> Result<()> {
        transforms.validate()?;
        let partition_required = self.inner.partition_required();
        let mut state = self.inner.state.lock();
        self.inner.check_open(&state)?;
        if transforms.rollup.is_some()
            && !(self.inner.original.is_rollup_available() || state.rollup_config.is_some())
        {
            return Err(GridError::ConfigurationRejected(ROLLUP_NOT_AVAILABLE));
        }
        if !transforms.select_distinct.is_empty()
            && !self.inner.original.is_select_distinct_available()
        {
            return Err(GridError::ConfigurationRejected(SELECT_DISTINCT_NOT_AVAILABLE));
        }
        if transforms.partition.is_some() && !partition_required {
            return Err(GridError::ConfigurationRejected(PARTITIONS_NOT_AVAILABLE));
        }
        if state.rollup_config == transforms.rollup
            && state.partition_config == transforms.partition
            && state.select_distinct_columns == transforms.select_distinct
        {
            tracing::trace!(target: targets::PROXY, "transform state unchanged");
            return Ok(());
        }

        tracing::debug!(target: targets::PROXY, ?transforms, "applying transform state");
        let TransformState {
            rollup,
            partition,
            select_distinct,
        } = transforms;
        state.rollup_config = rollup.clone();
        state.partition_config = partition.clone();
        state.select_distinct_columns = select_distinct.clone();
        let derivation = if let Some(rollup) = rollup {
            self.inner.rollup(rollup)
        } else if !select_distinct.is_empty() {
            self.inner.select_distinct(select_distinct)
        } else if let Some(partition) = partition {
            self.inner.partition(partition)
        } else {
            Derivation::Original
        };
        self.inner.start_transition(&mut state, derivation);
        Ok(())
    }

    fn active(&self) -> ModelHandle {
        self.inner.active()
    }
}

impl ProxyInner {
    fn active(&self) -> ModelHandle {
        self.state.lock().active.clone()
    }

    fn check_open(&self, state: &ProxyState) -> Result<()> {
        if state.closed {
            Err(GridError::Closed("GridModelProxy".to_string()))
        } else {
            Ok(())
        }
    }

    fn rollup_available(&self, state: &ProxyState) -> bool {
        (self.original.is_rollup_available() || state.rollup_config.is_some())
            && state.select_distinct_columns.is_empty()
    }

    fn select_distinct_available(&self, state: &ProxyState) -> bool {
        self.original.is_select_distinct_available() && state.rollup_config.is_none()
    }

    fn partition_required(&self) -> bool {
        self.original
            .as_partition_provider()
            .is_some_and(|p| p.is_partition_required())
    }

    fn table_derivation<F>(&self, operation: &'static str, derive: F) -> Derivation
    where
        F: FnOnce(Arc<dyn TableSource>) -> BoxFuture<'static, Result<SourceHandle>>,
    {
        let table = self
            .original
            .as_table_backed()
            .and_then(|t| t.table());
        match table {
            Some(table) => Derivation::Source(derive(table)),
            None => {
                let error = GridError::capability(operation, self.original.type_name());
                Derivation::Source(future::ready(Err(error)).boxed())
            }
        }
    }

    fn rollup(&self, config: RollupConfig) -> Derivation {
        self.table_derivation("rollup", move |table| {
            async move { table.rollup(&config).await }.boxed()
        })
    }

    fn select_distinct(&self, columns: Vec<String>) -> Derivation {
        self.table_derivation("select_distinct", move |table| {
            async move { table.select_distinct(&columns).await.map(SourceHandle::Table) }.boxed()
        })
    }

    fn partition(&self, config: PartitionConfig) -> Derivation {
        let original = self.original.clone();
        Derivation::Source(
            async move {
                let Some(provider) = original.as_partition_provider() else {
                    return Err(GridError::capability("partition_table", original.type_name()));
                };
                match config.mode {
                    PartitionMode::Keys => provider.partition_keys_table().await,
                    PartitionMode::Merged => provider.partition_merged_table().await,
                    PartitionMode::Partition => provider.partition_table(&config.partitions).await,
                }
            }
            .boxed(),
        )
    }

    /// Cancels any pending transition and starts a new one.
    fn start_transition(self: &Arc<Self>, state: &mut ProxyState, derivation: Derivation) {
        if let Phase::Transitioning { id, transition } = mem::replace(&mut state.phase, Phase::Idle) {
            transition.cancel();
            tracing::debug!(target: targets::TRANSITION, id, "superseded transition");
        }
        state.next_transition_id += 1;
        let id = state.next_transition_id;

        let original = self.original.clone();
        let factory = self.factory.clone();
        let formatter = state.active.formatter();
        let build = async move {
            match derivation {
                Derivation::Original => Ok(original),
                Derivation::Source(source) => source
                    .await
                    .map(|source| build_model(&factory, source, formatter)),
            }
        };

        let dispose_original = self.original.clone();
        let dispose = move |model: ModelHandle| dispose_model(&dispose_original, &model);

        let weak: Weak<ProxyInner> = Arc::downgrade(self);
        let orphan_original = self.original.clone();
        let on_settled = move |result: Result<ModelHandle>| match weak.upgrade() {
            Some(inner) => inner.finish_transition(id, result),
            None => {
                if let Ok(model) = result {
                    dispose_model(&orphan_original, &model);
                }
            }
        };

        tracing::debug!(target: targets::TRANSITION, id, "starting transition");
        let transition = CancelableTransition::spawn(&self.runtime, build, dispose, on_settled);
        state.phase = Phase::Transitioning { id, transition };
    }

    fn finish_transition(self: &Arc<Self>, id: u64, result: Result<ModelHandle>) {
        let mut state = self.state.lock();
        let current = matches!(state.phase, Phase::Transitioning { id: pending, .. } if pending == id);

        let next = match result {
            Err(error) if error.is_canceled() => {
                tracing::trace!(target: targets::TRANSITION, id, "transition canceled");
                return;
            }
            Err(error) => {
                if !current || state.closed {
                    tracing::warn!(target: targets::TRANSITION, id, %error, "dropping failure of stale transition");
                    return;
                }
                state.phase = Phase::Idle;
                drop(state);
                tracing::warn!(target: targets::PROXY, id, %error, "transition failed");
                self.events.emit(GridModelEvent::RequestFailed(Arc::new(error)));
                return;
            }
            Ok(next) => next,
        };

        if !current || state.closed {
            drop(state);
            tracing::warn!(target: targets::TRANSITION, id, "disposing model of stale transition");
            dispose_model(&self.original, &next);
            return;
        }
        state.phase = Phase::Idle;
        if Arc::ptr_eq(&state.active, &next) {
            tracing::trace!(target: targets::PROXY, id, "transition resolved to the active model");
            return;
        }

        let _span = PerfSpan::new(span_names::SWAP);
        let previous = mem::replace(&mut state.active, next.clone());
        if let Some(relay) = state.relay.take() {
            previous.events().disconnect(relay);
            state.relay = Some(self.attach_relay(&next));
        }
        let viewport = state.viewport.clone();
        drop(state);

        tracing::debug!(
            target: targets::PROXY,
            id,
            from = previous.type_name(),
            to = next.type_name(),
            "swapped active model"
        );
        dispose_model(&self.original, &previous);

        let columns = next.columns();
        if !Arc::ptr_eq(&previous.columns(), &columns) {
            self.events.emit(GridModelEvent::ColumnsChanged(columns));
        } else if let Some(viewport) = viewport {
            next.set_viewport(viewport.top, viewport.bottom, viewport.columns);
        }
        if let Some(table) = next.as_table_backed().and_then(|t| t.table()) {
            self.events.emit(GridModelEvent::TableChanged(table));
        }
    }

    /// Re-emits every event of `model` on the proxy.
    fn attach_relay(self: &Arc<Self>, model: &ModelHandle) -> ConnectionId {
        let weak = Arc::downgrade(self);
        model.events().connect(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.events.emit(event.clone());
            }
        })
    }

    /// Keeps the relay attached exactly while the proxy has listeners.
    ///
    /// The count is read under the state lock; concurrent hook calls may
    /// arrive out of order, but the last one to take the lock sees the final
    /// count.
    fn update_relay(self: &Arc<Self>) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        match (self.events.listener_count() > 0, state.relay) {
            (true, None) => {
                let active = state.active.clone();
                state.relay = Some(self.attach_relay(&active));
                tracing::trace!(target: targets::PROXY, "attached event relay");
            }
            (false, Some(relay)) => {
                state.active.events().disconnect(relay);
                state.relay = None;
                tracing::trace!(target: targets::PROXY, "detached event relay");
            }
            _ => {}
        }
    }
}

fn build_model(factory: &ModelFactory, source: SourceHandle, formatter: Arc<Formatter>) -> ModelHandle {
    let _span = PerfSpan::new("build_model");
    factory(source, formatter, None)
}

/// Closes a model the proxy no longer uses. The original model is only ever
/// closed by the proxy's own close.
fn dispose_model(original: &ModelHandle, model: &ModelHandle) {
    if !Arc::ptr_eq(original, model) {
        model.close();
    }
}

#[async_trait]
impl GridModel for GridModelProxy {
    fn type_name(&self) -> &'static str {
        "GridModelProxy"
    }

    fn row_count(&self) -> usize {
        self.active().row_count()
    }

    fn column_count(&self) -> usize {
        self.active().column_count()
    }

    fn columns(&self) -> Columns {
        self.active().columns()
    }

    fn formatter(&self) -> Arc<Formatter> {
        self.active().formatter()
    }

    fn set_formatter(&self, formatter: Arc<Formatter>) {
        let active = self.active();
        if !Arc::ptr_eq(&active, &self.inner.original) {
            self.inner.original.set_formatter(formatter.clone());
        }
        active.set_formatter(formatter);
    }

    fn value_for_cell(&self, column: usize, row: usize) -> Value {
        self.active().value_for_cell(column, row)
    }

    fn text_for_cell(&self, column: usize, row: usize) -> String {
        self.active().text_for_cell(column, row)
    }

    fn color_for_cell(&self, column: usize, row: usize) -> CellColor {
        self.active().color_for_cell(column, row)
    }

    fn text_align_for_cell(&self, column: usize, row: usize) -> CellAlignment {
        self.active().text_align_for_cell(column, row)
    }

    fn display_string(&self, value: &Value, column_type: ColumnType) -> String {
        self.active().display_string(value, column_type)
    }

    fn sort(&self) -> Vec<SortDescriptor> {
        self.active().sort()
    }

    fn set_sort(&self, sort: Vec<SortDescriptor>) -> Result<()> {
        self.active().set_sort(sort)
    }

    fn filter(&self) -> Vec<FilterCondition> {
        self.active().filter()
    }

    fn set_filter(&self, filter: Vec<FilterCondition>) -> Result<()> {
        self.active().set_filter(filter)
    }

    fn custom_columns(&self) -> Vec<String> {
        self.active().custom_columns()
    }

    fn set_custom_columns(&self, custom_columns: Vec<String>) -> Result<()> {
        self.active().set_custom_columns(custom_columns)
    }

    fn set_viewport(&self, top: usize, bottom: usize, columns: Option<Columns>) {
        let active = {
            let mut state = self.inner.state.lock();
            state.viewport = Some(Viewport {
                top,
                bottom,
                columns: columns.clone(),
            });
            state.active.clone()
        };
        active.set_viewport(top, bottom, columns);
    }

    async fn snapshot(&self, ranges: &[GridRange]) -> Result<Vec<Vec<Value>>> {
        self.active().snapshot(ranges).await
    }

    async fn text_snapshot(&self, ranges: &[GridRange], include_headers: bool) -> Result<String> {
        self.active().text_snapshot(ranges, include_headers).await
    }

    fn is_filter_required(&self) -> bool {
        self.active().is_filter_required()
    }

    fn is_reversible(&self) -> bool {
        self.active().is_reversible()
    }

    fn is_rollup_available(&self) -> bool {
        let state = self.inner.state.lock();
        self.inner.rollup_available(&state)
    }

    fn is_select_distinct_available(&self) -> bool {
        let state = self.inner.state.lock();
        self.inner.select_distinct_available(&state)
    }

    fn events(&self) -> &GridEvents {
        &self.inner.events
    }

    /// Closes the original model, the active model if different, and cancels
    /// any pending transition.
    fn close(&self) {
        let (active, phase, relay) = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            (
                state.active.clone(),
                mem::replace(&mut state.phase, Phase::Idle),
                state.relay.take(),
            )
        };
        if let Some(relay) = relay {
            active.events().disconnect(relay);
        }
        if let Phase::Transitioning { id, transition } = phase {
            transition.cancel();
            tracing::debug!(target: targets::TRANSITION, id, "canceled transition on close");
        }
        self.inner.original.close();
        dispose_model(&self.inner.original, &active);
        tracing::debug!(target: targets::PROXY, "closed grid model proxy");
    }

    fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    fn as_expandable(&self) -> Option<&dyn ExpandableGridModel> {
        self.active()
            .as_expandable()
            .is_some()
            .then_some(self as &dyn ExpandableGridModel)
    }

    fn as_editable(&self) -> Option<&dyn EditableGridModel> {
        self.active()
            .as_editable()
            .is_some()
            .then_some(self as &dyn EditableGridModel)
    }

    fn as_deletable(&self) -> Option<&dyn DeletableGridModel> {
        self.active()
            .as_deletable()
            .is_some()
            .then_some(self as &dyn DeletableGridModel)
    }

    fn as_partition_provider(&self) -> Option<&dyn PartitionedGridModelProvider> {
        self.active()
            .as_partition_provider()
            .is_some()
            .then_some(self as &dyn PartitionedGridModelProvider)
    }

    fn as_table_backed(&self) -> Option<&dyn TableBackedGridModel> {
        self.active()
            .as_table_backed()
            .is_some()
            .then_some(self as &dyn TableBackedGridModel)
    }
}

impl ExpandableGridModel for GridModelProxy {
    fn is_row_expandable(&self, row: usize) -> bool {
        self.active()
            .as_expandable()
            .is_some_and(|m| m.is_row_expandable(row))
    }

    fn is_row_expanded(&self, row: usize) -> bool {
        self.active()
            .as_expandable()
            .is_some_and(|m| m.is_row_expanded(row))
    }

    fn set_row_expanded(&self, row: usize, expanded: bool, expand_descendants: bool) -> Result<()> {
        let active = self.active();
        match active.as_expandable() {
            Some(m) => m.set_row_expanded(row, expanded, expand_descendants),
            None => Err(GridError::capability("set_row_expanded", active.type_name())),
        }
    }

    fn is_expand_all_available(&self) -> bool {
        self.active()
            .as_expandable()
            .is_some_and(|m| m.is_expand_all_available())
    }

    fn expand_all(&self) -> Result<()> {
        let active = self.active();
        match active.as_expandable() {
            Some(m) => m.expand_all(),
            None => Err(GridError::capability("expand_all", active.type_name())),
        }
    }

    fn collapse_all(&self) -> Result<()> {
        let active = self.active();
        match active.as_expandable() {
            Some(m) => m.collapse_all(),
            None => Err(GridError::capability("collapse_all", active.type_name())),
        }
    }

    fn depth_for_row(&self, row: usize) -> usize {
        self.active()
            .as_expandable()
            .map_or(0, |m| m.depth_for_row(row))
    }
}

#[async_trait]
impl EditableGridModel for GridModelProxy {
    fn is_editable(&self) -> bool {
        self.active().as_editable().is_some_and(|m| m.is_editable())
    }

    fn is_editable_range(&self, range: &GridRange) -> bool {
        self.active()
            .as_editable()
            .is_some_and(|m| m.is_editable_range(range))
    }

    fn is_valid_for_cell(&self, column: usize, row: usize, text: &str) -> bool {
        self.active()
            .as_editable()
            .is_some_and(|m| m.is_valid_for_cell(column, row, text))
    }

    fn edit_value_for_cell(&self, column: usize, row: usize) -> String {
        self.active()
            .as_editable()
            .map(|m| m.edit_value_for_cell(column, row))
            .unwrap_or_default()
    }

    async fn set_value_for_cell(&self, column: usize, row: usize, text: &str) -> Result<()> {
        let active = self.active();
        match active.as_editable() {
            Some(m) => m.set_value_for_cell(column, row, text).await,
            None => Err(GridError::NotEditable),
        }
    }

    async fn set_value_for_ranges(&self, ranges: &[GridRange], text: &str) -> Result<()> {
        let active = self.active();
        match active.as_editable() {
            Some(m) => m.set_value_for_ranges(ranges, text).await,
            None => Err(GridError::NotEditable),
        }
    }

    async fn set_values(&self, edits: Vec<CellEdit>) -> Result<()> {
        let active = self.active();
        match active.as_editable() {
            Some(m) => m.set_values(edits).await,
            None => Err(GridError::NotEditable),
        }
    }

    async fn commit_pending(&self) -> Result<()> {
        let active = self.active();
        match active.as_editable() {
            Some(m) => m.commit_pending().await,
            None => Err(GridError::NotEditable),
        }
    }

    fn pending_row_count(&self) -> usize {
        self.active()
            .as_editable()
            .map_or(0, |m| m.pending_row_count())
    }
}

#[async_trait]
impl DeletableGridModel for GridModelProxy {
    fn is_deletable_ranges(&self, ranges: &[GridRange]) -> bool {
        self.active()
            .as_deletable()
            .is_some_and(|m| m.is_deletable_ranges(ranges))
    }

    async fn delete(&self, ranges: &[GridRange]) -> Result<()> {
        let active = self.active();
        match active.as_deletable() {
            Some(m) => m.delete(ranges).await,
            None => Err(GridError::NotDeletable),
        }
    }
}

/// Partition queries always address the original model, which is what
/// partition transitions derive from.
#[async_trait]
impl PartitionedGridModelProvider for GridModelProxy {
    fn is_partition_required(&self) -> bool {
        self.inner.partition_required()
    }

    fn partition_columns(&self) -> Vec<Column> {
        self.inner
            .original
            .as_partition_provider()
            .map(|p| p.partition_columns())
            .unwrap_or_default()
    }

    async fn partition_keys_table(&self) -> Result<SourceHandle> {
        let original = &self.inner.original;
        match original.as_partition_provider() {
            Some(p) => p.partition_keys_table().await,
            None => Err(GridError::capability("partition_keys_table", original.type_name())),
        }
    }

    async fn partition_merged_table(&self) -> Result<SourceHandle> {
        let original = &self.inner.original;
        match original.as_partition_provider() {
            Some(p) => p.partition_merged_table().await,
            None => Err(GridError::capability("partition_merged_table", original.type_name())),
        }
    }

    async fn partition_table(&self, keys: &[Value]) -> Result<SourceHandle> {
        let original = &self.inner.original;
        match original.as_partition_provider() {
            Some(p) => p.partition_table(keys).await,
            None => Err(GridError::capability("partition_table", original.type_name())),
        }
    }
}

/// Errors for table operations the active model cannot serve.
fn table_operation_error(active: &ModelHandle, operation: &'static str) -> GridError {
    if active.as_expandable().is_some() {
        GridError::UnsupportedShape { operation }
    } else {
        GridError::capability(operation, active.type_name())
    }
}

#[async_trait]
impl TableBackedGridModel for GridModelProxy {
    fn table(&self) -> Option<Arc<dyn TableSource>> {
        self.active().as_table_backed().and_then(|m| m.table())
    }

    fn is_export_available(&self) -> bool {
        self.active()
            .as_table_backed()
            .is_some_and(|m| m.is_export_available())
    }

    async fn export(&self, options: &ExportOptions) -> Result<String> {
        let active = self.active();
        match active.as_table_backed() {
            Some(m) => m.export(options).await,
            None => Err(table_operation_error(&active, "export")),
        }
    }

    async fn column_statistics(&self, column: usize) -> Result<ColumnStatistics> {
        let active = self.active();
        match active.as_table_backed() {
            Some(m) => m.column_statistics(column).await,
            None => Err(table_operation_error(&active, "column_statistics")),
        }
    }

    async fn values_table(&self, columns: &[String]) -> Result<Arc<dyn TableSource>> {
        let active = self.active();
        match active.as_table_backed() {
            Some(m) => m.values_table(columns).await,
            None => Err(table_operation_error(&active, "values_table")),
        }
    }
}

/// Builder for [`GridModelProxy`].
pub struct GridModelProxyBuilder {
    source: SourceHandle,
    formatter: Arc<Formatter>,
    input_table: Option<Arc<dyn InputTable>>,
    runtime: Option<Handle>,
    factory: ModelFactory,
    transforms: Option<TransformState>,
}

impl GridModelProxyBuilder {
    /// Creates a builder for a proxy over `source`.
    pub fn new(source: SourceHandle) -> Self {
        Self {
            source,
            formatter: Arc::new(Formatter::default()),
            input_table: None,
            runtime: None,
            factory: default_factory(),
            transforms: None,
        }
    }

    /// Sets the formatter handed to every backing model.
    pub fn formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// Associates an input table with the original model.
    pub fn input_table(mut self, input_table: Arc<dyn InputTable>) -> Self {
        self.input_table = Some(input_table);
        self
    }

    /// Runs transitions on `handle` instead of the ambient runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Replaces the model factory.
    pub fn factory(mut self, factory: ModelFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Applies persisted settings: the formatter, and the transformations
    /// once the proxy is built.
    pub fn settings(mut self, settings: GridSettings) -> Self {
        self.formatter = Arc::new(settings.formatter);
        self.transforms = Some(settings.transforms);
        self
    }

    /// Builds the proxy.
    pub fn build(self) -> Result<GridModelProxy> {
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => AsyncRuntime::current_or_global()?,
        };
        let original = (self.factory)(self.source, self.formatter, self.input_table);
        tracing::debug!(target: targets::PROXY, model = original.type_name(), "created grid model proxy");

        let inner = Arc::new(ProxyInner {
            original: original.clone(),
            state: Mutex::new(ProxyState {
                active: original,
                phase: Phase::Idle,
                rollup_config: None,
                partition_config: None,
                select_distinct_columns: Vec::new(),
                viewport: None,
                relay: None,
                next_transition_id: 0,
                closed: false,
            }),
            events: GridEvents::new(),
            runtime,
            factory: self.factory,
        });
        let weak = Arc::downgrade(&inner);
        inner.events.set_listener_hook(move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.update_relay();
            }
        });

        let proxy = GridModelProxy { inner };
        if let Some(transforms) = self.transforms {
            proxy.apply_transform_state(transforms)?;
        }
        Ok(proxy)
    }
}

impl std::fmt::Debug for GridModelProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("GridModelProxy")
            .field("original", &self.inner.original.type_name())
            .field("active", &state.active.type_name())
            .field("rollup_config", &state.rollup_config)
            .field("select_distinct_columns", &state.select_distinct_columns)
            .field("transitioning", &matches!(state.phase, Phase::Transitioning { .. }))
            .field("closed", &state.closed)
            .finish()
    }
}
