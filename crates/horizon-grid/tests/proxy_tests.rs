//! Tests for model swapping in the grid model proxy.

mod common;

use std::sync::Arc;

use common::{EventLog, StubTable, StubTree, init_tracing, settle, trade_columns};
use horizon_grid::config::{
    Aggregation, AggregationOperation, GridSettings, PartitionConfig, RollupConfig, TransformState,
};
use horizon_grid::model::{
    Column, ColumnType, EditableGridModel, ExpandableGridModel, ExportOptions, Formatter, GridModel,
    GridModelEvent, GridModelEventKind, GridModelProxy, ModelFactory, ModelHandle,
    PartitionedGridModelProvider, SortDescriptor, TableBackedGridModel, TreeGridModel, Value,
    Viewport,
    is_editable_grid_model, is_expandable_grid_model, is_partitioned_grid_model_provider,
    is_table_backed_grid_model, make_model,
};
use horizon_grid::source::{SourceHandle, TableSource};
use horizon_grid::source::memory::{MemoryInputTable, MemoryPartitionedTable, MemoryTable};
use parking_lot::Mutex;

fn rollup(column: &str) -> Option<RollupConfig> {
    Some(RollupConfig::group_by([column]))
}

/// A factory that keeps every tree model it builds.
fn recording_factory() -> (ModelFactory, Arc<Mutex<Vec<Arc<TreeGridModel>>>>) {
    let built: Arc<Mutex<Vec<Arc<TreeGridModel>>>> = Arc::default();
    let record = built.clone();
    let factory: ModelFactory = Arc::new(move |source, formatter, input_table| match source {
        SourceHandle::Tree(tree) => {
            let model = Arc::new(TreeGridModel::new(tree, formatter));
            record.lock().push(model.clone());
            model as ModelHandle
        }
        other => make_model(other, formatter, input_table),
    });
    (factory, built)
}

/// Two rows whose `Qty` total does not fit in an `i64`.
fn oversized_trades() -> MemoryTable {
    MemoryTable::new(
        "oversized",
        vec![
            Column::new("Sym", ColumnType::String),
            Column::new("Qty", ColumnType::Int),
        ],
        vec![
            vec!["AAPL".into(), i64::MAX.into()],
            vec!["AAPL".into(), 1i64.into()],
        ],
    )
    .unwrap()
}

fn trades() -> MemoryTable {
    MemoryTable::new(
        "trades",
        vec![
            Column::new("Sym", ColumnType::String),
            Column::new("Qty", ColumnType::Int),
        ],
        vec![
            vec!["AAPL".into(), 100i64.into()],
            vec!["MSFT".into(), 50i64.into()],
            vec!["AAPL".into(), 25i64.into()],
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn test_rollup_swaps_in_tree_model() {
    init_tracing();
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let log = EventLog::attach(&proxy);
    assert_eq!(proxy.active_model().type_name(), "TableGridModel");

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    assert!(proxy.is_transition_pending());
    settle().await;
    assert_eq!(table.rollup_calls(), 1);

    let tree = StubTree::new("rollup", vec![Column::new("Sym", ColumnType::String)].into());
    table.resolve_next(tree.handle());
    settle().await;

    assert!(!proxy.is_transition_pending());
    assert_eq!(proxy.active_model().type_name(), "TreeGridModel");
    assert_eq!(proxy.rollup_config(), rollup("Sym"));
    assert_eq!(proxy.row_count(), 2);
    assert_eq!(proxy.column_count(), 1);
    assert!(is_expandable_grid_model(Some(&proxy)));
    assert!(!is_table_backed_grid_model(Some(&proxy)));
    assert_eq!(log.kinds(), vec![GridModelEventKind::ColumnsChanged]);
    assert_eq!(tree.closes(), 0);
    assert_eq!(table.closes(), 0);
}

#[tokio::test]
async fn test_superseded_transition_is_disposed() {
    init_tracing();
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let log = EventLog::attach(&proxy);

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    proxy.set_rollup_config(rollup("Qty")).unwrap();
    settle().await;
    assert_eq!(table.rollup_calls(), 2);

    let stale = StubTree::new("stale", trade_columns());
    table.resolve_next(stale.handle());
    settle().await;
    assert_eq!(stale.closes(), 1);
    assert_eq!(proxy.active_model().type_name(), "TableGridModel");
    assert!(proxy.is_transition_pending());
    assert!(log.kinds().is_empty());

    let fresh = StubTree::new("fresh", trade_columns());
    table.resolve_next(fresh.handle());
    settle().await;
    assert_eq!(fresh.closes(), 0);
    assert_eq!(proxy.active_model().type_name(), "TreeGridModel");
    assert_eq!(proxy.rollup_config(), rollup("Qty"));
}

#[tokio::test]
async fn test_clearing_rollup_before_completion_keeps_original() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let original = proxy.original_model();
    let log = EventLog::attach(&proxy);

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    proxy.set_rollup_config(None).unwrap();
    settle().await;

    let tree = StubTree::new("rollup", trade_columns());
    table.resolve_next(tree.handle());
    settle().await;

    assert_eq!(tree.closes(), 1);
    assert!(Arc::ptr_eq(&proxy.active_model(), &original));
    assert!(!original.is_closed());
    assert_eq!(proxy.rollup_config(), None);
    assert!(log.kinds().is_empty());
}

#[tokio::test]
async fn test_failed_transition_reports_request_failed() {
    init_tracing();
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let log = EventLog::attach(&proxy);

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    table.fail_next("boom");
    settle().await;

    assert!(!proxy.is_transition_pending());
    assert_eq!(proxy.active_model().type_name(), "TableGridModel");
    let events = log.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        GridModelEvent::RequestFailed(error) => {
            assert_eq!(error.to_string(), "Data source error: boom");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_rollup_and_select_distinct_are_exclusive() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    assert!(proxy.is_rollup_available());
    assert!(proxy.is_select_distinct_available());

    proxy.set_select_distinct_columns(vec!["Sym".into()]).unwrap();
    assert!(!proxy.is_rollup_available());
    let err = proxy.set_rollup_config(rollup("Sym")).unwrap_err();
    assert_eq!(err.to_string(), "Rollup not available");

    proxy.set_select_distinct_columns(Vec::new()).unwrap();
    assert!(proxy.is_rollup_available());

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    assert!(!proxy.is_select_distinct_available());
    let err = proxy
        .set_select_distinct_columns(vec!["Sym".into()])
        .unwrap_err();
    assert_eq!(err.to_string(), "Select distinct not available");
}

#[tokio::test]
async fn test_unavailable_transformations_are_rejected() {
    let table = StubTable::new();
    table.set_rollup_available(false);
    table.set_select_distinct_available(false);
    let proxy = GridModelProxy::new(table.handle()).unwrap();

    let err = proxy.set_rollup_config(rollup("Sym")).unwrap_err();
    assert_eq!(err.to_string(), "Rollup not available");
    let err = proxy
        .set_select_distinct_columns(vec!["Sym".into()])
        .unwrap_err();
    assert_eq!(err.to_string(), "Select distinct not available");
    let err = proxy
        .set_partition_config(Some(PartitionConfig::keys()))
        .unwrap_err();
    assert_eq!(err.to_string(), "Partitions are not available");
    assert_eq!(proxy.partition_config(), None);
    assert!(!proxy.is_transition_pending());
}

#[tokio::test]
async fn test_equal_config_is_a_no_op() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    table.resolve_next(StubTree::new("rollup", trade_columns()).handle());
    settle().await;

    let log = EventLog::attach(&proxy);
    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;

    assert!(!proxy.is_transition_pending());
    assert_eq!(table.rollup_calls(), 1);
    assert!(log.kinds().is_empty());
}

#[tokio::test]
async fn test_same_columns_reapplies_viewport() {
    let table = StubTable::new();
    let (factory, built) = recording_factory();
    let proxy = GridModelProxy::builder(table.handle())
        .factory(factory)
        .build()
        .unwrap();
    let log = EventLog::attach(&proxy);

    proxy.set_viewport(5, 50, None);
    log.clear();

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    table.resolve_next(StubTree::new("rollup", table.columns_arc()).handle());
    settle().await;

    let built = built.lock();
    assert_eq!(built.len(), 1);
    assert_eq!(
        built[0].viewport(),
        Some(Viewport {
            top: 5,
            bottom: 50,
            columns: None,
        })
    );
    assert_eq!(log.kinds(), vec![GridModelEventKind::ViewportUpdated]);
    assert_eq!(proxy.rollup_config(), rollup("Sym"));
    assert!(!proxy.is_select_distinct_available());
}

#[tokio::test]
async fn test_changed_columns_skip_viewport() {
    let table = StubTable::new();
    let (factory, built) = recording_factory();
    let proxy = GridModelProxy::builder(table.handle())
        .factory(factory)
        .build()
        .unwrap();
    let log = EventLog::attach(&proxy);

    proxy.set_viewport(5, 50, None);
    log.clear();

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    table.resolve_next(StubTree::new("rollup", trade_columns()).handle());
    settle().await;

    assert_eq!(built.lock()[0].viewport(), None);
    let events = log.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        GridModelEvent::ColumnsChanged(columns) => {
            assert!(Arc::ptr_eq(columns, &proxy.columns()));
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_expansion_on_flat_model_names_the_model() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();

    assert!(proxy.as_expandable().is_none());
    assert!(!proxy.is_row_expandable(0));
    assert_eq!(proxy.depth_for_row(0), 0);
    let err = proxy.set_row_expanded(0, true, false).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Function set_row_expanded does not exist on TableGridModel"
    );
    let err = proxy.expand_all().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Function expand_all does not exist on TableGridModel"
    );
}

#[tokio::test]
async fn test_close_releases_every_model() {
    init_tracing();
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    let active = StubTree::new("active", trade_columns());
    table.resolve_next(active.handle());
    settle().await;

    proxy.set_rollup_config(rollup("Qty")).unwrap();
    settle().await;
    assert!(proxy.is_transition_pending());

    proxy.close();
    assert!(proxy.is_closed());
    assert!(!proxy.is_transition_pending());
    assert_eq!(active.closes(), 1);
    assert_eq!(table.closes(), 1);

    let late = StubTree::new("late", trade_columns());
    table.resolve_next(late.handle());
    settle().await;
    assert_eq!(late.closes(), 1);

    proxy.close();
    assert_eq!(active.closes(), 1);
    assert_eq!(table.closes(), 1);

    let err = proxy.set_rollup_config(None).unwrap_err();
    assert!(matches!(err, horizon_grid::GridError::Closed(_)));
}

#[tokio::test]
async fn test_relay_follows_listeners_and_active_model() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let original = proxy.original_model();
    assert_eq!(original.events().listener_count(), 0);

    let id = proxy.events().connect(|_| {});
    assert_eq!(original.events().listener_count(), 1);
    proxy.events().disconnect(id);
    assert_eq!(original.events().listener_count(), 0);

    let log = EventLog::attach(&proxy);
    original
        .set_sort(vec![SortDescriptor::descending("Qty")])
        .unwrap();
    assert!(log.kinds().contains(&GridModelEventKind::SortsChanged));

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    table.resolve_next(StubTree::new("rollup", trade_columns()).handle());
    settle().await;

    let active = proxy.active_model();
    assert_eq!(original.events().listener_count(), 0);
    assert_eq!(active.events().listener_count(), 1);

    log.clear();
    active.set_viewport(0, 10, None);
    assert_eq!(log.kinds(), vec![GridModelEventKind::ViewportUpdated]);
}

#[tokio::test]
async fn test_select_distinct_emits_table_changed() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let log = EventLog::attach(&proxy);

    proxy.set_select_distinct_columns(vec!["Sym".into()]).unwrap();
    settle().await;
    assert_eq!(table.select_distinct_calls(), 1);

    let distinct = StubTable::with_columns(vec![Column::new("Sym", ColumnType::String)].into());
    table.resolve_next(distinct.handle());
    settle().await;

    assert_eq!(
        log.kinds(),
        vec![
            GridModelEventKind::ColumnsChanged,
            GridModelEventKind::TableChanged,
        ]
    );
    assert_eq!(proxy.select_distinct_columns(), vec!["Sym".to_string()]);
    assert_eq!(proxy.column_count(), 1);
    assert!(is_table_backed_grid_model(Some(&proxy)));
    let current = proxy.table().unwrap();
    assert!(Arc::ptr_eq(&current.columns(), &distinct.columns_arc()));
}

#[tokio::test]
async fn test_partition_selection() {
    let base = MemoryTable::new(
        "quotes",
        vec![
            Column::new("Date", ColumnType::String).partition(),
            Column::new("Px", ColumnType::Double),
        ],
        vec![
            vec!["d1".into(), 1.0.into()],
            vec!["d2".into(), 2.0.into()],
            vec!["d2".into(), 3.0.into()],
        ],
    )
    .unwrap();
    let partitioned = MemoryPartitionedTable::new("quotes", base, ["Date"]).unwrap();
    let proxy = GridModelProxy::new(SourceHandle::Partitioned(Arc::new(partitioned))).unwrap();
    let log = EventLog::attach(&proxy);

    assert_eq!(proxy.active_model().type_name(), "PartitionedGridModel");
    assert!(proxy.is_filter_required());
    assert!(proxy.is_partition_required());
    assert!(is_partitioned_grid_model_provider(Some(&proxy)));
    assert_eq!(proxy.partition_columns()[0].name, "Date");
    assert_eq!(proxy.partition_config(), None);

    proxy
        .set_partition_config(Some(PartitionConfig::partition(["d2"])))
        .unwrap();
    settle().await;
    assert_eq!(proxy.active_model().type_name(), "TableGridModel");
    assert_eq!(proxy.row_count(), 2);
    assert_eq!(proxy.value_for_cell(1, 1), Value::Double(3.0));
    assert_eq!(log.kinds(), vec![GridModelEventKind::TableChanged]);

    proxy.set_partition_config(Some(PartitionConfig::keys())).unwrap();
    settle().await;
    assert_eq!(proxy.row_count(), 2);
    assert_eq!(proxy.column_count(), 1);
    assert_eq!(proxy.partition_config(), Some(PartitionConfig::keys()));
    assert!(proxy.is_partition_required());

    proxy.set_partition_config(None).unwrap();
    settle().await;
    assert_eq!(proxy.active_model().type_name(), "PartitionedGridModel");
    assert_eq!(proxy.row_count(), 0);
}

#[tokio::test]
async fn test_settings_apply_transforms_on_build() {
    let mut settings = GridSettings::default();
    settings.transforms.rollup = rollup("Sym");
    let proxy = GridModelProxy::builder(trades().into_handle())
        .settings(settings)
        .build()
        .unwrap();
    assert!(proxy.is_transition_pending());
    settle().await;

    assert_eq!(proxy.active_model().type_name(), "TreeGridModel");
    assert_eq!(proxy.row_count(), 2);
    assert_eq!(
        proxy.transform_state(),
        TransformState {
            rollup: rollup("Sym"),
            partition: None,
            select_distinct: Vec::new(),
        }
    );

    let err = proxy
        .apply_transform_state(TransformState {
            rollup: rollup("Sym"),
            partition: None,
            select_distinct: vec!["Sym".into()],
        })
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Rollup and select distinct are mutually exclusive"
    );

    proxy.apply_transform_state(TransformState::default()).unwrap();
    settle().await;
    assert_eq!(proxy.active_model().type_name(), "TableGridModel");
    assert_eq!(proxy.row_count(), 3);
}

#[tokio::test]
async fn test_capabilities_follow_active_model() {
    assert!(!is_editable_grid_model(None));

    let table = Arc::new(trades());
    let input = Arc::new(MemoryInputTable::new(table.clone(), ["Sym"]).unwrap());
    let proxy = GridModelProxy::builder(SourceHandle::Table(table))
        .input_table(input)
        .build()
        .unwrap();

    assert!(is_editable_grid_model(Some(&proxy)));
    assert!(proxy.is_editable());
    proxy.set_value_for_cell(1, 0, "150").await.unwrap();
    assert_eq!(proxy.value_for_cell(1, 0), Value::Int(150));

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;

    assert!(!is_editable_grid_model(Some(&proxy)));
    assert!(!proxy.is_editable());
    let err = proxy.set_value_for_cell(1, 0, "1").await.unwrap_err();
    assert_eq!(err.to_string(), "Model is not editable");
    let err = proxy.export(&ExportOptions::default()).await.unwrap_err();
    assert_eq!(err.to_string(), "TreeTable has no 'export' property");
    assert!(proxy.table().is_none());
}

#[tokio::test]
async fn test_panicking_derivation_reports_request_failed() {
    init_tracing();
    let table = StubTable::new();
    table.set_panic_on_rollup(true);
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let log = EventLog::attach(&proxy);

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;

    assert!(!proxy.is_transition_pending());
    assert_eq!(proxy.active_model().type_name(), "TableGridModel");
    let events = log.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        GridModelEvent::RequestFailed(error) => {
            assert_eq!(error.to_string(), "Transition failed: rollup of 3 rows exploded");
        }
        other => panic!("unexpected event {other:?}"),
    }

    // The proxy still accepts new configurations afterwards.
    table.set_panic_on_rollup(false);
    proxy.set_rollup_config(rollup("Qty")).unwrap();
    settle().await;
    table.resolve_next(StubTree::new("rollup", trade_columns()).handle());
    settle().await;
    assert_eq!(proxy.active_model().type_name(), "TreeGridModel");
}

#[tokio::test]
async fn test_rollup_sum_past_i64_range() {
    let proxy = GridModelProxy::new(oversized_trades().into_handle()).unwrap();
    let config = RollupConfig::group_by(["Sym"])
        .with_aggregation(Aggregation::new(AggregationOperation::Sum, ["Qty"]));

    proxy.set_rollup_config(Some(config)).unwrap();
    settle().await;

    assert!(!proxy.is_transition_pending());
    assert_eq!(proxy.active_model().type_name(), "TreeGridModel");
    assert_eq!(proxy.value_for_cell(1, 0), Value::Double(i64::MAX as f64 + 1.0));
}

#[tokio::test]
async fn test_column_statistics_past_i64_range() {
    let proxy = GridModelProxy::new(oversized_trades().into_handle()).unwrap();

    let stats = proxy.column_statistics(1).await.unwrap();
    assert_eq!(stats.count, 2);
    assert_eq!(stats.max, Value::Int(i64::MAX));
    assert_eq!(stats.sum, Some(Value::Double(i64::MAX as f64 + 1.0)));
}

#[tokio::test]
async fn test_column_statistics_on_tree_is_unsupported() {
    let proxy = GridModelProxy::new(trades().into_handle()).unwrap();
    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    assert_eq!(proxy.active_model().type_name(), "TreeGridModel");

    let err = proxy.column_statistics(0).await.unwrap_err();
    assert_eq!(err.to_string(), "TreeTable has no 'column_statistics' property");
}

#[tokio::test]
async fn test_formatter_reaches_original_model() {
    let proxy = GridModelProxy::new(trades().into_handle()).unwrap();
    let original = proxy.original_model();
    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    assert!(!Arc::ptr_eq(&proxy.active_model(), &original));

    let formatter = Formatter::new().with_null_text("n/a").with_thousands_separator(true);
    proxy.set_formatter(Arc::new(formatter.clone()));
    assert_eq!(*proxy.formatter(), formatter);
    assert_eq!(*original.formatter(), formatter);

    proxy.set_rollup_config(None).unwrap();
    settle().await;
    assert!(Arc::ptr_eq(&proxy.active_model(), &original));
    assert_eq!(*proxy.formatter(), formatter);
}

#[tokio::test]
async fn test_newest_transition_wins_when_completed_first() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();

    proxy.set_rollup_config(rollup("Sym")).unwrap();
    settle().await;
    proxy.set_rollup_config(rollup("Qty")).unwrap();
    settle().await;
    assert_eq!(table.pending_replies(), 2);

    let fresh = StubTree::new("fresh", trade_columns());
    table.resolve_last(fresh.handle());
    settle().await;
    assert_eq!(proxy.active_model().type_name(), "TreeGridModel");
    assert!(!proxy.is_transition_pending());

    let stale = StubTree::new("stale", trade_columns());
    table.resolve_next(stale.handle());
    settle().await;
    assert_eq!(stale.closes(), 1);
    assert_eq!(fresh.closes(), 0);
    assert_eq!(proxy.row_count(), 2);
    assert_eq!(proxy.rollup_config(), rollup("Qty"));
}

#[tokio::test]
async fn test_relay_settles_after_concurrent_listener_churn() {
    let table = StubTable::new();
    let proxy = GridModelProxy::new(table.handle()).unwrap();
    let active = proxy.active_model();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..200 {
                    let id = proxy.events().connect(|_| {});
                    proxy.events().disconnect(id);
                }
            });
        }
    });
    assert_eq!(proxy.events().listener_count(), 0);
    assert_eq!(active.events().listener_count(), 0);

    let id = proxy.events().connect(|_| {});
    assert_eq!(active.events().listener_count(), 1);
    proxy.events().disconnect(id);
    assert_eq!(active.events().listener_count(), 0);
}
