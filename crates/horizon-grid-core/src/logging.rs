//! Logging facilities for Horizon Grid.
//!
//! Horizon Grid uses the `tracing` crate for instrumentation. To see logs,
//! install a tracing subscriber in your application:
//!
//! ```ignore
//! fn main() {
//!     tracing_subscriber::fmt()
//!         .with_env_filter("horizon_grid::proxy=debug")
//!         .init();
//! }
//! ```
//!
//! Every event is emitted with one of the [`targets`] so that individual
//! subsystems can be filtered independently.

/// Span names used throughout Horizon Grid for tracing.
pub mod span_names {
    /// Performance measurement span.
    pub const PERF: &str = "horizon_grid::perf";
    /// Model swap span.
    pub const SWAP: &str = "horizon_grid::swap";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Signal/slot system target.
    pub const SIGNAL: &str = "horizon_grid_core::signal";
    /// Async runtime target.
    pub const RUNTIME: &str = "horizon_grid_core::runtime";
    /// Grid model proxy target.
    pub const PROXY: &str = "horizon_grid::proxy";
    /// Cancelable transition target.
    pub const TRANSITION: &str = "horizon_grid::transition";
    /// Backing model target.
    pub const MODEL: &str = "horizon_grid::model";
    /// Data source target.
    pub const SOURCE: &str = "horizon_grid::source";
}

/// A guard for measuring the duration of an operation.
///
/// Creates a `tracing` span on construction that is exited when the guard
/// is dropped. Subscribers with span timing enabled report the elapsed time.
///
/// ```
/// use horizon_grid_core::PerfSpan;
///
/// {
///     let _span = PerfSpan::new("build_model");
///     // ... timed work ...
/// }
/// ```
pub struct PerfSpan {
    #[allow(dead_code)]
    span: tracing::span::EnteredSpan,
}

impl PerfSpan {
    /// Create a new performance span.
    ///
    /// The span will be active until the guard is dropped.
    pub fn new(name: &'static str) -> Self {
        let span = tracing::debug_span!(target: "horizon_grid::perf", "perf", operation = name);
        Self {
            span: span.entered(),
        }
    }
}

impl std::fmt::Debug for PerfSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerfSpan").finish_non_exhaustive()
    }
}
