//! Instrumentation macros
//!
//! The macros expand through `$crate::tracing`, so callers do not need their
//! own `tracing` dependency.

/// Create a [`PerformanceSpan`](crate::performance::PerformanceSpan), optionally
/// under a span that carries extra fields.
///
/// ```rust
/// use tessera_tracing::perf_span;
///
/// {
///     let _span = perf_span!("max_pool_3d", elements = 1024);
///     // ... work ...
/// }
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::new($name, None)
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        $crate::performance::PerformanceSpan::with_span(
            $name,
            $crate::tracing::debug_span!("perf", name = $name, $($field = $value),+),
        )
    }};
}

/// Emit a debug-level performance event with the given metrics.
///
/// ```rust
/// use tessera_tracing::perf_event;
///
/// perf_event!("temporary_allocated", elements = 64, bytes = 256);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        $crate::tracing::debug!(event = $name, $($field = $value),+)
    };
}

/// Run a block and return `(result, duration_us)`, logging the duration.
///
/// ```rust
/// use tessera_tracing::timed_block;
///
/// let (sum, _us) = timed_block!("sum", { (1..=10).sum::<i32>() });
/// assert_eq!(sum, 55);
/// ```
#[macro_export]
macro_rules! timed_block {
    ($name:expr, $block:block) => {{
        let start = ::std::time::Instant::now();
        let result = $block;
        let duration_us = start.elapsed().as_micros() as u64;
        $crate::tracing::debug!(operation = $name, duration_us = duration_us, "timed_block_complete");
        (result, duration_us)
    }};
}
