//! Performance events emitted by the tensor core
//!
//! Timing spans with threshold filtering, plus the standard events for the
//! three places time goes: host/device transfers, device kernel launches and
//! host-side statement evaluation.
//!
//! ```rust
//! use tessera_tracing::performance::{record_transfer, PerformanceSpan, TransferDirection};
//!
//! let span = PerformanceSpan::new("assign", Some(100));
//! // ... work ...
//! drop(span); // logged only if it took at least 100µs
//!
//! record_transfer(4096, TransferDirection::HostToDevice, 250);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;

static ENABLED: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

// Zero means no global threshold
static THRESHOLD_US: AtomicU64 = AtomicU64::new(0);

/// Apply process-wide performance span settings.
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    ENABLED.store(enabled, Ordering::Relaxed);
    THRESHOLD_US.store(threshold_us.unwrap_or(0), Ordering::Relaxed);
}

/// Whether performance spans currently log on drop.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn global_threshold() -> Option<u64> {
    match THRESHOLD_US.load(Ordering::Relaxed) {
        0 => None,
        us => Some(us),
    }
}

/// RAII timer that logs its duration on drop when it exceeds the threshold.
///
/// A span created without a threshold falls back to the one installed by
/// [`configure`].
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    start: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, name, threshold_us)
    }

    /// Create the span at a specific level.
    pub fn with_level(level: Level, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };

        Self {
            name,
            threshold_us: threshold_us.or_else(global_threshold),
            start: Instant::now(),
            span,
        }
    }

    /// Time under a caller-built span that carries extra fields.
    pub fn with_span(name: impl Into<String>, span: tracing::Span) -> Self {
        Self {
            name: name.into(),
            threshold_us: global_threshold(),
            start: Instant::now(),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        if !is_enabled() {
            return;
        }

        let elapsed_us = self.elapsed_us();
        if self.threshold_us.map_or(true, |t| elapsed_us >= t) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Direction of a host/device copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    HostToDevice,
    DeviceToHost,
    DeviceToDevice,
}

impl TransferDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            TransferDirection::HostToDevice => "H2D",
            TransferDirection::DeviceToHost => "D2H",
            TransferDirection::DeviceToDevice => "D2D",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn per_second(amount: f64, duration_us: u64) -> f64 {
    if duration_us == 0 {
        return 0.0;
    }
    amount / duration_us as f64 * 1_000_000.0
}

/// Bandwidth in MiB/s for `bytes` moved in `duration_us`.
pub fn bandwidth_mbps(bytes: usize, duration_us: u64) -> f64 {
    per_second(bytes as f64, duration_us) / (1024.0 * 1024.0)
}

/// Record a host/device copy.
pub fn record_transfer(bytes: usize, direction: TransferDirection, duration_us: u64) {
    tracing::debug!(
        event = "transfer",
        bytes = bytes,
        direction = direction.as_str(),
        duration_us = duration_us,
        bandwidth_mbps = bandwidth_mbps(bytes, duration_us),
        "data_transfer"
    );
}

/// Record a device buffer allocation.
pub fn record_allocation(bytes: usize, device: &str, duration_us: u64) {
    tracing::debug!(
        event = "allocation",
        bytes = bytes,
        device = device,
        duration_us = duration_us,
        "device_allocation"
    );
}

/// Record a fused kernel launch on the device.
pub fn record_kernel(kernel: &str, elements: usize, duration_us: u64) {
    tracing::debug!(
        event = "kernel",
        kernel = kernel,
        elements = elements,
        duration_us = duration_us,
        melems_per_sec = per_second(elements as f64, duration_us) / 1_000_000.0,
        "device_kernel"
    );
}

/// Record one host-side assignment statement.
pub fn record_evaluation(op: &str, elements: usize, parallel: bool, duration_us: u64) {
    tracing::debug!(
        event = "evaluation",
        op = op,
        elements = elements,
        parallel = parallel,
        duration_us = duration_us,
        melems_per_sec = per_second(elements as f64, duration_us) / 1_000_000.0,
        "statement_evaluated"
    );
}
