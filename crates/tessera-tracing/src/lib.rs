//! Shared tracing setup for the tessera workspace.
//!
//! Binaries, benches and tests install their `tracing` subscriber through
//! this crate so that every consumer sees the same filter resolution,
//! output formats and field redaction. The [`performance`] module and the
//! [`perf_span!`], [`perf_event!`] and [`timed_block!`] macros provide the
//! standard events the tensor core emits for transfers, kernel launches and
//! statement evaluation.
//!
//! ```rust
//! use tessera_tracing::{build_subscriber, TracingConfig, TracingOutput};
//!
//! let config = TracingConfig {
//!     output: TracingOutput::Compact,
//!     ..TracingConfig::for_ci()
//! };
//! assert!(build_subscriber(&config).is_ok());
//! ```

pub mod performance;

#[macro_use]
pub mod macros;

use std::collections::HashSet;
use std::env;
use std::fmt::{self, Write as _};
use std::sync::Arc;

pub use tracing;
pub use tracing::{debug, error, info, trace, warn};

use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::Subscriber;
use tracing_subscriber::field::RecordFields;
use tracing_subscriber::fmt::format::{FmtSpan, Writer};
use tracing_subscriber::fmt::FormatFields;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Directives applied by the performance preset
pub const PERFORMANCE_DIRECTIVES: &str = "tessera_core=trace,tessera_backends=debug";

/// Configuration describing how the shared subscriber behaves.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Explicit filter directives. When absent, `RUST_LOG` is consulted and
    /// then [`default_directive`](Self::default_directive).
    pub directives: Option<String>,
    /// Filter used when nothing else resolves.
    pub default_directive: String,
    /// Print event targets (module paths).
    pub include_targets: bool,
    /// ANSI colours; ignored for JSON output.
    pub ansi: bool,
    /// Span lifecycle events to emit.
    pub span_events: FmtSpan,
    pub output: TracingOutput,
    /// Field names whose values are replaced before formatting.
    pub redacted_fields: Vec<String>,
    pub redaction_text: String,
    /// Whether [`performance::PerformanceSpan`]s log on drop.
    pub enable_performance_tracing: bool,
    /// Minimum span duration in microseconds worth logging.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Human-readable output for a developer terminal.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            redacted_fields: Vec::new(),
            redaction_text: "***REDACTED***".to_string(),
            enable_performance_tracing: cfg!(debug_assertions),
            performance_threshold_us: None,
        }
    }

    /// JSON lines without colour, for CI and log collectors.
    pub fn for_ci() -> Self {
        Self {
            ansi: false,
            output: TracingOutput::Json,
            enable_performance_tracing: false,
            ..Self::for_local()
        }
    }

    /// JSON output with span close events and every performance span logged.
    pub fn for_performance() -> Self {
        Self {
            directives: Some(PERFORMANCE_DIRECTIVES.to_string()),
            span_events: FmtSpan::CLOSE,
            enable_performance_tracing: true,
            ..Self::for_ci()
        }
    }

    /// Build a configuration from environment hints.
    ///
    /// # Environment Variables
    ///
    /// - `TESSERA_LOG_PROFILE` - `local` (default), `ci` or `performance`
    /// - `TESSERA_LOG` - filter directives
    /// - `TESSERA_LOG_FORMAT` - `pretty`, `compact` or `json`
    /// - `TESSERA_LOG_REDACT` - comma-separated field names to redact
    /// - `TESSERA_PERF_TRACING` - `true`/`1`/`yes` to enable performance spans
    /// - `TESSERA_PERF_THRESHOLD_US` - minimum logged span duration
    pub fn from_env() -> Self {
        let profile = env::var("TESSERA_LOG_PROFILE")
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "performance" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Some(directives) = non_empty_var("TESSERA_LOG") {
            config.directives = Some(directives);
        }

        if let Some(output) = non_empty_var("TESSERA_LOG_FORMAT").and_then(|v| TracingOutput::parse(&v)) {
            config.output = output;
            if output == TracingOutput::Json {
                config.ansi = false;
            }
        }

        if let Some(fields) = non_empty_var("TESSERA_LOG_REDACT") {
            config.redacted_fields = fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(flag) = non_empty_var("TESSERA_PERF_TRACING") {
            config.enable_performance_tracing =
                flag == "1" || flag.eq_ignore_ascii_case("true") || flag.eq_ignore_ascii_case("yes");
        }

        if let Some(threshold) = non_empty_var("TESSERA_PERF_THRESHOLD_US") {
            if let Ok(us) = threshold.parse::<u64>() {
                config.performance_threshold_us = Some(us);
            }
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Output format of the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    /// Usually means a global subscriber is already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Build a subscriber for the configuration without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let (filter, layer) = subscriber_layers(config)?;
    Ok(Registry::default().with(layer).with(filter))
}

/// Filter and formatting layers, for callers composing their own registry.
pub fn subscriber_layers(config: &TracingConfig) -> Result<(EnvFilter, BoxedLayer), TracingSetupError> {
    let filter = config.resolve_filter()?;
    let redaction = RedactingFields::from_config(config);
    let base = tracing_fmt::layer()
        .with_target(config.include_targets)
        .with_span_events(config.span_events.clone());

    let layer: BoxedLayer = match config.output {
        TracingOutput::Compact => {
            let layer = base.compact().with_ansi(config.ansi);
            match redaction {
                Some(fields) => Box::new(layer.fmt_fields(fields)),
                None => Box::new(layer),
            }
        }
        TracingOutput::Pretty => {
            let layer = base.pretty().with_ansi(config.ansi);
            match redaction {
                Some(fields) => Box::new(layer.fmt_fields(fields)),
                None => Box::new(layer),
            }
        }
        TracingOutput::Json => {
            let layer = base.json().with_ansi(false);
            match redaction {
                Some(fields) => Box::new(layer.fmt_fields(fields.json())),
                None => Box::new(layer),
            }
        }
    };

    Ok((filter, layer))
}

/// Install the configured subscriber process-wide and apply its
/// performance settings.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?.try_init()?;
    performance::configure(config.enable_performance_tracing, config.performance_threshold_us);
    Ok(())
}

/// Best-effort subscriber for tests: captured test output, `RUST_LOG` filter.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Field formatter that replaces the values of configured fields.
#[derive(Clone)]
struct RedactingFields {
    redacted: Arc<HashSet<String>>,
    replacement: Arc<str>,
    json: bool,
}

impl RedactingFields {
    fn from_config(config: &TracingConfig) -> Option<Self> {
        if config.redacted_fields.is_empty() {
            return None;
        }
        Some(Self {
            redacted: Arc::new(config.redacted_fields.iter().cloned().collect()),
            replacement: Arc::from(config.redaction_text.as_str()),
            json: false,
        })
    }

    fn json(self) -> Self {
        Self { json: true, ..self }
    }
}

impl<'writer> FormatFields<'writer> for RedactingFields {
    fn format_fields<R: RecordFields>(&self, mut writer: Writer<'writer>, fields: R) -> fmt::Result {
        let mut collector = FieldCollector {
            values: JsonMap::new(),
            redacted: &self.redacted,
            replacement: &self.replacement,
        };
        fields.record(&mut collector);

        if self.json {
            let serialized = serde_json::to_string(&JsonValue::Object(collector.values)).map_err(|_| fmt::Error)?;
            return writer.write_str(&serialized);
        }

        for (index, (key, value)) in collector.values.iter().enumerate() {
            if index > 0 {
                writer.write_char(' ')?;
            }
            write!(writer, "{key}={value}")?;
        }
        Ok(())
    }
}

struct FieldCollector<'a> {
    values: JsonMap<String, JsonValue>,
    redacted: &'a HashSet<String>,
    replacement: &'a str,
}

impl FieldCollector<'_> {
    fn insert(&mut self, field: &tracing::field::Field, value: JsonValue) {
        let value = if self.redacted.contains(field.name()) {
            JsonValue::String(self.replacement.to_string())
        } else {
            value
        };
        self.values.insert(field.name().to_string(), value);
    }
}

impl tracing::field::Visit for FieldCollector<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.insert(field, JsonValue::String(format!("{value:?}")));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.insert(field, JsonValue::Number(value.into()));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.insert(field, JsonValue::Number(value.into()));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.insert(field, JsonValue::Bool(value));
    }

    fn record_f64(&mut self, field: &tracing::field::Field, value: f64) {
        let value = JsonNumber::from_f64(value)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.insert(field, JsonValue::String(value.to_string()));
    }

    fn record_error(&mut self, field: &tracing::field::Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, JsonValue::String(value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const ENV_KEYS: &[&str] = &[
        "TESSERA_LOG_PROFILE",
        "TESSERA_LOG",
        "TESSERA_LOG_FORMAT",
        "TESSERA_LOG_REDACT",
        "TESSERA_PERF_TRACING",
        "TESSERA_PERF_THRESHOLD_US",
        "RUST_LOG",
    ];

    fn reset_env() {
        for key in ENV_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn rejects_invalid_directive() {
        reset_env();
        let config = TracingConfig {
            directives: Some("=::invalid".to_string()),
            ..TracingConfig::default()
        };
        assert!(matches!(build_subscriber(&config), Err(TracingSetupError::InvalidFilter(_))));
    }

    #[test]
    #[serial]
    fn builds_every_output_with_redaction() {
        reset_env();
        for output in [TracingOutput::Compact, TracingOutput::Pretty, TracingOutput::Json] {
            let config = TracingConfig {
                output,
                redacted_fields: vec!["values".to_string()],
                ..TracingConfig::default()
            };
            assert!(build_subscriber(&config).is_ok());
        }
    }

    #[test]
    #[serial]
    fn from_env_reads_profile_format_and_redaction() {
        reset_env();
        env::set_var("TESSERA_LOG_PROFILE", "ci");
        env::set_var("TESSERA_LOG_FORMAT", "compact");
        env::set_var("TESSERA_LOG", "tessera_core=debug");
        env::set_var("TESSERA_LOG_REDACT", "values, seed");

        let config = TracingConfig::from_env();
        assert_eq!(config.directives.as_deref(), Some("tessera_core=debug"));
        assert!(!config.ansi);
        assert_eq!(config.output, TracingOutput::Compact);
        assert_eq!(config.redacted_fields, vec!["values", "seed"]);
        reset_env();
    }

    #[test]
    #[serial]
    fn from_env_reads_performance_settings() {
        reset_env();
        env::set_var("TESSERA_PERF_TRACING", "yes");
        env::set_var("TESSERA_PERF_THRESHOLD_US", "250");

        let config = TracingConfig::from_env();
        assert!(config.enable_performance_tracing);
        assert_eq!(config.performance_threshold_us, Some(250));
        reset_env();
    }

    #[test]
    #[serial]
    fn performance_profile_from_env() {
        reset_env();
        env::set_var("TESSERA_LOG_PROFILE", "performance");

        let config = TracingConfig::from_env();
        assert!(config.enable_performance_tracing);
        assert_eq!(config.output, TracingOutput::Json);
        assert_eq!(config.directives.as_deref(), Some(PERFORMANCE_DIRECTIVES));
        reset_env();
    }
}
