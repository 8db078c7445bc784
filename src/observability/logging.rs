//! Structured logging for the submission pipeline
//!
//! Events are emitted through `tracing`. In JSON mode every event carries the
//! fields of the span it happened in, so a line logged deep inside
//! classification still shows the submission's `request_id` and, once
//! validated, its `ticket`.
//!
//! ## Environment Variables
//!
//! - `LOG_LEVEL`: level for railwatch's own events (ERROR, WARN, INFO, DEBUG, TRACE), default INFO
//! - `LOG_FORMAT`: `json` (default), `pretty` or `compact`
//! - `LOG_SPANS`: `true` to also log span open/close events
//! - `RUST_LOG`: replaces the computed filter entirely
//!
//! ```bash
//! LOG_FORMAT=pretty LOG_LEVEL=DEBUG ./railwatch run
//! ```

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Multi-line, coloured
    Pretty,
    /// Single-line, coloured, no targets
    Compact,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything unrecognised is JSON
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Resolved logging options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub include_spans: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Json,
            include_spans: false,
        }
    }
}

impl LogSettings {
    /// Build from raw variable values; `None` means unset
    pub fn from_values(level: Option<&str>, format: Option<&str>, spans: Option<&str>) -> Self {
        let defaults = Self::default();
        Self {
            level: level.map_or(defaults.level, parse_level),
            format: format.map_or(defaults.format, LogFormat::parse),
            include_spans: spans.is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
        }
    }

    pub fn from_env() -> Self {
        let level = env::var("LOG_LEVEL").ok();
        let format = env::var("LOG_FORMAT").ok();
        let spans = env::var("LOG_SPANS").ok();
        Self::from_values(level.as_deref(), format.as_deref(), spans.as_deref())
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

/// Filter directives for a given level.
///
/// Dependencies are held at `warn`; warp's request trace follows `level` so
/// one access line per request survives.
pub fn filter_directives(level: Level) -> Vec<String> {
    let level = level.to_string().to_lowercase();
    vec![
        "warn".to_string(),
        format!("railwatch={level}"),
        format!("warp::filters::trace={level}"),
        "hyper=warn".to_string(),
        "reqwest=warn".to_string(),
        "h2=warn".to_string(),
        "rustls=warn".to_string(),
    ]
}

fn build_filter(level: Level) -> EnvFilter {
    if let Ok(rust_log) = env::var("RUST_LOG") {
        return EnvFilter::new(rust_log);
    }
    EnvFilter::new(filter_directives(level).join(","))
}

/// JSON layer that copies the current span's fields onto every event
pub fn json_layer<S, W>(writer: W, span_events: FmtSpan) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_span_events(span_events)
        .with_writer(writer)
}

/// Install the global subscriber
pub fn init_logging(settings: LogSettings) {
    let subscriber = tracing_subscriber::registry().with(build_filter(settings.level));

    match settings.format {
        LogFormat::Json => {
            subscriber
                .with(json_layer(std::io::stdout, settings.span_events()))
                .init();
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer()
                .pretty()
                .with_ansi(true)
                .with_span_events(settings.span_events());
            subscriber.with(fmt_layer).init();
        }
        LogFormat::Compact => {
            let fmt_layer = fmt::layer()
                .compact()
                .with_ansi(true)
                .with_target(false)
                .with_span_events(settings.span_events());
            subscriber.with(fmt_layer).init();
        }
    }
}

/// Install the global subscriber from `LOG_*` variables
pub fn init_default_logging() {
    init_logging(LogSettings::from_env());
}

/// Span covering one submission. `ticket` and `outcome` start empty and are
/// recorded by the workflow as they become known.
#[macro_export]
macro_rules! submission_span {
    ($($field:tt)*) => {
        tracing::info_span!(
            "submission",
            $($field)*,
            ticket = tracing::field::Empty,
            outcome = tracing::field::Empty
        )
    };
}

/// Span around a classifier call
#[macro_export]
macro_rules! classify_span {
    ($($field:tt)*) => {
        tracing::info_span!("classification", $($field)*)
    };
}

/// Service start/stop span
#[macro_export]
macro_rules! lifecycle_span {
    ($($field:tt)*) => {
        tracing::info_span!("lifecycle_event", $($field)*)
    };
}

pub use {classify_span, lifecycle_span, submission_span};

/// Map a `LOG_LEVEL` value onto a tracing level, defaulting to INFO
pub fn parse_level(value: &str) -> Level {
    match value.trim().to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn lines(&self) -> Vec<serde_json::Value> {
            let bytes = self.0.lock().unwrap().clone();
            String::from_utf8(bytes)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect()
        }
    }

    #[test]
    fn test_json_events_carry_submission_fields() {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber =
            tracing_subscriber::registry().with(json_layer(move || writer.clone(), FmtSpan::NONE));

        tracing::subscriber::with_default(subscriber, || {
            let span = submission_span!(request_id = "req-1");
            let _entered = span.enter();
            tracing::info!("validated");
            span.record("ticket", "PNR123");
            tracing::info!("routed");
        });

        let lines = capture.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["span"]["request_id"], "req-1");
        assert!(lines[0]["span"].get("ticket").is_none());
        assert_eq!(lines[1]["span"]["request_id"], "req-1");
        assert_eq!(lines[1]["span"]["ticket"], "PNR123");
        assert_eq!(lines[1]["span"]["name"], "submission");
    }

    #[test]
    fn test_settings_from_values() {
        assert_eq!(LogSettings::from_values(None, None, None), LogSettings::default());

        let settings = LogSettings::from_values(Some(" debug "), Some(" Pretty\n"), Some("TRUE"));
        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, LogFormat::Pretty);
        assert!(settings.include_spans);

        let settings = LogSettings::from_values(Some("loud"), Some("xml"), Some("yes"));
        assert_eq!(settings.level, Level::INFO);
        assert_eq!(settings.format, LogFormat::Json);
        assert!(!settings.include_spans);
    }

    #[test]
    fn test_filter_keeps_request_trace_at_service_level() {
        let directives = filter_directives(Level::DEBUG);
        assert!(directives.contains(&"railwatch=debug".to_string()));
        assert!(directives.contains(&"warp::filters::trace=debug".to_string()));
        assert!(directives.contains(&"hyper=warn".to_string()));
        assert!(EnvFilter::try_new(directives.join(",")).is_ok());
    }
}
