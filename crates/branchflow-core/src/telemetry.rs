//! Log subscriber setup for the branchflow binary.
//!
//! Logs go to stderr so the outcome on stdout stays parseable. Lines emitted
//! during a pipeline run carry the `operation` and `run_id` fields of its
//! [`OperationSpan`](crate::obs::OperationSpan).

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "BRANCHFLOW_LOG";

/// Targets raised to debug by `--verbose`.
const OWN_TARGETS: [&str; 3] = ["branchflow", "branchflow_core", "branchflow_state"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Debug output from branchflow's own crates.
    pub verbose: bool,
    /// Newline-delimited JSON instead of text.
    pub json: bool,
}

impl LogOptions {
    /// Directives used when no filter variable is set.
    pub fn default_directives(&self) -> String {
        let mut directives = vec!["warn".to_string()];
        if self.verbose {
            directives.extend(OWN_TARGETS.iter().map(|t| format!("{t}=debug")));
        }
        directives.join(",")
    }

    /// First parseable filter among `BRANCHFLOW_LOG` and `RUST_LOG`, else the
    /// defaults.
    fn filter_with(&self, lookup: impl Fn(&str) -> Option<String>) -> EnvFilter {
        [LOG_ENV, "RUST_LOG"]
            .into_iter()
            .filter_map(|key| lookup(key))
            .filter(|value| !value.trim().is_empty())
            .find_map(|value| EnvFilter::try_new(value).ok())
            .unwrap_or_else(|| EnvFilter::new(self.default_directives()))
    }
}

/// Install the global subscriber. Only the first call takes effect.
pub fn init_tracing(options: LogOptions) {
    let filter = options.filter_with(|key| std::env::var(key).ok());
    let registry = tracing_subscriber::registry().with(filter);

    if options.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(options.verbose)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn quiet_by_default() {
        assert_eq!(LogOptions::default().default_directives(), "warn");
    }

    #[test]
    fn verbose_raises_own_crates_only() {
        let directives = LogOptions {
            verbose: true,
            json: false,
        }
        .default_directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("branchflow_core=debug"));
        assert!(directives.contains("branchflow_state=debug"));
    }

    #[test]
    fn branchflow_log_wins_over_rust_log() {
        let env: HashMap<&str, &str> = [
            (LOG_ENV, "branchflow_state=trace"),
            ("RUST_LOG", "info"),
        ]
        .into_iter()
        .collect();
        let filter = LogOptions::default().filter_with(|k| env.get(k).map(|v| v.to_string()));
        let rendered = filter.to_string();
        assert!(rendered.contains("branchflow_state=trace"));
        assert!(!rendered.contains("info"));
    }

    #[test]
    fn blank_variables_fall_back_to_defaults() {
        let filter = LogOptions {
            verbose: true,
            json: false,
        }
        .filter_with(|k| (k == LOG_ENV).then(|| "  ".to_string()));
        assert!(filter.to_string().contains("branchflow_core=debug"));
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(LogOptions::default());
        init_tracing(LogOptions {
            verbose: true,
            json: true,
        });
    }
}
