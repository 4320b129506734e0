//! Logging setup.
//!
//! Logs go to stderr so that CLI output on stdout stays machine-readable.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directive used when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Build the level filter: an explicit level wins, then `RUST_LOG`, then
/// [`DEFAULT_FILTER`].
pub fn build_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(format!("{},sportello={},sportello_core={}", level, level, level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Install the global subscriber. `json` switches to one JSON object per line.
pub fn init_logging(level: Option<&str>, json: bool) -> Result<()> {
    let filter = build_filter(level);

    if json {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level_filter() {
        let f = build_filter(Some("debug"));
        assert!(f.to_string().contains("sportello=debug"));
    }

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let _ = init_logging(Some("warn"), false);
        assert!(init_logging(Some("warn"), true).is_err());
    }
}
