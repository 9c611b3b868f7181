//! Diagnostic output, tuned through the `XLOG_LEVEL` environment variable.
//!
//! The variable selects one of `ERRO`, `WARN`, `INFO` (the default) or
//! `DEBG`. Logging is strictly observational: no library behavior depends
//! on the chosen level. If the embedding application has already installed
//! a `tracing` subscriber of its own, the lazy install below is a no-op
//! and all events flow to that subscriber instead.

use std::{env, io, sync::Once};
use tracing::Level;

const ENV_VAR: &str = "XLOG_LEVEL";

static INSTALL: Once = Once::new();

/// Installs the stderr subscriber on first use. Called from `Node`
/// construction so that standalone use of the library logs out of the box.
pub(crate) fn init() {
    INSTALL.call_once(|| {
        let level = env::var(ENV_VAR).ok().and_then(|v| parse_level(&v)).unwrap_or(Level::INFO);
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_thread_ids(true)
            .with_writer(io::stderr)
            .try_init()
            .ok();
    });
}

fn parse_level(value: &str) -> Option<Level> {
    match value.trim() {
        "ERRO" => Some(Level::ERROR),
        "WARN" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBG" => Some(Level::DEBUG),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::parse_level;
    use tracing::Level;

    #[test]
    fn recognizes_all_four_levels() {
        assert_eq!(parse_level("ERRO"), Some(Level::ERROR), "ERRO must map to the error level");
        assert_eq!(parse_level("WARN"), Some(Level::WARN), "WARN must map to the warn level");
        assert_eq!(parse_level("INFO"), Some(Level::INFO), "INFO must map to the info level");
        assert_eq!(parse_level("DEBG"), Some(Level::DEBUG), "DEBG must map to the debug level");
    }

    #[test]
    fn garbage_falls_through_to_default() {
        assert_eq!(parse_level("TRACE"), None, "unknown names must not pick a level");
        assert_eq!(parse_level(""), None, "empty values must not pick a level");
        assert_eq!(parse_level("info"), None, "level names are uppercase only");
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        assert_eq!(parse_level(" DEBG\n"), Some(Level::DEBUG), "trimmed value must still match");
    }
}
