//! Gateway errors.
//!
//! Management and proxy failures never surface as HTTP errors: the routing
//! layer renders them as `{"ERROR": ...}` envelopes with status 200.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Bad input. SIGNATURE not found")]
    MissingSignature,

    #[error("Bad signature {signature}. Available signatures: {available:?}")]
    UnknownSignature {
        signature: String,
        available: Vec<String>,
    },

    #[error("Signature {0} already started")]
    AlreadyRunning(String),

    #[error("Gateway is shutting down, {0} not started")]
    ShuttingDown(String),

    #[error("Signature {0} is a support process and has no routes")]
    NotRoutable(String),

    #[error("Could not find support process {0}")]
    SupportMissing(String),

    #[error("Process failed for {args:?}:{host}:{port}")]
    Spawn {
        args: Vec<String>,
        host: String,
        port: String,
    },

    #[error("{0}")]
    Upstream(String),

    #[error("Default server '{server}' did not answer path discovery: {reason}")]
    Handshake { server: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("State history error: {0}")]
    State(#[from] crate::state_history::StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Message for an upstream call that failed at the transport level.
///
/// Within `grace` of the child's start the child is assumed to still be
/// initialising.
pub fn upstream_message(
    url: &str,
    since_start: Duration,
    grace: Duration,
    reason: &str,
) -> String {
    let stage = if since_start < grace {
        "probably is still in INIT stage"
    } else {
        "probably is DOWN"
    };
    format!(
        "Server '{}' is not responding ({:.1}s from start) - {}: {}",
        url,
        since_start.as_secs_f64(),
        stage,
        reason
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_cold_start() {
        let msg = upstream_message(
            "http://127.0.0.1:5003/run",
            Duration::from_millis(12_340),
            Duration::from_secs(70),
            "connection refused",
        );
        assert_eq!(
            msg,
            "Server 'http://127.0.0.1:5003/run' is not responding (12.3s from start) - \
             probably is still in INIT stage: connection refused"
        );
    }

    #[test]
    fn test_upstream_message_down() {
        let msg = upstream_message(
            "http://127.0.0.1:5003/run",
            Duration::from_secs(300),
            Duration::from_secs(70),
            "connection refused",
        );
        assert!(msg.contains("(300.0s from start) - probably is DOWN: connection refused"));
    }

    #[test]
    fn test_unknown_signature_lists_available() {
        let err = Error::UnknownSignature {
            signature: "nope".into(),
            available: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            r#"Bad signature nope. Available signatures: ["a", "b"]"#
        );
    }
}
