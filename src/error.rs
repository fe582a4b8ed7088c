//! Error types for the processor-graph runtime core.

use std::fmt;

use crate::terminal::TerminalKind;

/// Result type that uses [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error(
        "protocol mismatch: socket '{socket}' (protocol={socket_protocol:?}) is not compatible \
         with connector '{connector}' (protocol={connector_protocol:?})"
    )]
    ProtocolMismatch {
        socket: String,
        socket_protocol: Option<String>,
        connector: String,
        connector_protocol: Option<String>,
    },

    #[error("duplicate {kind} '{name}' on processor '{processor}'")]
    DuplicateTerminal {
        processor: String,
        kind: TerminalKind,
        name: String,
    },

    #[error("processor '{processor}' has more than one {kind} and no default is set")]
    AmbiguousTerminal {
        processor: String,
        kind: TerminalKind,
    },

    #[error("{kind} '{name}' not found on processor '{processor}'")]
    TerminalNotFound {
        processor: String,
        kind: TerminalKind,
        name: String,
    },

    #[error("connector '{connector}' on processor '{processor}' is not currently accepting input")]
    NotAccepting { processor: String, connector: String },

    #[error("processor '{processor}' cannot {action} while {state}")]
    InvalidLifecycleTransition {
        processor: String,
        action: String,
        state: String,
    },

    #[error("handler '{hook}' on processor '{processor}' failed: {source}")]
    HandlerFailure {
        processor: String,
        hook: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to spawn worker thread: {0}")]
    Io(#[from] std::io::Error),
}

impl GraphError {
    /// Construct a [`GraphError::HandlerFailure`] from any error, tagging it with
    /// the hook name that produced it (`on_open`, `on_tick`, a connector handler, ...).
    pub fn handler_failure(
        processor: impl Into<String>,
        hook: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GraphError::HandlerFailure {
            processor: processor.into(),
            hook: hook.into(),
            source: Box::new(source),
        }
    }
}

impl fmt::Display for TerminalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalKind::Socket => write!(f, "socket"),
            TerminalKind::Connector => write!(f, "connector"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_mismatch_message_names_both_sides() {
        let err = GraphError::ProtocolMismatch {
            socket: "out".into(),
            socket_protocol: Some("json".into()),
            connector: "in".into(),
            connector_protocol: Some("xml".into()),
        };
        let msg = err.to_string();
        assert!(msg.contains("out"));
        assert!(msg.contains("in"));
        assert!(msg.contains("json"));
        assert!(msg.contains("xml"));
    }

    #[test]
    fn terminal_kind_display() {
        assert_eq!(TerminalKind::Socket.to_string(), "socket");
        assert_eq!(TerminalKind::Connector.to_string(), "connector");
    }
}
