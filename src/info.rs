//! Point-in-time snapshots of terminals, for introspection and diagnostics.

use crate::terminal::TerminalKind;

/// A snapshot of a terminal's identity and, one level deep, the peers it is
/// currently connected to. Never held onto: it reflects the graph at the
/// moment it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalInfo {
    pub kind: TerminalKind,
    pub owner: String,
    pub name: String,
    pub protocol: Option<String>,
    pub description: Option<String>,
    pub count: usize,
    pub connections: Vec<TerminalInfo>,
}

impl TerminalInfo {
    pub(crate) fn new(
        kind: TerminalKind,
        owner: String,
        name: String,
        protocol: Option<String>,
        description: Option<String>,
        connections: Vec<TerminalInfo>,
    ) -> Self {
        TerminalInfo {
            kind,
            owner,
            name,
            protocol,
            description,
            count: connections.len(),
            connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_tracks_connections_len() {
        let leaf = TerminalInfo::new(
            TerminalKind::Connector,
            "sink".into(),
            "in".into(),
            None,
            None,
            vec![],
        );
        let info = TerminalInfo::new(
            TerminalKind::Socket,
            "source".into(),
            "out".into(),
            Some("json".into()),
            None,
            vec![leaf],
        );
        assert_eq!(info.count, 1);
        assert_eq!(info.connections[0].name, "in");
    }
}
