//! Shared terminal identity: the bits common to sockets and connectors.

use crate::info::TerminalInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalKind {
    Socket,
    Connector,
}

/// The identity fields shared by every terminal, regardless of direction.
#[derive(Debug)]
pub(crate) struct TerminalCore {
    pub name: String,
    pub protocol: Option<String>,
    pub owner: String,
    pub description: Option<String>,
}

impl TerminalCore {
    pub fn new(
        name: impl Into<String>,
        protocol: Option<String>,
        owner: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        TerminalCore {
            name: name.into(),
            protocol: normalize_protocol(protocol),
            owner: owner.into(),
            description,
        }
    }
}

fn normalize_protocol(protocol: Option<String>) -> Option<String> {
    protocol.filter(|p| !p.is_empty())
}

/// Two protocol tags are compatible if either side leaves it unset, or both
/// sides name the same tag.
pub(crate) fn protocols_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.filter(|p| !p.is_empty()), b.filter(|p| !p.is_empty())) {
        (None, _) | (_, None) => true,
        (Some(x), Some(y)) => x == y,
    }
}

/// Behavior common to sockets and connectors: identity and snapshotting.
pub trait Terminal {
    fn name(&self) -> &str;
    fn protocol(&self) -> Option<&str>;
    fn owner(&self) -> &str;
    fn description(&self) -> Option<&str>;
    fn kind(&self) -> TerminalKind;

    /// The set of peer terminals currently attached, optionally filtered by
    /// owning processor name and/or peer terminal name.
    fn get_connections(&self, peer: Option<&str>, peer_terminal_name: Option<&str>) -> Vec<TerminalInfo>;

    /// A point-in-time snapshot of this terminal, one level deep.
    fn info(&self) -> TerminalInfo;
}
