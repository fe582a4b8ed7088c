//! Socket: the output terminal. A passive fan-out relay with no lifecycle
//! of its own.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::connector::Connector;
use crate::document::Document;
use crate::info::TerminalInfo;
use crate::terminal::{Terminal, TerminalCore, TerminalKind};

/// A raw tap registered via `Processor::add_callback`. Invoked with every
/// document a socket sends, in addition to its attached connectors.
pub type Callback = Box<dyn Fn(&Document) + Send + Sync>;

pub struct Socket {
    core: TerminalCore,
    attached: Mutex<Vec<Arc<Connector>>>,
    callbacks: Mutex<Vec<Callback>>,
    is_default: bool,
    doc_target: String,
}

impl Socket {
    pub(crate) fn new(
        name: String,
        protocol: Option<String>,
        owner_name: String,
        description: Option<String>,
        is_default: bool,
        doc_target: String,
    ) -> Self {
        Socket {
            core: TerminalCore::new(name, protocol, owner_name, description),
            attached: Mutex::new(Vec::new()),
            callbacks: Mutex::new(Vec::new()),
            is_default,
            doc_target,
        }
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Attach a connector; idempotent. Not safe to call concurrently with
    /// `send` (attachments are a stopped-graph-only operation, per §3).
    pub fn attach(self: &Arc<Self>, connector: Arc<Connector>) {
        let mut attached = self.attached.lock();
        if !attached.iter().any(|c| Arc::ptr_eq(c, &connector)) {
            connector.attach_socket(self);
            attached.push(connector);
        }
    }

    pub fn detach(self: &Arc<Self>, connector: &Arc<Connector>) {
        let mut attached = self.attached.lock();
        if let Some(pos) = attached.iter().position(|c| Arc::ptr_eq(c, connector)) {
            attached.remove(pos);
            connector.detach_socket(self);
        }
    }

    pub fn add_callback(&self, cb: Callback) {
        self.callbacks.lock().push(cb);
    }

    pub fn has_output(&self) -> bool {
        !self.attached.lock().is_empty() || !self.callbacks.lock().is_empty()
    }

    pub(crate) fn attached_connectors(&self) -> Vec<Arc<Connector>> {
        self.attached.lock().clone()
    }

    /// Enqueue `doc` into every attached connector that is currently
    /// accepting (blocking on full queues — the backpressure point), drop
    /// it with a warning for connectors that are not, then invoke every
    /// registered raw callback.
    pub fn send(&self, doc: Document) {
        let attached = self.attached.lock().clone();
        for connector in &attached {
            if connector.accepting() {
                if let Err(err) = connector.receive(doc.clone()) {
                    tracing::warn!(
                        target: self.doc_target.as_str(),
                        connector = connector.name(),
                        error = %err,
                        "failed to enqueue document"
                    );
                }
            } else {
                tracing::warn!(
                    target: self.doc_target.as_str(),
                    connector = connector.name(),
                    owner = connector.owner(),
                    "dropping document: connector not accepting"
                );
            }
        }
        let callbacks = self.callbacks.lock();
        for cb in callbacks.iter() {
            cb(&doc);
        }
    }
}

impl Terminal for Socket {
    fn name(&self) -> &str {
        &self.core.name
    }

    fn protocol(&self) -> Option<&str> {
        self.core.protocol.as_deref()
    }

    fn owner(&self) -> &str {
        &self.core.owner
    }

    fn description(&self) -> Option<&str> {
        self.core.description.as_deref()
    }

    fn kind(&self) -> TerminalKind {
        TerminalKind::Socket
    }

    fn get_connections(&self, peer: Option<&str>, peer_terminal_name: Option<&str>) -> Vec<TerminalInfo> {
        self.attached
            .lock()
            .iter()
            .filter(|c| peer.map_or(true, |p| c.owner() == p))
            .filter(|c| peer_terminal_name.map_or(true, |n| c.name() == n))
            .map(|c| {
                TerminalInfo::new(
                    c.kind(),
                    c.owner().into(),
                    c.name().into(),
                    c.protocol().map(String::from),
                    c.description().map(String::from),
                    Vec::new(),
                )
            })
            .collect()
    }

    fn info(&self) -> TerminalInfo {
        let connections = self.get_connections(None, None);
        TerminalInfo::new(
            self.kind(),
            self.owner().into(),
            self.name().into(),
            self.protocol().map(String::from),
            self.description().map(String::from),
            connections,
        )
    }
}
