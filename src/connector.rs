//! Connector: the input terminal. Owns a bounded inbound queue and a
//! dispatcher thread that drains it into a user-supplied handler.

use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

use crate::document::Document;
use crate::error::{GraphError, Result};
use crate::info::TerminalInfo;
use crate::processor::Processor;
use crate::socket::Socket;
use crate::terminal::{protocols_compatible, Terminal, TerminalCore, TerminalKind};

/// A handler bound to the owning Processor: receives one document and a
/// handle back to the Processor it's attached to (so it can, say, forward
/// onto one of that Processor's own sockets), per call. May fail (logged
/// and swallowed by the dispatcher).
pub type Handler = Box<dyn FnMut(Document, &Processor) -> Result<()> + Send>;

const DRAIN_POLL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Accepting,
    Running,
    Draining,
    Aborted,
}

struct ConnectorState {
    phase: Phase,
    suspended: bool,
}

/// Weak handle back to the owning Processor, used only so a Connector's
/// dispatcher thread can report drain completion.
#[derive(Clone)]
pub(crate) struct OwnerHandle(pub(crate) Weak<crate::processor::Inner>);

impl OwnerHandle {
    fn upgrade(&self) -> Option<Processor> {
        self.0.upgrade().map(Processor::from_inner)
    }
}

pub struct Connector {
    core: TerminalCore,
    attached_sockets: Mutex<Vec<Weak<Socket>>>,
    sender: Sender<Document>,
    receiver: Receiver<Document>,
    state: Mutex<ConnectorState>,
    cv: Condvar,
    handler: Mutex<Option<Handler>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    owner: OwnerHandle,
    is_default: bool,
    doc_target: String,
}

impl Connector {
    pub(crate) fn new(
        name: String,
        protocol: Option<String>,
        owner_name: String,
        description: Option<String>,
        is_default: bool,
        capacity: usize,
        handler: Handler,
        owner: OwnerHandle,
        doc_target: String,
    ) -> Arc<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));
        Arc::new(Connector {
            core: TerminalCore::new(name, protocol, owner_name, description),
            attached_sockets: Mutex::new(Vec::new()),
            sender,
            receiver,
            state: Mutex::new(ConnectorState {
                phase: Phase::Idle,
                suspended: false,
            }),
            cv: Condvar::new(),
            handler: Mutex::new(Some(handler)),
            dispatcher: Mutex::new(None),
            owner,
            is_default,
            doc_target,
        })
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    pub fn owner_processor(&self) -> Option<Processor> {
        self.owner.upgrade()
    }

    /// Current queue depth. Approximate but adequate for diagnostics and
    /// the abort/drain testable properties of §8.
    pub fn queue_len(&self) -> usize {
        self.receiver.len()
    }

    pub fn accepting(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Accepting | Phase::Running)
    }

    pub fn running(&self) -> bool {
        matches!(self.state.lock().phase, Phase::Running | Phase::Draining)
    }

    pub fn suspended(&self) -> bool {
        self.state.lock().suspended
    }

    /// Idle -> accepting-only. No-op if already running (or already
    /// accepting-only).
    pub fn accept_incoming(&self) {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Idle) {
            state.phase = Phase::Accepting;
        }
    }

    /// Start the dispatcher thread if it isn't already running.
    pub fn run(self: &Arc<Self>) -> Result<()> {
        let mut state = self.state.lock();
        if matches!(state.phase, Phase::Running | Phase::Draining) {
            return Ok(());
        }
        state.phase = Phase::Running;
        state.suspended = false;
        drop(state);

        let conn = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("connector-{}", self.core.name))
            .spawn(move || dispatcher_loop(conn))
            .map_err(GraphError::Io)?;
        *self.dispatcher.lock() = Some(handle);
        Ok(())
    }

    pub fn suspend(&self) {
        let mut state = self.state.lock();
        state.suspended = true;
        self.cv.notify_all();
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.suspended = false;
        self.cv.notify_all();
    }

    /// Enter draining: stop accepting new items, let the dispatcher finish
    /// what's queued, then report back to the owner.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !matches!(state.phase, Phase::Running) {
            return;
        }
        state.phase = Phase::Draining;
        state.suspended = false;
        self.cv.notify_all();
    }

    /// Hard cancel: discard the queue, stop the dispatcher immediately.
    pub fn abort(&self) {
        {
            let mut state = self.state.lock();
            state.phase = Phase::Aborted;
            state.suspended = false;
            self.cv.notify_all();
        }
        if let Some(handle) = self.dispatcher.lock().take() {
            let _ = handle.join();
        }
        while self.receiver.try_recv().is_ok() {}
        let mut state = self.state.lock();
        state.phase = Phase::Idle;
    }

    /// Enqueue a document. Blocks the caller if the bounded queue is full
    /// (this is the backpressure point). Silently refuses if not accepting.
    pub fn receive(&self, doc: Document) -> Result<()> {
        if !self.accepting() {
            return Err(GraphError::NotAccepting {
                processor: self.core.owner.clone(),
                connector: self.core.name.clone(),
            });
        }
        self.sender
            .send(doc)
            .map_err(|_| GraphError::NotAccepting {
                processor: self.core.owner.clone(),
                connector: self.core.name.clone(),
            })
    }

    pub(crate) fn attach_socket(&self, socket: &Arc<Socket>) {
        let mut attached = self.attached_sockets.lock();
        if !attached.iter().any(|w| w.as_ptr() == Arc::as_ptr(socket)) {
            attached.push(Arc::downgrade(socket));
        }
    }

    pub(crate) fn detach_socket(&self, socket: &Arc<Socket>) {
        let mut attached = self.attached_sockets.lock();
        attached.retain(|w| w.as_ptr() != Arc::as_ptr(socket));
    }
}

fn dispatcher_loop(conn: Arc<Connector>) {
    loop {
        {
            let mut state = conn.state.lock();
            while state.suspended && !matches!(state.phase, Phase::Aborted) {
                conn.cv.wait(&mut state);
            }
            if matches!(state.phase, Phase::Aborted) {
                return;
            }
        }

        match conn.receiver.recv_timeout(DRAIN_POLL) {
            Ok(doc) => {
                if let Some(owner) = conn.owner.upgrade() {
                    let mut guard = conn.handler.lock();
                    if let Some(handler) = guard.as_mut() {
                        if let Err(err) = handler(doc, &owner) {
                            tracing::warn!(
                                target: conn.doc_target.as_str(),
                                connector = conn.core.name.as_str(),
                                error = %err,
                                "connector handler failed; continuing"
                            );
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let state = conn.state.lock();
                if matches!(state.phase, Phase::Aborted) {
                    return;
                }
                if matches!(state.phase, Phase::Draining) && conn.receiver.is_empty() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    {
        let mut state = conn.state.lock();
        if matches!(state.phase, Phase::Aborted) {
            return;
        }
        state.phase = Phase::Idle;
    }
    if let Some(owner) = conn.owner.upgrade() {
        owner.production_stopped(false);
    }
}

impl Terminal for Connector {
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
        TerminalKind::Connector
    }

    fn get_connections(&self, peer: Option<&str>, peer_terminal_name: Option<&str>) -> Vec<TerminalInfo> {
        self.attached_sockets
            .lock()
            .iter()
            .filter_map(|w| w.upgrade())
            .filter(|s| peer.map_or(true, |p| s.owner() == p))
            .filter(|s| peer_terminal_name.map_or(true, |n| s.name() == n))
            .map(|s| TerminalInfo::new(s.kind(), s.owner().into(), s.name().into(), s.protocol().map(String::from), s.description().map(String::from), Vec::new()))
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

/// Protocol-compatibility check between a socket and this connector, per §4.1.
pub(crate) fn compatible(socket: &Socket, connector: &Connector) -> bool {
    protocols_compatible(socket.protocol(), connector.protocol())
}
