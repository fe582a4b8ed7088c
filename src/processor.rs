//! Processor: a named node owning terminals, an optional generator thread,
//! and the graph-wide lifecycle cascade (§4.4).

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::ProcessorConfig;
use crate::connector::{Connector, Handler as ConnectorHandler, OwnerHandle};
use crate::document::Document;
use crate::error::{GraphError, Result};
use crate::flags::{Flags, Status};
use crate::info::TerminalInfo;
use crate::logging::{doc_target, proc_target};
use crate::socket::{Callback, Socket};
use crate::terminal::{Terminal, TerminalKind};

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Hooks a concrete processor implements. All default to no-ops; only
/// `on_open` failures are fatal to the caller (§7).
pub trait ProcessorHooks: Send + Sync {
    fn on_open(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn on_startup(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn on_tick(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn on_shutdown(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn on_suspend(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn on_resume(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn on_abort(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
    fn on_close(&self, _handle: &Processor) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// A Processor that does nothing beyond relaying; a convenience default for
/// processors that only need connectors/sockets and no custom hook logic.
pub struct NoopHooks;
impl ProcessorHooks for NoopHooks {}

struct SocketSpec {
    name: String,
    protocol: Option<String>,
    description: Option<String>,
    is_default: bool,
}

struct ConnectorSpec {
    name: String,
    protocol: Option<String>,
    description: Option<String>,
    is_default: bool,
    capacity: usize,
    handler: ConnectorHandler,
}

/// Builds a [`Processor`]: register sockets/connectors, then `build()`.
pub struct ProcessorBuilder {
    type_name: &'static str,
    config: ProcessorConfig,
    hooks: Box<dyn ProcessorHooks>,
    is_generator: bool,
    keepalive: bool,
    tick_interval: Duration,
    sockets: Vec<SocketSpec>,
    connectors: Vec<ConnectorSpec>,
}

impl ProcessorBuilder {
    pub fn new(type_name: &'static str, hooks: impl ProcessorHooks + 'static, config: ProcessorConfig) -> Self {
        ProcessorBuilder {
            type_name,
            config,
            hooks: Box::new(hooks),
            is_generator: false,
            keepalive: false,
            tick_interval: DEFAULT_TICK_INTERVAL,
            sockets: Vec::new(),
            connectors: Vec::new(),
        }
    }

    pub fn generator(mut self, yes: bool) -> Self {
        self.is_generator = yes;
        self
    }

    pub fn keepalive(mut self, yes: bool) -> Self {
        self.keepalive = yes;
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn socket(self, name: impl Into<String>, protocol: Option<&str>) -> Self {
        self.socket_full(name, protocol, None, false)
    }

    pub fn default_socket(self, name: impl Into<String>, protocol: Option<&str>) -> Self {
        self.socket_full(name, protocol, None, true)
    }

    pub fn socket_full(
        mut self,
        name: impl Into<String>,
        protocol: Option<&str>,
        description: Option<&str>,
        is_default: bool,
    ) -> Self {
        self.sockets.push(SocketSpec {
            name: name.into(),
            protocol: protocol.map(String::from),
            description: description.map(String::from),
            is_default,
        });
        self
    }

    pub fn connector(
        self,
        name: impl Into<String>,
        protocol: Option<&str>,
        capacity: usize,
        handler: ConnectorHandler,
    ) -> Self {
        self.connector_full(name, protocol, None, false, capacity, handler)
    }

    pub fn default_connector(
        self,
        name: impl Into<String>,
        protocol: Option<&str>,
        capacity: usize,
        handler: ConnectorHandler,
    ) -> Self {
        self.connector_full(name, protocol, None, true, capacity, handler)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn connector_full(
        mut self,
        name: impl Into<String>,
        protocol: Option<&str>,
        description: Option<&str>,
        is_default: bool,
        capacity: usize,
        handler: ConnectorHandler,
    ) -> Self {
        self.connectors.push(ConnectorSpec {
            name: name.into(),
            protocol: protocol.map(String::from),
            description: description.map(String::from),
            is_default,
            capacity,
            handler,
        });
        self
    }

    pub fn build(self) -> Result<Processor> {
        let name = self.config.resolve_name(self.type_name);

        let mut seen_sockets = HashSet::new();
        for s in &self.sockets {
            if !seen_sockets.insert(s.name.clone()) {
                return Err(GraphError::DuplicateTerminal {
                    processor: name.clone(),
                    kind: TerminalKind::Socket,
                    name: s.name.clone(),
                });
            }
        }

        let mut seen_connectors = HashSet::new();
        for c in &self.connectors {
            if !seen_connectors.insert(c.name.clone()) {
                return Err(GraphError::DuplicateTerminal {
                    processor: name.clone(),
                    kind: TerminalKind::Connector,
                    name: c.name.clone(),
                });
            }
        }

        let default_socket = self.sockets.iter().find(|s| s.is_default).map(|s| s.name.clone());
        let default_connector = self.connectors.iter().find(|c| c.is_default).map(|c| c.name.clone());

        let doc_target_str = doc_target(self.type_name, &name);
        let proc_target_str = proc_target(self.type_name, &name);

        let processor = Processor(Arc::new_cyclic(|weak| {
            let owner = OwnerHandle(weak.clone());

            let mut sockets = HashMap::new();
            for spec in self.sockets {
                sockets.insert(
                    spec.name.clone(),
                    Arc::new(Socket::new(spec.name, spec.protocol, name.clone(), spec.description, spec.is_default, doc_target_str.clone())),
                );
            }

            let mut connectors = HashMap::new();
            for spec in self.connectors {
                connectors.insert(
                    spec.name.clone(),
                    Connector::new(
                        spec.name,
                        spec.protocol,
                        name.clone(),
                        spec.description,
                        spec.is_default,
                        spec.capacity,
                        spec.handler,
                        owner.clone(),
                        doc_target_str.clone(),
                    ),
                );
            }

            Inner {
                type_name: self.type_name,
                name,
                config: self.config,
                hooks: self.hooks,
                is_generator: self.is_generator,
                keepalive: self.keepalive,
                tick_interval: self.tick_interval,
                sockets: RwLock::new(sockets),
                connectors: RwLock::new(connectors),
                default_socket: RwLock::new(default_socket),
                default_connector: RwLock::new(default_connector),
                flags: Mutex::new(Flags::default()),
                cv: Condvar::new(),
                worker: Mutex::new(None),
                proc_target: proc_target_str,
                doc_target: doc_target_str,
            }
        }));
        Ok(processor)
    }
}

pub(crate) struct Inner {
    type_name: &'static str,
    name: String,
    config: ProcessorConfig,
    hooks: Box<dyn ProcessorHooks>,
    is_generator: bool,
    keepalive: bool,
    tick_interval: Duration,
    sockets: RwLock<HashMap<String, Arc<Socket>>>,
    connectors: RwLock<HashMap<String, Arc<Connector>>>,
    default_socket: RwLock<Option<String>>,
    default_connector: RwLock<Option<String>>,
    flags: Mutex<Flags>,
    cv: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
    proc_target: String,
    doc_target: String,
}

/// A cheaply-cloneable handle to a node in the processor graph. Hooks
/// receive `&Processor` so they can reach their own sockets/connectors
/// (e.g. a generator's `on_tick` calling `handle.socket("out").send(doc)`).
#[derive(Clone)]
pub struct Processor(Arc<Inner>);

impl Processor {
    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Processor(inner)
    }

    fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn type_name(&self) -> &str {
        self.0.type_name
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.0.config
    }

    pub fn is_generator(&self) -> bool {
        self.0.is_generator
    }

    pub fn keepalive(&self) -> bool {
        self.0.keepalive
    }

    pub fn status(&self) -> Status {
        self.0.flags.lock().status()
    }

    pub fn runchan_count(&self) -> i64 {
        self.0.flags.lock().runchan_count
    }

    pub fn socket(&self, name: &str) -> Option<Arc<Socket>> {
        self.0.sockets.read().get(name).cloned()
    }

    pub fn connector(&self, name: &str) -> Option<Arc<Connector>> {
        self.0.connectors.read().get(name).cloned()
    }

    fn resolve_socket(&self, name: Option<&str>) -> Result<Arc<Socket>> {
        let sockets = self.0.sockets.read();
        match name {
            Some(n) => sockets.get(n).cloned().ok_or_else(|| GraphError::TerminalNotFound {
                processor: self.name().into(),
                kind: TerminalKind::Socket,
                name: n.into(),
            }),
            None => {
                if sockets.len() == 1 {
                    return Ok(sockets.values().next().cloned().unwrap());
                }
                if let Some(default_name) = self.0.default_socket.read().clone() {
                    if let Some(s) = sockets.get(&default_name) {
                        return Ok(s.clone());
                    }
                }
                Err(GraphError::AmbiguousTerminal {
                    processor: self.name().into(),
                    kind: TerminalKind::Socket,
                })
            }
        }
    }

    fn resolve_connector(&self, name: Option<&str>) -> Result<Arc<Connector>> {
        let connectors = self.0.connectors.read();
        match name {
            Some(n) => connectors.get(n).cloned().ok_or_else(|| GraphError::TerminalNotFound {
                processor: self.name().into(),
                kind: TerminalKind::Connector,
                name: n.into(),
            }),
            None => {
                if connectors.len() == 1 {
                    return Ok(connectors.values().next().cloned().unwrap());
                }
                if let Some(default_name) = self.0.default_connector.read().clone() {
                    if let Some(c) = connectors.get(&default_name) {
                        return Ok(c.clone());
                    }
                }
                Err(GraphError::AmbiguousTerminal {
                    processor: self.name().into(),
                    kind: TerminalKind::Connector,
                })
            }
        }
    }

    /// External injection: equivalent to what an attached Socket would do,
    /// without needing one.
    pub fn put(&self, doc: Document, connector_name: Option<&str>) -> Result<()> {
        let connector = self.resolve_connector(connector_name)?;
        if !connector.accepting() {
            return Err(GraphError::NotAccepting {
                processor: self.name().into(),
                connector: connector.name().to_string(),
            });
        }
        connector.receive(doc)
    }

    /// Tap a socket's raw output without a full connector.
    pub fn add_callback(&self, socket_name: Option<&str>, cb: Callback) -> Result<()> {
        let socket = self.resolve_socket(socket_name)?;
        socket.add_callback(cb);
        Ok(())
    }

    pub fn socket_info(&self, names: &[&str]) -> Vec<TerminalInfo> {
        let sockets = self.0.sockets.read();
        if names.is_empty() {
            sockets.values().map(|s| s.info()).collect()
        } else {
            names.iter().filter_map(|n| sockets.get(*n)).map(|s| s.info()).collect()
        }
    }

    pub fn connector_info(&self, names: &[&str]) -> Vec<TerminalInfo> {
        let connectors = self.0.connectors.read();
        if names.is_empty() {
            connectors.values().map(|c| c.info()).collect()
        } else {
            names.iter().filter_map(|n| connectors.get(*n)).map(|c| c.info()).collect()
        }
    }

    /// Connect `producer`'s socket to `subscriber`'s connector, after a
    /// protocol-compliance check (§4.1).
    pub fn subscribe(
        producer: &Processor,
        socket_name: Option<&str>,
        subscriber: &Processor,
        connector_name: Option<&str>,
    ) -> Result<()> {
        let socket = producer.resolve_socket(socket_name)?;
        let connector = subscriber.resolve_connector(connector_name)?;
        if !crate::connector::compatible(&socket, &connector) {
            return Err(GraphError::ProtocolMismatch {
                socket: socket.name().to_string(),
                socket_protocol: socket.protocol().map(String::from),
                connector: connector.name().to_string(),
                connector_protocol: connector.protocol().map(String::from),
            });
        }
        socket.attach(connector);
        Ok(())
    }

    pub fn unsubscribe(
        producer: &Processor,
        socket_name: Option<&str>,
        subscriber: &Processor,
        connector_name: Option<&str>,
    ) -> Result<()> {
        let socket = producer.resolve_socket(socket_name)?;
        let connector = subscriber.resolve_connector(connector_name)?;
        socket.detach(&connector);
        Ok(())
    }

    /// Processors reachable through this Processor's sockets, each visited
    /// once, in the order their owning connector was first encountered.
    fn subscribers(&self) -> Vec<Processor> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for socket in self.0.sockets.read().values() {
            for connector in socket.attached_connectors() {
                if let Some(p) = connector.owner_processor() {
                    if seen.insert(p.id()) {
                        out.push(p);
                    }
                }
            }
        }
        out
    }

    fn run_handler<F>(&self, hook: &'static str, f: F)
    where
        F: FnOnce() -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>,
    {
        if let Err(err) = f() {
            tracing::warn!(target: self.0.proc_target.as_str(), hook, error = %err, "handler failed; swallowed");
        }
    }

    // ---- lifecycle --------------------------------------------------

    pub fn start(&self) -> Result<()> {
        {
            let flags = self.0.flags.lock();
            if flags.stopping || flags.restarting {
                return Err(GraphError::InvalidLifecycleTransition {
                    processor: self.name().into(),
                    action: "start".into(),
                    state: flags.status().to_string(),
                });
            }
            if flags.running {
                return Ok(());
            }
        }
        let mut visited = HashSet::new();
        self.setup_cascade(&mut visited)?;
        let mut visited = HashSet::new();
        self.accept_cascade(&mut visited);
        let mut visited = HashSet::new();
        self.run_cascade(&mut visited)?;
        Ok(())
    }

    fn setup_cascade(&self, visited: &mut HashSet<usize>) -> Result<()> {
        if !visited.insert(self.id()) {
            return Ok(());
        }
        let already = self.0.flags.lock().initialized;
        if !already {
            tracing::debug!(target: self.0.proc_target.as_str(), "on_open");
            self.0
                .hooks
                .on_open(self)
                .map_err(|e| GraphError::handler_failure(self.name(), "on_open", StringError(e.to_string())))?;
            self.0.flags.lock().initialized = true;
        }
        for sub in self.subscribers() {
            sub.setup_cascade(visited)?;
        }
        Ok(())
    }

    fn accept_cascade(&self, visited: &mut HashSet<usize>) {
        if !visited.insert(self.id()) {
            return;
        }
        {
            let mut flags = self.0.flags.lock();
            if flags.stopping {
                return;
            }
            flags.accepting = true;
        }
        for connector in self.0.connectors.read().values() {
            connector.accept_incoming();
        }
        for sub in self.subscribers() {
            sub.accept_cascade(visited);
        }
    }

    fn run_cascade(&self, visited: &mut HashSet<usize>) -> Result<()> {
        if !visited.insert(self.id()) {
            return Ok(());
        }
        let connectors: Vec<_> = self.0.connectors.read().values().cloned().collect();
        for connector in &connectors {
            connector.run()?;
        }
        {
            let mut flags = self.0.flags.lock();
            flags.runchan_count += connectors.len() as i64;
            flags.aborted = false;
            flags.stopping = false;
            flags.suspended = false;
            flags.running = true;
        }
        // Bring subscribers up before this processor starts producing, so
        // downstream is already dispatching by the time an upstream
        // generator's first tick fires (§2: "downstream is ready to receive
        // before upstream emits").
        for sub in self.subscribers() {
            sub.run_cascade(visited)?;
        }
        if self.0.is_generator {
            self.spawn_worker()?;
        }
        Ok(())
    }

    fn spawn_worker(&self) -> Result<()> {
        let proc = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("processor-{}", self.name()))
            .spawn(move || generator_loop(proc))
            .map_err(GraphError::Io)?;
        *self.0.worker.lock() = Some(handle);
        Ok(())
    }

    /// Called by a Connector's dispatcher when it finishes draining, or by
    /// the generator worker on its own shutdown path. `restarting` is only
    /// ever true when called from the generator worker during a `restart()`.
    pub(crate) fn production_stopped(&self, restarting: bool) {
        if restarting {
            let mut flags = self.0.flags.lock();
            flags.runchan_count -= 1;
            flags.stopping = false;
            flags.running = false;
            drop(flags);
            self.0.cv.notify_all();
            return;
        }

        let reached_zero = {
            let mut flags = self.0.flags.lock();
            flags.runchan_count -= 1;
            flags.runchan_count <= 0
        };
        if !reached_zero {
            return;
        }
        {
            let mut flags = self.0.flags.lock();
            flags.stopping = false;
            flags.running = false;
        }
        self.0.cv.notify_all();
        self.close();
        for sub in self.subscribers() {
            if !sub.keepalive() {
                let _ = sub.stop();
            }
        }
    }

    fn close(&self) {
        self.run_handler("on_close", || self.0.hooks.on_close(self));
        self.0.flags.lock().initialized = false;
        self.0.cv.notify_all();
    }

    fn initiate_stop(&self) -> Result<()> {
        let (blocked, restarting) = {
            let flags = self.0.flags.lock();
            (flags.stopping || !flags.running, flags.restarting)
        };
        if blocked {
            return Ok(());
        }
        {
            let mut flags = self.0.flags.lock();
            flags.accepting = false;
            flags.stopping = true;
        }
        let connectors: Vec<_> = self.0.connectors.read().values().cloned().collect();
        for connector in &connectors {
            if restarting {
                connector.suspend();
            } else {
                connector.stop();
            }
        }
        if restarting && !self.0.is_generator {
            // Nothing asynchronous will report completion; clear running
            // directly so `restart()`'s wait unblocks.
            let mut flags = self.0.flags.lock();
            flags.stopping = false;
            flags.running = false;
            drop(flags);
            self.0.cv.notify_all();
        }
        Ok(())
    }

    pub fn stop(&self) -> Result<()> {
        if self.0.flags.lock().restarting {
            return Ok(());
        }
        self.initiate_stop()
    }

    pub fn abort(&self) -> Result<()> {
        {
            let flags = self.0.flags.lock();
            if flags.aborted || !flags.running {
                return Ok(());
            }
        }
        let connectors: Vec<_> = self.0.connectors.read().values().cloned().collect();
        for connector in &connectors {
            connector.abort();
        }
        {
            let mut flags = self.0.flags.lock();
            flags.aborted = true;
            flags.accepting = false;
            flags.running = false;
            flags.stopping = false;
            flags.restarting = false;
        }
        self.0.cv.notify_all();
        self.run_handler("on_abort", || self.0.hooks.on_abort(self));
        if !self.0.is_generator {
            self.close();
        }
        for sub in self.subscribers() {
            let _ = sub.abort();
        }
        Ok(())
    }

    pub fn suspend(&self) -> Result<()> {
        {
            let mut flags = self.0.flags.lock();
            if flags.suspended {
                return Ok(());
            }
            flags.suspended = true;
        }
        self.run_handler("on_suspend", || self.0.hooks.on_suspend(self));
        for connector in self.0.connectors.read().values() {
            connector.suspend();
        }
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        {
            let mut flags = self.0.flags.lock();
            if !flags.suspended {
                return Ok(());
            }
            flags.suspended = false;
        }
        self.run_handler("on_resume", || self.0.hooks.on_resume(self));
        for connector in self.0.connectors.read().values() {
            connector.resume();
        }
        Ok(())
    }

    pub fn restart(&self) -> Result<()> {
        if self.0.flags.lock().stopping {
            return Ok(());
        }
        if !self.0.flags.lock().running {
            return self.start();
        }
        self.0.flags.lock().restarting = true;
        self.initiate_stop()?;
        self.wait_until(|f| !f.running);
        self.restart_start()
    }

    fn restart_start(&self) -> Result<()> {
        {
            let mut flags = self.0.flags.lock();
            flags.accepting = true;
        }
        for connector in self.0.connectors.read().values() {
            connector.accept_incoming();
            connector.resume();
        }
        {
            let mut flags = self.0.flags.lock();
            flags.restarting = false;
            flags.stopping = false;
            flags.suspended = false;
            flags.running = true;
        }
        if self.0.is_generator {
            self.spawn_worker()?;
        }
        Ok(())
    }

    /// Block until `running` is false (and, transitively, `restarting` is
    /// false), then join the worker thread if any.
    pub fn wait(&self) {
        self.wait_until(|f| !f.running && !f.restarting);
        if let Some(handle) = self.0.worker.lock().take() {
            let _ = handle.join();
        }
    }

    fn wait_until(&self, pred: impl Fn(&Flags) -> bool) {
        let mut flags = self.0.flags.lock();
        while !pred(&flags) {
            self.0.cv.wait(&mut flags);
        }
    }
}

/// Adapter: wraps a plain string as a `std::error::Error` so hook failures
/// (which arrive as boxed trait objects) can flow through `GraphError::handler_failure`.
#[derive(Debug)]
struct StringError(String);
impl std::fmt::Display for StringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for StringError {}

fn generator_loop(proc: Processor) {
    {
        let mut flags = proc.0.flags.lock();
        flags.runchan_count += 1;
    }
    proc.run_handler("on_startup", || proc.0.hooks.on_startup(&proc));

    loop {
        if !proc.0.flags.lock().running {
            break;
        }
        std::thread::sleep(proc.0.tick_interval);
        let (stopping, restarting, suspended, running, is_last) = {
            let flags = proc.0.flags.lock();
            (flags.stopping, flags.restarting, flags.suspended, flags.running, flags.runchan_count <= 1)
        };
        if !running {
            break;
        }
        if stopping && (restarting || is_last) {
            proc.run_handler("on_shutdown", || proc.0.hooks.on_shutdown(&proc));
            proc.production_stopped(restarting);
            break;
        } else if !suspended {
            proc.run_handler("on_tick", || proc.0.hooks.on_tick(&proc));
        }
    }

    let aborted = proc.0.flags.lock().aborted;
    if aborted {
        proc.close();
        let mut flags = proc.0.flags.lock();
        flags.runchan_count -= 1;
    }
}
