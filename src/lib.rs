//! procweave: the processor-graph runtime core of a streaming
//! document-processing framework.
//!
//! Processors are connected by attaching a producer's [`Socket`] to a
//! subscriber's [`Connector`]; the runtime owns bringing the resulting graph
//! up in dependency order, pushing documents through it with backpressure,
//! and tearing it down on stop/abort/restart. See the module docs on
//! [`processor`] for the lifecycle state machine.

pub mod config;
pub mod connector;
pub mod document;
pub mod error;
pub mod flags;
pub mod info;
pub mod logging;
pub mod processor;
pub mod socket;
pub mod terminal;

pub use config::ProcessorConfig;
pub use connector::{Connector, Handler};
pub use document::{doc, downcast, Document};
pub use error::{GraphError, Result};
pub use flags::Status;
pub use info::TerminalInfo;
pub use processor::{NoopHooks, Processor, ProcessorBuilder, ProcessorHooks};
pub use socket::{Callback, Socket};
pub use terminal::{Terminal, TerminalKind};
