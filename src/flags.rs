//! The six lifecycle booleans plus the run-channel accountant, grouped so a
//! cascade step mutates all of them under one lock.

use std::fmt;

/// The externally observable lifecycle state of a [`crate::processor::Processor`],
/// derived from [`Flags`] by [`Flags::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Running,
    Suspended,
    Stopping,
    Restarting,
    Aborted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Stopped => "stopped",
            Status::Running => "running",
            Status::Suspended => "suspended",
            Status::Stopping => "stopping",
            Status::Restarting => "restarting",
            Status::Aborted => "aborted",
        };
        write!(f, "{s}")
    }
}

/// The six status booleans, the `initialized` cascade guard, and the
/// run-channel accountant, held behind a single `parking_lot::Mutex` on the
/// owning Processor so that a cascade step (which touches several of these
/// together) is never observed torn.
#[derive(Debug, Default, Clone, Copy)]
pub struct Flags {
    pub accepting: bool,
    pub running: bool,
    pub suspended: bool,
    pub stopping: bool,
    pub restarting: bool,
    pub aborted: bool,
    pub initialized: bool,
    pub runchan_count: i64,
}

impl Flags {
    /// Status is a pure function of the flags, precedence: aborted >
    /// restarting > stopping > (running & suspended) > running > stopped.
    pub fn status(&self) -> Status {
        if self.aborted {
            Status::Aborted
        } else if self.restarting {
            Status::Restarting
        } else if self.stopping {
            Status::Stopping
        } else if self.running && self.suspended {
            Status::Suspended
        } else if self.running {
            Status::Running
        } else {
            Status::Stopped
        }
    }
}
