//! The debugger side of the profiler: commands go in through [`Debugger`],
//! notifications come back out of [`Debugger::poll_event`] one at a time.

pub mod replay;

pub use replay::ReplayDebugger;

use std::path::Path;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DebugEvent {
    BreakpointHit { tid: u64, addr: u64 },
    Suspended,
    Exited,
}

#[derive(Error, Debug)]
pub enum DbgError {
    #[error("no target process")]
    NotActive,
    #[error("target already running")]
    AlreadyActive,
    #[error("breakpoint rejected at {0:#x}")]
    BreakpointRejected(u64),
}

pub trait Debugger {
    fn start(&mut self, path: &Path, args: &str, cwd: &str) -> Result<(), DbgError>;
    fn suspend(&mut self, wait: bool) -> Result<(), DbgError>;
    fn resume(&mut self, wait: bool) -> Result<(), DbgError>;
    fn set_breakpoint(&mut self, addr: u64) -> Result<(), DbgError>;
    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), DbgError>;

    /// The debugger's own breakpoint table, the source of truth for what
    /// is actually armed.
    fn breakpoints(&self) -> Vec<u64>;

    fn is_active(&self) -> bool;
    fn is_suspended(&self) -> bool;

    /// Next pending notification, delivered serially. `None` when the
    /// target has nothing more to say.
    fn poll_event(&mut self) -> Option<DebugEvent>;
}
