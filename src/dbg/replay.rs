//! A debugger that replays a recorded run instead of touching a live
//! process. It honours the armed-breakpoint set (hits at unarmed addresses
//! pass through silently, like a real target would) and drives a scripted
//! clock so timestamps come from the trace, not the machine.
//!
//! This doubles as the test double for the session state machine.

use super::{DbgError, DebugEvent, Debugger};
use crate::events::Clock;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TraceRecord {
    Hit { tid: u64, addr: u64, t: u64 },
    Suspended,
    Exited,
}

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("io")]
    Io(#[from] std::io::Error),
    #[error("json")]
    Json(#[from] serde_json::Error),
}

/// Reads the shared "current time" the replay advances on every hit.
#[derive(Clone)]
pub struct ScriptClock {
    now: Rc<Cell<u64>>,
}

impl Clock for ScriptClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

pub struct ReplayDebugger {
    records: VecDeque<TraceRecord>,
    /// notifications synthesized by commands (suspend requests)
    pending: VecDeque<DebugEvent>,
    breakpoints: BTreeSet<u64>,
    active: bool,
    suspended: bool,
    now: Rc<Cell<u64>>,
}

impl ReplayDebugger {
    pub fn new(records: Vec<TraceRecord>) -> (Self, ScriptClock) {
        let now = Rc::new(Cell::new(0));
        let clock = ScriptClock { now: now.clone() };

        (
            Self {
                records: records.into(),
                pending: VecDeque::new(),
                breakpoints: BTreeSet::new(),
                active: false,
                suspended: false,
                now,
            },
            clock,
        )
    }

    /// Loads a JSON array of trace records.
    pub fn from_path(path: &Path) -> Result<(Self, ScriptClock), TraceError> {
        let raw = std::fs::read(path)?;
        let records: Vec<TraceRecord> = serde_json::from_slice(&raw)?;

        debug!("loaded {} trace records", records.len());

        Ok(Self::new(records))
    }
}

impl Debugger for ReplayDebugger {
    fn start(&mut self, path: &Path, _args: &str, _cwd: &str) -> Result<(), DbgError> {
        if self.active {
            return Err(DbgError::AlreadyActive);
        }

        debug!("replaying {}", path.display());
        self.active = true;
        self.suspended = false;
        Ok(())
    }

    fn suspend(&mut self, _wait: bool) -> Result<(), DbgError> {
        if !self.active {
            return Err(DbgError::NotActive);
        }

        self.suspended = true;
        self.pending.push_back(DebugEvent::Suspended);
        Ok(())
    }

    fn resume(&mut self, _wait: bool) -> Result<(), DbgError> {
        if !self.active {
            return Err(DbgError::NotActive);
        }

        self.suspended = false;
        Ok(())
    }

    fn set_breakpoint(&mut self, addr: u64) -> Result<(), DbgError> {
        self.breakpoints.insert(addr);
        Ok(())
    }

    fn remove_breakpoint(&mut self, addr: u64) -> Result<(), DbgError> {
        self.breakpoints.remove(&addr);
        Ok(())
    }

    fn breakpoints(&self) -> Vec<u64> {
        self.breakpoints.iter().copied().collect()
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn poll_event(&mut self) -> Option<DebugEvent> {
        if let Some(ev) = self.pending.pop_front() {
            return Some(ev);
        }

        while let Some(rec) = self.records.pop_front() {
            match rec {
                TraceRecord::Hit { tid, addr, t } => {
                    if !self.breakpoints.contains(&addr) {
                        // nothing armed there, the target runs through
                        continue;
                    }

                    self.now.set(t);
                    self.suspended = true;
                    return Some(DebugEvent::BreakpointHit { tid, addr });
                }
                TraceRecord::Suspended => {
                    self.suspended = true;
                    return Some(DebugEvent::Suspended);
                }
                TraceRecord::Exited => {
                    self.active = false;
                    self.suspended = false;
                    return Some(DebugEvent::Exited);
                }
            }
        }

        None
    }
}
