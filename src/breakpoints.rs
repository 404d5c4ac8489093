//! Owns the instrumentation breakpoints for one session. Placement and
//! removal failures are warnings, the run continues with whatever coverage
//! it got.

use crate::dbg::Debugger;
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct BreakpointController {
    placed: BTreeSet<u64>,
}

impl BreakpointController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a breakpoint at every address. Idempotent, addresses already
    /// armed by this controller are skipped.
    pub fn place_all(&mut self, dbg: &mut dyn Debugger, addrs: &BTreeSet<u64>) {
        for &addr in addrs {
            if self.placed.contains(&addr) {
                continue;
            }

            match dbg.set_breakpoint(addr) {
                Ok(()) => {
                    self.placed.insert(addr);
                }
                Err(e) => warn!("could not arm breakpoint at {:#x}: {}", addr, e),
            }
        }

        info!("{} breakpoints armed", self.placed.len());
    }

    /// Disarms everything this controller placed. Must run on every way out
    /// of a session so breakpoints don't leak into the next run.
    pub fn remove_all(&mut self, dbg: &mut dyn Debugger) {
        let placed = std::mem::take(&mut self.placed);
        let count = placed.len();

        for addr in placed {
            if let Err(e) = dbg.remove_breakpoint(addr) {
                warn!("could not remove breakpoint at {:#x}: {}", addr, e);
            }
        }

        if count > 0 {
            info!("{} breakpoints removed", count);
        }
    }

    /// What is actually armed right now, per the debugger's own table.
    pub fn armed(&self, dbg: &dyn Debugger) -> Vec<u64> {
        dbg.breakpoints()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbg::{DbgError, DebugEvent};
    use std::path::Path;

    /// Counts calls and rejects a configured address.
    #[derive(Default)]
    struct FakeDbg {
        table: BTreeSet<u64>,
        set_calls: usize,
        reject: Option<u64>,
    }

    impl Debugger for FakeDbg {
        fn start(&mut self, _: &Path, _: &str, _: &str) -> Result<(), DbgError> {
            Ok(())
        }
        fn suspend(&mut self, _: bool) -> Result<(), DbgError> {
            Ok(())
        }
        fn resume(&mut self, _: bool) -> Result<(), DbgError> {
            Ok(())
        }
        fn set_breakpoint(&mut self, addr: u64) -> Result<(), DbgError> {
            self.set_calls += 1;
            if self.reject == Some(addr) {
                return Err(DbgError::BreakpointRejected(addr));
            }
            self.table.insert(addr);
            Ok(())
        }
        fn remove_breakpoint(&mut self, addr: u64) -> Result<(), DbgError> {
            self.table.remove(&addr);
            Ok(())
        }
        fn breakpoints(&self) -> Vec<u64> {
            self.table.iter().copied().collect()
        }
        fn is_active(&self) -> bool {
            true
        }
        fn is_suspended(&self) -> bool {
            false
        }
        fn poll_event(&mut self) -> Option<DebugEvent> {
            None
        }
    }

    #[test]
    fn place_all_is_idempotent() {
        let mut dbg = FakeDbg::default();
        let mut ctl = BreakpointController::new();
        let addrs: BTreeSet<u64> = [0x100, 0x104, 0x200].into_iter().collect();

        ctl.place_all(&mut dbg, &addrs);
        let once = ctl.armed(&dbg);

        ctl.place_all(&mut dbg, &addrs);
        let twice = ctl.armed(&dbg);

        assert_eq!(once, twice);
        assert_eq!(dbg.set_calls, 3);
    }

    #[test]
    fn rejected_placement_is_not_fatal() {
        let mut dbg = FakeDbg {
            reject: Some(0x104),
            ..Default::default()
        };
        let mut ctl = BreakpointController::new();
        let addrs: BTreeSet<u64> = [0x100, 0x104, 0x200].into_iter().collect();

        ctl.place_all(&mut dbg, &addrs);

        assert_eq!(ctl.armed(&dbg), vec![0x100, 0x200]);
    }

    #[test]
    fn remove_all_clears_the_table() {
        let mut dbg = FakeDbg::default();
        let mut ctl = BreakpointController::new();
        let addrs: BTreeSet<u64> = [0x100, 0x200].into_iter().collect();

        ctl.place_all(&mut dbg, &addrs);
        ctl.remove_all(&mut dbg);

        assert!(ctl.armed(&dbg).is_empty());
        assert!(ctl.is_empty());
    }
}
