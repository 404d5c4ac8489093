//! One profiling run, start to report.
//!
//! The session is a state machine driven by debugger notifications:
//! Idle -> Suspending -> Armed -> Running -> Exited -> Reported. It owns
//! the event log, the breakpoint controller and the armed-address set;
//! nothing here is shared across sessions.
//!
//! The core is logically single-threaded: notifications arrive serially,
//! one `handle_event` call at a time, and the target is fully stopped
//! while a handler runs. This relies on the event source never delivering
//! reentrantly; a host that cannot guarantee that must serialize calls
//! into the session (a mutex around the session does).

use crate::aggregate::{self, Aggregation};
use crate::breakpoints::BreakpointController;
use crate::dbg::{DbgError, DebugEvent, Debugger};
use crate::events::{Clock, Event, EventLog};
use crate::model::{self, ProgramModel};
use crate::report::{self, ReportContext, ReportError};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Suspending,
    Armed,
    Running,
    Exited,
    Reported,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("a profiling session is already active")]
    AlreadyActive,
    #[error("debugger")]
    Debugger(#[from] DbgError),
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub target: PathBuf,
    pub args: String,
    pub cwd: String,
    pub template: PathBuf,
    pub output: PathBuf,
}

pub struct Session<'m, D: Debugger, C: Clock> {
    dbg: D,
    clock: C,
    model: &'m dyn ProgramModel,
    cfg: SessionConfig,
    phase: Phase,
    log: EventLog,
    bps: BreakpointController,
    targets: BTreeSet<u64>,
}

impl<'m, D: Debugger, C: Clock> Session<'m, D, C> {
    pub fn new(dbg: D, clock: C, model: &'m dyn ProgramModel, cfg: SessionConfig) -> Self {
        Self {
            dbg,
            clock,
            model,
            cfg,
            phase: Phase::Idle,
            log: EventLog::new(),
            bps: BreakpointController::new(),
            targets: BTreeSet::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn debugger(&self) -> &D {
        &self.dbg
    }

    pub fn events_recorded(&self) -> usize {
        self.log.len()
    }

    /// Starts profiling. Exactly one session may be live; a second start
    /// request is rejected.
    pub fn begin(&mut self) -> Result<(), SessionError> {
        if self.phase != Phase::Idle {
            return Err(SessionError::AlreadyActive);
        }

        self.targets = model::block_starts(self.model).into_iter().collect();
        info!(
            "profiling {}: {} instrumentation points",
            self.cfg.target.display(),
            self.targets.len()
        );

        if self.dbg.is_active() && !self.dbg.is_suspended() {
            // breakpoints can only be placed while the target is stopped
            info!("suspending the target");
            self.dbg.suspend(true)?;
            self.phase = Phase::Suspending;
        } else if self.dbg.is_active() {
            self.arm();
            self.dbg.resume(true)?;
            self.phase = Phase::Running;
        } else {
            self.arm();
            info!("launching the target");
            let target = self.cfg.target.clone();
            self.dbg.start(&target, &self.cfg.args, &self.cfg.cwd)?;
            self.phase = Phase::Running;
        }

        Ok(())
    }

    fn arm(&mut self) {
        self.bps.place_all(&mut self.dbg, &self.targets);
        self.phase = Phase::Armed;
    }

    /// Handles one notification. Never blocks, never panics; control goes
    /// straight back to the caller so the next notification can come in.
    pub fn handle_event(&mut self, event: DebugEvent) {
        match event {
            DebugEvent::BreakpointHit { tid, addr } => {
                self.log.record(addr, self.clock.now_ms());
                debug!("breakpoint at {:#x}, thread {}", addr, tid);

                // resume no matter what, the target must never stay
                // stopped on our account
                if let Err(e) = self.dbg.resume(true) {
                    warn!("could not resume after breakpoint: {}", e);
                }
            }
            DebugEvent::Suspended => {
                if self.phase == Phase::Suspending {
                    self.arm();
                    info!("resuming the target");
                    if let Err(e) = self.dbg.resume(true) {
                        warn!("could not resume the target: {}", e);
                    }
                    self.phase = Phase::Running;
                } else {
                    debug!("ignoring suspend notification in {:?}", self.phase);
                }
            }
            DebugEvent::Exited => self.finish(),
        }
    }

    /// Pumps notifications until the session is reported or the source
    /// dries up. A stream that ends without an exit notification still
    /// tears the breakpoints down.
    pub fn run(&mut self) {
        while let Some(event) = self.dbg.poll_event() {
            self.handle_event(event);

            if self.phase == Phase::Reported {
                return;
            }
        }

        warn!("event stream ended without a process exit");
        self.teardown();
    }

    fn finish(&mut self) {
        self.phase = Phase::Exited;
        info!("target exited, {} events recorded", self.log.len());

        let events = self.log.drain();
        let armed = self.bps.armed(&self.dbg);
        let agg = aggregate::aggregate(&events, &armed, self.model);

        if let Err(e) = self.write_report(&events, &agg) {
            error!("report generation failed: {}", e);
        }

        // teardown runs regardless of the report's fate
        self.teardown();
        self.phase = Phase::Reported;
    }

    fn write_report(&self, events: &[Event], agg: &Aggregation) -> Result<(), ReportError> {
        let template = report::load_template(&self.cfg.template)?;

        let name = self.cfg.target.display().to_string();
        let ctx = ReportContext {
            input_name: &name,
            events,
            agg,
            model: self.model,
        };

        let rendered = report::render(&template, &ctx);
        report::write_atomic(&self.cfg.output, &rendered)?;

        info!("report written to {}", self.cfg.output.display());
        Ok(())
    }

    /// Removes every breakpoint this session armed. Reachable from every
    /// termination path, including ones that never see an exit event.
    pub fn teardown(&mut self) {
        self.bps.remove_all(&mut self.dbg);
    }
}

impl<'m, D: Debugger, C: Clock> Drop for Session<'m, D, C> {
    fn drop(&mut self) {
        if !self.bps.is_empty() {
            warn!("session dropped with breakpoints still armed, removing them");
            self.bps.remove_all(&mut self.dbg);
        }
    }
}
