//! Turns the drained event log into per-block and per-function statistics.
//!
//! Time is attributed retroactively: the interval between two consecutive
//! events belongs to the block (and enclosing function) of the *earlier*
//! event, because only the next hit tells us when the block was left. The
//! interval after the very last event has no successor and is dropped.

use crate::events::Event;
use crate::model::ProgramModel;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedBlock {
    pub addr: u64,
    pub hits: u64,
    pub time_ms: u64,
}

impl TimedBlock {
    fn seeded(addr: u64) -> Self {
        Self {
            addr,
            hits: 0,
            time_ms: 0,
        }
    }

    fn hit(&mut self) {
        self.hits += 1;
    }

    fn add_time(&mut self, ms: u64) {
        self.time_ms += ms;
    }

    pub fn was_hit(&self) -> bool {
        self.hits != 0
    }

    pub fn average_ms(&self) -> f64 {
        if self.hits == 0 {
            0.0
        } else {
            self.time_ms as f64 / self.hits as f64
        }
    }
}

#[derive(Debug)]
pub struct Aggregation {
    /// ascending address order; this is also the tie-break order the
    /// stable sorts fall back to
    pub blocks: Vec<TimedBlock>,
    pub functions: Vec<TimedBlock>,
}

/// Single forward pass over the event log. `armed` seeds the block map,
/// the model's functions seed the function map. Events at addresses
/// missing from the maps are a consistency fault: logged, skipped, never
/// fatal.
pub fn aggregate(events: &[Event], armed: &[u64], model: &dyn ProgramModel) -> Aggregation {
    let mut blocks: BTreeMap<u64, TimedBlock> = armed
        .iter()
        .map(|&a| (a, TimedBlock::seeded(a)))
        .collect();

    let mut functions: BTreeMap<u64, TimedBlock> = model
        .functions()
        .iter()
        .map(|f| (f.start, TimedBlock::seeded(f.start)))
        .collect();

    let mut prev: Option<Event> = None;

    for event in events {
        match blocks.get_mut(&event.addr) {
            Some(block) => block.hit(),
            None => warn!("event at {:#x} is missing from the block map", event.addr),
        }

        if model.is_function_start(event.addr) {
            match functions.get_mut(&event.addr) {
                Some(func) => func.hit(),
                None => warn!(
                    "event at {:#x} is missing from the function map",
                    event.addr
                ),
            }
        }

        if let Some(last) = prev {
            // the log is chronological, so this never underflows
            let delta = event.timestamp.saturating_sub(last.timestamp);

            if let Some(block) = blocks.get_mut(&last.addr) {
                block.add_time(delta);
            }

            if let Some(f) = model.function_containing(last.addr) {
                if let Some(func) = functions.get_mut(&f.start) {
                    func.add_time(delta);
                }
            }
        }

        prev = Some(*event);
    }

    Aggregation {
        blocks: blocks.into_values().collect(),
        functions: functions.into_values().collect(),
    }
}

pub fn total_time(rows: &[TimedBlock]) -> u64 {
    rows.iter().map(|b| b.time_ms).sum()
}

pub fn total_hits(rows: &[TimedBlock]) -> u64 {
    rows.iter().map(|b| b.hits).sum()
}

/// How many rows were hit at all, for the report summary.
pub fn hit_rows(rows: &[TimedBlock]) -> usize {
    rows.iter().filter(|b| b.was_hit()).count()
}

/// Zero totals yield 0%, never a division fault.
pub fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * part as f64 / total as f64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SortKey {
    Hits,
    Time,
    AverageTime,
}

/// Full stable sort, descending in the chosen key. Ties keep the input
/// order (ascending address, as produced by [`aggregate`]).
pub fn sorted_by(rows: &[TimedBlock], key: SortKey) -> Vec<TimedBlock> {
    debug!("sorting {} rows by {}", rows.len(), key);

    let mut rows = rows.to_vec();

    match key {
        SortKey::Hits => rows.sort_by(|a, b| b.hits.cmp(&a.hits)),
        SortKey::Time => rows.sort_by(|a, b| b.time_ms.cmp(&a.time_ms)),
        SortKey::AverageTime => rows.sort_by(|a, b| cmp_average(b, a)),
    }

    rows
}

/// Zero-hit rows rank below everything else. Averages compare by
/// cross-multiplication so there is no division at all.
fn cmp_average(a: &TimedBlock, b: &TimedBlock) -> Ordering {
    match (a.hits, b.hits) {
        (0, 0) => Ordering::Equal,
        (0, _) => Ordering::Less,
        (_, 0) => Ordering::Greater,
        _ => {
            let lhs = a.time_ms as u128 * b.hits as u128;
            let rhs = b.time_ms as u128 * a.hits as u128;
            lhs.cmp(&rhs)
        }
    }
}
