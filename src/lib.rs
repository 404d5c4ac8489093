#![allow(clippy::derive_partial_eq_without_eq)]

pub mod aggregate;
pub mod arch;
pub mod breakpoints;
pub mod dbg;
pub mod dis;
pub mod events;
pub mod model;
pub mod report;
pub mod session;
