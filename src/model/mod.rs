//! Read-only view of the analysed program: which functions exist, which
//! function an address belongs to, and where control flow can enter or
//! leave an instruction. The profiler itself never mutates any of this.

pub mod elf;

pub use elf::ElfModel;

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionInfo {
    pub name: String,
    /// entry address, also the function's identity
    pub start: u64,
    /// exclusive
    pub end: u64,
}

impl FunctionInfo {
    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}

pub trait ProgramModel {
    /// All known functions, stable order.
    fn functions(&self) -> Vec<FunctionInfo>;

    fn function_containing(&self, addr: u64) -> Option<FunctionInfo>;

    fn is_function_start(&self, addr: u64) -> bool;

    /// Every code instruction address, in program order.
    fn instruction_addrs(&self) -> Vec<u64>;

    /// Addresses of instructions that can branch/call to `addr`.
    fn crefs_to(&self, addr: u64) -> Vec<u64>;

    /// Addresses `addr` can branch/call to (explicit targets only).
    fn crefs_from(&self, addr: u64) -> Vec<u64>;
}

/// Selects the instrumentation points: one address per basic block.
///
/// Single forward pass over the instructions in program order. An
/// instruction starts a block when it is the first one selected at all,
/// when it is a function entry, when something other than its predecessor
/// branches to it, or when its predecessor branches somewhere else.
/// Instructions outside any known function are skipped entirely.
pub fn block_starts(model: &dyn ProgramModel) -> Vec<u64> {
    let mut starts = Vec::new();

    let mut first = true;
    let mut prev: Option<u64> = None;

    for addr in model.instruction_addrs() {
        if model.function_containing(addr).is_none() {
            prev = Some(addr);
            continue;
        }

        let entered_sideways = model.crefs_to(addr).iter().any(|&src| Some(src) != prev);
        let left_sideways = prev
            .map(|p| model.crefs_from(p).iter().any(|&dst| dst != addr))
            .unwrap_or(false);

        if first || model.is_function_start(addr) || entered_sideways || left_sideways {
            first = false;
            starts.push(addr);
        }

        prev = Some(addr);
    }

    starts
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::{FunctionInfo, ProgramModel};

    /// In-memory model built from explicit tables.
    pub struct FlatModel {
        pub functions: Vec<FunctionInfo>,
        pub insns: Vec<u64>,
        /// (from, to) branch edges
        pub edges: Vec<(u64, u64)>,
    }

    impl ProgramModel for FlatModel {
        fn functions(&self) -> Vec<FunctionInfo> {
            self.functions.clone()
        }

        fn function_containing(&self, addr: u64) -> Option<FunctionInfo> {
            self.functions.iter().find(|f| f.contains(addr)).cloned()
        }

        fn is_function_start(&self, addr: u64) -> bool {
            self.functions.iter().any(|f| f.start == addr)
        }

        fn instruction_addrs(&self) -> Vec<u64> {
            self.insns.clone()
        }

        fn crefs_to(&self, addr: u64) -> Vec<u64> {
            self.edges
                .iter()
                .filter(|(_, to)| *to == addr)
                .map(|(from, _)| *from)
                .collect()
        }

        fn crefs_from(&self, addr: u64) -> Vec<u64> {
            self.edges
                .iter()
                .filter(|(from, _)| *from == addr)
                .map(|(_, to)| *to)
                .collect()
        }
    }
}
