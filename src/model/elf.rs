//! `ProgramModel` backed by an ELF file: functions come from the symbol
//! table, control-flow edges from decoding the text sections.

use super::{FunctionInfo, ProgramModel};
use crate::arch::Arch;
use crate::dis::Dis;
use object::{Object, ObjectSection, ObjectSymbol, SectionKind, SymbolKind};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("io")]
    Io(#[from] std::io::Error),
    #[error("object")]
    Object(#[from] object::Error),
    #[error(transparent)]
    Arch(#[from] crate::arch::UnsupportedArch),
    #[error("disassembly")]
    Dis(#[from] crate::dis::DisError),
}

pub struct ElfModel {
    /// sorted by start address
    functions: Vec<FunctionInfo>,
    /// program order
    insn_addrs: Vec<u64>,
    crefs_to: HashMap<u64, Vec<u64>>,
    crefs_from: HashMap<u64, Vec<u64>>,
}

impl ElfModel {
    pub fn from_path(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read(path)?;
        Self::from_bytes(&raw)
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, ModelError> {
        let file = object::File::parse(raw)?;
        let arch = Arch::from_object(file.architecture())?;
        let dis = Dis::new(arch)?;

        let mut functions: Vec<FunctionInfo> = file
            .symbols()
            .filter(|s| s.kind() == SymbolKind::Text && s.size() > 0)
            .map(|s| FunctionInfo {
                name: s.name().unwrap_or("?").to_string(),
                start: s.address(),
                end: s.address() + s.size(),
            })
            .collect();
        functions.sort_by_key(|f| f.start);
        functions.dedup_by_key(|f| f.start);

        if functions.is_empty() {
            warn!("no function symbols found, nothing will be instrumented");
        }

        let mut insn_addrs = Vec::new();
        let mut crefs_to: HashMap<u64, Vec<u64>> = HashMap::new();
        let mut crefs_from: HashMap<u64, Vec<u64>> = HashMap::new();

        for section in file.sections().filter(|s| s.kind() == SectionKind::Text) {
            let data = section.data()?;
            let decoded = dis.decode_all(data, section.address())?;

            debug!(
                "decoded {} instructions in {}",
                decoded.len(),
                section.name().unwrap_or("?")
            );

            for insn in &decoded {
                insn_addrs.push(insn.address);

                if let Some(target) = insn.flow_target() {
                    crefs_from.entry(insn.address).or_default().push(target);
                    crefs_to.entry(target).or_default().push(insn.address);
                }
            }
        }

        // sections are not necessarily visited in address order
        insn_addrs.sort_unstable();

        Ok(Self {
            functions,
            insn_addrs,
            crefs_to,
            crefs_from,
        })
    }
}

impl ProgramModel for ElfModel {
    fn functions(&self) -> Vec<FunctionInfo> {
        self.functions.clone()
    }

    fn function_containing(&self, addr: u64) -> Option<FunctionInfo> {
        let idx = self.functions.partition_point(|f| f.start <= addr);
        if idx == 0 {
            return None;
        }

        let f = &self.functions[idx - 1];
        f.contains(addr).then(|| f.clone())
    }

    fn is_function_start(&self, addr: u64) -> bool {
        self.functions
            .binary_search_by_key(&addr, |f| f.start)
            .is_ok()
    }

    fn instruction_addrs(&self) -> Vec<u64> {
        self.insn_addrs.clone()
    }

    fn crefs_to(&self, addr: u64) -> Vec<u64> {
        self.crefs_to.get(&addr).cloned().unwrap_or_default()
    }

    fn crefs_from(&self, addr: u64) -> Vec<u64> {
        self.crefs_from.get(&addr).cloned().unwrap_or_default()
    }
}
