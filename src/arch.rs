use capstone::prelude::BuildsCapstone;
use capstone::Capstone;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arch {
    ARM64,
    X86_64,
}

#[derive(thiserror::Error, Debug)]
#[error("unsupported architecture: {0:?}")]
pub struct UnsupportedArch(pub object::Architecture);

impl Arch {
    pub fn from_object(arch: object::Architecture) -> Result<Self, UnsupportedArch> {
        match arch {
            object::Architecture::Aarch64 => Ok(Arch::ARM64),
            object::Architecture::X86_64 => Ok(Arch::X86_64),
            other => Err(UnsupportedArch(other)),
        }
    }

    pub fn make_capstone(&self) -> Result<Capstone, capstone::Error> {
        let cs = Capstone::new();

        match self {
            Arch::ARM64 => cs
                .arm64()
                .mode(capstone::arch::arm64::ArchMode::Arm)
                .detail(true)
                .build(),
            Arch::X86_64 => cs
                .x86()
                .mode(capstone::arch::x86::ArchMode::Mode64)
                .detail(true)
                .build(),
        }
    }
}
