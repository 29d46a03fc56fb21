use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::sdram::config::{CommandEncoding, GeometryConfig, ModeConfig, TimingConfig};

/// A device command as issued on one clock edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Command {
    #[default]
    Nop,
    Activate { bank: u32, row: u32 },
    Read { bank: u32, col: u32 },
    Write { bank: u32, col: u32 },
    Precharge { bank: u32 },
    PrechargeAll,
    AutoRefresh,
    LoadMode { value: u32 },
}

impl Command {
    pub fn is_nop(&self) -> bool {
        matches!(self, Command::Nop)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Nop => "NOP",
            Command::Activate { .. } => "ACT",
            Command::Read { .. } => "RD",
            Command::Write { .. } => "WR",
            Command::Precharge { .. } => "PRE",
            Command::PrechargeAll => "PREA",
            Command::AutoRefresh => "REF",
            Command::LoadMode { .. } => "MRS",
        }
    }

    /// Drive the physical command pins for this command.
    pub fn encode(&self, enc: &CommandEncoding, dqm: u8) -> CommandBus {
        let (strobes, bank, addr) = match *self {
            Command::Nop => (enc.nop, 0, 0),
            Command::Activate { bank, row } => (enc.activate, bank, row),
            Command::Read { bank, col } => (enc.read, bank, col),
            Command::Write { bank, col } => (enc.write, bank, col),
            Command::Precharge { bank } => (enc.precharge, bank, 0),
            Command::PrechargeAll => (enc.precharge, 0, 1 << enc.precharge_all_bit),
            Command::AutoRefresh => (enc.auto_refresh, 0, 0),
            Command::LoadMode { value } => (enc.load_mode, 0, value),
        };
        CommandBus {
            strobes,
            addr: addr as u16,
            bank: bank as u8,
            dqm,
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Activate { bank, row } => write!(f, "{} b{} r{:#x}", self.name(), bank, row),
            Command::Read { bank, col } | Command::Write { bank, col } => {
                write!(f, "{} b{} c{:#x}", self.name(), bank, col)
            }
            Command::Precharge { bank } => write!(f, "{} b{}", self.name(), bank),
            Command::LoadMode { value } => write!(f, "{} {:#06x}", self.name(), value),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Physical command-side pins for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandBus {
    /// `{cs_n, ras_n, cas_n, we_n}`, bit 3 down to bit 0.
    pub strobes: u8,
    pub addr: u16,
    pub bank: u8,
    /// One bit per byte lane; a set bit masks the lane.
    pub dqm: u8,
}

impl CommandBus {
    /// Recover the command the pins encode. Unknown strobe patterns read as NOP.
    pub fn decode(&self, enc: &CommandEncoding) -> Command {
        let bank = self.bank as u32;
        let addr = self.addr as u32;
        match self.strobes {
            s if s == enc.activate => Command::Activate { bank, row: addr },
            s if s == enc.read => Command::Read { bank, col: addr },
            s if s == enc.write => Command::Write { bank, col: addr },
            s if s == enc.precharge => {
                if addr & (1 << enc.precharge_all_bit) != 0 {
                    Command::PrechargeAll
                } else {
                    Command::Precharge { bank }
                }
            }
            s if s == enc.auto_refresh => Command::AutoRefresh,
            s if s == enc.load_mode => Command::LoadMode { value: addr },
            _ => Command::Nop,
        }
    }
}

/// Mode register word: burst length 1, burst type, CAS latency, standard operating mode,
/// write burst mode.
pub fn mode_register_word(timing: &TimingConfig, mode: &ModeConfig) -> u32 {
    let burst_length_code = 0b000;
    let burst_type = mode.burst_interleaved as u32;
    let write_burst = mode.single_write_burst as u32;
    (write_burst << 9) | ((timing.cas_latency & 0b111) << 4) | (burst_type << 3) | burst_length_code
}

/// Byte-lane mask for an access of `size` bytes at byte lane `offset`.
/// A size of zero or of the full beat enables every lane. An access that runs past the
/// last lane is truncated to the beat; the caller splits it if the upper bytes matter.
pub fn byte_mask(geometry: &GeometryConfig, size: u32, offset: u32) -> u8 {
    let lanes = geometry.data_bytes();
    let full = ((1u32 << lanes) - 1) as u8;
    if size == 0 || size >= lanes {
        return 0;
    }
    let enabled = (((1u32 << size) - 1) << offset) as u8 & full;
    full & !enabled
}
