use anyhow::{bail, ensure};
use serde::Deserialize;

use crate::sim::config::Config;

/// Structural widths of the request address and of the device.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct GeometryConfig {
    /// Width of the bus-side byte address, in bits.
    pub address_width: u32,
    /// Width of the data bus, in bits. One request moves one beat of this width.
    pub data_width: u32,
    pub bank_bits: u32,
    pub row_bits: u32,
    pub col_bits: u32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        // 4M x 32 part: 4 banks, 4096 rows, 256 columns
        Self {
            address_width: 24,
            data_width: 32,
            bank_bits: 2,
            row_bits: 12,
            col_bits: 8,
        }
    }
}

impl GeometryConfig {
    pub fn data_bytes(&self) -> u32 {
        self.data_width / 8
    }

    /// Address bits below the column field that select a byte within one beat.
    pub fn byte_offset_bits(&self) -> u32 {
        self.data_bytes().trailing_zeros()
    }

    pub fn num_banks(&self) -> usize {
        1 << self.bank_bits
    }

    /// The device address field must carry either a row or a column.
    pub fn addr_field_width(&self) -> u32 {
        self.row_bits.max(self.col_bits)
    }

    /// Number of low address bits that take part in the mapping.
    pub fn mapped_bits(&self) -> u32 {
        self.byte_offset_bits()
            .saturating_add(self.col_bits)
            .saturating_add(self.row_bits)
            .saturating_add(self.bank_bits)
    }

    pub fn data_mask(&self) -> u32 {
        if self.data_width >= 32 {
            u32::MAX
        } else {
            (1 << self.data_width) - 1
        }
    }
}

/// Every timed wait of the command engine, in controller clock cycles.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// tRCD: activate to read/write.
    pub activate_delay: u32,
    /// tRP: precharge to activate.
    pub precharge_period: u32,
    /// tRAS: activate to precharge. Not enforced by the engine, only audited by the device model.
    pub row_active_min: u32,
    /// tWR: write to the next command.
    pub write_recovery: u32,
    /// tRFC: auto-refresh period.
    pub refresh_cycle_time: u32,
    /// tMRD: mode-register load to the next command.
    pub mode_load_delay: u32,
    pub cas_latency: u32,
    /// Cycles between reset and the init request.
    pub power_up_delay: u32,
    /// Cycles between two refresh requests.
    pub refresh_interval: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            activate_delay: 3,
            precharge_period: 3,
            row_active_min: 7,
            write_recovery: 3,
            refresh_cycle_time: 10,
            mode_load_delay: 2,
            cas_latency: 3,
            power_up_delay: 200,
            refresh_interval: 782,
        }
    }
}

/// Fixed fields of the mode register word loaded during initialization.
/// Burst length is always one beat.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct ModeConfig {
    pub burst_interleaved: bool,
    pub single_write_burst: bool,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            burst_interleaved: false,
            single_write_burst: true,
        }
    }
}

/// Strobe patterns `{cs_n, ras_n, cas_n, we_n}` (bit 3 down to bit 0) per device command.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct CommandEncoding {
    pub nop: u8,
    pub activate: u8,
    pub read: u8,
    pub write: u8,
    pub precharge: u8,
    pub auto_refresh: u8,
    pub load_mode: u8,
    /// Address bit that turns a precharge into a precharge-all.
    pub precharge_all_bit: u32,
}

impl Default for CommandEncoding {
    fn default() -> Self {
        Self {
            nop: 0b0111,
            activate: 0b0011,
            read: 0b0101,
            write: 0b0100,
            precharge: 0b0010,
            auto_refresh: 0b0001,
            load_mode: 0b0000,
            precharge_all_bit: 10,
        }
    }
}

impl CommandEncoding {
    fn all(&self) -> [(&'static str, u8); 7] {
        [
            ("nop", self.nop),
            ("activate", self.activate),
            ("read", self.read),
            ("write", self.write),
            ("precharge", self.precharge),
            ("auto_refresh", self.auto_refresh),
            ("load_mode", self.load_mode),
        ]
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SdramConfig {
    pub geometry: GeometryConfig,
    pub timing: TimingConfig,
    pub mode: ModeConfig,
    pub encoding: CommandEncoding,
}

impl Config for SdramConfig {}

impl SdramConfig {
    /// Reject configurations the controller cannot be built from.
    /// Timing values are taken as given; datasheet correctness is the integrator's job.
    pub fn validate(&self) -> anyhow::Result<()> {
        let geo = &self.geometry;
        ensure!(
            matches!(geo.data_width, 8 | 16 | 32),
            "data_width must be 8, 16 or 32 bits, got {}",
            geo.data_width
        );
        ensure!(geo.row_bits > 0, "row_bits must be non-zero");
        ensure!(geo.col_bits > 0, "col_bits must be non-zero");
        ensure!(geo.bank_bits <= 4, "bank_bits must be at most 4, got {}", geo.bank_bits);
        ensure!(
            geo.address_width <= 32,
            "address_width must be at most 32 bits, got {}",
            geo.address_width
        );
        ensure!(
            geo.row_bits <= geo.address_width && geo.col_bits <= geo.address_width,
            "row_bits ({}) and col_bits ({}) must fit address_width ({})",
            geo.row_bits,
            geo.col_bits,
            geo.address_width
        );
        if geo.mapped_bits() > geo.address_width {
            bail!(
                "byte offset ({}) + col ({}) + row ({}) + bank ({}) bits exceed address_width ({})",
                geo.byte_offset_bits(),
                geo.col_bits,
                geo.row_bits,
                geo.bank_bits,
                geo.address_width
            );
        }
        let enc = &self.encoding;
        ensure!(
            geo.col_bits <= enc.precharge_all_bit,
            "col_bits ({}) overlap the precharge-all address bit ({})",
            geo.col_bits,
            enc.precharge_all_bit
        );
        ensure!(
            enc.precharge_all_bit < 16,
            "precharge_all_bit must fit a 16-bit address field, got {}",
            enc.precharge_all_bit
        );
        ensure!(
            geo.addr_field_width() <= 16,
            "row/column address field wider than 16 bits"
        );

        let timing = &self.timing;
        ensure!(
            (1..=3).contains(&timing.cas_latency),
            "cas_latency must be 1, 2 or 3, got {}",
            timing.cas_latency
        );
        ensure!(timing.refresh_interval > 0, "refresh_interval must be non-zero");

        let codes = enc.all();
        for (i, (name, code)) in codes.iter().enumerate() {
            ensure!(*code <= 0b1111, "encoding for {} uses more than 4 strobe bits", name);
            if let Some((other, _)) = codes[i + 1..].iter().find(|(_, c)| c == code) {
                bail!("commands {} and {} share strobe encoding {:#06b}", name, other, code);
            }
        }
        Ok(())
    }
}
