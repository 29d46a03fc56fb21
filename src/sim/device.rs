use std::collections::HashMap;
use std::sync::Arc;

use log::warn;
use serde::Serialize;
use smallvec::SmallVec;

use crate::base::behavior::ModuleBehaviors;
use crate::sdram::command::{Command, CommandBus};
use crate::sdram::config::SdramConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// Read or write sooner than tRCD after activate.
    ActivateToAccess,
    /// Activate sooner than tRP after precharge.
    PrechargeToActivate,
    /// Precharge sooner than tRAS after activate.
    RowActiveMin,
    /// Command issued inside tRFC.
    RefreshCycle,
    /// Command issued inside tMRD.
    ModeLoad,
    ClosedBankAccess,
    OpenBankActivate,
    /// Row command before the mode register was loaded.
    Uninitialized,
    FloatingWrite,
}

/// Protocol violations seen by the device model.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct DeviceAudit {
    pub activate_to_access: u64,
    pub precharge_to_activate: u64,
    pub row_active_min: u64,
    pub refresh_cycle: u64,
    pub mode_load: u64,
    pub closed_bank_access: u64,
    pub open_bank_activate: u64,
    pub uninitialized: u64,
    pub floating_write: u64,
}

impl DeviceAudit {
    fn record(&mut self, violation: Violation) {
        let counter = match violation {
            Violation::ActivateToAccess => &mut self.activate_to_access,
            Violation::PrechargeToActivate => &mut self.precharge_to_activate,
            Violation::RowActiveMin => &mut self.row_active_min,
            Violation::RefreshCycle => &mut self.refresh_cycle,
            Violation::ModeLoad => &mut self.mode_load,
            Violation::ClosedBankAccess => &mut self.closed_bank_access,
            Violation::OpenBankActivate => &mut self.open_bank_activate,
            Violation::Uninitialized => &mut self.uninitialized,
            Violation::FloatingWrite => &mut self.floating_write,
        };
        *counter += 1;
    }

    pub fn total(&self) -> u64 {
        self.activate_to_access
            + self.precharge_to_activate
            + self.row_active_min
            + self.refresh_cycle
            + self.mode_load
            + self.closed_bank_access
            + self.open_bank_activate
            + self.uninitialized
            + self.floating_write
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct BankModel {
    open_row: Option<u32>,
    activated_at: Option<u64>,
    precharged_at: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
struct PendingRead {
    ready_at: u64,
    data: u32,
}

/// Behavioral SDRAM used as the physical-side counterpart of the controller in simulation.
///
/// Sparse storage: cells never written read as zero. Read data appears on DQ exactly
/// CAS-latency cycles after the READ command. Timing is checked against the device's own
/// configuration, which may differ from the controller's.
pub struct BehavioralSdram {
    config: Arc<SdramConfig>,
    cycle: u64,
    cells: HashMap<(u32, u32, u32), u32>,
    banks: Vec<BankModel>,
    mode: Option<u32>,
    last_mode_load: Option<u64>,
    /// Start of the most recent auto-refresh.
    last_refresh: Option<u64>,
    /// Last cycle REF was on the bus.
    refresh_held_until: Option<u64>,
    reads: SmallVec<[PendingRead; 4]>,
    bus: CommandBus,
    dq_in: Option<u32>,
    audit: DeviceAudit,
}

impl BehavioralSdram {
    pub fn new(config: Arc<SdramConfig>) -> Self {
        let num_banks = config.geometry.num_banks();
        let idle_bus = CommandBus {
            strobes: config.encoding.nop,
            ..CommandBus::default()
        };
        Self {
            config,
            cycle: 0,
            cells: HashMap::new(),
            banks: vec![BankModel::default(); num_banks],
            mode: None,
            last_mode_load: None,
            last_refresh: None,
            refresh_held_until: None,
            reads: SmallVec::new(),
            bus: idle_bus,
            dq_in: None,
            audit: DeviceAudit::default(),
        }
    }

    /// Value the device drives on DQ during the current cycle.
    pub fn dq_out(&self) -> Option<u32> {
        self.reads
            .iter()
            .find(|read| read.ready_at == self.cycle)
            .map(|read| read.data)
    }

    /// Latch the pins sampled this cycle; applied on the next `tick_one`.
    pub fn drive(&mut self, bus: CommandBus, dq_in: Option<u32>) {
        self.bus = bus;
        self.dq_in = dq_in;
    }

    pub fn audit(&self) -> &DeviceAudit {
        &self.audit
    }

    pub fn mode_register(&self) -> Option<u32> {
        self.mode
    }

    pub fn open_row(&self, bank: u32) -> Option<u32> {
        self.banks.get(bank as usize).and_then(|b| b.open_row)
    }

    pub fn peek(&self, bank: u32, row: u32, col: u32) -> u32 {
        self.cells.get(&(bank, row, col)).copied().unwrap_or(0)
    }

    /// CAS latency from the loaded mode register, falling back to the configured one.
    fn cas_latency(&self) -> u64 {
        self.mode
            .map(|mode| (mode >> 4) & 0b111)
            .unwrap_or(self.config.timing.cas_latency) as u64
    }

    fn violation(&mut self, violation: Violation, command: &Command) {
        warn!("sdram: {:?} on `{}` at cycle {}", violation, command, self.cycle);
        self.audit.record(violation);
    }

    fn within(&self, since: Option<u64>, window: u32) -> bool {
        since.is_some_and(|at| self.cycle - at < window as u64)
    }

    fn apply(&mut self, command: Command, dq_in: Option<u32>) {
        let timing = self.config.timing;
        if command.is_nop() {
            return;
        }
        // REF held on consecutive cycles is one refresh, timed from its first cycle
        let refresh_held = command == Command::AutoRefresh
            && self.refresh_held_until.is_some_and(|at| at + 1 == self.cycle);
        if !refresh_held && self.within(self.last_refresh, timing.refresh_cycle_time) {
            self.violation(Violation::RefreshCycle, &command);
        }
        if self.within(self.last_mode_load, timing.mode_load_delay) {
            self.violation(Violation::ModeLoad, &command);
        }

        match command {
            Command::Nop => {}
            Command::LoadMode { value } => {
                self.mode = Some(value);
                self.last_mode_load = Some(self.cycle);
            }
            Command::AutoRefresh => {
                if !refresh_held {
                    self.last_refresh = Some(self.cycle);
                }
                self.refresh_held_until = Some(self.cycle);
            }
            Command::PrechargeAll => {
                for bank in 0..self.banks.len() {
                    self.precharge(bank, &command);
                }
            }
            Command::Precharge { bank } => self.precharge(bank as usize, &command),
            Command::Activate { bank, row } => {
                if self.mode.is_none() {
                    self.violation(Violation::Uninitialized, &command);
                }
                let model = self.banks[bank as usize];
                if model.open_row.is_some() {
                    self.violation(Violation::OpenBankActivate, &command);
                }
                if self.within(model.precharged_at, timing.precharge_period) {
                    self.violation(Violation::PrechargeToActivate, &command);
                }
                self.banks[bank as usize] = BankModel {
                    open_row: Some(row),
                    activated_at: Some(self.cycle),
                    precharged_at: model.precharged_at,
                };
            }
            Command::Read { bank, col } | Command::Write { bank, col } => {
                let model = self.banks[bank as usize];
                if self.within(model.activated_at, timing.activate_delay) {
                    self.violation(Violation::ActivateToAccess, &command);
                }
                let Some(row) = model.open_row else {
                    self.violation(Violation::ClosedBankAccess, &command);
                    return;
                };
                let key = (bank, row, col);
                if let Command::Read { .. } = command {
                    let data = self.peek(bank, row, col);
                    let ready_at = self.cycle + self.cas_latency();
                    self.reads.push(PendingRead { ready_at, data });
                } else {
                    let Some(data) = dq_in else {
                        self.violation(Violation::FloatingWrite, &command);
                        return;
                    };
                    let old = self.peek(bank, row, col);
                    let mut keep = 0u32;
                    for lane in 0..self.config.geometry.data_bytes() {
                        if self.bus.dqm & (1 << lane) != 0 {
                            keep |= 0xff << (lane * 8);
                        }
                    }
                    self.cells.insert(key, (old & keep) | (data & !keep));
                }
            }
        }
    }

    fn precharge(&mut self, bank: usize, command: &Command) {
        let model = self.banks[bank];
        if model.open_row.is_none() {
            return;
        }
        if self.within(model.activated_at, self.config.timing.row_active_min) {
            self.violation(Violation::RowActiveMin, command);
        }
        self.banks[bank] = BankModel {
            open_row: None,
            activated_at: None,
            precharged_at: Some(self.cycle),
        };
    }
}

impl ModuleBehaviors for BehavioralSdram {
    fn tick_one(&mut self) {
        let command = self.bus.decode(&self.config.encoding);
        self.apply(command, self.dq_in);
        let now = self.cycle;
        self.reads.retain(|read| read.ready_at > now);
        self.bus = CommandBus {
            strobes: self.config.encoding.nop,
            ..CommandBus::default()
        };
        self.dq_in = None;
        self.cycle += 1;
    }

    /// Contents survive; bank, mode and timing history return to power-on.
    fn reset(&mut self) {
        let cells = std::mem::take(&mut self.cells);
        *self = Self::new(Arc::clone(&self.config));
        self.cells = cells;
    }
}
