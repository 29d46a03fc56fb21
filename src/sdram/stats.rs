use serde::Serialize;

use crate::sdram::command::Command;
use crate::sdram::engine::RowOutcome;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ControllerStats {
    cycles: u64,
    accepted: u64,
    reads: u64,
    writes: u64,
    activates: u64,
    precharges: u64,
    refreshes: u64,
    mode_loads: u64,
    row_hits: u64,
    row_empties: u64,
    row_conflicts: u64,
    /// Cycles a refresh was due but the engine was busy.
    refresh_deferred_cycles: u64,
    /// Cycles the controller was ready and nothing was offered.
    idle_cycles: u64,
}

impl ControllerStats {
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn activates(&self) -> u64 {
        self.activates
    }

    pub fn precharges(&self) -> u64 {
        self.precharges
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    pub fn mode_loads(&self) -> u64 {
        self.mode_loads
    }

    pub fn row_hits(&self) -> u64 {
        self.row_hits
    }

    pub fn row_empties(&self) -> u64 {
        self.row_empties
    }

    pub fn row_conflicts(&self) -> u64 {
        self.row_conflicts
    }

    pub fn refresh_deferred_cycles(&self) -> u64 {
        self.refresh_deferred_cycles
    }

    pub fn idle_cycles(&self) -> u64 {
        self.idle_cycles
    }

    /// Fraction of accepted requests that found their row open.
    pub fn row_hit_rate(&self) -> f64 {
        let total = self.row_hits + self.row_empties + self.row_conflicts;
        if total == 0 {
            0.0
        } else {
            self.row_hits as f64 / total as f64
        }
    }

    pub fn record_cycle(&mut self, refresh_deferred: bool, idle: bool) {
        self.cycles = self.cycles.saturating_add(1);
        self.refresh_deferred_cycles += refresh_deferred as u64;
        self.idle_cycles += idle as u64;
    }

    /// Count an issued command. An auto-refresh holds REF on the bus for its whole
    /// duration and counts once, on its `first_cycle`.
    pub fn record_command(&mut self, command: &Command, first_cycle: bool) {
        let counter = match command {
            Command::Nop => return,
            Command::Activate { .. } => &mut self.activates,
            Command::Read { .. } => &mut self.reads,
            Command::Write { .. } => &mut self.writes,
            Command::Precharge { .. } | Command::PrechargeAll => &mut self.precharges,
            Command::AutoRefresh if !first_cycle => return,
            Command::AutoRefresh => &mut self.refreshes,
            Command::LoadMode { .. } => &mut self.mode_loads,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn record_accept(&mut self, outcome: RowOutcome) {
        self.accepted = self.accepted.saturating_add(1);
        let counter = match outcome {
            RowOutcome::Hit => &mut self.row_hits,
            RowOutcome::Empty => &mut self.row_empties,
            RowOutcome::Conflict => &mut self.row_conflicts,
        };
        *counter = counter.saturating_add(1);
    }
}
