use crate::traffic::config::PatternKind;

pub struct TrafficLogger;

impl TrafficLogger {
    pub fn log_pattern_done(pattern: PatternKind, cycle: u64, reads: u64, mismatches: u64) {
        println!(
            "[TRAFFIC] {:?} finished at time {:>10}: {} reads checked, {} mismatches",
            pattern, cycle, reads, mismatches
        );
    }

    pub fn log_mismatch(cycle: u64, address: u32, expected: u32, actual: u32) {
        println!(
            "[TRAFFIC] read of {:#010x} at time {:>10}: expected {:#010x}, got {:#010x}",
            address, cycle, expected, actual
        );
    }
}
