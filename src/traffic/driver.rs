use std::collections::{HashMap, VecDeque};

use log::{debug, info};
use serde::Serialize;

use crate::sdram::addr::AddressMapper;
use crate::sdram::command::byte_mask;
use crate::sdram::config::GeometryConfig;
use crate::sdram::controller::{BusRequest, ControllerOutputs};
use crate::traffic::config::{PatternKind, TrafficConfig};
use crate::traffic::logging::TrafficLogger;
use crate::traffic::patterns::PatternEngine;

#[derive(Debug, Clone, Copy)]
struct PendingRead {
    address: u32,
    expected: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct TrafficSummary {
    pub issued: u64,
    pub reads_checked: u64,
    pub mismatches: u64,
    pub finished_at: Option<u64>,
}

/// Bus-side requester: presents a generated request stream to the controller, holding each
/// request until it is accepted, and checks read data against a shadow copy of memory.
///
/// The controller services one request at a time in order, so expected read data is
/// resolved against the shadow when the read is accepted.
pub struct SdramTrafficDriver {
    pattern: PatternKind,
    geometry: GeometryConfig,
    mapper: AddressMapper,
    wait_for_init: bool,
    pending: VecDeque<BusRequest>,
    reads: VecDeque<PendingRead>,
    shadow: HashMap<u32, u32>,
    summary: TrafficSummary,
}

impl SdramTrafficDriver {
    pub fn new(config: &TrafficConfig, geometry: &GeometryConfig) -> Self {
        let pending = PatternEngine::new(config, geometry).generate();
        info!("traffic: {:?} pattern, {} requests", config.pattern, pending.len());
        Self::with_requests(config, geometry, pending)
    }

    /// Driver over an explicit request stream.
    pub fn with_requests(
        config: &TrafficConfig,
        geometry: &GeometryConfig,
        requests: impl IntoIterator<Item = BusRequest>,
    ) -> Self {
        Self {
            pattern: config.pattern,
            geometry: *geometry,
            mapper: AddressMapper::new(geometry),
            wait_for_init: config.wait_for_init,
            pending: requests.into_iter().collect(),
            reads: VecDeque::new(),
            shadow: HashMap::new(),
            summary: TrafficSummary::default(),
        }
    }

    /// Request presented this cycle. The head of the queue stays valid until accepted.
    pub fn offer(&self, initialized: bool) -> Option<BusRequest> {
        if self.wait_for_init && !initialized {
            return None;
        }
        self.pending.front().copied()
    }

    /// Consume the controller's outputs for the cycle in which `offer` was presented.
    pub fn observe(&mut self, cycle: u64, outputs: &ControllerOutputs) {
        if outputs.read_data_valid {
            self.complete_read(cycle, outputs.read_data);
        }
        if outputs.accepted {
            if let Some(request) = self.pending.pop_front() {
                self.accept(cycle, &request);
            }
        }
        if self.is_done() && self.summary.finished_at.is_none() {
            self.summary.finished_at = Some(cycle);
            TrafficLogger::log_pattern_done(
                self.pattern,
                cycle,
                self.summary.reads_checked,
                self.summary.mismatches,
            );
        }
    }

    fn beat_key(&self, address: u32) -> u32 {
        self.mapper.compose(self.mapper.map(address))
    }

    fn accept(&mut self, cycle: u64, request: &BusRequest) {
        self.summary.issued += 1;
        let key = self.beat_key(request.address);
        debug!(
            "traffic: {} {:#x} accepted at cycle {}",
            if request.is_write { "write" } else { "read" },
            request.address,
            cycle
        );
        if request.is_write {
            let Some(data) = request.write_data else {
                return;
            };
            let masked = byte_mask(
                &self.geometry,
                request.size,
                self.mapper.byte_offset(request.address),
            );
            let mut keep = 0u32;
            for lane in 0..self.geometry.data_bytes() {
                if masked & (1 << lane) != 0 {
                    keep |= 0xff << (lane * 8);
                }
            }
            let old = self.shadow.get(&key).copied().unwrap_or(0);
            let new = (old & keep) | (data & self.geometry.data_mask() & !keep);
            self.shadow.insert(key, new);
        } else {
            let expected = self.shadow.get(&key).copied().unwrap_or(0);
            self.reads.push_back(PendingRead { address: key, expected });
        }
    }

    fn complete_read(&mut self, cycle: u64, data: u32) {
        let Some(read) = self.reads.pop_front() else {
            debug!("traffic: unexpected read data {:#x} at cycle {}", data, cycle);
            return;
        };
        self.summary.reads_checked += 1;
        if read.expected != data {
            self.summary.mismatches += 1;
            TrafficLogger::log_mismatch(cycle, read.address, read.expected, data);
        }
    }

    /// Forget reads accepted but not yet returned; used across a controller reset.
    pub fn drop_in_flight(&mut self) {
        self.reads.clear();
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty() && self.reads.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    pub fn summary(&self) -> &TrafficSummary {
        &self.summary
    }
}
