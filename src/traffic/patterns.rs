use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::sdram::addr::{AddressMapper, MappedAddress};
use crate::sdram::config::GeometryConfig;
use crate::sdram::controller::BusRequest;
use crate::traffic::config::{PatternKind, TrafficConfig};

/// Expands a traffic config into the request stream the driver presents, in order.
pub struct PatternEngine {
    config: TrafficConfig,
    geometry: GeometryConfig,
    mapper: AddressMapper,
    rng: StdRng,
}

impl PatternEngine {
    pub fn new(config: &TrafficConfig, geometry: &GeometryConfig) -> Self {
        Self {
            config: config.clone(),
            geometry: *geometry,
            mapper: AddressMapper::new(geometry),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    pub fn generate(&mut self) -> Vec<BusRequest> {
        let n = self.config.num_requests;
        match self.config.pattern {
            PatternKind::Sequential => self.sequential(n),
            PatternKind::RowHit => self.row_hit(n),
            PatternKind::RowConflict => self.row_conflict(n),
            PatternKind::Random => self.random(n),
        }
    }

    fn data(&mut self) -> u32 {
        self.rng.gen::<u32>() & self.geometry.data_mask()
    }

    fn span(&self) -> u64 {
        1u64 << self.geometry.mapped_bits()
    }

    fn beat_address(&self, index: u32) -> u32 {
        let beat = self.geometry.data_bytes() as u64;
        ((self.config.base_address as u64 + index as u64 * beat) % self.span()) as u32
    }

    fn sequential(&mut self, n: u32) -> Vec<BusRequest> {
        let writes = n / 2;
        let mut reqs = Vec::with_capacity(n as usize);
        for i in 0..writes {
            let data = self.data();
            reqs.push(BusRequest::write(self.beat_address(i), data));
        }
        for i in 0..n - writes {
            reqs.push(BusRequest::read(self.beat_address(i % writes.max(1))));
        }
        reqs
    }

    fn row_hit(&mut self, n: u32) -> Vec<BusRequest> {
        let origin = self.mapper.map(self.config.base_address);
        let cols = 1u32 << self.geometry.col_bits;
        (0..n)
            .map(|i| {
                let address = self.mapper.compose(MappedAddress {
                    col: (origin.col + i / 2) % cols,
                    ..origin
                });
                if i % 2 == 0 {
                    BusRequest::write(address, self.data())
                } else {
                    BusRequest::read(address)
                }
            })
            .collect()
    }

    fn row_conflict(&mut self, n: u32) -> Vec<BusRequest> {
        let origin = self.mapper.map(self.config.base_address);
        let rows = 1u32 << self.geometry.row_bits;
        let other = MappedAddress {
            row: (origin.row + 1) % rows,
            ..origin
        };
        let a = self.mapper.compose(origin);
        let b = self.mapper.compose(other);
        (0..n)
            .map(|i| match i % 4 {
                0 => BusRequest::write(a, self.data()),
                1 => BusRequest::write(b, self.data()),
                2 => BusRequest::read(a),
                _ => BusRequest::read(b),
            })
            .collect()
    }

    fn random(&mut self, n: u32) -> Vec<BusRequest> {
        let beats = self.span() / self.geometry.data_bytes() as u64;
        let lanes = self.geometry.data_bytes();
        (0..n)
            .map(|_| {
                let beat = self.rng.gen_range(0..beats) as u32;
                let address = beat * lanes;
                if self.rng.gen_bool(self.config.write_ratio.clamp(0.0, 1.0)) {
                    // sub-beat stores stay inside their beat
                    let size = [0, 1, 2][self.rng.gen_range(0..3)].min(lanes);
                    let offset = if size == 0 || size >= lanes {
                        0
                    } else {
                        self.rng.gen_range(0..lanes / size) * size
                    };
                    BusRequest {
                        address: address + offset,
                        is_write: true,
                        size,
                        burst: 1,
                        write_data: Some(self.data()),
                    }
                } else {
                    BusRequest::read(address)
                }
            })
            .collect()
    }
}
