/// Per-cycle strobes from the command engine to the data path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataStrobes {
    pub write_active: bool,
    pub read_active: bool,
    pub read_data_valid: bool,
    /// Data of the write in service, if the request carried any.
    pub write_data: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DataPathOutputs {
    /// Value driven onto the DQ bus; `None` leaves the bus released.
    pub dq_out: Option<u32>,
    pub read_data: u32,
    pub read_data_valid: bool,
}

/// Owns the direction of the shared DQ bus and stages read data for the requester.
///
/// Validity is relayed from the engine unchanged. If both strobes are ever asserted together
/// the write wins and a concurrent capture sees the driven value.
#[derive(Debug, Default)]
pub struct DataPathArbiter {
    driving: bool,
    staged: u32,
}

impl DataPathArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate one cycle. `dq_in` is the value the device drives, `None` when the bus floats.
    /// A floating bus samples as zero.
    pub fn evaluate(&mut self, strobes: DataStrobes, dq_in: Option<u32>) -> DataPathOutputs {
        let dq_out = match (strobes.write_active, strobes.write_data) {
            (true, Some(data)) => Some(data),
            _ => None,
        };
        self.driving = dq_out.is_some();

        if strobes.read_active {
            self.staged = dq_out.or(dq_in).unwrap_or(0);
        }

        DataPathOutputs {
            dq_out,
            read_data: self.staged,
            read_data_valid: strobes.read_data_valid,
        }
    }

    pub fn is_driving(&self) -> bool {
        self.driving
    }

    pub fn staged(&self) -> u32 {
        self.staged
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
