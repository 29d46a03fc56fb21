use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use serde::Serialize;

use crate::sdram::command::Command;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Line {
    pub cycle: u64,
    pub command: Command,
}

impl Display for Line {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>10}  {}", self.cycle, self.command)
    }
}

/// Buffers the issued command stream in issue order. NOP cycles are not recorded.
#[derive(Debug, Default)]
pub struct Tracer {
    lines: VecDeque<Line>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, cycle: u64, command: Command) {
        if !command.is_nop() {
            self.lines.push_back(Line { cycle, command });
        }
    }

    pub fn consume(&mut self) -> Option<Line> {
        self.lines.pop_front()
    }

    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
