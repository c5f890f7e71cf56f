//! Hooks run at the fetch boundary, before each instruction.

use std::collections::BTreeSet;

use super::Registers;
use crate::memory::Memory;

/// What the engine should do with the instruction about to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
    Continue,
    /// Stop with `RunState::Break`; PC still points at the instruction.
    Break,
}

/// Called by [`super::Cpu::step`] before every instruction.
pub trait StepObserver {
    fn before_step(&mut self, regs: &Registers, mem: &Memory) -> StepControl;

    /// Forget any per-run state. Called from `Cpu::reset`.
    fn reset(&mut self) {}
}

/// Logs every instruction at `trace` level.
#[derive(Debug, Default)]
pub struct Tracer {
    steps: u64,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl StepObserver for Tracer {
    fn before_step(&mut self, regs: &Registers, mem: &Memory) -> StepControl {
        self.steps += 1;
        let pc = regs.pc();
        let bytes = mem.read_block(pc, 4);
        tracing::trace!(
            step = self.steps,
            "{:04X}: {:02X} {:02X} {:02X} {:02X}  {}",
            pc,
            bytes[0],
            bytes[1],
            bytes[2],
            bytes[3],
            regs
        );
        StepControl::Continue
    }

    fn reset(&mut self) {
        self.steps = 0;
    }
}

#[derive(Debug, Clone, Copy)]
struct Watch {
    addr: u16,
    last: Option<u16>,
}

/// PC breakpoints plus an optional watched memory word.
///
/// After a break the engine can simply be resumed: the instruction the
/// break stopped in front of is let through once.
#[derive(Debug, Default)]
pub struct Breakpoints {
    addresses: BTreeSet<u16>,
    watch: Option<Watch>,
    resume_at: Option<u16>,
}

impl Breakpoints {
    pub fn new(addresses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Break whenever the little-endian word at `addr` changes.
    pub fn watch_word(&mut self, addr: u16) {
        self.watch = Some(Watch { addr, last: None });
    }

    /// Returns true when the watched word changed since the last check.
    fn watch_changed(&mut self, mem: &Memory) -> bool {
        let Some(watch) = self.watch.as_mut() else {
            return false;
        };
        let value = mem.read16(watch.addr);
        let changed = watch.last.is_some_and(|last| last != value);
        if changed {
            tracing::debug!("watch {:#06x} changed to {:#06x}", watch.addr, value);
        }
        watch.last = Some(value);
        changed
    }
}

impl StepObserver for Breakpoints {
    fn before_step(&mut self, regs: &Registers, mem: &Memory) -> StepControl {
        let pc = regs.pc();
        let changed = self.watch_changed(mem);
        if self.resume_at.take() == Some(pc) {
            return StepControl::Continue;
        }
        if changed || self.addresses.contains(&pc) {
            tracing::debug!("break at {:#06x}", pc);
            self.resume_at = Some(pc);
            return StepControl::Break;
        }
        StepControl::Continue
    }

    fn reset(&mut self) {
        self.resume_at = None;
        if let Some(watch) = self.watch.as_mut() {
            watch.last = None;
        }
    }
}
