//! BIOS entry points.
//!
//! Each jump-table entry lands on an `OUT (n),A` stub whose address low
//! byte is the entry offset, so the selector is the low byte of the
//! instruction-start PC. Disk entries are stubs: file I/O happens in the
//! BDOS layer.

use crate::console::CpmConsole;
use crate::cpu::{Registers, RunState};
use crate::host::HostServices;
use crate::machine::Traps;
use crate::memory::Memory;

/// BIOS jump-table entries, by offset.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum BiosFunction {
    Boot = 0x00,
    WarmBoot = 0x03,
    ConsoleStatus = 0x06,
    ConsoleInput = 0x09,
    ConsoleOutput = 0x0C,
    List = 0x0F,
    Punch = 0x12,
    Reader = 0x15,
    Home = 0x18,
    SelectDisk = 0x1B,
    SetTrack = 0x1E,
    SetSector = 0x21,
    SetDma = 0x24,
    Read = 0x27,
    Write = 0x2A,
    ListStatus = 0x2D,
    SectorTranslate = 0x30,
    /// Back to the command interpreter, for programs that end in `RET`.
    ReturnToCaller = 0x33,
}

impl TryFrom<u8> for BiosFunction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use BiosFunction::*;
        Ok(match value {
            0x00 => Boot,
            0x03 => WarmBoot,
            0x06 => ConsoleStatus,
            0x09 => ConsoleInput,
            0x0C => ConsoleOutput,
            0x0F => List,
            0x12 => Punch,
            0x15 => Reader,
            0x18 => Home,
            0x1B => SelectDisk,
            0x1E => SetTrack,
            0x21 => SetSector,
            0x24 => SetDma,
            0x27 => Read,
            0x2A => Write,
            0x2D => ListStatus,
            0x30 => SectorTranslate,
            0x33 => ReturnToCaller,
            _ => return Err(value),
        })
    }
}

impl<C: CpmConsole, H: HostServices> Traps<C, H> {
    /// Handle one BIOS call, selected by the low byte of PCX.
    pub(crate) fn bios(&mut self, regs: &mut Registers, _mem: &mut Memory) {
        let selector = regs.pcx() as u8;
        tracing::trace!(selector, bc = regs.bc(), "BIOS call");

        let func = match BiosFunction::try_from(selector) {
            Ok(func) => func,
            Err(code) => {
                self.unimplemented("BIOS", code);
                return;
            }
        };

        match func {
            BiosFunction::Boot => regs.set_state(RunState::Shutdown),
            BiosFunction::WarmBoot => regs.set_state(RunState::WarmBoot),
            BiosFunction::ConsoleStatus => {
                regs.set_a(if self.console.has_key() { 0xFF } else { 0x00 });
            }
            BiosFunction::ConsoleInput => {
                let ch = self.console.wait_for_key();
                regs.set_a(ch);
            }
            BiosFunction::ConsoleOutput => self.put_con(regs.c()),
            BiosFunction::List
            | BiosFunction::Punch
            | BiosFunction::Home
            | BiosFunction::SetTrack
            | BiosFunction::SetSector => {}
            // Device not implemented
            BiosFunction::Reader => regs.set_a(0x1A),
            BiosFunction::SelectDisk => regs.set_hl(0x0000),
            BiosFunction::SetDma => {
                regs.set_hl(regs.bc());
                self.disk.dma = regs.bc();
            }
            BiosFunction::Read | BiosFunction::Write => regs.set_a(0x00),
            BiosFunction::ListStatus => regs.set_a(0xFF),
            // 1:1
            BiosFunction::SectorTranslate => regs.set_hl(regs.bc()),
            BiosFunction::ReturnToCaller => regs.set_state(RunState::ReturnToCaller),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::tests::traps;

    /// Registers as they are when the stub at `bios_page + selector`
    /// executes.
    fn at_stub(selector: u8) -> Registers {
        let mut regs = Registers::new();
        regs.set_pc(0xFF00 | u16::from(selector));
        regs.mark_instruction_start();
        regs
    }

    #[test]
    fn test_selector_table() {
        assert_eq!(BiosFunction::try_from(0x0C), Ok(BiosFunction::ConsoleOutput));
        assert_eq!(BiosFunction::try_from(0x33), Ok(BiosFunction::ReturnToCaller));
        assert_eq!(BiosFunction::try_from(0x36), Err(0x36));
        assert_eq!(BiosFunction::try_from(0x0D), Err(0x0D));
    }

    #[test]
    fn test_boot_entries_set_distinct_states() {
        let (mut traps, _, mut mem) = traps(b"");
        for (selector, state) in [
            (0x00, RunState::Shutdown),
            (0x03, RunState::WarmBoot),
            (0x33, RunState::ReturnToCaller),
        ] {
            let mut regs = at_stub(selector);
            traps.bios(&mut regs, &mut mem);
            assert_eq!(regs.state(), state);
        }
    }

    #[test]
    fn test_console_entries() {
        let (mut traps, _, mut mem) = traps(b"k");
        let mut regs = at_stub(0x06);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(regs.a(), 0xFF);

        let mut regs = at_stub(0x09);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(regs.a(), b'k');

        let mut regs = at_stub(0x06);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(regs.a(), 0x00);

        let mut regs = at_stub(0x0C);
        regs.set_c(b'Z' | 0x80);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(traps.console.output(), b"Z");
    }

    #[test]
    fn test_disk_stubs() {
        let (mut traps, _, mut mem) = traps(b"");
        let mut regs = at_stub(0x24);
        regs.set_bc(0x1234);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(regs.hl(), 0x1234);
        assert_eq!(traps.disk.dma, 0x1234);

        let mut regs = at_stub(0x30);
        regs.set_bc(7);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(regs.hl(), 7);

        let mut regs = at_stub(0x1B);
        regs.set_hl(0xFFFF);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(regs.hl(), 0);

        for (selector, a) in [(0x15, 0x1A), (0x27, 0x00), (0x2A, 0x00), (0x2D, 0xFF)] {
            let mut regs = at_stub(selector);
            regs.set_a(0x55);
            traps.bios(&mut regs, &mut mem);
            assert_eq!(regs.a(), a);
            assert!(regs.state().is_running());
        }
    }

    #[test]
    fn test_unknown_selector_is_a_no_op() {
        let (mut traps, _, mut mem) = traps(b"");
        let mut regs = at_stub(0x40);
        regs.set_a(0x55);
        traps.bios(&mut regs, &mut mem);
        assert_eq!(regs.a(), 0x55);
        assert!(regs.state().is_running());
        assert!(traps.console.output().is_empty());
    }
}
