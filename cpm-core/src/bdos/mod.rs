//! BDOS (Basic Disk Operating System) implementation.
//!
//! This module handles CP/M 2.2 system calls. The guest reaches it through
//! the `IN A,(0)` stub on the BDOS page: C holds the function number, DE
//! the parameter, and the result comes back in HL, mirrored into B and A.

pub mod fcb;

pub use fcb::{Fcb, FCB_SIZE, RECORD_SIZE};

use crate::config::EMULATOR_VERSION_BCD;
use crate::console::{CpmConsole, CTRL_C};
use crate::cpu::{Registers, RunState};
use crate::disk::DiskResult;
use crate::host::HostServices;
use crate::layout::addr;
use crate::machine::Traps;
use crate::memory::Memory;

/// CP/M 2.2 BDOS function numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum BdosFunction {
    /// 0: System reset / warm boot
    SystemReset = 0,
    /// 1: Console input (blocking)
    ConsoleInput = 1,
    /// 2: Console output
    ConsoleOutput = 2,
    /// 3: Reader input
    ReaderInput = 3,
    /// 4: Punch output
    PunchOutput = 4,
    /// 5: List output
    ListOutput = 5,
    /// 6: Direct console I/O
    DirectConsoleIO = 6,
    /// 7: Get IOBYTE
    GetIOByte = 7,
    /// 8: Set IOBYTE
    SetIOByte = 8,
    /// 9: Print string ($ terminated)
    PrintString = 9,
    /// 10: Read console buffer
    ReadConsoleBuffer = 10,
    /// 11: Get console status
    ConsoleStatus = 11,
    /// 12: Return version number
    ReturnVersion = 12,
    /// 13: Reset disk system
    ResetDiskSystem = 13,
    /// 14: Select disk
    SelectDisk = 14,
    /// 15: Open file
    OpenFile = 15,
    /// 16: Close file
    CloseFile = 16,
    /// 17: Search for first
    SearchFirst = 17,
    /// 18: Search for next
    SearchNext = 18,
    /// 19: Delete file
    DeleteFile = 19,
    /// 20: Read sequential
    ReadSequential = 20,
    /// 21: Write sequential
    WriteSequential = 21,
    /// 22: Make file (create)
    MakeFile = 22,
    /// 23: Rename file
    RenameFile = 23,
    /// 24: Return login vector
    ReturnLoginVector = 24,
    /// 25: Return current disk
    ReturnCurrentDisk = 25,
    /// 26: Set DMA address
    SetDmaAddress = 26,
    /// 27: Get allocation vector
    GetAllocationVector = 27,
    /// 28: Write protect disk
    WriteProtectDisk = 28,
    /// 29: Get R/O vector
    GetReadOnlyVector = 29,
    /// 31: Get disk parameters
    GetDiskParameters = 31,
    /// 32: Get/set user code
    UserCode = 32,
    /// 33: Read random
    ReadRandom = 33,
    /// 34: Write random
    WriteRandom = 34,
    /// 35: Compute file size
    ComputeFileSize = 35,
    /// 36: Set random record
    SetRandomRecord = 36,
    /// 37: Reset drive
    ResetDrive = 37,
    /// 40: Write random with zero fill
    WriteRandomZeroFill = 40,
    /// 102: Get file date and time
    FileDateTime = 102,
    /// 250: Host OS identifier
    HostOs = 250,
    /// 251: Emulator version
    EmulatorVersion = 251,
    /// 252: Command interpreter identity
    CcpVersion = 252,
    /// 253: Command interpreter load address
    CcpAddress = 253,
}

impl TryFrom<u8> for BdosFunction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::SystemReset),
            1 => Ok(Self::ConsoleInput),
            2 => Ok(Self::ConsoleOutput),
            3 => Ok(Self::ReaderInput),
            4 => Ok(Self::PunchOutput),
            5 => Ok(Self::ListOutput),
            6 => Ok(Self::DirectConsoleIO),
            7 => Ok(Self::GetIOByte),
            8 => Ok(Self::SetIOByte),
            9 => Ok(Self::PrintString),
            10 => Ok(Self::ReadConsoleBuffer),
            11 => Ok(Self::ConsoleStatus),
            12 => Ok(Self::ReturnVersion),
            13 => Ok(Self::ResetDiskSystem),
            14 => Ok(Self::SelectDisk),
            15 => Ok(Self::OpenFile),
            16 => Ok(Self::CloseFile),
            17 => Ok(Self::SearchFirst),
            18 => Ok(Self::SearchNext),
            19 => Ok(Self::DeleteFile),
            20 => Ok(Self::ReadSequential),
            21 => Ok(Self::WriteSequential),
            22 => Ok(Self::MakeFile),
            23 => Ok(Self::RenameFile),
            24 => Ok(Self::ReturnLoginVector),
            25 => Ok(Self::ReturnCurrentDisk),
            26 => Ok(Self::SetDmaAddress),
            27 => Ok(Self::GetAllocationVector),
            28 => Ok(Self::WriteProtectDisk),
            29 => Ok(Self::GetReadOnlyVector),
            31 => Ok(Self::GetDiskParameters),
            32 => Ok(Self::UserCode),
            33 => Ok(Self::ReadRandom),
            34 => Ok(Self::WriteRandom),
            35 => Ok(Self::ComputeFileSize),
            36 => Ok(Self::SetRandomRecord),
            37 => Ok(Self::ResetDrive),
            40 => Ok(Self::WriteRandomZeroFill),
            102 => Ok(Self::FileDateTime),
            250 => Ok(Self::HostOs),
            251 => Ok(Self::EmulatorVersion),
            252 => Ok(Self::CcpVersion),
            253 => Ok(Self::CcpAddress),
            _ => Err(value),
        }
    }
}

/// CP/M version word returned by function 12.
const CPM_VERSION: u16 = 0x0022;

// Line editor control keys
const CTRL_E: u8 = 0x05;
const BACKSPACE: u8 = 0x08;
const LINE_FEED: u8 = 0x0A;
const CARRIAGE_RETURN: u8 = 0x0D;
const CTRL_R: u8 = 0x12;
const CTRL_U: u8 = 0x15;
const CTRL_X: u8 = 0x18;
const DELETE: u8 = 0x7F;

impl<C: CpmConsole, H: HostServices> Traps<C, H> {
    /// Handle one BDOS call. Returns the value for the `IN` destination,
    /// which is the low byte of the result.
    pub(crate) fn bdos(&mut self, regs: &mut Registers, mem: &mut Memory) -> u8 {
        let func = regs.c();
        let de = regs.de();
        let e = regs.e();
        tracing::trace!(func, de, "BDOS call");

        regs.set_hl(0);
        regs.set_c(e);

        let hl = match BdosFunction::try_from(func) {
            Ok(function) => self.dispatch_bdos(function, e, de, regs, mem),
            Err(code) => {
                self.unimplemented("BDOS", code);
                0
            }
        };

        regs.set_hl(hl);
        let [lo, hi] = hl.to_le_bytes();
        regs.set_b(hi);
        regs.set_a(lo);
        tracing::trace!(func, hl, "BDOS return");
        lo
    }

    /// Dispatch BDOS function. Returns the new HL.
    fn dispatch_bdos(
        &mut self,
        func: BdosFunction,
        e: u8,
        de: u16,
        regs: &mut Registers,
        mem: &mut Memory,
    ) -> u16 {
        use BdosFunction::*;

        match func {
            SystemReset => {
                regs.set_state(RunState::WarmBoot);
                0
            }

            ConsoleInput => {
                let ch = self.console.wait_for_key();
                self.put_con(ch);
                u16::from(ch)
            }

            ConsoleOutput => {
                self.put_con(e);
                0
            }

            // No reader device
            ReaderInput => 0x1A,

            PunchOutput | ListOutput | ResetDrive => 0,

            DirectConsoleIO => match e {
                // Input mode
                0xFF => u16::from(self.console.get_key().unwrap_or(0)),
                // Status check
                0xFE => self.console_status(),
                // Input (wait)
                0xFD => u16::from(self.console.wait_for_key()),
                // Output
                _ => {
                    self.put_con(e);
                    0
                }
            },

            GetIOByte => u16::from(mem.read(addr::IOBYTE)),

            SetIOByte => {
                mem.write(addr::IOBYTE, e);
                0
            }

            PrintString => {
                let mut addr = de;
                for _ in 0..=u16::MAX {
                    let ch = mem.read(addr);
                    if ch == b'$' {
                        break;
                    }
                    self.put_con(ch);
                    addr = addr.wrapping_add(1);
                }
                0
            }

            ReadConsoleBuffer => {
                self.read_line(de, regs, mem);
                0
            }

            ConsoleStatus => self.console_status(),

            ReturnVersion => CPM_VERSION,

            ResetDiskSystem => {
                self.disk.reset();
                let result = self.disk.check_batch(mem, &mut self.host);
                self.disk_status(result, regs, mem)
            }

            SelectDisk => {
                let result = self.disk.select_disk(&self.host, e);
                self.disk_status(result, regs, mem)
            }

            OpenFile => {
                let result = self.disk.open(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            CloseFile => {
                let result = self.disk.close(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            SearchFirst => {
                let result = self.disk.search_first(mem, &mut self.host, de, true);
                self.disk_status(result, regs, mem)
            }

            SearchNext => {
                let result = self.disk.search_next(mem, &mut self.host, true);
                self.disk_status(result, regs, mem)
            }

            DeleteFile => {
                let result = self.disk.delete(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            ReadSequential => {
                let result = self.disk.read_sequential(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            WriteSequential => {
                let result = self.disk.write_sequential(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            MakeFile => {
                let result = self.disk.make(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            RenameFile => {
                let result = self.disk.rename(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            ReturnLoginVector => self.disk.login_vector,

            ReturnCurrentDisk => u16::from(self.disk.current_drive),

            SetDmaAddress => {
                self.disk.dma = de;
                0
            }

            GetAllocationVector => self.layout.scb,

            WriteProtectDisk => {
                self.disk.write_protect_current();
                0
            }

            GetReadOnlyVector => self.disk.ro_vector,

            GetDiskParameters => self.layout.dpb,

            UserCode => {
                if e == 0xFF {
                    u16::from(self.disk.user)
                } else {
                    self.disk.set_user(&mut self.host, e);
                    0
                }
            }

            ReadRandom => {
                let result = self.disk.read_random(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            // No allocation blocks to zero, so 40 is a plain random write.
            WriteRandom | WriteRandomZeroFill => {
                let result = self.disk.write_random(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            ComputeFileSize => {
                let result = self.disk.file_size(mem, &mut self.host, de);
                self.disk_status(result, regs, mem)
            }

            SetRandomRecord => u16::from(self.disk.set_random(mem, de)),

            FileDateTime => {
                self.puts("\r\nUnimplemented BDOS call (Get Time/Date).\r\n");
                self.puts("C = 0x");
                self.put_hex8(func as u8);
                self.puts("\r\n");
                0xFFFF
            }

            HostOs => u16::from(self.config.host_os),

            EmulatorVersion => u16::from(EMULATOR_VERSION_BCD),

            CcpVersion => u16::from(self.config.ccp.version()),

            CcpAddress => self.layout.ccp,
        }
    }

    fn console_status(&self) -> u16 {
        if self.console.has_key() {
            0xFF
        } else {
            0
        }
    }

    /// Turn a disk-layer result into HL. A disk error is reported on the
    /// console, the drive selection is rolled back and the running program
    /// is abandoned.
    fn disk_status(&mut self, result: DiskResult, regs: &mut Registers, mem: &mut Memory) -> u16 {
        match result {
            Ok(status) => u16::from(status),
            Err(err) => {
                tracing::debug!(drive = err.drive, "{}", err);
                self.puts("\r\n");
                self.puts(&err.to_string());
                self.puts("\r\n");
                self.disk.rollback(mem);
                regs.set_state(RunState::ReturnToCaller);
                0xFF
            }
        }
    }

    /// Buffered console input (function 10).
    ///
    /// The buffer at `de` holds the maximum length, then the count read,
    /// then the characters.
    fn read_line(&mut self, de: u16, regs: &mut Registers, mem: &mut Memory) {
        let count_addr = de.wrapping_add(1);
        let max = mem.read(de);
        let mut count: u8 = 0;

        while max != 0 {
            let ch = self.console.wait_for_key();

            if ch == CTRL_C && count == 0 {
                self.puts("^C");
                regs.set_state(RunState::WarmBoot);
                break;
            }
            if ch == CTRL_E {
                self.puts("\r\n");
            }
            if (ch == BACKSPACE || ch == DELETE) && count > 0 {
                self.puts("\x08 \x08");
                count -= 1;
                continue;
            }
            if ch == LINE_FEED || ch == CARRIAGE_RETURN {
                break;
            }
            if ch == CTRL_R {
                self.puts("#\r\n  ");
                for j in 1..=count {
                    self.put_con(mem.read(count_addr.wrapping_add(u16::from(j))));
                }
            }
            if ch == CTRL_U {
                self.puts("#\r\n  ");
                count = 0;
            }
            if ch == CTRL_X {
                for _ in 0..count {
                    self.puts("\x08 \x08");
                }
                count = 0;
            }
            if !(0x20..=0x7E).contains(&ch) {
                continue;
            }

            self.put_con(ch);
            count += 1;
            mem.write(count_addr.wrapping_add(u16::from(count)), ch);
            if count == max {
                break;
            }
        }

        mem.write(count_addr, count);
        self.put_con(b'\r');
    }
}
