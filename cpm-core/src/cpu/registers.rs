//! Z80 register file.
//!
//! Registers are held as 16-bit pairs. Byte-wide views (B/C, D/E, H/L,
//! A/F) go through the accessors below; the high byte of a pair is bits
//! 15-8 and the low byte is bits 7-0.

use super::flags::FLAG_C;

/// Why the engine loop stopped (or that it has not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Running,
    /// `HALT` executed. PC points back at the HALT opcode.
    Halted,
    /// BIOS cold boot entry: terminate the whole machine.
    Shutdown,
    /// BIOS warm boot, BDOS 0 or ^C at the line editor: reload the CCP.
    WarmBoot,
    /// BIOS 0x33 or a fatal BDOS disk error: back to the command interpreter.
    ReturnToCaller,
    /// A step observer asked the engine to stop before an instruction.
    Break,
}

impl RunState {
    pub fn is_running(self) -> bool {
        self == RunState::Running
    }
}

/// 8-bit register operand, as encoded in the three-bit register field of
/// an opcode (`(HL)`, code 6, is handled by the decoder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
}

impl Reg8 {
    /// Decode the register field. Returns `None` for 6, the memory operand.
    pub fn from_code(code: u8) -> Option<Self> {
        match code & 7 {
            0 => Some(Self::B),
            1 => Some(Self::C),
            2 => Some(Self::D),
            3 => Some(Self::E),
            4 => Some(Self::H),
            5 => Some(Self::L),
            7 => Some(Self::A),
            _ => None,
        }
    }
}

/// 16-bit register pairs addressable by instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    AF,
    BC,
    DE,
    HL,
    SP,
    IX,
    IY,
}

impl Reg16 {
    /// The `dd` field used by LD rr,nn / INC rr / ADD HL,rr (00=BC .. 11=SP).
    pub fn from_dd(code: u8) -> Self {
        match code & 3 {
            0 => Self::BC,
            1 => Self::DE,
            2 => Self::HL,
            _ => Self::SP,
        }
    }

    /// The `qq` field used by PUSH/POP (00=BC .. 11=AF).
    pub fn from_qq(code: u8) -> Self {
        match code & 3 {
            0 => Self::BC,
            1 => Self::DE,
            2 => Self::HL,
            _ => Self::AF,
        }
    }
}

#[inline]
fn high(pair: u16) -> u8 {
    (pair >> 8) as u8
}

#[inline]
fn low(pair: u16) -> u8 {
    pair as u8
}

#[inline]
fn with_high(pair: u16, value: u8) -> u16 {
    (pair & 0x00FF) | ((value as u16) << 8)
}

#[inline]
fn with_low(pair: u16, value: u8) -> u16 {
    (pair & 0xFF00) | value as u16
}

/// Architectural CPU state.
#[derive(Debug, Clone, Default)]
pub struct Registers {
    af: u16,
    bc: u16,
    de: u16,
    hl: u16,
    af_alt: u16,
    bc_alt: u16,
    de_alt: u16,
    hl_alt: u16,
    ix: u16,
    iy: u16,
    sp: u16,
    pc: u16,
    /// PC at the start of the current instruction.
    pcx: u16,
    /// I in the high byte, R in the low byte.
    ir: u16,
    /// Bit 0 = IFF1, bit 1 = IFF2.
    iff: u8,
    im: u8,
    state: RunState,
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every register and go back to `Running`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn set_state(&mut self, state: RunState) {
        self.state = state;
    }

    // Pairs

    pub fn get16(&self, reg: Reg16) -> u16 {
        match reg {
            Reg16::AF => self.af,
            Reg16::BC => self.bc,
            Reg16::DE => self.de,
            Reg16::HL => self.hl,
            Reg16::SP => self.sp,
            Reg16::IX => self.ix,
            Reg16::IY => self.iy,
        }
    }

    pub fn set16(&mut self, reg: Reg16, value: u16) {
        match reg {
            Reg16::AF => self.af = value,
            Reg16::BC => self.bc = value,
            Reg16::DE => self.de = value,
            Reg16::HL => self.hl = value,
            Reg16::SP => self.sp = value,
            Reg16::IX => self.ix = value,
            Reg16::IY => self.iy = value,
        }
    }

    pub fn af(&self) -> u16 {
        self.af
    }

    pub fn set_af(&mut self, value: u16) {
        self.af = value;
    }

    pub fn bc(&self) -> u16 {
        self.bc
    }

    pub fn set_bc(&mut self, value: u16) {
        self.bc = value;
    }

    pub fn de(&self) -> u16 {
        self.de
    }

    pub fn set_de(&mut self, value: u16) {
        self.de = value;
    }

    pub fn hl(&self) -> u16 {
        self.hl
    }

    pub fn set_hl(&mut self, value: u16) {
        self.hl = value;
    }

    pub fn ix(&self) -> u16 {
        self.ix
    }

    pub fn set_ix(&mut self, value: u16) {
        self.ix = value;
    }

    pub fn iy(&self) -> u16 {
        self.iy
    }

    pub fn set_iy(&mut self, value: u16) {
        self.iy = value;
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn set_sp(&mut self, value: u16) {
        self.sp = value;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, value: u16) {
        self.pc = value;
    }

    /// PC of the instruction currently executing.
    pub fn pcx(&self) -> u16 {
        self.pcx
    }

    pub(crate) fn mark_instruction_start(&mut self) {
        self.pcx = self.pc;
    }

    pub fn alternates(&self) -> [u16; 4] {
        [self.af_alt, self.bc_alt, self.de_alt, self.hl_alt]
    }

    // Bytes

    pub fn get8(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::B => high(self.bc),
            Reg8::C => low(self.bc),
            Reg8::D => high(self.de),
            Reg8::E => low(self.de),
            Reg8::H => high(self.hl),
            Reg8::L => low(self.hl),
            Reg8::A => high(self.af),
        }
    }

    pub fn set8(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::B => self.bc = with_high(self.bc, value),
            Reg8::C => self.bc = with_low(self.bc, value),
            Reg8::D => self.de = with_high(self.de, value),
            Reg8::E => self.de = with_low(self.de, value),
            Reg8::H => self.hl = with_high(self.hl, value),
            Reg8::L => self.hl = with_low(self.hl, value),
            Reg8::A => self.af = with_high(self.af, value),
        }
    }

    pub fn a(&self) -> u8 {
        high(self.af)
    }

    pub fn set_a(&mut self, value: u8) {
        self.af = with_high(self.af, value);
    }

    pub fn f(&self) -> u8 {
        low(self.af)
    }

    pub fn set_f(&mut self, value: u8) {
        self.af = with_low(self.af, value);
    }

    pub fn b(&self) -> u8 {
        high(self.bc)
    }

    pub fn set_b(&mut self, value: u8) {
        self.bc = with_high(self.bc, value);
    }

    pub fn c(&self) -> u8 {
        low(self.bc)
    }

    pub fn set_c(&mut self, value: u8) {
        self.bc = with_low(self.bc, value);
    }

    pub fn e(&self) -> u8 {
        low(self.de)
    }

    pub fn h(&self) -> u8 {
        high(self.hl)
    }

    pub fn l(&self) -> u8 {
        low(self.hl)
    }

    /// High byte of IX or IY (undocumented IXH/IYH).
    pub fn index_high(&self, reg: Reg16) -> u8 {
        high(self.get16(reg))
    }

    pub fn set_index_high(&mut self, reg: Reg16, value: u8) {
        let pair = with_high(self.get16(reg), value);
        self.set16(reg, pair);
    }

    pub fn index_low(&self, reg: Reg16) -> u8 {
        low(self.get16(reg))
    }

    pub fn set_index_low(&mut self, reg: Reg16, value: u8) {
        let pair = with_low(self.get16(reg), value);
        self.set16(reg, pair);
    }

    // Flags

    pub fn flag(&self, mask: u8) -> bool {
        self.f() & mask != 0
    }

    pub fn set_flag(&mut self, mask: u8, value: bool) {
        let f = if value { self.f() | mask } else { self.f() & !mask };
        self.set_f(f);
    }

    pub fn carry(&self) -> bool {
        self.flag(FLAG_C)
    }

    // Interrupt and refresh state

    pub fn i(&self) -> u8 {
        high(self.ir)
    }

    pub fn set_i(&mut self, value: u8) {
        self.ir = with_high(self.ir, value);
    }

    pub fn r(&self) -> u8 {
        low(self.ir)
    }

    pub fn set_r(&mut self, value: u8) {
        self.ir = with_low(self.ir, value);
    }

    pub fn iff(&self) -> u8 {
        self.iff
    }

    pub fn set_iff(&mut self, value: u8) {
        self.iff = value & 3;
    }

    pub fn interrupt_mode(&self) -> u8 {
        self.im
    }

    pub fn set_interrupt_mode(&mut self, mode: u8) {
        self.im = mode;
    }

    // Exchanges

    /// EX AF,AF'
    pub fn exchange_af(&mut self) {
        std::mem::swap(&mut self.af, &mut self.af_alt);
    }

    /// EXX
    pub fn exchange_main(&mut self) {
        std::mem::swap(&mut self.bc, &mut self.bc_alt);
        std::mem::swap(&mut self.de, &mut self.de_alt);
        std::mem::swap(&mut self.hl, &mut self.hl_alt);
    }

    /// EX DE,HL
    pub fn exchange_de_hl(&mut self) {
        std::mem::swap(&mut self.de, &mut self.hl);
    }
}

impl std::fmt::Display for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PC={:04X} AF={:04X} BC={:04X} DE={:04X} HL={:04X} IX={:04X} IY={:04X} SP={:04X}",
            self.pc, self.af, self.bc, self.de, self.hl, self.ix, self.iy, self.sp
        )
    }
}
