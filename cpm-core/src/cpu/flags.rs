//! Flag bits, lookup tables and ALU helpers.
//!
//! The helpers are pure: they take operands (and the incoming flags where
//! an instruction preserves some of them) and return the result together
//! with the new F register. Carry and half-carry use the "cbits" technique:
//! bit N of `a ^ b ^ result` is the carry into bit N.
//!
//! Tables are built at compile time. Generating formulas:
//!
//! - `SZ[r]   = (r & 0xA8) | (r == 0) << 6` (S, Z and the undocumented bits 5/3)
//! - `SZP[r]  = SZ[r] | even_parity(r) << 2`
//! - `INC[r]  = SZ[r] | ((r & 0x0F) == 0x00) << 4 | (r == 0x80) << 2`, indexed by the result
//! - `DEC[r]  = SZ[r] | ((r & 0x0F) == 0x0F) << 4 | (r == 0x7F) << 2 | N`, indexed by the result

pub const FLAG_C: u8 = 0x01;
pub const FLAG_N: u8 = 0x02;
pub const FLAG_PV: u8 = 0x04;
/// Undocumented copy of result bit 3.
pub const FLAG_X: u8 = 0x08;
pub const FLAG_H: u8 = 0x10;
/// Undocumented copy of result bit 5.
pub const FLAG_Y: u8 = 0x20;
pub const FLAG_Z: u8 = 0x40;
pub const FLAG_S: u8 = 0x80;

const FLAGS_XY: u8 = FLAG_X | FLAG_Y;
const FLAGS_SXY: u8 = FLAG_S | FLAG_X | FLAG_Y;

const fn parity(v: u8) -> u8 {
    if v.count_ones() % 2 == 0 {
        FLAG_PV
    } else {
        0
    }
}

const fn build_sz() -> [u8; 256] {
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        t[i] = (v & FLAGS_SXY) | if v == 0 { FLAG_Z } else { 0 };
        i += 1;
    }
    t
}

const fn build_szp() -> [u8; 256] {
    let sz = build_sz();
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        t[i] = sz[i] | parity(i as u8);
        i += 1;
    }
    t
}

const fn build_inc() -> [u8; 256] {
    let sz = build_sz();
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        t[i] = sz[i]
            | if v & 0x0F == 0 { FLAG_H } else { 0 }
            | if v == 0x80 { FLAG_PV } else { 0 };
        i += 1;
    }
    t
}

const fn build_dec() -> [u8; 256] {
    let sz = build_sz();
    let mut t = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u8;
        t[i] = sz[i]
            | if v & 0x0F == 0x0F { FLAG_H } else { 0 }
            | if v == 0x7F { FLAG_PV } else { 0 }
            | FLAG_N;
        i += 1;
    }
    t
}

pub const SZ: [u8; 256] = build_sz();
pub const SZP: [u8; 256] = build_szp();
pub const INC: [u8; 256] = build_inc();
pub const DEC: [u8; 256] = build_dec();

/// H from bit 4 and C from bit 8 of an 8-bit cbits value.
#[inline]
fn carries(cbits: u32) -> u8 {
    ((cbits & 0x10) | ((cbits >> 8) & 1)) as u8
}

/// Signed overflow: carry out of bit 7 XOR carry into bit 7.
#[inline]
fn overflow(cbits: u32) -> u8 {
    (((cbits >> 6) ^ (cbits >> 5)) & 4) as u8
}

/// ADD / ADC.
pub fn add8(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let sum = a as u32 + b as u32 + carry_in as u32;
    let cbits = a as u32 ^ b as u32 ^ sum;
    let r = sum as u8;
    (r, SZ[r as usize] | carries(cbits) | overflow(cbits))
}

/// SUB / SBC. Also NEG as `sub8(0, a, false)`.
pub fn sub8(a: u8, b: u8, borrow_in: bool) -> (u8, u8) {
    let diff = (a as u32).wrapping_sub(b as u32).wrapping_sub(borrow_in as u32);
    let cbits = (a as u32 ^ b as u32 ^ diff) & 0x1FF;
    let r = diff as u8;
    (r, SZ[r as usize] | carries(cbits) | overflow(cbits) | FLAG_N)
}

/// CP: a subtract whose bits 5/3 come from the operand.
pub fn cp8(a: u8, b: u8) -> u8 {
    let (_, f) = sub8(a, b, false);
    (f & !FLAGS_XY) | (b & FLAGS_XY)
}

pub fn and8(a: u8, b: u8) -> (u8, u8) {
    let r = a & b;
    (r, SZP[r as usize] | FLAG_H)
}

pub fn xor8(a: u8, b: u8) -> (u8, u8) {
    let r = a ^ b;
    (r, SZP[r as usize])
}

pub fn or8(a: u8, b: u8) -> (u8, u8) {
    let r = a | b;
    (r, SZP[r as usize])
}

/// INC r. Carry is preserved.
pub fn inc8(v: u8, f: u8) -> (u8, u8) {
    let r = v.wrapping_add(1);
    (r, (f & FLAG_C) | INC[r as usize])
}

/// DEC r. Carry is preserved.
pub fn dec8(v: u8, f: u8) -> (u8, u8) {
    let r = v.wrapping_sub(1);
    (r, (f & FLAG_C) | DEC[r as usize])
}

/// The eight ALU operations selected by bits 5-3 of 0x80-0xBF and the
/// immediate forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,
}

impl AluOp {
    pub fn from_code(code: u8) -> Self {
        match code & 7 {
            0 => Self::Add,
            1 => Self::Adc,
            2 => Self::Sub,
            3 => Self::Sbc,
            4 => Self::And,
            5 => Self::Xor,
            6 => Self::Or,
            _ => Self::Cp,
        }
    }

    /// Apply to the accumulator. Returns the new A and F.
    pub fn apply(self, a: u8, operand: u8, f: u8) -> (u8, u8) {
        let carry = f & FLAG_C != 0;
        match self {
            Self::Add => add8(a, operand, false),
            Self::Adc => add8(a, operand, carry),
            Self::Sub => sub8(a, operand, false),
            Self::Sbc => sub8(a, operand, carry),
            Self::And => and8(a, operand),
            Self::Xor => xor8(a, operand),
            Self::Or => or8(a, operand),
            Self::Cp => (a, cp8(a, operand)),
        }
    }
}

/// DAA, driven by N, H and C of the previous operation.
pub fn daa(a: u8, f: u8) -> (u8, u8) {
    let mut acu = a as i32;
    let low = acu & 0x0F;
    let carry = (f & FLAG_C) as i32;
    let mut half = f & FLAG_H;

    if f & FLAG_N != 0 {
        let adjust_high = carry != 0 || acu > 0x99;
        if half != 0 || low > 9 {
            if low > 5 {
                half = 0;
            }
            acu = (acu - 6) & 0xFF;
        }
        if adjust_high {
            acu -= 0x160;
        }
    } else {
        if half != 0 || low > 9 {
            half = if low > 9 { FLAG_H } else { 0 };
            acu += 6;
        }
        if carry != 0 || (acu & 0x1F0) > 0x90 {
            acu += 0x60;
        }
    }

    let r = acu as u8;
    let c = ((acu >> 8) & 1) as u8 | carry as u8;
    (r, (f & FLAG_N) | half | SZP[r as usize] | c)
}

/// RLCA
pub fn rlca(a: u8, f: u8) -> (u8, u8) {
    let r = a.rotate_left(1);
    (r, rotate_a_flags(r, f, a & 0x80 != 0))
}

/// RRCA
pub fn rrca(a: u8, f: u8) -> (u8, u8) {
    let r = a.rotate_right(1);
    (r, rotate_a_flags(r, f, a & 0x01 != 0))
}

/// RLA
pub fn rla(a: u8, f: u8) -> (u8, u8) {
    let r = (a << 1) | (f & FLAG_C);
    (r, rotate_a_flags(r, f, a & 0x80 != 0))
}

/// RRA
pub fn rra(a: u8, f: u8) -> (u8, u8) {
    let r = (a >> 1) | ((f & FLAG_C) << 7);
    (r, rotate_a_flags(r, f, a & 0x01 != 0))
}

/// Accumulator rotates keep S, Z and P/V and clear H and N.
fn rotate_a_flags(r: u8, f: u8, carry: bool) -> u8 {
    (f & (FLAG_S | FLAG_Z | FLAG_PV)) | (r & FLAGS_XY) | carry as u8
}

/// CPL
pub fn cpl(a: u8, f: u8) -> (u8, u8) {
    let r = !a;
    (r, (f & (FLAG_S | FLAG_Z | FLAG_PV | FLAG_C)) | (r & FLAGS_XY) | FLAG_H | FLAG_N)
}

/// SCF
pub fn scf(a: u8, f: u8) -> u8 {
    (f & (FLAG_S | FLAG_Z | FLAG_PV)) | (a & FLAGS_XY) | FLAG_C
}

/// CCF: H takes the old carry.
pub fn ccf(a: u8, f: u8) -> u8 {
    let old_c = f & FLAG_C;
    (f & (FLAG_S | FLAG_Z | FLAG_PV)) | (a & FLAGS_XY) | (old_c << 4) | (old_c ^ FLAG_C)
}

/// CB-prefix shift and rotate operations, selected by bits 5-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftOp {
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    /// Undocumented: shift left, bit 0 set.
    Sll,
    Srl,
}

impl ShiftOp {
    pub fn from_code(code: u8) -> Self {
        match code & 7 {
            0 => Self::Rlc,
            1 => Self::Rrc,
            2 => Self::Rl,
            3 => Self::Rr,
            4 => Self::Sla,
            5 => Self::Sra,
            6 => Self::Sll,
            _ => Self::Srl,
        }
    }

    /// Returns the result and the full new F register.
    pub fn apply(self, v: u8, f: u8) -> (u8, u8) {
        let carry_in = f & FLAG_C;
        let (r, carry_out) = match self {
            Self::Rlc => (v.rotate_left(1), v & 0x80 != 0),
            Self::Rrc => (v.rotate_right(1), v & 0x01 != 0),
            Self::Rl => ((v << 1) | carry_in, v & 0x80 != 0),
            Self::Rr => ((v >> 1) | (carry_in << 7), v & 0x01 != 0),
            Self::Sla => (v << 1, v & 0x80 != 0),
            Self::Sra => ((v >> 1) | (v & 0x80), v & 0x01 != 0),
            Self::Sll => ((v << 1) | 1, v & 0x80 != 0),
            Self::Srl => (v >> 1, v & 0x01 != 0),
        };
        (r, shift_flags(r, carry_out))
    }
}

/// Flags shared by every CB shift/rotate.
pub fn shift_flags(result: u8, carry: bool) -> u8 {
    SZP[result as usize] | carry as u8
}

/// BIT n. `xy` supplies bits 5/3 (the tested register, or 0 for `(HL)`).
pub fn bit(n: u8, value: u8, f: u8, xy: u8) -> u8 {
    let base = if value & (1 << n) != 0 {
        FLAG_H | if n == 7 { FLAG_S } else { 0 }
    } else {
        FLAG_Z | FLAG_H | FLAG_PV
    };
    (f & FLAG_C) | base | (xy & FLAGS_XY)
}

/// ADD HL,rr (and IX/IY): S, Z and P/V are preserved.
pub fn add16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let sum = a as u32 + b as u32;
    let cbits = (a as u32 ^ b as u32 ^ sum) >> 8;
    let flags = (f & (FLAG_S | FLAG_Z | FLAG_PV)) | ((sum >> 8) as u8 & FLAGS_XY) | carries(cbits);
    (sum as u16, flags)
}

/// ADC HL,rr
pub fn adc16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let sum = a as u32 + b as u32 + (f & FLAG_C) as u32;
    let cbits = (a as u32 ^ b as u32 ^ sum) >> 8;
    (sum as u16, flags16(sum, cbits))
}

/// SBC HL,rr
pub fn sbc16(a: u16, b: u16, f: u8) -> (u16, u8) {
    let diff = (a as u32)
        .wrapping_sub(b as u32)
        .wrapping_sub((f & FLAG_C) as u32);
    let cbits = ((a as u32 ^ b as u32 ^ diff) >> 8) & 0x1FF;
    (diff as u16, flags16(diff, cbits) | FLAG_N)
}

fn flags16(sum: u32, cbits: u32) -> u8 {
    let zero = if sum & 0xFFFF == 0 { FLAG_Z } else { 0 };
    ((sum >> 8) as u8 & FLAGS_SXY) | zero | carries(cbits) | overflow(cbits)
}

/// IN r,(C) and the RRD/RLD result: carry kept, everything else from the value.
pub fn szp_keep_carry(value: u8, f: u8) -> u8 {
    (f & FLAG_C) | SZP[value as usize]
}

/// LD A,I / LD A,R: P/V reflects IFF2; C and bits 5/3 are kept.
pub fn ld_a_ir(value: u8, f: u8, iff: u8) -> u8 {
    let z = if value == 0 { FLAG_Z } else { 0 };
    (f & (FLAG_C | FLAGS_XY)) | (value & FLAG_S) | z | ((iff & 2) << 1)
}

pub fn parity_flag(v: u8) -> u8 {
    parity(v)
}
