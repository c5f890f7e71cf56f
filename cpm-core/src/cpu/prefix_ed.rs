//! ED prefix: 16-bit carry arithmetic, port I/O through C, interrupt and
//! refresh registers, nibble rotates and the block instructions.

use super::flags::{self, FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_X, FLAG_Y, FLAG_Z};
use super::{Cpu, Ports, Reg16, Reg8};
use crate::memory::Memory;

fn advance(addr: u16, increment: bool) -> u16 {
    if increment {
        addr.wrapping_add(1)
    } else {
        addr.wrapping_sub(1)
    }
}

impl Cpu {
    pub(super) fn execute_ed<P: Ports>(&mut self, mem: &mut Memory, ports: &mut P) {
        let op = self.fetch_opcode(mem);
        match op {
            // IN r,(C); ED 70 only sets flags
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let port = self.regs.c();
                let value = ports.input(port, &mut self.regs, mem);
                if let Some(reg) = Reg8::from_code(op >> 3) {
                    self.regs.set8(reg, value);
                }
                let f = flags::szp_keep_carry(value, self.regs.f());
                self.regs.set_f(f);
            }
            // OUT (C),r; ED 71 writes zero
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let value = Reg8::from_code(op >> 3).map_or(0, |reg| self.regs.get8(reg));
                let port = self.regs.c();
                ports.output(port, value, &mut self.regs, mem);
            }

            // SBC HL,rr / ADC HL,rr
            0x42 | 0x52 | 0x62 | 0x72 => {
                let operand = self.regs.get16(Reg16::from_dd(op >> 4));
                let (r, f) = flags::sbc16(self.regs.hl(), operand, self.regs.f());
                self.regs.set_hl(r);
                self.regs.set_f(f);
            }
            0x4A | 0x5A | 0x6A | 0x7A => {
                let operand = self.regs.get16(Reg16::from_dd(op >> 4));
                let (r, f) = flags::adc16(self.regs.hl(), operand, self.regs.f());
                self.regs.set_hl(r);
                self.regs.set_f(f);
            }

            // LD (nn),rr / LD rr,(nn)
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.fetch16(mem);
                mem.write16(addr, self.regs.get16(Reg16::from_dd(op >> 4)));
            }
            0x4B | 0x5B | 0x6B | 0x7B => {
                let addr = self.fetch16(mem);
                self.regs.set16(Reg16::from_dd(op >> 4), mem.read16(addr));
            }

            // NEG and its undocumented mirrors
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let (a, f) = flags::sub8(0, self.regs.a(), false);
                self.regs.set_a(a);
                self.regs.set_f(f);
            }

            // RETN / RETI
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                let iff = self.regs.iff();
                self.regs.set_iff(iff | (iff >> 1));
                let pc = self.pop(mem);
                self.regs.set_pc(pc);
            }

            0x46 | 0x4E | 0x66 | 0x6E => self.regs.set_interrupt_mode(0),
            0x56 | 0x76 => self.regs.set_interrupt_mode(1),
            0x5E | 0x7E => self.regs.set_interrupt_mode(2),

            0x47 => self.regs.set_i(self.regs.a()),
            0x4F => self.regs.set_r(self.regs.a()),
            0x57 => {
                let value = self.regs.i();
                let f = flags::ld_a_ir(value, self.regs.f(), self.regs.iff());
                self.regs.set_a(value);
                self.regs.set_f(f);
            }
            0x5F => {
                let value = self.regs.r();
                let f = flags::ld_a_ir(value, self.regs.f(), self.regs.iff());
                self.regs.set_a(value);
                self.regs.set_f(f);
            }

            // RRD / RLD
            0x67 => {
                let hl = self.regs.hl();
                let m = mem.read(hl);
                let a = self.regs.a();
                mem.write(hl, (a << 4) | (m >> 4));
                self.set_a_keep_carry((a & 0xF0) | (m & 0x0F));
            }
            0x6F => {
                let hl = self.regs.hl();
                let m = mem.read(hl);
                let a = self.regs.a();
                mem.write(hl, (m << 4) | (a & 0x0F));
                self.set_a_keep_carry((a & 0xF0) | (m >> 4));
            }

            0x77 | 0x7F => {}

            0xA0 => self.block_load(mem, true, false),
            0xA8 => self.block_load(mem, false, false),
            0xB0 => self.block_load(mem, true, true),
            0xB8 => self.block_load(mem, false, true),

            0xA1 => self.block_compare(mem, true, false),
            0xA9 => self.block_compare(mem, false, false),
            0xB1 => self.block_compare(mem, true, true),
            0xB9 => self.block_compare(mem, false, true),

            0xA2 => self.block_in(mem, ports, true, false),
            0xAA => self.block_in(mem, ports, false, false),
            0xB2 => self.block_in(mem, ports, true, true),
            0xBA => self.block_in(mem, ports, false, true),

            0xA3 => self.block_out(mem, ports, true, false),
            0xAB => self.block_out(mem, ports, false, false),
            0xB3 => self.block_out(mem, ports, true, true),
            0xBB => self.block_out(mem, ports, false, true),

            _ => {
                tracing::warn!(pc = self.regs.pcx(), opcode = op, "unknown ED opcode ignored");
            }
        }
    }

    fn set_a_keep_carry(&mut self, value: u8) {
        let f = flags::szp_keep_carry(value, self.regs.f());
        self.regs.set_a(value);
        self.regs.set_f(f);
    }

    /// Repeat count for the BC-counted block forms (0 means 65536).
    fn block_count(&self, repeat: bool) -> u32 {
        match (repeat, self.regs.bc()) {
            (false, _) => 1,
            (true, 0) => 0x10000,
            (true, bc) => bc as u32,
        }
    }

    /// LDI / LDD / LDIR / LDDR
    fn block_load(&mut self, mem: &mut Memory, increment: bool, repeat: bool) {
        let mut count = self.block_count(repeat);
        let mut value;
        loop {
            let hl = self.regs.hl();
            let de = self.regs.de();
            value = mem.read(hl);
            mem.write(de, value);
            self.regs.set_hl(advance(hl, increment));
            self.regs.set_de(advance(de, increment));
            self.regs.set_bc(self.regs.bc().wrapping_sub(1));
            count -= 1;
            if count == 0 {
                break;
            }
        }

        let n = value.wrapping_add(self.regs.a());
        let mut f = (self.regs.f() & (FLAG_S | FLAG_Z | FLAG_C)) | (n & FLAG_X) | ((n & 0x02) << 4);
        if self.regs.bc() != 0 {
            f |= FLAG_PV;
        }
        self.regs.set_f(f);
    }

    /// CPI / CPD / CPIR / CPDR
    fn block_compare(&mut self, mem: &mut Memory, increment: bool, repeat: bool) {
        let a = self.regs.a();
        let mut count = self.block_count(repeat);
        let mut value;
        loop {
            let hl = self.regs.hl();
            value = mem.read(hl);
            self.regs.set_hl(advance(hl, increment));
            self.regs.set_bc(self.regs.bc().wrapping_sub(1));
            count -= 1;
            if count == 0 || value == a {
                break;
            }
        }

        let sum = (a as u32).wrapping_sub(value as u32);
        let cbits = a as u32 ^ value as u32 ^ sum;
        let adjusted = sum.wrapping_sub((cbits >> 4) & 1);
        let mut f = (self.regs.f() & FLAG_C)
            | (sum as u8 & FLAG_S)
            | (((adjusted & 0x02) << 4) as u8)
            | (cbits as u8 & FLAG_H)
            | (adjusted as u8 & FLAG_X)
            | FLAG_N;
        if sum & 0xFF == 0 {
            f |= FLAG_Z;
        }
        if self.regs.bc() != 0 {
            f |= FLAG_PV;
        }
        if sum & 0x0F == 8 && cbits & 0x10 != 0 {
            f &= !FLAG_X;
        }
        self.regs.set_f(f);
    }

    /// Repeat count for the B-counted I/O block forms (0 means 256).
    fn io_count(&self, repeat: bool) -> u32 {
        match (repeat, self.regs.b()) {
            (false, _) => 1,
            (true, 0) => 0x100,
            (true, b) => b as u32,
        }
    }

    /// INI / IND / INIR / INDR
    fn block_in<P: Ports>(
        &mut self,
        mem: &mut Memory,
        ports: &mut P,
        increment: bool,
        repeat: bool,
    ) {
        let start_b = self.regs.b();
        let mut count = self.io_count(repeat);
        let mut value;
        loop {
            let port = self.regs.c();
            value = ports.input(port, &mut self.regs, mem);
            let hl = self.regs.hl();
            mem.write(hl, value);
            self.regs.set_hl(advance(hl, increment));
            count -= 1;
            if count == 0 {
                break;
            }
        }
        self.finish_io_block(start_b, repeat);
        let adjust = advance(self.regs.c() as u16, increment) as u8;
        self.io_block_flags(value, adjust, start_b, repeat);
    }

    /// OUTI / OUTD / OTIR / OTDR
    fn block_out<P: Ports>(
        &mut self,
        mem: &mut Memory,
        ports: &mut P,
        increment: bool,
        repeat: bool,
    ) {
        let start_b = self.regs.b();
        let mut count = self.io_count(repeat);
        let mut value;
        loop {
            let hl = self.regs.hl();
            value = mem.read(hl);
            let port = self.regs.c();
            ports.output(port, value, &mut self.regs, mem);
            self.regs.set_hl(advance(hl, increment));
            count -= 1;
            if count == 0 {
                break;
            }
        }
        self.finish_io_block(start_b, repeat);
        let adjust = self.regs.l();
        self.io_block_flags(value, adjust, start_b, repeat);
    }

    fn finish_io_block(&mut self, start_b: u8, repeat: bool) {
        let b = if repeat { 0 } else { start_b.wrapping_sub(1) };
        self.regs.set_b(b);
    }

    /// Flags for the I/O block group. `value` is the last byte moved,
    /// `adjust` the C+-1 or L term and `start_b` the counter on entry.
    fn io_block_flags(&mut self, value: u8, adjust: u8, start_b: u8, repeat: bool) {
        let b = self.regs.b();
        let mut f = if repeat {
            FLAG_Z
        } else {
            (b & (FLAG_S | FLAG_Y | FLAG_X)) | if b == 0 { FLAG_Z } else { 0 }
        };
        f |= (value & 0x80) >> 6;
        let k = value as u16 + adjust as u16;
        if k > 0xFF {
            f |= FLAG_C | FLAG_H;
        }
        f |= flags::parity_flag((k & 7) as u8 ^ start_b);
        self.regs.set_f(f);
    }
}
