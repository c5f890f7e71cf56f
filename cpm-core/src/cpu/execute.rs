//! Unprefixed opcode space (00-FF).

use super::flags::{self, AluOp};
use super::{Cpu, Ports, Reg16, Reg8, RunState};
use crate::memory::Memory;

impl Cpu {
    pub(super) fn execute<P: Ports>(&mut self, op: u8, mem: &mut Memory, ports: &mut P) {
        match op {
            0x00 => {} // NOP

            // LD rr,nn
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch16(mem);
                self.regs.set16(Reg16::from_dd(op >> 4), value);
            }

            0x02 => mem.write(self.regs.bc(), self.regs.a()),
            0x12 => mem.write(self.regs.de(), self.regs.a()),
            0x0A => {
                let value = mem.read(self.regs.bc());
                self.regs.set_a(value);
            }
            0x1A => {
                let value = mem.read(self.regs.de());
                self.regs.set_a(value);
            }

            // INC rr / DEC rr
            0x03 | 0x13 | 0x23 | 0x33 => {
                let reg = Reg16::from_dd(op >> 4);
                let value = self.regs.get16(reg).wrapping_add(1);
                self.regs.set16(reg, value);
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let reg = Reg16::from_dd(op >> 4);
                let value = self.regs.get16(reg).wrapping_sub(1);
                self.regs.set16(reg, value);
            }

            // INC r / DEC r / LD r,n
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let code = (op >> 3) & 7;
                let (r, f) = flags::inc8(self.read_operand(code, mem), self.regs.f());
                self.write_operand(code, r, mem);
                self.regs.set_f(f);
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let code = (op >> 3) & 7;
                let (r, f) = flags::dec8(self.read_operand(code, mem), self.regs.f());
                self.write_operand(code, r, mem);
                self.regs.set_f(f);
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let value = self.fetch(mem);
                self.write_operand((op >> 3) & 7, value, mem);
            }

            // Accumulator rotates
            0x07 | 0x0F | 0x17 | 0x1F => {
                let rotate: fn(u8, u8) -> (u8, u8) = match op {
                    0x07 => flags::rlca,
                    0x0F => flags::rrca,
                    0x17 => flags::rla,
                    _ => flags::rra,
                };
                let (a, f) = rotate(self.regs.a(), self.regs.f());
                self.regs.set_a(a);
                self.regs.set_f(f);
            }

            0x08 => self.regs.exchange_af(),

            // ADD HL,rr
            0x09 | 0x19 | 0x29 | 0x39 => {
                let operand = self.regs.get16(Reg16::from_dd(op >> 4));
                let (r, f) = flags::add16(self.regs.hl(), operand, self.regs.f());
                self.regs.set_hl(r);
                self.regs.set_f(f);
            }

            // DJNZ e
            0x10 => {
                let b = self.regs.b().wrapping_sub(1);
                self.regs.set_b(b);
                self.jump_relative(b != 0, mem);
            }
            0x18 => self.jump_relative(true, mem),
            0x20 | 0x28 | 0x30 | 0x38 => {
                let taken = self.condition((op >> 3) & 3);
                self.jump_relative(taken, mem);
            }

            0x22 => {
                let addr = self.fetch16(mem);
                mem.write16(addr, self.regs.hl());
            }
            0x2A => {
                let addr = self.fetch16(mem);
                self.regs.set_hl(mem.read16(addr));
            }
            0x32 => {
                let addr = self.fetch16(mem);
                mem.write(addr, self.regs.a());
            }
            0x3A => {
                let addr = self.fetch16(mem);
                self.regs.set_a(mem.read(addr));
            }

            0x27 => {
                let (a, f) = flags::daa(self.regs.a(), self.regs.f());
                self.regs.set_a(a);
                self.regs.set_f(f);
            }
            0x2F => {
                let (a, f) = flags::cpl(self.regs.a(), self.regs.f());
                self.regs.set_a(a);
                self.regs.set_f(f);
            }
            0x37 => {
                let f = flags::scf(self.regs.a(), self.regs.f());
                self.regs.set_f(f);
            }
            0x3F => {
                let f = flags::ccf(self.regs.a(), self.regs.f());
                self.regs.set_f(f);
            }

            0x76 => self.halt(),

            // LD r,r'
            0x40..=0x7F => {
                let value = self.read_operand(op & 7, mem);
                self.write_operand((op >> 3) & 7, value, mem);
            }

            // ALU A,r
            0x80..=0xBF => {
                let operand = self.read_operand(op & 7, mem);
                self.alu(AluOp::from_code(op >> 3), operand);
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition(op >> 3) {
                    let pc = self.pop(mem);
                    self.regs.set_pc(pc);
                }
            }

            // POP qq / PUSH qq
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop(mem);
                self.regs.set16(Reg16::from_qq(op >> 4), value);
            }
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let value = self.regs.get16(Reg16::from_qq(op >> 4));
                self.push(mem, value);
            }

            // JP cc,nn / JP nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let target = self.fetch16(mem);
                if self.condition(op >> 3) {
                    self.regs.set_pc(target);
                }
            }
            0xC3 => {
                let target = self.fetch16(mem);
                self.regs.set_pc(target);
            }

            // CALL cc,nn / CALL nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let target = self.fetch16(mem);
                if self.condition(op >> 3) {
                    self.call(target, mem);
                }
            }
            0xCD => {
                let target = self.fetch16(mem);
                self.call(target, mem);
            }

            // ALU A,n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let operand = self.fetch(mem);
                self.alu(AluOp::from_code(op >> 3), operand);
            }

            // RST p
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                self.call((op & 0x38) as u16, mem);
            }

            0xC9 => {
                let pc = self.pop(mem);
                self.regs.set_pc(pc);
            }

            0xCB => self.execute_cb(mem),
            0xED => self.execute_ed(mem, ports),
            0xDD => self.execute_index(Reg16::IX, mem, ports),
            0xFD => self.execute_index(Reg16::IY, mem, ports),

            // OUT (n),A: BIOS trap
            0xD3 => {
                let port = self.fetch(mem);
                let value = self.regs.a();
                ports.output(port, value, &mut self.regs, mem);
            }
            // IN A,(n): BDOS trap
            0xDB => {
                let port = self.fetch(mem);
                let value = ports.input(port, &mut self.regs, mem);
                self.regs.set_a(value);
            }

            0xD9 => self.regs.exchange_main(),
            0xE3 => {
                let sp = self.regs.sp();
                let top = mem.read16(sp);
                mem.write16(sp, self.regs.hl());
                self.regs.set_hl(top);
            }
            0xE9 => self.regs.set_pc(self.regs.hl()),
            0xEB => self.regs.exchange_de_hl(),
            0xF3 => self.regs.set_iff(0),
            0xFB => self.regs.set_iff(3),
            0xF9 => self.regs.set_sp(self.regs.hl()),
        }
    }

    /// Fetch the displacement and take the jump when `taken`.
    pub(super) fn jump_relative(&mut self, taken: bool, mem: &Memory) {
        let d = self.fetch(mem) as i8;
        if taken {
            let pc = self.regs.pc().wrapping_add_signed(d as i16);
            self.regs.set_pc(pc);
        }
    }

    pub(super) fn call(&mut self, target: u16, mem: &mut Memory) {
        let ret = self.regs.pc();
        self.push(mem, ret);
        self.regs.set_pc(target);
    }

    pub(super) fn alu(&mut self, op: AluOp, operand: u8) {
        let (a, f) = op.apply(self.regs.a(), operand, self.regs.f());
        self.regs.set_a(a);
        self.regs.set_f(f);
    }

    /// HALT: park PC on the opcode and stop the loop.
    pub(super) fn halt(&mut self) {
        let pc = self.regs.pc().wrapping_sub(1);
        self.regs.set_pc(pc);
        self.regs.set_state(RunState::Halted);
        tracing::debug!("CPU halted at {:#06x}", pc);
    }

    /// Value of register code `code` with H/L replaced by the halves of
    /// `index` (the DD/FD forms without a memory operand).
    pub(super) fn read_index_operand(&self, index: Reg16, code: u8) -> u8 {
        match code & 7 {
            4 => self.regs.index_high(index),
            5 => self.regs.index_low(index),
            c => Reg8::from_code(c).map_or(0, |reg| self.regs.get8(reg)),
        }
    }

    pub(super) fn write_index_operand(&mut self, index: Reg16, code: u8, value: u8) {
        match code & 7 {
            4 => self.regs.set_index_high(index, value),
            5 => self.regs.set_index_low(index, value),
            c => {
                if let Some(reg) = Reg8::from_code(c) {
                    self.regs.set8(reg, value);
                }
            }
        }
    }
}
