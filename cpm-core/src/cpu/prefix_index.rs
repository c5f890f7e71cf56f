//! DD/FD prefixes: IX/IY in place of HL, `(IX+d)` in place of `(HL)`, and
//! the undocumented IXH/IXL/IYH/IYL byte halves. An opcode the prefix does
//! not affect runs as if unprefixed.

use super::flags::{self, AluOp, ShiftOp};
use super::{Cpu, Ports, Reg16, Reg8};
use crate::memory::Memory;

impl Cpu {
    pub(super) fn execute_index<P: Ports>(
        &mut self,
        index: Reg16,
        mem: &mut Memory,
        ports: &mut P,
    ) {
        let op = self.fetch_opcode(mem);
        match op {
            // ADD IX,rr (rr = BC, DE, IX, SP)
            0x09 | 0x19 | 0x29 | 0x39 => {
                let operand = match op >> 4 {
                    0 => self.regs.bc(),
                    1 => self.regs.de(),
                    2 => self.regs.get16(index),
                    _ => self.regs.sp(),
                };
                let (r, f) = flags::add16(self.regs.get16(index), operand, self.regs.f());
                self.regs.set16(index, r);
                self.regs.set_f(f);
            }

            0x21 => {
                let value = self.fetch16(mem);
                self.regs.set16(index, value);
            }
            0x22 => {
                let addr = self.fetch16(mem);
                mem.write16(addr, self.regs.get16(index));
            }
            0x2A => {
                let addr = self.fetch16(mem);
                self.regs.set16(index, mem.read16(addr));
            }
            0x23 => self.regs.set16(index, self.regs.get16(index).wrapping_add(1)),
            0x2B => self.regs.set16(index, self.regs.get16(index).wrapping_sub(1)),

            // INC/DEC/LD n on IXH and IXL
            0x24 | 0x2C => {
                let code = (op >> 3) & 7;
                let (r, f) = flags::inc8(self.read_index_operand(index, code), self.regs.f());
                self.write_index_operand(index, code, r);
                self.regs.set_f(f);
            }
            0x25 | 0x2D => {
                let code = (op >> 3) & 7;
                let (r, f) = flags::dec8(self.read_index_operand(index, code), self.regs.f());
                self.write_index_operand(index, code, r);
                self.regs.set_f(f);
            }
            0x26 | 0x2E => {
                let value = self.fetch(mem);
                self.write_index_operand(index, (op >> 3) & 7, value);
            }

            // INC/DEC/LD n on (IX+d)
            0x34 => {
                let addr = self.indexed_address(index, mem);
                let (r, f) = flags::inc8(mem.read(addr), self.regs.f());
                mem.write(addr, r);
                self.regs.set_f(f);
            }
            0x35 => {
                let addr = self.indexed_address(index, mem);
                let (r, f) = flags::dec8(mem.read(addr), self.regs.f());
                mem.write(addr, r);
                self.regs.set_f(f);
            }
            0x36 => {
                let addr = self.indexed_address(index, mem);
                let value = self.fetch(mem);
                mem.write(addr, value);
            }

            0x76 => self.execute(op, mem, ports),

            // LD r,r' with substitutions. A memory operand on either side
            // keeps the other side on the real H and L.
            0x40..=0x7F => {
                let dst = (op >> 3) & 7;
                let src = op & 7;
                if src == 6 {
                    let addr = self.indexed_address(index, mem);
                    let value = mem.read(addr);
                    self.write_operand(dst, value, mem);
                } else if dst == 6 {
                    let addr = self.indexed_address(index, mem);
                    let value = self.read_operand(src, mem);
                    mem.write(addr, value);
                } else {
                    let value = self.read_index_operand(index, src);
                    self.write_index_operand(index, dst, value);
                }
            }

            // ALU A,r with substitutions
            0x80..=0xBF => {
                let src = op & 7;
                let operand = if src == 6 {
                    let addr = self.indexed_address(index, mem);
                    mem.read(addr)
                } else {
                    self.read_index_operand(index, src)
                };
                self.alu(AluOp::from_code(op >> 3), operand);
            }

            0xCB => self.execute_index_cb(index, mem),

            0xE1 => {
                let value = self.pop(mem);
                self.regs.set16(index, value);
            }
            0xE5 => {
                let value = self.regs.get16(index);
                self.push(mem, value);
            }
            0xE3 => {
                let sp = self.regs.sp();
                let top = mem.read16(sp);
                mem.write16(sp, self.regs.get16(index));
                self.regs.set16(index, top);
            }
            0xE9 => self.regs.set_pc(self.regs.get16(index)),
            0xF9 => self.regs.set_sp(self.regs.get16(index)),

            _ => self.execute(op, mem, ports),
        }
    }

    fn indexed_address(&mut self, index: Reg16, mem: &Memory) -> u16 {
        let base = self.regs.get16(index);
        self.displaced(base, mem)
    }

    /// DD CB d op / FD CB d op. Rotates, RES and SET also copy the result
    /// into the register named by the low three bits unless that is 6.
    fn execute_index_cb(&mut self, index: Reg16, mem: &mut Memory) {
        let addr = self.indexed_address(index, mem);
        let op = self.fetch(mem);
        let n = (op >> 3) & 7;
        let value = mem.read(addr);

        let result = match op >> 6 {
            0 => {
                let (r, f) = ShiftOp::from_code(n).apply(value, self.regs.f());
                self.regs.set_f(f);
                r
            }
            1 => {
                let f = flags::bit(n, value, self.regs.f(), (addr >> 8) as u8);
                self.regs.set_f(f);
                return;
            }
            2 => value & !(1 << n),
            _ => value | (1 << n),
        };

        mem.write(addr, result);
        if let Some(reg) = Reg8::from_code(op) {
            self.regs.set8(reg, result);
        }
    }
}
