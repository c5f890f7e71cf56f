//! CB prefix: rotates, shifts and bit operations on r or (HL).

use super::flags::{self, ShiftOp};
use super::Cpu;
use crate::memory::Memory;

impl Cpu {
    pub(super) fn execute_cb(&mut self, mem: &mut Memory) {
        let op = self.fetch_opcode(mem);
        let code = op & 7;
        let n = (op >> 3) & 7;
        let value = self.read_operand(code, mem);

        match op >> 6 {
            0 => {
                let (r, f) = ShiftOp::from_code(n).apply(value, self.regs.f());
                self.write_operand(code, r, mem);
                self.regs.set_f(f);
            }
            1 => {
                // BIT n,(HL) leaves bits 5/3 clear
                let xy = if code == 6 { 0 } else { value };
                let f = flags::bit(n, value, self.regs.f(), xy);
                self.regs.set_f(f);
            }
            2 => self.write_operand(code, value & !(1 << n), mem),
            _ => self.write_operand(code, value | (1 << n), mem),
        }
    }
}
