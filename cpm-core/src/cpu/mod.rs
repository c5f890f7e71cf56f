//! Z80 instruction engine.
//!
//! The engine owns the register file and executes one instruction per
//! [`Cpu::step`] against a borrowed [`Memory`]. Port I/O is the only way out
//! of the engine: `IN` and `OUT` call into a [`Ports`] implementation, which
//! is where the machine hangs its BDOS and BIOS traps.

mod execute;
pub mod flags;
mod observer;
mod prefix_cb;
mod prefix_ed;
mod prefix_index;
mod registers;

pub use observer::{Breakpoints, StepControl, StepObserver, Tracer};
pub use registers::{Reg16, Reg8, RunState, Registers};

use crate::memory::Memory;

/// Port I/O boundary between guest code and the host.
pub trait Ports {
    /// `IN` opcodes. The returned byte is loaded into the destination
    /// register after the call, so an implementation that also writes the
    /// accumulator should return the value it wrote.
    fn input(&mut self, port: u8, regs: &mut Registers, mem: &mut Memory) -> u8;

    /// `OUT` opcodes.
    fn output(&mut self, port: u8, value: u8, regs: &mut Registers, mem: &mut Memory);
}

/// Ports that read 0xFF and swallow writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPorts;

impl Ports for NullPorts {
    fn input(&mut self, _port: u8, _regs: &mut Registers, _mem: &mut Memory) -> u8 {
        0xFF
    }

    fn output(&mut self, _port: u8, _value: u8, _regs: &mut Registers, _mem: &mut Memory) {}
}

/// Z80 CPU: register file plus an optional step observer.
#[derive(Default)]
pub struct Cpu {
    regs: Registers,
    observer: Option<Box<dyn StepObserver + Send>>,
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn regs(&self) -> &Registers {
        &self.regs
    }

    pub fn regs_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Zero the register file and clear observer state.
    pub fn reset(&mut self) {
        self.regs.reset();
        if let Some(observer) = self.observer.as_mut() {
            observer.reset();
        }
    }

    /// Attach an observer called before every instruction.
    pub fn set_observer(&mut self, observer: Box<dyn StepObserver + Send>) {
        self.observer = Some(observer);
    }

    /// Execute until the run state leaves `Running`.
    pub fn run<P: Ports>(&mut self, mem: &mut Memory, ports: &mut P) -> RunState {
        while self.regs.state().is_running() {
            self.step(mem, ports);
        }
        self.regs.state()
    }

    /// Execute exactly one instruction (prefixes and operands included).
    pub fn step<P: Ports>(&mut self, mem: &mut Memory, ports: &mut P) {
        if let Some(observer) = self.observer.as_mut() {
            if observer.before_step(&self.regs, mem) == StepControl::Break {
                self.regs.set_state(RunState::Break);
                return;
            }
        }
        self.regs.mark_instruction_start();
        let opcode = self.fetch_opcode(mem);
        self.execute(opcode, mem, ports);
    }

    // Fetch helpers

    /// Opcode fetch (M1 cycle): bumps the low seven bits of R.
    fn fetch_opcode(&mut self, mem: &Memory) -> u8 {
        let r = self.regs.r();
        self.regs.set_r((r & 0x80) | (r.wrapping_add(1) & 0x7F));
        self.fetch(mem)
    }

    fn fetch(&mut self, mem: &Memory) -> u8 {
        let pc = self.regs.pc();
        self.regs.set_pc(pc.wrapping_add(1));
        mem.read(pc)
    }

    fn fetch16(&mut self, mem: &Memory) -> u16 {
        let lo = self.fetch(mem);
        let hi = self.fetch(mem);
        u16::from_le_bytes([lo, hi])
    }

    /// Fetch a displacement byte and add it, sign-extended, to `base`.
    fn displaced(&mut self, base: u16, mem: &Memory) -> u16 {
        let d = self.fetch(mem) as i8;
        base.wrapping_add_signed(d as i16)
    }

    // Stack

    fn push(&mut self, mem: &mut Memory, value: u16) {
        let sp = self.regs.sp().wrapping_sub(2);
        self.regs.set_sp(sp);
        mem.write16(sp, value);
    }

    fn pop(&mut self, mem: &Memory) -> u16 {
        let sp = self.regs.sp();
        self.regs.set_sp(sp.wrapping_add(2));
        mem.read16(sp)
    }

    // Operand access by three-bit register code, 6 = (HL)

    fn read_operand(&self, code: u8, mem: &Memory) -> u8 {
        match Reg8::from_code(code) {
            Some(reg) => self.regs.get8(reg),
            None => mem.read(self.regs.hl()),
        }
    }

    fn write_operand(&mut self, code: u8, value: u8, mem: &mut Memory) {
        match Reg8::from_code(code) {
            Some(reg) => self.regs.set8(reg, value),
            None => mem.write(self.regs.hl(), value),
        }
    }

    /// Condition field of JP/JR/CALL/RET cc.
    fn condition(&self, cc: u8) -> bool {
        use flags::{FLAG_C, FLAG_PV, FLAG_S, FLAG_Z};
        match cc & 7 {
            0 => !self.regs.flag(FLAG_Z),
            1 => self.regs.flag(FLAG_Z),
            2 => !self.regs.flag(FLAG_C),
            3 => self.regs.flag(FLAG_C),
            4 => !self.regs.flag(FLAG_PV),
            5 => self.regs.flag(FLAG_PV),
            6 => !self.regs.flag(FLAG_S),
            _ => self.regs.flag(FLAG_S),
        }
    }
}

impl std::fmt::Debug for Cpu {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cpu")
            .field("regs", &self.regs)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::flags::{FLAG_C, FLAG_H, FLAG_N, FLAG_PV, FLAG_S, FLAG_Z};
    use super::*;

    /// Records OUT traffic; IN returns a fixed byte.
    #[derive(Default)]
    struct RecordingPorts {
        outputs: Vec<(u8, u8, u16)>,
        input_value: u8,
        inputs: usize,
    }

    impl Ports for RecordingPorts {
        fn input(&mut self, _port: u8, _regs: &mut Registers, _mem: &mut Memory) -> u8 {
            self.inputs += 1;
            self.input_value
        }

        fn output(&mut self, port: u8, value: u8, regs: &mut Registers, _mem: &mut Memory) {
            self.outputs.push((port, value, regs.pcx()));
        }
    }

    fn machine(program: &[u8]) -> (Cpu, Memory) {
        let mut mem = Memory::new();
        mem.load(0x0100, program);
        let mut cpu = Cpu::new();
        cpu.regs_mut().set_pc(0x0100);
        cpu.regs_mut().set_sp(0xF000);
        (cpu, mem)
    }

    fn run(program: &[u8]) -> (Cpu, Memory, RecordingPorts) {
        let (mut cpu, mut mem) = machine(program);
        let mut ports = RecordingPorts::default();
        cpu.run(&mut mem, &mut ports);
        (cpu, mem, ports)
    }

    #[test]
    fn test_halt_stops_on_itself() {
        let (cpu, _, _) = run(&[0x00, 0x76]);
        assert_eq!(cpu.regs().state(), RunState::Halted);
        assert_eq!(cpu.regs().pc(), 0x0101);
    }

    #[test]
    fn test_ld_and_alu() {
        // LD A,0x41 ; LD B,0x01 ; ADD A,B ; LD C,A ; HALT
        let (cpu, _, _) = run(&[0x3E, 0x41, 0x06, 0x01, 0x80, 0x4F, 0x76]);
        assert_eq!(cpu.regs().a(), 0x42);
        assert_eq!(cpu.regs().c(), 0x42);
        assert_eq!(cpu.regs().f() & (FLAG_Z | FLAG_C | FLAG_N), 0);
    }

    #[test]
    fn test_ldir_copies_three_bytes() {
        // LD HL,0x2000 ; LD DE,0x3000 ; LD BC,3 ; LDIR ; HALT
        let (mut cpu, mut mem) = machine(&[
            0x21, 0x00, 0x20, 0x11, 0x00, 0x30, 0x01, 0x03, 0x00, 0xED, 0xB0, 0x76,
        ]);
        mem.load(0x2000, &[1, 2, 3, 4]);
        cpu.run(&mut mem, &mut NullPorts);
        assert_eq!(mem.read_block(0x3000, 4), vec![1, 2, 3, 0]);
        assert_eq!(cpu.regs().hl(), 0x2003);
        assert_eq!(cpu.regs().de(), 0x3003);
        assert_eq!(cpu.regs().bc(), 0);
        assert!(!cpu.regs().flag(FLAG_PV));
    }

    #[test]
    fn test_ldir_with_zero_count_copies_whole_space() {
        let (mut cpu, mut mem) = machine(&[0xED, 0xB0]);
        mem.write(0x8000, 0xE5);
        cpu.regs_mut().set_hl(0x8000);
        cpu.regs_mut().set_de(0x8001);
        cpu.regs_mut().set_bc(0);
        cpu.step(&mut mem, &mut NullPorts);

        // 65536 copies: both pointers come back to where they started.
        assert_eq!(cpu.regs().hl(), 0x8000);
        assert_eq!(cpu.regs().de(), 0x8001);
        assert_eq!(cpu.regs().bc(), 0);
        assert!((0..=0xFFFFu16).all(|a| mem.read(a) == 0xE5));
    }

    #[test]
    fn test_ldi_flags_track_counter() {
        let (mut cpu, mut mem) = machine(&[0xED, 0xA0, 0xED, 0xA0]);
        cpu.regs_mut().set_hl(0x2000);
        cpu.regs_mut().set_de(0x3000);
        cpu.regs_mut().set_bc(2);
        cpu.step(&mut mem, &mut NullPorts);
        assert!(cpu.regs().flag(FLAG_PV));
        cpu.step(&mut mem, &mut NullPorts);
        assert!(!cpu.regs().flag(FLAG_PV));
        assert_eq!(cpu.regs().bc(), 0);
    }

    #[test]
    fn test_cpir_stops_on_match() {
        let (mut cpu, mut mem) = machine(&[0xED, 0xB1]);
        mem.load(0x2000, b"HELLO");
        cpu.regs_mut().set_a(b'L');
        cpu.regs_mut().set_hl(0x2000);
        cpu.regs_mut().set_bc(5);
        cpu.step(&mut mem, &mut NullPorts);
        assert_eq!(cpu.regs().hl(), 0x2003);
        assert_eq!(cpu.regs().bc(), 2);
        assert!(cpu.regs().flag(FLAG_Z));
        assert!(cpu.regs().flag(FLAG_PV));
        assert!(cpu.regs().flag(FLAG_N));
    }

    #[test]
    fn test_cpir_exhausts_counter() {
        let (mut cpu, mut mem) = machine(&[0xED, 0xB1]);
        mem.load(0x2000, b"ABC");
        cpu.regs_mut().set_a(b'Z');
        cpu.regs_mut().set_hl(0x2000);
        cpu.regs_mut().set_bc(3);
        cpu.step(&mut mem, &mut NullPorts);
        assert_eq!(cpu.regs().bc(), 0);
        assert!(!cpu.regs().flag(FLAG_Z));
        assert!(!cpu.regs().flag(FLAG_PV));
    }

    #[test]
    fn test_cpir_with_zero_count_wraps_to_match() {
        let (mut cpu, mut mem) = machine(&[0xED, 0xB1]);
        mem.write(0x0004, 0x99);
        cpu.regs_mut().set_a(0x99);
        cpu.regs_mut().set_hl(0xFFF0);
        cpu.regs_mut().set_bc(0);
        cpu.step(&mut mem, &mut NullPorts);

        // 16 bytes up to 0xFFFF, then 0x0000..=0x0004.
        assert_eq!(cpu.regs().hl(), 0x0005);
        assert_eq!(cpu.regs().bc(), 0u16.wrapping_sub(21));
        assert!(cpu.regs().flag(FLAG_Z));
        assert!(cpu.regs().flag(FLAG_PV));
    }

    #[test]
    fn test_inir_with_zero_b_moves_256_bytes() {
        let (mut cpu, mut mem) = machine(&[0xED, 0xB2]);
        let mut ports = RecordingPorts {
            input_value: 0xAB,
            ..RecordingPorts::default()
        };
        cpu.regs_mut().set_hl(0x4000);
        cpu.regs_mut().set_b(0);
        cpu.regs_mut().set_c(0x10);
        cpu.step(&mut mem, &mut ports);

        assert_eq!(ports.inputs, 256);
        assert_eq!(cpu.regs().hl(), 0x4100);
        assert_eq!(cpu.regs().b(), 0);
        assert!(mem.read_block(0x4000, 256).iter().all(|&b| b == 0xAB));
        assert_eq!(mem.read(0x4100), 0);
    }

    #[test]
    fn test_otir_with_zero_b_moves_256_bytes() {
        let (mut cpu, mut mem) = machine(&[0xED, 0xB3]);
        for i in 0..=255u8 {
            mem.write(0x5000 + i as u16, i);
        }
        cpu.regs_mut().set_hl(0x5000);
        cpu.regs_mut().set_b(0);
        cpu.regs_mut().set_c(0x20);
        let mut ports = RecordingPorts::default();
        cpu.step(&mut mem, &mut ports);

        assert_eq!(ports.outputs.len(), 256);
        assert!(ports.outputs.iter().enumerate().all(|(i, &(port, value, _))| {
            port == 0x20 && value == i as u8
        }));
        assert_eq!(cpu.regs().hl(), 0x5100);
        assert_eq!(cpu.regs().b(), 0);
    }

    #[test]
    fn test_call_and_ret() {
        // CALL 0x0110 ; HALT ... 0x0110: LD A,7 ; RET
        let mut program = vec![0xCD, 0x10, 0x01, 0x76];
        program.resize(0x10, 0);
        program.extend_from_slice(&[0x3E, 0x07, 0xC9]);
        let (cpu, _, _) = run(&program);
        assert_eq!(cpu.regs().a(), 7);
        assert_eq!(cpu.regs().pc(), 0x0104);
        assert_eq!(cpu.regs().sp(), 0xF000);
    }

    #[test]
    fn test_djnz_loop() {
        // LD B,5 ; XOR A ; INC A ; DJNZ -3 ; HALT
        let (cpu, _, _) = run(&[0x06, 0x05, 0xAF, 0x3C, 0x10, 0xFD, 0x76]);
        assert_eq!(cpu.regs().a(), 5);
        assert_eq!(cpu.regs().b(), 0);
    }

    #[test]
    fn test_conditional_jumps() {
        // XOR A ; JR NZ,+2 ; LD A,1 ; JP Z,0x010A ; LD A,2 ; HALT
        let (cpu, _, _) = run(&[
            0xAF, 0x20, 0x02, 0x3E, 0x01, 0xCA, 0x0C, 0x01, 0x3E, 0x02, 0x76, 0x00, 0x76,
        ]);
        assert_eq!(cpu.regs().a(), 1);
        assert_eq!(cpu.regs().pc(), 0x010C);
    }

    #[test]
    fn test_push_pop_af() {
        // LD BC,0x1234 ; PUSH BC ; POP AF ; HALT
        let (cpu, _, _) = run(&[0x01, 0x34, 0x12, 0xC5, 0xF1, 0x76]);
        assert_eq!(cpu.regs().af(), 0x1234);
    }

    #[test]
    fn test_out_reports_port_and_pcx() {
        // LD A,0x41 ; OUT (0x0C),A ; HALT
        let (_, _, ports) = run(&[0x3E, 0x41, 0xD3, 0x0C, 0x76]);
        assert_eq!(ports.outputs, vec![(0x0C, 0x41, 0x0102)]);
    }

    #[test]
    fn test_in_loads_returned_value() {
        // IN A,(0) ; HALT
        let (mut cpu, mut mem) = machine(&[0xDB, 0x00, 0x76]);
        let mut ports = RecordingPorts {
            input_value: 0x5A,
            ..Default::default()
        };
        cpu.run(&mut mem, &mut ports);
        assert_eq!(cpu.regs().a(), 0x5A);
        assert_eq!(ports.inputs, 1);
    }

    #[test]
    fn test_in_r_c_sets_flags_keeps_carry() {
        // SCF ; IN B,(C) ; HALT
        let (mut cpu, mut mem) = machine(&[0x37, 0xED, 0x40, 0x76]);
        let mut ports = RecordingPorts::default();
        cpu.run(&mut mem, &mut ports);
        assert_eq!(cpu.regs().b(), 0);
        assert!(cpu.regs().flag(FLAG_Z));
        assert!(cpu.regs().flag(FLAG_PV));
        assert!(cpu.regs().carry());
    }

    #[test]
    fn test_neg_aliases() {
        for op in [0x44u8, 0x4C, 0x54, 0x5C, 0x64, 0x6C, 0x74, 0x7C] {
            let (cpu, _, _) = run(&[0x3E, 0x01, 0xED, op, 0x76]);
            assert_eq!(cpu.regs().a(), 0xFF, "ED {op:02X}");
            let expected = FLAG_C | FLAG_N | FLAG_S | FLAG_H;
            assert_eq!(cpu.regs().f() & expected, expected);
        }
    }

    #[test]
    fn test_sbc_and_adc_hl() {
        // LD HL,0x1000 ; LD DE,0x0001 ; SCF ; SBC HL,DE ; HALT
        let (cpu, _, _) = run(&[0x21, 0x00, 0x10, 0x11, 0x01, 0x00, 0x37, 0xED, 0x52, 0x76]);
        assert_eq!(cpu.regs().hl(), 0x0FFE);
        assert!(cpu.regs().flag(FLAG_N));

        // LD HL,0xFFFF ; LD BC,0x0001 ; ADC HL,BC ; HALT
        let (cpu, _, _) = run(&[0x21, 0xFF, 0xFF, 0x01, 0x01, 0x00, 0xED, 0x4A, 0x76]);
        assert_eq!(cpu.regs().hl(), 0);
        assert!(cpu.regs().flag(FLAG_Z));
        assert!(cpu.regs().carry());
    }

    #[test]
    fn test_exchanges() {
        // LD HL,1 ; LD DE,2 ; EX DE,HL ; EXX ; LD HL,3 ; EXX ; HALT
        let (cpu, _, _) = run(&[
            0x21, 0x01, 0x00, 0x11, 0x02, 0x00, 0xEB, 0xD9, 0x21, 0x03, 0x00, 0xD9, 0x76,
        ]);
        assert_eq!(cpu.regs().hl(), 2);
        assert_eq!(cpu.regs().de(), 1);
        assert_eq!(cpu.regs().alternates()[3], 3);
    }

    #[test]
    fn test_ex_sp_hl() {
        // LD HL,0xBEEF ; LD BC,0x1234 ; PUSH BC ; EX (SP),HL ; POP BC ; HALT
        let (cpu, _, _) = run(&[0x21, 0xEF, 0xBE, 0x01, 0x34, 0x12, 0xC5, 0xE3, 0xC1, 0x76]);
        assert_eq!(cpu.regs().hl(), 0x1234);
        assert_eq!(cpu.regs().bc(), 0xBEEF);
    }

    #[test]
    fn test_cb_bit_set_res() {
        // LD B,0 ; SET 7,B ; BIT 7,B ; RES 7,B ; HALT
        let (mut cpu, mut mem) = machine(&[0x06, 0x00, 0xCB, 0xF8, 0xCB, 0x78, 0xCB, 0xB8, 0x76]);
        for _ in 0..3 {
            cpu.step(&mut mem, &mut NullPorts);
        }
        assert_eq!(cpu.regs().b(), 0x80);
        assert!(!cpu.regs().flag(FLAG_Z));
        assert!(cpu.regs().flag(FLAG_S));
        cpu.run(&mut mem, &mut NullPorts);
        assert_eq!(cpu.regs().b(), 0);
    }

    #[test]
    fn test_cb_shift_memory_operand() {
        // LD HL,0x2000 ; SLA (HL) ; SLL (HL) ; HALT
        let (mut cpu, mut mem) = machine(&[0x21, 0x00, 0x20, 0xCB, 0x26, 0xCB, 0x36, 0x76]);
        mem.write(0x2000, 0x81);
        cpu.run(&mut mem, &mut NullPorts);
        // 0x81 -> 0x02 (carry) -> 0x05
        assert_eq!(mem.read(0x2000), 0x05);
        assert!(!cpu.regs().carry());
    }

    #[test]
    fn test_indexed_load_and_store() {
        // LD IX,0x2000 ; LD (IX-1),0x55 ; LD A,(IX-1) ; LD (IX+5),A ; HALT
        let (cpu, mem, _) = run(&[
            0xDD, 0x21, 0x00, 0x20, 0xDD, 0x36, 0xFF, 0x55, 0xDD, 0x7E, 0xFF, 0xDD, 0x77, 0x05,
            0x76,
        ]);
        assert_eq!(mem.read(0x1FFF), 0x55);
        assert_eq!(mem.read(0x2005), 0x55);
        assert_eq!(cpu.regs().a(), 0x55);
    }

    #[test]
    fn test_index_halves_as_operands() {
        // LD IY,0x1234 ; LD A,IYH ; ADD A,IYL ; LD IYL,A ; HALT
        let (cpu, _, _) = run(&[0xFD, 0x21, 0x34, 0x12, 0xFD, 0x7C, 0xFD, 0x85, 0xFD, 0x6F, 0x76]);
        assert_eq!(cpu.regs().a(), 0x46);
        assert_eq!(cpu.regs().iy(), 0x1246);
    }

    #[test]
    fn test_ld_h_from_indexed_uses_real_h() {
        // LD IX,0x2000 ; LD H,(IX+0) ; HALT
        let (mut cpu, mut mem) = machine(&[0xDD, 0x21, 0x00, 0x20, 0xDD, 0x66, 0x00, 0x76]);
        mem.write(0x2000, 0x99);
        cpu.run(&mut mem, &mut NullPorts);
        assert_eq!(cpu.regs().h(), 0x99);
        assert_eq!(cpu.regs().ix(), 0x2000);
    }

    #[test]
    fn test_ddcb_rotate_copies_to_register() {
        // LD IX,0x2000 ; RLC (IX+2),B ; BIT 0,(IX+2) ; HALT
        let (mut cpu, mut mem) = machine(&[
            0xDD, 0x21, 0x00, 0x20, 0xDD, 0xCB, 0x02, 0x00, 0xDD, 0xCB, 0x02, 0x46, 0x76,
        ]);
        mem.write(0x2002, 0x80);
        cpu.run(&mut mem, &mut NullPorts);
        assert_eq!(mem.read(0x2002), 0x01);
        assert_eq!(cpu.regs().b(), 0x01);
        assert!(!cpu.regs().flag(FLAG_Z));
        assert!(cpu.regs().carry());
    }

    #[test]
    fn test_unknown_index_prefix_falls_through() {
        // DD 3C is INC A with an ignored prefix
        let (cpu, _, _) = run(&[0xDD, 0x3C, 0x76]);
        assert_eq!(cpu.regs().a(), 1);
    }

    #[test]
    fn test_unknown_ed_is_noop() {
        let (cpu, _, _) = run(&[0xED, 0x00, 0x3C, 0x76]);
        assert_eq!(cpu.regs().a(), 1);
    }

    #[test]
    fn test_rld_rrd() {
        // LD HL,0x2000 ; LD A,0x12 ; RLD ; HALT
        let (mut cpu, mut mem) = machine(&[0x21, 0x00, 0x20, 0x3E, 0x12, 0xED, 0x6F, 0x76]);
        mem.write(0x2000, 0x34);
        cpu.run(&mut mem, &mut NullPorts);
        assert_eq!(cpu.regs().a(), 0x13);
        assert_eq!(mem.read(0x2000), 0x42);

        let (mut cpu, mut mem) = machine(&[0x21, 0x00, 0x20, 0x3E, 0x12, 0xED, 0x67, 0x76]);
        mem.write(0x2000, 0x34);
        cpu.run(&mut mem, &mut NullPorts);
        assert_eq!(cpu.regs().a(), 0x14);
        assert_eq!(mem.read(0x2000), 0x23);
    }

    #[test]
    fn test_otir_outputs_each_byte() {
        // LD HL,0x2000 ; LD BC,0x0307 ; OTIR ; HALT
        let (mut cpu, mut mem) = machine(&[0x21, 0x00, 0x20, 0x01, 0x07, 0x03, 0xED, 0xB3, 0x76]);
        mem.load(0x2000, &[9, 8, 7]);
        let mut ports = RecordingPorts::default();
        cpu.run(&mut mem, &mut ports);
        let values: Vec<u8> = ports.outputs.iter().map(|&(_, v, _)| v).collect();
        assert_eq!(values, vec![9, 8, 7]);
        assert!(ports.outputs.iter().all(|&(p, _, _)| p == 0x07));
        assert_eq!(cpu.regs().b(), 0);
        assert_eq!(cpu.regs().hl(), 0x2003);
        assert!(cpu.regs().flag(FLAG_Z));
    }

    #[test]
    fn test_ini_stores_and_counts_down() {
        // LD HL,0x2000 ; LD BC,0x0200 ; INI ; HALT
        let (mut cpu, mut mem) = machine(&[0x21, 0x00, 0x20, 0x01, 0x00, 0x02, 0xED, 0xA2, 0x76]);
        let mut ports = RecordingPorts {
            input_value: 0x80,
            ..Default::default()
        };
        cpu.run(&mut mem, &mut ports);
        assert_eq!(mem.read(0x2000), 0x80);
        assert_eq!(cpu.regs().b(), 1);
        assert_eq!(cpu.regs().hl(), 0x2001);
        assert!(cpu.regs().flag(FLAG_N));
        assert!(!cpu.regs().flag(FLAG_Z));
    }

    #[test]
    fn test_ld_a_i_reflects_iff2() {
        // EI ; LD A,0x80 ; LD I,A ; XOR A ; LD A,I ; HALT
        let (cpu, _, _) = run(&[0xFB, 0x3E, 0x80, 0xED, 0x47, 0xAF, 0xED, 0x57, 0x76]);
        assert_eq!(cpu.regs().a(), 0x80);
        assert!(cpu.regs().flag(FLAG_PV));
        assert!(cpu.regs().flag(FLAG_S));
    }

    #[test]
    fn test_refresh_register_advances() {
        let (cpu, _, _) = run(&[0x00, 0x00, 0x76]);
        assert_eq!(cpu.regs().r(), 3);
    }

    #[test]
    fn test_rst_pushes_return() {
        let (mut cpu, mut mem) = machine(&[0xEF]);
        mem.write(0x0028, 0x76);
        cpu.run(&mut mem, &mut NullPorts);
        assert_eq!(cpu.regs().pc(), 0x0028);
        assert_eq!(mem.read16(cpu.regs().sp()), 0x0101);
    }

    #[test]
    fn test_daa_after_add() {
        // LD A,0x15 ; ADD A,0x27 ; DAA ; HALT
        let (cpu, _, _) = run(&[0x3E, 0x15, 0xC6, 0x27, 0x27, 0x76]);
        assert_eq!(cpu.regs().a(), 0x42);
    }

    #[test]
    fn test_observer_break_stops_before_instruction() {
        let (mut cpu, mut mem) = machine(&[0x3C, 0x3C, 0x3C, 0x76]);
        cpu.set_observer(Box::new(Breakpoints::new([0x0102])));
        assert_eq!(cpu.run(&mut mem, &mut NullPorts), RunState::Break);
        assert_eq!(cpu.regs().pc(), 0x0102);
        assert_eq!(cpu.regs().a(), 2);

        cpu.regs_mut().set_state(RunState::Running);
        assert_eq!(cpu.run(&mut mem, &mut NullPorts), RunState::Halted);
        assert_eq!(cpu.regs().a(), 3);
    }
}
