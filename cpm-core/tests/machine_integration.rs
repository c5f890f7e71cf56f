//! Integration tests: guest programs and command interpreters running on a
//! full machine.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use z80cpm_core::{
    Breakpoints, CpmError, DirHost, HaltPolicy, HeadlessConsole, HostPath, Machine,
    MachineConfig, MemoryHost, RunState,
};

const BDOS: [u8; 3] = [0xCD, 0x05, 0x00]; // CALL 0005

fn machine(host: MemoryHost) -> Machine<HeadlessConsole, MemoryHost> {
    Machine::new(HeadlessConsole::new(), host, MachineConfig::default()).unwrap()
}

/// `LD DE,de / LD C,func / CALL 5`
fn bdos_call(func: u8, de: u16) -> Vec<u8> {
    let [lo, hi] = de.to_le_bytes();
    let mut code = vec![0x11, lo, hi, 0x0E, func];
    code.extend_from_slice(&BDOS);
    code
}

#[test]
fn test_bios_conout_through_jump_table() {
    let mut m = machine(MemoryHost::with_drives([0]));
    let program = [
        0x0E, b'H', // LD C,'H'
        0xCD, 0x0C, 0xFE, // CALL CONOUT
        0x0E, b'i', // LD C,'i'
        0xCD, 0x0C, 0xFE, // CALL CONOUT
        0xC9, // RET
    ];
    assert_eq!(m.run_program(&program, &[]), RunState::WarmBoot);
    assert_eq!(m.console().output_string(), "Hi");
}

#[test]
fn test_out_selector_comes_from_instruction_address() {
    let mut m = machine(MemoryHost::with_drives([0]));
    let mut program = vec![
        0x0E, b'!', // LD C,'!'
        0xC3, 0x0C, 0x01, // JP 010C
    ];
    program.resize(0x0C, 0x00);
    program.extend_from_slice(&[0xD3, 0x00, 0xC9]); // OUT (0),A / RET
    assert_eq!(m.run_program(&program, &[]), RunState::WarmBoot);
    assert_eq!(m.console().output_string(), "!");
}

#[test]
fn test_conout_then_halt_prints_one_byte() {
    let mut m = machine(MemoryHost::with_drives([0]));
    let mut program = vec![
        0x3E, 0x41, // LD A,41
        0x4F, // LD C,A
        0xC3, 0x0C, 0x01, // JP 010C
    ];
    program.resize(0x0C, 0x00);
    program.extend_from_slice(&[0xD3, 0x00, 0x76]); // OUT (0),A / HALT
    assert_eq!(m.run_program(&program, &[]), RunState::Halted);
    assert_eq!(m.console().output(), &[0x41]);
    assert_eq!(m.cpu().regs().pc(), 0x010E);
}

#[test]
fn test_full_command_tail_leaves_program_intact() {
    let mut m = machine(MemoryHost::with_drives([0]));
    let program = [
        0x0E, b'X', // LD C,'X'
        0xCD, 0x0C, 0xFE, // CALL CONOUT
        0xC9, // RET
    ];
    let arg = "A".repeat(126);
    assert_eq!(m.run_program(&program, &[arg.as_str()]), RunState::WarmBoot);
    assert_eq!(m.console().output_string(), "X");
    assert_eq!(m.memory().read(0x0080), 126);
    assert_eq!(m.memory().read(0x00FF), 0);
}

#[test]
fn test_print_string_and_version_through_bdos() {
    let mut m = machine(MemoryHost::with_drives([0]));
    let mut program = bdos_call(9, 0x0200);
    program.extend(bdos_call(12, 0));
    program.extend_from_slice(&[0x32, 0x00, 0x03]); // LD (0300),A
    program.push(0xC9);
    program.resize(0x100, 0x00);
    program.extend_from_slice(b"Hello, CP/M$");

    assert_eq!(m.run_program(&program, &[]), RunState::WarmBoot);
    assert_eq!(m.console().output_string(), "Hello, CP/M");
    assert_eq!(m.memory().read(0x0300), 0x22);
}

#[test]
fn test_file_round_trip_from_guest() {
    let mut m = machine(MemoryHost::with_drives([0]));
    let mut program = Vec::new();
    program.extend(bdos_call(22, 0x005C)); // make
    program.extend(bdos_call(26, 0x0200)); // DMA = data
    program.extend(bdos_call(21, 0x005C)); // write
    program.extend(bdos_call(16, 0x005C)); // close
    program.extend(bdos_call(15, 0x005C)); // open
    program.extend_from_slice(&[0xAF, 0x32, 0x7C, 0x00]); // XOR A / LD (007C),A
    program.extend(bdos_call(26, 0x0300)); // DMA = scratch
    program.extend(bdos_call(20, 0x005C)); // read
    program.extend(bdos_call(9, 0x0300)); // print
    program.push(0xC9);
    program.resize(0x100, 0x00);
    program.extend_from_slice(b"round trip$");

    assert_eq!(m.run_program(&program, &["test.txt"]), RunState::WarmBoot);
    assert_eq!(m.console().output_string(), "round trip");

    let stored = m
        .host()
        .file(&HostPath::new(0, Some(0), "TEST.TXT"))
        .unwrap()
        .to_vec();
    assert_eq!(stored.len(), 128);
    assert_eq!(&stored[..11], b"round trip$");
}

#[test]
fn test_select_error_returns_to_caller() {
    let mut m = machine(MemoryHost::with_drives([0, 1]));
    let mut program = bdos_call(14, 0x0001); // select B:
    program.extend(bdos_call(15, 0x005C)); // open E:FOO.TXT
    program.push(0x76); // HALT, not reached

    assert_eq!(m.run_program(&program, &["e:foo.txt"]), RunState::ReturnToCaller);
    assert_eq!(
        m.console().output_string(),
        "\r\nBDOS Error on E : Select\r\n"
    );
    assert_eq!(m.disk().current_drive, 1);
    assert_eq!(m.memory().read(0x0004) & 0x0F, 1);
}

#[test]
fn test_boot_runs_ccp_until_bios_0() {
    let mut host = MemoryHost::with_drives([0]);
    let mut ccp = vec![0x0E, 0x02, 0x1E, b'A']; // LD C,2 / LD E,'A'
    ccp.extend_from_slice(&BDOS);
    ccp.extend_from_slice(&[0xC3, 0x00, 0xFE]); // JP BOOT
    host.add_image("CCP-DR.64K", ccp);

    let mut m = machine(host);
    m.boot().unwrap();
    let out = m.console().output_string();
    assert!(out.starts_with("CP/M 2.2 Emulator v2.9\r\n"));
    assert!(out.ends_with("(CP/M 2.2 64K)\r\nABIOS 0 call, exiting.\r\n"));
}

#[test]
fn test_warm_boot_reloads_and_keeps_drive_user() {
    let mut host = MemoryHost::with_drives([0, 1]);
    let ccp = vec![
        0x79, // LD A,C
        0x32, 0x01, 0x80, // LD (8001),A
        0x3A, 0x00, 0x80, // LD A,(8000)
        0x3C, // INC A
        0x32, 0x00, 0x80, // LD (8000),A
        0xFE, 0x03, // CP 3
        0xCA, 0x00, 0xFE, // JP Z,BOOT
        0x3E, 0x21, // LD A,21
        0x32, 0x04, 0x00, // LD (0004),A
        0xC3, 0x00, 0x00, // JP 0000
    ];
    host.add_image("CCP-DR.64K", ccp);

    let mut m = machine(host);
    m.run_ccp().unwrap();
    assert_eq!(m.memory().read(0x8000), 3);
    assert_eq!(m.memory().read(0x8001), 0x21);
    assert_eq!(m.disk().current_drive, 1);
}

#[test]
fn test_missing_ccp_is_fatal() {
    let mut m = machine(MemoryHost::with_drives([0]));
    let err = m.run_ccp().unwrap_err();
    assert!(matches!(err, CpmError::CcpNotFound(ref name) if name == "CCP-DR.64K"));
    assert_eq!(
        m.console().output_string(),
        "Unable to find CCP. CPU halted.\r\n"
    );
}

#[test]
fn test_halt_policy_exit() {
    let mut host = MemoryHost::with_drives([0]);
    host.add_image("CCP-DR.64K", vec![0x00, 0x76]); // NOP / HALT
    let config = MachineConfig {
        halt_policy: HaltPolicy::Exit,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(HeadlessConsole::new(), host, config).unwrap();
    assert!(matches!(m.run_ccp(), Err(CpmError::Halted { pc: 0xF401 })));
}

#[test]
fn test_halt_policy_reboot() {
    let mut host = MemoryHost::with_drives([0]);
    let ccp = vec![
        0x3A, 0x00, 0x80, // LD A,(8000)
        0x3C, // INC A
        0x32, 0x00, 0x80, // LD (8000),A
        0xFE, 0x02, // CP 2
        0xCA, 0x00, 0xFE, // JP Z,BOOT
        0x76, // HALT
    ];
    host.add_image("CCP-DR.64K", ccp);
    let config = MachineConfig {
        debug: true,
        ..MachineConfig::default()
    };
    let mut m = Machine::new(HeadlessConsole::new(), host, config).unwrap();
    m.run_ccp().unwrap();
    assert_eq!(m.memory().read(0x8000), 2);
    assert_eq!(
        m.console().output_string(),
        "\r\n::CPU HALTED::\r\nBIOS 0 call, exiting.\r\n"
    );
}

#[test]
fn test_breakpoint_stops_boot_and_resume_continues() {
    let mut host = MemoryHost::with_drives([0]);
    let mut ccp = vec![0x0E, 0x02, 0x1E, b'B']; // LD C,2 / LD E,'B'
    ccp.extend_from_slice(&BDOS);
    ccp.extend_from_slice(&[0xC3, 0x00, 0xFE]);
    host.add_image("CCP-DR.64K", ccp);

    let mut m = machine(host);
    m.set_observer(Box::new(Breakpoints::new([0xF404])));
    m.run_ccp().unwrap();
    assert_eq!(m.cpu().regs().pc(), 0xF404);
    assert!(m.console().output().is_empty());

    assert_eq!(m.resume(), RunState::Shutdown);
    assert_eq!(m.console().output_string(), "B");
}

static SCRATCH_ID: AtomicUsize = AtomicUsize::new(0);

/// Unique directory under the system temp dir, removed on drop.
struct Scratch(PathBuf);

impl Scratch {
    fn new() -> Self {
        let id = SCRATCH_ID.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "z80cpm-machine-{}-{}",
            std::process::id(),
            id
        ));
        std::fs::create_dir_all(dir.join("A").join("0")).unwrap();
        Self(dir)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

#[test]
fn test_boot_from_host_directory() {
    let scratch = Scratch::new();
    let mut ccp = bdos_call(22, 0x005C); // make from FCB1
    ccp.extend(bdos_call(21, 0x005C)); // write one record from 0x0080
    ccp.extend(bdos_call(16, 0x005C));
    ccp.extend_from_slice(&[0xC3, 0x00, 0xFE]);
    std::fs::write(scratch.0.join("CCP-DR.64K"), &ccp).unwrap();

    let host = DirHost::new(&scratch.0);
    let mut m = Machine::new(HeadlessConsole::new(), host, MachineConfig::default()).unwrap();
    m.memory_mut().load(0x005C, b"\x00OUT     TXT\x00\x00\x00\x00");
    m.memory_mut().load(0x0080, b"written by the guest");
    m.boot().unwrap();

    let written = std::fs::read(scratch.0.join("A").join("0").join("OUT.TXT")).unwrap();
    assert_eq!(written.len(), 128);
    assert!(written.starts_with(b"written by the guest"));
}
