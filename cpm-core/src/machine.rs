//! CP/M machine: the Z80 engine, guest memory and the BIOS/BDOS traps
//! wired together, plus the boot loop that keeps the command interpreter
//! running.

use crate::bdos::{Fcb, FCB_SIZE};
use crate::config::{HaltPolicy, MachineConfig, EMULATOR_VERSION};
use crate::console::CpmConsole;
use crate::cpu::{Cpu, Ports, Registers, RunState, StepObserver};
use crate::disk::Disk;
use crate::error::{CpmError, CpmResult};
use crate::host::HostServices;
use crate::layout::{addr, MemoryLayout};
use crate::memory::Memory;

/// Longest command tail that leaves room for the 0 terminator before 0x0100.
const MAX_TAIL: usize = 126;

/// Product name shown in the banner.
pub const PRODUCT: &str = "Z80CPM";

/// Everything the BIOS and BDOS handlers touch besides the CPU and memory.
///
/// The engine sees this through [`Ports`]: any `IN` runs the BDOS, any
/// `OUT` runs the BIOS.
pub struct Traps<C: CpmConsole, H: HostServices> {
    pub(crate) console: C,
    pub(crate) host: H,
    pub(crate) disk: Disk,
    pub(crate) config: MachineConfig,
    pub(crate) layout: MemoryLayout,
}

impl<C: CpmConsole, H: HostServices> Traps<C, H> {
    fn new(console: C, host: H, config: MachineConfig) -> Self {
        let layout = MemoryLayout::new(config.ram_kib, config.ccp);
        let disk = Disk::new(&config, &layout);
        Self {
            console,
            host,
            disk,
            config,
            layout,
        }
    }

    /// Guest console output, 7-bit.
    pub(crate) fn put_con(&mut self, ch: u8) {
        self.console.write(ch & 0x7F);
    }

    pub(crate) fn puts(&mut self, s: &str) {
        for b in s.bytes() {
            self.put_con(b);
        }
    }

    pub(crate) fn put_hex8(&mut self, value: u8) {
        self.puts(&format!("{value:02X}"));
    }

    /// Report a call with no handler. Only visible on the console in
    /// debug mode.
    pub(crate) fn unimplemented(&mut self, kind: &str, code: u8) {
        tracing::warn!(code, "unimplemented {} call", kind);
        if self.config.debug {
            self.puts("\r\nUnimplemented ");
            self.puts(kind);
            self.puts(" call.\r\nC = 0x");
            self.put_hex8(code);
            self.puts("\r\n");
        }
    }
}

impl<C: CpmConsole, H: HostServices> Ports for Traps<C, H> {
    fn input(&mut self, _port: u8, regs: &mut Registers, mem: &mut Memory) -> u8 {
        self.bdos(regs, mem)
    }

    fn output(&mut self, _port: u8, _value: u8, regs: &mut Registers, mem: &mut Memory) {
        self.bios(regs, mem);
    }
}

/// A complete CP/M 2.2 machine.
pub struct Machine<C: CpmConsole, H: HostServices> {
    cpu: Cpu,
    mem: Memory,
    traps: Traps<C, H>,
    last_stop: Option<RunState>,
}

impl<C: CpmConsole, H: HostServices> Machine<C, H> {
    /// Create a machine. The configuration is validated first.
    pub fn new(console: C, host: H, config: MachineConfig) -> CpmResult<Self> {
        config.validate()?;
        tracing::debug!(
            ram_kib = config.ram_kib,
            ccp = %config.ccp,
            user_areas = config.user_areas,
            "machine created"
        );
        Ok(Self {
            cpu: Cpu::new(),
            mem: Memory::new(),
            traps: Traps::new(console, host, config),
            last_stop: None,
        })
    }

    pub fn config(&self) -> &MachineConfig {
        &self.traps.config
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.traps.layout
    }

    pub fn console(&self) -> &C {
        &self.traps.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.traps.console
    }

    pub fn host(&self) -> &H {
        &self.traps.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.traps.host
    }

    pub fn disk(&self) -> &Disk {
        &self.traps.disk
    }

    pub fn memory(&self) -> &Memory {
        &self.mem
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.mem
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Attach a step observer (tracer, breakpoints) to the engine.
    pub fn set_observer(&mut self, observer: Box<dyn StepObserver + Send>) {
        self.cpu.set_observer(observer);
    }

    /// Print the start-up banner.
    pub fn banner(&mut self) {
        let config = &self.traps.config;
        let text = format!(
            "CP/M 2.2 Emulator v{EMULATOR_VERSION}\r\n\
             CCP: {}  CCP Address: 0x{:04X}\r\n\
             \r\n{PRODUCT} Version {EMULATOR_VERSION} (CP/M 2.2 {}K)\r\n",
            config.ccp_image_name(),
            self.traps.layout.ccp,
            config.ram_kib,
        );
        self.traps.puts(&text);
    }

    /// Print the banner, then run the command interpreter until BIOS 0.
    pub fn boot(&mut self) -> CpmResult<()> {
        self.banner();
        self.run_ccp()
    }

    /// The boot loop: load the command interpreter, run it, reload it on
    /// warm boot. Returns on BIOS 0 or an observer break.
    pub fn run_ccp(&mut self) -> CpmResult<()> {
        loop {
            let image_name = self.traps.config.ccp_image_name();
            let image = match self.traps.host.load_image(&image_name) {
                Ok(image) => image,
                Err(e) => {
                    tracing::error!(image = %image_name, "CCP load failed: {}", e);
                    self.traps.puts("Unable to find CCP. CPU halted.\r\n");
                    return Err(CpmError::CcpNotFound(image_name));
                }
            };

            let layout = self.traps.layout;
            let keep_drive_user = matches!(
                self.last_stop,
                Some(RunState::WarmBoot | RunState::ReturnToCaller)
            );
            self.mem.load(layout.ccp, &image);
            layout.patch(&mut self.mem, keep_drive_user);

            self.cpu.reset();
            let drive_user = self.mem.read(addr::DRIVE_USER);
            self.traps.disk.restore_drive(drive_user);
            let regs = self.cpu.regs_mut();
            regs.set_c(drive_user);
            regs.set_pc(layout.ccp);
            tracing::debug!(ccp = layout.ccp, drive_user, "starting command interpreter");

            let state = self.cpu.run(&mut self.mem, &mut self.traps);
            self.last_stop = Some(state);
            tracing::debug!(?state, pc = self.cpu.regs().pc(), "engine stopped");

            match state {
                RunState::Shutdown => {
                    self.traps.puts("BIOS 0 call, exiting.\r\n");
                    return Ok(());
                }
                RunState::WarmBoot | RunState::ReturnToCaller => {}
                RunState::Halted => {
                    let pc = self.cpu.regs().pc();
                    match self.traps.config.halt_policy {
                        HaltPolicy::Reboot => {
                            if self.traps.config.debug {
                                self.traps.puts("\r\n::CPU HALTED::\r\n");
                            }
                            tracing::info!(pc, "CPU halted, rebooting");
                        }
                        HaltPolicy::Exit => return Err(CpmError::Halted { pc }),
                    }
                }
                RunState::Break => return Ok(()),
                RunState::Running => {}
            }
        }
    }

    /// Run a transient program without a command interpreter.
    ///
    /// The image is loaded at 0x0100 with `args` as its command tail and
    /// default FCBs. A final `RET` lands on the warm-boot vector. Returns
    /// the state the engine stopped in.
    pub fn run_program(&mut self, image: &[u8], args: &[&str]) -> RunState {
        let layout = self.traps.layout;
        layout.patch(&mut self.mem, false);
        self.mem.load(addr::TPA, image);
        self.set_command_tail(args);

        self.cpu.reset();
        self.traps.disk.restore_drive(self.mem.read(addr::DRIVE_USER));
        let sp = layout.bdos_jump_page.wrapping_sub(2);
        self.mem.write16(sp, 0x0000);
        let regs = self.cpu.regs_mut();
        regs.set_sp(sp);
        regs.set_pc(addr::TPA);

        let state = self.cpu.run(&mut self.mem, &mut self.traps);
        self.last_stop = Some(state);
        tracing::debug!(?state, "program stopped");
        state
    }

    /// Continue after an observer break.
    pub fn resume(&mut self) -> RunState {
        self.cpu.regs_mut().set_state(RunState::Running);
        let state = self.cpu.run(&mut self.mem, &mut self.traps);
        self.last_stop = Some(state);
        state
    }

    /// Command tail at 0x0080 (length byte, leading space, upper case) and
    /// the two default FCBs.
    fn set_command_tail(&mut self, args: &[&str]) {
        let tail = if args.is_empty() {
            String::new()
        } else {
            format!(" {}", args.join(" ")).to_ascii_uppercase()
        };
        // Length byte, text and terminator all stay below the TPA.
        let bytes = &tail.as_bytes()[..tail.len().min(MAX_TAIL)];
        self.mem.write(addr::CMDLINE, bytes.len() as u8);
        self.mem.load(addr::CMDLINE + 1, bytes);
        self.mem.write(addr::CMDLINE + 1 + bytes.len() as u16, 0);

        // The two FCBs overlap, so only the first 16 bytes of each are set.
        for (i, fcb_addr) in [addr::FCB1, addr::FCB2].into_iter().enumerate() {
            let mut raw = [0u8; FCB_SIZE];
            let mut fcb = Fcb::new(&mut raw);
            match args.get(i) {
                Some(arg) => fcb.parse_filename(arg),
                None => fcb.blank(),
            }
            self.mem.load(fcb_addr, &raw[..16]);
        }
    }
}
