//! Z80 CP/M 2.2 Machine Core
//!
//! This crate provides the core components for running CP/M 2.2 programs:
//! - A Z80 instruction engine over a flat 64 KiB memory
//! - BIOS and BDOS trap handlers reached through `OUT`/`IN` stubs
//! - An FCB-driven disk layer backed by host files
//! - Console I/O abstraction
//!
//! # Architecture
//!
//! The machine uses a layered design:
//! - `Cpu` + `Ports`: the engine and its trap boundary
//! - `Traps`: BIOS/BDOS dispatch, the only `Ports` implementation in use
//! - `Disk`: FCB semantics, drive selection, R/O and login vectors
//! - `HostServices` trait: host files keyed by drive, user and 8.3 name
//! - `CpmConsole` trait: character I/O abstraction
//! - `Machine`: wires them together and runs the boot loop

pub mod bdos;
pub mod bios;
pub mod config;
pub mod console;
pub mod cpu;
pub mod disk;
pub mod error;
pub mod host;
pub mod layout;
pub mod machine;
pub mod memory;

pub use config::{CcpVariant, HaltPolicy, MachineConfig};
pub use console::{CpmConsole, HeadlessConsole};
pub use cpu::{Breakpoints, Cpu, Ports, Registers, RunState, StepControl, StepObserver, Tracer};
pub use error::{CpmError, CpmResult};
pub use host::{to_8_3, DirHost, HostPath, HostServices, MemoryHost};
pub use layout::MemoryLayout;
pub use machine::Machine;
pub use memory::Memory;
