//! FCB file operations over host services.
//!
//! Every operation reads the FCB out of guest memory, works on the copy
//! and stores it back. The returned byte is the guest status. A
//! [`DiskError`] is the "BDOS Error on X:" path: the BDOS prints it,
//! rolls the drive back and returns to the command interpreter.

use std::fmt;

use crate::bdos::fcb::{self, Fcb, FcbPattern, RECORD_SIZE};
use crate::config::MachineConfig;
use crate::error::CpmError;
use crate::host::{drive_letter, HostPath, HostServices, MAX_DRIVES};
use crate::layout::{addr, MemoryLayout};
use crate::memory::Memory;

/// Status byte: success.
pub const OK: u8 = 0x00;
/// Status byte: generic failure.
pub const FAILED: u8 = 0xFF;
/// End of file on read.
pub const END_OF_DATA: u8 = 0x01;
/// Random record outside the file.
pub const BAD_RECORD: u8 = 0x06;
/// Host file could not be opened.
pub const NO_FILE: u8 = 0x10;
/// Sequential I/O ran past the last extent.
pub const EXTENT_RANGE: u8 = 0xFE;

/// Fatal-to-program disk conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskFault {
    ReadOnly,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskError {
    pub fault: DiskFault,
    pub drive: u8,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.fault {
            DiskFault::ReadOnly => "R/O",
            DiskFault::Select => "Select",
        };
        write!(f, "BDOS Error on {} : {}", drive_letter(self.drive), what)
    }
}

pub type DiskResult = Result<u8, DiskError>;

/// Position of an active search-first/search-next scan.
#[derive(Debug, Clone)]
struct SearchCursor {
    drive: u8,
    pattern: FcbPattern,
    names: Vec<String>,
    pos: usize,
}

/// Drive selection, user code, DMA address and the search cursor.
#[derive(Debug, Clone)]
pub struct Disk {
    pub current_drive: u8,
    previous_drive: u8,
    pub user: u8,
    pub ro_vector: u16,
    pub login_vector: u16,
    pub dma: u16,
    search: Option<SearchCursor>,
    user_areas: bool,
    batch_on_drive_a: bool,
    batch_on_user_0: bool,
    tmp_fcb: u16,
    batch_fcb: u16,
}

impl Disk {
    pub fn new(config: &MachineConfig, layout: &MemoryLayout) -> Self {
        Self {
            current_drive: 0,
            previous_drive: 0,
            user: 0,
            ro_vector: 0,
            login_vector: 0,
            dma: addr::DEFAULT_DMA,
            search: None,
            user_areas: config.user_areas,
            batch_on_drive_a: config.batch_on_drive_a,
            batch_on_user_0: config.batch_on_user_0,
            tmp_fcb: layout.tmp_fcb,
            batch_fcb: layout.batch_fcb,
        }
    }

    /// Reset disk system: all drives R/W and logged out, DMA back to
    /// 0x0080, drive A: current. The user code is kept.
    pub fn reset(&mut self) {
        self.ro_vector = 0;
        self.login_vector = 0;
        self.dma = addr::DEFAULT_DMA;
        self.current_drive = 0;
        self.previous_drive = 0;
        self.search = None;
    }

    /// Drive selection from the page-zero byte left by a warm boot.
    pub fn restore_drive(&mut self, drive_user: u8) {
        self.current_drive = drive_user & 0x0F;
        self.previous_drive = self.current_drive;
    }

    /// Undo a failed selection: the last good drive becomes current again,
    /// also in the page-zero drive/user byte.
    pub fn rollback(&mut self, mem: &mut Memory) {
        self.current_drive = self.previous_drive;
        let du = mem.read(addr::DRIVE_USER);
        mem.write(addr::DRIVE_USER, (du & 0xF0) | self.previous_drive);
    }

    /// Mark the current drive read-only.
    pub fn write_protect_current(&mut self) {
        self.ro_vector |= 1 << (self.current_drive & 0x0F);
    }

    /// Select disk `drive` (0-based) as current.
    pub fn select_disk<H: HostServices>(&mut self, host: &H, drive: u8) -> DiskResult {
        self.previous_drive = self.current_drive;
        self.current_drive = drive;
        self.select(host, drive.wrapping_add(1))?;
        self.previous_drive = self.current_drive;
        Ok(OK)
    }

    /// Set the user code and make sure its folder exists.
    pub fn set_user<H: HostServices>(&mut self, host: &mut H, user: u8) {
        self.user = user & 0x1F;
        if self.user_areas {
            host.make_user_dir(self.current_drive, self.user);
        }
    }

    /// Drive named by an FCB drive byte: 0 (or `?`) is the current drive.
    fn resolve(&self, dr: u8) -> u8 {
        match dr {
            0 | b'?' => self.current_drive,
            n => n - 1,
        }
    }

    /// Log in the drive named by `dr`.
    fn select<H: HostServices>(&mut self, host: &H, dr: u8) -> Result<u8, DiskError> {
        let drive = self.resolve(dr);
        if drive < MAX_DRIVES && host.drive_exists(drive) {
            self.login_vector |= 1 << drive;
            Ok(drive)
        } else {
            tracing::debug!(drive, "drive select failed");
            Err(DiskError {
                fault: DiskFault::Select,
                drive,
            })
        }
    }

    /// Refuse writes to a read-only drive. Checked before any host call.
    fn writable(&self, dr: u8) -> Result<(), DiskError> {
        let drive = self.resolve(dr);
        if drive < MAX_DRIVES && self.ro_vector & (1 << drive) != 0 {
            tracing::debug!(drive, "write to read-only drive refused");
            return Err(DiskError {
                fault: DiskFault::ReadOnly,
                drive,
            });
        }
        Ok(())
    }

    fn user_folder(&self) -> Option<u8> {
        self.user_areas.then_some(self.user)
    }

    fn host_path(&self, drive: u8, fcb: &Fcb<'_>) -> HostPath {
        HostPath::new(drive, self.user_folder(), fcb.host_name())
    }

    /// Open: the file must exist. RC gets the file length in records.
    pub fn open<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        let drive = self.select(host, fcb.drive())?;
        let path = self.host_path(drive, &fcb);
        match host.file_size(&path) {
            Ok(len) => {
                fcb.set_rc_from_records(records(len));
                fcb.clear_al();
                fcb::store(mem, fcb_addr, &raw);
                Ok(OK)
            }
            Err(e) => {
                tracing::debug!("open {}: {}", path, e);
                Ok(FAILED)
            }
        }
    }

    /// Close. Closing the batch FCB cuts `$$$.SUB` down to RC records.
    pub fn close<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let fcb = Fcb::new(&mut raw);
        if fcb_addr == self.batch_fcb {
            self.writable(fcb.drive())?;
        }
        let drive = self.select(host, fcb.drive())?;
        if fcb_addr == self.batch_fcb {
            let path = self.host_path(drive, &fcb);
            let len = u64::from(fcb.rc()) * RECORD_SIZE as u64;
            if let Err(e) = host.truncate(&path, len) {
                tracing::debug!("truncate {}: {}", path, e);
            }
        }
        Ok(OK)
    }

    /// Make: create the file if absent and rewind the FCB.
    pub fn make<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        self.writable(fcb.drive())?;
        let drive = self.select(host, fcb.drive())?;
        let path = self.host_path(drive, &fcb);
        match host.create(&path) {
            Ok(()) => {
                fcb.reset_position();
                fcb::store(mem, fcb_addr, &raw);
                Ok(OK)
            }
            Err(e) => {
                tracing::debug!("make {}: {}", path, e);
                Ok(FAILED)
            }
        }
    }

    /// Search first. With `dir_entry` a directory entry for the match is
    /// written at the DMA address.
    pub fn search_first<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
        dir_entry: bool,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let fcb = Fcb::new(&mut raw);
        let drive = self.select(host, fcb.drive())?;
        let names = host.list(drive, self.user_folder()).unwrap_or_else(|e| {
            tracing::debug!(drive, "list failed: {}", e);
            Vec::new()
        });
        self.search = Some(SearchCursor {
            drive,
            pattern: fcb.pattern(),
            names,
            pos: 0,
        });
        Ok(self.next_match(mem, dir_entry))
    }

    /// Search next, continuing the last search-first scan.
    pub fn search_next<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        dir_entry: bool,
    ) -> DiskResult {
        self.select(host, 0)?;
        Ok(self.next_match(mem, dir_entry))
    }

    fn next_match(&mut self, mem: &mut Memory, dir_entry: bool) -> u8 {
        let Some(cursor) = self.search.as_mut() else {
            return FAILED;
        };
        while cursor.pos < cursor.names.len() {
            let name = &cursor.names[cursor.pos];
            cursor.pos += 1;
            if !fcb::matches(&fcb::host_name_pattern(name), &cursor.pattern) {
                continue;
            }

            if dir_entry {
                let mut entry = [0u8; 32];
                entry[1..12].copy_from_slice(&fcb::host_name_pattern(name));
                mem.load(self.dma, &entry);
            }

            let mut tmp = fcb::load(mem, self.tmp_fcb);
            let mut found = Fcb::new(&mut tmp);
            found.set_drive(cursor.drive + 1);
            found.set_host_name(name);
            fcb::store(mem, self.tmp_fcb, &tmp);
            return OK;
        }
        FAILED
    }

    /// Delete every file matching the FCB name. Fails only if none matched.
    pub fn delete<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let fcb = Fcb::new(&mut raw);
        self.writable(fcb.drive())?;
        let drive = self.select(host, fcb.drive())?;
        let pattern = fcb.pattern();
        let user = self.user_folder();
        let names = host.list(drive, user).unwrap_or_default();

        let mut deleted = false;
        for name in names
            .iter()
            .filter(|name| fcb::matches(&fcb::host_name_pattern(name), &pattern))
        {
            let path = HostPath::new(drive, user, name.as_str());
            match host.delete(&path) {
                Ok(()) => deleted = true,
                Err(e) => tracing::debug!("delete {}: {}", path, e),
            }
        }
        Ok(if deleted { OK } else { FAILED })
    }

    /// Rename to the name held in the second half of the FCB.
    pub fn rename<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let dr = raw[0];
        self.writable(dr)?;
        let drive = self.select(host, dr)?;

        raw[16] = dr;
        let from = self.host_path(drive, &Fcb::new(&mut raw));
        let mut new_half = [0u8; fcb::FCB_SIZE];
        new_half[..16].copy_from_slice(&raw[16..32]);
        let to = from.with_name(Fcb::new(&mut new_half).host_name());
        fcb::store(mem, fcb_addr, &raw);

        match host.rename(&from, &to) {
            Ok(()) => Ok(OK),
            Err(e) => {
                tracing::debug!("rename {} to {}: {}", from, to, e);
                Ok(FAILED)
            }
        }
    }

    pub fn read_sequential<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        let drive = self.select(host, fcb.drive())?;
        let path = self.host_path(drive, &fcb);
        let mut status = self.read_record(mem, host, &path, fcb.sequential_offset(), END_OF_DATA);
        if status == OK {
            if !fcb.advance_sequential() {
                status = EXTENT_RANGE;
            }
            fcb::store(mem, fcb_addr, &raw);
        }
        Ok(status)
    }

    pub fn write_sequential<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        self.writable(fcb.drive())?;
        let drive = self.select(host, fcb.drive())?;
        let path = self.host_path(drive, &fcb);
        let mut status = self.write_record(mem, host, &path, fcb.sequential_offset());
        if status == OK {
            if !fcb.advance_sequential() {
                status = EXTENT_RANGE;
            }
            fcb::store(mem, fcb_addr, &raw);
        }
        Ok(status)
    }

    pub fn read_random<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        let record = fcb.random_record();
        let drive = self.select(host, fcb.drive())?;
        let path = self.host_path(drive, &fcb);
        let status = self.read_record(mem, host, &path, record_offset(record), BAD_RECORD);
        if status == OK {
            fcb.set_current_record(record);
            fcb::store(mem, fcb_addr, &raw);
        }
        Ok(status)
    }

    pub fn write_random<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        let record = fcb.random_record();
        self.writable(fcb.drive())?;
        let drive = self.select(host, fcb.drive())?;
        let path = self.host_path(drive, &fcb);
        let status = self.write_record(mem, host, &path, record_offset(record));
        if status == OK {
            fcb.set_current_record(record);
            fcb::store(mem, fcb_addr, &raw);
        }
        Ok(status)
    }

    /// Compute file size: R0-R2 get the length in records.
    pub fn file_size<H: HostServices>(
        &mut self,
        mem: &mut Memory,
        host: &mut H,
        fcb_addr: u16,
    ) -> DiskResult {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        let drive = self.select(host, fcb.drive())?;
        let path = self.host_path(drive, &fcb);
        match host.file_size(&path) {
            Ok(len) => {
                fcb.set_random_record(records(len) as u32);
                fcb::store(mem, fcb_addr, &raw);
                Ok(OK)
            }
            Err(e) => {
                tracing::debug!("size of {}: {}", path, e);
                Ok(FAILED)
            }
        }
    }

    /// Set random record from the sequential cursor.
    pub fn set_random(&mut self, mem: &mut Memory, fcb_addr: u16) -> u8 {
        let mut raw = fcb::load(mem, fcb_addr);
        let mut fcb = Fcb::new(&mut raw);
        let record = fcb.current_record();
        fcb.set_random_record(record);
        fcb::store(mem, fcb_addr, &raw);
        OK
    }

    /// 0xFF when a `$???????.???` batch file is waiting, else 0.
    pub fn check_batch<H: HostServices>(&mut self, mem: &mut Memory, host: &mut H) -> DiskResult {
        let saved_user = self.user;
        let mut tmp = fcb::load(mem, self.tmp_fcb);
        let mut probe = Fcb::new(&mut tmp);
        probe.set_drive(if self.batch_on_drive_a { 1 } else { 0 });
        probe.set_host_name("$???????.???");
        fcb::store(mem, self.tmp_fcb, &tmp);
        if self.batch_on_user_0 {
            self.user = 0;
        }
        let found = self.search_first(mem, host, self.tmp_fcb, false);
        self.user = saved_user;
        Ok(if found? == OK { FAILED } else { OK })
    }

    fn read_record<H: HostServices>(
        &self,
        mem: &mut Memory,
        host: &mut H,
        path: &HostPath,
        offset: u64,
        io_error: u8,
    ) -> u8 {
        let mut buf = [0x1Au8; RECORD_SIZE];
        match host.read_at(path, offset, &mut buf) {
            Ok(0) => END_OF_DATA,
            Ok(_) => {
                mem.load(self.dma, &buf);
                OK
            }
            Err(CpmError::FileNotFound(_)) => NO_FILE,
            Err(e) => {
                tracing::debug!("read {} at {}: {}", path, offset, e);
                io_error
            }
        }
    }

    fn write_record<H: HostServices>(
        &self,
        mem: &Memory,
        host: &mut H,
        path: &HostPath,
        offset: u64,
    ) -> u8 {
        let buf = mem.read_block(self.dma, RECORD_SIZE);
        match host.write_at(path, offset, &buf) {
            Ok(()) => OK,
            Err(CpmError::FileNotFound(_)) => NO_FILE,
            Err(e) => {
                tracing::debug!("write {} at {}: {}", path, offset, e);
                FAILED
            }
        }
    }
}

/// Length in 128-byte records, rounding a partial record up.
fn records(len: u64) -> u64 {
    len.div_ceil(RECORD_SIZE as u64)
}

fn record_offset(record: u32) -> u64 {
    u64::from(record) * RECORD_SIZE as u64
}
