//! File Control Block (FCB) implementation.
//!
//! The FCB is CP/M's file descriptor structure, stored in the program's
//! memory space and passed to BDOS functions. The disk layer copies it
//! out of guest memory, works on the copy and writes it back.
//!
//! Layout (36 bytes):
//! - Byte 0: Drive (0=default, 1=A:, 2=B:, ...)
//! - Bytes 1-8: Filename (space-padded)
//! - Bytes 9-11: Extension (space-padded)
//! - Byte 12: Current extent (EX)
//! - Bytes 13-14: Reserved (S1, S2)
//! - Byte 15: Record count (RC)
//! - Bytes 16-31: Disk allocation map (AL)
//! - Byte 32: Current record (CR)
//! - Bytes 33-35: Random record number (R0, R1, R2)

use crate::memory::Memory;

/// Size of an FCB in bytes.
pub const FCB_SIZE: usize = 36;

/// Record size in CP/M (always 128 bytes).
pub const RECORD_SIZE: usize = 128;

/// Highest CR value before the extent advances.
const MAX_CR: u8 = 128;
/// Highest extent number within one S2 unit.
const MAX_EX: u8 = 31;
/// Highest S2 value sequential I/O may reach.
const MAX_S2: u8 = 15;
/// Largest record count the RC byte reports; larger files show 0x80.
const MAX_RC: u64 = 127;

/// Byte offsets of the FCB fields.
mod off {
    pub const DR: usize = 0;
    pub const NAME: usize = 1;
    pub const TYPE: usize = 9;
    pub const EX: usize = 12;
    pub const S1: usize = 13;
    pub const S2: usize = 14;
    pub const RC: usize = 15;
    pub const AL: usize = 16;
    pub const CR: usize = 32;
    pub const R0: usize = 33;
}

/// An 11-byte name+type used for directory matching. `?` matches any byte.
pub type FcbPattern = [u8; 11];

/// Copy of a guest FCB.
pub fn load(mem: &Memory, addr: u16) -> [u8; FCB_SIZE] {
    let mut raw = [0u8; FCB_SIZE];
    for (i, byte) in raw.iter_mut().enumerate() {
        *byte = mem.read(addr.wrapping_add(i as u16));
    }
    raw
}

/// Write a modified FCB back to guest memory.
pub fn store(mem: &mut Memory, addr: u16, raw: &[u8; FCB_SIZE]) {
    mem.load(addr, raw);
}

/// File Control Block - view into CP/M memory for file operations.
pub struct Fcb<'a> {
    mem: &'a mut [u8],
}

impl<'a> Fcb<'a> {
    /// Create FCB from memory slice (must be at least 36 bytes).
    pub fn new(memory: &'a mut [u8]) -> Self {
        debug_assert!(memory.len() >= FCB_SIZE);
        Self { mem: memory }
    }

    /// Drive number: 0 = current, 1 = A:, 2 = B:, etc.
    pub fn drive(&self) -> u8 {
        self.mem[off::DR]
    }

    pub fn set_drive(&mut self, drive: u8) {
        self.mem[off::DR] = drive;
    }

    /// Get raw filename bytes (8 chars, space-padded).
    pub fn raw_name(&self) -> &[u8] {
        &self.mem[off::NAME..off::TYPE]
    }

    /// Get raw extension bytes (3 chars, space-padded).
    pub fn raw_ext(&self) -> &[u8] {
        &self.mem[off::TYPE..off::EX]
    }

    /// Name and type with attribute bits stripped and letters uppercased.
    pub fn pattern(&self) -> FcbPattern {
        let mut pattern = [b' '; 11];
        for (dst, &src) in pattern.iter_mut().zip(&self.mem[off::NAME..off::EX]) {
            *dst = (src & 0x7F).to_ascii_uppercase();
        }
        pattern
    }

    /// Host file name: the printable name characters, then a dot and the
    /// printable type characters if there are any. Uppercased.
    pub fn host_name(&self) -> String {
        let printable = |bytes: &[u8]| -> String {
            bytes
                .iter()
                .map(|&b| b & 0x7F)
                .filter(|&b| b > b' ')
                .map(|b| b.to_ascii_uppercase() as char)
                .collect()
        };
        let name = printable(self.raw_name());
        let ext = printable(self.raw_ext());
        if ext.is_empty() {
            name
        } else {
            format!("{}.{}", name, ext)
        }
    }

    /// Set filename from string (will be space-padded to 8 chars).
    pub fn set_name(&mut self, name: &str) {
        let upper = name.to_uppercase();
        for (i, byte) in self.mem[off::NAME..off::TYPE].iter_mut().enumerate() {
            *byte = upper.as_bytes().get(i).copied().unwrap_or(b' ');
        }
    }

    /// Set extension from string (will be space-padded to 3 chars).
    pub fn set_ext(&mut self, ext: &str) {
        let upper = ext.to_uppercase();
        for (i, byte) in self.mem[off::TYPE..off::EX].iter_mut().enumerate() {
            *byte = upper.as_bytes().get(i).copied().unwrap_or(b' ');
        }
    }

    /// Fill name and type from a host name such as `AB.TXT`.
    pub fn set_host_name(&mut self, host_name: &str) {
        let (name, ext) = match host_name.split_once('.') {
            Some((name, ext)) => (name, ext),
            None => (host_name, ""),
        };
        self.set_name(name);
        self.set_ext(ext);
    }

    /// Current extent number (EX).
    pub fn ex(&self) -> u8 {
        self.mem[off::EX]
    }

    pub fn set_ex(&mut self, v: u8) {
        self.mem[off::EX] = v;
    }

    pub fn s1(&self) -> u8 {
        self.mem[off::S1]
    }

    pub fn set_s1(&mut self, v: u8) {
        self.mem[off::S1] = v;
    }

    /// S2 byte (high bits of extent for large files).
    pub fn s2(&self) -> u8 {
        self.mem[off::S2]
    }

    pub fn set_s2(&mut self, v: u8) {
        self.mem[off::S2] = v;
    }

    /// Record count (RC) - records in current extent.
    pub fn rc(&self) -> u8 {
        self.mem[off::RC]
    }

    pub fn set_rc(&mut self, v: u8) {
        self.mem[off::RC] = v;
    }

    /// Set RC from a file length in records, saturating at 0x80.
    pub fn set_rc_from_records(&mut self, records: u64) {
        self.set_rc(if records > MAX_RC { 0x80 } else { records as u8 });
    }


    pub fn clear_al(&mut self) {
        self.mem[off::AL..off::CR].fill(0);
    }

    /// Current record within extent (CR).
    pub fn cr(&self) -> u8 {
        self.mem[off::CR]
    }

    pub fn set_cr(&mut self, v: u8) {
        self.mem[off::CR] = v;
    }

    /// Byte offset of the next sequential record.
    pub fn sequential_offset(&self) -> u64 {
        let s2 = u64::from(self.s2() & MAX_S2);
        let ex = u64::from(self.ex());
        let cr = u64::from(self.cr());
        s2 * 4096 * RECORD_SIZE as u64 + ex * 128 * RECORD_SIZE as u64 + cr * RECORD_SIZE as u64
    }

    /// Move the sequential cursor past one record.
    ///
    /// Returns false when S2 has run past its last value.
    pub fn advance_sequential(&mut self) -> bool {
        self.set_cr(self.cr().wrapping_add(1));
        if self.cr() > MAX_CR {
            self.set_cr(1);
            self.set_ex(self.ex().wrapping_add(1));
        }
        if self.ex() > MAX_EX {
            self.set_ex(0);
            self.set_s2(self.s2().wrapping_add(1));
        }
        self.s2() <= MAX_S2
    }

    /// Compute current record number for sequential access.
    /// Combines CR, EX, and S2 into a single record number.
    pub fn current_record(&self) -> u32 {
        u32::from(self.cr() & 0x7F)
            + (u32::from(self.ex() & 0x1F) << 7)
            + (u32::from(self.s2()) << 12)
    }

    /// Set current record number (updates CR, EX, S2).
    pub fn set_current_record(&mut self, n: u32) {
        self.set_cr((n & 0x7F) as u8);
        self.set_ex(((n >> 7) & 0x1F) as u8);
        self.set_s2(((n >> 12) & 0xFF) as u8);
    }

    /// Random record number (24-bit, from R0, R1, R2).
    pub fn random_record(&self) -> u32 {
        u32::from(self.mem[off::R0])
            | (u32::from(self.mem[off::R0 + 1]) << 8)
            | (u32::from(self.mem[off::R0 + 2]) << 16)
    }

    pub fn set_random_record(&mut self, n: u32) {
        self.mem[off::R0] = (n & 0xFF) as u8;
        self.mem[off::R0 + 1] = ((n >> 8) & 0xFF) as u8;
        self.mem[off::R0 + 2] = ((n >> 16) & 0xFF) as u8;
    }

    /// Zero EX, S1, S2, RC, the allocation map and CR.
    pub fn reset_position(&mut self) {
        self.set_ex(0);
        self.set_s1(0);
        self.set_s2(0);
        self.set_rc(0);
        self.clear_al();
        self.set_cr(0);
    }

    /// Blank out this FCB (set to spaces).
    pub fn blank(&mut self) {
        self.mem[off::DR] = 0;
        for byte in &mut self.mem[off::NAME..off::EX] {
            *byte = b' ';
        }
        for byte in &mut self.mem[off::EX..FCB_SIZE] {
            *byte = 0;
        }
    }

    /// Parse a filename string into an FCB.
    /// Handles formats like "A:FILE.TXT", "FILE.TXT", "FILE" and expands
    /// `*` to `?` up to the end of the field.
    pub fn parse_filename(&mut self, filename: &str) {
        self.blank();

        let mut s = filename.to_uppercase();

        // Check for drive prefix
        if s.len() >= 2 && s.as_bytes()[1] == b':' {
            let drive = s.as_bytes()[0];
            if drive.is_ascii_uppercase() {
                self.set_drive(drive - b'A' + 1);
            }
            s = s[2..].to_string();
        }

        let (name, ext) = match s.rfind('.') {
            Some(pos) => (&s[..pos], &s[pos + 1..]),
            None => (s.as_str(), ""),
        };

        self.set_name(&expand_star(name, 8));
        self.set_ext(&expand_star(ext, 3));
    }
}

/// Name+type `name` matches `pattern` byte for byte, `?` matching anything.
pub fn matches(name: &FcbPattern, pattern: &FcbPattern) -> bool {
    name.iter()
        .zip(pattern)
        .all(|(&n, &p)| p == b'?' || p == n)
}

/// Pattern form of a host name: `AB.TXT` becomes `AB      TXT`.
pub fn host_name_pattern(host_name: &str) -> FcbPattern {
    let mut raw = [0u8; FCB_SIZE];
    let mut fcb = Fcb::new(&mut raw);
    fcb.set_host_name(host_name);
    fcb.pattern()
}

fn expand_star(field: &str, width: usize) -> String {
    match field.find('*') {
        Some(pos) => {
            let mut out: String = field[..pos].chars().take(width).collect();
            while out.len() < width {
                out.push('?');
            }
            out
        }
        None => field.chars().take(width).collect(),
    }
}
