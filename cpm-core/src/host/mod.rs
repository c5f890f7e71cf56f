//! Host services: the file operations the disk layer delegates to.
//!
//! - `HostServices`: the contract, keyed by [`HostPath`]
//! - `DirHost`: drive folders under a root directory
//! - `MemoryHost`: in-memory drives with per-call counters

mod dir;
mod memory;

use std::fmt;

pub use dir::DirHost;
pub use memory::{CallCounts, MemoryHost};

use crate::error::CpmResult;

/// Drives A: to P:.
pub const MAX_DRIVES: u8 = 16;

/// Letter for a 0-based drive number.
pub fn drive_letter(drive: u8) -> char {
    (b'A' + (drive & 0x0F)) as char
}

/// Folder name for a user area: `0`-`9`, then `A`-`V` for 10 to 31.
pub fn user_folder(user: u8) -> char {
    char::from_digit(u32::from(user & 0x1F), 32)
        .unwrap_or('0')
        .to_ascii_uppercase()
}

/// A file on a host drive, optionally inside a user-area folder.
///
/// Renders as `A/0/NAME.TYP`, or `A/NAME.TYP` without user areas.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostPath {
    pub drive: u8,
    pub user: Option<u8>,
    pub name: String,
}

impl HostPath {
    pub fn new(drive: u8, user: Option<u8>, name: impl Into<String>) -> Self {
        Self {
            drive,
            user,
            name: name.into(),
        }
    }

    /// Same drive and user folder, different file name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(self.drive, self.user, name)
    }
}

impl fmt::Display for HostPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", drive_letter(self.drive))?;
        if let Some(user) = self.user {
            write!(f, "{}/", user_folder(user))?;
        }
        f.write_str(&self.name)
    }
}

/// File operations backing the BDOS disk functions.
///
/// Failures are reported as `CpmError`; the disk layer only looks at
/// success or failure and turns that into a guest status byte.
pub trait HostServices {
    /// The drive folder exists and can be selected.
    fn drive_exists(&self, drive: u8) -> bool;

    fn file_size(&self, path: &HostPath) -> CpmResult<u64>;

    /// Create the file if it is absent. Existing content is kept.
    fn create(&mut self, path: &HostPath) -> CpmResult<()>;

    fn delete(&mut self, path: &HostPath) -> CpmResult<()>;

    fn rename(&mut self, from: &HostPath, to: &HostPath) -> CpmResult<()>;

    fn truncate(&mut self, path: &HostPath, len: u64) -> CpmResult<()>;

    /// Read up to `buf.len()` bytes at `offset`. Returns the count read,
    /// 0 at or past end of file.
    fn read_at(&mut self, path: &HostPath, offset: u64, buf: &mut [u8]) -> CpmResult<usize>;

    /// Write `buf` at `offset`, extending the file as needed. The file
    /// must already exist.
    fn write_at(&mut self, path: &HostPath, offset: u64, buf: &[u8]) -> CpmResult<()>;

    /// Regular files in a drive (and user) folder, sorted.
    fn list(&self, drive: u8, user: Option<u8>) -> CpmResult<Vec<String>>;

    /// Make sure the folder for `user` exists on `drive`. Best effort.
    fn make_user_dir(&mut self, drive: u8, user: u8);

    /// Read a command interpreter image stored at the host root.
    fn load_image(&self, name: &str) -> CpmResult<Vec<u8>>;
}

/// Convert filename to CP/M 8.3 format.
///
/// - Uppercases everything
/// - Truncates name to 8 chars, extension to 3 chars
/// - Removes invalid characters
///
/// # Examples
/// ```
/// use z80cpm_core::host::to_8_3;
/// assert_eq!(to_8_3("hello.txt"), "HELLO.TXT");
/// assert_eq!(to_8_3("VeryLongName.extension"), "VERYLONG.EXT");
/// assert_eq!(to_8_3("noext"), "NOEXT");
/// ```
pub fn to_8_3(filename: &str) -> String {
    let upper = filename.to_uppercase();
    let (name, ext) = match upper.rfind('.') {
        Some(pos) => (&upper[..pos], &upper[pos + 1..]),
        None => (upper.as_str(), ""),
    };

    // Valid CP/M characters: A-Z, 0-9, $ # @ ! % ' ` ( ) { } ~ ^ - _
    fn clean(s: &str) -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric() || "$#@!%'`(){}~^-_".contains(*c))
            .collect()
    }

    let clean_name: String = clean(name).chars().take(8).collect();
    let clean_ext: String = clean(ext).chars().take(3).collect();

    let final_name = if clean_name.is_empty() {
        "_".to_string()
    } else {
        clean_name
    };

    if clean_ext.is_empty() {
        final_name
    } else {
        format!("{}.{}", final_name, clean_ext)
    }
}

/// True when a host file name survives the 8.3 conversion unchanged,
/// i.e. the guest can address it through an FCB.
pub fn is_cpm_name(name: &str) -> bool {
    to_8_3(name) == name
}
