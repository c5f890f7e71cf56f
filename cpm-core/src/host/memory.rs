//! In-memory host with call counters.

use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};

use super::{drive_letter, to_8_3, HostPath, HostServices};
use crate::error::{CpmError, CpmResult};

/// Number of times each host operation was invoked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub drive_exists: u32,
    pub file_size: u32,
    pub create: u32,
    pub delete: u32,
    pub rename: u32,
    pub truncate: u32,
    pub read_at: u32,
    pub write_at: u32,
    pub list: u32,
    pub make_user_dir: u32,
    pub load_image: u32,
}

impl CallCounts {
    pub fn total(&self) -> u32 {
        self.lookups() + self.mutating()
    }

    /// Calls that could change stored files.
    pub fn mutating(&self) -> u32 {
        self.create + self.delete + self.rename + self.truncate + self.write_at
    }

    fn lookups(&self) -> u32 {
        self.drive_exists
            + self.file_size
            + self.read_at
            + self.list
            + self.make_user_dir
            + self.load_image
    }
}

/// Drives and files held in maps. Used by tests and embedders that do
/// not want a real directory tree.
#[derive(Debug, Default)]
pub struct MemoryHost {
    drives: BTreeSet<u8>,
    files: BTreeMap<HostPath, Vec<u8>>,
    images: BTreeMap<String, Vec<u8>>,
    user_dirs: BTreeSet<(u8, u8)>,
    calls: Cell<CallCounts>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host with the listed 0-based drives present.
    pub fn with_drives(drives: impl IntoIterator<Item = u8>) -> Self {
        Self {
            drives: drives.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn add_drive(&mut self, drive: u8) {
        self.drives.insert(drive);
    }

    /// Add a file (convenience method). The name is normalized to 8.3.
    pub fn add_file(&mut self, drive: u8, user: Option<u8>, name: &str, data: impl Into<Vec<u8>>) {
        self.drives.insert(drive);
        self.files
            .insert(HostPath::new(drive, user, to_8_3(name)), data.into());
    }

    pub fn file(&self, path: &HostPath) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn add_image(&mut self, name: &str, data: impl Into<Vec<u8>>) {
        self.images.insert(name.to_string(), data.into());
    }

    pub fn has_user_dir(&self, drive: u8, user: u8) -> bool {
        self.user_dirs.contains(&(drive, user))
    }

    pub fn calls(&self) -> CallCounts {
        self.calls.get()
    }

    pub fn reset_calls(&self) {
        self.calls.set(CallCounts::default());
    }

    fn count(&self, bump: impl FnOnce(&mut CallCounts)) {
        let mut calls = self.calls.get();
        bump(&mut calls);
        self.calls.set(calls);
    }

    fn check_drive(&self, drive: u8) -> CpmResult<()> {
        if self.drives.contains(&drive) {
            Ok(())
        } else {
            Err(CpmError::DriveNotMounted(drive_letter(drive)))
        }
    }

    fn existing_mut(&mut self, path: &HostPath) -> CpmResult<&mut Vec<u8>> {
        self.files
            .get_mut(path)
            .ok_or_else(|| CpmError::FileNotFound(path.to_string()))
    }
}

impl HostServices for MemoryHost {
    fn drive_exists(&self, drive: u8) -> bool {
        self.count(|c| c.drive_exists += 1);
        self.drives.contains(&drive)
    }

    fn file_size(&self, path: &HostPath) -> CpmResult<u64> {
        self.count(|c| c.file_size += 1);
        self.files
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| CpmError::FileNotFound(path.to_string()))
    }

    fn create(&mut self, path: &HostPath) -> CpmResult<()> {
        self.count(|c| c.create += 1);
        self.check_drive(path.drive)?;
        self.files.entry(path.clone()).or_default();
        Ok(())
    }

    fn delete(&mut self, path: &HostPath) -> CpmResult<()> {
        self.count(|c| c.delete += 1);
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| CpmError::FileNotFound(path.to_string()))
    }

    fn rename(&mut self, from: &HostPath, to: &HostPath) -> CpmResult<()> {
        self.count(|c| c.rename += 1);
        let data = self
            .files
            .remove(from)
            .ok_or_else(|| CpmError::FileNotFound(from.to_string()))?;
        self.files.insert(to.clone(), data);
        Ok(())
    }

    fn truncate(&mut self, path: &HostPath, len: u64) -> CpmResult<()> {
        self.count(|c| c.truncate += 1);
        let data = self.existing_mut(path)?;
        data.resize(len as usize, 0);
        Ok(())
    }

    fn read_at(&mut self, path: &HostPath, offset: u64, buf: &mut [u8]) -> CpmResult<usize> {
        self.count(|c| c.read_at += 1);
        let data = self
            .files
            .get(path)
            .ok_or_else(|| CpmError::FileNotFound(path.to_string()))?;
        let start = (offset as usize).min(data.len());
        let n = (data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, path: &HostPath, offset: u64, buf: &[u8]) -> CpmResult<()> {
        self.count(|c| c.write_at += 1);
        let data = self.existing_mut(path)?;
        let start = offset as usize;
        let end = start + buf.len();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn list(&self, drive: u8, user: Option<u8>) -> CpmResult<Vec<String>> {
        self.count(|c| c.list += 1);
        Ok(self
            .files
            .keys()
            .filter(|p| p.drive == drive && p.user == user)
            .map(|p| p.name.clone())
            .collect())
    }

    fn make_user_dir(&mut self, drive: u8, user: u8) {
        self.count(|c| c.make_user_dir += 1);
        if self.drives.contains(&drive) {
            self.user_dirs.insert((drive, user));
        }
    }

    fn load_image(&self, name: &str) -> CpmResult<Vec<u8>> {
        self.count(|c| c.load_image += 1);
        self.images
            .get(name)
            .cloned()
            .ok_or_else(|| CpmError::FileNotFound(name.to_string()))
    }
}
