//! Drive folders under a host root directory.
//!
//! ```text
//! root/
//!   CCP-DR.64K
//!   A/0/PIP.COM
//!   B/0/...
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{drive_letter, is_cpm_name, user_folder, HostPath, HostServices};
use crate::error::{CpmError, CpmResult};

/// Host services backed by `std::fs`.
#[derive(Debug, Clone)]
pub struct DirHost {
    root: PathBuf,
}

impl DirHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn drive_dir(&self, drive: u8) -> PathBuf {
        self.root.join(drive_letter(drive).to_string())
    }

    fn folder(&self, drive: u8, user: Option<u8>) -> PathBuf {
        let dir = self.drive_dir(drive);
        match user {
            Some(user) => dir.join(user_folder(user).to_string()),
            None => dir,
        }
    }

    fn resolve(&self, path: &HostPath) -> PathBuf {
        self.folder(path.drive, path.user).join(&path.name)
    }
}

fn not_found(path: &HostPath, err: io::Error) -> CpmError {
    if err.kind() == io::ErrorKind::NotFound {
        CpmError::FileNotFound(path.to_string())
    } else {
        CpmError::Io(err)
    }
}

impl HostServices for DirHost {
    fn drive_exists(&self, drive: u8) -> bool {
        self.drive_dir(drive).is_dir()
    }

    fn file_size(&self, path: &HostPath) -> CpmResult<u64> {
        let meta = fs::metadata(self.resolve(path)).map_err(|e| not_found(path, e))?;
        Ok(meta.len())
    }

    fn create(&mut self, path: &HostPath) -> CpmResult<()> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.resolve(path))?;
        Ok(())
    }

    fn delete(&mut self, path: &HostPath) -> CpmResult<()> {
        fs::remove_file(self.resolve(path)).map_err(|e| not_found(path, e))
    }

    fn rename(&mut self, from: &HostPath, to: &HostPath) -> CpmResult<()> {
        fs::rename(self.resolve(from), self.resolve(to)).map_err(|e| not_found(from, e))
    }

    fn truncate(&mut self, path: &HostPath, len: u64) -> CpmResult<()> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.resolve(path))
            .map_err(|e| not_found(path, e))?;
        file.set_len(len)?;
        Ok(())
    }

    fn read_at(&mut self, path: &HostPath, offset: u64, buf: &mut [u8]) -> CpmResult<usize> {
        let mut file = File::open(self.resolve(path)).map_err(|e| not_found(path, e))?;
        file.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            match file.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }

    fn write_at(&mut self, path: &HostPath, offset: u64, buf: &[u8]) -> CpmResult<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .open(self.resolve(path))
            .map_err(|e| not_found(path, e))?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn list(&self, drive: u8, user: Option<u8>) -> CpmResult<Vec<String>> {
        let dir = self.folder(drive, user);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_cpm_name(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn make_user_dir(&mut self, drive: u8, user: u8) {
        let dir = self.folder(drive, Some(user));
        if let Err(e) = fs::create_dir_all(&dir) {
            tracing::debug!("cannot create user folder {}: {}", dir.display(), e);
        }
    }

    fn load_image(&self, name: &str) -> CpmResult<Vec<u8>> {
        fs::read(self.root.join(name)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CpmError::FileNotFound(name.to_string())
            } else {
                CpmError::Io(e)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scratch root removed on drop.
    struct Scratch(PathBuf);

    impl Scratch {
        fn new(tag: &str) -> Self {
            let dir = std::env::temp_dir().join(format!(
                "z80cpm-{}-{}-{:?}",
                tag,
                std::process::id(),
                std::thread::current().id()
            ));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(dir.join("A").join("0")).unwrap();
            Self(dir)
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn test_drive_exists() {
        let scratch = Scratch::new("drives");
        let host = DirHost::new(&scratch.0);
        assert!(host.drive_exists(0));
        assert!(!host.drive_exists(1));
    }

    #[test]
    fn test_selecting_missing_drive_folder_fails() {
        use crate::{HeadlessConsole, Machine, MachineConfig, RunState};

        let scratch = Scratch::new("select");
        let host = DirHost::new(&scratch.0);
        let mut m = Machine::new(HeadlessConsole::new(), host, MachineConfig::default()).unwrap();
        // LD E,1 / LD C,14 / CALL 0005 / HALT
        let program = [0x1E, 0x01, 0x0E, 0x0E, 0xCD, 0x05, 0x00, 0x76];

        assert_eq!(m.run_program(&program, &[]), RunState::ReturnToCaller);
        assert_eq!(
            m.console().output_string(),
            "\r\nBDOS Error on B : Select\r\n"
        );
        assert_eq!(m.disk().current_drive, 0);
        assert_eq!(m.memory().read(0x0004) & 0x0F, 0);
    }

    #[test]
    fn test_create_keeps_existing_content() {
        let scratch = Scratch::new("create");
        let mut host = DirHost::new(&scratch.0);
        let path = HostPath::new(0, Some(0), "DATA.TXT");

        host.create(&path).unwrap();
        host.write_at(&path, 0, b"hello").unwrap();
        host.create(&path).unwrap();
        assert_eq!(host.file_size(&path).unwrap(), 5);
    }

    #[test]
    fn test_read_write_at_offsets() {
        let scratch = Scratch::new("rw");
        let mut host = DirHost::new(&scratch.0);
        let path = HostPath::new(0, Some(0), "REC.DAT");
        host.create(&path).unwrap();
        host.write_at(&path, 128, &[0xAA; 128]).unwrap();
        assert_eq!(host.file_size(&path).unwrap(), 256);

        let mut buf = [0xFFu8; 128];
        assert_eq!(host.read_at(&path, 0, &mut buf).unwrap(), 128);
        assert!(buf.iter().all(|&b| b == 0));
        assert_eq!(host.read_at(&path, 256, &mut buf).unwrap(), 0);

        host.truncate(&path, 130).unwrap();
        assert_eq!(host.read_at(&path, 128, &mut buf).unwrap(), 2);
    }

    #[test]
    fn test_write_requires_existing_file() {
        let scratch = Scratch::new("missing");
        let mut host = DirHost::new(&scratch.0);
        let path = HostPath::new(0, Some(0), "NOPE.TXT");
        assert!(matches!(
            host.write_at(&path, 0, b"x"),
            Err(CpmError::FileNotFound(_))
        ));
        assert!(matches!(host.file_size(&path), Err(CpmError::FileNotFound(_))));
    }

    #[test]
    fn test_list_skips_folders_and_foreign_names() {
        let scratch = Scratch::new("list");
        let mut host = DirHost::new(&scratch.0);
        for name in ["ZED.COM", "ALPHA.TXT"] {
            host.create(&HostPath::new(0, Some(0), name)).unwrap();
        }
        fs::write(scratch.0.join("A").join("0").join("notes.md"), b"x").unwrap();
        fs::create_dir_all(scratch.0.join("A").join("0").join("SUB")).unwrap();

        assert_eq!(host.list(0, Some(0)).unwrap(), vec!["ALPHA.TXT", "ZED.COM"]);
        assert!(host.list(0, Some(5)).unwrap().is_empty());
    }

    #[test]
    fn test_rename_delete_and_user_dir() {
        let scratch = Scratch::new("rename");
        let mut host = DirHost::new(&scratch.0);
        let from = HostPath::new(0, Some(0), "OLD.TXT");
        let to = from.with_name("NEW.TXT");
        host.create(&from).unwrap();
        host.rename(&from, &to).unwrap();
        assert!(host.file_size(&from).is_err());
        host.delete(&to).unwrap();
        assert!(host.delete(&to).is_err());

        host.make_user_dir(0, 10);
        assert!(scratch.0.join("A").join("A").is_dir());
    }

    #[test]
    fn test_load_image_from_root() {
        let scratch = Scratch::new("image");
        fs::write(scratch.0.join("CCP-DR.64K"), [0xC3, 0x00, 0x00]).unwrap();
        let host = DirHost::new(&scratch.0);
        assert_eq!(host.load_image("CCP-DR.64K").unwrap(), vec![0xC3, 0, 0]);
        assert!(matches!(
            host.load_image("CCP-Z80.64K"),
            Err(CpmError::FileNotFound(_))
        ));
    }
}
