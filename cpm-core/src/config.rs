//! Machine configuration.
//!
//! Everything the boot loop needs to know before the first instruction:
//! RAM size, which command interpreter image to load, how host paths are
//! built and what to do when the CPU halts. Loadable from JSON.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CpmError, CpmResult};

/// Emulator version string shown in the banner.
pub const EMULATOR_VERSION: &str = "2.9";

/// Same version in BCD, returned by BDOS 251.
pub const EMULATOR_VERSION_BCD: u8 = 0x29;

/// Host OS identifiers returned by BDOS 250.
pub mod host_os {
    pub const ARDUINO: u8 = 0x01;
    pub const POSIX: u8 = 0x02;
    pub const WINDOWS: u8 = 0x03;
    pub const DOS: u8 = 0x04;
}

/// Command interpreter flavours. Each one has its own image name, load
/// offset below the BDOS jump page and `$$$.SUB` FCB position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CcpVariant {
    /// Digital Research CCP
    #[default]
    Dr,
    Ccpz,
    Zcpr2,
    Zcpr3,
    Z80,
}

impl CcpVariant {
    pub const ALL: [CcpVariant; 5] = [Self::Dr, Self::Ccpz, Self::Zcpr2, Self::Zcpr3, Self::Z80];

    /// Image file name for a machine with `ram_kib` KiB of RAM.
    pub fn image_name(self, ram_kib: u8) -> String {
        let stem = match self {
            Self::Dr => "DR",
            Self::Ccpz => "CCPZ",
            Self::Zcpr2 => "ZCP2",
            Self::Zcpr3 => "ZCP3",
            Self::Z80 => "Z80",
        };
        format!("CCP-{stem}.{ram_kib}K")
    }

    /// Identifier returned by BDOS 252.
    pub fn version(self) -> u8 {
        match self {
            Self::Dr => 0x00,
            Self::Ccpz => 0x01,
            Self::Zcpr2 => 0x02,
            Self::Zcpr3 => 0x03,
            Self::Z80 => 0x04,
        }
    }

    /// Distance of the load address below the BDOS jump page.
    pub fn load_offset(self) -> u16 {
        match self {
            Self::Zcpr3 => 0x1000,
            _ => 0x0800,
        }
    }

    /// Offset of the `$$$.SUB` FCB inside the loaded image.
    pub fn batch_fcb_offset(self) -> u16 {
        match self {
            Self::Dr => 0x7AC,
            Self::Ccpz => 0x7A,
            Self::Zcpr2 | Self::Zcpr3 => 0x5E,
            Self::Z80 => 0x79E,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Dr => "dr",
            Self::Ccpz => "ccpz",
            Self::Zcpr2 => "zcpr2",
            Self::Zcpr3 => "zcpr3",
            Self::Z80 => "z80",
        }
    }
}

impl fmt::Display for CcpVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CcpVariant {
    type Err = CpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CpmError::InvalidConfig(format!("unknown CCP variant '{s}'")))
    }
}

/// What the boot loop does when the engine stops on `HALT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaltPolicy {
    /// Reload the command interpreter, as a warm boot does.
    #[default]
    Reboot,
    /// Stop the machine with `CpmError::Halted`.
    Exit,
}

impl fmt::Display for HaltPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reboot => "reboot",
            Self::Exit => "exit",
        })
    }
}

impl FromStr for HaltPolicy {
    type Err = CpmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reboot" => Ok(Self::Reboot),
            "exit" => Ok(Self::Exit),
            _ => Err(CpmError::InvalidConfig(format!("unknown halt policy '{s}'"))),
        }
    }
}

/// Machine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MachineConfig {
    /// RAM size in KiB, 16 to 64.
    pub ram_kib: u8,
    pub ccp: CcpVariant,
    /// Host paths carry a user-number folder.
    pub user_areas: bool,
    /// `$$$.SUB` is looked up on drive A: regardless of the current drive.
    pub batch_on_drive_a: bool,
    /// `$$$.SUB` is looked up in user 0 regardless of the current user.
    pub batch_on_user_0: bool,
    pub halt_policy: HaltPolicy,
    /// Print unimplemented-call and halt notices on the guest console.
    pub debug: bool,
    /// Value returned by BDOS 250.
    pub host_os: u8,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            ram_kib: 64,
            ccp: CcpVariant::Dr,
            user_areas: true,
            batch_on_drive_a: true,
            batch_on_user_0: false,
            halt_policy: HaltPolicy::Reboot,
            debug: false,
            host_os: host_os::POSIX,
        }
    }
}

impl MachineConfig {
    pub const MIN_RAM_KIB: u8 = 16;
    pub const MAX_RAM_KIB: u8 = 64;

    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json_str(text: &str) -> CpmResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> CpmResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> CpmResult<()> {
        if !(Self::MIN_RAM_KIB..=Self::MAX_RAM_KIB).contains(&self.ram_kib) {
            return Err(CpmError::InvalidConfig(format!(
                "ramKib must be between {} and {}, got {}",
                Self::MIN_RAM_KIB,
                Self::MAX_RAM_KIB,
                self.ram_kib
            )));
        }
        Ok(())
    }

    /// Image name of the configured command interpreter.
    pub fn ccp_image_name(&self) -> String {
        self.ccp.image_name(self.ram_kib)
    }
}
