//! Guest memory map and the zero-page / BIOS / BDOS stub patch.
//!
//! The top of RAM holds four 256-byte pages, from high to low: the BIOS
//! handler page (`OUT n` / `RET` stubs), the BIOS jump table, the BDOS
//! handler page (`IN 0` / `RET`) and the BDOS jump page. The command
//! interpreter sits below those.

use crate::config::CcpVariant;
use crate::memory::Memory;

const JP: u8 = 0xC3;
const RET: u8 = 0xC9;
const IN_A: u8 = 0xDB;
const OUT_A: u8 = 0xD3;

/// Page-zero locations.
pub mod addr {
    /// Warm-boot vector (`JP BIOS+3`).
    pub const WARM_BOOT: u16 = 0x0000;
    pub const IOBYTE: u16 = 0x0003;
    /// Current drive in the low nibble, user in the high nibble.
    pub const DRIVE_USER: u16 = 0x0004;
    /// BDOS entry (`JP BDOS`).
    pub const BDOS_ENTRY: u16 = 0x0005;
    pub const FCB1: u16 = 0x005C;
    pub const FCB2: u16 = 0x006C;
    pub const DEFAULT_DMA: u16 = 0x0080;
    pub const CMDLINE: u16 = 0x0080;
    /// Transient program area.
    pub const TPA: u16 = 0x0100;
}

/// IOBYTE value: console on CRT.
pub const DEFAULT_IOBYTE: u8 = 0x3D;

/// Number of BIOS entries (0, 3, ... 0x33).
pub const BIOS_ENTRIES: u16 = 18;

/// Disk parameter block served by BDOS 31.
pub const DPB: [u8; 15] = [
    0x20, 0x00, // spt
    0x04, // bsh
    0x0F, // blm
    0x00, // exm
    0xFF, 0x01, // dsm
    0xFE, 0x00, // drm
    0xF0, // al0
    0x00, // al1
    0x3F, 0x00, // cks
    0x02, 0x00, // off
];

/// Addresses derived from the RAM size and CCP variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub ram_kib: u8,
    pub bios_page: u16,
    pub bios_jump_page: u16,
    pub bdos_page: u16,
    pub bdos_jump_page: u16,
    pub dpb: u16,
    pub scb: u16,
    pub tmp_fcb: u16,
    pub ccp: u16,
    pub batch_fcb: u16,
}

impl MemoryLayout {
    pub fn new(ram_kib: u8, variant: CcpVariant) -> Self {
        let top = (ram_kib as u32 * 1024).min(0x10000);
        let bios_page = (top - 256) as u16;
        let bios_jump_page = bios_page.wrapping_sub(256);
        let bdos_page = bios_jump_page.wrapping_sub(256);
        let bdos_jump_page = bdos_page.wrapping_sub(256);
        let ccp = bdos_jump_page.wrapping_sub(variant.load_offset());
        Self {
            ram_kib,
            bios_page,
            bios_jump_page,
            bdos_page,
            bdos_jump_page,
            dpb: bios_page + 64,
            scb: bdos_page + 16,
            tmp_fcb: bdos_page + 64,
            ccp,
            batch_fcb: ccp.wrapping_add(variant.batch_fcb_offset()),
        }
    }

    /// Write the page-zero vectors, the BDOS/BIOS stubs and the DPB.
    ///
    /// The drive/user byte at 0x0004 is cleared unless `keep_drive_user`.
    pub fn patch(&self, mem: &mut Memory, keep_drive_user: bool) {
        mem.write(addr::WARM_BOOT, JP);
        mem.write16(addr::WARM_BOOT + 1, self.bios_jump_page + 3);
        mem.write(addr::IOBYTE, DEFAULT_IOBYTE);
        if !keep_drive_user {
            mem.write(addr::DRIVE_USER, 0);
        }
        mem.write(addr::BDOS_ENTRY, JP);
        mem.write16(addr::BDOS_ENTRY + 1, self.bdos_jump_page + 6);

        // Version word the CCP looks for, then the jump into the handler.
        mem.write16(self.bdos_jump_page, 0x1600);
        mem.write16(self.bdos_jump_page + 2, 0x0000);
        mem.write16(self.bdos_jump_page + 4, 0x0000);
        mem.write(self.bdos_jump_page + 6, JP);
        mem.write16(self.bdos_jump_page + 7, self.bdos_page);
        mem.load(self.bdos_page, &[IN_A, 0x00, RET]);

        for i in (0..BIOS_ENTRIES * 3).step_by(3) {
            mem.write(self.bios_jump_page + i, JP);
            mem.write16(self.bios_jump_page + i + 1, self.bios_page + i);
            mem.load(self.bios_page + i, &[OUT_A, i as u8, RET]);
        }

        mem.load(self.dpb, &DPB);
    }
}
