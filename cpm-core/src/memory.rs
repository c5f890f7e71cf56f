//! Flat 64KB guest memory.
//!
//! Every address is a `u16`, so indexing can never leave the window and
//! arithmetic on addresses wraps modulo 65536.

/// Size of the guest address space.
pub const MEMORY_SIZE: usize = 0x10000;

/// Guest memory image.
#[derive(Clone)]
pub struct Memory {
    bytes: Box<[u8]>,
}

impl Memory {
    /// Zero-filled 64KB image.
    pub fn new() -> Self {
        Self {
            bytes: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.bytes[addr as usize] = value;
    }

    /// Little-endian word: low byte at `addr`, high byte at `addr + 1`.
    pub fn read16(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.read(addr), self.read(addr.wrapping_add(1))])
    }

    pub fn write16(&mut self, addr: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write(addr, lo);
        self.write(addr.wrapping_add(1), hi);
    }

    /// Fill `count` bytes starting at `addr` with `value`, wrapping at the top.
    pub fn fill(&mut self, addr: u16, count: usize, value: u8) {
        let mut a = addr;
        for _ in 0..count {
            self.write(a, value);
            a = a.wrapping_add(1);
        }
    }

    /// Copy `data` into memory at `addr`, wrapping at the top.
    pub fn load(&mut self, addr: u16, data: &[u8]) {
        let mut a = addr;
        for &b in data {
            self.write(a, b);
            a = a.wrapping_add(1);
        }
    }

    /// Copy `len` bytes out of memory starting at `addr`, wrapping at the top.
    pub fn read_block(&self, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| self.read(addr.wrapping_add(i as u16)))
            .collect()
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory").field("size", &self.bytes.len()).finish()
    }
}
