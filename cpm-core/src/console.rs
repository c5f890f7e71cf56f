//! Guest console.
//!
//! BIOS and BDOS console calls go through [`CpmConsole`]. The terminal
//! front end supplies a live implementation; [`HeadlessConsole`] scripts
//! the keyboard and records the screen for tests and embedding.

use std::collections::VecDeque;
use std::time::Duration;

/// Control-C, the CP/M abort key.
pub const CTRL_C: u8 = 0x03;

/// Character device behind CONIN/CONOUT/CONST.
pub trait CpmConsole: Send {
    /// Emit one byte on the guest screen.
    fn write(&mut self, ch: u8);

    /// A keystroke is waiting.
    fn has_key(&self) -> bool;

    /// Take the next keystroke, if any.
    fn get_key(&mut self) -> Option<u8>;

    /// Take the next keystroke, waiting for one.
    fn wait_for_key(&mut self) -> u8 {
        loop {
            match self.get_key() {
                Some(ch) => return ch,
                None => std::thread::sleep(Duration::from_millis(1)),
            }
        }
    }
}

/// Scripted keyboard and recorded screen.
///
/// Once the script runs out every blocking read returns ^C, so a guest
/// waiting on the keyboard is sent back to the command interpreter
/// instead of spinning forever.
#[derive(Debug, Default)]
pub struct HeadlessConsole {
    screen: Vec<u8>,
    keys: VecDeque<u8>,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    /// Console whose keyboard will deliver `keys` in order.
    pub fn with_input(keys: &[u8]) -> Self {
        let mut console = Self::new();
        console.type_keys(keys);
        console
    }

    /// Append keystrokes to the script.
    pub fn type_keys(&mut self, keys: &[u8]) {
        self.keys.extend(keys);
    }

    pub fn type_line(&mut self, line: &str) {
        self.type_keys(line.as_bytes());
        self.type_keys(b"\r");
    }

    /// Everything written so far.
    pub fn output(&self) -> &[u8] {
        &self.screen
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.screen).into_owned()
    }

    /// Hand back the screen contents and start a fresh one.
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.screen)
    }
}

impl CpmConsole for HeadlessConsole {
    fn write(&mut self, ch: u8) {
        self.screen.push(ch);
    }

    fn has_key(&self) -> bool {
        !self.keys.is_empty()
    }

    fn get_key(&mut self) -> Option<u8> {
        self.keys.pop_front()
    }

    fn wait_for_key(&mut self) -> u8 {
        self.keys.pop_front().unwrap_or(CTRL_C)
    }
}
