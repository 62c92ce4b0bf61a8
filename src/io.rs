// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Keypad and speaker seams between the machine and the host

use minifb::Key;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Number of keys on the pad
pub const NUM_KEYS: usize = 16;

/// Frequency of the buzzer tone, in hertz
const TONE_HZ: u16 = 2093;

/// The sixteen-key pad, as the CPU sees it.
pub trait Input {
    /// Whether pad key `key` (0x0..=0xF) is held right now
    fn is_key_pressed(&self, key: usize) -> bool;
}

/// The buzzer, as the CPU sees it. Driven level-style: the tone holds
/// until stopped.
pub trait Sound {
    fn play_tone(&mut self);
    fn stop_tone(&mut self);
}

/// Key states shared between the window thread and the emulation thread.
///
/// The window side mirrors host key transitions in through
/// [SharedKeys::press] and [SharedKeys::release]; the emulation side only
/// reads, through [Input].
#[derive(Clone, Debug, Default)]
pub struct SharedKeys {
    keys: Arc<[AtomicBool; NUM_KEYS]>,
}

impl SharedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` held. Keys outside the pad are ignored.
    pub fn press(&self, key: usize) {
        if let Some(state) = self.keys.get(key) {
            state.store(true, Ordering::Relaxed);
        }
    }

    /// Marks `key` released.
    pub fn release(&self, key: usize) {
        if let Some(state) = self.keys.get(key) {
            state.store(false, Ordering::Relaxed);
        }
    }

    /// Marks every key released.
    pub fn release_all(&self) {
        for state in self.keys.iter() {
            state.store(false, Ordering::Relaxed);
        }
    }
}

impl Input for SharedKeys {
    fn is_key_pressed(&self, key: usize) -> bool {
        self.keys
            .get(key)
            .map(|state| state.load(Ordering::Relaxed))
            .unwrap_or(false)
    }
}

/// The host PC speaker. Tone changes are best effort: a machine with no
/// speaker plays silence, it does not stop the emulation.
#[derive(Debug, Default)]
pub struct Beeper {
    beeping: bool,
}

impl Beeper {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Sound for Beeper {
    fn play_tone(&mut self) {
        if !self.beeping {
            self.beeping = true;
            let _ = beep::beep(TONE_HZ);
        }
    }

    fn stop_tone(&mut self) {
        if self.beeping {
            self.beeping = false;
            let _ = beep::beep(0);
        }
    }
}

/// A speaker that isn't there.
#[derive(Debug, Default)]
pub struct Mute;

impl Sound for Mute {
    fn play_tone(&mut self) {}
    fn stop_tone(&mut self) {}
}

/// Maps a host key to its pad key, using the usual QWERTY layout for the
/// 123C/456D/789E/A0BF pad.
pub fn identify_key(key: Key) -> Option<usize> {
    match key {
        Key::Key1 => Some(0x1),
        Key::Key2 => Some(0x2),
        Key::Key3 => Some(0x3),
        Key::Key4 => Some(0xc),
        Key::Q => Some(0x4),
        Key::W => Some(0x5),
        Key::E => Some(0x6),
        Key::R => Some(0xD),
        Key::A => Some(0x7),
        Key::S => Some(0x8),
        Key::D => Some(0x9),
        Key::F => Some(0xE),
        Key::Z => Some(0xA),
        Key::X => Some(0x0),
        Key::C => Some(0xB),
        Key::V => Some(0xF),
        _ => None,
    }
}
