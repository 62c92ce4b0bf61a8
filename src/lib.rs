// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! An eight-bit fantasy computer: a Chip-8 style core with a nanosecond
//! timer wheel driving the cpu, the 60Hz countdown decay, and the frame
//! signal from one clock, so the whole machine pauses and resumes without
//! losing its place.
//!
//! [Chip8] wires the pieces together and owns the run loop; the parts are
//! usable on their own for testing or embedding.

pub mod cfg;
pub mod clock;
pub mod cpu;
pub mod error;
pub mod io;
pub mod mem;
pub mod screen;

use crate::{
    cfg::{Config, SIXTY_HZ_TICK_NS},
    clock::{Clock, TimerHandle, TimerTask},
    cpu::CPU,
    error::{Error, Result},
    io::{Beeper, SharedKeys, Sound},
    mem::Mem,
    screen::Screen,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

/// Asks a running machine to pause or resume.
///
/// The machine only honors the request at the top of its loop, between
/// scheduler passes, so mid-instruction state is never torn. `engaged`
/// reports when it actually happened.
#[derive(Debug, Default)]
pub struct PauseGate {
    want: AtomicBool,
    engaged: AtomicBool,
}

impl PauseGate {
    /// Requests the given pause state.
    pub fn set_paused(&self, paused: bool) {
        self.want.store(paused, Ordering::Relaxed);
    }

    /// Flips the request, returning the new state.
    pub fn toggle(&self) -> bool {
        !self.want.fetch_xor(true, Ordering::Relaxed)
    }

    /// True once the machine has stopped at its safe point.
    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::Relaxed)
    }
}

/// The assembled machine: core, memory, clock, screen, keypad, speaker.
///
/// # Examples
/// ```rust
/// # use cheep::prelude::*;
/// let mut ch8 = Chip8::new(&Config::default()).unwrap();
/// // a program that spins on itself
/// ch8.load_rom_bytes(&[0x12, 0x00]).unwrap();
/// assert_eq!(ch8.cpu.regs.pc, 0x200);
/// ```
pub struct Chip8 {
    pub cpu: CPU,
    pub mem: Mem,
    clock: Clock,
    screen: Arc<Screen>,
    keys: SharedKeys,
    sound: Box<dyn Sound + Send>,
    /// Handles in registration order: cpu cycle, countdown decay, frame
    timers: [TimerHandle; 3],
    pause: Arc<PauseGate>,
    load_addr: u16,
    perf_level: u32,
}

impl Chip8 {
    /// Builds a machine from `conf`: three timers on one clock, zeroed
    /// memory with the font loaded, and a beeping speaker.
    ///
    /// The cpu timer keeps every missed deadline so throughput stays at
    /// the configured rate; the decay and frame timers skip missed work,
    /// since only their cadence matters.
    ///
    /// Zero rates and stack depths outside `1..=255` are rejected here,
    /// before any hardware is built.
    pub fn new(conf: &Config) -> Result<Self> {
        if !(1..=255).contains(&conf.stack_size) {
            return Err(Error::InvalidStackSize {
                size: conf.stack_size,
            });
        }
        let budget = conf.cpu_hz / if conf.perf_level >= 2 { 100 } else { 1000 };
        let mut clock = Clock::new(budget.min(u32::MAX as u64) as u32);
        let cycle = clock.register(TimerTask::CpuCycle);
        let decay = clock.register(TimerTask::TimerDecay);
        let frame = clock.register(TimerTask::FrameSignal);
        clock.cyclic(cycle, conf.cpu_tick_ns(), false)?;
        clock.cyclic(decay, SIXTY_HZ_TICK_NS, true)?;
        clock.cyclic(frame, conf.frame_tick_ns(), true)?;
        Ok(Chip8 {
            cpu: CPU::new(conf, decay, frame),
            mem: Mem::new(conf),
            clock,
            screen: Arc::new(Screen::default()),
            keys: SharedKeys::default(),
            sound: Box::<Beeper>::default(),
            timers: [cycle, decay, frame],
            pause: Arc::new(PauseGate::default()),
            load_addr: conf.load_addr,
            perf_level: conf.perf_level,
        })
    }

    /// Reads a rom file into memory at the load address.
    pub fn load_rom(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let rom = std::fs::read(path)?;
        self.load_rom_bytes(&rom)
    }

    /// Copies rom bytes into memory at the load address.
    pub fn load_rom_bytes(&mut self, rom: &[u8]) -> Result<()> {
        self.mem.load_rom(rom, self.load_addr)
    }

    /// The machine's display, shareable with a rendering frontend.
    pub fn screen(&self) -> Arc<Screen> {
        self.screen.clone()
    }

    /// The machine's keypad, shareable with an input frontend.
    pub fn keys(&self) -> SharedKeys {
        self.keys.clone()
    }

    /// The pause control, shareable with a frontend.
    pub fn pause_gate(&self) -> Arc<PauseGate> {
        self.pause.clone()
    }

    /// Replaces the speaker backend, e.g. to silence the machine.
    pub fn set_sound(&mut self, sound: Box<dyn Sound + Send>) {
        self.sound = sound;
    }

    /// Runs the machine until a trap stops it.
    ///
    /// Each pass services the pause gate, then fires every due timer.
    /// Between passes the configured performance level decides how hard
    /// to lean on the host: 0 spins, 1 yields, n sleeps n-1 milliseconds.
    pub fn run(&mut self) -> Result<()> {
        let [cycle, _, frame] = self.timers;
        self.clock.start(cycle)?;
        self.clock.start(frame)?;
        loop {
            self.service_pause();
            if self.clock.is_paused() {
                thread::sleep(Duration::from_millis(1));
                continue;
            }
            if let Err(e) = self.tick() {
                self.sound.stop_tone();
                return Err(e);
            }
            self.relief();
        }
    }

    /// One scheduler pass: stamps the tick time, then fires every due
    /// timer in registration order, up to the clock's per-pass budget.
    pub fn tick(&mut self) -> Result<()> {
        self.clock.begin_tick();
        for handle in self.timers {
            while self.clock.consume(handle) {
                match self.clock.task(handle) {
                    TimerTask::CpuCycle => {
                        self.cpu.cycle(
                            &mut self.mem,
                            &mut self.clock,
                            &self.screen,
                            &self.keys,
                            &mut *self.sound,
                        )?;
                    }
                    TimerTask::TimerDecay => self.cpu.decay(&mut self.clock, &mut *self.sound),
                    TimerTask::FrameSignal => {
                        self.screen.set_ips(self.cpu.ips());
                        self.screen.trigger();
                    }
                }
            }
        }
        Ok(())
    }

    /// Engages or releases the clock-level pause when the gate asks.
    /// Pausing silences the tone; resuming restores it if the sound
    /// register still has time on it.
    fn service_pause(&mut self) {
        if self.pause.want.load(Ordering::Relaxed) {
            if !self.clock.is_paused() {
                self.clock.pause();
                self.sound.stop_tone();
                self.pause.engaged.store(true, Ordering::Relaxed);
            }
        } else if self.clock.is_paused() {
            self.clock.resume();
            if self.cpu.regs.sound > 0 {
                self.sound.play_tone();
            }
            self.pause.engaged.store(false, Ordering::Relaxed);
        }
    }

    fn relief(&self) {
        match self.perf_level {
            0 => std::hint::spin_loop(),
            1 => thread::yield_now(),
            n => thread::sleep(Duration::from_millis(n as u64 - 1)),
        }
    }
}

/// Common imports for cheep
pub mod prelude {
    pub use super::{Chip8, PauseGate};
    use super::*;
    pub use cfg::{Config, SCREEN_HEIGHT, SCREEN_WIDTH};
    pub use clock::{Clock, TimerHandle, TimerTask};
    pub use cpu::{insn::Insn, regs::Registers, Adr, Nib, Reg, CPU};
    pub use error::{Error, Result};
    pub use io::{identify_key, Beeper, Input, Mute, SharedKeys, Sound};
    pub use mem::{Mem, FONT};
    pub use screen::{Palette, Screen, Stats, FRAME_HEIGHT, FRAME_WIDTH};
}
