// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Machine description: memory geometry, clock rates, screen shape

/// Nanoseconds per second
pub const ONE_BILLION: u64 = 1_000_000_000;

/// Period of the 60Hz delay/sound decay tick, in nanoseconds
pub const SIXTY_HZ_TICK_NS: u64 = ONE_BILLION / 60;

/// Stack pointer value when the call stack holds nothing
pub const STACK_EMPTY: u8 = 0xFF;

/// Emulated screen width in cells
pub const SCREEN_WIDTH: usize = 64;
/// Emulated screen height in cells
pub const SCREEN_HEIGHT: usize = 32;

/// Tunable parameters of the virtual machine.
///
/// [Config::default] describes the stock machine: 4k of memory, a 24-entry
/// call stack, roms loaded at `0x200`, a 1MHz core and a 60Hz frame signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Core clock rate in instructions per second
    pub cpu_hz: u64,
    /// Screen refresh signal rate in frames per second
    pub frame_rate: u64,
    /// Bytes of addressable memory
    pub mem_size: usize,
    /// Call stack depth in return addresses, `1..=255`
    pub stack_size: usize,
    /// Address roms are loaded at, and the reset value of the program counter
    pub load_addr: u16,
    /// Scheduler politeness: 0 spins, 1 yields, n sleeps n-1 ms between wakes
    pub perf_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cpu_hz: 1_000_000,
            frame_rate: 60,
            mem_size: 0x1000,
            stack_size: 24,
            load_addr: 0x200,
            perf_level: 1,
        }
    }
}

impl Config {
    /// Core clock period in nanoseconds. Zero if `cpu_hz` is out of range,
    /// which the scheduler rejects when the timer is configured.
    pub fn cpu_tick_ns(&self) -> u64 {
        ONE_BILLION.checked_div(self.cpu_hz).unwrap_or(0)
    }

    /// Frame signal period in nanoseconds. Zero if `frame_rate` is out of
    /// range, which the scheduler rejects when the timer is configured.
    pub fn frame_tick_ns(&self) -> u64 {
        ONE_BILLION.checked_div(self.frame_rate).unwrap_or(0)
    }
}
