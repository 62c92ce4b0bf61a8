// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Error type for Cheep
//!
//! Traps raised by the CPU surface here as ordinary [Err] values, so the
//! machine loop can stop cleanly instead of wedging the core.

use thiserror::Error;

/// Result type, equivalent to [std::result::Result]<T, [enum@Error]>
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Cheep.
#[derive(Debug, Error)]
pub enum Error {
    /// Pushed a return address onto a full call stack
    #[error("stack overflow: no room to push {addr:03x}")]
    StackOverflow {
        /// The return address that could not be pushed
        addr: u16,
    },
    /// Popped a return address off an empty call stack
    #[error("stack underflow: nothing to return to")]
    StackUnderflow,
    /// Decoded a word with no matching operation
    #[error("opcode {word:04x} not recognized")]
    InvalidOpCode {
        /// The offending word
        word: u16,
    },
    /// The program counter left addressable memory
    #[error("program counter {pc:03x} out of bounds")]
    ProgramCounterOutOfBounds {
        /// Where the program counter would have pointed
        pc: u16,
    },
    /// A load or store touched memory that isn't there
    #[error("memory access {addr:03x}+{len} out of bounds")]
    MemoryAccessOutOfBounds {
        /// First address of the access
        addr: u16,
        /// Length of the access in bytes
        len: u16,
    },
    /// Tried to load a rom program space cannot hold
    #[error("rom is {size} bytes, program space is {cap}")]
    RomTooBig {
        /// Size of the rom on disk
        size: usize,
        /// Bytes of memory past the load address
        cap: usize,
    },
    /// Tried to configure a cyclic timer that would fire constantly
    #[error("cyclic timer configured with zero period")]
    ZeroPeriodTimer,
    /// Tried to configure a call stack the stack pointer cannot walk
    #[error("call stack depth {size} is outside 1..=255")]
    InvalidStackSize {
        /// The configured stack depth
        size: usize,
    },
    /// Error originated in [std::io]
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    /// Error originated in [minifb]
    #[error(transparent)]
    MinifbError(#[from] minifb::Error),
}
