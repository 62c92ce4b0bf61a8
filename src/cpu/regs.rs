// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! The CPU's register file

use super::*;
use crate::cfg::STACK_EMPTY;

/// The register file: sixteen byte-wide `v` registers, the index register,
/// program counter, stack pointer, and the two 60Hz countdown registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Registers {
    /// General purpose registers. `v[0xF]` doubles as the flag register,
    /// so instructions that report a flag clobber it.
    pub v: [u8; 16],
    /// Index register, the memory cursor for draw and dma operations
    pub i: Adr,
    /// Program counter
    pub pc: Adr,
    /// Call stack pointer. Rests at [STACK_EMPTY] when nothing is pushed.
    pub sp: u8,
    /// Delay countdown register, stepped toward zero at 60Hz
    pub delay: u8,
    /// Sound countdown register. The tone plays while it is nonzero.
    pub sound: u8,
    /// Set by jumps and calls to suppress the automatic pc advance
    pub jump: bool,
}

impl Registers {
    /// The register file at reset: everything cleared, pc at `load_addr`,
    /// stack empty.
    pub fn new(load_addr: Adr) -> Self {
        Registers {
            v: [0; 16],
            i: 0,
            pc: load_addr,
            sp: STACK_EMPTY,
            delay: 0,
            sound: 0,
            jump: false,
        }
    }
}

impl Default for Registers {
    fn default() -> Self {
        Self::new(0x200)
    }
}
