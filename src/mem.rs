// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Memory and call stack for the machine
//!
//! [Mem] owns the flat byte array and the return-address stack. The stack
//! pointer itself lives in the CPU's [Registers]; push and pop move it so
//! the two halves stay in step. Every access is bounds checked and comes
//! back as a [Result], so a runaway rom stops the machine instead of the
//! emulator.

use crate::{
    cfg::{Config, STACK_EMPTY},
    cpu::Registers,
    error::{Error, Result},
};

/// Built-in hex glyphs, five bytes per digit, loaded at address 0.
#[rustfmt::skip]
pub const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

/// Ram and the call stack, with bounds-checked accessors.
///
/// # Examples
/// ```rust
/// # use cheep::prelude::*;
/// let mem = Mem::new(&Config::default());
/// assert_eq!(mem.len(), 0x1000);
/// // the font lives at address 0
/// assert_eq!(mem.read_block(0, 5).unwrap(), &[0xF0, 0x90, 0x90, 0x90, 0xF0]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mem {
    ram: Box<[u8]>,
    stack: Box<[u16]>,
}

impl Mem {
    /// Builds zeroed memory with the font glyphs at address 0 and an empty
    /// call stack, sized per `conf`.
    pub fn new(conf: &Config) -> Self {
        let mut ram = vec![0; conf.mem_size].into_boxed_slice();
        let glyphs = FONT.len().min(ram.len());
        ram[..glyphs].copy_from_slice(&FONT[..glyphs]);
        Mem {
            ram,
            stack: vec![0; conf.stack_size].into_boxed_slice(),
        }
    }

    /// Returns the number of bytes of addressable memory.
    pub fn len(&self) -> usize {
        self.ram.len()
    }

    /// Because clippy is so kind:
    pub fn is_empty(&self) -> bool {
        self.ram.is_empty()
    }

    /// Reads the big-endian instruction word at `pc`.
    ///
    /// Fails with [Error::ProgramCounterOutOfBounds] when either byte of the
    /// word falls outside memory, which catches jumps past the end before
    /// they decode garbage.
    pub fn fetch(&self, pc: u16) -> Result<u16> {
        match self.ram.get(pc as usize..pc as usize + 2) {
            Some(word) => Ok(u16::from_be_bytes([word[0], word[1]])),
            None => Err(Error::ProgramCounterOutOfBounds { pc }),
        }
    }

    /// Borrows `len` bytes of ram starting at `addr`.
    pub fn read_block(&self, addr: u16, len: u16) -> Result<&[u8]> {
        self.ram
            .get(addr as usize..addr as usize + len as usize)
            .ok_or(Error::MemoryAccessOutOfBounds { addr, len })
    }

    /// Copies `data` into ram starting at `addr`.
    pub fn write_block(&mut self, addr: u16, data: &[u8]) -> Result<()> {
        let len = data.len();
        self.ram
            .get_mut(addr as usize..addr as usize + len)
            .ok_or(Error::MemoryAccessOutOfBounds {
                addr,
                len: len as u16,
            })?
            .copy_from_slice(data);
        Ok(())
    }

    /// Copies `len` bytes from `src` to `dst` within ram. Overlapping spans
    /// copy as a move, so the destination sees the original bytes.
    pub fn copy(&mut self, src: u16, dst: u16, len: u16) -> Result<()> {
        let span = len as usize;
        if src as usize + span > self.ram.len() {
            return Err(Error::MemoryAccessOutOfBounds { addr: src, len });
        }
        if dst as usize + span > self.ram.len() {
            return Err(Error::MemoryAccessOutOfBounds { addr: dst, len });
        }
        self.ram
            .copy_within(src as usize..src as usize + span, dst as usize);
        Ok(())
    }

    /// Zeroes `len` bytes of ram starting at `addr`.
    pub fn clear(&mut self, addr: u16, len: u16) -> Result<()> {
        self.ram
            .get_mut(addr as usize..addr as usize + len as usize)
            .ok_or(Error::MemoryAccessOutOfBounds { addr, len })?
            .fill(0);
        Ok(())
    }

    /// Pushes a return address, moving the stack pointer up first.
    ///
    /// The stack pointer rests at [STACK_EMPTY] when nothing is stored, so
    /// the first push lands in slot 0. A full stack leaves the pointer and
    /// the slots untouched and fails with [Error::StackOverflow].
    pub fn push(&mut self, regs: &mut Registers, addr: u16) -> Result<()> {
        let next = match regs.sp {
            STACK_EMPTY => 0,
            sp => sp as usize + 1,
        };
        if next >= self.stack.len() {
            return Err(Error::StackOverflow { addr });
        }
        regs.sp = next as u8;
        self.stack[next] = addr;
        Ok(())
    }

    /// Pops the most recent return address, moving the stack pointer down.
    ///
    /// Popping slot 0 parks the pointer back at [STACK_EMPTY]. Popping an
    /// empty stack fails with [Error::StackUnderflow].
    pub fn pop(&mut self, regs: &mut Registers) -> Result<u16> {
        if regs.sp == STACK_EMPTY {
            return Err(Error::StackUnderflow);
        }
        let addr = self.stack[regs.sp as usize];
        regs.sp = match regs.sp {
            0 => STACK_EMPTY,
            sp => sp - 1,
        };
        Ok(addr)
    }

    /// Copies a rom image into ram at `addr`.
    ///
    /// A rom must be strictly smaller than the memory past the load address;
    /// anything else is rejected with [Error::RomTooBig] before a byte is
    /// written.
    pub fn load_rom(&mut self, rom: &[u8], addr: u16) -> Result<()> {
        let cap = self.ram.len().saturating_sub(addr as usize);
        if rom.len() >= cap {
            return Err(Error::RomTooBig {
                size: rom.len(),
                cap,
            });
        }
        self.write_block(addr, rom)
    }
}

impl Default for Mem {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
