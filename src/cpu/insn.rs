// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Contains the definition of a Chip-8 [Insn], and the decoder that turns
//! a fetched word into one

use super::*;
use crate::error::{Error, Result};
use std::fmt::Display;

#[allow(non_camel_case_types, non_snake_case, missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// One decoded instruction
pub enum Insn {
    /// | 0aaa | Machine-code call, accepted and ignored
    nop { A: u16 },
    /// | 00e0 | Clear screen memory to 0s
    cls,
    /// | 00ee | Return from subroutine
    ret,
    /// | 1aaa | Jumps to an absolute address
    jmp { A: u16 },
    /// | 2aaa | Pushes pc onto the stack, then jumps to a
    call { A: u16 },
    /// | 3xbb | Skips next instruction if register X == b
    seb { B: u8, x: usize },
    /// | 4xbb | Skips next instruction if register X != b
    sneb { B: u8, x: usize },
    /// | 5xy0 | Skip next instruction if vX == vY
    se { y: usize, x: usize },
    /// | 6xbb | Loads immediate byte b into register vX
    movb { B: u8, x: usize },
    /// | 7xbb | Adds immediate byte b to register vX
    addb { B: u8, x: usize },
    /// | 8xy0 | Loads the value of y into x
    mov { x: usize, y: usize },
    /// | 8xy1 | Performs bitwise or of vX and vY, and stores the result in vX
    or { y: usize, x: usize },
    /// | 8xy2 | Performs bitwise and of vX and vY, and stores the result in vX
    and { y: usize, x: usize },
    /// | 8xy3 | Performs bitwise xor of vX and vY, and stores the result in vX
    xor { y: usize, x: usize },
    /// | 8xy4 | Performs addition of vX and vY, and stores the result in vX
    add { y: usize, x: usize },
    /// | 8xy5 | Performs subtraction of vX and vY, and stores the result in vX
    sub { y: usize, x: usize },
    /// | 8xy6 | Performs bitwise right shift of vX
    shr { y: usize, x: usize },
    /// | 8xy7 | Performs subtraction of vY and vX, and stores the result in vX
    bsub { y: usize, x: usize },
    /// | 8xyE | Performs bitwise left shift of vX
    shl { y: usize, x: usize },
    /// | 9xy0 | Skip next instruction if vX != vY
    sne { y: usize, x: usize },
    /// | Aaaa | Load address #a into register I
    movI { A: u16 },
    /// | Baaa | Jump to &adr + v0
    jmpr { A: u16 },
    /// | Cxbb | Stores a random number & the provided byte into vX
    rand { B: u8, x: usize },
    /// | Dxyn | Draws n-byte sprite to the screen at coordinates (vX, vY)
    draw { y: usize, x: usize, n: u8 },
    /// | eX9e | Skip next instruction if key == vX
    sek { x: usize },
    /// | eXa1 | Skip next instruction if key != vX
    snek { x: usize },
    /// | fX07 | Set vX to value in delay timer
    getdt { x: usize },
    /// | fX0a | Wait for input, store key in vX
    waitk { x: usize },
    /// | fX15 | Set delay timer to the value in vX
    setdt { x: usize },
    /// | fX18 | Set sound timer to the value in vX
    movst { x: usize },
    /// | fX1e | Add vX to I
    addI { x: usize },
    /// | fX29 | Load sprite for character vX into I
    font { x: usize },
    /// | fX33 | BCD convert vX into I[0..3]
    bcd { x: usize },
    /// | fX55 | DMA Stor from I to registers 0..X
    dmao { x: usize },
    /// | fX65 | DMA Load from I to registers 0..X
    dmai { x: usize },
}

impl Insn {
    /// Decodes one big-endian word.
    ///
    /// The dispatch is a two-level match: top nibble first, then the
    /// discriminating field for groups 0, 8, e, and f. Anything that falls
    /// through is an [Error::InvalidOpCode], including 5xyn and 9xyn words
    /// with a nonzero low nibble.
    ///
    /// # Examples
    /// ```rust
    /// # use cheep::prelude::*;
    /// assert_eq!(Insn::decode(0x8124).unwrap(), Insn::add { y: 2, x: 1 });
    /// assert!(Insn::decode(0x8ffa).is_err());
    /// ```
    #[allow(non_snake_case)]
    pub fn decode(word: u16) -> Result<Insn> {
        let (x, y) = ((word >> 8 & 0xf) as Reg, (word >> 4 & 0xf) as Reg);
        let A = word & 0x0fff;
        let B = (word & 0xff) as u8;
        let n = (word & 0xf) as Nib;
        Ok(match word >> 12 {
            0x0 => match word {
                0x00e0 => Insn::cls,
                0x00ee => Insn::ret,
                _ => Insn::nop { A },
            },
            0x1 => Insn::jmp { A },
            0x2 => Insn::call { A },
            0x3 => Insn::seb { B, x },
            0x4 => Insn::sneb { B, x },
            0x5 if n == 0 => Insn::se { y, x },
            0x6 => Insn::movb { B, x },
            0x7 => Insn::addb { B, x },
            0x8 => match n {
                0x0 => Insn::mov { x, y },
                0x1 => Insn::or { y, x },
                0x2 => Insn::and { y, x },
                0x3 => Insn::xor { y, x },
                0x4 => Insn::add { y, x },
                0x5 => Insn::sub { y, x },
                0x6 => Insn::shr { y, x },
                0x7 => Insn::bsub { y, x },
                0xe => Insn::shl { y, x },
                _ => return Err(Error::InvalidOpCode { word }),
            },
            0x9 if n == 0 => Insn::sne { y, x },
            0xa => Insn::movI { A },
            0xb => Insn::jmpr { A },
            0xc => Insn::rand { B, x },
            0xd => Insn::draw { y, x, n },
            0xe => match B {
                0x9e => Insn::sek { x },
                0xa1 => Insn::snek { x },
                _ => return Err(Error::InvalidOpCode { word }),
            },
            0xf => match B {
                0x07 => Insn::getdt { x },
                0x0a => Insn::waitk { x },
                0x15 => Insn::setdt { x },
                0x18 => Insn::movst { x },
                0x1e => Insn::addI { x },
                0x29 => Insn::font { x },
                0x33 => Insn::bcd { x },
                0x55 => Insn::dmao { x },
                0x65 => Insn::dmai { x },
                _ => return Err(Error::InvalidOpCode { word }),
            },
            _ => return Err(Error::InvalidOpCode { word }),
        })
    }
}

impl Display for Insn {
    #[rustfmt::skip]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Insn::nop { A }         => write!(f, "nop    {A:03x}"),
            Insn::cls               => write!(f, "cls    "),
            Insn::ret               => write!(f, "ret    "),
            Insn::jmp { A }         => write!(f, "jmp    {A:03x}"),
            Insn::call { A }        => write!(f, "call   {A:03x}"),
            Insn::seb { B, x }      => write!(f, "se     #{B:02x}, v{x:X}"),
            Insn::sneb { B, x }     => write!(f, "sne    #{B:02x}, v{x:X}"),
            Insn::se { y, x }       => write!(f, "se     v{y:X}, v{x:X}"),
            Insn::movb { B, x }     => write!(f, "mov    #{B:02x}, v{x:X}"),
            Insn::addb { B, x }     => write!(f, "add    #{B:02x}, v{x:X}"),
            Insn::mov { x, y }      => write!(f, "mov    v{y:X}, v{x:X}"),
            Insn::or { y, x }       => write!(f, "or     v{y:X}, v{x:X}"),
            Insn::and { y, x }      => write!(f, "and    v{y:X}, v{x:X}"),
            Insn::xor { y, x }      => write!(f, "xor    v{y:X}, v{x:X}"),
            Insn::add { y, x }      => write!(f, "add    v{y:X}, v{x:X}"),
            Insn::sub { y, x }      => write!(f, "sub    v{y:X}, v{x:X}"),
            Insn::shr { y, x }      => write!(f, "shr    v{y:X}, v{x:X}"),
            Insn::bsub { y, x }     => write!(f, "bsub   v{y:X}, v{x:X}"),
            Insn::shl { y, x }      => write!(f, "shl    v{y:X}, v{x:X}"),
            Insn::sne { y, x }      => write!(f, "sne    v{y:X}, v{x:X}"),
            Insn::movI { A }        => write!(f, "mov    ${A:03x}, I"),
            Insn::jmpr { A }        => write!(f, "jmp    ${A:03x}+v0"),
            Insn::rand { B, x }     => write!(f, "rand   #{B:02x}, v{x:X}"),
            Insn::draw { y, x, n }  => write!(f, "draw   #{n:x}, v{x:X}, v{y:X}"),
            Insn::sek { x }         => write!(f, "sek    v{x:X}"),
            Insn::snek { x }        => write!(f, "snek   v{x:X}"),
            Insn::getdt { x }       => write!(f, "mov    DT, v{x:X}"),
            Insn::waitk { x }       => write!(f, "waitk  v{x:X}"),
            Insn::setdt { x }       => write!(f, "mov    v{x:X}, DT"),
            Insn::movst { x }       => write!(f, "mov    v{x:X}, ST"),
            Insn::addI { x }        => write!(f, "add    v{x:X}, I"),
            Insn::font { x }        => write!(f, "font   v{x:X}, I"),
            Insn::bcd { x }         => write!(f, "bcd    v{x:X}, &I"),
            Insn::dmao { x }        => write!(f, "dmao   v{x:X}"),
            Insn::dmai { x }        => write!(f, "dmai   v{x:X}"),
        }
    }
}
