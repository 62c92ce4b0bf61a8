// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Fetches, decodes, and executes instructions
//!
//! [CPU::cycle] runs one fetch-decode-execute step against the machine
//! context it is handed: memory, clock, screen, keypad, and speaker. Traps
//! come back as [Err] and leave the CPU state exactly as the faulting
//! instruction left it.
//!
//! Two instructions span more than one cycle. Draw holds the program
//! counter until the frame deadline it captured on first contact passes,
//! and the key wait holds it until a key has been pressed and released.
//! Both keep their progress in the CPU so a paused and resumed machine
//! picks up mid-instruction without losing its place.


pub mod insn;
pub mod regs;

pub use self::{insn::Insn, regs::Registers};

use crate::{
    cfg::Config,
    clock::{Clock, TimerHandle},
    error::{Error, Result},
    io::{Input, Sound, NUM_KEYS},
    mem::Mem,
    screen::Screen,
};
use rand::random;

/// Represents a register in the CPU
pub type Reg = usize;
/// Represents an address in memory
pub type Adr = u16;
/// Represents a nibble
pub type Nib = u8;

/// Where a draw instruction is in its frame-synchronized run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum DrawPhase {
    /// No draw in progress
    #[default]
    Idle,
    /// Holding the pc until the captured frame deadline passes
    Waiting { deadline: u64 },
    /// Deadline passed; blit on the next cycle
    Ready,
}

/// Where a key wait is in its press-then-release handshake.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum KeyWait {
    /// Scanning the pad for a press
    #[default]
    Press,
    /// Holding until the recorded key goes up again
    Release { key: usize },
}

/// The interpreter core: register file, multi-cycle instruction state, and
/// the throughput counter.
#[derive(Clone, Debug)]
pub struct CPU {
    /// The register file
    pub regs: Registers,
    /// Timer the 60Hz delay/sound decay service runs on
    decay_timer: TimerHandle,
    /// Timer draw synchronizes against
    frame_timer: TimerHandle,
    draw: DrawPhase,
    waitk: KeyWait,
    /// Cycles since the key wait last polled the pad
    poll_cntr: u64,
    /// Cycles between pad polls while waiting for a key
    poll_period: u64,
    /// Instructions retired since the last measurement window closed
    insn_cntr: u64,
    /// Window size for the throughput measurement, one emulated second
    ips_window: u64,
    saved_time: u64,
    ips: f64,
}

impl CPU {
    /// Builds a CPU with its program counter at the configured load
    /// address. The handles tie instructions to the machine's timers:
    /// setting a countdown register arms `decay_timer`, and draw paces
    /// itself against `frame_timer`.
    ///
    /// # Examples
    /// ```rust
    /// # use cheep::prelude::*;
    /// let conf = Config::default();
    /// let mut clock = Clock::manual(1000);
    /// let decay = clock.register(TimerTask::TimerDecay);
    /// let frame = clock.register(TimerTask::FrameSignal);
    /// let cpu = CPU::new(&conf, decay, frame);
    /// assert_eq!(cpu.regs.pc, 0x200);
    /// ```
    pub fn new(conf: &Config, decay_timer: TimerHandle, frame_timer: TimerHandle) -> Self {
        CPU {
            regs: Registers::new(conf.load_addr),
            decay_timer,
            frame_timer,
            draw: DrawPhase::Idle,
            waitk: KeyWait::Press,
            poll_cntr: 0,
            poll_period: (conf.cpu_hz / 100).max(1),
            insn_cntr: 0,
            ips_window: conf.cpu_hz.max(1),
            saved_time: 0,
            ips: 0.0,
        }
    }

    /// Instructions retired per second, measured over the last window.
    pub fn ips(&self) -> f64 {
        self.ips
    }

    /// Runs one core cycle: fetch at pc, decode, execute, advance.
    ///
    /// Instructions that jump, or that are still mid-run, raise the jump
    /// flag to suppress the advance; everything else moves pc past the
    /// two-byte word plus whatever extra operand bytes the instruction
    /// reported. An advance that would leave memory is a
    /// [Error::ProgramCounterOutOfBounds] trap.
    pub fn cycle(
        &mut self,
        mem: &mut Mem,
        clock: &mut Clock,
        screen: &Screen,
        input: &dyn Input,
        sound: &mut dyn Sound,
    ) -> Result<()> {
        self.insn_cntr += 1;
        if self.insn_cntr == self.ips_window {
            let now = clock.now();
            let elapsed = (now - self.saved_time) as f64 / 1e9;
            self.ips = self.insn_cntr as f64 / elapsed.max(f64::EPSILON);
            self.saved_time = now;
            self.insn_cntr = 0;
        }

        let word = mem.fetch(self.regs.pc)?;
        let insn = Insn::decode(word)?;
        let extra = self.execute(insn, mem, clock, screen, input, sound)?;

        if !self.regs.jump {
            let next = self.regs.pc as usize + 2 + extra as usize;
            if next < mem.len() {
                self.regs.pc = next as Adr;
            } else {
                return Err(Error::ProgramCounterOutOfBounds {
                    pc: next.min(u16::MAX as usize) as u16,
                });
            }
        }
        self.regs.jump = false;
        Ok(())
    }

    /// One 60Hz step of the delay and sound countdowns. Silences the tone
    /// when sound reaches zero, and lets the decay timer rest once both
    /// registers are spent.
    pub fn decay(&mut self, clock: &mut Clock, sound: &mut dyn Sound) {
        if self.regs.delay > 0 {
            self.regs.delay -= 1;
        }
        if self.regs.sound > 0 {
            self.regs.sound -= 1;
            if self.regs.sound == 0 {
                sound.stop_tone();
            }
        }
        if self.regs.delay == 0 && self.regs.sound == 0 {
            clock.stop(self.decay_timer);
        }
    }

    /// Dispatches one decoded [Insn], returning the number of extra
    /// operand bytes it consumed beyond the opcode word. Every base
    /// instruction reports zero; the advance logic supports more so wide
    /// operands stay representable.
    #[rustfmt::skip]
    fn execute(
        &mut self,
        insn: Insn,
        mem: &mut Mem,
        clock: &mut Clock,
        screen: &Screen,
        input: &dyn Input,
        sound: &mut dyn Sound,
    ) -> Result<u8> {
        match insn {
            Insn::nop   {    .. } => (),
            Insn::cls             => screen.clear(),
            Insn::ret             => self.ret(mem)?,
            Insn::jmp   {       A } => self.jump(A),
            Insn::call  {       A } => self.call(A, mem)?,
            Insn::seb   {    B, x } => self.skip_equals_immediate(x, B),
            Insn::sneb  {    B, x } => self.skip_not_equals_immediate(x, B),
            Insn::se    { y, x    } => self.skip_equals(x, y),
            Insn::movb  {    B, x } => self.load_immediate(x, B),
            Insn::addb  {    B, x } => self.add_immediate(x, B),
            Insn::mov   { x, y    } => self.load(x, y),
            Insn::or    { y, x    } => self.or(x, y),
            Insn::and   { y, x    } => self.and(x, y),
            Insn::xor   { y, x    } => self.xor(x, y),
            Insn::add   { y, x    } => self.add(x, y),
            Insn::sub   { y, x    } => self.sub(x, y),
            Insn::shr   { y, x    } => self.shift_right(x, y),
            Insn::bsub  { y, x    } => self.backwards_sub(x, y),
            Insn::shl   { y, x    } => self.shift_left(x, y),
            Insn::sne   { y, x    } => self.skip_not_equals(x, y),
            Insn::movI  {       A } => self.load_i_immediate(A),
            Insn::jmpr  {       A } => self.jump_indexed(A),
            Insn::rand  {    B, x } => self.rand(x, B),
            Insn::draw  { y, x, n } => self.draw(x, y, n, mem, screen, clock)?,
            Insn::sek   {    x    } => self.skip_key_equals(x, input),
            Insn::snek  {    x    } => self.skip_key_not_equals(x, input),
            Insn::getdt {    x    } => self.load_delay_timer(x),
            Insn::waitk {    x    } => self.wait_for_key(x, input, sound),
            Insn::setdt {    x    } => self.store_delay_timer(x, clock)?,
            Insn::movst {    x    } => self.store_sound_timer(x, clock, sound)?,
            Insn::addI  {    x    } => self.add_i(x),
            Insn::font  {    x    } => self.load_sprite(x),
            Insn::bcd   {    x    } => self.bcd_convert(x, mem)?,
            Insn::dmao  {    x    } => self.store_dma(x, mem)?,
            Insn::dmai  {    x    } => self.load_dma(x, mem)?,
        }
        Ok(0)
    }
}

/// |`00ee`| Returns from subroutine
impl CPU {
    /// |`00ee`| Returns from subroutine
    ///
    /// The call pushed the caller's pc, so the popped address points at the
    /// call itself and the automatic advance steps past it.
    #[inline(always)]
    fn ret(&mut self, mem: &mut Mem) -> Result<()> {
        self.regs.pc = mem.pop(&mut self.regs)?;
        Ok(())
    }
}

/// |`1aaa`| Jumps to an absolute address
impl CPU {
    /// |`1aaa`| Jumps to an absolute address
    #[inline(always)]
    fn jump(&mut self, a: Adr) {
        self.regs.pc = a;
        self.regs.jump = true;
    }
}

/// |`2aaa`| Pushes pc onto the stack, then jumps to a
impl CPU {
    /// |`2aaa`| Pushes pc onto the stack, then jumps to a
    #[inline(always)]
    fn call(&mut self, a: Adr, mem: &mut Mem) -> Result<()> {
        let pc = self.regs.pc;
        mem.push(&mut self.regs, pc)?;
        self.regs.pc = a;
        self.regs.jump = true;
        Ok(())
    }
}

/// |`nxbb`| Performs a register-immediate comparison
///
/// |opcode| effect                             |
/// |------|------------------------------------|
/// |`3xbb`| Skip next instruction if vX == b   |
/// |`4xbb`| Skip next instruction if vX != b   |
impl CPU {
    /// |`3xbb`| Skips the next instruction if register X == b
    #[inline(always)]
    fn skip_equals_immediate(&mut self, x: Reg, b: u8) {
        if self.regs.v[x] == b {
            self.regs.pc = self.regs.pc.saturating_add(2);
        }
    }
    /// |`4xbb`| Skips the next instruction if register X != b
    #[inline(always)]
    fn skip_not_equals_immediate(&mut self, x: Reg, b: u8) {
        if self.regs.v[x] != b {
            self.regs.pc = self.regs.pc.saturating_add(2);
        }
    }
}

/// |`nxyn`| Performs a register-register comparison
///
/// |opcode| effect                             |
/// |------|------------------------------------|
/// |`5XY0`| Skip next instruction if vX == vY  |
/// |`9XY0`| Skip next instruction if vX != vY  |
impl CPU {
    /// |`5xy0`| Skips the next instruction if register X == register Y
    #[inline(always)]
    fn skip_equals(&mut self, x: Reg, y: Reg) {
        if self.regs.v[x] == self.regs.v[y] {
            self.regs.pc = self.regs.pc.saturating_add(2);
        }
    }
    /// |`9xy0`| Skips the next instruction if register X != register Y
    #[inline(always)]
    fn skip_not_equals(&mut self, x: Reg, y: Reg) {
        if self.regs.v[x] != self.regs.v[y] {
            self.regs.pc = self.regs.pc.saturating_add(2);
        }
    }
}

/// |`6xbb`| Loads immediate byte b into register vX
impl CPU {
    /// |`6xbb`| Loads immediate byte b into register vX
    #[inline(always)]
    fn load_immediate(&mut self, x: Reg, b: u8) {
        self.regs.v[x] = b;
    }
}

/// |`7xbb`| Adds immediate byte b to register vX
impl CPU {
    /// |`7xbb`| Adds immediate byte b to register vX, without a carry flag
    #[inline(always)]
    fn add_immediate(&mut self, x: Reg, b: u8) {
        self.regs.v[x] = self.regs.v[x].wrapping_add(b);
    }
}

/// |`8xyn`| Performs ALU operation
///
/// |opcode| effect                             |
/// |------|------------------------------------|
/// |`8xy0`| X = Y                              |
/// |`8xy1`| X = X | Y                          |
/// |`8xy2`| X = X & Y                          |
/// |`8xy3`| X = X ^ Y                          |
/// |`8xy4`| X = X + Y; vF = carry              |
/// |`8xy5`| X = X - Y; vF = no borrow          |
/// |`8xy6`| X = X >> 1; vF = bit shifted out   |
/// |`8xy7`| X = Y - X; vF = no borrow          |
/// |`8xyE`| X = X << 1; vF = bit shifted out   |
///
/// The flag register is written before the result, with both operands
/// read up front. When X is vF itself, the result wins.
impl CPU {
    /// |`8xy0`| Loads the value of y into x
    #[inline(always)]
    fn load(&mut self, x: Reg, y: Reg) {
        self.regs.v[x] = self.regs.v[y];
    }
    /// |`8xy1`| Performs bitwise or of vX and vY, and stores the result in vX
    #[inline(always)]
    fn or(&mut self, x: Reg, y: Reg) {
        self.regs.v[x] |= self.regs.v[y];
    }
    /// |`8xy2`| Performs bitwise and of vX and vY, and stores the result in vX
    #[inline(always)]
    fn and(&mut self, x: Reg, y: Reg) {
        self.regs.v[x] &= self.regs.v[y];
    }
    /// |`8xy3`| Performs bitwise xor of vX and vY, and stores the result in vX
    #[inline(always)]
    fn xor(&mut self, x: Reg, y: Reg) {
        self.regs.v[x] ^= self.regs.v[y];
    }
    /// |`8xy4`| Performs addition of vX and vY, and stores the result in vX
    #[inline(always)]
    fn add(&mut self, x: Reg, y: Reg) {
        let (vx, vy) = (self.regs.v[x], self.regs.v[y]);
        let sum = vx as u16 + vy as u16;
        self.regs.v[0xf] = (sum > 0xff) as u8;
        self.regs.v[x] = sum as u8;
    }
    /// |`8xy5`| Performs subtraction of vX and vY, and stores the result in vX
    #[inline(always)]
    fn sub(&mut self, x: Reg, y: Reg) {
        let (vx, vy) = (self.regs.v[x], self.regs.v[y]);
        self.regs.v[0xf] = (vx > vy) as u8;
        self.regs.v[x] = vx.wrapping_sub(vy);
    }
    /// |`8xy6`| Performs bitwise right shift of vX
    #[inline(always)]
    fn shift_right(&mut self, x: Reg, _y: Reg) {
        let vx = self.regs.v[x];
        self.regs.v[0xf] = vx & 1;
        self.regs.v[x] = vx >> 1;
    }
    /// |`8xy7`| Performs subtraction of vY and vX, and stores the result in vX
    #[inline(always)]
    fn backwards_sub(&mut self, x: Reg, y: Reg) {
        let (vx, vy) = (self.regs.v[x], self.regs.v[y]);
        self.regs.v[0xf] = (vy > vx) as u8;
        self.regs.v[x] = vy.wrapping_sub(vx);
    }
    /// |`8xyE`| Performs bitwise left shift of vX
    #[inline(always)]
    fn shift_left(&mut self, x: Reg, _y: Reg) {
        let vx = self.regs.v[x];
        self.regs.v[0xf] = vx >> 7;
        self.regs.v[x] = vx << 1;
    }
}

/// |`Aaaa`| Load address #a into register I
impl CPU {
    /// |`Aadr`| Load address #adr into register I
    #[inline(always)]
    fn load_i_immediate(&mut self, a: Adr) {
        self.regs.i = a;
    }
}

/// |`Baaa`| Jump to &adr + v0
impl CPU {
    /// |`Badr`| Jump to &adr + v0
    ///
    /// The landing address is only checked by the next fetch, so a jump
    /// past the end of memory traps there.
    #[inline(always)]
    fn jump_indexed(&mut self, a: Adr) {
        self.regs.pc = a.wrapping_add(self.regs.v[0] as Adr);
        self.regs.jump = true;
    }
}

/// |`Cxbb`| Stores a random number & the provided byte into vX
impl CPU {
    /// |`Cxbb`| Stores a random number & the provided byte into vX
    #[inline(always)]
    fn rand(&mut self, x: Reg, b: u8) {
        self.regs.v[x] = random::<u8>() & b;
    }
}

/// |`Dxyn`| Draws n-byte sprite to the screen at coordinates (vX, vY)
impl CPU {
    /// |`Dxyn`| Draws n-byte sprite to the screen at coordinates (vX, vY)
    ///
    /// Runs in three phases across as many cycles as it takes: capture the
    /// next frame deadline, hold the pc until the clock passes it, then
    /// blit one cycle later. Coordinates wrap into the grid; the sprite
    /// itself clips at the edges. vF reports whether the blit erased
    /// anything.
    fn draw(&mut self, x: Reg, y: Reg, n: Nib, mem: &Mem, screen: &Screen, clock: &Clock) -> Result<()> {
        match self.draw {
            DrawPhase::Idle => {
                self.draw = DrawPhase::Waiting {
                    deadline: clock.next_deadline(self.frame_timer),
                };
                self.regs.jump = true;
            }
            DrawPhase::Waiting { deadline } => {
                if clock.current_tick_time() >= deadline {
                    self.draw = DrawPhase::Ready;
                }
                self.regs.jump = true;
            }
            DrawPhase::Ready => {
                self.draw = DrawPhase::Idle;
                let (vx, vy) = (self.regs.v[x] as usize & 0x3f, self.regs.v[y] as usize & 0x1f);
                let sprite = mem.read_block(self.regs.i, n as u16)?;
                let erased = screen.draw_sprite(vx, vy, sprite);
                self.regs.v[0xf] = erased.into();
            }
        }
        Ok(())
    }
}

/// |`eXnn`| Skips by key state
///
/// |opcode| effect                             |
/// |------|------------------------------------|
/// |`eX9e`| Skip next instruction if key vX is pressed |
/// |`eXa1`| Skip next instruction if key vX is not pressed |
impl CPU {
    /// |`eX9e`| Skips the next instruction if key vX is pressed
    #[inline(always)]
    fn skip_key_equals(&mut self, x: Reg, input: &dyn Input) {
        if input.is_key_pressed(self.regs.v[x] as usize & 0xf) {
            self.regs.pc = self.regs.pc.saturating_add(2);
        }
    }
    /// |`eXa1`| Skips the next instruction if key vX is not pressed
    #[inline(always)]
    fn skip_key_not_equals(&mut self, x: Reg, input: &dyn Input) {
        if !input.is_key_pressed(self.regs.v[x] as usize & 0xf) {
            self.regs.pc = self.regs.pc.saturating_add(2);
        }
    }
}

/// |`fX07`| Set vX to value in delay timer
impl CPU {
    /// |`fX07`| Set vX to value in delay timer
    #[inline(always)]
    fn load_delay_timer(&mut self, x: Reg) {
        self.regs.v[x] = self.regs.delay;
    }
}

/// |`fX0a`| Wait for input, store key in vX
impl CPU {
    /// |`fX0a`| Waits for a key press and release, storing the key in vX
    ///
    /// Spins in place, polling the pad at 100Hz worth of cycles. A press
    /// records the key (the highest-numbered one wins a tie) and starts
    /// the cue tone; the instruction completes, and the tone stops, once
    /// that key is released.
    fn wait_for_key(&mut self, x: Reg, input: &dyn Input, sound: &mut dyn Sound) {
        self.poll_cntr += 1;
        if self.poll_cntr >= self.poll_period {
            self.poll_cntr = 0;
            match self.waitk {
                KeyWait::Press => {
                    let mut pressed = None;
                    for key in 0..NUM_KEYS {
                        if input.is_key_pressed(key) {
                            pressed = Some(key);
                        }
                    }
                    if let Some(key) = pressed {
                        self.regs.v[x] = key as u8;
                        sound.play_tone();
                        self.waitk = KeyWait::Release { key };
                    }
                }
                KeyWait::Release { key } => {
                    if !input.is_key_pressed(key) {
                        sound.stop_tone();
                        self.waitk = KeyWait::Press;
                        return;
                    }
                }
            }
        }
        self.regs.jump = true;
    }
}

/// |`fXnn`| Sets the countdown registers
///
/// |opcode| effect                             |
/// |------|------------------------------------|
/// |`fX15`| Set delay timer to vX              |
/// |`fX18`| Set sound timer to vX              |
///
/// Writing a nonzero value wakes the decay timer if it was resting.
impl CPU {
    /// |`fX15`| Set delay timer to the value in vX
    fn store_delay_timer(&mut self, x: Reg, clock: &mut Clock) -> Result<()> {
        self.regs.delay = self.regs.v[x];
        self.wake_decay_timer(clock)
    }
    /// |`fX18`| Set sound timer to the value in vX, driving the tone
    /// on zero crossings
    fn store_sound_timer(&mut self, x: Reg, clock: &mut Clock, sound: &mut dyn Sound) -> Result<()> {
        let was = self.regs.sound;
        self.regs.sound = self.regs.v[x];
        if was == 0 && self.regs.sound > 0 {
            sound.play_tone();
        } else if was > 0 && self.regs.sound == 0 {
            sound.stop_tone();
        }
        self.wake_decay_timer(clock)
    }
    /// Arms the decay timer when either countdown register has work.
    /// An already running timer is left alone so its phase holds.
    fn wake_decay_timer(&mut self, clock: &mut Clock) -> Result<()> {
        if (self.regs.delay > 0 || self.regs.sound > 0) && !clock.is_active(self.decay_timer) {
            clock.start(self.decay_timer)?;
        }
        Ok(())
    }
}

/// |`fX1e`| Add vX to I
impl CPU {
    /// |`fX1e`| Adds vX to I; vF records overflow past the address space
    #[inline(always)]
    fn add_i(&mut self, x: Reg) {
        let sum = self.regs.i as u32 + self.regs.v[x] as u32;
        self.regs.v[0xf] = (sum > 0xfff) as u8;
        self.regs.i = sum as Adr;
    }
}

/// |`fX29`| Load sprite for character vX into I
impl CPU {
    /// |`fX29`| Points I at the font glyph for the low nibble of vX
    #[inline(always)]
    fn load_sprite(&mut self, x: Reg) {
        self.regs.i = 5 * (self.regs.v[x] as Adr % 0x10);
    }
}

/// |`fX33`| BCD convert vX into I[0..3]
impl CPU {
    /// |`fX33`| Stores the hundreds, tens, and ones of vX at I, I+1, I+2
    #[inline(always)]
    fn bcd_convert(&mut self, x: Reg, mem: &mut Mem) -> Result<()> {
        let value = self.regs.v[x];
        mem.write_block(self.regs.i, &[value / 100, value / 10 % 10, value % 10])
    }
}

/// |`fXnn`| DMA between registers and memory at I
///
/// |opcode| effect                             |
/// |------|------------------------------------|
/// |`fX55`| Store v0..=vX to memory at I       |
/// |`fX65`| Load v0..=vX from memory at I      |
///
/// I itself is left where it was.
impl CPU {
    /// |`fX55`| Stores registers v0..=vX to memory starting at I
    #[inline(always)]
    fn store_dma(&mut self, x: Reg, mem: &mut Mem) -> Result<()> {
        let i = self.regs.i;
        mem.write_block(i, &self.regs.v[..=x])
    }
    /// |`fX65`| Loads registers v0..=vX from memory starting at I
    #[inline(always)]
    fn load_dma(&mut self, x: Reg, mem: &mut Mem) -> Result<()> {
        let data = mem.read_block(self.regs.i, x as u16 + 1)?;
        self.regs.v[..=x].copy_from_slice(data);
        Ok(())
    }
}
