// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Screen memory and the composition pipeline
//!
//! [Screen] keeps two images: the emulated cell grid the CPU draws into,
//! and the scaled-up bitmap a window can show. A worker thread started by
//! [Screen::spawn_pipeline] copies one into the other whenever the frame
//! signal fires, so composition never runs on the emulation thread. With
//! no worker attached, frame signals fall through and the grid is still
//! fully usable, which is how the tests run.
//!
//! Cells hold 0 or 0xFF. Sprite drawing is an XOR blit, clipped at the
//! right and bottom edges, reporting whether any lit cell went dark.

use crate::cfg::{SCREEN_HEIGHT, SCREEN_WIDTH};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::JoinHandle,
    time::Instant,
};

/// Host pixels per emulated cell
pub const SCALE: usize = 20;
/// Composed bitmap width in host pixels
pub const FRAME_WIDTH: usize = SCREEN_WIDTH * SCALE;
/// Composed bitmap height in host pixels
pub const FRAME_HEIGHT: usize = SCREEN_HEIGHT * SCALE;

/// Lit cell value
const ON: u8 = 0xff;

/// Colors the composition pipeline paints with, as 0RGB words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    /// Color of a lit cell
    pub fg: u32,
    /// Color of a dark cell
    pub bg: u32,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            fg: 0x0011a434,
            bg: 0x001E2431,
        }
    }
}

/// Running throughput measurements, shown in the window title.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Stats {
    /// Instructions retired per second
    pub ips: f64,
    /// Frames composed per second
    pub fps: f64,
}

/// The emulated screen: cell grid, composed bitmap, and pipeline state.
pub struct Screen {
    grid: Mutex<Box<[u8]>>,
    bitmap: Mutex<Vec<u32>>,
    palette: Palette,
    /// True while the worker is composing or a frame is queued for it
    busy: Mutex<bool>,
    kick: Condvar,
    /// Whether a pipeline worker is listening for triggers
    attached: AtomicBool,
    running: AtomicBool,
    stats: Mutex<Stats>,
}

/// Locks without propagating panics from other threads; the screen data
/// stays usable even if a holder panicked mid-frame.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Screen {
    pub fn new() -> Self {
        Screen {
            grid: Mutex::new(vec![0; SCREEN_WIDTH * SCREEN_HEIGHT].into_boxed_slice()),
            bitmap: Mutex::new(vec![Palette::default().bg; FRAME_WIDTH * FRAME_HEIGHT]),
            palette: Palette::default(),
            busy: Mutex::new(false),
            kick: Condvar::new(),
            attached: AtomicBool::new(false),
            running: AtomicBool::new(true),
            stats: Mutex::new(Stats::default()),
        }
    }

    /// XOR-blits `sprite` with its top-left corner at cell `(x, y)`,
    /// returning true if any lit cell was erased. Rows past the bottom and
    /// bits past the right edge are clipped, not wrapped. The whole sprite
    /// lands under one lock hold, so the pipeline never sees half a blit.
    pub fn draw_sprite(&self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let mut grid = lock(&self.grid);
        let mut erased = false;
        for (dy, &row) in sprite.iter().enumerate() {
            if y + dy >= SCREEN_HEIGHT {
                break;
            }
            for dx in 0..8 {
                if x + dx >= SCREEN_WIDTH {
                    break;
                }
                if row & (0x80 >> dx) == 0 {
                    continue;
                }
                let cell = &mut grid[(y + dy) * SCREEN_WIDTH + x + dx];
                erased |= *cell == ON;
                *cell ^= ON;
            }
        }
        erased
    }

    /// Darkens every cell.
    pub fn clear(&self) {
        lock(&self.grid).fill(0);
    }

    /// Copies the cell grid out, row-major.
    pub fn snapshot(&self) -> Vec<u8> {
        lock(&self.grid).to_vec()
    }

    /// Hands the current grid to the pipeline worker. Waits for the worker
    /// to finish the previous frame first, so triggers arriving faster than
    /// composition finishes slow the caller down rather than pile up. Does
    /// nothing when no worker is attached.
    pub fn trigger(&self) {
        if !self.attached.load(Ordering::Relaxed) {
            return;
        }
        let mut busy = lock(&self.busy);
        while *busy && self.running.load(Ordering::Relaxed) {
            busy = self.kick.wait(busy).unwrap_or_else(PoisonError::into_inner);
        }
        *busy = true;
        self.kick.notify_all();
    }

    /// Starts the composition worker. It sleeps between triggers, scales
    /// the grid into the bitmap when one arrives, and keeps the fps
    /// measurement while it is at it.
    pub fn spawn_pipeline(self: &Arc<Self>) -> JoinHandle<()> {
        let screen = Arc::clone(self);
        self.attached.store(true, Ordering::Relaxed);
        std::thread::spawn(move || {
            let mut frames = 0u64;
            let mut last = Instant::now();
            loop {
                {
                    let mut busy = lock(&screen.busy);
                    while !*busy && screen.running.load(Ordering::Relaxed) {
                        busy = screen
                            .kick
                            .wait(busy)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                }
                if !screen.running.load(Ordering::Relaxed) {
                    break;
                }
                screen.compose();

                frames += 1;
                if frames % 60 == 0 {
                    let elapsed = last.elapsed().as_secs_f64();
                    last = Instant::now();
                    lock(&screen.stats).fps = 60.0 / elapsed.max(f64::EPSILON);
                }

                let mut busy = lock(&screen.busy);
                *busy = false;
                screen.kick.notify_all();
            }
        })
    }

    /// Scales the cell grid into the bitmap, one [SCALE]-square block of
    /// host pixels per cell.
    fn compose(&self) {
        let grid = lock(&self.grid);
        let mut bitmap = lock(&self.bitmap);
        for (cy, row) in grid.chunks_exact(SCREEN_WIDTH).enumerate() {
            for (cx, &cell) in row.iter().enumerate() {
                let color = if cell == ON {
                    self.palette.fg
                } else {
                    self.palette.bg
                };
                for py in cy * SCALE..(cy + 1) * SCALE {
                    let line = py * FRAME_WIDTH + cx * SCALE;
                    bitmap[line..line + SCALE].fill(color);
                }
            }
        }
    }

    /// Runs `f` against the composed bitmap. The window thread uses this
    /// to push the frame out without copying it.
    pub fn with_frame<R>(&self, f: impl FnOnce(&[u32]) -> R) -> R {
        f(&lock(&self.bitmap))
    }

    /// Current throughput numbers.
    pub fn stats(&self) -> Stats {
        *lock(&self.stats)
    }

    /// Publishes the instructions-per-second measurement.
    pub fn set_ips(&self, ips: f64) {
        lock(&self.stats).ips = ips;
    }

    /// Stops the pipeline worker and unblocks any pending trigger.
    pub fn shutdown(&self) {
        {
            let _busy = lock(&self.busy);
            self.running.store(false, Ordering::Relaxed);
        }
        self.kick.notify_all();
    }
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}
