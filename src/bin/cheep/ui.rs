// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Platform-specific IO/UI code: the window, key routing, and the title bar

use cheep::{
    error::Result,
    io::{identify_key, SharedKeys},
    screen::{Screen, FRAME_HEIGHT, FRAME_WIDTH},
    PauseGate,
};
use minifb::*;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
pub struct UIBuilder {
    pub width: usize,
    pub height: usize,
    pub name: Option<&'static str>,
    pub rate: u64,
    pub window_options: WindowOptions,
}

impl UIBuilder {
    pub fn rate(mut self, rate: u64) -> Self {
        self.rate = rate.max(1);
        self
    }
    pub fn build(&self) -> Result<UI> {
        let ui = UI {
            window: Window::new(
                self.name.unwrap_or_default(),
                self.width,
                self.height,
                self.window_options,
            )?,
            keyboard: Default::default(),
            rate: self.rate,
            ft: Instant::now(),
        };
        Ok(ui)
    }
}

impl Default for UIBuilder {
    fn default() -> Self {
        UIBuilder {
            width: FRAME_WIDTH,
            height: FRAME_HEIGHT,
            name: Some("Cheep"),
            rate: 60,
            window_options: WindowOptions {
                title: true,
                resize: false,
                scale: Scale::X1,
                scale_mode: ScaleMode::AspectRatioStretch,
                none: true,
                ..Default::default()
            },
        }
    }
}

#[derive(Debug)]
pub struct UI {
    window: Window,
    keyboard: Vec<Key>,
    rate: u64,
    ft: Instant,
}

impl UI {
    /// Sleeps out the remainder of this frame's budget.
    pub fn wait_for_next_frame(&mut self) {
        let rate = Duration::from_nanos(1_000_000_000 / self.rate + 1);
        std::thread::sleep(rate.saturating_sub(self.ft.elapsed()));
        self.ft += rate;
    }

    /// Pushes the composed frame out and repaints the title bar. Returns
    /// false once the window has closed.
    pub fn frame(&mut self, screen: &Screen, paused: bool) -> Result<bool> {
        if !self.window.is_open() {
            return Ok(false);
        }
        if paused {
            self.window.set_title("Cheep ⏸");
        } else {
            let stats = screen.stats();
            self.window.set_title(&format!(
                "Cheep ▶ fps {:05.2} | {}",
                stats.fps,
                format_freq(stats.ips)
            ));
        }
        screen.with_frame(|frame| {
            self.window
                .update_with_buffer(frame, FRAME_WIDTH, FRAME_HEIGHT)
        })?;
        Ok(true)
    }

    /// Routes host keys: Escape quits, P toggles the pause gate, and the
    /// mapped keys mirror into the pad edge by edge, so a key the machine
    /// already sees held never flickers. Returns false to quit.
    pub fn keys(&mut self, pad: &SharedKeys, gate: &PauseGate) -> bool {
        if !self.window.is_open() {
            return false;
        }
        // TODO: Remove this hacky workaround for minifb's broken get_keys_* functions.
        let down = self.window.get_keys();
        for key in self.keyboard.iter().filter(|key| !down.contains(key)) {
            if let Some(key) = identify_key(*key) {
                pad.release(key);
            }
        }
        for key in down.iter().filter(|key| !self.keyboard.contains(key)) {
            match key {
                Key::Escape => return false,
                Key::P => {
                    gate.toggle();
                }
                key => {
                    if let Some(key) = identify_key(*key) {
                        pad.press(key);
                    }
                }
            }
        }
        self.keyboard = down;
        true
    }
}

/// Formats an instruction rate with the unit that keeps it readable.
pub fn format_freq(ips: f64) -> String {
    if ips >= 1e6 {
        format!("{:.2} MHz", ips / 1e6)
    } else if ips >= 1e3 {
        format!("{:.2} KHz", ips / 1e3)
    } else {
        format!("{ips:.2} Hz")
    }
}
