// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Cheep: an eight-bit fantasy computer
//! Hello, world!

#[cfg(test)]
mod tests;
mod ui;

use cheep::{error::Result, prelude::*};
use gumdrop::*;
use owo_colors::OwoColorize;
use std::path::PathBuf;
use ui::UIBuilder;

pub fn main() -> Result<()> {
    let options = Arguments::parse_args_default_or_exit();
    let conf = Config {
        cpu_hz: options.speed,
        frame_rate: options.frame_rate,
        perf_level: options.perf,
        ..Default::default()
    };
    let mut ch8 = Chip8::new(&conf)?;
    ch8.load_rom(&options.file)?;
    if options.mute {
        ch8.set_sound(Box::new(Mute));
    }

    let (screen, pad, gate) = (ch8.screen(), ch8.keys(), ch8.pause_gate());
    gate.set_paused(options.pause);
    let render = screen.spawn_pipeline();
    let emu = std::thread::spawn(move || ch8.run());

    let mut ui = UIBuilder::default().rate(options.frame_rate).build()?;
    while !emu.is_finished() {
        ui.wait_for_next_frame();
        if !ui.keys(&pad, &gate) {
            break;
        }
        if !ui.frame(&screen, gate.is_engaged())? {
            break;
        }
    }

    screen.shutdown();
    let _ = render.join();
    // A machine that stopped on its own hit a trap; report it
    if emu.is_finished() {
        if let Ok(Err(e)) = emu.join() {
            eprintln!("{}", e.bold().red());
        }
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Options, Hash)]
struct Arguments {
    #[options(help = "Load a ROM to run on Cheep.", required, free)]
    pub file: PathBuf,
    #[options(help = "Print this help message.")]
    help: bool,
    #[options(help = "Start the machine paused.")]
    pub pause: bool,

    #[options(
        help = "Set the cpu speed in instructions per second.",
        default = "1000000",
        meta = "HZ"
    )]
    pub speed: u64,
    #[options(help = "Set the target framerate.", default = "60", meta = "FR")]
    pub frame_rate: u64,

    #[options(help = "Silence the tone generator.")]
    pub mute: bool,
    #[options(
        help = "Host relief between passes: 0 spins, 1 yields, n sleeps n-1 ms.",
        default = "1",
        meta = "PL"
    )]
    pub perf: u32,
}
