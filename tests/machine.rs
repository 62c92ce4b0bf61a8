// (c) 2023 John A. Breaux
// This code is licensed under MIT license (see LICENSE for details)

//! Testing the assembled machine through Cheep's public API
use cheep::{cfg::STACK_EMPTY, prelude::*};
use std::{thread, time::Duration};

mod construction {
    use super::*;

    #[test]
    fn stock_machine() {
        let ch8 = Chip8::new(&Config::default()).unwrap();
        assert_eq!(ch8.cpu.regs.pc, 0x200);
        assert_eq!(ch8.cpu.regs.sp, STACK_EMPTY);
        assert_eq!(ch8.mem.len(), 0x1000);
        assert_eq!(ch8.mem.read_block(0, 80).unwrap(), &FONT);
        assert_eq!(ch8.cpu.ips(), 0.0);
    }

    #[test]
    fn relocated_load_address() {
        let conf = Config {
            load_addr: 0x300,
            mem_size: 0x2000,
            ..Default::default()
        };
        let mut ch8 = Chip8::new(&conf).unwrap();
        assert_eq!(ch8.cpu.regs.pc, 0x300);
        assert_eq!(ch8.mem.len(), 0x2000);
        ch8.load_rom_bytes(&[0x12, 0x00]).unwrap();
        assert_eq!(ch8.mem.read_block(0x300, 2).unwrap(), &[0x12, 0x00]);
    }

    #[test]
    fn zero_cpu_rate_is_rejected() {
        let conf = Config {
            cpu_hz: 0,
            ..Default::default()
        };
        assert!(matches!(Chip8::new(&conf), Err(Error::ZeroPeriodTimer)));
    }

    #[test]
    fn zero_frame_rate_is_rejected() {
        let conf = Config {
            frame_rate: 0,
            ..Default::default()
        };
        assert!(matches!(Chip8::new(&conf), Err(Error::ZeroPeriodTimer)));
    }

    #[test]
    fn zero_stack_is_rejected() {
        let conf = Config {
            stack_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            Chip8::new(&conf),
            Err(Error::InvalidStackSize { size: 0 })
        ));
    }

    /// The one-byte stack pointer caps the stack at 255 slots
    #[test]
    fn deep_stack_is_rejected() {
        let conf = Config {
            stack_size: 255,
            ..Default::default()
        };
        assert!(Chip8::new(&conf).is_ok());
        let conf = Config {
            stack_size: 256,
            ..conf
        };
        assert!(matches!(
            Chip8::new(&conf),
            Err(Error::InvalidStackSize { size: 256 })
        ));
    }
}

mod roms {
    use super::*;

    #[test]
    fn largest_rom_fits() {
        let mut ch8 = Chip8::new(&Config::default()).unwrap();
        let rom = vec![0xc5; 0x1000 - 0x200 - 1];
        ch8.load_rom_bytes(&rom).unwrap();
        assert_eq!(ch8.mem.read_block(0x200, 1).unwrap(), &[0xc5]);
        assert_eq!(ch8.mem.read_block(0xffe, 1).unwrap(), &[0xc5]);
    }

    /// A rom the size of program space is already one byte too many
    #[test]
    fn rom_too_big() {
        let mut ch8 = Chip8::new(&Config::default()).unwrap();
        let rom = vec![0xc5; 0x1000 - 0x200];
        let error = ch8
            .load_rom_bytes(&rom)
            .expect_err("Exact fit is out of bounds");
        assert!(matches!(
            error,
            Error::RomTooBig {
                size: 0xe00,
                cap: 0xe00
            }
        ));
    }

    #[test]
    fn rom_from_disk() {
        let rom = [0x60, 0x2a, 0x61, 0x15, 0x12, 0x04];
        let path = std::env::temp_dir().join(format!("cheep-rom-{}.ch8", std::process::id()));
        std::fs::write(&path, rom).unwrap();

        let mut ch8 = Chip8::new(&Config::default()).unwrap();
        ch8.load_rom(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(ch8.mem.read_block(0x200, rom.len() as u16).unwrap(), &rom);
    }

    #[test]
    fn missing_rom_file() {
        let mut ch8 = Chip8::new(&Config::default()).unwrap();
        let error = ch8
            .load_rom("this/rom/does/not/exist.ch8")
            .expect_err("No such file");
        assert!(matches!(error, Error::IoError(_)));
    }
}

mod frontend {
    use super::*;

    /// Keypad handles are views of one shared pad, so a press through one
    /// is visible through all of them.
    #[test]
    fn shared_keypad() {
        let ch8 = Chip8::new(&Config::default()).unwrap();
        let pad = ch8.keys();
        let observer = ch8.keys();
        pad.press(0xa);
        pad.press(0x1);
        assert!(observer.is_key_pressed(0xa));
        assert!(!observer.is_key_pressed(0xb));
        pad.release(0xa);
        assert!(!observer.is_key_pressed(0xa));
        assert!(observer.is_key_pressed(0x1));
        pad.release_all();
        assert!(!observer.is_key_pressed(0x1));
    }

    #[test]
    fn pause_gate_requests() {
        let gate = PauseGate::default();
        assert!(!gate.is_engaged());
        assert!(gate.toggle());
        assert!(!gate.toggle());
        gate.set_paused(true);
        // nothing engages the gate until a machine services it
        assert!(!gate.is_engaged());
    }
}

mod running {
    use super::*;

    /// Runs the machine on its own thread until it traps, then hands both
    /// the verdict and the machine back for inspection.
    fn run_to_trap(mut ch8: Chip8) -> (Result<()>, Chip8) {
        thread::spawn(move || {
            let result = ch8.run();
            (result, ch8)
        })
        .join()
        .unwrap()
    }

    /// A bad opcode stops the machine, leaving everything executed before
    /// it in place.
    #[test]
    fn trap_stops_the_machine() {
        let mut ch8 = Chip8::new(&Config::default()).unwrap();
        ch8.set_sound(Box::new(Mute));
        // v0 := 5, v1 := 5, v0 += v1, then a word that decodes to nothing
        ch8.load_rom_bytes(&[0x60, 0x05, 0x61, 0x05, 0x80, 0x14, 0x80, 0x0f])
            .unwrap();

        let (result, ch8) = run_to_trap(ch8);
        let error = result.expect_err("The machine ran into 0x800f");
        assert!(matches!(error, Error::InvalidOpCode { word: 0x800f }));
        assert_eq!(ch8.cpu.regs.v[0], 10);
        assert_eq!(ch8.cpu.regs.pc, 0x206);
    }

    /// A machine paused before its first cycle engages the gate without
    /// executing anything, and picks up where it left off on release.
    #[test]
    fn pause_engages_between_cycles() {
        let mut ch8 = Chip8::new(&Config::default()).unwrap();
        ch8.set_sound(Box::new(Mute));
        // a bare `ret` traps on the empty call stack, once allowed to run
        ch8.load_rom_bytes(&[0x00, 0xee]).unwrap();
        let gate = ch8.pause_gate();
        gate.set_paused(true);

        let machine = thread::spawn(move || {
            let result = ch8.run();
            (result, ch8)
        });
        for _ in 0..500 {
            if gate.is_engaged() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        assert!(gate.is_engaged());

        gate.set_paused(false);
        let (result, ch8) = machine.join().unwrap();
        let error = result.expect_err("Releasing the gate lets the rom trap");
        assert!(matches!(error, Error::StackUnderflow));
        assert!(!gate.is_engaged());
        assert_eq!(ch8.cpu.regs.pc, 0x200);
        assert_eq!(ch8.cpu.regs.sp, STACK_EMPTY);
    }
}
