// SPDX-License-Identifier: MIT OR Apache-2.0
/*
 * SysEx bootloader host utility.
 *
 * Copyright (c) 2025 Code Construct
 */
#[allow(unused)]
use log::{debug, error, info, trace, warn};

use anyhow::{bail, Context, Result};
use argh::FromArgs;

use sysex_boot::proto::{Response, DEVICE_ID, DEVICE_ID_LEGACY};
use sysex_boot::sim::{catch_exit, Exit, RecordingSink, SimCpu, SimFlash};
use sysex_boot::{Bootloader, MemoryLayout, Programmer};
use usb_midi_sysex::{Cable, Inbox, PacketReceiver, SysexPackets};

mod upload;

use upload::{split_messages, upload_messages, UploadOptions};

#[derive(FromArgs, Debug)]
#[argh(description = "USB-MIDI SysEx bootloader utility")]
struct Args {
    #[argh(switch, short = 'd')]
    /// debug logging
    debug: bool,

    #[argh(switch)]
    /// trace logging
    trace: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Command {
    Syx(SyxCommand),
    Packets(PacketsCommand),
    Decode(DecodeCommand),
    Crc(CrcCommand),
    Simulate(SimulateCommand),
    Version(VersionCommand),
}

#[derive(FromArgs, Debug)]
#[argh(
    subcommand,
    name = "syx",
    description = "Write an upload sequence for a firmware binary as a .syx file"
)]
struct SyxCommand {
    /// firmware binary
    #[argh(positional)]
    firmware: String,

    /// output .syx file
    #[argh(positional)]
    output: String,

    /// bytes per WRITE_BLOCK, default 64
    #[argh(option, default = "upload::DEFAULT_BLOCK_SIZE")]
    block_size: usize,

    /// offset within the application region, default 0
    #[argh(option, default = "0")]
    offset: u32,

    /// don't erase the application region first
    #[argh(switch)]
    no_erase: bool,

    /// don't start the application afterwards
    #[argh(switch)]
    no_jump: bool,

    /// use the legacy device ID
    #[argh(switch)]
    legacy: bool,
}

#[derive(FromArgs, Debug)]
#[argh(
    subcommand,
    name = "packets",
    description = "Print the USB-MIDI packets for each message in a .syx file"
)]
struct PacketsCommand {
    #[argh(positional)]
    file: String,

    /// cable number, default 0
    #[argh(option, default = "0")]
    cable: u8,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "decode", description = "Decode a bootloader response")]
struct DecodeCommand {
    /// hex bytes, for example "F0 00 00 7E 40 0F ..."
    #[argh(positional)]
    hex: Vec<String>,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "crc", description = "Print the CRC-32 of a firmware binary")]
struct CrcCommand {
    #[argh(positional)]
    firmware: String,
}

#[derive(FromArgs, Debug)]
#[argh(
    subcommand,
    name = "simulate",
    description = "Replay a .syx file against a simulated STM32F407 bootloader"
)]
struct SimulateCommand {
    #[argh(positional)]
    file: String,

    /// print the CRC-32 of this many bytes of the programmed region
    #[argh(option)]
    crc_len: Option<usize>,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "version", description = "Print version")]
struct VersionCommand {}

fn read_file(fname: &str) -> Result<Vec<u8>> {
    std::fs::read(fname).with_context(|| format!("Can't read {}", fname))
}

fn parse_hex(words: &[String]) -> Result<Vec<u8>> {
    let s: String = words.concat().chars().filter(|c| !c.is_whitespace()).collect();
    if !s.is_ascii() || s.len() % 2 != 0 {
        bail!("Expected an even number of hex digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .with_context(|| format!("Bad hex '{}'", &s[i..i + 2]))
        })
        .collect()
}

fn hex(b: &[u8]) -> String {
    b.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_response(r: &Response) {
    match r {
        Response::Info(i) => {
            println!("Bootloader info:");
            println!(
                "  Version:      {}.{}.{}",
                i.version.major, i.version.minor, i.version.patch
            );
            println!("  Flash size:   {} KiB", i.flash_size_kb);
            println!("  App base:     0x{:08x}", i.app_base);
        }
        Response::Ack { command, value } => {
            println!("ACK command 0x{:02x}, value 0x{:08x}", command, value)
        }
        Response::Error { command, code } => {
            println!("ERROR command 0x{:02x}, {:?} ({})", command, code, *code as u8)
        }
    }
}

fn syx(s: SyxCommand) -> Result<()> {
    let image = read_file(&s.firmware)?;
    let opts = UploadOptions {
        block_size: s.block_size,
        offset: s.offset,
        erase: !s.no_erase,
        jump: !s.no_jump,
        device_id: if s.legacy { DEVICE_ID_LEGACY } else { DEVICE_ID },
    };
    let layout = MemoryLayout::STM32F407;
    let msgs = upload_messages(&image, &layout, &opts)?;

    let out: Vec<u8> = msgs.concat();
    std::fs::write(&s.output, &out)
        .with_context(|| format!("Can't write {}", s.output))?;
    info!(
        "Wrote {} messages, {} bytes to {}. Image CRC-32 0x{:08x}",
        msgs.len(),
        out.len(),
        s.output,
        sysex_boot::crc32(&image)
    );
    Ok(())
}

fn packets(p: PacketsCommand) -> Result<()> {
    let cable = Cable::new(p.cable).map_err(|_| anyhow::anyhow!("Bad cable {}", p.cable))?;
    let stream = read_file(&p.file)?;
    for (i, m) in split_messages(&stream)?.iter().enumerate() {
        println!("message {} ({} bytes)", i, m.len());
        for pkt in SysexPackets::new(m, cable) {
            println!("  {}", hex(&pkt.0));
        }
    }
    Ok(())
}

fn simulate(s: SimulateCommand) -> Result<()> {
    let stream = read_file(&s.file)?;
    let layout = MemoryLayout::STM32F407;
    let mut boot = Bootloader::new(Programmer::new(SimFlash::new(&layout), layout));
    let mut sink = RecordingSink::new();
    let mut cpu = SimCpu::new();

    let mut inbox = Inbox::new();
    let (prod, mut cons) = inbox.split();
    let mut rx = PacketReceiver::new(prod);

    for m in split_messages(&stream)? {
        for p in SysexPackets::new(m, Cable(0)) {
            rx.packet_in(p)?;
        }

        let r = catch_exit(|| boot.poll(&mut cons, &mut sink, &mut cpu));
        for resp in sink.responses() {
            print_response(&resp);
        }
        sink.clear();

        match r {
            Ok(outcome) => {
                trace!("{:?}", outcome?);
            }
            Err(Exit::Start(vt)) => {
                println!(
                    "Application started, sp 0x{:08x} reset 0x{:08x}",
                    vt.stack_pointer, vt.reset_vector
                );
                break;
            }
            Err(Exit::Reset) => bail!("Unexpected reset"),
        }
    }

    if let Some(len) = s.crc_len {
        let crc = boot.programmer().image_crc(0, len)?;
        println!("Programmed CRC-32 0x{:08x}, {} bytes", crc, len);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let level = if args.trace {
        log::LevelFilter::Trace
    } else if args.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    match args.command {
        Command::Version(_) => info!("sysex-boot-util {}", env!("VERSION")),
        Command::Syx(s) => syx(s)?,
        Command::Packets(p) => packets(p)?,
        Command::Simulate(s) => simulate(s)?,
        Command::Decode(d) => {
            let msg = parse_hex(&d.hex)?;
            let Some(r) = Response::parse(&msg) else {
                bail!("Not a bootloader response: {}", hex(&msg));
            };
            print_response(&r);
        }
        Command::Crc(c) => {
            let image = read_file(&c.firmware)?;
            println!("0x{:08x}  {} bytes", sysex_boot::crc32(&image), image.len());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_input() {
        let w = vec!["F0 00".to_string(), "007e".to_string()];
        assert_eq!(parse_hex(&w).unwrap(), [0xF0, 0x00, 0x00, 0x7E]);
        assert!(parse_hex(&["F".to_string()]).is_err());
        assert!(parse_hex(&["GG".to_string()]).is_err());
        assert_eq!(hex(&[0xF0, 0x0E]), "F0 0E");
    }
}
