//! mp2crc binary

// SPDX-FileCopyrightText: © 2023 Marcus Rowe <undisbeliever@gmail.com>
//
// SPDX-License-Identifier: MIT

use clap::{ArgAction, Args, Parser, Subcommand};
use mp2::{
    frames, protect_frame, protected_bit_count, stored_crc, verify_frame, CrcStatus, FrameError,
    FrameInfo, SAMPLES_PER_FRAME,
};
use serde::Serialize;

use std::fs;
use std::path::{Path, PathBuf};

macro_rules! error {
    ($($arg:tt)*) => {{
        eprintln!($($arg)*);
        std::process::exit(1);
    }};
}

#[derive(Parser)]
#[command(author, version)]
#[command(about = "MPEG Audio Layer II CRC checker")]
#[command(arg_required_else_help = true)]
struct ArgParser {
    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        global = true,
        help = "increase log verbosity (can be repeated)"
    )]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify the CRC of every protected frame
    Check(CheckArgs),

    /// Recalculate the CRC of every protected frame
    Fix(FixArgs),

    /// Show the configuration of the first frame
    Info(InfoArgs),
}

#[derive(Args)]
struct CheckArgs {
    #[arg(value_name = "MP2_FILE", help = "input mp2 file")]
    input: PathBuf,

    #[arg(long, help = "output a JSON report")]
    json: bool,
}

#[derive(Args)]
struct FixArgs {
    #[arg(value_name = "MP2_FILE", help = "input mp2 file")]
    input: PathBuf,

    #[arg(short = 'o', long, value_name = "MP2_FILE", help = "output mp2 file")]
    output: PathBuf,
}

#[derive(Args)]
struct InfoArgs {
    #[arg(value_name = "MP2_FILE", help = "input mp2 file")]
    input: PathBuf,
}

// Check
// =====

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum FrameStatus {
    Unprotected,
    Valid { crc: u16 },
    Mismatch { stored: u16, computed: u16 },
    Error { message: String },
}

#[derive(Debug, Serialize)]
struct FrameReport {
    offset: usize,
    length: usize,
    #[serde(flatten)]
    status: FrameStatus,
}

#[derive(Debug, Default, Serialize)]
struct CheckReport {
    n_frames: usize,
    n_protected: usize,
    n_valid: usize,
    n_mismatched: usize,
    n_errors: usize,
    skipped_bytes: usize,
    truncated: bool,
    frames: Vec<FrameReport>,
}

impl CheckReport {
    /// False if a frame could not be verified or has an invalid CRC.
    fn passed(&self) -> bool {
        self.n_mismatched == 0 && self.n_errors == 0 && !self.truncated
    }
}

fn check_stream(data: &[u8]) -> CheckReport {
    let mut report = CheckReport::default();

    for r in frames(data) {
        let info = match r {
            Ok(info) => info,
            Err(FrameError::Junk { length, .. }) => {
                report.skipped_bytes += length;
                continue;
            }
            Err(e) => {
                if matches!(e, FrameError::Truncated { .. }) {
                    report.truncated = true;
                }
                log::warn!("{}", e);
                continue;
            }
        };

        let status = match verify_frame(&data[info.range()]) {
            Ok(CrcStatus::Unprotected) => FrameStatus::Unprotected,
            Ok(CrcStatus::Valid(crc)) => {
                report.n_protected += 1;
                report.n_valid += 1;
                FrameStatus::Valid { crc }
            }
            Ok(CrcStatus::Mismatch { stored, computed }) => {
                report.n_protected += 1;
                report.n_mismatched += 1;
                FrameStatus::Mismatch { stored, computed }
            }
            Err(e) => {
                report.n_errors += 1;
                FrameStatus::Error {
                    message: e.to_string(),
                }
            }
        };

        log::debug!("frame at offset {}: {:?}", info.offset, status);

        report.n_frames += 1;
        report.frames.push(FrameReport {
            offset: info.offset,
            length: info.length,
            status,
        });
    }

    report
}

fn print_check_report(report: &CheckReport) {
    for f in &report.frames {
        match &f.status {
            FrameStatus::Mismatch { stored, computed } => println!(
                "CRC mismatch at offset {}: stored {:#06x}, calculated {:#06x}",
                f.offset, stored, computed
            ),
            FrameStatus::Error { message } => println!("Error at offset {}: {}", f.offset, message),
            FrameStatus::Unprotected | FrameStatus::Valid { .. } => (),
        }
    }

    println!(
        "{} frames, {} protected, {} valid, {} CRC mismatches",
        report.n_frames, report.n_protected, report.n_valid, report.n_mismatched
    );
    if report.skipped_bytes > 0 {
        println!("{} bytes of non-frame data skipped", report.skipped_bytes);
    }
    if report.truncated {
        println!("Last frame is truncated");
    }
}

fn check(args: CheckArgs) {
    let data = load_file(&args.input);
    let report = check_stream(&data);

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{}", s),
            Err(e) => error!("Cannot serialize report: {}", e),
        }
    } else {
        print_check_report(&report);
    }

    if !report.passed() {
        std::process::exit(1);
    }
}

// Fix
// ===

#[derive(Debug, Default, PartialEq)]
struct FixSummary {
    n_protected: usize,
    n_changed: usize,
    n_unprotected: usize,
    n_errors: usize,
}

fn fix_stream(data: &mut [u8]) -> FixSummary {
    let infos: Vec<FrameInfo> = frames(data).filter_map(Result::ok).collect();

    let mut summary = FixSummary::default();

    for info in infos {
        if !info.header.protected {
            summary.n_unprotected += 1;
            continue;
        }

        let frame = &mut data[info.range()];
        let old_crc = stored_crc(frame).ok();

        match protect_frame(frame) {
            Ok(crc) => {
                summary.n_protected += 1;
                if old_crc != Some(crc) {
                    summary.n_changed += 1;
                    log::info!("frame at offset {}: CRC set to {:#06x}", info.offset, crc);
                }
            }
            Err(e) => {
                summary.n_errors += 1;
                log::warn!("Cannot protect frame at offset {}: {}", info.offset, e);
            }
        }
    }

    summary
}

fn fix(args: FixArgs) {
    let mut data = load_file(&args.input);
    let summary = fix_stream(&mut data);

    if summary.n_unprotected > 0 {
        log::warn!("{} frames are not CRC protected", summary.n_unprotected);
    }

    write_data(&args.output, data);

    println!(
        "{} protected frames, {} CRCs changed, {} errors",
        summary.n_protected, summary.n_changed, summary.n_errors
    );
}

// Info
// ====

fn yes_no(b: bool) -> &'static str {
    match b {
        true => "yes",
        false => "no",
    }
}

fn stream_info(data: &[u8]) -> Option<String> {
    let mut it = frames(data).filter_map(Result::ok);

    let first = it.next()?;
    let n_frames = 1 + it.count();

    let h = &first.header;
    let frame = &data[first.range()];

    let mut out = format!(
        "{} Layer II, {} Hz, {} kbps, {}\n",
        h.version,
        h.sample_rate(),
        h.bitrate_kbps(),
        h.mode,
    );
    out += &format!(
        "emphasis: {}, copyright: {}, original: {}\n",
        h.emphasis.name(),
        yes_no(h.copyright),
        yes_no(h.original),
    );
    out += &format!(
        "CRC: {}, padding: {}, frame length: {} bytes\n",
        yes_no(h.protected),
        yes_no(h.padding),
        first.length
    );
    if let Ok(bit_count) = protected_bit_count(frame) {
        out += &format!("protected bits: {}\n", bit_count);
    }

    let seconds = (n_frames * SAMPLES_PER_FRAME) as f64 / f64::from(h.sample_rate());
    out += &format!("{} frames, {:.2} seconds\n", n_frames, seconds);

    Some(out)
}

fn info(args: InfoArgs) {
    let data = load_file(&args.input);

    match stream_info(&data) {
        Some(s) => print!("{}", s),
        None => error!("No Layer II frames in {}", args.input.display()),
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => log::Level::Warn,
        1 => log::Level::Info,
        2 => log::Level::Debug,
        _ => log::Level::Trace,
    };

    if let Err(e) = simple_logger::init_with_level(level) {
        error!("Cannot initialise logger: {}", e);
    }
}

fn main() {
    let args = ArgParser::parse();

    init_logger(args.verbose);

    match args.command {
        Command::Check(c) => check(c),
        Command::Fix(c) => fix(c),
        Command::Info(c) => info(c),
    }
}

fn load_file(path: &Path) -> Vec<u8> {
    match fs::read(path) {
        Ok(data) => data,
        Err(why) => error!("Couldn't read {}: {}", path.display(), why),
    }
}

fn write_data(path: &Path, data: Vec<u8>) {
    match fs::write(path, data) {
        Ok(()) => (),
        Err(why) => error!("Error writing {}: {}", path.display(), why),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mp2::{Allocation, AllocationLayout, BitWriter, FrameHeader, Mode, CRC_LEN};

    fn build_frame(protected: bool, alloc: u8) -> Vec<u8> {
        let header = FrameHeader {
            protected,
            ..FrameHeader::new(48000, 192, Mode::Stereo).unwrap()
        };

        let mut prefix = header.to_bytes().to_vec();
        if protected {
            prefix.extend([0; CRC_LEN]);
        }

        let mut a = Allocation::default();
        a.bit_alloc[0][0] = alloc;
        a.bit_alloc[1][5] = alloc;

        let mut w = BitWriter::with_bytes(prefix);
        a.write_to(&mut w, &AllocationLayout::for_header(&header));

        let mut frame = w.into_bytes();
        frame.resize(header.frame_length(), 0);
        frame
    }

    fn test_stream() -> Vec<u8> {
        let parts: [&[u8]; 5] = [
            b"junk",
            &build_frame(true, 1),
            &build_frame(false, 2),
            &build_frame(true, 3),
            &[0xff, 0xfc, 0xa4],
        ];
        parts.concat()
    }

    #[test]
    fn test_check_then_fix() {
        let mut data = test_stream();

        let report = check_stream(&data);
        assert_eq!(report.n_frames, 3);
        assert_eq!(report.n_protected, 2);
        assert_eq!(report.n_errors, 0);
        assert_eq!(report.skipped_bytes, 4 + 3);
        assert_eq!(report.frames[1].status, FrameStatus::Unprotected);

        let summary = fix_stream(&mut data);
        assert_eq!(summary.n_protected, 2);
        assert_eq!(summary.n_unprotected, 1);
        assert_eq!(summary.n_errors, 0);

        let report = check_stream(&data);
        assert_eq!(report.n_valid, 2);
        assert_eq!(report.n_mismatched, 0);

        // Fixing a fixed stream changes nothing
        let before = data.clone();
        let summary = fix_stream(&mut data);
        assert_eq!(summary.n_changed, 0);
        assert_eq!(data, before);
    }

    #[test]
    fn test_fix_leaves_other_bytes_alone() {
        let original = test_stream();
        let mut data = original.clone();
        fix_stream(&mut data);

        let changed: Vec<usize> = (0..data.len())
            .filter(|&i| data[i] != original[i])
            .collect();

        let frame_len = 576;
        let protected_crc_bytes = [4 + 4, 4 + 5, 4 + 2 * frame_len + 4, 4 + 2 * frame_len + 5];
        assert!(changed.iter().all(|i| protected_crc_bytes.contains(i)));
    }

    #[test]
    fn test_check_failures() {
        let mut data = test_stream();
        fix_stream(&mut data);
        assert!(check_stream(&data).passed());

        // Remove the trailing junk and the end of the last frame
        data.truncate(data.len() - 3 - 100);
        let report = check_stream(&data);
        assert!(report.truncated);
        assert_eq!(report.n_mismatched, 0);
        assert!(!report.passed());

        let report = CheckReport {
            n_frames: 1,
            n_errors: 1,
            ..Default::default()
        };
        assert!(!report.passed());
    }

    #[test]
    fn test_json_report() {
        let mut data = test_stream();
        fix_stream(&mut data);
        // corrupt the first allocation field of the last frame
        data[4 + 2 * 576 + 6] ^= 0x80;

        let report = check_stream(&data);
        assert_eq!(report.n_mismatched, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["n_frames"], 3);
        assert_eq!(json["frames"][0]["status"], "valid");
        assert_eq!(json["frames"][0]["offset"], 4);
        assert_eq!(json["frames"][1]["status"], "unprotected");
        assert_eq!(json["frames"][2]["status"], "mismatch");
        assert!(json["frames"][2]["stored"].is_u64());
    }

    #[test]
    fn test_stream_info() {
        let info = stream_info(&test_stream()).unwrap();

        assert!(info.starts_with("MPEG-1 Layer II, 48000 Hz, 192 kbps, Stereo\n"));
        assert!(info.contains("CRC: yes, padding: no, frame length: 576 bytes\n"));
        assert!(info.contains("3 frames, 0.07 seconds\n"));

        assert_eq!(stream_info(b"no frames here"), None);
    }
}
