//! spifat CLI - drive the FAT adapter from the command line.
//!
//! Usage:
//!   spifat [--manifest volume.json] [shell]
//!   spifat stress [--files N] [--iterations M] [--size BYTES]
//!
//! Examples:
//!   spifat --manifest demo.json          # interactive shell on a seeded card
//!   spifat -vv stress --files 8          # stress cycle with debug logging
//!
//! The shell exposes the adapter's callback surface directly (ls, cat,
//! write, mkdir, rm, stat, touch) plus `eject`/`insert` to exercise the
//! card-removal recovery path. The stress command is the batch
//! create/verify/remove cycle used against real cards.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{LevelFilter, Log, Metadata, Record};

use spifat_core::{
    load_manifest, seed_card, Errno, EntryCollector, FileAttr, MemoryCard, OpenFlags, SpiFatFs,
};

/// spifat demo CLI
#[derive(Parser, Debug)]
#[command(name = "spifat")]
#[command(about = "Drive the FAT adapter against an in-memory card")]
struct Args {
    /// JSON manifest describing the initial volume contents
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive shell (the default)
    Shell,
    /// Create, verify and remove a batch of pseudo-random files
    Stress {
        /// Number of test files
        #[arg(long, default_value_t = 32)]
        files: usize,

        /// Verification passes over the batch
        #[arg(long, default_value_t = 10)]
        iterations: usize,

        /// Size of each test file in bytes
        #[arg(long, default_value_t = 48 * 1024)]
        size: usize,
    },
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    log::set_logger(&LOGGER).ok();
    log::set_max_level(match args.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });

    let card = MemoryCard::new();
    if let Some(path) = &args.manifest {
        let manifest = load_manifest(path)?;
        if let Some(label) = &manifest.label {
            eprintln!("Seeding volume: {label}");
        }
        seed_card(&card, &manifest)?;
    }

    let fs = SpiFatFs::new(card);
    let tuning = fs.init();
    log::debug!("host tuning: {tuning:?}");

    let result = match args.command.unwrap_or(Command::Shell) {
        Command::Shell => run_shell(&fs),
        Command::Stress {
            files,
            iterations,
            size,
        } => run_stress(&fs, files, iterations, size),
    };

    fs.destroy();
    result
}

/// List a directory through the adapter, attributes included.
fn list_dir(fs: &SpiFatFs<MemoryCard>, path: &str) -> Result<Vec<(String, Option<FileAttr>)>, Errno> {
    let fh = fs.opendir(path)?;
    let mut collector = EntryCollector::new();
    let result = fs.readdir(fh, 0, true, &mut collector);
    fs.releasedir(fh).ok();
    result?;
    Ok(collector.entries().to_vec())
}

fn run_shell(fs: &SpiFatFs<MemoryCard>) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        print!("spifat> ");
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        let rest: Vec<&str> = words.collect();

        let outcome = match (cmd, rest.as_slice()) {
            ("help", _) => {
                println!(
                    "commands: ls [path], cat <path>, write <path> <text..>, \
                     mkdir <path>, rmdir <path>, rm <path>, stat <path>, \
                     touch <path>, eject, insert, status, quit"
                );
                Ok(())
            }
            ("quit" | "exit", _) => break,
            ("ls", paths) => shell_ls(fs, paths.first().copied().unwrap_or("/")),
            ("cat", [path]) => shell_cat(fs, path),
            ("write", [path, text @ ..]) if !text.is_empty() => {
                shell_write(fs, path, &text.join(" "))
            }
            ("mkdir", [path]) => fs.mkdir(path),
            ("rmdir", [path]) => fs.rmdir(path),
            ("rm", [path]) => fs.unlink(path),
            ("stat", [path]) => shell_stat(fs, path),
            ("touch", [path]) => shell_touch(fs, path),
            ("eject", _) => {
                fs.card().eject();
                println!("card ejected");
                Ok(())
            }
            ("insert", _) => {
                fs.card().insert();
                println!("card inserted");
                Ok(())
            }
            ("status", _) => {
                println!(
                    "volume {}",
                    if fs.is_mounted() { "mounted" } else { "unmounted" }
                );
                Ok(())
            }
            _ => {
                println!("unknown command, try 'help'");
                Ok(())
            }
        };

        if let Err(errno) = outcome {
            println!("error {}: {errno}", errno.as_os_code());
        }
    }

    Ok(())
}

fn shell_ls(fs: &SpiFatFs<MemoryCard>, path: &str) -> Result<(), Errno> {
    for (name, attr) in list_dir(fs, path)? {
        match attr {
            Some(attr) => {
                let kind = if attr.is_dir() { 'd' } else { '-' };
                println!("{kind} {:>8} {name}", attr.size);
            }
            None => println!("? {name}"),
        }
    }
    Ok(())
}

fn shell_cat(fs: &SpiFatFs<MemoryCard>, path: &str) -> Result<(), Errno> {
    let fh = fs.open(path, OpenFlags::ASYNC)?;
    let mut offset = 0u64;
    let mut stdout = io::stdout().lock();
    loop {
        let mut buf = [0u8; 4096];
        let n = match fs.read(fh, offset, &mut buf) {
            Ok(n) => n,
            Err(errno) => {
                fs.release(fh).ok();
                return Err(errno);
            }
        };
        if n == 0 {
            break;
        }
        let _ = stdout.write_all(&buf[..n]);
        offset += n as u64;
    }
    let _ = stdout.flush();
    fs.release(fh)
}

fn shell_write(fs: &SpiFatFs<MemoryCard>, path: &str, text: &str) -> Result<(), Errno> {
    // Create first; fall back to opening an existing file.
    let fh = match fs.create(path) {
        Ok(fh) => fh,
        Err(_) => fs.open(path, OpenFlags::empty())?,
    };
    let result = fs.write(fh, 0, text.as_bytes());
    fs.release(fh).ok();
    result.map(|n| println!("wrote {n} bytes"))
}

fn shell_stat(fs: &SpiFatFs<MemoryCard>, path: &str) -> Result<(), Errno> {
    let attr = fs.getattr(path)?;
    println!(
        "mode {:o}, nlink {}, size {}",
        attr.mode, attr.nlink, attr.size
    );
    Ok(())
}

fn shell_touch(fs: &SpiFatFs<MemoryCard>, path: &str) -> Result<(), Errno> {
    match fs.utimens(path) {
        Ok(()) => Ok(()),
        Err(Errno::ENOENT) => {
            let fh = fs.create(path)?;
            fs.release(fh)
        }
        Err(errno) => Err(errno),
    }
}

fn next_random(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

/// Remove a leftover test tree if one exists.
fn remove_tree(fs: &SpiFatFs<MemoryCard>, path: &str) -> Result<(), Errno> {
    let attr = match fs.getattr(path) {
        Ok(attr) => attr,
        Err(Errno::ENOENT) => return Ok(()),
        Err(errno) => return Err(errno),
    };

    if attr.is_dir() {
        for (name, _) in list_dir(fs, path)? {
            if name == "." || name == ".." {
                continue;
            }
            fs.unlink(&format!("{path}/{name}"))?;
        }
        fs.rmdir(path)
    } else {
        fs.unlink(path)
    }
}

fn run_stress(
    fs: &SpiFatFs<MemoryCard>,
    nfiles: usize,
    iterations: usize,
    size: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    const TESTDIR: &str = "/STRESSSD";

    remove_tree(fs, TESTDIR).map_err(|e| format!("failed to remove stale test files: {e}"))?;

    fs.mkdir(TESTDIR)
        .map_err(|e| format!("mkdir failed: {e}"))?;

    let mut seed = 0x9E37_79B9_7F4A_7C15u64;
    let mut expected: Vec<(String, u64)> = Vec::new();

    for i in 0..nfiles {
        let name = format!("{i:04}.DAT");
        let data: Vec<u8> = (0..size)
            .map(|_| (next_random(&mut seed) & 0xff) as u8)
            .collect();
        let checksum: u64 = data.iter().map(|&b| u64::from(b)).sum();

        let path = format!("{TESTDIR}/{name}");
        let fh = fs
            .create(&path)
            .map_err(|e| format!("create {path} failed: {e}"))?;
        let written = fs.write(fh, 0, &data).map_err(|e| {
            fs.release(fh).ok();
            format!("write {path} failed: {e}")
        })?;
        fs.release(fh)
            .map_err(|e| format!("close {path} failed: {e}"))?;
        if written != size {
            return Err(format!("short write on {path}: {written} != {size}").into());
        }

        expected.push((name, checksum));
    }
    println!("created {nfiles} test files");

    let mut nmatches = 0usize;
    let mut nmismatches = 0usize;
    let mut ncorruptions = 0usize;

    for iteration in 0..iterations {
        let names: Vec<String> = list_dir(fs, TESTDIR)
            .map_err(|e| format!("file scan[{iteration}] failed: {e}"))?
            .into_iter()
            .map(|(name, _)| name)
            .filter(|name| name != "." && name != "..")
            .collect();

        if names.len() != nfiles {
            println!("!! scan mismatch: {} entries, expected {nfiles}", names.len());
            nmismatches += 1;
            continue;
        }

        let mut clean = true;
        for (name, checksum) in &expected {
            if !names.contains(name) {
                println!("!! corrupt filename: {name} missing");
                ncorruptions += 1;
                clean = false;
                continue;
            }

            let path = format!("{TESTDIR}/{name}");
            let attr = fs.getattr(&path).map_err(|e| format!("stat {path}: {e}"))?;
            if attr.size != size as u64 {
                println!("!! corrupt file size: {} != {size}", attr.size);
                ncorruptions += 1;
                clean = false;
                continue;
            }

            let fh = fs
                .open(&path, OpenFlags::ASYNC)
                .map_err(|e| format!("open {path}: {e}"))?;
            let mut data = vec![0u8; size];
            let n = fs.read(fh, 0, &mut data).map_err(|e| {
                fs.release(fh).ok();
                format!("read {path}: {e}")
            })?;
            fs.release(fh).ok();

            let sum: u64 = data[..n].iter().map(|&b| u64::from(b)).sum();
            if n != size || sum != *checksum {
                println!("!! file integrity check failed: {path}");
                ncorruptions += 1;
                clean = false;
            }
        }

        if clean {
            println!("file scan[{iteration}] ok: {nfiles} files");
            nmatches += 1;
        }
    }

    println!(
        "Scan Results: {nmatches} matches, {nmismatches} mismatches, \
         {ncorruptions} corruptions, {iterations} total"
    );

    remove_tree(fs, TESTDIR).map_err(|e| format!("cleanup failed: {e}"))?;

    if nmismatches > 0 || ncorruptions > 0 {
        return Err("stress run detected corruption".into());
    }
    Ok(())
}
