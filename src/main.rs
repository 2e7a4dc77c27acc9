use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

use tally_rs::{parse_with_seeds, ParseConfig, Transport, TransportPref, MIN_CHUNK_SIZE};

fn usage(exe: &str) -> ! {
    eprintln!(
        "usage: {exe} [--workers=N] [--chunk-mib=N] [--transport=threads|shm|spill] \
         [--seeds=FILE] <input> <output>"
    );
    process::exit(2);
}

fn main() {
    let mut args = env::args();
    let exe = args.next().unwrap_or_else(|| "tally-rs".into());

    let mut config = ParseConfig::default();
    let mut seeds_path: Option<PathBuf> = None;
    let mut positional: Vec<PathBuf> = Vec::new();

    for arg in args {
        if let Some(value) = arg.strip_prefix("--workers=") {
            match value.parse::<usize>() {
                Ok(n) if n >= 1 => config.workers = Some(n),
                _ => usage(&exe),
            }
        } else if let Some(value) = arg.strip_prefix("--chunk-mib=") {
            match value.parse::<usize>().ok().and_then(|n| n.checked_mul(1 << 20)) {
                Some(bytes) if bytes >= MIN_CHUNK_SIZE => config.chunk_size = bytes,
                _ => usage(&exe),
            }
        } else if let Some(value) = arg.strip_prefix("--transport=") {
            config.transport = match value {
                "threads" => TransportPref::Force(Transport::Threads),
                "shm" => TransportPref::Force(Transport::SharedMemory),
                "spill" => TransportPref::Force(Transport::TempFile),
                _ => usage(&exe),
            };
        } else if let Some(value) = arg.strip_prefix("--seeds=") {
            seeds_path = Some(PathBuf::from(value));
        } else if arg == "--help" || arg == "-h" {
            usage(&exe);
        } else if arg.starts_with("--") {
            eprintln!("unknown flag: {arg}");
            usage(&exe);
        } else {
            positional.push(PathBuf::from(arg));
        }
    }

    let [input, output] = match <[PathBuf; 2]>::try_from(positional) {
        Ok(paths) => paths,
        Err(_) => usage(&exe),
    };

    let seeds: Vec<String> = match &seeds_path {
        Some(path) => match fs::read_to_string(path) {
            Ok(text) => text.lines().map(str::to_owned).collect(),
            Err(err) => {
                eprintln!("{exe}: cannot read seed list {}: {err}", path.display());
                process::exit(1);
            }
        },
        None => Vec::new(),
    };

    let start = Instant::now();
    let stats = match parse_with_seeds(&input, &output, &seeds, &config) {
        Ok(stats) => stats,
        Err(err) => {
            eprintln!("{exe}: {err}");
            process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    let elapsed_secs = elapsed.as_secs_f64();
    let throughput_mib = if elapsed_secs > 0.0 {
        (stats.bytes as f64 / (1024.0 * 1024.0)) / elapsed_secs
    } else {
        0.0
    };
    eprintln!(
        "paths={} days={} visits={} bytes={} workers={} transport={} recovered={} \
         elapsed_ms={} throughput_mib_s={:.2}",
        stats.paths,
        stats.days,
        stats.visits,
        stats.bytes,
        stats.workers,
        stats.transport.as_str(),
        stats.recovered_ranges,
        elapsed.as_millis(),
        throughput_mib
    );
}
