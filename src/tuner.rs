//! Compression tuner: derives level, threads and memory from live system
//! state.  Nothing here is persisted, so encode and decode each re-run it.
//!
//! | Input | Auto mode | Explicit mode |
//! |---|---|---|
//! | threads | min(CPUs, mem / 10 MiB, throughput step) | `t=`, clamped to `[1, CPUs]`; `0` = all CPUs |
//! | level (encode) | by payload size | `l=` |
//! | memory | 70 % of available | `m=` bytes or percentage, else 4 GiB |
//!
//! Afterwards the direction applies its own bounds: encode rounds memory down
//! to a power of two inside the engine's window range; decode caps threads at
//! [`MAX_DECODE_THREADS`] and clamps the memory ceiling independently.

use log::debug;
use thiserror::Error;

use crate::codec::directive::{Directive, Explicit, MemoryHint};
use crate::codec::{Level, MAX_DECODE_WINDOW_LOG, MAX_ENCODE_WINDOW_LOG, MIN_WINDOW_LOG};

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// One compression thread per this much available memory.
pub const MEMORY_PER_THREAD: u64 = 10 * MIB;
/// Share of available memory auto mode claims.
pub const AUTO_MEMORY_FRACTION: f64 = 0.7;
/// Budget used when nothing else supplies one.
pub const DEFAULT_MEMORY: u64 = 4 * GIB;
pub const MAX_THREADS: u32 = 255;
pub const MAX_DECODE_THREADS: u32 = 4;

pub const MIN_ENCODE_MEMORY: u64 = 1 << MIN_WINDOW_LOG;
pub const MAX_ENCODE_MEMORY: u64 = 1 << MAX_ENCODE_WINDOW_LOG;
pub const MIN_DECODE_MEMORY: u64 = 1 << MIN_WINDOW_LOG;
pub const MAX_DECODE_MEMORY: u64 = 1 << MAX_DECODE_WINDOW_LOG;

/// Faster raw I/O justifies more compression threads.
/// `(bytes per second strictly above, thread cap)`, checked top-down.
const THROUGHPUT_STEPS: [(f64, u32); 3] = [
    (300.0 * MIB as f64, 8),
    (150.0 * MIB as f64, 6),
    (50.0 * MIB as f64, 4),
];
const SLOW_THROUGHPUT_THREADS: u32 = 2;

#[derive(Error, Debug)]
pub enum TuneError {
    #[error("cannot query system resources: {0}")]
    ResourceProbe(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encode,
    Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionParameters {
    pub level:   Level,
    pub threads: u32,
    /// Encode: window size (power of two).  Decode: memory ceiling.
    pub memory:  u64,
    pub auto:    bool,
}

// ── Resource probing ─────────────────────────────────────────────────────────

pub trait ResourceProbe {
    fn available_memory(&self) -> Result<u64, TuneError>;
    fn cpu_count(&self) -> Result<usize, TuneError>;
}

/// Live system state via `sysinfo` and `num_cpus`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ResourceProbe for SystemProbe {
    fn available_memory(&self) -> Result<u64, TuneError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(TuneError::ResourceProbe("unsupported platform".into()));
        }
        let mut sys = sysinfo::System::new();
        sys.refresh_memory();
        match sys.available_memory() {
            0 => Err(TuneError::ResourceProbe("available memory reported as zero".into())),
            n => Ok(n),
        }
    }

    fn cpu_count(&self) -> Result<usize, TuneError> {
        match num_cpus::get() {
            0 => Err(TuneError::ResourceProbe("no CPUs reported".into())),
            n => Ok(n),
        }
    }
}

/// Fixed answers, for tests and reproducible runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedProbe {
    pub memory: u64,
    pub cpus:   usize,
}

impl ResourceProbe for FixedProbe {
    fn available_memory(&self) -> Result<u64, TuneError> { Ok(self.memory) }
    fn cpu_count(&self) -> Result<usize, TuneError> { Ok(self.cpus) }
}

// ── Tuning ───────────────────────────────────────────────────────────────────

fn threads_for_throughput(bytes_per_sec: f64) -> u32 {
    THROUGHPUT_STEPS.iter()
        .find(|(floor, _)| bytes_per_sec > *floor)
        .map(|&(_, threads)| threads)
        .unwrap_or(SLOW_THROUGHPUT_THREADS)
}

fn level_for_payload(size: u64) -> Level {
    match size {
        s if s < MIB      => Level::Fastest,
        s if s < 10 * MIB => Level::Default,
        _                 => Level::Better,
    }
}

fn fraction_of(available: u64, fraction: f64) -> u64 {
    (available as f64 * fraction) as u64
}

/// Largest power of two `<= n`; 0 stays 0.
fn floor_pow2(n: u64) -> u64 {
    match n {
        0 => 0,
        n => 1 << (63 - n.leading_zeros()),
    }
}

fn cpu_cap(cpus: usize) -> u32 {
    u32::try_from(cpus).unwrap_or(u32::MAX).clamp(1, MAX_THREADS)
}

fn auto(
    probe:      &dyn ResourceProbe,
    throughput: f64,
    payload:    u64,
    direction:  Direction,
) -> Result<CompressionParameters, TuneError> {
    let available = probe.available_memory()?;
    let cpus = cpu_cap(probe.cpu_count()?);

    let by_memory = u32::try_from(available / MEMORY_PER_THREAD).unwrap_or(u32::MAX).max(1);
    let by_speed  = threads_for_throughput(throughput);
    let threads   = cpus.min(by_memory).min(by_speed);

    let level = match direction {
        Direction::Encode => level_for_payload(payload),
        Direction::Decode => Level::Default,
    };

    Ok(CompressionParameters {
        level,
        threads,
        memory: fraction_of(available, AUTO_MEMORY_FRACTION),
        auto: true,
    })
}

fn explicit(probe: &dyn ResourceProbe, e: &Explicit) -> Result<CompressionParameters, TuneError> {
    let cpus = cpu_cap(probe.cpu_count()?);
    let threads = match e.threads {
        0 => cpus,
        t => t.min(cpus),
    };
    let memory = match e.memory {
        None                        => DEFAULT_MEMORY,
        Some(MemoryHint::Bytes(n))  => n,
        Some(MemoryHint::Percent(p)) => {
            fraction_of(probe.available_memory()?, p.min(100) as f64 / 100.0)
        }
    };
    Ok(CompressionParameters { level: e.level, threads, memory, auto: false })
}

/// Produce parameters for one stream in `direction`.
///
/// `throughput` is a raw write benchmark in bytes/second; `payload` is the sum
/// of file sizes being packed (ignored when decoding).  A failing probe aborts
/// tuning; there is no silent fallback.
pub fn tune(
    directive:  &Directive,
    probe:      &dyn ResourceProbe,
    throughput: f64,
    payload:    u64,
    direction:  Direction,
) -> Result<CompressionParameters, TuneError> {
    let mut p = match directive {
        Directive::Auto        => auto(probe, throughput, payload, direction)?,
        Directive::Explicit(e) => explicit(probe, e)?,
    };
    p.threads = p.threads.clamp(1, MAX_THREADS);

    match direction {
        Direction::Encode => {
            p.memory = floor_pow2(p.memory).clamp(MIN_ENCODE_MEMORY, MAX_ENCODE_MEMORY);
        }
        Direction::Decode => {
            p.threads = p.threads.min(MAX_DECODE_THREADS);
            p.memory = p.memory.clamp(MIN_DECODE_MEMORY, MAX_DECODE_MEMORY);
        }
    }

    debug!(
        "zstd {:?}: level={} threads={} memory={} KiB auto={}",
        direction, p.level.name(), p.threads, p.memory / KIB, p.auto
    );
    Ok(p)
}
