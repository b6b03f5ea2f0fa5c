//! Fixme log dumper, the read-side counterpart to `butterfly-split --fixme`
//! (`extras/find-fixme/fixme-dumper.c`).
//!
//! Reads the `<prefix>-fixme.mem` companion file `butterfly-split` wrote and
//! the `<prefix>.errorlog` text it indexes into, then either prints summary
//! statistics or lists every entry with its resolved coordinate and message.

use anyhow::{Context, Result};
use butterfly_split::segment::COORD_SCALE;
use clap::Parser;
use std::fs;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "butterfly-fixme")]
#[command(about = "Dump the fixme companion log written by butterfly-split --fixme", long_about = None)]
struct Cli {
    /// Directory containing `<prefix>-fixme.mem` and `<prefix>.errorlog`.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    #[arg(long, default_value = "planet")]
    prefix: String,

    /// Print counts only, no per-entry listing.
    #[arg(long)]
    statistics: bool,

    #[arg(long)]
    latmin: Option<f64>,
    #[arg(long)]
    latmax: Option<f64>,
    #[arg(long)]
    lonmin: Option<f64>,
    #[arg(long)]
    lonmax: Option<f64>,
}

struct Entry {
    offset: u64,
    length: u32,
    lat: i32,
    lon: i32,
}

impl Entry {
    fn is_geographic(&self) -> bool {
        self.lat != i32::MIN && self.lon != i32::MIN
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_i32(bytes: &[u8], at: usize) -> i32 {
    i32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

/// Parses the whole fixme.mem file: header, bin index (skipped, entries are
/// already stored in bin order and we only need them in bulk), then every
/// `ErrorLogX` record.
fn load_entries(path: &PathBuf) -> Result<Vec<Entry>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    anyhow::ensure!(bytes.len() >= 24, "{}: truncated header", path.display());

    let total = read_u32(&bytes, 0) as usize;
    let geographic = read_u32(&bytes, 4) as usize;
    let latbins = read_u32(&bytes, 8);
    let lonbins = read_u32(&bytes, 12);

    let bin_index_len = (latbins as usize * lonbins as usize + 1) * 4;
    let mut at = 24 + bin_index_len;

    let mut entries = Vec::with_capacity(total);
    for _ in 0..total {
        anyhow::ensure!(at + 20 <= bytes.len(), "{}: truncated entry table", path.display());
        entries.push(Entry {
            offset: read_u64(&bytes, at),
            length: read_u32(&bytes, at + 8),
            lat: read_i32(&bytes, at + 12),
            lon: read_i32(&bytes, at + 16),
        });
        at += 20;
    }

    anyhow::ensure!(
        entries.iter().filter(|e| e.is_geographic()).count() == geographic,
        "{}: geographic count mismatch",
        path.display()
    );
    Ok(entries)
}

fn in_bounds(entry: &Entry, cli: &Cli) -> bool {
    if !entry.is_geographic() {
        return cli.latmin.is_none() && cli.latmax.is_none() && cli.lonmin.is_none() && cli.lonmax.is_none();
    }
    let lat = entry.lat as f64 / COORD_SCALE;
    let lon = entry.lon as f64 / COORD_SCALE;
    cli.latmin.map_or(true, |v| lat >= v) && cli.latmax.map_or(true, |v| lat <= v) && cli.lonmin.map_or(true, |v| lon >= v) && cli.lonmax.map_or(true, |v| lon <= v)
}

fn read_message(log: &mut fs::File, offset: u64, length: u32) -> Result<String> {
    use std::io::Seek;
    log.seek(std::io::SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; length as usize];
    log.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).trim_end().to_string())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let fixme_path = cli.dir.join(format!("{}-fixme.mem", cli.prefix));
    let log_path = cli.dir.join(format!("{}.errorlog", cli.prefix));

    let entries = load_entries(&fixme_path)?;
    let mut log = fs::File::open(&log_path).with_context(|| format!("opening {}", log_path.display()))?;

    let matching: Vec<&Entry> = entries.iter().filter(|e| in_bounds(e, &cli)).collect();
    let geographic = matching.iter().filter(|e| e.is_geographic()).count();

    if cli.statistics {
        println!("{} entries total, {} geographic, {} unresolved", matching.len(), geographic, matching.len() - geographic);
        return Ok(());
    }

    for entry in matching {
        let message = read_message(&mut log, entry.offset, entry.length)?;
        if entry.is_geographic() {
            println!("{:.7},{:.7}: {}", entry.lat as f64 / COORD_SCALE, entry.lon as f64 / COORD_SCALE, message);
        } else {
            println!("?,?: {}", message);
        }
    }

    Ok(())
}
