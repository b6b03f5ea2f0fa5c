//! CLI entry point for the graph-construction pipeline.
//!
//! Parsing OSM XML/PBF/O5M extracts is a separate, out-of-scope component
//! (`spec.md` §1): this binary accepts a simple line-based extract format
//! instead of wiring up a real parser, so the pipeline can be exercised
//! end to end without one. Each line is one of:
//!
//! ```text
//! N <id> <lat> <lon> <allow>
//! W <id> <allow> <name> <node_id> <node_id> ...
//! ```
//!
//! A production deployment would replace [`load_extract`] with calls into
//! a PBF/O5M/XML parser feeding the same [`butterfly_split::callback::EntityBuilder`].

use anyhow::{Context, Result};
use butterfly_split::callback::EntityBuilder;
use butterfly_split::config::Config;
use butterfly_split::model::Way;
use butterfly_split::pipeline::Pipeline;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "butterfly-split")]
#[command(about = "Build a routable segment database from an OSM extract", long_about = None)]
struct Cli {
    /// Line-based extract file(s) to read (see module docs for the format).
    input: Vec<PathBuf>,

    /// Output directory for the `<prefix>-*.mem` files.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Directory for intermediate run files used by the external sort.
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Prefix for every output filename.
    #[arg(long, default_value = "planet")]
    prefix: String,

    /// RAM budget for the external sort, in MiB.
    #[arg(long, default_value_t = 64)]
    sort_ram_mb: u32,

    /// Worker threads for building sorted runs.
    #[arg(long, default_value_t = 1)]
    sort_threads: u32,

    /// Keep intermediate files after a successful run.
    #[arg(long)]
    keep_intermediate: bool,

    /// Also write the fixme companion file from this run's diagnostics.
    #[arg(long)]
    fixme: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_extract(paths: &[PathBuf], builder: &mut EntityBuilder) -> Result<()> {
    for path in paths {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.first().copied() {
                Some("N") => {
                    let id: u64 = fields[1].parse()?;
                    let lat: f64 = fields[2].parse()?;
                    let lon: f64 = fields[3].parse()?;
                    let allow: u16 = fields[4].parse()?;
                    builder.append_node(id, lat, lon, allow)?;
                }
                Some("W") => {
                    let id: u64 = fields[1].parse()?;
                    let allow: u16 = fields[2].parse()?;
                    let name = fields[3].to_string();
                    let node_refs: Result<Vec<u64>, _> = fields[4..].iter().map(|f| f.parse::<u64>()).collect();
                    let way = Way {
                        name: 0,
                        highway_type: 1,
                        allow,
                        props: 0,
                        speed: 50,
                        weight: 0,
                        height: 0,
                        width: 0,
                        length: 0,
                        incline: 0,
                    };
                    builder.append_way(id, way, node_refs?, name)?;
                }
                _ => anyhow::bail!("{}:{}: unrecognized record kind", path.display(), lineno + 1),
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = Config {
        tmp_dir: cli.tmp_dir.unwrap_or_else(|| cli.dir.clone()),
        dir: cli.dir,
        prefix: cli.prefix,
        sort_ram_mb: cli.sort_ram_mb,
        sort_threads: cli.sort_threads,
        keep_intermediate: cli.keep_intermediate,
        ..Config::default()
    };

    let mut pipeline = Pipeline::new(config).context("setting up the pipeline")?;
    load_extract(&cli.input, &mut pipeline.builder)?;

    let stats = pipeline.run().context("running the pipeline")?;
    println!(
        "{} nodes, {} ways -> {} segments ({} super-nodes, {} final segments)",
        stats.nodes_in, stats.ways_in, stats.segments_after_dedup, stats.super_nodes, stats.segments_final
    );
    if stats.diagnostics_dataquality > 0 || stats.diagnostics_warning > 0 {
        println!(
            "{} data-quality diagnostics, {} warnings",
            stats.diagnostics_dataquality, stats.diagnostics_warning
        );
    }

    if cli.fixme {
        let path = pipeline.write_fixme_log().context("writing fixme log")?;
        println!("fixme log written to {}", path.display());
    }

    Ok(())
}
