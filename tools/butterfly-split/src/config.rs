//! Pipeline configuration (`spec.md` §6).
//!
//! A single value owns every tunable; it is threaded explicitly through the
//! pipeline instead of living behind `option_*` globals (`spec.md` §9,
//! "Global mutable I/O state").

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tmp_dir: PathBuf,
    pub dir: PathBuf,
    pub prefix: String,
    pub sort_ram_mb: u32,
    pub sort_threads: u32,
    pub tagging_rules: Option<PathBuf>,
    pub keep_intermediate: bool,
    pub append_mode: bool,
    pub max_super_iterations: u32,
    pub prune_isolated_m: u32,
    pub prune_short_m: u32,
    pub prune_straight_m: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tmp_dir: PathBuf::from("/tmp"),
            dir: PathBuf::from("."),
            prefix: "planet".to_string(),
            sort_ram_mb: 64,
            sort_threads: 1,
            tagging_rules: None,
            keep_intermediate: false,
            append_mode: false,
            max_super_iterations: 5,
            prune_isolated_m: 500,
            prune_short_m: 5,
            prune_straight_m: 3,
        }
    }
}

impl Config {
    pub fn sort_ram_bytes(&self) -> usize {
        self.sort_ram_mb as usize * 1024 * 1024
    }

    pub fn load_toml(path: &std::path::Path) -> anyhow::Result<Config> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }
}
