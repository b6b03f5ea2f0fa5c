//! Top-level pipeline orchestration (`spec.md` §5): owns the configuration,
//! the extended entity stores, the diagnostic log, and drives every phase
//! in the fixed order `parse -> sort -> process-segments ->
//! process-relations -> prune -> super -> merge -> geo-sort -> write`.
//!
//! Grounded on `planetsplitter.c`'s `main`, which is the same kind of
//! straight-line driver calling into each component in sequence; the
//! difference here is that the driver owns an explicit context value
//! instead of reading/writing process-global state (`spec.md` §9).

use crate::callback::EntityBuilder;
use crate::config::Config;
use crate::entities::SegmentsX;
use crate::error::Result;
use crate::log::DiagnosticLog;
use crate::{fixme, log as logmod, prune, relations, segment, super_nodes, writer};
use std::path::PathBuf;

/// Summary counters reported once the pipeline finishes, mirroring the
/// per-phase progress output `planetsplitter` prints to stdout.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineStats {
    pub nodes_in: usize,
    pub ways_in: usize,
    pub segments_split: usize,
    pub segments_after_dedup: usize,
    pub super_nodes: usize,
    pub segments_final: usize,
    pub nodes_final: usize,
    pub pruned_straight: prune::PruneStats,
    pub pruned_isolated: prune::PruneStats,
    pub pruned_short: prune::PruneStats,
    pub turn_relations_resolved: usize,
    pub diagnostics_dataquality: u64,
    pub diagnostics_warning: u64,
}

/// Owns everything one run of the core needs: configuration, the staging
/// entity stores a parser feeds through `EntityBuilder`, and the
/// diagnostic log. Call [`Pipeline::run`] once all entities are appended.
pub struct Pipeline {
    pub config: Config,
    pub builder: EntityBuilder,
    log: DiagnosticLog,
}

impl Pipeline {
    pub fn new(config: Config) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.dir)?;
        let log_path = logmod::default_log_path(&config.dir, &config.prefix);
        let log = DiagnosticLog::create(&log_path)?;
        Ok(Pipeline {
            config,
            builder: EntityBuilder::new(),
            log,
        })
    }

    /// Run every phase in order and write the four final files. Call
    /// [`Pipeline::write_fixme_log`] afterwards to also emit the fixme
    /// companion file from whatever diagnostics this run recorded.
    pub fn run(&mut self) -> Result<PipelineStats> {
        let mut stats = PipelineStats::default();

        // D: sort the staged entities by OSM id.
        self.builder.nodes.sort();
        self.builder.ways.sort(&mut self.log);
        stats.nodes_in = self.builder.nodes.len();
        stats.ways_in = self.builder.ways.len();

        // E: explode ways into segments, then dedup/measure them.
        let mut segments = SegmentsX::new();
        segment::split_ways(&self.builder.nodes, &mut self.builder.ways, &mut segments, &mut self.log)?;
        stats.segments_split = segments.len();
        segment::process_segments(&self.builder.nodes, &mut self.builder.ways, &mut segments, &mut self.log)?;
        stats.segments_after_dedup = segments.len();
        segment::index_segments(&mut segments, self.builder.nodes.len());

        // F: route-tag fixpoint, then turn-restriction resolution against
        // the live graph (needs the segment adjacency index built above).
        relations::process_route_relations(&self.builder.route_relations, &mut self.builder.ways, &mut self.log);
        let mut turns = relations::process_turn_relations(
            &self.builder.turn_relations,
            &mut self.builder.nodes,
            &segments,
            &self.builder.ways,
            &mut self.log,
        );
        stats.turn_relations_resolved = turns.len();

        // G: pruning passes, each followed by the remap the next pass needs.
        let cfg = &self.config;
        let n = self.builder.nodes.len();
        stats.pruned_straight = prune::prune_straight(&self.builder.nodes, &self.builder.ways, &mut segments, cfg.prune_straight_m, n);
        prune::remove_pruned_segments(&mut segments, n);

        stats.pruned_isolated = prune::prune_isolated(&mut segments, cfg.prune_isolated_m, n);
        prune::remove_pruned_segments(&mut segments, n);

        let (short_stats, pdata) = prune::prune_short(&mut segments, cfg.prune_short_m, n);
        stats.pruned_short = short_stats;
        prune::apply_node_remap(&mut segments, &pdata);
        segment::index_segments(&mut segments, n);
        turns = prune::remap_turn_relations(turns, &pdata);

        // H: super-node selection and the two-level graph.
        stats.super_nodes = super_nodes::choose_super_nodes(&mut self.builder.nodes, &segments, &self.builder.ways);
        let raw_super = super_nodes::create_super_segments(&self.builder.nodes, &segments, &self.builder.ways);
        let deduped_super = super_nodes::deduplicate_super_segments(&raw_super, &self.builder.ways);
        let merged = super_nodes::merge_super_segments(&segments, &deduped_super);
        stats.segments_final = merged.len();

        // I: geographic re-indexing and the final file writer.
        writer::write_database(&self.builder.nodes, &merged, &self.builder.ways, &turns, &self.config.dir, &self.config.prefix)?;
        stats.nodes_final = self.builder.nodes.len();

        self.log.flush().map_err(|e| crate::error::CoreError::io(log_path(&self.config), e))?;
        let (dq, warn) = self.log.counts();
        stats.diagnostics_dataquality = dq;
        stats.diagnostics_warning = warn;

        Ok(stats)
    }

    /// Re-resolve every diagnostic recorded by [`Pipeline::run`] against the
    /// already-sorted entity stores and write the `butterfly-fixme`
    /// companion file.
    ///
    /// Separate from [`Pipeline::run`] because the fixme side only needs
    /// the sorted NodesX/WaysX/RouteRelsX, not the full segment/super-node
    /// pipeline (`spec.md` §4.J: "the fixme binary writes its own small
    /// pipeline").
    pub fn write_fixme_log(&self) -> Result<PathBuf> {
        let (grid, entries) = fixme::build_error_log(
            self.log.diagnostics(),
            &self.builder.nodes,
            &self.builder.ways,
            &self.builder.route_relations,
        );
        let path = self.config.dir.join(format!("{}-fixme.mem", self.config.prefix));
        fixme::write_error_log(&path, &grid, &entries)?;
        Ok(path)
    }

    pub fn diagnostics(&self) -> &[logmod::Diagnostic] {
        self.log.diagnostics()
    }
}

fn log_path(config: &Config) -> PathBuf {
    logmod::default_log_path(&config.dir, &config.prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{transports, way_flags, Way};
    use tempfile::tempdir;

    fn way() -> Way {
        Way {
            name: 0,
            highway_type: way_flags::HIGHWAY_MASK & 1,
            allow: transports::ALL_VEHICLES,
            props: 0,
            speed: 50,
            weight: 0,
            height: 0,
            width: 0,
            length: 0,
            incline: 0,
        }
    }

    #[test]
    fn end_to_end_single_way_two_nodes() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.dir = dir.path().to_path_buf();
        config.tmp_dir = dir.path().to_path_buf();
        config.prefix = "test".into();

        let mut pipeline = Pipeline::new(config).unwrap();
        pipeline.builder.append_node(1, 0.0, 0.0, transports::ALL_VEHICLES).unwrap();
        pipeline.builder.append_node(2, 0.0, 0.001, transports::ALL_VEHICLES).unwrap();
        pipeline.builder.append_way(100, way(), vec![1, 2], "Test Rd".into()).unwrap();

        let stats = pipeline.run().unwrap();
        assert_eq!(stats.nodes_in, 2);
        assert_eq!(stats.ways_in, 1);
        assert_eq!(stats.segments_after_dedup, 1);
        assert_eq!(stats.segments_final, 1);

        assert!(dir.path().join("test-nodes.mem").exists());
        assert!(dir.path().join("test-segments.mem").exists());
        assert!(dir.path().join("test-ways.mem").exists());
        assert!(dir.path().join("test-relations.mem").exists());
    }
}
