use anyhow::{Context, Result};
use lume_meshlet::ProcessorConfig;
use std::path::Path;

/// Reads a TOML processor config, or the defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<ProcessorConfig> {
    let Some(path) = path else {
        return Ok(ProcessorConfig::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("Failed to parse config {}", path.display()))
}

pub fn parse_config(text: &str) -> Result<ProcessorConfig> {
    Ok(toml::from_str(text)?)
}

/// Command-line settings that win over the config file.
#[derive(clap::Args, Debug, Default)]
pub struct Overrides {
    #[clap(long, value_parser)]
    pub max_vertices: Option<usize>,
    #[clap(long, value_parser)]
    pub max_triangles: Option<usize>,
    #[clap(long, value_parser)]
    pub cone_weight: Option<f32>,
    /// Children per cluster node
    #[clap(long, value_parser)]
    pub partition_size: Option<usize>,
    /// Meshlet count below which no hierarchy is built
    #[clap(long, value_parser)]
    pub min_root: Option<usize>,
    /// Cluster level addressed by the meshlet index table
    #[clap(long, value_parser)]
    pub target_depth: Option<usize>,
    /// Always bake 32-bit indices
    #[clap(long = "index-32", action)]
    pub index_32: bool,
}

impl Overrides {
    pub fn apply(&self, config: &mut ProcessorConfig) {
        if let Some(v) = self.max_vertices {
            config.max_vertices = v;
        }
        if let Some(v) = self.max_triangles {
            config.max_triangles = v;
        }
        if let Some(v) = self.cone_weight {
            config.cone_weight = v;
        }
        if let Some(v) = self.partition_size {
            config.hierarchy.partition_size = v;
        }
        if let Some(v) = self.min_root {
            config.hierarchy.min_root_count = v;
        }
        if self.target_depth.is_some() {
            config.target_depth = self.target_depth;
        }
        if self.index_32 {
            config.force_32bit_indices = true;
        }
    }
}
