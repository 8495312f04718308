mod config;
mod obj;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Overrides;
use lume_meshlet::asset::container::{BlockId, BlockTable};
use lume_meshlet::{MeshletData, process_mesh, save_to_file};
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[clap(name = "lume-processor", version, about = "Builds and inspects meshlet containers")]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Convert an OBJ mesh into a meshlet container
    Convert {
        #[clap(value_parser)]
        input: PathBuf,
        #[clap(value_parser)]
        output: PathBuf,
        /// TOML file with processor settings
        #[clap(long, value_parser)]
        config: Option<PathBuf>,
        #[clap(flatten)]
        overrides: Overrides,
    },
    /// Print the block table and contents of a meshlet container
    Inspect {
        #[clap(value_parser)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match Cli::parse().command {
        Command::Convert {
            input,
            output,
            config,
            overrides,
        } => convert(&input, &output, config.as_deref(), &overrides).map(|_| ()),
        Command::Inspect { file } => inspect(&file),
    }
}

fn convert(input: &Path, output: &Path, config: Option<&Path>, overrides: &Overrides) -> Result<MeshletData> {
    let start_total = Instant::now();
    let mut config = config::load_config(config)?;
    overrides.apply(&mut config);
    config.validate()?;

    log::info!("Processing {}...", input.display());
    let mesh = obj::load_obj(input)?;
    log::info!(
        "Model loaded in {:.2?}: {} vertices, {} triangles",
        start_total.elapsed(),
        mesh.positions.len(),
        mesh.indices.len() / 3
    );

    let build_start = Instant::now();
    let data = process_mesh(&mesh, &config).with_context(|| format!("Failed to process {}", input.display()))?;
    log::info!(
        "Meshlet build complete in {:.2?}: {} meshlets, {} cluster levels",
        build_start.elapsed(),
        data.meshlets.len(),
        data.hierarchy.len()
    );

    let save_start = Instant::now();
    save_to_file(&data, output).with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Saved to {} in {:.2?}", output.display(), save_start.elapsed());
    log::info!("Total execution time: {:.2?}", start_total.elapsed());
    Ok(data)
}

fn block_name(id: u32) -> String {
    match BlockId::from_u32(id) {
        Some(block) => format!("{:?}", block),
        None => format!("Unknown({})", id),
    }
}

fn inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let table = BlockTable::parse(&bytes).with_context(|| format!("{} is not a meshlet container", path.display()))?;

    let header = table.header;
    log::info!(
        "{}: version {}, {} blocks, {} bytes",
        path.display(),
        { header.version },
        { header.block_count },
        { header.total_file_size }
    );
    for block in &table.blocks {
        let (id, offset, size, count, stride, meta1) = (block.id, block.offset, block.size, block.count, block.stride, block.meta1);
        log::info!(
            "  {:<18} offset {:>10} size {:>10} count {:>8} stride {:>3} meta {}",
            block_name(id),
            offset,
            size,
            count,
            stride,
            meta1
        );
    }

    let data = lume_meshlet::asset::decode(&bytes).with_context(|| format!("Failed to decode {}", path.display()))?;
    log::info!(
        "{} meshlets, {} triangles, {:?} index table, {} baked vertices",
        data.meshlets.len(),
        data.triangle_count(),
        data.table_format,
        data.baked.vertex_count()
    );
    if data.has_hierarchy() {
        for (depth, level) in data.hierarchy.iter().enumerate() {
            log::info!("  level {}: nodes {}..{}", depth, level.first_index, level.first_index + level.count);
        }
    } else {
        log::info!("  no cluster hierarchy");
    }
    Ok(())
}
