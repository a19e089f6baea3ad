use std::fs;
use std::path::{Path, PathBuf};

use bkbin::catalog;
use bkbin::data::rom::{RomImage, RomLayout};
use bkbin::{DanglingPolicy, DecodeOptions, MapModels, Model};
use clap::Parser;
use rayon::prelude::*;
use rootcause::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Inspect the map models stored in a ROM image
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ROM image (.z64, .v64 or .n64)
    rom: Option<PathBuf>,

    /// Catalog name of the map model to decode, e.g. "SM - Spiral Mountain"
    #[clap(short, long)]
    model: Option<String>,

    /// Model units per output unit
    #[clap(short, long, default_value_t = bkbin::handler::DEFAULT_SCALE_FACTOR)]
    scale: f32,

    /// Fail on dangling references instead of dropping them
    #[clap(long)]
    strict: bool,

    /// List the catalog and exit
    #[clap(long)]
    list: bool,

    /// Decode every catalog model and report per-model results
    #[clap(long)]
    all: bool,

    /// Print the decoded model as JSON
    #[clap(long)]
    json: bool,

    /// Write the model's textures as PNG files to this directory
    #[clap(long)]
    textures: Option<PathBuf>,

    /// Write the decompressed model files to this directory
    #[clap(long)]
    extract: Option<PathBuf>,
}

fn summarize(label: &str, model: &Model) {
    println!(
        "  {label}: {} vertices, {} triangles ({} visible), {} materials, {} textures, {} geometry nodes",
        model.vertices.len(),
        model.triangles.len(),
        model.visible_triangles().count(),
        model.materials.len(),
        model.textures.len(),
        model.geometry.nodes.len(),
    );
    for dropped in &model.diagnostics {
        println!("    dropped: {dropped}");
    }
}

fn write_textures(dir: &Path, models: &MapModels) -> Result<(), Report> {
    fs::create_dir_all(dir).context("Failed to create texture directory")?;
    for (label, model) in ["A", "B"].into_iter().zip(models.models()) {
        for (index, texture) in model.textures.iter().enumerate() {
            let png = match texture.to_png() {
                Ok(png) => png,
                Err(e) => {
                    warn!(index, error = %e, "skipping texture");
                    continue;
                }
            };
            let path = dir.join(format!("{label}_{index:02}.png"));
            fs::write(&path, png).context("Failed to write texture")?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Report> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list {
        for entry in catalog::entries() {
            match entry.b_slot() {
                Some(b) => println!("{:02X} {:02X} {}", entry.a_slot, b, entry.name),
                None => println!("{:02X} -- {}", entry.a_slot, entry.name),
            }
        }
        return Ok(());
    }

    let rom_path = args
        .rom
        .ok_or_else(|| rootcause::report!("A ROM image is required"))?;
    let rom = RomImage::open(&rom_path, RomLayout::default()).context("Failed to open ROM")?;

    let options = DecodeOptions::builder()
        .scale_factor(args.scale)
        .policy(if args.strict {
            DanglingPolicy::Strict
        } else {
            DanglingPolicy::Lenient
        })
        .build();
    options.validate().context("Invalid options")?;

    if args.all {
        let imports = bkbin::import_catalog(&rom, &options);
        let failed = imports.iter().filter(|import| import.result.is_err()).count();
        for import in &imports {
            match &import.result {
                Ok(models) => {
                    println!("{}", import.entry.name);
                    for (label, model) in ["A", "B"].into_iter().zip(models.models()) {
                        summarize(label, model);
                    }
                }
                Err(e) => println!("{}: FAILED: {e}", import.entry.name),
            }
        }
        info!(total = imports.len(), failed, "catalog import finished");
        return Ok(());
    }

    let Some(model_id) = args.model else {
        return Err(rootcause::report!("Pass --model, --all, or --list"));
    };

    if let Some(dir) = &args.extract {
        let location = rom.locate(&model_id).context("Failed to locate model")?;
        let entries: Vec<_> = std::iter::once(location.a).chain(location.b).collect();
        entries.par_iter().try_for_each(|entry| {
            let path = rom
                .extract_to_dir(entry, dir, &options.limits)
                .context("Failed to extract model file")?;
            println!("{}", path.display());
            Ok::<(), Report>(())
        })?;
    }

    let models = bkbin::load_from_rom(&rom, &model_id, &options).context("Failed to decode model")?;

    if args.json {
        let json = serde_json::to_string_pretty(&models).context("Failed to serialize model")?;
        println!("{json}");
    } else {
        println!("{}", models.entry.name);
        for (label, model) in ["A", "B"].into_iter().zip(models.models()) {
            summarize(label, model);
        }
    }

    if let Some(dir) = &args.textures {
        write_textures(dir, &models)?;
    }

    Ok(())
}
