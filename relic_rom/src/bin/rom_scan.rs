use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use relic_rom::{RomImage, registry};
use serde::Serialize;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Identify MT-32 family ROM images by size and name", version)]
struct Args {
    /// ROM files to identify
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Directory to scan recursively for .rom files
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Emit JSON instead of aligned text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// List every known descriptor instead of scanning files
    #[arg(long, conflicts_with_all = ["paths", "root"])]
    all: bool,
}

#[derive(Debug, Serialize)]
struct ScanRecord {
    path: String,
    file_size: u64,
    short_name: &'static str,
    description: &'static str,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if args.all {
        return list_registry(args.json);
    }

    let mut paths = args.paths.clone();
    if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            if entry.file_type().is_file() {
                let matches = entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("rom"))
                    .unwrap_or(false);
                if matches {
                    paths.push(entry.into_path());
                }
            }
        }
    }
    paths.sort();
    paths.dedup();
    if paths.is_empty() {
        bail!("no ROM files to identify; pass paths, --root, or --all");
    }

    let mut records = Vec::new();
    for path in &paths {
        // A file the registry does not know is reported, not fatal.
        match RomImage::open(path) {
            Ok(image) => records.push(ScanRecord {
                path: path.display().to_string(),
                file_size: image.file_size(),
                short_name: image.descriptor().short_name,
                description: image.descriptor().description,
            }),
            Err(err) => eprintln!("{}: {err}", path.display()),
        }
    }

    if args.json {
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        serde_json::to_writer_pretty(&mut writer, &records)?;
        writeln!(writer)?;
    } else {
        for record in &records {
            println!(
                "{path:<40} {size:>9} {short:<18} {description}",
                path = record.path,
                size = record.file_size,
                short = record.short_name,
                description = record.description
            );
        }
    }

    Ok(())
}

fn list_registry(json: bool) -> Result<()> {
    if json {
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        serde_json::to_writer_pretty(&mut writer, registry())?;
        writeln!(writer)?;
        return Ok(());
    }
    for descriptor in registry() {
        println!(
            "{size:>9} {short:<18} {pairing:<12} {description}",
            size = descriptor.file_size,
            short = descriptor.short_name,
            pairing = format!("{:?}", descriptor.pairing),
            description = descriptor.description
        );
    }
    Ok(())
}
