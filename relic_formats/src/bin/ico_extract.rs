use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use relic_formats::{IcoCurFile, IcoCurImage, is_png_payload};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Extract icon and cursor containers to image files", version)]
struct Args {
    /// Container to extract (may be passed multiple times)
    #[arg(long = "file", value_name = "PATH", conflicts_with = "root")]
    files: Vec<PathBuf>,

    /// Directory to scan recursively for .ico/.cur files when --file is not used
    #[arg(long = "root", value_name = "DIR", conflicts_with = "files")]
    root: Option<PathBuf>,

    /// Destination directory to materialise images
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let containers = resolve_container_paths(&args);
    if containers.is_empty() {
        bail!("no icon or cursor files to extract");
    }

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for container_path in containers {
        // A bad container is reported, not fatal.
        match IcoCurFile::open(&container_path) {
            Ok(file) => extract_container(&file, &args.dest, args.overwrite)?,
            Err(err) => eprintln!("skipping {}: {err}", container_path.display()),
        }
    }

    Ok(())
}

fn resolve_container_paths(args: &Args) -> Vec<PathBuf> {
    let mut containers = Vec::new();

    if !args.files.is_empty() {
        containers.extend(args.files.iter().cloned());
    } else if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            if entry.file_type().is_file() {
                let matches = entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        ext.eq_ignore_ascii_case("ico") || ext.eq_ignore_ascii_case("cur")
                    })
                    .unwrap_or(false);
                if matches {
                    containers.push(entry.into_path());
                }
            }
        }
    }

    containers.sort();
    containers.dedup();

    containers
}

fn extract_container(file: &IcoCurFile, dest_root: &Path, overwrite: bool) -> Result<()> {
    let stem = file
        .path()
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(|stem| stem.to_string())
        .unwrap_or_else(|| "icons".to_string());

    let container_dest = dest_root.join(stem);
    fs::create_dir_all(&container_dest)
        .with_context(|| format!("creating {}", container_dest.display()))?;

    let mut written = 0usize;
    let mut skipped = 0usize;
    for (index, entry) in file.entries().iter().enumerate() {
        // PNG payloads are stored streams; hand them through untouched.
        let is_png = match file.payload(entry) {
            Ok(payload) => is_png_payload(payload),
            Err(err) => {
                eprintln!(
                    "skipping entry {index} of {}: {err}",
                    file.path().display()
                );
                skipped += 1;
                continue;
            }
        };

        let extension = if is_png { "png" } else { "bmp" };
        let dest_path = container_dest.join(format!("entry_{index:02}.{extension}"));
        if dest_path.exists() && !overwrite {
            continue;
        }

        let result = if is_png {
            file.payload(entry).map(|payload| payload.to_vec())
        } else {
            file.decode_entry(entry).map(|image| encode_bmp(&image))
        };
        match result {
            Ok(bytes) => {
                fs::write(&dest_path, bytes)
                    .with_context(|| format!("writing {}", dest_path.display()))?;
                written += 1;
            }
            Err(err) => {
                eprintln!(
                    "skipping entry {index} of {}: {err}",
                    file.path().display()
                );
                skipped += 1;
            }
        }
    }

    println!(
        "Extracted {} images from {} into {} ({} skipped)",
        written,
        file.path().display(),
        container_dest.display(),
        skipped
    );

    Ok(())
}

/// Serialise decoded RGBA as a 32-bpp bottom-up BMP. Alpha rides in the
/// fourth channel, which every current viewer honours for BI_RGB.
fn encode_bmp(image: &IcoCurImage) -> Vec<u8> {
    const FILE_HEADER: u32 = 14;
    const INFO_HEADER: u32 = 40;

    let stride = image.width as usize * 4;
    let image_size = stride * image.height as usize;
    let mut out = Vec::with_capacity(FILE_HEADER as usize + INFO_HEADER as usize + image_size);

    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(FILE_HEADER + INFO_HEADER + image_size as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(FILE_HEADER + INFO_HEADER).to_le_bytes());

    out.extend_from_slice(&INFO_HEADER.to_le_bytes());
    out.extend_from_slice(&(image.width as i32).to_le_bytes());
    out.extend_from_slice(&(image.height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&32u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(image_size as u32).to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&2835i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    for row in (0..image.height as usize).rev() {
        let base = row * stride;
        for pixel in image.rgba[base..base + stride].chunks_exact(4) {
            out.extend_from_slice(&[pixel[2], pixel[1], pixel[0], pixel[3]]);
        }
    }

    out
}
