use std::env;

use anyhow::{Context, Result};
use relic_formats::{IcoCurFile, IcoCurKind, is_png_payload};

fn main() -> Result<()> {
    env_logger::init();
    let path = env::args()
        .nth(1)
        .context("usage: ico_dump <ICO/CUR file>")?;
    let file = IcoCurFile::open(&path)?;
    let kind = match file.kind() {
        IcoCurKind::Icon => "icon",
        IcoCurKind::Cursor => "cursor",
    };
    println!(
        "{} {} entries in {}",
        file.num_entries(),
        kind,
        file.path().display()
    );
    for (index, entry) in file.entries().iter().enumerate() {
        let detail = match file.kind() {
            IcoCurKind::Icon => format!("{} bpp", entry.bpp_or_hotspot_y),
            IcoCurKind::Cursor => format!(
                "hotspot {},{}",
                entry.planes_or_hotspot_x, entry.bpp_or_hotspot_y
            ),
        };
        let codec = match file.payload(entry) {
            Ok(payload) if is_png_payload(payload) => "png",
            Ok(_) => "dib",
            Err(_) => "unreadable",
        };
        println!(
            "{index:>3} {size:>9} {width:>4}x{height:<4} {detail:<14} {codec:<10} @ {offset}",
            size = entry.data_size,
            width = entry.width,
            height = entry.height,
            offset = entry.data_offset,
        );
    }
    Ok(())
}
