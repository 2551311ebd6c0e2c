use std::env;
use std::fs;

use anyhow::{Context, Result};
use relic_formats::{decode_ppic, peek_ppic_metadata};

fn main() -> Result<()> {
    env_logger::init();
    let mut path = None;
    let mut ascii = false;
    for arg in env::args().skip(1) {
        if arg == "--ascii" {
            ascii = true;
        } else {
            path = Some(arg);
        }
    }
    let path = path.context("usage: ppic_dump <packed bitmap> [--ascii]")?;
    let bytes = fs::read(&path).with_context(|| format!("reading {path}"))?;

    let metadata = peek_ppic_metadata(&bytes)?;
    println!(
        "{path}: mode {} {}x{} ({} packed bytes)",
        metadata.mode,
        metadata.width,
        metadata.height,
        bytes.len()
    );

    if ascii {
        let image = decode_ppic(&bytes)?;
        print!("{}", image.to_ascii());
    }

    Ok(())
}
