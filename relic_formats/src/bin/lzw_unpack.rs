use std::env;
use std::fs;

use anyhow::{Context, Result};
use relic_formats::lzw;

fn main() -> Result<()> {
    env_logger::init();
    let mut args = env::args().skip(1);
    let input = args.next().context("usage: lzw_unpack <input> <output>")?;
    let output = args.next().context("usage: lzw_unpack <input> <output>")?;

    let bytes = fs::read(&input).with_context(|| format!("reading {input}"))?;
    let unpacked = lzw::unpack(&bytes)
        .with_context(|| format!("unpacking {input}"))?;
    fs::write(&output, &unpacked).with_context(|| format!("writing {output}"))?;

    println!(
        "{} -> {}: {} bytes in, {} bytes out",
        input,
        output,
        bytes.len(),
        unpacked.len()
    );
    Ok(())
}
