use std::env;
use std::fs;

use anyhow::{Context, Result};
use relic_formats::lzw;

fn main() -> Result<()> {
    env_logger::init();
    let mut args = env::args().skip(1);
    let input = args.next().context("usage: lzw_pack <input> <output>")?;
    let output = args.next().context("usage: lzw_pack <input> <output>")?;

    let bytes = fs::read(&input).with_context(|| format!("reading {input}"))?;
    let packed = lzw::pack(&bytes);
    fs::write(&output, &packed).with_context(|| format!("writing {output}"))?;

    println!(
        "{} -> {}: {} bytes in, {} bytes out ({:.1}%)",
        input,
        output,
        bytes.len(),
        packed.len(),
        100.0 * packed.len() as f64 / bytes.len().max(1) as f64
    );
    Ok(())
}
