use std::env;

use anyhow::{Context, Result};
use relic_formats::BankFile;

fn main() -> Result<()> {
    env_logger::init();
    let path = env::args().nth(1).context("usage: bank_dump <bank file>")?;
    let bank = BankFile::open(&path)?;
    println!("{} entries in {}", bank.num_entries(), bank.path().display());
    for (index, entry) in bank.entries().iter().enumerate() {
        let codec = entry
            .codec()
            .map(|codec| codec.name())
            .unwrap_or("unknown");
        let geometry = if entry.width != 0 || entry.height != 0 {
            format!("{}x{}", entry.width, entry.height)
        } else {
            "-".to_string()
        };
        println!(
            "{index:>3} id {id:>5} {size:>9} {geometry:<9} {codec:<7} @ {offset}",
            id = entry.id,
            size = entry.data_size,
            offset = entry.data_offset,
        );
    }
    Ok(())
}
