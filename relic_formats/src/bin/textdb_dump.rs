use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relic_formats::TextDb;

#[derive(Parser, Debug)]
#[command(about = "Dump packed text databases", version)]
struct Args {
    /// Packed text database to read
    #[arg(long)]
    input: PathBuf,

    /// Optional comments blob to merge before printing
    #[arg(long, value_name = "PATH")]
    comments: Option<PathBuf>,

    /// Emit JSON instead of aligned text
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Pretty-print the JSON output
    #[arg(long, default_value_t = false, requires = "json")]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bytes = fs::read(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mut db = TextDb::parse(&bytes)?;

    if let Some(comments_path) = args.comments.as_ref() {
        let comment_bytes = fs::read(comments_path)
            .with_context(|| format!("reading {}", comments_path.display()))?;
        let merged = db.merge_comments(&comment_bytes)?;
        eprintln!("merged {merged} comments from {}", comments_path.display());
    }

    if args.json {
        let entries: Vec<_> = db.iter().collect();
        let stdout = io::stdout();
        let mut writer = stdout.lock();
        if args.pretty {
            serde_json::to_writer_pretty(&mut writer, &entries)?;
        } else {
            serde_json::to_writer(&mut writer, &entries)?;
        }
        writeln!(writer)?;
    } else {
        for entry in db.iter() {
            if entry.sound.is_empty() {
                println!("{:<24} {}", entry.id, entry.text);
            } else {
                println!("{:<24} {} [{}]", entry.id, entry.text, entry.sound);
            }
        }
    }

    Ok(())
}
