// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Diagnostic CLI: dumps a SquashFS image's superblock, inode table,
//! directory table, or one resolved entry.

use clap::Parser;
use sqfsro::block::MmapSource;
use sqfsro::{diag, fs};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "sqfsdump",
    author = "Oxide Computer Company",
    version,
    about = "Inspect the contents of a SquashFS image"
)]
struct Args {
    /// Dump the superblock
    #[arg(short = 's', conflicts_with_all = ["inodes", "dirs", "entry"])]
    superblock: bool,

    /// Dump the inode table
    #[arg(short = 'i', conflicts_with_all = ["superblock", "dirs", "entry"])]
    inodes: bool,

    /// Dump the directory table
    #[arg(short = 'd', conflicts_with_all = ["superblock", "inodes", "entry"])]
    dirs: bool,

    /// Dump the entry at PATH (default "/"); trailing '/' denotes a directory
    #[arg(short = 'e', conflicts_with_all = ["superblock", "inodes", "dirs"])]
    entry: bool,

    /// Path to the SquashFS image
    image: PathBuf,

    /// Path within the image, used with -e (defaults to "/")
    path: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if !(args.superblock || args.inodes || args.dirs || args.entry) {
        eprintln!("usage: sqfsdump [-s|-i|-d|-e [path]] <image>");
        return ExitCode::from(2);
    }

    match run(&args) {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("sqfsdump: {}", e.short_message());
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> sqfsro::Result<String> {
    let file = File::open(&args.image)?;
    let source = MmapSource::new(&file)?;

    if args.superblock {
        let sb = fs::probe(&source)?;
        return Ok(diag::dump_superblock(&sb));
    }

    if args.inodes {
        let sb = fs::probe(&source)?;
        let table_end = sb.directory_table_start.min(sb.bytes_used);
        let table = sqfsro::metadata::MetaTable::decode(&source, sb.compression, sb.inode_table_start, table_end)?;
        return diag::dump_inode_table(table.bytes(), sb.block_size);
    }

    if args.dirs {
        let sb = fs::probe(&source)?;
        let table_end = if sb.fragment_table_start != sqfsro::superblock::NOT_PRESENT {
            sb.fragment_table_start
        } else {
            sb.bytes_used
        };
        let table = sqfsro::metadata::MetaTable::decode(&source, sb.compression, sb.directory_table_start, table_end)?;
        return diag::dump_dir_content(table.bytes(), table.len());
    }

    // args.entry
    let path = args.path.as_deref().unwrap_or("/");
    diag::dump_entry(&source, path.as_bytes())
}
