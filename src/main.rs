use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{command, Arg, ArgAction};
use dwarf_relocate::{Config, FileSink, Rewriter};

fn main() -> Result<()> {
    let matches = command!()
        .max_term_width(100)
        .args(&[
            Arg::new("input")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("The object file to rewrite"),
            Arg::new("base-dir")
                .short('b')
                .long("base-dir")
                .value_name("dir")
                .value_parser(clap::value_parser!(String))
                .help("Build-time directory prefix to replace"),
            Arg::new("dest-dir")
                .short('d')
                .long("dest-dir")
                .value_name("dir")
                .value_parser(clap::value_parser!(String))
                .requires("base-dir")
                .help("Deployment-time directory prefix to substitute; must not be longer than base-dir"),
            Arg::new("list-file")
                .short('l')
                .long("list-file")
                .value_name("file")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Append the rewritten object's source file list to this file"),
            Arg::new("win-path")
                .short('w')
                .long("win-path")
                .action(ArgAction::SetTrue)
                .help("Convert rewritten paths to use \\ instead of /"),
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose output"),
        ])
        .get_matches();

    if matches.get_flag("verbose") {
        env_logger::builder()
            .format_level(false)
            .format_target(false)
            .filter_module("dwarf_relocate", log::LevelFilter::Debug)
            .init();
    }

    let in_path = matches.get_one::<PathBuf>("input").unwrap();
    let in_file = fs::File::open(in_path)
        .with_context(|| format!("Failed to open input file '{}'", in_path.display()))?;
    let in_data = unsafe { memmap2::Mmap::map(&in_file) }
        .with_context(|| format!("Failed to map input file '{}'", in_path.display()))?;

    let mut rewriter = Rewriter::read(in_data.to_vec())
        .with_context(|| format!("Failed to parse input file '{}'", in_path.display()))?;

    let base_dir = matches
        .get_one::<String>("base-dir")
        .map(|s| s.clone().into_bytes());
    let dest_dir = matches
        .get_one::<String>("dest-dir")
        .map(|s| s.clone().into_bytes());
    let win_path = matches.get_flag("win-path");
    let config = Config::new(base_dir, dest_dir, win_path)
        .context("Invalid base-dir/dest-dir configuration")?;

    let mut list_sink = matches
        .get_one::<PathBuf>("list-file")
        .map(|path| -> Result<FileSink> {
            let file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open list file '{}'", path.display()))?;
            Ok(FileSink::new(file))
        })
        .transpose()?;

    rewriter
        .edit(&config, list_sink.as_mut().map(|s| s as &mut dyn dwarf_relocate::SourceListSink))
        .with_context(|| format!("Failed to rewrite debug paths in '{}'", in_path.display()))?;

    if config.dest_dir.is_none() {
        return Ok(());
    }

    let mut open_options = fs::OpenOptions::new();
    open_options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        use std::os::unix::fs::OpenOptionsExt;
        let in_metadata = in_file
            .metadata()
            .with_context(|| format!("Failed to read metadata of input file '{}'", in_path.display()))?;
        open_options.mode(in_metadata.mode());
    }
    // Drop the mapping before reopening the same path for write; the edited
    // bytes already live in `rewriter`, independent of the mapped pages.
    drop(in_data);
    drop(in_file);

    use std::io::Write;
    let mut out_file = open_options
        .open(in_path)
        .with_context(|| format!("Failed to reopen '{}' for writing", in_path.display()))?;
    out_file
        .write_all(&rewriter.into_data())
        .with_context(|| format!("Failed to write output file '{}'", in_path.display()))?;

    Ok(())
}
