//! lbr CLI
//!
//! Create, list, extract and modify C64 LBR archives.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lbr::{
    AppendOptions, BuildOptions, ExtractOptions, ListOptions, TextConfig,
};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "lbr")]
#[command(version)]
#[command(about = "Create, extract and modify C64 LBR archives")]
#[command(after_help = "Please backup files before using the program.")]
struct Cli {
    /// Do not convert names between ASCII and PETSCII
    #[arg(short = 'P', long = "no-conversion", global = true)]
    no_conversion: bool,

    /// Increase verbosity of printing
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create an archive with the given files
    #[command(name = "create", visible_alias = "c")]
    Create {
        archive: PathBuf,

        /// Files and directories to archive
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Sort files numerically
        #[arg(short = 'n', long = "sort")]
        sort: bool,

        /// With --sort, add deleted files as padding for numeric gaps
        #[arg(short = 'p', long = "pad-sorted", requires = "sort")]
        pad_sorted: bool,

        /// Remove extensions when adding files to the archive
        #[arg(short = 's', long = "strip")]
        strip: bool,
    },

    /// Print out entries in the archive
    #[command(name = "list", visible_alias = "l")]
    List {
        archive: PathBuf,

        /// Sort entries numerically
        #[arg(short = 'n', long = "sort")]
        sort: bool,

        /// Skip over files marked as deleted (filetype D)
        #[arg(short = 'b', long = "skip-deleted")]
        skip_deleted: bool,
    },

    /// Extract from the archive
    #[command(name = "extract", visible_alias = "x")]
    Extract {
        archive: PathBuf,

        /// Only extract the named entries (default: all)
        targets: Vec<String>,

        /// Folder to extract into
        #[arg(short = 'E', long = "into", default_value = ".")]
        into: PathBuf,

        /// Skip over files marked as deleted (filetype D)
        #[arg(short = 'b', long = "skip-deleted")]
        skip_deleted: bool,

        /// Add a type-derived extension to extracted files
        #[arg(short = 'X', long = "add-extension")]
        add_extension: bool,
    },

    /// Add files to the end of the archive
    #[command(name = "append", visible_alias = "a")]
    Append {
        archive: PathBuf,

        /// Files and directories to add
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Remove extensions when adding files to the archive
        #[arg(short = 's', long = "strip")]
        strip: bool,
    },

    /// Delete a file from the archive, keeping the entry
    #[command(name = "delete", visible_alias = "d")]
    Delete {
        archive: PathBuf,
        name: String,

        /// Skip over files marked as deleted (filetype D)
        #[arg(short = 'b', long = "skip-deleted")]
        skip_deleted: bool,
    },

    /// Delete a file from the archive completely
    #[command(name = "wipe", visible_alias = "w")]
    Wipe {
        archive: PathBuf,
        name: String,

        /// Skip over files marked as deleted (filetype D)
        #[arg(short = 'b', long = "skip-deleted")]
        skip_deleted: bool,
    },

    /// Change the filetype of a file in the archive
    #[command(name = "retype", visible_alias = "t")]
    Retype {
        archive: PathBuf,

        /// Target and new type, as NAME:TYPE
        #[arg(value_name = "NAME:TYPE")]
        target: String,

        /// Skip over files marked as deleted (filetype D)
        #[arg(short = 'b', long = "skip-deleted")]
        skip_deleted: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let text = TextConfig {
        convert: !cli.no_conversion,
    };

    match cli.command {
        Commands::Create {
            archive,
            inputs,
            sort,
            pad_sorted,
            strip,
        } => {
            let inputs = expand_inputs(&inputs)?;
            if cli.verbose {
                for input in &inputs {
                    println!("+ {}", input.display());
                }
            }
            let opts = BuildOptions {
                numeric_sort: sort,
                numeric_pad: pad_sorted,
                strip_extension: strip,
                text,
            };
            lbr::build(&archive, &inputs, &opts)
                .with_context(|| format!("failed to create {}", archive.display()))?;
        }

        Commands::List {
            archive,
            sort,
            skip_deleted,
        } => {
            require_exists(&archive)?;
            let opts = ListOptions {
                skip_deleted,
                numeric_sort: sort,
                text,
            };
            let listing = lbr::list(open_archive(&archive)?, &opts)
                .with_context(|| format!("failed to list {}", archive.display()))?;
            if cli.verbose {
                let basename = archive
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| archive.display().to_string());
                println!("{} {} entries", basename, listing.declared_count());
            }
            for line in listing {
                println!("{}", line);
            }
        }

        Commands::Extract {
            archive,
            targets,
            into,
            skip_deleted,
            add_extension,
        } => {
            require_exists(&archive)?;
            if !into.exists() {
                fs::create_dir_all(&into)
                    .with_context(|| format!("failed to create {}", into.display()))?;
            }
            let opts = ExtractOptions {
                skip_deleted,
                add_extension,
                text,
            };
            let written = lbr::extract(open_archive(&archive)?, &into, &targets, &opts)
                .with_context(|| format!("failed to extract {}", archive.display()))?;
            if cli.verbose {
                for name in &written {
                    println!("{}", name);
                }
            }
        }

        Commands::Append {
            archive,
            inputs,
            strip,
        } => {
            require_exists(&archive)?;
            let inputs = expand_inputs(&inputs)?;
            if cli.verbose {
                for input in &inputs {
                    println!("+ {}", input.display());
                }
            }
            let opts = AppendOptions {
                strip_extension: strip,
                text,
            };
            lbr::append(&archive, &inputs, &opts)
                .with_context(|| format!("failed to append to {}", archive.display()))?;
        }

        Commands::Delete {
            archive,
            name,
            skip_deleted,
        } => {
            require_exists(&archive)?;
            lbr::delete(&archive, &name, skip_deleted, &text)
                .context("no deletion occurred")?;
        }

        Commands::Wipe {
            archive,
            name,
            skip_deleted,
        } => {
            require_exists(&archive)?;
            lbr::wipe(&archive, &name, skip_deleted, &text)
                .context("no deletion occurred")?;
        }

        Commands::Retype {
            archive,
            target,
            skip_deleted,
        } => {
            require_exists(&archive)?;
            let colon = match target.rfind(':') {
                Some(pos) => pos,
                None => bail!("missing separator in argument, expected NAME:TYPE"),
            };
            let (name, new_type) = (&target[..colon], &target[colon + 1..]);
            lbr::change_type(&archive, name, new_type, skip_deleted, &text)
                .with_context(|| format!("failed to change type of {}", name))?;
        }
    }

    Ok(())
}

fn open_archive(path: &Path) -> Result<BufReader<File>> {
    let file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn require_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    Ok(())
}

/// Expand directory arguments into their contained files; plain files
/// pass through after an existence check.
fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for input in inputs {
        if input.is_dir() {
            for entry in walkdir::WalkDir::new(input).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() {
                    out.push(entry.into_path());
                }
            }
        } else {
            require_exists(input)?;
            out.push(input.clone());
        }
    }
    Ok(out)
}
