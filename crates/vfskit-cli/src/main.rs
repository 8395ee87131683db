//! vfskit CLI - Inspect mapping documents and browse files through the VFS
//!
//! Usage:
//!   vfskit check overlay.yaml              # Validate a mapping document
//!   vfskit mappings overlay.yaml           # List virtual -> external pairs
//!   vfskit stat -m overlay.yaml /v/a.h     # Status through the mapping
//!   vfskit cat /etc/hostname               # Read from the host file system
//!   vfskit ls -R -m overlay.yaml /v        # Recursive listing

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use vfskit::{
    real_file_system, Diagnostic, FileSystem, RecursiveDirIter, RedirectingBuilder,
    RedirectingFileSystem, Status,
};

/// vfskit - Layered virtual file system tools
#[derive(Parser, Debug)]
#[command(name = "vfskit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a mapping document and report every problem
    Check {
        /// Mapping document (YAML or JSON)
        mapping: PathBuf,
    },
    /// List the virtual -> external pairs of a mapping document
    Mappings {
        mapping: PathBuf,
    },
    /// Print the status of a path
    Stat {
        /// Resolve through this mapping document
        #[arg(short, long)]
        mapping: Option<PathBuf>,
        path: PathBuf,
    },
    /// Print file contents
    Cat {
        #[arg(short, long)]
        mapping: Option<PathBuf>,
        path: PathBuf,
    },
    /// List a directory
    Ls {
        #[arg(short, long)]
        mapping: Option<PathBuf>,
        /// Walk subdirectories
        #[arg(short = 'R', long)]
        recursive: bool,
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::ERROR
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    match args.command {
        Command::Check { mapping } => {
            let fs = load_mapping(&mapping)?;
            println!(
                "{}: ok ({} mappings)",
                mapping.display(),
                fs.mappings().len()
            );
        }
        Command::Mappings { mapping } => {
            let fs = load_mapping(&mapping)?;
            for (virtual_path, external) in fs.mappings() {
                println!("{} -> {}", virtual_path.display(), external.display());
            }
        }
        Command::Stat { mapping, path } => {
            let fs = backend(mapping.as_deref())?;
            let status = fs
                .status(&path)
                .with_context(|| format!("Failed to stat {}", path.display()))?;
            print_status(&status);
        }
        Command::Cat { mapping, path } => {
            let fs = backend(mapping.as_deref())?;
            let buffer = fs
                .buffer_for_file(&path, None, false, false)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            std::io::stdout()
                .write_all(buffer.as_bytes())
                .context("Failed to write output")?;
        }
        Command::Ls {
            mapping,
            recursive,
            path,
        } => {
            let fs = backend(mapping.as_deref())?;
            list(fs.as_ref(), &path, recursive)?;
        }
    }
    Ok(())
}

/// Host file system, or a redirecting backend over it.
fn backend(mapping: Option<&Path>) -> Result<Arc<dyn FileSystem>> {
    match mapping {
        Some(mapping) => Ok(Arc::new(load_mapping(mapping)?)),
        None => Ok(real_file_system()),
    }
}

fn load_mapping(path: &Path) -> Result<RedirectingFileSystem> {
    let mut report = |diagnostic: &Diagnostic| {
        eprintln!("{}: {}", path.display(), diagnostic);
    };
    RedirectingBuilder::new(real_file_system())
        .build_from_path(path, &mut report)
        .with_context(|| format!("Failed to load mapping {}", path.display()))
}

fn print_status(status: &Status) {
    let uid = status.unique_id();
    println!("name:        {}", status.name().display());
    println!("type:        {:?}", status.file_type());
    println!("size:        {}", status.size());
    println!("permissions: {:o}", status.permissions());
    println!("owner:       {}:{}", status.user(), status.group());
    println!("unique id:   {}:{}", uid.device, uid.file);
    println!("vfs mapped:  {}", status.is_vfs_mapped);
}

fn list(fs: &dyn FileSystem, dir: &Path, recursive: bool) -> Result<()> {
    if !recursive {
        let entries = fs
            .dir_begin(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?;
        for entry in entries {
            match entry {
                Ok(entry) => println!("{}", entry.path.display()),
                Err(err) => eprintln!("vfskit: {err}"),
            }
        }
        return Ok(());
    }

    let walk = RecursiveDirIter::new(fs, dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    for entry in walk {
        match entry {
            Ok(entry) => println!("{}", entry.path.display()),
            // unreadable subdirectories are skipped by the walk
            Err(err) => eprintln!("vfskit: {err}"),
        }
    }
    Ok(())
}
