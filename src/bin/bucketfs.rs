//! Mount a jammdb store file as a filesystem.
//!
//! ```text
//! bucketfs data.db /mnt/kv
//! ```
//!
//! Runs in the foreground until the mount point is unmounted.

use std::{path::PathBuf, process::ExitCode};

use bucketfs::{Dbfs, MountConfig};
use clap::Parser;
use log::error;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Store file; created when missing
    db_path: PathBuf,
    /// Directory to mount on
    mountpoint: PathBuf,
    /// JSON file with mount options
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    read_only: bool,
    #[arg(long)]
    allow_other: bool,
    #[arg(long)]
    auto_unmount: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match MountConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => MountConfig::default(),
    };
    config.read_only |= args.read_only;
    config.allow_other |= args.allow_other;
    config.auto_unmount |= args.auto_unmount;

    let fs = match Dbfs::open(&args.db_path) {
        Ok(fs) => fs,
        Err(e) => {
            error!("{}: {}", args.db_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = bucketfs::fuse::mount(fs, &args.mountpoint, &config) {
        error!("mount {}: {}", args.mountpoint.display(), e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
