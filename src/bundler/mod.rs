mod command;
mod stats;

use std::{io, path::PathBuf, process::ExitStatus};

use stagefs::{FsError, MemoryFs};
use thiserror::Error;

pub use crate::bundler::{
    command::CommandBundler,
    stats::{BundleStats, Issuer, ModuleStats},
};
use crate::config::BundleConfig;

/// Anything that can run a build and leave its output in the staging tree.
///
/// The orchestration only sees this seam, so tests drive it with an
/// in-process closure while the real implementation spawns the engine.
pub trait Bundler {
    /// Runs the build described by `config`, stages every produced file
    /// into `fs` under the configured staging root and returns the engine's
    /// build report.
    fn bundle(&self, config: &BundleConfig, fs: &mut MemoryFs)
    -> Result<BundleStats, BundleError>;
}

impl<F> Bundler for F
where
    F: Fn(&BundleConfig, &mut MemoryFs) -> Result<BundleStats, BundleError>,
{
    fn bundle(
        &self,
        config: &BundleConfig,
        fs: &mut MemoryFs,
    ) -> Result<BundleStats, BundleError> {
        self(config, fs)
    }
}

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Engine command is empty")]
    EmptyCommand,
    #[error("Engine exited with {0}")]
    EngineFailed(ExitStatus),
    #[error("Scratch directory path is not valid UTF-8")]
    ScratchPath,
    #[error("Engine output {0:?} cannot be staged")]
    Unstageable(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Report(#[from] serde_json::Error),
    #[error(transparent)]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Stage(#[from] FsError),
}
