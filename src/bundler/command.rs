use std::{
    io,
    path::Path,
    process::{Command, Stdio},
};

use camino::{Utf8Path, Utf8PathBuf};
use stagefs::MemoryFs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{
    bundler::{BundleError, BundleStats, Bundler},
    config::BundleConfig,
};

/// Runs the bundling engine as a child process and stages whatever it
/// wrote.
///
/// The engine never sees the virtual tree: it gets a scratch directory to
/// write into, and the staged files are loaded into the [`MemoryFs`]
/// afterwards. Its stdio is inherited so build diagnostics land on the
/// terminal as they happen.
pub struct CommandBundler {
    command: Vec<String>,
    workdir: Utf8PathBuf,
}

impl CommandBundler {
    /// A bundler running `command` with the manifest's directory as its
    /// working directory. Each argument may use the `{config}`, `{outdir}`
    /// and `{stats}` placeholders, filled with scratch paths per run.
    pub fn new(command: Vec<String>, workdir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            command,
            workdir: workdir.into(),
        }
    }

    /// The argv used when the manifest has no `lambdapack.command`.
    #[must_use]
    pub fn default_command() -> Vec<String> {
        ["npx", "webpack", "--config", "{config}", "--json", "{stats}"]
            .map(String::from)
            .to_vec()
    }
}

impl Bundler for CommandBundler {
    fn bundle(
        &self,
        config: &BundleConfig,
        fs: &mut MemoryFs,
    ) -> Result<BundleStats, BundleError> {
        let scratch = tempfile::tempdir()?;
        let scratch_path = Utf8Path::from_path(scratch.path()).ok_or(BundleError::ScratchPath)?;
        let outdir = scratch_path.join("staged");
        let config_path = scratch_path.join("bundle.config.json");
        let stats_path = scratch_path.join("bundle.stats.json");

        std::fs::create_dir(&outdir)?;
        let settings = config.for_output_dir(&outdir);
        std::fs::write(&config_path, serde_json::to_vec_pretty(&settings)?)?;

        let command: Vec<String> = self
            .command
            .iter()
            .map(|argument| {
                argument
                    .replace("{config}", config_path.as_str())
                    .replace("{outdir}", outdir.as_str())
                    .replace("{stats}", stats_path.as_str())
            })
            .collect();
        let (program, arguments) = command.split_first().ok_or(BundleError::EmptyCommand)?;

        debug!("running `{program}` with {arguments:?}");
        let status = Command::new(program)
            .args(arguments)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(BundleError::EngineFailed(status));
        }

        stage(&outdir, config.stage_root(), fs)?;
        read_stats(&stats_path)
    }
}

/// Loads every file the engine wrote under `outdir` into the virtual tree
/// beneath `stage_root`.
fn stage(outdir: &Utf8Path, stage_root: &str, fs: &mut MemoryFs) -> Result<(), BundleError> {
    for entry in WalkDir::new(outdir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = staged_name(entry.path(), outdir)
            .ok_or_else(|| BundleError::Unstageable(entry.path().to_path_buf()))?;
        let staged_path = MemoryFs::resolve(stage_root, &relative)?;
        fs.write(&staged_path, std::fs::read(entry.path())?)?;
    }
    Ok(())
}

/// The name a file is staged under: its path below `outdir`, joined with
/// forward slashes whatever the host's separator is.
fn staged_name(path: &Path, outdir: &Utf8Path) -> Option<String> {
    let components: Vec<&str> = path
        .strip_prefix(outdir)
        .ok()?
        .components()
        .map(|component| component.as_os_str().to_str())
        .collect::<Option<_>>()?;
    Some(components.join("/"))
}

/// Parses the engine's build report, or falls back to an empty one when the
/// command is not set up to write it.
fn read_stats(path: &Utf8Path) -> Result<BundleStats, BundleError> {
    match std::fs::read(path) {
        Ok(report) => Ok(serde_json::from_slice(&report)?),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            warn!("no build report at {path}, dependency output will be empty");
            Ok(BundleStats::default())
        }
        Err(error) => Err(error.into()),
    }
}
