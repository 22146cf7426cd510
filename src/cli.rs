use std::{
    fs::{self, File},
    io::{BufWriter, Write},
};

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, ValueHint, crate_name};
use color_eyre::eyre::{Result, WrapErr};
use owo_colors::OwoColorize;
use stagefs::MemoryFs;
use tracing::debug;

use crate::{
    archive,
    bundler::{BundleStats, Bundler, CommandBundler},
    config::{BundleConfig, PackageManifest},
    depfile::Depfile,
};

/// Bundle a Node.js package into a zip ready for a serverless deploy
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the package.json describing the function
    #[arg(long, default_value = "package.json", value_hint = ValueHint::FilePath)]
    manifest_path: Utf8PathBuf,

    /// Where to write the archive [default: <name>.zip beside the manifest]
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<Utf8PathBuf>,

    /// Also write a make dependency file for the archive
    #[arg(long)]
    emit_deps: bool,

    /// Where to write the dependency rules [default: <output>.d]
    #[arg(long, requires = "emit_deps", value_hint = ValueHint::FilePath)]
    deps_file: Option<Utf8PathBuf>,

    /// Target name used in the dependency rules [default: the archive path]
    #[arg(long, requires = "emit_deps")]
    deps_target: Option<String>,

    /// Directory the prerequisites are written relative to
    #[arg(long, requires = "emit_deps", default_value = ".")]
    deps_root: String,

    /// Also emit each prerequisite as a target of its own
    #[arg(long, requires = "emit_deps")]
    phony_targets: bool,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let manifest = PackageManifest::load(&self.manifest_path)
            .wrap_err_with(|| format!("failed to load {}", self.manifest_path))?;
        let command = manifest
            .command()
            .map(<[String]>::to_vec)
            .unwrap_or_else(CommandBundler::default_command);
        let bundler = CommandBundler::new(command, manifest_dir(&self.manifest_path));
        self.execute(&manifest, &bundler)
    }

    fn execute(&self, manifest: &PackageManifest, bundler: &impl Bundler) -> Result<()> {
        let archive_path = match &self.output {
            Some(path) => path.clone(),
            None => manifest_dir(&self.manifest_path).join(manifest.archive_name()?),
        };

        let config = BundleConfig::resolve(manifest);
        let mut fs = MemoryFs::new();
        let stats = bundler.bundle(&config, &mut fs)?;

        if self.emit_deps {
            self.write_depfile(&archive_path, &stats)?;
        }

        let file = File::create(&archive_path)
            .wrap_err_with(|| format!("failed to create {archive_path}"))?;
        let names = archive::write_archive(&fs, config.stage_root(), BufWriter::new(file))?;

        let mut lock = anstream::stdout().lock();
        let _ = writeln!(lock, "{} {}:", crate_name!(), archive_path.blue());
        for name in &names {
            let _ = writeln!(lock, "    {name}");
        }
        let _ = writeln!(lock, "{} {}", archive_path.blue(), "written".green());
        debug!("{} entries written to {archive_path}", names.len());
        Ok(())
    }

    fn write_depfile(&self, archive_path: &Utf8Path, stats: &BundleStats) -> Result<()> {
        let path = match &self.deps_file {
            Some(path) => path.clone(),
            None => Utf8PathBuf::from(format!("{archive_path}.d")),
        };
        let target = self
            .deps_target
            .clone()
            .unwrap_or_else(|| archive_path.to_string());

        let mut depfile =
            Depfile::new(target, self.deps_root.clone()).with_phony_targets(self.phony_targets);
        let manifest_name = self.manifest_path.file_name().unwrap_or("package.json");
        depfile.push(&format!("./{manifest_name}"));
        let prerequisites = stats.prerequisites();
        depfile.extend(prerequisites.iter().map(String::as_str));

        fs::write(&path, depfile.to_string())
            .wrap_err_with(|| format!("failed to write {path}"))?;
        debug!("dependency rules written to {path}");
        Ok(())
    }
}

/// The directory the manifest sits in, which is where the engine runs and
/// where the archive lands unless told otherwise.
fn manifest_dir(manifest_path: &Utf8Path) -> &Utf8Path {
    match manifest_path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}
