use std::fs;

use camino::Utf8Path;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

/// Virtual directory the engine's output is staged under.
pub const STAGE_ROOT: &str = "/zipcontents";

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("Manifest has no `name` field to derive an archive name from")]
    MissingName,
}

/// The parts of `package.json` the bundler reads.
#[derive(Debug, Deserialize)]
pub struct PackageManifest {
    name: Option<String>,
    main: Option<String>,
    #[serde(default)]
    lambdapack: LambdapackSection,
}

/// The optional `lambdapack` table inside `package.json`.
#[derive(Debug, Default, Deserialize)]
struct LambdapackSection {
    /// Engine settings merged over the defaults.
    #[serde(default)]
    bundler: Map<String, Value>,
    /// Argv template for the engine process.
    command: Option<Vec<String>>,
}

impl PackageManifest {
    pub fn load(path: &Utf8Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// The package name. Required, since the archive is named after it.
    pub fn name(&self) -> Result<&str, ManifestError> {
        self.name.as_deref().ok_or(ManifestError::MissingName)
    }

    /// The entry module, `index.js` unless `main` says otherwise.
    #[must_use]
    pub fn main(&self) -> &str {
        self.main.as_deref().unwrap_or("index.js")
    }

    /// `<name>.zip`.
    pub fn archive_name(&self) -> Result<String, ManifestError> {
        Ok(format!("{}.zip", self.name()?))
    }

    #[must_use]
    pub fn bundler_overrides(&self) -> &Map<String, Value> {
        &self.lambdapack.bundler
    }

    /// The engine argv template, when the manifest overrides the default.
    #[must_use]
    pub fn command(&self) -> Option<&[String]> {
        self.lambdapack.command.as_deref()
    }
}

/// The fully merged engine settings for one bundle run.
#[derive(Clone, Debug, PartialEq)]
pub struct BundleConfig(Map<String, Value>);

impl BundleConfig {
    /// Merges the settings layers, later keys winning: the defaults, the
    /// computed entry, the manifest `bundler` table, then the settings
    /// forced on every run. `output` is merged the same way one level down,
    /// so user output tweaks survive everything but the forced keys.
    #[must_use]
    pub fn resolve(manifest: &PackageManifest) -> Self {
        let main = manifest.main();

        let mut settings = Map::from_iter([
            // Production mode prunes unused exports. Minification stays
            // off so stack traces in the function console stay readable.
            ("mode".to_owned(), Value::from("production")),
            ("optimization".to_owned(), json!({ "minimize": false })),
            ("entry".to_owned(), Value::from(format!("./{main}"))),
        ]);
        merge_over(&mut settings, manifest.bundler_overrides());
        merge_over(&mut settings, &required());

        let mut output = Map::from_iter([("filename".to_owned(), Value::from(file_name(main)))]);
        if let Some(Value::Object(overrides)) = manifest.bundler_overrides().get("output") {
            merge_over(&mut output, overrides);
        }
        merge_over(&mut output, &required_output());
        settings.insert("output".to_owned(), Value::Object(output));

        Self(settings)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The virtual directory the engine is told to emit into.
    #[must_use]
    pub fn stage_root(&self) -> &str {
        self.get("output")
            .and_then(|output| output.get("path"))
            .and_then(Value::as_str)
            .unwrap_or(STAGE_ROOT)
    }

    /// The settings with the virtual stage root swapped for the real
    /// directory the engine process writes into.
    #[must_use]
    pub fn for_output_dir(&self, dir: &Utf8Path) -> Value {
        let mut settings = self.0.clone();
        if let Some(Value::Object(output)) = settings.get_mut("output") {
            output.insert("path".to_owned(), Value::from(dir.as_str()));
        }
        Value::Object(settings)
    }
}

/// Settings every run gets regardless of overrides: a Node target, with the
/// output linked as a CommonJS module into the staging root.
fn required() -> Map<String, Value> {
    Map::from_iter([
        ("target".to_owned(), Value::from("node")),
        ("output".to_owned(), Value::Object(required_output())),
    ])
}

fn required_output() -> Map<String, Value> {
    Map::from_iter([
        ("path".to_owned(), Value::from(STAGE_ROOT)),
        ("libraryTarget".to_owned(), Value::from("commonjs2")),
    ])
}

/// Copies `layer` over `settings` key by key, replacing whole values.
fn merge_over(settings: &mut Map<String, Value>, layer: &Map<String, Value>) {
    for (key, value) in layer {
        settings.insert(key.clone(), value.clone());
    }
}

/// The final path segment of `main`, the default bundle file name.
fn file_name(main: &str) -> &str {
    main.rsplit(stagefs::path::SEPARATORS).next().unwrap_or(main)
}
