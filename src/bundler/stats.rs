use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

/// Matches the leading `node_modules` component of a module name such as
/// `./node_modules/lodash/lodash.js`, including its trailing separator.
static NODE_MODULES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[./]*/node_modules/").unwrap());

/// The slice of the engine's JSON build report that dependency extraction
/// reads: the module list, with enough structure to map each bundled module
/// back to the source files it came from.
#[derive(Debug, Default, Deserialize)]
pub struct BundleStats {
    #[serde(default)]
    pub modules: Vec<ModuleStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleStats {
    pub name: String,
    /// Chunk ids come as numbers or strings depending on the engine's id
    /// scheme; only emptiness matters here.
    #[serde(default)]
    pub chunks: Vec<Value>,
    /// Concatenated modules nest the modules they swallowed.
    #[serde(default)]
    pub modules: Vec<ModuleStats>,
    #[serde(default)]
    pub issuer_path: Vec<Issuer>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Issuer {
    pub name: String,
}

impl BundleStats {
    /// Collapses the module list into the source paths the bundle was built
    /// from, in first-seen order.
    ///
    /// Modules in no chunk and the engine's own runtime stubs are skipped.
    /// Anything under `node_modules` collapses to that directory itself, a
    /// concatenated module contributes its inner modules, and a plain
    /// module contributes its own name plus its issuer chain.
    #[must_use]
    pub fn prerequisites(&self) -> IndexSet<String> {
        let mut prerequisites = IndexSet::new();
        for module in &self.modules {
            if module.chunks.is_empty() || module.name.starts_with("webpack/runtime/") {
                continue;
            }
            module.collect(&mut prerequisites);
        }
        prerequisites
    }
}

impl ModuleStats {
    fn collect(&self, prerequisites: &mut IndexSet<String>) {
        if let Some(found) = NODE_MODULES.find(&self.name) {
            prerequisites.insert(self.name[..found.end() - 1].to_owned());
        } else if !self.modules.is_empty() {
            for inner in &self.modules {
                inner.collect(prerequisites);
            }
        } else {
            prerequisites.insert(self.name.clone());
            for issuer in &self.issuer_path {
                prerequisites.insert(issuer.name.clone());
            }
        }
    }
}
