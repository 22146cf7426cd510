use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use stagefs::path;

/// A make dependency file: rules naming the source files an archive was
/// built from, so that editing any of them triggers a rebuild.
///
/// Prerequisites keep their insertion order and are first rebased onto the
/// configured root, which is where the bundled package sits relative to the
/// makefile. Rendering splits them over several rules for the same target
/// to keep line lengths reasonable.
#[derive(Clone, Debug)]
pub struct Depfile {
    target: String,
    root: String,
    phony_targets: bool,
    prerequisites: Vec<String>,
}

impl Depfile {
    const PREREQUISITES_PER_RULE: usize = 5;

    #[must_use]
    pub fn new(target: impl Into<String>, root: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            root: root.into(),
            phony_targets: false,
            prerequisites: Vec::new(),
        }
    }

    /// Also emit each prerequisite as a bare target of its own, so deleting
    /// a source file does not strand the build. Collapsed `node_modules`
    /// directories are left out of those.
    #[must_use]
    pub fn with_phony_targets(mut self, phony_targets: bool) -> Self {
        self.phony_targets = phony_targets;
        self
    }

    /// Appends `prerequisite` rebased onto the root.
    pub fn push(&mut self, prerequisite: &str) {
        self.prerequisites.push(path::join(&self.root, prerequisite));
    }

    pub fn extend<'a>(&mut self, prerequisites: impl IntoIterator<Item = &'a str>) {
        for prerequisite in prerequisites {
            self.push(prerequisite);
        }
    }
}

impl Display for Depfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for chunk in self.prerequisites.chunks(Self::PREREQUISITES_PER_RULE) {
            writeln!(f, "{}: {}", self.target, chunk.iter().format(" "))?;
            if self.phony_targets {
                let phony: Vec<_> = chunk
                    .iter()
                    .filter(|prerequisite| !prerequisite.ends_with("node_modules"))
                    .collect();
                if !phony.is_empty() {
                    writeln!(f, "{}:", phony.iter().format(" "))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use crate::depfile::Depfile;

    #[test]
    fn rules_chunk_five_prerequisites_at_a_time() {
        let mut depfile = Depfile::new("my-function.zip", ".");
        depfile.extend([
            "./package.json",
            "./index.js",
            "./lib/a.js",
            "./lib/b.js",
            "./lib/c.js",
            "./lib/d.js",
        ]);
        assert_eq!(
            depfile.to_string(),
            indoc! {"
                my-function.zip: ./package.json ./index.js ./lib/a.js ./lib/b.js ./lib/c.js
                my-function.zip: ./lib/d.js
            "},
        );
    }

    #[test]
    fn prerequisites_rebase_onto_the_root() {
        let mut depfile = Depfile::new("fn.zip", "../app");
        depfile.push("./src/index.js");
        depfile.push("./node_modules");
        assert_eq!(
            depfile.to_string(),
            "fn.zip: ../app/src/index.js ../app/node_modules\n",
        );
    }

    #[test]
    fn phony_rules_skip_node_modules_directories() {
        let mut depfile = Depfile::new("fn.zip", ".").with_phony_targets(true);
        depfile.extend(["./package.json", "./node_modules", "./index.js"]);
        assert_eq!(
            depfile.to_string(),
            indoc! {"
                fn.zip: ./package.json ./node_modules ./index.js
                ./package.json ./index.js:
            "},
        );
    }

    #[test]
    fn a_chunk_of_only_node_modules_gets_no_phony_rule() {
        let mut depfile = Depfile::new("fn.zip", ".").with_phony_targets(true);
        depfile.extend([
            "./a.js",
            "./b.js",
            "./c.js",
            "./d.js",
            "./e.js",
            "./node_modules",
        ]);
        assert_eq!(
            depfile.to_string(),
            indoc! {"
                fn.zip: ./a.js ./b.js ./c.js ./d.js ./e.js
                ./a.js ./b.js ./c.js ./d.js ./e.js:
                fn.zip: ./node_modules
            "},
        );
    }

    #[test]
    fn no_prerequisites_renders_nothing() {
        assert_eq!(Depfile::new("fn.zip", ".").to_string(), "");
    }
}
