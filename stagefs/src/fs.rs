use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::path::{self, PathKind, SEPARATORS};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FsError {
    #[error("Path {0:?} has no root to resolve against")]
    Unrooted(String),
    #[error("No such file or directory: {0:?}")]
    NotFound(String),
    #[error("Not a directory: {0:?}")]
    NotADirectory(String),
    #[error("Is a directory: {0:?}")]
    IsADirectory(String),
}

/// An entry listed by [`MemoryFs::read_dir`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    name: String,
    is_file: bool,
}

impl DirEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_file(&self) -> bool {
        self.is_file
    }

    #[must_use]
    pub const fn is_dir(&self) -> bool {
        !self.is_file
    }
}

/// An in-memory tree of files keyed by normalized absolute path.
///
/// Directories are implicit: one exists exactly while some file lives
/// beneath it, so there is nothing to create or remove ahead of a write.
/// Every path passed in is normalized first and must be absolute in the
/// sense of [`PathKind::is_absolute`].
#[derive(Clone, Debug, Default)]
pub struct MemoryFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves `request` against the `base` directory and checks that the
    /// result is rooted, making it usable as a path into the tree.
    pub fn resolve(base: &str, request: &str) -> Result<String, FsError> {
        let resolved = path::join(base, request);
        if PathKind::of(&resolved).is_absolute() {
            Ok(resolved)
        } else {
            Err(FsError::Unrooted(resolved))
        }
    }

    /// Stores `contents` at `path`, replacing any previous contents.
    ///
    /// Fails with [`FsError::IsADirectory`] when `path` names a root or an
    /// implicit directory, and with [`FsError::NotADirectory`] when a file
    /// already sits at one of its ancestors.
    pub fn write(&mut self, path: &str, contents: impl Into<Vec<u8>>) -> Result<(), FsError> {
        let key = Self::key(path)?;
        if is_root(&key) || key.ends_with(SEPARATORS) || self.has_children(&key) {
            return Err(FsError::IsADirectory(key));
        }
        if let Some(ancestor) = self.file_ancestor(&key) {
            return Err(FsError::NotADirectory(ancestor.to_owned()));
        }
        self.files.insert(key, contents.into());
        Ok(())
    }

    pub fn read(&self, path: &str) -> Result<&[u8], FsError> {
        let key = Self::key(path)?;
        if let Some(contents) = self.files.get(&key) {
            return Ok(contents);
        }
        if is_root(&key) || self.has_children(&key) {
            Err(FsError::IsADirectory(key))
        } else {
            Err(FsError::NotFound(key))
        }
    }

    /// Lists the files and implicit directories directly inside `path`, in
    /// key order.
    pub fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let key = Self::key(path)?;
        if self.files.contains_key(&key) {
            return Err(FsError::NotADirectory(key));
        }
        let prefix = dir_prefix(&key);
        let mut entries: Vec<DirEntry> = Vec::new();
        // One directory's keys need not sort adjacently once separator
        // kinds mix, so dedupe runs over every name seen.
        let mut seen_directories = BTreeSet::new();
        for (child, _) in self.children(&prefix) {
            match child.find(SEPARATORS) {
                None => entries.push(DirEntry {
                    name: child.to_owned(),
                    is_file: true,
                }),
                Some(end) => {
                    let name = &child[..end];
                    if seen_directories.insert(name) {
                        entries.push(DirEntry {
                            name: name.to_owned(),
                            is_file: false,
                        });
                    }
                }
            }
        }
        if entries.is_empty() && !is_root(&key) {
            return Err(FsError::NotFound(key));
        }
        Ok(entries)
    }

    /// Collects every file beneath `path`, recursively, as pairs of the
    /// path relative to `path` and the file contents, in key order.
    pub fn files_under(&self, path: &str) -> Result<Vec<(String, &[u8])>, FsError> {
        let key = Self::key(path)?;
        if self.files.contains_key(&key) {
            return Err(FsError::NotADirectory(key));
        }
        let prefix = dir_prefix(&key);
        let files: Vec<_> = self
            .children(&prefix)
            .map(|(child, contents)| (child.to_owned(), contents))
            .collect();
        if files.is_empty() && !is_root(&key) {
            return Err(FsError::NotFound(key));
        }
        Ok(files)
    }

    fn key(path: &str) -> Result<String, FsError> {
        let key = path::normalize(path);
        if PathKind::of(&key).is_absolute() {
            Ok(key)
        } else {
            Err(FsError::Unrooted(path.to_owned()))
        }
    }

    /// Iterates stored files whose key starts with `prefix`, stripped of it.
    fn children<'fs>(&'fs self, prefix: &str) -> impl Iterator<Item = (&'fs str, &'fs [u8])> {
        let strip = prefix.len();
        let prefix = prefix.to_owned();
        self.files
            .range(prefix.clone()..)
            .take_while(move |(stored, _)| stored.starts_with(&prefix))
            .map(move |(stored, contents)| (&stored[strip..], contents.as_slice()))
    }

    fn has_children(&self, key: &str) -> bool {
        let prefix = dir_prefix(key);
        self.children(&prefix).next().is_some()
    }

    /// Finds the shortest ancestor of `key` that is stored as a file.
    fn file_ancestor<'fs>(&'fs self, key: &str) -> Option<&'fs str> {
        for (end, byte) in key.bytes().enumerate().skip(1) {
            if matches!(byte, b'/' | b'\\') {
                if let Some((stored, _)) = self.files.get_key_value(&key[..end]) {
                    return Some(stored);
                }
            }
        }
        None
    }
}

/// The key prefix shared by the children of directory `key`. Drive and UNC
/// trees are keyed with backslashes, which is what [`MemoryFs::resolve`]
/// produces for them.
fn dir_prefix(key: &str) -> String {
    if key.ends_with(SEPARATORS) {
        return key.to_owned();
    }
    let separator = match PathKind::of(key) {
        PathKind::DriveAbsolute | PathKind::Unc => '\\',
        PathKind::PosixAbsolute | PathKind::Relative => '/',
    };
    format!("{key}{separator}")
}

/// Whether `key` names the top of its tree: `/`, a drive root such as
/// `C:\`, or a UNC server root.
fn is_root(key: &str) -> bool {
    match PathKind::of(key) {
        PathKind::PosixAbsolute => key == "/",
        PathKind::DriveAbsolute => key.len() <= 3,
        PathKind::Unc => !key[2..].contains(SEPARATORS),
        PathKind::Relative => false,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use crate::fs::{FsError, MemoryFs};

    fn staged() -> MemoryFs {
        let mut fs = MemoryFs::new();
        fs.write("/out/index.js", b"entry".as_slice()).unwrap();
        fs.write("/out/lib/util.js", b"util".as_slice()).unwrap();
        fs.write("/out/lib/deep/leaf.js", b"leaf".as_slice())
            .unwrap();
        fs.write("/other.txt", b"other".as_slice()).unwrap();
        fs
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut fs = MemoryFs::new();
        fs.write("/a/b.txt", b"contents".as_slice()).unwrap();
        assert_eq!(fs.read("/a/b.txt").unwrap(), b"contents");
    }

    #[test]
    fn writes_replace_existing_contents() {
        let mut fs = MemoryFs::new();
        fs.write("/a.txt", b"old".as_slice()).unwrap();
        fs.write("/a.txt", b"new".as_slice()).unwrap();
        assert_eq!(fs.read("/a.txt").unwrap(), b"new");
    }

    #[test]
    fn paths_normalize_before_use() {
        let mut fs = MemoryFs::new();
        fs.write("/out//./lib/../index.js", b"entry".as_slice())
            .unwrap();
        assert_eq!(fs.read("/out/index.js").unwrap(), b"entry");
        assert_eq!(fs.read("/out/extra/../index.js").unwrap(), b"entry");
    }

    #[rstest]
    #[case::relative("a/b.txt")]
    #[case::climbing("../a")]
    #[case::empty("")]
    fn unrooted_paths_are_rejected(#[case] path: &str) {
        let mut fs = MemoryFs::new();
        let unrooted = Err(FsError::Unrooted(path.to_owned()));
        assert_eq!(fs.write(path, b"x".as_slice()), unrooted);
        assert_eq!(fs.read(path).err(), unrooted.err());
    }

    #[test]
    fn reading_a_missing_file_fails() {
        assert_eq!(
            staged().read("/out/missing.js"),
            Err(FsError::NotFound("/out/missing.js".to_owned())),
        );
    }

    #[test]
    fn reading_a_directory_fails() {
        let fs = staged();
        assert_eq!(
            fs.read("/out/lib"),
            Err(FsError::IsADirectory("/out/lib".to_owned())),
        );
        assert_eq!(fs.read("/"), Err(FsError::IsADirectory("/".to_owned())));
    }

    #[test]
    fn writing_over_a_directory_fails() {
        let mut fs = staged();
        assert_eq!(
            fs.write("/out/lib", b"".as_slice()),
            Err(FsError::IsADirectory("/out/lib".to_owned())),
        );
        assert_eq!(
            fs.write("/", b"".as_slice()),
            Err(FsError::IsADirectory("/".to_owned())),
        );
    }

    #[test]
    fn writing_through_a_file_fails() {
        let mut fs = staged();
        assert_eq!(
            fs.write("/other.txt/nested", b"".as_slice()),
            Err(FsError::NotADirectory("/other.txt".to_owned())),
        );
    }

    #[test]
    fn read_dir_lists_files_and_directories() {
        let entries: Vec<_> = staged()
            .read_dir("/out")
            .unwrap()
            .into_iter()
            .map(|entry| (entry.name().to_owned(), entry.is_file()))
            .collect();
        assert_eq!(
            entries,
            [("index.js".to_owned(), true), ("lib".to_owned(), false)],
        );
    }

    #[test]
    fn read_dir_deduplicates_across_separator_kinds() {
        let mut fs = MemoryFs::new();
        fs.write("/out/x/a", b"1".as_slice()).unwrap();
        fs.write("/out/x0", b"2".as_slice()).unwrap();
        fs.write(r"/out/x\b", b"3".as_slice()).unwrap();
        let entries: Vec<_> = fs
            .read_dir("/out")
            .unwrap()
            .into_iter()
            .map(|entry| (entry.name().to_owned(), entry.is_file()))
            .collect();
        assert_eq!(entries, [("x".to_owned(), false), ("x0".to_owned(), true)]);
    }

    #[test]
    fn read_dir_on_a_file_fails() {
        assert_eq!(
            staged().read_dir("/out/index.js"),
            Err(FsError::NotADirectory("/out/index.js".to_owned())),
        );
    }

    #[test]
    fn read_dir_on_a_missing_directory_fails() {
        assert_eq!(
            staged().read_dir("/nope"),
            Err(FsError::NotFound("/nope".to_owned())),
        );
    }

    #[test]
    fn read_dir_on_an_empty_root_is_empty() {
        assert!(MemoryFs::new().read_dir("/").unwrap().is_empty());
    }

    #[test]
    fn files_under_returns_relative_paths_in_key_order() {
        let fs = staged();
        let names: Vec<_> = fs
            .files_under("/out")
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["index.js", "lib/deep/leaf.js", "lib/util.js"]);
    }

    #[test]
    fn files_under_exposes_contents() {
        let fs = staged();
        let files = fs.files_under("/out/lib").unwrap();
        assert_eq!(
            files,
            [
                ("deep/leaf.js".to_owned(), b"leaf".as_slice()),
                ("util.js".to_owned(), b"util".as_slice()),
            ],
        );
    }

    #[test]
    fn resolve_requires_a_rooted_result() {
        assert_eq!(MemoryFs::resolve("/stage", "a/b.js").unwrap(), "/stage/a/b.js");
        assert_eq!(
            MemoryFs::resolve("stage", "a"),
            Err(FsError::Unrooted("stage/a".to_owned())),
        );
    }

    #[test]
    fn drive_trees_are_keyed_with_backslashes() {
        let mut fs = MemoryFs::new();
        let key = MemoryFs::resolve(r"C:\stage", "nested/file.txt").unwrap();
        assert_eq!(key, r"C:\stage\nested\file.txt");
        fs.write(&key, b"x".as_slice()).unwrap();
        let names: Vec<_> = fs
            .files_under(r"C:\stage")
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, [r"nested\file.txt"]);
    }
}
