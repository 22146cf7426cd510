//! An in-memory filesystem for staging build outputs, with the lexical path
//! semantics of a bundler's virtual output tree.
//!
//! Virtual paths mix `/` and `\` freely and are resolved on any host without
//! touching a disk. [`normalize`] collapses `.`, `..` and separator runs
//! while preserving POSIX, drive-letter and UNC anchors, and [`join`]
//! resolves a request against a base directory. [`MemoryFs`] keys file
//! contents by normalized absolute path, with directories existing
//! implicitly.

pub mod fs;
pub mod path;

pub use fs::{DirEntry, FsError, MemoryFs};
pub use path::{PathKind, join, normalize};
