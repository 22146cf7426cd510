//! Lexical path handling for the staging filesystem.
//!
//! Paths here are plain strings that never touch the host filesystem. Both
//! separator kinds are understood at once: `/` and `\` split segments, POSIX
//! roots, drive prefixes such as `C:`, and UNC roots such as `\\server` all
//! anchor a path. [`normalize`] collapses `.`/`..` and separator runs without
//! consulting a disk, and [`join`] resolves a request against a base
//! directory with absolute requests taking over entirely.

/// The two separator characters recognised in virtual paths.
pub const SEPARATORS: [char; 2] = ['/', '\\'];

/// Classification of a path by its leading anchor.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum PathKind {
    /// No anchor, resolved against some base directory.
    Relative,
    /// Starts with `/`.
    PosixAbsolute,
    /// Starts with an ASCII drive letter and `:`, followed by a separator or
    /// the end of the path.
    DriveAbsolute,
    /// Starts with exactly two backslashes. Three or more collapse like any
    /// other separator run and are not a UNC root.
    Unc,
}

impl PathKind {
    /// Classifies `path` by inspecting only its first few bytes.
    #[must_use]
    pub const fn of(path: &str) -> Self {
        match path.as_bytes() {
            [b'/', ..] => Self::PosixAbsolute,
            [b'\\', b'\\'] => Self::Unc,
            [b'\\', b'\\', third, ..] if *third != b'\\' => Self::Unc,
            [drive, b':'] | [drive, b':', b'/' | b'\\', ..] if drive.is_ascii_alphabetic() => {
                Self::DriveAbsolute
            }
            _ => Self::Relative,
        }
    }

    /// Whether the path carries its own anchor.
    #[must_use]
    pub const fn is_absolute(self) -> bool {
        !matches!(self, Self::Relative)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Token<'path> {
    /// Maximal run of non-separator characters. May be empty at either end of
    /// the path or between two separator runs of different kinds.
    Segment(&'path str),
    /// Maximal run of a single separator character kind, so `/\` is two
    /// tokens while `//` is one.
    Separator(&'path str),
}

/// Splits a path into alternating segment and separator tokens, starting and
/// ending with a segment.
fn tokenize(path: &str) -> Vec<Token<'_>> {
    let bytes = path.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    loop {
        let start = pos;
        while pos < bytes.len() && !matches!(bytes[pos], b'/' | b'\\') {
            pos += 1;
        }
        tokens.push(Token::Segment(&path[start..pos]));
        if pos == bytes.len() {
            return tokens;
        }
        let separator = bytes[pos];
        let start = pos;
        while pos < bytes.len() && bytes[pos] == separator {
            pos += 1;
        }
        tokens.push(Token::Separator(&path[start..pos]));
    }
}

/// A single ASCII letter followed by `:`, e.g. `C:` or `c:`.
fn is_drive_prefix(segment: &str) -> bool {
    matches!(segment.as_bytes(), [drive, b':'] if drive.is_ascii_alphabetic())
}

/// Emitted tokens, interleaving segments and separators. `anchor` is the
/// number of leading slots that form a root (a root or drive prefix plus its
/// separator) and can never be climbed out of.
struct Accumulator<'path> {
    slots: Vec<&'path str>,
    anchor: usize,
}

/// Collapses `.` and `..` segments and separator runs in a purely lexical
/// way. The original separator characters are preserved, so forward and
/// backslashes are never rewritten into each other. A path without any
/// separator is returned unchanged, whatever it contains.
///
/// Anchors survive collapsing: `..` at a POSIX root, a drive root or a UNC
/// root is dropped rather than allowed to climb above it, while a fully
/// relative path keeps its leading climbs. A path that collapses to a bare
/// drive prefix gains a trailing backslash so it still names the drive root.
#[must_use]
pub fn normalize(path: &str) -> String {
    if !path.contains(SEPARATORS) {
        return path.to_owned();
    }

    let tokens = tokenize(path);
    let mut acc = Accumulator {
        slots: Vec::with_capacity(tokens.len()),
        anchor: 0,
    };
    let mut index = 0;

    while index < tokens.len() {
        match tokens[index] {
            Token::Segment(first) if index == 0 && (first.is_empty() || is_drive_prefix(first)) => {
                acc.slots.push(first);
                acc.anchor = 2;
            }
            Token::Separator(run) => {
                if index == 1 && tokens[0] == Token::Segment("") && run == r"\\" {
                    // A leading double backslash is a UNC root. Keep both
                    // characters instead of collapsing the run.
                    acc.slots.push(run);
                } else {
                    acc.slots.push(&run[..1]);
                }
            }
            Token::Segment("..") => match acc.slots.len() {
                // Nothing to climb out of yet.
                0 => acc.slots.push(".."),
                2 => {
                    if acc.slots[0] == ".." {
                        // Leading climbs accumulate.
                        acc.slots.push("..");
                    } else {
                        // The only segment is swallowed whole, along with
                        // the separator that follows. An anchor survives.
                        acc.slots.truncate(acc.anchor);
                        index += 1;
                    }
                }
                4 => {
                    if acc.anchor == 0 {
                        acc.slots.truncate(1);
                    } else {
                        acc.slots.truncate(2);
                        index += 1;
                    }
                }
                // A lone separator slot can precede a climb once separator
                // kinds mix, so the arithmetic saturates.
                len => acc.slots.truncate(len.saturating_sub(3)),
            },
            Token::Segment(".") => match acc.slots.len() {
                // A leading `.` keeps the path explicitly relative.
                0 => acc.slots.push("."),
                2 => {
                    if acc.anchor == 0 {
                        acc.slots.truncate(1);
                    } else {
                        index += 1;
                    }
                }
                len => acc.slots.truncate(len - 1),
            },
            // Empty segments inside the path come from adjacent separator
            // runs of different kinds and add nothing.
            Token::Segment("") => {}
            Token::Segment(segment) => acc.slots.push(segment),
        }
        index += 1;
    }

    if let [drive] = acc.slots.as_slice() {
        if is_drive_prefix(drive) {
            return format!("{drive}\\");
        }
    }
    acc.slots.concat()
}

/// Resolves `request` against the `base` directory and normalizes the
/// result.
///
/// An empty request normalizes `base` alone. An absolute request replaces
/// the base entirely: drive-letter requests additionally have their forward
/// slashes rewritten to backslashes, POSIX requests are kept as they are.
/// Otherwise the two are concatenated with a separator matching the base: a
/// drive-letter base switches both sides to backslashes, everything else
/// joins with `/`.
#[must_use]
pub fn join(base: &str, request: &str) -> String {
    if request.is_empty() {
        return normalize(base);
    }
    match PathKind::of(request) {
        PathKind::DriveAbsolute => return normalize(&request.replace('/', "\\")),
        PathKind::PosixAbsolute => return normalize(request),
        // UNC requests carry no special casing and concatenate like
        // relative ones.
        PathKind::Unc | PathKind::Relative => {}
    }
    if base == "/" {
        return normalize(&format!("{base}{request}"));
    }
    if PathKind::of(base) == PathKind::DriveAbsolute {
        let base = base.replace('/', "\\");
        let request = request.replace('/', "\\");
        return normalize(&format!("{base}\\{request}"));
    }
    normalize(&format!("{base}/{request}"))
}
