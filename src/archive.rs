use std::io::{Seek, Write};

use chrono::{DateTime, Datelike, Timelike, Utc};
use stagefs::MemoryFs;
use thiserror::Error;
use zip::{CompressionMethod, ZipWriter, write::SimpleFileOptions};

/// Fallback modification time for every entry: 2020-03-12 19:45:19 UTC.
/// Deployment tooling hashes package contents to decide whether anything
/// changed, so rebuilding identical inputs must produce an identical
/// archive.
const DEFAULT_ENTRY_MTIME: i64 = 1_584_042_319;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Stage(#[from] stagefs::FsError),
}

/// Writes every file beneath `stage_root` into a deflate-compressed zip on
/// `writer`, returning the entry names in the order written.
///
/// Entries carry a fixed modification time, honouring `SOURCE_DATE_EPOCH`
/// when set and clamping to the zip epoch when out of range.
pub fn write_archive<W: Write + Seek>(
    fs: &MemoryFs,
    stage_root: &str,
    writer: W,
) -> Result<Vec<String>, ArchiveError> {
    let epoch = std::env::var("SOURCE_DATE_EPOCH").ok();
    write_entries(fs, stage_root, writer, epoch.as_deref())
}

fn write_entries<W: Write + Seek>(
    fs: &MemoryFs,
    stage_root: &str,
    writer: W,
    epoch_override: Option<&str>,
) -> Result<Vec<String>, ArchiveError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(entry_mtime(epoch_override))
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(writer);
    let mut names = Vec::new();
    for (name, contents) in fs.files_under(stage_root)? {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(contents)?;
        names.push(name);
    }
    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(names)
}

/// The single timestamp stamped on every entry. An override (the
/// `SOURCE_DATE_EPOCH` value) replaces the default, matching
/// reproducible-build tooling.
fn entry_mtime(epoch_override: Option<&str>) -> zip::DateTime {
    epoch_override
        .and_then(|epoch| epoch.parse().ok())
        .or(Some(DEFAULT_ENTRY_MTIME))
        .and_then(zip_datetime)
        .unwrap_or_default()
}

/// Converts a Unix timestamp to a zip timestamp, if it fits the zip range.
fn zip_datetime(seconds: i64) -> Option<zip::DateTime> {
    let utc = DateTime::<Utc>::from_timestamp(seconds, 0)?;
    zip::DateTime::from_date_and_time(
        utc.year().try_into().ok()?,
        utc.month().try_into().ok()?,
        utc.day().try_into().ok()?,
        utc.hour().try_into().ok()?,
        utc.minute().try_into().ok()?,
        utc.second().try_into().ok()?,
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Read};

    use stagefs::MemoryFs;
    use zip::{CompressionMethod, ZipArchive};

    use crate::archive::{
        DEFAULT_ENTRY_MTIME, entry_mtime, write_archive, write_entries, zip_datetime,
    };

    fn staged() -> MemoryFs {
        let mut fs = MemoryFs::new();
        fs.write("/zipcontents/main.js", b"exports.handler = 1".as_slice())
            .unwrap();
        fs.write("/zipcontents/lib/util.js", b"module.exports = {}".as_slice())
            .unwrap();
        fs
    }

    #[test]
    fn entries_and_contents_round_trip() {
        let mut buffer = Vec::new();
        let names = write_archive(&staged(), "/zipcontents", Cursor::new(&mut buffer)).unwrap();
        assert_eq!(names, ["lib/util.js", "main.js"]);

        let mut archive = ZipArchive::new(Cursor::new(buffer)).unwrap();
        assert_eq!(archive.len(), 2);
        let mut contents = String::new();
        archive
            .by_name("lib/util.js")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "module.exports = {}");
    }

    #[test]
    fn entries_are_deflated_with_the_pinned_mtime() {
        let mut buffer = Vec::new();
        write_entries(&staged(), "/zipcontents", Cursor::new(&mut buffer), None).unwrap();

        let mut archive = ZipArchive::new(Cursor::new(buffer)).unwrap();
        let entry = archive.by_index(0).unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        assert_eq!(
            entry.last_modified(),
            zip::DateTime::from_date_and_time(2020, 3, 12, 19, 45, 19).ok(),
        );
    }

    #[test]
    fn an_epoch_override_restamps_the_entries() {
        let mut buffer = Vec::new();
        write_entries(
            &staged(),
            "/zipcontents",
            Cursor::new(&mut buffer),
            Some("946684800"),
        )
        .unwrap();

        let mut archive = ZipArchive::new(Cursor::new(buffer)).unwrap();
        let entry = archive.by_index(0).unwrap();
        assert_eq!(
            entry.last_modified(),
            zip::DateTime::from_date_and_time(2000, 1, 1, 0, 0, 0).ok(),
        );
    }

    #[test]
    fn identical_trees_produce_identical_bytes() {
        let fs = staged();
        let mut first = Vec::new();
        let mut second = Vec::new();
        write_entries(&fs, "/zipcontents", Cursor::new(&mut first), None).unwrap();
        write_entries(&fs, "/zipcontents", Cursor::new(&mut second), None).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unusable_overrides_fall_back_to_the_default_time() {
        assert_eq!(entry_mtime(Some("later")), entry_mtime(None));
        // Epochs before the zip range clamp to the format's baseline.
        assert_eq!(entry_mtime(Some("0")), zip::DateTime::default());
    }

    #[test]
    fn timestamps_outside_the_zip_range_are_rejected() {
        assert_eq!(zip_datetime(0), None);
        assert!(zip_datetime(DEFAULT_ENTRY_MTIME).is_some());
    }

    #[test]
    fn an_empty_stage_is_an_error() {
        let fs = MemoryFs::new();
        let mut buffer = Vec::new();
        assert!(write_archive(&fs, "/zipcontents", Cursor::new(&mut buffer)).is_err());
    }
}
