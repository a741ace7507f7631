use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::debug;
use zip::ZipArchive;

pub const CSV_EXTENSION: &str = ".csv";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive has no entries")]
    EmptyArchive,
    #[error("archive has no `{extension}` entry (entries: {entries:?})")]
    NoMatchingEntry {
        extension: String,
        entries: Vec<String>,
    },
    #[error("archive unreadable: {0}")]
    Corrupt(String),
}

/// Returns the text of the first `.csv` entry in an in-memory zip archive.
pub fn extract(bytes: &[u8]) -> Result<String, ArchiveError> {
    extract_with_extension(bytes, CSV_EXTENSION)
}

pub fn extract_with_extension(bytes: &[u8], extension: &str) -> Result<String, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|err| {
        // An empty zip is still a valid end-of-central-directory record, but some producers send
        // zero bytes instead.
        if bytes.is_empty() {
            ArchiveError::EmptyArchive
        } else {
            ArchiveError::Corrupt(err.to_string())
        }
    })?;

    if archive.is_empty() {
        return Err(ArchiveError::EmptyArchive);
    }

    let wanted = extension.to_lowercase();
    let mut names = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        let mut entry = archive
            .by_index(idx)
            .map_err(|err| ArchiveError::Corrupt(err.to_string()))?;
        let name = entry.name().to_string();
        if entry.is_dir() || !name.to_lowercase().ends_with(&wanted) {
            names.push(name);
            continue;
        }

        let mut raw = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut raw)
            .map_err(|err| ArchiveError::Corrupt(format!("{name}: {err}")))?;
        let text = String::from_utf8_lossy(&raw).into_owned();
        debug!(
            target: "reports.archive",
            entry = %name,
            chars = text.len(),
            "archive entry extracted"
        );
        return Ok(text);
    }

    Err(ArchiveError::NoMatchingEntry {
        extension: extension.to_string(),
        entries: names,
    })
}
