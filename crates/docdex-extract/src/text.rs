//! Plain-text slice reader.

use docdex_core::ExtractError;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

/// Read a file from `offset` (bytes) to the end as UTF-8 text.
///
/// The offsets handed back by the chunker always land on word boundaries,
/// so resuming never splits a UTF-8 sequence. Files that are not valid
/// UTF-8 are reported as unreadable and skipped by the scheduler.
pub fn read_from(path: &Path, offset: usize) -> Result<String, ExtractError> {
    let mut file = File::open(path).map_err(|e| io_error(path, &e))?;
    file.seek(SeekFrom::Start(offset as u64))
        .map_err(|e| io_error(path, &e))?;

    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .map_err(|e| io_error(path, &e))?;

    String::from_utf8(bytes)
        .map_err(|_| ExtractError::IoUnreadable(format!("{} is not valid UTF-8", path.display())))
}

fn io_error(path: &Path, err: &std::io::Error) -> ExtractError {
    match err.kind() {
        ErrorKind::NotFound => ExtractError::IoMissing(path.display().to_string()),
        _ => ExtractError::IoUnreadable(format!("{}: {err}", path.display())),
    }
}
