use std::io::{Cursor, Write};

use camino::{Utf8Path, Utf8PathBuf};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::PesuError;

const ALREADY_COMPRESSED: &[&str] = &[
    ".pdf", ".pptx", ".ppt", ".docx", ".xlsx", ".xls", ".zip", ".jpg", ".jpeg", ".png", ".gif",
    ".mp4", ".mp3",
];

/// Formats that gain nothing from another deflate pass.
pub fn is_already_compressed(extension: &str) -> bool {
    let extension = extension.to_lowercase();
    ALREADY_COMPRESSED.contains(&extension.as_str())
}

pub fn compression_for(extension: &str) -> CompressionMethod {
    if is_already_compressed(extension) {
        CompressionMethod::Stored
    } else {
        CompressionMethod::Deflated
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFile {
    pub path: String,
    pub extension: String,
    pub data: Vec<u8>,
}

/// Builds the whole archive in memory.
pub fn build_zip(files: &[ArchiveFile]) -> Result<Vec<u8>, PesuError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for file in files {
        let options =
            SimpleFileOptions::default().compression_method(compression_for(&file.extension));
        writer
            .start_file(file.path.as_str(), options)
            .map_err(|err| PesuError::Archive(format!("{}: {err}", file.path)))?;
        writer
            .write_all(&file.data)
            .map_err(|err| PesuError::Archive(format!("{}: {err}", file.path)))?;
    }
    let cursor = writer
        .finish()
        .map_err(|err| PesuError::Archive(err.to_string()))?;
    Ok(cursor.into_inner())
}

/// Writes `bytes` next to the target first and renames it into place.
pub fn write_atomic(
    dir: &Utf8Path,
    file_name: &str,
    bytes: &[u8],
) -> Result<Utf8PathBuf, PesuError> {
    std::fs::create_dir_all(dir.as_std_path())
        .map_err(|err| PesuError::Filesystem(format!("create {dir}: {err}")))?;
    let target = dir.join(file_name);
    let mut temp = tempfile::Builder::new()
        .prefix(".pesu-sync")
        .tempfile_in(dir.as_std_path())
        .map_err(|err| PesuError::Filesystem(err.to_string()))?;
    temp.write_all(bytes)
        .map_err(|err| PesuError::Filesystem(err.to_string()))?;
    temp.persist(target.as_std_path())
        .map_err(|err| PesuError::Filesystem(format!("persist {target}: {err}")))?;
    Ok(target)
}
