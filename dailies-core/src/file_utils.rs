//! File utility functions.

use crate::error::{Result, TrackerError};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Recursively find files whose extension matches one of `extensions`
/// (case-insensitive), sorted by path.
pub fn find_files_with_extensions(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(TrackerError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory not found: {}", dir.display()),
        )));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        // Office lock files
        if entry.file_name().to_string_lossy().starts_with("~$") {
            continue;
        }
        if let Some(ext) = entry.path().extension().and_then(|e| e.to_str()) {
            if extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)) {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Read a text file as UTF-8, falling back to Windows-1252 for files saved
/// by older spreadsheet tools.
pub fn read_text_lossy_latin1(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_text(&bytes))
}

pub(crate) fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_utf8_with_bom() {
        assert_eq!(decode_text(b"\xEF\xBB\xBFPj;Cantidad"), "Pj;Cantidad");
    }

    #[test]
    fn test_decode_latin1_fallback() {
        // "Año" in Windows-1252
        assert_eq!(decode_text(b"A\xF1o"), "Año");
    }

    #[test]
    fn test_find_files_with_extensions() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.csv"), "x").unwrap();
        std::fs::write(dir.path().join("sub").join("b.XLSX"), "x").unwrap();
        std::fs::write(dir.path().join("~$b.xlsx"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = find_files_with_extensions(dir.path(), &["csv", "xlsx"]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(find_files_with_extensions(&dir.path().join("missing"), &["csv"]).is_err());
    }
}
