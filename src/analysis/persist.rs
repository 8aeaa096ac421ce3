use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes `contents` next to `path` and renames it into place, so readers see
/// either the old or the new file. Keeps the permissions of an existing file.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = temp_path(path);
    fs::write(&tmp, contents)?;

    if let Ok(meta) = fs::metadata(path) {
        if let Err(e) = fs::set_permissions(&tmp, meta.permissions()) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
    }

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.kodo-tmp"))
}
