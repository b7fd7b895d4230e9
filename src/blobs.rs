use anyhow::{anyhow, Context};
use std::path::{Component, Path, PathBuf};

pub const BLOB_DIR: &str = "blobs";

/// Rejects absolute paths and `..` so uploads stay inside the blob root.
fn safe_relative(path: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(path);
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(anyhow!("blob path must be relative: {path}")),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(anyhow!("blob path is empty"));
    }
    Ok(out)
}

/// Copies `source` into `<workspace>/blobs/<path>` and returns its URL.
pub fn upload(workspace: &Path, path: &str, source: &Path) -> anyhow::Result<String> {
    if !source.is_file() {
        return Err(anyhow!("file not found: {}", source.to_string_lossy()));
    }
    let dest = workspace.join(BLOB_DIR).join(safe_relative(path)?);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::copy(source, &dest).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.to_string_lossy(),
            dest.to_string_lossy()
        )
    })?;
    let abs = dest.canonicalize().unwrap_or(dest);
    Ok(format!("file://{}", abs.to_string_lossy()))
}

pub fn journal_blob_path(student_id: &str, date: &str, file_name: &str) -> String {
    format!("journals/{student_id}/{date}/{file_name}")
}

pub fn community_blob_path(student_id: &str, stamp_millis: i64, file_name: &str) -> String {
    format!("communityNotes/{student_id}/{stamp_millis}_{file_name}")
}

pub fn mime_type_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
