//! Archive ingestion: size-capped saving of an uploaded zip and
//! traversal-safe extraction of its contents.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, warn};
use zip::ZipArchive;

use crate::error::Error;

/// Subdirectory of the working directory the archive is unpacked into.
const EXTRACT_DIR: &str = "extracted";

/// Save the upload stream into the working directory, reading at most
/// `max_size` bytes. Reaching the ceiling discards the partial file and
/// fails with [`Error::TooLarge`].
pub async fn save_archive<R>(
    workdir: &Path,
    filename: &str,
    reader: &mut R,
    max_size: u64,
) -> Result<PathBuf, Error>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let archive_path = workdir.join(sanitize_filename(filename));

    let mut out = tokio::fs::File::create(&archive_path).await?;
    let mut limited = reader.take(max_size);
    let written = tokio::io::copy(&mut limited, &mut out).await?;
    out.flush().await?;
    drop(out);

    if written >= max_size {
        let _ = tokio::fs::remove_file(&archive_path).await;
        return Err(Error::TooLarge(max_size));
    }

    debug!(path = %archive_path.display(), size = written, "archive saved");
    Ok(archive_path)
}

/// Unpack the archive into `<workdir>/extracted` and return that root.
///
/// Every entry's resolved destination must stay strictly inside the
/// extraction root; entries that escape (zip-slip) are skipped and
/// logged, not fatal. Entries are processed in archive order, once each.
/// Blocking; callers drive it through `spawn_blocking`.
pub fn extract_archive(archive_path: &Path, workdir: &Path) -> Result<PathBuf, Error> {
    let root = workdir.join(EXTRACT_DIR);
    fs::create_dir(&root)?;
    let root = root.canonicalize()?;

    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| Error::Archive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| Error::Archive(e.to_string()))?;

        let dest = match validate_entry_path(&root, entry.name()) {
            Some(dest) => dest,
            None => {
                warn!(entry = entry.name(), "skipping entry escaping the extraction root");
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&dest)?;
            set_unix_mode(&dest, entry.unix_mode())?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&dest)?;
        io::copy(&mut entry, &mut out)?;
        set_unix_mode(&dest, entry.unix_mode())?;
    }

    debug!(path = %root.display(), "archive extracted");
    Ok(root)
}

/// Resolve an entry name against the extraction root, rejecting any path
/// that would land outside it.
fn validate_entry_path(root: &Path, name: &str) -> Option<PathBuf> {
    let joined = root.join(name);

    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                if !resolved.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            other => resolved.push(other),
        }
    }

    (resolved.starts_with(root) && resolved != root).then_some(resolved)
}

/// Reduce a caller-supplied filename to a safe base name: only the final
/// path segment survives, and anything outside `[A-Za-z0-9._-]` becomes
/// an underscore.
pub fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    if base.is_empty() || base.chars().all(|c| c == '.') {
        return "upload.zip".to_string();
    }

    base.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(unix)]
fn set_unix_mode(path: &Path, mode: Option<u32>) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_unix_mode(_path: &Path, _mode: Option<u32>) -> io::Result<()> {
    Ok(())
}
