//! Handler detection: find the entry-point file and language of an
//! extracted archive, manifest first, extension heuristic second.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::Error;
use crate::types::{HandlerDescriptor, HandlerManifest, Language};

/// Manifest recognized at the root of an uploaded archive.
pub const MANIFEST_FILE: &str = "function.json";

/// Resolve the handler for an extracted tree.
///
/// A valid manifest always wins. Without one, root-level files are
/// scanned in lexicographic order and the first recognized extension
/// wins; sorting keeps the outcome independent of filesystem iteration
/// order.
pub fn detect_handler(root: &Path) -> Result<HandlerDescriptor, Error> {
    if let Some(descriptor) = manifest_handler(root) {
        return Ok(descriptor);
    }

    let mut names: Vec<String> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    for name in names {
        if let Some(language) = Language::from_extension(Path::new(&name)) {
            info!(handler = %name, %language, "handler detected by extension");
            return Ok(HandlerDescriptor {
                handler: name,
                language,
            });
        }
    }

    Err(Error::NoHandlerFound)
}

/// First pass: a parseable manifest whose handler file exists on disk.
/// Anything less falls through to the heuristic scan.
fn manifest_handler(root: &Path) -> Option<HandlerDescriptor> {
    let path = root.join(MANIFEST_FILE);
    let data = fs::read(&path).ok()?;

    let manifest: HandlerManifest = match serde_json::from_slice(&data) {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(error = %err, "ignoring malformed manifest");
            return None;
        }
    };

    let language = match manifest.language.parse::<Language>() {
        Ok(language) => language,
        Err(_) => {
            warn!(language = %manifest.language, "ignoring manifest with unknown language");
            return None;
        }
    };

    if manifest.handler.is_empty() || !root.join(&manifest.handler).is_file() {
        warn!(handler = %manifest.handler, "ignoring manifest with missing handler file");
        return None;
    }

    info!(handler = %manifest.handler, %language, "handler detected from manifest");
    Some(HandlerDescriptor {
        handler: manifest.handler,
        language,
    })
}
