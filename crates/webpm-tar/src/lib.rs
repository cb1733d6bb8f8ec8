//! In-memory gzip+tar extraction (spec §4.6). Everything is streamed from a
//! byte slice into `(path, bytes)` pairs; nothing touches a local filesystem.

use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Component, Path};
use tar::{Archive, EntryType};
use webpm_error::{Result, WebpmError};
use webpm_logger::get_logger;

/// Default per-file soft cap (a warning is emitted past this point).
pub const DEFAULT_SOFT_CAP_BYTES: u64 = 1024 * 1024;

/// Default per-file hard cap (extraction aborts past this point).
pub const DEFAULT_HARD_CAP_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub soft_cap_bytes: u64,
    pub hard_cap_bytes: u64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            soft_cap_bytes: DEFAULT_SOFT_CAP_BYTES,
            hard_cap_bytes: DEFAULT_HARD_CAP_BYTES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Typescript,
    TypescriptDeclaration,
    Javascript,
    Json,
    PlainText,
    Octet,
}

impl ContentType {
    #[must_use]
    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Typescript => "application/typescript",
            Self::TypescriptDeclaration => "application/typescript-declaration",
            Self::Javascript => "application/javascript",
            Self::Json => "application/json",
            Self::PlainText => "text/plain",
            Self::Octet => "application/octet-stream",
        }
    }
}

#[must_use]
pub fn classify_content_type(relative_path: &str, bytes: &[u8]) -> ContentType {
    let lower = relative_path.to_ascii_lowercase();
    if lower.ends_with(".d.ts") {
        return ContentType::TypescriptDeclaration;
    }
    if lower.ends_with(".ts") || lower.ends_with(".tsx") || lower.ends_with(".mts") || lower.ends_with(".cts") {
        return ContentType::Typescript;
    }
    if lower.ends_with(".js") || lower.ends_with(".mjs") || lower.ends_with(".cjs") {
        return ContentType::Javascript;
    }
    if lower.ends_with(".json") {
        return ContentType::Json;
    }
    if std::str::from_utf8(bytes).is_ok() {
        ContentType::PlainText
    } else {
        ContentType::Octet
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedFile {
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: ContentType,
    pub truncated_by_soft_cap: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractedArchive {
    pub files: Vec<ExtractedFile>,
    pub skipped_links: Vec<String>,
}

/// Strip the leading `package/` directory and reject any `..` component.
fn normalize_path(path: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => parts.push(segment.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(WebpmError::MalformedArchive(format!(
                    "path escapes archive root: {}",
                    path.display()
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(WebpmError::MalformedArchive(format!(
                    "absolute path in archive: {}",
                    path.display()
                )));
            }
        }
    }

    if parts.is_empty() {
        return Err(WebpmError::MalformedArchive("empty entry path".to_string()));
    }

    if parts[0] == "package" {
        parts.remove(0);
    }

    if parts.is_empty() {
        return Err(WebpmError::MalformedArchive(
            "entry path was only the `package/` prefix".to_string(),
        ));
    }

    Ok(parts.join("/"))
}

/// Gunzip and untar `gz_bytes`, yielding regular files only. Directories are
/// dropped silently; symlinks and hardlinks are skipped with a warning.
pub fn extract(gz_bytes: &[u8], options: &ExtractOptions) -> Result<ExtractedArchive> {
    let decoder = GzDecoder::new(gz_bytes);
    let mut archive = Archive::new(decoder);
    let mut result = ExtractedArchive::default();

    let entries = archive
        .entries()
        .map_err(|e| WebpmError::MalformedArchive(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| WebpmError::MalformedArchive(e.to_string()))?;
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Regular | EntryType::Continuous => {}
            EntryType::Symlink | EntryType::Link => {
                let raw_path = entry
                    .path()
                    .map_err(|e| WebpmError::MalformedArchive(e.to_string()))?
                    .to_string_lossy()
                    .into_owned();
                get_logger().warn(&format!("skipping link entry in tarball: {raw_path}"));
                result.skipped_links.push(raw_path);
                continue;
            }
            _ => continue,
        }

        let raw_path = entry
            .path()
            .map_err(|e| WebpmError::MalformedArchive(e.to_string()))?
            .into_owned();
        let relative_path = normalize_path(&raw_path)?;

        let mut bytes = Vec::new();
        entry
            .by_ref()
            .take(options.hard_cap_bytes + 1)
            .read_to_end(&mut bytes)
            .map_err(|e| WebpmError::MalformedArchive(e.to_string()))?;

        if bytes.len() as u64 > options.hard_cap_bytes {
            return Err(WebpmError::BadTarball {
                expected_size: options.hard_cap_bytes,
                received_size: bytes.len() as u64,
            });
        }

        let truncated_by_soft_cap = bytes.len() as u64 > options.soft_cap_bytes;
        if truncated_by_soft_cap {
            get_logger().warn(&format!(
                "{relative_path} is {} bytes, past the soft cap of {}",
                bytes.len(),
                options.soft_cap_bytes
            ));
        }

        let content_type = classify_content_type(&relative_path, &bytes);
        result.files.push(ExtractedFile {
            path: relative_path,
            bytes,
            content_type,
            truncated_by_soft_cap,
        });
    }

    Ok(result)
}
