//! Package blobs: `.tar.gz` archives of a package source tree
//!
//! A blob holds `manifest.yaml`, `templates/**` and any other non-hidden file
//! of the source tree. Entries are sorted and timestamps zeroed so that the
//! same tree always packs to the same bytes.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use tar::{Archive, Builder, Header};
use walkdir::WalkDir;

use crate::error::{CoreError, Result};
use crate::package::{MANIFEST_FILE, Manifest};

/// Pack a package source tree into a blob
pub fn pack_dir(root: &Path) -> Result<Vec<u8>> {
    if !root.join(MANIFEST_FILE).exists() {
        return Err(CoreError::ManifestNotFound {
            path: root.join(MANIFEST_FILE).display().to_string(),
        });
    }

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = Builder::new(encoder);

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Archive {
            message: format!("failed to walk {}: {}", root.display(), e),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read(entry.path())?;
        add_bytes(&mut builder, &rel, &content)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Read every regular file of a blob into memory, keyed by archive path
pub fn read_all(blob: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut archive = Archive::new(GzDecoder::new(blob));
    let mut files = BTreeMap::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let path = normalize(&entry.path()?.to_string_lossy());
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.insert(path, data);
    }

    Ok(files)
}

/// Unpack the manifest and every template source without touching disk
pub fn unpack_manifest(blob: &[u8]) -> Result<Manifest> {
    let files = read_all(blob)?;
    Manifest::from_files(&files)
}

/// Extract a blob below `dest`
///
/// Fails with [`CoreError::Extract`] if `dest` already holds files, unless
/// `overwrite` is set.
pub fn extract(blob: &[u8], dest: &Path, overwrite: bool) -> Result<()> {
    if dest.exists() {
        let occupied = !dest.is_dir() || std::fs::read_dir(dest)?.next().is_some();
        if occupied && !overwrite {
            return Err(CoreError::Extract {
                path: dest.to_path_buf(),
            });
        }
    }

    std::fs::create_dir_all(dest)?;
    let mut archive = Archive::new(GzDecoder::new(blob));
    archive.set_overwrite(true);
    archive.unpack(dest)?;

    tracing::debug!("extracted package into {}", dest.display());
    Ok(())
}

/// List the entries of a blob in archive order
pub fn list_entries(blob: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = Archive::new(GzDecoder::new(blob));
    let mut entries = Vec::new();

    for entry in archive.entries()? {
        let entry = entry?;
        entries.push(ArchiveEntry {
            path: normalize(&entry.path()?.to_string_lossy()),
            size: entry.header().size()?,
            is_dir: entry.header().entry_type().is_dir(),
        });
    }

    Ok(entries)
}

/// Read one file from a blob
pub fn read_file(blob: &[u8], path: &str) -> Result<Vec<u8>> {
    let wanted = normalize(path);
    let mut archive = Archive::new(GzDecoder::new(blob));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if normalize(&entry.path()?.to_string_lossy()) == wanted {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(content);
        }
    }

    Err(CoreError::Archive {
        message: format!("file not found in package: {}", path),
    })
}

/// Information about a file in a blob
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Relative path within the package
    pub path: String,
    /// File size in bytes
    pub size: u64,
    pub is_dir: bool,
}

fn add_bytes<W: Write>(builder: &mut Builder<W>, path: &str, content: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder.append_data(&mut header, path, content)?;
    Ok(())
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn normalize(path: &str) -> String {
    path.trim_start_matches("./").to_string()
}
