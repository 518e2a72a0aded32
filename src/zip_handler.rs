use encoding_rs::GBK;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::error::{Error, Result};

const GEOMETRY_EXTENSION: &str = "shp";
const ENCODING_EXTENSION: &str = "cpg";

/// Retry policy for removing the scratch directory.
#[derive(Debug, Clone, Copy)]
pub struct CleanupPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Extraction area for one archive.
///
/// Stale content is removed on creation and the directory is removed again
/// on drop, whichever way the archive's processing ended.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    policy: CleanupPolicy,
}

impl ScratchDir {
    pub fn create(path: impl Into<PathBuf>, policy: CleanupPolicy) -> Result<Self> {
        let path = path.into();
        if !remove_dir_with_retry(&path, &policy) {
            warn!("Scratch directory {:?} still holds stale files", path);
        }
        fs::create_dir_all(&path)?;
        Ok(Self { path, policy })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        remove_dir_with_retry(&self.path, &self.policy);
    }
}

/// Removes `path` recursively, retrying on failure.
///
/// After the retries are exhausted, permissions are cleared and files are
/// deleted one by one before a last whole-directory attempt. Returns whether
/// the directory is gone; failures are only logged.
pub fn remove_dir_with_retry(path: &Path, policy: &CleanupPolicy) -> bool {
    if !path.exists() {
        return true;
    }

    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        match fs::remove_dir_all(path) {
            Ok(()) => return true,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => {
                warn!(
                    "Failed to remove {:?} (attempt {}/{}): {}",
                    path, attempt, attempts, e
                );
                if attempt < attempts {
                    thread::sleep(policy.retry_delay);
                }
            }
        }
    }

    clear_files(path);
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            error!("Could not remove {:?}, please delete it manually: {}", path, e);
            false
        }
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn clear_files(path: &Path) {
    for entry in WalkDir::new(path).contents_first(true).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let file = entry.path();
        if let Ok(metadata) = fs::metadata(file) {
            let mut permissions = metadata.permissions();
            permissions.set_readonly(false);
            let _ = fs::set_permissions(file, permissions);
        }
        if let Err(e) = fs::remove_file(file) {
            warn!("Could not remove {:?}: {}", file, e);
        }
    }
}

/// Geometry file located inside an extracted archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub geometry_file: PathBuf,
    /// Path relative to the scratch root, `/`-separated.
    pub relative_path: String,
    /// Whether a `.cpg` file sits next to the geometry file.
    pub has_cpg: bool,
}

pub struct ZipHandler {
    zip_path: PathBuf,
}

impl ZipHandler {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            zip_path: path.as_ref().to_path_buf(),
        }
    }

    /// Unpacks every entry into `scratch` and returns the first `.shp` found.
    ///
    /// Archives with several geometry files are reduced to the first one in
    /// traversal order (shallowest, then by path).
    pub fn extract_to(&self, scratch: &ScratchDir) -> Result<ExtractionResult> {
        let file = File::open(&self.zip_path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = repair_entry_name(entry.name_raw(), entry.name());

            let Some(relative) = safe_relative_path(&name) else {
                warn!("Skipping unsafe entry {:?} in {:?}", name, self.zip_path);
                continue;
            };
            let out_path = scratch.path().join(relative);

            if entry.is_dir() || name.ends_with('/') || name.ends_with('\\') {
                fs::create_dir_all(&out_path)?;
                continue;
            }
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&out_path)?;
            io::copy(&mut entry, &mut out)?;
        }

        let geometry_file = find_geometry_file(scratch.path()).ok_or(Error::NoGeometryFile)?;
        let has_cpg = has_sibling_with_extension(&geometry_file, ENCODING_EXTENSION);
        let relative_path = relative_display(scratch.path(), &geometry_file);
        debug!("Found geometry file {} (cpg: {})", relative_path, has_cpg);

        Ok(ExtractionResult {
            geometry_file,
            relative_path,
            has_cpg,
        })
    }
}

/// Recovers a readable entry name from the raw stored bytes.
///
/// Tries GBK first, then UTF-8, and otherwise keeps the archive's own
/// decoding. Names the archive already decoded as UTF-8 are kept.
pub fn repair_entry_name(raw: &[u8], decoded: &str) -> String {
    if raw.is_ascii() {
        return decoded.replace('\\', "/");
    }
    let name = if std::str::from_utf8(raw).ok() == Some(decoded) {
        decoded.to_string()
    } else if let Some(name) = GBK.decode_without_bom_handling_and_without_replacement(raw) {
        name.into_owned()
    } else if let Ok(name) = std::str::from_utf8(raw) {
        name.to_string()
    } else {
        decoded.to_string()
    };
    name.replace('\\', "/")
}

fn safe_relative_path(name: &str) -> Option<PathBuf> {
    let mut path = PathBuf::new();
    for part in name.split('/') {
        match part {
            "" | "." => continue,
            ".." => return None,
            part if part.contains(':') => return None,
            part => path.push(part),
        }
    }
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

fn find_geometry_file(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .flatten()
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| has_extension(entry.path(), GEOMETRY_EXTENSION))
        .min_by_key(|entry| entry.depth())
        .map(|entry| entry.into_path())
}

fn relative_display(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn has_sibling_with_extension(file: &Path, ext: &str) -> bool {
    let Some(dir) = file.parent() else {
        return false;
    };
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .any(|entry| entry.path().is_file() && has_extension(&entry.path(), ext))
        })
        .unwrap_or(false)
}

/// Sidecar of `geometry_file` with extension `ext`, matched case-insensitively.
pub fn sidecar_path(geometry_file: &Path, ext: &str) -> Option<PathBuf> {
    let exact = geometry_file.with_extension(ext);
    if exact.is_file() {
        return Some(exact);
    }

    let stem = geometry_file.file_stem()?;
    let dir = geometry_file.parent()?;
    let mut matches: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| path.file_stem() == Some(stem) && has_extension(path, ext))
        .collect();
    matches.sort();
    matches.into_iter().next()
}
