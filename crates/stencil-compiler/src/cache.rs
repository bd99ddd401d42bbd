//! On-disk store of compiled units.
//!
//! Each template maps to one flat file in the cache directory. Entries are
//! written to a temporary file in the same directory and renamed into place,
//! so a reader never observes a half-written unit.

use serde::Deserialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::unit::{CompiledUnit, FORMAT_VERSION};

/// Extension of cache files.
pub const CACHE_EXTENSION: &str = "stc";

/// Flat cache file name for a template path.
///
/// The directory part has every non-alphanumeric character replaced by `_`
/// and is joined with `_` to the file name: `pages/user/list.htm` becomes
/// `pages_user_list.htm.stc`.
pub fn cache_file_name(template_path: &str) -> String {
    let normalized = template_path.replace('\\', "/");
    let (dir, file) = match normalized.rsplit_once('/') {
        Some((dir, file)) => (dir, file),
        None => ("", normalized.as_str()),
    };
    let dir: String = dir
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if dir.is_empty() {
        format!("{file}.{CACHE_EXTENSION}")
    } else {
        format!("{dir}_{file}.{CACHE_EXTENSION}")
    }
}

/// Decode a stored unit. Nesting is bounded by the parser's block and group
/// limits, and a template at those limits nests deeper than `serde_json`'s
/// default recursion limit of 128.
fn decode(bytes: &[u8]) -> serde_json::Result<CompiledUnit> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let unit = CompiledUnit::deserialize(&mut de)?;
    de.end()?;
    Ok(unit)
}

/// A directory of serialized [`CompiledUnit`]s.
#[derive(Debug, Clone)]
pub struct UnitCache {
    dir: PathBuf,
}

impl UnitCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the cache file for `template_path`.
    pub fn entry_path(&self, template_path: &str) -> PathBuf {
        self.dir.join(cache_file_name(template_path))
    }

    /// Read the unit for `template_path`.
    ///
    /// `Ok(None)` when there is no entry, or when the entry belongs to an
    /// older format or to another template whose name flattens the same way.
    pub fn load(&self, template_path: &str) -> Result<Option<CompiledUnit>, CacheError> {
        let path = self.entry_path(template_path);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        let unit = decode(&bytes).map_err(|source| CacheError::Serialize { path: path.clone(), source })?;

        if unit.format_version != FORMAT_VERSION || unit.template_path != template_path {
            tracing::debug!(
                cache_file = %path.display(),
                template = template_path,
                "ignoring stale cache entry"
            );
            return Ok(None);
        }
        Ok(Some(unit))
    }

    /// Persist `unit` atomically, replacing any previous entry.
    pub fn store(&self, unit: &CompiledUnit) -> Result<PathBuf, CacheError> {
        let path = self.entry_path(&unit.template_path);
        let bytes = serde_json::to_vec(unit)
            .map_err(|source| CacheError::Serialize { path: path.clone(), source })?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| CacheError::io(&self.dir, e))?;
        tmp.write_all(&bytes)
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| CacheError::io(&path, e.error))?;

        tracing::debug!(
            cache_file = %path.display(),
            template = %unit.template_path,
            "stored compiled unit"
        );
        Ok(path)
    }
}
