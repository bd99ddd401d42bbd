//! The compiled unit: a template AST plus the metadata needed to decide
//! whether it is still valid for its source file.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::Metadata;
use std::time::UNIX_EPOCH;
use stencil_types::ast::Template;

/// Bumped whenever the serialized layout of [`CompiledUnit`] or the AST
/// changes; units with another version are recompiled.
pub const FORMAT_VERSION: u32 = 2;

/// A compiled template as stored in memory and in the cache directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledUnit {
    pub format_version: u32,
    /// Template path relative to the template directory.
    pub template_path: String,
    /// Source modification time (nanoseconds since the Unix epoch) observed
    /// when the source was read for compilation.
    pub source_mtime_ns: u64,
    /// SHA-256 of the source text, hex encoded.
    pub source_hash: String,
    pub template: Template,
}

impl CompiledUnit {
    pub fn new(template_path: &str, source: &str, source_mtime_ns: u64, template: Template) -> Self {
        Self {
            format_version: FORMAT_VERSION,
            template_path: template_path.to_string(),
            source_mtime_ns,
            source_hash: source_fingerprint(source),
            template,
        }
    }

    /// A unit is fresh while it is at least as new as its source.
    pub fn is_fresh(&self, source_mtime_ns: u64) -> bool {
        self.source_mtime_ns >= source_mtime_ns
    }

    /// Whether `source` is the text this unit was compiled from.
    pub fn matches_source(&self, source: &str) -> bool {
        self.source_hash == source_fingerprint(source)
    }
}

/// Hex-encoded SHA-256 of a template source.
pub fn source_fingerprint(source: &str) -> String {
    let digest = Sha256::digest(source.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Modification time of a file in nanoseconds since the Unix epoch.
/// Platforms without mtimes report 0, which makes every unit fresh.
pub fn modified_ns(metadata: &Metadata) -> u64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}
