//! Compiled-unit cache tests: persistence, staleness and failure modes.

use std::fs;

use stencil_compiler::{compile, CacheError, CompiledUnit, UnitCache, FORMAT_VERSION};
use stencil_parser::{MAX_BLOCK_DEPTH, MAX_GROUP_DEPTH};

fn unit(path: &str, source: &str, mtime: u64) -> CompiledUnit {
    let template = compile(path, source).expect("template should compile");
    CompiledUnit::new(path, source, mtime, template)
}

// ─────────────────────────────────────────────────────────────────────
// Persistence
// ─────────────────────────────────────────────────────────────────────

#[test]
fn store_then_load() {
    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path());
    let stored = unit("pages/list.htm", "{LOOP rows as r}{r}{ENDLOOP}", 42);

    let path = cache.store(&stored).unwrap();
    assert_eq!(path, dir.path().join("pages_list.htm.stc"));

    let loaded = cache.load("pages/list.htm").unwrap().expect("entry");
    assert_eq!(loaded, stored);
}

#[test]
fn store_replaces_previous_entry() {
    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path());
    cache.store(&unit("a.htm", "old", 1)).unwrap();
    cache.store(&unit("a.htm", "new", 2)).unwrap();

    let loaded = cache.load("a.htm").unwrap().unwrap();
    assert_eq!(loaded.source_mtime_ns, 2);

    // Only the entry itself remains; temporary files are renamed away.
    let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
}

#[test]
fn deepest_template_loads_back() {
    let mut condition = String::from("x:a:b.length == obj.m('k' ~ y:k1:k2:k3.last)");
    for _ in 0..MAX_GROUP_DEPTH {
        condition = format!("(a && {condition} || c)");
    }
    let depth = MAX_BLOCK_DEPTH as usize;
    let source = format!(
        "{}{{IF {condition} && z}}{{obj.m(p ~ q:k1:k2:k3.current)}}{{ENDIF}}{}",
        "{LOOP rows as r}".repeat(depth - 1),
        "{ENDLOOP}".repeat(depth - 1)
    );

    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path());
    let stored = unit("deep.htm", &source, 1);
    cache.store(&stored).unwrap();
    assert_eq!(cache.load("deep.htm").unwrap(), Some(stored));
}

#[test]
fn long_condition_chain_loads_back() {
    let chain = vec!["a"; 200].join(" && ");
    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path());
    let stored = unit("chain.htm", &format!("{{IF {chain}}}yes{{ENDIF}}"), 1);
    cache.store(&stored).unwrap();
    assert_eq!(cache.load("chain.htm").unwrap(), Some(stored));
}

// ─────────────────────────────────────────────────────────────────────
// Stale and broken entries
// ─────────────────────────────────────────────────────────────────────

#[test]
fn colliding_name_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path());
    // `a-b/x.htm` and `a_b/x.htm` flatten to the same file name.
    cache.store(&unit("a-b/x.htm", "1", 1)).unwrap();
    assert!(cache.load("a_b/x.htm").unwrap().is_none());
    assert!(cache.load("a-b/x.htm").unwrap().is_some());
}

#[test]
fn other_format_version_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path());
    let mut old = unit("a.htm", "x", 1);
    old.format_version = FORMAT_VERSION + 1;
    cache.store(&old).unwrap();
    assert!(cache.load("a.htm").unwrap().is_none());
}

#[test]
fn corrupt_entry_is_a_serialize_error() {
    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path());
    fs::write(cache.entry_path("a.htm"), b"{not json").unwrap();
    assert!(matches!(
        cache.load("a.htm"),
        Err(CacheError::Serialize { .. })
    ));
}

#[test]
fn missing_directory_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let cache = UnitCache::new(dir.path().join("does-not-exist"));
    let err = cache.store(&unit("a.htm", "x", 1)).unwrap_err();
    assert!(matches!(err, CacheError::Io { .. }));
    assert!(err.to_string().contains("does-not-exist"));
}
