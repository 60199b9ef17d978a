//! Engine-type display-name cache.
//!
//! Maps `engine_type_id -> display name`. Entries are only ever added: a name,
//! once cached, is never replaced, so concurrent readers and inserters need no
//! coordination beyond the map's own sharding.

use dashmap::DashMap;

use super::error::MetadataResult;

/// Append-only, read-through cache of engine-type names.
#[derive(Debug, Default)]
pub struct TypeNameCache {
    entries: DashMap<i64, String>,
}

impl TypeNameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached name, if present.
    pub fn get(&self, engine_type_id: i64) -> Option<String> {
        self.entries.get(&engine_type_id).map(|e| e.value().clone())
    }

    /// Return the cached name or load it with `load` and remember it.
    ///
    /// Missing ids are not cached, so a type registered later is still found.
    pub fn get_or_load<F>(&self, engine_type_id: i64, load: F) -> MetadataResult<Option<String>>
    where
        F: FnOnce() -> MetadataResult<Option<String>>,
    {
        if let Some(name) = self.get(engine_type_id) {
            return Ok(Some(name));
        }

        let Some(name) = load()? else {
            return Ok(None);
        };

        // First writer wins.
        let entry = self.entries.entry(engine_type_id).or_insert(name);
        Ok(Some(entry.value().clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
