//! Per-Server Metadata Store
//!
//! Owns the two-layer affix trie plus the object-metadata map
//! (objectId -> recorded key/value pairs) and answers every query shape a
//! server supports. Checkpointing serializes the metadata map to
//! `<dataDir>/server_<id>/index.dat`; recovery replays it through
//! `add_indexed_key` to rebuild the trie.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::ObjectId;
use super::pattern::{AffixPattern, split_query};
use super::trie::{KeyTrie, ValueTrie};
use crate::query::condition::MultiConditionQuery;
use crate::query::range::RangeQuery;
use crate::query::{QueryParseError, is_structured};

/// Version header of the checkpoint file.
const INDEX_HEADER: &str = "IDIOMS_INDEX_V1";

pub struct MetadataStore {
    server_id: usize,
    data_dir: PathBuf,
    suffix_mode: bool,
    key_trie: KeyTrie,
    object_metadata: HashMap<ObjectId, Vec<(String, String)>>,
}

impl MetadataStore {
    /// Creates the store and its `<dataDir>/server_<id>/` directory.
    pub fn new(server_id: usize, data_dir: &Path, suffix_mode: bool) -> Result<Self> {
        let server_dir = data_dir.join(format!("server_{}", server_id));
        fs::create_dir_all(&server_dir)
            .with_context(|| format!("creating data directory {}", server_dir.display()))?;

        Ok(Self {
            server_id,
            data_dir: data_dir.to_path_buf(),
            suffix_mode,
            key_trie: KeyTrie::new(suffix_mode),
            object_metadata: HashMap::new(),
        })
    }

    pub fn server_id(&self) -> usize {
        self.server_id
    }

    pub fn suffix_mode(&self) -> bool {
        self.suffix_mode
    }

    fn index_file(&self) -> PathBuf {
        self.data_dir
            .join(format!("server_{}", self.server_id))
            .join("index.dat")
    }

    /// Absorbs one metadata record into the trie and the metadata map.
    /// Re-inserting the same record is idempotent at the id-set level.
    pub fn add_indexed_key(&mut self, key: &str, value: &str, object_id: ObjectId) {
        let value_trie = if self.suffix_mode {
            self.key_trie.insert_key_with_suffix_mode(key)
        } else {
            self.key_trie.insert_key_only(key)
        };

        if self.suffix_mode {
            value_trie.insert_value_with_suffix_mode(value, object_id);
        } else {
            value_trie.insert_value(value, object_id);
        }

        self.object_metadata
            .entry(object_id)
            .or_default()
            .push((key.to_string(), value.to_string()));
    }

    /// Removes a `(key, value)` record for an object. The id is dropped
    /// from the trie's id-sets, but trie nodes and terminal flags stay, so
    /// `can_handle_query` may keep answering true for deleted-only keys.
    pub fn remove_indexed_key(&mut self, key: &str, value: &str, object_id: ObjectId) {
        self.key_trie.remove_value(key, value, object_id);

        if let Some(records) = self.object_metadata.get_mut(&object_id) {
            records.retain(|(k, v)| !(k == key && v == value));
            if records.is_empty() {
                self.object_metadata.remove(&object_id);
            }
        }

        tracing::debug!(
            "deleted metadata '{}={}' for object {} on server {}",
            key,
            value,
            object_id,
            self.server_id
        );
    }

    /// Early check whether this server's partition can contain anything
    /// relevant to the query. Structured queries are always accepted since
    /// they scan the metadata map.
    pub fn can_handle_query(&self, query: &str) -> bool {
        if is_structured(query) {
            return true;
        }

        let (key_part, _) = split_query(query);
        match AffixPattern::parse(&key_part) {
            AffixPattern::Wildcard => true,
            AffixPattern::Exact(key) => self.key_trie.search_exact_key(&key).is_some(),
            AffixPattern::Prefix(prefix) => !self.key_trie.search_key_prefix(&prefix).is_empty(),
            AffixPattern::Suffix(suffix) => !self.key_trie.search_key_suffix(&suffix).is_empty(),
            AffixPattern::Infix(infix) => !self.key_trie.search_key_infix(&infix).is_empty(),
        }
    }

    /// Runs a query of any supported grammar and returns the sorted,
    /// deduplicated object ids that match locally.
    pub fn execute_query(&self, query: &str) -> Result<Vec<ObjectId>, QueryParseError> {
        if RangeQuery::looks_like(query) {
            return Ok(self.execute_range_query(&RangeQuery::parse(query)?));
        }
        if MultiConditionQuery::looks_like(query) {
            return Ok(self.execute_multi_condition_query(&MultiConditionQuery::parse(query)?));
        }
        Ok(self.execute_affix_query(query))
    }

    /// The plain `keyPattern=valuePattern` path: resolve the key pattern
    /// to candidate value tries, run the value pattern inside each, union.
    pub fn execute_affix_query(&self, query: &str) -> Vec<ObjectId> {
        let (key_part, value_part) = split_query(query);
        let key_pattern = AffixPattern::parse(&key_part);
        let value_pattern = AffixPattern::parse(&value_part);

        let value_tries: Vec<&ValueTrie> = match &key_pattern {
            AffixPattern::Exact(key) => self.key_trie.search_exact_key(key).into_iter().collect(),
            AffixPattern::Prefix(prefix) => self.key_trie.search_key_prefix(prefix),
            AffixPattern::Suffix(suffix) => self.key_trie.search_key_suffix(suffix),
            AffixPattern::Infix(infix) => self.key_trie.search_key_infix(infix),
            AffixPattern::Wildcard => self.key_trie.all_value_tries(),
        };

        let mut result_set: HashSet<ObjectId> = HashSet::new();
        for value_trie in value_tries {
            let ids = match &value_pattern {
                AffixPattern::Exact(value) => value_trie.search_exact(value),
                AffixPattern::Prefix(prefix) => value_trie.search_prefix(prefix),
                AffixPattern::Suffix(suffix) => value_trie.search_suffix(suffix),
                AffixPattern::Infix(infix) => value_trie.search_infix(infix),
                AffixPattern::Wildcard => value_trie.all_object_ids(),
            };
            result_set.extend(ids);
        }

        let mut results: Vec<ObjectId> = result_set.into_iter().collect();
        results.sort_unstable();
        results
    }

    /// Evaluates a condition chain against every object's records.
    pub fn execute_multi_condition_query(&self, query: &MultiConditionQuery) -> Vec<ObjectId> {
        let mut results: Vec<ObjectId> = self
            .object_metadata
            .iter()
            .filter(|(_, records)| query.matches(records))
            .map(|(&object_id, _)| object_id)
            .collect();
        results.sort_unstable();
        results
    }

    /// Evaluates a range query against every object's records.
    pub fn execute_range_query(&self, query: &RangeQuery) -> Vec<ObjectId> {
        let mut results: Vec<ObjectId> = self
            .object_metadata
            .iter()
            .filter(|(_, records)| {
                records
                    .iter()
                    .any(|(key, value)| query.is_in_range(key, value))
            })
            .map(|(&object_id, _)| object_id)
            .collect();
        results.sort_unstable();
        results
    }

    /// Serializes the object-metadata map to the checkpoint file, prefixed
    /// with the version tag and the server configuration.
    pub fn checkpoint(&self) -> Result<()> {
        let mut out = String::new();
        out.push_str(INDEX_HEADER);
        out.push('\n');
        out.push_str(&format!(
            "{} {}\n",
            self.server_id,
            if self.suffix_mode { 1 } else { 0 }
        ));
        out.push_str(&format!("{}\n", self.object_metadata.len()));

        for (object_id, records) in &self.object_metadata {
            out.push_str(&format!("{} {}\n", object_id, records.len()));
            for (key, value) in records {
                out.push_str(key);
                out.push('\n');
                out.push_str(value);
                out.push('\n');
            }
        }

        let path = self.index_file();
        fs::write(&path, out).with_context(|| format!("writing checkpoint {}", path.display()))?;

        tracing::info!(
            "server {} checkpointed {} objects",
            self.server_id,
            self.object_metadata.len()
        );
        Ok(())
    }

    /// Rebuilds the in-memory index from the checkpoint file by replaying
    /// every record through `add_indexed_key`. Returns `Ok(false)` without
    /// touching the store when the header is unknown or the stored server
    /// id differs from this one.
    pub fn recover(&mut self) -> Result<bool> {
        let path = self.index_file();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("reading checkpoint {}", path.display()))?;
        let mut lines = content.lines();

        if lines.next() != Some(INDEX_HEADER) {
            tracing::warn!("checkpoint {} has an unknown header", path.display());
            return Ok(false);
        }

        let config_line = lines.next().unwrap_or_default();
        let mut parts = config_line.split_whitespace();
        let stored_id: usize = parts.next().unwrap_or("0").parse().unwrap_or(usize::MAX);
        let stored_suffix_mode = parts.next() == Some("1");

        if stored_id != self.server_id {
            tracing::warn!(
                "stored server id ({}) does not match current server id ({})",
                stored_id,
                self.server_id
            );
            return Ok(false);
        }

        self.object_metadata.clear();
        self.suffix_mode = stored_suffix_mode;
        self.key_trie = KeyTrie::new(stored_suffix_mode);

        let object_count: usize = lines.next().unwrap_or("0").parse().unwrap_or(0);
        for _ in 0..object_count {
            let Some(entry_line) = lines.next() else {
                break;
            };
            let mut parts = entry_line.split_whitespace();
            let Some(Ok(object_id)) = parts.next().map(str::parse::<ObjectId>) else {
                continue;
            };
            let record_count: usize = parts.next().unwrap_or("0").parse().unwrap_or(0);

            for _ in 0..record_count {
                let (Some(key), Some(value)) = (lines.next(), lines.next()) else {
                    break;
                };
                let (key, value) = (key.to_string(), value.to_string());
                self.add_indexed_key(&key, &value, object_id);
            }
        }

        tracing::info!(
            "server {} recovered {} objects from checkpoint",
            self.server_id,
            self.object_metadata.len()
        );
        Ok(true)
    }

    pub fn object_count(&self) -> usize {
        self.object_metadata.len()
    }
}
