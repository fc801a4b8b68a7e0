//! Cryptomatte manifest — the name → hash table.
//!
//! A manifest maps human-readable object names to their 32-bit ids.  It is
//! stored as JSON, either embedded in the image metadata (the value of the
//! `cryptomatte/<key>/manifest` attribute is itself a JSON document) or as
//! a sidecar file next to the image (`cryptomatte/<key>/manif_file` names a
//! path relative to the image's directory).
//!
//! # Ordering
//! Entry order is the JSON source's insertion order and is preserved — it
//! drives the iteration order of batched "all masks" extraction.  Lookup
//! goes through a side index; on duplicate names the first insertion wins.

use crate::error::{Error, Result};
use crate::hash::{hex_to_u32, HashView};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

// ── Manifest ─────────────────────────────────────────────────────────────────

/// Insertion-ordered mapping of object names to u32 hashes.
///
/// Value type: cheap to clone, freely copyable between cryptomattes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// (name, hash) pairs in source order.
    entries: Vec<(String, u32)>,
    /// name → position in `entries`; first insertion wins.
    index:   HashMap<String, usize>,
}

impl Manifest {
    /// Parse a manifest from a JSON object text, e.g.
    /// `{"hero": "00000001", "villain": "00000002"}`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let parsed: Map<String, Value> = serde_json::from_str(text)?;
        let mut manifest = Manifest::default();
        for (name, value) in parsed {
            let hex = value.as_str().ok_or_else(|| Error::TypeError { key: name.clone() })?;
            manifest.insert(name, hex_to_u32(hex)?);
        }
        Ok(manifest)
    }

    /// Build a manifest from (name, 8-digit hex) pairs, preserving their
    /// order.
    pub fn from_mapping<I, N, H>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (N, H)>,
        N: Into<String>,
        H: AsRef<str>,
    {
        let mut manifest = Manifest::default();
        for (name, hex) in pairs {
            let hash = hex_to_u32(hex.as_ref())?;
            manifest.insert(name.into(), hash);
        }
        Ok(manifest)
    }

    /// Scan an image's attribute map for a manifest, embedded or sidecar.
    ///
    /// Returns the first match in attribute order:
    /// - a key containing both `cryptomatte` and `manifest` → its value is
    ///   parsed as an embedded JSON manifest;
    /// - a key containing both `cryptomatte` and `manif_file` → its value
    ///   is a path resolved against `image_path`'s parent directory.  When
    ///   the file does not exist the entry is skipped with a warning and
    ///   scanning continues (an embedded manifest may still follow).
    ///
    /// The convention declares the two forms mutually exclusive; files that
    /// carry both are accepted and whichever matches first wins.  Sidecar
    /// paths starting with `./` or `../` are accepted as well — this is a
    /// lenient reader, not a validator.
    pub fn load(attributes: &Map<String, Value>, image_path: &Path) -> Result<Option<Self>> {
        for (key, value) in attributes {
            if key.contains("cryptomatte") && key.contains("manifest") {
                let text = value.as_str().ok_or_else(|| Error::TypeError { key: key.clone() })?;
                return Ok(Some(Self::from_json_str(text)?));
            }

            if key.contains("cryptomatte") && key.contains("manif_file") {
                let rel = value.as_str().ok_or_else(|| Error::TypeError { key: key.clone() })?;
                let sidecar = match image_path.parent() {
                    Some(dir) => dir.join(rel),
                    None => Path::new(rel).to_path_buf(),
                };
                if !sidecar.exists() {
                    warn!(
                        path = %sidecar.display(),
                        "sidecar manifest does not exist on disk, skipping"
                    );
                    continue;
                }
                let text = fs::read_to_string(&sidecar)?;
                return Ok(Some(Self::from_json_str(&text)?));
            }
        }
        Ok(None)
    }

    fn insert(&mut self, name: String, hash: u32) {
        if !self.index.contains_key(&name) {
            self.index.insert(name.clone(), self.entries.len());
        }
        self.entries.push((name, hash));
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Object names in source order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// (name, hash) pairs in source order, with the hash in the requested
    /// view: `u32`, `f32` (bit reinterpretation) or `String` (8-char hex).
    pub fn mapping<T: HashView>(&self) -> Vec<(String, T)> {
        self.entries
            .iter()
            .map(|(n, h)| (n.clone(), T::from_hash(*h)))
            .collect()
    }

    /// The hash of `name` in the requested view.
    pub fn hash<T: HashView>(&self, name: &str) -> Result<T> {
        self.index
            .get(name)
            .map(|&i| T::from_hash(self.entries[i].1))
            .ok_or_else(|| Error::UnknownName { name: name.to_string() })
    }

    /// Reverse lookup: the first name carrying `hash`, in source order.
    pub fn name_for_hash(&self, hash: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, h)| *h == hash)
            .map(|(n, _)| n.as_str())
    }
}
