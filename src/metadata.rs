//! Per-cryptomatte metadata descriptors.
//!
//! A multi-layer image announces its cryptomattes through flat string
//! attributes keyed `cryptomatte/<key>/<attr>`, where `<key>` is a short
//! hex token disambiguating multiple cryptomattes in one file (the first
//! seven hex characters of the typename's own hash) and `<attr>` is one of
//! `name`, `hash`, `conversion`, `manifest`, `manif_file`.
//!
//! `name`, `hash` and `conversion` are mandatory.  The convention pins
//! `hash` to `MurmurHash3_32` and `conversion` to `uint32_to_float32`;
//! anything else is rejected at construction.

use crate::channel_name::{ChannelRef, LegacyChannelRef};
use crate::error::{Error, Result};
use crate::manifest::Manifest;
use serde_json::{Map, Value};
use std::path::Path;

/// The only hash algorithm the cryptomatte convention defines.
pub const HASH_METHOD: &str = "MurmurHash3_32";
/// The only hash-to-pixel conversion the convention defines.
pub const CONVERSION_METHOD: &str = "uint32_to_float32";

/// Attribute identifiers under `cryptomatte/<key>/`.
pub const ATTR_NAME:       &str = "name";
pub const ATTR_HASH:       &str = "hash";
pub const ATTR_CONVERSION: &str = "conversion";
pub const ATTR_MANIFEST:   &str = "manifest";
pub const ATTR_MANIF_FILE: &str = "manif_file";

// ── Metadata ─────────────────────────────────────────────────────────────────

/// The descriptor of one cryptomatte within an image.
#[derive(Debug, Clone)]
pub struct Metadata {
    typename: String,
    key:      String,
    manifest: Option<Manifest>,
}

impl Metadata {
    /// Validating constructor.  `hash_method` and `conversion_method` must
    /// equal their canonical values — they are not stored, only checked.
    pub fn new(
        typename: impl Into<String>,
        key: impl Into<String>,
        hash_method: &str,
        conversion_method: &str,
        manifest: Option<Manifest>,
    ) -> Result<Self> {
        if hash_method != HASH_METHOD {
            return Err(Error::UnsupportedHash {
                found: hash_method.to_string(),
                expected: HASH_METHOD,
            });
        }
        if conversion_method != CONVERSION_METHOD {
            return Err(Error::UnsupportedConversion {
                found: conversion_method.to_string(),
                expected: CONVERSION_METHOD,
            });
        }
        Ok(Self {
            typename: typename.into(),
            key: key.into(),
            manifest,
        })
    }

    /// Parse every cryptomatte descriptor out of an image's attribute map.
    ///
    /// Attributes whose first path segment is not `cryptomatte` are
    /// ignored.  The result is sorted by typename — this is the public
    /// ordering of multiple cryptomattes in one file; attribute iteration
    /// order is an implementation detail of the producing DCC.
    pub fn from_attributes(attributes: &Map<String, Value>, image_path: &Path) -> Result<Vec<Metadata>> {
        // Group the flat keys by their <key> segment, preserving first-seen
        // group order until the final sort.
        let mut group_order: Vec<String> = Vec::new();
        let mut groups: Vec<Vec<(&String, &Value)>> = Vec::new();

        for (full_key, value) in attributes {
            let mut segments = full_key.splitn(3, '/');
            if segments.next() != Some("cryptomatte") {
                continue;
            }
            let key = segments.next().filter(|s| !s.is_empty());
            let attr = segments.next().filter(|s| !s.is_empty());
            let (key, attr) = match (key, attr) {
                (Some(k), Some(a)) => (k, a),
                _ => return Err(Error::MalformedKey { key: full_key.clone() }),
            };
            if ![ATTR_NAME, ATTR_HASH, ATTR_CONVERSION, ATTR_MANIFEST, ATTR_MANIF_FILE].contains(&attr) {
                return Err(Error::UnknownAttribute {
                    key: full_key.clone(),
                    attr: attr.to_string(),
                });
            }

            match group_order.iter().position(|k| k == key) {
                Some(i) => groups[i].push((full_key, value)),
                None => {
                    group_order.push(key.to_string());
                    groups.push(vec![(full_key, value)]);
                }
            }
        }

        let mut out = Vec::with_capacity(groups.len());
        for (key, entries) in group_order.into_iter().zip(groups) {
            out.push(Self::from_group(&key, &entries, image_path)?);
        }
        out.sort_by(|a, b| a.typename.cmp(&b.typename));
        Ok(out)
    }

    fn from_group(key: &str, entries: &[(&String, &Value)], image_path: &Path) -> Result<Metadata> {
        let string_attr = |attr: &'static str| -> Result<Option<String>> {
            for (full_key, value) in entries {
                if full_key.rsplit('/').next() == Some(attr) {
                    let s = value
                        .as_str()
                        .ok_or_else(|| Error::TypeError { key: (*full_key).clone() })?;
                    return Ok(Some(s.to_string()));
                }
            }
            Ok(None)
        };
        let required = |attr: &'static str| -> Result<String> {
            string_attr(attr)?.ok_or(Error::MissingRequired {
                key: key.to_string(),
                attr,
            })
        };

        let typename   = required(ATTR_NAME)?;
        let hash       = required(ATTR_HASH)?;
        let conversion = required(ATTR_CONVERSION)?;

        // Manifest extraction scans the group's own entries, so a sidecar
        // reference in one cryptomatte never bleeds into another.
        let sub_map: Map<String, Value> = entries
            .iter()
            .map(|(k, v)| ((*k).clone(), (*v).clone()))
            .collect();
        let manifest = Manifest::load(&sub_map, image_path)?;

        Metadata::new(typename, key, &hash, &conversion, manifest)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    /// The cryptomatte's typename, e.g. `CryptoAsset` — the prefix of all
    /// its channel names.
    #[inline]
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// The short hex token identifying this cryptomatte's metadata group.
    #[inline]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Always [`HASH_METHOD`] — kept as an accessor for introspection.
    #[inline]
    pub fn hash_method(&self) -> &'static str {
        HASH_METHOD
    }

    /// Always [`CONVERSION_METHOD`].
    #[inline]
    pub fn conversion_method(&self) -> &'static str {
        CONVERSION_METHOD
    }

    #[inline]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    // ── Channel-name filtering ───────────────────────────────────────────────

    /// True when `name` parses as a cryptomatte data channel of this
    /// typename (`<typename>NN.<chan>`).
    pub fn is_valid_channel_name(&self, name: &str) -> bool {
        ChannelRef::parse(name).is_ok_and(|r| r.typename == self.typename)
    }

    /// True when `name` parses as a legacy preview channel of this typename
    /// (`<typename>.<chan>`, no index).
    pub fn is_valid_legacy_channel_name(&self, name: &str) -> bool {
        LegacyChannelRef::parse(name).is_ok_and(|r| r.typename == self.typename)
    }

    /// Filter `all` down to this cryptomatte's data channels, preserving
    /// input order.
    pub fn channel_names(&self, all: &[String]) -> Vec<String> {
        all.iter()
            .filter(|n| self.is_valid_channel_name(n))
            .cloned()
            .collect()
    }

    /// Filter `all` down to this cryptomatte's legacy preview channels.
    pub fn legacy_channel_names(&self, all: &[String]) -> Vec<String> {
        all.iter()
            .filter(|n| self.is_valid_legacy_channel_name(n))
            .cloned()
            .collect()
    }
}
