//! The [`Cryptomatte`] type — one decoded cryptomatte's channels, metadata
//! and mask queries.
//!
//! A cryptomatte stores alternating `rank` and `coverage` channels: the
//! rank channel holds the object id of the k-th overlapping object at each
//! pixel, the paired coverage channel holds how much of that pixel the
//! object covers.  Channels are named `{typename}00.r`, `{typename}00.g`,
//! `{typename}00.b`, `{typename}00.a`, `{typename}01.r`, ... where after
//! canonical sorting the pairs (r, g) and (b, a) of each quad are the
//! rank/coverage pairs.  The unindexed `{typename}.r/g/b` channels are
//! legacy preview data and never participate in decoding.
//!
//! Masks are computed on demand by streaming the compressed channels chunk
//! by chunk; extracting many masks in one call amortizes chunk
//! decompression across the whole batch and is strongly preferable to
//! extracting them one at a time.

use crate::channel::{ChannelOptions, CompressedChannel};
use crate::channel_name::{self, LegacyChannelRef};
use crate::decode::{self, Level};
use crate::error::{Error, Result};
use crate::hash::u32_to_hex;
use crate::manifest::Manifest;
use crate::metadata::Metadata;
use std::collections::HashMap;
use tracing::warn;

// ── Cryptomatte ──────────────────────────────────────────────────────────────

/// One cryptomatte: its rank/coverage channels in canonical order, its
/// legacy preview channels, and its metadata.
///
/// Owns its channels exclusively; nothing is shared between cryptomattes.
#[derive(Debug)]
pub struct Cryptomatte {
    /// (name, channel) in canonical order — element 2k is rank k, element
    /// 2k+1 is coverage k.
    channels:        Vec<(String, CompressedChannel)>,
    /// `{typename}.r/g/b` preview channels; empty or exactly three.
    legacy_channels: HashMap<String, CompressedChannel>,
    metadata:        Metadata,
}

impl Cryptomatte {
    /// Assemble a cryptomatte from already-compressed channels, validating
    /// every structural invariant:
    /// - channel names sort into contiguous indices of complete r/g/b/a
    ///   quads (a trailing r/g pair is allowed) under the metadata's
    ///   typename;
    /// - all channels — legacy included — agree on shape, chunking and
    ///   compression parameters;
    /// - the legacy set is empty or exactly the three r/g/b previews.
    pub fn new(
        mut channels: HashMap<String, CompressedChannel>,
        legacy_channels: HashMap<String, CompressedChannel>,
        metadata: Metadata,
    ) -> Result<Self> {
        let names: Vec<String> = channels.keys().cloned().collect();
        let sorted = channel_name::sort_and_validate(&names)?;

        for name in &sorted {
            if !metadata.is_valid_channel_name(name) {
                return Err(Error::MalformedCryptomatte {
                    reason: format!(
                        "channel '{}' does not belong to cryptomatte '{}'",
                        name,
                        metadata.typename()
                    ),
                });
            }
        }

        let ordered: Vec<(String, CompressedChannel)> = sorted
            .into_iter()
            .map(|name| {
                let ch = channels.remove(&name).expect("validated name came from the map");
                (name, ch)
            })
            .collect();

        // Legacy previews: none, or the full r/g/b triple of this typename.
        if !legacy_channels.is_empty() {
            if legacy_channels.len() != 3 {
                return Err(Error::MalformedCryptomatte {
                    reason: format!(
                        "expected 0 or 3 legacy preview channels, got {}",
                        legacy_channels.len()
                    ),
                });
            }
            for name in legacy_channels.keys() {
                if !metadata.is_valid_legacy_channel_name(name) {
                    return Err(Error::MalformedCryptomatte {
                        reason: format!(
                            "'{}' is not a legacy preview channel of '{}'",
                            name,
                            metadata.typename()
                        ),
                    });
                }
            }
        }

        let reference = &ordered[0].1;
        let disagreeing = ordered
            .iter()
            .map(|(n, c)| (n, c))
            .chain(&legacy_channels)
            .find(|(_, ch)| !reference.same_layout(ch));
        if let Some((name, _)) = disagreeing {
            return Err(Error::MalformedCryptomatte {
                reason: format!("channel '{name}' disagrees on shape or compression parameters"),
            });
        }

        Ok(Self {
            channels: ordered,
            legacy_channels,
            metadata,
        })
    }

    /// Assemble a cryptomatte from flat pixel buffers, compressing each
    /// channel with `opts`.
    pub fn from_pixels(
        channels: HashMap<String, Vec<f32>>,
        legacy_channels: HashMap<String, Vec<f32>>,
        width: usize,
        height: usize,
        metadata: Metadata,
        opts: &ChannelOptions,
    ) -> Result<Self> {
        let compress = |map: HashMap<String, Vec<f32>>| -> Result<HashMap<String, CompressedChannel>> {
            map.into_iter()
                .map(|(name, pixels)| {
                    CompressedChannel::from_pixels(&pixels, width, height, opts).map(|ch| (name, ch))
                })
                .collect()
        };
        Self::new(compress(channels)?, compress(legacy_channels)?, metadata)
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline]
    pub fn width(&self) -> usize {
        self.channels[0].1.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.channels[0].1.height()
    }

    /// Number of rank/coverage pairs.  Up to `2 * num_levels` objects can
    /// be represented on a single pixel.
    #[inline]
    pub fn num_levels(&self) -> usize {
        self.channels.len() / 2
    }

    #[inline]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Shortcut for `metadata().manifest()`.
    #[inline]
    pub fn manifest(&self) -> Option<&Manifest> {
        self.metadata.manifest()
    }

    /// Channel names in canonical order.
    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|(n, _)| n.as_str())
    }

    /// The rank/coverage channels in canonical order.
    pub fn channels(&self) -> impl Iterator<Item = (&str, &CompressedChannel)> {
        self.channels.iter().map(|(n, c)| (n.as_str(), c))
    }

    // ── Preview channels ─────────────────────────────────────────────────────

    /// Whether the legacy `{typename}.r/g/b` preview channels were loaded.
    #[inline]
    pub fn has_preview(&self) -> bool {
        !self.legacy_channels.is_empty()
    }

    /// Decompress the preview channels in r, g, b order.  Empty when no
    /// previews were loaded.  Previews may contain a filtered color preview
    /// of all mattes; they have no effect on mask decoding.
    pub fn preview(&self) -> Result<Vec<Vec<f32>>> {
        let mut named: Vec<(&String, &CompressedChannel)> = self.legacy_channels.iter().collect();
        named.sort_by_key(|(name, _)| {
            LegacyChannelRef::parse(name).map(|r| r.ty).unwrap_or(crate::channel_name::ChannelType::Alpha)
        });
        named.into_iter().map(|(_, ch)| ch.get_decompressed()).collect()
    }

    /// The preview channels in compressed form, keyed by name.
    #[inline]
    pub fn preview_compressed(&self) -> &HashMap<String, CompressedChannel> {
        &self.legacy_channels
    }

    /// Move the preview channels out of this cryptomatte, leaving it
    /// without previews.  Useful to operate on the compressed buffers
    /// without paying for decompression.
    pub fn take_legacy_channels(&mut self) -> HashMap<String, CompressedChannel> {
        std::mem::take(&mut self.legacy_channels)
    }

    // ── Single-mask queries ──────────────────────────────────────────────────

    /// Decode the mask for a manifest name.
    ///
    /// Requires a manifest; unknown names are an error.  To probe without a
    /// manifest use [`Self::mask_for_hash`].
    pub fn mask(&self, name: &str) -> Result<Vec<f32>> {
        self.mask_for_hash(self.resolve(name)?)
    }

    /// Decode the mask for an object hash.  Permissive: a hash that never
    /// appears in the image yields an all-zero mask.
    pub fn mask_for_hash(&self, hash: u32) -> Result<Vec<f32>> {
        let (mut masks, _) = decode::decode_flat(&self.levels(), &[hash])?;
        Ok(masks.pop().expect("one target in, one mask out"))
    }

    /// [`Self::mask`], but the result stays in compressed chunked form with
    /// the same geometry and codec parameters as the input channels.
    pub fn mask_compressed(&self, name: &str) -> Result<CompressedChannel> {
        self.mask_compressed_for_hash(self.resolve(name)?)
    }

    /// [`Self::mask_for_hash`] with compressed output.
    pub fn mask_compressed_for_hash(&self, hash: u32) -> Result<CompressedChannel> {
        let (mut masks, _) = decode::decode_compressed(&self.levels(), &[hash])?;
        Ok(masks.pop().expect("one target in, one mask out"))
    }

    // ── Batched queries ──────────────────────────────────────────────────────

    /// Decode masks for several manifest names in one pass over the
    /// channels.  Strict: every name must resolve; every name gets an entry.
    pub fn masks<S: AsRef<str>>(&self, names: &[S]) -> Result<HashMap<String, Vec<f32>>> {
        let targets = self.resolve_all(names)?;
        let (masks, _) = decode::decode_flat(&self.levels(), &targets)?;
        Ok(names
            .iter()
            .map(|n| n.as_ref().to_string())
            .zip(masks)
            .collect())
    }

    /// Decode masks for several hashes in one pass.  Entries are keyed by
    /// manifest name when the hash resolves to one, by 8-char hex
    /// otherwise; hashes never observed in the image are omitted.
    pub fn masks_for_hashes(&self, hashes: &[u32]) -> Result<HashMap<String, Vec<f32>>> {
        let (masks, observed) = decode::decode_flat(&self.levels(), hashes)?;
        Ok(self.key_observed(hashes, masks, &observed))
    }

    /// [`Self::masks`] with compressed outputs.
    pub fn masks_compressed<S: AsRef<str>>(&self, names: &[S]) -> Result<HashMap<String, CompressedChannel>> {
        let targets = self.resolve_all(names)?;
        let (masks, _) = decode::decode_compressed(&self.levels(), &targets)?;
        Ok(names
            .iter()
            .map(|n| n.as_ref().to_string())
            .zip(masks)
            .collect())
    }

    /// [`Self::masks_for_hashes`] with compressed outputs.
    pub fn masks_compressed_for_hashes(&self, hashes: &[u32]) -> Result<HashMap<String, CompressedChannel>> {
        let (masks, observed) = decode::decode_compressed(&self.levels(), hashes)?;
        Ok(self.key_observed(hashes, masks, &observed))
    }

    /// Decode every mask.
    ///
    /// With a manifest: its names in manifest order, keyed by name — every
    /// manifest entry gets a mask, including objects absent from this
    /// image.  Without one: the rank channels are scanned for the set of
    /// observed ids (the zero sentinel excluded) and results are keyed by
    /// 8-char hex.
    pub fn masks_all(&self) -> Result<HashMap<String, Vec<f32>>> {
        match self.manifest() {
            Some(manifest) => {
                let mapping = manifest.mapping::<u32>();
                let targets: Vec<u32> = mapping.iter().map(|(_, h)| *h).collect();
                let (masks, _) = decode::decode_flat(&self.levels(), &targets)?;
                Ok(mapping.into_iter().map(|(n, _)| n).zip(masks).collect())
            }
            None => {
                let targets = decode::observed_hashes(&self.levels())?;
                let (masks, _) = decode::decode_flat(&self.levels(), &targets)?;
                Ok(targets.iter().map(|&h| u32_to_hex(h)).zip(masks).collect())
            }
        }
    }

    /// [`Self::masks_all`] with compressed outputs.
    pub fn masks_all_compressed(&self) -> Result<HashMap<String, CompressedChannel>> {
        match self.manifest() {
            Some(manifest) => {
                let mapping = manifest.mapping::<u32>();
                let targets: Vec<u32> = mapping.iter().map(|(_, h)| *h).collect();
                let (masks, _) = decode::decode_compressed(&self.levels(), &targets)?;
                Ok(mapping.into_iter().map(|(n, _)| n).zip(masks).collect())
            }
            None => {
                let targets = decode::observed_hashes(&self.levels())?;
                let (masks, _) = decode::decode_compressed(&self.levels(), &targets)?;
                Ok(targets.iter().map(|&h| u32_to_hex(h)).zip(masks).collect())
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn levels(&self) -> Vec<Level<'_>> {
        self.channels
            .chunks_exact(2)
            .map(|pair| (&pair[0].1, &pair[1].1))
            .collect()
    }

    fn resolve(&self, name: &str) -> Result<u32> {
        self.manifest().ok_or(Error::NoManifest)?.hash::<u32>(name)
    }

    fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<u32>> {
        names.iter().map(|n| self.resolve(n.as_ref())).collect()
    }

    /// Key batch results for hash queries: manifest name when resolvable,
    /// hex otherwise; unobserved hashes are dropped with a warning.
    fn key_observed<T>(&self, hashes: &[u32], masks: Vec<T>, observed: &[bool]) -> HashMap<String, T> {
        let mut out = HashMap::with_capacity(masks.len());
        for ((&hash, mask), &seen) in hashes.iter().zip(masks).zip(observed) {
            if !seen {
                warn!(hash = %u32_to_hex(hash), "hash not present in any rank channel, skipping");
                continue;
            }
            let key = self
                .manifest()
                .and_then(|m| m.name_for_hash(hash))
                .map(str::to_string)
                .unwrap_or_else(|| u32_to_hex(hash));
            out.insert(key, mask);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelOptions;
    use crate::codec::CodecId;
    use crate::metadata::{CONVERSION_METHOD, HASH_METHOD};

    const A: u32 = 0x1111_1111;
    const B: u32 = 0x2222_2222;

    fn opts() -> ChannelOptions {
        ChannelOptions {
            codec:      CodecId::Zstd,
            level:      3,
            chunk_size: 32,
            block_size: 16,
        }
    }

    fn meta(manifest: Option<Manifest>) -> Metadata {
        Metadata::new("Crypto", "abc1234", HASH_METHOD, CONVERSION_METHOD, manifest).unwrap()
    }

    fn manifest_ab() -> Manifest {
        Manifest::from_mapping([("hero", "11111111"), ("villain", "22222222")]).unwrap()
    }

    /// 2×1 image, one rank/coverage pair: pixel 0 is A at 0.7, pixel 1 is
    /// B at 0.3.
    fn two_pixel_crypto(manifest: Option<Manifest>) -> Cryptomatte {
        let mut channels = HashMap::new();
        channels.insert("Crypto00.r".to_string(), vec![f32::from_bits(A), f32::from_bits(B)]);
        channels.insert("Crypto00.g".to_string(), vec![0.7, 0.3]);
        Cryptomatte::from_pixels(channels, HashMap::new(), 2, 1, meta(manifest), &opts()).unwrap()
    }

    #[test]
    fn construction_orders_channels() {
        let mut channels = HashMap::new();
        for name in ["Crypto00.b", "Crypto00.r", "Crypto01.g", "Crypto00.g", "Crypto01.r", "Crypto00.a"] {
            channels.insert(name.to_string(), vec![0.0; 4]);
        }
        let c = Cryptomatte::from_pixels(channels, HashMap::new(), 2, 2, meta(None), &opts()).unwrap();
        assert_eq!(
            c.channel_names().collect::<Vec<_>>(),
            ["Crypto00.r", "Crypto00.g", "Crypto00.b", "Crypto00.a", "Crypto01.r", "Crypto01.g"]
        );
        assert_eq!(c.num_levels(), 3);
        assert_eq!((c.width(), c.height()), (2, 2));
    }

    #[test]
    fn construction_rejects_incomplete_quad() {
        let mut channels = HashMap::new();
        for name in ["Crypto00.r", "Crypto00.g", "Crypto00.b"] {
            channels.insert(name.to_string(), vec![0.0; 4]);
        }
        assert!(matches!(
            Cryptomatte::from_pixels(channels, HashMap::new(), 2, 2, meta(None), &opts()),
            Err(Error::MalformedCryptomatte { .. })
        ));
    }

    #[test]
    fn construction_rejects_foreign_typename() {
        let mut channels = HashMap::new();
        channels.insert("Other00.r".to_string(), vec![0.0; 4]);
        channels.insert("Other00.g".to_string(), vec![0.0; 4]);
        assert!(matches!(
            Cryptomatte::from_pixels(channels, HashMap::new(), 2, 2, meta(None), &opts()),
            Err(Error::MalformedCryptomatte { .. })
        ));
    }

    #[test]
    fn construction_rejects_shape_disagreement() {
        let mut channels = HashMap::new();
        channels.insert(
            "Crypto00.r".to_string(),
            CompressedChannel::from_pixels(&[0.0; 4], 2, 2, &opts()).unwrap(),
        );
        let mut other = opts();
        other.codec = CodecId::Lz4;
        channels.insert(
            "Crypto00.g".to_string(),
            CompressedChannel::from_pixels(&[0.0; 4], 2, 2, &other).unwrap(),
        );
        assert!(matches!(
            Cryptomatte::new(channels, HashMap::new(), meta(None)),
            Err(Error::MalformedCryptomatte { .. })
        ));
    }

    #[test]
    fn construction_rejects_partial_legacy_set() {
        let mut channels = HashMap::new();
        channels.insert("Crypto00.r".to_string(), vec![0.0; 4]);
        channels.insert("Crypto00.g".to_string(), vec![0.0; 4]);
        let mut legacy = HashMap::new();
        legacy.insert("Crypto.r".to_string(), vec![0.0; 4]);
        assert!(matches!(
            Cryptomatte::from_pixels(channels, legacy, 2, 2, meta(None), &opts()),
            Err(Error::MalformedCryptomatte { .. })
        ));
    }

    #[test]
    fn mask_by_hash() {
        let c = two_pixel_crypto(None);
        assert_eq!(c.mask_for_hash(A).unwrap(), [0.7, 0.0]);
        assert_eq!(c.mask_for_hash(B).unwrap(), [0.0, 0.3]);
        assert_eq!(c.mask_for_hash(0).unwrap(), [0.0, 0.0]);
        assert_eq!(c.mask_for_hash(0xDEAD_BEEF).unwrap(), [0.0, 0.0]);
    }

    #[test]
    fn mask_by_name_requires_manifest() {
        let c = two_pixel_crypto(None);
        assert!(matches!(c.mask("hero"), Err(Error::NoManifest)));

        let c = two_pixel_crypto(Some(manifest_ab()));
        assert_eq!(c.mask("hero").unwrap(), [0.7, 0.0]);
        assert_eq!(c.mask("villain").unwrap(), [0.0, 0.3]);
        assert!(matches!(c.mask("nobody"), Err(Error::UnknownName { .. })));
    }

    #[test]
    fn compressed_output_matches_flat() {
        let c = two_pixel_crypto(Some(manifest_ab()));
        let flat = c.mask("hero").unwrap();
        let compressed = c.mask_compressed("hero").unwrap();
        assert_eq!(compressed.get_decompressed().unwrap(), flat);
        assert_eq!(compressed.codec(), CodecId::Zstd);
        assert_eq!(compressed.chunk_size(), 32);
    }

    #[test]
    fn batch_by_names_is_strict_and_complete() {
        let c = two_pixel_crypto(Some(manifest_ab()));
        let all = c.masks(&["hero", "villain"]).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["hero"], c.mask("hero").unwrap());
        assert_eq!(all["villain"], c.mask("villain").unwrap());

        assert!(c.masks(&["hero", "nobody"]).is_err());
    }

    #[test]
    fn batch_by_hashes_keys_and_omissions() {
        let c = two_pixel_crypto(Some(manifest_ab()));
        let got = c.masks_for_hashes(&[A, B, 0xDEAD_BEEF]).unwrap();
        // Unknown hash omitted; known ones keyed by manifest name.
        assert_eq!(got.len(), 2);
        assert_eq!(got["hero"], [0.7, 0.0]);
        assert_eq!(got["villain"], [0.0, 0.3]);

        // Without a manifest the keys fall back to hex.
        let c = two_pixel_crypto(None);
        let got = c.masks_for_hashes(&[A]).unwrap();
        assert_eq!(got["11111111"], [0.7, 0.0]);
    }

    #[test]
    fn masks_all_with_manifest_enumerates_every_entry() {
        let manifest =
            Manifest::from_mapping([("hero", "11111111"), ("villain", "22222222"), ("ghost", "33333333")])
                .unwrap();
        let c = two_pixel_crypto(Some(manifest));
        let all = c.masks_all().unwrap();
        assert_eq!(all.len(), 3);
        // Manifest entries absent from the image still get (zero) masks.
        assert_eq!(all["ghost"], [0.0, 0.0]);
    }

    #[test]
    fn masks_all_without_manifest_scans_and_keys_by_hex() {
        let c = two_pixel_crypto(None);
        let all = c.masks_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["11111111"], [0.7, 0.0]);
        assert_eq!(all["22222222"], [0.0, 0.3]);
        assert!(!all.contains_key("00000000"));
    }

    #[test]
    fn masks_all_compressed_parity() {
        let c = two_pixel_crypto(Some(manifest_ab()));
        let flat = c.masks_all().unwrap();
        let compressed = c.masks_all_compressed().unwrap();
        assert_eq!(flat.len(), compressed.len());
        for (name, ch) in &compressed {
            assert_eq!(&ch.get_decompressed().unwrap(), &flat[name]);
        }
    }

    #[test]
    fn transparent_pixel_coverage_sums_to_one() {
        let (a, b) = (0x0000_00AA, 0x0000_00BB);
        let mut channels = HashMap::new();
        channels.insert("Crypto00.r".to_string(), vec![f32::from_bits(a)]);
        channels.insert("Crypto00.g".to_string(), vec![0.6]);
        channels.insert("Crypto00.b".to_string(), vec![f32::from_bits(b)]);
        channels.insert("Crypto00.a".to_string(), vec![0.4]);
        let c = Cryptomatte::from_pixels(channels, HashMap::new(), 1, 1, meta(None), &opts()).unwrap();

        assert_eq!(c.num_levels(), 2);
        assert_eq!(c.mask_for_hash(a).unwrap(), [0.6]);
        assert_eq!(c.mask_for_hash(b).unwrap(), [0.4]);

        let total: f32 = c.masks_all().unwrap().values().map(|m| m[0]).sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn preview_channels() {
        let mut channels = HashMap::new();
        channels.insert("Crypto00.r".to_string(), vec![0.0; 2]);
        channels.insert("Crypto00.g".to_string(), vec![0.0; 2]);
        let mut legacy = HashMap::new();
        legacy.insert("Crypto.b".to_string(), vec![3.0, 3.5]);
        legacy.insert("Crypto.r".to_string(), vec![1.0, 1.5]);
        legacy.insert("Crypto.g".to_string(), vec![2.0, 2.5]);
        let mut c = Cryptomatte::from_pixels(channels, legacy, 2, 1, meta(None), &opts()).unwrap();

        assert!(c.has_preview());
        let preview = c.preview().unwrap();
        assert_eq!(preview, vec![vec![1.0, 1.5], vec![2.0, 2.5], vec![3.0, 3.5]]);

        let taken = c.take_legacy_channels();
        assert_eq!(taken.len(), 3);
        assert!(!c.has_preview());
        assert!(c.preview().unwrap().is_empty());
    }
}
