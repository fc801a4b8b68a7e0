//! Loading cryptomattes out of multi-channel images.
//!
//! [`load`] opens an image through the external reader (§ [`crate::image`]),
//! parses the cryptomatte metadata out of its attributes, reads exactly the
//! channels those cryptomattes need in one pass, compresses each into a
//! [`CompressedChannel`] and assembles one [`Cryptomatte`] per descriptor.
//! All I/O completes before the call returns — the reader is dropped, the
//! cryptomattes own no open file.
//!
//! A file with no cryptomatte metadata loads to an empty vector; that is
//! not an error.
//!
//! The spec-inspection helpers at the bottom answer "does this file carry a
//! cryptomatte" style questions from an [`ImageSpec`] alone, without
//! touching pixel data.

use crate::channel::{ChannelOptions, CompressedChannel};
use crate::channel_name;
use crate::cryptomatte::Cryptomatte;
use crate::error::{Error, Result};
use crate::image::{ImageReader, ImageSpec, OpenImage, PixelType};
use crate::metadata::Metadata;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

// ── LoadOptions ──────────────────────────────────────────────────────────────

/// Configuration for [`load_with`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Also load the legacy `{typename}.r/g/b` preview channels.  Off by
    /// default — previews never affect decoding and skipping them saves
    /// both reading and compressing three planes per cryptomatte.
    pub load_preview: bool,
    /// Compression parameters for the in-memory channels.
    pub channel: ChannelOptions,
}

// ── Loading ──────────────────────────────────────────────────────────────────

/// Load every cryptomatte in the image at `path` with default channel
/// compression.
pub fn load<R: OpenImage>(path: impl AsRef<Path>, load_preview: bool) -> Result<Vec<Cryptomatte>> {
    load_with::<R>(
        path,
        &LoadOptions {
            load_preview,
            ..LoadOptions::default()
        },
    )
}

/// Load every cryptomatte in the image at `path`.
pub fn load_with<R: OpenImage>(path: impl AsRef<Path>, opts: &LoadOptions) -> Result<Vec<Cryptomatte>> {
    let path = path.as_ref();
    let reader = R::open(path)?;
    load_from_reader(reader, path, opts)
}

/// Load every cryptomatte from an already-open reader.  `image_path` is
/// only used to resolve sidecar manifest references.
pub fn load_from_reader<R: ImageReader>(
    mut reader: R,
    image_path: &Path,
    opts: &LoadOptions,
) -> Result<Vec<Cryptomatte>> {
    let spec = reader.spec().clone();

    let metadatas = Metadata::from_attributes(&spec.attributes, image_path)?;
    if metadatas.is_empty() {
        return Ok(Vec::new());
    }
    if spec.pixel_type != PixelType::Float32 {
        return Err(Error::UnsupportedPixelType {
            found: spec.pixel_type,
        });
    }

    // Per-cryptomatte channel lists, then one deduplicated union so the
    // reader sees a single request.
    let mut per_meta: Vec<(Vec<String>, Vec<String>)> = Vec::with_capacity(metadatas.len());
    let mut wanted: Vec<String> = Vec::new();
    for meta in &metadatas {
        let data = meta.channel_names(&spec.channel_names);
        let legacy = if opts.load_preview {
            meta.legacy_channel_names(&spec.channel_names)
        } else {
            Vec::new()
        };
        for name in data.iter().chain(&legacy) {
            if !wanted.contains(name) {
                wanted.push(name.clone());
            }
        }
        per_meta.push((data, legacy));
    }

    debug!(
        cryptomattes = metadatas.len(),
        channels = wanted.len(),
        width = spec.width,
        height = spec.height,
        "loading cryptomatte channels"
    );

    let mut pixels = reader.read_channels(&wanted)?;
    drop(reader);

    // Compress every requested plane, then partition them back to their
    // owning cryptomatte.
    let mut compressed: HashMap<String, CompressedChannel> = HashMap::with_capacity(wanted.len());
    for name in &wanted {
        let plane = pixels
            .remove(name)
            .ok_or_else(|| Error::MissingChannel { name: name.clone() })?;
        let channel = CompressedChannel::from_pixels(&plane, spec.width, spec.height, &opts.channel)?;
        compressed.insert(name.clone(), channel);
    }

    metadatas
        .into_iter()
        .zip(per_meta)
        .map(|(meta, (data_names, legacy_names))| {
            let mut channels = HashMap::with_capacity(data_names.len());
            for name in &data_names {
                let ch = compressed
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::MissingChannel { name: name.clone() })?;
                channels.insert(name.clone(), ch);
            }
            let mut legacy = HashMap::with_capacity(legacy_names.len());
            for name in &legacy_names {
                let ch = compressed
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::MissingChannel { name: name.clone() })?;
                legacy.insert(name.clone(), ch);
            }
            Cryptomatte::new(channels, legacy, meta)
        })
        .collect()
}

// ── Spec inspection ──────────────────────────────────────────────────────────

/// Whether the spec declares at least one cryptomatte.
pub fn has_cryptomatte(spec: &ImageSpec) -> bool {
    num_cryptomattes(spec) > 0
}

/// How many cryptomattes the spec declares.  Counting only needs the
/// attribute keys, so malformed groups still count here — use
/// [`validate_metadata`] for a strict check.
pub fn num_cryptomattes(spec: &ImageSpec) -> usize {
    let mut keys: Vec<&str> = spec
        .attributes
        .keys()
        .filter_map(|k| {
            let mut segments = k.splitn(3, '/');
            (segments.next() == Some("cryptomatte")).then(|| segments.next()).flatten()
        })
        .collect();
    keys.sort_unstable();
    keys.dedup();
    keys.len()
}

/// Whether any declared cryptomatte has its legacy preview channels in the
/// file.
pub fn has_preview(spec: &ImageSpec) -> bool {
    Metadata::from_attributes(&spec.attributes, Path::new(""))
        .map(|metas| {
            metas
                .iter()
                .any(|m| !m.legacy_channel_names(&spec.channel_names).is_empty())
        })
        .unwrap_or(false)
}

/// The data channel names of every declared cryptomatte, one list per
/// cryptomatte in typename order.
pub fn cryptomatte_channel_names(spec: &ImageSpec) -> Result<Vec<Vec<String>>> {
    let metas = Metadata::from_attributes(&spec.attributes, Path::new(""))?;
    Ok(metas
        .iter()
        .map(|m| m.channel_names(&spec.channel_names))
        .collect())
}

/// Strictly parse the spec's cryptomatte metadata, reporting the first
/// violation.  Does not look at the channel list.
pub fn validate_metadata(spec: &ImageSpec) -> Result<()> {
    Metadata::from_attributes(&spec.attributes, Path::new("")).map(|_| ())
}

/// Check that every declared cryptomatte's channels form a structurally
/// valid set (contiguous indices, complete quads, float32 pixels).
pub fn validate_channel_structure(spec: &ImageSpec) -> Result<()> {
    if spec.pixel_type != PixelType::Float32 {
        return Err(Error::UnsupportedPixelType {
            found: spec.pixel_type,
        });
    }
    for names in cryptomatte_channel_names(spec)? {
        channel_name::sort_and_validate(&names)?;
    }
    Ok(())
}

/// [`validate_metadata`] and [`validate_channel_structure`] combined.
pub fn validate(spec: &ImageSpec) -> Result<()> {
    validate_metadata(spec)?;
    validate_channel_structure(spec)
}
