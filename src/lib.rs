//! # cryptomatte — reading and decoding Cryptomatte ID-mask images
//!
//! Cryptomatte is an image convention for storing per-pixel object-id masks
//! with transparency support, used across rendering pipelines to extract a
//! coverage mask for any rendered object after the fact.  This crate reads
//! such images, holds their channels block-compressed in memory, and
//! computes masks on demand.
//!
//! Behavior guarantees:
//! - Channels live in memory as independently compressed chunks; decoding
//!   streams one chunk at a time, so peak temporary memory is bounded by
//!   the chunk size, not the image size
//! - The per-pixel decode loop is data-parallel with per-pixel-exclusive
//!   writes; no locks, no atomics
//! - A lenient reader: sidecar paths starting with `./`, coexisting
//!   embedded and sidecar manifests, and partial trailing rank/coverage
//!   pairs are all accepted.  Structural invariants (contiguous indices,
//!   complete quads, shape/compression agreement) are still enforced
//! - The zero hash is "no object" padding: discarded when scanning for
//!   observed ids, but queryable explicitly
//! - Manifest order is JSON source order, preserved through parsing
//! - No global state; logging goes through `tracing` and is owned by the
//!   host
//!
//! The image container itself is a collaborator, not a dependency: plug
//! any EXR (or other float-image) reader in through the
//! [`image::ImageReader`] / [`image::OpenImage`] traits.
//!
//! ```
//! use cryptomatte::{ChannelOptions, Cryptomatte, Metadata};
//! use std::collections::HashMap;
//!
//! // A 2×1 cryptomatte with one rank/coverage pair.
//! let mut channels = HashMap::new();
//! channels.insert(
//!     "CryptoAsset00.r".to_string(),
//!     vec![f32::from_bits(0x1111_1111), f32::from_bits(0x2222_2222)],
//! );
//! channels.insert("CryptoAsset00.g".to_string(), vec![0.7, 0.3]);
//!
//! let metadata = Metadata::new(
//!     "CryptoAsset", "abc1234", "MurmurHash3_32", "uint32_to_float32", None,
//! )?;
//! let matte = Cryptomatte::from_pixels(
//!     channels, HashMap::new(), 2, 1, metadata, &ChannelOptions::default(),
//! )?;
//!
//! assert_eq!(matte.mask_for_hash(0x1111_1111)?, [0.7, 0.0]);
//! assert_eq!(matte.mask_for_hash(0xDEAD_BEEF)?, [0.0, 0.0]);
//! # Ok::<(), cryptomatte::Error>(())
//! ```

pub mod channel;
pub mod channel_name;
pub mod codec;
pub mod cryptomatte;
pub mod error;
pub mod hash;
pub mod image;
pub mod load;
pub mod manifest;
pub mod metadata;

mod decode;

// Flat re-exports for the most common types.
pub use channel::{ChannelOptions, CompressedChannel, DEFAULT_BLOCK_SIZE, DEFAULT_CHUNK_SIZE,
                  DEFAULT_COMPRESSION_LEVEL};
pub use channel_name::{ChannelRef, ChannelType, LegacyChannelRef};
pub use codec::{get_codec, Codec, CodecError, CodecId};
pub use cryptomatte::Cryptomatte;
pub use error::{Error, Result};
pub use hash::{hex_to_u32, u32_to_hex, HashView};
pub use image::{ImageReader, ImageSpec, OpenImage, PixelType};
pub use load::{has_cryptomatte, has_preview, load, load_from_reader, load_with, num_cryptomattes,
               validate, LoadOptions};
pub use manifest::Manifest;
pub use metadata::{Metadata, CONVERSION_METHOD, HASH_METHOD};
