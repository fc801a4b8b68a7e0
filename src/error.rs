//! Crate-wide error taxonomy.
//!
//! Every failure mode surfaced by the public API is a distinct variant of
//! [`Error`].  Construction of [`crate::Cryptomatte`], [`crate::Metadata`]
//! and [`crate::Manifest`] enforces invariants strictly and fails fast;
//! `load()` fails the whole call on the first unrecoverable error.
//! Recoverable conditions (a sidecar manifest that does not exist while an
//! embedded one may still be found, batch hashes that never appear in the
//! image) are logged at warn level and elided from results instead.
//!
//! Hash-based mask queries are permissive: an unknown hash yields a zero
//! mask.  Name-based queries are strict: an unknown name is an error.

use crate::codec::CodecError;
use crate::image::PixelType;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// File could not be opened or read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The image stores its channels in a pixel format other than 32-bit
    /// float.  Cryptomatte rank values are bit-reinterpreted u32 hashes and
    /// only survive in full-width floats.
    #[error("Unsupported pixel type {found} — cryptomatte channels must be 32-bit float")]
    UnsupportedPixelType { found: PixelType },

    /// A channel implied by the metadata is absent from the file.
    #[error("Channel '{name}' is named by the cryptomatte metadata but missing from the image")]
    MissingChannel { name: String },

    /// A channel name does not follow `<typename><NN>.<chan>`.
    #[error("Malformed channel name '{name}': {reason}")]
    MalformedChannelName { name: String, reason: String },

    /// The channel set is structurally invalid: non-contiguous indices,
    /// an incomplete quad, or channels disagreeing on shape/compression.
    #[error("Malformed cryptomatte: {reason}")]
    MalformedCryptomatte { reason: String },

    /// A `cryptomatte/...` metadata key has fewer than three path segments.
    #[error("Malformed metadata key '{key}': expected cryptomatte/<key>/<attr>")]
    MalformedKey { key: String },

    /// The `<attr>` segment of a metadata key is not a recognized attribute.
    #[error("Unknown cryptomatte metadata attribute '{attr}' in key '{key}'")]
    UnknownAttribute { key: String, attr: String },

    /// A mandatory metadata attribute (name, hash, conversion) is absent.
    #[error("Cryptomatte metadata group '{key}' is missing required attribute '{attr}'")]
    MissingRequired { key: String, attr: &'static str },

    /// A metadata value that must be a string is not one.
    #[error("Metadata value for key '{key}' is not a string")]
    TypeError { key: String },

    /// `hash` metadata names an algorithm other than the canonical one.
    #[error("Unsupported hash method '{found}' (expected '{expected}')")]
    UnsupportedHash { found: String, expected: &'static str },

    /// `conversion` metadata names a mapping other than the canonical one.
    #[error("Unsupported conversion method '{found}' (expected '{expected}')")]
    UnsupportedConversion { found: String, expected: &'static str },

    /// JSON parsing failed — embedded or sidecar manifest.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A manifest hash value was not exactly 8 hex digits.
    #[error("Failed to decode hex string '{value}': {reason}")]
    HexDecode { value: String, reason: String },

    /// A name-based lookup for a name the manifest does not contain.
    #[error("Name '{name}' is not present in the cryptomatte manifest")]
    UnknownName { name: String },

    /// A name-based mask lookup on a cryptomatte without a manifest.
    #[error("Cryptomatte has no manifest — masks can only be queried by hash")]
    NoManifest,

    /// A pixel array length does not match the declared width*height.
    #[error("Invalid shape: expected {expected} elements, got {actual}")]
    InvalidShape { expected: usize, actual: usize },

    /// Channel options are out of range (chunk size not a power of two,
    /// block size exceeding chunk size, level outside 0..=9).
    #[error("Invalid channel options: {reason}")]
    InvalidOptions { reason: String },

    /// Compression or decompression failed inside a chunk codec.
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, Error>;
