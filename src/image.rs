//! External image-reader interface.
//!
//! The low-level container reader (in practice an EXR library) is a
//! collaborator, not part of this crate.  Anything that can open a
//! multi-channel float image and hand back per-channel pixel arrays plugs
//! in through [`ImageReader`] / [`OpenImage`]; the loader and all tests
//! work against these traits.
//!
//! Raster order is row-major from the top-left.  Attribute values relevant
//! to this crate are strings; readers may pass through other JSON value
//! types and the metadata parser will reject them where a string is
//! required.

use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

// ── PixelType ────────────────────────────────────────────────────────────────

/// Storage type of an image's channels.  Cryptomatte data requires
/// [`PixelType::Float32`]; everything else is rejected at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    Float32,
    Float16,
    Uint32,
    Uint8,
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PixelType::Float32 => "float32",
            PixelType::Float16 => "float16",
            PixelType::Uint32  => "uint32",
            PixelType::Uint8   => "uint8",
        };
        write!(f, "{s}")
    }
}

// ── ImageSpec ────────────────────────────────────────────────────────────────

/// Shape and metadata of an opened image, before any pixels are read.
#[derive(Debug, Clone)]
pub struct ImageSpec {
    pub width:         usize,
    pub height:        usize,
    /// Channel names in file order.
    pub channel_names: Vec<String>,
    pub pixel_type:    PixelType,
    /// String-keyed attributes in file order (`serde_json`'s map preserves
    /// insertion order in this crate).
    pub attributes:    Map<String, Value>,
}

// ── Reader traits ────────────────────────────────────────────────────────────

/// An opened multi-channel image.
pub trait ImageReader {
    /// The image's spec; available without touching pixel data.
    fn spec(&self) -> &ImageSpec;

    /// Read the named channels as flat `width * height` float arrays in one
    /// pass.  Channels absent from the file are simply absent from the
    /// returned map — the loader turns that into `MissingChannel`.
    fn read_channels(&mut self, names: &[String]) -> Result<HashMap<String, Vec<f32>>>;
}

/// An [`ImageReader`] that can be constructed from a path.
pub trait OpenImage: ImageReader + Sized {
    fn open(path: &Path) -> Result<Self>;
}
