//! Block-compressed pixel channels.
//!
//! A [`CompressedChannel`] holds one `width × height` plane of 32-bit
//! floats as a sequence of independently compressed chunks, giving random
//! chunk access with a bounded working set.  This is the in-memory storage
//! for every cryptomatte rank, coverage and preview channel, and for
//! compressed mask output.
//!
//! # Chunk layout
//! Pixels are viewed as little-endian bytes and split into `chunk_size`
//! byte chunks; the final chunk covers the tail and may be shorter.  Inside
//! a chunk the bytes are further split into `block_size` sub-blocks, each
//! compressed on its own and framed with a `u32` little-endian length
//! prefix.  Every chunk records a CRC32 of its uncompressed bytes which is
//! verified on every read — a decompressor that produces wrong output is
//! treated as corruption no matter which codec ran.
//!
//! # Concurrency
//! `get_chunk` takes `&self`, performs no interior mutation and is safe
//! under any number of concurrent readers.  `set_chunk` takes `&mut self`;
//! the borrow checker serializes it against readers and writers alike.

use crate::codec::{get_codec, Codec, CodecError, CodecId};
use crate::error::{Error, Result};
use rayon::prelude::*;

/// Default chunk size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
/// Default sub-block size inside a chunk: 64 KiB.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
/// Default Zstd compression level.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

// ── ChannelOptions ───────────────────────────────────────────────────────────

/// Compression configuration for a [`CompressedChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOptions {
    pub codec:      CodecId,
    /// Compression level, 0..=9.
    pub level:      i32,
    /// Bytes per chunk; must be a power of two.
    pub chunk_size: usize,
    /// Bytes per compressed sub-block; must not exceed `chunk_size`.
    pub block_size: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            codec:      CodecId::Zstd,
            level:      DEFAULT_COMPRESSION_LEVEL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl ChannelOptions {
    fn validate(&self) -> Result<()> {
        if !self.chunk_size.is_power_of_two() || self.chunk_size < std::mem::size_of::<f32>() {
            return Err(Error::InvalidOptions {
                reason: format!("chunk_size {} must be a power of two of at least 4 bytes", self.chunk_size),
            });
        }
        if self.block_size == 0 || self.block_size > self.chunk_size {
            return Err(Error::InvalidOptions {
                reason: format!(
                    "block_size {} must be in 1..={} (chunk_size)",
                    self.block_size, self.chunk_size
                ),
            });
        }
        if !(0..=9).contains(&self.level) {
            return Err(Error::InvalidOptions {
                reason: format!("compression level {} outside 0..=9", self.level),
            });
        }
        Ok(())
    }
}

// ── Chunk ────────────────────────────────────────────────────────────────────

/// One compressed chunk: framed sub-block blob + integrity data.
#[derive(Debug, Clone)]
struct Chunk {
    /// `[u32 LE comp_len][comp bytes]` per sub-block, concatenated.
    blob:    Vec<u8>,
    /// Uncompressed byte count of this chunk.
    raw_len: usize,
    /// CRC32 of the uncompressed bytes, checked on every decompression.
    crc32:   u32,
}

fn compress_chunk(bytes: &[u8], codec: &dyn Codec, level: i32, block_size: usize) -> Result<Chunk> {
    let mut blob = Vec::new();
    for block in bytes.chunks(block_size) {
        let comp = codec.compress(block, level)?;
        blob.extend_from_slice(&(comp.len() as u32).to_le_bytes());
        blob.extend_from_slice(&comp);
    }
    Ok(Chunk {
        blob,
        raw_len: bytes.len(),
        crc32: crc32fast::hash(bytes),
    })
}

fn decompress_chunk(chunk: &Chunk, codec: &dyn Codec) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(chunk.raw_len);
    let mut pos = 0usize;
    while pos < chunk.blob.len() {
        if pos + 4 > chunk.blob.len() {
            return Err(corrupt("truncated sub-block length prefix"));
        }
        let len = u32::from_le_bytes([
            chunk.blob[pos],
            chunk.blob[pos + 1],
            chunk.blob[pos + 2],
            chunk.blob[pos + 3],
        ]) as usize;
        pos += 4;
        if pos + len > chunk.blob.len() {
            return Err(corrupt("sub-block length exceeds blob"));
        }
        let block = codec.decompress(&chunk.blob[pos..pos + len])?;
        out.extend_from_slice(&block);
        pos += len;
    }

    if out.len() != chunk.raw_len {
        return Err(corrupt(&format!(
            "decompressed to {} bytes, expected {}",
            out.len(),
            chunk.raw_len
        )));
    }
    if crc32fast::hash(&out) != chunk.crc32 {
        return Err(corrupt("CRC32 mismatch on decompressed chunk"));
    }
    Ok(out)
}

fn corrupt(reason: &str) -> Error {
    Error::Codec(CodecError::CorruptChunk(reason.to_string()))
}

fn validate_dims(width: usize, height: usize) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidOptions {
            reason: format!("channel dimensions {width}x{height} must be positive"),
        });
    }
    Ok(())
}

// ── CompressedChannel ────────────────────────────────────────────────────────

/// A block-compressed, chunked, fixed-size 2D float buffer.
#[derive(Debug, Clone)]
pub struct CompressedChannel {
    width:      usize,
    height:     usize,
    chunk_size: usize,
    block_size: usize,
    codec:      CodecId,
    level:      i32,
    chunks:     Vec<Chunk>,
}

impl CompressedChannel {
    /// Compress a flat pixel buffer into a channel.
    ///
    /// Chunks are compressed concurrently; the final chunk covers the tail
    /// of the pixel array and may hold fewer elements than the others.
    pub fn from_pixels(pixels: &[f32], width: usize, height: usize, opts: &ChannelOptions) -> Result<Self> {
        opts.validate()?;
        validate_dims(width, height)?;
        if pixels.len() != width * height {
            return Err(Error::InvalidShape {
                expected: width * height,
                actual: pixels.len(),
            });
        }

        let bytes: &[u8] = bytemuck::cast_slice(pixels);
        let codec = get_codec(opts.codec);
        let chunks: Vec<Chunk> = bytes
            .par_chunks(opts.chunk_size)
            .map(|c| compress_chunk(c, codec.as_ref(), opts.level, opts.block_size))
            .collect::<Result<_>>()?;

        Ok(Self {
            width,
            height,
            chunk_size: opts.chunk_size,
            block_size: opts.block_size,
            codec: opts.codec,
            level: opts.level,
            chunks,
        })
    }

    /// An all-zero channel, logically equivalent to `from_pixels` over a
    /// zeroed array.  Full chunks share one compressed blob, so the cost is
    /// two compressions regardless of image size.
    pub fn zeros(width: usize, height: usize, opts: &ChannelOptions) -> Result<Self> {
        opts.validate()?;
        validate_dims(width, height)?;

        let total = width * height * std::mem::size_of::<f32>();
        let num_chunks = total.div_ceil(opts.chunk_size);
        let tail = total - (num_chunks - 1) * opts.chunk_size;

        let codec = get_codec(opts.codec);
        let full = compress_chunk(&vec![0u8; opts.chunk_size.min(total)], codec.as_ref(), opts.level, opts.block_size)?;
        let mut chunks = vec![full; num_chunks];
        if tail != opts.chunk_size.min(total) {
            chunks[num_chunks - 1] =
                compress_chunk(&vec![0u8; tail], codec.as_ref(), opts.level, opts.block_size)?;
        }

        Ok(Self {
            width,
            height,
            chunk_size: opts.chunk_size,
            block_size: opts.block_size,
            codec: opts.codec,
            level: opts.level,
            chunks,
        })
    }

    // ── Accessors ────────────────────────────────────────────────────────────

    #[inline] pub fn width(&self)      -> usize   { self.width }
    #[inline] pub fn height(&self)     -> usize   { self.height }
    #[inline] pub fn chunk_size(&self) -> usize   { self.chunk_size }
    #[inline] pub fn block_size(&self) -> usize   { self.block_size }
    #[inline] pub fn codec(&self)      -> CodecId { self.codec }
    #[inline] pub fn level(&self)      -> i32     { self.level }
    #[inline] pub fn num_chunks(&self) -> usize   { self.chunks.len() }

    /// Total uncompressed byte count, `width * height * 4`.
    #[inline]
    pub fn uncompressed_size(&self) -> usize {
        self.width * self.height * std::mem::size_of::<f32>()
    }

    /// Element capacity of a full chunk, `chunk_size / 4`.
    #[inline]
    pub fn chunk_elems(&self) -> usize {
        self.chunk_size / std::mem::size_of::<f32>()
    }

    /// Number of valid elements in chunk `chunk_idx` — equals
    /// [`Self::chunk_elems`] except for the final chunk.
    #[inline]
    pub fn chunk_valid_elems(&self, chunk_idx: usize) -> usize {
        (self.width * self.height - chunk_idx * self.chunk_elems()).min(self.chunk_elems())
    }

    /// On-heap compressed byte count (diagnostics).
    pub fn compressed_size(&self) -> usize {
        self.chunks.iter().map(|c| c.blob.len()).sum()
    }

    /// The [`ChannelOptions`] this channel was built with.  A mask channel
    /// produced from this channel inherits them.
    pub fn options(&self) -> ChannelOptions {
        ChannelOptions {
            codec:      self.codec,
            level:      self.level,
            chunk_size: self.chunk_size,
            block_size: self.block_size,
        }
    }

    /// True when `other` has identical geometry and compression parameters.
    /// All channels of one cryptomatte must agree on these.
    pub fn same_layout(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.chunk_size == other.chunk_size
            && self.block_size == other.block_size
            && self.codec == other.codec
            && self.level == other.level
    }

    // ── Chunk access ─────────────────────────────────────────────────────────

    /// Decompress chunk `chunk_idx` into the prefix of `out`, returning the
    /// number of valid elements written.  Elements past the valid count are
    /// left untouched — callers reusing a scratch buffer must not read past
    /// the returned length.
    ///
    /// # Panics
    /// If `chunk_idx` is out of range or `out` is shorter than
    /// [`Self::chunk_elems`].
    pub fn get_chunk(&self, out: &mut [f32], chunk_idx: usize) -> Result<usize> {
        assert!(chunk_idx < self.chunks.len(), "chunk index {chunk_idx} out of range");
        assert!(
            out.len() >= self.chunk_elems().min(self.width * self.height),
            "output buffer smaller than chunk capacity"
        );

        let codec = get_codec(self.codec);
        let bytes = decompress_chunk(&self.chunks[chunk_idx], codec.as_ref())?;
        let valid = bytes.len() / std::mem::size_of::<f32>();
        for (dst, src) in out[..valid].iter_mut().zip(bytes.chunks_exact(4)) {
            *dst = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        }
        Ok(valid)
    }

    /// Recompress the valid prefix of `data` and atomically replace chunk
    /// `chunk_idx` with it.  `data` may be a full-capacity scratch buffer;
    /// only the chunk's valid element count is consumed.
    ///
    /// # Panics
    /// If `chunk_idx` is out of range or `data` is shorter than the chunk's
    /// valid element count.
    pub fn set_chunk(&mut self, data: &[f32], chunk_idx: usize) -> Result<()> {
        assert!(chunk_idx < self.chunks.len(), "chunk index {chunk_idx} out of range");
        let valid = self.chunk_valid_elems(chunk_idx);
        assert!(data.len() >= valid, "input buffer smaller than chunk's valid element count");

        let codec = get_codec(self.codec);
        let bytes: &[u8] = bytemuck::cast_slice(&data[..valid]);
        self.chunks[chunk_idx] = compress_chunk(bytes, codec.as_ref(), self.level, self.block_size)?;
        Ok(())
    }

    /// Decompress the whole channel into one flat `width * height` buffer.
    pub fn get_decompressed(&self) -> Result<Vec<f32>> {
        let codec = get_codec(self.codec);
        let mut out = Vec::with_capacity(self.width * self.height);
        for chunk in &self.chunks {
            let bytes = decompress_chunk(chunk, codec.as_ref())?;
            out.extend(bytes.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])));
        }
        Ok(out)
    }
}
