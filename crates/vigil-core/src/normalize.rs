//! Image normalization: transport-encoded payloads → canonical RGB8 buffers.
//!
//! Accepts data-URL strings (webcam captures) or raw uploaded bytes and
//! produces the pixel buffer every downstream stage operates on. Decoding is
//! pure; failures are typed and map to an `InputInvalid` outcome upstream.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use base64::Engine as _;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("empty image payload")]
    EmptyPayload,
    #[error("malformed base64 encoding: {0}")]
    MalformedEncoding(#[from] base64::DecodeError),
    #[error("image decode failed: {0}")]
    DecodeFailed(#[from] image::ImageError),
    #[error("image has zero dimensions")]
    ZeroDimensions,
}

/// A transport-encoded still image (PNG/JPEG bytes) as submitted by a client.
///
/// Holds the decoded payload bytes, not the base64 text: byte-identical
/// captures stay byte-identical here, which the fallback comparator relies on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Vec<u8>,
}

impl EncodedImage {
    /// Parse a data-URL-style string (`data:image/png;base64,...`) or a bare
    /// base64 payload.
    pub fn from_data_url(s: &str) -> Result<Self, NormalizeError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(NormalizeError::EmptyPayload);
        }
        // Everything after the first comma is the payload when a prefix is present.
        let payload = match trimmed.split_once(',') {
            Some((_, rest)) => rest,
            None => trimmed,
        };
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload.as_bytes())?;
        Self::from_bytes(bytes)
    }

    /// Wrap raw uploaded file bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, NormalizeError> {
        if bytes.is_empty() {
            return Err(NormalizeError::EmptyPayload);
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decode into a canonical three-channel pixel buffer.
    pub fn decode(&self) -> Result<NormalizedImage, NormalizeError> {
        let decoded = image::load_from_memory(&self.bytes)?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(NormalizeError::ZeroDimensions);
        }
        Ok(NormalizedImage {
            width,
            height,
            pixels: rgb.into_raw(),
        })
    }
}

/// Canonical pixel buffer: interleaved RGB8, row-major.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl NormalizedImage {
    /// RGB triple at (x, y). Caller guarantees in-bounds coordinates.
    #[inline]
    pub fn rgb_at(&self, x: usize, y: usize) -> [u8; 3] {
        let off = (y * self.width as usize + x) * 3;
        [self.pixels[off], self.pixels[off + 1], self.pixels[off + 2]]
    }

    /// Rec. 601 luma at (x, y).
    #[inline]
    pub fn luma_at(&self, x: usize, y: usize) -> f32 {
        let [r, g, b] = self.rgb_at(x, y);
        0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
    }
}

/// Bounded decode cache, keyed by payload bytes.
///
/// Verification re-submits the same capture across presence, extraction and
/// comparison; the cache makes those decodes one-shot. Read-mostly after
/// first population, FIFO-evicted at capacity.
pub struct DecodeCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

struct CacheInner {
    map: HashMap<Vec<u8>, Arc<NormalizedImage>>,
    order: VecDeque<Vec<u8>>,
}

impl DecodeCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Decode through the cache.
    pub fn decode(&self, image: &EncodedImage) -> Result<Arc<NormalizedImage>, NormalizeError> {
        {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = inner.map.get(image.as_bytes()) {
                return Ok(Arc::clone(hit));
            }
        }

        // Decode outside the lock; concurrent misses may decode twice, the
        // cache stays consistent either way.
        let decoded = Arc::new(image.decode()?);

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if !inner.map.contains_key(image.as_bytes()) {
            while inner.order.len() >= self.capacity {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.map.remove(&oldest);
                }
            }
            inner.map.insert(image.as_bytes().to_vec(), Arc::clone(&decoded));
            inner.order.push_back(image.as_bytes().to_vec());
        }
        Ok(decoded)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }
}
