// src/payload.rs
//
//! Synthetic multipart payloads for inference probes.
//!
//! The source is re-resolved on every [`PayloadBuilder::build`] call so a
//! directory may change between check cycles:
//!  * empty source          – `n` freshly synthesized JPEG images
//!  * directory             – `n` distinct random images, or one random image
//!                            replicated `n` times when fewer than `n` exist
//!  * single file           – that file replicated `n` times
//!  * anything unusable     – synthesis

use bytes::Bytes;
use rand::Rng;
use rand::seq::IndexedRandom;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::constants::{IMAGE_EXTENSIONS, JPEG_STUB, MIME_JPEG, MIME_PNG};

/// Failures while resolving a payload source. All of them degrade to synthesis.
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("failed to read payload file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid payload directory pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("no image files in {0}")]
    NoMatchingFiles(PathBuf),
}

/// Failures while encoding a synthetic image.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("image encoding support not compiled in")]
    Unavailable,

    #[cfg(feature = "jpeg")]
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("pixel buffer does not match image dimensions")]
    BadDimensions,
}

/// One file-like part of a multipart request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadPart {
    pub field_name: String,
    pub file_name: String,
    pub content: Bytes,
    pub mime_type: &'static str,
}

/// Where payload bytes come from, resolved against the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSource {
    Synthetic,
    Directory(PathBuf),
    File(PathBuf),
}

impl PayloadSource {
    /// Classify a configured source string. Paths that don't exist resolve to
    /// [`PayloadSource::Synthetic`].
    pub fn resolve(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() {
            return PayloadSource::Synthetic;
        }
        let path = Path::new(spec);
        if path.is_dir() {
            PayloadSource::Directory(path.to_path_buf())
        } else if path.is_file() {
            PayloadSource::File(path.to_path_buf())
        } else {
            debug!("Payload source {} does not exist, synthesizing", spec);
            PayloadSource::Synthetic
        }
    }
}

/// MIME type from the file extension: `.jpg`/`.jpeg` are JPEG, everything else PNG.
pub fn mime_for_path(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => MIME_JPEG,
        _ => MIME_PNG,
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.iter().any(|ext| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, PayloadError> {
    let pattern = format!(
        "{}/*",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let mut paths: Vec<PathBuf> = glob::glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Random RGB pixel grid encoded as JPEG.
#[cfg(feature = "jpeg")]
pub fn synthesize_image<R: Rng + ?Sized>(rng: &mut R) -> Result<Vec<u8>, EncodeError> {
    use crate::constants::{SYNTHETIC_IMAGE_CHANNELS, SYNTHETIC_IMAGE_SIDE};
    use std::io::Cursor;

    let side = SYNTHETIC_IMAGE_SIDE;
    let mut pixels = vec![0u8; (side * side) as usize * SYNTHETIC_IMAGE_CHANNELS];
    rng.fill(&mut pixels[..]);

    let img = image::RgbImage::from_raw(side, side, pixels).ok_or(EncodeError::BadDimensions)?;
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

#[cfg(not(feature = "jpeg"))]
pub fn synthesize_image<R: Rng + ?Sized>(_rng: &mut R) -> Result<Vec<u8>, EncodeError> {
    Err(EncodeError::Unavailable)
}

/// Encoded image bytes, or the JPEG stub when encoding is unavailable or fails.
fn image_or_stub(encoded: Result<Vec<u8>, EncodeError>) -> Bytes {
    match encoded {
        Ok(jpeg) => Bytes::from(jpeg),
        Err(e) => {
            debug!("{}; sending JPEG stub", e);
            Bytes::from_static(JPEG_STUB)
        }
    }
}

fn read_part_bytes(path: &Path) -> Result<Bytes, PayloadError> {
    std::fs::read(path)
        .map(Bytes::from)
        .map_err(|source| PayloadError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Builds the payload parts for one inference request.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    source: String,
    field_name: String,
}

impl PayloadBuilder {
    pub fn new(source: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            field_name: field_name.into(),
        }
    }

    /// Exactly `n` parts (`n` is lifted to 1).
    pub fn build<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<PayloadPart> {
        let n = n.max(1);
        let result = match PayloadSource::resolve(&self.source) {
            PayloadSource::Synthetic => return self.synthesize(n, rng),
            PayloadSource::Directory(dir) => self.from_directory(&dir, n, rng),
            PayloadSource::File(path) => self.replicate(&path, n),
        };

        self.or_synthesize(result, n, rng)
    }

    fn or_synthesize<R: Rng + ?Sized>(
        &self,
        result: Result<Vec<PayloadPart>, PayloadError>,
        n: usize,
        rng: &mut R,
    ) -> Vec<PayloadPart> {
        match result {
            Ok(parts) => parts,
            Err(e) => {
                warn!("{}; synthesizing {} payload part(s)", e, n);
                self.synthesize(n, rng)
            }
        }
    }

    fn synthesize<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<PayloadPart> {
        (0..n)
            .map(|i| {
                PayloadPart {
                    field_name: self.field_name.clone(),
                    file_name: format!("sample_{i}.jpg"),
                    content: image_or_stub(synthesize_image(&mut *rng)),
                    mime_type: MIME_JPEG,
                }
            })
            .collect()
    }

    fn from_directory<R: Rng + ?Sized>(
        &self,
        dir: &Path,
        n: usize,
        rng: &mut R,
    ) -> Result<Vec<PayloadPart>, PayloadError> {
        let paths = list_images(dir)?;
        if paths.len() >= n {
            paths
                .choose_multiple(rng, n)
                .map(|p| -> Result<PayloadPart, PayloadError> {
                    Ok(self.part_from(p, read_part_bytes(p)?))
                })
                .collect()
        } else {
            let chosen = paths
                .choose(rng)
                .ok_or_else(|| PayloadError::NoMatchingFiles(dir.to_path_buf()))?;
            self.replicate(chosen, n)
        }
    }

    /// `n` logical parts sharing one read of `path`.
    fn replicate(&self, path: &Path, n: usize) -> Result<Vec<PayloadPart>, PayloadError> {
        let content = read_part_bytes(path)?;
        Ok((0..n).map(|_| self.part_from(path, content.clone())).collect())
    }

    fn part_from(&self, path: &Path, content: Bytes) -> PayloadPart {
        PayloadPart {
            field_name: self.field_name.clone(),
            file_name: file_name_of(path),
            content,
            mime_type: mime_for_path(path),
        }
    }
}
