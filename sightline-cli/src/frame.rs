//! Frame sources and JPEG encoding

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Something that can hand out the frame currently on screen. `None` means
/// no frame is available yet and the capture cycle should be skipped.
pub trait FrameSource: Send + Sync {
    fn current_frame(&self) -> Option<DynamicImage>;

    fn describe(&self) -> String;
}

/// A still image re-read on every capture.
pub struct ImageFileSource {
    path: PathBuf,
}

impl ImageFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSource for ImageFileSource {
    fn current_frame(&self) -> Option<DynamicImage> {
        match image::open(&self.path) {
            Ok(img) => Some(img),
            Err(e) => {
                debug!("No frame from {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

/// Cycles through the images of a directory in file-name order.
pub struct DirectorySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next: AtomicUsize,
}

impl DirectorySource {
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_supported_image(path))
            .collect();
        files.sort();
        Ok(Self {
            dir,
            files,
            next: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for DirectorySource {
    fn current_frame(&self) -> Option<DynamicImage> {
        if self.files.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.files.len();
        let path = &self.files[index];
        match image::open(path) {
            Ok(img) => Some(img),
            Err(e) => {
                debug!("Skipping unreadable frame {}: {}", path.display(), e);
                None
            }
        }
    }

    fn describe(&self) -> String {
        format!("directory {} ({} images)", self.dir.display(), self.files.len())
    }
}

/// A frame slot fed by an external producer. Empty until attached.
#[derive(Default)]
pub struct FrameSlot {
    frame: RwLock<Option<DynamicImage>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, frame: DynamicImage) {
        *self.frame.write() = Some(frame);
    }

    pub fn detach(&self) {
        *self.frame.write() = None;
    }

    pub fn is_attached(&self) -> bool {
        self.frame.read().is_some()
    }
}

impl FrameSource for FrameSlot {
    fn current_frame(&self) -> Option<DynamicImage> {
        self.frame.read().clone()
    }

    fn describe(&self) -> String {
        "frame slot".to_string()
    }
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

/// A compressed frame ready for upload.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
}

/// JPEG encoder with a fixed quality.
#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a frame; empty frames and encoder failures yield `None`.
    pub fn encode(&self, frame: &DynamicImage) -> Option<EncodedFrame> {
        let rgb = frame.to_rgb8();
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return None;
        }

        let mut bytes = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut bytes, self.quality);
            if let Err(e) = encoder.encode(rgb.as_raw(), width, height, ColorType::Rgb8) {
                debug!("JPEG encoding failed: {}", e);
                return None;
            }
        }

        Some(EncodedFrame {
            bytes,
            file_name: format!("capture-{}.jpg", chrono::Utc::now().timestamp_millis()),
            mime: "image/jpeg",
            width,
            height,
        })
    }

    /// Take the current frame from a source and encode it.
    pub fn capture(&self, source: &dyn FrameSource) -> Option<EncodedFrame> {
        source.current_frame().and_then(|frame| self.encode(&frame))
    }
}
