//! Frame sources and the capture pixel buffer.
//!
//! A frame source owns playback state (position, rate, play/pause) and hands
//! pixels to the engine exclusively through [`PixelBuffer`], an intermediate
//! RGB8 surface sized to the source's natural dimensions. The session
//! controller never sees source-internal frame storage.

mod clip;
#[cfg(feature = "source-ffmpeg")]
mod ffmpeg;

pub use clip::SyntheticClipSource;
#[cfg(feature = "source-ffmpeg")]
pub use ffmpeg::FfmpegFileSource;

use anyhow::Result;

/// A playable video source the engine can pull frames from.
///
/// Playback is source-driven: `capture_into` samples the frame at the current
/// position and, while playing, advances the position. The engine calls it
/// once per tick, so frame pacing belongs to whoever schedules ticks.
pub trait FrameSource {
    /// Natural pixel dimensions (width, height).
    fn dimensions(&self) -> (u32, u32);

    /// True once the source can serve frames.
    fn is_ready(&self) -> bool;

    /// Rewind to time zero.
    fn seek_to_start(&mut self) -> Result<()>;

    /// Playback rate multiplier (1.0 is natural speed).
    fn set_rate(&mut self, rate: f32);

    fn play(&mut self);

    fn pause(&mut self);

    /// Current playback position in seconds.
    fn current_time(&self) -> f64;

    /// True once playback has run past the last frame.
    fn ended(&self) -> bool;

    /// Copy the current frame into `buffer`, resizing it if the source
    /// dimensions changed, then advance the position if playing.
    fn capture_into(&mut self, buffer: &mut PixelBuffer) -> Result<()>;
}

/// Intermediate RGB8 capture surface.
///
/// Reallocates only when the source dimensions change; steady-state capture
/// is a copy into the existing allocation.
#[derive(Clone, Debug, Default)]
pub struct PixelBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Match the buffer to `width`x`height`, reallocating only on change.
    pub fn ensure_size(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        let len = (width as usize) * (height as usize) * 3;
        self.pixels.clear();
        self.pixels.resize(len, 0);
        self.width = width;
        self.height = height;
    }

    /// Mutable access for sources writing a frame in place.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }
}

/// Cheap gate used before constructing a source: accepts `stub://` clips and
/// local paths with a known video extension, rejects anything with a URL
/// scheme.
pub fn looks_like_video_path(path: &str) -> bool {
    let path = path.trim();
    if path.is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    if path.contains("://") {
        return false;
    }
    let lower = path.to_ascii_lowercase();
    ["mp4", "webm", "mov", "avi", "mkv"]
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}
