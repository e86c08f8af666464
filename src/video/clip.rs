use anyhow::{anyhow, Result};

use super::{FrameSource, PixelBuffer};

/// Deterministic in-memory clip behind `stub://` paths.
///
/// Used by tests and demo sessions. Each capture while playing advances the
/// position by exactly one frame step scaled by the playback rate, so frame
/// numbering depends only on the capture count, never on wall-clock pacing.
pub struct SyntheticClipSource {
    path: String,
    width: u32,
    height: u32,
    fps: f64,
    total_frames: u64,
    cursor: f64,
    rate: f32,
    playing: bool,
}

impl SyntheticClipSource {
    /// Build a clip from a `stub://` path with the given geometry.
    pub fn new(path: &str, width: u32, height: u32, fps: f64, total_frames: u64) -> Result<Self> {
        if !path.starts_with("stub://") {
            return Err(anyhow!("synthetic clips require a stub:// path"));
        }
        if width == 0 || height == 0 || fps <= 0.0 {
            return Err(anyhow!("synthetic clip geometry must be non-zero"));
        }
        Ok(Self {
            path: path.to_string(),
            width,
            height,
            fps,
            total_frames,
            cursor: 0.0,
            rate: 1.0,
            playing: false,
        })
    }

    fn fill_frame(&self, buffer: &mut PixelBuffer) {
        // Deterministic moving gradient keyed on the frame index.
        let frame = self.cursor as u64;
        for (i, px) in buffer.pixels_mut().iter_mut().enumerate() {
            *px = ((i as u64 + frame * 7) % 256) as u8;
        }
    }
}

impl FrameSource for SyntheticClipSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn seek_to_start(&mut self) -> Result<()> {
        self.cursor = 0.0;
        Ok(())
    }

    fn set_rate(&mut self, rate: f32) {
        if rate > 0.0 {
            self.rate = rate;
        }
    }

    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn current_time(&self) -> f64 {
        self.cursor / self.fps
    }

    fn ended(&self) -> bool {
        self.cursor >= self.total_frames as f64
    }

    fn capture_into(&mut self, buffer: &mut PixelBuffer) -> Result<()> {
        if self.ended() {
            return Err(anyhow!("clip '{}' has ended", self.path));
        }
        buffer.ensure_size(self.width, self.height);
        self.fill_frame(buffer);
        if self.playing {
            self.cursor += self.rate as f64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(frames: u64) -> SyntheticClipSource {
        SyntheticClipSource::new("stub://test", 64, 48, 10.0, frames).unwrap()
    }

    #[test]
    fn rejects_non_stub_paths() {
        assert!(SyntheticClipSource::new("/tmp/clip.mp4", 64, 48, 10.0, 5).is_err());
    }

    #[test]
    fn paused_capture_does_not_advance() {
        let mut source = clip(5);
        let mut buffer = PixelBuffer::new();
        source.capture_into(&mut buffer).unwrap();
        source.capture_into(&mut buffer).unwrap();
        assert_eq!(source.current_time(), 0.0);
    }

    #[test]
    fn playing_capture_advances_one_step_per_call() {
        let mut source = clip(5);
        let mut buffer = PixelBuffer::new();
        source.play();
        for _ in 0..3 {
            source.capture_into(&mut buffer).unwrap();
        }
        assert!((source.current_time() - 0.3).abs() < 1e-9);
        assert!(!source.ended());
    }

    #[test]
    fn rate_scales_the_step_and_end_arrives_sooner() {
        let mut source = clip(10);
        let mut buffer = PixelBuffer::new();
        source.set_rate(2.0);
        source.play();
        for _ in 0..5 {
            source.capture_into(&mut buffer).unwrap();
        }
        assert!(source.ended());
        assert!(source.capture_into(&mut buffer).is_err());
    }

    #[test]
    fn seek_to_start_rewinds_and_frames_are_reproducible() {
        let mut source = clip(5);
        let mut buffer = PixelBuffer::new();
        source.play();
        source.capture_into(&mut buffer).unwrap();
        let first = buffer.pixels().to_vec();

        source.capture_into(&mut buffer).unwrap();
        assert_ne!(first, buffer.pixels());

        source.seek_to_start().unwrap();
        source.capture_into(&mut buffer).unwrap();
        assert_eq!(first, buffer.pixels());
    }
}
