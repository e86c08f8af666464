#![cfg(feature = "source-ffmpeg")]

//! FFmpeg-backed local file source.
//!
//! Decodes a local video file to RGB24 in-memory. No network I/O and no
//! writes to disk.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use super::{FrameSource, PixelBuffer};

pub struct FfmpegFileSource {
    path: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    time_base: f64,
    last_pts_seconds: f64,
    rate: f32,
    playing: bool,
    ended: bool,
}

impl FfmpegFileSource {
    pub fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{path}'"))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path: path.to_string(),
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            last_pts_seconds: 0.0,
            rate: 1.0,
            playing: false,
            ended: false,
        })
    }

    fn decode_next(&mut self, buffer: &mut PixelBuffer) -> Result<bool> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                if let Some(pts) = decoded.pts() {
                    self.last_pts_seconds = pts as f64 * self.time_base;
                }
                copy_frame(&rgb_frame, buffer)?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl FrameSource for FfmpegFileSource {
    fn dimensions(&self) -> (u32, u32) {
        (self.decoder.width(), self.decoder.height())
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn seek_to_start(&mut self) -> Result<()> {
        self.input
            .seek(0, ..0)
            .with_context(|| format!("failed to rewind '{}'", self.path))?;
        self.decoder.flush();
        self.last_pts_seconds = 0.0;
        self.ended = false;
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
        self.last_pts_seconds
    }

    fn ended(&self) -> bool {
        self.ended
    }

    fn capture_into(&mut self, buffer: &mut PixelBuffer) -> Result<()> {
        if self.ended {
            return Err(anyhow!("file '{}' has ended", self.path));
        }
        if !self.playing {
            // Paused: re-serve the frame already in the buffer.
            let (width, height) = self.dimensions();
            buffer.ensure_size(width, height);
            return Ok(());
        }
        // Rate above 1.0 decimates by skipping decoded frames.
        let steps = self.rate.max(1.0).round() as usize;
        for _ in 0..steps {
            if !self.decode_next(buffer)? {
                self.ended = true;
                return Err(anyhow!("file '{}' has ended", self.path));
            }
        }
        Ok(())
    }
}

fn copy_frame(frame: &ffmpeg::frame::Video, buffer: &mut PixelBuffer) -> Result<()> {
    let width = frame.width();
    let height = frame.height();
    buffer.ensure_size(width, height);

    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);
    let out = buffer.pixels_mut();

    if stride == row_bytes {
        out.copy_from_slice(&data[..row_bytes * height as usize]);
        return Ok(());
    }

    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        let src = data
            .get(start..end)
            .context("ffmpeg frame row is out of bounds")?;
        out[row * row_bytes..(row + 1) * row_bytes].copy_from_slice(src);
    }
    Ok(())
}
