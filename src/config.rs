use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_SOURCE: &str = "stub://walkway";
const DEFAULT_MODEL_VARIANT: &str = "coco-ssd/lite_mobilenet_v2";
const DEFAULT_MODEL_RUNTIME: &str = "scripted";
const DEFAULT_SUGGESTED_THRESHOLD: f32 = 0.5;
const DEFAULT_PLAYBACK_RATE: f32 = 1.0;
const DEFAULT_CLIP_WIDTH: u32 = 640;
const DEFAULT_CLIP_HEIGHT: u32 = 480;
const DEFAULT_CLIP_FPS: f64 = 30.0;
const DEFAULT_CLIP_FRAMES: u64 = 300;

#[derive(Debug, Deserialize, Default)]
struct EngineConfigFile {
    source: Option<String>,
    model: Option<ModelConfigFile>,
    playback: Option<PlaybackConfigFile>,
    clip: Option<ClipConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    variant: Option<String>,
    runtime: Option<String>,
    suggested_threshold: Option<f32>,
    onnx_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct PlaybackConfigFile {
    rate: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct ClipConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<f64>,
    frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    font_path: Option<PathBuf>,
}

/// Engine configuration, layered file defaults plus environment overrides.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Video path or `stub://` clip name.
    pub source: String,
    pub model: ModelSettings,
    /// Initial playback rate; adjustable at runtime.
    pub playback_rate: f32,
    /// Geometry used when the source is a synthetic clip.
    pub clip: ClipSettings,
    /// Optional TTF/OTF font for overlay text.
    pub overlay_font: Option<PathBuf>,
}

/// Model metadata. `suggested_threshold` only seeds the session's initial
/// threshold; the runtime-adjusted value is never written back here.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub variant: String,
    pub runtime: String,
    pub suggested_threshold: f32,
    pub onnx_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ClipSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub frames: u64,
}

impl EngineConfig {
    /// Load from the JSON file named by `PEDWATCH_CONFIG` (when set), then
    /// apply `PEDWATCH_*` environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PEDWATCH_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: EngineConfigFile) -> Self {
        let source = file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string());
        let model = ModelSettings {
            variant: file
                .model
                .as_ref()
                .and_then(|m| m.variant.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_VARIANT.to_string()),
            runtime: file
                .model
                .as_ref()
                .and_then(|m| m.runtime.clone())
                .unwrap_or_else(|| DEFAULT_MODEL_RUNTIME.to_string()),
            suggested_threshold: file
                .model
                .as_ref()
                .and_then(|m| m.suggested_threshold)
                .unwrap_or(DEFAULT_SUGGESTED_THRESHOLD),
            onnx_path: file.model.and_then(|m| m.onnx_path),
        };
        let playback_rate = file
            .playback
            .and_then(|p| p.rate)
            .unwrap_or(DEFAULT_PLAYBACK_RATE);
        let clip = ClipSettings {
            width: file
                .clip
                .as_ref()
                .and_then(|c| c.width)
                .unwrap_or(DEFAULT_CLIP_WIDTH),
            height: file
                .clip
                .as_ref()
                .and_then(|c| c.height)
                .unwrap_or(DEFAULT_CLIP_HEIGHT),
            fps: file
                .clip
                .as_ref()
                .and_then(|c| c.fps)
                .unwrap_or(DEFAULT_CLIP_FPS),
            frames: file
                .clip
                .as_ref()
                .and_then(|c| c.frames)
                .unwrap_or(DEFAULT_CLIP_FRAMES),
        };
        let overlay_font = file.overlay.and_then(|o| o.font_path);
        Self {
            source,
            model,
            playback_rate,
            clip,
            overlay_font,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(source) = std::env::var("PEDWATCH_SOURCE") {
            if !source.trim().is_empty() {
                self.source = source;
            }
        }
        if let Ok(variant) = std::env::var("PEDWATCH_MODEL_VARIANT") {
            if !variant.trim().is_empty() {
                self.model.variant = variant;
            }
        }
        if let Ok(path) = std::env::var("PEDWATCH_MODEL_ONNX") {
            if !path.trim().is_empty() {
                self.model.onnx_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(threshold) = std::env::var("PEDWATCH_THRESHOLD") {
            self.model.suggested_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("PEDWATCH_THRESHOLD must be a number"))?;
        }
        if let Ok(rate) = std::env::var("PEDWATCH_PLAYBACK_RATE") {
            self.playback_rate = rate
                .parse()
                .map_err(|_| anyhow!("PEDWATCH_PLAYBACK_RATE must be a number"))?;
        }
        if let Ok(font) = std::env::var("PEDWATCH_FONT") {
            if !font.trim().is_empty() {
                self.overlay_font = Some(PathBuf::from(font));
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if !crate::video::looks_like_video_path(&self.source) {
            return Err(anyhow!(
                "source '{}' is not a playable video path",
                self.source
            ));
        }
        if !(0.1..=0.95).contains(&self.model.suggested_threshold) {
            return Err(anyhow!(
                "suggested threshold must be between 0.1 and 0.95"
            ));
        }
        if self.playback_rate <= 0.0 {
            return Err(anyhow!("playback rate must be greater than zero"));
        }
        if self.clip.width == 0 || self.clip.height == 0 {
            return Err(anyhow!("clip dimensions must be non-zero"));
        }
        if self.clip.fps <= 0.0 {
            return Err(anyhow!("clip fps must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<EngineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
