//! Overlay rendering: boxes, labels, motion trails, and the HUD.
//!
//! The renderer owns an RGBA surface sized to the video frame. Every render
//! clears the surface and redraws it whole from the current frame's tracked
//! detections plus the retained trail history. Boxes, labels, and trails are
//! independently toggleable; the HUD is always drawn.
//!
//! Text is rendered with a font loaded at runtime. When no font is
//! configured the glyph passes are skipped and the geometry is still drawn.

use std::collections::HashMap;
use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Pixel, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size,
};
use imageproc::rect::Rect;

use crate::track::TrackedDetection;

/// Maximum retained trail points per identity; oldest dropped first.
pub const TRAIL_CAP: usize = 30;

/// Box palette, selected by `identity % 8`.
const PALETTE: [Rgba<u8>; 8] = [
    Rgba([0x06, 0xb6, 0xd4, 0xff]),
    Rgba([0x8b, 0x5c, 0xf6, 0xff]),
    Rgba([0x10, 0xb9, 0x81, 0xff]),
    Rgba([0xf5, 0x9e, 0x0b, 0xff]),
    Rgba([0xef, 0x44, 0x44, 0xff]),
    Rgba([0xec, 0x48, 0x99, 0xff]),
    Rgba([0x63, 0x66, 0xf1, 0xff]),
    Rgba([0x14, 0xb8, 0xa6, 0xff]),
];

const TRAIL_COLOR: Rgba<u8> = Rgba([0x06, 0xb6, 0xd4, 0x66]);
const HUD_BAR: Rgba<u8> = Rgba([0, 0, 0, 0x99]);
const HUD_BAR_HEIGHT: u32 = 30;
const LABEL_HEIGHT: u32 = 18;

/// Which overlay layers are drawn. Labels only render together with boxes.
/// Trails start disabled; they are an opt-in visualization.
#[derive(Clone, Copy, Debug)]
pub struct OverlayToggles {
    pub boxes: bool,
    pub labels: bool,
    pub trails: bool,
}

impl Default for OverlayToggles {
    fn default() -> Self {
        Self {
            boxes: true,
            labels: true,
            trails: false,
        }
    }
}

/// Live values the HUD displays alongside the per-frame person count.
#[derive(Clone, Debug, Default)]
pub struct HudReadout {
    pub fps: u32,
    /// Wall-clock label, e.g. "14:03:22".
    pub clock: String,
}

pub struct OverlayRenderer {
    surface: RgbaImage,
    toggles: OverlayToggles,
    trails: HashMap<u32, Vec<(f32, f32)>>,
    font: Option<FontVec>,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayRenderer {
    pub fn new() -> Self {
        Self {
            surface: RgbaImage::new(0, 0),
            toggles: OverlayToggles::default(),
            trails: HashMap::new(),
            font: None,
        }
    }

    /// Load a TTF/OTF font for the glyph passes.
    pub fn load_font(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font file {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("failed to parse font file {}", path.display()))?;
        self.font = Some(font);
        Ok(())
    }

    pub fn toggles(&self) -> OverlayToggles {
        self.toggles
    }

    pub fn set_toggles(&mut self, toggles: OverlayToggles) {
        self.toggles = toggles;
    }

    pub fn surface(&self) -> &RgbaImage {
        &self.surface
    }

    /// Number of retained trail points for an identity.
    pub fn trail_len(&self, identity: u32) -> usize {
        self.trails.get(&identity).map_or(0, Vec::len)
    }

    /// Append this frame's anchor points to the trail history. The anchor is
    /// the box bottom-center, so the path follows a subject's feet.
    pub fn record_trails(&mut self, tracked: &[TrackedDetection]) {
        for det in tracked {
            let Some(identity) = det.identity else {
                continue;
            };
            let trail = self.trails.entry(identity).or_default();
            trail.push(det.detection.bbox.bottom_center());
            if trail.len() > TRAIL_CAP {
                trail.remove(0);
            }
        }
    }

    /// Drop all trail history (session reset).
    pub fn clear_trails(&mut self) {
        self.trails.clear();
    }

    /// Clear and redraw the whole surface for one frame.
    pub fn render(&mut self, tracked: &[TrackedDetection], width: u32, height: u32, hud: &HudReadout) {
        if self.surface.width() != width || self.surface.height() != height {
            self.surface = RgbaImage::new(width, height);
        } else {
            for px in self.surface.pixels_mut() {
                *px = Rgba([0, 0, 0, 0]);
            }
        }
        if width == 0 || height == 0 {
            return;
        }

        if self.toggles.trails {
            self.draw_trails();
        }
        if self.toggles.boxes {
            self.draw_boxes(tracked);
        }
        self.draw_hud(tracked.len(), hud, width, height);
    }

    fn draw_trails(&mut self) {
        let trails: Vec<Vec<(f32, f32)>> = self.trails.values().cloned().collect();
        for trail in trails {
            if trail.len() >= 2 {
                for pair in trail.windows(2) {
                    blend_line(&mut self.surface, pair[0], pair[1], TRAIL_COLOR);
                }
            }
            // Fading dots, oldest most transparent.
            for (i, &(x, y)) in trail.iter().enumerate() {
                let alpha = (i as f32 / trail.len() as f32 * 0.6 * 255.0) as u8;
                blend_disk(&mut self.surface, x, y, 2.0, with_alpha(TRAIL_COLOR, alpha));
            }
        }
    }

    fn draw_boxes(&mut self, tracked: &[TrackedDetection]) {
        for (index, det) in tracked.iter().enumerate() {
            let bbox = det.detection.bbox;
            let color = color_for(det.identity, index);

            let (x, y) = (bbox.x, bbox.y);
            let (w, h) = (bbox.w.max(1.0), bbox.h.max(1.0));
            stroke_rect(&mut self.surface, x, y, w, h, color);

            // Corner accents.
            let arm = 15.0f32.min(w * 0.2).min(h * 0.2);
            let corners = [
                ((x, y + arm), (x, y), (x + arm, y)),
                ((x + w - arm, y), (x + w, y), (x + w, y + arm)),
                ((x, y + h - arm), (x, y + h), (x + arm, y + h)),
                ((x + w - arm, y + h), (x + w, y + h), (x + w, y + h - arm)),
            ];
            for (a, elbow, b) in corners {
                draw_line_segment_mut(&mut self.surface, a, elbow, color);
                draw_line_segment_mut(&mut self.surface, elbow, b, color);
            }

            if self.toggles.labels {
                self.draw_label(det, color);
            }
        }
    }

    fn draw_label(&mut self, det: &TrackedDetection, color: Rgba<u8>) {
        let score = (det.detection.score * 100.0).round() as u32;
        let label = match det.identity {
            Some(id) => format!("ID:{id} {score}%"),
            None => format!("Person {score}%"),
        };

        let scale = PxScale::from(12.0);
        let text_width = match &self.font {
            Some(font) => text_size(scale, font, &label).0 as u32,
            // Rough monospace estimate keeps the tag geometry without glyphs.
            None => label.len() as u32 * 7,
        };

        let bbox = det.detection.bbox;
        let x = bbox.x.max(0.0) as i32;
        let label_y = (bbox.y - LABEL_HEIGHT as f32 - 2.0).max(0.0) as i32;
        draw_filled_rect_mut(
            &mut self.surface,
            Rect::at(x, label_y).of_size(text_width + 10, LABEL_HEIGHT),
            color,
        );

        match &self.font {
            Some(font) => {
                draw_text_mut(
                    &mut self.surface,
                    Rgba([0, 0, 0, 0xff]),
                    x + 5,
                    label_y + 3,
                    scale,
                    font,
                    &label,
                );
            }
            None => log::debug!("no overlay font loaded; skipping label text"),
        }
    }

    fn draw_hud(&mut self, count: usize, hud: &HudReadout, width: u32, height: u32) {
        let bar = HUD_BAR_HEIGHT.min(height);
        for y in 0..bar {
            for x in 0..width {
                self.surface.get_pixel_mut(x, y).blend(&HUD_BAR);
            }
        }
        for y in height.saturating_sub(bar)..height {
            for x in 0..width {
                self.surface.get_pixel_mut(x, y).blend(&HUD_BAR);
            }
        }

        // REC dot.
        blend_disk(&mut self.surface, 16.0, 15.0, 5.0, Rgba([0xef, 0x44, 0x44, 0xff]));

        let Some(font) = &self.font else {
            log::debug!("no overlay font loaded; skipping HUD text");
            return;
        };
        let bold = PxScale::from(12.0);
        let small = PxScale::from(11.0);
        let h = height as i32;
        let w = width as i32;
        draw_text_mut(&mut self.surface, Rgba([0xff, 0xff, 0xff, 0xff]), 28, 8, bold, font, "REC");
        draw_text_mut(&mut self.surface, Rgba([0x94, 0xa3, 0xb8, 0xff]), 70, 9, small, font, &hud.clock);
        draw_text_mut(
            &mut self.surface,
            Rgba([0x06, 0xb6, 0xd4, 0xff]),
            14,
            h - 21,
            bold,
            font,
            &format!("PERSONS: {count}"),
        );
        draw_text_mut(
            &mut self.surface,
            Rgba([0x10, 0xb9, 0x81, 0xff]),
            w - 130,
            h - 21,
            bold,
            font,
            "\u{25cf} DETECTING",
        );
        draw_text_mut(
            &mut self.surface,
            Rgba([0x8b, 0x5c, 0xf6, 0xff]),
            w - 80,
            8,
            bold,
            font,
            &format!("{} FPS", hud.fps),
        );
    }
}

/// Palette color for a detection, keyed by identity with the detection index
/// as fallback.
pub fn color_for(identity: Option<u32>, index: usize) -> Rgba<u8> {
    let key = match identity {
        Some(id) => id as usize,
        None => index,
    };
    PALETTE[key % PALETTE.len()]
}

fn with_alpha(color: Rgba<u8>, alpha: u8) -> Rgba<u8> {
    Rgba([color[0], color[1], color[2], alpha])
}

fn blend_pixel(surface: &mut RgbaImage, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    if x < surface.width() && y < surface.height() {
        surface.get_pixel_mut(x, y).blend(&color);
    }
}

fn blend_disk(surface: &mut RgbaImage, cx: f32, cy: f32, radius: f32, color: Rgba<u8>) {
    let r = radius.ceil() as i32;
    let (cx_i, cy_i) = (cx.round() as i32, cy.round() as i32);
    for dy in -r..=r {
        for dx in -r..=r {
            if (dx * dx + dy * dy) as f32 <= radius * radius {
                blend_pixel(surface, cx_i + dx, cy_i + dy, color);
            }
        }
    }
}

fn blend_line(surface: &mut RgbaImage, a: (f32, f32), b: (f32, f32), color: Rgba<u8>) {
    for point in imageproc::drawing::BresenhamLineIter::new(a, b) {
        blend_pixel(surface, point.0, point.1, color);
    }
}

/// Double-pass hollow rectangle for a heavier stroke.
fn stroke_rect(surface: &mut RgbaImage, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
    let rect = Rect::at(x as i32, y as i32).of_size(w.max(1.0) as u32, h.max(1.0) as u32);
    draw_hollow_rect_mut(surface, rect, color);
    if w > 4.0 && h > 4.0 {
        let inner = Rect::at(x as i32 + 1, y as i32 + 1).of_size(w as u32 - 2, h as u32 - 2);
        draw_hollow_rect_mut(surface, inner, color);
    }
}
