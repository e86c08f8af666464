//! The detection session state machine and per-frame loop.
//!
//! A session wires one frame source, one model, the tracker, the overlay,
//! and the result log together. The caller drives it: while the session is
//! `Processing` it schedules [`SessionController::tick`] once per display
//! tick, and stops scheduling on pause or reset. That makes cancellation
//! synchronous and keeps the whole engine single-threaded.

use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::detect::{ModelHandle, ModelStatus};
use crate::overlay::{HudReadout, OverlayRenderer};
use crate::results::{FrameResult, ResultLog};
use crate::track::IouTracker;
use crate::video::{FrameSource, PixelBuffer};

/// Upper bound on detections requested per inference call.
const MAX_DETECTIONS: usize = 20;

/// Valid range for the runtime confidence threshold.
const THRESHOLD_RANGE: (f32, f32) = (0.1, 0.95);

/// Playback speed presets offered by the engine.
pub const PLAYBACK_PRESETS: [f32; 4] = [0.25, 0.5, 1.0, 2.0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Processing,
    Paused,
    Complete,
}

/// What one `tick` call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The session was not processing; nothing happened.
    Inactive,
    /// One frame was captured, inferred, tracked, logged, and rendered.
    Processed,
    /// Inference failed; the frame was skipped and its number consumed.
    Skipped,
    /// The source ended; aggregates are finalized.
    Completed,
}

/// Running aggregates, reset on every start.
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    /// Person count of the most recent processed frame.
    pub current_count: usize,
    pub max_count: usize,
    /// Mean persons per logged frame, available at completion only.
    pub avg_count: Option<f32>,
    /// Highest frame number reached by a successful frame.
    pub processed_frames: u64,
    pub last_inference_ms: u64,
    /// Frames processed during the last full wall-clock second.
    pub observed_fps: u32,
}

pub struct SessionController {
    source: Box<dyn FrameSource>,
    model: ModelHandle,
    tracker: IouTracker,
    overlay: OverlayRenderer,
    log: ResultLog,
    buffer: PixelBuffer,
    state: SessionState,
    stats: SessionStats,
    frame_counter: u64,
    total_count: u64,
    confidence_threshold: f32,
    playback_rate: f32,
    fps_window_start: Instant,
    fps_tally: u32,
}

impl SessionController {
    pub fn new(source: Box<dyn FrameSource>, model: ModelHandle) -> Self {
        Self {
            source,
            model,
            tracker: IouTracker::new(),
            overlay: OverlayRenderer::new(),
            log: ResultLog::new(),
            buffer: PixelBuffer::new(),
            state: SessionState::Idle,
            stats: SessionStats::default(),
            frame_counter: 0,
            total_count: 0,
            confidence_threshold: 0.5,
            playback_rate: 1.0,
            fps_window_start: Instant::now(),
            fps_tally: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn results(&self) -> &ResultLog {
        &self.log
    }

    pub fn overlay(&self) -> &OverlayRenderer {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayRenderer {
        &mut self.overlay
    }

    pub fn model_status(&self) -> &ModelStatus {
        self.model.status()
    }

    pub fn model_variant(&self) -> String {
        self.model.variant()
    }

    /// Load the model (one attempt per session).
    pub fn load_model(&mut self, on_progress: impl FnMut(u8)) -> Result<()> {
        self.model.load(on_progress)
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    /// Adjust the confidence threshold. Clamped to the valid range; takes
    /// effect on the next inference call.
    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.confidence_threshold = threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
    }

    pub fn playback_rate(&self) -> f32 {
        self.playback_rate
    }

    /// Set the playback rate. Applied to the source immediately.
    pub fn set_playback_rate(&mut self, rate: f32) {
        if rate > 0.0 {
            self.playback_rate = rate;
            self.source.set_rate(rate);
        }
    }

    /// Begin a fresh processing run from the start of the source.
    ///
    /// Every independent piece of state is cleared: aggregates, tracker
    /// identities, trails, and the result log.
    pub fn start(&mut self) -> Result<()> {
        if !self.model.status().is_ready() {
            return Err(anyhow!(
                "cannot start: model is not ready ({:?})",
                self.model.status()
            ));
        }
        if !self.source.is_ready() {
            return Err(anyhow!("cannot start: source is not ready"));
        }

        self.clear_run_state();
        self.source.seek_to_start()?;
        self.source.set_rate(self.playback_rate);
        self.source.play();
        self.state = SessionState::Processing;
        log::info!(
            "session started (threshold {:.2}, rate {}x)",
            self.confidence_threshold,
            self.playback_rate
        );
        Ok(())
    }

    pub fn pause(&mut self) {
        if self.state == SessionState::Processing {
            self.source.pause();
            self.state = SessionState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == SessionState::Paused {
            self.source.play();
            self.state = SessionState::Processing;
        }
    }

    /// Return to idle, discarding all run state.
    pub fn reset(&mut self) -> Result<()> {
        self.source.pause();
        self.source.seek_to_start()?;
        self.clear_run_state();
        self.state = SessionState::Idle;
        Ok(())
    }

    fn clear_run_state(&mut self) {
        self.tracker.reset();
        self.overlay.clear_trails();
        self.log.clear();
        self.stats = SessionStats::default();
        self.frame_counter = 0;
        self.total_count = 0;
        self.fps_window_start = Instant::now();
        self.fps_tally = 0;
    }

    /// Run one loop iteration. A no-op outside `Processing`.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.state != SessionState::Processing {
            return Ok(TickOutcome::Inactive);
        }

        if self.source.ended() {
            self.complete();
            return Ok(TickOutcome::Completed);
        }

        if let Err(e) = self.source.capture_into(&mut self.buffer) {
            // File-backed sources may only discover end-of-stream while
            // decoding the next frame; that is a normal completion, not a
            // loop failure.
            if self.source.ended() {
                self.complete();
                return Ok(TickOutcome::Completed);
            }
            self.frame_counter += 1;
            log::warn!("frame capture failed on frame {}: {e:#}", self.frame_counter);
            return Ok(TickOutcome::Skipped);
        }

        // The frame number is consumed even if inference fails below.
        self.frame_counter += 1;

        let started = Instant::now();
        let detections = match self.model.detect(
            self.buffer.pixels(),
            self.buffer.width(),
            self.buffer.height(),
            MAX_DETECTIONS,
            self.confidence_threshold,
        ) {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("inference failed on frame {}: {e:#}", self.frame_counter);
                return Ok(TickOutcome::Skipped);
            }
        };

        let persons: Vec<_> = detections.into_iter().filter(|d| d.is_person()).collect();
        let tracked = self.tracker.assign(persons);
        self.overlay.record_trails(&tracked);

        self.stats.last_inference_ms = started.elapsed().as_millis() as u64;
        self.stats.current_count = tracked.len();
        self.stats.max_count = self.stats.max_count.max(tracked.len());
        self.stats.processed_frames = self.frame_counter;
        self.total_count += tracked.len() as u64;

        self.log.append(FrameResult {
            frame_number: self.frame_counter,
            timestamp_s: self.source.current_time(),
            person_count: tracked.len(),
            detections: tracked.clone(),
        });

        self.fps_tally += 1;
        if self.fps_window_start.elapsed().as_secs() >= 1 {
            self.stats.observed_fps = self.fps_tally;
            self.fps_tally = 0;
            self.fps_window_start = Instant::now();
        }

        let (width, height) = (self.buffer.width(), self.buffer.height());
        let hud = HudReadout {
            fps: self.stats.observed_fps,
            clock: chrono::Local::now().format("%H:%M:%S").to_string(),
        };
        self.overlay.render(&tracked, width, height, &hud);

        Ok(TickOutcome::Processed)
    }

    fn complete(&mut self) {
        self.source.pause();
        if !self.log.is_empty() {
            let avg = self.total_count as f32 / self.log.len() as f32;
            self.stats.avg_count = Some((avg * 10.0).round() / 10.0);
        }
        self.log.finalize();
        self.state = SessionState::Complete;
        log::info!(
            "session complete: {} frames logged, max {} persons",
            self.log.len(),
            self.stats.max_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{Detection, ScriptedBackend};
    use crate::video::SyntheticClipSource;
    use crate::BoundingBox;

    fn person(x: f32, score: f32) -> Detection {
        Detection::person(BoundingBox::new(x, 50.0, 40.0, 80.0), score)
    }

    /// Decoder-style source: end-of-stream surfaces as a capture error, the
    /// way a file demuxer only learns the file ended when the next read
    /// comes up empty.
    struct FileLikeSource {
        frames: u64,
        served: u64,
        ended: bool,
        playing: bool,
        fail_on: Option<u64>,
    }

    impl FileLikeSource {
        fn new(frames: u64) -> Self {
            Self {
                frames,
                served: 0,
                ended: false,
                playing: false,
                fail_on: None,
            }
        }

        fn failing_on(mut self, capture: u64) -> Self {
            self.fail_on = Some(capture);
            self
        }
    }

    impl crate::video::FrameSource for FileLikeSource {
        fn dimensions(&self) -> (u32, u32) {
            (32, 24)
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn seek_to_start(&mut self) -> anyhow::Result<()> {
            self.served = 0;
            self.ended = false;
            Ok(())
        }

        fn set_rate(&mut self, _rate: f32) {}

        fn play(&mut self) {
            self.playing = true;
        }

        fn pause(&mut self) {
            self.playing = false;
        }

        fn current_time(&self) -> f64 {
            self.served as f64 / 10.0
        }

        fn ended(&self) -> bool {
            self.ended
        }

        fn capture_into(&mut self, buffer: &mut PixelBuffer) -> anyhow::Result<()> {
            if !self.playing {
                buffer.ensure_size(32, 24);
                return Ok(());
            }
            self.served += 1;
            if self.fail_on == Some(self.served) {
                anyhow::bail!("decoder hiccup");
            }
            if self.served > self.frames {
                self.ended = true;
                anyhow::bail!("file has ended");
            }
            buffer.ensure_size(32, 24);
            Ok(())
        }
    }

    fn session(frames: u64, backend: ScriptedBackend) -> SessionController {
        let source = SyntheticClipSource::new("stub://test", 64, 48, 10.0, frames).unwrap();
        SessionController::new(Box::new(source), ModelHandle::new(Box::new(backend)))
    }

    fn run_to_completion(controller: &mut SessionController) {
        loop {
            match controller.tick().unwrap() {
                TickOutcome::Completed => break,
                TickOutcome::Inactive => panic!("session stopped processing unexpectedly"),
                _ => {}
            }
        }
    }

    #[test]
    fn start_requires_a_ready_model() {
        let mut controller = session(5, ScriptedBackend::empty(5));
        assert_eq!(*controller.model_status(), ModelStatus::Idle);
        assert!(controller.start().is_err());
        controller.load_model(|_| {}).unwrap();
        assert!(controller.model_status().is_ready());
        assert!(controller.start().is_ok());
        assert_eq!(controller.state(), SessionState::Processing);
    }

    #[test]
    fn full_run_logs_every_frame_and_finalizes_average() {
        let script = (0..6).map(|_| vec![person(10.0, 0.9), person(200.0, 0.8)]).collect();
        let mut controller = session(6, ScriptedBackend::new(script));
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();
        run_to_completion(&mut controller);

        assert_eq!(controller.state(), SessionState::Complete);
        assert_eq!(controller.results().len(), 6);
        let stats = controller.stats();
        assert_eq!(stats.processed_frames, 6);
        assert_eq!(stats.max_count, 2);
        assert_eq!(stats.avg_count, Some(2.0));
        // Completion published the snapshot.
        assert_eq!(controller.results().snapshot().len(), 6);
    }

    #[test]
    fn inference_failure_skips_the_frame_but_consumes_its_number() {
        let backend = ScriptedBackend::new((0..10).map(|_| vec![person(10.0, 0.9)]).collect())
            .with_failures_on([5]);
        let mut controller = session(10, backend);
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();
        run_to_completion(&mut controller);

        let numbers: Vec<u64> = controller
            .results()
            .entries()
            .iter()
            .map(|r| r.frame_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 6, 7, 8, 9, 10]);
        assert_eq!(controller.stats().processed_frames, 10);
        // Average folds over logged frames only.
        assert_eq!(controller.stats().avg_count, Some(1.0));
    }

    #[test]
    fn completing_an_empty_run_leaves_average_unavailable() {
        let mut controller = session(0, ScriptedBackend::empty(0));
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();
        assert_eq!(controller.tick().unwrap(), TickOutcome::Completed);
        assert_eq!(controller.stats().avg_count, None);
    }

    #[test]
    fn pause_makes_tick_inactive_and_resume_continues_numbering() {
        let mut controller = session(6, ScriptedBackend::empty(6));
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();
        controller.tick().unwrap();
        controller.tick().unwrap();

        controller.pause();
        assert_eq!(controller.state(), SessionState::Paused);
        assert_eq!(controller.tick().unwrap(), TickOutcome::Inactive);

        controller.resume();
        controller.tick().unwrap();
        let numbers: Vec<u64> = controller
            .results()
            .entries()
            .iter()
            .map(|r| r.frame_number)
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn reset_clears_log_stats_trails_and_identities() {
        let script = (0..4).map(|_| vec![person(10.0, 0.9)]).collect();
        let mut controller = session(8, ScriptedBackend::new(script));
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();
        for _ in 0..4 {
            controller.tick().unwrap();
        }
        assert_eq!(controller.results().len(), 4);
        assert_eq!(controller.overlay().trail_len(1), 4);

        controller.reset().unwrap();
        assert_eq!(controller.state(), SessionState::Idle);
        assert!(controller.results().is_empty());
        assert_eq!(controller.stats().processed_frames, 0);
        assert_eq!(controller.overlay().trail_len(1), 0);

        // Identity numbering restarts at 1 on the next run.
        controller.start().unwrap();
        controller.tick().unwrap();
        let first = &controller.results().entries()[0];
        assert_eq!(first.detections[0].identity, Some(1));
    }

    #[test]
    fn threshold_is_clamped_and_applies_to_the_next_frame() {
        let script = (0..4).map(|_| vec![person(10.0, 0.6)]).collect();
        let mut controller = session(4, ScriptedBackend::new(script));
        controller.set_confidence_threshold(5.0);
        assert_eq!(controller.confidence_threshold(), 0.95);
        controller.set_confidence_threshold(0.0);
        assert_eq!(controller.confidence_threshold(), 0.1);

        controller.set_confidence_threshold(0.5);
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();
        controller.tick().unwrap();
        assert_eq!(controller.stats().current_count, 1);

        // Raising the threshold filters the same subject from later frames.
        controller.set_confidence_threshold(0.9);
        controller.tick().unwrap();
        assert_eq!(controller.stats().current_count, 0);
    }

    #[test]
    fn eos_reported_as_capture_error_completes_normally() {
        let source = FileLikeSource::new(4);
        let mut controller = SessionController::new(
            Box::new(source),
            ModelHandle::new(Box::new(ScriptedBackend::new(
                (0..4).map(|_| vec![person(10.0, 0.9)]).collect(),
            ))),
        );
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();

        for _ in 0..4 {
            assert_eq!(controller.tick().unwrap(), TickOutcome::Processed);
        }
        // The fifth capture errors with the ended flag set; the session must
        // finalize instead of surfacing the error.
        assert_eq!(controller.tick().unwrap(), TickOutcome::Completed);
        assert_eq!(controller.state(), SessionState::Complete);
        assert_eq!(controller.results().len(), 4);
        assert_eq!(controller.stats().avg_count, Some(1.0));
    }

    #[test]
    fn transient_capture_failure_skips_the_frame_and_continues() {
        let source = FileLikeSource::new(4).failing_on(2);
        let mut controller = SessionController::new(
            Box::new(source),
            ModelHandle::new(Box::new(ScriptedBackend::empty(4))),
        );
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();

        assert_eq!(controller.tick().unwrap(), TickOutcome::Processed);
        assert_eq!(controller.tick().unwrap(), TickOutcome::Skipped);
        assert_eq!(controller.state(), SessionState::Processing);
        run_to_completion(&mut controller);

        // The skipped capture consumed frame number 2.
        let numbers: Vec<u64> = controller
            .results()
            .entries()
            .iter()
            .map(|r| r.frame_number)
            .collect();
        assert_eq!(numbers, vec![1, 3, 4]);
    }

    #[test]
    fn start_after_completion_reprocesses_from_the_beginning() {
        let mut controller = session(3, ScriptedBackend::empty(3));
        controller.load_model(|_| {}).unwrap();
        controller.start().unwrap();
        run_to_completion(&mut controller);
        assert_eq!(controller.results().len(), 3);

        controller.start().unwrap();
        run_to_completion(&mut controller);
        assert_eq!(controller.results().len(), 3);
        assert_eq!(controller.results().entries()[0].frame_number, 1);
    }
}
