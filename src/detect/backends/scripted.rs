use std::collections::HashSet;

use anyhow::{anyhow, Result};

use crate::detect::backend::InferenceBackend;
use crate::detect::result::Detection;

/// Scripted backend: replays a fixed per-frame detection script.
///
/// Drives tests and `stub://` demo sessions without model weights. The
/// script holds the raw detections each inference call would surface before
/// thresholding; `detect` applies `score_threshold` and `max_results` the way
/// a real model adapter would, and can be told to fail on specific calls to
/// exercise the skip-frame path.
pub struct ScriptedBackend {
    script: Vec<Vec<Detection>>,
    fail_on_calls: HashSet<u64>,
    fail_load: bool,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            fail_on_calls: HashSet::new(),
            fail_load: false,
            calls: 0,
        }
    }

    /// A script of `frames` empty detection lists.
    pub fn empty(frames: usize) -> Self {
        Self::new(vec![Vec::new(); frames])
    }

    /// Fail `load` with a synthetic error.
    pub fn with_load_failure(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Fail `detect` on the given 1-based call numbers.
    pub fn with_failures_on(mut self, calls: impl IntoIterator<Item = u64>) -> Self {
        self.fail_on_calls.extend(calls);
        self
    }

    /// Number of `detect` calls served so far (including failed ones).
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn variant(&self) -> &str {
        "scripted-replay"
    }

    fn load(&mut self, progress: &mut dyn FnMut(u8)) -> Result<()> {
        // Mirror the staged progress a remote-weights load would report.
        for pct in [20, 40, 60, 80] {
            progress(pct);
        }
        if self.fail_load {
            return Err(anyhow!("scripted load failure"));
        }
        progress(100);
        Ok(())
    }

    fn detect(
        &mut self,
        _pixels: &[u8],
        _width: u32,
        _height: u32,
        max_results: usize,
        score_threshold: f32,
    ) -> Result<Vec<Detection>> {
        self.calls += 1;
        if self.fail_on_calls.contains(&self.calls) {
            return Err(anyhow!("scripted inference failure on call {}", self.calls));
        }

        let index = (self.calls - 1) as usize;
        let frame = match self.script.get(index) {
            Some(frame) => frame,
            // Past the end of the script: quiet scene.
            None => return Ok(Vec::new()),
        };

        Ok(frame
            .iter()
            .filter(|d| d.score >= score_threshold)
            .take(max_results)
            .cloned()
            .collect())
    }
}
