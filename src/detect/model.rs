use anyhow::{anyhow, Result};

use crate::detect::backend::InferenceBackend;
use crate::detect::result::Detection;

/// Observable model lifecycle state.
///
/// `Failed` is terminal for the session: the only recovery is constructing a
/// fresh handle (a full reload). Transient `detect` errors never change the
/// status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelStatus {
    Idle,
    /// Loading, with the latest progress percentage estimate (0..=100).
    Loading(u8),
    Ready,
    Failed(String),
}

impl ModelStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ModelStatus::Ready)
    }
}

/// Owns one inference backend and the one-shot load policy around it.
pub struct ModelHandle {
    backend: Box<dyn InferenceBackend>,
    status: ModelStatus,
    load_attempted: bool,
}

impl ModelHandle {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self {
            backend,
            status: ModelStatus::Idle,
            load_attempted: false,
        }
    }

    pub fn status(&self) -> &ModelStatus {
        &self.status
    }

    pub fn variant(&self) -> String {
        self.backend.variant().to_string()
    }

    /// Load the backend. Exactly one attempt per handle; a second call is an
    /// error regardless of the first attempt's outcome. Progress reported to
    /// `on_progress` is clamped monotonic.
    pub fn load(&mut self, mut on_progress: impl FnMut(u8)) -> Result<()> {
        if self.load_attempted {
            return Err(anyhow!("model load already attempted for this session"));
        }
        self.load_attempted = true;
        self.status = ModelStatus::Loading(0);

        let mut highest = 0u8;
        let result = {
            let on_progress = &mut on_progress;
            self.backend.load(&mut |pct| {
                let pct = pct.min(100).max(highest);
                highest = pct;
                on_progress(pct);
            })
        };

        match result {
            Ok(()) => {
                if highest < 100 {
                    on_progress(100);
                }
                self.status = ModelStatus::Ready;
                Ok(())
            }
            Err(e) => {
                let message = format!("{e:#}");
                self.status = ModelStatus::Failed(message.clone());
                Err(anyhow!("model load failed: {message}"))
            }
        }
    }

    /// Run detection. Requires `Ready`; a transient backend error propagates
    /// without touching the status.
    pub fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        max_results: usize,
        score_threshold: f32,
    ) -> Result<Vec<Detection>> {
        if !self.status.is_ready() {
            return Err(anyhow!(
                "model '{}' is not ready (status {:?})",
                self.backend.name(),
                self.status
            ));
        }
        self.backend
            .detect(pixels, width, height, max_results, score_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;

    #[test]
    fn load_transitions_to_ready_and_reports_monotonic_progress() {
        let mut handle = ModelHandle::new(Box::new(ScriptedBackend::empty(3)));
        let mut seen = Vec::new();
        handle.load(|pct| seen.push(pct)).unwrap();

        assert!(handle.status().is_ready());
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[test]
    fn load_failure_is_terminal() {
        let mut handle = ModelHandle::new(Box::new(ScriptedBackend::empty(1).with_load_failure()));
        assert!(handle.load(|_| {}).is_err());
        assert!(matches!(handle.status(), ModelStatus::Failed(_)));

        // A second attempt is refused even though the first failed.
        assert!(handle.load(|_| {}).is_err());
        assert!(matches!(handle.status(), ModelStatus::Failed(_)));
    }

    #[test]
    fn second_load_attempt_is_refused() {
        let mut handle = ModelHandle::new(Box::new(ScriptedBackend::empty(1)));
        handle.load(|_| {}).unwrap();
        assert!(handle.load(|_| {}).is_err());
        // The first successful load is not invalidated.
        assert!(handle.status().is_ready());
    }

    #[test]
    fn detect_requires_ready() {
        let mut handle = ModelHandle::new(Box::new(ScriptedBackend::empty(1)));
        assert!(handle.detect(&[], 1, 1, 20, 0.5).is_err());
    }
}
