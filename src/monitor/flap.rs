//! Flap detection over the trailing history window
//!
//! A device is only evaluated once its history fills a whole window; until
//! then it is neither flapping nor stable.
//!
//! ## State machine (per device)
//!
//! ```text
//! transitions < threshold:
//!   stable   → stable      (nothing)
//!   flapping → stable      (cleared silently)
//!
//! transitions >= threshold:
//!   stable   → flapping    (FlapEvaluation::StartsFlapping → alert)
//!   flapping → flapping    (nothing)
//! ```

use std::collections::HashMap;

use super::history::HistorySample;

/// Number of online/offline changes between adjacent samples
pub fn count_transitions(window: &[HistorySample]) -> usize {
    window
        .windows(2)
        .filter(|pair| pair[0].online != pair[1].online)
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlapEvaluation {
    Stable,
    StartsFlapping,
    Flapping,
    BackToStable,
}

impl FlapEvaluation {
    pub fn evaluate(transitions: usize, threshold: usize, was_flapping: bool) -> Self {
        match (transitions >= threshold, was_flapping) {
            (true, false) => FlapEvaluation::StartsFlapping,
            (true, true) => FlapEvaluation::Flapping,
            (false, true) => FlapEvaluation::BackToStable,
            (false, false) => FlapEvaluation::Stable,
        }
    }

    pub fn is_flapping(self) -> bool {
        matches!(self, FlapEvaluation::StartsFlapping | FlapEvaluation::Flapping)
    }
}

/// Remembers which devices are flapping between sweeps
#[derive(Debug, Clone)]
pub struct FlapDetector {
    window: usize,
    threshold: usize,
    flapping: HashMap<String, bool>,
}

impl FlapDetector {
    pub fn new(window: usize, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            flapping: HashMap::new(),
        }
    }

    /// Size of the trailing window the detector expects
    pub fn window(&self) -> usize {
        self.window
    }

    /// Evaluate a device's trailing window.
    ///
    /// Returns the transition count when the device starts flapping. Fewer
    /// than `window` samples leave the device's state untouched.
    pub fn evaluate(&mut self, address: &str, window: &[HistorySample]) -> Option<usize> {
        if window.len() < self.window {
            return None;
        }
        let skip = window.len() - self.window;
        let transitions = count_transitions(&window[skip..]);

        let was_flapping = self.is_flapping(address);
        let evaluation = FlapEvaluation::evaluate(transitions, self.threshold, was_flapping);
        self.flapping
            .insert(address.to_string(), evaluation.is_flapping());

        (evaluation == FlapEvaluation::StartsFlapping).then_some(transitions)
    }

    pub fn is_flapping(&self, address: &str) -> bool {
        self.flapping.get(address).copied().unwrap_or(false)
    }

    /// Forget every device for which `keep` returns false.
    pub fn retain(&mut self, keep: impl Fn(&str) -> bool) {
        self.flapping.retain(|address, _| keep(address));
    }
}
