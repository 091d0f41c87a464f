//! Synthetic progress estimation
//!
//! Blends elapsed time with whatever the server reports (queue position,
//! remaining time) into a percentage and a phase message. Everything here is
//! pure; the caller supplies the elapsed time.

use std::time::Duration;

use calc_shared::{CalcSettings, CalcType};

/// Weight of the server estimate in the economy blend
const SERVER_WEIGHT: f64 = 0.7;
const SYNTHETIC_WEIGHT: f64 = 0.3;

/// Queued progress: floor, start and step per position
const QUEUE_FLOOR: f64 = 5.0;
const QUEUE_START: f64 = 20.0;
const QUEUE_STEP: f64 = 2.0;

const HOUSEHOLD_BANDS: &[(f64, &str)] = &[
    (10.0, "Initializing calculation..."),
    (30.0, "Loading household data..."),
    (60.0, "Running policy simulation..."),
    (80.0, "Calculating impacts..."),
];

const ECONOMY_BANDS: &[(f64, &str)] = &[
    (10.0, "Initializing calculation..."),
    (30.0, "Loading population data..."),
    (50.0, "Running baseline scenario..."),
    (75.0, "Running reform scenario..."),
    (90.0, "Calculating distributional impacts..."),
];

const FINAL_PHASE: &str = "Finalizing results...";

/// Optional hints the backend attaches to an in-flight job
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerHint {
    pub queue_position: Option<u32>,
    pub estimated_time_remaining_ms: Option<u64>,
}

/// Progress percentage plus the message shown next to it
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEstimate {
    pub progress: f64,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ProgressSynthesizer {
    household_estimate: Duration,
    economy_estimate: Duration,
    cap: f64,
}

impl Default for ProgressSynthesizer {
    fn default() -> Self {
        Self::new(&CalcSettings::default())
    }
}

impl ProgressSynthesizer {
    pub fn new(settings: &CalcSettings) -> Self {
        Self {
            household_estimate: settings.household_estimate,
            economy_estimate: settings.economy_estimate,
            cap: settings.progress_cap,
        }
    }

    pub fn cap(&self) -> f64 {
        self.cap
    }

    /// Clamp any surfaced progress into `[0, cap]`
    pub fn clamp(&self, progress: f64) -> f64 {
        progress.clamp(0.0, self.cap)
    }

    /// Pure time-based progress, capped
    pub fn synthetic(&self, elapsed: Duration, calc_type: CalcType) -> f64 {
        let estimate = match calc_type {
            CalcType::Household => self.household_estimate,
            CalcType::Economy => self.economy_estimate,
        };
        let pct = elapsed.as_secs_f64() / estimate.as_secs_f64() * 100.0;
        self.clamp(pct)
    }

    /// Progress before the final clamp
    ///
    /// Only the economy blend can leave `[0, cap]` here.
    pub fn raw_progress(&self, elapsed: Duration, calc_type: CalcType, hint: Option<&ServerHint>) -> f64 {
        let hint = match (calc_type, hint) {
            (CalcType::Economy, Some(hint)) => hint,
            _ => return self.synthetic(elapsed, calc_type),
        };

        if let Some(remaining_ms) = hint.estimated_time_remaining_ms {
            let estimate_ms = self.economy_estimate.as_secs_f64() * 1000.0;
            let server_pct = 100.0 - remaining_ms as f64 / estimate_ms * 100.0;
            let synthetic_pct = self.synthetic(elapsed, CalcType::Economy);
            return SERVER_WEIGHT * server_pct + SYNTHETIC_WEIGHT * synthetic_pct;
        }

        if let Some(position) = hint.queue_position {
            return (QUEUE_START - QUEUE_STEP * position as f64).max(QUEUE_FLOOR);
        }

        self.synthetic(elapsed, CalcType::Economy)
    }

    /// Progress and message for one in-flight calculation
    pub fn estimate(&self, elapsed: Duration, calc_type: CalcType, hint: Option<&ServerHint>) -> ProgressEstimate {
        let progress = self.clamp(self.raw_progress(elapsed, calc_type, hint));
        let message = match hint.and_then(|h| h.queue_position) {
            Some(position) if position > 0 => queue_message(position),
            _ => phase_message(calc_type, progress).to_string(),
        };
        ProgressEstimate { progress, message }
    }
}

pub fn queue_message(position: u32) -> String {
    format!("Waiting in queue (position {position})...")
}

/// Phase string for a progress percentage
pub fn phase_message(calc_type: CalcType, progress: f64) -> &'static str {
    let bands = match calc_type {
        CalcType::Household => HOUSEHOLD_BANDS,
        CalcType::Economy => ECONOMY_BANDS,
    };
    bands
        .iter()
        .find(|(upper, _)| progress < *upper)
        .map(|(_, message)| *message)
        .unwrap_or(FINAL_PHASE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn test_household_hits_cap_at_estimate() {
        let synth = ProgressSynthesizer::default();
        assert_eq!(synth.synthetic(ms(45_000), CalcType::Household), 95.0);
        assert_eq!(synth.synthetic(ms(90_000), CalcType::Household), 95.0);
        assert!((synth.synthetic(ms(22_500), CalcType::Household) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_household_ignores_server_hints() {
        let synth = ProgressSynthesizer::default();
        let hint = ServerHint {
            queue_position: Some(4),
            estimated_time_remaining_ms: Some(1),
        };
        let with_hint = synth.raw_progress(ms(9_000), CalcType::Household, Some(&hint));
        assert!((with_hint - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_economy_blend_exceeds_cap_before_clamp() {
        let synth = ProgressSynthesizer::default();
        let hint = ServerHint {
            queue_position: None,
            estimated_time_remaining_ms: Some(0),
        };

        let raw = synth.raw_progress(ms(720_000), CalcType::Economy, Some(&hint));
        assert!((raw - 98.5).abs() < 1e-9);

        let shown = synth.estimate(ms(720_000), CalcType::Economy, Some(&hint));
        assert_eq!(shown.progress, 95.0);
        assert_eq!(shown.message, "Finalizing results...");
    }

    #[test]
    fn test_economy_blend_midway() {
        let synth = ProgressSynthesizer::default();
        let hint = ServerHint {
            queue_position: None,
            estimated_time_remaining_ms: Some(360_000),
        };
        // 0.7 * 50 + 0.3 * 25
        let raw = synth.raw_progress(ms(180_000), CalcType::Economy, Some(&hint));
        assert!((raw - 42.5).abs() < 1e-9);
    }

    #[test]
    fn test_economy_blend_clamps_only_the_result() {
        let synth = ProgressSynthesizer::default();
        let hint = ServerHint {
            queue_position: None,
            estimated_time_remaining_ms: Some(1_440_000),
        };
        // 0.7 * -100 + 0.3 * 50
        let raw = synth.raw_progress(ms(360_000), CalcType::Economy, Some(&hint));
        assert!((raw + 55.0).abs() < 1e-9);
        assert_eq!(synth.estimate(ms(360_000), CalcType::Economy, Some(&hint)).progress, 0.0);
    }

    #[test]
    fn test_queue_only_progress() {
        let synth = ProgressSynthesizer::default();
        let queued = |position| ServerHint {
            queue_position: Some(position),
            estimated_time_remaining_ms: None,
        };

        assert_eq!(synth.raw_progress(ms(0), CalcType::Economy, Some(&queued(0))), 20.0);
        assert_eq!(synth.raw_progress(ms(0), CalcType::Economy, Some(&queued(3))), 14.0);
        assert_eq!(synth.raw_progress(ms(0), CalcType::Economy, Some(&queued(50))), 5.0);

        let estimate = synth.estimate(ms(0), CalcType::Economy, Some(&queued(3)));
        assert_eq!(estimate.message, "Waiting in queue (position 3)...");
    }

    #[test]
    fn test_time_based_progress_is_monotonic_and_capped() {
        let synth = ProgressSynthesizer::default();
        for calc_type in [CalcType::Household, CalcType::Economy] {
            let mut last = 0.0;
            for step in 0..2_000u64 {
                let estimate = synth.estimate(ms(step * 1_000), calc_type, None);
                assert!(estimate.progress >= last);
                assert!(estimate.progress <= 95.0);
                last = estimate.progress;
            }
            assert_eq!(last, 95.0);
        }
    }

    #[test]
    fn test_phase_bands() {
        assert_eq!(phase_message(CalcType::Household, 0.0), "Initializing calculation...");
        assert_eq!(phase_message(CalcType::Household, 10.0), "Loading household data...");
        assert_eq!(phase_message(CalcType::Household, 59.9), "Running policy simulation...");
        assert_eq!(phase_message(CalcType::Household, 80.0), "Finalizing results...");

        assert_eq!(phase_message(CalcType::Economy, 45.0), "Running baseline scenario...");
        assert_eq!(phase_message(CalcType::Economy, 74.0), "Running reform scenario...");
        assert_eq!(phase_message(CalcType::Economy, 89.0), "Calculating distributional impacts...");
        assert_eq!(phase_message(CalcType::Economy, 95.0), "Finalizing results...");
    }
}
