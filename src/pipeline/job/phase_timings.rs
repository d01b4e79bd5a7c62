use indexmap::IndexMap;
use std::time::Duration;

/// Logical stages of one processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobPhase {
    Detection,
    Blur,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Detection => "detection",
            JobPhase::Blur => "blur",
        }
    }
}

/// Tracks how long each phase of a job took, in execution order.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimings {
    phase_durations: IndexMap<JobPhase, Duration>,
}

impl PhaseTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a phase, accumulating if it ran before
    pub fn record(&mut self, phase: JobPhase, duration: Duration) {
        *self.phase_durations.entry(phase).or_default() += duration;
    }

    pub fn get_phase_duration(&self, phase: JobPhase) -> Duration {
        self.phase_durations
            .get(&phase)
            .copied()
            .unwrap_or_default()
    }

    /// Phase durations in milliseconds, keyed by phase name.
    pub fn to_millis(&self) -> IndexMap<String, f64> {
        self.phase_durations
            .iter()
            .map(|(phase, duration)| (phase.as_str().to_string(), duration.as_secs_f64() * 1000.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_and_keeps_order() {
        let mut timings = PhaseTimings::new();
        timings.record(JobPhase::Detection, Duration::from_millis(3));
        timings.record(JobPhase::Blur, Duration::from_millis(5));
        timings.record(JobPhase::Detection, Duration::from_millis(2));

        assert_eq!(timings.get_phase_duration(JobPhase::Detection), Duration::from_millis(5));
        let millis = timings.to_millis();
        let names: Vec<&str> = millis.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["detection", "blur"]);
        assert_eq!(millis["blur"], 5.0);
    }
}
