/// Transition of a device's probe health after one probe.
///
/// Mirrors a grace-period counter: failures accumulate until the threshold
/// is reached, at which point the device goes dormant exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvaluation {
    /// Probe answered, no failures pending
    Healthy,
    /// Probe answered after one or more failures; counter resets
    Recovered,
    /// Probe failed, threshold not reached yet
    Failing,
    /// Probe failed and the threshold has just been reached
    GoesDormant,
}

impl ProbeEvaluation {
    /// `consecutive_failures` is the count *before* this probe.
    pub fn evaluate(failed: bool, threshold: u32, consecutive_failures: u32) -> ProbeEvaluation {
        if !failed {
            if consecutive_failures > 0 {
                return ProbeEvaluation::Recovered;
            }
            return ProbeEvaluation::Healthy;
        }

        if consecutive_failures + 1 >= threshold {
            return ProbeEvaluation::GoesDormant;
        }

        ProbeEvaluation::Failing
    }

    /// Failure count after applying this evaluation.
    pub fn next_count(&self, consecutive_failures: u32) -> u32 {
        match self {
            ProbeEvaluation::Healthy | ProbeEvaluation::Recovered => 0,
            ProbeEvaluation::Failing | ProbeEvaluation::GoesDormant => consecutive_failures + 1,
        }
    }
}
