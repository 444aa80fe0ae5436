use std::str::FromStr;
use std::time::Duration;

use crate::model::ChangeEventMode;

pub const TIMEOUT_VAR: &str = "MTREASON_TIMEOUT_MS";
pub const PROOF_DEPTH_VAR: &str = "MTREASON_PROOF_DEPTH";

#[derive(Debug, Clone, PartialEq)]
pub struct ProverConfig {
    /// Wall-clock budget for one `start`; `None` searches until done.
    pub timeout: Option<Duration>,
    pub change_event_mode: ChangeEventMode,
    pub development_rounds: usize,
    /// Antecedents each developer may add per round.
    pub development_depth: usize,
    pub main_proof_depth: usize,
    pub simplify_rounds: usize,
    pub reject_identity_expansion: bool,
    pub intermittent_period: usize,
}

impl Default for ProverConfig {
    fn default() -> Self {
        ProverConfig {
            timeout: Some(Duration::from_secs(5)),
            change_event_mode: ChangeEventMode::Always,
            development_rounds: 3,
            development_depth: 1,
            main_proof_depth: 3,
            simplify_rounds: 3,
            reject_identity_expansion: true,
            intermittent_period: 300,
        }
    }
}

impl ProverConfig {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_change_event_mode(mut self, mode: ChangeEventMode) -> Self {
        self.change_event_mode = mode;
        self
    }

    pub fn with_development_rounds(mut self, rounds: usize) -> Self {
        self.development_rounds = rounds;
        self
    }

    pub fn with_development_depth(mut self, depth: usize) -> Self {
        self.development_depth = depth;
        self
    }

    pub fn with_main_proof_depth(mut self, depth: usize) -> Self {
        self.main_proof_depth = depth;
        self
    }

    pub fn with_simplify_rounds(mut self, rounds: usize) -> Self {
        self.simplify_rounds = rounds;
        self
    }

    pub fn with_reject_identity_expansion(mut self, reject: bool) -> Self {
        self.reject_identity_expansion = reject;
        self
    }

    pub fn with_intermittent_period(mut self, period: usize) -> Self {
        self.intermittent_period = period;
        self
    }

    /// Defaults overridden by `MTREASON_TIMEOUT_MS` (`0` for no timeout) and
    /// `MTREASON_PROOF_DEPTH`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(ms) = parse_var::<u64>(&lookup, TIMEOUT_VAR) {
            self.timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(depth) = parse_var::<usize>(&lookup, PROOF_DEPTH_VAR) {
            self.main_proof_depth = depth;
        }
        self
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<T> {
    let value = lookup(var)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            log::warn!("ignoring {var}={value:?}: not a number");
            None
        }
    }
}
