// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Squat counter state.

use std::fmt;
use std::str::FromStr;

/// When a squat detection increments the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountMode {
    /// Every cycle whose detection is a squat adds one. A squat held across
    /// several cycles is counted several times.
    #[default]
    EveryCycle,
    /// Only a cycle that enters the squat (previous completed cycle was not a
    /// squat) adds one.
    OnEntry,
}

impl CountMode {
    /// CLI spelling of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EveryCycle => "every-cycle",
            Self::OnEntry => "on-entry",
        }
    }
}

impl fmt::Display for CountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "every-cycle" | "every" | "level" => Ok(Self::EveryCycle),
            "on-entry" | "entry" | "edge" => Ok(Self::OnEntry),
            _ => Err(format!(
                "invalid count mode '{s}', expected one of: every-cycle, on-entry"
            )),
        }
    }
}

/// Monotonic squat counter.
#[derive(Debug, Clone, Default)]
pub struct SquatCounter {
    value: u64,
    mode: CountMode,
    was_squatting: bool,
}

impl SquatCounter {
    /// Create a counter at zero.
    #[must_use]
    pub const fn new(mode: CountMode) -> Self {
        Self {
            value: 0,
            mode,
            was_squatting: false,
        }
    }

    /// Add one.
    pub const fn increment(&mut self) {
        self.value = self.value.saturating_add(1);
    }

    /// Current count.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Counting mode.
    #[must_use]
    pub const fn mode(&self) -> CountMode {
        self.mode
    }

    /// Feed one completed cycle's detection. Returns whether it was counted.
    pub const fn observe(&mut self, is_squat: bool) -> bool {
        let counted = match self.mode {
            CountMode::EveryCycle => is_squat,
            CountMode::OnEntry => is_squat && !self.was_squatting,
        };
        self.was_squatting = is_squat;
        if counted {
            self.increment();
        }
        counted
    }
}
