use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Preset picking the backend model tier, search grounding and thinking budget.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Standard,
    Fast,
    Turbo,
    Deep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub model: &'static str,
    pub google_search: bool,
    pub thinking_budget: Option<u32>,
}

const STANDARD: ModeProfile = ModeProfile {
    model: "gemini-2.5-flash",
    google_search: true,
    thinking_budget: None,
};

const FAST: ModeProfile = ModeProfile {
    model: "gemini-2.5-flash-lite",
    google_search: false,
    thinking_budget: None,
};

// Budget 0 turns thinking off on 2.5 Flash.
const TURBO: ModeProfile = ModeProfile {
    model: "gemini-2.5-flash",
    google_search: true,
    thinking_budget: Some(0),
};

const DEEP: ModeProfile = ModeProfile {
    model: "gemini-2.5-pro",
    google_search: true,
    thinking_budget: Some(32768),
};

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Standard, Mode::Fast, Mode::Turbo, Mode::Deep];

    pub fn profile(self) -> &'static ModeProfile {
        match self {
            Mode::Standard => &STANDARD,
            Mode::Fast => &FAST,
            Mode::Turbo => &TURBO,
            Mode::Deep => &DEEP,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Standard => "standard",
            Mode::Fast => "fast",
            Mode::Turbo => "turbo",
            Mode::Deep => "deep",
        }
    }

    /// Whether a user turn sent in this mode is marked as a deep-think turn.
    pub fn marks_user_deep_think(self) -> bool {
        matches!(self, Mode::Turbo | Mode::Deep)
    }

    /// Whether a model answer produced in this mode is marked as deep-think.
    pub fn marks_model_deep_think(self) -> bool {
        self == Mode::Deep
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown mode '{}', expected one of: standard, fast, turbo, deep",
            self.0
        )
    }
}

impl std::error::Error for UnknownMode {}

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == wanted)
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("DEEP".parse::<Mode>(), Ok(Mode::Deep));
        assert_eq!(" turbo ".parse::<Mode>(), Ok(Mode::Turbo));
        assert!("warp".parse::<Mode>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>(), Ok(mode));
        }
    }

    #[test]
    fn test_profile_table() {
        let cases = [
            (Mode::Standard, "gemini-2.5-flash", true, None),
            (Mode::Fast, "gemini-2.5-flash-lite", false, None),
            (Mode::Turbo, "gemini-2.5-flash", true, Some(0)),
            (Mode::Deep, "gemini-2.5-pro", true, Some(32768)),
        ];
        for (mode, model, search, budget) in cases {
            let profile = mode.profile();
            assert_eq!(profile.model, model, "model for {mode}");
            assert_eq!(profile.google_search, search, "search for {mode}");
            assert_eq!(profile.thinking_budget, budget, "budget for {mode}");
        }
    }

    #[test]
    fn test_deep_think_marking() {
        assert!(!Mode::Standard.marks_user_deep_think());
        assert!(Mode::Turbo.marks_user_deep_think());
        assert!(!Mode::Turbo.marks_model_deep_think());
        assert!(Mode::Deep.marks_model_deep_think());
    }
}
