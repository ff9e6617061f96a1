//src/status.rs
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::EnumIter;

use crate::store::{CheckIn, Swelling};

/// Daily training-safety classification derived from the day's check-in.
/// `Unknown` means no check-in exists for the date in question; it is a
/// fourth state, not a clinical level.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum KneeStatus {
    Unknown,
    Green,
    Yellow,
    Red,
}

impl fmt::Display for KneeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Green => write!(f, "green"),
            Self::Yellow => write!(f, "yellow"),
            Self::Red => write!(f, "red"),
        }
    }
}

/// Training-intensity track recommended by the status engine.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Calm,
    Build,
    Prime,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calm => write!(f, "CALM"),
            Self::Build => write!(f, "BUILD"),
            Self::Prime => write!(f, "PRIME"),
        }
    }
}

impl TryFrom<&str> for Lane {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "calm" => Ok(Self::Calm),
            "build" => Ok(Self::Build),
            "prime" => Ok(Self::Prime),
            _ => anyhow::bail!("Invalid lane string: {}", value),
        }
    }
}

/// Static UI content bundle for one status level.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMessage {
    pub icon: &'static str,
    pub title: &'static str,
    pub summary: &'static str,
    pub action_text: &'static str,
}

/// Classifies a day's check-in into a status level.
///
/// Rules are evaluated in this exact order and the first match wins. This
/// means swelling "none" is GREEN regardless of the pain value supplied,
/// and the trailing YELLOW is a fail-safe for inputs no rule covers (a
/// missing swelling level with mid-range pain reaches it).
#[must_use]
pub fn classify(check_in: Option<&CheckIn>) -> KneeStatus {
    let Some(check_in) = check_in else {
        return KneeStatus::Unknown;
    };
    let pain = check_in.pain;

    match check_in.swelling {
        Some(Swelling::Severe) => KneeStatus::Red,
        Some(Swelling::Moderate) if pain >= 6 => KneeStatus::Red,
        Some(Swelling::Moderate) => KneeStatus::Yellow,
        Some(Swelling::None) => KneeStatus::Green,
        Some(Swelling::Mild) if pain >= 3 => KneeStatus::Yellow,
        Some(Swelling::Mild) => KneeStatus::Green,
        None if pain >= 4 => KneeStatus::Yellow,
        // Deliberate fail-safe default, not a gap.
        None => KneeStatus::Yellow,
    }
}

/// Allowed lanes for a status, in preference order (first element is the
/// primary recommendation). `Unknown` yields no lanes; the caller should
/// prompt for a check-in first.
#[must_use]
pub fn recommended_lanes(status: KneeStatus) -> &'static [Lane] {
    match status {
        KneeStatus::Green => &[Lane::Build, Lane::Prime, Lane::Calm],
        KneeStatus::Yellow => &[Lane::Calm, Lane::Build],
        KneeStatus::Red => &[Lane::Calm],
        KneeStatus::Unknown => &[],
    }
}

#[must_use]
pub const fn lane_description(lane: Lane) -> &'static str {
    match lane {
        Lane::Calm => {
            "CALM: gentle mobility, isometrics, and circulation work. Always available, even on red days."
        }
        Lane::Build => {
            "BUILD: progressive strength work. The default on green days; reduce intensity on yellow days."
        }
        Lane::Prime => {
            "PRIME: higher-load and plyometric work. Only when the knee is fully quiet (green status)."
        }
    }
}

#[must_use]
pub const fn status_message(status: KneeStatus) -> StatusMessage {
    match status {
        KneeStatus::Green => StatusMessage {
            icon: "🟢",
            title: "Green - good to train",
            summary: "Little to no swelling and low pain. The knee is ready for a normal session.",
            action_text: "Train in BUILD, or PRIME if recent sessions went well.",
        },
        KneeStatus::Yellow => StatusMessage {
            icon: "🟡",
            title: "Yellow - train with caution",
            summary: "Some swelling or elevated pain. Reduce load and watch how the knee responds.",
            action_text: "Stick to CALM, or BUILD at reduced intensity.",
        },
        KneeStatus::Red => StatusMessage {
            icon: "🔴",
            title: "Red - back off today",
            summary: "Significant swelling or pain. Loading the knee now risks a setback.",
            action_text: "CALM work only: gentle range of motion and circulation.",
        },
        KneeStatus::Unknown => StatusMessage {
            icon: "⚪",
            title: "No check-in yet",
            summary: "Today's knee status is unknown until you record swelling and pain.",
            action_text: "Do a quick check-in to get a recommendation.",
        },
    }
}
