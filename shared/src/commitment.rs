use serde::{Deserialize, Serialize};
use strum::EnumIter;
use thiserror::Error;

pub use strum::IntoEnumIterator;

/// What a Pact holds both participants to, day after day.
///
/// `Custom` has no machine-checkable telemetry; its progress arrives only
/// through explicit confirmation reports from the participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum CommitmentType {
    DailyTasks,
    FocusMinutes,
    GoalProgress,
    Custom { description: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("target must be a positive number of {unit}")]
    ZeroTarget { unit: &'static str },
    #[error("target {target} is outside the allowed range {min}..={max} {unit}")]
    TargetOutOfRange {
        target: u32,
        min: u32,
        max: u32,
        unit: &'static str,
    },
    #[error("a custom commitment requires a non-empty description")]
    EmptyDescription,
}

impl CommitmentType {
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::DailyTasks => "daily_tasks",
            Self::FocusMinutes => "focus_minutes",
            Self::GoalProgress => "goal_progress",
            Self::Custom { .. } => "custom",
        }
    }

    /// Inverse of `kind_label`, used when loading a persisted Pact.
    pub fn from_parts(kind: &str, description: Option<String>) -> Option<Self> {
        match kind {
            "daily_tasks" => Some(Self::DailyTasks),
            "focus_minutes" => Some(Self::FocusMinutes),
            "goal_progress" => Some(Self::GoalProgress),
            "custom" => Some(Self::Custom {
                description: description.unwrap_or_default(),
            }),
            _ => None,
        }
    }

    pub fn custom_description(&self) -> Option<&str> {
        match self {
            Self::Custom { description } => Some(description),
            _ => None,
        }
    }

    pub const fn unit_label(&self) -> &'static str {
        match self {
            Self::DailyTasks => "tasks",
            Self::FocusMinutes => "minutes",
            Self::GoalProgress => "percent",
            Self::Custom { .. } => "confirmations",
        }
    }

    pub const fn default_target(&self) -> u32 {
        match self {
            Self::DailyTasks => 3,
            Self::FocusMinutes => 30,
            Self::GoalProgress => 100,
            Self::Custom { .. } => 1,
        }
    }

    pub const fn target_range(&self) -> (u32, u32) {
        match self {
            Self::DailyTasks => (1, 50),
            Self::FocusMinutes => (1, 960),
            Self::GoalProgress => (1, 100),
            Self::Custom { .. } => (1, 1_000_000),
        }
    }

    pub fn validate_target(&self, target: u32) -> Result<u32, ValidationError> {
        if let Self::Custom { description } = self {
            if description.trim().is_empty() {
                return Err(ValidationError::EmptyDescription);
            }
        }
        if target == 0 {
            return Err(ValidationError::ZeroTarget {
                unit: self.unit_label(),
            });
        }
        let (min, max) = self.target_range();
        if target < min || target > max {
            return Err(ValidationError::TargetOutOfRange {
                target,
                min,
                max,
                unit: self.unit_label(),
            });
        }
        Ok(target)
    }

    pub const fn is_met(&self, progress_value: u32, target_value: u32) -> bool {
        progress_value >= target_value
    }

    /// Telemetry only exists for kinds the task/focus tracker can measure.
    pub const fn has_telemetry(&self) -> bool {
        !matches!(self, Self::Custom { .. })
    }
}
