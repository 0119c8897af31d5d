//! Heating control decisions.

/// What the heating controller should do now.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeatingAction {
    /// Begin heating towards `target_temp` (°C).
    StartHeating {
        /// Temperature to heat to.
        target_temp: f64,
    },
    /// Stop heating; the target would be overshot.
    StopHeating,
    /// Leave the heating as it is.
    NoAction,
}

impl std::fmt::Display for HeatingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartHeating { target_temp } => {
                write!(f, "start heating to {:.1}°C", target_temp)
            }
            Self::StopHeating => write!(f, "stop heating"),
            Self::NoAction => write!(f, "no action"),
        }
    }
}

/// A decision together with a human readable reason.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeatingDecision {
    /// Action to take.
    pub action: HeatingAction,
    /// Why the action was chosen.
    pub reason: String,
}

impl HeatingDecision {
    /// Start heating towards `target_temp`.
    pub fn start(target_temp: f64, reason: impl Into<String>) -> Self {
        Self {
            action: HeatingAction::StartHeating { target_temp },
            reason: reason.into(),
        }
    }

    /// Stop heating.
    pub fn stop(reason: impl Into<String>) -> Self {
        Self {
            action: HeatingAction::StopHeating,
            reason: reason.into(),
        }
    }

    /// Leave the heating alone.
    pub fn no_action(reason: impl Into<String>) -> Self {
        Self {
            action: HeatingAction::NoAction,
            reason: reason.into(),
        }
    }

    /// Target temperature, if the decision starts heating.
    pub fn target_temp(&self) -> Option<f64> {
        match self.action {
            HeatingAction::StartHeating { target_temp } => Some(target_temp),
            _ => None,
        }
    }

    /// Check if the decision changes the heating state.
    pub fn is_action(&self) -> bool {
        self.action != HeatingAction::NoAction
    }
}

impl std::fmt::Display for HeatingDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.action, self.reason)
    }
}
