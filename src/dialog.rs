use std::fmt;

use crate::state::{Phase, ScreenState};

const VALIDATION_MESSAGE: &str = "Please complete all required fields, upload a photo and select at least one interest.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogKind {
    Preparing,
    Validation,
    RiskAlert,
    Analyzing,
    Uploading,
    Redirecting,
}

impl DialogKind {
    pub fn image(&self) -> &'static str {
        match self {
            DialogKind::Preparing | DialogKind::Uploading => {
                "/assets/cats/2.png"
            }
            DialogKind::Analyzing => "/assets/cats/3.png",
            DialogKind::Validation => "/assets/cats/4.png",
            DialogKind::RiskAlert => "/assets/cats/5.png",
            DialogKind::Redirecting => "/assets/cats/6.png",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            DialogKind::Preparing => "Preparing your profile...",
            DialogKind::Validation => "Hold on, friend!",
            DialogKind::RiskAlert => "Privacy Risk Alert!",
            DialogKind::Analyzing => {
                "Analyzing your profile for safety concerns..."
            }
            DialogKind::Uploading => "Uploading your photo...",
            DialogKind::Redirecting => "Redirecting to dashboard...",
        }
    }
}

/// Buttons a dialog can offer besides closing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DialogAction {
    ContinueToDashboard,
    ChangePhoto,
}

impl DialogAction {
    pub fn label(&self) -> &'static str {
        match self {
            DialogAction::ContinueToDashboard => {
                "Still want to continue to Dashboard"
            }
            DialogAction::ChangePhoto => "Change Profile Photo",
        }
    }
}

/// A modal as the renderer should draw it.
#[derive(Clone, Debug, PartialEq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub image: &'static str,
    pub title: &'static str,
    pub message: Option<String>,
    /// Extra lines under the message, e.g. the missing fields
    pub details: Vec<String>,
    pub spinner: bool,
    pub closable: bool,
    pub actions: Vec<DialogAction>,
}

impl Dialog {
    fn new(kind: DialogKind) -> Self {
        Self {
            kind,
            image: kind.image(),
            title: kind.title(),
            message: None,
            details: Vec::new(),
            spinner: false,
            closable: false,
            actions: Vec::new(),
        }
    }

    fn busy(kind: DialogKind) -> Self {
        Self {
            spinner: true,
            ..Self::new(kind)
        }
    }

    /// The one dialog to show for `state`, if any.
    ///
    /// Precedence is validation error, risk alert, analyzing, uploading,
    /// redirecting; the phase being a single value, at most one of them
    /// applies at a time.
    pub fn project(state: &ScreenState) -> Option<Dialog> {
        let dialog = match &state.phase {
            Phase::Idle | Phase::Done => return None,
            Phase::Invalid(errors) => Self {
                message: Some(VALIDATION_MESSAGE.to_owned()),
                details: errors.messages().map(str::to_owned).collect(),
                closable: true,
                ..Self::new(DialogKind::Validation)
            },
            Phase::RiskConfirmed(report) => Self {
                message: Some(report.summary.clone()),
                closable: true,
                actions: vec![
                    DialogAction::ContinueToDashboard,
                    DialogAction::ChangePhoto,
                ],
                ..Self::new(DialogKind::RiskAlert)
            },
            Phase::Validating | Phase::Saving | Phase::Analyzing => {
                Self::busy(DialogKind::Analyzing)
            }
            Phase::Uploading => Self::busy(DialogKind::Uploading),
            Phase::Redirecting => Self::busy(DialogKind::Redirecting),
            Phase::Preparing => Self::busy(DialogKind::Preparing),
        };
        Some(dialog)
    }
}

/// Plain text rendering, for text front ends and logs
impl fmt::Display for Dialog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.closable {
            writeln!(f, "[ {} ]  (x)", self.title)?;
        } else {
            writeln!(f, "[ {} ]", self.title)?;
        }
        if let Some(message) = &self.message {
            writeln!(f, "{}", message)?;
        }
        for detail in &self.details {
            writeln!(f, "  - {}", detail)?;
        }
        if self.spinner {
            writeln!(f, "...")?;
        }
        for (i, action) in self.actions.iter().enumerate() {
            writeln!(f, "({}) {}", i + 1, action.label())?;
        }
        Ok(())
    }
}
