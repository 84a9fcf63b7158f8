use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::form::{ProfileForm, ValidationErrors};
use crate::model::RiskReport;
use crate::{ProfileError, Result};

/// Where the screen currently is.
///
/// Upload, save and redirect all move this single value, so two long
/// running flows can never be active at the same time.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Phase {
    /// Entry check before the form is usable
    Preparing,
    #[default]
    Idle,
    Uploading,
    Validating,
    Invalid(ValidationErrors),
    Saving,
    Analyzing,
    RiskConfirmed(RiskReport),
    Redirecting,
    Done,
}

/// The coarse "what is blocking the user" view of a [`Phase`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusyState {
    Idle,
    Uploading,
    Analyzing,
    Redirecting,
}

impl Phase {
    pub fn busy(&self) -> BusyState {
        match self {
            Phase::Uploading => BusyState::Uploading,
            Phase::Validating | Phase::Saving | Phase::Analyzing => {
                BusyState::Analyzing
            }
            Phase::Redirecting | Phase::Done => BusyState::Redirecting,
            Phase::Preparing
            | Phase::Idle
            | Phase::Invalid(_)
            | Phase::RiskConfirmed(_) => BusyState::Idle,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Phase::Idle)
    }
}

/// Everything the screen renders from.
#[derive(Clone, Debug, Default)]
pub struct ScreenState {
    pub phase: Phase,
    pub form: ProfileForm,
    /// Signed URL of the photo currently displayed
    pub photo_url: Option<String>,
    /// User facing failure message waiting to be shown
    pub notice: Option<String>,
}

/// Shared handle to the [`ScreenState`], cloned into every controller.
///
/// Locks are only held for the duration of a closure, never across an
/// await point.
#[derive(Clone, Debug, Default)]
pub struct SharedState {
    inner: Arc<RwLock<ScreenState>>,
}

impl SharedState {
    pub fn new(state: ScreenState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read<T>(&self, f: impl FnOnce(&ScreenState) -> T) -> T {
        f(&self.read_guard())
    }

    pub fn write<T>(&self, f: impl FnOnce(&mut ScreenState) -> T) -> T {
        f(&mut self.write_guard())
    }

    pub fn phase(&self) -> Phase {
        self.read(|state| state.phase.clone())
    }

    pub fn set_phase(&self, phase: Phase) {
        self.write(|state| {
            log::debug!("phase {:?} -> {:?}", state.phase, phase);
            state.phase = phase;
        })
    }

    /// Move from `Idle` to `next`, or fail with [`ProfileError::Busy`].
    pub fn enter_from_idle(&self, next: Phase) -> Result<()> {
        self.transition(|phase| phase.is_idle(), next)
    }

    /// Move to `next` if the current phase satisfies `allowed`.
    pub fn transition(
        &self,
        allowed: impl FnOnce(&Phase) -> bool,
        next: Phase,
    ) -> Result<()> {
        self.write(|state| {
            if !allowed(&state.phase) {
                return Err(ProfileError::Busy(state.phase.clone()));
            }
            log::debug!("phase {:?} -> {:?}", state.phase, next);
            state.phase = next;
            Ok(())
        })
    }

    // A panic while holding the lock leaves plain data behind, which is
    // still consistent enough to render
    fn read_guard(&self) -> RwLockReadGuard<'_, ScreenState> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ScreenState> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
