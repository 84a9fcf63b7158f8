use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::analysis::RiskAnalyzer;
use crate::dialog::Dialog;
use crate::form::{load_existing, ProfileForm};
use crate::gateway::{cancellable, FilePicker, Navigator, RemoteGateway, Route};
use crate::model::PhotoFile;
use crate::sequencer::{SaveOutcome, SaveSequencer};
use crate::state::{BusyState, Phase, ScreenState, SharedState};
use crate::upload::UploadController;
use crate::{Config, ProfileError, Result};

const LOG_PREFIX: &str = "[screen]";

/// How the screen was reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScreenMode {
    /// First time setup, users that already have a profile are sent on
    Create,
    /// Editing an existing profile
    Edit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MountOutcome {
    /// The form is loaded and usable
    Ready,
    Redirected(Route),
}

/// The profile setup screen: one shared state, the controllers acting on
/// it, and the cancellation scope of everything they start.
///
/// Dropping the screen cancels every gateway call still in flight.
pub struct ProfileScreen {
    gateway: Arc<dyn RemoteGateway>,
    navigator: Arc<dyn Navigator>,
    state: SharedState,
    uploads: Arc<UploadController>,
    sequencer: SaveSequencer,
    cancel: CancellationToken,
}

impl ProfileScreen {
    pub fn new(
        config: Config,
        gateway: Arc<dyn RemoteGateway>,
        analyzer: Arc<dyn RiskAnalyzer>,
        navigator: Arc<dyn Navigator>,
        picker: Arc<dyn FilePicker>,
    ) -> Self {
        let state = SharedState::new(ScreenState {
            phase: Phase::Preparing,
            ..Default::default()
        });
        let cancel = CancellationToken::new();
        let uploads = Arc::new(UploadController::new(
            gateway.clone(),
            picker,
            state.clone(),
            config.clone(),
            cancel.clone(),
        ));
        let sequencer = SaveSequencer::new(
            gateway.clone(),
            analyzer,
            navigator.clone(),
            uploads.clone(),
            state.clone(),
            config,
            cancel.clone(),
        );
        Self {
            gateway,
            navigator,
            state,
            uploads,
            sequencer,
            cancel,
        }
    }

    /// Entry check: signed out users go to the login screen, and in
    /// [`ScreenMode::Create`] users with a profile go to the dashboard.
    /// Everyone else gets the form filled with what is stored already.
    pub async fn mount(&self, mode: ScreenMode) -> Result<MountOutcome> {
        let phase = self.state.phase();
        if phase != Phase::Preparing {
            return Err(ProfileError::Busy(phase));
        }

        let user = match self.guarded(self.gateway.current_user()).await {
            Ok(Some(user)) => user,
            Ok(None) => return Ok(self.leave(Route::Auth)),
            Err(ProfileError::Cancelled) => return Err(ProfileError::Cancelled),
            Err(e) => {
                log::error!("{} failed to resolve user: {}", LOG_PREFIX, e);
                return Ok(self.leave(Route::Auth));
            }
        };

        let has_profile =
            match self.guarded(self.gateway.fetch_profile(&user.id)).await {
                Ok(row) => row.is_some(),
                Err(ProfileError::Cancelled) => {
                    return Err(ProfileError::Cancelled)
                }
                Err(e) => {
                    log::error!("{} error checking profile: {}", LOG_PREFIX, e);
                    false
                }
            };
        if has_profile && mode == ScreenMode::Create {
            return Ok(self.leave(Route::Dashboard));
        }

        let existing =
            match self.guarded(load_existing(self.gateway.as_ref())).await {
                Ok(existing) => existing,
                Err(ProfileError::Cancelled) => {
                    return Err(ProfileError::Cancelled)
                }
                Err(e) => {
                    log::error!("{} error loading profile: {}", LOG_PREFIX, e);
                    Default::default()
                }
            };
        self.state.write(|state| {
            state.form = existing.form;
            state.photo_url = existing.photo_url;
            state.phase = Phase::Idle;
        });
        log::info!("{} ready ({:?})", LOG_PREFIX, mode);
        Ok(MountOutcome::Ready)
    }

    fn leave(&self, route: Route) -> MountOutcome {
        log::info!("{} redirecting to {}", LOG_PREFIX, route);
        self.navigator.navigate(route);
        MountOutcome::Redirected(route)
    }

    /// The modal to draw on top of the form, if any.
    pub fn dialog(&self) -> Option<Dialog> {
        self.state.read(Dialog::project)
    }

    pub fn snapshot(&self) -> ScreenState {
        self.state.read(|state| state.clone())
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn busy(&self) -> BusyState {
        self.state.read(|state| state.phase.busy())
    }

    /// Change form inputs. Only possible while nothing covers the form.
    pub fn edit_form<T>(
        &self,
        f: impl FnOnce(&mut ProfileForm) -> T,
    ) -> Result<T> {
        self.state.write(|state| {
            if !state.phase.is_idle() {
                return Err(ProfileError::Busy(state.phase.clone()));
            }
            Ok(f(&mut state.form))
        })
    }

    pub fn toggle_interest(&self, tag: &str) -> Result<()> {
        self.edit_form(|form| form.toggle_interest(tag))
    }

    pub fn select_file(&self) -> Result<()> {
        self.uploads.select_file()
    }

    pub async fn on_file_chosen(&self, file: PhotoFile) -> Result<String> {
        self.uploads.on_file_chosen(file).await
    }

    pub async fn save(&self) -> Result<SaveOutcome> {
        self.sequencer.save().await
    }

    pub async fn continue_anyway(&self) -> Result<()> {
        self.sequencer.continue_anyway().await
    }

    pub fn change_photo(&self) -> Result<()> {
        self.sequencer.change_photo()
    }

    pub fn dismiss_validation(&self) -> Result<()> {
        self.sequencer.dismiss_validation()
    }

    pub fn dismiss_risk(&self) -> Result<()> {
        self.sequencer.dismiss_risk()
    }

    /// Pop the pending failure notice, to be shown once.
    pub fn take_notice(&self) -> Option<String> {
        self.state.write(|state| state.notice.take())
    }

    /// Tear the screen down: calls still in flight resolve to
    /// [`ProfileError::Cancelled`] and leave the state untouched.
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            log::debug!("{} closing", LOG_PREFIX);
            self.cancel.cancel();
        }
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        cancellable(&self.cancel, call).await
    }
}

impl Drop for ProfileScreen {
    fn drop(&mut self) {
        self.close();
    }
}
