use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::analysis::RiskAnalyzer;
use crate::gateway::{cancellable, Navigator, RemoteGateway, Route};
use crate::model::ProfileRow;
use crate::state::{Phase, SharedState};
use crate::upload::UploadController;
use crate::{Config, ProfileError, Result, SaveOrdering};

const LOG_PREFIX: &str = "[sequencer]";

/// How a save attempt ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Required inputs are missing, nothing was written
    Invalid,
    /// No signed in user, nothing was written
    SignedOut,
    /// Analysis failed or found nothing to alert about, back to idle
    Clean,
    /// The risk alert is up, waiting for the user's choice
    RiskConfirmed,
}

/// Clears the in-flight flag when a save ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs save → analyze → redirect over the shared screen state.
pub struct SaveSequencer {
    gateway: Arc<dyn RemoteGateway>,
    analyzer: Arc<dyn RiskAnalyzer>,
    navigator: Arc<dyn Navigator>,
    uploads: Arc<UploadController>,
    state: SharedState,
    config: Config,
    cancel: CancellationToken,
    // Set from entry until both the upsert and the analysis are over
    in_flight: AtomicBool,
}

impl SaveSequencer {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        analyzer: Arc<dyn RiskAnalyzer>,
        navigator: Arc<dyn Navigator>,
        uploads: Arc<UploadController>,
        state: SharedState,
        config: Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            analyzer,
            navigator,
            uploads,
            state,
            config,
            cancel,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Validate, persist and analyze the profile.
    ///
    /// Only starts from idle and with no earlier save still writing; any
    /// other call fails with [`ProfileError::Busy`].
    pub async fn save(&self) -> Result<SaveOutcome> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(ProfileError::Busy(self.state.phase()));
        }
        let _in_flight = InFlight(&self.in_flight);
        self.state.enter_from_idle(Phase::Validating)?;

        let errors = self
            .state
            .read(|state| state.form.validate(state.photo_url.is_some()));
        if !errors.is_empty() {
            log::info!("{} missing fields: {}", LOG_PREFIX, errors);
            self.state.set_phase(Phase::Invalid(errors));
            return Ok(SaveOutcome::Invalid);
        }

        self.state.set_phase(Phase::Saving);
        let user = match self.guarded(self.gateway.current_user()).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                log::error!("{} no authenticated user found", LOG_PREFIX);
                self.state.set_phase(Phase::Idle);
                return Ok(SaveOutcome::SignedOut);
            }
            Err(ProfileError::Cancelled) => return Err(ProfileError::Cancelled),
            Err(e) => {
                log::error!("{} failed to resolve user: {}", LOG_PREFIX, e);
                self.state.set_phase(Phase::Idle);
                return Ok(SaveOutcome::SignedOut);
            }
        };
        let token = match self.guarded(self.gateway.session()).await {
            Ok(session) => session
                .map(|s| s.access_token)
                .unwrap_or_default(),
            Err(ProfileError::Cancelled) => return Err(ProfileError::Cancelled),
            Err(e) => {
                log::warn!("{} no session token: {}", LOG_PREFIX, e);
                String::new()
            }
        };

        let row = self
            .state
            .read(|state| state.form.to_row(&user.id));
        let outcome = match self.config.save_ordering {
            SaveOrdering::Concurrent => {
                let (_, outcome) = tokio::join!(
                    self.persist(&row),
                    self.analyze(&user.id, &token)
                );
                outcome
            }
            SaveOrdering::Sequential => {
                self.persist(&row).await;
                self.analyze(&user.id, &token).await
            }
        };
        // The spinner stays up until the upsert has settled as well
        if let Ok(SaveOutcome::Clean) = outcome {
            self.state.set_phase(Phase::Idle);
        }
        outcome
    }

    async fn persist(&self, row: &ProfileRow) {
        match self
            .guarded(self.gateway.upsert_profile(row))
            .await
        {
            Ok(()) => log::info!("{} profile saved / updated", LOG_PREFIX),
            Err(ProfileError::Cancelled) => {}
            Err(e) => log::error!("{} error saving profile: {}", LOG_PREFIX, e),
        }
    }

    async fn analyze(&self, user_id: &str, token: &str) -> Result<SaveOutcome> {
        self.state.set_phase(Phase::Analyzing);
        let started = Instant::now();

        let response = match self
            .guarded(self.analyzer.analyze(user_id, token))
            .await
        {
            Ok(response) => response,
            Err(ProfileError::Cancelled) => return Err(ProfileError::Cancelled),
            Err(e) => {
                log::error!("{} failed to fetch PII analysis: {}", LOG_PREFIX, e);
                return Ok(SaveOutcome::Clean);
            }
        };

        // The spinner stays up for the minimum display time however
        // quickly the service answered
        let shown_until = started + self.config.min_analysis_display;
        self.guarded(async {
            tokio::time::sleep_until(shown_until).await;
            Ok(())
        })
        .await?;

        match response.risk_report() {
            Some(report) => {
                log::info!(
                    "{} risk level {} (score {})",
                    LOG_PREFIX,
                    report.pii.level,
                    report.pii.score
                );
                self.state.set_phase(Phase::RiskConfirmed(report));
                Ok(SaveOutcome::RiskConfirmed)
            }
            None => Ok(SaveOutcome::Clean),
        }
    }

    /// "Still want to continue": show the redirect notice, then leave for
    /// the dashboard. Once started this cannot be cancelled.
    pub async fn continue_anyway(&self) -> Result<()> {
        self.state.transition(
            |phase| matches!(phase, Phase::RiskConfirmed(_)),
            Phase::Redirecting,
        )?;
        tokio::time::sleep(self.config.redirect_delay).await;

        log::info!("{} redirecting to {}", LOG_PREFIX, Route::Dashboard);
        self.navigator.navigate(Route::Dashboard);
        self.state.set_phase(Phase::Done);
        Ok(())
    }

    /// "Change profile photo": close the alert and reopen the picker.
    pub fn change_photo(&self) -> Result<()> {
        self.state.transition(
            |phase| matches!(phase, Phase::RiskConfirmed(_)),
            Phase::Idle,
        )?;
        self.uploads.select_file()
    }

    /// Close button of the risk alert.
    pub fn dismiss_risk(&self) -> Result<()> {
        self.state.transition(
            |phase| matches!(phase, Phase::RiskConfirmed(_)),
            Phase::Idle,
        )
    }

    /// Close button of the validation dialog.
    pub fn dismiss_validation(&self) -> Result<()> {
        self.state
            .transition(|phase| matches!(phase, Phase::Invalid(_)), Phase::Idle)
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        cancellable(&self.cancel, call).await
    }
}
