use std::sync::Once;

pub mod analysis;
pub mod config;
pub mod dialog;
pub mod errors;
pub mod form;
pub mod gateway;
pub mod model;
pub mod screen;
pub mod sequencer;
pub mod state;
pub mod upload;

pub use analysis::{HttpRiskAnalyzer, RiskAnalyzer};
pub use config::{Config, SaveOrdering};
pub use dialog::{Dialog, DialogAction, DialogKind};
pub use errors::{ProfileError, Result};
pub use form::{Field, ProfileForm, ValidationErrors};
pub use gateway::memory::MemoryGateway;
pub use gateway::rest::RestGateway;
pub use gateway::{FilePicker, Navigator, RemoteGateway, Route};
pub use model::{
    Age, PhotoFile, PhotoReference, PiiRiskSummary, ProfileRow, RiskReport,
    Session, User, INTEREST_CATALOG,
};
pub use screen::{MountOutcome, ProfileScreen, ScreenMode};
pub use sequencer::{SaveOutcome, SaveSequencer};
pub use state::{BusyState, Phase, ScreenState, SharedState};
pub use upload::UploadController;

// Storage layout of the hosted backend
pub const PHOTO_BUCKET: &str = "photos";
pub const PROFILES_TABLE: &str = "profiles";
pub const PHOTO_REFERENCE_TABLE: &str = "profileurl";

/// One year, in seconds
pub const SIGNED_URL_EXPIRY_SECS: u64 = 60 * 60 * 24 * 365;
pub const UPLOAD_CACHE_CONTROL_SECS: u64 = 3600;

static INIT: Once = Once::new();

/// Install the `env_logger` backend for the `log` facade.
///
/// Safe to call any number of times, only the first call has an effect.
pub fn initialize() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(cfg!(test)).try_init();
        log::info!("Initializing pawprofile");
    });
}
