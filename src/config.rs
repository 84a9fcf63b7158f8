use std::env;
use std::time::Duration;

use url::Url;

use crate::{Result, SIGNED_URL_EXPIRY_SECS, UPLOAD_CACHE_CONTROL_SECS};

const LOG_PREFIX: &str = "[config]";

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_MIN_ANALYSIS_MS: u64 = 5000;
pub const DEFAULT_REDIRECT_MS: u64 = 5000;

const BACKEND_URL_VARS: [&str; 2] = ["PAWPROFILE_BACKEND_URL", "BACKEND_URL"];
const MIN_ANALYSIS_VAR: &str = "PAWPROFILE_MIN_ANALYSIS_MS";
const REDIRECT_VAR: &str = "PAWPROFILE_REDIRECT_MS";

const ANALYSIS_PATH: &str = "api/image/analyze-image";

/// How the profile upsert relates to the analysis call on save.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaveOrdering {
    /// Both requests are issued together and neither waits on the other.
    /// The analysis may therefore run before the profile row is committed.
    #[default]
    Concurrent,
    /// The upsert is awaited before the analysis call is issued.
    Sequential,
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Origin of the risk analysis service
    pub backend_url: Url,
    /// Shortest time the analyzing dialog stays up, counted from the
    /// moment the analysis request is issued
    pub min_analysis_display: Duration,
    /// How long the redirect notice is shown before navigating
    pub redirect_delay: Duration,
    pub signed_url_expiry: Duration,
    pub upload_cache_control: Duration,
    pub save_ordering: SaveOrdering,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: Url::parse(DEFAULT_BACKEND_URL)
                .expect("default backend url is valid"),
            min_analysis_display: Duration::from_millis(
                DEFAULT_MIN_ANALYSIS_MS,
            ),
            redirect_delay: Duration::from_millis(DEFAULT_REDIRECT_MS),
            signed_url_expiry: Duration::from_secs(SIGNED_URL_EXPIRY_SECS),
            upload_cache_control: Duration::from_secs(
                UPLOAD_CACHE_CONTROL_SECS,
            ),
            save_ordering: SaveOrdering::default(),
        }
    }
}

impl Config {
    /// Build a config from the process environment.
    ///
    /// Unset variables keep their defaults. Malformed values are logged
    /// and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = BACKEND_URL_VARS.iter().find_map(|key| lookup(key))
        {
            match Url::parse(raw.trim()) {
                Ok(url) => config.backend_url = url,
                Err(e) => log::warn!(
                    "{} ignoring backend url {:?}: {}",
                    LOG_PREFIX,
                    raw,
                    e
                ),
            }
        }

        if let Some(duration) = lookup_millis(&lookup, MIN_ANALYSIS_VAR) {
            config.min_analysis_display = duration;
        }
        if let Some(duration) = lookup_millis(&lookup, REDIRECT_VAR) {
            config.redirect_delay = duration;
        }

        config
    }

    pub fn with_backend_url(mut self, url: &str) -> Result<Self> {
        self.backend_url = Url::parse(url)?;
        Ok(self)
    }

    pub fn with_save_ordering(mut self, ordering: SaveOrdering) -> Self {
        self.save_ordering = ordering;
        self
    }

    /// Full address of the image analysis endpoint, below any path the
    /// backend url carries
    pub fn analysis_endpoint(&self) -> Result<Url> {
        let mut base = self.backend_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base.join(ANALYSIS_PATH)?)
    }
}

fn lookup_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(e) => {
            log::warn!("{} ignoring {}={:?}: {}", LOG_PREFIX, key, raw, e);
            None
        }
    }
}
