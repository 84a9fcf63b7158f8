use std::fmt;

use serde::{Deserialize, Serialize};

pub const MIN_AGE: u8 = 18;
pub const MAX_AGE: u8 = 80;

/// Tags offered by the interest picker, in display order.
pub const INTEREST_CATALOG: [&str; 20] = [
    "News",
    "Comedy",
    "Society",
    "Culture",
    "Business",
    "Sport",
    "Fashion",
    "Art",
    "Drama",
    "Emotion",
    "Anime",
    "Feminist",
    "Science",
    "Politics",
    "True Crime",
    "Tech",
    "Kids",
    "Film&Tv",
    "Travelling",
    "Nature",
];

/// Age as picked on the slider, always within 18..=80.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Age(u8);

impl Age {
    pub fn new(value: i64) -> Self {
        Self(value.clamp(MIN_AGE as i64, MAX_AGE as i64) as u8)
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for Age {
    fn default() -> Self {
        Self(MIN_AGE)
    }
}

impl fmt::Display for Age {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }
}

// Tokens never end up in logs
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// A row of the `profiles` table.
///
/// Every column but `id` may be absent when reading, in which case the form
/// falls back to its defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub work_as: Option<String>,
    #[serde(default)]
    pub looking_for: Option<String>,
    #[serde(default)]
    pub family_plan: Option<String>,
    #[serde(default)]
    pub relationship_status: Option<String>,
    #[serde(default)]
    pub texting_calling: Option<String>,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub tagline: Option<String>,
    #[serde(default)]
    pub interests: Option<Vec<String>>,
}

/// A row of the `profileurl` table, at most one per user.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PhotoReference {
    pub user_id: String,
    pub photo_url: String,
}

/// A file handed over by the picker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhotoFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl PhotoFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Extension taken from the file name, if it has one
    pub fn extension(&self) -> Option<&str> {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PiiRiskSummary {
    pub score: f64,
    pub level: String,
    pub summary: String,
}

/// Outcome of an analysis worth alerting the user about.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskReport {
    pub summary: String,
    pub pii: PiiRiskSummary,
}
