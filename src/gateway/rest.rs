use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL, CONTENT_TYPE,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{ObjectUpload, RemoteGateway};
use crate::model::{PhotoReference, ProfileRow, Session, User};
use crate::{ProfileError, Result, PHOTO_REFERENCE_TABLE, PROFILES_TABLE};

const LOG_PREFIX: &str = "[rest-gateway]";

const PROFILE_COLUMNS: &str = "id,full_name,work_as,looking_for,family_plan,relationship_status,texting_calling,age,tagline,interests";
const PHOTO_REFERENCE_COLUMNS: &str = "user_id,photo_url";

// Makes the table endpoint answer with a single object, or 406 when
// there is no matching row
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// [`RemoteGateway`] speaking the HTTP API of the hosted backend:
/// `auth/v1` for identity, `rest/v1` for tables and `storage/v1` for
/// objects.
pub struct RestGateway {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    session: RwLock<Option<Session>>,
}

impl RestGateway {
    /// Create a gateway for the project at `base_url`, authenticated with
    /// the public `api_key`. No user is signed in until a session is set.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut header = HeaderMap::new();
        header.insert(
            "apikey",
            HeaderValue::from_str(api_key).map_err(|_| ProfileError::Parse)?,
        );
        let client = reqwest::Client::builder()
            .default_headers(header)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_owned(),
            session: RwLock::new(None),
        })
    }

    pub fn with_session(self, session: Session) -> Self {
        self.set_session(Some(session));
        self
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self
            .session
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session;
    }

    fn current_session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProfileError::Parse)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn table(&self, table: &str, filter: (&str, &str)) -> Result<Url> {
        let mut url = self.endpoint(&["rest", "v1", table])?;
        url.query_pairs_mut()
            .append_pair(filter.0, &format!("eq.{}", filter.1));
        Ok(url)
    }

    /// Requests carry the user token when signed in, the api key otherwise
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let token = self
            .current_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.api_key.clone());
        self.client
            .request(method, url)
            .bearer_auth(token)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        log::warn!("{} request failed with {}: {}", LOG_PREFIX, status, body);
        Err(ProfileError::Status(status.as_u16(), body))
    }

    async fn fetch_single<T>(
        &self,
        table: &str,
        filter: (&str, &str),
        columns: &str,
    ) -> Result<Option<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut url = self.table(table, filter)?;
        url.query_pairs_mut()
            .append_pair("select", columns);

        let response = self
            .request(Method::GET, url)
            .header(ACCEPT, SINGLE_OBJECT)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_ACCEPTABLE {
            return Ok(None);
        }
        let row = Self::check(response).await?.json().await?;
        Ok(Some(row))
    }
}

#[async_trait]
impl RemoteGateway for RestGateway {
    async fn current_user(&self) -> Result<Option<User>> {
        if self.current_session().is_none() {
            return Ok(None);
        }
        let url = self.endpoint(&["auth", "v1", "user"])?;
        let response = self.request(Method::GET, url).send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                log::info!("{} session is no longer valid", LOG_PREFIX);
                Ok(None)
            }
            _ => Ok(Some(Self::check(response).await?.json().await?)),
        }
    }

    async fn session(&self) -> Result<Option<Session>> {
        Ok(self.current_session())
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.fetch_single(PROFILES_TABLE, ("id", user_id), PROFILE_COLUMNS)
            .await
    }

    async fn upsert_profile(&self, row: &ProfileRow) -> Result<()> {
        let url = self.endpoint(&["rest", "v1", PROFILES_TABLE])?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await?;
        Self::check(response).await?;
        log::info!("{} profile {} saved", LOG_PREFIX, row.id);
        Ok(())
    }

    async fn fetch_photo_reference(
        &self,
        user_id: &str,
    ) -> Result<Option<PhotoReference>> {
        self.fetch_single(
            PHOTO_REFERENCE_TABLE,
            ("user_id", user_id),
            PHOTO_REFERENCE_COLUMNS,
        )
        .await
    }

    async fn delete_photo_references(&self, user_id: &str) -> Result<()> {
        let url = self.table(PHOTO_REFERENCE_TABLE, ("user_id", user_id))?;
        let response = self.request(Method::DELETE, url).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn insert_photo_reference(
        &self,
        reference: &PhotoReference,
    ) -> Result<()> {
        let url = self.endpoint(&["rest", "v1", PHOTO_REFERENCE_TABLE])?;
        let response = self
            .request(Method::POST, url)
            .header("Prefer", "return=minimal")
            .json(reference)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn upload_object(&self, upload: ObjectUpload<'_>) -> Result<()> {
        let url =
            self.endpoint(&["storage", "v1", "object", upload.bucket, upload.name])?;
        let response = self
            .request(Method::POST, url)
            .header(
                CACHE_CONTROL,
                format!("max-age={}", upload.cache_control.as_secs()),
            )
            .header(CONTENT_TYPE, upload.content_type)
            .header("x-upsert", "false")
            .body(upload.bytes.to_vec())
            .send()
            .await?;
        Self::check(response).await?;
        log::info!(
            "{} stored {} bytes as {}/{}",
            LOG_PREFIX,
            upload.bytes.len(),
            upload.bucket,
            upload.name
        );
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        name: &str,
        expires_in: Duration,
    ) -> Result<String> {
        let url =
            self.endpoint(&["storage", "v1", "object", "sign", bucket, name])?;
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "expiresIn": expires_in.as_secs() }))
            .send()
            .await?;
        let signed: SignedUrlResponse =
            Self::check(response).await?.json().await?;

        // The path comes back relative to the storage endpoint
        let relative = signed.signed_url.trim_start_matches('/');
        let relative = relative
            .strip_prefix("storage/v1/")
            .unwrap_or(relative);
        let full = self
            .base_url
            .join(&format!("storage/v1/{}", relative))?;
        Ok(full.to_string())
    }
}
