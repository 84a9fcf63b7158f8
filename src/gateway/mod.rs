use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::model::{PhotoReference, ProfileRow, Session, User};
use crate::{ProfileError, Result};

pub mod memory;
pub mod rest;

/// A binary object headed for the storage area of the backend.
#[derive(Clone, Copy, Debug)]
pub struct ObjectUpload<'a> {
    pub bucket: &'a str,
    pub name: &'a str,
    pub bytes: &'a [u8],
    pub content_type: &'a str,
    pub cache_control: Duration,
}

/// Hosted backend: identity, profile tables and object storage.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// The signed in user, if any.
    async fn current_user(&self) -> Result<Option<User>>;

    /// The session of the signed in user, if any.
    async fn session(&self) -> Result<Option<Session>>;

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>>;

    /// Insert the row, or update it when one with the same `id` exists.
    async fn upsert_profile(&self, row: &ProfileRow) -> Result<()>;

    async fn fetch_photo_reference(
        &self,
        user_id: &str,
    ) -> Result<Option<PhotoReference>>;

    /// Remove every photo reference of the user.
    async fn delete_photo_references(&self, user_id: &str) -> Result<()>;

    async fn insert_photo_reference(
        &self,
        reference: &PhotoReference,
    ) -> Result<()>;

    /// Store an object. An existing object with the same name is an error.
    async fn upload_object(&self, upload: ObjectUpload<'_>) -> Result<()>;

    /// Issue a pre-authorized read URL for a stored object.
    async fn create_signed_url(
        &self,
        bucket: &str,
        name: &str,
        expires_in: Duration,
    ) -> Result<String>;

    /// Keep exactly one photo reference for the user: delete, then insert.
    ///
    /// Row level policies of the backend allow insert and delete but not
    /// update on this table.
    async fn replace_photo_reference(
        &self,
        reference: &PhotoReference,
    ) -> Result<()> {
        self.delete_photo_references(&reference.user_id)
            .await?;
        self.insert_photo_reference(reference).await
    }
}

/// Screens the profile screen can hand over to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Dashboard,
    Auth,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Dashboard => "/dashboard",
            Route::Auth => "/auth",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Navigation of the hosting application.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: Route);
}

/// The file input of the upload panel.
pub trait FilePicker: Send + Sync {
    /// Forget the previous selection so the same file fires again.
    fn reset(&self);

    fn open(&self);
}

/// Resolve `call` unless `token` is cancelled first, in which case the
/// call is dropped and its late result never observed.
pub(crate) async fn cancellable<T>(
    token: &CancellationToken,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ProfileError::Cancelled),
        result = call => result,
    }
}
