use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{ObjectUpload, RemoteGateway};
use crate::model::{PhotoReference, ProfileRow, Session, User};
use crate::{ProfileError, Result};

const LOG_PREFIX: &str = "[memory-gateway]";
const BASE_URL: &str = "memory://backend";

/// Gateway calls, as recorded by [`MemoryGateway`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CurrentUser,
    Session,
    FetchProfile,
    UpsertProfile,
    FetchPhotoReference,
    DeletePhotoReferences,
    InsertPhotoReference,
    UploadObject,
    CreateSignedUrl,
}

impl Operation {
    /// Whether the call changes data on the backend
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Operation::UpsertProfile
                | Operation::DeletePhotoReferences
                | Operation::InsertPhotoReference
                | Operation::UploadObject
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub cache_control: Duration,
}

#[derive(Default)]
struct MemoryData {
    user: Option<User>,
    session: Option<Session>,
    profiles: BTreeMap<String, ProfileRow>,
    photo_references: Vec<PhotoReference>,
    objects: BTreeMap<(String, String), StoredObject>,
    signed: u64,
    calls: Vec<Operation>,
    failing: HashSet<Operation>,
    latency: Duration,
}

/// In-process backend for offline development and tests.
///
/// Every call is recorded, can be made to fail, and can be slowed down
/// by a fixed latency (which follows the tokio clock, so paused-time
/// tests stay deterministic).
#[derive(Default)]
pub struct MemoryGateway {
    data: RwLock<MemoryData>,
}

impl MemoryGateway {
    pub fn signed_in(user: User, access_token: &str) -> Self {
        let gateway = Self::default();
        {
            let mut data = gateway.data();
            data.user = Some(user);
            data.session = Some(Session::new(access_token));
        }
        gateway
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        self.data().latency = latency;
        self
    }

    pub fn sign_out(&self) {
        let mut data = self.data();
        data.user = None;
        data.session = None;
    }

    /// Make every later call of `operation` fail.
    pub fn fail(&self, operation: Operation) {
        self.data().failing.insert(operation);
    }

    pub fn recover(&self, operation: Operation) {
        self.data().failing.remove(&operation);
    }

    pub fn seed_profile(&self, row: ProfileRow) {
        self.data().profiles.insert(row.id.clone(), row);
    }

    pub fn seed_photo_reference(&self, reference: PhotoReference) {
        self.data().photo_references.push(reference);
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.data().calls.clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.data()
            .calls
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    pub fn writes(&self) -> usize {
        self.data()
            .calls
            .iter()
            .filter(|op| op.is_write())
            .count()
    }

    pub fn profile(&self, user_id: &str) -> Option<ProfileRow> {
        self.data().profiles.get(user_id).cloned()
    }

    pub fn photo_references(&self, user_id: &str) -> Vec<PhotoReference> {
        self.data()
            .photo_references
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<StoredObject> {
        self.data()
            .objects
            .get(&(bucket.to_owned(), name.to_owned()))
            .cloned()
    }

    pub fn object_names(&self, bucket: &str) -> Vec<String> {
        self.data()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, name)| name.clone())
            .collect()
    }

    fn data(&self) -> RwLockWriteGuard<'_, MemoryData> {
        self.data
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, operation: Operation) -> (Duration, bool) {
        let mut data = self.data();
        data.calls.push(operation);
        (data.latency, data.failing.contains(&operation))
    }

    async fn begin(&self, operation: Operation) -> Result<()> {
        let (latency, failing) = self.record(operation);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if failing {
            log::debug!("{} {:?} rejected", LOG_PREFIX, operation);
            return Err(ProfileError::Gateway(
                "memory".to_owned(),
                format!("{:?} rejected", operation),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteGateway for MemoryGateway {
    async fn current_user(&self) -> Result<Option<User>> {
        self.begin(Operation::CurrentUser).await?;
        Ok(self.data().user.clone())
    }

    async fn session(&self) -> Result<Option<Session>> {
        self.begin(Operation::Session).await?;
        Ok(self.data().session.clone())
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>> {
        self.begin(Operation::FetchProfile).await?;
        Ok(self.profile(user_id))
    }

    async fn upsert_profile(&self, row: &ProfileRow) -> Result<()> {
        self.begin(Operation::UpsertProfile).await?;
        self.seed_profile(row.clone());
        Ok(())
    }

    async fn fetch_photo_reference(
        &self,
        user_id: &str,
    ) -> Result<Option<PhotoReference>> {
        self.begin(Operation::FetchPhotoReference)
            .await?;
        Ok(self
            .photo_references(user_id)
            .into_iter()
            .next())
    }

    async fn delete_photo_references(&self, user_id: &str) -> Result<()> {
        self.begin(Operation::DeletePhotoReferences)
            .await?;
        self.data()
            .photo_references
            .retain(|r| r.user_id != user_id);
        Ok(())
    }

    async fn insert_photo_reference(
        &self,
        reference: &PhotoReference,
    ) -> Result<()> {
        self.begin(Operation::InsertPhotoReference)
            .await?;
        self.seed_photo_reference(reference.clone());
        Ok(())
    }

    async fn upload_object(&self, upload: ObjectUpload<'_>) -> Result<()> {
        self.begin(Operation::UploadObject).await?;
        let key = (upload.bucket.to_owned(), upload.name.to_owned());
        let mut data = self.data();
        if data.objects.contains_key(&key) {
            return Err(ProfileError::Gateway(
                "memory".to_owned(),
                format!("object {} already exists", upload.name),
            ));
        }
        data.objects.insert(
            key,
            StoredObject {
                bytes: upload.bytes.to_vec(),
                content_type: upload.content_type.to_owned(),
                cache_control: upload.cache_control,
            },
        );
        Ok(())
    }

    async fn create_signed_url(
        &self,
        bucket: &str,
        name: &str,
        expires_in: Duration,
    ) -> Result<String> {
        self.begin(Operation::CreateSignedUrl).await?;
        let mut data = self.data();
        if !data
            .objects
            .contains_key(&(bucket.to_owned(), name.to_owned()))
        {
            return Err(ProfileError::Gateway(
                "memory".to_owned(),
                format!("object {} not found", name),
            ));
        }
        data.signed += 1;
        Ok(format!(
            "{}/storage/v1/object/sign/{}/{}?token=t{}&expires_in={}",
            BASE_URL,
            bucket,
            name,
            data.signed,
            expires_in.as_secs()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload<'a>(name: &'a str, bytes: &'a [u8]) -> ObjectUpload<'a> {
        ObjectUpload {
            bucket: "photos",
            name,
            bytes,
            content_type: "image/png",
            cache_control: Duration::from_secs(3600),
        }
    }

    #[tokio::test]
    async fn upload_never_overwrites() {
        let gateway = MemoryGateway::default();
        gateway
            .upload_object(upload("a.png", b"one"))
            .await
            .unwrap();
        let again = gateway
            .upload_object(upload("a.png", b"two"))
            .await;
        assert!(again.is_err());
        assert_eq!(gateway.object("photos", "a.png").unwrap().bytes, b"one");
    }

    #[tokio::test]
    async fn signed_url_requires_object() {
        let gateway = MemoryGateway::default();
        let expiry = Duration::from_secs(60);
        assert!(gateway
            .create_signed_url("photos", "missing.png", expiry)
            .await
            .is_err());

        gateway
            .upload_object(upload("a.png", b"one"))
            .await
            .unwrap();
        let url = gateway
            .create_signed_url("photos", "a.png", expiry)
            .await
            .unwrap();
        assert!(url.contains("/photos/a.png"));
        assert!(url.ends_with("expires_in=60"));
    }

    #[tokio::test]
    async fn replace_keeps_a_single_reference() {
        let gateway = MemoryGateway::default();
        for url in ["https://x/1", "https://x/2", "https://x/3"] {
            gateway
                .replace_photo_reference(&PhotoReference {
                    user_id: "u1".into(),
                    photo_url: url.into(),
                })
                .await
                .unwrap();
        }
        let refs = gateway.photo_references("u1");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].photo_url, "https://x/3");
        assert_eq!(gateway.count(Operation::DeletePhotoReferences), 3);
    }

    #[tokio::test]
    async fn failing_operations_are_recorded() {
        let gateway = MemoryGateway::signed_in(User::new("u1"), "token");
        gateway.fail(Operation::Session);

        assert!(gateway.session().await.is_err());
        assert_eq!(gateway.calls(), vec![Operation::Session]);

        gateway.recover(Operation::Session);
        assert!(gateway.session().await.unwrap().is_some());
        assert_eq!(gateway.writes(), 0);
    }

    #[tokio::test]
    async fn failed_delete_keeps_the_old_reference() {
        let gateway = MemoryGateway::signed_in(User::new("u1"), "token");
        gateway.seed_photo_reference(PhotoReference {
            user_id: "u1".into(),
            photo_url: "old".into(),
        });
        gateway.fail(Operation::DeletePhotoReferences);

        let result = gateway
            .replace_photo_reference(&PhotoReference {
                user_id: "u1".into(),
                photo_url: "new".into(),
            })
            .await;

        assert!(result.is_err());
        assert_eq!(gateway.count(Operation::InsertPhotoReference), 0);
        let refs = gateway.photo_references("u1");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].photo_url, "old");
    }
}
