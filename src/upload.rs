use std::future::Future;
use std::sync::{Arc, Mutex};

use image::ImageFormat;
use tokio_util::sync::CancellationToken;

use crate::gateway::{cancellable, FilePicker, ObjectUpload, RemoteGateway};
use crate::model::{PhotoFile, PhotoReference};
use crate::state::{Phase, SharedState};
use crate::{Config, ProfileError, Result, PHOTO_BUCKET};

const LOG_PREFIX: &str = "[upload]";

pub const UPLOAD_FAILED_NOTICE: &str = "Upload failed. Please try again.";

const OCTET_STREAM: &str = "application/octet-stream";

/// Owns the photo panel: picking a file, storing it, and pointing the
/// user's photo reference at it.
pub struct UploadController {
    gateway: Arc<dyn RemoteGateway>,
    picker: Arc<dyn FilePicker>,
    state: SharedState,
    config: Config,
    cancel: CancellationToken,
    last_stamp: Mutex<i64>,
}

impl UploadController {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        picker: Arc<dyn FilePicker>,
        state: SharedState,
        config: Config,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            picker,
            state,
            config,
            cancel,
            last_stamp: Mutex::new(0),
        }
    }

    /// Open the file picker.
    ///
    /// The picker is reset first, so choosing the file picked last time
    /// triggers a new upload.
    pub fn select_file(&self) -> Result<()> {
        let phase = self.state.phase();
        if !phase.is_idle() {
            return Err(ProfileError::Busy(phase));
        }
        self.picker.reset();
        self.picker.open();
        Ok(())
    }

    /// Upload a picked file and make it the displayed profile photo.
    ///
    /// Returns the signed URL of the stored photo. Every failure leaves a
    /// notice for the user and brings the screen back to idle.
    pub async fn on_file_chosen(&self, file: PhotoFile) -> Result<String> {
        self.state.enter_from_idle(Phase::Uploading)?;

        let result = self.upload(&file).await;
        if matches!(result, Err(ProfileError::Cancelled)) {
            log::debug!("{} screen closed, dropping upload", LOG_PREFIX);
            return result;
        }
        match &result {
            Ok(_) => {
                log::info!("{} {} uploaded successfully", LOG_PREFIX, file.name)
            }
            Err(e) => {
                log::error!("{} error during upload: {}", LOG_PREFIX, e);
                self.state.write(|state| {
                    state.notice = Some(UPLOAD_FAILED_NOTICE.to_owned())
                });
            }
        }

        if let Err(e) = self
            .state
            .transition(|phase| *phase == Phase::Uploading, Phase::Idle)
        {
            log::debug!("{} phase moved on during upload: {}", LOG_PREFIX, e);
        }
        result
    }

    async fn upload(&self, file: &PhotoFile) -> Result<String> {
        let (content_type, extension) = content_of(file);

        let user = self
            .guarded(self.gateway.current_user())
            .await?
            .ok_or(ProfileError::MissingSession)?;

        // Unique per upload, so storage never has to overwrite
        let name = format!("{}-{}.{}", user.id, self.next_stamp(), extension);
        self.guarded(self.gateway.upload_object(ObjectUpload {
            bucket: PHOTO_BUCKET,
            name: &name,
            bytes: &file.bytes,
            content_type,
            cache_control: self.config.upload_cache_control,
        }))
        .await?;

        let url = self
            .guarded(self.gateway.create_signed_url(
                PHOTO_BUCKET,
                &name,
                self.config.signed_url_expiry,
            ))
            .await?;
        self.state
            .write(|state| state.photo_url = Some(url.clone()));

        let reference = PhotoReference {
            user_id: user.id,
            photo_url: url.clone(),
        };
        match self
            .guarded(self.gateway.replace_photo_reference(&reference))
            .await
        {
            Ok(()) => {}
            Err(ProfileError::Cancelled) => return Err(ProfileError::Cancelled),
            // The photo is stored and shown already, only the pointer is stale
            Err(e) => log::error!(
                "{} error updating photo reference: {}",
                LOG_PREFIX,
                e
            ),
        }
        Ok(url)
    }

    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        cancellable(&self.cancel, call).await
    }

    /// Milliseconds since the epoch, strictly increasing across calls
    fn next_stamp(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = now.max(*last + 1);
        *last
    }
}

/// Content type and object extension of a picked file.
///
/// Sniffed bytes decide the content type when the format is known; formats
/// the decoder cannot sniff, like HEIC or SVG, are typed by their name.
fn content_of(file: &PhotoFile) -> (&'static str, String) {
    let named = file.extension().map(str::to_ascii_lowercase);
    match image::guess_format(&file.bytes) {
        Ok(format) => {
            let (content_type, extension) = describe(format);
            (content_type, named.unwrap_or_else(|| extension.to_owned()))
        }
        Err(_) => {
            let content_type = named
                .as_deref()
                .map(content_type_by_extension)
                .unwrap_or(OCTET_STREAM);
            log::debug!(
                "{} unknown image format in {}, sending as {}",
                LOG_PREFIX,
                file.name,
                content_type
            );
            (content_type, named.unwrap_or_else(|| "bin".to_owned()))
        }
    }
}

fn content_type_by_extension(extension: &str) -> &'static str {
    match extension {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        _ => OCTET_STREAM,
    }
}

fn describe(format: ImageFormat) -> (&'static str, &'static str) {
    match format {
        ImageFormat::Png => ("image/png", "png"),
        ImageFormat::Jpeg => ("image/jpeg", "jpg"),
        ImageFormat::Gif => ("image/gif", "gif"),
        ImageFormat::WebP => ("image/webp", "webp"),
        ImageFormat::Bmp => ("image/bmp", "bmp"),
        ImageFormat::Tiff => ("image/tiff", "tiff"),
        ImageFormat::Avif => ("image/avif", "avif"),
        _ => (OCTET_STREAM, "bin"),
    }
}
