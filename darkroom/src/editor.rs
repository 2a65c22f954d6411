//! Host-facing boundary: transport-encoded requests in, display images out.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::EditorConfig;
use crate::error::{EditorError, Result};
use crate::image;
use crate::inference::{Classification, Labels, Model};
use crate::photo::{PhotoHandle, PhotoId};
use crate::transform::Transform;
use crate::transport;

/// Result of uploading an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub id: PhotoId,
    /// Re-encoded image as a data URL, ready for display.
    pub image: String,
}

/// Registry of the photos a host is editing.
///
/// Each photo is independent: requests on different ids run in parallel,
/// requests on the same id queue in arrival order.
#[derive(Debug, Default)]
pub struct Editor {
    config: EditorConfig,
    photos: RwLock<HashMap<PhotoId, Arc<PhotoHandle>>>,
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        Editor {
            config,
            photos: RwLock::default(),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// Decode an uploaded image (data URL or bare base64) and register it.
    pub fn upload_image(&self, data: &str) -> Result<Upload> {
        let payload = transport::decode_payload(data)?;
        let handle = Arc::new(PhotoHandle::from_bytes(
            &payload.bytes,
            payload.mime.as_deref(),
        )?);
        let id = handle.id();
        let image = handle.with_buffer(|buf| self.display(buf));

        let (width, height) = handle.dimensions();
        log::info!("{id}: uploaded {width}x{height} image");

        self.photos.write().insert(id, handle);
        Ok(Upload { id, image })
    }

    /// Look up the handle for `id`.
    pub fn handle(&self, id: PhotoId) -> Result<Arc<PhotoHandle>> {
        self.photos
            .read()
            .get(&id)
            .cloned()
            .ok_or(EditorError::UnknownPhoto(id))
    }

    /// Apply a named transform, e.g. `("colorize", &[0, 40, 110])`.
    pub fn apply(&self, id: PhotoId, name: &str, params: &[i32]) -> Result<String> {
        let transform = Transform::parse(name, params, &self.config)?;
        self.apply_transform(id, &transform)
    }

    /// Apply `transform`, waiting for earlier requests on the same photo.
    pub fn apply_transform(&self, id: PhotoId, transform: &Transform) -> Result<String> {
        let handle = self.handle(id)?;
        handle.apply_then(transform, |buf| self.display(buf))
    }

    /// Apply `transform` unless the photo is busy.
    pub fn try_apply_transform(&self, id: PhotoId, transform: &Transform) -> Result<String> {
        let handle = self.handle(id)?;
        handle.try_apply_then(transform, |buf| self.display(buf))
    }

    /// Current image as a display data URL.
    pub fn image(&self, id: PhotoId) -> Result<String> {
        let handle = self.handle(id)?;
        Ok(handle.with_buffer(|buf| self.display(buf)))
    }

    /// Drop a photo. Returns false if `id` was not registered.
    pub fn release(&self, id: PhotoId) -> bool {
        let removed = self.photos.write().remove(&id).is_some();
        if removed {
            log::info!("{id}: released");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.photos.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.read().is_empty()
    }

    /// Parse a transport-encoded model and optional label list.
    ///
    /// The returned model belongs to the caller and can be reused across photos.
    pub fn load_model(&self, model: &str, labels: Option<&str>) -> Result<Arc<Model>> {
        let payload = transport::decode_payload(model)?;
        let mut model = Model::from_bytes(&payload.bytes)?;

        if let Some(labels) = labels {
            let labels = Labels::parse(&transport::decode_text(labels)?);
            if labels.len() < model.num_classes() {
                log::warn!(
                    "Label list has {} entries for {} classes",
                    labels.len(),
                    model.num_classes()
                );
            }
            model = model.with_labels(labels);
        }

        Ok(Arc::new(model))
    }

    pub fn classify(&self, id: PhotoId, model: &Model) -> Result<Classification> {
        Ok(self.handle(id)?.classify(model)?)
    }

    /// Classify and resolve the label text from the model's labels.
    pub fn classify_labeled(&self, id: PhotoId, model: &Model) -> Result<(Classification, String)> {
        let result = self.classify(id, model)?;
        let empty = Labels::default();
        let label = result.label(model.labels().unwrap_or(&empty))?;
        Ok((result, label.to_string()))
    }

    fn display(&self, buf: &image::PixelBuffer) -> String {
        let format = self.config.output_format;
        transport::to_data_url(format.mime(), &image::encode(buf, format))
    }
}
