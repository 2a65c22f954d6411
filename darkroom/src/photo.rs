//! The working image of an editing session and the lock that guards it.

use parking_lot::FairMutex;
use uuid::Uuid;

use crate::error::{DecodeError, EditorError, InferenceError, Result};
use crate::image::{self, ImageFormat, PixelBuffer};
use crate::inference::{self, Classification, Model};
use crate::transform::Transform;

/// Opaque reference the host keeps for one uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhotoId(Uuid);

impl PhotoId {
    pub fn new() -> Self {
        PhotoId(Uuid::new_v4())
    }
}

impl Default for PhotoId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PhotoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for PhotoId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(PhotoId)
    }
}

/// Owns the decoded pixels of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Photo {
    buffer: PixelBuffer,
}

impl Photo {
    pub fn new(buffer: PixelBuffer) -> Self {
        Photo { buffer }
    }

    pub fn from_bytes(data: &[u8], mime_hint: Option<&str>) -> Result<Self, DecodeError> {
        image::decode(data, mime_hint).map(Photo::new)
    }

    pub fn to_bytes(&self, format: ImageFormat) -> Vec<u8> {
        image::encode(&self.buffer, format)
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    /// Swap in a new buffer, handing back the previous one.
    pub fn replace(&mut self, buffer: PixelBuffer) -> PixelBuffer {
        std::mem::replace(&mut self.buffer, buffer)
    }
}

/// Shared, lock-guarded [`Photo`].
///
/// Requests against one handle run one at a time: [`PhotoHandle::apply`]
/// waits its turn in arrival order, [`PhotoHandle::try_apply`] gives up with
/// [`EditorError::Busy`] instead. A transform computes its output from the
/// current buffer and swaps it in under the same lock, so readers see either
/// the old image or the new one.
#[derive(Debug)]
pub struct PhotoHandle {
    id: PhotoId,
    photo: FairMutex<Photo>,
}

impl PhotoHandle {
    pub fn new(photo: Photo) -> Self {
        PhotoHandle {
            id: PhotoId::new(),
            photo: FairMutex::new(photo),
        }
    }

    pub fn from_bytes(data: &[u8], mime_hint: Option<&str>) -> Result<Self, DecodeError> {
        Photo::from_bytes(data, mime_hint).map(PhotoHandle::new)
    }

    pub fn id(&self) -> PhotoId {
        self.id
    }

    /// Run `transform` with exclusive access, queueing behind earlier requests.
    pub fn apply(&self, transform: &Transform) -> Result<()> {
        self.apply_then(transform, |_| ())
    }

    /// Like [`apply`](Self::apply) but fails with `Busy` rather than waiting.
    pub fn try_apply(&self, transform: &Transform) -> Result<()> {
        self.try_apply_then(transform, |_| ())
    }

    /// Apply `transform`, then hand its output to `then` before releasing the lock.
    pub fn apply_then<R>(
        &self,
        transform: &Transform,
        then: impl FnOnce(&PixelBuffer) -> R,
    ) -> Result<R> {
        let mut photo = self.photo.lock();
        Self::apply_locked(self.id, &mut photo, transform)?;
        Ok(then(photo.buffer()))
    }

    pub fn try_apply_then<R>(
        &self,
        transform: &Transform,
        then: impl FnOnce(&PixelBuffer) -> R,
    ) -> Result<R> {
        let mut photo = self.photo.try_lock().ok_or(EditorError::Busy)?;
        Self::apply_locked(self.id, &mut photo, transform)?;
        Ok(then(photo.buffer()))
    }

    fn apply_locked(id: PhotoId, photo: &mut Photo, transform: &Transform) -> Result<()> {
        let next = transform.apply(photo.buffer())?;
        log::debug!("{id}: applied {transform}");
        photo.replace(next);
        Ok(())
    }

    /// Read the current buffer under the lock.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&PixelBuffer) -> R) -> R {
        f(self.photo.lock().buffer())
    }

    pub fn snapshot(&self) -> PixelBuffer {
        self.with_buffer(Clone::clone)
    }

    pub fn to_bytes(&self, format: ImageFormat) -> Vec<u8> {
        self.with_buffer(|buf| image::encode(buf, format))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.with_buffer(PixelBuffer::dimensions)
    }

    /// Classify the current image. Queues behind pending transforms like any reader.
    pub fn classify(&self, model: &Model) -> Result<Classification, InferenceError> {
        self.with_buffer(|buf| inference::classify(buf, model))
    }
}
