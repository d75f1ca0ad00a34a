//! Core photo data model.

use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest caption accepted for a photo, in characters.
pub const CAPTION_MAX_CHARS: usize = 180;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A locally captured photo waiting to be committed remotely.
///
/// Owned by the upload queue from creation until the two-phase remote write
/// succeeds, at which point it is removed and destroyed. The payload is
/// carried as base64 text so the queue snapshot serializes to plain JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingUpload {
    /// Unique id, generated at creation and never reused.
    pub id: Uuid,
    pub caption: String,
    /// Base64-encoded image bytes.
    pub image_payload: String,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
}

impl PendingUpload {
    /// Wrap freshly captured image bytes with a new unique id.
    pub fn new(image: &[u8], caption: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            caption: caption.into(),
            image_payload: BASE64.encode(image),
            created_at: now_ms(),
        }
    }

    /// Decode the carried payload back into raw image bytes.
    pub fn image_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        BASE64.decode(&self.image_payload)
    }
}

/// A photo resolved from the couple's remote feed, ready for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPhoto {
    /// Remote-assigned record id, stable for the photo's lifetime.
    pub id: String,
    /// Object path the payload can be fetched from.
    pub image_path: String,
    pub caption: String,
    pub sender_id: String,
    pub created_at: i64,
    /// Effective expiry in epoch milliseconds (stored, or derived from
    /// `created_at` for legacy records).
    pub expires_at: i64,
    /// Identities that have downloaded this photo. Non-empty means the
    /// photo is permanently exempt from reaping.
    pub downloaded_by: BTreeSet<String>,
}

/// Object path for a photo payload within a couple's space.
pub fn photo_object_path(couple_id: &str, photo_id: Uuid) -> String {
    format!("couples/{couple_id}/{photo_id}.jpg")
}
