//! Bundle data model.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

pub const BUNDLE_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleContext {
    pub anonymized_text: String,
    pub structured_data: Option<Map<String, Value>>,
    pub metadata: BundleMetadata,
}

/// Everything sent to, or derived for, one upstream call.
#[derive(Debug, Clone, Serialize)]
pub struct BundlePayload {
    pub prompt: String,
    pub context: BundleContext,
}

impl BundlePayload {
    pub fn new(
        prompt: String,
        anonymized_text: String,
        structured_data: Option<Map<String, Value>>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            prompt,
            context: BundleContext {
                anonymized_text,
                structured_data,
                metadata: BundleMetadata {
                    request_id: Uuid::new_v4(),
                    timestamp,
                    version: BUNDLE_SCHEMA_VERSION.to_string(),
                },
            },
        }
    }

    /// Clears every text-bearing field. Metadata carries no user content and is kept.
    fn scrub(&mut self) {
        self.prompt = String::new();
        self.context.anonymized_text = String::new();
        self.context.structured_data = None;
    }

    #[cfg(test)]
    pub fn is_scrubbed(&self) -> bool {
        self.prompt.is_empty()
            && self.context.anonymized_text.is_empty()
            && self.context.structured_data.is_none()
    }
}

/// Handle to a registered bundle.
///
/// Clones share one payload, so scrubbing through the store is visible from
/// every outstanding handle.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    payload: Arc<Mutex<BundlePayload>>,
}

impl Bundle {
    pub(crate) fn new(
        id: Uuid,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        payload: BundlePayload,
    ) -> Self {
        Self {
            id,
            created_at,
            expires_at,
            payload: Arc::new(Mutex::new(payload)),
        }
    }

    /// Snapshot of the payload. Empty fields once destroyed.
    #[cfg(test)]
    pub fn payload(&self) -> BundlePayload {
        self.lock().clone()
    }

    pub fn prompt(&self) -> String {
        self.lock().prompt.clone()
    }

    pub fn request_id(&self) -> Uuid {
        self.lock().context.metadata.request_id
    }

    #[cfg(test)]
    pub fn is_scrubbed(&self) -> bool {
        self.lock().is_scrubbed()
    }

    pub(crate) fn scrub(&self) {
        self.lock().scrub();
    }

    fn lock(&self) -> MutexGuard<'_, BundlePayload> {
        self.payload.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
