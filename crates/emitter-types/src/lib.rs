use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Largest number of entries a queue accepts in a single batch call.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Name of the only field an emission request must carry.
pub const SECONDS_TO_RUN: &str = "secondsToRun";

/// Reasons an inbound request body is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("required parameter secondsToRun not found")]
    MissingSecondsToRun,
    #[error("parameter secondsToRun must be a number, got {0}")]
    NonNumericSecondsToRun(String),
}

/// A single emission run, as requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionRequest {
    pub seconds_to_run: f64,
}

impl EmissionRequest {
    /// Parse a request body of the form `{ "secondsToRun": <number> }`.
    ///
    /// Bodies that are not a JSON object, or that lack the field, are rejected
    /// with [`ValidationError::MissingSecondsToRun`]. A present but non-numeric
    /// value is rejected with [`ValidationError::NonNumericSecondsToRun`].
    /// Bytes that are not valid UTF-8 count as a body without the field.
    pub fn parse(body: impl AsRef<[u8]>) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_slice(body.as_ref())
            .map_err(|_| ValidationError::MissingSecondsToRun)?;

        let seconds = value
            .as_object()
            .and_then(|object| object.get(SECONDS_TO_RUN))
            .ok_or(ValidationError::MissingSecondsToRun)?;

        let seconds_to_run = seconds
            .as_f64()
            .ok_or_else(|| ValidationError::NonNumericSecondsToRun(seconds.to_string()))?;

        Ok(Self { seconds_to_run })
    }

    /// How long each worker keeps sending.
    ///
    /// Zero and negative values map to [`Duration::ZERO`]; values too large to
    /// represent saturate at [`Duration::MAX`].
    pub fn duration(&self) -> Duration {
        if self.seconds_to_run <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.seconds_to_run).unwrap_or(Duration::MAX)
    }
}

/// One message inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    /// Identifier, unique within its batch
    pub id: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("a batch holds between 1 and 10 entries, got {0}")]
    InvalidSize(usize),
    #[error("duplicate entry id {0} in batch")]
    DuplicateId(String),
}

/// An immutable group of entries sent to the queue in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<MessageEntry>", into = "Vec<MessageEntry>")]
pub struct MessageBatch {
    entries: Vec<MessageEntry>,
}

impl MessageBatch {
    /// A full batch: [`MAX_BATCH_ENTRIES`] copies of `payload` with ids `"0"` to `"9"`.
    pub fn uniform(payload: &str) -> Self {
        Self {
            entries: positional_entries(payload, MAX_BATCH_ENTRIES),
        }
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn positional_entries(payload: &str, count: usize) -> Vec<MessageEntry> {
    (0..count)
        .map(|i| MessageEntry {
            id: i.to_string(),
            body: payload.to_string(),
        })
        .collect()
}

impl TryFrom<Vec<MessageEntry>> for MessageBatch {
    type Error = BatchError;

    fn try_from(entries: Vec<MessageEntry>) -> Result<Self, Self::Error> {
        if entries.is_empty() || entries.len() > MAX_BATCH_ENTRIES {
            return Err(BatchError::InvalidSize(entries.len()));
        }
        for (i, entry) in entries.iter().enumerate() {
            if entries[..i].iter().any(|other| other.id == entry.id) {
                return Err(BatchError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { entries })
    }
}

impl From<MessageBatch> for Vec<MessageEntry> {
    fn from(batch: MessageBatch) -> Self {
        batch.entries
    }
}
