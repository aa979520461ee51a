//! Results reported by the project and server record stores.

use serde::Serialize;

use crate::error::Result;

/// A record written by a single create.
#[derive(Debug, Clone)]
pub struct CreateResult<T> {
    pub id: String,
    pub entity: T,
}

/// An object spec creates one record, an array spec creates many.
#[derive(Debug, Clone)]
pub enum CreateOutput<T> {
    Single(CreateResult<T>),
    Bulk(BatchResult),
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MergeOutput {
    Single(MergeResult),
    Bulk(BatchResult),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub id: String,
    pub updated_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Created,
    Updated,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-item outcome of a bulk create or merge. One bad item never stops the rest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub created: u32,
    pub updated: u32,
    pub skipped: u32,
    pub errors: u32,
    pub items: Vec<BatchItem>,
}

impl BatchResult {
    pub fn record(&mut self, id: String, outcome: Result<ItemStatus>) {
        let (status, error) = match outcome {
            Ok(status) => (status, None),
            Err(err) => (ItemStatus::Error, Some(err.message)),
        };

        match status {
            ItemStatus::Created => self.created += 1,
            ItemStatus::Updated => self.updated += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Error => self.errors += 1,
        }
        self.items.push(BatchItem { id, status, error });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}
