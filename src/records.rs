//! Record lifecycle tracking, completeness scoring, and correction feedback.
//!
//! Every processed drawing gets a permanent [`DrawingRecordEntry`] — failed
//! extractions included, so the table is an audit trail of attempted work,
//! not just successes. Entries move `Processing → Completed | NeedsReview |
//! Failed` and never transition automatically after that; only a manual
//! correction can upgrade `NeedsReview` to `Completed`.
//!
//! The [`Session`] is the explicit context object owning all mutable state
//! (record table, extraction results, feedback history). Callers create one
//! and pass it into the processor — there are no globals.

use std::collections::HashMap;

use serde::Serialize;

use crate::catalog::{Catalog, CategorySpec};
use crate::error::ExtractionError;
use crate::normalize::FieldRecord;

/// Where a drawing is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processing,
    Completed,
    NeedsReview,
    Failed,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Processing => write!(f, "Processing.."),
            Self::Completed => write!(f, "Completed"),
            Self::NeedsReview => write!(f, "Needs Review!"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// One row in the processed-drawings table.
#[derive(Debug, Clone, Serialize)]
pub struct DrawingRecordEntry {
    pub category: String,
    pub drawing_id: String,
    pub status: ProcessingStatus,
    /// Non-empty fields among the category's expected list.
    pub extracted: usize,
    /// Total expected fields for the category.
    pub expected: usize,
    /// round(100 · extracted / expected), 0 for failed extractions.
    pub confidence: u8,
    /// RFC 3339 creation time.
    pub created_at: String,
}

impl DrawingRecordEntry {
    /// The `m/n` count string the consumer displays.
    pub fn count(&self) -> String {
        format!("{}/{}", self.extracted, self.expected)
    }
}

/// One user correction: the model said `original`, the user said `corrected`.
#[derive(Debug, Clone, Serialize)]
pub struct FeedbackDelta {
    pub drawing_id: String,
    pub field: String,
    pub original: String,
    pub corrected: String,
    /// RFC 3339 time the correction was saved.
    pub recorded_at: String,
}

/// Scoring rule shared by extraction completion and manual correction:
/// full extraction completes, anything less needs review. A category with
/// no expected fields is trivially complete (0 == 0).
fn score(extracted: usize, expected: usize) -> (ProcessingStatus, u8) {
    if extracted == expected {
        (ProcessingStatus::Completed, 100)
    } else {
        let pct = (100.0 * extracted as f64 / expected as f64).round() as u8;
        (ProcessingStatus::NeedsReview, pct)
    }
}

fn count_extracted(record: &FieldRecord, spec: &CategorySpec) -> usize {
    spec.field_names()
        .filter(|name| record.get(*name).map(|v| !v.trim().is_empty()).unwrap_or(false))
        .count()
}

/// Identifier values that do not actually identify anything.
fn is_unusable_identifier(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("unknown")
        || trimmed.contains('[')
}

/// Process-local session state: the growing record table, extraction
/// results keyed by drawing identifier, and the feedback history.
#[derive(Default)]
pub struct Session {
    entries: Vec<DrawingRecordEntry>,
    results: HashMap<String, FieldRecord>,
    feedback: Vec<FeedbackDelta>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a drawing. Returns the entry index used by
    /// [`complete`](Self::complete) / [`fail`](Self::fail).
    pub fn begin(&mut self, category: &str) -> usize {
        self.entries.push(DrawingRecordEntry {
            category: category.to_uppercase(),
            drawing_id: String::new(),
            status: ProcessingStatus::Processing,
            extracted: 0,
            expected: 0,
            confidence: 0,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
        self.entries.len() - 1
    }

    /// Finish a drawing with a normalized record: resolve its identifier,
    /// score completeness, and store the result.
    ///
    /// A duplicate identifier supersedes the stored result for lookup, but
    /// the earlier table entry is retained — the table is append-only.
    pub fn complete(
        &mut self,
        index: usize,
        spec: &CategorySpec,
        record: FieldRecord,
    ) -> &DrawingRecordEntry {
        let drawing_id = self.resolve_identifier(index, spec, &record);

        let extracted = count_extracted(&record, spec);
        let expected = spec.fields.len();
        let (status, confidence) = score(extracted, expected);

        self.results.insert(drawing_id.clone(), record);

        let entry = &mut self.entries[index];
        entry.drawing_id = drawing_id;
        entry.status = status;
        entry.extracted = extracted;
        entry.expected = expected;
        entry.confidence = confidence;

        tracing::info!(
            drawing = %entry.drawing_id,
            status = %entry.status,
            count = %entry.count(),
            "Drawing scored"
        );
        &self.entries[index]
    }

    /// Record a failed extraction. The entry stays in the table with a
    /// synthesized identifier so the attempt is never silently dropped.
    pub fn fail(&mut self, index: usize) -> &DrawingRecordEntry {
        let fallback = format!("{}_{}", self.entries[index].category, self.entries.len());
        let entry = &mut self.entries[index];
        entry.drawing_id = fallback;
        entry.status = ProcessingStatus::Failed;
        entry.extracted = 0;
        entry.expected = 0;
        entry.confidence = 0;
        &self.entries[index]
    }

    fn resolve_identifier(
        &self,
        index: usize,
        spec: &CategorySpec,
        record: &FieldRecord,
    ) -> String {
        let raw = record
            .get(&spec.identifier_field)
            .map(String::as_str)
            .unwrap_or_default();
        if is_unusable_identifier(raw) {
            // Sequence = current record count; each completion sees a
            // distinct count, so synthesized ids are unique per session.
            format!("{}_{}", self.entries[index].category, self.entries.len())
        } else {
            raw.trim().to_string()
        }
    }

    /// Apply one user correction to a stored record.
    ///
    /// Empty corrections are ignored — a field cannot be blanked back out
    /// through this path. Unchanged values produce no feedback. A real
    /// change records an immutable [`FeedbackDelta`] and rescores the
    /// drawing with the same rule as extraction, so filling in the last
    /// missing field upgrades `Needs Review!` to `Completed`.
    pub fn apply_correction(
        &mut self,
        catalog: &Catalog,
        drawing_id: &str,
        field: &str,
        value: &str,
    ) -> Result<DrawingRecordEntry, ExtractionError> {
        let field = field.to_uppercase();
        let corrected = value.trim();

        let entry_index = self
            .entries
            .iter()
            .rposition(|e| e.drawing_id == drawing_id)
            .ok_or_else(|| ExtractionError::RecordNotFound(drawing_id.to_string()))?;
        let record = self
            .results
            .get_mut(drawing_id)
            .ok_or_else(|| ExtractionError::RecordNotFound(drawing_id.to_string()))?;

        let original = record.get(&field).cloned().unwrap_or_default();
        if !corrected.is_empty() && corrected != original {
            record.insert(field.clone(), corrected.to_string());
            self.feedback.push(FeedbackDelta {
                drawing_id: drawing_id.to_string(),
                field: field.clone(),
                original,
                corrected: corrected.to_string(),
                recorded_at: chrono::Utc::now().to_rfc3339(),
            });
            tracing::info!(drawing = %drawing_id, field = %field, "Correction recorded");
        }

        let spec = catalog.get(&self.entries[entry_index].category)?;
        let record = &self.results[drawing_id];
        let extracted = count_extracted(record, spec);
        let (status, confidence) = score(extracted, spec.fields.len());

        let entry = &mut self.entries[entry_index];
        entry.extracted = extracted;
        entry.expected = spec.fields.len();
        entry.status = status;
        entry.confidence = confidence;
        Ok(entry.clone())
    }

    pub fn entries(&self) -> &[DrawingRecordEntry] {
        &self.entries
    }

    /// Stored result for a drawing, if one completed under this id.
    pub fn result(&self, drawing_id: &str) -> Option<&FieldRecord> {
        self.results.get(drawing_id)
    }

    pub fn feedback_history(&self) -> &[FeedbackDelta] {
        &self.feedback
    }

    /// A drawing's record as ordered `(field, value)` rows for export.
    /// The caller owns the CSV/TSV formatting; the complete key set
    /// guaranteed by normalization is what makes this well-defined.
    pub fn export_rows(
        &self,
        catalog: &Catalog,
        drawing_id: &str,
    ) -> Result<Vec<(String, String)>, ExtractionError> {
        let entry = self
            .entries
            .iter()
            .rfind(|e| e.drawing_id == drawing_id)
            .ok_or_else(|| ExtractionError::RecordNotFound(drawing_id.to_string()))?;
        let record = self
            .results
            .get(drawing_id)
            .ok_or_else(|| ExtractionError::RecordNotFound(drawing_id.to_string()))?;
        let spec = catalog.get(&entry.category)?;
        Ok(spec
            .field_names()
            .map(|name| (name.to_string(), record.get(name).cloned().unwrap_or_default()))
            .collect())
    }
}
