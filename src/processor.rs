//! The orchestrating facade: classify → extract → normalize → score.
//!
//! One drawing runs to completion before the next begins; the only
//! suspension points are the blocking HTTP round-trips. Failures still
//! leave a permanent `Failed` entry in the session table before the error
//! is returned, so callers see every attempt in their audit trail.

use crate::catalog::{classification_prompt, extraction_prompt, Catalog, CategorySpec};
use crate::classify::resolve_category;
use crate::client::{encode_image, VisionClient};
use crate::credentials::CredentialPool;
use crate::dispatch::dispatch;
use crate::error::ExtractionError;
use crate::normalize::{normalize, FieldRecord};
use crate::records::{DrawingRecordEntry, ProcessingStatus, Session};

/// What the consumer gets back for one processed drawing.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub category: String,
    pub drawing_id: String,
    pub record: FieldRecord,
    pub status: ProcessingStatus,
    pub extracted: usize,
    pub expected: usize,
    pub confidence: u8,
    /// `m/n` display string.
    pub count: String,
}

/// Drawing extraction pipeline over a vision client and credential pool.
///
/// Owns no session state — callers hold a [`Session`] and pass it in, so
/// several independent workflows can share one processor configuration.
pub struct DrawingProcessor<C: VisionClient> {
    client: C,
    pool: CredentialPool,
    catalog: Catalog,
}

impl<C: VisionClient> DrawingProcessor<C> {
    pub fn new(client: C, pool: CredentialPool, catalog: Catalog) -> Self {
        Self { client, pool, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Register a user-defined category at runtime.
    pub fn register_category(&mut self, spec: CategorySpec) {
        self.catalog.register_category(spec);
    }

    /// Process one drawing end to end.
    ///
    /// With `requested_category` set, classification is skipped and the
    /// named category's extraction contract is used directly. On any
    /// failure after the category is known, a `Failed` entry is appended
    /// before the error is returned.
    pub fn process(
        &mut self,
        session: &mut Session,
        image_bytes: &[u8],
        requested_category: Option<&str>,
    ) -> Result<ProcessOutcome, ExtractionError> {
        let image_data_url = encode_image(image_bytes);

        let category = match requested_category {
            Some(name) => self.catalog.get(name)?.name.clone(),
            None => self.classify(&image_data_url)?,
        };
        tracing::info!(category = %category, "Processing drawing");

        let index = session.begin(&category);
        let raw_text = match self.extract(&category, &image_data_url) {
            Ok(text) => text,
            Err(e) => {
                session.fail(index);
                return Err(e);
            }
        };

        let spec = self.catalog.get(&category)?;
        let record = normalize(&raw_text, spec);
        let entry = session.complete(index, spec, record.clone());

        Ok(ProcessOutcome {
            category,
            drawing_id: entry.drawing_id.clone(),
            record,
            status: entry.status,
            extracted: entry.extracted,
            expected: entry.expected,
            confidence: entry.confidence,
            count: entry.count(),
        })
    }

    /// Ask the model which known category the image shows.
    fn classify(&mut self, image_data_url: &str) -> Result<String, ExtractionError> {
        let prompt = classification_prompt(&self.catalog);
        let response = dispatch(&self.client, &mut self.pool, &prompt, image_data_url)?;
        resolve_category(&response, &self.catalog)
    }

    /// Run the category's extraction contract and return the raw text.
    fn extract(&mut self, category: &str, image_data_url: &str) -> Result<String, ExtractionError> {
        let prompt = extraction_prompt(self.catalog.get(category)?);
        dispatch(&self.client, &mut self.pool, &prompt, image_data_url)
    }

    /// Apply one user correction and return the rescored entry.
    pub fn apply_correction(
        &self,
        session: &mut Session,
        drawing_id: &str,
        field: &str,
        value: &str,
    ) -> Result<DrawingRecordEntry, ExtractionError> {
        session.apply_correction(&self.catalog, drawing_id, field, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockVisionClient;
    use crate::records::FeedbackDelta;

    fn pool(n: usize) -> CredentialPool {
        CredentialPool::new((0..n).map(|i| format!("sk-test-key-{i:04}")).collect()).unwrap()
    }

    fn processor(responses: Vec<Result<String, ExtractionError>>) -> DrawingProcessor<MockVisionClient> {
        DrawingProcessor::new(
            MockVisionClient::new(responses),
            pool(3),
            Catalog::with_builtins(),
        )
    }

    const VALVE_RESPONSE: &str = "\
MODEL: DN50-B
CORRECT MODEL NO: DN50-B-2
PRESSURE RATING: 250 BAR
MAKE: AUDCO
DRAWING NUMBER: V-1009";

    #[test]
    fn classify_then_extract_end_to_end() {
        let mut p = processor(vec![
            Ok("VALVE".into()),
            Ok(VALVE_RESPONSE.into()),
        ]);
        let mut session = Session::new();
        let outcome = p.process(&mut session, b"jpegbytes", None).unwrap();

        assert_eq!(outcome.category, "VALVE");
        assert_eq!(outcome.drawing_id, "DN50-B");
        assert_eq!(outcome.status, ProcessingStatus::Completed);
        assert_eq!(outcome.count, "5/5");
        assert_eq!(outcome.confidence, 100);
        assert_eq!(outcome.record["MAKE"], "AUDCO");
    }

    #[test]
    fn requested_category_skips_classification() {
        let p_responses = vec![Ok(VALVE_RESPONSE.into())];
        let mut p = processor(p_responses);
        let mut session = Session::new();
        let outcome = p.process(&mut session, b"jpegbytes", Some("valve")).unwrap();

        assert_eq!(outcome.category, "VALVE");
        assert_eq!(p.client.call_count(), 1, "no classification round-trip");
        let instruction = p.client.calls.lock().unwrap()[0].instruction.clone();
        assert!(instruction.contains("MODEL: [value]"));
    }

    #[test]
    fn unknown_requested_category_is_rejected_before_any_call() {
        let mut p = processor(vec![]);
        let mut session = Session::new();
        let err = p.process(&mut session, b"jpegbytes", Some("TURBINE")).unwrap_err();
        assert!(matches!(err, ExtractionError::UnknownCategory(_)));
        assert!(session.entries().is_empty());
    }

    #[test]
    fn verbose_classifier_response_still_resolves() {
        let mut p = processor(vec![
            Ok("The drawing shows a GEARBOX.".into()),
            Ok("GEAR RATIO: 20:1\nDRAWING NUMBER: G-7".into()),
        ]);
        let mut session = Session::new();
        let outcome = p.process(&mut session, b"jpegbytes", None).unwrap();
        assert_eq!(outcome.category, "GEARBOX");
        assert_eq!(outcome.count, "2/7");
        assert_eq!(outcome.confidence, 29); // round(100 * 2/7)
    }

    #[test]
    fn unclassifiable_image_fails_without_table_entry() {
        let mut p = processor(vec![Ok("a photograph of a dog".into())]);
        let mut session = Session::new();
        let err = p.process(&mut session, b"jpegbytes", None).unwrap_err();
        assert!(matches!(err, ExtractionError::UnclassifiedDrawing(_)));
        assert!(session.entries().is_empty(), "no category was ever established");
    }

    #[test]
    fn extraction_failure_leaves_failed_entry() {
        let mut p = processor(vec![
            Ok("CYLINDER".into()),
            Err(ExtractionError::ServerError { status: 500, body: "boom".into() }),
        ]);
        let mut session = Session::new();
        let err = p.process(&mut session, b"jpegbytes", None).unwrap_err();
        assert!(matches!(err, ExtractionError::ServerError { .. }));

        let entries = session.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ProcessingStatus::Failed);
        assert_eq!(entries[0].count(), "0/0");
        assert_eq!(entries[0].confidence, 0);
    }

    #[test]
    fn quota_on_classify_rotates_and_recovers() {
        let mut p = processor(vec![
            Err(ExtractionError::QuotaExceeded("429".into())),
            Ok("VALVE".into()),
            Ok(VALVE_RESPONSE.into()),
        ]);
        let mut session = Session::new();
        let outcome = p.process(&mut session, b"jpegbytes", None).unwrap();
        assert_eq!(outcome.category, "VALVE");

        let calls = p.client.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_ne!(calls[0].token, calls[1].token, "second attempt rotated keys");
    }

    #[test]
    fn pool_exhaustion_surfaces_and_fails_entry() {
        let mut p = processor(vec![
            Err(ExtractionError::QuotaExceeded("429".into())),
            Err(ExtractionError::QuotaExceeded("429".into())),
            Err(ExtractionError::QuotaExceeded("429".into())),
        ]);
        let mut session = Session::new();
        let err = p.process(&mut session, b"jpegbytes", Some("VALVE")).unwrap_err();
        assert!(matches!(err, ExtractionError::AllCredentialsExhausted));
        assert_eq!(session.entries()[0].status, ProcessingStatus::Failed);
    }

    #[test]
    fn correction_through_processor_rescores() {
        let mut p = processor(vec![Ok("MODEL: DN50-B\nMAKE: AUDCO".into())]);
        let mut session = Session::new();
        let outcome = p.process(&mut session, b"jpegbytes", Some("VALVE")).unwrap();
        assert_eq!(outcome.count, "2/5");

        let entry = p
            .apply_correction(&mut session, "DN50-B", "DRAWING NUMBER", "V-1")
            .unwrap();
        assert_eq!(entry.count(), "3/5");
        assert_eq!(session.feedback_history().len(), 1);
    }

    #[test]
    fn runtime_category_flows_through_whole_pipeline() {
        let mut p = processor(vec![
            Ok("LIFTING_RAM".into()),
            Ok("CAPACITY: 50 TON\nSTROKE: 200 MM\nDRAWING NUMBER: LR-3".into()),
        ]);
        p.register_category(CategorySpec::new(
            "LIFTING_RAM",
            vec![
                crate::catalog::FieldSpec::with_unit("CAPACITY", "TON"),
                crate::catalog::FieldSpec::with_unit("STROKE", "MM"),
                crate::catalog::FieldSpec::new("DRAWING NUMBER"),
            ],
            "DRAWING NUMBER",
        ));

        let mut session = Session::new();
        let outcome = p.process(&mut session, b"jpegbytes", None).unwrap();
        assert_eq!(outcome.category, "LIFTING_RAM");
        assert_eq!(outcome.drawing_id, "LR-3");
        assert_eq!(outcome.status, ProcessingStatus::Completed);

        // The classification prompt advertised the new category.
        let instruction = p.client.calls.lock().unwrap()[0].instruction.clone();
        assert!(instruction.contains("LIFTING_RAM"));
    }

    #[test]
    fn feedback_history_is_exposed() {
        let mut p = processor(vec![Ok(VALVE_RESPONSE.into())]);
        let mut session = Session::new();
        p.process(&mut session, b"jpegbytes", Some("VALVE")).unwrap();
        p.apply_correction(&mut session, "DN50-B", "MAKE", "REXROTH").unwrap();

        let history: Vec<&FeedbackDelta> = session.feedback_history().iter().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].original, "AUDCO");
        assert_eq!(history[0].corrected, "REXROTH");
    }
}
