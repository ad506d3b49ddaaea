//! Structured datasheet extraction from engineering drawings.
//!
//! Image bytes go to a remote vision-language model; the free-form answer
//! comes back as a validated field/value record with a completeness score.
//! The crate owns the orchestration: credential rotation across several
//! API keys, the per-category prompt/response contract, response
//! normalization, and the record lifecycle with user-correction feedback.
//!
//! Visual interpretation is fully delegated to the remote model — there is
//! no local OCR or geometry extraction here. Upload handling, PDF
//! rendering, storage, and export formatting are the caller's concern: the
//! caller supplies raw image bytes (and optionally a category) and gets
//! back a [`processor::ProcessOutcome`].
//!
//! ```no_run
//! use drawsheet::catalog::Catalog;
//! use drawsheet::client::OpenRouterClient;
//! use drawsheet::config::{self, ApiConfig};
//! use drawsheet::credentials::CredentialPool;
//! use drawsheet::processor::DrawingProcessor;
//! use drawsheet::records::Session;
//!
//! # fn main() -> Result<(), drawsheet::error::ExtractionError> {
//! let pool = CredentialPool::new(config::load_credentials_from_env()?)?;
//! let client = OpenRouterClient::new(ApiConfig::default())?;
//! let mut processor = DrawingProcessor::new(client, pool, Catalog::with_builtins());
//!
//! let mut session = Session::new();
//! let image = std::fs::read("drawing.jpg").unwrap();
//! let outcome = processor.process(&mut session, &image, None)?;
//! println!("{} {} {}%", outcome.drawing_id, outcome.status, outcome.confidence);
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod classify;
pub mod client;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod normalize;
pub mod processor;
pub mod records;

pub use catalog::{Catalog, CategorySpec, FieldSpec, NormalizeRule};
pub use client::{OpenRouterClient, VisionClient};
pub use config::ApiConfig;
pub use credentials::CredentialPool;
pub use error::ExtractionError;
pub use normalize::FieldRecord;
pub use processor::{DrawingProcessor, ProcessOutcome};
pub use records::{DrawingRecordEntry, FeedbackDelta, ProcessingStatus, Session};
