//! Resolving the classifier's free-text answer to a known category.
//!
//! The model is told to answer with one exact token, but verbose models
//! reply with things like "This is a CYLINDER drawing". Resolution runs
//! two passes: exact token match first, then substring containment with
//! longest-match disambiguation so a short category name (NUT) cannot
//! shadow a longer one it happens to appear inside.

use crate::catalog::Catalog;
use crate::error::ExtractionError;

/// Map a raw classifier response onto a registered category name.
pub fn resolve_category(response: &str, catalog: &Catalog) -> Result<String, ExtractionError> {
    let upper = response.trim().to_uppercase();

    // Pass 1: the well-behaved case — some token is exactly a category name.
    for token in upper.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_')) {
        if token.is_empty() {
            continue;
        }
        if let Some(name) = catalog.category_names().iter().find(|n| n.as_str() == token) {
            return Ok(name.clone());
        }
    }

    // Pass 2: containment, longest category name wins.
    let best = catalog
        .category_names()
        .iter()
        .filter(|name| upper.contains(name.as_str()))
        .max_by_key(|name| name.len());

    match best {
        Some(name) => {
            tracing::debug!(category = %name, "Resolved category by containment");
            Ok(name.clone())
        }
        None => Err(ExtractionError::UnclassifiedDrawing(response.trim().to_string())),
    }
}
