//! Drawing category registry and prompt generation.
//!
//! A category is an ordered list of [`FieldSpec`]s plus the name of the
//! field that identifies the drawing (model number for valves, drawing
//! number elsewhere). Categories are data, not code: prompts for both
//! classification and extraction are generated from the field list, so a
//! user can register a new product type at runtime and the pipeline
//! handles it with no code changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

/// Field-specific cleanup applied after generic parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeRule {
    /// Exact-match known codes are expanded to their canonical names
    /// (e.g. fluid code `HLP`).
    CodeSubstitution,
    /// Range expressions collapse to the upper bound with the unit
    /// re-appended (`40 TO 50 DEG C` → `50 DEG C`).
    RangeToMax,
}

/// One attribute expected on a category's datasheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub unit: Option<String>,
    pub rule: Option<NormalizeRule>,
}

impl FieldSpec {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_uppercase(), unit: None, rule: None }
    }

    pub fn with_unit(name: &str, unit: &str) -> Self {
        Self { name: name.to_uppercase(), unit: Some(unit.to_string()), rule: None }
    }

    pub fn with_rule(mut self, rule: NormalizeRule) -> Self {
        self.rule = Some(rule);
        self
    }
}

/// A named class of engineering drawing and its expected field list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    /// Field whose value identifies the drawing in the record table.
    pub identifier_field: String,
}

impl CategorySpec {
    pub fn new(name: &str, fields: Vec<FieldSpec>, identifier_field: &str) -> Self {
        Self {
            name: name.to_uppercase(),
            fields,
            identifier_field: identifier_field.to_uppercase(),
        }
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Registry of known categories, extensible at runtime.
///
/// Insertion order is preserved so classification prompts and exports stay
/// stable across runs.
pub struct Catalog {
    specs: HashMap<String, CategorySpec>,
    order: Vec<String>,
}

impl Catalog {
    /// Empty registry. Most callers want [`Catalog::with_builtins`].
    pub fn new() -> Self {
        Self { specs: HashMap::new(), order: Vec::new() }
    }

    /// Registry pre-loaded with the stock drawing types.
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register_category(builtin_cylinder());
        catalog.register_category(builtin_valve());
        catalog.register_category(builtin_gearbox());
        catalog
    }

    /// Add or replace a category definition. Names are case-normalized.
    pub fn register_category(&mut self, spec: CategorySpec) {
        let name = spec.name.clone();
        if self.specs.insert(name.clone(), spec).is_none() {
            self.order.push(name.clone());
        }
        tracing::debug!(category = %name, "Registered drawing category");
    }

    pub fn get(&self, name: &str) -> Result<&CategorySpec, ExtractionError> {
        self.specs
            .get(&name.to_uppercase())
            .ok_or_else(|| ExtractionError::UnknownCategory(name.to_string()))
    }

    /// Category names in registration order.
    pub fn category_names(&self) -> &[String] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::with_builtins()
    }
}

// ──────────────────────────────────────────────
// Prompt generation
// ──────────────────────────────────────────────

/// Instruction asking the model to name the drawing type with one exact
/// token from the known category list.
pub fn classification_prompt(catalog: &Catalog) -> String {
    let names = catalog.category_names();
    let mut listing = String::new();
    for (i, name) in names.iter().enumerate() {
        listing.push_str(&format!("{}. {}\n", i + 1, name));
    }
    format!(
        "Look at this engineering drawing and identify which one of these \
         component types it shows:\n{listing}\n\
         ONLY respond with one of these exact words: {}",
        names.join(", ")
    )
}

/// Extraction instruction generated from the category's field list.
///
/// The "leave blank, do not estimate" rule is the primary guard against
/// hallucinated values — the pipeline has no independent way to verify
/// what the model reads off the drawing.
pub fn extraction_prompt(spec: &CategorySpec) -> String {
    let mut format_block = String::new();
    for field in &spec.fields {
        match &field.unit {
            Some(unit) => format_block.push_str(&format!("{}: [value] {}\n", field.name, unit)),
            None => format_block.push_str(&format!("{}: [value]\n", field.name)),
        }
    }
    format!(
        "Analyze the {} engineering drawing and extract only the values that \
         are clearly visible in the image.\n\
         STRICT RULES:\n\
         1) If a value is missing or unclear, return an empty string. DO NOT estimate any values.\n\
         2) Convert values to the specified units where applicable.\n\
         3) Extract and return data in this format:\n{}",
        spec.name.to_lowercase(),
        format_block
    )
}

// ──────────────────────────────────────────────
// Built-in categories
// ──────────────────────────────────────────────

fn builtin_cylinder() -> CategorySpec {
    CategorySpec::new(
        "CYLINDER",
        vec![
            FieldSpec::new("CYLINDER ACTION"),
            FieldSpec::with_unit("BORE DIAMETER", "MM"),
            FieldSpec::with_unit("OUTSIDE DIAMETER", "MM"),
            FieldSpec::with_unit("ROD DIAMETER", "MM"),
            FieldSpec::with_unit("STROKE LENGTH", "MM"),
            FieldSpec::with_unit("CLOSE LENGTH", "MM"),
            FieldSpec::with_unit("OPEN LENGTH", "MM"),
            FieldSpec::with_unit("OPERATING PRESSURE", "BAR").with_rule(NormalizeRule::RangeToMax),
            FieldSpec::with_unit("OPERATING TEMPERATURE", "DEG C")
                .with_rule(NormalizeRule::RangeToMax),
            FieldSpec::new("MOUNTING"),
            FieldSpec::new("ROD END"),
            FieldSpec::new("FLUID").with_rule(NormalizeRule::CodeSubstitution),
            FieldSpec::new("DRAWING NUMBER"),
        ],
        "DRAWING NUMBER",
    )
}

fn builtin_valve() -> CategorySpec {
    CategorySpec::new(
        "VALVE",
        vec![
            FieldSpec::new("MODEL"),
            FieldSpec::new("CORRECT MODEL NO"),
            FieldSpec::with_unit("PRESSURE RATING", "BAR").with_rule(NormalizeRule::RangeToMax),
            FieldSpec::new("MAKE"),
            FieldSpec::new("DRAWING NUMBER"),
        ],
        "MODEL",
    )
}

fn builtin_gearbox() -> CategorySpec {
    CategorySpec::new(
        "GEARBOX",
        vec![
            FieldSpec::new("GEAR RATIO"),
            FieldSpec::new("SERVICE FACTOR"),
            FieldSpec::with_unit("INPUT POWER", "KW"),
            FieldSpec::new("SHAFT TYPES"),
            FieldSpec::new("NO OF SHAFT EXTENSIONS"),
            FieldSpec::new("GEARBOX ORIENTATION"),
            FieldSpec::new("DRAWING NUMBER"),
        ],
        "DRAWING NUMBER",
    )
}
