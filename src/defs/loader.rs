//! Definition-folder scanning and per-file parsing.
//!
//! The base folder holds `<stem>.policies.json` definition files directly;
//! subfolders whose names parse as locale tags hold `<stem>.strings.json`
//! resource files paired by stem. Parsing is strictly per file: every
//! cross-namespace reference stays a string until the catalog builder
//! resolves it against the merged namespace table.

use crate::defs::model::{
    DEFINITION_SCHEMA_VERSION, RawDefinitionFile, RawElement, RawStringsFile,
    STRINGS_SCHEMA_VERSION,
};
use crate::error::{PolicyError, Result};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

pub const DEFINITION_SUFFIX: &str = ".policies.json";
pub const STRINGS_SUFFIX: &str = ".strings.json";

/// Bundled contract for definition files; compiled once on first use.
const DEFINITION_SCHEMA: &str = include_str!("../../schema/policy_definitions.schema.json");

/// One parsed definition file plus its provenance.
#[derive(Debug, Clone)]
pub struct DefinitionSource {
    /// File-name base shared with the per-locale resource files.
    pub stem: String,
    pub path: PathBuf,
    pub raw: RawDefinitionFile,
}

/// Every definition file under a base folder, plus the locale subfolders
/// discovered next to them.
#[derive(Debug)]
pub struct LoadedDefinitions {
    pub base_dir: PathBuf,
    pub sources: Vec<DefinitionSource>,
    pub locales: BTreeSet<String>,
}

/// Scan `base` for definition files and locale subfolders.
///
/// Files may be discovered in any order; sources are sorted by stem so later
/// stages are deterministic. A folder with no definition files is a
/// definition error, not an empty catalog.
pub fn load_definition_folder(base: &Path) -> Result<LoadedDefinitions> {
    let entries = fs::read_dir(base).map_err(|err| {
        PolicyError::definition(base.display().to_string(), format!("reading folder: {err}"))
    })?;

    let mut sources = Vec::new();
    let mut locales = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|err| {
            PolicyError::definition(base.display().to_string(), format!("reading folder: {err}"))
        })?;
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_dir() {
            if is_locale_tag(file_name) {
                locales.insert(file_name.to_string());
            }
            continue;
        }
        if let Some(stem) = file_name.strip_suffix(DEFINITION_SUFFIX) {
            sources.push(parse_definition_file(&path, stem)?);
        }
    }

    if sources.is_empty() {
        return Err(PolicyError::definition(
            base.display().to_string(),
            format!("no *{DEFINITION_SUFFIX} files found"),
        ));
    }

    sources.sort_by(|a, b| a.stem.cmp(&b.stem));
    debug!(
        files = sources.len(),
        locales = locales.len(),
        base = %base.display(),
        "definition folder scanned"
    );
    Ok(LoadedDefinitions {
        base_dir: base.to_path_buf(),
        sources,
        locales,
    })
}

/// Parse and validate a single definition file.
pub fn parse_definition_file(path: &Path, stem: &str) -> Result<DefinitionSource> {
    let source_name = file_label(path);
    let data = fs::read_to_string(path)
        .map_err(|err| PolicyError::definition(&source_name, format!("reading file: {err}")))?;
    let value: Value = serde_json::from_str(&data)
        .map_err(|err| PolicyError::definition(&source_name, format!("invalid JSON: {err}")))?;

    if let Err(errors) = definition_schema().validate(&value) {
        let details = errors
            .map(|err| err.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(PolicyError::definition(
            &source_name,
            format!("schema validation failed: {details}"),
        ));
    }

    let raw: RawDefinitionFile = serde_json::from_value(value)
        .map_err(|err| PolicyError::definition(&source_name, err.to_string()))?;
    if raw.schema_version != DEFINITION_SCHEMA_VERSION {
        return Err(PolicyError::definition(
            &source_name,
            format!(
                "unsupported schema_version '{}', expected {DEFINITION_SCHEMA_VERSION}",
                raw.schema_version
            ),
        ));
    }

    check_file_invariants(&source_name, &raw)?;
    debug!(file = %source_name, namespace = %raw.namespace.name, "definition file parsed");
    Ok(DefinitionSource {
        stem: stem.to_string(),
        path: path.to_path_buf(),
        raw,
    })
}

/// Parse a resource file; the caller decides what a missing file means.
pub fn parse_strings_file(path: &Path) -> Result<RawStringsFile> {
    let source_name = file_label(path);
    let data = fs::read_to_string(path)
        .map_err(|err| PolicyError::definition(&source_name, format!("reading file: {err}")))?;
    let raw: RawStringsFile = serde_json::from_str(&data)
        .map_err(|err| PolicyError::definition(&source_name, err.to_string()))?;
    if raw.schema_version != STRINGS_SCHEMA_VERSION {
        return Err(PolicyError::definition(
            &source_name,
            format!(
                "unsupported schema_version '{}', expected {STRINGS_SCHEMA_VERSION}",
                raw.schema_version
            ),
        ));
    }
    Ok(raw)
}

/// `ll` or `ll-Suffix` shapes: a two/three-letter language part optionally
/// followed by dash-separated alphanumeric subtags.
pub fn is_locale_tag(name: &str) -> bool {
    let mut parts = name.split('-');
    let Some(language) = parts.next() else {
        return false;
    };
    if !(2..=3).contains(&language.len())
        || !language.chars().all(|c| c.is_ascii_alphabetic())
    {
        return false;
    }
    parts.all(|part| {
        (1..=8).contains(&part.len()) && part.chars().all(|c| c.is_ascii_alphanumeric())
    })
}

/// Language-only fallback of a locale tag: `fr-FR` -> `fr`.
pub fn language_of(locale: &str) -> &str {
    locale.split('-').next().unwrap_or(locale)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| path.display().to_string())
}

// Duplicate names and inverted bounds are wrong in a single file regardless
// of what the rest of the catalog contains, so they fail here rather than at
// merge time.
fn check_file_invariants(source_name: &str, raw: &RawDefinitionFile) -> Result<()> {
    let mut category_names = BTreeSet::new();
    for category in &raw.categories {
        if !category_names.insert(category.name.as_str()) {
            return Err(PolicyError::definition(
                source_name,
                format!("duplicate category '{}'", category.name),
            ));
        }
    }

    let mut policy_names = BTreeSet::new();
    for policy in &raw.policies {
        if !policy_names.insert(policy.name.as_str()) {
            return Err(PolicyError::definition(
                source_name,
                format!("duplicate policy '{}'", policy.name),
            ));
        }
        let mut element_ids = BTreeSet::new();
        for element in &policy.elements {
            if !element_ids.insert(element.id()) {
                return Err(PolicyError::definition(
                    source_name,
                    format!(
                        "policy '{}': duplicate element id '{}'",
                        policy.name,
                        element.id()
                    ),
                ));
            }
            check_element_bounds(source_name, &policy.name, element)?;
        }
    }

    if let Some(supported) = &raw.supported_on {
        let mut product_names = BTreeSet::new();
        for product in &supported.products {
            if !product_names.insert(product.name.as_str()) {
                return Err(PolicyError::definition(
                    source_name,
                    format!("duplicate product '{}'", product.name),
                ));
            }
        }
        let mut definition_names = BTreeSet::new();
        for definition in &supported.definitions {
            if !definition_names.insert(definition.name.as_str()) {
                return Err(PolicyError::definition(
                    source_name,
                    format!("duplicate supported-on definition '{}'", definition.name),
                ));
            }
        }
    }

    Ok(())
}

fn check_element_bounds(source_name: &str, policy: &str, element: &RawElement) -> Result<()> {
    let (id, min, max) = match element {
        RawElement::Decimal { id, min, max, .. } => (id, u64::from(*min), u64::from(*max)),
        RawElement::LongDecimal { id, min, max, .. } => (id, *min, *max),
        RawElement::Enum { id, items, .. } => {
            if items.is_empty() {
                return Err(PolicyError::definition(
                    source_name,
                    format!("policy '{policy}': enum element '{id}' has no items"),
                ));
            }
            let mut item_ids = BTreeSet::new();
            for item in items {
                if !item_ids.insert(item.id.as_str()) {
                    return Err(PolicyError::definition(
                        source_name,
                        format!(
                            "policy '{policy}': enum element '{id}' duplicates item '{}'",
                            item.id
                        ),
                    ));
                }
            }
            return Ok(());
        }
        _ => return Ok(()),
    };
    if min > max {
        return Err(PolicyError::definition(
            source_name,
            format!("policy '{policy}': element '{id}' has min {min} > max {max}"),
        ));
    }
    Ok(())
}

fn definition_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let value: Value =
            serde_json::from_str(DEFINITION_SCHEMA).expect("bundled schema is valid JSON");
        let leaked: &'static Value = Box::leak(Box::new(value));
        JSONSchema::compile(leaked).expect("bundled schema compiles")
    })
}
