//! Element codec: the closed variant set of policy elements and the
//! per-variant mapping between user tokens, typed values, and store entries.
//!
//! Three directions per variant: `parse_tokens` (user tokens -> typed value),
//! `write_ops` (typed value -> staged store writes), and `read_value` (store
//! snapshot -> typed value). `to_tokens` inverts `parse_tokens` exactly.
//! Nothing here coerces silently; every violation is a typed error carrying
//! the element id and the offending token.

use crate::error::{PolicyError, Result};
use crate::store::{PolicySnapshot, StoreOp, StoreValue};

/// A typed element value as supplied by the user or decoded from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    Bool(bool),
    Decimal(u32),
    LongDecimal(u64),
    Text(String),
    MultiText(Vec<String>),
    /// Selected item id.
    Enum(String),
    List(Vec<ListEntry>),
}

/// One list entry; `name` is set only in explicit-pairs mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: Option<String>,
    pub value: String,
}

impl ListEntry {
    pub fn bare(value: impl Into<String>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    pub fn pair(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            value: value.into(),
        }
    }
}

/// Outcome of default-value derivation when Enabling without explicit input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// Use this value.
    Value(ElementValue),
    /// Optional element with no safe default; stage nothing for it.
    Skip,
    /// Required element with no safe default; the transition must fail.
    Missing,
}

/// A fully resolved store record from a definition file: key and value name
/// defaults are already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreRecord {
    pub key: String,
    pub value_name: String,
    pub value: StoreValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BooleanElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    /// Written when true; empty means the implicit `u32 1`.
    pub on_true: Vec<StoreRecord>,
    /// Written when false; empty means delete-the-entry, never write-zero.
    pub on_false: Vec<StoreRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub min: u32,
    pub max: u32,
    pub store_as_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongDecimalElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub min: u64,
    pub max: u64,
    pub store_as_text: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub max_length: Option<u32>,
    pub expandable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiTextElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumElement {
    pub id: String,
    pub key: String,
    pub value_name: String,
    pub required: bool,
    pub items: Vec<EnumItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub id: String,
    pub display_key: String,
    pub value: StoreValue,
    pub subvalues: Vec<StoreRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListElement {
    pub id: String,
    pub key: String,
    pub required: bool,
    pub explicit_pairs: bool,
}

/// Closed set of element variants; dispatch is a match on the tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyElement {
    Boolean(BooleanElement),
    Decimal(DecimalElement),
    LongDecimal(LongDecimalElement),
    Text(TextElement),
    MultiText(MultiTextElement),
    Enum(EnumElement),
    List(ListElement),
}

impl PolicyElement {
    pub fn id(&self) -> &str {
        match self {
            Self::Boolean(e) => &e.id,
            Self::Decimal(e) => &e.id,
            Self::LongDecimal(e) => &e.id,
            Self::Text(e) => &e.id,
            Self::MultiText(e) => &e.id,
            Self::Enum(e) => &e.id,
            Self::List(e) => &e.id,
        }
    }

    pub fn required(&self) -> bool {
        match self {
            Self::Boolean(e) => e.required,
            Self::Decimal(e) => e.required,
            Self::LongDecimal(e) => e.required,
            Self::Text(e) => e.required,
            Self::MultiText(e) => e.required,
            Self::Enum(e) => e.required,
            Self::List(e) => e.required,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Boolean(e) => &e.key,
            Self::Decimal(e) => &e.key,
            Self::LongDecimal(e) => &e.key,
            Self::Text(e) => &e.key,
            Self::MultiText(e) => &e.key,
            Self::Enum(e) => &e.key,
            Self::List(e) => &e.key,
        }
    }

    /// Short variant name for diagnostics and the CLI `show` rendering.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Decimal(_) => "decimal",
            Self::LongDecimal(_) => "long_decimal",
            Self::Text(_) => "text",
            Self::MultiText(_) => "multi_text",
            Self::Enum(_) => "enum",
            Self::List(_) => "list",
        }
    }

    /// Every store key this element can touch, for snapshot collection.
    pub fn touched_keys(&self) -> Vec<String> {
        let mut keys = vec![self.key().to_string()];
        match self {
            Self::Boolean(e) => {
                keys.extend(e.on_true.iter().map(|r| r.key.clone()));
                keys.extend(e.on_false.iter().map(|r| r.key.clone()));
            }
            Self::Enum(e) => {
                for item in &e.items {
                    keys.extend(item.subvalues.iter().map(|r| r.key.clone()));
                }
            }
            _ => {}
        }
        keys
    }

    /// Translate user tokens into this element's typed value.
    pub fn parse_tokens(&self, tokens: &[String]) -> Result<ElementValue> {
        match self {
            Self::Boolean(e) => {
                let token = single_token(&e.id, tokens)?;
                if token.eq_ignore_ascii_case("true") {
                    Ok(ElementValue::Bool(true))
                } else if token.eq_ignore_ascii_case("false") {
                    Ok(ElementValue::Bool(false))
                } else {
                    Err(PolicyError::type_mismatch(&e.id, "'true' or 'false'", token))
                }
            }
            Self::Decimal(e) => {
                let token = single_token(&e.id, tokens)?;
                let value: u32 = token.parse().map_err(|_| {
                    PolicyError::type_mismatch(&e.id, "unsigned integer", token)
                })?;
                check_range(&e.id, u64::from(value), u64::from(e.min), u64::from(e.max))?;
                Ok(ElementValue::Decimal(value))
            }
            Self::LongDecimal(e) => {
                let token = single_token(&e.id, tokens)?;
                let value: u64 = token.parse().map_err(|_| {
                    PolicyError::type_mismatch(&e.id, "unsigned integer", token)
                })?;
                check_range(&e.id, value, e.min, e.max)?;
                Ok(ElementValue::LongDecimal(value))
            }
            Self::Text(e) => {
                let token = single_token(&e.id, tokens)?;
                if e.required && token.is_empty() {
                    return Err(PolicyError::type_mismatch(
                        &e.id,
                        "non-empty string",
                        token,
                    ));
                }
                if let Some(max) = e.max_length {
                    if token.chars().count() as u32 > max {
                        return Err(PolicyError::type_mismatch(
                            &e.id,
                            format!("string of at most {max} characters"),
                            token,
                        ));
                    }
                }
                Ok(ElementValue::Text(token.to_string()))
            }
            // Ordered sequence preserved as-is, including empty trailing
            // entries.
            Self::MultiText(_) => Ok(ElementValue::MultiText(tokens.to_vec())),
            Self::Enum(e) => {
                let token = single_token(&e.id, tokens)?;
                if e.items.iter().any(|item| item.id == token) {
                    Ok(ElementValue::Enum(token.to_string()))
                } else {
                    Err(PolicyError::unknown_item(&e.id, token))
                }
            }
            Self::List(e) => {
                let mut entries = Vec::with_capacity(tokens.len());
                for token in tokens {
                    if e.explicit_pairs {
                        let Some((name, value)) = token.split_once('=') else {
                            return Err(PolicyError::type_mismatch(
                                &e.id,
                                "name=value pair",
                                token,
                            ));
                        };
                        entries.push(ListEntry::pair(name, value));
                    } else {
                        entries.push(ListEntry::bare(token.clone()));
                    }
                }
                Ok(ElementValue::List(entries))
            }
        }
    }

    /// Inverse of `parse_tokens`.
    pub fn to_tokens(&self, value: &ElementValue) -> Result<Vec<String>> {
        match (self, value) {
            (Self::Boolean(_), ElementValue::Bool(v)) => Ok(vec![v.to_string()]),
            (Self::Decimal(_), ElementValue::Decimal(v)) => Ok(vec![v.to_string()]),
            (Self::LongDecimal(_), ElementValue::LongDecimal(v)) => Ok(vec![v.to_string()]),
            (Self::Text(_), ElementValue::Text(v)) => Ok(vec![v.clone()]),
            (Self::MultiText(_), ElementValue::MultiText(v)) => Ok(v.clone()),
            (Self::Enum(_), ElementValue::Enum(v)) => Ok(vec![v.clone()]),
            (Self::List(e), ElementValue::List(entries)) => Ok(entries
                .iter()
                .map(|entry| match (&entry.name, e.explicit_pairs) {
                    (Some(name), _) => format!("{name}={}", entry.value),
                    (None, _) => entry.value.clone(),
                })
                .collect()),
            _ => Err(self.variant_mismatch(value)),
        }
    }

    /// Default used when Enabling without explicit input for this element.
    pub fn default_value(&self) -> DefaultValue {
        match self {
            Self::Boolean(_) => DefaultValue::Value(ElementValue::Bool(false)),
            Self::Decimal(e) => DefaultValue::Value(ElementValue::Decimal(e.min)),
            Self::LongDecimal(e) => DefaultValue::Value(ElementValue::LongDecimal(e.min)),
            Self::Text(e) => {
                if e.required {
                    DefaultValue::Missing
                } else {
                    DefaultValue::Value(ElementValue::Text(String::new()))
                }
            }
            Self::MultiText(e) => {
                if e.required {
                    DefaultValue::Missing
                } else {
                    DefaultValue::Value(ElementValue::MultiText(Vec::new()))
                }
            }
            Self::Enum(e) => {
                if e.required {
                    DefaultValue::Missing
                } else {
                    DefaultValue::Skip
                }
            }
            Self::List(e) => {
                if e.required {
                    DefaultValue::Missing
                } else {
                    DefaultValue::Skip
                }
            }
        }
    }

    /// Staged store writes for this element's value, in store order.
    pub fn write_ops(&self, value: &ElementValue) -> Result<Vec<StoreOp>> {
        match (self, value) {
            (Self::Boolean(e), ElementValue::Bool(true)) => {
                if e.on_true.is_empty() {
                    Ok(vec![StoreOp::write(
                        &e.key,
                        &e.value_name,
                        StoreValue::U32(1),
                    )])
                } else {
                    Ok(record_writes(&e.on_true))
                }
            }
            (Self::Boolean(e), ElementValue::Bool(false)) => {
                if e.on_false.is_empty() {
                    // Asymmetric by contract: absence is the false encoding.
                    Ok(vec![StoreOp::delete(&e.key, &e.value_name)])
                } else {
                    Ok(record_writes(&e.on_false))
                }
            }
            (Self::Decimal(e), ElementValue::Decimal(v)) => {
                check_range(&e.id, u64::from(*v), u64::from(e.min), u64::from(e.max))?;
                let value = if e.store_as_text {
                    StoreValue::Text(v.to_string())
                } else {
                    StoreValue::U32(*v)
                };
                Ok(vec![StoreOp::write(&e.key, &e.value_name, value)])
            }
            (Self::LongDecimal(e), ElementValue::LongDecimal(v)) => {
                check_range(&e.id, *v, e.min, e.max)?;
                let value = if e.store_as_text {
                    StoreValue::Text(v.to_string())
                } else {
                    StoreValue::U64(*v)
                };
                Ok(vec![StoreOp::write(&e.key, &e.value_name, value)])
            }
            (Self::Text(e), ElementValue::Text(v)) => {
                let value = if e.expandable {
                    StoreValue::ExpandText(v.clone())
                } else {
                    StoreValue::Text(v.clone())
                };
                Ok(vec![StoreOp::write(&e.key, &e.value_name, value)])
            }
            (Self::MultiText(e), ElementValue::MultiText(v)) => Ok(vec![StoreOp::write(
                &e.key,
                &e.value_name,
                StoreValue::MultiText(v.clone()),
            )]),
            (Self::Enum(e), ElementValue::Enum(selected)) => {
                let item = e
                    .items
                    .iter()
                    .find(|item| item.id == *selected)
                    .ok_or_else(|| PolicyError::unknown_item(&e.id, selected.clone()))?;
                let mut ops = vec![StoreOp::write(
                    &e.key,
                    &e.value_name,
                    item.value.clone(),
                )];
                ops.extend(record_writes(&item.subvalues));
                Ok(ops)
            }
            (Self::List(e), ElementValue::List(entries)) => {
                // Rewriting a list always starts from a purged key so stale
                // entries from a longer previous list cannot survive.
                let mut ops = vec![StoreOp::purge(&e.key)];
                for (index, entry) in entries.iter().enumerate() {
                    let name = match (&entry.name, e.explicit_pairs) {
                        (Some(name), true) => name.clone(),
                        (None, false) => (index + 1).to_string(),
                        _ => return Err(self.variant_mismatch(value)),
                    };
                    ops.push(StoreOp::write(
                        &e.key,
                        name,
                        StoreValue::Text(entry.value.clone()),
                    ));
                }
                Ok(ops)
            }
            _ => Err(self.variant_mismatch(value)),
        }
    }

    /// Deletes for every store entry this element could own.
    pub fn delete_ops(&self) -> Vec<StoreOp> {
        match self {
            Self::Boolean(e) => {
                let mut ops = vec![StoreOp::delete(&e.key, &e.value_name)];
                for record in e.on_true.iter().chain(&e.on_false) {
                    push_unique_delete(&mut ops, record);
                }
                ops
            }
            Self::Enum(e) => {
                let mut ops = vec![StoreOp::delete(&e.key, &e.value_name)];
                for item in &e.items {
                    for record in &item.subvalues {
                        push_unique_delete(&mut ops, record);
                    }
                }
                ops
            }
            Self::List(e) => vec![StoreOp::purge(&e.key)],
            Self::Decimal(DecimalElement {
                key, value_name, ..
            })
            | Self::LongDecimal(LongDecimalElement {
                key, value_name, ..
            })
            | Self::Text(TextElement {
                key, value_name, ..
            })
            | Self::MultiText(MultiTextElement {
                key, value_name, ..
            }) => vec![StoreOp::delete(key, value_name)],
        }
    }

    /// Whether the snapshot holds something this element can decode. A
    /// Boolean with no false records is always decodable: absence is its
    /// false encoding.
    pub fn is_present(&self, snap: &PolicySnapshot) -> bool {
        match self {
            Self::Boolean(e) => {
                e.on_false.is_empty()
                    || e.on_true
                        .iter()
                        .chain(&e.on_false)
                        .any(|r| snap.contains(&r.key, &r.value_name))
            }
            Self::List(e) => !snap.values_under(&e.key).is_empty(),
            Self::Decimal(DecimalElement {
                key, value_name, ..
            })
            | Self::LongDecimal(LongDecimalElement {
                key, value_name, ..
            })
            | Self::Text(TextElement {
                key, value_name, ..
            })
            | Self::MultiText(MultiTextElement {
                key, value_name, ..
            })
            | Self::Enum(EnumElement {
                key, value_name, ..
            }) => snap.contains(key, value_name),
        }
    }

    /// Decode this element's current value from a snapshot.
    pub fn read_value(&self, snap: &PolicySnapshot) -> Result<ElementValue> {
        match self {
            Self::Boolean(e) => {
                if !e.on_true.is_empty() || !e.on_false.is_empty() {
                    if records_match(&e.on_true, snap) {
                        return Ok(ElementValue::Bool(true));
                    }
                    if !e.on_false.is_empty() && records_match(&e.on_false, snap) {
                        return Ok(ElementValue::Bool(false));
                    }
                    // With no false records, anything but the true evidence
                    // decodes as false; absence included.
                    if e.on_false.is_empty() {
                        return Ok(ElementValue::Bool(false));
                    }
                    return Err(PolicyError::type_mismatch(
                        &e.id,
                        "configured true or false records",
                        describe_entry(snap.value(&e.key, &e.value_name)),
                    ));
                }
                match snap.value(&e.key, &e.value_name) {
                    None => Ok(ElementValue::Bool(false)),
                    Some(StoreValue::U32(1)) => Ok(ElementValue::Bool(true)),
                    Some(StoreValue::U32(0)) => Ok(ElementValue::Bool(false)),
                    Some(other) => Err(PolicyError::type_mismatch(
                        &e.id,
                        "u32 0 or 1",
                        describe_entry(Some(other)),
                    )),
                }
            }
            Self::Decimal(e) => {
                let value = read_numeric(
                    &e.id,
                    snap.value(&e.key, &e.value_name),
                    e.store_as_text,
                )?;
                check_range(&e.id, value, u64::from(e.min), u64::from(e.max))?;
                Ok(ElementValue::Decimal(value as u32))
            }
            Self::LongDecimal(e) => {
                let value = read_numeric(
                    &e.id,
                    snap.value(&e.key, &e.value_name),
                    e.store_as_text,
                )?;
                check_range(&e.id, value, e.min, e.max)?;
                Ok(ElementValue::LongDecimal(value))
            }
            Self::Text(e) => match snap.value(&e.key, &e.value_name) {
                Some(StoreValue::Text(s)) | Some(StoreValue::ExpandText(s)) => {
                    Ok(ElementValue::Text(s.clone()))
                }
                other => Err(PolicyError::type_mismatch(
                    &e.id,
                    "text entry",
                    describe_entry(other),
                )),
            },
            Self::MultiText(e) => match snap.value(&e.key, &e.value_name) {
                Some(StoreValue::MultiText(v)) => Ok(ElementValue::MultiText(v.clone())),
                other => Err(PolicyError::type_mismatch(
                    &e.id,
                    "multi_text entry",
                    describe_entry(other),
                )),
            },
            Self::Enum(e) => {
                let stored = snap.value(&e.key, &e.value_name);
                let Some(stored) = stored else {
                    return Err(PolicyError::type_mismatch(
                        &e.id,
                        "enum entry",
                        describe_entry(None),
                    ));
                };
                e.items
                    .iter()
                    .find(|item| item.value == *stored)
                    .map(|item| ElementValue::Enum(item.id.clone()))
                    .ok_or_else(|| {
                        PolicyError::unknown_item(&e.id, describe_entry(Some(stored)))
                    })
            }
            Self::List(e) => {
                let mut entries = Vec::new();
                for (name, value) in snap.values_under(&e.key) {
                    let StoreValue::Text(text) = value else {
                        return Err(PolicyError::type_mismatch(
                            &e.id,
                            "text list entry",
                            describe_entry(Some(value)),
                        ));
                    };
                    if e.explicit_pairs {
                        entries.push(ListEntry::pair(name, text.clone()));
                    } else {
                        entries.push(ListEntry::bare(text.clone()));
                    }
                }
                Ok(ElementValue::List(entries))
            }
        }
    }

    fn variant_mismatch(&self, value: &ElementValue) -> PolicyError {
        PolicyError::type_mismatch(
            self.id(),
            format!("{} value", self.kind()),
            format!("{value:?}"),
        )
    }
}

fn single_token<'a>(id: &str, tokens: &'a [String]) -> Result<&'a str> {
    match tokens {
        [token] => Ok(token.as_str()),
        _ => Err(PolicyError::type_mismatch(
            id,
            "exactly one token",
            tokens.join(" "),
        )),
    }
}

fn check_range(id: &str, value: u64, min: u64, max: u64) -> Result<()> {
    if value < min || value > max {
        return Err(PolicyError::range(id, value, min, max));
    }
    Ok(())
}

fn read_numeric(id: &str, stored: Option<&StoreValue>, store_as_text: bool) -> Result<u64> {
    match (stored, store_as_text) {
        (Some(StoreValue::Text(s)), true) | (Some(StoreValue::ExpandText(s)), true) => {
            s.parse().map_err(|_| {
                PolicyError::type_mismatch(id, "numeric string", s.clone())
            })
        }
        (Some(value), false) => value.as_u64().ok_or_else(|| {
            PolicyError::type_mismatch(id, "numeric entry", describe_entry(Some(value)))
        }),
        (stored, true) => Err(PolicyError::type_mismatch(
            id,
            "textual numeric entry",
            describe_entry(stored),
        )),
        (None, false) => Err(PolicyError::type_mismatch(
            id,
            "numeric entry",
            describe_entry(None),
        )),
    }
}

fn record_writes(records: &[StoreRecord]) -> Vec<StoreOp> {
    records
        .iter()
        .map(|r| StoreOp::write(&r.key, &r.value_name, r.value.clone()))
        .collect()
}

fn records_match(records: &[StoreRecord], snap: &PolicySnapshot) -> bool {
    !records.is_empty()
        && records
            .iter()
            .all(|r| snap.value(&r.key, &r.value_name) == Some(&r.value))
}

fn push_unique_delete(ops: &mut Vec<StoreOp>, record: &StoreRecord) {
    let op = StoreOp::delete(&record.key, &record.value_name);
    if !ops.contains(&op) {
        ops.push(op);
    }
}

fn describe_entry(value: Option<&StoreValue>) -> String {
    match value {
        Some(v) => format!("{} entry", v.kind()),
        None => "<absent>".to_string(),
    }
}
