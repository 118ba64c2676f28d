//! Typed views over a step envelope's content.
//!
//! Each upstream step stores its result in a known shape. A
//! [`PayloadLayout`] names that shape, and [`StepPayload::decode`] turns an
//! envelope into one tagged variant so consumers can match on it instead of
//! probing the JSON by hand.

use serde_json::{Map, Value};
use tracing::debug;

use tickerflow_extract::extract;
use tickerflow_shared::{Category, EnvelopeFormat, StepEnvelope};

/// Field that bare-string entries are promoted into.
pub const TICKER_FIELD: &str = "ticker";

/// Where the entity list lives inside a step's content.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadLayout {
    /// The content is the entity array itself.
    List,
    /// The entity array sits under one field of an object.
    Nested(String),
    /// Several arrays under named fields, each implying a category.
    Grouped(Vec<(String, Category)>),
}

impl PayloadLayout {
    pub fn nested(field: impl Into<String>) -> Self {
        Self::Nested(field.into())
    }

    /// Category implied by `group` in a [`PayloadLayout::Grouped`] layout.
    pub fn category_of(&self, group: &str) -> Option<Category> {
        match self {
            Self::Grouped(groups) => groups.iter().find(|(g, _)| g == group).map(|(_, c)| *c),
            _ => None,
        }
    }
}

/// An entity: one JSON object.
pub type Entity = Map<String, Value>;

/// A decoded step payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    EntityList(Vec<Entity>),
    KeyedGroups(Vec<(String, Vec<Entity>)>),
    /// Nothing structured matched the layout. Error envelopes land here too.
    FreeText(String),
}

impl StepPayload {
    /// Decode `envelope` according to `layout`.
    ///
    /// String content of a `json` envelope (written by an older extractor)
    /// is run through the extractor again; already-structured content is
    /// used as is, so decoding the same envelope twice gives the same result.
    pub fn decode(envelope: &StepEnvelope, layout: &PayloadLayout) -> Self {
        if envelope.format != EnvelopeFormat::Json {
            return Self::FreeText(envelope.as_text().unwrap_or_default().to_string());
        }

        let content = match &envelope.content {
            Value::String(raw) => match extract(raw).value() {
                Some(value) => value.clone(),
                None => return Self::FreeText(raw.clone()),
            },
            other => other.clone(),
        };

        let decoded = match layout {
            PayloadLayout::List => entity_list(&content).map(Self::EntityList),
            PayloadLayout::Nested(field) => content
                .get(field.as_str())
                .and_then(entity_list)
                .or_else(|| entity_list(&content))
                .map(Self::EntityList),
            PayloadLayout::Grouped(groups) => {
                let found: Vec<(String, Vec<Entity>)> = groups
                    .iter()
                    .filter_map(|(key, _)| {
                        let entries = content.get(key.as_str()).and_then(entity_list)?;
                        Some((key.clone(), entries))
                    })
                    .collect();
                (!found.is_empty()).then_some(Self::KeyedGroups(found))
            }
        };

        decoded.unwrap_or_else(|| {
            debug!(?layout, "content does not match layout");
            Self::FreeText(content.to_string())
        })
    }

    /// Whether the payload carries no entities.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::EntityList(entities) => entities.is_empty(),
            Self::KeyedGroups(groups) => groups.iter().all(|(_, e)| e.is_empty()),
            Self::FreeText(_) => true,
        }
    }

    /// Every entity, in order, with the group it came from.
    pub fn entities(&self) -> Vec<(Option<&str>, &Entity)> {
        match self {
            Self::EntityList(entities) => entities.iter().map(|e| (None, e)).collect(),
            Self::KeyedGroups(groups) => groups
                .iter()
                .flat_map(|(key, entries)| entries.iter().map(move |e| (Some(key.as_str()), e)))
                .collect(),
            Self::FreeText(_) => Vec::new(),
        }
    }

    /// Entities of one group (or of the whole list when ungrouped).
    pub fn group(&self, key: &str) -> Vec<Entity> {
        match self {
            Self::KeyedGroups(groups) => groups
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, e)| e.clone())
                .unwrap_or_default(),
            Self::EntityList(entities) => entities.clone(),
            Self::FreeText(_) => Vec::new(),
        }
    }

    /// Non-empty values of `key_field` across all entities, first occurrence order.
    pub fn keys(&self, key_field: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, entity) in self.entities() {
            if let Some(key) = entity_key(entity, key_field) {
                if !out.contains(&key) {
                    out.push(key);
                }
            }
        }
        out
    }
}

/// The string value of `key_field`, verbatim, unless it is missing or blank.
///
/// Keys are compared exactly: `" NVDA "` and `"nvda"` are not `"NVDA"`.
pub fn entity_key(entity: &Entity, key_field: &str) -> Option<String> {
    let key = entity.get(key_field)?.as_str()?;
    (!key.trim().is_empty()).then(|| key.to_string())
}

/// An array of objects. Bare strings are promoted to `{"ticker": s}`;
/// other elements are skipped.
pub fn entity_list(value: &Value) -> Option<Vec<Entity>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map.clone()),
                Value::String(s) if !s.trim().is_empty() => {
                    let mut map = Map::new();
                    map.insert(TICKER_FIELD.into(), Value::String(s.clone()));
                    Some(map)
                }
                _ => None,
            })
            .collect(),
    )
}
