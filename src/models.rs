// Core data structures for the listing harvester

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A single node of a marketplace category hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    /// Parent id; roots point at themselves or carry no parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub expired: bool,
}

impl Category {
    /// Create a category with an explicit parent
    pub fn new(
        id: impl Into<String>,
        parent_id: impl Into<String>,
        name: impl Into<String>,
        level: u32,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id: Some(parent_id.into()),
            name: name.into(),
            level,
            expired: false,
        }
    }

    /// Mark the category as expired
    pub fn expired(mut self) -> Self {
        self.expired = true;
        self
    }

    /// True when this category terminates a parent chain
    pub fn is_root(&self) -> bool {
        match self.parent_id.as_deref() {
            None | Some("") => true,
            Some(parent) => parent == self.id,
        }
    }

    /// Level-1 category that is still in use
    pub fn is_active_top_level(&self) -> bool {
        self.level == 1 && !self.expired
    }
}

/// The full category hierarchy of one marketplace site at one version
///
/// Trees are immutable once built; a sync replaces the whole value.
#[derive(Debug, Clone)]
pub struct SiteCategoryTree {
    global_id: String,
    version: String,
    categories: Vec<Category>,
    index: HashMap<String, usize>,
}

impl SiteCategoryTree {
    /// Build a tree and its id index
    pub fn new(
        global_id: impl Into<String>,
        version: impl Into<String>,
        categories: Vec<Category>,
    ) -> Self {
        let index = categories
            .iter()
            .enumerate()
            .map(|(pos, category)| (category.id.clone(), pos))
            .collect();

        Self {
            global_id: global_id.into(),
            version: version.into(),
            categories,
            index,
        }
    }

    pub fn global_id(&self) -> &str {
        &self.global_id
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Look up a category by id
    pub fn get(&self, id: &str) -> Option<&Category> {
        self.index.get(id).map(|&pos| &self.categories[pos])
    }

    /// Non-expired level-1 categories, in tree order
    pub fn top_level(&self) -> impl Iterator<Item = &Category> {
        self.categories.iter().filter(|c| c.is_active_top_level())
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Planned and actual request counts for one quota day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDay {
    pub date: NaiveDate,
    pub planned_requests: u64,
    pub actual_requests: u64,
}

impl QuotaDay {
    /// An untouched day
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            planned_requests: 0,
            actual_requests: 0,
        }
    }

    /// Calls still available under `limit`
    pub fn remaining(&self, limit: u64) -> u64 {
        limit.saturating_sub(self.actual_requests)
    }
}

/// One unit of work: a single completed-items call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub title: String,
    pub global_id: String,
    pub category_id: String,
    pub end_time: DateTime<Utc>,
}

impl Job {
    /// Job type name used by the queue broker
    pub const TYPE: &'static str = "findCompletedItems";

    /// Create a job with a descriptive title
    pub fn new(
        global_id: impl Into<String>,
        category_id: impl Into<String>,
        category_name: &str,
        end_time: DateTime<Utc>,
    ) -> Self {
        let global_id = global_id.into();
        let category_id = category_id.into();
        let title = format!(
            "{global_id} {category_id} ({category_name}) until {}",
            format_end_time(&end_time)
        );

        Self {
            title,
            global_id,
            category_id,
            end_time,
        }
    }

    /// End time in the format the marketplace expects
    pub fn end_time_iso(&self) -> String {
        format_end_time(&self.end_time)
    }
}

/// Format an instant as ISO-8601 UTC with millisecond precision
pub fn format_end_time(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A harvested marketplace listing
///
/// The raw source document is kept as-is; the identifying fields are
/// extracted for indexing and upserts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub item_id: String,
    #[serde(default)]
    pub global_id: Option<String>,
    #[serde(default)]
    pub primary_category_id: Option<String>,
    #[serde(default)]
    pub requested_global_id: Option<String>,
    #[serde(default)]
    pub time_observed: Option<DateTime<Utc>>,
    pub document: Value,
}

impl Listing {
    /// Build a listing from a Finding API item document
    ///
    /// Returns `None` when the document carries no item id.
    pub fn from_document(document: Value) -> Option<Self> {
        let item_id = field_str(&document, &["itemId"])?;
        let global_id = field_str(&document, &["globalId"]);
        let primary_category_id = field_str(&document, &["primaryCategory", "categoryId"]);

        Some(Self {
            item_id,
            global_id,
            primary_category_id,
            requested_global_id: None,
            time_observed: None,
            document,
        })
    }

    /// Tag the listing with the site queried and the observation time
    pub fn annotate(&mut self, requested_global_id: &str, time_observed: DateTime<Utc>) {
        self.requested_global_id = Some(requested_global_id.to_string());
        self.time_observed = Some(time_observed);
    }

    /// Site the listing belongs to, falling back to the site queried
    pub fn effective_global_id(&self) -> Option<&str> {
        self.global_id
            .as_deref()
            .or(self.requested_global_id.as_deref())
    }

    /// Read a nested string field from the source document
    pub fn field(&self, path: &[&str]) -> Option<String> {
        field_str(&self.document, path)
    }
}

/// Walk a Finding API document, unwrapping the single-element arrays it
/// wraps every value in
pub fn field_value<'a>(document: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = unwrap_singleton(document);
    for key in path {
        current = unwrap_singleton(current.get(*key)?);
    }
    Some(current)
}

/// Like [`field_value`], rendered as a string
pub fn field_str(document: &Value, path: &[&str]) -> Option<String> {
    match field_value(document, path)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        // Price-like objects carry their value under `__value__`
        Value::Object(map) => map.get("__value__").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }),
        Value::Array(_) => None,
    }
}

fn unwrap_singleton(value: &Value) -> &Value {
    match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        other => other,
    }
}
