//! Attribute set published alongside each frame.
//!
//! Keys are suffixed with the slot index (`asset_id_1`, `asset_id_2`, ..);
//! slot 2 keys only appear for dual-portrait frames.

use chrono::NaiveDate;
use serde_json::{Map, Value, json};

use crate::events::{PhotoRecord, Selection};
use crate::filter::years_ago;

pub fn frame_attributes(
    selection: &Selection,
    today: NaiveDate,
    asset_url: impl Fn(&str) -> Option<String>,
) -> Map<String, Value> {
    let mut attrs = Map::new();
    attrs.insert("is_dual_portrait".into(), Value::Bool(selection.is_dual()));
    for (slot, record) in selection.slots() {
        for (key, value) in record_attributes(record, today, &asset_url) {
            attrs.insert(format!("{key}_{}", slot.index()), value);
        }
    }
    attrs
}

fn record_attributes(
    record: &PhotoRecord,
    today: NaiveDate,
    asset_url: &impl Fn(&str) -> Option<String>,
) -> Vec<(&'static str, Value)> {
    let mut attrs = vec![("asset_id", json!(record.id))];
    if let Some(url) = asset_url(&record.id) {
        attrs.push(("immich_url", json!(url)));
    }
    if let Some(name) = &record.file_name {
        attrs.push(("original_filename", json!(name)));
    }
    if let Some(description) = &record.description {
        attrs.push(("description", json!(description)));
    }
    attrs.push((
        "date_taken",
        json!(record.taken_at.format("%Y-%m-%dT%H:%M:%S").to_string()),
    ));
    if let Some(year) = record.memory_year {
        attrs.push(("memory_year", json!(year)));
        attrs.push(("years_ago", json!(years_ago(year, today))));
    }
    attrs.push(("source", json!(record.category.as_str())));
    if let Some(city) = &record.city {
        attrs.push(("city", json!(city)));
    }
    if let Some(country) = &record.country {
        attrs.push(("country", json!(country)));
    }
    if !record.people.is_empty() {
        attrs.push(("people", json!(record.people)));
    }
    attrs.push(("is_favorite", json!(record.favorite)));
    attrs
}
