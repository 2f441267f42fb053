//! Field-by-field merging of partially specified records.
//!
//! All configuration records keep their fields as `Option`s so that "unset"
//! is distinguishable from "set to a default". Merging never lets an unset
//! (or JSON `null`) value clear a set one.

use serde_json::{Map, Value};

/// A record that can be merged with another of the same shape.
pub trait Overlay {
    /// Replaces every field that `top` sets, recursing into nested records.
    fn overlay(&mut self, top: &Self);
}

/// Replaces `base` when `top` is set.
pub fn overlay_value<T: Clone>(base: &mut Option<T>, top: &Option<T>) {
    if let Some(value) = top {
        *base = Some(value.clone());
    }
}

/// Merges a nested record, taking `top`'s set fields.
pub fn overlay_nested<T: Overlay + Clone>(base: &mut Option<T>, top: &Option<T>) {
    match (base.as_mut(), top) {
        (Some(base), Some(top)) => base.overlay(top),
        (None, Some(top)) => *base = Some(top.clone()),
        _ => {}
    }
}

/// Fills `base` from `bottom` when `base` is unset.
pub fn underlay_value<T: Clone>(base: &mut Option<T>, bottom: &Option<T>) {
    if base.is_none() {
        base.clone_from(bottom);
    }
}

/// Merges a nested record, keeping `base`'s set fields and filling the rest
/// from `bottom`.
pub fn underlay_nested<T: Overlay + Clone>(base: &mut Option<T>, bottom: &Option<T>) {
    match (base.as_mut(), bottom) {
        (Some(current), Some(bottom)) => {
            let mut merged = bottom.clone();
            merged.overlay(current);
            *current = merged;
        }
        (None, Some(bottom)) => *base = Some(bottom.clone()),
        _ => {}
    }
}

/// Deep-merges two JSON objects; `top` wins except where it holds `null`.
pub fn overlay_json(base: &mut Map<String, Value>, top: &Map<String, Value>) {
    for (key, value) in top {
        if value.is_null() {
            continue;
        }
        if let (Some(Value::Object(current)), Value::Object(nested)) = (base.get_mut(key), value) {
            overlay_json(current, nested);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Merges an optional JSON object keeping `base`'s non-null entries.
pub fn underlay_json(base: &mut Option<Map<String, Value>>, bottom: &Option<Map<String, Value>>) {
    match (base.as_mut(), bottom) {
        (Some(current), Some(bottom)) => {
            let mut merged = bottom.clone();
            overlay_json(&mut merged, current);
            *current = merged;
        }
        (None, Some(bottom)) => *base = Some(bottom.clone()),
        _ => {}
    }
}
