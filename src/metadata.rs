//! Series metadata: defaults and deep merging.
//!
//! Metadata is a JSON tree. Each movie is described by one entry of
//! `Behavior.Movies`, matched to source files by position:
//!
//! ```json
//! {"Behavior": {"Movies": [
//!     {"name": "Video: mouse_cam", "description": "Video recorded by camera.", "unit": "Frames"}
//! ]}}
//! ```
//!
//! User metadata is merged over [`default_movie_metadata`] with
//! [`deep_update`], so a caller only has to state the fields it changes.

use std::path::Path;

use serde_json::{Map, Value, json};

use crate::error::IngestError;
use crate::writer::SeriesDescription;

/// Description given to every movie by default.
pub const DEFAULT_MOVIE_DESCRIPTION: &str = "Video recorded by camera.";

/// Unit given to every movie by default.
pub const DEFAULT_MOVIE_UNIT: &str = "Frames";

/// How [`deep_update_with`] treats lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Append list items from the update (`true`) or replace the list.
    pub append_lists: bool,
    /// Skip appended scalars already present in the list.
    pub remove_repeats: bool,
    /// Maps in a list whose `compare_key` values match are merged in place.
    pub compare_key: String,
    /// Merge matched maps recursively (`true`) or replace them.
    pub merge_matched_maps: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            append_lists: true,
            remove_repeats: true,
            compare_key: "name".to_string(),
            merge_matched_maps: true,
        }
    }
}

/// Merge `update` over `base` with the default [`MergeOptions`].
pub fn deep_update(base: &Value, update: &Value) -> Value {
    deep_update_with(base, update, &MergeOptions::default())
}

/// Merge `update` over `base`.
///
/// Nested objects merge key by key. Lists are extended item by item (see
/// [`MergeOptions`]). Any other value in `update` replaces the one in `base`.
/// If `base` is not an object, `update` is returned as is.
pub fn deep_update_with(base: &Value, update: &Value, options: &MergeOptions) -> Value {
    let (Value::Object(base_map), Value::Object(update_map)) = (base, update) else {
        return update.clone();
    };

    let mut merged = base_map.clone();
    for (key, value) in update_map {
        let next = match value {
            Value::Object(_) => deep_update_with(merged.get(key).unwrap_or(&Value::Null), value, options),
            Value::Array(items) if options.append_lists => {
                let mut list = merged.get(key).cloned().unwrap_or(Value::Array(Vec::new()));
                for item in items {
                    list = merge_into_list(list, item, options);
                }
                list
            }
            _ => value.clone(),
        };
        merged.insert(key.clone(), next);
    }
    Value::Object(merged)
}

fn merge_into_list(list: Value, item: &Value, options: &MergeOptions) -> Value {
    let Value::Array(mut entries) = list else {
        return item.clone();
    };

    if let Value::Object(update_map) = item {
        let key = update_map.get(&options.compare_key);
        let mut matched = false;
        for entry in entries.iter_mut() {
            let Value::Object(existing) = entry else {
                continue;
            };
            let existing_key = existing.get(&options.compare_key);
            if existing_key.is_some() && existing_key == key {
                matched = true;
                *entry = if options.merge_matched_maps {
                    deep_update_with(&*entry, item, options)
                } else {
                    item.clone()
                };
            }
        }
        if !matched {
            entries.push(item.clone());
        }
    } else if !(options.remove_repeats && entries.contains(item)) {
        entries.push(item.clone());
    }
    Value::Array(entries)
}

/// Default series name for a movie file: `"Video: <file stem>"`.
pub fn default_movie_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    format!("Video: {stem}")
}

/// Default metadata with one `Behavior.Movies` entry per path.
pub fn default_movie_metadata<P: AsRef<Path>>(paths: &[P]) -> Value {
    let movies: Vec<Value> = paths
        .iter()
        .map(|path| {
            json!({
                "name": default_movie_name(path.as_ref()),
                "description": DEFAULT_MOVIE_DESCRIPTION,
                "unit": DEFAULT_MOVIE_UNIT,
            })
        })
        .collect();
    json!({ "Behavior": { "Movies": movies } })
}

/// The description of movie `index`, falling back to defaults derived from
/// `path` for any missing field.
///
/// # Errors
///
/// [`IngestError::InvalidMetadata`] if `Behavior`, `Behavior.Movies` or the
/// selected entry exist but have the wrong JSON type, or a field is not a
/// string.
pub fn movie_description(
    metadata: &Value,
    index: usize,
    path: &Path,
) -> Result<SeriesDescription, IngestError> {
    let empty = Map::new();
    let entry = match lookup_movie(metadata, index)? {
        Some(entry) => entry,
        None => &empty,
    };

    let field = |name: &str, default: String| -> Result<String, IngestError> {
        match entry.get(name) {
            None | Some(Value::Null) => Ok(default),
            Some(Value::String(text)) => Ok(text.clone()),
            Some(other) => Err(IngestError::InvalidMetadata(format!(
                "Behavior.Movies[{index}].{name} must be a string, found {other}"
            ))),
        }
    };

    Ok(SeriesDescription {
        name: field("name", default_movie_name(path))?,
        description: field("description", DEFAULT_MOVIE_DESCRIPTION.to_string())?,
        unit: field("unit", DEFAULT_MOVIE_UNIT.to_string())?,
    })
}

fn lookup_movie(metadata: &Value, index: usize) -> Result<Option<&Map<String, Value>>, IngestError> {
    let behavior = match metadata.get("Behavior") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(behavior)) => behavior,
        Some(_) => {
            return Err(IngestError::InvalidMetadata(
                "Behavior must be an object".to_string(),
            ));
        }
    };
    let movies = match behavior.get("Movies") {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Array(movies)) => movies,
        Some(_) => {
            return Err(IngestError::InvalidMetadata(
                "Behavior.Movies must be a list".to_string(),
            ));
        }
    };
    match movies.get(index) {
        None => Ok(None),
        Some(Value::Object(entry)) => Ok(Some(entry)),
        Some(_) => Err(IngestError::InvalidMetadata(format!(
            "Behavior.Movies[{index}] must be an object"
        ))),
    }
}
