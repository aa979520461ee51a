//! JSON record store for projects and servers.
//!
//! Each record lives in `<dir>/<id>.json`. The ID is taken from the file
//! name, never from the body, and one ID may not be used by two kinds.

use std::path::PathBuf;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::local_files;
use crate::output::{BatchResult, CreateOutput, CreateResult, ItemStatus, MergeOutput, MergeResult};
use crate::paths;

pub(crate) trait ConfigEntity: Serialize + DeserializeOwned {
    /// Record kind used in messages and error fields ("project", "server").
    const KIND: &'static str;

    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn dir() -> Result<PathBuf>;
    fn not_found(id: String, suggestions: Vec<String>) -> Error;

    /// Checked before a new record is written.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

fn record_path<T: ConfigEntity>(id: &str) -> Result<PathBuf> {
    Ok(T::dir()?.join(format!("{}.json", id)))
}

fn capitalized(kind: &str) -> String {
    let mut chars = kind.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// IDs become remote directory and symlink names: `[A-Za-z0-9._-]`, not
/// starting with `.` or `-`.
pub(crate) fn validate_id(id: &str, kind: &str) -> Result<()> {
    let field = format!("{}_id", kind);

    if id.is_empty() {
        return Err(Error::validation_invalid_argument(
            field,
            format!("{} ID cannot be empty", capitalized(kind)),
            None,
            None,
        ));
    }

    let allowed = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !allowed || id.starts_with(['.', '-']) {
        return Err(Error::validation_invalid_argument(
            field,
            format!("{} ID contains invalid characters", capitalized(kind)),
            Some(id.to_string()),
            None,
        ));
    }

    Ok(())
}

pub(crate) fn parse_json<T: DeserializeOwned>(raw: &str, context: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::validation_invalid_json(e, Some(context.to_string())))
}

pub(crate) fn to_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize record".to_string())))
}

// Records

pub(crate) fn exists<T: ConfigEntity>(id: &str) -> bool {
    record_path::<T>(id).is_ok_and(|path| path.is_file())
}

pub(crate) fn load<T: ConfigEntity>(id: &str) -> Result<T> {
    validate_id(id, T::KIND)?;
    let path = record_path::<T>(id)?;
    if !path.is_file() {
        return Err(T::not_found(id.to_string(), find_similar_ids::<T>(id)));
    }

    let raw = local_files::read_file(&path)?;
    let mut entity: T = serde_json::from_str(&raw)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;
    entity.set_id(id.to_string());
    Ok(entity)
}

/// Every readable record, sorted by ID. Files that fail to parse are skipped.
pub(crate) fn list<T: ConfigEntity>() -> Result<Vec<T>> {
    let mut records = Vec::new();

    for path in local_files::json_files(&T::dir()?)? {
        let Some(id) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        match local_files::read_file(&path).and_then(|raw| parse_json::<T>(&raw, "parse record")) {
            Ok(mut entity) => {
                entity.set_id(id);
                records.push(entity);
            }
            Err(err) => {
                log_status!("config", "Skipping {}: {}", path.display(), err.message);
            }
        }
    }

    Ok(records)
}

pub(crate) fn list_ids<T: ConfigEntity>() -> Result<Vec<String>> {
    Ok(local_files::json_files(&T::dir()?)?
        .iter()
        .filter_map(|path| path.file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .collect())
}

fn ensure_unclaimed(id: &str, kind: &str) -> Result<()> {
    let kinds = [("project", paths::projects()), ("server", paths::servers())];

    for (other, dir) in kinds {
        if other == kind {
            continue;
        }
        if dir.is_ok_and(|dir| dir.join(format!("{}.json", id)).is_file()) {
            return Err(Error::config_id_collision(id, kind, other));
        }
    }
    Ok(())
}

pub(crate) fn save<T: ConfigEntity>(entity: &T) -> Result<()> {
    validate_id(entity.id(), T::KIND)?;
    ensure_unclaimed(entity.id(), T::KIND)?;

    local_files::ensure_app_dirs()?;
    local_files::write_file(&record_path::<T>(entity.id())?, &to_json_pretty(entity)?)
}

pub(crate) fn delete<T: ConfigEntity>(id: &str) -> Result<()> {
    validate_id(id, T::KIND)?;
    let path = record_path::<T>(id)?;
    if !path.is_file() {
        return Err(T::not_found(id.to_string(), find_similar_ids::<T>(id)));
    }
    local_files::remove_file(&path)
}

fn already_exists(id: &str, kind: &str) -> Error {
    Error::validation_invalid_argument(
        format!("{}.id", kind),
        format!("{} '{}' already exists", kind, id),
        Some(id.to_string()),
        None,
    )
}

/// Validate and write a new record. Fails if the ID is taken.
pub(crate) fn create_single<T: ConfigEntity>(entity: T) -> Result<CreateResult<T>> {
    validate_id(entity.id(), T::KIND)?;
    entity.validate()?;
    if exists::<T>(entity.id()) {
        return Err(already_exists(entity.id(), T::KIND));
    }

    save(&entity)?;
    Ok(CreateResult {
        id: entity.id().to_string(),
        entity,
    })
}

/// Pull the `id` key out of a JSON object, falling back to `explicit`.
fn take_id(value: &mut Value, explicit: Option<&str>, kind: &str) -> Result<String> {
    let Value::Object(fields) = value else {
        return Err(Error::validation_invalid_argument(
            "json",
            format!("Each {} spec must be a JSON object", kind),
            None,
            None,
        ));
    };

    let body_id = match fields.remove("id") {
        Some(Value::String(id)) => Some(id),
        _ => None,
    };

    explicit.map(str::to_string).or(body_id).ok_or_else(|| {
        Error::validation_invalid_argument(
            "id",
            format!("Provide the {} ID as an argument or an \"id\" field", kind),
            None,
            None,
        )
    })
}

fn entity_from_value<T: ConfigEntity>(mut value: Value) -> Result<T> {
    let id = take_id(&mut value, None, T::KIND)?;
    let mut entity: T = serde_json::from_value(value)
        .map_err(|e| Error::validation_invalid_json(e, Some(format!("parse {} '{}'", T::KIND, id))))?;
    entity.set_id(id);
    Ok(entity)
}

fn item_label(value: &Value) -> String {
    value
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string()
}

/// Create from raw JSON: an object makes one record, an array makes a batch.
pub(crate) fn create<T: ConfigEntity>(raw: &str, skip_existing: bool) -> Result<CreateOutput<T>> {
    let items = match parse_json::<Value>(raw, "parse create spec")? {
        Value::Array(items) => items,
        single => return Ok(CreateOutput::Single(create_single(entity_from_value::<T>(single)?)?)),
    };

    let mut batch = BatchResult::default();
    for item in items {
        let label = item_label(&item);
        let outcome = entity_from_value::<T>(item).and_then(|entity| {
            if skip_existing && exists::<T>(entity.id()) {
                return Ok(ItemStatus::Skipped);
            }
            create_single(entity).map(|_| ItemStatus::Created)
        });
        batch.record(label, outcome);
    }

    Ok(CreateOutput::Bulk(batch))
}

fn merge_one<T: ConfigEntity>(id: &str, patch: Value) -> Result<Vec<String>> {
    let mut entity = load::<T>(id)?;
    let updated = apply_patch(&mut entity, patch)?;
    entity.set_id(id.to_string());
    save(&entity)?;
    Ok(updated)
}

/// Merge raw JSON into existing records: an object patches one record
/// (`id` argument or body `id`), an array patches each element by its `id`.
pub(crate) fn merge<T: ConfigEntity>(id: Option<&str>, raw: &str) -> Result<MergeOutput> {
    let items = match parse_json::<Value>(raw, "parse merge spec")? {
        Value::Array(items) => items,
        mut single => {
            let id = take_id(&mut single, id, T::KIND)?;
            let updated_fields = merge_one::<T>(&id, single)?;
            return Ok(MergeOutput::Single(MergeResult { id, updated_fields }));
        }
    };

    let mut batch = BatchResult::default();
    for mut item in items {
        let label = item_label(&item);
        let outcome = take_id(&mut item, None, T::KIND)
            .and_then(|id| merge_one::<T>(&id, item))
            .map(|_| ItemStatus::Updated);
        batch.record(label, outcome);
    }

    Ok(MergeOutput::Bulk(batch))
}

// Patching

/// Deep-merge a JSON object into `target` and return the top-level keys it
/// touched. `null` removes a key; arrays gain the patch items they lack.
pub(crate) fn apply_patch<T: Serialize + DeserializeOwned>(
    target: &mut T,
    patch: Value,
) -> Result<Vec<String>> {
    let touched: Vec<String> = match &patch {
        Value::Object(fields) if !fields.is_empty() => fields.keys().cloned().collect(),
        Value::Object(_) => {
            return Err(Error::validation_invalid_argument(
                "merge",
                "Nothing to merge: the patch is an empty object",
                None,
                None,
            ))
        }
        _ => {
            return Err(Error::validation_invalid_argument(
                "merge",
                "A merge patch must be a JSON object",
                None,
                None,
            ))
        }
    };

    let mut current = serde_json::to_value(&*target)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize record".to_string())))?;
    merge_value(&mut current, patch);
    *target = serde_json::from_value(current)
        .map_err(|e| Error::validation_invalid_json(e, Some("apply patch".to_string())))?;

    Ok(touched)
}

fn merge_value(current: &mut Value, patch: Value) {
    match (current, patch) {
        (Value::Object(current), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    current.remove(&key);
                } else {
                    merge_value(current.entry(key).or_insert(Value::Null), value);
                }
            }
        }
        (Value::Array(current), Value::Array(patch)) => {
            for item in patch {
                if !current.contains(&item) {
                    current.push(item);
                }
            }
        }
        (current, patch) => *current = patch,
    }
}

// Suggestions

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != *cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }

    row[b.len()]
}

/// Up to three candidates close to `target`. Prefix matches rank first,
/// then suffix matches, then IDs within three edits.
fn rank_similar(target: &str, candidates: Vec<String>) -> Vec<String> {
    let target = target.to_lowercase();
    let mut ranked: Vec<(usize, String)> = candidates
        .into_iter()
        .filter_map(|id| {
            let lower = id.to_lowercase();
            let rank = if lower == target {
                return None;
            } else if lower.starts_with(&target) {
                0
            } else if lower.ends_with(&target) {
                1
            } else {
                match edit_distance(&target, &lower) {
                    d @ 1..=3 => 1 + d,
                    _ => return None,
                }
            };
            Some((rank, id))
        })
        .collect();

    ranked.sort();
    ranked.into_iter().take(3).map(|(_, id)| id).collect()
}

pub(crate) fn find_similar_ids<T: ConfigEntity>(target: &str) -> Vec<String> {
    list_ids::<T>()
        .map(|ids| rank_similar(target, ids))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    #[serde(rename_all = "camelCase")]
    struct Record {
        server_id: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
    }

    fn record(server_id: Option<&str>, tags: &[&str]) -> Record {
        Record {
            server_id: server_id.map(str::to_string),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn apply_patch_replaces_scalars_and_extends_arrays() {
        let mut target = record(Some("web1"), &["python"]);
        let touched = apply_patch(
            &mut target,
            serde_json::json!({ "serverId": "web2", "tags": ["python", "nginx"] }),
        )
        .unwrap();

        assert_eq!(target, record(Some("web2"), &["python", "nginx"]));
        assert_eq!(touched.len(), 2);
    }

    #[test]
    fn apply_patch_null_clears_field() {
        let mut target = record(Some("web1"), &[]);
        apply_patch(&mut target, serde_json::json!({ "serverId": null })).unwrap();
        assert_eq!(target.server_id, None);
    }

    #[test]
    fn apply_patch_rejects_empty_and_non_object() {
        let mut target = record(None, &[]);
        assert!(apply_patch(&mut target, serde_json::json!({})).is_err());
        assert!(apply_patch(&mut target, serde_json::json!(["web1"])).is_err());
    }

    #[test]
    fn take_id_prefers_explicit_argument() {
        let mut value = serde_json::json!({ "id": "blog", "serverId": "web1" });
        assert_eq!(take_id(&mut value, Some("shop"), "project").unwrap(), "shop");
        assert!(value.get("id").is_none());

        let mut anonymous = serde_json::json!({ "serverId": "web1" });
        assert!(take_id(&mut anonymous, None, "project").is_err());
    }

    #[test]
    fn validate_id_rejects_path_and_shell_characters() {
        for bad in ["", "foo/bar", "shop;rm", ".hidden", "-flag", "two words"] {
            assert!(validate_id(bad, "project").is_err(), "{:?} accepted", bad);
        }
        for good in ["shop", "shop_web-2", "web1.example"] {
            assert!(validate_id(good, "server").is_ok(), "{:?} rejected", good);
        }
    }

    #[test]
    fn edit_distance_counts_single_character_edits() {
        assert_eq!(edit_distance("shop", "shop"), 0);
        assert_eq!(edit_distance("shop", "shpo"), 2);
        assert_eq!(edit_distance("", "web"), 3);
        assert_eq!(edit_distance("web1", "web12"), 1);
    }

    #[test]
    fn rank_similar_orders_prefix_suffix_then_distance() {
        let ids = vec![
            "api".to_string(),
            "shop-old".to_string(),
            "web-shop".to_string(),
            "shap".to_string(),
            "shop".to_string(),
        ];
        assert_eq!(rank_similar("shop", ids), vec!["shop-old", "web-shop", "shap"]);
    }
}
