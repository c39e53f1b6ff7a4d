use crate::model::ReferenceConfig;
use crate::services::backend::{self, CatalogBackend, OptionQuery};
use crate::ui::{LoadKind, LoadMsg, LoadOutcome};
use crate::widgets::ref_select::{Choice, FetchRequest};
use serde_json::Value as JsonValue;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

pub fn get_by_path<'a>(v: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut cur = v;
    for seg in path.split('.') {
        cur = cur.get(seg)?;
    }
    Some(cur)
}

fn scalar_string(v: &JsonValue) -> Option<String> {
    match v {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Turn an option-page envelope into label/value pairs using the reference
// config's extraction keys. The item array sits at `unwrap` (dot-path) or at
// the conventional data.items.
pub(crate) fn extract_choices(v: &JsonValue, cfg: &ReferenceConfig) -> Vec<Choice> {
    let path = cfg.unwrap.as_deref().unwrap_or("data.items");
    let mut out = Vec::new();
    let Some(arr) = get_by_path(v, path).and_then(|x| x.as_array()) else {
        return out;
    };
    for item in arr {
        if let Some(s) = item.as_str() {
            out.push(Choice {
                label: s.to_string(),
                value: s.to_string(),
            });
            continue;
        }
        let Some(value) = get_by_path(item, &cfg.value_key).and_then(scalar_string) else {
            continue;
        };
        let label = get_by_path(item, &cfg.label_key)
            .and_then(scalar_string)
            .or_else(|| item.get("title").and_then(scalar_string))
            .or_else(|| item.get("name").and_then(scalar_string))
            .unwrap_or_else(|| value.clone());
        out.push(Choice { label, value });
    }
    out
}

pub fn spawn_fetch_entity(
    backend: Arc<dyn CatalogBackend>,
    entity: String,
    id: String,
    key: String,
    tx: Sender<LoadMsg>,
) {
    thread::spawn(move || {
        let outcome = (|| -> Result<LoadOutcome, String> {
            let env = backend
                .fetch_entity(&entity, &id)
                .map_err(|e| format!("{e}"))?;
            if !backend::envelope_ok(&env) {
                return Err(backend::envelope_error_message(&env));
            }
            Ok(LoadOutcome::Entity(backend::envelope_data(&env)))
        })();
        let _ = tx.send(LoadMsg {
            key,
            outcome,
            kind: LoadKind::Entity,
        });
    });
}

pub fn spawn_fetch_options(
    backend: Arc<dyn CatalogBackend>,
    req: FetchRequest,
    key: String,
    tx: Sender<LoadMsg>,
) {
    thread::spawn(move || {
        let outcome = (|| -> Result<LoadOutcome, String> {
            let query = OptionQuery {
                page: req.page,
                page_size: req.config.page_size,
                search: req.query.clone(),
                filters: req.config.filters.clone(),
            };
            let env = backend
                .fetch_options(&req.config.endpoint, &query)
                .map_err(|e| format!("{e}"))?;
            if !backend::envelope_ok(&env) {
                return Err(backend::envelope_error_message(&env));
            }
            let items = extract_choices(&env, &req.config);
            Ok(LoadOutcome::Options {
                version: req.version,
                page: req.page,
                items,
            })
        })();
        let _ = tx.send(LoadMsg {
            key,
            outcome,
            kind: LoadKind::RefOptions,
        });
    });
}

// Persistence result envelopes are passed through whole (including error
// envelopes) so per-field errors can be mapped by the reducer; only transport
// failures become Err.
pub fn spawn_persist(
    backend: Arc<dyn CatalogBackend>,
    entity: String,
    entity_id: Option<String>,
    payload: JsonValue,
    key: String,
    tx: Sender<LoadMsg>,
) {
    thread::spawn(move || {
        let outcome = (|| -> Result<LoadOutcome, String> {
            let env = match &entity_id {
                Some(id) => backend.update(&entity, id, &payload),
                None => backend.create(&entity, &payload),
            }
            .map_err(|e| format!("{e}"))?;
            Ok(LoadOutcome::Persisted(env))
        })();
        let _ = tx.send(LoadMsg {
            key,
            outcome,
            kind: LoadKind::Persist,
        });
    });
}
