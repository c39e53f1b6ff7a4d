use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

// Specialized fields (kind: custom) are backed by a named behavior instead of
// closures, so descriptors stay serializable. Behaviors are resolved from the
// registry at form-build time.
pub trait CustomFieldBehavior: Send + Sync {
    fn default_value(&self) -> JsonValue {
        JsonValue::String(String::new())
    }
    fn validate(&self, value: &JsonValue) -> Result<(), String>;
    // One-line summary shown in the field row.
    fn summarize(&self, value: &JsonValue) -> String {
        crate::schema::value_as_string(value)
    }
    // Final payload representation; defaults to the raw value.
    fn serialize(&self, value: &JsonValue) -> JsonValue {
        value.clone()
    }
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<dyn CustomFieldBehavior>>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Arc<dyn CustomFieldBehavior>>> {
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, Arc<dyn CustomFieldBehavior>> = HashMap::new();
        map.insert("geo_point".to_string(), Arc::new(GeoPointBehavior));
        Mutex::new(map)
    })
}

#[allow(dead_code)]
pub fn register_behavior(name: impl Into<String>, behavior: Arc<dyn CustomFieldBehavior>) {
    if let Ok(mut map) = registry().lock() {
        map.insert(name.into(), behavior);
    }
}

pub fn resolve_behavior(name: &str) -> Option<Arc<dyn CustomFieldBehavior>> {
    registry().lock().ok().and_then(|map| map.get(name).cloned())
}

// Screen-level payload hook applied after field serialization, right before
// the persistence call. Named in the screen config (`before_submit`).
pub trait PayloadTransform: Send + Sync {
    fn apply(&self, payload: JsonValue) -> JsonValue;
}

static TRANSFORMS: OnceLock<Mutex<HashMap<String, Arc<dyn PayloadTransform>>>> = OnceLock::new();

fn transforms() -> &'static Mutex<HashMap<String, Arc<dyn PayloadTransform>>> {
    TRANSFORMS.get_or_init(|| {
        let mut map: HashMap<String, Arc<dyn PayloadTransform>> = HashMap::new();
        map.insert("wrap_payload".to_string(), Arc::new(WrapPayload));
        Mutex::new(map)
    })
}

#[allow(dead_code)]
pub fn register_transform(name: impl Into<String>, transform: Arc<dyn PayloadTransform>) {
    if let Ok(mut map) = transforms().lock() {
        map.insert(name.into(), transform);
    }
}

pub fn resolve_transform(name: &str) -> Option<Arc<dyn PayloadTransform>> {
    transforms()
        .lock()
        .ok()
        .and_then(|map| map.get(name).cloned())
}

// Built-in: services that expect the body nested under "payload".
struct WrapPayload;

impl PayloadTransform for WrapPayload {
    fn apply(&self, payload: JsonValue) -> JsonValue {
        serde_json::json!({ "payload": payload })
    }
}

// Built-in: "lat,lon" coordinate pair, serialized as an object. Used by the
// city screens for the map pin.
struct GeoPointBehavior;

fn parse_geo(raw: &str) -> Result<(f64, f64), String> {
    let (lat_s, lon_s) = raw
        .split_once(',')
        .ok_or_else(|| "Expected 'lat,lon'".to_string())?;
    let lat: f64 = lat_s
        .trim()
        .parse()
        .map_err(|_| "Invalid latitude".to_string())?;
    let lon: f64 = lon_s
        .trim()
        .parse()
        .map_err(|_| "Invalid longitude".to_string())?;
    if !(-90.0..=90.0).contains(&lat) {
        return Err("Latitude out of range".into());
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err("Longitude out of range".into());
    }
    Ok((lat, lon))
}

impl CustomFieldBehavior for GeoPointBehavior {
    fn validate(&self, value: &JsonValue) -> Result<(), String> {
        let raw = crate::schema::value_as_string(value);
        if raw.trim().is_empty() {
            return Ok(());
        }
        parse_geo(&raw).map(|_| ())
    }

    fn summarize(&self, value: &JsonValue) -> String {
        let raw = crate::schema::value_as_string(value);
        match parse_geo(&raw) {
            Ok((lat, lon)) => format!("{lat:.4}, {lon:.4}"),
            Err(_) => raw,
        }
    }

    fn serialize(&self, value: &JsonValue) -> JsonValue {
        let raw = crate::schema::value_as_string(value);
        match parse_geo(&raw) {
            Ok((lat, lon)) => serde_json::json!({ "lat": lat, "lon": lon }),
            Err(_) => value.clone(),
        }
    }
}
