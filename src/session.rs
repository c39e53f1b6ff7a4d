use crate::behavior::resolve_behavior;
use crate::model::{FieldKind, ReferenceConfig, ScreenMode, ScreenSpec};
use crate::schema::value_as_string;
use crate::widgets::form::{self, Editor, FormState};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

// How long success/error stay on screen before the form returns to ready
// (10 ticks at the 200ms tick rate, ~2s).
pub const STATUS_TICKS: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionStatus {
    Loading,
    Ready,
    Submitting,
    Success { until_tick: u64 },
    Error { message: String, until_tick: u64 },
    // Initial load failed; the form is blocked until a manual retry.
    DataError { message: String },
}

// Lifecycle around one mounted form: initial load (update mode), dirtiness
// baseline, submit single-flight, and the transient success/error window.
#[derive(Debug)]
pub struct FormSession {
    pub screen: ScreenSpec,
    pub status: SessionStatus,
    pub original: BTreeMap<String, JsonValue>,
    // Snapshot taken at submit time, promoted to `original` once the success
    // window closes so the form stops being dirty.
    pending_promote: Option<BTreeMap<String, JsonValue>>,
}

impl FormSession {
    pub fn new(screen: ScreenSpec) -> Self {
        let status = match screen.mode {
            ScreenMode::Update => SessionStatus::Loading,
            ScreenMode::Create => SessionStatus::Ready,
        };
        Self {
            screen,
            status,
            original: BTreeMap::new(),
            pending_promote: None,
        }
    }

    pub fn is_update(&self) -> bool {
        self.screen.mode == ScreenMode::Update
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.screen.entity_id.as_deref()
    }

    // Keys are swallowed while a request is in flight.
    pub fn locked(&self) -> bool {
        matches!(
            self.status,
            SessionStatus::Loading | SessionStatus::Submitting
        )
    }

    // Create mode: defaults are the baseline.
    pub fn capture_original(&mut self, form: &mut FormState) {
        self.original = form::values(form);
        form::compute_dirty(form, &self.original);
    }

    pub fn mark_loaded(&mut self, form: &mut FormState, data: &JsonValue) {
        form::set_values(form, data);
        derive_switch_configs(form);
        self.original = form::values(form);
        form::compute_dirty(form, &self.original);
        self.status = SessionStatus::Ready;
    }

    pub fn mark_data_error(&mut self, message: String) {
        self.status = SessionStatus::DataError { message };
    }

    pub fn begin_submit(&mut self) {
        self.status = SessionStatus::Submitting;
    }

    pub fn submit_succeeded(&mut self, form: &FormState, tick: u64) {
        self.pending_promote = Some(form::values(form));
        self.status = SessionStatus::Success {
            until_tick: tick.saturating_add(STATUS_TICKS),
        };
    }

    // Values stay untouched so a corrected resubmit needs no re-entry.
    pub fn submit_failed(&mut self, message: String, tick: u64) {
        self.status = SessionStatus::Error {
            message,
            until_tick: tick.saturating_add(STATUS_TICKS),
        };
    }

    fn promote(&mut self, form: &mut FormState) {
        if let Some(snapshot) = self.pending_promote.take() {
            self.original = snapshot;
            form::compute_dirty(form, &self.original);
        }
    }

    // Success/error expire back to ready after the display window.
    pub fn on_tick(&mut self, form: &mut FormState, tick: u64) -> bool {
        match &self.status {
            SessionStatus::Success { until_tick } if tick >= *until_tick => {
                self.promote(form);
                self.status = SessionStatus::Ready;
                true
            }
            SessionStatus::Error { until_tick, .. } if tick >= *until_tick => {
                self.status = SessionStatus::Ready;
                true
            }
            _ => false,
        }
    }

    // The next edit cuts the display window short.
    pub fn edited(&mut self, form: &mut FormState) {
        match self.status {
            SessionStatus::Success { .. } => {
                self.promote(form);
                self.status = SessionStatus::Ready;
            }
            SessionStatus::Error { .. } => {
                self.status = SessionStatus::Ready;
            }
            _ => {}
        }
    }

    pub fn reset(&mut self, form: &mut FormState) {
        form::reset_to_original(form, &self.original);
        self.status = SessionStatus::Ready;
    }

    pub fn build_payload(&self, form: &FormState) -> JsonValue {
        let payload = build_payload(form);
        match self
            .screen
            .before_submit
            .as_deref()
            .and_then(crate::behavior::resolve_transform)
        {
            Some(t) => t.apply(payload),
            None => payload,
        }
    }
}

// Payload construction: read-only fields are dropped, attachments contribute
// their three-state value, everything else is serialized per kind. Empty
// scalar values are omitted rather than sent as empty strings.
pub fn build_payload(form: &FormState) -> JsonValue {
    let mut map = Map::new();
    for f in &form.fields {
        if f.spec.read_only {
            continue;
        }
        let name = f.spec.name.clone();
        match &f.editor {
            Editor::Attachment(st) => {
                if let Some(v) = st.payload_value() {
                    map.insert(name, v);
                }
            }
            Editor::Checkbox { on } => {
                map.insert(name, JsonValue::Bool(*on));
            }
            Editor::Number { buf } => {
                let t = buf.trim();
                if t.is_empty() {
                    continue;
                }
                match t.parse::<f64>() {
                    Ok(v) if f.spec.integer => {
                        map.insert(name, JsonValue::from(v as i64));
                    }
                    Ok(v) => {
                        if let Some(n) = serde_json::Number::from_f64(v) {
                            map.insert(name, JsonValue::Number(n));
                        }
                    }
                    Err(_) => {
                        map.insert(name, JsonValue::String(t.to_string()));
                    }
                }
            }
            Editor::Text { buf, .. } if f.spec.kind == FieldKind::Custom => {
                if buf.trim().is_empty() {
                    continue;
                }
                let raw = JsonValue::String(buf.clone());
                let v = f
                    .spec
                    .behavior
                    .as_deref()
                    .and_then(resolve_behavior)
                    .map(|b| b.serialize(&raw))
                    .unwrap_or(raw);
                map.insert(name, v);
            }
            Editor::Text { buf, .. } | Editor::Multiline { buf } => {
                if !buf.trim().is_empty() {
                    map.insert(name, JsonValue::String(buf.clone()));
                }
            }
            Editor::Choice { picked, .. } => {
                if let Some(c) = picked.and_then(|i| f.spec.options.get(i)) {
                    map.insert(name, c.value.clone());
                }
            }
            Editor::MultiChoice { picked, .. } => {
                let vals: Vec<JsonValue> = f
                    .spec
                    .options
                    .iter()
                    .zip(picked.iter())
                    .filter(|(_, on)| **on)
                    .map(|(c, _)| c.value.clone())
                    .collect();
                if !vals.is_empty() {
                    map.insert(name, JsonValue::Array(vals));
                }
            }
            Editor::Reference(st) => {
                if let Some(v) = st.value() {
                    map.insert(name, JsonValue::String(v));
                }
            }
            Editor::Hidden { value } => {
                if !value.is_null() {
                    map.insert(name, value.clone());
                }
            }
        }
    }
    JsonValue::Object(map)
}

// Re-derive conditional reference fields after an edit to `changed`. When the
// watched value lands on a different case, the dependent field's lookup is
// swapped and its stale id dropped. Returns the names that were re-derived.
pub fn apply_switches(form: &mut FormState, changed: &str) -> Vec<String> {
    let new_value = form
        .field(changed)
        .map(|f| value_as_string(&f.value()))
        .unwrap_or_default();
    let mut touched = Vec::new();
    for i in 0..form.fields.len() {
        let Some(sw) = form.fields[i].spec.switch.clone() else {
            continue;
        };
        if sw.on != changed {
            continue;
        }
        let case = sw.cases.get(&new_value).cloned();
        let case_key = case.as_ref().map(|_| new_value.clone());
        let fld = &mut form.fields[i];
        if fld.active_case == case_key {
            continue;
        }
        fld.active_case = case_key;
        if let Editor::Reference(st) = &mut fld.editor {
            st.rebind(case);
        }
        fld.error = None;
        touched.push(fld.spec.name.clone());
    }
    touched
}

// Load-time variant: point each conditional field at the case selected by the
// loaded data without discarding the value that came with it.
pub fn derive_switch_configs(form: &mut FormState) {
    let snapshot: BTreeMap<String, String> = form
        .fields
        .iter()
        .map(|f| (f.spec.name.clone(), value_as_string(&f.value())))
        .collect();
    for fld in &mut form.fields {
        let Some(sw) = &fld.spec.switch else { continue };
        let watched = snapshot.get(&sw.on).cloned().unwrap_or_default();
        let case: Option<ReferenceConfig> = sw.cases.get(&watched).cloned();
        fld.active_case = case.as_ref().map(|_| watched);
        if let Editor::Reference(st) = &mut fld.editor {
            st.config = case;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttachmentConfig, ChoiceSpec, FieldSpec, FieldSwitch};
    use crate::widgets::attachment::LocalFile;
    use serde_json::json;

    fn ref_cfg(endpoint: &str) -> ReferenceConfig {
        serde_yaml::from_str(&format!("endpoint: {endpoint}")).unwrap()
    }

    fn update_screen(fields: Vec<FieldSpec>) -> ScreenSpec {
        ScreenSpec {
            id: "brand-edit".into(),
            title: "Edit Brand".into(),
            entity: "brands".into(),
            mode: ScreenMode::Update,
            entity_id: Some("7".into()),
            fields,
            ..Default::default()
        }
    }

    fn switch_fields() -> Vec<FieldSpec> {
        let mut cases = BTreeMap::new();
        cases.insert("BRAND".to_string(), ref_cfg("brands"));
        cases.insert("CATEGORY".to_string(), ref_cfg("categories"));
        vec![
            FieldSpec {
                name: "type".into(),
                kind: FieldKind::Select,
                options: vec![
                    ChoiceSpec {
                        label: "Brand".into(),
                        value: json!("BRAND"),
                    },
                    ChoiceSpec {
                        label: "Category".into(),
                        value: json!("CATEGORY"),
                    },
                ],
                ..Default::default()
            },
            FieldSpec {
                name: "reference_id".into(),
                kind: FieldKind::Reference,
                switch: Some(FieldSwitch {
                    on: "type".into(),
                    cases,
                }),
                ..Default::default()
            },
        ]
    }

    #[test]
    fn update_mode_starts_loading_and_ready_after_load() {
        let screen = update_screen(vec![FieldSpec {
            name: "title".into(),
            ..Default::default()
        }]);
        let mut form = FormState::from_screen(&screen);
        let mut session = FormSession::new(screen);
        assert_eq!(session.status, SessionStatus::Loading);
        assert!(session.locked());
        session.mark_loaded(&mut form, &json!({"title": "Acme"}));
        assert_eq!(session.status, SessionStatus::Ready);
        assert_eq!(form.field("title").unwrap().value(), json!("Acme"));
        assert!(!form.dirty);
    }

    #[test]
    fn data_error_blocks_until_retry() {
        let screen = update_screen(vec![]);
        let mut session = FormSession::new(screen);
        session.mark_data_error("backend unreachable".into());
        assert!(matches!(session.status, SessionStatus::DataError { .. }));
        assert!(!session.locked());
    }

    #[test]
    fn failed_submit_keeps_values_and_expires_to_ready() {
        let screen = update_screen(vec![FieldSpec {
            name: "title".into(),
            ..Default::default()
        }]);
        let mut form = FormState::from_screen(&screen);
        let mut session = FormSession::new(screen);
        session.mark_loaded(&mut form, &json!({"title": "Acme"}));
        form.field_mut("title").unwrap().set_value(&json!("Acme 2"));
        session.begin_submit();
        session.submit_failed("Update failed".into(), 100);
        match &session.status {
            SessionStatus::Error { message, .. } => assert_eq!(message, "Update failed"),
            other => panic!("unexpected status {other:?}"),
        }
        // Entered values survive the failure.
        assert_eq!(form.field("title").unwrap().value(), json!("Acme 2"));
        assert!(!session.on_tick(&mut form, 105));
        assert!(session.on_tick(&mut form, 110));
        assert_eq!(session.status, SessionStatus::Ready);
        // Still dirty against the loaded baseline: nothing was promoted.
        assert!(form::compute_dirty(&mut form, &session.original));
    }

    #[test]
    fn successful_submit_promotes_the_snapshot() {
        let screen = update_screen(vec![FieldSpec {
            name: "title".into(),
            ..Default::default()
        }]);
        let mut form = FormState::from_screen(&screen);
        let mut session = FormSession::new(screen);
        session.mark_loaded(&mut form, &json!({"title": "Acme"}));
        form.field_mut("title").unwrap().set_value(&json!("Acme 2"));
        form::compute_dirty(&mut form, &session.original);
        assert!(form.dirty);
        session.begin_submit();
        session.submit_succeeded(&form, 50);
        assert!(session.on_tick(&mut form, 60));
        assert_eq!(session.status, SessionStatus::Ready);
        // The submitted values are the new baseline.
        assert!(!form.dirty);
        assert_eq!(session.original.get("title"), Some(&json!("Acme 2")));
    }

    #[test]
    fn switch_swaps_lookup_and_clears_stale_reference() {
        let screen = ScreenSpec {
            id: "promo".into(),
            title: "Promotion".into(),
            entity: "promotions".into(),
            fields: switch_fields(),
            ..Default::default()
        };
        let mut form = FormState::from_screen(&screen);
        form.field_mut("type").unwrap().set_value(&json!("BRAND"));
        apply_switches(&mut form, "type");
        // Pick a brand id, then flip the type.
        form.field_mut("reference_id").unwrap().set_value(&json!("42"));
        assert_eq!(form.field("reference_id").unwrap().value(), json!("42"));
        form.field_mut("type").unwrap().set_value(&json!("CATEGORY"));
        let touched = apply_switches(&mut form, "type");
        assert_eq!(touched, vec!["reference_id".to_string()]);
        assert_eq!(form.field("reference_id").unwrap().value(), JsonValue::Null);
        if let Editor::Reference(st) = &form.field("reference_id").unwrap().editor {
            assert_eq!(st.config.as_ref().unwrap().endpoint, "categories");
        } else {
            panic!("expected reference editor");
        }
        // Same value again: no re-derivation, nothing cleared.
        form.field_mut("reference_id").unwrap().set_value(&json!("9"));
        assert!(apply_switches(&mut form, "type").is_empty());
        assert_eq!(form.field("reference_id").unwrap().value(), json!("9"));
    }

    #[test]
    fn load_time_derivation_keeps_the_loaded_reference() {
        let screen = update_screen(switch_fields());
        let mut form = FormState::from_screen(&screen);
        let mut session = FormSession::new(screen);
        session.mark_loaded(&mut form, &json!({"type": "BRAND", "reference_id": "42"}));
        // The dependent field kept its id and points at the right endpoint.
        assert_eq!(form.field("reference_id").unwrap().value(), json!("42"));
        if let Editor::Reference(st) = &form.field("reference_id").unwrap().editor {
            assert_eq!(st.config.as_ref().unwrap().endpoint, "brands");
        } else {
            panic!("expected reference editor");
        }
    }

    #[test]
    fn payload_applies_three_state_attachments_and_kinds() {
        let screen = update_screen(vec![
            FieldSpec {
                name: "id".into(),
                read_only: true,
                ..Default::default()
            },
            FieldSpec {
                name: "title".into(),
                ..Default::default()
            },
            FieldSpec {
                name: "sort".into(),
                kind: FieldKind::Number,
                integer: true,
                ..Default::default()
            },
            FieldSpec {
                name: "active".into(),
                kind: FieldKind::Boolean,
                ..Default::default()
            },
            FieldSpec {
                name: "logo".into(),
                kind: FieldKind::Image,
                ..Default::default()
            },
            FieldSpec {
                name: "banner".into(),
                kind: FieldKind::Image,
                ..Default::default()
            },
            FieldSpec {
                name: "pin".into(),
                kind: FieldKind::Custom,
                behavior: Some("geo_point".into()),
                ..Default::default()
            },
        ]);
        let mut form = FormState::from_screen(&screen);
        form::set_values(
            &mut form,
            &json!({
                "id": "7",
                "title": "Acme",
                "sort": "3",
                "active": true,
                "logo": "https://cdn/logo.png",
                "banner": "https://cdn/banner.png",
                "pin": "52.0,21.0"
            }),
        );
        // logo untouched (Keep), banner explicitly removed.
        if let Editor::Attachment(st) = &mut form.field_mut("banner").unwrap().editor {
            st.remove();
        }
        let payload = build_payload(&form);
        let obj = payload.as_object().unwrap();
        // Read-only dropped, Keep omitted, Remove is an explicit null.
        assert!(!obj.contains_key("id"));
        assert!(!obj.contains_key("logo"));
        assert_eq!(obj.get("banner"), Some(&JsonValue::Null));
        assert_eq!(obj.get("title"), Some(&json!("Acme")));
        assert_eq!(obj.get("sort"), Some(&json!(3)));
        assert_eq!(obj.get("active"), Some(&json!(true)));
        assert_eq!(obj.get("pin"), Some(&json!({"lat": 52.0, "lon": 21.0})));

        // Replace contributes the staged file reference.
        if let Editor::Attachment(st) = &mut form.field_mut("logo").unwrap().editor {
            st.stage(LocalFile {
                path: "/tmp/new-logo.png".into(),
                size: 10,
                mime: "image/png".into(),
            });
        }
        let payload = build_payload(&form);
        assert_eq!(
            payload.as_object().unwrap().get("logo"),
            Some(&json!("/tmp/new-logo.png"))
        );
    }

    #[test]
    fn before_submit_transform_wraps_the_payload() {
        let mut screen = update_screen(vec![FieldSpec {
            name: "title".into(),
            ..Default::default()
        }]);
        screen.before_submit = Some("wrap_payload".into());
        let mut form = FormState::from_screen(&screen);
        let mut session = FormSession::new(screen);
        session.mark_loaded(&mut form, &json!({"title": "Acme"}));
        let payload = session.build_payload(&form);
        assert_eq!(payload, json!({"payload": {"title": "Acme"}}));
    }

    #[test]
    fn attachment_config_defaults_apply() {
        let cfg = AttachmentConfig::default();
        assert_eq!(cfg.max_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.accept, vec!["image/*".to_string()]);
    }
}
