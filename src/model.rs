use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Text,
    Email,
    Password,
    Multiline,
    Number,
    Boolean,
    Date,
    DateTime,
    Select,
    MultiSelect,
    Radio,
    Reference,
    File,
    Image,
    Custom,
    Hidden,
}

impl FieldKind {
    pub fn is_attachment(&self) -> bool {
        matches!(self, FieldKind::File | FieldKind::Image)
    }
}

// How option/radio values are typed in the payload. Declared explicitly per
// field; never inferred from option contents.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    String,
    Boolean,
    Number,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChoiceSpec {
    pub label: String,
    pub value: JsonValue,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ReferenceConfig {
    // Remote collection id understood by the backend, e.g. "brands"
    pub endpoint: String,
    #[serde(default = "default_label_key")]
    pub label_key: String,
    #[serde(default = "default_value_key")]
    pub value_key: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    // Static query params appended to every page request
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    // Optional dot-path into the response envelope, e.g. "data.items"
    #[serde(default)]
    pub unwrap: Option<String>,
}

fn default_label_key() -> String {
    "title".into()
}
fn default_value_key() -> String {
    "id".into()
}
fn default_page_size() -> u32 {
    20
}
fn default_debounce_ms() -> u64 {
    400
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AttachmentConfig {
    #[serde(default = "default_accept")]
    pub accept: Vec<String>,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
}

fn default_accept() -> Vec<String> {
    vec!["image/*".into()]
}
// 5 MiB
fn default_max_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            accept: default_accept(),
            max_bytes: default_max_bytes(),
        }
    }
}

// Conditional reference lookup: when the watched field changes, the dependent
// field swaps its ReferenceConfig to the matching case and drops its value.
#[derive(Debug, Deserialize, Clone)]
pub struct FieldSwitch {
    pub on: String,
    pub cases: BTreeMap<String, ReferenceConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FieldSpec {
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub default: Option<JsonValue>,
    // Text constraints
    #[serde(default)]
    pub min_len: Option<usize>,
    #[serde(default)]
    pub max_len: Option<usize>,
    #[serde(default)]
    pub pattern: Option<String>,
    // Numeric constraints
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub integer: bool,
    // Static choices (select/multi_select/radio)
    #[serde(default)]
    pub options: Vec<ChoiceSpec>,
    #[serde(default)]
    pub value_type: Option<ValueType>,
    #[serde(default)]
    pub reference: Option<ReferenceConfig>,
    #[serde(default)]
    pub attachment: Option<AttachmentConfig>,
    // Registered behavior name (kind: custom)
    #[serde(default)]
    pub behavior: Option<String>,
    // Explicit validation override; replaces the generated rule
    #[serde(default)]
    pub rule: Option<crate::schema::Rule>,
    #[serde(default)]
    pub switch: Option<FieldSwitch>,
    // Multiline editor height
    #[serde(default)]
    pub edit_lines: Option<usize>,
}

impl FieldSpec {
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type.unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScreenMode {
    #[default]
    Create,
    Update,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ScreenSpec {
    pub id: String,
    pub title: String,
    // Backend collection this screen persists into, e.g. "brands"
    pub entity: String,
    #[serde(default)]
    pub mode: ScreenMode,
    #[serde(default)]
    pub entity_id: Option<String>,
    // Optional registered payload transform applied before persistence.
    #[serde(default)]
    pub before_submit: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
    // Optional: auto-enter a screen by id on startup
    #[serde(default)]
    pub auto_enter: Option<String>,
    pub screens: Vec<ScreenSpec>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            header: Some("CATALOG TUI".to_string()),
            logo: None,
            auto_enter: None,
            screens: vec![],
        }
    }
}

pub(crate) fn validate_console_config(cfg: &ConsoleConfig) -> Result<(), String> {
    use std::collections::HashSet;
    let mut screen_ids = HashSet::new();
    for (si, s) in cfg.screens.iter().enumerate() {
        if !screen_ids.insert(&s.id) {
            return Err(format!("duplicate screen id: '{}' at index {si}", s.id));
        }
        if s.entity.is_empty() {
            return Err(format!("screen '{}' requires 'entity'", s.id));
        }
        if s.mode == ScreenMode::Update && s.entity_id.as_deref().unwrap_or("").is_empty() {
            return Err(format!("screen '{}' is update mode but has no entity_id", s.id));
        }
        let mut names = HashSet::new();
        for (fi, f) in s.fields.iter().enumerate() {
            if f.name.is_empty() {
                return Err(format!("screen '{}' fields[{fi}] has an empty name", s.id));
            }
            if !names.insert(&f.name) {
                return Err(format!(
                    "screen '{}' fields[{fi}] duplicate field name: '{}'",
                    s.id, f.name
                ));
            }
            match f.kind {
                FieldKind::Reference => {
                    let has_cases = f
                        .switch
                        .as_ref()
                        .map(|sw| !sw.cases.is_empty())
                        .unwrap_or(false);
                    if f.reference.is_none() && !has_cases {
                        return Err(format!(
                            "screen '{}' field '{}' is a reference but has no lookup config",
                            s.id, f.name
                        ));
                    }
                }
                FieldKind::Select | FieldKind::MultiSelect => {
                    if f.options.is_empty() {
                        return Err(format!(
                            "screen '{}' field '{}' requires non-empty 'options'",
                            s.id, f.name
                        ));
                    }
                }
                FieldKind::Radio => {
                    if f.options.is_empty() {
                        return Err(format!(
                            "screen '{}' field '{}' requires non-empty 'options'",
                            s.id, f.name
                        ));
                    }
                    if f.value_type.is_none() {
                        return Err(format!(
                            "screen '{}' field '{}' (radio) must declare 'value_type'",
                            s.id, f.name
                        ));
                    }
                }
                FieldKind::File | FieldKind::Image => {
                    // A required attachment is only satisfiable when a remote
                    // value can already exist, i.e. in update mode.
                    if f.required && s.mode == ScreenMode::Create {
                        return Err(format!(
                            "screen '{}' field '{}' cannot be a required attachment in create mode",
                            s.id, f.name
                        ));
                    }
                }
                FieldKind::Custom => {
                    if f.behavior.as_deref().unwrap_or("").is_empty() {
                        return Err(format!(
                            "screen '{}' field '{}' (custom) requires 'behavior'",
                            s.id, f.name
                        ));
                    }
                }
                _ => {}
            }
            if let Some(vals) = non_unique_option_value(f) {
                return Err(format!(
                    "screen '{}' field '{}' has duplicate option value: {vals}",
                    s.id, f.name
                ));
            }
            if let Some(p) = &f.pattern {
                if regex::Regex::new(p).is_err() {
                    return Err(format!(
                        "screen '{}' field '{}' has an invalid pattern: {p}",
                        s.id, f.name
                    ));
                }
            }
            if let Some(sw) = &f.switch {
                if sw.cases.is_empty() {
                    return Err(format!(
                        "screen '{}' field '{}' switch has no cases",
                        s.id, f.name
                    ));
                }
                if !s.fields.iter().any(|other| other.name == sw.on) {
                    return Err(format!(
                        "screen '{}' field '{}' switches on unknown field '{}'",
                        s.id, f.name, sw.on
                    ));
                }
            }
        }
    }
    Ok(())
}

fn non_unique_option_value(f: &FieldSpec) -> Option<String> {
    let mut seen: Vec<&JsonValue> = Vec::new();
    for c in &f.options {
        if seen.contains(&&c.value) {
            return Some(c.value.to_string());
        }
        seen.push(&c.value);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn screen_with(fields: Vec<FieldSpec>) -> ConsoleConfig {
        ConsoleConfig {
            screens: vec![ScreenSpec {
                id: "brands".into(),
                title: "Brands".into(),
                entity: "brands".into(),
                fields,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn validate_detects_duplicate_field_names() {
        let cfg = screen_with(vec![
            FieldSpec {
                name: "title".into(),
                ..Default::default()
            },
            FieldSpec {
                name: "title".into(),
                ..Default::default()
            },
        ]);
        let err = validate_console_config(&cfg).unwrap_err();
        assert!(err.contains("duplicate field name"));
    }

    #[test]
    fn validate_reference_requires_lookup() {
        let cfg = screen_with(vec![FieldSpec {
            name: "brand_id".into(),
            kind: FieldKind::Reference,
            ..Default::default()
        }]);
        let err = validate_console_config(&cfg).unwrap_err();
        assert!(err.contains("no lookup config"));
    }

    #[test]
    fn validate_radio_requires_explicit_value_type() {
        let cfg = screen_with(vec![FieldSpec {
            name: "active".into(),
            kind: FieldKind::Radio,
            options: vec![
                ChoiceSpec {
                    label: "Yes".into(),
                    value: json!(true),
                },
                ChoiceSpec {
                    label: "No".into(),
                    value: json!(false),
                },
            ],
            ..Default::default()
        }]);
        let err = validate_console_config(&cfg).unwrap_err();
        assert!(err.contains("value_type"));
    }

    #[test]
    fn validate_rejects_required_attachment_in_create_mode() {
        let cfg = screen_with(vec![FieldSpec {
            name: "image".into(),
            kind: FieldKind::Image,
            required: true,
            ..Default::default()
        }]);
        let err = validate_console_config(&cfg).unwrap_err();
        assert!(err.contains("required attachment"));
    }

    #[test]
    fn validate_switch_must_name_existing_field() {
        let mut cases = BTreeMap::new();
        cases.insert(
            "BRAND".to_string(),
            ReferenceConfig {
                endpoint: "brands".into(),
                label_key: default_label_key(),
                value_key: default_value_key(),
                page_size: default_page_size(),
                debounce_ms: default_debounce_ms(),
                filters: BTreeMap::new(),
                unwrap: None,
            },
        );
        let cfg = screen_with(vec![FieldSpec {
            name: "reference_id".into(),
            kind: FieldKind::Reference,
            switch: Some(FieldSwitch {
                on: "kind".into(),
                cases,
            }),
            ..Default::default()
        }]);
        let err = validate_console_config(&cfg).unwrap_err();
        assert!(err.contains("unknown field 'kind'"));
    }

    #[test]
    fn screen_config_parses_from_yaml() {
        let yaml = r#"
header: Catalog Admin
screens:
  - id: brand-new
    title: New Brand
    entity: brands
    fields:
      - name: title
        label: Title
        required: true
        min_len: 2
      - name: type
        kind: select
        options:
          - { label: Brand, value: BRAND }
          - { label: Category, value: CATEGORY }
      - name: reference_id
        kind: reference
        switch:
          on: type
          cases:
            BRAND: { endpoint: brands }
            CATEGORY: { endpoint: categories, label_key: name }
"#;
        let cfg: ConsoleConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.screens.len(), 1);
        let s = &cfg.screens[0];
        assert_eq!(s.fields[1].kind, FieldKind::Select);
        let sw = s.fields[2].switch.as_ref().unwrap();
        assert_eq!(sw.cases["CATEGORY"].label_key, "name");
        assert_eq!(sw.cases["BRAND"].page_size, 20);
        assert!(validate_console_config(&cfg).is_ok());
    }
}
