use crate::model::{FieldKind, FieldSpec, ValueType};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

// One structural rule per field, derived from the field kind unless the
// descriptor carries an explicit override. Rules are deserializable so that
// overrides can live in the screen YAML next to the field.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Str {
        #[serde(default)]
        required: bool,
        #[serde(default)]
        min_len: Option<usize>,
        #[serde(default)]
        max_len: Option<usize>,
        #[serde(default)]
        pattern: Option<String>,
        #[serde(default)]
        email: bool,
    },
    Num {
        #[serde(default)]
        required: bool,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
        #[serde(default)]
        integer: bool,
    },
    // Required checkboxes enforce acceptance: the value must be true.
    Accept {
        #[serde(default)]
        required: bool,
    },
    OneOf {
        #[serde(default)]
        required: bool,
        values: Vec<JsonValue>,
        #[serde(default)]
        value_type: ValueType,
    },
    StrSeq {
        #[serde(default)]
        required: bool,
        #[serde(default)]
        allowed: Option<Vec<String>>,
    },
    Stamp {
        #[serde(default)]
        required: bool,
        #[serde(default)]
        with_time: bool,
    },
    NonEmpty {
        #[serde(default)]
        required: bool,
    },
    Anything,
}

pub struct ValidationSchema {
    rules: BTreeMap<String, Rule>,
}

impl ValidationSchema {
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    // Full-form pass used as the submit gate; per-field checks run on edit.
    pub fn check_all(&self, values: &BTreeMap<String, JsonValue>) -> BTreeMap<String, String> {
        let mut errors = BTreeMap::new();
        for (name, rule) in &self.rules {
            let value = values.get(name).cloned().unwrap_or(JsonValue::Null);
            if let Err(msg) = rule.check(&value) {
                errors.insert(name.clone(), msg);
            }
        }
        errors
    }
}

pub fn generate_schema(fields: &[FieldSpec]) -> ValidationSchema {
    let mut rules = BTreeMap::new();
    for f in fields {
        // Read-only fields are rendered but never validated or submitted.
        if f.read_only {
            continue;
        }
        let rule = match &f.rule {
            Some(explicit) => explicit.clone(),
            None => default_rule(f),
        };
        rules.insert(f.name.clone(), rule);
    }
    ValidationSchema { rules }
}

fn default_rule(f: &FieldSpec) -> Rule {
    match f.kind {
        FieldKind::Text | FieldKind::Password | FieldKind::Multiline => Rule::Str {
            required: f.required,
            min_len: f.min_len,
            max_len: f.max_len,
            pattern: f.pattern.clone(),
            email: false,
        },
        FieldKind::Email => Rule::Str {
            required: f.required,
            min_len: f.min_len,
            max_len: f.max_len,
            pattern: f.pattern.clone(),
            email: true,
        },
        FieldKind::Number => Rule::Num {
            required: f.required,
            // With no explicit lower bound, minimum 1 stands in as the
            // presence check for required numbers. An explicit bound wins
            // and is combined with the presence requirement.
            min: f.min.or(if f.required { Some(1.0) } else { None }),
            max: f.max,
            integer: f.integer,
        },
        FieldKind::Boolean => Rule::Accept {
            required: f.required,
        },
        FieldKind::Select | FieldKind::Radio => Rule::OneOf {
            required: f.required,
            values: f.options.iter().map(|c| c.value.clone()).collect(),
            value_type: f.value_type(),
        },
        FieldKind::MultiSelect => Rule::StrSeq {
            required: f.required,
            allowed: Some(
                f.options
                    .iter()
                    .map(|c| value_as_string(&c.value))
                    .collect(),
            ),
        },
        FieldKind::Date => Rule::Stamp {
            required: f.required,
            with_time: false,
        },
        FieldKind::DateTime => Rule::Stamp {
            required: f.required,
            with_time: true,
        },
        FieldKind::Reference => Rule::NonEmpty {
            required: f.required,
        },
        // Attachments and custom fields own their validation; hidden fields
        // pass through as-is.
        FieldKind::File | FieldKind::Image | FieldKind::Custom | FieldKind::Hidden => {
            Rule::Anything
        }
    }
}

impl Rule {
    pub fn check(&self, value: &JsonValue) -> Result<(), String> {
        match self {
            Rule::Str {
                required,
                min_len,
                max_len,
                pattern,
                email,
            } => {
                let raw = value_as_string(value);
                let t = raw.trim();
                if t.is_empty() {
                    if *required {
                        return Err("This field is required".into());
                    }
                    return Ok(());
                }
                if let Some(minl) = min_len {
                    if t.chars().count() < *minl {
                        return Err(format!("Must be at least {minl} characters"));
                    }
                }
                if let Some(maxl) = max_len {
                    if t.chars().count() > *maxl {
                        return Err(format!("Must be at most {maxl} characters"));
                    }
                }
                if *email && !looks_like_email(t) {
                    return Err("Not a valid email address".into());
                }
                if let Some(pat) = pattern {
                    if let Ok(re) = regex::Regex::new(pat) {
                        if !re.is_match(t) {
                            return Err("Does not match required pattern".into());
                        }
                    }
                }
                Ok(())
            }
            Rule::Num {
                required,
                min,
                max,
                integer,
            } => {
                let raw = value_as_string(value);
                let t = raw.trim();
                if t.is_empty() {
                    if *required {
                        return Err("This field is required".into());
                    }
                    return Ok(());
                }
                let v: f64 = match t.parse() {
                    Ok(v) => v,
                    Err(_) => return Err("Invalid number".into()),
                };
                if *integer && v.fract().abs() > 1e-9 {
                    return Err("Must be a whole number".into());
                }
                if let Some(minv) = min {
                    if v < *minv {
                        return Err(format!("Must be at least {minv}"));
                    }
                }
                if let Some(maxv) = max {
                    if v > *maxv {
                        return Err(format!("Must be at most {maxv}"));
                    }
                }
                Ok(())
            }
            Rule::Accept { required } => {
                if *required && value.as_bool() != Some(true) {
                    return Err("Must be confirmed".into());
                }
                Ok(())
            }
            Rule::OneOf {
                required,
                values,
                value_type,
            } => {
                if value_is_empty(value) {
                    if *required {
                        return Err("Please choose a value".into());
                    }
                    return Ok(());
                }
                let coerced = coerce(*value_type, value);
                if values.iter().any(|v| *v == coerced) {
                    Ok(())
                } else {
                    Err("Not one of the allowed values".into())
                }
            }
            Rule::StrSeq { required, allowed } => {
                let items: Vec<String> = match value {
                    JsonValue::Array(arr) => arr.iter().map(value_as_string).collect(),
                    JsonValue::Null => Vec::new(),
                    _ => return Err("Expected a list of values".into()),
                };
                if items.is_empty() {
                    if *required {
                        return Err("Please select at least one".into());
                    }
                    return Ok(());
                }
                if let Some(allowed) = allowed {
                    for it in &items {
                        if !allowed.contains(it) {
                            return Err(format!("'{it}' is not an allowed value"));
                        }
                    }
                }
                Ok(())
            }
            Rule::Stamp {
                required,
                with_time,
            } => {
                let raw = value_as_string(value);
                let t = raw.trim();
                if t.is_empty() {
                    if *required {
                        return Err("This field is required".into());
                    }
                    return Ok(());
                }
                let pat = if *with_time {
                    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}$"
                } else {
                    r"^\d{4}-\d{2}-\d{2}$"
                };
                let re = regex::Regex::new(pat).expect("static pattern");
                if re.is_match(t) {
                    Ok(())
                } else if *with_time {
                    Err("Expected YYYY-MM-DDTHH:MM".into())
                } else {
                    Err("Expected YYYY-MM-DD".into())
                }
            }
            Rule::NonEmpty { required } => {
                if *required && value_is_empty(value) {
                    return Err("This field is required".into());
                }
                Ok(())
            }
            Rule::Anything => Ok(()),
        }
    }
}

// Coerce a raw edit value to the declared payload type before membership
// checks. "true"/"false" become booleans only when the field says so.
pub fn coerce(value_type: ValueType, value: &JsonValue) -> JsonValue {
    match (value_type, value) {
        (ValueType::Boolean, JsonValue::String(s)) => match s.as_str() {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            _ => value.clone(),
        },
        (ValueType::Number, JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(|v| serde_json::Number::from_f64(v).map(JsonValue::Number))
            .unwrap_or_else(|| value.clone()),
        (ValueType::String, v) if !v.is_string() => JsonValue::String(value_as_string(v)),
        _ => value.clone(),
    }
}

pub fn value_as_string(v: &JsonValue) -> String {
    match v {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn value_is_empty(v: &JsonValue) -> bool {
    match v {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty(),
        JsonValue::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn looks_like_email(t: &str) -> bool {
    let Some((local, domain)) = t.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ChoiceSpec;
    use serde_json::json;

    fn text_field(name: &str, required: bool) -> FieldSpec {
        FieldSpec {
            name: name.into(),
            required,
            ..Default::default()
        }
    }

    #[test]
    fn required_text_rejects_empty_value() {
        let schema = generate_schema(&[text_field("title", true)]);
        let mut values = BTreeMap::new();
        values.insert("title".to_string(), json!(""));
        let errors = schema.check_all(&values);
        assert_eq!(errors.get("title").unwrap(), "This field is required");
        values.insert("title".to_string(), json!("Acme"));
        assert!(schema.check_all(&values).is_empty());
    }

    #[test]
    fn email_rule_requires_at_and_domain_dot() {
        let schema = generate_schema(&[FieldSpec {
            name: "email".into(),
            kind: FieldKind::Email,
            required: true,
            ..Default::default()
        }]);
        let rule = schema.rule("email").unwrap();
        assert!(rule.check(&json!("not-an-email")).is_err());
        assert!(rule.check(&json!("a@b.co")).is_ok());
        assert!(rule.check(&json!("a@b")).is_err());
    }

    #[test]
    fn required_number_gets_presence_minimum_unless_explicit() {
        let schema = generate_schema(&[FieldSpec {
            name: "sort".into(),
            kind: FieldKind::Number,
            required: true,
            ..Default::default()
        }]);
        let rule = schema.rule("sort").unwrap();
        assert!(rule.check(&json!("0")).is_err());
        assert!(rule.check(&json!("3")).is_ok());

        // An explicit bound takes precedence and combines with presence.
        let schema = generate_schema(&[FieldSpec {
            name: "discount".into(),
            kind: FieldKind::Number,
            required: true,
            min: Some(0.0),
            max: Some(100.0),
            ..Default::default()
        }]);
        let rule = schema.rule("discount").unwrap();
        assert!(rule.check(&json!("0")).is_ok());
        assert!(rule.check(&json!("101")).is_err());
        assert!(rule.check(&json!("")).is_err());
    }

    #[test]
    fn required_boolean_enforces_acceptance() {
        let schema = generate_schema(&[FieldSpec {
            name: "terms".into(),
            kind: FieldKind::Boolean,
            required: true,
            ..Default::default()
        }]);
        let rule = schema.rule("terms").unwrap();
        assert!(rule.check(&json!(false)).is_err());
        assert!(rule.check(&json!(true)).is_ok());
    }

    #[test]
    fn radio_coerces_only_with_declared_boolean_type() {
        let options = vec![
            ChoiceSpec {
                label: "Yes".into(),
                value: json!(true),
            },
            ChoiceSpec {
                label: "No".into(),
                value: json!(false),
            },
        ];
        let schema = generate_schema(&[FieldSpec {
            name: "visible".into(),
            kind: FieldKind::Radio,
            required: true,
            options,
            value_type: Some(ValueType::Boolean),
            ..Default::default()
        }]);
        let rule = schema.rule("visible").unwrap();
        assert!(rule.check(&json!("true")).is_ok());
        assert!(rule.check(&json!("maybe")).is_err());
        assert!(rule.check(&json!("")).is_err());
    }

    #[test]
    fn multi_select_checks_membership() {
        let options = vec![
            ChoiceSpec {
                label: "One".into(),
                value: json!("1"),
            },
            ChoiceSpec {
                label: "Two".into(),
                value: json!("2"),
            },
        ];
        let schema = generate_schema(&[FieldSpec {
            name: "cities".into(),
            kind: FieldKind::MultiSelect,
            required: true,
            options,
            ..Default::default()
        }]);
        let rule = schema.rule("cities").unwrap();
        assert!(rule.check(&json!([])).is_err());
        assert!(rule.check(&json!(["1"])).is_ok());
        assert!(rule.check(&json!(["3"])).is_err());
    }

    #[test]
    fn explicit_rule_replaces_generated_one() {
        let schema = generate_schema(&[FieldSpec {
            name: "code".into(),
            required: true,
            rule: Some(Rule::Str {
                required: false,
                min_len: None,
                max_len: None,
                pattern: Some("^[A-Z]{2}$".into()),
                email: false,
            }),
            ..Default::default()
        }]);
        let rule = schema.rule("code").unwrap();
        // Override wins: empty passes, bad pattern fails.
        assert!(rule.check(&json!("")).is_ok());
        assert!(rule.check(&json!("abc")).is_err());
        assert!(rule.check(&json!("DE")).is_ok());
    }

    #[test]
    fn read_only_fields_get_no_rule() {
        let schema = generate_schema(&[FieldSpec {
            name: "id".into(),
            required: true,
            read_only: true,
            ..Default::default()
        }]);
        assert!(schema.rule("id").is_none());
        assert!(schema.is_empty());
    }

    #[test]
    fn date_rules_check_the_expected_shape() {
        let schema = generate_schema(&[
            FieldSpec {
                name: "starts".into(),
                kind: FieldKind::Date,
                ..Default::default()
            },
            FieldSpec {
                name: "ends".into(),
                kind: FieldKind::DateTime,
                ..Default::default()
            },
        ]);
        assert!(schema.rule("starts").unwrap().check(&json!("2024-02-01")).is_ok());
        assert!(schema.rule("starts").unwrap().check(&json!("02/01/2024")).is_err());
        assert!(schema
            .rule("ends")
            .unwrap()
            .check(&json!("2024-02-01T09:30"))
            .is_ok());
        assert!(schema.rule("ends").unwrap().check(&json!("2024-02-01")).is_err());
    }

    #[test]
    fn rule_parses_from_yaml_override() {
        let rule: Rule = serde_yaml::from_str(
            "type: num\nrequired: true\nmin: 0.0\nmax: 1.0\n",
        )
        .unwrap();
        assert!(rule.check(&json!("0.5")).is_ok());
        assert!(rule.check(&json!("2")).is_err());
    }
}
