use anyhow::{anyhow, Context, Result};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::process::Command;
use std::{collections::HashMap, env};

// Query for one reference-option page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionQuery {
    pub page: u32,
    pub page_size: u32,
    pub search: String,
    pub filters: BTreeMap<String, String>,
}

// The console stays agnostic to how the catalog service is reached; all
// remote traffic goes through this trait. The default implementation shells
// out to a catalog CLI speaking a JSON envelope.
pub trait CatalogBackend: Send + Sync {
    fn fetch_entity(&self, entity: &str, id: &str) -> Result<JsonValue>;
    fn fetch_options(&self, endpoint: &str, query: &OptionQuery) -> Result<JsonValue>;
    fn create(&self, entity: &str, payload: &JsonValue) -> Result<JsonValue>;
    fn update(&self, entity: &str, id: &str, payload: &JsonValue) -> Result<JsonValue>;
}

pub struct CliBackend;

impl CliBackend {
    fn base_args(&self) -> Result<Vec<String>> {
        let bin = expand_cmdline_env("${CATALOG_BIN}");
        let parts = shlex::split(&bin).ok_or_else(|| anyhow!("Failed to parse CATALOG_BIN"))?;
        if parts.is_empty() {
            return Err(anyhow!("Empty CATALOG_BIN"));
        }
        Ok(parts)
    }

    fn run(&self, args: Vec<String>) -> Result<JsonValue> {
        let mut parts = self.base_args()?;
        parts.extend(args);
        run_argv_to_json(&parts)
    }
}

impl CatalogBackend for CliBackend {
    fn fetch_entity(&self, entity: &str, id: &str) -> Result<JsonValue> {
        self.run(vec![
            entity.to_string(),
            "get".into(),
            "--id".into(),
            id.to_string(),
        ])
    }

    fn fetch_options(&self, endpoint: &str, query: &OptionQuery) -> Result<JsonValue> {
        let mut args = vec![
            endpoint.to_string(),
            "list".into(),
            "--page".into(),
            query.page.to_string(),
            "--page-size".into(),
            query.page_size.to_string(),
        ];
        if !query.search.is_empty() {
            args.push("--search".into());
            args.push(query.search.clone());
        }
        for (k, v) in &query.filters {
            args.push(format!("--{k}"));
            args.push(v.clone());
        }
        self.run(args)
    }

    fn create(&self, entity: &str, payload: &JsonValue) -> Result<JsonValue> {
        self.run(vec![
            entity.to_string(),
            "create".into(),
            "--json".into(),
            payload.to_string(),
        ])
    }

    fn update(&self, entity: &str, id: &str, payload: &JsonValue) -> Result<JsonValue> {
        self.run(vec![
            entity.to_string(),
            "update".into(),
            "--id".into(),
            id.to_string(),
            "--json".into(),
            payload.to_string(),
        ])
    }
}

fn expand_cmdline_env(cmdline: &str) -> String {
    // Expand ${VAR} from environment; special-case ${CATALOG_BIN}
    // (quoted if it contains whitespace) with a default of "catalog-cli".
    let re = Regex::new(r"\$\{([A-Z0-9_]+)\}").expect("static pattern");
    let env_map: HashMap<String, String> = env::vars().collect();
    re.replace_all(cmdline, |caps: &regex::Captures| {
        let key = &caps[1];
        if key == "CATALOG_BIN" {
            if let Some(v) = env_map.get("CATALOG_BIN") {
                let needs_quote = v.chars().any(|c| c.is_whitespace());
                if needs_quote {
                    let escaped = v.replace('"', "\\\"");
                    return format!("\"{escaped}\"");
                }
                return v.to_string();
            }
            return "catalog-cli".to_string();
        }
        env_map.get(key).cloned().unwrap_or_default()
    })
    .to_string()
}

fn run_argv_to_json(parts: &[String]) -> Result<JsonValue> {
    let program = &parts[0];
    let args = &parts[1..];
    let output = Command::new(program)
        .args(args)
        .env("CATALOG_TUI_JSON", "1")
        .output()
        .with_context(|| format!("spawning {}", parts.join(" ")))?;
    if output.status.success() {
        let text = String::from_utf8_lossy(&output.stdout).to_string();
        let v: JsonValue = serde_json::from_str(&text).with_context(|| "parsing command JSON")?;
        return Ok(v);
    }
    // Error envelopes arrive on stderr; pass them through so field-level
    // errors can be mapped, otherwise surface the raw text.
    let err_text = String::from_utf8_lossy(&output.stderr).to_string();
    if let Ok(v) = serde_json::from_str::<JsonValue>(&err_text) {
        return Ok(v);
    }
    Err(anyhow!("Command failed: {}\n{}", parts.join(" "), err_text))
}

// ---- JSON envelope helpers ----------------------------------------------

pub fn envelope_ok(v: &JsonValue) -> bool {
    v.get("ok").and_then(|b| b.as_bool()).unwrap_or(true)
}

pub fn envelope_data(v: &JsonValue) -> JsonValue {
    v.get("data").cloned().unwrap_or(JsonValue::Null)
}

pub fn envelope_error_message(v: &JsonValue) -> String {
    v.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|s| s.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Request failed".to_string())
}

// Per-field errors from the service, shaped as
// error.details.errors[] = { loc: [..., <field>], msg }.
pub fn envelope_field_errors(v: &JsonValue) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let errors = v
        .get("error")
        .and_then(|e| e.get("details"))
        .and_then(|d| d.get("errors"))
        .and_then(|a| a.as_array());
    if let Some(arr) = errors {
        for item in arr {
            let field = item
                .get("loc")
                .and_then(|l| l.as_array())
                .and_then(|l| l.last())
                .and_then(|s| s.as_str());
            let msg = item.get("msg").and_then(|s| s.as_str());
            if let (Some(field), Some(msg)) = (field, msg) {
                out.push((field.to_string(), msg.to_string()));
            }
        }
    }
    out
}
