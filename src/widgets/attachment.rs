use crate::model::AttachmentConfig;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};

#[derive(Clone, Debug, PartialEq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub size: u64,
    pub mime: String,
}

// Three distinguishable outcomes against a pre-existing remote value:
// Keep    -> field omitted from the payload (no change),
// Remove  -> explicit null (removal intent),
// Replace -> the freshly chosen file reference.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AttachmentValue {
    #[default]
    Keep,
    Remove,
    Replace(LocalFile),
}

// Transient preview handle for a locally staged file. Handles register in a
// process-wide set and deregister on drop, so a preview can never outlive
// the value that owns it. Remote URLs are previewed as plain strings and
// need no handle.
#[derive(Debug)]
pub struct Preview {
    id: u64,
    pub source: String,
}

static ACTIVE_PREVIEWS: OnceLock<Mutex<HashSet<u64>>> = OnceLock::new();
static NEXT_PREVIEW_ID: AtomicU64 = AtomicU64::new(1);

fn active() -> &'static Mutex<HashSet<u64>> {
    ACTIVE_PREVIEWS.get_or_init(|| Mutex::new(HashSet::new()))
}

impl Preview {
    pub fn local(source: impl Into<String>) -> Self {
        let id = NEXT_PREVIEW_ID.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut set) = active().lock() {
            set.insert(id);
        }
        Self {
            id,
            source: source.into(),
        }
    }
}

impl Drop for Preview {
    fn drop(&mut self) {
        if let Ok(mut set) = active().lock() {
            set.remove(&self.id);
        }
    }
}

pub fn active_previews() -> usize {
    active().lock().map(|set| set.len()).unwrap_or(0)
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "csv" => "text/csv",
        "txt" => "text/plain",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

fn accepts(accept: &[String], mime: &str) -> bool {
    accept.iter().any(|a| {
        if let Some(prefix) = a.strip_suffix("/*") {
            mime.starts_with(prefix) && mime.as_bytes().get(prefix.len()) == Some(&b'/')
        } else {
            a == mime
        }
    })
}

// Size/type gate, split from the fs probe so it can run on any LocalFile.
pub fn check(file: &LocalFile, cfg: &AttachmentConfig) -> Result<(), String> {
    if file.size > cfg.max_bytes {
        let mb = cfg.max_bytes as f64 / (1024.0 * 1024.0);
        return Err(format!("File is too large (max {mb:.1} MB)"));
    }
    if !accepts(&cfg.accept, &file.mime) {
        return Err(format!("Unsupported file type: {}", file.mime));
    }
    Ok(())
}

pub fn probe(path: &Path, cfg: &AttachmentConfig) -> Result<LocalFile, String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("Cannot read file: {e}"))?;
    if !meta.is_file() {
        return Err("Not a regular file".into());
    }
    let file = LocalFile {
        path: path.to_path_buf(),
        size: meta.len(),
        mime: mime_for_path(path).to_string(),
    };
    check(&file, cfg)?;
    Ok(file)
}

#[derive(Debug)]
pub struct AttachmentState {
    pub config: AttachmentConfig,
    // Remote URL from the loaded entity, if any.
    pub existing: Option<String>,
    pub value: AttachmentValue,
    preview: Option<Preview>,
    // Path being typed while editing.
    pub input: String,
    pub read_only: bool,
}

impl AttachmentState {
    pub fn new(config: AttachmentConfig) -> Self {
        Self {
            config,
            existing: None,
            value: AttachmentValue::Keep,
            preview: None,
            input: String::new(),
            read_only: false,
        }
    }

    pub fn bind_existing(&mut self, url: Option<String>) {
        self.existing = url.filter(|u| !u.is_empty());
        self.value = AttachmentValue::Keep;
        self.preview = None;
    }

    // Stage a replacement. The old preview handle (if any) is released by the
    // assignment; the new one lives exactly as long as this value.
    pub fn stage(&mut self, file: LocalFile) {
        self.preview = Some(Preview::local(file.path.display().to_string()));
        self.value = AttachmentValue::Replace(file);
        self.input.clear();
    }

    pub fn stage_path(&mut self, path: &Path) -> Result<(), String> {
        if self.read_only {
            return Ok(());
        }
        let file = probe(path, &self.config)?;
        self.stage(file);
        Ok(())
    }

    pub fn remove(&mut self) {
        self.value = AttachmentValue::Remove;
        self.preview = None;
    }

    pub fn keep(&mut self) {
        self.value = AttachmentValue::Keep;
        self.preview = None;
    }

    pub fn preview_source(&self) -> Option<String> {
        match &self.value {
            AttachmentValue::Replace(_) => self.preview.as_ref().map(|p| p.source.clone()),
            AttachmentValue::Keep => self.existing.clone(),
            AttachmentValue::Remove => None,
        }
    }

    // Current value as seen by dirty tracking: the remote URL while untouched,
    // null after removal, the staged path after replacement.
    pub fn value_json(&self) -> JsonValue {
        match &self.value {
            AttachmentValue::Keep => self
                .existing
                .clone()
                .map(JsonValue::String)
                .unwrap_or(JsonValue::Null),
            AttachmentValue::Remove => JsonValue::Null,
            AttachmentValue::Replace(f) => JsonValue::String(f.path.display().to_string()),
        }
    }

    // Payload contribution: None means "omit the field entirely".
    pub fn payload_value(&self) -> Option<JsonValue> {
        match &self.value {
            AttachmentValue::Keep => None,
            AttachmentValue::Remove => Some(JsonValue::Null),
            AttachmentValue::Replace(f) => Some(JsonValue::String(f.path.display().to_string())),
        }
    }

    // A required attachment is satisfied by a staged replacement or by the
    // remote value still being kept.
    pub fn required_satisfied(&self) -> bool {
        match &self.value {
            AttachmentValue::Replace(_) => true,
            AttachmentValue::Remove => false,
            AttachmentValue::Keep => self.existing.is_some(),
        }
    }

    pub fn summary(&self) -> String {
        match &self.value {
            AttachmentValue::Replace(f) => {
                let name = f
                    .path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("file");
                format!("new: {name}")
            }
            AttachmentValue::Remove => "(removed)".into(),
            AttachmentValue::Keep => self
                .existing
                .clone()
                .unwrap_or_else(|| "(none)".into()),
        }
    }
}
