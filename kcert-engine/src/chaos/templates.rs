//! Fault-injection resource templates.
//!
//! Templates are plain YAML with `{{APP_NAMESPACE}}`, `{{APP_LABEL}}` and
//! `{{APP_KIND}}` tokens replaced verbatim before decoding. A file may hold
//! several documents separated by `---`.

use std::borrow::Cow;
use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::ParseError;

pub const SERVICE_ACCOUNT_TEMPLATE: &str = "service-account.yaml";
pub const EXPERIMENT_TEMPLATE: &str = "experiment-delete.yaml";
pub const CHAOS_ENGINE_TEMPLATE: &str = "chaos-engine.yaml";

/// Creation order: the experiment definition, its service account, then the
/// engine that references both.
pub const CREATION_ORDER: [&str; 3] = [
    EXPERIMENT_TEMPLATE,
    SERVICE_ACCOUNT_TEMPLATE,
    CHAOS_ENGINE_TEMPLATE,
];

const EMBEDDED: [(&str, &str); 3] = [
    (
        SERVICE_ACCOUNT_TEMPLATE,
        include_str!("../../templates/service-account.yaml"),
    ),
    (
        EXPERIMENT_TEMPLATE,
        include_str!("../../templates/experiment-delete.yaml"),
    ),
    (
        CHAOS_ENGINE_TEMPLATE,
        include_str!("../../templates/chaos-engine.yaml"),
    ),
];

/// Values substituted into every template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateValues {
    pub namespace: String,
    /// `key=value` selector of the target pods.
    pub app_label: String,
    /// Lower-case workload kind.
    pub app_kind: String,
}

impl TemplateValues {
    pub fn substitute(&self, template: &str) -> String {
        template
            .replace("{{APP_NAMESPACE}}", &self.namespace)
            .replace("{{APP_LABEL}}", &self.app_label)
            .replace("{{APP_KIND}}", &self.app_kind)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("unknown template {0}")]
    Unknown(String),

    #[error("failed to read template {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Embedded templates, optionally shadowed by files in a directory.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    override_dir: Option<PathBuf>,
}

impl TemplateSet {
    pub fn embedded() -> Self {
        Self::default()
    }

    /// Files present in `dir` replace the embedded template of the same name.
    pub fn with_override_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            override_dir: Some(dir.into()),
        }
    }

    /// Raw template text.
    pub fn source(&self, name: &str) -> Result<Cow<'static, str>, TemplateError> {
        if let Some(dir) = &self.override_dir {
            let path = dir.join(name);
            if path.is_file() {
                debug!(path = %path.display(), "Using template override");
                return std::fs::read_to_string(&path)
                    .map(Cow::Owned)
                    .map_err(|source| TemplateError::Read { path, source });
            }
        }
        EMBEDDED
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, text)| Cow::Borrowed(*text))
            .ok_or_else(|| TemplateError::Unknown(name.to_string()))
    }

    /// Substitute and decode one template into its documents.
    pub fn render(&self, name: &str, values: &TemplateValues) -> Result<Vec<Value>, TemplateError> {
        let text = values.substitute(&self.source(name)?);
        Ok(decode_documents(name, &text)?)
    }
}

/// Decode a YAML stream into JSON objects, skipping empty documents.
///
/// Each document must carry `apiVersion`, `kind` and `metadata.name`.
pub fn decode_documents(source_name: &str, text: &str) -> Result<Vec<Value>, ParseError> {
    let mut documents = Vec::new();
    for (index, document) in serde_yaml_ng::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(document).map_err(|e| ParseError::Document {
            source_name: source_name.to_string(),
            index,
            reason: e.to_string(),
        })?;
        if value.is_null() {
            continue;
        }
        for (pointer, field) in [
            ("/apiVersion", "apiVersion"),
            ("/kind", "kind"),
            ("/metadata/name", "metadata.name"),
        ] {
            if value.pointer(pointer).and_then(Value::as_str).is_none() {
                return Err(ParseError::MissingField {
                    object: format!("{source_name} document {index}"),
                    field: field.to_string(),
                });
            }
        }
        documents.push(value);
    }
    Ok(documents)
}
