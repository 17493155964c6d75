//! Storage-template documents.
//!
//! A template describes how to reach a storage backend. It parses from JSON
//! or YAML, serializes back losslessly, and renders into a concrete
//! [`Storage`] for one container by substituting `{{ TOKEN }}` placeholders.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub const CONTAINER_NAME_PARAM: &str = "CONTAINER_NAME";
pub const CONTAINER_UUID_PARAM: &str = "CONTAINER_UUID";
pub const OWNER_PARAM: &str = "OWNER";
pub const ACCESS_MODE_PARAM: &str = "ACCESS_MODE";
pub const PATHS_PARAM: &str = "PATHS";

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("malformed template document: {0}")]
    MalformedDocument(String),
    #[error("template schema violation: {0}")]
    SchemaViolation(String),
    #[error("failed to serialize template: {0}")]
    Serialize(String),
    #[error("failed to render template: {0}")]
    Render(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<Uuid>,
    pub backend_type: String,
    pub template: TemplateBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateBody {
    pub access: Vec<AccessRule>,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
    #[serde(rename = "manifest-pattern")]
    pub manifest_pattern: ManifestPattern,
    #[serde(rename = "read-only", default)]
    pub read_only: bool,
    #[serde(rename = "with-index", default)]
    pub with_index: bool,
    /// Backend-specific keys such as `s3_url`.
    #[serde(flatten)]
    pub backend: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPattern {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadWrite => f.write_str("ReadWrite"),
            Self::ReadOnly => f.write_str("ReadOnly"),
        }
    }
}

/// Values substituted into a template when it is rendered for a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateContext {
    pub container_name: String,
    pub container_uuid: Uuid,
    pub owner: String,
    pub access_mode: AccessMode,
    pub paths: Vec<String>,
}

impl TemplateContext {
    fn params(&self) -> BTreeMap<&'static str, String> {
        BTreeMap::from([
            (CONTAINER_NAME_PARAM, self.container_name.clone()),
            (CONTAINER_UUID_PARAM, self.container_uuid.to_string()),
            (OWNER_PARAM, self.owner.clone()),
            (ACCESS_MODE_PARAM, self.access_mode.to_string()),
            (PATHS_PARAM, format!("[{}]", self.paths.join(", "))),
        ])
    }
}

/// A template rendered for one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub uuid: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_uuid: Option<Uuid>,
    pub backend_type: String,
    pub data: Value,
}

impl StorageTemplate {
    pub fn from_json(bytes: &[u8]) -> Result<Self, TemplateError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| TemplateError::MalformedDocument(e.to_string()))?;
        let template: Self = serde_json::from_value(value)
            .map_err(|e| TemplateError::SchemaViolation(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    pub fn from_yaml(bytes: &[u8]) -> Result<Self, TemplateError> {
        let value: serde_yaml::Value = serde_yaml::from_slice(bytes)
            .map_err(|e| TemplateError::MalformedDocument(e.to_string()))?;
        let template: Self = serde_yaml::from_value(value)
            .map_err(|e| TemplateError::SchemaViolation(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, TemplateError> {
        serde_json::to_vec_pretty(self).map_err(|e| TemplateError::Serialize(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<Vec<u8>, TemplateError> {
        serde_yaml::to_string(self)
            .map(String::into_bytes)
            .map_err(|e| TemplateError::Serialize(e.to_string()))
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Check the fields serde cannot enforce.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.backend_type.trim().is_empty() {
            return Err(TemplateError::SchemaViolation(
                "backend_type must not be empty".to_owned(),
            ));
        }
        if self.template.manifest_pattern.path.trim().is_empty() {
            return Err(TemplateError::SchemaViolation(
                "template.manifest-pattern.path must not be empty".to_owned(),
            ));
        }
        if self.template.access.is_empty() {
            return Err(TemplateError::SchemaViolation(
                "template.access must not be empty".to_owned(),
            ));
        }
        if let Some(idx) = self
            .template
            .access
            .iter()
            .position(|rule| rule.user.trim().is_empty())
        {
            return Err(TemplateError::SchemaViolation(format!(
                "template.access[{idx}].user must not be empty"
            )));
        }
        Ok(())
    }

    /// Placeholder tokens referenced anywhere in the template body.
    pub fn placeholders(&self) -> Result<BTreeSet<String>, TemplateError> {
        let body = self.body_value()?;
        let mut tokens = BTreeSet::new();
        collect_tokens(&body, &mut tokens);
        Ok(tokens)
    }

    pub fn render(&self, ctx: &TemplateContext) -> Result<Storage, TemplateError> {
        let params = ctx.params();
        let data = render_value(self.body_value()?, &params)?;
        Ok(Storage {
            uuid: Uuid::new_v4(),
            name: self.name.clone(),
            template_uuid: self.uuid,
            backend_type: self.backend_type.clone(),
            data,
        })
    }

    fn body_value(&self) -> Result<Value, TemplateError> {
        serde_json::to_value(&self.template).map_err(|e| TemplateError::Serialize(e.to_string()))
    }
}

fn collect_tokens(value: &Value, tokens: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => scan_tokens(s, tokens),
        Value::Array(items) => items.iter().for_each(|v| collect_tokens(v, tokens)),
        Value::Object(map) => {
            for (key, v) in map {
                scan_tokens(key, tokens);
                collect_tokens(v, tokens);
            }
        }
        _ => {}
    }
}

fn scan_tokens(input: &str, tokens: &mut BTreeSet<String>) {
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return;
        };
        tokens.insert(after[..end].trim().to_owned());
        rest = &after[end + 2..];
    }
}

fn substitute(
    input: &str,
    params: &BTreeMap<&'static str, String>,
) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            TemplateError::Render(format!("unterminated placeholder in '{input}'"))
        })?;
        let token = after[..end].trim();
        let value = params
            .get(token)
            .ok_or_else(|| TemplateError::Render(format!("unknown placeholder '{token}'")))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

fn render_value(
    value: Value,
    params: &BTreeMap<&'static str, String>,
) -> Result<Value, TemplateError> {
    Ok(match value {
        Value::String(s) => Value::String(substitute(&s, params)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| render_value(v, params))
                .collect::<Result<_, _>>()?,
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, v) in map {
                out.insert(substitute(&key, params)?, render_value(v, params)?);
            }
            Value::Object(out)
        }
        other => other,
    })
}
