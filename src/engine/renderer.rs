//! Manifest Renderer
//!
//! Turns a named template plus shared variables into a `DynamicObject` ready
//! for submission. Rendering is pure: identical inputs give identical
//! objects, the only per-attempt variation is whatever random suffix the
//! caller put into the variables.

use crate::domain::ports::{split_api_version, TemplateStoreRef};
use crate::error::{Error, Result};
use kube::api::DynamicObject;
use kube::core::GroupVersionKind;
use rand::Rng;
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// Template Variables
// =============================================================================

pub const VAR_RESOURCE_NAME: &str = "resource_name";
pub const VAR_SPOKE_NAME: &str = "spoke_name";
pub const VAR_RECOVERY_PATH: &str = "recovery_path";
pub const VAR_IMAGE: &str = "image";
pub const VAR_NAMESPACE: &str = "namespace";
pub const VAR_SERVICE_ACCOUNT: &str = "service_account";
pub const VAR_SUFFIX: &str = "suffix";

const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Variables shared by every template of one spoke attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateVars(BTreeMap<String, String>);

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Name of the job these variables address
    pub fn resource_name(&self) -> &str {
        self.get(VAR_RESOURCE_NAME).unwrap_or_default()
    }
}

/// Random lowercase alphanumeric token used to keep job names unique
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect()
}

// =============================================================================
// Rendered Manifest
// =============================================================================

/// A template rendered into a submittable object
#[derive(Debug, Clone)]
pub struct RenderedManifest {
    /// Template the object came from
    pub template: String,
    /// Group/version/kind declared by the object
    pub gvk: GroupVersionKind,
    /// The object itself
    pub object: DynamicObject,
}

impl RenderedManifest {
    pub fn name(&self) -> &str {
        self.object.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.object.metadata.namespace.as_deref()
    }
}

// =============================================================================
// Renderer
// =============================================================================

/// Renders named templates from a template store
#[derive(Clone)]
pub struct ManifestRenderer {
    store: TemplateStoreRef,
}

impl ManifestRenderer {
    pub fn new(store: TemplateStoreRef) -> Self {
        Self { store }
    }

    /// Render `template` with `vars` into an object
    pub fn render(&self, template: &str, vars: &TemplateVars) -> Result<RenderedManifest> {
        let body = self.store.lookup(template).ok_or_else(|| Error::MissingTemplate {
            name: template.to_string(),
        })?;

        let template_error = |reason: String| Error::Template {
            template: template.to_string(),
            reason,
        };

        let parsed: Value =
            serde_yaml::from_str(body).map_err(|e| template_error(format!("invalid YAML: {}", e)))?;
        let value = substitute_value(parsed, vars).map_err(template_error)?;

        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| template_error("missing apiVersion".into()))?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| template_error("missing kind".into()))?;
        let (group, version) = split_api_version(api_version);
        let gvk = GroupVersionKind::gvk(group, version, kind);

        let has_name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .is_some_and(|name| !name.is_empty());
        if !has_name {
            return Err(template_error("missing metadata.name".into()));
        }

        let object: DynamicObject = serde_json::from_value(value)
            .map_err(|e| template_error(format!("not a valid object: {}", e)))?;

        Ok(RenderedManifest {
            template: template.to_string(),
            gvk,
            object,
        })
    }
}

fn substitute_value(value: Value, vars: &TemplateVars) -> std::result::Result<Value, String> {
    Ok(match value {
        Value::String(s) => Value::String(substitute(&s, vars)?),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| substitute_value(item, vars))
                .collect::<std::result::Result<_, _>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| substitute_value(v, vars).map(|v| (k, v)))
                .collect::<std::result::Result<_, _>>()?,
        ),
        other => other,
    })
}

/// Replace every `{{ var }}` in `input`
fn substitute(input: &str, vars: &TemplateVars) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| format!("unterminated placeholder in {:?}", input))?;
        let key = after[..end].trim();
        let value = vars
            .get(key)
            .ok_or_else(|| format!("unknown variable {:?}", key))?;
        out.push_str(value);
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    Ok(out)
}
