//! Plain `{{ placeholder }}` template rendering.
//!
//! A [`TemplateSet`] maps template names to subject/body pairs. Rendering a
//! [`NotificationPayload`] picks `"{template}.{locale}"` when the payload has
//! a locale and such a template exists, falling back to `"{template}"`.
//! Placeholders may use dotted paths (`{{ order.number }}`) into nested
//! template variables; unknown placeholders render as empty strings.

use std::collections::HashMap;
use std::sync::LazyLock;

use postbox_core::NotificationPayload;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{{ name }}` or `{{ dotted.path }}`, whitespace inside the braces allowed.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*\}\}").expect("valid regex")
});

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub subject: String,
    pub body: String,
}

impl Template {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// A fully rendered message, ready for a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Name of the template actually used (after locale fallback).
    pub template: String,
    pub locale: Option<String>,
}

/// Named templates.
#[derive(Debug, Default, Clone)]
pub struct TemplateSet {
    templates: HashMap<String, Template>,
}

impl TemplateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template, replacing any previous one of that name.
    ///
    /// Localized variants are registered as `"{name}.{locale}"`.
    pub fn insert(&mut self, name: impl Into<String>, template: Template) {
        self.templates.insert(name.into(), template);
    }

    pub fn with(mut self, name: impl Into<String>, template: Template) -> Self {
        self.insert(name, template);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Render `payload` with its own template variables.
    pub fn render(&self, payload: &NotificationPayload) -> Result<RenderedMessage, RenderError> {
        let (name, template) = self.resolve(&payload.template, payload.locale.as_deref())?;

        let subject_source = payload.subject.as_deref().unwrap_or(&template.subject);
        Ok(RenderedMessage {
            from: payload.from.clone(),
            to: payload.recipient.clone(),
            subject: render_str(subject_source, &payload.template_vars),
            body: render_str(&template.body, &payload.template_vars),
            template: name,
            locale: payload.locale.clone(),
        })
    }

    fn resolve(
        &self,
        name: &str,
        locale: Option<&str>,
    ) -> Result<(String, &Template), RenderError> {
        if let Some(locale) = locale {
            let localized = format!("{name}.{locale}");
            if let Some(template) = self.templates.get(&localized) {
                return Ok((localized, template));
            }
        }
        self.templates
            .get(name)
            .map(|template| (name.to_string(), template))
            .ok_or_else(|| RenderError::TemplateNotFound(name.to_string()))
    }
}

/// Substitute every placeholder in `source` from `vars`.
pub fn render_str(source: &str, vars: &Map<String, Value>) -> String {
    PLACEHOLDER_RE
        .replace_all(source, |caps: &Captures<'_>| {
            lookup(vars, &caps[1]).map(display_value).unwrap_or_default()
        })
        .into_owned()
}

fn lookup<'a>(vars: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = vars.get(segments.next()?)?;
    segments.try_fold(first, |value, segment| match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}
