//! Argument template rendering
//!
//! Templates embed `{{ .Field }}` or `{{ .Field.Accessor }}` placeholders.
//! Fields are declared up front in a [`TemplateContext`]; a declared field
//! may be absent, in which case it renders as the empty string. Anything
//! the context does not declare is an error.

use crate::error::{FixtureError, FixtureResult};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;
use url::Url;

static ACTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid action regex"));

static FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\.([A-Za-z_][A-Za-z0-9_]*)(?:\.([A-Za-z_][A-Za-z0-9_]*))?$").expect("valid field regex")
});

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Text(String),
    Url(Url),
}

/// Named values available to argument templates
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    fields: BTreeMap<String, Option<TemplateValue>>,
}

impl TemplateContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_url<S: Into<String>>(mut self, name: S, url: &Url) -> Self {
        self.fields.insert(name.into(), Some(TemplateValue::Url(url.clone())));
        self
    }

    /// Declare a URL field that may not be known yet
    pub fn with_optional_url<S: Into<String>>(mut self, name: S, url: Option<&Url>) -> Self {
        self.fields.insert(name.into(), url.cloned().map(TemplateValue::Url));
        self
    }

    pub fn with_text<S: Into<String>, V: Into<String>>(mut self, name: S, value: V) -> Self {
        self.fields.insert(name.into(), Some(TemplateValue::Text(value.into())));
        self
    }

    pub fn with_path<S: Into<String>>(self, name: S, path: &Path) -> Self {
        self.with_text(name, path.display().to_string())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    fn resolve(&self, field: &str, accessor: Option<&str>) -> Result<String, String> {
        let value = self
            .fields
            .get(field)
            .ok_or_else(|| format!("field .{field} is not available"))?;

        match (value, accessor) {
            (None, _) => Ok(String::new()),
            (Some(TemplateValue::Text(text)), None) => Ok(text.clone()),
            (Some(TemplateValue::Text(_)), Some(acc)) => Err(format!("field .{field} has no accessor .{acc}")),
            (Some(TemplateValue::Url(url)), None) => Ok(url_string(url)),
            (Some(TemplateValue::Url(url)), Some(acc)) => url_accessor(url, acc).ok_or_else(|| format!("URL field .{field} has no accessor .{acc}")),
        }
    }
}

fn url_accessor(url: &Url, accessor: &str) -> Option<String> {
    match accessor {
        "String" => Some(url_string(url)),
        "Scheme" => Some(url.scheme().to_string()),
        "Host" => Some(match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        }),
        "Hostname" => Some(url.host_str().unwrap_or_default().to_string()),
        "Port" => Some(url.port_or_known_default().map(|p| p.to_string()).unwrap_or_default()),
        "Path" => Some(url.path().to_string()),
        _ => None,
    }
}

/// URL rendered without the trailing `/` that an empty path gets
///
/// `http://127.0.0.1:2379/` becomes `http://127.0.0.1:2379`, which is the
/// form etcd and kube-apiserver accept in their URL flags.
pub fn url_string(url: &Url) -> String {
    let raw = url.as_str();
    if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
        raw.trim_end_matches('/').to_string()
    } else {
        raw.to_string()
    }
}

/// Render a single template against `context`
pub fn render_template(template: &str, context: &TemplateContext) -> FixtureResult<String> {
    let fail = |reason: String| FixtureError::TemplateResolution {
        template: template.to_string(),
        reason,
    };

    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;

    for captures in ACTION.captures_iter(template) {
        let whole = captures.get(0).expect("match 0 always present");
        let literal = &template[last..whole.start()];
        if literal.contains("{{") {
            return Err(fail("unterminated action".to_string()));
        }
        rendered.push_str(literal);

        let inner = captures[1].trim();
        let field = FIELD
            .captures(inner)
            .ok_or_else(|| fail(format!("unsupported action {{{{{}}}}}", &captures[1])))?;
        let value = context
            .resolve(&field[1], field.get(2).map(|m| m.as_str()))
            .map_err(fail)?;
        rendered.push_str(&value);

        last = whole.end();
    }

    let tail = &template[last..];
    if tail.contains("{{") {
        return Err(fail("unterminated action".to_string()));
    }
    rendered.push_str(tail);

    Ok(rendered)
}

/// Render every template; the first failure fails the whole render
pub fn render_templates<S: AsRef<str>>(templates: &[S], context: &TemplateContext) -> FixtureResult<Vec<String>> {
    templates
        .iter()
        .map(|template| render_template(template.as_ref(), context))
        .collect()
}
