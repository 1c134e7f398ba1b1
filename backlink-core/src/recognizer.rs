// Recognizer Registry: extracts raw link observations from fetched content

use crate::canon::CanonicalUrl;
use crate::config::{RecognizerBinding, RecognizerSpec};
use crate::error::{CoreError, RecognizerError, Result};
use crate::model::{ObservationMarker, RawObservation};
use crate::pattern::{Pattern, PatternKind};
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

const CONTEXT_SNIPPET_CHARS: usize = 80;

/// Coarse content family derived from a `Content-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    Markup,
    Json,
    Xml,
    Binary,
    Unknown,
}

impl ContentClass {
    pub fn from_content_type(content_type: &str) -> ContentClass {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml" {
            ContentClass::Markup
        } else if mime == "application/json" || mime.ends_with("+json") {
            ContentClass::Json
        } else if mime == "application/xml" || mime == "text/xml" || mime.ends_with("+xml") {
            ContentClass::Xml
        } else if mime.starts_with("image/")
            || mime.starts_with("video/")
            || mime.starts_with("audio/")
            || mime.starts_with("font/")
            || mime == "application/octet-stream"
            || mime == "application/pdf"
            || mime == "application/zip"
            || mime == "application/gzip"
        {
            ContentClass::Binary
        } else {
            ContentClass::Unknown
        }
    }

    pub fn is_binary(&self) -> bool {
        *self == ContentClass::Binary
    }
}

/// Path expression over structured data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredPath {
    /// `$.links[*].href` style path over JSON.
    Json(String),
    /// XPath 1.0 expression over XML.
    Xml(String),
}

/// The closed set of extraction rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognizer {
    /// `<a>`/`<link>` elements whose `rel` contains `me`.
    RelMe,
    /// Every other `<a href>`/`<link href>` element.
    Anchors,
    /// A CSS selector and the attribute holding the URL.
    Selector { selector: String, attr: String },
    StructuredPath(StructuredPath),
}

impl Recognizer {
    pub fn name(&self) -> String {
        match self {
            Recognizer::RelMe => "rel_me".to_string(),
            Recognizer::Anchors => "anchors".to_string(),
            Recognizer::Selector { selector, .. } => format!("selector({})", selector),
            Recognizer::StructuredPath(StructuredPath::Json(path)) => {
                format!("json_path({})", path)
            }
            Recognizer::StructuredPath(StructuredPath::Xml(path)) => format!("xpath({})", path),
        }
    }

    fn accepts(&self, class: ContentClass) -> bool {
        match self {
            Recognizer::RelMe | Recognizer::Anchors | Recognizer::Selector { .. } => {
                class == ContentClass::Markup
            }
            Recognizer::StructuredPath(StructuredPath::Json(_)) => class == ContentClass::Json,
            Recognizer::StructuredPath(StructuredPath::Xml(_)) => class == ContentClass::Xml,
        }
    }

    /// Run this recognizer over one page.
    pub fn extract(
        &self,
        page: &Page<'_>,
    ) -> std::result::Result<Vec<RawObservation>, RecognizerError> {
        match self {
            Recognizer::RelMe => Ok(extract_links(page, true)),
            Recognizer::Anchors => Ok(extract_links(page, false)),
            Recognizer::Selector { selector, attr } => extract_selector(page, selector, attr),
            Recognizer::StructuredPath(StructuredPath::Json(path)) => extract_json(page, path),
            Recognizer::StructuredPath(StructuredPath::Xml(path)) => extract_xml(page, path),
        }
    }
}

impl From<&RecognizerSpec> for Recognizer {
    fn from(spec: &RecognizerSpec) -> Self {
        match spec {
            RecognizerSpec::RelMe => Recognizer::RelMe,
            RecognizerSpec::Anchors => Recognizer::Anchors,
            RecognizerSpec::Selector { selector, attr } => Recognizer::Selector {
                selector: selector.clone(),
                attr: attr.clone(),
            },
            RecognizerSpec::JsonPath { path } => {
                Recognizer::StructuredPath(StructuredPath::Json(path.clone()))
            }
            RecognizerSpec::XPath { path } => {
                Recognizer::StructuredPath(StructuredPath::Xml(path.clone()))
            }
        }
    }
}

/// A fetched page handed to recognizers.
#[derive(Debug, Clone, Copy)]
pub struct Page<'a> {
    pub url: &'a CanonicalUrl,
    pub content_type: &'a str,
    pub body: &'a str,
}

/// Observations and per-recognizer failures for one page.
#[derive(Debug, Default)]
pub struct Extraction {
    pub observations: Vec<RawObservation>,
    pub failures: Vec<(String, RecognizerError)>,
}

/// Maps (content type, source pattern) to an ordered list of recognizers.
#[derive(Debug, Clone, Default)]
pub struct RecognizerRegistry {
    bindings: Vec<(Pattern, Recognizer)>,
}

impl RecognizerRegistry {
    pub fn new(bindings: &[RecognizerBinding]) -> Result<Self> {
        let bindings = bindings
            .iter()
            .map(|b| {
                let pattern = Pattern::parse(&b.pattern).map_err(|e| CoreError::InvalidRecognizer {
                    binding: b.pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok((pattern, Recognizer::from(&b.recognizer)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(RecognizerRegistry { bindings })
    }

    pub fn with_binding(mut self, pattern: Pattern, recognizer: Recognizer) -> Self {
        self.bindings.push((pattern, recognizer));
        self
    }

    /// Recognizers for a page: host+path bindings, then host-only bindings, then the
    /// content-type default. Binary content gets none.
    pub fn lookup(&self, url: &CanonicalUrl, class: ContentClass) -> Vec<&Recognizer> {
        if class.is_binary() {
            return Vec::new();
        }

        let mut selected: Vec<&Recognizer> = Vec::new();
        for kind in [PatternKind::HostPath, PatternKind::Host] {
            for (pattern, recognizer) in &self.bindings {
                if pattern.kind() == kind && pattern.matches(url) && recognizer.accepts(class) {
                    debug!(
                        "Binding {} selects {} for {}",
                        pattern.as_str(),
                        recognizer.name(),
                        url
                    );
                    push_unique(&mut selected, recognizer);
                }
            }
        }
        for recognizer in default_recognizers(class) {
            push_unique(&mut selected, recognizer);
        }
        selected
    }

    /// Run every applicable recognizer and union their observations.
    pub fn extract(&self, page: &Page<'_>) -> Extraction {
        let class = ContentClass::from_content_type(page.content_type);
        let mut extraction = Extraction::default();
        let mut seen = HashSet::new();

        for recognizer in self.lookup(page.url, class) {
            match recognizer.extract(page) {
                Ok(observations) => {
                    for obs in observations {
                        if seen.insert((obs.target.clone(), obs.marker)) {
                            extraction.observations.push(obs);
                        }
                    }
                }
                Err(e) => {
                    debug!("Recognizer {} failed on {}: {}", recognizer.name(), page.url, e);
                    extraction.failures.push((recognizer.name(), e));
                }
            }
        }
        extraction
    }
}

fn push_unique<'a>(selected: &mut Vec<&'a Recognizer>, recognizer: &'a Recognizer) {
    if !selected.contains(&recognizer) {
        selected.push(recognizer);
    }
}

static MARKUP_DEFAULTS: [Recognizer; 2] = [Recognizer::RelMe, Recognizer::Anchors];

fn default_recognizers(class: ContentClass) -> &'static [Recognizer] {
    match class {
        ContentClass::Markup => &MARKUP_DEFAULTS,
        _ => &[],
    }
}

fn rel_tokens(element: &ElementRef<'_>) -> Vec<String> {
    element
        .value()
        .attr("rel")
        .map(|rel| rel.split_whitespace().map(|t| t.to_lowercase()).collect())
        .unwrap_or_default()
}

fn snippet(element: &ElementRef<'_>) -> String {
    let text: String = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    text.chars().take(CONTEXT_SNIPPET_CHARS).collect()
}

fn link_selector() -> Option<Selector> {
    Selector::parse("a[href], link[href]").ok()
}

fn extract_links(page: &Page<'_>, rel_me: bool) -> Vec<RawObservation> {
    let Some(selector) = link_selector() else {
        return Vec::new();
    };
    let document = Html::parse_document(page.body);
    let mut observations = Vec::new();

    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let rel = rel_tokens(&element);
        let has_me = rel.iter().any(|r| r == "me");
        if has_me != rel_me {
            continue;
        }
        observations.push(RawObservation {
            source: page.url.to_string(),
            target: href.to_string(),
            rel: if rel_me { vec!["me".to_string()] } else { rel },
            marker: if rel_me {
                ObservationMarker::RelMe
            } else {
                ObservationMarker::Anchor
            },
            context: snippet(&element),
        });
    }
    observations
}

fn extract_selector(
    page: &Page<'_>,
    selector: &str,
    attr: &str,
) -> std::result::Result<Vec<RawObservation>, RecognizerError> {
    let parsed = Selector::parse(selector).map_err(|e| RecognizerError::BadExpression {
        expression: selector.to_string(),
        reason: format!("{:?}", e),
    })?;
    let document = Html::parse_document(page.body);

    Ok(document
        .select(&parsed)
        .filter_map(|element| {
            let value = element.value().attr(attr)?.trim();
            if value.is_empty() {
                return None;
            }
            Some(RawObservation {
                source: page.url.to_string(),
                target: value.to_string(),
                rel: rel_tokens(&element),
                marker: ObservationMarker::Selector,
                context: snippet(&element),
            })
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum JsonStep {
    Key(String),
    Index(usize),
    Wildcard,
}

fn bad_path(path: &str, reason: &str) -> RecognizerError {
    RecognizerError::BadExpression {
        expression: path.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse the supported JSON path subset: `$`, `.key`, `.*`, `[n]`, `[*]`, `['key']`.
fn parse_json_path(path: &str) -> std::result::Result<Vec<JsonStep>, RecognizerError> {
    let rest = path
        .trim()
        .strip_prefix('$')
        .ok_or_else(|| bad_path(path, "must start with '$'"))?;
    let chars: Vec<char> = rest.chars().collect();
    let mut steps = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                i += 1;
                if chars.get(i) == Some(&'*') {
                    steps.push(JsonStep::Wildcard);
                    i += 1;
                    continue;
                }
                let start = i;
                while i < chars.len() && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                if start == i {
                    return Err(bad_path(path, "empty key"));
                }
                steps.push(JsonStep::Key(chars[start..i].iter().collect()));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|c| *c == ']')
                    .ok_or_else(|| bad_path(path, "unclosed '['"))?;
                let inner: String = chars[i + 1..i + close].iter().collect();
                let inner = inner.trim();
                let step = if inner == "*" {
                    JsonStep::Wildcard
                } else if let Ok(index) = inner.parse::<usize>() {
                    JsonStep::Index(index)
                } else if inner.len() >= 2
                    && ((inner.starts_with('\'') && inner.ends_with('\''))
                        || (inner.starts_with('"') && inner.ends_with('"')))
                {
                    JsonStep::Key(inner[1..inner.len() - 1].to_string())
                } else {
                    return Err(bad_path(path, "unsupported bracket expression"));
                };
                steps.push(step);
                i += close + 1;
            }
            other => {
                return Err(bad_path(path, &format!("unexpected '{}'", other)));
            }
        }
    }
    Ok(steps)
}

fn evaluate_json_path<'v>(root: &'v Value, steps: &[JsonStep]) -> Vec<&'v Value> {
    let mut current = vec![root];
    for step in steps {
        current = current
            .into_iter()
            .flat_map(|value| -> Vec<&'v Value> {
                match (step, value) {
                    (JsonStep::Key(key), Value::Object(map)) => map.get(key).into_iter().collect(),
                    (JsonStep::Index(index), Value::Array(items)) => {
                        items.get(*index).into_iter().collect()
                    }
                    (JsonStep::Wildcard, Value::Array(items)) => items.iter().collect(),
                    (JsonStep::Wildcard, Value::Object(map)) => map.values().collect(),
                    _ => Vec::new(),
                }
            })
            .collect();
    }
    current
}

fn extract_json(
    page: &Page<'_>,
    path: &str,
) -> std::result::Result<Vec<RawObservation>, RecognizerError> {
    let steps = parse_json_path(path)?;
    let root: Value =
        serde_json::from_str(page.body).map_err(|e| RecognizerError::Parse(e.to_string()))?;

    let mut targets = Vec::new();
    for value in evaluate_json_path(&root, &steps) {
        match value {
            Value::String(s) => targets.push(s.clone()),
            Value::Array(items) => {
                targets.extend(items.iter().filter_map(|v| v.as_str().map(String::from)))
            }
            _ => {}
        }
    }
    Ok(structured_observations(page, path, targets))
}

fn extract_xml(
    page: &Page<'_>,
    path: &str,
) -> std::result::Result<Vec<RawObservation>, RecognizerError> {
    let factory = sxd_xpath::Factory::new();
    let xpath = factory
        .build(path)
        .map_err(|e| bad_path(path, &e.to_string()))?
        .ok_or_else(|| bad_path(path, "empty expression"))?;

    let package = sxd_document::parser::parse(page.body)
        .map_err(|e| RecognizerError::Parse(e.to_string()))?;
    let document = package.as_document();
    let context = sxd_xpath::Context::new();
    let value = xpath
        .evaluate(&context, document.root())
        .map_err(|e| bad_path(path, &e.to_string()))?;

    let targets = match value {
        sxd_xpath::Value::Nodeset(nodes) => nodes
            .document_order()
            .iter()
            .map(|node| node.string_value())
            .collect(),
        sxd_xpath::Value::String(s) => vec![s],
        _ => Vec::new(),
    };
    Ok(structured_observations(page, path, targets))
}

fn structured_observations(page: &Page<'_>, path: &str, targets: Vec<String>) -> Vec<RawObservation> {
    targets
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(|target| RawObservation {
            source: page.url.to_string(),
            target,
            rel: Vec::new(),
            marker: ObservationMarker::StructuredPath,
            context: path.to_string(),
        })
        .collect()
}
