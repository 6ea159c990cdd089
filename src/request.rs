// Request model
// Describes one API call: verb, path, parameters and how they are encoded

use reqwest::multipart::{Form, Part};
use reqwest::Method;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{ClientError, Result};

/// MIME type that switches body encoding to JSON
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// File attached to a multipart request
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub field_name: String,
    pub file_path: PathBuf,
    pub mime_type: String,
    /// Name reported to the server; defaults to the path's file name
    pub file_name: Option<String>,
}

impl Attachment {
    pub fn new(
        field_name: impl Into<String>,
        file_path: impl Into<PathBuf>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_path: file_path.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    /// Plain-text attachment, the format used for X12 EDI files
    pub fn text(field_name: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self::new(field_name, file_path, "text/plain")
    }

    fn reported_name(&self) -> String {
        self.file_name
            .clone()
            .unwrap_or_else(|| file_name_of(&self.file_path))
    }

    async fn into_part(self) -> Result<Part> {
        let bytes = tokio::fs::read(&self.file_path)
            .await
            .map_err(|source| ClientError::Io {
                path: self.file_path.clone(),
                source,
            })?;

        Part::bytes(bytes)
            .file_name(self.reported_name())
            .mime_str(&self.mime_type)
            .map_err(ClientError::from)
    }
}

/// Multipart body: plain text fields plus file attachments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Multipart {
    pub fields: Vec<(String, String)>,
    pub attachments: Vec<Attachment>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    async fn into_form(self) -> Result<Form> {
        let mut form = Form::new();
        for (name, value) in self.fields {
            form = form.text(name, value);
        }
        for attachment in self.attachments {
            let name = attachment.field_name.clone();
            form = form.part(name, attachment.into_part().await?);
        }
        Ok(form)
    }
}

/// Call parameters
///
/// For GET they become the query string; otherwise they form the body.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    /// Key/value mapping (query string for GET, JSON object or form fields otherwise)
    Map(Map<String, Value>),
    /// Arbitrary JSON payload
    Json(Value),
    /// Pre-formatted text, appended to the URL for GET or sent verbatim as the body
    Raw(String),
    /// Multipart form with file attachments
    Multipart(Multipart),
}

impl Params {
    pub fn is_none(&self) -> bool {
        matches!(self, Params::None)
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Params::None,
            Value::Object(map) => Params::Map(map),
            other => Params::Json(other),
        }
    }
}

impl From<Map<String, Value>> for Params {
    fn from(map: Map<String, Value>) -> Self {
        Params::Map(map)
    }
}

impl From<&str> for Params {
    fn from(raw: &str) -> Self {
        if raw.is_empty() {
            Params::None
        } else {
            Params::Raw(raw.to_string())
        }
    }
}

impl From<String> for Params {
    fn from(raw: String) -> Self {
        Params::from(raw.as_str())
    }
}

impl From<Multipart> for Params {
    fn from(multipart: Multipart) -> Self {
        Params::Multipart(multipart)
    }
}

/// Encoded request body ready to hand to the HTTP client
pub(crate) enum PreparedBody {
    Empty,
    Text(String),
    Form(Form),
}

/// One API call, built per request and consumed by the executor
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    pub path: String,
    pub params: Params,
    /// Empty means no Content-Type header is sent
    pub content_type: String,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Params::None,
            content_type: String::new(),
        }
    }

    #[must_use]
    pub fn params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    #[must_use]
    pub fn json(self) -> Self {
        self.content_type(JSON_CONTENT_TYPE)
    }

    fn is_json(&self) -> bool {
        self.content_type == JSON_CONTENT_TYPE
    }

    /// Target URL: base + path, plus the query string for GET
    pub fn url(&self, base_url: &str) -> Result<String> {
        let mut url = format!("{}{}", base_url, self.path);
        if self.method != Method::GET {
            return Ok(url);
        }

        match &self.params {
            Params::None => {}
            Params::Map(map) => {
                url.push('?');
                url.push_str(&build_query(map));
            }
            Params::Json(Value::Object(map)) => {
                url.push('?');
                url.push_str(&build_query(map));
            }
            Params::Raw(raw) => url.push_str(raw),
            Params::Json(_) => {
                return Err(ClientError::InvalidRequest(
                    "GET parameters must be a mapping or a string".to_string(),
                ))
            }
            Params::Multipart(_) => {
                return Err(ClientError::InvalidRequest(
                    "GET requests cannot carry attachments".to_string(),
                ))
            }
        }
        Ok(url)
    }

    /// Encode the parameters as a request body
    pub(crate) async fn prepare_body(self) -> Result<PreparedBody> {
        if self.method == Method::GET {
            return Ok(PreparedBody::Empty);
        }

        let json = self.is_json();
        let body = match self.params {
            Params::None => PreparedBody::Empty,
            Params::Raw(raw) => PreparedBody::Text(raw),
            Params::Map(map) if json => PreparedBody::Text(Value::Object(map).to_string()),
            Params::Json(value) => PreparedBody::Text(value.to_string()),
            Params::Map(map) => {
                let fields = map
                    .into_iter()
                    .map(|(k, v)| (k, scalar_to_string(&v)))
                    .collect();
                PreparedBody::Form(
                    Multipart {
                        fields,
                        attachments: Vec::new(),
                    }
                    .into_form()
                    .await?,
                )
            }
            Params::Multipart(_) if json => {
                return Err(ClientError::InvalidRequest(
                    "Attachments cannot be sent as application/json".to_string(),
                ))
            }
            Params::Multipart(multipart) => PreparedBody::Form(multipart.into_form().await?),
        };
        Ok(body)
    }
}

/// Encode a mapping as a URL query string
///
/// Nested objects and arrays use bracket notation (`member[id]=1`, `codes[0]=A`);
/// null values are skipped.
pub fn build_query(params: &Map<String, Value>) -> String {
    let mut pairs = Vec::new();
    for (key, value) in params {
        flatten(key.clone(), value, &mut pairs);
    }

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn flatten(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                flatten(format!("{}[{}]", prefix, k), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(format!("{}[{}]", prefix, i), v, out);
            }
        }
        scalar => out.push((prefix, scalar_to_string(scalar))),
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// File name of a path, used for attachment defaults
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
