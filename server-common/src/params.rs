//! Request parameter extraction shared by every endpoint.
//!
//! GET requests read the query string. Other methods read form fields for
//! url-encoded and multipart bodies, otherwise the JSON body. A body that
//! cannot be parsed yields empty parameters instead of a rejection.

use std::collections::HashMap;
use std::convert::Infallible;

use axum::async_trait;
use axum::body::to_bytes;
use axum::extract::{FromRequest, Multipart, Query, Request};
use axum::http::{header, Method};
use axum::Form;
use serde_json::{Map, Value};

/// Largest request body read into memory.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Flat parameter map of a request, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiParams(pub Map<String, Value>);

impl ApiParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value of `key`; numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Unsigned value of `key`, accepting numeric strings as sent by forms.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Remove `key` and return it.
    pub fn take(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ApiParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn strings_to_map(fields: HashMap<String, String>) -> Map<String, Value> {
    fields
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    UrlEncoded,
    Multipart,
    Json,
}

fn body_kind(req: &Request) -> BodyKind {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if content_type.starts_with("application/x-www-form-urlencoded") {
        BodyKind::UrlEncoded
    } else if content_type.starts_with("multipart/form-data") {
        BodyKind::Multipart
    } else {
        BodyKind::Json
    }
}

/// Text fields of a multipart body; file parts are skipped.
async fn multipart_fields(mut multipart: Multipart) -> Result<Map<String, Value>, String> {
    let mut fields = Map::new();
    while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let text = field.text().await.map_err(|e| e.to_string())?;
        fields.insert(name, Value::String(text));
    }
    Ok(fields)
}

#[async_trait]
impl<S> FromRequest<S> for ApiParams
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();

        if method == Method::OPTIONS {
            return Ok(Self::new());
        }

        if method == Method::GET {
            return Ok(match Query::<HashMap<String, String>>::try_from_uri(req.uri()) {
                Ok(Query(fields)) => Self(strings_to_map(fields)),
                Err(e) => {
                    tracing::warn!("Bad query string on {}: {}", req.uri().path(), e);
                    Self::new()
                }
            });
        }

        let path = req.uri().path().to_string();
        match body_kind(&req) {
            BodyKind::UrlEncoded => {
                Ok(match Form::<HashMap<String, String>>::from_request(req, state).await {
                    Ok(Form(fields)) => Self(strings_to_map(fields)),
                    Err(e) => {
                        tracing::warn!("Bad form body on {}: {}", path, e);
                        Self::new()
                    }
                })
            }
            BodyKind::Multipart => {
                let fields = match Multipart::from_request(req, state).await {
                    Ok(multipart) => multipart_fields(multipart).await,
                    Err(e) => Err(e.to_string()),
                };
                Ok(match fields {
                    Ok(fields) => Self(fields),
                    Err(e) => {
                        tracing::warn!("Bad multipart body on {}: {}", path, e);
                        Self::new()
                    }
                })
            }
            BodyKind::Json => Ok(Self::from_json_body(req, &path).await),
        }
    }
}

impl ApiParams {
    async fn from_json_body(req: Request, path: &str) -> Self {
        let bytes = match to_bytes(req.into_body(), MAX_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to read body on {}: {}", path, e);
                return Self::new();
            }
        };

        if bytes.is_empty() {
            return Self::new();
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Self(map),
            Ok(other) => {
                tracing::warn!("Non-object JSON body on {}: {}", path, other);
                Self::new()
            }
            Err(e) => {
                tracing::warn!("Malformed body on {}: {}", path, e);
                Self::new()
            }
        }
    }
}
