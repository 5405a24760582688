use std::future::Future;

use bytes::Bytes;
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ClientConfig;
use crate::error::Error;

/// One field of a multipart form body.
///
/// Kept as owned bytes so a request can be replayed after a session refresh.
#[derive(Debug, Clone)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        mime: Option<String>,
        bytes: Bytes,
    },
}

/// Request body.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormField>),
}

/// An API call relative to the `/api` base.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Body,
    /// Whether a 401 on this request may trigger a session refresh.
    pub guarded: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Body::Empty,
            guarded: true,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if `body` cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, Error> {
        self.body = Body::Json(serde_json::to_value(body)?);
        Ok(self)
    }

    /// An empty JSON object body (`{}`), as the server expects on bare POSTs.
    #[must_use]
    pub fn empty_object(mut self) -> Self {
        self.body = Body::Json(serde_json::Value::Object(serde_json::Map::new()));
        self
    }

    #[must_use]
    pub fn multipart(mut self, fields: Vec<FormField>) -> Self {
        self.body = Body::Multipart(fields);
        self
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Send without the session guard (credential-establishing calls).
    #[must_use]
    pub fn unguarded(mut self) -> Self {
        self.guarded = false;
        self
    }

    /// Absolute URL of this request under `base`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the joined URL is invalid.
    pub fn url(&self, base: &Url) -> Result<Url, Error> {
        let joined = format!("{}{}", base.as_str().trim_end_matches('/'), self.path);
        let mut url: Url = joined
            .parse()
            .map_err(|e| Error::Config(format!("invalid request URL {joined}: {e}")))?;
        if !self.query.is_empty() {
            url.query_pairs_mut().extend_pairs(self.query.iter());
        }
        Ok(url)
    }
}

/// Raw HTTP response: status and body, whatever the status.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Returns the response on 2xx, or the typed error for its status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for 4xx and [`Error::Server`] for 5xx.
    pub fn error_for_status(self) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::from_status(self.status, &self.body))
        }
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(Into::into)
    }
}

/// The wire under the session guard.
///
/// Implementations return every HTTP response, including 4xx/5xx, as
/// `Ok(ApiResponse)`. Only failures that produced no response are `Err`.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse, Error>> + Send;
}

/// reqwest-backed transport with a cookie store for session credentials.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    api_base: Url,
}

impl HttpTransport {
    /// Build a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the underlying HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.timeout())
            .user_agent(config.user_agent())
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: config.api_base().clone(),
        })
    }

    /// Use a custom HTTP client (connection pool reuse or testing).
    ///
    /// The client must have a cookie store enabled for session cookies to persist.
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let url = request.url(&self.api_base)?;
        tracing::debug!(method = %request.method, path = %request.path, "API request");

        let builder = self.http.request(request.method, url);
        let builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Multipart(fields) => builder.multipart(build_form(fields)?),
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(ApiResponse { status, body })
    }
}

fn build_form(fields: Vec<FormField>) -> Result<Form, Error> {
    let mut form = Form::new();
    for field in fields {
        form = match field {
            FormField::Text { name, value } => form.text(name, value),
            FormField::File {
                name,
                file_name,
                mime,
                bytes,
            } => {
                let mut part = Part::bytes(bytes.to_vec()).file_name(file_name);
                if let Some(mime) = mime {
                    part = part
                        .mime_str(&mime)
                        .map_err(|e| Error::Config(format!("invalid MIME type {mime}: {e}")))?;
                }
                form.part(name, part)
            }
        };
    }
    Ok(form)
}
