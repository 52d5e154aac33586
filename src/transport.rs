//! Outbound HTTP seam used by the optimizer's `dispatch`

use crate::error::TransportError;
use crate::proxy::ProxySelection;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{Client, Method, Proxy as ReqwestProxy};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Header name to value
pub type Headers = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Text(String),
}

/// Per-call options forwarded to the transport
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub body: Option<RequestBody>,
    pub query: Vec<(String, String)>,
    /// Falls back to the optimizer's request timeout when unset
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `value` as a JSON body
    pub fn with_json(mut self, value: serde_json::Value) -> Self {
        self.body = Some(RequestBody::Json(value));
        self
    }

    /// Send url-encoded form fields
    pub fn with_form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    /// Send a raw text body
    pub fn with_text(mut self, text: String) -> Self {
        self.body = Some(RequestBody::Text(text));
        self
    }

    /// Append one query parameter
    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Override the optimizer's request timeout for this call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Fully prepared call: rotated headers and proxy already applied
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,
    pub headers: Headers,
    pub proxy: Option<ProxySelection>,
    pub body: Option<RequestBody>,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl TransportResponse {
    /// 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Sends prepared requests on behalf of the optimizer
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError>;

    /// Drop any per-proxy state kept for `address`
    fn release_proxy(&self, _address: &str) {}
}

/// `reqwest` transport with one cached client per proxy address.
///
/// Clients live until [`Transport::release_proxy`] is called for their
/// address, so the cache is bounded by the proxies routed through it.
pub struct ReqwestTransport {
    direct: Client,
    proxied: RwLock<HashMap<String, Client>>,
}

impl ReqwestTransport {
    /// Build the direct client; proxied clients are created on first use
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            direct: Client::builder().build()?,
            proxied: RwLock::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&ProxySelection>) -> Result<Client, TransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        if let Some(client) = self.proxied.read().get(&proxy.address) {
            return Ok(client.clone());
        }

        let reqwest_proxy =
            ReqwestProxy::all(&proxy.address).map_err(|e| TransportError::InvalidProxy {
                address: proxy.address.clone(),
                reason: e.to_string(),
            })?;
        let client = Client::builder().proxy(reqwest_proxy).build()?;
        debug!(proxy = %proxy.address, "Created proxied client");

        self.proxied
            .write()
            .insert(proxy.address.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutboundRequest) -> Result<TransportResponse, TransportError> {
        let client = self.client_for(request.proxy.as_ref())?;

        let mut builder = client
            .request(request.method, &request.url)
            .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            Some(RequestBody::Text(text)) => builder.body(text),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Request(e)
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    fn release_proxy(&self, address: &str) {
        if self.proxied.write().remove(address).is_some() {
            debug!(proxy = %address, "Dropped proxied client");
        }
    }
}
