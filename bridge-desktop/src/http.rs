//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpBody, HttpClient, HttpMethod, HttpRequest, HttpStreamResponse},
};
use futures_util::TryStreamExt;
use reqwest::{redirect, Client};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_USER_AGENT: &str = concat!("fetch-blob/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 10;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-level settings that reqwest cannot change per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ClientFlavor {
    follow_redirects: bool,
    trust_all_certificates: bool,
    /// Longest a connection may sit idle, not a cap on the whole transfer
    read_timeout: Duration,
}

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP transfers with:
/// - Connection pooling via reqwest
/// - Streamed request and response bodies
/// - Per-request redirect and certificate policy
/// - Idle timeouts: a transfer only fails when data stops arriving
pub struct ReqwestHttpClient {
    timeout: Duration,
    clients: Mutex<HashMap<ClientFlavor, Client>>,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with a custom idle timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Create a new HTTP client around a preconfigured reqwest client
    ///
    /// The client serves requests that follow redirects, validate
    /// certificates and use the default idle timeout. Other flavors are
    /// built on demand.
    pub fn with_client(client: Client) -> Self {
        let this = Self::new();
        let flavor = this.default_flavor();
        this.lock_clients().insert(flavor, client);
        this
    }

    fn default_flavor(&self) -> ClientFlavor {
        ClientFlavor {
            follow_redirects: true,
            trust_all_certificates: false,
            read_timeout: self.timeout,
        }
    }

    fn lock_clients(&self) -> std::sync::MutexGuard<'_, HashMap<ClientFlavor, Client>> {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn client_for(&self, flavor: ClientFlavor) -> Result<Client> {
        let mut clients = self.lock_clients();
        if let Some(client) = clients.get(&flavor) {
            return Ok(client.clone());
        }

        let policy = if flavor.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECTS)
        } else {
            redirect::Policy::none()
        };

        let client = Client::builder()
            .read_timeout(flavor.read_timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(flavor.read_timeout))
            .pool_max_idle_per_host(10)
            .user_agent(DEFAULT_USER_AGENT)
            .redirect(policy)
            .danger_accept_invalid_certs(flavor.trust_all_certificates)
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e)))?;

        debug!(?flavor, "Built HTTP client");
        clients.insert(flavor, client.clone());
        Ok(client)
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder> {
        let client = self.client_for(ClientFlavor {
            follow_redirects: request.follow_redirects,
            trust_all_certificates: request.trust_all_certificates,
            read_timeout: request.timeout.unwrap_or(self.timeout),
        })?;

        let method = Self::convert_method(request.method);
        let mut req = client.request(method, &request.url);

        for (key, value) in request.headers {
            req = req.header(key, value);
        }

        match request.body {
            HttpBody::Empty => {}
            HttpBody::Bytes(bytes) => {
                req = req.body(bytes);
            }
            HttpBody::Stream { stream, length } => {
                if let Some(length) = length {
                    req = req.header(reqwest::header::CONTENT_LENGTH, length);
                }
                req = req.body(reqwest::Body::wrap_stream(stream));
            }
        }

        Ok(req)
    }

    /// Flatten response headers, lower-casing names and joining repeated
    /// values (`; ` for cookies, `, ` otherwise).
    fn collect_headers(map: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        let mut headers: HashMap<String, String> = HashMap::new();
        for (name, value) in map {
            let Ok(value) = value.to_str() else {
                continue;
            };
            let name = name.as_str().to_ascii_lowercase();
            let separator = if name == "set-cookie" || name == "cookie" {
                "; "
            } else {
                ", "
            };
            headers
                .entry(name)
                .and_modify(|joined| {
                    joined.push_str(separator);
                    joined.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        headers
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout
        } else if e.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", e))
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpStreamResponse> {
        debug!(
            method = %request.method,
            url = %request.url,
            body = ?request.body,
            "Executing HTTP request"
        );

        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "HTTP request failed");
                Self::map_send_error(e)
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let content_length = response.content_length();
        let headers = Self::collect_headers(response.headers());

        debug!(status, ?content_length, "Received HTTP response headers");

        let body = response.bytes_stream().map_err(std::io::Error::other);

        Ok(HttpStreamResponse {
            status,
            headers,
            final_url,
            content_length,
            body: Box::pin(body),
        })
    }

    async fn is_connected(&self) -> bool {
        let Ok(client) = self.client_for(self.default_flavor()) else {
            return false;
        };

        client
            .head("https://www.google.com")
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .is_ok()
    }
}
