//! HTTP-backed session client
//!
//! Each account gets its own `reqwest::Client` routed through the account's
//! SOCKS5 proxy, carrying the app credential pair and the session material as
//! headers. Lookups are `GET {endpoint}/resolve/{key}`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{StatusCode, Url};
use session::{
    BoxFuture, EntityRecord, ProxyDialer, ProxyEndpoint, SessionClient, SessionCredential,
    SessionError, SessionHandle, Socks5Dialer,
};
use tracing::debug;

const APP_ID_HEADER: HeaderName = HeaderName::from_static("x-app-id");
const APP_HASH_HEADER: HeaderName = HeaderName::from_static("x-app-hash");
const SESSION_HEADER: HeaderName = HeaderName::from_static("x-session");

pub struct HttpSessionClient {
    endpoint: Url,
    timeout: Duration,
    dial_timeout: Duration,
}

impl HttpSessionClient {
    pub fn new(endpoint: &str, timeout: Duration, dial_timeout: Duration) -> session::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| SessionError::Setup(format!("invalid session endpoint {endpoint:?}: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(SessionError::Setup(format!(
                "session endpoint {endpoint} cannot carry a path"
            )));
        }
        Ok(Self {
            endpoint,
            timeout,
            dial_timeout,
        })
    }

    fn build_http(
        &self,
        credential: &SessionCredential,
        proxy: Option<&ProxyEndpoint>,
    ) -> session::Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.dial_timeout)
            .default_headers(credential_headers(credential)?);
        if let Some(proxy) = proxy {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy.url())
                    .map_err(|e| SessionError::InvalidEndpoint(format!("{proxy}: {e}")))?,
            );
        }
        builder
            .build()
            .map_err(|e| SessionError::Setup(format!("building http client: {e}")))
    }
}

fn credential_headers(credential: &SessionCredential) -> session::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(APP_ID_HEADER, HeaderValue::from(credential.app_id));

    let mut hash = HeaderValue::from_str(credential.app_hash.expose())
        .map_err(|e| SessionError::Setup(format!("app hash is not a valid header value: {e}")))?;
    hash.set_sensitive(true);
    headers.insert(APP_HASH_HEADER, hash);

    let mut material = HeaderValue::from_str(&STANDARD.encode(credential.material.expose()))
        .map_err(|e| SessionError::Setup(format!("encoding session material: {e}")))?;
    material.set_sensitive(true);
    headers.insert(SESSION_HEADER, material);

    Ok(headers)
}

impl SessionClient for HttpSessionClient {
    fn dialer(&self, proxy: &ProxyEndpoint) -> session::Result<Arc<dyn ProxyDialer>> {
        // Reject endpoints the HTTP client could not route through.
        reqwest::Proxy::all(proxy.url())
            .map_err(|e| SessionError::InvalidEndpoint(format!("{proxy}: {e}")))?;
        Ok(Arc::new(Socks5Dialer::new(proxy.clone(), self.dial_timeout)))
    }

    fn open<'a>(
        &'a self,
        credential: &'a SessionCredential,
        dialer: Arc<dyn ProxyDialer>,
    ) -> BoxFuture<'a, session::Result<Arc<dyn SessionHandle>>> {
        Box::pin(async move {
            let http = self.build_http(credential, Some(dialer.endpoint()))?;
            debug!(account_id = %credential.account_id, proxy = %dialer.endpoint(), "http session opened");
            Ok(Arc::new(HttpSession {
                endpoint: self.endpoint.clone(),
                http,
            }) as Arc<dyn SessionHandle>)
        })
    }
}

struct HttpSession {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpSession {
    fn resolve_url(&self, key: &str) -> session::Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| SessionError::Setup(format!("endpoint {} cannot carry a path", self.endpoint)))?
            .pop_if_empty()
            .push("resolve")
            .push(key);
        Ok(url)
    }
}

impl SessionHandle for HttpSession {
    fn resolve<'a>(&'a self, key: &'a str) -> BoxFuture<'a, session::Result<Option<EntityRecord>>> {
        Box::pin(async move {
            let url = self.resolve_url(key)?;
            let response = self.http.get(url).send().await.map_err(transport_error)?;

            match response.status() {
                StatusCode::OK => response
                    .json::<EntityRecord>()
                    .await
                    .map(Some)
                    .map_err(|e| SessionError::Protocol(format!("decoding entity for {key}: {e}"))),
                StatusCode::NOT_FOUND => Ok(None),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    let message = if body.trim().is_empty() {
                        status.to_string()
                    } else {
                        body
                    };
                    Err(SessionError::Remote(message))
                }
            }
        })
    }
}

fn transport_error(e: reqwest::Error) -> SessionError {
    if e.is_connect() || e.is_timeout() {
        SessionError::Dial(e.to_string())
    } else {
        SessionError::Protocol(e.to_string())
    }
}
