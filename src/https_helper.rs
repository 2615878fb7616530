use async_trait::async_trait;
use async_web_client::prelude::*;
use futures::AsyncReadExt;
use futures_rustls::pki_types::InvalidDnsNameError;
use futures_rustls::rustls::crypto::ring::default_provider;
use futures_rustls::rustls::{ClientConfig, RootCertStore};
use http::header::CONTENT_TYPE;
use http::{Method, Request, Response};
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Transport used for every request to the CA and for HTTP-01 pre-validation.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: Request<String>) -> Result<Response<String>, HttpsRequestError>;
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    async fn send(&self, request: Request<String>) -> Result<Response<String>, HttpsRequestError> {
        (**self).send(request).await
    }
}

#[derive(Debug, Clone)]
pub struct WebClient {
    client_config: Arc<ClientConfig>,
}

impl WebClient {
    pub fn new() -> Result<Self, HttpsRequestError> {
        let mut root_store = RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let client_config = ClientConfig::builder_with_provider(Arc::new(default_provider()))
            .with_safe_default_protocol_versions()?
            .with_root_certificates(root_store)
            .with_no_client_auth();
        Ok(Self::with_client_config(Arc::new(client_config)))
    }
    pub fn with_client_config(client_config: Arc<ClientConfig>) -> Self {
        Self { client_config }
    }
}

#[async_trait]
impl HttpClient for WebClient {
    async fn send(&self, request: Request<String>) -> Result<Response<String>, HttpsRequestError> {
        let mut response = request.send_with_client_config(self.client_config.clone()).await?;
        let mut body = String::new();
        response.body_mut().read_to_string(&mut body).await?;
        Ok(response.map(|_| body))
    }
}

pub(crate) async fn https<H: HttpClient + ?Sized>(
    client: &H,
    url: impl AsRef<str>,
    method: Method,
    body: Option<String>,
) -> Result<Response<String>, HttpsRequestError> {
    let request = Request::builder().method(method).uri(url.as_ref());
    let request = if let Some(body) = body {
        request.header(CONTENT_TYPE, "application/jose+json").body(body)
    } else {
        request.body("".to_string())
    };
    let response = client.send(request?).await?;
    let status = response.status();
    if !status.is_success() {
        return Err(HttpsRequestError::Non2xxStatus {
            status_code: status.into(),
            body: response.into_body(),
        });
    }
    Ok(response)
}

#[derive(Error, Debug)]
pub enum HttpsRequestError {
    #[error("io error: {0:?}")]
    Io(#[from] io::Error),
    #[error("invalid dns name: {0:?}")]
    InvalidDnsName(#[from] InvalidDnsNameError),
    #[error("tls configuration error: {0}")]
    Tls(#[from] futures_rustls::rustls::Error),
    #[error("http error: {0:?}")]
    Http(Box<dyn std::error::Error + Send + Sync + 'static>),
    #[error("non 2xx http status: {status_code} {body:?}")]
    Non2xxStatus { status_code: u16, body: String },
}

impl From<async_web_client::HttpError> for HttpsRequestError {
    fn from(e: async_web_client::HttpError) -> Self {
        Self::Http(e.into())
    }
}

impl From<http::Error> for HttpsRequestError {
    fn from(e: http::Error) -> Self {
        Self::Http(e.into())
    }
}
