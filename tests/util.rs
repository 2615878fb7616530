#![allow(dead_code)]

use acme_core::{AcmeClient, AcmeConfig, HttpClient, HttpsRequestError, PrivateKey};
use async_trait::async_trait;
use base64::prelude::*;
use http::{Method, Request, Response};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DIRECTORY: &str = "https://ca.test/directory";
pub const NEW_NONCE: &str = "https://ca.test/new-nonce";
pub const NEW_ACCOUNT: &str = "https://ca.test/new-account";
pub const NEW_ORDER: &str = "https://ca.test/new-order";
pub const REVOKE_CERT: &str = "https://ca.test/revoke-cert";
pub const ACCOUNT: &str = "https://ca.test/acct/1";
pub const ORDER: &str = "https://ca.test/order/1";
pub const FINALIZE: &str = "https://ca.test/order/1/finalize";
pub const AUTHZ: &str = "https://ca.test/authz/1";
pub const HTTP_CHALLENGE: &str = "https://ca.test/chall/1/http";
pub const DNS_CHALLENGE: &str = "https://ca.test/chall/1/dns";
pub const CERTIFICATE: &str = "https://ca.test/cert/1";

pub const ACCOUNT_KEY: &str = include_str!("data/p256.pem");
pub const LEAF: &str = include_str!("data/leaf.pem");
pub const ROOT: &str = include_str!("data/root.pem");
pub const ALT_ROOT: &str = include_str!("data/alt_root.pem");

/// A canned response. Every response also carries a fresh `Replay-Nonce`.
#[derive(Clone, Debug)]
pub struct Canned {
    status: u16,
    headers: Vec<(String, String)>,
    body: String,
}

impl Canned {
    pub fn new(status: u16, body: impl ToString) -> Self {
        Self {
            status,
            headers: vec![],
            body: body.to_string(),
        }
    }
    pub fn json(status: u16, body: Value) -> Self {
        Self::new(status, body)
    }
    pub fn problem(status: u16, kind: &str, detail: &str) -> Self {
        Self::json(
            status,
            json!({"type": format!("urn:ietf:params:acme:error:{}", kind), "detail": detail, "status": status}),
        )
    }
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub url: String,
    pub body: String,
}

impl Recorded {
    pub fn jws(&self) -> Jws {
        Jws::decode(&self.body)
    }
}

/// Scripted CA. Responses for one route are served in order and the last one
/// is repeated. Unknown routes answer 404.
#[derive(Default)]
pub struct MockHttpClient {
    routes: Mutex<HashMap<(Method, String), VecDeque<Canned>>>,
    requests: Mutex<Vec<Recorded>>,
    nonces: AtomicUsize,
}

impl MockHttpClient {
    /// Serves the directory, nonces and the account of [ACCOUNT_KEY].
    pub fn new() -> Arc<Self> {
        let mock = Arc::new(Self::default());
        mock.route(
            Method::GET,
            DIRECTORY,
            [Canned::json(
                200,
                json!({
                    "newNonce": NEW_NONCE,
                    "newAccount": NEW_ACCOUNT,
                    "newOrder": NEW_ORDER,
                    "revokeCert": REVOKE_CERT,
                    "meta": {"termsOfService": "https://ca.test/tos"}
                }),
            )],
        );
        mock.route(Method::HEAD, NEW_NONCE, [Canned::new(200, "")]);
        mock.route(
            Method::POST,
            NEW_ACCOUNT,
            [Canned::json(200, json!({"status": "valid", "contact": []})).header("Location", ACCOUNT)],
        );
        mock
    }

    pub fn route(&self, method: Method, url: &str, responses: impl IntoIterator<Item = Canned>) {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_string()), responses.into_iter().collect());
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, url: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.url == url)
            .collect()
    }

    pub fn count(&self, method: Method, url: &str) -> usize {
        self.requests_to(method, url).len()
    }

    fn next(&self, method: &Method, url: &str) -> Canned {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&(method.clone(), url.to_string())) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Canned::new(404, "not found"),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: Request<String>) -> Result<Response<String>, HttpsRequestError> {
        let method = request.method().clone();
        let url = request.uri().to_string();
        self.requests.lock().unwrap().push(Recorded {
            method: method.clone(),
            url: url.clone(),
            body: request.body().clone(),
        });
        let canned = self.next(&method, &url);
        let nonce = format!("nonce-{}", self.nonces.fetch_add(1, Ordering::SeqCst));
        let mut response = Response::builder().status(canned.status).header("Replay-Nonce", nonce);
        for (name, value) in &canned.headers {
            response = response.header(name.as_str(), value.as_str());
        }
        Ok(response.body(canned.body)?)
    }
}

/// A decoded flattened JWS request body.
#[derive(Debug)]
pub struct Jws {
    pub protected: Value,
    pub payload: String,
    pub signature: Vec<u8>,
    pub signing_input: String,
}

impl Jws {
    pub fn decode(body: &str) -> Self {
        let body: Value = serde_json::from_str(body).unwrap();
        let field = |name: &str| body[name].as_str().unwrap().to_string();
        let decode = |value: &str| BASE64_URL_SAFE_NO_PAD.decode(value).unwrap();
        Jws {
            protected: serde_json::from_slice(&decode(&field("protected"))).unwrap(),
            payload: String::from_utf8(decode(&field("payload"))).unwrap(),
            signature: decode(&field("signature")),
            signing_input: format!("{}.{}", field("protected"), field("payload")),
        }
    }
    pub fn payload_json(&self) -> Value {
        serde_json::from_str(&self.payload).unwrap()
    }
}

pub fn config() -> AcmeConfig {
    AcmeConfig::new().directory(DIRECTORY)
}

pub fn client(mock: &Arc<MockHttpClient>) -> AcmeClient<Arc<MockHttpClient>> {
    client_with(mock, config())
}

pub fn client_with(mock: &Arc<MockHttpClient>, config: AcmeConfig) -> AcmeClient<Arc<MockHttpClient>> {
    AcmeClient::with_http_client(config, PrivateKey::new(ACCOUNT_KEY), mock.clone()).unwrap()
}

pub fn fast_config() -> AcmeConfig {
    config().poll_interval(Duration::from_millis(10))
}

pub fn order_json(status: &str) -> Value {
    json!({
        "status": status,
        "identifiers": [{"type": "dns", "value": "acmephp.com"}],
        "authorizations": [AUTHZ],
        "finalize": FINALIZE,
        "certificate": if status == "valid" { Value::from(CERTIFICATE) } else { Value::Null },
    })
}

pub fn authz_json(status: &str) -> Value {
    json!({
        "identifier": {"type": "dns", "value": "acmephp.com"},
        "status": status,
        "challenges": [
            challenge_json("http-01", HTTP_CHALLENGE, status),
            challenge_json("dns-01", DNS_CHALLENGE, status),
        ],
    })
}

pub fn challenge_json(kind: &str, url: &str, status: &str) -> Value {
    json!({"type": kind, "url": url, "token": "tok123", "status": status})
}

/// Routes a one-domain order for `acmephp.com` with pending authorization.
pub fn route_new_order(mock: &MockHttpClient) {
    mock.route(
        Method::POST,
        NEW_ORDER,
        [Canned::json(201, order_json("pending")).header("Location", ORDER)],
    );
    mock.route(Method::POST, AUTHZ, [Canned::json(200, authz_json("pending"))]);
}

pub fn bundle(certificates: &[&str]) -> String {
    certificates.iter().map(|c| c.trim()).collect::<Vec<_>>().join("\n\n")
}
