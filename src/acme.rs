use crate::certificate::{CertParseError, Certificate, CertificateRequest, CertificateResponse, RevocationReason};
use crate::challenge::{AuthorizationChallenge, CertificateOrder};
use crate::config::AcmeConfig;
use crate::csr::csr_der;
use crate::https_helper::{https, HttpClient, HttpsRequestError, WebClient};
use crate::jose::{ExternalAccount, JoseError, RequestSigner, EMPTY_OBJECT, POST_AS_GET};
use crate::key::PrivateKey;
use crate::problem::{Problem, ServerError};
use crate::solver::SolverError;
use crate::validator::ValidationError;
use async_io::Timer;
use base64::prelude::*;
use http::header::LINK;
use http::{Method, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const LETS_ENCRYPT_STAGING_DIRECTORY: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";
pub const LETS_ENCRYPT_PRODUCTION_DIRECTORY: &str = "https://acme-v02.api.letsencrypt.org/directory";

const REPLAY_NONCE: &str = "replay-nonce";
const LOCATION: &str = "location";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    NewNonce,
    NewAccount,
    NewOrder,
    RevokeCert,
    KeyChange,
}

impl Resource {
    pub fn name(self) -> &'static str {
        match self {
            Resource::NewNonce => "newNonce",
            Resource::NewAccount => "newAccount",
            Resource::NewOrder => "newOrder",
            Resource::RevokeCert => "revokeCert",
            Resource::KeyChange => "keyChange",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Directory {
    #[serde(default)]
    pub meta: DirectoryMeta,
    #[serde(flatten)]
    urls: HashMap<String, Value>,
}

impl Directory {
    pub fn url(&self, name: &str) -> Result<&str, AcmeError> {
        self.urls
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| AcmeError::UnknownResource(name.to_string()))
    }
    pub fn resource(&self, resource: Resource) -> Result<&str, AcmeError> {
        self.url(resource.name())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectoryMeta {
    pub terms_of_service: Option<String>,
    pub website: Option<String>,
    pub caa_identities: Vec<String>,
    pub external_account_required: bool,
}

/// Status of an account, order, authorization or challenge resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Ready,
    Processing,
    Valid,
    Invalid,
    Revoked,
    Deactivated,
    Expired,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Ready => "ready",
            Status::Processing => "processing",
            Status::Valid => "valid",
            Status::Invalid => "invalid",
            Status::Revoked => "revoked",
            Status::Deactivated => "deactivated",
            Status::Expired => "expired",
            Status::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Identifier {
    Dns(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(skip)]
    pub url: String,
    pub status: Status,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(default)]
    pub orders: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    pub status: Status,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub identifiers: Vec<Identifier>,
    #[serde(default)]
    pub authorizations: Vec<String>,
    pub finalize: String,
    #[serde(default)]
    pub certificate: Option<String>,
    #[serde(default)]
    pub error: Option<Problem>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthorizationStatus {
    identifier: Identifier,
    #[serde(default)]
    challenges: Vec<ChallengeStatus>,
    #[serde(default)]
    wildcard: bool,
}

impl AuthorizationStatus {
    fn domain(&self) -> String {
        let Identifier::Dns(domain) = &self.identifier;
        match self.wildcard {
            true => format!("*.{}", domain),
            false => domain.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ChallengeStatus {
    #[serde(rename = "type")]
    typ: String,
    url: String,
    #[serde(default)]
    token: String,
    status: Status,
    #[serde(default)]
    error: Option<Problem>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewAccountRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    only_return_existing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terms_of_service_agreed: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    contact: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_account_binding: Option<Value>,
}

#[derive(Debug, Serialize)]
struct NewOrderRequest {
    identifiers: Vec<Identifier>,
}

#[derive(Debug, Serialize)]
struct FinalizeRequest {
    csr: String,
}

#[derive(Debug, Serialize)]
struct RevokeCertRequest {
    certificate: String,
    reason: u8,
}

/// Signed-request client for one ACME account.
///
/// Every operation that sends a signed request takes `&mut self`: the client
/// carries the replay nonce of the previous response and must be driven by a
/// single task. Use one client per concurrent flow.
pub struct AcmeClient<H: HttpClient = WebClient> {
    http: H,
    signer: RequestSigner,
    config: AcmeConfig,
    directory: Option<Directory>,
    account_url: Option<String>,
    nonce: Option<String>,
}

impl AcmeClient<WebClient> {
    pub fn new(config: AcmeConfig, account_key: PrivateKey) -> Result<Self, AcmeError> {
        Self::with_http_client(config, account_key, WebClient::new()?)
    }
}

impl<H: HttpClient> AcmeClient<H> {
    pub fn with_http_client(config: AcmeConfig, account_key: PrivateKey, http: H) -> Result<Self, AcmeError> {
        Ok(Self {
            http,
            signer: RequestSigner::new(account_key)?,
            config,
            directory: None,
            account_url: None,
            nonce: None,
        })
    }
    pub fn signer(&self) -> &RequestSigner {
        &self.signer
    }
    pub fn config(&self) -> &AcmeConfig {
        &self.config
    }
    pub fn http_client(&self) -> &H {
        &self.http
    }

    /// Directory document, fetched on first use.
    pub async fn directory(&mut self) -> Result<&Directory, AcmeError> {
        let directory = match self.directory.take() {
            Some(directory) => directory,
            None => {
                log::info!("fetching directory {}", self.config.directory_url);
                let response = https(&self.http, &self.config.directory_url, Method::GET, None).await?;
                parse(&response)?
            }
        };
        let directory: &Directory = self.directory.insert(directory);
        Ok(directory)
    }

    pub async fn resource_url(&mut self, resource: Resource) -> Result<String, AcmeError> {
        Ok(self.directory().await?.resource(resource)?.to_string())
    }

    async fn nonce(&mut self) -> Result<String, AcmeError> {
        if let Some(nonce) = self.nonce.take() {
            return Ok(nonce);
        }
        let url = self.resource_url(Resource::NewNonce).await?;
        log::debug!("fetching new nonce from {}", url);
        let response = https(&self.http, &url, Method::HEAD, None).await?;
        get_header(&response, REPLAY_NONCE)
    }

    /// Signed POST, retried once with a fresh nonce if the CA answers `badNonce`.
    async fn post(&mut self, url: &str, payload: &str, kid: Option<&str>) -> Result<Response<String>, AcmeError> {
        match self.post_once(url, payload, kid).await {
            Err(AcmeError::Server(err)) if err.is_bad_nonce() => {
                log::warn!("nonce rejected by {}, retrying with a fresh one", url);
                self.nonce = None;
                self.post_once(url, payload, kid).await
            }
            result => result,
        }
    }

    async fn post_once(&mut self, url: &str, payload: &str, kid: Option<&str>) -> Result<Response<String>, AcmeError> {
        let nonce = self.nonce().await?;
        let body = match kid {
            Some(kid) => self.signer.sign_kid(kid, url, &nonce, payload)?,
            None => self.signer.sign_jwk(url, &nonce, payload)?,
        };
        let response = https(&self.http, url, Method::POST, Some(body)).await?;
        self.nonce = get_header(&response, REPLAY_NONCE).ok();
        log::debug!("response: {:?}", response.body());
        Ok(response)
    }

    /// Creates the account, or returns the existing one for this key.
    ///
    /// `email` and `external_account` fall back to the configured contacts and
    /// external account binding.
    pub async fn register_account(
        &mut self,
        email: Option<&str>,
        external_account: Option<&ExternalAccount>,
    ) -> Result<Account, AcmeError> {
        let url = self.resource_url(Resource::NewAccount).await?;
        let contact = match email {
            Some(email) => vec![format!("mailto:{}", email)],
            None => self.config.contact.clone(),
        };
        let external_account_binding = external_account
            .or(self.config.external_account.as_ref())
            .map(|eab| self.signer.external_account_binding(eab, &url))
            .transpose()?;
        let payload = serde_json::to_string(&NewAccountRequest {
            terms_of_service_agreed: Some(true),
            contact,
            external_account_binding,
            ..Default::default()
        })?;
        let response = self.post(&url, &payload, None).await?;
        let mut account: Account = parse(&response)?;
        account.url = get_header(&response, LOCATION)?;
        log::info!("registered account {}", account.url);
        self.account_url = Some(account.url.clone());
        Ok(account)
    }

    /// URL of the account owning the client key, resolved once.
    pub async fn account_url(&mut self) -> Result<String, AcmeError> {
        if let Some(url) = &self.account_url {
            return Ok(url.clone());
        }
        let url = self.resource_url(Resource::NewAccount).await?;
        let payload = serde_json::to_string(&NewAccountRequest {
            only_return_existing: Some(true),
            ..Default::default()
        })?;
        let response = self.post(&url, &payload, None).await?;
        let account_url = get_header(&response, LOCATION)?;
        log::info!("using account {}", account_url);
        self.account_url = Some(account_url.clone());
        Ok(account_url)
    }

    pub async fn request_order(&mut self, domains: &[String]) -> Result<CertificateOrder, OrderError> {
        let kid = self.account_url().await?;
        let url = self.resource_url(Resource::NewOrder).await?;
        let identifiers = domains.iter().cloned().map(Identifier::Dns).collect();
        let payload = serde_json::to_string(&NewOrderRequest { identifiers }).map_err(AcmeError::from)?;
        let response = self.post(&url, &payload, Some(&kid)).await?;
        let order_endpoint = get_header(&response, LOCATION)?;
        let order: OrderStatus = parse(&response)?;
        log::info!("created order {} for {:?}", order_endpoint, domains);
        if order.authorizations.is_empty() {
            return Err(OrderError::ChallengeNotSupported(domains.join(", ")));
        }
        let mut challenges = BTreeMap::new();
        for authorization_url in &order.authorizations {
            let response = self.post(authorization_url, POST_AS_GET, Some(&kid)).await?;
            let authorization: AuthorizationStatus = parse(&response)?;
            let domain = authorization.domain();
            let offered = authorization
                .challenges
                .iter()
                .map(|challenge| authorization_challenge(&self.signer, &domain, challenge))
                .collect::<Result<Vec<_>, _>>()?;
            if offered.is_empty() {
                return Err(OrderError::ChallengeNotSupported(domain));
            }
            challenges.insert(domain, offered);
        }
        if let Some(missing) = domains.iter().find(|domain| !challenges.contains_key(domain.as_str())) {
            return Err(OrderError::ChallengeNotSupported(missing.clone()));
        }
        Ok(CertificateOrder::new(challenges, order_endpoint))
    }

    /// Orders `domain` alone and returns the challenges offered for it.
    pub async fn request_authorization(&mut self, domain: &str) -> Result<Vec<AuthorizationChallenge>, OrderError> {
        let order = self.request_order(&[domain.to_string()]).await?;
        let mut challenges = order.into_challenges();
        match challenges.remove(domain) {
            Some(challenges) => Ok(challenges),
            None => Err(OrderError::ChallengeNotSupported(domain.to_string())),
        }
    }

    pub async fn reload_authorization(
        &mut self,
        challenge: &AuthorizationChallenge,
    ) -> Result<AuthorizationChallenge, AcmeError> {
        let kid = self.account_url().await?;
        let response = self.post(challenge.url(), POST_AS_GET, Some(&kid)).await?;
        authorization_challenge(&self.signer, challenge.domain(), &parse(&response)?)
    }

    /// Asks the CA to verify `challenge` and polls until it leaves the pending
    /// state. Fails with [OrderError::ChallengeTimedOut] once `timeout`
    /// (the configured challenge timeout by default) has passed.
    pub async fn challenge_authorization(
        &mut self,
        challenge: &AuthorizationChallenge,
        timeout: Option<Duration>,
    ) -> Result<AuthorizationChallenge, OrderError> {
        let deadline = Instant::now() + timeout.unwrap_or(self.config.challenge_timeout);
        let mut current = self.reload_authorization(challenge).await?;
        if current.status() == &Status::Pending {
            log::info!("trigger {} challenge for {}", current.kind(), current.domain());
            let kid = self.account_url().await?;
            let response = self.post(challenge.url(), EMPTY_OBJECT, Some(&kid)).await?;
            current = authorization_challenge(&self.signer, challenge.domain(), &parse(&response)?)?;
        }
        while current.is_pending() && Instant::now() < deadline {
            log::info!("authorization for {} still pending", current.domain());
            Timer::after(self.config.poll_interval).await;
            current = self.reload_authorization(&current).await?;
        }
        if current.is_valid() {
            log::info!("authorization for {} is valid", current.domain());
            return Ok(current);
        }
        if current.is_pending() {
            return Err(OrderError::ChallengeTimedOut {
                domain: current.domain().to_string(),
            });
        }
        Err(OrderError::ChallengeFailed {
            domain: current.domain().to_string(),
            status: current.status().clone(),
            detail: current.error().unwrap_or_default().to_string(),
        })
    }

    pub async fn reload_order(&mut self, order: &CertificateOrder) -> Result<OrderStatus, AcmeError> {
        let kid = self.account_url().await?;
        let response = self.post(order.order_endpoint(), POST_AS_GET, Some(&kid)).await?;
        parse(&response)
    }

    /// Submits the CSR once the order allows it, polls the order until the
    /// certificate is issued and downloads it.
    pub async fn finalize_order(
        &mut self,
        order: &CertificateOrder,
        request: &CertificateRequest,
        timeout: Option<Duration>,
    ) -> Result<CertificateResponse, OrderError> {
        let deadline = Instant::now() + timeout.unwrap_or(self.config.finalize_timeout);
        let mut status = self.reload_order(order).await?;
        if matches!(status.status, Status::Pending | Status::Ready) {
            log::info!("sending csr to {}", status.finalize);
            let csr = csr_der(request).map_err(AcmeError::from)?;
            let payload = serde_json::to_string(&FinalizeRequest {
                csr: BASE64_URL_SAFE_NO_PAD.encode(csr),
            })
            .map_err(AcmeError::from)?;
            let kid = self.account_url().await?;
            let response = self.post(&status.finalize, &payload, Some(&kid)).await?;
            status = parse(&response)?;
        }
        while order_in_progress(&status.status) && Instant::now() < deadline {
            log::info!("order {} is {}", order.order_endpoint(), status.status);
            Timer::after(self.config.poll_interval).await;
            status = self.reload_order(order).await?;
        }
        match status.status {
            Status::Valid => {
                let url = status.certificate.ok_or(AcmeError::MissingField("certificate"))?;
                let certificate = self.download_certificate(&url).await?;
                Ok(CertificateResponse::new(request.clone(), certificate))
            }
            ref s if order_in_progress(s) => Err(OrderError::CertificateRequestTimedOut),
            s => Err(OrderError::CertificateRequestFailed {
                status: s,
                detail: status.error.as_ref().map(problem_detail).unwrap_or_default(),
            }),
        }
    }

    /// Orders every name of the request's subject and finalizes the order.
    /// Authorizations must already be valid.
    pub async fn request_certificate(
        &mut self,
        request: &CertificateRequest,
        timeout: Option<Duration>,
    ) -> Result<CertificateResponse, OrderError> {
        let order = self.request_order(&request.distinguished_name().domains()).await?;
        self.finalize_order(&order, request, timeout).await
    }

    /// Downloads a certificate chain. With a preferred chain configured, the
    /// alternates announced in `Link` headers are tried until one is issued by
    /// that name.
    pub async fn download_certificate(&mut self, url: &str) -> Result<Certificate, AcmeError> {
        log::info!("download certificate {}", url);
        let kid = self.account_url().await?;
        let response = self.post(url, POST_AS_GET, Some(&kid)).await?;
        let certificate = Certificate::from_pem_bundle(response.body())?;
        let Some(preferred) = self.config.preferred_chain.clone() else {
            return Ok(certificate);
        };
        if issued_by(&certificate, &preferred) {
            return Ok(certificate);
        }
        for alternate in alternate_links(&response) {
            log::debug!("trying alternate chain {}", alternate);
            let response = self.post(&alternate, POST_AS_GET, Some(&kid)).await?;
            let alternate = Certificate::from_pem_bundle(response.body())?;
            if issued_by(&alternate, &preferred) {
                return Ok(alternate);
            }
        }
        log::warn!("no chain issued by {:?}, using the default chain", preferred);
        Ok(certificate)
    }

    pub async fn revoke_certificate(
        &mut self,
        certificate: &Certificate,
        reason: Option<RevocationReason>,
    ) -> Result<(), OrderError> {
        let kid = self.account_url().await?;
        let url = self.resource_url(Resource::RevokeCert).await?;
        let reason = reason.unwrap_or_default();
        let payload = serde_json::to_string(&RevokeCertRequest {
            certificate: BASE64_URL_SAFE_NO_PAD.encode(certificate.der().map_err(AcmeError::from)?),
            reason: reason.code(),
        })
        .map_err(AcmeError::from)?;
        match self.post(&url, &payload, Some(&kid)).await {
            Ok(_) => {
                log::info!("certificate revoked ({})", reason);
                Ok(())
            }
            Err(AcmeError::Server(err)) => Err(OrderError::CertificateRevocation(err)),
            Err(err) => Err(err.into()),
        }
    }
}

fn order_in_progress(status: &Status) -> bool {
    matches!(status, Status::Pending | Status::Ready | Status::Processing)
}

fn authorization_challenge(
    signer: &RequestSigner,
    domain: &str,
    challenge: &ChallengeStatus,
) -> Result<AuthorizationChallenge, AcmeError> {
    let payload = signer.key_authorization(&challenge.token)?;
    Ok(AuthorizationChallenge::new(
        domain,
        challenge.status.clone(),
        &challenge.typ,
        &challenge.url,
        &challenge.token,
        payload,
    )
    .with_error(challenge.error.as_ref().map(problem_detail)))
}

fn problem_detail(problem: &Problem) -> String {
    problem.detail.clone().or_else(|| problem.typ.clone()).unwrap_or_default()
}

fn issued_by(certificate: &Certificate, issuer: &str) -> bool {
    match certificate.root().parse() {
        Ok(parsed) => parsed.issuer.as_deref() == Some(issuer),
        Err(err) => {
            log::warn!("could not parse certificate: {}", err);
            false
        }
    }
}

fn parse<T: DeserializeOwned>(response: &Response<String>) -> Result<T, AcmeError> {
    Ok(serde_json::from_str(response.body())?)
}

fn get_header<B>(response: &Response<B>, header: &'static str) -> Result<String, AcmeError> {
    response
        .headers()
        .get_all(header)
        .iter()
        .last()
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or(AcmeError::MissingHeader(header))
}

fn alternate_links<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|link| {
            let (target, params) = link.split_once(';')?;
            let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
            let alternate = params
                .split(';')
                .map(|param| param.trim().replace(' ', ""))
                .any(|param| param == "rel=\"alternate\"" || param == "rel=alternate");
            alternate.then(|| target.to_string())
        })
        .collect()
}

#[derive(Error, Debug)]
pub enum AcmeError {
    #[error("http request error: {0}")]
    HttpRequest(HttpsRequestError),
    #[error("acme server error: {0}")]
    Server(#[from] ServerError),
    #[error("JOSE error: {0}")]
    Jose(#[from] JoseError),
    #[error("expected JSON response: {0}")]
    Json(#[from] serde_json::Error),
    #[error("acme service response is missing {0} header")]
    MissingHeader(&'static str),
    #[error("acme service response is missing the {0} field")]
    MissingField(&'static str),
    #[error("directory has no {0:?} resource")]
    UnknownResource(String),
    #[error("certificate generation error: {0}")]
    Rcgen(#[from] rcgen::Error),
    #[error("certificate parsing error: {0}")]
    CertParse(#[from] CertParseError),
}

impl From<HttpsRequestError> for AcmeError {
    fn from(e: HttpsRequestError) -> Self {
        match e {
            HttpsRequestError::Non2xxStatus { status_code, body } => {
                AcmeError::Server(ServerError::from_response(status_code, &body))
            }
            e => AcmeError::HttpRequest(e),
        }
    }
}

#[derive(Error, Debug)]
pub enum OrderError {
    #[error("acme error: {0}")]
    Acme(#[from] AcmeError),
    #[error("no supported challenge for {0}")]
    ChallengeNotSupported(String),
    #[error("challenge for {domain} is {status}: {detail}")]
    ChallengeFailed { domain: String, status: Status, detail: String },
    #[error("challenge for {domain} timed out")]
    ChallengeTimedOut { domain: String },
    #[error("certificate request failed, order is {status}: {detail}")]
    CertificateRequestFailed { status: Status, detail: String },
    #[error("certificate request timed out")]
    CertificateRequestTimedOut,
    #[error("certificate revocation failed: {0}")]
    CertificateRevocation(ServerError),
    #[error("solver error: {0}")]
    Solver(#[from] SolverError),
}

impl From<ValidationError> for OrderError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::NotSupported { domain, .. } => OrderError::ChallengeNotSupported(domain),
        }
    }
}
