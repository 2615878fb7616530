mod util;

use acme_core::acme::Status;
use acme_core::challenge::HTTP_01;
use acme_core::validator::ValidationError;
use acme_core::{
    issue, AuthorizationChallenge, CertificateOrder, CertificateRequest, DistinguishedName, KeyPair, KeyType,
    OrderError, Solver, Validator,
};
use acme_core::solver::SolverError;
use async_trait::async_trait;
use base64::prelude::*;
use http::Method;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use util::*;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::prelude::FromDer;

fn request() -> CertificateRequest {
    CertificateRequest::new(
        DistinguishedName::new("acmephp.com"),
        KeyPair::generate(KeyType::EcdsaP256).unwrap(),
    )
}

fn order() -> CertificateOrder {
    CertificateOrder::new(BTreeMap::new(), ORDER)
}

#[async_std::test]
async fn order_lists_offered_challenges_with_key_authorizations() {
    let mock = MockHttpClient::new();
    route_new_order(&mock);
    let mut client = client(&mock);
    let order = client.request_order(&["acmephp.com".to_string()]).await.unwrap();
    assert_eq!(order.order_endpoint(), ORDER);
    let challenges = order.challenges_for("acmephp.com");
    assert_eq!(challenges.len(), 2);
    assert_eq!(challenges[0].kind(), HTTP_01);
    assert_eq!(challenges[0].url(), HTTP_CHALLENGE);
    assert_eq!(challenges[0].payload(), client.signer().key_authorization("tok123").unwrap());
    assert!(challenges[0].payload().starts_with("tok123."));

    let payload = mock.requests_to(Method::POST, NEW_ORDER)[0].jws().payload_json();
    assert_eq!(payload, json!({"identifiers": [{"type": "dns", "value": "acmephp.com"}]}));
    assert_eq!(mock.requests_to(Method::POST, AUTHZ)[0].jws().payload, "");
}

#[async_std::test]
async fn order_without_authorizations_is_not_supported() {
    let mock = MockHttpClient::new();
    mock.route(
        Method::POST,
        NEW_ORDER,
        [Canned::json(201, json!({"status": "pending", "authorizations": [], "finalize": FINALIZE}))
            .header("Location", ORDER)],
    );
    let mut client = client(&mock);
    let err = client.request_order(&["acmephp.com".to_string()]).await.unwrap_err();
    assert!(matches!(err, OrderError::ChallengeNotSupported(_)));
}

#[async_std::test]
async fn order_missing_an_authorization_is_not_supported() {
    let mock = MockHttpClient::new();
    route_new_order(&mock);
    let mut client = client(&mock);
    let domains = ["acmephp.com".to_string(), "www.acmephp.com".to_string()];
    let err = client.request_order(&domains).await.unwrap_err();
    assert!(matches!(err, OrderError::ChallengeNotSupported(domain) if domain == "www.acmephp.com"));
}

#[async_std::test]
async fn authorization_without_challenges_is_not_supported() {
    let mock = MockHttpClient::new();
    route_new_order(&mock);
    mock.route(
        Method::POST,
        AUTHZ,
        [Canned::json(
            200,
            json!({"identifier": {"type": "dns", "value": "acmephp.com"}, "status": "pending", "challenges": []}),
        )],
    );
    let mut client = client(&mock);
    let err = client.request_authorization("acmephp.com").await.unwrap_err();
    assert!(matches!(err, OrderError::ChallengeNotSupported(domain) if domain == "acmephp.com"));
}

fn http_challenge(client: &acme_core::AcmeClient<std::sync::Arc<MockHttpClient>>) -> AuthorizationChallenge {
    AuthorizationChallenge::new(
        "acmephp.com",
        Status::Pending,
        HTTP_01,
        HTTP_CHALLENGE,
        "tok123",
        client.signer().key_authorization("tok123").unwrap(),
    )
}

#[async_std::test]
async fn pending_challenge_is_triggered_and_polled_until_valid() {
    let mock = MockHttpClient::new();
    mock.route(
        Method::POST,
        HTTP_CHALLENGE,
        [
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "pending")),
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "processing")),
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "pending")),
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "valid")),
        ],
    );
    let mut client = client_with(&mock, fast_config());
    let challenge = http_challenge(&client);
    let valid = client.challenge_authorization(&challenge, None).await.unwrap();
    assert!(valid.is_valid());
    assert_eq!(valid.domain(), "acmephp.com");

    let payloads: Vec<String> = mock
        .requests_to(Method::POST, HTTP_CHALLENGE)
        .iter()
        .map(|r| r.jws().payload)
        .collect();
    assert_eq!(payloads, ["", "{}", "", ""]);
}

#[async_std::test]
async fn valid_challenge_is_not_triggered_again() {
    let mock = MockHttpClient::new();
    mock.route(
        Method::POST,
        HTTP_CHALLENGE,
        [Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "valid"))],
    );
    let mut client = client(&mock);
    let challenge = http_challenge(&client);
    assert!(client.challenge_authorization(&challenge, None).await.unwrap().is_valid());
    assert_eq!(mock.count(Method::POST, HTTP_CHALLENGE), 1);
}

#[async_std::test]
async fn invalid_challenge_fails_with_the_ca_detail() {
    let mock = MockHttpClient::new();
    let mut invalid = challenge_json("http-01", HTTP_CHALLENGE, "invalid");
    invalid["error"] = json!({"type": "urn:ietf:params:acme:error:connection", "detail": "connection refused"});
    mock.route(
        Method::POST,
        HTTP_CHALLENGE,
        [
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "pending")),
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "processing")),
            Canned::json(200, invalid),
        ],
    );
    let mut client = client_with(&mock, fast_config());
    let challenge = http_challenge(&client);
    match client.challenge_authorization(&challenge, None).await.unwrap_err() {
        OrderError::ChallengeFailed { domain, status, detail } => {
            assert_eq!(domain, "acmephp.com");
            assert_eq!(status, Status::Invalid);
            assert_eq!(detail, "connection refused");
        }
        err => panic!("unexpected error {:?}", err),
    }
}

#[async_std::test]
async fn challenge_still_pending_at_deadline_times_out() {
    let mock = MockHttpClient::new();
    mock.route(
        Method::POST,
        HTTP_CHALLENGE,
        [Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "pending"))],
    );
    let mut client = client_with(&mock, fast_config());
    let challenge = http_challenge(&client);
    let err = client
        .challenge_authorization(&challenge, Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::ChallengeTimedOut { domain } if domain == "acmephp.com"));
}

#[async_std::test]
async fn finalize_polls_every_second_and_links_the_chain_leaf_first() {
    let mock = MockHttpClient::new();
    mock.route(
        Method::POST,
        ORDER,
        [
            Canned::json(200, order_json("pending")),
            Canned::json(200, order_json("pending")),
            Canned::json(200, order_json("valid")),
        ],
    );
    mock.route(Method::POST, FINALIZE, [Canned::json(200, order_json("processing"))]);
    mock.route(Method::POST, CERTIFICATE, [Canned::new(200, bundle(&[LEAF, ROOT]))]);
    let mut client = client(&mock);
    let request = request();

    let start = Instant::now();
    let response = client.finalize_order(&order(), &request, None).await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "{:?}", elapsed);
    assert!(elapsed < Duration::from_secs(3), "{:?}", elapsed);
    assert_eq!(mock.count(Method::POST, ORDER), 3);
    assert_eq!(mock.count(Method::POST, FINALIZE), 1);

    let certificate = response.certificate();
    assert_eq!(certificate.pem().trim(), LEAF.trim());
    assert_eq!(certificate.issuer().unwrap().pem().trim(), ROOT.trim());
    assert!(certificate.issuer().unwrap().issuer().is_none());
    assert_eq!(response.certificate_request(), &request);

    let csr = mock.requests_to(Method::POST, FINALIZE)[0].jws().payload_json();
    let csr = BASE64_URL_SAFE_NO_PAD.decode(csr["csr"].as_str().unwrap()).unwrap();
    let (_, csr) = X509CertificationRequest::from_der(&csr).unwrap();
    let subject = csr.certification_request_info.subject.to_string();
    assert!(subject.contains("CN=acmephp.com"), "{}", subject);
}

#[async_std::test]
async fn invalid_order_fails_without_submitting_a_csr() {
    let mock = MockHttpClient::new();
    let mut invalid = order_json("invalid");
    invalid["error"] = json!({"type": "urn:ietf:params:acme:error:unauthorized", "detail": "authorizations failed"});
    mock.route(Method::POST, ORDER, [Canned::json(200, invalid)]);
    let mut client = client(&mock);
    match client.finalize_order(&order(), &request(), None).await.unwrap_err() {
        OrderError::CertificateRequestFailed { status, detail } => {
            assert_eq!(status, Status::Invalid);
            assert_eq!(detail, "authorizations failed");
        }
        err => panic!("unexpected error {:?}", err),
    }
    assert_eq!(mock.count(Method::POST, FINALIZE), 0);
}

#[async_std::test]
async fn order_still_processing_at_deadline_times_out() {
    let mock = MockHttpClient::new();
    mock.route(
        Method::POST,
        ORDER,
        [Canned::json(200, order_json("ready")), Canned::json(200, order_json("processing"))],
    );
    mock.route(Method::POST, FINALIZE, [Canned::json(200, order_json("processing"))]);
    let mut client = client_with(&mock, fast_config());
    let err = client
        .finalize_order(&order(), &request(), Some(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, OrderError::CertificateRequestTimedOut));
}

#[async_std::test]
async fn preferred_chain_is_picked_from_alternates() {
    const ALTERNATE: &str = "https://ca.test/cert/1/1";
    fn route(mock: &MockHttpClient) {
        mock.route(Method::POST, ORDER, [Canned::json(200, order_json("valid"))]);
        mock.route(
            Method::POST,
            CERTIFICATE,
            [Canned::new(200, bundle(&[LEAF, ROOT])).header("Link", &format!("<{}>;rel=\"alternate\"", ALTERNATE))],
        );
        mock.route(Method::POST, ALTERNATE, [Canned::new(200, bundle(&[LEAF, ALT_ROOT]))]);
    }

    let mock = MockHttpClient::new();
    route(&mock);
    let mut client = client_with(&mock, config().preferred_chain("Acme Alt Root"));
    let response = client.finalize_order(&order(), &request(), None).await.unwrap();
    assert_eq!(response.certificate().root().pem().trim(), ALT_ROOT.trim());

    let mock = MockHttpClient::new();
    route(&mock);
    let mut client = util::client(&mock);
    let response = client.finalize_order(&order(), &request(), None).await.unwrap();
    assert_eq!(response.certificate().root().pem().trim(), ROOT.trim());
    assert_eq!(mock.count(Method::POST, ALTERNATE), 0);
}

#[async_std::test]
async fn certificate_for_already_authorized_names() {
    let mock = MockHttpClient::new();
    route_new_order(&mock);
    mock.route(Method::POST, AUTHZ, [Canned::json(200, authz_json("valid"))]);
    mock.route(Method::POST, ORDER, [Canned::json(200, order_json("ready"))]);
    mock.route(Method::POST, FINALIZE, [Canned::json(200, order_json("valid"))]);
    mock.route(Method::POST, CERTIFICATE, [Canned::new(200, bundle(&[LEAF, ROOT]))]);
    let mut client = client(&mock);
    let response = client.request_certificate(&request(), None).await.unwrap();
    assert_eq!(response.certificate().parse().unwrap().subject.as_deref(), Some("acmephp.com"));
    assert_eq!(mock.count(Method::POST, FINALIZE), 1);
    assert_eq!(client.reload_order(&order()).await.unwrap().status, Status::Ready);
}

#[derive(Default)]
struct RecordingSolver {
    events: Mutex<Vec<String>>,
}

#[async_trait]
impl Solver for RecordingSolver {
    fn supports(&self, challenge: &AuthorizationChallenge) -> bool {
        challenge.kind() == HTTP_01
    }
    async fn solve(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        self.events.lock().unwrap().push(format!("solve {}", challenge.domain()));
        Ok(())
    }
    async fn cleanup(&self, challenge: &AuthorizationChallenge) -> Result<(), SolverError> {
        self.events.lock().unwrap().push(format!("cleanup {}", challenge.domain()));
        Ok(())
    }
}

struct Verdict(bool);

#[async_trait]
impl Validator for Verdict {
    fn supports(&self, _challenge: &AuthorizationChallenge, _solver: &dyn Solver) -> bool {
        true
    }
    async fn is_valid(&self, _challenge: &AuthorizationChallenge, _solver: &dyn Solver) -> Result<bool, ValidationError> {
        Ok(self.0)
    }
}

#[async_std::test]
async fn issue_runs_the_whole_flow() {
    let mock = MockHttpClient::new();
    route_new_order(&mock);
    mock.route(
        Method::POST,
        HTTP_CHALLENGE,
        [
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "pending")),
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "processing")),
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "valid")),
        ],
    );
    mock.route(Method::POST, ORDER, [Canned::json(200, order_json("ready"))]);
    mock.route(Method::POST, FINALIZE, [Canned::json(200, order_json("valid"))]);
    mock.route(Method::POST, CERTIFICATE, [Canned::new(200, bundle(&[LEAF, ROOT]))]);
    let mut client = client_with(&mock, fast_config());
    let solver = RecordingSolver::default();

    let response = issue(&mut client, &request(), &solver, &Verdict(false)).await.unwrap();
    assert_eq!(response.certificate().chain().count(), 2);
    assert_eq!(*solver.events.lock().unwrap(), ["solve acmephp.com", "cleanup acmephp.com"]);
    assert_eq!(mock.count(Method::POST, DNS_CHALLENGE), 0);
}

#[async_std::test]
async fn issue_cleans_up_after_a_failed_challenge() {
    let mock = MockHttpClient::new();
    route_new_order(&mock);
    mock.route(
        Method::POST,
        HTTP_CHALLENGE,
        [
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "pending")),
            Canned::json(200, challenge_json("http-01", HTTP_CHALLENGE, "invalid")),
        ],
    );
    let mut client = client_with(&mock, fast_config());
    let solver = RecordingSolver::default();
    let err = issue(&mut client, &request(), &solver, &Verdict(true)).await.unwrap_err();
    assert!(matches!(err, OrderError::ChallengeFailed { .. }));
    assert_eq!(*solver.events.lock().unwrap(), ["solve acmephp.com", "cleanup acmephp.com"]);
    assert_eq!(mock.count(Method::POST, FINALIZE), 0);
}

#[async_std::test]
async fn issue_requires_a_supported_challenge() {
    let mock = MockHttpClient::new();
    route_new_order(&mock);
    mock.route(
        Method::POST,
        AUTHZ,
        [Canned::json(
            200,
            json!({
                "identifier": {"type": "dns", "value": "acmephp.com"},
                "status": "pending",
                "challenges": [challenge_json("tls-alpn-01", "https://ca.test/chall/1/alpn", "pending")],
            }),
        )],
    );
    let mut client = client(&mock);
    let solver = RecordingSolver::default();
    let err = issue(&mut client, &request(), &solver, &Verdict(true)).await.unwrap_err();
    assert!(matches!(err, OrderError::ChallengeNotSupported(domain) if domain == "acmephp.com"));
    assert!(solver.events.lock().unwrap().is_empty());
}
