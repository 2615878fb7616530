use super::{ValidationError, Validator};
use crate::challenge::{AuthorizationChallenge, HttpDataExtractor, HTTP_01};
use crate::https_helper::{https, HttpClient, HttpsRequestError, WebClient};
use crate::solver::Solver;
use async_trait::async_trait;
use http::Method;

/// Fetches the challenge URL over plain HTTP and compares the body with the
/// key authorization.
pub struct HttpValidator<H: HttpClient = WebClient> {
    http: H,
}

impl HttpValidator<WebClient> {
    pub fn new() -> Result<Self, HttpsRequestError> {
        Ok(Self::with_http_client(WebClient::new()?))
    }
}

impl<H: HttpClient> HttpValidator<H> {
    pub fn with_http_client(http: H) -> Self {
        Self { http }
    }
}

#[async_trait]
impl<H: HttpClient> Validator for HttpValidator<H> {
    fn supports(&self, challenge: &AuthorizationChallenge, _solver: &dyn Solver) -> bool {
        challenge.kind() == HTTP_01
    }

    async fn is_valid(&self, challenge: &AuthorizationChallenge, _solver: &dyn Solver) -> Result<bool, ValidationError> {
        let url = HttpDataExtractor::check_url(challenge);
        match https(&self.http, &url, Method::GET, None).await {
            Ok(response) => Ok(response.body().trim() == HttpDataExtractor::check_content(challenge)),
            Err(err) => {
                log::warn!("could not fetch {}: {}", url, err);
                Ok(false)
            }
        }
    }
}
