use crate::acme::{AcmeClient, AcmeError, LETS_ENCRYPT_PRODUCTION_DIRECTORY, LETS_ENCRYPT_STAGING_DIRECTORY};
use crate::https_helper::WebClient;
use crate::jose::ExternalAccount;
use crate::key::PrivateKey;
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct AcmeConfig {
    pub(crate) directory_url: String,
    pub(crate) contact: Vec<String>,
    pub(crate) external_account: Option<ExternalAccount>,
    pub(crate) challenge_timeout: Duration,
    pub(crate) finalize_timeout: Duration,
    pub(crate) poll_interval: Duration,
    pub(crate) preferred_chain: Option<String>,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AcmeConfig {
    /// Let's Encrypt staging, 180s timeouts, 1s polling.
    pub fn new() -> Self {
        AcmeConfig {
            directory_url: LETS_ENCRYPT_STAGING_DIRECTORY.to_string(),
            contact: vec![],
            external_account: None,
            challenge_timeout: DEFAULT_TIMEOUT,
            finalize_timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            preferred_chain: None,
        }
    }
    pub fn directory(mut self, directory_url: impl ToString) -> Self {
        self.directory_url = directory_url.to_string();
        self
    }
    pub fn directory_lets_encrypt(mut self, production: bool) -> Self {
        self.directory_url = match production {
            true => LETS_ENCRYPT_PRODUCTION_DIRECTORY,
            false => LETS_ENCRYPT_STAGING_DIRECTORY,
        }
        .to_string();
        self
    }

    /// Provide a list of contacts for the account.
    ///
    /// Note that email addresses must include a `mailto:` prefix.
    pub fn contact(mut self, contact: Vec<String>) -> Self {
        self.contact = contact;
        self
    }

    /// Provide a contact for the account.
    ///
    /// Note that an email address must include a `mailto:` prefix.
    pub fn contact_push(mut self, contact: String) -> Self {
        self.contact.push(contact);
        self
    }

    /// Bind new accounts to an account the CA already knows (RFC 8555 section 7.3.4).
    pub fn external_account(mut self, external_account: ExternalAccount) -> Self {
        self.external_account = Some(external_account);
        self
    }
    pub fn challenge_timeout(mut self, timeout: Duration) -> Self {
        self.challenge_timeout = timeout;
        self
    }
    pub fn finalize_timeout(mut self, timeout: Duration) -> Self {
        self.finalize_timeout = timeout;
        self
    }
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Prefer the alternate chain whose top certificate is issued by this common name.
    pub fn preferred_chain(mut self, issuer_common_name: impl ToString) -> Self {
        self.preferred_chain = Some(issuer_common_name.to_string());
        self
    }

    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }
    pub fn contacts(&self) -> &[String] {
        &self.contact
    }

    pub fn client(self, account_key: PrivateKey) -> Result<AcmeClient<WebClient>, AcmeError> {
        AcmeClient::new(self, account_key)
    }
}
