use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use url::Url;

use crate::{error::Error, types::CertType, util::DEFAULT_KEY_BITS};

pub const PRODUCTION_API: &str = "https://api.startssl.com";
/// Issues certificates valid for a single day.
pub const TEST_API: &str = "https://apitest.startssl.com";

pub const TOKEN_ID_VAR: &str = "STARTCOM_API_TOKEN_ID";
pub const BUNDLE_PASSWORD_VAR: &str = "STARTCOM_API_CERT_PASSWORD";

/// The client certificate StartCom hands out for accessing the API.
pub const DEFAULT_BUNDLE: &str = "cert.p12";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The API endpoint requests are sent to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Production,
    Test,
    Custom(Url),
}

impl Endpoint {
    /// Parses a user supplied server url.
    pub fn custom(url: &str) -> Result<Self, Error> {
        Ok(Endpoint::Custom(Url::parse(url)?))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Endpoint::Production => PRODUCTION_API,
            Endpoint::Test => TEST_API,
            Endpoint::Custom(url) => url.as_str(),
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Production
    }
}

/// The token identifying the account and the password unlocking the client
/// certificate bundle.
#[derive(Clone)]
pub struct Credentials {
    token_id: String,
    bundle_password: String,
}

impl Credentials {
    pub fn new<T: Into<String>>(token_id: T, bundle_password: T) -> Self {
        Self {
            token_id: token_id.into(),
            bundle_password: bundle_password.into(),
        }
    }

    /// Reads both values from the environment. Unset and empty variables are
    /// treated the same.
    pub fn from_env() -> Result<Self, Error> {
        let bundle_password = env_var(BUNDLE_PASSWORD_VAR)?;
        let token_id = env_var(TOKEN_ID_VAR)?;

        Ok(Self {
            token_id,
            bundle_password,
        })
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn bundle_password(&self) -> &str {
        &self.bundle_password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token_id", &self.token_id)
            .field("bundle_password", &"<redacted>")
            .finish()
    }
}

fn env_var(name: &'static str) -> Result<String, Error> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::MissingEnvVar(name)),
    }
}

/// Retry policy for requests that never reached the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// A policy that sends every request exactly once.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn initial_backoff(mut self, duration: Duration) -> Self {
        self.initial_backoff = duration;
        self
    }

    pub fn max_backoff(mut self, duration: Duration) -> Self {
        self.max_backoff = duration;
        self
    }

    /// Exponential backoff for the given (zero based) attempt, capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |backoff| backoff.min(self.max_backoff))
    }
}

/// Everything a single issuance run needs. Built once by the caller and
/// handed to each step by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub endpoint: Endpoint,
    pub bundle_path: PathBuf,
    pub key_bits: u32,
    pub cert_type: CertType,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Config {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            endpoint: Endpoint::default(),
            bundle_path: PathBuf::from(DEFAULT_BUNDLE),
            key_bits: DEFAULT_KEY_BITS,
            cert_type: CertType::default(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn bundle_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.bundle_path = path.as_ref().to_path_buf();
        self
    }

    pub fn key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn cert_type(mut self, cert_type: CertType) -> Self {
        self.cert_type = cert_type;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}
