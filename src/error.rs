use std::path::PathBuf;

use openssl::error::ErrorStack;
use reqwest::StatusCode;
use thiserror::Error;

use crate::util::MIN_KEY_BITS;

/// Coarse classification of an [`Error`], used by the binary to pick an exit
/// code and by the client to decide whether a request may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Broken configuration, unreadable files, bad bundles, malformed responses.
    Environmental,
    /// Network level failures that may go away on their own.
    Transient,
    /// The API answered but refused to issue the certificate.
    Application,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Please set the {0} environment variable")]
    MissingEnvVar(&'static str),
    #[error("Unable to read the client certificate bundle {path:?}: {source}")]
    BundleUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Unable to decode the client certificate bundle (wrong password?): {0}")]
    BundleDecode(#[source] ErrorStack),
    #[error("The client certificate bundle contains no {0}")]
    BundleIncomplete(&'static str),
    #[error("No certificate in the client bundle matches its private key")]
    BundleKeyMismatch,
    #[error("RSA keys need at least {} bits, got {0}", MIN_KEY_BITS)]
    InvalidKeySize(u32),
    #[error("Unknown certificate type `{0}`, expected one of dvssl, ovssl, evssl, ivssl")]
    UnknownCertType(String),
    #[error("You must specify at least one domain with `-d [domain]`")]
    NoDomain,
    #[error("`{0}` can not be used as a domain name")]
    InvalidDomain(String),
    #[error("Invalid server url: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),
    #[error("Request to the API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("The API answered with HTTP status {0}")]
    HttpStatus(StatusCode),
    #[error("Error while handling json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("The {field} field of the response is not valid base64: {source}")]
    Base64 {
        field: &'static str,
        #[source]
        source: base64::DecodeError,
    },
    #[error("The API response is malformed: {0}")]
    MalformedResponse(String),
    #[error("Startcom returned the error: {message} (status {status}, error code {error_code})")]
    Rejected {
        status: i64,
        error_code: i64,
        message: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Rejected { .. } => ErrorKind::Application,
            Error::Transport(e) if !e.is_builder() => ErrorKind::Transient,
            Error::HttpStatus(status) if status.is_server_error() => ErrorKind::Transient,
            _ => ErrorKind::Environmental,
        }
    }

    /// Whether the request certainly never reached the issuing backend, so
    /// sending it again can not produce a second certificate.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_connect(),
            Error::HttpStatus(status) => *status == StatusCode::SERVICE_UNAVAILABLE,
            _ => false,
        }
    }
}
