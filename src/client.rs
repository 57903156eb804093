use std::thread;

use log::{debug, info, warn};
use reqwest::{blocking::Client, header::CONTENT_TYPE};

use crate::{
    config::{Config, Endpoint, RetryConfig},
    error::Error,
    identity::ClientIdentity,
    types::{IssuanceRequest, IssuanceResponse},
};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A mutually authenticated connection to the StartCom API.
pub struct ApiClient {
    http: Client,
    endpoint: Endpoint,
    retry: RetryConfig,
}

impl ApiClient {
    /// Creates a client presenting `identity` as its TLS client certificate.
    pub fn new(identity: &ClientIdentity, config: &Config) -> Result<Self, Error> {
        let http = Client::builder()
            .identity(identity.to_reqwest_identity()?)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            retry: config.retry.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Submits the issuance request and decodes the answer. Only failures
    /// that happened before the API saw the request are retried.
    pub fn issue(&self, request: &IssuanceRequest) -> Result<IssuanceResponse, Error> {
        let body = request.to_form_body()?;
        info!(
            "Requesting a {} certificate for {} from {}",
            request.cert_type(),
            request.primary_domain(),
            self.endpoint().as_str()
        );

        let mut attempt = 0;
        loop {
            match self.post_form(&body) {
                Err(e) if e.is_retriable() && attempt < self.retry.max_retries => {
                    let backoff = self.retry.backoff_for(attempt);
                    attempt += 1;
                    warn!(
                        "{} (retry {}/{} in {:?})",
                        e, attempt, self.retry.max_retries, backoff
                    );
                    thread::sleep(backoff);
                }
                result => return result,
            }
        }
    }

    fn post_form(&self, body: &str) -> Result<IssuanceResponse, Error> {
        let response = self
            .http
            .post(self.endpoint.as_str())
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body.to_owned())
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus(status));
        }

        let text = response.text()?;
        debug!("API answered: {}", text);

        let decoded = IssuanceResponse::from_json(&text)?;
        debug!(
            "Order {} ({}), order status {}, certificate md5 {}, intermediate md5 {}",
            decoded.order_id,
            decoded.order_number,
            decoded.order_status,
            decoded.certificate_checksum,
            decoded.intermediate_checksum
        );

        Ok(decoded)
    }
}
