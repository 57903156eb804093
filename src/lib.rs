//! This crate requests domain certificates from the StartCom certificate issuance API
//! (StartAPI). The API is a single form encoded POST that is authenticated with a
//! client certificate StartCom hands out as a password protected PKCS#12 bundle.
//!
//! ## Features
//! - Loads the client certificate bundle and picks the key and its certificate by matching public keys. <br>
//! - Generates a fresh RSA key and CSR for every request. StartCom takes all certificate fields from the request payload, so the CSR subject stays empty. <br>
//! - Talks to either the production API (`https://api.startssl.com`) or the test API (`https://apitest.startssl.com`), which issues certificates valid for a single day. <br>
//! - Retries requests that never reached the API with an exponential backoff and writes the result atomically.
//!
//! # Usage
//! The main method `generate_cert_for_domain` runs the whole process of requesting a certificate:
//! - Load the client certificate from the bundle.
//! - Generate a key pair and a CSR.
//! - Send the issuance request for the `domain`.
//! - Decode the returned certificate and intermediate certificate.
//!
//! The resulting [`IssuedCertificate`](types::IssuedCertificate) can then be written to disk with
//! [`save_certificates`](util::save_certificates).
//!
//! ## Example
//! ```ignore,rust
//! use startcom_rs::{config::{Config, Credentials, Endpoint}, generate_cert_for_domain, util::save_certificates};
//!
//! let config = Config::new(Credentials::from_env()?).endpoint(Endpoint::Test);
//! let issued = generate_cert_for_domain(&config, "www.example.org")?;
//!
//! // writes www.example.org.key, .crt, -intermediate.crt and -chained.crt
//! save_certificates(".", &issued)?;
//! ```

use client::ApiClient;
use config::Config;
use error::Error;
use identity::load_client_identity;
use log::info;
use types::{IssuanceRequest, IssuedCertificate, OrderInfo};
use util::{generate_key_material, validate_domain};

/// The http client talking to the API.
pub mod client;
/// The configuration a run is built from.
pub mod config;
/// The module which encapsulates the error enumeration
/// and related code and types.
pub mod error;
/// Loading of the client certificate bundle.
pub mod identity;
/// Request and response types of the API together with their wire format.
pub mod types;
/// Key and CSR generation as well as writing the results to disk. This
/// module heavily uses the `openssl` and `tempfile` libaries.
pub mod util;

/// Requests a certificate for `domain`. The client certificate bundle, the
/// endpoint and the key parameters are taken from `config`.
///
/// A response with a non successful status is returned as
/// [`Error::Rejected`], nothing is written to disk by this function.
pub fn generate_cert_for_domain<T: AsRef<str>>(
    config: &Config,
    domain: T,
) -> Result<IssuedCertificate, Error> {
    let domain = domain.as_ref().trim();
    validate_domain(domain)?;

    let identity = load_client_identity(
        &config.bundle_path,
        config.credentials.bundle_password(),
    )?;

    // the CSR is mostly useless to StartCom, the key is what we keep
    let material = generate_key_material(config.key_bits)?;

    let request = IssuanceRequest::new(
        config.credentials.token_id(),
        config.cert_type,
        vec![domain.to_owned()],
        material.csr_pem,
    )?;

    let client = ApiClient::new(&identity, config)?;
    let response = client.issue(&request)?.into_result()?;
    info!(
        "Received certificate for {} (order {})",
        domain, response.order_number
    );

    Ok(IssuedCertificate {
        domain: domain.to_owned(),
        certificate: response.certificate,
        intermediate: response.intermediate_certificate,
        private_key: material.private_key_pem,
        order: OrderInfo {
            order_id: response.order_id,
            order_number: response.order_number,
            order_status: response.order_status,
        },
    })
}
