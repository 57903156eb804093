use std::{fmt, str::FromStr};

use log::debug;
use openssl::x509::X509;
use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::Error;

/// `Status` value the API uses for a successful issuance.
pub const STATUS_SUCCESS: i64 = 1;
/// Name of the single form field carrying the json encoded request.
pub const REQUEST_FIELD: &str = "RequestData";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertType {
    Dvssl,
    Ovssl,
    Evssl,
    Ivssl,
}

impl CertType {
    /// The name used on the command line and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CertType::Dvssl => "dvssl",
            CertType::Ovssl => "ovssl",
            CertType::Evssl => "evssl",
            CertType::Ivssl => "ivssl",
        }
    }
}

impl Default for CertType {
    fn default() -> Self {
        CertType::Dvssl
    }
}

impl fmt::Display for CertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dvssl" => Ok(CertType::Dvssl),
            "ovssl" => Ok(CertType::Ovssl),
            "evssl" => Ok(CertType::Evssl),
            "ivssl" => Ok(CertType::Ivssl),
            _ => Err(Error::UnknownCertType(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    ApplyCertificate,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::ApplyCertificate => "ApplyCertificate",
        }
    }
}

/// A fresh private key together with the CSR it signed.
#[derive(Debug, Clone)]
pub struct GeneratedKeyMaterial {
    pub private_key_pem: String,
    pub csr_pem: String,
}

/// The request for a new certificate. Only the first domain is submitted,
/// the API takes a single domain per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuanceRequest {
    token_id: String,
    action_type: ActionType,
    cert_type: CertType,
    domains: Vec<String>,
    csr_pem: String,
}

#[derive(Serialize)]
struct RequestPayload<'a> {
    #[serde(rename = "TokenID")]
    token_id: &'a str,
    #[serde(rename = "ActionType")]
    action_type: &'a str,
    #[serde(rename = "CertType")]
    cert_type: &'a str,
    #[serde(rename = "Domains")]
    domains: &'a str,
    #[serde(rename = "CSR")]
    csr: &'a str,
}

impl IssuanceRequest {
    pub fn new<T: Into<String>, C: Into<String>>(
        token_id: T,
        cert_type: CertType,
        domains: Vec<String>,
        csr_pem: C,
    ) -> Result<Self, Error> {
        if domains.is_empty() {
            return Err(Error::NoDomain);
        }

        Ok(Self {
            token_id: token_id.into(),
            action_type: ActionType::ApplyCertificate,
            cert_type,
            domains,
            csr_pem: csr_pem.into(),
        })
    }

    pub fn primary_domain(&self) -> &str {
        &self.domains[0]
    }

    pub fn cert_type(&self) -> CertType {
        self.cert_type
    }

    /// The json document the API expects inside the `RequestData` field.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&RequestPayload {
            token_id: &self.token_id,
            action_type: self.action_type.as_str(),
            cert_type: self.cert_type.as_str(),
            domains: self.primary_domain(),
            csr: &self.csr_pem,
        })?)
    }

    /// The `application/x-www-form-urlencoded` request body.
    pub fn to_form_body(&self) -> Result<String, Error> {
        Ok(form_urlencoded::Serializer::new(String::new())
            .append_pair(REQUEST_FIELD, &self.to_json()?)
            .finish())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ResponseEnvelope {
    #[serde(rename = "Status", default)]
    status: Option<i64>,
    #[serde(rename = "ErrorCode", default)]
    error_code: Option<i64>,
    #[serde(rename = "ShortMsg", default)]
    short_msg: Option<String>,
    #[serde(rename = "Data", default)]
    data: Option<ResponseData>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseData {
    #[serde(rename = "OrderId", default)]
    order_id: Option<String>,
    #[serde(rename = "OrderNo", default)]
    order_no: Option<String>,
    #[serde(rename = "OrderStatus", default)]
    order_status: Option<i64>,
    #[serde(rename = "Certificate", default)]
    certificate: Option<String>,
    #[serde(rename = "CertificateFieldMD5", default)]
    certificate_md5: Option<String>,
    #[serde(rename = "IntermediateCertificate", default)]
    intermediate_certificate: Option<String>,
    #[serde(rename = "IntermediateCertificateFieldMD5", default)]
    intermediate_md5: Option<String>,
}

/// A decoded API response. Both certificate fields hold PEM text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IssuanceResponse {
    pub status: i64,
    pub error_code: i64,
    pub short_message: String,
    pub certificate: String,
    pub certificate_checksum: String,
    pub intermediate_certificate: String,
    pub intermediate_checksum: String,
    pub order_id: String,
    pub order_number: String,
    pub order_status: i64,
}

impl IssuanceResponse {
    /// Parses the json body and base64 decodes the embedded certificates.
    /// A successful response must carry two PEM certificates.
    pub fn from_json(body: &str) -> Result<Self, Error> {
        let envelope: ResponseEnvelope = serde_json::from_str(body)?;
        let data = envelope.data.unwrap_or_default();

        let response = Self {
            status: envelope.status.ok_or_else(|| {
                Error::MalformedResponse("the Status field is missing".to_owned())
            })?,
            error_code: envelope.error_code.unwrap_or_default(),
            short_message: envelope.short_msg.unwrap_or_default(),
            certificate: decode_pem_field("Certificate", data.certificate)?,
            certificate_checksum: data.certificate_md5.unwrap_or_default(),
            intermediate_certificate: decode_pem_field(
                "IntermediateCertificate",
                data.intermediate_certificate,
            )?,
            intermediate_checksum: data.intermediate_md5.unwrap_or_default(),
            order_id: data.order_id.unwrap_or_default(),
            order_number: data.order_no.unwrap_or_default(),
            order_status: data.order_status.unwrap_or_default(),
        };

        if response.is_success() {
            check_certificate("Certificate", &response.certificate)?;
            check_certificate("IntermediateCertificate", &response.intermediate_certificate)?;
        }

        Ok(response)
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Turns a non successful status into an [`Error::Rejected`].
    pub fn into_result(self) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::Rejected {
                status: self.status,
                error_code: self.error_code,
                message: self.short_message,
            })
        }
    }
}

fn decode_pem_field(field: &'static str, value: Option<String>) -> Result<String, Error> {
    // line breaks may show up anywhere in wrapped base64
    let encoded: String = value
        .unwrap_or_default()
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect();
    let bytes =
        base64::decode(encoded.trim()).map_err(|source| Error::Base64 { field, source })?;

    String::from_utf8(bytes)
        .map_err(|_| Error::MalformedResponse(format!("the {} field is not PEM text", field)))
}

fn check_certificate(field: &'static str, pem: &str) -> Result<(), Error> {
    if pem.trim().is_empty() {
        return Err(Error::MalformedResponse(format!(
            "the {} field is empty although the request succeeded",
            field
        )));
    }

    let certs = X509::stack_from_pem(pem.as_bytes()).map_err(|e| {
        Error::MalformedResponse(format!("the {} field is not a PEM certificate: {}", field, e))
    })?;
    debug!("{} contains {} certificate(s)", field, certs.len());

    if certs.is_empty() {
        return Err(Error::MalformedResponse(format!(
            "the {} field contains no certificate",
            field
        )));
    }

    Ok(())
}

/// Order details reported by the API alongside a certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderInfo {
    pub order_id: String,
    pub order_number: String,
    pub order_status: i64,
}

/// A successfully issued certificate and the key it was issued for.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub domain: String,
    pub certificate: String,
    pub intermediate: String,
    pub private_key: String,
    pub order: OrderInfo,
}

impl IssuedCertificate {
    /// The leaf certificate directly followed by the intermediate.
    pub fn chained(&self) -> String {
        let mut chained = String::with_capacity(self.certificate.len() + self.intermediate.len());
        chained.push_str(&self.certificate);
        chained.push_str(&self.intermediate);
        chained
    }
}
