use std::path::Path;

use log::{debug, info};
use openssl::{
    nid::Nid,
    pkcs12::{ParsedPkcs12_2, Pkcs12},
    pkey::{PKey, PKeyRef, Private},
    x509::{X509Ref, X509},
};

use crate::error::Error;

/// A single item found inside a decoded PKCS#12 bundle.
#[derive(Debug)]
pub enum BundleEntry {
    PrivateKey(PKey<Private>),
    /// The certificate the bundle marks as its own.
    Certificate(X509),
    /// Any further certificate shipped along, usually the issuing CA.
    CaCertificate(X509),
}

/// The client certificate used to authenticate against the API.
pub struct ClientIdentity {
    certificate: X509,
    private_key: PKey<Private>,
    chain: Vec<X509>,
}

impl ClientIdentity {
    /// Picks the private key and the certificate belonging to it out of the
    /// bundle entries. Every other certificate ends up in the chain.
    pub fn from_entries(entries: Vec<BundleEntry>) -> Result<Self, Error> {
        let mut keys = Vec::new();
        let mut certificates = Vec::new();
        for entry in entries {
            match entry {
                BundleEntry::PrivateKey(key) => keys.push(key),
                // own certificates come first so they win a tie with a CA copy
                BundleEntry::Certificate(cert) => certificates.insert(0, cert),
                BundleEntry::CaCertificate(cert) => certificates.push(cert),
            }
        }

        if keys.is_empty() {
            return Err(Error::BundleIncomplete("private key"));
        }
        let private_key = keys.swap_remove(0);
        if certificates.is_empty() {
            return Err(Error::BundleIncomplete("certificate"));
        }

        let mut leaf_index = None;
        for (index, cert) in certificates.iter().enumerate() {
            if cert.public_key()?.public_eq(&*private_key) {
                leaf_index = Some(index);
                break;
            }
        }
        let certificate = certificates.remove(leaf_index.ok_or(Error::BundleKeyMismatch)?);

        Ok(Self {
            certificate,
            private_key,
            chain: certificates,
        })
    }

    pub fn certificate(&self) -> &X509Ref {
        &self.certificate
    }

    pub fn private_key(&self) -> &PKeyRef<Private> {
        &self.private_key
    }

    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    /// The common name of the client certificate, for log output.
    pub fn common_name(&self) -> Option<String> {
        self.certificate
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .and_then(|entry| entry.data().as_utf8().ok())
            .map(|name| name.to_string())
    }

    /// Converts the identity into the form the http client presents during
    /// the TLS handshake.
    pub fn to_reqwest_identity(&self) -> Result<reqwest::Identity, Error> {
        let mut pem = self.certificate.to_pem()?;
        for cert in &self.chain {
            pem.extend_from_slice(&cert.to_pem()?);
        }
        let key = self.private_key.private_key_to_pem_pkcs8()?;

        Ok(reqwest::Identity::from_pkcs8_pem(&pem, &key)?)
    }
}

/// Splits a parsed bundle into its entries.
pub fn bundle_entries(parsed: ParsedPkcs12_2) -> Vec<BundleEntry> {
    let mut entries = Vec::new();
    if let Some(key) = parsed.pkey {
        entries.push(BundleEntry::PrivateKey(key));
    }
    if let Some(cert) = parsed.cert {
        entries.push(BundleEntry::Certificate(cert));
    }
    if let Some(ca) = parsed.ca {
        entries.extend(ca.into_iter().map(BundleEntry::CaCertificate));
    }
    entries
}

/// Decodes a DER encoded PKCS#12 bundle.
pub fn decode_client_identity(der: &[u8], password: &str) -> Result<ClientIdentity, Error> {
    let parsed = Pkcs12::from_der(der)
        .and_then(|bundle| bundle.parse2(password))
        .map_err(Error::BundleDecode)?;

    let entries = bundle_entries(parsed);
    debug!("Client bundle holds {} entries", entries.len());

    ClientIdentity::from_entries(entries)
}

/// Loads the password protected PKCS#12 bundle at `path`.
pub fn load_client_identity<P: AsRef<Path>>(
    path: P,
    password: &str,
) -> Result<ClientIdentity, Error> {
    let path = path.as_ref();
    let der = std::fs::read(path).map_err(|source| Error::BundleUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let identity = decode_client_identity(&der, password)?;
    info!(
        "Loaded client certificate {} from {}",
        identity.common_name().unwrap_or_else(|| "<no common name>".to_owned()),
        path.display()
    );

    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::{
        asn1::Asn1Time,
        bn::BigNum,
        hash::MessageDigest,
        rsa::Rsa,
        ssl::{SslContext, SslMethod},
        stack::Stack,
        x509::{X509Builder, X509NameBuilder},
    };

    fn rsa_key() -> PKey<Private> {
        PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
    }

    fn self_signed(common_name: &str, key: &PKey<Private>) -> X509 {
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
        let name = name.build();

        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        builder.sign(key, MessageDigest::sha256()).unwrap();
        builder.build()
    }

    fn bundle(key: &PKey<Private>, cert: &X509, ca: Option<&X509>, password: &str) -> Vec<u8> {
        let mut builder = Pkcs12::builder();
        builder.name("api client").pkey(key).cert(cert);
        if let Some(ca) = ca {
            let mut stack = Stack::new().unwrap();
            stack.push(ca.clone()).unwrap();
            builder.ca(stack);
        }
        builder.build2(password).unwrap().to_der().unwrap()
    }

    #[test]
    fn decodes_bundle_into_usable_identity() {
        let key = rsa_key();
        let cert = self_signed("client.example.com", &key);
        let ca_key = rsa_key();
        let ca = self_signed("Test CA", &ca_key);
        let der = bundle(&key, &cert, Some(&ca), "secret");

        let identity = decode_client_identity(&der, "secret").unwrap();
        assert_eq!(identity.common_name().as_deref(), Some("client.example.com"));
        assert_eq!(identity.chain().len(), 1);
        assert!(identity
            .certificate()
            .public_key()
            .unwrap()
            .public_eq(identity.private_key()));

        // the pair has to be accepted by a TLS context
        let mut context = SslContext::builder(SslMethod::tls_client()).unwrap();
        context.set_certificate(identity.certificate()).unwrap();
        context.set_private_key(identity.private_key()).unwrap();
        context.check_private_key().unwrap();

        identity.to_reqwest_identity().unwrap();
    }

    #[test]
    fn wrong_password_fails() {
        let key = rsa_key();
        let cert = self_signed("client.example.com", &key);
        let der = bundle(&key, &cert, None, "secret");

        assert!(matches!(
            decode_client_identity(&der, "guess"),
            Err(Error::BundleDecode(_))
        ));
    }

    #[test]
    fn garbage_is_not_a_bundle() {
        assert!(matches!(
            decode_client_identity(b"definitely not der", "secret"),
            Err(Error::BundleDecode(_))
        ));
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        match load_client_identity("/nonexistent/cert.p12", "secret") {
            Err(Error::BundleUnreadable { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/cert.p12"))
            }
            _ => panic!("expected an unreadable bundle"),
        }
    }

    #[test]
    fn leaf_is_chosen_by_key_not_position() {
        let key = rsa_key();
        let cert = self_signed("client.example.com", &key);
        let ca = self_signed("Test CA", &rsa_key());

        // the matching certificate only shows up among the CA certificates
        let identity = ClientIdentity::from_entries(vec![
            BundleEntry::CaCertificate(ca),
            BundleEntry::PrivateKey(key),
            BundleEntry::CaCertificate(cert),
        ])
        .unwrap();

        assert_eq!(identity.common_name().as_deref(), Some("client.example.com"));
        assert_eq!(identity.chain().len(), 1);
    }

    #[test]
    fn entries_without_key_or_match_fail() {
        let key = rsa_key();
        let cert = self_signed("client.example.com", &key);
        assert!(matches!(
            ClientIdentity::from_entries(vec![BundleEntry::Certificate(cert)]),
            Err(Error::BundleIncomplete("private key"))
        ));

        let stranger = self_signed("someone else", &rsa_key());
        assert!(matches!(
            ClientIdentity::from_entries(vec![
                BundleEntry::PrivateKey(key),
                BundleEntry::Certificate(stranger)
            ]),
            Err(Error::BundleKeyMismatch)
        ));
    }
}
