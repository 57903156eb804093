//! Certificates and client bundles shared by the integration tests.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

use openssl::{
    asn1::Asn1Time,
    bn::BigNum,
    hash::MessageDigest,
    nid::Nid,
    pkcs12::Pkcs12,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{X509Builder, X509NameBuilder, X509},
};

pub const TOKEN: &str = "token-1";
pub const PASSWORD: &str = "bundle-secret";

pub fn self_signed(common_name: &str, key: &PKey<Private>) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(42).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

pub fn certificate_pem(common_name: &str) -> String {
    let key = PKey::from_rsa(Rsa::generate(1024).unwrap()).unwrap();
    String::from_utf8(self_signed(common_name, &key).to_pem().unwrap()).unwrap()
}

/// Writes a client certificate bundle into `dir` and returns its path.
pub fn write_bundle(dir: &Path) -> PathBuf {
    let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
    let cert = self_signed("api-client", &key);
    let der = Pkcs12::builder()
        .name("api-client")
        .pkey(&key)
        .cert(&cert)
        .build2(PASSWORD)
        .unwrap()
        .to_der()
        .unwrap();

    let path = dir.join("cert.p12");
    std::fs::write(&path, der).unwrap();
    path
}
