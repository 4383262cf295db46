//! Certificate fixtures for unit tests

use rcgen::{date_time_ymd, CertificateParams, DistinguishedName, DnType, KeyPair};

type Ymd = (i32, u8, u8);

fn issue(params: CertificateParams) -> (String, String) {
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// Self-signed certificate with the given SANs and validity, as (chain PEM, key PEM)
pub(crate) fn self_signed(sans: &[&str], not_before: Ymd, not_after: Ymd) -> (String, String) {
    let names: Vec<String> = sans.iter().map(|s| s.to_string()).collect();
    let mut params = CertificateParams::new(names).unwrap();
    params.not_before = date_time_ymd(not_before.0, not_before.1, not_before.2);
    params.not_after = date_time_ymd(not_after.0, not_after.1, not_after.2);
    issue(params)
}

/// Self-signed certificate without SANs, identified only by its subject CN
pub(crate) fn self_signed_with_cn(cn: &str, not_before: Ymd, not_after: Ymd) -> (String, String) {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, cn);
    params.distinguished_name = dn;
    params.not_before = date_time_ymd(not_before.0, not_before.1, not_before.2);
    params.not_after = date_time_ymd(not_after.0, not_after.1, not_after.2);
    issue(params)
}
