#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chainsmith::cert::params::DistinguishedName;
use chainsmith::cert::{Certificate, SignatureAlgorithm};
use chainsmith::key::{EccCurve, KeyKind, KeyPair};
use der::Encode;
use der::asn1::BitString;
use rand_core::OsRng;
use sha2::Digest;
use tracing_subscriber::EnvFilter;
use x509_cert::certificate::{CertificateInner, TbsCertificateInner, Version};
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::Validity;

static SERIAL: AtomicU32 = AtomicU32::new(1);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A certificate with the key its subject holds.
pub struct Issued {
    pub cert: Certificate,
    pub key: KeyPair,
}

pub fn name(common_name: &str) -> Name {
    DistinguishedName::builder()
        .common_name(common_name.to_string())
        .organization("Chainsmith Tests".to_string())
        .build()
        .as_x509_name()
        .unwrap()
}

fn tbs_certificate(
    subject: Name,
    subject_key: &KeyPair,
    issuer: Name,
    algorithm: SignatureAlgorithm,
) -> TbsCertificateInner {
    let serial = SERIAL.fetch_add(1, Ordering::Relaxed).to_be_bytes();
    TbsCertificateInner {
        version: Version::V3,
        serial_number: SerialNumber::new(&serial).unwrap(),
        signature: algorithm.into(),
        issuer,
        validity: Validity::from_now(Duration::from_secs(365 * 24 * 60 * 60)).unwrap(),
        subject,
        subject_public_key_info: subject_key.as_spki().unwrap(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: None,
    }
}

fn assemble(
    tbs: TbsCertificateInner,
    algorithm: SignatureAlgorithm,
    signature: &[u8],
) -> Certificate {
    Certificate::from(CertificateInner {
        tbs_certificate: tbs,
        signature_algorithm: algorithm.into(),
        signature: BitString::from_bytes(signature).unwrap(),
    })
}

/// Signs a certificate for `subject_key` under `issuer_name` with `issuer_key`.
pub fn sign_certificate(
    subject: Name,
    subject_key: &KeyPair,
    issuer: Name,
    issuer_key: &KeyPair,
) -> Certificate {
    sign_certificate_with(
        subject,
        subject_key,
        issuer,
        issuer_key,
        issuer_key.signature_algorithm(),
    )
}

/// Same as [`sign_certificate`], hashing with the one `algorithm` declares.
pub fn sign_certificate_with(
    subject: Name,
    subject_key: &KeyPair,
    issuer: Name,
    issuer_key: &KeyPair,
    algorithm: SignatureAlgorithm,
) -> Certificate {
    let tbs = tbs_certificate(subject, subject_key, issuer, algorithm);
    let signature = issuer_key
        .sign_data_with(algorithm, &tbs.to_der().unwrap())
        .unwrap();
    assemble(tbs, algorithm, &signature)
}

/// A certificate carrying a real RSASSA-PSS (SHA-256) signature by `issuer_key`.
pub fn sign_certificate_pss(
    subject: Name,
    subject_key: &KeyPair,
    issuer: Name,
    issuer_key: &KeyPair,
) -> Certificate {
    let KeyPair::Rsa { private, .. } = issuer_key else {
        panic!("RSASSA-PSS needs an RSA issuer key");
    };
    let tbs = tbs_certificate(subject, subject_key, issuer, SignatureAlgorithm::RsaPss);
    let digest = sha2::Sha256::digest(tbs.to_der().unwrap());
    let signature = private
        .sign_with_rng(&mut OsRng, rsa::Pss::new::<sha2::Sha256>(), &digest)
        .unwrap();
    assemble(tbs, SignatureAlgorithm::RsaPss, &signature)
}

pub fn self_signed_root(common_name: &str) -> Issued {
    self_signed_root_with(
        common_name,
        KeyPair::generate_ecdsa_p256(),
        SignatureAlgorithm::Sha256WithECDSA,
    )
}

pub fn self_signed_root_with(
    common_name: &str,
    key: KeyPair,
    algorithm: SignatureAlgorithm,
) -> Issued {
    let cert = sign_certificate_with(name(common_name), &key, name(common_name), &key, algorithm);
    Issued { cert, key }
}

/// Issues a certificate for a fresh P-256 key, signed by `issuer`.
pub fn issue(common_name: &str, issuer: &Issued) -> Issued {
    issue_with(
        common_name,
        KeyPair::generate_ecdsa_p256(),
        issuer,
        issuer.key.signature_algorithm(),
    )
}

/// Issues a certificate for `key`, signed by `issuer` under `algorithm`.
pub fn issue_with(
    common_name: &str,
    key: KeyPair,
    issuer: &Issued,
    algorithm: SignatureAlgorithm,
) -> Issued {
    let cert = sign_certificate_with(
        name(common_name),
        &key,
        issuer.cert.subject().clone(),
        &issuer.key,
        algorithm,
    );
    Issued { cert, key }
}

/// A leaf below `depth` issuers, the last of them a self-signed root.
pub struct Hierarchy {
    pub leaf: Issued,
    /// Closest issuer first, root last.
    pub issuers: Vec<Issued>,
}

impl Hierarchy {
    /// P-256 issuers signing with ECDSA-SHA256.
    pub fn new(depth: usize) -> Self {
        let p256 = (
            KeyKind::Ecc(EccCurve::P256),
            SignatureAlgorithm::Sha256WithECDSA,
        );
        Self::with_issuers(&vec![p256; depth])
    }

    /// Issuers listed root first, each as the key it holds and the algorithm it
    /// signs with. The leaf key is always P-256.
    pub fn with_issuers(specs: &[(KeyKind, SignatureAlgorithm)]) -> Self {
        assert!(!specs.is_empty());
        let mut issuers: Vec<(Issued, SignatureAlgorithm)> = Vec::new();
        for (level, (kind, algorithm)) in specs.iter().enumerate() {
            let key = KeyPair::generate(*kind).unwrap();
            let issued = match issuers.last() {
                None => self_signed_root_with("Test Root CA", key, *algorithm),
                Some((parent, parent_algorithm)) => issue_with(
                    &format!("Test Intermediate CA {level}"),
                    key,
                    parent,
                    *parent_algorithm,
                ),
            };
            issuers.push((issued, *algorithm));
        }

        let (parent, algorithm) = issuers.last().unwrap();
        let leaf = issue_with(
            "leaf.example.com",
            KeyPair::generate_ecdsa_p256(),
            parent,
            *algorithm,
        );
        let issuers = issuers.into_iter().rev().map(|(issued, _)| issued).collect();
        Self { leaf, issuers }
    }

    pub fn root(&self) -> &Issued {
        self.issuers.last().unwrap()
    }

    pub fn intermediates(&self) -> &[Issued] {
        &self.issuers[..self.issuers.len() - 1]
    }
}

/// Two certificates that each name the other as issuer, both correctly signed.
pub fn cyclic_pair() -> (Issued, Issued) {
    let key_a = KeyPair::generate_ecdsa_p256();
    let key_b = KeyPair::generate_ecdsa_p256();
    let a = sign_certificate(name("Cycle A"), &key_a, name("Cycle B"), &key_b);
    let b = sign_certificate(name("Cycle B"), &key_b, name("Cycle A"), &key_a);
    (
        Issued { cert: a, key: key_a },
        Issued { cert: b, key: key_b },
    )
}
