//! PKCS#10 certification requests for TLS server and client certificates.

use const_oid::db::rfc5912;
use der::asn1::SetOfVec;
use der::{Any, Decode, DecodePem, Encode};
use tracing::info;
use x509_cert::attr::Attribute;
use x509_cert::ext::Extension;
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq};

use crate::cert::extensions::{
    ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage, SubjectAltName, ToAndFromX509Extension,
};
use crate::cert::params::{DistinguishedName, ExtensionParam};
use crate::cert::{SignatureAlgorithm, signature_bits};
use crate::error::{ChainsmithError, Result};
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils::{self, CERTIFICATE_REQUEST_LABEL};

/// A signed PKCS#10 certification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationRequest {
    pub inner: CertReq,
}

/// Builds and signs a certification request.
///
/// The subject is `subject` with empty fields dropped (`CN=default` when nothing
/// is left). The request asks for:
/// * a Subject Alternative Name with one entry per `sans` value, in order, when
///   `sans` is not empty (non-critical);
/// * Key Usage `digitalSignature` and `keyEncipherment` (critical);
/// * Extended Key Usage `serverAuth` and `clientAuth` (non-critical).
///
/// The request is signed by `key` with SHA-256.
pub fn build_request(
    key: &KeyPair,
    subject: &DistinguishedName,
    sans: &[String],
) -> Result<CertificationRequest> {
    let mut extensions = Vec::new();

    if !sans.is_empty() {
        let san = SubjectAltName::from_strings(sans);
        extensions.push(ExtensionParam::from_extension(&san, false)?);
    }
    extensions.push(ExtensionParam::from_extension(&KeyUsage::tls_server(), true)?);
    let eku = ExtendedKeyUsage {
        usage: vec![
            ExtendedKeyUsageOption::ServerAuth,
            ExtendedKeyUsageOption::ClientAuth,
        ],
    };
    extensions.push(ExtensionParam::from_extension(&eku, false)?);

    let extensions = extensions
        .iter()
        .map(ExtensionParam::to_x509_extension)
        .collect::<Result<Vec<Extension>>>()?;
    let extension_req = Attribute {
        oid: rfc5912::ID_EXTENSION_REQ,
        values: SetOfVec::try_from(vec![Any::encode_from(&ExtensionReq(extensions))?])?,
    };

    let req_info = CertReqInfo {
        version: x509_cert::request::Version::V1,
        subject: subject.as_x509_name()?,
        public_key: key.as_spki()?,
        attributes: SetOfVec::try_from(vec![extension_req])?,
    };

    let signature = key.sign_data(&req_info.to_der()?)?;
    let request = CertReq {
        info: req_info,
        algorithm: key.signature_algorithm().into(),
        signature: signature_bits(&signature)?,
    };

    info!(
        kind = %key.kind(),
        san_count = sans.len(),
        "built certification request"
    );
    Ok(CertificationRequest { inner: request })
}

impl CertificationRequest {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertReq::from_der(der)?,
        })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            inner: CertReq::from_pem(pem)?,
        })
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| ChainsmithError::EncodingError(e.to_string()))
    }

    /// PEM with the `CERTIFICATE REQUEST` label.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::der_to_pem(&self.to_der()?, CERTIFICATE_REQUEST_LABEL))
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(&self.inner.info.subject)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.info.public_key)
    }

    /// Extensions carried in the extensionRequest attribute, in encoded order.
    pub fn extensions(&self) -> Result<Vec<ExtensionParam>> {
        let mut out = Vec::new();
        for attr in self.inner.info.attributes.iter() {
            if attr.oid != rfc5912::ID_EXTENSION_REQ {
                continue;
            }
            for value in attr.values.iter() {
                let requested = ExtensionReq::from_der(&value.to_der()?)?;
                out.extend(requested.0.iter().map(ExtensionParam::from));
            }
        }
        Ok(out)
    }

    fn find_extension<E: ToAndFromX509Extension>(&self) -> Result<Option<(E, bool)>> {
        self.extensions()?
            .into_iter()
            .find(|ext| ext.oid == E::OID)
            .map(|ext| Ok((ext.to_extension::<E>()?, ext.critical)))
            .transpose()
    }

    /// The requested Subject Alternative Name, if any.
    pub fn subject_alt_names(&self) -> Result<Option<SubjectAltName>> {
        Ok(self.find_extension::<SubjectAltName>()?.map(|(san, _)| san))
    }

    /// The requested Key Usage and its criticality.
    pub fn key_usage(&self) -> Result<Option<(KeyUsage, bool)>> {
        self.find_extension::<KeyUsage>()
    }

    /// The requested Extended Key Usage and its criticality.
    pub fn extended_key_usage(&self) -> Result<Option<(ExtendedKeyUsage, bool)>> {
        self.find_extension::<ExtendedKeyUsage>()
    }

    pub fn signature_algorithm(&self) -> Option<SignatureAlgorithm> {
        SignatureAlgorithm::from_oid(&self.inner.algorithm.oid)
    }

    /// Checks the request's self-signature against its own public key.
    pub fn verify_signature(&self) -> bool {
        let (Ok(public_key), Some(algorithm), Ok(tbs)) = (
            self.public_key(),
            self.signature_algorithm(),
            self.inner.info.to_der(),
        ) else {
            return false;
        };
        crate::verify::verify_signature(
            &public_key,
            algorithm,
            &tbs,
            self.inner.signature.raw_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{KeyUsages, SubjectAltNameEntry};

    #[test]
    fn request_without_sans_has_no_san_extension() {
        let key = KeyPair::generate_ecdsa_p256();
        let request = build_request(&key, &DistinguishedName::default(), &[]).unwrap();

        assert!(request.subject_alt_names().unwrap().is_none());
        assert_eq!(request.subject().common_name.as_deref(), Some("default"));
        assert_eq!(request.extensions().unwrap().len(), 2);
        assert!(request.verify_signature());
    }

    #[test]
    fn tls_usages_are_requested() {
        let key = KeyPair::generate_ecdsa_p384();
        let dn = DistinguishedName::builder()
            .common_name("api.example.com".to_string())
            .build();
        let request = build_request(&key, &dn, &["::1".to_string()]).unwrap();

        let (ku, critical) = request.key_usage().unwrap().unwrap();
        assert!(critical);
        assert!(ku.0.contains(KeyUsages::DigitalSignature));
        assert!(ku.0.contains(KeyUsages::KeyEncipherment));

        let (eku, critical) = request.extended_key_usage().unwrap().unwrap();
        assert!(!critical);
        assert_eq!(
            eku.usage,
            vec![
                ExtendedKeyUsageOption::ServerAuth,
                ExtendedKeyUsageOption::ClientAuth
            ]
        );

        let san = request.subject_alt_names().unwrap().unwrap();
        assert!(matches!(san.names[0], SubjectAltNameEntry::Ipv6Address(_)));
    }

    #[test]
    fn tampered_request_fails_verification() {
        let key = KeyPair::generate_ecdsa_p256();
        let mut request = build_request(&key, &DistinguishedName::default(), &[]).unwrap();
        request.inner.info.subject = DistinguishedName::builder()
            .common_name("other".to_string())
            .build()
            .as_x509_name()
            .unwrap();
        assert!(!request.verify_signature());
    }
}
