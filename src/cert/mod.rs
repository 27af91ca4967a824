pub mod extensions;
pub mod params;

use const_oid::db::rfc5912;
use der::asn1::{AnyRef, BitString};
use der::{Any, Decode, DecodePem, Encode};
use params::DistinguishedName;
use sha2::Digest;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::error::{ChainsmithError, Result};
use crate::key::PublicKey;
use crate::oid;

/// Hash functions a signature algorithm can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    /// Hashes `data` with this algorithm.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => sha1::Sha1::digest(data).to_vec(),
            HashAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
        }
    }

    /// PKCS#1 v1.5 padding scheme carrying this hash's DigestInfo prefix.
    pub(crate) fn pkcs1v15(&self) -> rsa::Pkcs1v15Sign {
        match self {
            HashAlgorithm::Sha1 => rsa::Pkcs1v15Sign::new::<sha1::Sha1>(),
            HashAlgorithm::Sha256 => rsa::Pkcs1v15Sign::new::<sha2::Sha256>(),
            HashAlgorithm::Sha384 => rsa::Pkcs1v15Sign::new::<sha2::Sha384>(),
            HashAlgorithm::Sha512 => rsa::Pkcs1v15Sign::new::<sha2::Sha512>(),
        }
    }
}

/// Represents the supported signature algorithms for certificates and requests.
///
/// This enum provides a mapping to the corresponding OIDs for each algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// SHA-1 with RSA encryption.
    Sha1WithRSA,
    /// SHA-256 with RSA encryption.
    Sha256WithRSA,
    /// SHA-384 with RSA encryption.
    Sha384WithRSA,
    /// SHA-512 with RSA encryption.
    Sha512WithRSA,
    /// RSASSA-PSS. The hash lives in the algorithm parameters and is not interpreted.
    RsaPss,
    /// SHA-1 with ECDSA.
    Sha1WithECDSA,
    /// SHA-256 with ECDSA.
    Sha256WithECDSA,
    /// SHA-384 with ECDSA.
    Sha384WithECDSA,
    /// SHA-512 with ECDSA.
    Sha512WithECDSA,
}

impl SignatureAlgorithm {
    /// Maps an algorithm identifier to a known signature algorithm.
    pub fn from_oid(oid: &der::oid::ObjectIdentifier) -> Option<Self> {
        match *oid {
            rfc5912::SHA_1_WITH_RSA_ENCRYPTION => Some(SignatureAlgorithm::Sha1WithRSA),
            rfc5912::SHA_256_WITH_RSA_ENCRYPTION => Some(SignatureAlgorithm::Sha256WithRSA),
            rfc5912::SHA_384_WITH_RSA_ENCRYPTION => Some(SignatureAlgorithm::Sha384WithRSA),
            rfc5912::SHA_512_WITH_RSA_ENCRYPTION => Some(SignatureAlgorithm::Sha512WithRSA),
            rfc5912::ID_RSASSA_PSS => Some(SignatureAlgorithm::RsaPss),
            oid::ECDSA_WITH_SHA1 => Some(SignatureAlgorithm::Sha1WithECDSA),
            rfc5912::ECDSA_WITH_SHA_256 => Some(SignatureAlgorithm::Sha256WithECDSA),
            rfc5912::ECDSA_WITH_SHA_384 => Some(SignatureAlgorithm::Sha384WithECDSA),
            rfc5912::ECDSA_WITH_SHA_512 => Some(SignatureAlgorithm::Sha512WithECDSA),
            _ => None,
        }
    }

    /// The hash the algorithm declares, `None` for RSASSA-PSS.
    pub fn hash(&self) -> Option<HashAlgorithm> {
        match self {
            SignatureAlgorithm::Sha1WithRSA | SignatureAlgorithm::Sha1WithECDSA => {
                Some(HashAlgorithm::Sha1)
            }
            SignatureAlgorithm::Sha256WithRSA | SignatureAlgorithm::Sha256WithECDSA => {
                Some(HashAlgorithm::Sha256)
            }
            SignatureAlgorithm::Sha384WithRSA | SignatureAlgorithm::Sha384WithECDSA => {
                Some(HashAlgorithm::Sha384)
            }
            SignatureAlgorithm::Sha512WithRSA | SignatureAlgorithm::Sha512WithECDSA => {
                Some(HashAlgorithm::Sha512)
            }
            SignatureAlgorithm::RsaPss => None,
        }
    }

    /// True for the algorithms an RSA key produces.
    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::Sha1WithRSA
                | SignatureAlgorithm::Sha256WithRSA
                | SignatureAlgorithm::Sha384WithRSA
                | SignatureAlgorithm::Sha512WithRSA
                | SignatureAlgorithm::RsaPss
        )
    }

    fn oid(&self) -> der::oid::ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha1WithRSA => rfc5912::SHA_1_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha256WithRSA => rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha384WithRSA => rfc5912::SHA_384_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::Sha512WithRSA => rfc5912::SHA_512_WITH_RSA_ENCRYPTION,
            SignatureAlgorithm::RsaPss => rfc5912::ID_RSASSA_PSS,
            SignatureAlgorithm::Sha1WithECDSA => oid::ECDSA_WITH_SHA1,
            SignatureAlgorithm::Sha256WithECDSA => rfc5912::ECDSA_WITH_SHA_256,
            SignatureAlgorithm::Sha384WithECDSA => rfc5912::ECDSA_WITH_SHA_384,
            SignatureAlgorithm::Sha512WithECDSA => rfc5912::ECDSA_WITH_SHA_512,
        }
    }
}

impl From<SignatureAlgorithm> for AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// PKCS#1 algorithms carry an explicit NULL parameter, ECDSA algorithms none.
    fn from(value: SignatureAlgorithm) -> Self {
        let parameters = match value {
            SignatureAlgorithm::Sha1WithRSA
            | SignatureAlgorithm::Sha256WithRSA
            | SignatureAlgorithm::Sha384WithRSA
            | SignatureAlgorithm::Sha512WithRSA => Some(Any::from(AnyRef::NULL)),
            _ => None,
        };
        AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters,
        }
    }
}

/// Represents an X.509 certificate.
///
/// Equality is structural over the decoded certificate, which for DER input is
/// byte equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl From<CertificateInner> for Certificate {
    fn from(inner: CertificateInner) -> Self {
        Self { inner }
    }
}

impl Certificate {
    /// Decodes a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_der(der)?,
        })
    }

    /// Decodes a single PEM `CERTIFICATE` block.
    pub fn from_pem(pem: &str) -> Result<Self> {
        Ok(Self {
            inner: CertificateInner::from_pem(pem)?,
        })
    }

    /// Encodes the certificate into DER format.
    ///
    /// # Returns
    /// A byte vector containing the DER-encoded certificate.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| ChainsmithError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    ///
    /// # Returns
    /// A string containing the PEM-encoded certificate.
    pub fn to_pem(&self) -> Result<String> {
        Ok(crate::pem_utils::der_to_pem(
            &self.to_der()?,
            crate::pem_utils::CERTIFICATE_LABEL,
        ))
    }

    pub fn subject(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    pub fn subject_dn(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.subject())
    }

    /// The common name of the subject, if it carries one.
    pub fn common_name(&self) -> Option<String> {
        self.subject_dn().common_name
    }

    /// DER encoding of the to-be-signed portion.
    pub fn tbs_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.inner.tbs_certificate.to_der()?)
    }

    pub fn signature_bytes(&self) -> &[u8] {
        self.inner.signature.raw_bytes()
    }

    /// The outer signature algorithm, `None` if it is not one we know.
    pub fn signature_algorithm(&self) -> Option<SignatureAlgorithm> {
        SignatureAlgorithm::from_oid(&self.inner.signature_algorithm.oid)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    /// Subject and issuer names are equal.
    pub fn is_self_issued(&self) -> bool {
        self.subject() == self.issuer()
    }

    /// Self-issued and the signature verifies with the certificate's own key.
    pub fn is_self_signed(&self) -> bool {
        self.is_self_issued() && crate::verify::verifies(self, self)
    }
}

/// Builds the outer signature field from raw signature bytes.
pub(crate) fn signature_bits(signature: &[u8]) -> Result<BitString> {
    BitString::from_bytes(signature).map_err(|e| ChainsmithError::EncodingError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_algorithms_carry_null_parameters() {
        let rsa: AlgorithmIdentifierOwned = SignatureAlgorithm::Sha256WithRSA.into();
        assert_eq!(rsa.parameters, Some(Any::from(AnyRef::NULL)));

        let ec: AlgorithmIdentifierOwned = SignatureAlgorithm::Sha384WithECDSA.into();
        assert!(ec.parameters.is_none());
    }

    #[test]
    fn oid_mapping_is_reversible() {
        for alg in [
            SignatureAlgorithm::Sha1WithRSA,
            SignatureAlgorithm::Sha256WithRSA,
            SignatureAlgorithm::Sha384WithRSA,
            SignatureAlgorithm::Sha512WithRSA,
            SignatureAlgorithm::RsaPss,
            SignatureAlgorithm::Sha1WithECDSA,
            SignatureAlgorithm::Sha256WithECDSA,
            SignatureAlgorithm::Sha384WithECDSA,
            SignatureAlgorithm::Sha512WithECDSA,
        ] {
            assert_eq!(SignatureAlgorithm::from_oid(&alg.oid()), Some(alg));
        }
    }

    #[test]
    fn pss_declares_no_hash() {
        assert_eq!(SignatureAlgorithm::RsaPss.hash(), None);
        assert_eq!(
            SignatureAlgorithm::Sha384WithECDSA.hash(),
            Some(HashAlgorithm::Sha384)
        );
        assert_eq!(HashAlgorithm::Sha512.digest(b"abc").len(), 64);
    }
}
