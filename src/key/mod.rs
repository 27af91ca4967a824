pub mod legacy;

use std::fmt;
use std::str::FromStr;

use const_oid::db::rfc5912;
use der::asn1::ObjectIdentifier;
use der::pem::LineEnding;
use der::{Decode, SecretDocument};
use ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{SigningKey as P256SigningKey, VerifyingKey as P256VerifyingKey};
use p384::ecdsa::{SigningKey as P384SigningKey, VerifyingKey as P384VerifyingKey};
use p521::NistP521;
use p521::ecdsa::SigningKey as P521SigningKey;
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rand_core::{OsRng, RngCore};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::info;
use x509_cert::spki::SubjectPublicKeyInfoOwned;
use zeroize::Zeroizing;

use crate::cert::SignatureAlgorithm;
use crate::error::{ChainsmithError, Result};

type P521VerifyingKey = ecdsa::VerifyingKey<NistP521>;
type P521ScalarKey = ecdsa::SigningKey<NistP521>;

/// PBKDF2 rounds used when a private key is exported as encrypted PKCS#8.
pub const PKCS8_PBKDF2_ITERATIONS: u32 = 2048;

pub(crate) const P384_FIELD_BYTES: usize = 48;
pub(crate) const P521_FIELD_BYTES: usize = 66;

/// Left-pads a digest shorter than half the field size to the full field width.
///
/// The ECDSA implementation rejects such short prehashes, while the padded value
/// is the same integer, so the signature is unchanged.
pub(crate) fn pad_prehash(prehash: &[u8], field_bytes: usize) -> Vec<u8> {
    if prehash.len() >= field_bytes / 2 {
        return prehash.to_vec();
    }
    let mut padded = vec![0u8; field_bytes - prehash.len()];
    padded.extend_from_slice(prehash);
    padded
}

/// RSA modulus sizes offered for new keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaBits {
    Rsa2048,
    Rsa3072,
    Rsa4096,
    /// Size of an imported key that is not offered for generation.
    Other(usize),
}

impl RsaBits {
    pub fn bits(&self) -> usize {
        match self {
            RsaBits::Rsa2048 => 2048,
            RsaBits::Rsa3072 => 3072,
            RsaBits::Rsa4096 => 4096,
            RsaBits::Other(bits) => *bits,
        }
    }
}

impl TryFrom<usize> for RsaBits {
    type Error = ChainsmithError;

    fn try_from(bits: usize) -> Result<Self> {
        match bits {
            2048 => Ok(RsaBits::Rsa2048),
            3072 => Ok(RsaBits::Rsa3072),
            4096 => Ok(RsaBits::Rsa4096),
            other => Err(ChainsmithError::UnsupportedParameter(format!(
                "RSA key size {other}"
            ))),
        }
    }
}

/// NIST curves offered for new keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EccCurve {
    P256,
    P384,
    P521,
}

impl FromStr for EccCurve {
    type Err = ChainsmithError;

    /// Accepts `P-256`, `P-384` and `P-521`, case-insensitive, with or without the dash.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "P256" => Ok(EccCurve::P256),
            "P384" => Ok(EccCurve::P384),
            "P521" => Ok(EccCurve::P521),
            _ => Err(ChainsmithError::UnsupportedParameter(format!("curve {s}"))),
        }
    }
}

impl fmt::Display for EccCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EccCurve::P256 => f.write_str("P-256"),
            EccCurve::P384 => f.write_str("P-384"),
            EccCurve::P521 => f.write_str("P-521"),
        }
    }
}

/// Algorithm family and size of a key to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Rsa(RsaBits),
    Ecc(EccCurve),
}

impl KeyKind {
    /// Builds a key kind from the algorithm label (`RSA` or `ECC`) and its size or curve.
    ///
    /// # Example
    /// ```
    /// use chainsmith::key::{EccCurve, KeyKind};
    /// assert_eq!(KeyKind::parse("ECC", "P-384").unwrap(), KeyKind::Ecc(EccCurve::P384));
    /// assert!(KeyKind::parse("RSA", "1024").is_err());
    /// ```
    pub fn parse(algorithm: &str, size_or_curve: &str) -> Result<Self> {
        match algorithm.trim().to_ascii_uppercase().as_str() {
            "RSA" => {
                let bits: usize = size_or_curve.trim().parse().map_err(|_| {
                    ChainsmithError::UnsupportedParameter(format!("RSA key size {size_or_curve}"))
                })?;
                Ok(KeyKind::Rsa(RsaBits::try_from(bits)?))
            }
            "ECC" | "EC" | "ECDSA" => Ok(KeyKind::Ecc(size_or_curve.parse()?)),
            other => Err(ChainsmithError::UnsupportedParameter(format!(
                "key algorithm {other}"
            ))),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Rsa(bits) => write!(f, "RSA-{}", bits.bits()),
            KeyKind::Ecc(curve) => write!(f, "ECC {curve}"),
        }
    }
}

/// Supported key types for request signing and container packaging.
pub enum KeyPair {
    Rsa {
        private: Box<RsaPrivateKey>,
        public: RsaPublicKey,
    },
    EcdsaP256 {
        signing_key: P256SigningKey,
        verifying_key: P256VerifyingKey,
    },
    EcdsaP384 {
        signing_key: P384SigningKey,
        verifying_key: P384VerifyingKey,
    },
    EcdsaP521 {
        signing_key: P521SigningKey,
        verifying_key: P521VerifyingKey,
    },
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("kind", &self.kind().to_string())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a fresh key pair of the requested kind from the OS random source.
    pub fn generate(kind: KeyKind) -> Result<Self> {
        let key = match kind {
            KeyKind::Rsa(bits) => Self::generate_rsa(bits.bits())?,
            KeyKind::Ecc(EccCurve::P256) => Self::generate_ecdsa_p256(),
            KeyKind::Ecc(EccCurve::P384) => Self::generate_ecdsa_p384(),
            KeyKind::Ecc(EccCurve::P521) => Self::generate_ecdsa_p521(),
        };
        info!(kind = %kind, "generated key pair");
        Ok(key)
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let bits = RsaBits::try_from(bits)?;
        let private = RsaPrivateKey::new(&mut OsRng, bits.bits())
            .map_err(|e| ChainsmithError::KeyGenerationError(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair::Rsa {
            private: Box::new(private),
            public,
        })
    }

    /// Generate an ECDSA P-256 key pair.
    pub fn generate_ecdsa_p256() -> Self {
        let signing_key = P256SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP256 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-384 key pair.
    pub fn generate_ecdsa_p384() -> Self {
        let signing_key = P384SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        KeyPair::EcdsaP384 {
            signing_key,
            verifying_key,
        }
    }

    /// Generate an ECDSA P-521 key pair.
    pub fn generate_ecdsa_p521() -> Self {
        Self::from_p521(P521ScalarKey::random(&mut OsRng))
    }

    fn from_p521(secret: P521ScalarKey) -> Self {
        let verifying_key = *secret.verifying_key();
        KeyPair::EcdsaP521 {
            signing_key: P521SigningKey::from(secret),
            verifying_key,
        }
    }

    /// Algorithm family and size of this key.
    pub fn kind(&self) -> KeyKind {
        match self {
            KeyPair::Rsa { public, .. } => {
                let bits = rsa::traits::PublicKeyParts::size(public) * 8;
                KeyKind::Rsa(RsaBits::try_from(bits).unwrap_or(RsaBits::Other(bits)))
            }
            KeyPair::EcdsaP256 { .. } => KeyKind::Ecc(EccCurve::P256),
            KeyPair::EcdsaP384 { .. } => KeyKind::Ecc(EccCurve::P384),
            KeyPair::EcdsaP521 { .. } => KeyKind::Ecc(EccCurve::P521),
        }
    }

    /// Signature algorithm used by [`KeyPair::sign_data`].
    pub fn signature_algorithm(&self) -> SignatureAlgorithm {
        match self {
            KeyPair::Rsa { .. } => SignatureAlgorithm::Sha256WithRSA,
            _ => SignatureAlgorithm::Sha256WithECDSA,
        }
    }

    /// Signs `data` with this key.
    ///
    /// RSA produces a PKCS#1 v1.5 signature, ECDSA a DER-encoded `(r, s)` pair.
    /// The hash is the one named by [`KeyPair::signature_algorithm`].
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign_data_with(self.signature_algorithm(), data)
    }

    /// Signs `data` with the hash `algorithm` declares.
    ///
    /// # Errors
    /// `UnsupportedParameter` when `algorithm` belongs to the other key family or
    /// declares no hash.
    pub fn sign_data_with(&self, algorithm: SignatureAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
        let is_rsa = matches!(self, KeyPair::Rsa { .. });
        let hash = algorithm
            .hash()
            .filter(|_| algorithm.is_rsa() == is_rsa)
            .ok_or_else(|| {
                ChainsmithError::UnsupportedParameter(format!(
                    "{algorithm:?} with a {} key",
                    self.kind()
                ))
            })?;
        let prehash = hash.digest(data);

        match self {
            KeyPair::Rsa { private, .. } => Ok(private.sign(hash.pkcs1v15(), &prehash)?),
            KeyPair::EcdsaP256 { signing_key, .. } => {
                let signature: p256::ecdsa::Signature = signing_key.sign_prehash(&prehash)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP384 { signing_key, .. } => {
                let prehash = pad_prehash(&prehash, P384_FIELD_BYTES);
                let signature: p384::ecdsa::Signature = signing_key.sign_prehash(&prehash)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
            KeyPair::EcdsaP521 { signing_key, .. } => {
                let prehash = pad_prehash(&prehash, P521_FIELD_BYTES);
                let signature: p521::ecdsa::Signature = signing_key.sign_prehash(&prehash)?;
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }

    /// Returns the SubjectPublicKeyInfo of the public half.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        PublicKey::from_key_pair(self).to_spki()
    }

    /// Encodes the private key as unencrypted PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<SecretDocument> {
        let doc = match self {
            KeyPair::Rsa { private, .. } => private.to_pkcs8_der()?,
            KeyPair::EcdsaP256 { signing_key, .. } => signing_key.to_pkcs8_der()?,
            KeyPair::EcdsaP384 { signing_key, .. } => signing_key.to_pkcs8_der()?,
            KeyPair::EcdsaP521 { signing_key, .. } => {
                P521ScalarKey::from_bytes(&signing_key.to_bytes())?.to_pkcs8_der()?
            }
        };
        Ok(doc)
    }

    /// Encodes the private key as an unencrypted `PRIVATE KEY` PEM block.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        self.to_pkcs8_der()?
            .to_pem("PRIVATE KEY", LineEnding::LF)
            .map_err(|e| ChainsmithError::EncodingError(e.to_string()))
    }

    /// Decodes an unencrypted PKCS#8 private key of any supported algorithm.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = PrivateKeyInfo::from_der(der)?;

        match info.algorithm.oid {
            rfc5912::RSA_ENCRYPTION => {
                let private = RsaPrivateKey::from_pkcs8_der(der)?;
                Ok(Self::from_rsa(private))
            }
            rfc5912::ID_EC_PUBLIC_KEY => {
                let curve: ObjectIdentifier = info
                    .algorithm
                    .parameters_oid()
                    .map_err(|e| ChainsmithError::DecodingError(e.to_string()))?;
                match curve {
                    rfc5912::SECP_256_R_1 => {
                        let signing_key = P256SigningKey::from_pkcs8_der(der)?;
                        let verifying_key = *signing_key.verifying_key();
                        Ok(KeyPair::EcdsaP256 {
                            signing_key,
                            verifying_key,
                        })
                    }
                    rfc5912::SECP_384_R_1 => {
                        let signing_key = P384SigningKey::from_pkcs8_der(der)?;
                        let verifying_key = *signing_key.verifying_key();
                        Ok(KeyPair::EcdsaP384 {
                            signing_key,
                            verifying_key,
                        })
                    }
                    rfc5912::SECP_521_R_1 => {
                        Ok(Self::from_p521(P521ScalarKey::from_pkcs8_der(der)?))
                    }
                    other => Err(ChainsmithError::UnsupportedParameter(format!(
                        "EC curve {other}"
                    ))),
                }
            }
            other => Err(ChainsmithError::UnsupportedParameter(format!(
                "private key algorithm {other}"
            ))),
        }
    }

    /// Decodes a SEC1 `ECPrivateKey`, trying each supported curve in turn.
    pub fn from_sec1_der(der: &[u8]) -> Result<Self> {
        if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
            let signing_key = P256SigningKey::from(secret);
            let verifying_key = *signing_key.verifying_key();
            return Ok(KeyPair::EcdsaP256 {
                signing_key,
                verifying_key,
            });
        }
        if let Ok(secret) = p384::SecretKey::from_sec1_der(der) {
            let signing_key = P384SigningKey::from(secret);
            let verifying_key = *signing_key.verifying_key();
            return Ok(KeyPair::EcdsaP384 {
                signing_key,
                verifying_key,
            });
        }
        let secret = p521::SecretKey::from_sec1_der(der)
            .map_err(|e| ChainsmithError::DecodingError(format!("EC private key: {e}")))?;
        Ok(Self::from_p521(P521ScalarKey::from(secret)))
    }

    fn from_rsa(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair::Rsa {
            private: Box::new(private),
            public,
        }
    }

    /// Exports the private key as PEM.
    ///
    /// Without a passphrase, RSA keys are written as `RSA PRIVATE KEY` (PKCS#1) and
    /// EC keys as `PRIVATE KEY` (PKCS#8). With a passphrase, RSA keys keep the PKCS#1
    /// form under a `DEK-Info: AES-256-CBC` header and EC keys become an
    /// `ENCRYPTED PRIVATE KEY` (PBES2, PBKDF2-HMAC-SHA256, AES-256-CBC).
    /// An empty passphrase counts as none.
    pub fn export_private_key(&self, passphrase: Option<&str>) -> Result<Zeroizing<String>> {
        let passphrase = passphrase.filter(|p| !p.is_empty());

        match (self, passphrase) {
            (KeyPair::Rsa { private, .. }, None) => private
                .to_pkcs1_pem(LineEnding::LF)
                .map_err(|e| ChainsmithError::EncodingError(e.to_string())),
            (KeyPair::Rsa { private, .. }, Some(passphrase)) => {
                let der = private.to_pkcs1_der()?;
                legacy::encrypt_pem(legacy::RSA_PRIVATE_KEY_LABEL, der.as_bytes(), passphrase)
            }
            (_, None) => self.to_pkcs8_pem(),
            (_, Some(passphrase)) => {
                let der = self.to_pkcs8_der()?;
                let mut salt = [0u8; 16];
                let mut iv = [0u8; 16];
                OsRng.fill_bytes(&mut salt);
                OsRng.fill_bytes(&mut iv);
                let params = pkcs8::pkcs5::pbes2::Parameters::pbkdf2_sha256_aes256cbc(
                    PKCS8_PBKDF2_ITERATIONS,
                    &salt,
                    &iv,
                )?;
                let encrypted = PrivateKeyInfo::from_der(der.as_bytes())?
                    .encrypt_with_params(params, passphrase)?;
                encrypted
                    .to_pem("ENCRYPTED PRIVATE KEY", LineEnding::LF)
                    .map_err(|e| ChainsmithError::EncodingError(e.to_string()))
            }
        }
    }

    /// Loads a private key from PEM.
    ///
    /// Accepts `RSA PRIVATE KEY` and `EC PRIVATE KEY` (plain or with a `DEK-Info`
    /// header), `PRIVATE KEY`, and `ENCRYPTED PRIVATE KEY`. The first private key
    /// block in the input is used.
    ///
    /// # Errors
    /// `DecryptionFailed` when the key is encrypted and the passphrase is wrong or missing.
    pub fn from_pem(pem_str: &str, passphrase: Option<&str>) -> Result<Self> {
        let blocks = pem::parse_many(pem_str)?;
        let block = blocks
            .iter()
            .find(|p| p.tag().ends_with("PRIVATE KEY"))
            .ok_or_else(|| ChainsmithError::InvalidInput("no private key PEM block".into()))?;
        let passphrase = passphrase.filter(|p| !p.is_empty());

        match block.tag() {
            legacy::RSA_PRIVATE_KEY_LABEL | legacy::EC_PRIVATE_KEY_LABEL => {
                let der = if legacy::is_encrypted(block) {
                    let passphrase = passphrase.ok_or(ChainsmithError::DecryptionFailed)?;
                    legacy::decrypt_pem(block, passphrase)?
                } else {
                    Zeroizing::new(block.contents().to_vec())
                };
                if block.tag() == legacy::RSA_PRIVATE_KEY_LABEL {
                    RsaPrivateKey::from_pkcs1_der(&der)
                        .map(Self::from_rsa)
                        .map_err(|_| ChainsmithError::DecryptionFailed)
                } else {
                    Self::from_sec1_der(&der).map_err(|_| ChainsmithError::DecryptionFailed)
                }
            }
            "PRIVATE KEY" => Self::from_pkcs8_der(block.contents()),
            "ENCRYPTED PRIVATE KEY" => {
                let passphrase = passphrase.ok_or(ChainsmithError::DecryptionFailed)?;
                let info = EncryptedPrivateKeyInfo::try_from(block.contents())?;
                let doc = info
                    .decrypt(passphrase)
                    .map_err(|_| ChainsmithError::DecryptionFailed)?;
                Self::from_pkcs8_der(doc.as_bytes())
            }
            other => Err(ChainsmithError::UnsupportedParameter(format!(
                "PEM label {other}"
            ))),
        }
    }
}

/// Public half of a key pair, or a public key read from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    EcdsaP256(P256VerifyingKey),
    EcdsaP384(P384VerifyingKey),
    EcdsaP521(P521VerifyingKey),
}

impl PublicKey {
    pub fn from_key_pair(key: &KeyPair) -> Self {
        match key {
            KeyPair::Rsa { public, .. } => PublicKey::Rsa(public.clone()),
            KeyPair::EcdsaP256 { verifying_key, .. } => PublicKey::EcdsaP256(*verifying_key),
            KeyPair::EcdsaP384 { verifying_key, .. } => PublicKey::EcdsaP384(*verifying_key),
            KeyPair::EcdsaP521 { verifying_key, .. } => PublicKey::EcdsaP521(*verifying_key),
        }
    }

    /// Reads a public key from a SubjectPublicKeyInfo.
    ///
    /// # Errors
    /// `UnsupportedParameter` for algorithms other than RSA and the three NIST curves.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        match spki.algorithm.oid {
            rfc5912::RSA_ENCRYPTION => {
                let der = der::Encode::to_der(spki)?;
                Ok(PublicKey::Rsa(RsaPublicKey::from_public_key_der(&der)?))
            }
            rfc5912::ID_EC_PUBLIC_KEY => {
                let curve: ObjectIdentifier = spki
                    .algorithm
                    .parameters
                    .as_ref()
                    .ok_or_else(|| ChainsmithError::DecodingError("EC key without curve".into()))?
                    .decode_as()?;
                let point = spki.subject_public_key.raw_bytes();
                match curve {
                    rfc5912::SECP_256_R_1 => Ok(PublicKey::EcdsaP256(
                        P256VerifyingKey::from_sec1_bytes(point)?,
                    )),
                    rfc5912::SECP_384_R_1 => Ok(PublicKey::EcdsaP384(
                        P384VerifyingKey::from_sec1_bytes(point)?,
                    )),
                    rfc5912::SECP_521_R_1 => Ok(PublicKey::EcdsaP521(
                        P521VerifyingKey::from_sec1_bytes(point)?,
                    )),
                    other => Err(ChainsmithError::UnsupportedParameter(format!(
                        "EC curve {other}"
                    ))),
                }
            }
            other => Err(ChainsmithError::UnsupportedParameter(format!(
                "public key algorithm {other}"
            ))),
        }
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let spki = match self {
            PublicKey::Rsa(public) => SubjectPublicKeyInfoOwned::from_key(public.clone())?,
            PublicKey::EcdsaP256(key) => SubjectPublicKeyInfoOwned::from_key(*key)?,
            PublicKey::EcdsaP384(key) => SubjectPublicKeyInfoOwned::from_key(*key)?,
            PublicKey::EcdsaP521(key) => SubjectPublicKeyInfoOwned::from_key(*key)?,
        };
        Ok(spki)
    }

    /// Parses a DER SubjectPublicKeyInfo.
    pub fn from_spki_der(der: &[u8]) -> Result<Self> {
        Self::from_x509spki(&SubjectPublicKeyInfoOwned::from_der(der)?)
    }
}
