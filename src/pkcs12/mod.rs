//! PKCS#12 (PFX) containers.
//!
//! Containers are written with one fixed, strong profile:
//! * the private key in a `pkcs8ShroudedKeyBag` under PBES2 (PBKDF2-HMAC-SHA256,
//!   AES-256-CBC);
//! * the leaf and CA certificates in an `encryptedData` safe under the same scheme,
//!   leaf first, CA order preserved;
//! * `friendlyName` and `localKeyId` on the key and the leaf;
//! * an HMAC-SHA-256 integrity MAC keyed through the RFC 7292 KDF.
//!
//! Reading additionally accepts SHA-1/384/512 MACs, unencrypted key bags and the
//! `pbeWithSHAAnd3-KeyTripleDES-CBC` scheme.

pub mod asn1;
pub mod kdf;

use std::fmt;
use std::str::FromStr;

use bon::Builder;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use const_oid::db::{rfc5911, rfc5912};
use der::asn1::{OctetString, SetOfVec};
use der::{Any, Decode, Encode, Tag, Tagged};
use digest::Digest;
use digest::core_api::BlockSizeUser;
use hmac::{Mac, SimpleHmac};
use pkcs5::pbes2;
use rand_core::{OsRng, RngCore};
use tracing::{debug, info, warn};
use x509_cert::attr::Attribute;
use x509_cert::spki::AlgorithmIdentifierOwned;
use zeroize::Zeroizing;

use self::asn1::{
    CertBag, ContentInfo, DigestInfo, EncryptedContentInfo, EncryptedData, MacData, Pfx,
    Pkcs12PbeParams, SafeBag, ShroudedKeyBag,
};
use crate::cert::Certificate;
use crate::cert::params::attribute_value_string;
use crate::error::{ChainsmithError, Result};
use crate::key::KeyPair;
use crate::oid;

/// Friendly name given to the key and leaf certificate.
pub const DEFAULT_FRIENDLY_NAME: &str = "SSL Certificate";
/// Friendly name used when packaging a resolved full chain.
pub const FULL_CHAIN_FRIENDLY_NAME: &str = "certificate";
/// PBKDF2 and MAC iteration count.
pub const DEFAULT_ITERATIONS: u32 = 2048;
/// Salt length for PBKDF2 and the MAC.
pub const SALT_LEN: usize = 16;

const PFX_VERSION: u8 = 3;

/// Integrity MAC hash a caller may ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MacAlgorithm {
    #[default]
    Sha256,
    Sha512,
    Sha1,
}

impl FromStr for MacAlgorithm {
    type Err = ChainsmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHA-256" | "SHA256" => Ok(MacAlgorithm::Sha256),
            "SHA-512" | "SHA512" => Ok(MacAlgorithm::Sha512),
            "SHA-1" | "SHA1" => Ok(MacAlgorithm::Sha1),
            other => Err(ChainsmithError::UnsupportedParameter(format!(
                "MAC algorithm {other}"
            ))),
        }
    }
}

/// Content encryption a caller may ask for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EncryptionAlgorithm {
    #[default]
    Default,
    Aes256,
    Aes128,
    TripleDes,
    Legacy,
}

impl FromStr for EncryptionAlgorithm {
    type Err = ChainsmithError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(EncryptionAlgorithm::Default),
            "AES-256" | "AES256" => Ok(EncryptionAlgorithm::Aes256),
            "AES-128" | "AES128" => Ok(EncryptionAlgorithm::Aes128),
            "3DES" => Ok(EncryptionAlgorithm::TripleDes),
            "LEGACY" => Ok(EncryptionAlgorithm::Legacy),
            other => Err(ChainsmithError::UnsupportedParameter(format!(
                "encryption algorithm {other}"
            ))),
        }
    }
}

/// Options for building a container.
///
/// `mac_algorithm` and `encryption_algorithm` are recorded but advisory: the
/// container is always protected with HMAC-SHA-256 and AES-256-CBC.
#[derive(Debug, Clone, Builder, PartialEq, Eq)]
pub struct Pkcs12Options {
    #[builder(default = DEFAULT_FRIENDLY_NAME.to_string(), into)]
    pub friendly_name: String,
    #[builder(default)]
    pub mac_algorithm: MacAlgorithm,
    #[builder(default)]
    pub encryption_algorithm: EncryptionAlgorithm,
    #[builder(default = DEFAULT_ITERATIONS)]
    pub iterations: u32,
}

impl Default for Pkcs12Options {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Pkcs12Options {
    /// Options for the full-chain export, friendly name `certificate`.
    pub fn full_chain() -> Self {
        Self::builder().friendly_name(FULL_CHAIN_FRIENDLY_NAME).build()
    }

    /// True when a weak MAC or cipher was requested.
    pub fn is_legacy(&self) -> bool {
        self.mac_algorithm == MacAlgorithm::Sha1
            || matches!(
                self.encryption_algorithm,
                EncryptionAlgorithm::TripleDes | EncryptionAlgorithm::Legacy
            )
    }
}

/// What a container holds.
pub struct Pkcs12Contents {
    pub private_key: Option<KeyPair>,
    /// Leaf first when the leaf is identifiable, then the remaining certificates
    /// in container order.
    pub certificates: Vec<Certificate>,
    pub friendly_name: Option<String>,
}

impl fmt::Debug for Pkcs12Contents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkcs12Contents")
            .field("has_private_key", &self.private_key.is_some())
            .field("certificates", &self.certificates.len())
            .field("friendly_name", &self.friendly_name)
            .finish()
    }
}

impl Pkcs12Contents {
    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    pub fn ca_certificates(&self) -> &[Certificate] {
        self.certificates.get(1..).unwrap_or_default()
    }
}

/// Builds a container with [`Pkcs12Options::default`].
///
/// # Errors
/// `MissingPassphrase` when `passphrase` is empty.
pub fn build_pkcs12(
    key: &KeyPair,
    leaf: &Certificate,
    cas: &[Certificate],
    passphrase: &str,
) -> Result<Vec<u8>> {
    build_pkcs12_with_options(key, leaf, cas, passphrase, &Pkcs12Options::default())
}

/// Builds a password-protected container from a key, its certificate and CA
/// certificates.
///
/// # Errors
/// `MissingPassphrase` when `passphrase` is empty.
pub fn build_pkcs12_with_options(
    key: &KeyPair,
    leaf: &Certificate,
    cas: &[Certificate],
    passphrase: &str,
    options: &Pkcs12Options,
) -> Result<Vec<u8>> {
    if passphrase.is_empty() {
        return Err(ChainsmithError::MissingPassphrase);
    }
    if options.is_legacy() {
        warn!(
            mac = ?options.mac_algorithm,
            encryption = ?options.encryption_algorithm,
            "legacy PKCS#12 options requested, using HMAC-SHA-256 and AES-256-CBC"
        );
    }
    let iterations = options.iterations.max(1);

    let leaf_der = leaf.to_der()?;
    let local_key_id = sha1::Sha1::digest(&leaf_der).to_vec();
    let attributes = bag_attributes(&options.friendly_name, &local_key_id)?;

    // Certificate safe, encrypted as a whole.
    let mut cert_bags = vec![cert_bag(&leaf_der, Some(attributes.clone()))?];
    for ca in cas {
        cert_bags.push(cert_bag(&ca.to_der()?, None)?);
    }
    let (algorithm, ciphertext) = pbes2_encrypt(&cert_bags.to_der()?, passphrase, iterations)?;
    let encrypted_data = EncryptedData {
        version: 0,
        encrypted_content_info: EncryptedContentInfo {
            content_type: rfc5911::ID_DATA,
            content_encryption_algorithm: algorithm,
            encrypted_content: Some(OctetString::new(ciphertext)?),
        },
    };
    let cert_safe = ContentInfo {
        content_type: rfc5911::ID_ENCRYPTED_DATA,
        content: Some(Any::encode_from(&encrypted_data)?),
    };

    // Key safe, plain data holding a shrouded key bag.
    let pkcs8 = key.to_pkcs8_der()?;
    let (algorithm, ciphertext) = pbes2_encrypt(pkcs8.as_bytes(), passphrase, iterations)?;
    let shrouded = ShroudedKeyBag {
        encryption_algorithm: algorithm,
        encrypted_data: OctetString::new(ciphertext)?,
    };
    let key_bag = SafeBag {
        bag_id: oid::PKCS_12_PKCS8_SHROUDED_KEY_BAG,
        bag_value: Any::encode_from(&shrouded)?,
        bag_attributes: Some(attributes),
    };
    let key_safe = data_content_info(vec![key_bag].to_der()?)?;

    let auth_safe_der = vec![cert_safe, key_safe].to_der()?;

    let mut mac_salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut mac_salt);
    let digest = compute_mac::<sha2::Sha256>(&auth_safe_der, passphrase, &mac_salt, iterations)?;
    let mac_data = MacData {
        mac: DigestInfo {
            digest_algorithm: AlgorithmIdentifierOwned {
                oid: rfc5912::ID_SHA_256,
                parameters: Some(Any::from(der::asn1::AnyRef::NULL)),
            },
            digest: OctetString::new(digest)?,
        },
        mac_salt: OctetString::new(mac_salt.to_vec())?,
        iterations: Some(iterations),
    };

    let pfx = Pfx {
        version: PFX_VERSION,
        auth_safe: data_content_info(auth_safe_der)?,
        mac_data: Some(mac_data),
    };

    info!(
        kind = %key.kind(),
        ca_count = cas.len(),
        friendly_name = %options.friendly_name,
        "built PKCS#12 container"
    );
    Ok(pfx.to_der()?)
}

/// Opens a container, checking its MAC and decrypting every safe.
///
/// # Errors
/// `DecryptionFailed` when the MAC does not verify or a bag does not decrypt.
pub fn parse_pkcs12(data: &[u8], passphrase: &str) -> Result<Pkcs12Contents> {
    let pfx = Pfx::from_der(data)?;
    if pfx.version != PFX_VERSION {
        return Err(ChainsmithError::DecodingError(format!(
            "PFX version {}",
            pfx.version
        )));
    }
    if pfx.auth_safe.content_type != rfc5911::ID_DATA {
        return Err(ChainsmithError::UnsupportedParameter(format!(
            "authSafe content type {}",
            pfx.auth_safe.content_type
        )));
    }
    let auth_safe_der = data_octets(&pfx.auth_safe)?;

    match &pfx.mac_data {
        Some(mac_data) => verify_mac(mac_data, auth_safe_der, passphrase)?,
        None => debug!("container has no MAC"),
    }

    let mut private_key = None;
    let mut key_id: Option<Vec<u8>> = None;
    let mut certs: Vec<(Certificate, Option<Vec<u8>>)> = Vec::new();
    let mut friendly_name = None;

    for content in Vec::<ContentInfo>::from_der(auth_safe_der)? {
        let bags = match content.content_type {
            rfc5911::ID_DATA => Vec::<SafeBag>::from_der(data_octets(&content)?)?,
            rfc5911::ID_ENCRYPTED_DATA => match decrypt_safe(&content, passphrase) {
                Ok(plaintext) => Vec::<SafeBag>::from_der(&plaintext)?,
                Err(ChainsmithError::UnsupportedParameter(reason)) => {
                    warn!(%reason, "skipping encrypted safe");
                    continue;
                }
                Err(e) => return Err(e),
            },
            other => {
                debug!(content_type = %other, "skipping unknown safe");
                continue;
            }
        };

        for bag in bags {
            let (bag_name, bag_key_id) = read_attributes(&bag);
            match bag.bag_id {
                oid::PKCS_12_CERT_BAG => {
                    let cert_bag = CertBag::from_der(&bag.bag_value.to_der()?)?;
                    if cert_bag.cert_id != oid::PKCS_9_CERT_TYPE_X509 {
                        debug!(cert_type = %cert_bag.cert_id, "skipping non-X.509 certificate bag");
                        continue;
                    }
                    certs.push((
                        Certificate::from_der(cert_bag.cert_value.as_bytes())?,
                        bag_key_id,
                    ));
                }
                oid::PKCS_12_PKCS8_SHROUDED_KEY_BAG if private_key.is_none() => {
                    let shrouded = ShroudedKeyBag::from_der(&bag.bag_value.to_der()?)?;
                    let pkcs8 = decrypt(
                        &shrouded.encryption_algorithm,
                        shrouded.encrypted_data.as_bytes(),
                        passphrase,
                    )?;
                    let key = KeyPair::from_pkcs8_der(&pkcs8)
                        .map_err(|_| ChainsmithError::DecryptionFailed)?;
                    private_key = Some(key);
                    key_id = bag_key_id;
                    friendly_name = friendly_name.or(bag_name);
                }
                oid::PKCS_12_KEY_BAG if private_key.is_none() => {
                    private_key = Some(KeyPair::from_pkcs8_der(&bag.bag_value.to_der()?)?);
                    key_id = bag_key_id;
                    friendly_name = friendly_name.or(bag_name);
                }
                other => debug!(bag_type = %other, "skipping bag"),
            }
        }
    }

    // Leaf first: the certificate sharing the key's localKeyId.
    let leaf_index = key_id
        .as_ref()
        .and_then(|id| certs.iter().position(|(_, cert_id)| cert_id.as_ref() == Some(id)))
        .unwrap_or(0);
    if leaf_index < certs.len() {
        let leaf = certs.remove(leaf_index);
        certs.insert(0, leaf);
    }

    Ok(Pkcs12Contents {
        private_key,
        certificates: certs.into_iter().map(|(cert, _)| cert).collect(),
        friendly_name,
    })
}

/// Recovers the private key of a container as unencrypted PKCS#8 PEM.
///
/// A missing passphrase is tried as the empty password.
///
/// # Errors
/// `DecryptionFailed` for a wrong passphrase, `NoPrivateKey` when the container
/// holds no key.
pub fn extract_key(data: &[u8], passphrase: Option<&str>) -> Result<Zeroizing<String>> {
    let contents = parse_pkcs12(data, passphrase.unwrap_or_default())?;
    let key = contents.private_key.ok_or(ChainsmithError::NoPrivateKey)?;
    info!(kind = %key.kind(), "extracted private key from PKCS#12 container");
    key.to_pkcs8_pem()
}

fn data_content_info(octets: Vec<u8>) -> Result<ContentInfo> {
    Ok(ContentInfo {
        content_type: rfc5911::ID_DATA,
        content: Some(Any::encode_from(&OctetString::new(octets)?)?),
    })
}

fn data_octets(content: &ContentInfo) -> Result<&[u8]> {
    match &content.content {
        Some(any) if any.tag() == Tag::OctetString => Ok(any.value()),
        Some(any) => Err(ChainsmithError::DecodingError(format!(
            "data content tagged {}",
            any.tag()
        ))),
        None => Err(ChainsmithError::DecodingError("empty data content".into())),
    }
}

fn cert_bag(der: &[u8], attributes: Option<SetOfVec<Attribute>>) -> Result<SafeBag> {
    let bag = CertBag {
        cert_id: oid::PKCS_9_CERT_TYPE_X509,
        cert_value: OctetString::new(der)?,
    };
    Ok(SafeBag {
        bag_id: oid::PKCS_12_CERT_BAG,
        bag_value: Any::encode_from(&bag)?,
        bag_attributes: attributes,
    })
}

fn bag_attributes(friendly_name: &str, local_key_id: &[u8]) -> Result<SetOfVec<Attribute>> {
    let bmp: Vec<u8> = friendly_name
        .encode_utf16()
        .flat_map(|unit| unit.to_be_bytes())
        .collect();
    let name = Attribute {
        oid: oid::PKCS_9_AT_FRIENDLY_NAME,
        values: SetOfVec::try_from(vec![Any::new(Tag::BmpString, bmp)?])?,
    };
    let key_id = Attribute {
        oid: oid::PKCS_9_AT_LOCAL_KEY_ID,
        values: SetOfVec::try_from(vec![Any::encode_from(&OctetString::new(local_key_id)?)?])?,
    };
    Ok(SetOfVec::try_from(vec![name, key_id])?)
}

/// Friendly name and localKeyId of a bag, when present.
fn read_attributes(bag: &SafeBag) -> (Option<String>, Option<Vec<u8>>) {
    let mut name = None;
    let mut key_id = None;
    for attr in bag.bag_attributes.iter().flat_map(|set| set.iter()) {
        let Some(value) = attr.values.iter().next() else {
            continue;
        };
        match attr.oid {
            oid::PKCS_9_AT_FRIENDLY_NAME => name = attribute_value_string(value),
            oid::PKCS_9_AT_LOCAL_KEY_ID if value.tag() == Tag::OctetString => {
                key_id = Some(value.value().to_vec());
            }
            _ => {}
        }
    }
    (name, key_id)
}

/// Encrypts with PBES2 using a fresh salt and IV.
fn pbes2_encrypt(
    plaintext: &[u8],
    passphrase: &str,
    iterations: u32,
) -> Result<(AlgorithmIdentifierOwned, Vec<u8>)> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; 16];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(iterations, &salt, &iv)?;
    let ciphertext = params.encrypt(passphrase, plaintext)?;
    let scheme = pkcs5::EncryptionScheme::from(params);
    let algorithm = AlgorithmIdentifierOwned::from_der(&scheme.to_der()?)?;
    Ok((algorithm, ciphertext))
}

fn decrypt_safe(content: &ContentInfo, passphrase: &str) -> Result<Zeroizing<Vec<u8>>> {
    let any = content
        .content
        .as_ref()
        .ok_or_else(|| ChainsmithError::DecodingError("empty encrypted safe".into()))?;
    let encrypted = EncryptedData::from_der(&any.to_der()?)?;
    let eci = encrypted.encrypted_content_info;
    let ciphertext = eci
        .encrypted_content
        .ok_or_else(|| ChainsmithError::DecodingError("encrypted safe has no content".into()))?;
    decrypt(
        &eci.content_encryption_algorithm,
        ciphertext.as_bytes(),
        passphrase,
    )
}

/// Decrypts PBES2 or `pbeWithSHAAnd3-KeyTripleDES-CBC` content.
fn decrypt(
    algorithm: &AlgorithmIdentifierOwned,
    ciphertext: &[u8],
    passphrase: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    match algorithm.oid {
        pbes2::PBES2_OID => {
            let der = algorithm.to_der()?;
            let scheme = pkcs5::EncryptionScheme::from_der(&der)?;
            scheme
                .decrypt(passphrase, ciphertext)
                .map(Zeroizing::new)
                .map_err(|_| ChainsmithError::DecryptionFailed)
        }
        oid::PBE_WITH_SHA_AND_3_KEY_TRIPLE_DES_CBC => {
            let params = algorithm
                .parameters
                .as_ref()
                .ok_or_else(|| ChainsmithError::DecodingError("missing PBE parameters".into()))?;
            let params = Pkcs12PbeParams::from_der(&params.to_der()?)?;
            let password = kdf::bmp_password(passphrase);
            let salt = params.salt.as_bytes();
            let key = kdf::derive::<sha1::Sha1>(&password, salt, kdf::ID_KEY, params.iterations, 24);
            let iv = kdf::derive::<sha1::Sha1>(&password, salt, kdf::ID_IV, params.iterations, 8);
            cbc::Decryptor::<des::TdesEde3>::new_from_slices(&key, &iv)
                .map_err(|e| ChainsmithError::DecodingError(e.to_string()))?
                .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                .map(Zeroizing::new)
                .map_err(|_| ChainsmithError::DecryptionFailed)
        }
        other => Err(ChainsmithError::UnsupportedParameter(format!(
            "content encryption {other}"
        ))),
    }
}

/// HMAC over `data`, keyed through the RFC 7292 KDF.
fn keyed_mac<D>(data: &[u8], passphrase: &str, salt: &[u8], iterations: u32) -> Result<SimpleHmac<D>>
where
    D: Digest + BlockSizeUser,
{
    let password = kdf::bmp_password(passphrase);
    let key = kdf::derive::<D>(&password, salt, kdf::ID_MAC, iterations, <D as Digest>::output_size());
    let mut mac = <SimpleHmac<D> as Mac>::new_from_slice(&key)
        .map_err(|e| ChainsmithError::EncodingError(e.to_string()))?;
    mac.update(data);
    Ok(mac)
}

fn compute_mac<D>(data: &[u8], passphrase: &str, salt: &[u8], iterations: u32) -> Result<Vec<u8>>
where
    D: Digest + BlockSizeUser,
{
    let mac = keyed_mac::<D>(data, passphrase, salt, iterations)?;
    Ok(mac.finalize().into_bytes().to_vec())
}

fn check_mac<D>(data: &[u8], passphrase: &str, mac_data: &MacData) -> Result<()>
where
    D: Digest + BlockSizeUser,
{
    let iterations = mac_data.iterations.unwrap_or(1);
    keyed_mac::<D>(data, passphrase, mac_data.mac_salt.as_bytes(), iterations)?
        .verify_slice(mac_data.mac.digest.as_bytes())
        .map_err(|_| {
            debug!("PKCS#12 MAC mismatch");
            ChainsmithError::DecryptionFailed
        })
}

fn verify_mac(mac_data: &MacData, data: &[u8], passphrase: &str) -> Result<()> {
    match mac_data.mac.digest_algorithm.oid {
        rfc5912::ID_SHA_1 => check_mac::<sha1::Sha1>(data, passphrase, mac_data),
        rfc5912::ID_SHA_256 => check_mac::<sha2::Sha256>(data, passphrase, mac_data),
        rfc5912::ID_SHA_384 => check_mac::<sha2::Sha384>(data, passphrase, mac_data),
        rfc5912::ID_SHA_512 => check_mac::<sha2::Sha512>(data, passphrase, mac_data),
        other => Err(ChainsmithError::UnsupportedParameter(format!(
            "MAC digest {other}"
        ))),
    }
}
