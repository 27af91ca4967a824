//! End-to-end artifact flows: a key with its request, a full-chain file, and a
//! PFX built from PEM inputs.
//!
//! Nothing here touches the filesystem. The file name constants are the names the
//! artifacts are conventionally saved under.

use tracing::info;
use zeroize::Zeroizing;

use crate::cert::params::DistinguishedName;
use crate::chain::{ChainResolver, ResolvedChain};
use crate::csr::build_request;
use crate::error::{ChainsmithError, Result};
use crate::key::{KeyKind, KeyPair};
use crate::pem_utils;
use crate::pkcs12::{Pkcs12Options, build_pkcs12_with_options};
use crate::trust_store::TrustStore;

pub const PRIVATE_KEY_FILE: &str = "private_key.pem";
pub const CSR_FILE: &str = "csr.pem";
pub const FULL_CHAIN_FILE: &str = "FullChain.cer";
pub const CERTIFICATE_PFX_FILE: &str = "Certificate.pfx";
pub const FULL_CHAIN_PFX_FILE: &str = "FullChain-pfx.pfx";

/// Generates a fresh key pair of the requested kind.
///
/// # Errors
/// `UnsupportedParameter` for sizes or curves outside the supported set.
pub fn generate_keypair(kind: KeyKind) -> Result<KeyPair> {
    KeyPair::generate(kind)
}

/// Splits free-form SAN input into entries, one per line or comma-separated.
///
/// ```
/// use chainsmith::bundle::parse_san_lines;
///
/// let sans = parse_san_lines("www.example.com\n 203.0.113.5, api.example.com\n\n");
/// assert_eq!(sans, ["www.example.com", "203.0.113.5", "api.example.com"]);
/// ```
pub fn parse_san_lines(input: &str) -> Vec<String> {
    input
        .split(['\n', ','])
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_owned)
        .collect()
}

/// A new key and the request signed by it.
pub struct CsrBundle {
    pub key_pair: KeyPair,
    /// Encrypted when a passphrase was given.
    pub private_key_pem: Zeroizing<String>,
    pub csr_pem: String,
}

impl std::fmt::Debug for CsrBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrBundle")
            .field("key_pair", &self.key_pair)
            .field("csr_pem", &self.csr_pem)
            .finish_non_exhaustive()
    }
}

/// Generates a key pair and a request for it, both PEM encoded.
///
/// An empty passphrase writes the key unencrypted.
pub fn generate_csr_bundle(
    kind: KeyKind,
    subject: &DistinguishedName,
    sans: &[String],
    passphrase: Option<&str>,
) -> Result<CsrBundle> {
    let key_pair = generate_keypair(kind)?;
    let csr = build_request(&key_pair, subject, sans)?;
    let private_key_pem = key_pair.export_private_key(passphrase)?;
    let csr_pem = csr.to_pem()?;

    info!(
        %kind,
        encrypted = passphrase.is_some_and(|p| !p.is_empty()),
        "generated key and request"
    );
    Ok(CsrBundle {
        key_pair,
        private_key_pem,
        csr_pem,
    })
}

/// A resolved chain and its PEM rendering, leaf first.
#[derive(Debug, Clone)]
pub struct FullChain {
    pub chain: ResolvedChain,
    pub pem: String,
}

/// Resolves the chain above a PEM certificate and renders it as one PEM file.
///
/// # Errors
/// `NoCertificateFound` when `leaf_pem` holds no certificate.
pub fn build_full_chain<S: TrustStore>(leaf_pem: &[u8], store: S) -> Result<FullChain> {
    let chain = ChainResolver::new(store).resolve(leaf_pem)?;
    let pem = chain.to_pem()?;
    Ok(FullChain { chain, pem })
}

/// Builds a PFX from a PEM private key and a PEM certificate file.
///
/// The first certificate in `chain_pem` is the leaf; the rest are CA certificates
/// kept in file order.
///
/// # Errors
/// * `MissingPassphrase` when `pfx_passphrase` is empty.
/// * `DecryptionFailed` when the key is encrypted and `key_passphrase` is wrong or
///   missing.
/// * `NoCertificateFound` when `chain_pem` holds no certificate.
pub fn pfx_from_pem(
    key_pem: &str,
    key_passphrase: Option<&str>,
    chain_pem: &[u8],
    pfx_passphrase: &str,
    options: &Pkcs12Options,
) -> Result<Vec<u8>> {
    if pfx_passphrase.is_empty() {
        return Err(ChainsmithError::MissingPassphrase);
    }
    let key = KeyPair::from_pem(key_pem, key_passphrase)?;

    let certificates = pem_utils::decode_all(chain_pem);
    let (leaf, cas) = certificates
        .split_first()
        .ok_or(ChainsmithError::NoCertificateFound)?;

    build_pkcs12_with_options(&key, leaf, cas, pfx_passphrase, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn san_lines_accept_mixed_separators() {
        assert!(parse_san_lines("  \n,\n").is_empty());
        assert_eq!(
            parse_san_lines("a.example\r\nb.example"),
            ["a.example", "b.example"]
        );
    }

    #[test]
    fn pfx_requires_passphrase_before_anything_else() {
        let err = pfx_from_pem("not a key", None, b"", "", &Pkcs12Options::default());
        assert!(matches!(err, Err(ChainsmithError::MissingPassphrase)));
    }
}
