//! Sources of issuer certificates for chain resolution.

use tracing::{debug, warn};
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::error::{ChainsmithError, Result};
use crate::pem_utils;

/// A queryable collection of trusted certificates.
///
/// Implementations return `TrustStoreUnavailable` when they cannot be queried.
/// Callers resolving chains treat that the same as an empty result.
pub trait TrustStore {
    /// Every trusted root certificate.
    fn list_trusted_roots(&self) -> Result<Vec<Certificate>>;

    /// Certificates whose subject equals `name`, in store order.
    fn find_by_subject(&self, name: &Name) -> Result<Vec<Certificate>>;
}

impl<T: TrustStore + ?Sized> TrustStore for &T {
    fn list_trusted_roots(&self) -> Result<Vec<Certificate>> {
        (**self).list_trusted_roots()
    }

    fn find_by_subject(&self, name: &Name) -> Result<Vec<Certificate>> {
        (**self).find_by_subject(name)
    }
}

impl<T: TrustStore + ?Sized> TrustStore for Box<T> {
    fn list_trusted_roots(&self) -> Result<Vec<Certificate>> {
        (**self).list_trusted_roots()
    }

    fn find_by_subject(&self, name: &Name) -> Result<Vec<Certificate>> {
        (**self).find_by_subject(name)
    }
}

/// A trust store held in memory.
///
/// Lookups search intermediate CAs first and roots second, each in insertion order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTrustStore {
    roots: Vec<Certificate>,
    intermediates: Vec<Certificate>,
}

impl InMemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store whose roots are every certificate in a PEM bundle.
    pub fn from_pem(bundle: &[u8]) -> Self {
        let mut store = Self::new();
        for cert in pem_utils::decode_all(bundle) {
            store.add_root(cert);
        }
        store
    }

    pub fn add_root(&mut self, cert: Certificate) -> &mut Self {
        self.roots.push(cert);
        self
    }

    pub fn add_intermediate(&mut self, cert: Certificate) -> &mut Self {
        self.intermediates.push(cert);
        self
    }

    pub fn len(&self) -> usize {
        self.roots.len() + self.intermediates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TrustStore for InMemoryTrustStore {
    fn list_trusted_roots(&self) -> Result<Vec<Certificate>> {
        Ok(self.roots.clone())
    }

    fn find_by_subject(&self, name: &Name) -> Result<Vec<Certificate>> {
        Ok(self
            .intermediates
            .iter()
            .chain(self.roots.iter())
            .filter(|cert| cert.subject() == name)
            .cloned()
            .collect())
    }
}

/// The operating system's trust anchors.
///
/// Certificates are loaded once through `rustls-native-certs`, which reads the
/// platform root store only: the Windows ROOT store, the macOS trust settings or
/// the Unix CA bundle. Intermediate CA stores are not searched, so intermediates
/// must arrive with the resolver input or through an [`InMemoryTrustStore`].
///
/// A store that loaded nothing reports `TrustStoreUnavailable` on every query.
#[derive(Debug, Clone, Default)]
pub struct SystemTrustStore {
    certificates: Vec<Certificate>,
}

impl SystemTrustStore {
    /// Loads the platform store. Load errors are logged, never returned.
    pub fn load() -> Self {
        let loaded = rustls_native_certs::load_native_certs();
        for err in &loaded.errors {
            warn!("certificate load error: {}", err);
        }

        let mut certificates = Vec::with_capacity(loaded.certs.len());
        for der in &loaded.certs {
            match Certificate::from_der(der.as_ref()) {
                Ok(cert) => certificates.push(cert),
                Err(e) => debug!(error = %e, "skipping undecodable system certificate"),
            }
        }

        if certificates.is_empty() {
            warn!(
                load_errors = loaded.errors.len(),
                "no usable certificates in the system store"
            );
        } else {
            debug!("loaded {} system certificates", certificates.len());
        }
        Self { certificates }
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    fn certificates(&self) -> Result<&[Certificate]> {
        if self.certificates.is_empty() {
            return Err(ChainsmithError::TrustStoreUnavailable(
                "system store holds no usable certificates".to_string(),
            ));
        }
        Ok(&self.certificates)
    }
}

impl TrustStore for SystemTrustStore {
    fn list_trusted_roots(&self) -> Result<Vec<Certificate>> {
        Ok(self
            .certificates()?
            .iter()
            .filter(|cert| cert.is_self_issued())
            .cloned()
            .collect())
    }

    fn find_by_subject(&self, name: &Name) -> Result<Vec<Certificate>> {
        Ok(self
            .certificates()?
            .iter()
            .filter(|cert| cert.subject() == name)
            .cloned()
            .collect())
    }
}

/// A store that can never be queried.
#[derive(Debug, Clone, Default)]
pub struct UnavailableTrustStore;

impl TrustStore for UnavailableTrustStore {
    fn list_trusted_roots(&self) -> Result<Vec<Certificate>> {
        Err(ChainsmithError::TrustStoreUnavailable(
            "no trust store configured".to_string(),
        ))
    }

    fn find_by_subject(&self, _name: &Name) -> Result<Vec<Certificate>> {
        Err(ChainsmithError::TrustStoreUnavailable(
            "no trust store configured".to_string(),
        ))
    }
}
