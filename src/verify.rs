//! Checks whether one certificate's signature was produced by another's key.
//!
//! The issuer's key type decides the scheme: RSA keys verify PKCS#1 v1.5
//! signatures and EC keys verify DER-encoded ECDSA signatures. The hash is the
//! one declared by the child's signature algorithm. Every failure, including an
//! unparseable key or an undeclared hash, is reported as `false`.

use ecdsa::signature::hazmat::PrehashVerifier;
use tracing::debug;

use crate::cert::{Certificate, SignatureAlgorithm};
use crate::key::{P384_FIELD_BYTES, P521_FIELD_BYTES, PublicKey, pad_prehash};

/// Returns true when `child`'s signature verifies under `issuer`'s public key.
pub fn verifies(child: &Certificate, issuer: &Certificate) -> bool {
    let Some(algorithm) = child.signature_algorithm() else {
        debug!(
            oid = %child.inner.signature_algorithm.oid,
            "unknown signature algorithm"
        );
        return false;
    };
    let public_key = match issuer.public_key() {
        Ok(key) => key,
        Err(e) => {
            debug!(error = %e, "issuer public key unusable");
            return false;
        }
    };
    let Ok(tbs) = child.tbs_bytes() else {
        return false;
    };

    verify_signature(&public_key, algorithm, &tbs, child.signature_bytes())
}

/// Verifies `signature` over `message` with `public_key`, hashing with the hash
/// `algorithm` declares.
pub fn verify_signature(
    public_key: &PublicKey,
    algorithm: SignatureAlgorithm,
    message: &[u8],
    signature: &[u8],
) -> bool {
    let Some(hash) = algorithm.hash() else {
        debug!(?algorithm, "signature algorithm declares no usable hash");
        return false;
    };
    let prehash = hash.digest(message);

    match public_key {
        PublicKey::Rsa(key) => key.verify(hash.pkcs1v15(), &prehash, signature).is_ok(),
        PublicKey::EcdsaP256(key) => p256::ecdsa::Signature::from_der(signature)
            .is_ok_and(|sig| key.verify_prehash(&prehash, &sig).is_ok()),
        PublicKey::EcdsaP384(key) => {
            let prehash = pad_prehash(&prehash, P384_FIELD_BYTES);
            p384::ecdsa::Signature::from_der(signature)
                .is_ok_and(|sig| key.verify_prehash(&prehash, &sig).is_ok())
        }
        PublicKey::EcdsaP521(key) => {
            let prehash = pad_prehash(&prehash, P521_FIELD_BYTES);
            let key = p521::ecdsa::VerifyingKey::from(*key);
            p521::ecdsa::Signature::from_der(signature)
                .is_ok_and(|sig| key.verify_prehash(&prehash, &sig).is_ok())
        }
    }
}
