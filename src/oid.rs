//! Object identifiers that `const_oid::db` does not carry.
//!
//! Everything else (name attributes, key and signature algorithms, digests,
//! CMS content types) comes from `const_oid::db::{rfc3280, rfc4519, rfc5911, rfc5912}`.

use const_oid::ObjectIdentifier;

/// pkcs-9-at-friendlyName in RFC 2985
pub const PKCS_9_AT_FRIENDLY_NAME: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.20");
/// pkcs-9-at-localKeyId in RFC 2985
pub const PKCS_9_AT_LOCAL_KEY_ID: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.21");
/// x509Certificate cert type in RFC 7292
pub const PKCS_9_CERT_TYPE_X509: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.22.1");

// ecdsa-with-SHA1, RFC 3279
pub const ECDSA_WITH_SHA1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.1");

// PKCS#12 bag types, RFC 7292 section 4.2
pub const PKCS_12_KEY_BAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.1");
pub const PKCS_12_PKCS8_SHROUDED_KEY_BAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.2");
pub const PKCS_12_CERT_BAG: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.10.1.3");

// pbeWithSHAAnd3-KeyTripleDES-CBC, RFC 7292 appendix C
pub const PBE_WITH_SHA_AND_3_KEY_TRIPLE_DES_CBC: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.12.1.3");
