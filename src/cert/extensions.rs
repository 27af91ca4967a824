use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use const_oid::AssociatedOid;
use der::{
    Decode, Encode,
    asn1::{Ia5String, OctetString},
    oid::ObjectIdentifier,
};
use x509_cert::ext::pkix::name::GeneralName;

use crate::error::ChainsmithError;

/// Trait for converting to and from X.509 extensions.
///
/// This trait provides methods to encode and decode X.509 extension values.
///
/// # Example
/// ```
/// use chainsmith::cert::extensions::{SubjectAltName, ToAndFromX509Extension};
/// let san = SubjectAltName::from_strings(["example.com", "192.0.2.7"]);
/// let encoded = san.to_x509_extension_value().unwrap();
/// let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
/// assert_eq!(san, decoded);
/// ```
pub trait ToAndFromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_x509_extension_value(&self) -> Result<Vec<u8>, ChainsmithError>;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, ChainsmithError>
    where
        Self: Sized;
}

/// One identity in a Subject Alternative Name extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectAltNameEntry {
    DnsName(String),
    Ipv4Address(Ipv4Addr),
    Ipv6Address(Ipv6Addr),
}

impl SubjectAltNameEntry {
    /// Classifies a user supplied name: IP literals become address entries,
    /// anything else is a DNS name. Surrounding whitespace is ignored.
    pub fn classify(value: &str) -> Self {
        let value = value.trim();
        match value.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => SubjectAltNameEntry::Ipv4Address(ip),
            Ok(IpAddr::V6(ip)) => SubjectAltNameEntry::Ipv6Address(ip),
            Err(_) => SubjectAltNameEntry::DnsName(value.to_string()),
        }
    }

    fn to_general_name(&self) -> Result<GeneralName, ChainsmithError> {
        match self {
            SubjectAltNameEntry::DnsName(name) => Ia5String::try_from(name.clone())
                .map(GeneralName::DnsName)
                .map_err(|e| ChainsmithError::InvalidInput(format!("{name}: {e}"))),
            SubjectAltNameEntry::Ipv4Address(ip) => {
                Ok(GeneralName::IpAddress(OctetString::new(ip.octets().to_vec())?))
            }
            SubjectAltNameEntry::Ipv6Address(ip) => {
                Ok(GeneralName::IpAddress(OctetString::new(ip.octets().to_vec())?))
            }
        }
    }

    fn from_general_name(name: &GeneralName) -> Result<Self, ChainsmithError> {
        match name {
            GeneralName::DnsName(dns) => Ok(SubjectAltNameEntry::DnsName(dns.to_string())),
            GeneralName::IpAddress(octets) => match octets.as_bytes().len() {
                4 => {
                    let mut raw = [0u8; 4];
                    raw.copy_from_slice(octets.as_bytes());
                    Ok(SubjectAltNameEntry::Ipv4Address(Ipv4Addr::from(raw)))
                }
                16 => {
                    let mut raw = [0u8; 16];
                    raw.copy_from_slice(octets.as_bytes());
                    Ok(SubjectAltNameEntry::Ipv6Address(Ipv6Addr::from(raw)))
                }
                len => Err(ChainsmithError::DecodingError(format!(
                    "IP address SAN with {len} octets"
                ))),
            },
            _ => Err(ChainsmithError::InvalidInput(
                "Unsupported general name type".to_string(),
            )),
        }
    }
}

impl fmt::Display for SubjectAltNameEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectAltNameEntry::DnsName(name) => write!(f, "DNS:{name}"),
            SubjectAltNameEntry::Ipv4Address(ip) => write!(f, "IP:{ip}"),
            SubjectAltNameEntry::Ipv6Address(ip) => write!(f, "IP:{ip}"),
        }
    }
}

/// Represents the Subject Alternative Name (SAN) extension.
///
/// Entries keep insertion order and are not deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAltName {
    pub names: Vec<SubjectAltNameEntry>,
}

impl SubjectAltName {
    /// Builds the extension from raw strings, classifying each one.
    pub fn from_strings<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: values
                .into_iter()
                .map(|value| SubjectAltNameEntry::classify(value.as_ref()))
                .collect(),
        }
    }
}

impl ToAndFromX509Extension for SubjectAltName {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::SubjectAltName::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, ChainsmithError> {
        let san = x509_cert::ext::pkix::SubjectAltName(
            self.names
                .iter()
                .map(SubjectAltNameEntry::to_general_name)
                .collect::<Result<Vec<_>, _>>()?,
        );

        Ok(san.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, ChainsmithError> {
        let san = x509_cert::ext::pkix::SubjectAltName::from_der(extension)?;
        let names = san
            .0
            .iter()
            .map(SubjectAltNameEntry::from_general_name)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { names })
    }
}

pub use der::flagset::FlagSet;
use x509_cert::ext::pkix::KeyUsage as X509KeyUsage;
pub use x509_cert::ext::pkix::KeyUsages;

/// Represents the Key Usage extension.
///
/// This extension defines the purpose of the key contained in the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyUsage(pub FlagSet<KeyUsages>);

impl KeyUsage {
    /// digitalSignature and keyEncipherment, the usage requested for TLS server keys.
    pub fn tls_server() -> Self {
        KeyUsage(KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment)
    }
}

impl ToAndFromX509Extension for KeyUsage {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, ChainsmithError> {
        let ku = X509KeyUsage::from(self.0);
        Ok(ku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, ChainsmithError> {
        let ku = X509KeyUsage::from_der(extension)?;
        Ok(Self(ku.0))
    }
}

/// Represents the Extended Key Usage extension.
///
/// This extension indicates purposes for which the public key may be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtendedKeyUsage {
    pub usage: Vec<ExtendedKeyUsageOption>,
}

impl ToAndFromX509Extension for ExtendedKeyUsage {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::ExtendedKeyUsage::OID;

    fn to_x509_extension_value(&self) -> Result<Vec<u8>, ChainsmithError> {
        let oids: Vec<ObjectIdentifier> = self.usage.iter().map(|v| (*v).into()).collect();
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage(oids);
        Ok(eku.to_der()?)
    }

    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, ChainsmithError> {
        let eku = x509_cert::ext::pkix::ExtendedKeyUsage::from_der(extension)?;
        let usage = eku
            .0
            .iter()
            .map(|v| match *v {
                const_oid::db::rfc5912::ID_KP_OCSP_SIGNING => {
                    Ok(ExtendedKeyUsageOption::OcspSigning)
                }
                const_oid::db::rfc5912::ID_KP_SERVER_AUTH => Ok(ExtendedKeyUsageOption::ServerAuth),
                const_oid::db::rfc5912::ID_KP_CLIENT_AUTH => Ok(ExtendedKeyUsageOption::ClientAuth),
                const_oid::db::rfc5912::ID_KP_CODE_SIGNING => {
                    Ok(ExtendedKeyUsageOption::CodeSigning)
                }
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION => {
                    Ok(ExtendedKeyUsageOption::EmailProtection)
                }
                const_oid::db::rfc5912::ID_KP_TIME_STAMPING => {
                    Ok(ExtendedKeyUsageOption::TimeStamping)
                }
                _ => Err(ChainsmithError::InvalidInput(
                    "Unsupported extended key usage option".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { usage })
    }
}

/// Represents an option for the Extended Key Usage extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExtendedKeyUsageOption {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl From<ExtendedKeyUsageOption> for ObjectIdentifier {
    fn from(value: ExtendedKeyUsageOption) -> Self {
        match value {
            ExtendedKeyUsageOption::OcspSigning => const_oid::db::rfc5912::ID_KP_OCSP_SIGNING,
            ExtendedKeyUsageOption::ServerAuth => const_oid::db::rfc5912::ID_KP_SERVER_AUTH,
            ExtendedKeyUsageOption::ClientAuth => const_oid::db::rfc5912::ID_KP_CLIENT_AUTH,
            ExtendedKeyUsageOption::CodeSigning => const_oid::db::rfc5912::ID_KP_CODE_SIGNING,
            ExtendedKeyUsageOption::EmailProtection => {
                const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION
            }
            ExtendedKeyUsageOption::TimeStamping => const_oid::db::rfc5912::ID_KP_TIME_STAMPING,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn san_classification_is_value_driven() {
        let san = SubjectAltName::from_strings([" www.example.com ", "203.0.113.5", "2001:db8::1"]);
        assert_eq!(
            san.names,
            vec![
                SubjectAltNameEntry::DnsName("www.example.com".to_string()),
                SubjectAltNameEntry::Ipv4Address(Ipv4Addr::new(203, 0, 113, 5)),
                SubjectAltNameEntry::Ipv6Address("2001:db8::1".parse().unwrap()),
            ]
        );
    }

    #[test]
    fn san_keeps_order_and_duplicates() {
        let original = SubjectAltName::from_strings(["b.example", "a.example", "b.example"]);
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = SubjectAltName::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(decoded.names.len(), 3);
        assert_eq!(original, decoded);
    }

    #[test]
    fn san_rejects_non_ascii_dns_names() {
        let san = SubjectAltName::from_strings(["bücher.example"]);
        assert!(san.to_x509_extension_value().is_err());
    }

    #[test]
    fn test_key_usage_encoding_decoding() {
        let original = KeyUsage::tls_server();
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = KeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original, decoded);
        assert!(decoded.0.contains(KeyUsages::DigitalSignature));
        assert!(!decoded.0.contains(KeyUsages::KeyCertSign));
    }

    #[test]
    fn test_extended_key_usage_encoding_decoding() {
        let original = ExtendedKeyUsage {
            usage: vec![
                ExtendedKeyUsageOption::ServerAuth,
                ExtendedKeyUsageOption::ClientAuth,
            ],
        };
        let encoded = original.to_x509_extension_value().unwrap();
        let decoded = ExtendedKeyUsage::from_x509_extension_value(&encoded).unwrap();
        assert_eq!(original.usage, decoded.usage);
    }
}
