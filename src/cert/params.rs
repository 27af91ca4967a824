use bon::Builder;
use const_oid::ObjectIdentifier;
use const_oid::db::{rfc3280, rfc4519};
use der::asn1::{Any, Ia5StringRef, OctetString, PrintableStringRef, SetOfVec, Utf8StringRef};
use der::{Tag, Tagged};
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::ext::Extension;
use x509_cert::name::{Name, RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsage;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::error::{ChainsmithError, Result};

/// Common name used when every distinguished name field is empty.
pub const DEFAULT_COMMON_NAME: &str = "default";

/// Distinguished name parameters for a certification request subject.
///
/// Every field is optional. Empty or absent fields are left out of the encoded
/// name, and a name with no fields at all is encoded as `CN=default`.
///
/// # Fields
/// * `common_name` - The common name (CN).
/// * `country` - The country (C), encoded as a PrintableString.
/// * `state` - The state or province (ST).
/// * `locality` - The locality or city (L).
/// * `organization` - The organization (O).
/// * `organization_unit` - The organizational unit (OU).
/// * `email` - The PKCS#9 email address, encoded as an IA5String.
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    pub common_name: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
    pub organization: Option<String>,
    pub organization_unit: Option<String>,
    pub email: Option<String>,
}

impl DistinguishedName {
    /// Fields in encoding order, paired with their attribute type.
    fn attributes(&self) -> [(ObjectIdentifier, Option<&str>); 7] {
        [
            (rfc4519::COUNTRY_NAME, self.country.as_deref()),
            (rfc4519::ST, self.state.as_deref()),
            (rfc4519::LOCALITY_NAME, self.locality.as_deref()),
            (rfc4519::ORGANIZATION_NAME, self.organization.as_deref()),
            (rfc4519::ORGANIZATIONAL_UNIT_NAME, self.organization_unit.as_deref()),
            (rfc4519::COMMON_NAME, self.common_name.as_deref()),
            (rfc3280::EMAIL_ADDRESS, self.email.as_deref()),
        ]
    }

    /// Returns true when no field carries a non-empty value.
    pub fn is_empty(&self) -> bool {
        self.attributes()
            .iter()
            .all(|(_, value)| value.is_none_or(str::is_empty))
    }

    /// Converts the distinguished name to an X.509 name, one RDN per present field.
    ///
    /// # Returns
    /// An `x509_cert::name::Name`, never empty.
    pub fn as_x509_name(&self) -> Result<Name> {
        let mut rdns = Vec::new();

        for (attr_oid, value) in self.attributes() {
            match value {
                Some(value) if !value.is_empty() => rdns.push(single_rdn(attr_oid, value)?),
                _ => {}
            }
        }

        if rdns.is_empty() {
            rdns.push(single_rdn(rfc4519::COMMON_NAME, DEFAULT_COMMON_NAME)?);
        }

        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 name.
    ///
    /// Attributes outside the supported set are ignored. When an attribute type
    /// repeats, the last value wins.
    pub fn from_x509_name(x509dn: &Name) -> Self {
        let mut dn = DistinguishedName::default();

        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(value) = attribute_value_string(&attr.value) else {
                    continue;
                };
                let slot = match attr.oid {
                    rfc4519::COMMON_NAME => &mut dn.common_name,
                    rfc4519::COUNTRY_NAME => &mut dn.country,
                    rfc4519::ST => &mut dn.state,
                    rfc4519::LOCALITY_NAME => &mut dn.locality,
                    rfc4519::ORGANIZATION_NAME => &mut dn.organization,
                    rfc4519::ORGANIZATIONAL_UNIT_NAME => &mut dn.organization_unit,
                    rfc3280::EMAIL_ADDRESS => &mut dn.email,
                    _ => continue,
                };
                *slot = Some(value);
            }
        }

        dn
    }
}

fn single_rdn(attr_oid: ObjectIdentifier, value: &str) -> Result<RelativeDistinguishedName> {
    let encoded = match attr_oid {
        rfc4519::COUNTRY_NAME => Any::encode_from(&PrintableStringRef::new(value)?)?,
        rfc3280::EMAIL_ADDRESS => Any::encode_from(&Ia5StringRef::new(value)?)?,
        _ => Any::encode_from(&Utf8StringRef::new(value)?)?,
    };

    let atv = AttributeTypeAndValue {
        oid: attr_oid,
        value: encoded,
    };

    Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
}

/// Decodes a directory string attribute value into UTF-8.
pub(crate) fn attribute_value_string(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::VisibleString => std::str::from_utf8(value.value()).ok().map(str::to_owned),
        Tag::BmpString => {
            let units = value
                .value()
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units).collect::<std::result::Result<String, _>>().ok()
        }
        _ => None,
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: &E, critical: bool) -> Result<Self> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        if self.oid != E::OID {
            return Err(ChainsmithError::InvalidInput(format!(
                "extension {} is not {}",
                self.oid,
                E::OID
            )));
        }
        E::from_x509_extension_value(&self.value)
    }

    /// Converts into the `x509_cert` representation used on the wire.
    pub fn to_x509_extension(&self) -> Result<Extension> {
        Ok(Extension {
            extn_id: self.oid,
            critical: self.critical,
            extn_value: OctetString::new(self.value.clone())?,
        })
    }
}

impl From<&Extension> for ExtensionParam {
    fn from(ext: &Extension) -> Self {
        Self {
            oid: ext.extn_id,
            critical: ext.critical,
            value: ext.extn_value.as_bytes().to_vec(),
        }
    }
}
