//! PEM helpers, including the best-effort certificate bundle codec.

use der::Decode;
use tracing::debug;
use x509_cert::certificate::CertificateInner;

use crate::cert::Certificate;
use crate::error::Result;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const CERTIFICATE_REQUEST_LABEL: &str = "CERTIFICATE REQUEST";

const BEGIN_MARKER: &str = "-----BEGIN CERTIFICATE-----";
const END_MARKER: &str = "-----END CERTIFICATE-----";

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(
        &pem,
        pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF),
    )
}

/// Convert a PEM‑encoded string to DER‑encoded bytes.
pub fn pem_to_der(pem_str: &str) -> Result<Vec<u8>> {
    let pem = pem::parse(pem_str)?;
    Ok(pem.contents().to_vec())
}

/// Decodes every well-formed certificate in a PEM bundle, in input order.
///
/// Blocks with bad base64 or a body that is not a certificate are dropped. Text
/// between blocks is ignored, and a BEGIN marker without a matching END marker
/// never yields a certificate. Invalid UTF-8 is replaced before scanning, which
/// only affects bytes outside of well-formed blocks.
///
/// # Example
/// ```
/// let certs = chainsmith::pem_utils::decode_all(b"not a certificate");
/// assert!(certs.is_empty());
/// ```
pub fn decode_all(input: &[u8]) -> Vec<Certificate> {
    let text = String::from_utf8_lossy(input);
    let terminated = text.matches(END_MARKER).count();
    let mut certificates = Vec::new();

    for (index, fragment) in text.split(END_MARKER).enumerate() {
        let Some(start) = fragment.rfind(BEGIN_MARKER) else {
            continue;
        };
        // The final fragment has no END marker after it, so its BEGIN is unterminated.
        if index == terminated {
            debug!(index, "dropping unterminated PEM block");
            continue;
        }

        let block = format!("{}{END_MARKER}\n", &fragment[start..]);
        match decode_block(&block) {
            Ok(cert) => certificates.push(cert),
            Err(e) => debug!(index, error = %e, "dropping malformed PEM block"),
        }
    }

    certificates
}

fn decode_block(block: &str) -> Result<Certificate> {
    let parsed = pem::parse(block)?;
    let inner = CertificateInner::from_der(parsed.contents())?;
    Ok(Certificate { inner })
}

/// Encodes certificates as consecutive `CERTIFICATE` blocks with LF line endings.
///
/// An empty slice encodes to an empty string.
pub fn encode_all(certificates: &[Certificate]) -> Result<String> {
    let mut out = String::new();
    for cert in certificates {
        out.push_str(&der_to_pem(&cert.to_der()?, CERTIFICATE_LABEL));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_decodes_to_nothing() {
        assert!(decode_all(b"").is_empty());
        assert!(decode_all(&[0xff, 0xfe, 0x00, 0x13]).is_empty());
        assert!(decode_all(b"-----BEGIN CERTIFICATE-----\nAAAA\n").is_empty());
        assert!(
            decode_all(b"-----BEGIN CERTIFICATE-----\n!!!!\n-----END CERTIFICATE-----\n")
                .is_empty()
        );
    }

    #[test]
    fn empty_slice_encodes_to_empty_string() {
        assert_eq!(encode_all(&[]).unwrap(), "");
    }

    #[test]
    fn der_to_pem_uses_lf() {
        let pem = der_to_pem(&[1, 2, 3], "TEST");
        assert!(pem.starts_with("-----BEGIN TEST-----\n"));
        assert!(!pem.contains('\r'));
        assert_eq!(pem_to_der(&pem).unwrap(), vec![1, 2, 3]);
    }
}
