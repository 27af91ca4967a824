//! Password based key derivation from RFC 7292, Appendix B.2.
//!
//! Used for the integrity MAC key and for the legacy
//! `pbeWithSHAAnd3-KeyTripleDES-CBC` scheme. PBES2 content uses PBKDF2 instead.

use digest::Digest;
use digest::core_api::BlockSizeUser;
use zeroize::Zeroizing;

/// Diversifier for cipher keys.
pub const ID_KEY: u8 = 1;
/// Diversifier for cipher IVs.
pub const ID_IV: u8 = 2;
/// Diversifier for MAC keys.
pub const ID_MAC: u8 = 3;

/// Encodes a passphrase as a NUL-terminated big-endian BMPString.
pub fn bmp_password(passphrase: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(passphrase.len() * 2 + 2));
    for unit in passphrase.encode_utf16() {
        out.extend_from_slice(&unit.to_be_bytes());
    }
    out.extend_from_slice(&[0, 0]);
    out
}

/// Repeats `input` to fill the smallest multiple of `v` that holds it.
fn stretch(input: &[u8], v: usize) -> Vec<u8> {
    if input.is_empty() {
        return Vec::new();
    }
    let len = v * input.len().div_ceil(v);
    input.iter().copied().cycle().take(len).collect()
}

/// Derives `len` bytes from a BMP-encoded `password`.
pub fn derive<D>(password: &[u8], salt: &[u8], id: u8, iterations: u32, len: usize) -> Zeroizing<Vec<u8>>
where
    D: Digest + BlockSizeUser,
{
    let v = D::block_size();
    let u = <D as Digest>::output_size();

    let diversifier = vec![id; v];
    let mut i_block = Zeroizing::new(stretch(salt, v));
    i_block.extend_from_slice(&stretch(password, v));

    let mut out = Zeroizing::new(Vec::with_capacity(len.div_ceil(u) * u));
    loop {
        let mut hasher = D::new();
        hasher.update(&diversifier);
        hasher.update(i_block.as_slice());
        let mut a = hasher.finalize();
        for _ in 1..iterations.max(1) {
            a = D::digest(&a);
        }
        out.extend_from_slice(&a);
        if out.len() >= len {
            break;
        }

        // I_j = (I_j + B + 1) mod 2^(8v), with B = A repeated to v bytes
        let b: Vec<u8> = a.iter().copied().cycle().take(v).collect();
        for chunk in i_block.chunks_mut(v) {
            let mut carry = 1u16;
            for (x, y) in chunk.iter_mut().zip(b.iter()).rev() {
                let sum = *x as u16 + *y as u16 + carry;
                *x = sum as u8;
                carry = sum >> 8;
            }
        }
    }

    out.truncate(len);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::Sha1;
    use sha2::{Sha256, Sha512};

    #[test]
    fn bmp_password_is_nul_terminated_utf16be() {
        assert_eq!(bmp_password("").as_slice(), &[0, 0]);
        assert_eq!(
            bmp_password("smeg").as_slice(),
            &[0, b's', 0, b'm', 0, b'e', 0, b'g', 0, 0]
        );
    }

    #[test]
    fn sha1_triple_des_vectors() {
        let password = bmp_password("smeg");
        let salt = hex::decode("0A58CF64530D823F").unwrap();

        let key = derive::<Sha1>(&password, &salt, ID_KEY, 1, 24);
        assert_eq!(
            hex::encode_upper(key.as_slice()),
            "8AAAE6297B6CB04642AB5B077851284EB7128F1A2A7FBCA3"
        );

        let iv = derive::<Sha1>(&password, &salt, ID_IV, 1, 8);
        assert_eq!(hex::encode_upper(iv.as_slice()), "79993DFE048D3B76");
    }

    #[test]
    fn diversifier_and_length_behave() {
        let password = bmp_password("correct");
        let salt = [7u8; 16];

        let mac = derive::<Sha256>(&password, &salt, ID_MAC, 2048, 32);
        let key = derive::<Sha256>(&password, &salt, ID_KEY, 2048, 32);
        assert_ne!(mac, key);

        let short = derive::<Sha512>(&password, &salt, ID_KEY, 3, 16);
        let long = derive::<Sha512>(&password, &salt, ID_KEY, 3, 200);
        assert_eq!(long.len(), 200);
        assert_eq!(&long[..16], short.as_slice());
    }
}
