//! GPG key identity derivation
//!
//! Key IDs are never accepted from clients. They are computed from the
//! ASCII-armored public key itself: the primary key packet is decoded, its
//! v4 fingerprint is computed, and the last 8 bytes of the fingerprint,
//! upper-case hex encoded, form the key ID.
//!
//! Malformed input is reported as [`RegistryError::InvalidKey`].

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::{RegistryError, Result};

const ARMOR_BEGIN: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----";
const ARMOR_END: &str = "-----END PGP PUBLIC KEY BLOCK-----";

/// Packet tag of a public key packet
const TAG_PUBLIC_KEY: u8 = 6;

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// Identity of a primary public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyIdentity {
    /// Full fingerprint, upper-case hex
    pub fingerprint: String,
    /// Last 8 bytes of the fingerprint, upper-case hex
    pub key_id: String,
}

impl KeyIdentity {
    /// Derive the identity of the primary key in an armored block
    pub fn from_armor(ascii_armor: &str) -> Result<Self> {
        let data = dearmor(ascii_armor)?;
        let body = primary_key_body(&data)?;
        Self::from_key_body(body)
    }

    fn from_key_body(body: &[u8]) -> Result<Self> {
        match body.first() {
            Some(4) => {}
            Some(v) => {
                return Err(invalid(format!("unsupported key packet version {}", v)));
            }
            None => return Err(invalid("empty public key packet")),
        }

        let len = u16::try_from(body.len())
            .map_err(|_| invalid("public key packet too large"))?;

        let mut hasher = Sha1::new();
        hasher.update([0x99]);
        hasher.update(len.to_be_bytes());
        hasher.update(body);
        let fingerprint = hasher.finalize();

        Ok(Self {
            fingerprint: to_upper_hex(&fingerprint),
            key_id: to_upper_hex(&fingerprint[fingerprint.len() - 8..]),
        })
    }
}

/// Derive the key ID of the primary key in an armored block
pub fn key_id_from_armor(ascii_armor: &str) -> Result<String> {
    KeyIdentity::from_armor(ascii_armor).map(|identity| identity.key_id)
}

/// Wrap a binary key packet sequence in an ASCII armor block
pub fn armor_public_key(packets: &[u8]) -> String {
    let encoded = STANDARD.encode(packets);
    let mut out = String::with_capacity(encoded.len() + 128);
    out.push_str(ARMOR_BEGIN);
    out.push_str("\n\n");
    for line in encoded.as_bytes().chunks(64) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    let crc = crc24(packets).to_be_bytes();
    out.push('=');
    out.push_str(&STANDARD.encode(&crc[1..]));
    out.push('\n');
    out.push_str(ARMOR_END);
    out.push('\n');
    out
}

fn dearmor(ascii_armor: &str) -> Result<Vec<u8>> {
    let mut lines = ascii_armor
        .lines()
        .map(str::trim)
        .skip_while(|line| *line != ARMOR_BEGIN);

    if lines.next().is_none() {
        return Err(invalid("missing armor header line"));
    }

    let mut in_headers = true;
    let mut body = String::new();
    let mut checksum = None;
    let mut terminated = false;

    for line in lines {
        if line == ARMOR_END {
            terminated = true;
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if line.contains(": ") {
                continue;
            }
            in_headers = false;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(crc) = line.strip_prefix('=') {
            checksum = Some(crc.to_string());
            continue;
        }
        body.push_str(line);
    }

    if !terminated {
        return Err(invalid("missing armor tail line"));
    }

    let data = STANDARD
        .decode(body.as_bytes())
        .map_err(|e| invalid(format!("armor body is not valid base64: {}", e)))?;

    if data.is_empty() {
        return Err(invalid("armor body is empty"));
    }

    if let Some(crc) = checksum {
        let expected = STANDARD
            .decode(crc.as_bytes())
            .map_err(|e| invalid(format!("armor checksum is not valid base64: {}", e)))?;
        let actual = crc24(&data).to_be_bytes();
        if expected.as_slice() != &actual[1..] {
            return Err(invalid("armor checksum mismatch"));
        }
    }

    Ok(data)
}

/// Body of the first packet, which must be a public key packet
fn primary_key_body(data: &[u8]) -> Result<&[u8]> {
    let header = data[0];
    if header & 0x80 == 0 {
        return Err(invalid("first byte is not a packet header"));
    }

    let (tag, len, offset) = if header & 0x40 != 0 {
        let tag = header & 0x3f;
        let (len, used) = new_format_length(&data[1..])?;
        (tag, len, 1 + used)
    } else {
        let tag = (header >> 2) & 0x0f;
        match header & 0x03 {
            0 => (tag, read_be(data, 1, 1)?, 2),
            1 => (tag, read_be(data, 1, 2)?, 3),
            2 => (tag, read_be(data, 1, 4)?, 5),
            _ => (tag, data.len() - 1, 1),
        }
    };

    if tag != TAG_PUBLIC_KEY {
        return Err(invalid(format!(
            "expected public key packet, found tag {}",
            tag
        )));
    }

    data.get(offset..offset + len)
        .ok_or_else(|| invalid("public key packet is truncated"))
}

fn new_format_length(data: &[u8]) -> Result<(usize, usize)> {
    let first = *data.first().ok_or_else(|| invalid("missing packet length"))? as usize;
    match first {
        0..=191 => Ok((first, 1)),
        192..=223 => {
            let second = *data.get(1).ok_or_else(|| invalid("missing packet length"))? as usize;
            Ok((((first - 192) << 8) + second + 192, 2))
        }
        255 => Ok((read_be(data, 1, 4)?, 5)),
        _ => Err(invalid("partial body lengths are not valid for key packets")),
    }
}

fn read_be(data: &[u8], offset: usize, width: usize) -> Result<usize> {
    let bytes = data
        .get(offset..offset + width)
        .ok_or_else(|| invalid("packet header is truncated"))?;
    Ok(bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize))
}

fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for byte in data {
        crc ^= (*byte as u32) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

fn to_upper_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}

fn invalid(message: impl Into<String>) -> RegistryError {
    RegistryError::InvalidKey(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Ed25519 key exported by `gpg --armor --export`
    const ED25519_ARMOR: &str = "-----BEGIN PGP PUBLIC KEY BLOCK-----

mDMEatXVLhYJKwYBBAHaRw8BAQdAWzRx2HxTQUC3aEVHs/aB/a61uR8dUj8FevSQ
mJS2Any0HUFjbWUgVGVzdCA8dGVzdEBhY21lLmV4YW1wbGU+iJAEExYIADgWIQRu
XyXZ5TYcbxNdwkqQXA1tfQ5uHQUCatXVLgIbAwULCQgHAgYVCgkICwIEFgIDAQIe
AQIXgAAKCRCQXA1tfQ5uHU7zAQCz7s8p//EuB3NHIgZuKyJBjCu8/TjtX/wEtp+z
VPCkHQD7Bb1ERCWWhsjTwtiomHnwj2wlbEV1QE9hxP66aZS8/A4=
=Xal4
-----END PGP PUBLIC KEY BLOCK-----
";

    #[test]
    fn test_key_id_matches_gpg() {
        let identity = KeyIdentity::from_armor(ED25519_ARMOR).unwrap();
        assert_eq!(
            identity.fingerprint,
            "6E5F25D9E5361C6F135DC24A905C0D6D7D0E6E1D"
        );
        assert_eq!(identity.key_id, "905C0D6D7D0E6E1D");
    }

    #[test]
    fn test_key_id_is_deterministic() {
        let first = key_id_from_armor(ED25519_ARMOR).unwrap();
        let second = key_id_from_armor(ED25519_ARMOR).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_armor_headers_and_surrounding_text_ignored() {
        let with_headers = ED25519_ARMOR.replacen(
            "-----\n\n",
            "-----\nVersion: GnuPG v2\nComment: test key\n\n",
            1,
        );
        let wrapped = format!("signing key follows\n{}\ntrailing", with_headers);
        assert_eq!(key_id_from_armor(&wrapped).unwrap(), "905C0D6D7D0E6E1D");
    }

    #[test]
    fn test_checksum_line_optional() {
        let without_crc = ED25519_ARMOR.replace("=Xal4\n", "");
        assert_eq!(key_id_from_armor(&without_crc).unwrap(), "905C0D6D7D0E6E1D");
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let bad_crc = ED25519_ARMOR.replace("=Xal4", "=AAAA");
        let err = key_id_from_armor(&bad_crc).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_round_trip_through_armor() {
        let mut body = vec![4, 0x65, 0x00, 0x00, 0x00, 1];
        body.extend_from_slice(&[0x00, 0x08, 0xC5]);
        body.extend_from_slice(&[0x00, 0x02, 0x03]);
        let mut packet = vec![0xC6, body.len() as u8];
        packet.extend_from_slice(&body);

        let armored = armor_public_key(&packet);
        let identity = KeyIdentity::from_armor(&armored).unwrap();
        assert_eq!(identity.key_id.len(), 16);
        assert!(identity.fingerprint.ends_with(&identity.key_id));
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        for input in [
            "",
            "not a key",
            "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\n!!!!\n-----END PGP PUBLIC KEY BLOCK-----",
            "-----BEGIN PGP PUBLIC KEY BLOCK-----\n\nmDME\n",
        ] {
            let err = key_id_from_armor(input).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidKey(_)), "{input:?}");
        }
    }

    #[test]
    fn test_non_key_packet_rejected() {
        // user id packet (tag 13)
        let armored = armor_public_key(&[0xCD, 0x03, b'a', b'b', b'c']);
        assert!(key_id_from_armor(&armored).is_err());
    }

    #[test]
    fn test_truncated_packet_rejected() {
        let armored = armor_public_key(&[0xC6, 0x20, 4, 0, 0]);
        assert!(key_id_from_armor(&armored).is_err());
    }

    #[test]
    fn test_v3_key_rejected() {
        let armored = armor_public_key(&[0xC6, 0x03, 3, 0, 0]);
        let err = key_id_from_armor(&armored).unwrap_err();
        assert!(err.to_string().contains("unsupported key packet version"));
    }
}
