//! The trailing metadata section the compiler appends to runtime bytecode:
//! a CBOR map followed by a two-byte big-endian length of that map.

use minicbor::data::Type;

/// One decoded entry of the metadata map. Hash values keep their raw bytes;
/// everything else is normalized to a display string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataValue {
    Bytes(Vec<u8>),
    String(String),
    Bool(bool),
}

/// Splits bytecode into executable code and the trailing metadata entries.
/// Returns the whole input as code when no well-formed section is present,
/// so pre-0.4.7 bytecodes and truncated inputs pass through unchanged.
pub fn split(code: &[u8]) -> (&[u8], Option<Vec<(String, MetadataValue)>>) {
    match try_split(code) {
        Some((executable, entries)) => (executable, Some(entries)),
        None => (code, None),
    }
}

fn try_split(code: &[u8]) -> Option<(&[u8], Vec<(String, MetadataValue)>)> {
    if code.len() < 2 {
        return None;
    }
    let encoded_length = u16::from_be_bytes([code[code.len() - 2], code[code.len() - 1]]) as usize;
    let section_length = encoded_length.checked_add(2)?;
    if section_length > code.len() {
        return None;
    }
    let start = code.len() - section_length;
    let entries = decode_map(&code[start..code.len() - 2])?;
    Some((&code[..start], entries))
}

/// Decodes a definite-length CBOR map with string keys, rejecting anything
/// that does not consume the slice exactly. The strictness is what lets the
/// length prefix be trusted: random code bytes rarely decode to a full map.
fn decode_map(bytes: &[u8]) -> Option<Vec<(String, MetadataValue)>> {
    let mut decoder = minicbor::Decoder::new(bytes);
    let len = decoder.map().ok()??;
    // the claimed length comes from untrusted bytecode; a real solc map has
    // a handful of entries, so never preallocate more than that
    let mut entries = Vec::with_capacity(len.min(8) as usize);
    for _ in 0..len {
        let key = decoder.str().ok()?.to_string();
        let value = match decoder.datatype().ok()? {
            Type::Bytes => MetadataValue::Bytes(decoder.bytes().ok()?.to_vec()),
            Type::String => MetadataValue::String(decoder.str().ok()?.to_string()),
            Type::Bool => MetadataValue::Bool(decoder.bool().ok()?),
            _ => return None,
        };
        entries.push((key, value));
    }
    if decoder.position() != bytes.len() {
        return None;
    }
    Some(entries)
}

/// Returns the hex-encoded source hash embedded in the bytecode's metadata
/// section, if any. When several hash schemes are present the newest wins.
pub fn extract_metadata_hash(bytecode: &str) -> Option<String> {
    let code = hex::decode(bytecode.trim_start_matches("0x")).ok()?;
    let (_, entries) = split(&code);
    let entries = entries?;

    for scheme in ["ipfs", "bzzr1", "bzzr0"] {
        let hash = entries.iter().find_map(|(key, value)| match value {
            MetadataValue::Bytes(bytes) if key == scheme => Some(hex::encode(bytes)),
            _ => None,
        });
        if hash.is_some() {
            return hash;
        }
    }
    None
}

/// Syntactic check for caller-supplied constructor arguments: even-length
/// hex, `0x` prefix optional, empty allowed. The bytes are never compared
/// against chain state, only persisted alongside the verification.
pub fn validate_constructor_arguments(args: &str) -> bool {
    let args = args.trim_start_matches("0x");
    args.len() % 2 == 0 && args.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // real solc 0.8.14 trailer: {ipfs: <34 bytes>, solc: 0x00080e} + 0x0033
    const METADATA_SECTION: &str = "a26469706673582212202e82fb6222f966f0e56dc49cd1fb8a6b5eac9bdf74f62b8a5e9d8812901095d664736f6c634300080e0033";

    #[test]
    fn splits_trailing_section() {
        let bytecode = hex::decode(format!("60806040{METADATA_SECTION}")).unwrap();
        let (code, entries) = split(&bytecode);
        assert_eq!(hex::encode(code), "60806040");
        let entries = entries.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, "ipfs");
        assert_eq!(
            entries[1],
            ("solc".to_string(), MetadataValue::Bytes(vec![0x00, 0x08, 0x0e]))
        );
    }

    #[test]
    fn code_without_section_passes_through() {
        for raw in ["60806040", "", "0033", "6080604052600a0033"] {
            let bytecode = hex::decode(raw).unwrap();
            let (code, entries) = split(&bytecode);
            assert_eq!(code, bytecode.as_slice());
            assert_eq!(entries, None);
        }
    }

    #[test]
    fn huge_claimed_map_length_is_rejected() {
        // map header claiming u64::MAX entries must not preallocate or panic
        let bytecode = format!("6080bb{}0009", "ff".repeat(8));
        assert_eq!(extract_metadata_hash(&bytecode), None);
        let code = hex::decode(&bytecode).unwrap();
        let (rest, entries) = split(&code);
        assert_eq!(rest, code.as_slice());
        assert_eq!(entries, None);
    }

    #[test]
    fn length_prefix_larger_than_code_is_rejected() {
        let bytecode = hex::decode("608060ffff").unwrap();
        let (code, entries) = split(&bytecode);
        assert_eq!(code, bytecode.as_slice());
        assert_eq!(entries, None);
    }

    #[test]
    fn extracts_ipfs_hash() {
        let bytecode = format!("0x60806040{METADATA_SECTION}");
        assert_eq!(
            extract_metadata_hash(&bytecode).unwrap(),
            "12202e82fb6222f966f0e56dc49cd1fb8a6b5eac9bdf74f62b8a5e9d8812901095d6"
        );
    }

    #[test]
    fn extracts_swarm_hash() {
        // {bzzr0: <32 bytes>} + length
        let section = format!("a165627a7a72305820{}0029", "11".repeat(32));
        let bytecode = format!("6080{section}");
        assert_eq!(extract_metadata_hash(&bytecode).unwrap(), "11".repeat(32));
    }

    #[test]
    fn no_hash_in_plain_code() {
        assert_eq!(extract_metadata_hash("6080604052"), None);
        assert_eq!(extract_metadata_hash("not-hex"), None);
    }

    #[test]
    fn constructor_argument_validation() {
        assert!(validate_constructor_arguments(""));
        assert!(validate_constructor_arguments("0x"));
        assert!(validate_constructor_arguments("cafe0042"));
        assert!(validate_constructor_arguments("0xcafe0042"));
        assert!(!validate_constructor_arguments("cafe004"));
        assert!(!validate_constructor_arguments("0xzz"));
    }
}
