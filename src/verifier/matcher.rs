use super::{metadata, MatchType};
use crate::compilation::artifacts::Offsets;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("library `{name}` has no address to link against")]
    UnlinkedLibrary { name: String },
    #[error("address supplied for library `{name}` is not a 20-byte hex address")]
    InvalidLibraryAddress { name: String },
    #[error("bytecode is not valid hex: {0}")]
    InvalidBytecode(String),
    #[error(
        "bytecode does not match: first difference at byte {offset}, \
         expected {expected_length} bytes, got {actual_length}"
    )]
    Mismatch {
        offset: usize,
        expected_length: usize,
        actual_length: usize,
    },
}

/// Substitutes library placeholders in an unlinked bytecode with caller
/// supplied addresses. Placeholders occupy 40 hex characters at the byte
/// offsets listed in `link_references`; an address may be bound either by
/// bare library name or by its fully qualified `file:Name` form.
pub fn link_libraries(
    object: &str,
    link_references: &BTreeMap<String, BTreeMap<String, Vec<Offsets>>>,
    libraries: &BTreeMap<String, String>,
) -> Result<String, MatchError> {
    let mut linked = object.as_bytes().to_vec();

    for (file, per_library) in link_references {
        for (name, offsets) in per_library {
            let qualified = format!("{file}:{name}");
            let address = libraries
                .get(name)
                .or_else(|| libraries.get(&qualified))
                .ok_or_else(|| MatchError::UnlinkedLibrary { name: name.clone() })?;
            let address = normalize_address(address)
                .ok_or_else(|| MatchError::InvalidLibraryAddress { name: name.clone() })?;

            for offset in offsets {
                let start = offset.start as usize * 2;
                let end = start + offset.length as usize * 2;
                if end > linked.len() || offset.length as usize * 2 != address.len() {
                    return Err(MatchError::InvalidBytecode(format!(
                        "link reference for `{name}` is out of bounds"
                    )));
                }
                linked[start..end].copy_from_slice(address.as_bytes());
            }
        }
    }

    let linked = String::from_utf8(linked)
        .map_err(|_| MatchError::InvalidBytecode("non-ascii bytecode object".into()))?;

    // placeholders the compiler emitted without a link reference entry
    if let Some(position) = linked.find("__") {
        let placeholder: String = linked[position..].chars().take(40).collect();
        return Err(MatchError::UnlinkedLibrary {
            name: placeholder.trim_matches(['_', '$'].as_slice()).to_string(),
        });
    }

    Ok(linked)
}

/// 40 lowercase hex characters, shorter inputs left-padded with zeros.
fn normalize_address(address: &str) -> Option<String> {
    let hex = address.trim_start_matches("0x").to_lowercase();
    if hex.len() > 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("{hex:0>40}"))
}

/// Compares the on-chain bytecode against a freshly compiled one.
///
/// Byte-identical inputs are a full match. Inputs that agree once the
/// trailing metadata section is stripped from both sides are a partial
/// match: the code is the same, only build provenance differs. Anything
/// else is a mismatch, reported with the first differing offset and both
/// code lengths so the caller can tell systematic divergence (wrong
/// optimizer settings) from a late, local one.
pub fn compare(expected: &str, compiled: &str) -> Result<MatchType, MatchError> {
    let expected = decode(expected)?;
    let compiled = decode(compiled)?;

    if expected == compiled {
        return Ok(MatchType::Full);
    }

    let (expected_code, _) = metadata::split(&expected);
    let (compiled_code, _) = metadata::split(&compiled);
    if expected_code == compiled_code {
        return Ok(MatchType::Partial);
    }

    let offset = expected_code
        .iter()
        .zip(compiled_code)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| expected_code.len().min(compiled_code.len()));
    Err(MatchError::Mismatch {
        offset,
        expected_length: expected_code.len(),
        actual_length: compiled_code.len(),
    })
}

fn decode(bytecode: &str) -> Result<Vec<u8>, MatchError> {
    hex::decode(bytecode.trim_start_matches("0x"))
        .map_err(|e| MatchError::InvalidBytecode(e.to_string()))
}
