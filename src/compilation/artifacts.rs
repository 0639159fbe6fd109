//! Standard-json compiler input and the subset of its output that
//! verification consumes.

use crate::{compiler::EvmVersion, sources::SourceSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SolcInput {
    pub language: String,
    pub sources: BTreeMap<String, Source>,
    pub settings: Settings,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Source {
    pub content: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub optimizer: Optimizer,
    #[serde(
        default,
        with = "display_from_str_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub evm_version: Option<EvmVersion>,
    pub output_selection: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub libraries: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Optimizer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runs: Option<u32>,
}

impl SolcInput {
    /// Builds the verification input: every resolved source, the requested
    /// optimizer configuration and EVM target, and the caller's library
    /// addresses. The file a library lives in is unknown at this point, so
    /// the bindings are repeated for every file the way the compiler
    /// tolerates.
    pub fn new(
        sources: SourceSet,
        optimization_used: bool,
        optimization_runs: Option<u32>,
        evm_version: Option<EvmVersion>,
        libraries: &BTreeMap<String, String>,
    ) -> Self {
        let libraries = if libraries.is_empty() {
            BTreeMap::new()
        } else {
            sources
                .paths()
                .map(|file| (file.to_string(), libraries.clone()))
                .collect()
        };

        Self {
            language: "Solidity".to_string(),
            sources: sources
                .into_inner()
                .into_iter()
                .map(|(path, content)| (path, Source { content }))
                .collect(),
            settings: Settings {
                optimizer: Optimizer {
                    enabled: Some(optimization_used),
                    runs: optimization_runs,
                },
                evm_version,
                output_selection: output_selection_for_verification(),
                libraries,
            },
        }
    }
}

/// abi + bytecodes + metadata for every contract in every file.
fn output_selection_for_verification() -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    let outputs = vec![
        "abi".to_string(),
        "metadata".to_string(),
        "evm.bytecode.object".to_string(),
        "evm.bytecode.linkReferences".to_string(),
        "evm.deployedBytecode.object".to_string(),
        "evm.deployedBytecode.linkReferences".to_string(),
        "evm.deployedBytecode.immutableReferences".to_string(),
    ];
    BTreeMap::from([("*".to_string(), BTreeMap::from([("*".to_string(), outputs)]))])
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompilerOutput {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Diagnostic>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contracts: BTreeMap<String, BTreeMap<String, Contract>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_location: Option<SourceLocation>,
    pub severity: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_message: Option<String>,
}

impl Diagnostic {
    pub fn is_error(&self) -> bool {
        self.severity == "error"
    }

    pub fn display_message(&self) -> &str {
        self.formatted_message.as_deref().unwrap_or(&self.message)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: String,
    pub start: i32,
    pub end: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contract {
    #[serde(default)]
    pub abi: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evm: Option<Evm>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Evm {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytecode: Option<BytecodeObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_bytecode: Option<BytecodeObject>,
}

/// An unlinked bytecode: `object` is hex except for 40-character library
/// placeholders at the offsets listed in `link_references`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BytecodeObject {
    pub object: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub link_references: BTreeMap<String, BTreeMap<String, Vec<Offsets>>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub immutable_references: BTreeMap<String, Vec<Offsets>>,
}

/// Byte offsets into the bytecode; linking replaces the 20 bytes there.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Offsets {
    pub start: u32,
    pub length: u32,
}

mod display_from_str_opt {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::{fmt::Display, str::FromStr};

    pub fn serialize<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Display,
        S: Serializer,
    {
        match value {
            Some(value) => serializer.collect_str(value),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let value: Option<String> = Option::deserialize(deserializer)?;
        value
            .map(|s| T::from_str(&s).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn input_serialization() {
        let mut sources = SourceSet::default();
        sources.insert("source.sol", "pragma");
        let input = SolcInput::new(
            sources,
            true,
            Some(200),
            Some(EvmVersion::London),
            &BTreeMap::from([("SomeLibrary".to_string(), "0xcafe".to_string())]),
        );
        let expected = r#"{"language":"Solidity","sources":{"source.sol":{"content":"pragma"}},"settings":{"optimizer":{"enabled":true,"runs":200},"evmVersion":"london","outputSelection":{"*":{"*":["abi","metadata","evm.bytecode.object","evm.bytecode.linkReferences","evm.deployedBytecode.object","evm.deployedBytecode.linkReferences","evm.deployedBytecode.immutableReferences"]}},"libraries":{"source.sol":{"SomeLibrary":"0xcafe"}}}}"#;
        assert_eq!(serde_json::to_string(&input).unwrap(), expected);
    }

    #[test]
    fn input_without_optional_settings() {
        let mut sources = SourceSet::default();
        sources.insert("source.sol", "");
        let input = SolcInput::new(sources, false, None, None, &BTreeMap::new());
        let expected = r#"{"language":"Solidity","sources":{"source.sol":{"content":""}},"settings":{"optimizer":{"enabled":false},"outputSelection":{"*":{"*":["abi","metadata","evm.bytecode.object","evm.bytecode.linkReferences","evm.deployedBytecode.object","evm.deployedBytecode.linkReferences","evm.deployedBytecode.immutableReferences"]}}}}"#;
        assert_eq!(serde_json::to_string(&input).unwrap(), expected);
    }

    #[test]
    fn output_deserialization() {
        let raw = r#"{
            "errors": [
                {
                    "sourceLocation": {"file": "source.sol", "start": 10, "end": 20},
                    "severity": "warning",
                    "message": "Unused local variable.",
                    "formattedMessage": "Warning: Unused local variable."
                }
            ],
            "contracts": {
                "source.sol": {
                    "Token": {
                        "abi": [{"type": "constructor", "inputs": []}],
                        "metadata": "{\"compiler\":{\"version\":\"0.8.0\"}}",
                        "evm": {
                            "bytecode": {"object": "6080"},
                            "deployedBytecode": {
                                "object": "6080604052",
                                "linkReferences": {"lib.sol": {"Math": [{"start": 1, "length": 20}]}}
                            }
                        }
                    }
                }
            }
        }"#;
        let output: CompilerOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(output.errors.len(), 1);
        assert!(!output.errors[0].is_error());
        let contract = &output.contracts["source.sol"]["Token"];
        assert_eq!(contract.abi.len(), 1);
        let deployed = contract
            .evm
            .as_ref()
            .and_then(|evm| evm.deployed_bytecode.as_ref())
            .unwrap();
        assert_eq!(deployed.object, "6080604052");
        assert_eq!(
            deployed.link_references["lib.sol"]["Math"],
            vec![Offsets { start: 1, length: 20 }]
        );
    }
}
