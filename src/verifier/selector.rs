use crate::compilation::Contract;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error(
        "contract `{contract}` was not found in the compiled sources; \
         files seen: [{}], contracts seen: [{}]",
        .files.join(", "),
        .contracts.join(", ")
    )]
    NotFound {
        contract: String,
        files: Vec<String>,
        contracts: Vec<String>,
    },
    #[error(
        "contract `{contract}` is defined in several files: [{}]; \
         none of them is named after the contract",
        .files.join(", ")
    )]
    Ambiguous { contract: String, files: Vec<String> },
}

/// Picks the requested contract out of the compiler output. An exact name
/// match in a single file wins outright; when the name is defined in several
/// files, a file whose stem equals the contract name disambiguates.
pub fn select<'a>(
    contracts: &'a BTreeMap<String, BTreeMap<String, Contract>>,
    requested: &str,
) -> Result<(&'a str, &'a Contract), SelectorError> {
    let candidates: Vec<(&str, &Contract)> = contracts
        .iter()
        .filter_map(|(file, per_contract)| {
            per_contract
                .get(requested)
                .map(|contract| (file.as_str(), contract))
        })
        .collect();

    match candidates.as_slice() {
        [] => Err(SelectorError::NotFound {
            contract: requested.to_string(),
            files: contracts.keys().cloned().collect(),
            contracts: contracts
                .values()
                .flat_map(|per_contract| per_contract.keys().cloned())
                .collect(),
        }),
        [(file, contract)] => Ok((file, contract)),
        several => {
            let preferred: Vec<_> = several
                .iter()
                .filter(|(file, _)| file_stem(file) == requested)
                .collect();
            match preferred.as_slice() {
                [(file, contract)] => Ok((file, contract)),
                _ => Err(SelectorError::Ambiguous {
                    contract: requested.to_string(),
                    files: several.iter().map(|(file, _)| file.to_string()).collect(),
                }),
            }
        }
    }
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.strip_suffix(".sol").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn output(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeMap<String, Contract>> {
        entries
            .iter()
            .map(|(file, names)| {
                (
                    file.to_string(),
                    names
                        .iter()
                        .map(|name| (name.to_string(), Contract::default()))
                        .collect(),
                )
            })
            .collect()
    }

    #[test]
    fn unique_match_is_selected() {
        let contracts = output(&[("contracts/Token.sol", &["Token", "Ownable"])]);
        let (file, _) = select(&contracts, "Token").unwrap();
        assert_eq!(file, "contracts/Token.sol");
    }

    #[test]
    fn name_matching_is_case_sensitive() {
        let contracts = output(&[("Token.sol", &["Token"])]);
        let err = select(&contracts, "token").unwrap_err();
        assert!(matches!(err, SelectorError::NotFound { .. }));
    }

    #[test]
    fn missing_contract_lists_what_was_seen() {
        let contracts = output(&[("A.sol", &["Alpha"]), ("B.sol", &["Beta"])]);
        let err = select(&contracts, "Gamma").unwrap_err();
        assert_eq!(
            err,
            SelectorError::NotFound {
                contract: "Gamma".into(),
                files: vec!["A.sol".into(), "B.sol".into()],
                contracts: vec!["Alpha".into(), "Beta".into()],
            }
        );
    }

    #[test]
    fn file_stem_breaks_ties() {
        let contracts = output(&[
            ("contracts/Token.sol", &["Token"]),
            ("test/TokenMock.sol", &["Token"]),
        ]);
        let (file, _) = select(&contracts, "Token").unwrap();
        assert_eq!(file, "contracts/Token.sol");
    }

    #[test]
    fn unresolvable_tie_is_ambiguous() {
        let contracts = output(&[("a/Impl.sol", &["Token"]), ("b/Proxy.sol", &["Token"])]);
        let err = select(&contracts, "Token").unwrap_err();
        assert_eq!(
            err,
            SelectorError::Ambiguous {
                contract: "Token".into(),
                files: vec!["a/Impl.sol".into(), "b/Proxy.sol".into()],
            }
        );
    }
}
