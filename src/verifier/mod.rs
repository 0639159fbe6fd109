mod matcher;
mod metadata;
mod selector;

pub use matcher::{compare, link_libraries, MatchError};
pub use metadata::{extract_metadata_hash, validate_constructor_arguments};
pub use selector::{select, SelectorError};

use serde::{Deserialize, Serialize};

/// How closely the compiled bytecode matches the deployed one. `Partial`
/// means the executable code is identical and only the trailing metadata
/// section differs, which does not indicate a semantic mismatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Full,
    Partial,
}

impl MatchType {
    pub fn metadata_only_difference(&self) -> bool {
        matches!(self, MatchType::Partial)
    }
}
