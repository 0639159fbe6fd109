use semver::BuildMetadata;
use std::{
    fmt::{Debug, Display, Formatter},
    hash::Hash,
    str::FromStr,
};
use thiserror::Error;

/// Types that can be used as a compiler version inside the download cache
/// and the release index.
pub trait Version:
    Clone + Debug + Display + PartialEq + Eq + Hash + PartialOrd + Ord + FromStr + Send + Sync + 'static
{
    fn to_semver(&self) -> &semver::Version;
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid version: {0}")]
    Semver(#[from] semver::Error),
    #[error("invalid commit hash in version build metadata: {0}")]
    Commit(String),
}

/// A compiler version as it appears in release indexes: a semantic version
/// optionally qualified with `+commit.<hash>` build metadata and an optional
/// leading `v` ("0.8.0", "v0.8.0+commit.c7dfd78e").
///
/// Equality and ordering take the commit into account, so two builds of the
/// same semantic version are distinct cache entries. Lookup by bare semantic
/// version is performed via [`DetailedVersion::matches`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DetailedVersion {
    version: semver::Version,
    commit: Option<String>,
}

impl DetailedVersion {
    pub fn new(version: semver::Version, commit: Option<String>) -> Self {
        Self { version, commit }
    }

    /// The semantic version with build metadata stripped.
    pub fn version(&self) -> &semver::Version {
        &self.version
    }

    pub fn commit(&self) -> Option<&str> {
        self.commit.as_deref()
    }

    /// Whether `self` (an index entry) satisfies the `requested` version.
    /// Semantic versions must be equal; commits must be equal up to a prefix
    /// or absent on the requested side.
    pub fn matches(&self, requested: &DetailedVersion) -> bool {
        if self.version != requested.version {
            return false;
        }
        match (&self.commit, &requested.commit) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(own), Some(requested)) => {
                own.starts_with(requested.as_str()) || requested.starts_with(own.as_str())
            }
        }
    }
}

impl Version for DetailedVersion {
    fn to_semver(&self) -> &semver::Version {
        &self.version
    }
}

impl FromStr for DetailedVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut version = semver::Version::from_str(s.trim().trim_start_matches('v'))?;
        let build = std::mem::replace(&mut version.build, BuildMetadata::EMPTY);
        let commit = match build.as_str() {
            "" => None,
            build => {
                let commit = build
                    .strip_prefix("commit.")
                    .ok_or_else(|| ParseError::Commit(build.to_string()))?;
                if commit.is_empty() || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(ParseError::Commit(build.to_string()));
                }
                Some(commit.to_string())
            }
        };
        Ok(Self { version, commit })
    }
}

impl Display for DetailedVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.version)?;
        if let Some(commit) = &self.commit {
            write!(f, "+commit.{commit}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ver(s: &str) -> DetailedVersion {
        DetailedVersion::from_str(s).unwrap()
    }

    #[test]
    fn parse() {
        let parsed = ver("0.8.0");
        assert_eq!(parsed.version(), &semver::Version::new(0, 8, 0));
        assert_eq!(parsed.commit(), None);

        let parsed = ver("v0.8.0+commit.c7dfd78e");
        assert_eq!(parsed.version(), &semver::Version::new(0, 8, 0));
        assert_eq!(parsed.commit(), Some("c7dfd78e"));

        let parsed = ver("0.8.15-nightly.2022.5.27+commit.095cc647");
        assert_eq!(parsed.version().pre.as_str(), "nightly.2022.5.27");
        assert_eq!(parsed.commit(), Some("095cc647"));
    }

    #[test]
    fn parse_invalid() {
        DetailedVersion::from_str("0.8").unwrap_err();
        DetailedVersion::from_str("sometext").unwrap_err();
        assert!(matches!(
            DetailedVersion::from_str("0.8.0+somebuild"),
            Err(ParseError::Commit(_))
        ));
        assert!(matches!(
            DetailedVersion::from_str("0.8.0+commit.nothex"),
            Err(ParseError::Commit(_))
        ));
    }

    #[test]
    fn display() {
        for (initial, expected) in [
            ("0.8.0", "v0.8.0"),
            ("v0.8.0", "v0.8.0"),
            ("0.8.0+commit.c7dfd78e", "v0.8.0+commit.c7dfd78e"),
        ] {
            assert_eq!(ver(initial).to_string(), expected);
        }
    }

    #[test]
    fn order() {
        assert!(ver("0.8.1") > ver("0.8.0"));
        assert!(ver("0.13.0") > ver("0.4.11"));
        assert!(ver("1.0.0") > ver("0.8.17+commit.8df45f5f"));
    }

    #[test]
    fn matching() {
        let indexed = ver("0.8.0+commit.c7dfd78e");
        assert!(indexed.matches(&ver("0.8.0")));
        assert!(indexed.matches(&ver("0.8.0+commit.c7dfd78e")));
        assert!(indexed.matches(&ver("0.8.0+commit.c7df")));
        assert!(!indexed.matches(&ver("0.8.1")));
        assert!(!indexed.matches(&ver("0.8.0+commit.deadbeef")));

        let indexed = ver("0.8.0");
        assert!(indexed.matches(&ver("0.8.0")));
        assert!(!indexed.matches(&ver("0.8.0+commit.c7dfd78e")));
    }
}
