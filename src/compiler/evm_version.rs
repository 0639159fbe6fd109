use semver::Version;
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};
use thiserror::Error;

/// EVM targets in fork order, named the way solc names them in
/// standard-json `settings.evmVersion`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EvmVersion {
    Homestead,
    TangerineWhistle,
    SpuriousDragon,
    Byzantium,
    Constantinople,
    Petersburg,
    Istanbul,
    Berlin,
    London,
    Paris,
    Shanghai,
    Cancun,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("unknown EVM version: {0}")]
pub struct UnknownEvmVersion(String);

impl EvmVersion {
    const ALL: [EvmVersion; 12] = [
        EvmVersion::Homestead,
        EvmVersion::TangerineWhistle,
        EvmVersion::SpuriousDragon,
        EvmVersion::Byzantium,
        EvmVersion::Constantinople,
        EvmVersion::Petersburg,
        EvmVersion::Istanbul,
        EvmVersion::Berlin,
        EvmVersion::London,
        EvmVersion::Paris,
        EvmVersion::Shanghai,
        EvmVersion::Cancun,
    ];

    /// The first compiler release accepting this target in
    /// `settings.evmVersion`. Selectable targets appeared in 0.4.21.
    fn first_supported_in(&self) -> Version {
        match self {
            EvmVersion::Homestead
            | EvmVersion::TangerineWhistle
            | EvmVersion::SpuriousDragon
            | EvmVersion::Byzantium
            | EvmVersion::Constantinople => Version::new(0, 4, 21),
            EvmVersion::Petersburg => Version::new(0, 5, 5),
            EvmVersion::Istanbul => Version::new(0, 5, 14),
            EvmVersion::Berlin => Version::new(0, 8, 5),
            EvmVersion::London => Version::new(0, 8, 7),
            EvmVersion::Paris => Version::new(0, 8, 18),
            EvmVersion::Shanghai => Version::new(0, 8, 20),
            EvmVersion::Cancun => Version::new(0, 8, 24),
        }
    }

    /// The newest target the given compiler release understands, or `None`
    /// for releases predating selectable EVM targets.
    pub fn latest_supported(compiler: &Version) -> Option<EvmVersion> {
        Self::ALL
            .iter()
            .rev()
            .find(|target| &target.first_supported_in() <= compiler)
            .copied()
    }

    pub fn is_supported_by(&self, compiler: &Version) -> bool {
        &self.first_supported_in() <= compiler
    }
}

impl Display for EvmVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EvmVersion::Homestead => "homestead",
            EvmVersion::TangerineWhistle => "tangerineWhistle",
            EvmVersion::SpuriousDragon => "spuriousDragon",
            EvmVersion::Byzantium => "byzantium",
            EvmVersion::Constantinople => "constantinople",
            EvmVersion::Petersburg => "petersburg",
            EvmVersion::Istanbul => "istanbul",
            EvmVersion::Berlin => "berlin",
            EvmVersion::London => "london",
            EvmVersion::Paris => "paris",
            EvmVersion::Shanghai => "shanghai",
            EvmVersion::Cancun => "cancun",
        };
        f.write_str(s)
    }
}

impl FromStr for EvmVersion {
    type Err = UnknownEvmVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|target| target.to_string() == s)
            .copied()
            .ok_or_else(|| UnknownEvmVersion(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn string_roundtrip() {
        for target in EvmVersion::ALL {
            assert_eq!(EvmVersion::from_str(&target.to_string()), Ok(target));
        }
        assert_eq!(
            EvmVersion::from_str("tangerineWhistle"),
            Ok(EvmVersion::TangerineWhistle)
        );
        EvmVersion::from_str("muirGlacier").unwrap_err();
    }

    #[test]
    fn latest_supported_table() {
        let cases = [
            ("0.4.11", None),
            ("0.4.21", Some(EvmVersion::Constantinople)),
            ("0.5.5", Some(EvmVersion::Petersburg)),
            ("0.5.13", Some(EvmVersion::Petersburg)),
            ("0.5.14", Some(EvmVersion::Istanbul)),
            ("0.8.6", Some(EvmVersion::Berlin)),
            ("0.8.17", Some(EvmVersion::London)),
            ("0.8.19", Some(EvmVersion::Paris)),
            ("0.8.23", Some(EvmVersion::Shanghai)),
            ("0.8.24", Some(EvmVersion::Cancun)),
        ];
        for (compiler, expected) in cases {
            let compiler = Version::parse(compiler).unwrap();
            assert_eq!(
                EvmVersion::latest_supported(&compiler),
                expected,
                "compiler {compiler}"
            );
        }
    }

    #[test]
    fn support_check() {
        let compiler = Version::new(0, 8, 7);
        assert!(EvmVersion::London.is_supported_by(&compiler));
        assert!(EvmVersion::Istanbul.is_supported_by(&compiler));
        assert!(!EvmVersion::Paris.is_supported_by(&compiler));
        assert!(!EvmVersion::Cancun.is_supported_by(&compiler));
    }
}
