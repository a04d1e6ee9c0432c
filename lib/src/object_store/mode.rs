use std::fmt;
use std::str::FromStr;

use crate::error::OstreeError;

/// Repository storage mode (spec §3): whether file content is compressed
/// and how ownership is encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoMode {
    Archive,
    Bare,
    BareUser,
    BareUserOnly,
}

impl RepoMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Bare => "bare",
            Self::BareUser => "bare-user",
            Self::BareUserOnly => "bare-user-only",
        }
    }

    /// Whether the on-disk file's uid/gid/mode are the real ones, or a
    /// stand-in the invoking unprivileged user owns (spec §4.1).
    pub fn encodes_ownership_in_xattr(self) -> bool {
        matches!(self, Self::BareUser | Self::BareUserOnly)
    }
}

impl fmt::Display for RepoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoMode {
    type Err = OstreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive" => Ok(Self::Archive),
            "bare" => Ok(Self::Bare),
            "bare-user" => Ok(Self::BareUser),
            "bare-user-only" => Ok(Self::BareUserOnly),
            other => Err(OstreeError::Config(format!("unknown repository mode: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_display_and_from_str() {
        for mode in [RepoMode::Archive, RepoMode::Bare, RepoMode::BareUser, RepoMode::BareUserOnly] {
            assert_eq!(mode.to_string().parse::<RepoMode>().unwrap(), mode);
        }
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!("bogus".parse::<RepoMode>().is_err());
    }
}
