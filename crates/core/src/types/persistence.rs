//! Session persistence modes.

use serde::{Deserialize, Serialize};

/// How long a provider keeps a signed-in session around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    /// Survives restarts until an explicit sign-out.
    #[default]
    Local,
    /// Lives as long as the current process or tab.
    Session,
    /// Kept in memory only; never written anywhere.
    None,
}

impl Persistence {
    /// Persistence for a "remember me" choice.
    #[must_use]
    pub const fn remembered(remember: bool) -> Self {
        if remember { Self::Local } else { Self::None }
    }
}

/// Error parsing a [`Persistence`] from a string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid persistence mode: {0} (expected local, session or none)")]
pub struct PersistenceParseError(pub String);

impl std::fmt::Display for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Session => write!(f, "session"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for Persistence {
    type Err = PersistenceParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "session" => Ok(Self::Session),
            "none" => Ok(Self::None),
            _ => Err(PersistenceParseError(s.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for mode in [Persistence::Local, Persistence::Session, Persistence::None] {
            assert_eq!(mode.to_string().parse::<Persistence>().unwrap(), mode);
        }
        assert_eq!(" LOCAL ".parse::<Persistence>().unwrap(), Persistence::Local);
        assert!("forever".parse::<Persistence>().is_err());
    }

    #[test]
    fn test_remembered() {
        assert_eq!(Persistence::remembered(true), Persistence::Local);
        assert_eq!(Persistence::remembered(false), Persistence::None);
    }

    #[test]
    fn test_default_is_local() {
        assert_eq!(Persistence::default(), Persistence::Local);
    }
}
