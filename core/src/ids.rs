//! Strongly typed identifiers.
//!
//! Every record is addressed by a UUID newtype so that a `TeamId` can never be
//! passed where a `RegistrationId` is expected. Invite codes are the one
//! human-facing identifier and carry their own normalisation rules.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error returned when an identifier fails to parse.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ParseIdError {
    kind: &'static str,
    value: String,
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self).map_err(|_| ParseIdError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId,
    "event id"
);
uuid_id!(
    /// Unique identifier for a user (owned by the external identity service)
    UserId,
    "user id"
);
uuid_id!(
    /// Unique identifier for a team
    TeamId,
    "team id"
);
uuid_id!(
    /// Unique identifier for a registration
    RegistrationId,
    "registration id"
);

/// Team invite code.
///
/// Codes compare case-insensitively. The stored form is always the
/// normalised (trimmed, upper-case) form so that equality on the wrapper
/// matches equality on user input after [`InviteCode::parse`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InviteCode(String);

impl InviteCode {
    /// Normalise raw user input into an invite code.
    ///
    /// # Errors
    ///
    /// Returns [`ParseIdError`] if the input is empty or contains characters
    /// other than ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self, ParseIdError> {
        let normalized = raw.trim().to_ascii_uppercase();
        if normalized.is_empty() || !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseIdError {
                kind: "invite code",
                value: raw.to_string(),
            });
        }
        Ok(Self(normalized))
    }

    /// Get the normalised code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InviteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for InviteCode {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn invite_codes_compare_case_insensitively() {
        let a = InviteCode::parse("ab12cd").unwrap();
        let b = InviteCode::parse("  AB12CD ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "AB12CD");
    }

    #[test]
    fn invite_code_rejects_symbols() {
        assert!(InviteCode::parse("AB-12").is_err());
        assert!(InviteCode::parse("   ").is_err());
    }

    #[test]
    fn ids_round_trip_through_display() {
        let id = TeamId::new();
        let parsed: TeamId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn malformed_id_reports_kind() {
        let err = "nope".parse::<EventId>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid event id: nope");
    }
}
