use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult};

/// Verified actor identity attached to every append and transition call.
///
/// Identity issuance lives in a collaborator service; this type only
/// guarantees that a call carries a non-empty, verified subject. Constructing
/// one from unverified input fails, so ledger writes cannot be anonymous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorIdentity {
    subject: String,
    display_name: String,
}

impl ActorIdentity {
    /// Creates an actor identity from verified authentication data.
    pub fn new(subject: impl Into<String>, display_name: impl Into<String>) -> AppResult<Self> {
        let subject = subject.into();
        if subject.trim().is_empty() {
            return Err(AppError::Unauthorized(
                "actor identity requires a non-empty subject".to_owned(),
            ));
        }

        Ok(Self {
            subject,
            display_name: display_name.into(),
        })
    }

    /// Returns the stable subject claim from the identity provider.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.subject.as_str()
    }

    /// Returns the display name for the actor.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::ActorIdentity;

    #[test]
    fn actor_identity_rejects_blank_subject() {
        let identity = ActorIdentity::new("  ", "Officer Doe");
        assert!(identity.is_err());
    }

    #[test]
    fn actor_identity_exposes_subject() {
        let identity =
            ActorIdentity::new("officer.doe", "Officer Doe").unwrap_or_else(|_| unreachable!());
        assert_eq!(identity.subject(), "officer.doe");
        assert_eq!(identity.display_name(), "Officer Doe");
    }
}
