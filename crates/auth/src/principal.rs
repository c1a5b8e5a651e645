use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who performed a transition: a person or a service account.
///
/// Recorded on every event so the audit trail can name the actor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Uuid);

impl PrincipalId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for PrincipalId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PrincipalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_its_display_form() {
        let id = PrincipalId::new();
        assert_eq!(id.to_string().parse::<PrincipalId>().unwrap(), id);
        assert!("nobody".parse::<PrincipalId>().is_err());
    }
}
