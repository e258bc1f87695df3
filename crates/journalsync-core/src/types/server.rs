//! Remote server (destination) types
//!
//! A remote server is a peer that receives transmissions. Its role decides
//! where destination-scoped record state lives:
//!
//! - **Parent**: the record-level state is authoritative for the parent
//! - **Child**: each record carries a per-server override
//!
//! The send policy is a prefix filter over the entity types a record contains.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::record::SyncRecord;
use super::ServerId;

/// Position of a remote server relative to the local journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerRole {
    Parent,
    Child,
}

impl std::fmt::Display for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerRole::Parent => write!(f, "parent"),
            ServerRole::Child => write!(f, "child"),
        }
    }
}

impl FromStr for ServerRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parent" => Ok(ServerRole::Parent),
            "child" => Ok(ServerRole::Child),
            _ => Err(format!(
                "Invalid role '{}'. Must be one of: parent, child",
                s
            )),
        }
    }
}

/// Which entity types a server accepts.
///
/// Both lists hold type-name prefixes. An empty `included` list accepts every
/// type that is not excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPolicy {
    #[serde(default)]
    pub included: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
}

impl SendPolicy {
    /// Policy that sends everything
    pub fn send_all() -> Self {
        Self::default()
    }

    pub fn exclude(mut self, prefix: impl Into<String>) -> Self {
        self.excluded.push(prefix.into());
        self
    }

    pub fn include(mut self, prefix: impl Into<String>) -> Self {
        self.included.push(prefix.into());
        self
    }

    /// Whether a single entity type may be sent under this policy
    pub fn allows_type(&self, type_name: &str) -> bool {
        if self.excluded.iter().any(|p| type_name.starts_with(p.as_str())) {
            return false;
        }
        self.included.is_empty() || self.included.iter().any(|p| type_name.starts_with(p.as_str()))
    }
}

/// A peer that receives transmissions from this journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServer {
    pub id: ServerId,
    pub nickname: String,
    pub role: ServerRole,
    #[serde(default)]
    pub policy: SendPolicy,
}

impl RemoteServer {
    /// Create a server that accepts every entity type
    pub fn new(nickname: impl Into<String>, role: ServerRole) -> Self {
        Self {
            id: ServerId::new(),
            nickname: nickname.into(),
            role,
            policy: SendPolicy::send_all(),
        }
    }

    pub fn with_policy(mut self, policy: SendPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn is_parent(&self) -> bool {
        self.role == ServerRole::Parent
    }

    /// Whether this server should receive `record`.
    ///
    /// A record is withheld if any type it contains is disallowed.
    pub fn should_send(&self, record: &SyncRecord) -> bool {
        record
            .contained_types()
            .iter()
            .all(|type_name| self.policy.allows_type(type_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::record::SyncItem;
    use crate::types::SyncItemState;

    fn record_with_types(types: &[&str]) -> SyncRecord {
        let items = types
            .iter()
            .map(|t| SyncItem::new(*t, SyncItemState::Updated, "k", "{}"))
            .collect();
        SyncRecord::new(items)
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Parent".parse::<ServerRole>().unwrap(), ServerRole::Parent);
        assert_eq!("child".parse::<ServerRole>().unwrap(), ServerRole::Child);
        assert!("sibling".parse::<ServerRole>().is_err());
    }

    #[test]
    fn test_send_all_accepts_everything() {
        let server = RemoteServer::new("parent", ServerRole::Parent);
        assert!(server.should_send(&record_with_types(&["org.openmrs.Patient"])));
        assert!(server.should_send(&record_with_types(&[])));
    }

    #[test]
    fn test_excluded_type_rejects_whole_record() {
        let server = RemoteServer::new("parent", ServerRole::Parent)
            .with_policy(SendPolicy::send_all().exclude("org.openmrs.GlobalProperty"));

        assert!(!server.should_send(&record_with_types(&[
            "org.openmrs.Patient",
            "org.openmrs.GlobalProperty",
        ])));
        assert!(server.should_send(&record_with_types(&["org.openmrs.Patient"])));
    }

    #[test]
    fn test_included_list_restricts() {
        let policy = SendPolicy::default().include("org.openmrs.");
        assert!(policy.allows_type("org.openmrs.Obs"));
        assert!(!policy.allows_type("com.example.Widget"));
    }

    #[test]
    fn test_exclusion_wins_over_inclusion() {
        let policy = SendPolicy::default()
            .include("org.openmrs.")
            .exclude("org.openmrs.User");
        assert!(!policy.allows_type("org.openmrs.User"));
        assert!(policy.allows_type("org.openmrs.Person"));
    }
}
