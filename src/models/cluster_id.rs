//! Enumerated cluster identifier domain.
//!
//! The wire format is a plain string (`"unassigned"`, `"noise"`, or a label
//! such as `"cluster_001"`), but internally the two sentinels are tagged
//! variants so they cannot collide with reviewer-chosen labels.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const UNASSIGNED: &str = "unassigned";
const NOISE: &str = "noise";

/// Identity of a face cluster within one run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ClusterId {
    /// Face not yet clustered (the state between detection and clustering).
    Unassigned,
    /// Outlier with no stable identity group.
    Noise,
    /// A concrete identity group, automatic (`cluster_001`) or derived by a
    /// reviewer merge/split.
    Label(String),
}

impl ClusterId {
    pub fn as_str(&self) -> &str {
        match self {
            ClusterId::Unassigned => UNASSIGNED,
            ClusterId::Noise => NOISE,
            ClusterId::Label(label) => label,
        }
    }

    pub fn is_noise(&self) -> bool {
        matches!(self, ClusterId::Noise)
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ClusterId {
    fn from(value: &str) -> Self {
        match value {
            UNASSIGNED => ClusterId::Unassigned,
            NOISE => ClusterId::Noise,
            other => ClusterId::Label(other.to_string()),
        }
    }
}

impl From<String> for ClusterId {
    fn from(value: String) -> Self {
        match value.as_str() {
            UNASSIGNED => ClusterId::Unassigned,
            NOISE => ClusterId::Noise,
            _ => ClusterId::Label(value),
        }
    }
}

impl Serialize for ClusterId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ClusterId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(ClusterId::from(String::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_round_trip_as_strings() {
        assert_eq!(ClusterId::from("noise"), ClusterId::Noise);
        assert_eq!(ClusterId::from("unassigned"), ClusterId::Unassigned);
        assert_eq!(ClusterId::Noise.as_str(), "noise");
        assert_eq!(
            ClusterId::from("cluster_001"),
            ClusterId::Label("cluster_001".to_string())
        );
    }

    #[test]
    fn serializes_to_plain_string() {
        let json = serde_json::to_string(&ClusterId::Label("cluster_002".into())).unwrap();
        assert_eq!(json, "\"cluster_002\"");
        let back: ClusterId = serde_json::from_str("\"noise\"").unwrap();
        assert_eq!(back, ClusterId::Noise);
    }
}
