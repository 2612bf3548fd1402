//! Deployment scope of a stack.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Account and region a stack deploys to.
///
/// `None` means environment-agnostic: the value is only known at deploy time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

impl Environment {
    pub fn new(account: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            account: Some(account.into()),
            region: Some(region.into()),
        }
    }

    /// Environment-agnostic scope.
    pub fn agnostic() -> Self {
        Self::default()
    }

    pub fn is_agnostic(&self) -> bool {
        self.account.is_none() && self.region.is_none()
    }

    /// Environment string used in the assembly manifest.
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region.as_deref().unwrap_or("unknown-region")
        )
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uri())
    }
}

/// How a reference between two stacks can be expressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    /// Native cross-stack import works.
    SameScope,
    /// Same account, different region: needs an export bridge.
    CrossRegion { producer_region: String },
    /// No supported mechanism.
    Unsupported(String),
}

/// Classify a reference from `consumer` to `producer`.
pub fn classify(producer: &Environment, consumer: &Environment) -> Boundary {
    match (&producer.account, &consumer.account) {
        (Some(a), Some(b)) if a != b => {
            return Boundary::Unsupported(format!("stacks are in different accounts ({} and {})", a, b))
        }
        (Some(_), None) | (None, Some(_)) => {
            return Boundary::Unsupported(
                "only one of the stacks has an explicit account".to_string(),
            )
        }
        _ => {}
    }

    match (&producer.region, &consumer.region) {
        (a, b) if a == b => Boundary::SameScope,
        (Some(region), Some(_)) => Boundary::CrossRegion {
            producer_region: region.clone(),
        },
        _ => Boundary::Unsupported("only one of the stacks has an explicit region".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_environment_is_same_scope() {
        let env = Environment::new("111111111111", "us-east-1");
        assert_eq!(classify(&env, &env.clone()), Boundary::SameScope);
        assert_eq!(
            classify(&Environment::agnostic(), &Environment::agnostic()),
            Boundary::SameScope
        );
    }

    #[test]
    fn test_region_change_needs_bridge() {
        let producer = Environment::new("111111111111", "us-east-1");
        let consumer = Environment::new("111111111111", "us-west-2");
        assert_eq!(
            classify(&producer, &consumer),
            Boundary::CrossRegion {
                producer_region: "us-east-1".to_string()
            }
        );
    }

    #[test]
    fn test_unsupported_boundaries() {
        let producer = Environment::new("111111111111", "us-east-1");
        assert!(matches!(
            classify(&producer, &Environment::new("222222222222", "us-east-1")),
            Boundary::Unsupported(_)
        ));
        assert!(matches!(
            classify(&producer, &Environment::agnostic()),
            Boundary::Unsupported(_)
        ));

        let region_only = Environment {
            account: None,
            region: Some("eu-west-1".into()),
        };
        assert!(matches!(
            classify(&region_only, &Environment::agnostic()),
            Boundary::Unsupported(_)
        ));
    }

    #[test]
    fn test_manifest_uri() {
        assert_eq!(
            Environment::new("111111111111", "us-east-1").uri(),
            "aws://111111111111/us-east-1"
        );
        assert_eq!(Environment::agnostic().uri(), "aws://unknown-account/unknown-region");
    }
}
