//! Component ids - the subgraph instance name a component is created under

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Instance name of a component, shared by the component and its ports.
///
/// Ports label themselves `owner.port`, so an id is a single token: non-empty,
/// without whitespace, control characters or `.`. Documents are checked with
/// [`ComponentId::check`] before anything is built from them.
///
/// Ordering, equality and hashing are those of the underlying string, so maps
/// keyed by `ComponentId` can be queried with a `&str`.
///
/// ```
/// use contracts::ComponentId;
///
/// let id: ComponentId = "tracker_pose".into();
/// assert_eq!(id, "tracker_pose");
/// assert!(id.check().is_ok());
/// assert!(ComponentId::from("two words").check().is_err());
/// ```
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ComponentId(Arc<str>);

impl ComponentId {
    pub fn new(s: &str) -> Self {
        Self(Arc::from(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can name a component; `Err` carries the reason
    pub fn check(&self) -> Result<(), &'static str> {
        if self.0.is_empty() {
            Err("id must not be empty")
        } else if self.0.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Err("id must not contain whitespace or control characters")
        } else if self.0.contains('.') {
            Err("id must not contain '.'")
        } else {
            Ok(())
        }
    }
}

impl Deref for ComponentId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ComponentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ComponentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ComponentId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<ComponentId> for String {
    fn from(id: ComponentId) -> Self {
        id.0.to_string()
    }
}

impl PartialEq<str> for ComponentId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for ComponentId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({:?})", &*self.0)
    }
}
