//! Type-safe class identifier.
//!
//! [`ClassId`] names a module, controller or handler class as reported by
//! the declaration-discovery pass (for example `"app::ws::ChatController"`).
//! It is the key the route table and the instance container agree on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Path separators accepted when deriving a short class name.
const SEPARATORS: [&str; 3] = ["::", "\\", "/"];

/// Identifier of a registered class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(String);

impl ClassId {
    /// Creates a `ClassId` from any string-like value.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the fully qualified name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the last path segment, e.g. `ChatController` for
    /// `app::ws::ChatController`.
    #[must_use]
    pub fn short_name(&self) -> &str {
        SEPARATORS
            .iter()
            .filter_map(|sep| self.0.rsplit_once(sep).map(|(_, tail)| tail))
            .min_by_key(|tail| tail.len())
            .unwrap_or(&self.0)
    }

    /// Returns the short name with `suffix` stripped, falling back to the
    /// whole short name when stripping would leave nothing.
    #[must_use]
    pub fn short_name_without(&self, suffix: &str) -> &str {
        let short = self.short_name();
        match short.strip_suffix(suffix) {
            Some(stem) if !stem.is_empty() => stem,
            _ => short,
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClassId {
    fn from(name: String) -> Self {
        Self(name)
    }
}
