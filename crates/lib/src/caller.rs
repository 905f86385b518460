use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque caller identity threaded through every operation.
///
/// The core never inspects it beyond its name; authorization decisions are
/// delegated to the backend's capability predicates.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller(String);

impl Caller {
    pub fn new(name: impl Into<String>) -> Self {
        Caller(name.into())
    }

    pub fn anonymous() -> Self {
        Caller("anonymous".into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
