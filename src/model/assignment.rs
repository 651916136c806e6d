//! Placement decision for one tablet

use crate::model::{KeyExtent, ServerSession};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub tablet: KeyExtent,
    pub server: ServerSession,
}

impl Assignment {
    pub fn new(tablet: KeyExtent, server: ServerSession) -> Self {
        Self { tablet, server }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.tablet, self.server)
    }
}
