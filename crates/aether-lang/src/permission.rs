use std::fmt::{self, Display, Formatter};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Io,
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Io => write!(f, "io"),
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Permission denied: `{0}` capability is not granted")]
pub struct PermissionDenied(pub Capability);

/// Capabilities granted to programs run by one engine. Everything is denied
/// by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Permissions {
    pub io: bool,
}

impl Permissions {
    pub const fn restricted() -> Self {
        Self { io: false }
    }

    pub const fn all() -> Self {
        Self { io: true }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Io => self.io,
        }
    }

    pub fn check(&self, capability: Capability) -> Result<(), PermissionDenied> {
        if self.allows(capability) {
            Ok(())
        } else {
            Err(PermissionDenied(capability))
        }
    }
}
