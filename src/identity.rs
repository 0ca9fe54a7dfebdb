//! Caller identity
//!
//! Identity is resolved outside the engine (by whatever auth collaborator the
//! deployment uses) and then passed explicitly into every service, scheduler
//! and broadcast call as a [`Caller`]. Nothing in the engine reads an ambient
//! "current user".

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AuthorizationError;

/// Opaque owner identifier scoping monitors, notifications and connections
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The authenticated caller of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub owner: OwnerId,
}

impl Caller {
    pub fn new(owner: impl Into<OwnerId>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    /// Fail unless `owner` is the caller
    pub fn authorize(&self, owner: &OwnerId) -> Result<(), AuthorizationError> {
        if &self.owner == owner {
            Ok(())
        } else {
            Err(AuthorizationError {
                caller: self.owner.clone(),
            })
        }
    }
}

impl From<String> for OwnerId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Maps a presented credential to a caller
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Caller>;
}

/// Resolver backed by a fixed token → owner table from the config file
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, OwnerId>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, owner)| (token, OwnerId::new(owner)))
                .collect(),
        }
    }
}

impl IdentityResolver for StaticTokenResolver {
    fn resolve(&self, token: &str) -> Option<Caller> {
        self.tokens.get(token).map(|owner| Caller {
            owner: owner.clone(),
        })
    }
}
