//! Permission checks
//!
//! Credential handling lives outside this crate; the server only asks "can I" questions
//! through `PermissionChecker`.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Watch,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "get",
            Verb::List => "list",
            Verb::Watch => "watch",
            Verb::Create => "create",
            Verb::Update => "update",
            Verb::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn can_i(
        &self,
        verb: Verb,
        resource: &str,
        namespace: &str,
        name: &str,
    ) -> Result<bool, ApiError>;
}

/// Grants everything
pub struct AllowAll;

#[async_trait]
impl PermissionChecker for AllowAll {
    async fn can_i(&self, _: Verb, _: &str, _: &str, _: &str) -> Result<bool, ApiError> {
        Ok(true)
    }
}

/// Denies a fixed set of verb/resource pairs and grants the rest
#[derive(Debug, Default)]
pub struct DenyList {
    denied: HashSet<(Verb, String)>,
}

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(mut self, verb: Verb, resource: &str) -> Self {
        self.denied.insert((verb, resource.to_string()));
        self
    }
}

#[async_trait]
impl PermissionChecker for DenyList {
    async fn can_i(
        &self,
        verb: Verb,
        resource: &str,
        _namespace: &str,
        _name: &str,
    ) -> Result<bool, ApiError> {
        Ok(!self.denied.contains(&(verb, resource.to_string())))
    }
}
