//! Requests accepted by the decision service

use serde::{Deserialize, Serialize};

/// One authentication attempt to judge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
    /// Host address, no mask
    pub ip: String,
}

impl AuthRequest {
    pub fn new(login: impl Into<String>, password: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
            ip: ip.into(),
        }
    }
}

/// Buckets to drop; `None` (or an empty string) leaves that storage alone
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClearBucketRequest {
    pub login: Option<String>,
    pub password: Option<String>,
    /// Host address, or a subnet to drop every IP bucket it covers
    pub ip: Option<String>,
}

impl ClearBucketRequest {
    pub fn login(mut self, login: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Non-empty login, if any
    pub fn login_key(&self) -> Option<&str> {
        non_empty(&self.login)
    }

    pub fn password_key(&self) -> Option<&str> {
        non_empty(&self.password)
    }

    pub fn ip_key(&self) -> Option<&str> {
        non_empty(&self.ip)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// Operation carried by a `NetworkMessage::Request`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Request {
    Auth(AuthRequest),
    AddToBlackList { ip: String },
    AddToWhiteList { ip: String },
    RemoveFromBlackList { ip: String },
    RemoveFromWhiteList { ip: String },
    ClearBucket(ClearBucketRequest),
    ClearBlackList,
    ClearWhiteList,
    CountBuckets,
}

impl Request {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Auth(_) => "auth",
            Request::AddToBlackList { .. } => "add_to_blacklist",
            Request::AddToWhiteList { .. } => "add_to_whitelist",
            Request::RemoveFromBlackList { .. } => "remove_from_blacklist",
            Request::RemoveFromWhiteList { .. } => "remove_from_whitelist",
            Request::ClearBucket(_) => "clear_bucket",
            Request::ClearBlackList => "clear_blacklist",
            Request::ClearWhiteList => "clear_whitelist",
            Request::CountBuckets => "count_buckets",
        }
    }
}
