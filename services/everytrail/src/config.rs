use crate::constants::*;
use everytrail_core::utils::Redact;
use everytrail_core::Context;
use std::fmt::{Debug, Formatter};

/// Config for the EveryTrail client.
#[derive(Clone, Default)]
pub struct Config {
    /// API key issued by EveryTrail
    pub api_key: Option<String>,
    /// Shared secret paired with the API key
    pub api_secret: Option<String>,
    /// User name used to resolve the user id
    pub user_name: Option<String>,
    /// Password used to resolve the user id
    pub password: Option<String>,
    /// Already known user id, skips the login round-trip
    pub user_id: Option<String>,
    /// Base URL of the API, defaults to `http://www.everytrail.com/api`
    pub api_endpoint: Option<String>,
    /// URL of the login method, defaults to `http://www.everytrail.com/api/user/login`
    pub auth_endpoint: Option<String>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &Redact::from(&self.api_key))
            .field("api_secret", &Redact::from(&self.api_secret))
            .field("user_name", &self.user_name)
            .field("password", &Redact::from(&self.password))
            .field("user_id", &self.user_id)
            .field("api_endpoint", &self.api_endpoint)
            .field("auth_endpoint", &self.auth_endpoint)
            .finish()
    }
}

impl Config {
    /// Load config from environment variables.
    pub fn from_env(ctx: &Context) -> Self {
        Self {
            api_key: ctx.env_var(EVERYTRAIL_API_KEY),
            api_secret: ctx.env_var(EVERYTRAIL_API_SECRET),
            user_name: ctx.env_var(EVERYTRAIL_USERNAME),
            password: ctx.env_var(EVERYTRAIL_PASSWORD),
            user_id: ctx.env_var(EVERYTRAIL_USER_ID),
            api_endpoint: ctx.env_var(EVERYTRAIL_API_ENDPOINT),
            auth_endpoint: ctx.env_var(EVERYTRAIL_AUTH_ENDPOINT),
        }
    }

    /// Fill the fields that are not set from `other`.
    ///
    /// Values already set on `self` win.
    pub fn merge(self, other: Config) -> Self {
        Self {
            api_key: self.api_key.or(other.api_key),
            api_secret: self.api_secret.or(other.api_secret),
            user_name: self.user_name.or(other.user_name),
            password: self.password.or(other.password),
            user_id: self.user_id.or(other.user_id),
            api_endpoint: self.api_endpoint.or(other.api_endpoint),
            auth_endpoint: self.auth_endpoint.or(other.auth_endpoint),
        }
    }
}
