use crate::constants::*;
use crate::response::{ParseResponse, XmlParser};
use crate::auth::Resolution;
use crate::Config;
use everytrail_core::utils::Redact;
use everytrail_core::{Context, Error, Result};
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;

/// User identity, resolved lazily into a user id.
#[derive(Default, Clone)]
pub(crate) struct Identity {
    pub(crate) user_name: Option<String>,
    pub(crate) password: Option<String>,
    pub(crate) user_id: Option<String>,
    // Bumped whenever the credentials change.
    pub(crate) generation: u64,
}

impl Debug for Identity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("user_name", &self.user_name)
            .field("password", &Redact::from(&self.password))
            .field("user_id", &self.user_id)
            .field("generation", &self.generation)
            .finish()
    }
}

/// ApiContext holds everything needed to talk to EveryTrail on behalf of one
/// application: its API key and secret, the user credentials, and the endpoints.
///
/// An `ApiContext` is meant to be configured once and shared (through an
/// [`Arc`]) by all the [`ApiRequest`](crate::ApiRequest)s of the application.
///
/// - The API key and secret never change after construction.
/// - The user id is resolved once through the login endpoint and cached, see
///   [`ApiContext::resolve_user_id`].
///
/// ## Example
///
/// ```
/// use everytrail::{ApiContext, Arguments};
/// use everytrail_core::Context;
///
/// let api = ApiContext::new(Context::new(), "abc", "xyz");
/// let query = api
///     .signed_query(&Arguments::new().with("foo", "1").with("bar", "2"), false)
///     .unwrap();
/// assert_eq!(query, "api_key=abc&bar=2&foo=1&sig=4625167c4d7b90a955b4afb066dab94c");
/// ```
pub struct ApiContext {
    pub(crate) ctx: Context,
    pub(crate) parser: Arc<dyn ParseResponse>,

    key: String,
    secret: String,

    pub(crate) identity: RwLock<Identity>,
    api_endpoint: RwLock<String>,
    auth_endpoint: RwLock<String>,

    // Receiver of the user id resolution in flight, if any.
    pub(crate) resolution: Mutex<Option<watch::Receiver<Resolution>>>,
}

impl Debug for ApiContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiContext")
            .field("ctx", &self.ctx)
            .field("parser", &self.parser)
            .field("key", &Redact::from(&self.key))
            .field("secret", &Redact::from(&self.secret))
            .field("identity", &*self.identity.read().expect("lock poisoned"))
            .field("api_endpoint", &self.api_endpoint())
            .field("auth_endpoint", &self.auth_endpoint())
            .finish()
    }
}

impl ApiContext {
    /// Create a new context with the API key and shared secret.
    pub fn new(ctx: Context, key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            ctx,
            parser: Arc::new(XmlParser),
            key: key.into(),
            secret: secret.into(),
            identity: RwLock::new(Identity::default()),
            api_endpoint: RwLock::new(DEFAULT_API_ENDPOINT.to_string()),
            auth_endpoint: RwLock::new(DEFAULT_AUTH_ENDPOINT.to_string()),
            resolution: Mutex::new(None),
        }
    }

    /// Create a new context from config.
    ///
    /// Returns an error if the API key or secret is missing.
    pub fn from_config(ctx: Context, config: Config) -> Result<Self> {
        let key = config
            .api_key
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config_invalid("api key is required"))?;
        let secret = config
            .api_secret
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config_invalid("api secret is required"))?;

        let mut api = Self::new(ctx, key, secret);
        *api.identity.get_mut().expect("lock poisoned") = Identity {
            user_name: config.user_name,
            password: config.password,
            user_id: config.user_id,
            generation: 0,
        };
        if let Some(endpoint) = config.api_endpoint {
            api = api.with_api_endpoint(endpoint);
        }
        if let Some(endpoint) = config.auth_endpoint {
            api = api.with_auth_endpoint(endpoint);
        }
        Ok(api)
    }

    /// Replace the response parser.
    pub fn with_parser(mut self, parser: impl ParseResponse) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    /// Set the user credentials.
    pub fn with_user(self, user_name: impl Into<String>, password: impl Into<String>) -> Self {
        self.set_user_name(user_name);
        self.set_password(password);
        self
    }

    /// Set the api endpoint.
    pub fn with_api_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.set_api_endpoint(endpoint);
        self
    }

    /// Set the auth endpoint.
    pub fn with_auth_endpoint(self, endpoint: impl Into<String>) -> Self {
        self.set_auth_endpoint(endpoint);
        self
    }

    /// The runtime context.
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// The API key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The shared secret.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// The user name.
    pub fn user_name(&self) -> Option<String> {
        self.identity.read().expect("lock poisoned").user_name.clone()
    }

    /// Set the user name.
    ///
    /// A cached user id belongs to the previous user and is dropped.
    pub fn set_user_name(&self, user_name: impl Into<String>) {
        let mut identity = self.identity.write().expect("lock poisoned");
        identity.user_name = Some(user_name.into());
        identity.user_id = None;
        identity.generation += 1;
    }

    /// The password.
    pub fn password(&self) -> Option<String> {
        self.identity.read().expect("lock poisoned").password.clone()
    }

    /// Set the password.
    ///
    /// A cached user id is dropped.
    pub fn set_password(&self, password: impl Into<String>) {
        let mut identity = self.identity.write().expect("lock poisoned");
        identity.password = Some(password.into());
        identity.user_id = None;
        identity.generation += 1;
    }

    /// The cached user id, if resolved.
    pub fn user_id(&self) -> Option<String> {
        self.identity.read().expect("lock poisoned").user_id.clone()
    }

    /// Set the user id, skipping the resolution.
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.identity.write().expect("lock poisoned").user_id = Some(user_id.into());
    }

    /// The api endpoint.
    pub fn api_endpoint(&self) -> String {
        self.api_endpoint.read().expect("lock poisoned").clone()
    }

    /// Set the api endpoint.
    pub fn set_api_endpoint(&self, endpoint: impl Into<String>) {
        *self.api_endpoint.write().expect("lock poisoned") = endpoint.into();
    }

    /// The auth endpoint.
    pub fn auth_endpoint(&self) -> String {
        self.auth_endpoint.read().expect("lock poisoned").clone()
    }

    /// Set the auth endpoint.
    pub fn set_auth_endpoint(&self, endpoint: impl Into<String>) {
        *self.auth_endpoint.write().expect("lock poisoned") = endpoint.into();
    }

    /// URL of an API method: `{api_endpoint}/{domain}/{method}`.
    pub fn method_url(&self, domain: &str, method: &str) -> String {
        format!(
            "{}/{}/{}",
            self.api_endpoint().trim_end_matches('/'),
            domain.trim_matches('/'),
            method.trim_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use everytrail_core::ErrorKind;

    #[test]
    fn test_from_config_requires_key_and_secret() {
        let err = ApiContext::from_config(
            Context::new(),
            Config {
                api_key: Some("abc".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = ApiContext::from_config(
            Context::new(),
            Config {
                api_key: Some(String::new()),
                api_secret: Some("xyz".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_from_config() {
        let api = ApiContext::from_config(
            Context::new(),
            Config {
                api_key: Some("abc".to_string()),
                api_secret: Some("xyz".to_string()),
                user_name: Some("alice".to_string()),
                password: Some("s3cret".to_string()),
                user_id: Some("42".to_string()),
                api_endpoint: Some("http://localhost:8080/api/".to_string()),
                auth_endpoint: None,
            },
        )
        .unwrap();

        assert_eq!(api.key(), "abc");
        assert_eq!(api.secret(), "xyz");
        assert_eq!(api.user_name().as_deref(), Some("alice"));
        assert_eq!(api.user_id().as_deref(), Some("42"));
        assert_eq!(api.auth_endpoint(), DEFAULT_AUTH_ENDPOINT);
        assert_eq!(
            api.method_url("trip", "search"),
            "http://localhost:8080/api/trip/search"
        );
    }

    #[test]
    fn test_changing_user_drops_user_id() {
        let api = ApiContext::new(Context::new(), "abc", "xyz");
        api.set_user_id("42");
        assert_eq!(api.user_id().as_deref(), Some("42"));

        api.set_user_name("bob");
        assert_eq!(api.user_id(), None);

        api.set_user_id("43");
        api.set_password("another");
        assert_eq!(api.user_id(), None);
    }

    #[test]
    fn test_debug_is_redacted() {
        let api =
            ApiContext::new(Context::new(), "abc", "a-long-shared-secret").with_user("alice", "hunter2");
        let output = format!("{api:?}");
        assert!(!output.contains("a-long-shared-secret"));
        assert!(!output.contains("hunter2"));

        api.set_password("pässwörd-ünïcode");
        let output = format!("{api:?}");
        assert!(!output.contains("pässwörd-ünïcode"));
        assert!(output.contains("päs***ode"));
    }
}
