use crate::constants::DEFAULT_REQUEST_TIMEOUT;
use crate::delegate::UserIdConsumer;
use crate::response::{check_status, text_of};
use crate::ApiContext;
use everytrail_core::hash::basic_auth;
use everytrail_core::{Body, Error, Result};
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Uri};
use log::{debug, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

impl ApiContext {
    /// Resolve the user id of the configured user.
    ///
    /// - A cached user id is returned right away.
    /// - Otherwise the auth endpoint is called with HTTP basic authentication
    ///   and the returned id is cached for the following calls.
    ///
    /// Only one resolution is in flight per context: concurrent callers wait
    /// for it and share its result, success or failure, instead of calling the
    /// auth endpoint again. A failed resolution leaves the id unresolved, so
    /// the next call retries.
    pub async fn resolve_user_id(&self) -> Result<String> {
        self.resolve_user_id_within(DEFAULT_REQUEST_TIMEOUT).await
    }

    pub(crate) async fn resolve_user_id_within(&self, timeout: Duration) -> Result<String> {
        loop {
            if let Some(user_id) = self.user_id() {
                return Ok(user_id);
            }

            let (leader, mut rx) = {
                let mut slot = self.resolution.lock().expect("lock poisoned");
                if let Some(user_id) = self.user_id() {
                    return Ok(user_id);
                }
                match slot.as_ref().map(watch::Receiver::clone) {
                    Some(rx) => (None, rx),
                    None => {
                        let (tx, rx) = watch::channel(None);
                        *slot = Some(rx.clone());
                        (Some(tx), rx)
                    }
                }
            };
            if let Some(tx) = leader {
                return self.lead_resolution(tx, timeout).await;
            }

            debug!("waiting for the user id resolution in flight");
            let outcome = match rx.wait_for(Option::is_some).await {
                Ok(outcome) => outcome.clone(),
                // The attempt in flight was dropped before it settled.
                Err(_) => continue,
            };
            return match outcome {
                Some(Ok(user_id)) => Ok(user_id),
                Some(Err(err)) => Err(replay(&err)),
                None => continue,
            };
        }
    }

    /// Run the login and publish its outcome to the callers waiting on `tx`.
    async fn lead_resolution(
        &self,
        tx: watch::Sender<Resolution>,
        timeout: Duration,
    ) -> Result<String> {
        let _slot = SlotGuard(&self.resolution);

        let result = self.login_as_configured_user(timeout).await;
        let shared = match &result {
            Ok(user_id) => Ok(user_id.clone()),
            Err(err) => Err(Arc::new(replay(err))),
        };
        let _ = tx.send(Some(shared));
        result
    }

    async fn login_as_configured_user(&self, timeout: Duration) -> Result<String> {
        let (user_name, password, generation) = {
            let identity = self.identity.read().expect("lock poisoned");
            match (&identity.user_name, &identity.password) {
                (Some(user_name), Some(password)) if !user_name.is_empty() => {
                    (user_name.clone(), password.clone(), identity.generation)
                }
                _ => {
                    return Err(Error::authentication(
                        "user name and password are required to resolve the user id",
                    ))
                }
            }
        };

        match self.login(&user_name, &password, timeout).await {
            Ok(user_id) => {
                let mut identity = self.identity.write().expect("lock poisoned");
                // Credentials changed while logging in, the id may be stale.
                if identity.generation == generation {
                    identity.user_id = Some(user_id.clone());
                } else {
                    debug!("credentials changed during resolution, user id not cached");
                }
                debug!("resolved user id of {user_name}: {user_id}");
                Ok(user_id)
            }
            Err(err) => {
                warn!("failed to resolve user id of {user_name}: {err}");
                Err(err)
            }
        }
    }

    /// Resolve the user id and hand it to `consumer`.
    ///
    /// The consumer is notified exactly once. Returns `true` if the user id
    /// was already known and no network call was needed.
    pub async fn request_user_id(&self, consumer: &dyn UserIdConsumer) -> bool {
        if let Some(user_id) = self.user_id() {
            consumer.provides_user_id(self, &user_id);
            return true;
        }

        match self.resolve_user_id().await {
            Ok(user_id) => consumer.provides_user_id(self, &user_id),
            Err(err) => consumer.failed_to_provide_user_id(self, err),
        }
        false
    }

    /// Check if a user id resolution is in flight.
    pub fn is_resolving(&self) -> bool {
        self.resolution.lock().expect("lock poisoned").is_some()
    }

    /// Attach the user credentials to an outgoing request.
    pub fn enable_basic_authentication(&self, req: &mut http::request::Parts) -> Result<()> {
        let (user_name, password) = {
            let identity = self.identity.read().expect("lock poisoned");
            (
                identity.user_name.clone().unwrap_or_default(),
                identity.password.clone().unwrap_or_default(),
            )
        };
        apply_basic_auth(&mut req.headers, &user_name, &password)
    }

    async fn login(&self, user_name: &str, password: &str, timeout: Duration) -> Result<String> {
        let uri: Uri = self.auth_endpoint().parse()?;
        debug!("resolving user id through {uri}");

        let mut req = http::Request::get(uri).body(Body::Empty)?;
        apply_basic_auth(req.headers_mut(), user_name, password)?;

        let resp = match tokio::time::timeout(timeout, self.ctx.http_send(req, Some(timeout))).await
        {
            Ok(resp) => resp?,
            Err(_) => {
                return Err(Error::timeout(format!(
                    "user id resolution timed out after {timeout:?}"
                )))
            }
        };
        check_status(resp.status())?;

        let resp = self.parser.parse(resp.body())?;
        if resp.is_error() {
            let code = resp.error_code().unwrap_or(-100);
            return Err(Error::authentication(format!(
                "service refused the login of {user_name}: error {code}"
            ))
            .with_code(code));
        }

        let user_id = resp
            .root()
            .as_object()
            .and_then(|root| {
                root.iter()
                    .find(|(k, _)| {
                        let k = k.to_ascii_lowercase();
                        k == "userid" || k == "user_id"
                    })
                    .and_then(|(_, v)| text_of(v))
                    .or_else(|| root.get("id").and_then(text_of))
            })
            .map(str::trim)
            .ok_or_else(|| Error::faulty_response("login response carries no user id"))?;

        if user_id.is_empty() || !user_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::faulty_response(format!(
                "login response carries an invalid user id: {user_id}"
            )));
        }
        Ok(user_id.to_string())
    }
}

fn apply_basic_auth(headers: &mut HeaderMap, user_name: &str, password: &str) -> Result<()> {
    let mut value: HeaderValue = basic_auth(user_name, password).parse()?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}

/// Copy of `err` for another caller, without its source chain.
fn replay(err: &Error) -> Error {
    Error::new(err.kind(), err.to_string()).with_code(err.code())
}

/// Outcome of a user id resolution, shared with the callers waiting on it.
pub(crate) type Resolution = Option<std::result::Result<String, Arc<Error>>>;

/// Clears the resolution slot once the attempt in flight settles or is dropped.
struct SlotGuard<'a>(&'a Mutex<Option<watch::Receiver<Resolution>>>);

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        *self.0.lock().expect("lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use everytrail_core::Context;

    #[test]
    fn test_enable_basic_authentication() {
        let api = ApiContext::new(Context::new(), "abc", "xyz").with_user("alice", "s3cret");
        let (mut parts, _) = http::Request::get("http://www.everytrail.com/api/user/login")
            .body(())
            .unwrap()
            .into_parts();

        api.enable_basic_authentication(&mut parts).unwrap();

        let value = parts.headers.get(AUTHORIZATION).unwrap();
        assert_eq!(value, "Basic YWxpY2U6czNjcmV0");
        assert!(value.is_sensitive());
    }

    #[tokio::test]
    async fn test_resolve_cached_user_id_without_transport() {
        // The default context has no transport, a cached id must not need one.
        let api = ApiContext::new(Context::new(), "abc", "xyz");
        api.set_user_id("42");

        assert_eq!(api.resolve_user_id().await.unwrap(), "42");
        assert!(!api.is_resolving());
    }

    #[tokio::test]
    async fn test_resolve_without_credentials() {
        let api = ApiContext::new(Context::new(), "abc", "xyz");

        let err = api.resolve_user_id().await.unwrap_err();
        assert_eq!(err.kind(), everytrail_core::ErrorKind::Authentication);
        assert!(!api.is_resolving());
    }
}
