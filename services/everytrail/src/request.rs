use crate::arguments::Arguments;
use crate::constants::*;
use crate::delegate::RequestDelegate;
use crate::multipart::{spool_image, MultipartForm};
use crate::response::{check_status, Response};
use crate::sign::join_escaped;
use crate::ApiContext;
use everytrail_core::{Body, Error, Result};
use futures::future::{AbortHandle, Abortable, Aborted};
use http::header::CONTENT_TYPE;
use http::{Method, Uri};
use log::{debug, warn};
use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// State of an [`ApiRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Created, not started yet.
    Idle,
    /// Started, the outcome is not known yet.
    Running,
    /// Completed with a response.
    Completed,
    /// Failed with an error.
    Failed,
    /// Cancelled before its outcome was reported.
    Cancelled,
}

/// ApiRequest is one call to the EveryTrail API.
///
/// A request is started once, through [`ApiRequest::call_get`],
/// [`ApiRequest::call_post`] or [`ApiRequest::upload_jpeg_image`], and reports
/// its outcome to its [`RequestDelegate`]. Alternatively [`ApiRequest::get`],
/// [`ApiRequest::post`] and [`ApiRequest::upload`] return the outcome directly.
///
/// `ApiRequest` is a cheap handle: clones refer to the same request.
///
/// ## Example
///
/// ```no_run
/// use everytrail::{ApiContext, ApiRequest, Arguments};
/// use everytrail_core::Context;
/// use std::sync::Arc;
///
/// # async fn example() -> everytrail_core::Result<()> {
/// let api = Arc::new(ApiContext::new(Context::new(), "abc", "xyz"));
/// let resp = ApiRequest::new(api)
///     .get("search", "trip", Arguments::new().with("q", "Mont Blanc"), false)
///     .await?;
/// println!("found: {:?}", resp.get("trips"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ApiRequest {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<ApiContext>,
    delegate: RwLock<Option<Arc<dyn RequestDelegate>>>,
    session_info: RwLock<Option<Arc<dyn Any + Send + Sync>>>,
    timeout: RwLock<Duration>,

    lifecycle: Mutex<Lifecycle>,
    // Held while a callback runs, so callbacks never overlap with `cancel`.
    notify: Mutex<()>,
    notifying: Mutex<Option<ThreadId>>,
}

struct Lifecycle {
    state: RequestState,
    abort: Option<AbortHandle>,
}

enum Call {
    Api {
        method: Method,
        url: String,
        args: Arguments,
        authenticate: bool,
    },
    Upload {
        image: Box<dyn AsyncRead + Send + Unpin>,
        filename: String,
        args: Arguments,
        url: String,
    },
}

impl Debug for ApiRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("state", &self.state())
            .field("timeout", &self.timeout())
            .field("has_delegate", &self.delegate().is_some())
            .finish()
    }
}

impl ApiRequest {
    /// Create a new idle request.
    pub fn new(api: Arc<ApiContext>) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                delegate: RwLock::new(None),
                session_info: RwLock::new(None),
                timeout: RwLock::new(DEFAULT_REQUEST_TIMEOUT),
                lifecycle: Mutex::new(Lifecycle {
                    state: RequestState::Idle,
                    abort: None,
                }),
                notify: Mutex::new(()),
                notifying: Mutex::new(None),
            }),
        }
    }

    /// Set the delegate, builder style.
    pub fn with_delegate(self, delegate: impl RequestDelegate) -> Self {
        self.set_delegate(Arc::new(delegate));
        self
    }

    /// The API context of this request.
    pub fn context(&self) -> &Arc<ApiContext> {
        &self.inner.api
    }

    /// The delegate of this request.
    pub fn delegate(&self) -> Option<Arc<dyn RequestDelegate>> {
        self.inner.delegate.read().expect("lock poisoned").clone()
    }

    /// Set the delegate of this request.
    pub fn set_delegate(&self, delegate: Arc<dyn RequestDelegate>) {
        *self.inner.delegate.write().expect("lock poisoned") = Some(delegate);
    }

    /// Payload attached by the caller.
    pub fn session_info(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.session_info.read().expect("lock poisoned").clone()
    }

    /// Payload attached by the caller, if it is a `T`.
    pub fn session_info_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.session_info()?.downcast::<T>().ok()
    }

    /// Attach a payload to this request, it's never looked at.
    pub fn set_session_info(&self, info: Arc<dyn Any + Send + Sync>) {
        *self.inner.session_info.write().expect("lock poisoned") = Some(info);
    }

    /// Timeout of the calls made by this request.
    pub fn timeout(&self) -> Duration {
        *self.inner.timeout.read().expect("lock poisoned")
    }

    /// Set the timeout, it applies to calls started afterwards.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.inner.timeout.write().expect("lock poisoned") = timeout;
    }

    /// Current state.
    pub fn state(&self) -> RequestState {
        self.lifecycle().state
    }

    /// Check if the request is running.
    pub fn is_running(&self) -> bool {
        self.state() == RequestState::Running
    }

    /// Cancel a running request.
    ///
    /// Returns `true` if the request was running. No delegate callback runs
    /// once this returned `true`, and the upload spool file is removed.
    pub fn cancel(&self) -> bool {
        // Cancelling from inside one of our own callbacks must not wait for it.
        let reentrant =
            *self.inner.notifying.lock().expect("lock poisoned") == Some(thread::current().id());
        let _notify = if reentrant {
            None
        } else {
            Some(self.inner.notify.lock().expect("lock poisoned"))
        };

        let mut lifecycle = self.lifecycle();
        if lifecycle.state != RequestState::Running {
            return false;
        }
        lifecycle.state = RequestState::Cancelled;
        if let Some(abort) = lifecycle.abort.take() {
            abort.abort();
        }
        debug!("request cancelled");
        true
    }

    /// Start a GET call of `{api_endpoint}/{domain}/{method}`.
    ///
    /// The outcome is reported to the delegate. An error is returned only if
    /// the request can't be started.
    pub fn call_get(
        &self,
        method: &str,
        domain: &str,
        args: Arguments,
        authenticate: bool,
    ) -> Result<()> {
        self.spawn(self.api_call(Method::GET, method, domain, args, authenticate))
    }

    /// Start a POST call of `{api_endpoint}/{domain}/{method}`, arguments are
    /// sent form-encoded.
    pub fn call_post(
        &self,
        method: &str,
        domain: &str,
        args: Arguments,
        authenticate: bool,
    ) -> Result<()> {
        self.spawn(self.api_call(Method::POST, method, domain, args, authenticate))
    }

    /// Start the upload of a JPEG image.
    ///
    /// `image` is read to its end before anything is sent, it may be a file
    /// as well as an in-memory buffer. Progress is reported to the delegate
    /// while the body is sent.
    pub fn upload_jpeg_image(
        &self,
        image: impl AsyncRead + Send + Unpin + 'static,
        suggested_filename: &str,
        args: Arguments,
    ) -> Result<()> {
        let url = self.inner.api.method_url(UPLOAD_DOMAIN, UPLOAD_METHOD);
        self.upload_jpeg_image_to(&url, image, suggested_filename, args)
    }

    /// Start the upload of a JPEG image to `url`.
    pub fn upload_jpeg_image_to(
        &self,
        url: &str,
        image: impl AsyncRead + Send + Unpin + 'static,
        suggested_filename: &str,
        args: Arguments,
    ) -> Result<()> {
        self.spawn(Call::Upload {
            image: Box::new(image),
            filename: suggested_filename.to_string(),
            args,
            url: url.to_string(),
        })
    }

    /// GET `{api_endpoint}/{domain}/{method}` and wait for the response.
    ///
    /// Terminal delegate callbacks are not called, the outcome is returned.
    pub async fn get(
        &self,
        method: &str,
        domain: &str,
        args: Arguments,
        authenticate: bool,
    ) -> Result<Response> {
        self.execute(self.api_call(Method::GET, method, domain, args, authenticate))
            .await
    }

    /// POST `{api_endpoint}/{domain}/{method}` and wait for the response.
    pub async fn post(
        &self,
        method: &str,
        domain: &str,
        args: Arguments,
        authenticate: bool,
    ) -> Result<Response> {
        self.execute(self.api_call(Method::POST, method, domain, args, authenticate))
            .await
    }

    /// Upload a JPEG image and wait for the response.
    ///
    /// Progress is still reported to the delegate if one is set.
    pub async fn upload(
        &self,
        image: impl AsyncRead + Send + Unpin + 'static,
        suggested_filename: &str,
        args: Arguments,
    ) -> Result<Response> {
        let url = self.inner.api.method_url(UPLOAD_DOMAIN, UPLOAD_METHOD);
        self.execute(Call::Upload {
            image: Box::new(image),
            filename: suggested_filename.to_string(),
            args,
            url,
        })
        .await
    }

    fn api_call(
        &self,
        method: Method,
        name: &str,
        domain: &str,
        args: Arguments,
        authenticate: bool,
    ) -> Call {
        Call::Api {
            method,
            url: self.inner.api.method_url(domain, name),
            args,
            authenticate,
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.inner.lifecycle.lock().expect("lock poisoned")
    }

    /// Move from `Idle` to `Running`.
    fn begin(&self, abort: AbortHandle) -> Result<()> {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != RequestState::Idle {
            return Err(Error::unknown("request already started"));
        }
        lifecycle.state = RequestState::Running;
        lifecycle.abort = Some(abort);
        Ok(())
    }

    /// Move from `Running` to the terminal state matching `result`.
    ///
    /// Returns `false` if the request is no longer running.
    fn finish<T>(&self, result: &Result<T>) -> bool {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != RequestState::Running {
            return false;
        }
        lifecycle.state = match result {
            Ok(_) => RequestState::Completed,
            Err(_) => RequestState::Failed,
        };
        lifecycle.abort = None;
        true
    }

    fn spawn(&self, call: Call) -> Result<()> {
        let runtime = Handle::try_current().map_err(|e| {
            Error::unknown("requests must be started within a tokio runtime").with_source(e)
        })?;
        let (abort, registration) = AbortHandle::new_pair();
        self.begin(abort)?;

        let req = self.clone();
        runtime.spawn(Abortable::new(
            async move {
                let result = req.run(call).await;
                req.report(result);
            },
            registration,
        ));
        Ok(())
    }

    async fn execute(&self, call: Call) -> Result<Response> {
        let (abort, registration) = AbortHandle::new_pair();
        self.begin(abort)?;
        let _guard = CancelOnDrop(self);

        let result = match Abortable::new(self.run(call), registration).await {
            Ok(result) => result,
            Err(Aborted) => return Err(Error::unknown("request cancelled")),
        };
        if !self.finish(&result) {
            return Err(Error::unknown("request cancelled"));
        }
        result
    }

    /// Run the call, forwarding upload progress to the delegate.
    async fn run(&self, call: Call) -> Result<Response> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let exchange = self.exchange(call, tx);
        tokio::pin!(exchange);

        let result = loop {
            tokio::select! {
                biased;
                Some((sent, total)) = rx.recv() => self.report_progress(sent, total),
                result = &mut exchange => break result,
            }
        };
        // Progress never follows the outcome.
        while let Ok((sent, total)) = rx.try_recv() {
            self.report_progress(sent, total);
        }
        result
    }

    async fn exchange(
        &self,
        call: Call,
        progress: mpsc::UnboundedSender<(u64, u64)>,
    ) -> Result<Response> {
        let api = &self.inner.api;
        let timeout = self.timeout();

        let req = match call {
            Call::Api {
                method,
                url,
                args,
                authenticate,
            } => {
                let uri: Uri = url.parse()?;
                let user_id = if authenticate {
                    Some(api.resolve_user_id_within(timeout).await?)
                } else {
                    None
                };
                let query = join_escaped(&api.signed_values(&args, user_id.as_deref())?);
                debug!("{method} {uri}");

                if method == Method::POST {
                    http::Request::post(uri)
                        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                        .body(Body::from(query))?
                } else {
                    let uri: Uri = format!("{url}?{query}").parse()?;
                    http::Request::get(uri).body(Body::Empty)?
                }
            }
            Call::Upload {
                image,
                filename,
                args,
                url,
            } => {
                let uri: Uri = url.parse()?;
                let user_id = api.resolve_user_id_within(timeout).await?;
                let fields = api.signed_values(&args, Some(&user_id))?;
                let form = MultipartForm::new(&fields, &filename, spool_image(image).await?);
                debug!("POST {uri}: uploading {filename}, {} bytes", form.len());

                http::Request::post(uri)
                    .header(CONTENT_TYPE, form.content_type())
                    .body(form.into_body(Some(progress)))?
            }
        };

        let resp = match tokio::time::timeout(timeout, api.ctx.http_send(req, Some(timeout))).await
        {
            Ok(resp) => resp?,
            Err(_) => {
                return Err(Error::timeout(format!(
                    "request timed out after {timeout:?}"
                )))
            }
        };
        check_status(resp.status())?;
        api.parser.parse(resp.body())?.into_result()
    }

    fn report_progress(&self, sent: u64, total: u64) {
        let _notify = self.begin_notify();
        if self.state() != RequestState::Running {
            return;
        }
        if let Some(delegate) = self.delegate() {
            delegate.on_upload_progress(self, sent, total);
        }
    }

    fn report(&self, result: Result<Response>) {
        let _notify = self.begin_notify();
        if !self.finish(&result) {
            return;
        }

        match (self.delegate(), result) {
            (Some(delegate), Ok(resp)) => delegate.on_complete(self, resp),
            (Some(delegate), Err(err)) => delegate.on_failed(self, err),
            (None, Err(err)) => warn!("request failed without delegate: {err}"),
            (None, Ok(_)) => debug!("request completed without delegate"),
        }
    }

    fn begin_notify(&self) -> NotifyGuard<'_> {
        let lock = self.inner.notify.lock().expect("lock poisoned");
        *self.inner.notifying.lock().expect("lock poisoned") = Some(thread::current().id());
        NotifyGuard {
            _lock: lock,
            notifying: &self.inner.notifying,
        }
    }
}

/// Cancels a request whose awaited call is dropped before it settles.
struct CancelOnDrop<'a>(&'a ApiRequest);

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        let mut lifecycle = self.0.lifecycle();
        if lifecycle.state == RequestState::Running {
            debug!("request dropped while running");
            lifecycle.state = RequestState::Cancelled;
            lifecycle.abort = None;
        }
    }
}

struct NotifyGuard<'a> {
    _lock: MutexGuard<'a, ()>,
    notifying: &'a Mutex<Option<ThreadId>>,
}

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        *self.notifying.lock().expect("lock poisoned") = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use everytrail_core::{Context, ErrorKind};

    fn request() -> ApiRequest {
        ApiRequest::new(Arc::new(ApiContext::new(Context::new(), "abc", "xyz")))
    }

    #[test]
    fn test_defaults() {
        let req = request();
        assert_eq!(req.state(), RequestState::Idle);
        assert!(!req.is_running());
        assert_eq!(req.timeout(), DEFAULT_REQUEST_TIMEOUT);
        assert!(req.delegate().is_none());
        assert!(req.session_info().is_none());
        assert!(!req.cancel(), "idle requests can't be cancelled");
    }

    #[test]
    fn test_session_info() {
        let req = request();
        req.set_session_info(Arc::new(String::from("trip-1042")));

        assert_eq!(
            req.session_info_as::<String>().as_deref().map(String::as_str),
            Some("trip-1042")
        );
        assert!(req.session_info_as::<u32>().is_none());
    }

    #[test]
    fn test_start_without_runtime() {
        let req = request();
        let err = req
            .call_get("search", "trip", Arguments::new(), false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(req.state(), RequestState::Idle);
    }

    #[tokio::test]
    async fn test_request_is_not_reusable() {
        let req = request();
        // No transport configured: the call fails with a connection error.
        let err = req
            .get("search", "trip", Arguments::new(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connection);
        assert_eq!(req.state(), RequestState::Failed);

        let err = req
            .get("search", "trip", Arguments::new(), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(req.state(), RequestState::Failed);
    }
}
