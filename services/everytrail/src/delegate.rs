use crate::{ApiContext, ApiRequest, Response};
use everytrail_core::Error;

/// RequestDelegate receives the outcome of an [`ApiRequest`].
///
/// For one request:
///
/// - exactly one of `on_complete` / `on_failed` is called, unless the request is cancelled,
/// - `on_upload_progress` is only called before that, with a non-decreasing `sent`,
/// - no callback runs after [`ApiRequest::cancel`] returned `true`,
/// - callbacks never run concurrently.
pub trait RequestDelegate: Send + Sync + 'static {
    /// The request completed with a parsed response.
    fn on_complete(&self, request: &ApiRequest, response: Response);

    /// The request failed.
    fn on_failed(&self, request: &ApiRequest, error: Error);

    /// Part of an upload body has been handed to the transport.
    fn on_upload_progress(&self, request: &ApiRequest, sent: u64, total: u64) {
        let _ = (request, sent, total);
    }
}

/// UserIdConsumer receives the outcome of [`ApiContext::request_user_id`].
pub trait UserIdConsumer: Send + Sync {
    /// The user id is known.
    fn provides_user_id(&self, context: &ApiContext, user_id: &str);

    /// The user id could not be resolved.
    fn failed_to_provide_user_id(&self, context: &ApiContext, error: Error);
}
