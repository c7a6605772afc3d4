use anyhow::Result;
use everytrail::{ApiContext, ApiRequest, Arguments, Config, RequestDelegate, Response};
use everytrail_core::{Context, Error, OsEnv};
use everytrail_http_send_reqwest::ReqwestHttpSend;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Prints progress and hands the outcome back to `main`.
struct Printer(std::sync::Mutex<Option<oneshot::Sender<Result<Response, Error>>>>);

impl Printer {
    fn finish(&self, result: Result<Response, Error>) {
        if let Some(tx) = self.0.lock().expect("lock poisoned").take() {
            let _ = tx.send(result);
        }
    }
}

impl RequestDelegate for Printer {
    fn on_complete(&self, _: &ApiRequest, response: Response) {
        self.finish(Ok(response));
    }

    fn on_failed(&self, _: &ApiRequest, error: Error) {
        self.finish(Err(error));
    }

    fn on_upload_progress(&self, _: &ApiRequest, sent: u64, total: u64) {
        println!("uploaded {sent}/{total} bytes");
    }
}

/// Upload a JPEG file to a trip.
///
/// ```shell
/// EVERYTRAIL_API_KEY=... EVERYTRAIL_API_SECRET=... \
/// EVERYTRAIL_USERNAME=... EVERYTRAIL_PASSWORD=... \
/// cargo run --example upload_photo -- summit.jpg 1042
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(path), Some(trip_id)) = (args.next(), args.next()) else {
        anyhow::bail!("usage: upload_photo <image.jpg> <trip id>");
    };

    let ctx = Context::new()
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);
    let config = Config::from_env(&ctx);
    let api = Arc::new(ApiContext::from_config(ctx, config)?);

    let user_id = api.resolve_user_id().await?;
    println!("uploading as user {user_id}");

    let (tx, rx) = oneshot::channel();
    let req = ApiRequest::new(api).with_delegate(Printer(std::sync::Mutex::new(Some(tx))));
    let image = tokio::fs::File::open(&path).await?;
    let filename = std::path::Path::new(&path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    req.upload_jpeg_image(image, &filename, Arguments::new().with("trip_id", trip_id))?;

    let resp = rx.await??;
    println!("uploaded photo {:?}", resp.text("photoID"));
    Ok(())
}
