use anyhow::Result;
use everytrail_core::{Body, Context};
use everytrail_http_send_reqwest::ReqwestHttpSend;
use reqwest::Client;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Create a custom reqwest client with specific configuration
    let client = Client::builder()
        .pool_max_idle_per_host(10)
        .user_agent("everytrail-example/1.0")
        .build()?;

    // Create context with the custom client
    let ctx = Context::new().with_http_send(ReqwestHttpSend::new(client));

    let test_url = "https://httpbin.org/get";
    println!("Testing HTTP client with GET {test_url}");

    let req = http::Request::builder()
        .method("GET")
        .uri(test_url)
        .header("X-Test-Header", "everytrail-example")
        .body(Body::Empty)?;

    // The per-call timeout wins over anything configured on the client.
    match ctx.http_send(req, Some(Duration::from_secs(10))).await {
        Ok(resp) => {
            println!("Response status: {}", resp.status());
            for (name, value) in resp.headers() {
                println!("  {name}: {value:?}");
            }

            if let Ok(text) = String::from_utf8(resp.body().to_vec()) {
                println!("\nResponse body:");
                println!("{text}");
            }
        }
        Err(e) => {
            eprintln!("Request failed ({}): {e}", e.kind());
        }
    }

    Ok(())
}
