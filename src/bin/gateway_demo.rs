//! Runs the gateway against the in-process backend: three requests fail with a
//! stale token at once, one refresh serves them all, then a revoked refresh
//! token ends the session.
//!
//! $ cargo run --bin gateway_demo

use pandit_session::application_impl::*;
use pandit_session::application_port::*;
use pandit_session::client::ApiClient;
use pandit_session::domain_model::*;
use pandit_session::domain_port::*;
use pandit_session::infra::*;
use pandit_session::logger::*;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    logger.reload_from_config(&LogConfig {
        filter: "pandit_session=debug,info".to_string(),
    })?;

    let transport = Arc::new(
        FakeHttpTransport::new(DEFAULT_REFRESH_PATH)
            .with_valid_refresh("demo-refresh")
            .with_refresh_delay(Duration::from_millis(200)),
    );
    let store = Arc::new(MemoryCredentialStore::new());
    store.set(ACCESS_TOKEN_KEY, "stale").await?;
    store.set(REFRESH_TOKEN_KEY, "demo-refresh").await?;

    let listener: Arc<dyn SessionListener> = Arc::new(|error: &RefreshError| {
        println!("session ended: {}", error);
    });
    let client = ApiClient::from_parts(
        store.clone(),
        transport.clone(),
        listener,
        GatewayConfig::default(),
    );

    // region concurrent refresh

    let handles: Vec<_> = ["/bookings/", "/shop/cart/", "/users/profile/"]
        .into_iter()
        .map(|path| {
            let gateway = client.gateway.clone();
            tokio::spawn(async move { (path, gateway.request(ApiRequest::get(path)).await) })
        })
        .collect();
    for handle in handles {
        let (path, result) = handle.await?;
        match result {
            Ok(response) => println!("{} -> {}", path, response.status),
            Err(e) => println!("{} -> {}", path, e),
        }
    }
    println!("refresh calls: {}", transport.refresh_calls());

    // endregion

    // region session end

    transport.expire_access();
    store.set(REFRESH_TOKEN_KEY, "revoked").await?;
    let result = client.gateway.request(ApiRequest::get("/users/profile/")).await;
    println!("after revoke: {:?}", result.map(|r| r.status));
    println!("state: {:?}", client.gateway.session_state());

    // endregion

    Ok(())
}
