//! Standalone chat server.
//!
//! Configured through `TELETYPE_*` environment variables (see
//! `ServerConfig::from_env`) and `RUST_LOG`. Stops on Ctrl-C.

use teletype::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing("teletype_server", "info");

    let config = ServerConfig::from_env()?;
    tracing::info!(?config, "starting teletype server");

    let server = TeletypeServer::builder().config(config).build().await?;

    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("ctrl-c received");
                shutdown.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "cannot listen for ctrl-c"),
        }
    });

    server.run().await?;
    Ok(())
}
