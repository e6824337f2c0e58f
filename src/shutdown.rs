//! Stop condition for [`crate::server::run`].
//!
//! The server hands [`shutdown_signal`] to axum's graceful shutdown: once it
//! resolves the listener stops accepting connections, and `/stream` responses
//! already in flight keep draining until their change streams end or are
//! cancelled through `/cancel`.
//!
//! ```no_run
//! # async fn example() -> std::io::Result<()> {
//! use std::sync::Arc;
//! use sketch_tutor::{CanvasAiService, OllamaLLM, server};
//!
//! let llm = OllamaLLM::from_url("http://localhost:11434", reqwest::Client::new(), "gemma3:27b")
//!     .expect("valid url");
//! let service = Arc::new(CanvasAiService::new(Arc::new(llm)));
//! // Returns after Ctrl+C or SIGTERM.
//! server::run("127.0.0.1", 3000, service).await
//! # }
//! ```

use tracing::{debug, info, warn};

/// Resolves on `Ctrl+C`, or on `SIGTERM` where the platform has it.
pub async fn shutdown_signal() {
    debug!("canvas server awaiting shutdown signal");
    let which = tokio::select! {
        _ = ctrl_c() => "ctrl-c",
        _ = terminate() => "sigterm",
    };
    info!(signal = which, "stopping canvas server; open streams will drain");
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            warn!(
                error = %e,
                "failed to install SIGTERM handler; only ctrl-c stops the server"
            );
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}
