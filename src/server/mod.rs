pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::app_router;

use crate::AdSyncDW;

#[derive(Clone)]
pub struct AppState {
    pub dw: AdSyncDW,
}

impl AppState {
    pub fn new(dw: AdSyncDW) -> Self {
        Self { dw }
    }
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(dw: AdSyncDW, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app_router(AppState::new(dw))).await
}
