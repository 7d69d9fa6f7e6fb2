//! API Lambda handler - thin entry point that delegates to `routes`.

use lambda_runtime::{Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::routes;
use crate::core::config::AppConfig;
use crate::repository::{AdminConfigRepository, build_repository};

pub use self::function_handler as handler;

// Shared across warm invocations so the configuration cache survives between requests.
static REPOSITORY: OnceCell<Arc<dyn AdminConfigRepository>> = OnceCell::const_new();

async fn repository() -> Result<&'static Arc<dyn AdminConfigRepository>, Error> {
    REPOSITORY
        .get_or_try_init(|| async {
            let config = AppConfig::from_env().map_err(|e| {
                error!("Config error: {}", e);
                Error::from(e)
            })?;
            Ok::<_, Error>(build_repository(&config).await)
        })
        .await
}

/// Lambda handler for the admin configuration API.
///
/// # Errors
///
/// Returns an error only if the service configuration cannot be loaded; request
/// failures are reported as HTTP error responses.
#[tracing::instrument(level = "info", skip(event), fields(request_id = %event.context.request_id))]
pub async fn function_handler(event: LambdaEvent<Value>) -> Result<Value, Error> {
    let repo = repository().await?;

    #[cfg(feature = "debug-logs")]
    info!("API Lambda received request: {:?}", event.payload);
    #[cfg(not(feature = "debug-logs"))]
    info!("API Lambda received request [payload masked, enable debug-logs feature to view it]");

    Ok(routes::route_request(&**repo, &event.payload).await)
}
