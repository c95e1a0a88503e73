use tracing::error;

use crate::error::{GatewayError, Result};
use crate::metrics::render;

pub async fn metrics_handler() -> Result<String> {
    render().map_err(|e| {
        error!(error = %e, "failed to render metrics");
        GatewayError::Internal(e)
    })
}
