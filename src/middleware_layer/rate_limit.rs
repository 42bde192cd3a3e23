use std::sync::Arc;
use axum::Router;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};

use crate::error::{AppError, Result};

/// Requests per second refilled for throttled routes, per client IP.
const REFILL_PER_SECOND: u64 = 1;
/// Requests a client IP may burst before throttling kicks in.
const BURST_SIZE: u32 = 10;

/// Wraps `router` in a per-client-IP token bucket.
///
/// Keys on the peer address, so the server must be started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn throttle_per_ip<S>(router: Router<S>) -> Result<Router<S>>
where
    S: Clone + Send + Sync + 'static,
{
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(REFILL_PER_SECOND)
            .burst_size(BURST_SIZE)
            .use_headers()
            .finish()
            .ok_or_else(|| AppError::Internal("Invalid rate limit settings".to_string()))?,
    );

    Ok(router.layer(GovernorLayer::new(governor_conf)))
}
