//! Redis connection helpers shared by the stores, the lock provider and
//! the broadcaster.

use std::error::Error as StdError;
use std::time::Duration;

use rand::random;
use redis::aio::{ConnectionManager, PubSub};
use redis::Client;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::AppError;

// Subscriber retry configuration (background tasks)
const INITIAL_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_DELAY_MULTIPLIER: f64 = 2.0;
const JITTER_PERCENT: f64 = 0.2;

// Publisher retry configuration (submission / transition path)
pub const PUBLISHER_MAX_ATTEMPTS: u32 = 3;
const PUBLISHER_INITIAL_RETRY_DELAY_MS: u64 = 50;
const PUBLISHER_MAX_RETRY_DELAY_MS: u64 = 200;

pub fn open_client(redis_url: &str) -> Result<Client, AppError> {
    Client::open(redis_url)
        .map_err(|err| AppError::config(format!("Invalid GAME_REDIS_URL: {err}")))
}

/// Multiplexed, auto-reconnecting connection for commands.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, AppError> {
    let client = open_client(redis_url)?;
    ConnectionManager::new(client).await.map_err(|err| AppError::StoreUnavailable {
        detail: "Unable to initialize Redis connection manager".to_string(),
        source: Some(Box::new(err)),
    })
}

/// Dedicated pub/sub connection. Only TCP addresses are supported.
pub async fn open_pubsub(redis_url: &str) -> Result<PubSub, AppError> {
    let client = open_client(redis_url)?;
    let conn_info = client.get_connection_info();

    let addr = match conn_info.addr().clone() {
        redis::ConnectionAddr::Tcp(host, port) => (host, port),
        _ => {
            return Err(AppError::config(
                "Only TCP protocol is supported for pubsub",
            ));
        }
    };

    info!(host = %addr.0, port = addr.1, "Connecting to Redis for subscription");

    let stream = tokio::net::TcpStream::connect(addr)
        .await
        .map_err(|err| AppError::StoreUnavailable {
            detail: format!("Failed to connect to Redis for subscription: {err}"),
            source: Some(Box::new(err)),
        })?;

    PubSub::new(conn_info.redis_settings(), stream)
        .await
        .map_err(AppError::from)
}

/// Connection-level failures worth retrying; configuration problems are not.
pub fn is_transient_error(err: &AppError) -> bool {
    if let AppError::Config { .. } = err {
        return false;
    }

    let error_msg = err.to_string().to_lowercase();

    if error_msg.contains("authentication failed")
        || error_msg.contains("noscript")
        || error_msg.contains("wrongtype")
        || error_msg.contains("unsupported")
    {
        return false;
    }

    if let Some(source) = StdError::source(err) {
        if let Some(redis_err) = source.downcast_ref::<redis::RedisError>() {
            if redis_err.is_io_error()
                || redis_err.is_timeout()
                || redis_err.is_connection_dropped()
                || redis_err.is_connection_refusal()
            {
                return true;
            }
        }
        if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
            match io_err.kind() {
                std::io::ErrorKind::PermissionDenied => return false,
                std::io::ErrorKind::Unsupported => return false,
                _ => return true,
            }
        }
    }

    matches!(err, AppError::StoreUnavailable { .. })
}

/// Backoff for reconnecting background subscribers: doubling from 1s,
/// capped at 60s, +/-20% jitter.
pub fn subscriber_retry_delay(attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let base_delay = INITIAL_RETRY_DELAY_SECS as f64 * RETRY_DELAY_MULTIPLIER.powi(exponent);
    let capped_delay = base_delay.min(MAX_RETRY_DELAY_SECS as f64);

    let jitter_range = capped_delay * JITTER_PERCENT;
    let jitter = (random::<f64>() * 2.0 - 1.0) * jitter_range;
    let final_delay = (capped_delay + jitter).max(0.1);

    Duration::from_secs_f64(final_delay)
}

/// PUBLISH with bounded retry on transient failures.
pub async fn publish_with_retry(
    conn: &ConnectionManager,
    channel: &str,
    payload: &str,
) -> Result<(), AppError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let mut publisher = conn.clone();
        let publish_res: redis::RedisResult<i64> = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(payload)
            .query_async(&mut publisher)
            .await;

        match publish_res {
            Ok(_) => return Ok(()),
            Err(err) => {
                let app_err = AppError::from(err);
                if attempt >= PUBLISHER_MAX_ATTEMPTS || !is_transient_error(&app_err) {
                    return Err(app_err);
                }

                let delay_ms = PUBLISHER_INITIAL_RETRY_DELAY_MS
                    .saturating_mul(2_u64.pow(attempt - 1))
                    .min(PUBLISHER_MAX_RETRY_DELAY_MS);
                warn!(
                    error = %app_err,
                    channel,
                    attempt,
                    retry_delay_ms = delay_ms,
                    "Redis publish failed, retrying"
                );
                sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
