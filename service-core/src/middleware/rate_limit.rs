use crate::error::AppError;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use tokio::task::JoinHandle;

/// Rate limiter keyed by client IP address
pub type IpRateLimiter = Arc<RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>>;

/// Create a keyed rate limiter allowing `per_minute` requests per IP, with
/// the whole minute's allowance available as a burst.
pub fn create_ip_rate_limiter(per_minute: NonZeroU32) -> IpRateLimiter {
    Arc::new(RateLimiter::dashmap(Quota::per_minute(per_minute)))
}

/// Middleware state: the limiter and how the client address is resolved.
#[derive(Clone)]
pub struct IpRateLimit {
    pub limiter: IpRateLimiter,
    /// Key on the first `x-forwarded-for` hop. Only safe behind a proxy that
    /// overwrites the header; otherwise clients pick their own key.
    pub trust_forwarded_for: bool,
}

impl IpRateLimit {
    pub fn new(per_minute: NonZeroU32, trust_forwarded_for: bool) -> Self {
        Self {
            limiter: create_ip_rate_limiter(per_minute),
            trust_forwarded_for,
        }
    }

    /// Periodically forget clients whose quota has fully replenished, so the
    /// key map does not grow with every address ever seen. The task stops once
    /// the limiter itself is dropped.
    pub fn spawn_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(&self.limiter);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                limiter.retain_recent();
                limiter.shrink_to_fit();
                tracing::debug!(tracked = limiter.len(), "Pruned rate limiter state");
            }
        })
    }

    fn client_ip(&self, request: &Request) -> Option<IpAddr> {
        let forwarded_ip = self
            .trust_forwarded_for
            .then(|| forwarded_for(request))
            .flatten();

        forwarded_ip.or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
    }
}

fn forwarded_for(request: &Request) -> Option<IpAddr> {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Middleware for IP-based rate limiting
pub async fn ip_rate_limit_middleware(
    State(limit): State<IpRateLimit>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    match limit.client_ip(&request) {
        Some(ip) => match limit.limiter.check_key(&ip) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                tracing::warn!(client_ip = %ip, "Rate limit exceeded");
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs().max(1)),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
