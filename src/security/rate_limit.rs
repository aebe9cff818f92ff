//! Fixed-window rate limiting with IP and user scopes.
//!
//! # Data Flow
//! ```text
//! request
//!     → rate_limit_middleware (action category chosen per route)
//!     → RateLimiter::check_action
//!         → IP scope   "<action>:ip:<addr>"   (deny short-circuits, reason = ip)
//!         → user scope "<action>:user:<id>"   (reason = user)
//!     → handler, or 429 with Retry-After
//! ```
//!
//! # Design Decisions
//! - The limiter is an explicitly constructed value shared through `AppState`,
//!   so tests build isolated instances
//! - Counters live in a `DashMap`; the entry API holds the shard lock for the
//!   whole check, so concurrent checks on one key cannot lose updates
//! - State is per-process and lost on restart. It is a coarse defense layer,
//!   not a quota of record; horizontally scaled deployments under-protect
//! - Expired entries are removed by a periodic sweep task

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::{RatePolicies, RatePolicy, ScopedPolicy};
use crate::http::request::owner_id;
use crate::http::response::rate_limited;
use crate::http::server::AppState;
use crate::observability::metrics;

/// Action categories with their own named policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionCategory {
    Auth,
    AiInvocation,
    Mutation,
    BookmarkCreate,
    FileUpload,
}

impl ActionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionCategory::Auth => "auth",
            ActionCategory::AiInvocation => "ai_invocation",
            ActionCategory::Mutation => "mutation",
            ActionCategory::BookmarkCreate => "bookmark_create",
            ActionCategory::FileUpload => "file_upload",
        }
    }

    pub fn policy<'a>(&self, policies: &'a RatePolicies) -> &'a ScopedPolicy {
        match self {
            ActionCategory::Auth => &policies.auth,
            ActionCategory::AiInvocation => &policies.ai_invocation,
            ActionCategory::Mutation => &policies.mutation,
            ActionCategory::BookmarkCreate => &policies.bookmark_create,
            ActionCategory::FileUpload => &policies.file_upload,
        }
    }
}

/// Which scope denied a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    Ip,
    User,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Ip => "ip",
            LimitScope::User => "user",
        }
    }
}

/// Counter for one key in its current window.
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_start: Instant,
    pub window_ms: u32,
}

impl RateLimitEntry {
    fn start(now: Instant, window_ms: u32) -> Self {
        Self {
            count: 1,
            window_start: now,
            window_ms,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_millis(u64::from(self.window_ms))
    }

    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) > self.window()
    }

    fn reset_in_ms(&self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.window_start);
        let left = self.window().saturating_sub(elapsed).as_millis();
        u32::try_from(left).unwrap_or(u32::MAX)
    }
}

/// Outcome of a single-scope check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in_ms: u32,
}

/// Outcome of an IP + user check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<LimitScope>,
    pub remaining: u32,
    pub reset_in_ms: u32,
}

impl CombinedDecision {
    fn denied(scope: LimitScope, decision: RateLimitDecision) -> Self {
        Self {
            allowed: false,
            reason: Some(scope),
            remaining: 0,
            reset_in_ms: decision.reset_in_ms,
        }
    }

    fn allowed(decision: RateLimitDecision) -> Self {
        Self {
            allowed: true,
            reason: None,
            remaining: decision.remaining,
            reset_in_ms: decision.reset_in_ms,
        }
    }

    /// Seconds a client should wait before retrying, rounded up.
    pub fn retry_after_secs(&self) -> u32 {
        self.reset_in_ms.div_ceil(1000).max(1)
    }
}

/// Process-wide store of fixed-window counters.
#[derive(Debug, Default)]
pub struct RateLimiter {
    entries: DashMap<String, RateLimitEntry>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check_limit(&self, key: &str, policy: &RatePolicy) -> RateLimitDecision {
        self.check_limit_at(key, policy, Instant::now())
    }

    /// Fixed-window check against an explicit clock reading.
    ///
    /// A denied call does not increment the counter, so `count` never exceeds
    /// `max_requests` within a window.
    pub fn check_limit_at(&self, key: &str, policy: &RatePolicy, now: Instant) -> RateLimitDecision {
        let fresh = RateLimitDecision {
            allowed: true,
            remaining: policy.max_requests.saturating_sub(1),
            reset_in_ms: policy.window_ms,
        };

        match self.entries.entry(key.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitEntry::start(now, policy.window_ms));
                fresh
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.is_expired(now) {
                    *entry = RateLimitEntry::start(now, policy.window_ms);
                    return fresh;
                }
                if entry.count >= policy.max_requests {
                    return RateLimitDecision {
                        allowed: false,
                        remaining: 0,
                        reset_in_ms: entry.reset_in_ms(now),
                    };
                }
                entry.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: policy.max_requests - entry.count,
                    reset_in_ms: entry.reset_in_ms(now),
                }
            }
        }
    }

    pub fn check_combined(
        &self,
        ip_key: &str,
        user_key: Option<&str>,
        ip_policy: &RatePolicy,
        user_policy: Option<&RatePolicy>,
    ) -> CombinedDecision {
        self.check_combined_at(ip_key, user_key, ip_policy, user_policy, Instant::now())
    }

    /// IP scope first; a denial there never touches the user budget.
    ///
    /// The user scope is evaluated when `user_key` is present, with
    /// `user_policy` or, failing that, the IP policy. On success the smaller
    /// `remaining` and `reset_in_ms` of the two scopes are reported.
    pub fn check_combined_at(
        &self,
        ip_key: &str,
        user_key: Option<&str>,
        ip_policy: &RatePolicy,
        user_policy: Option<&RatePolicy>,
        now: Instant,
    ) -> CombinedDecision {
        let ip = self.check_limit_at(ip_key, ip_policy, now);
        if !ip.allowed {
            return CombinedDecision::denied(LimitScope::Ip, ip);
        }

        let Some(user_key) = user_key else {
            return CombinedDecision::allowed(ip);
        };
        let user = self.check_limit_at(user_key, user_policy.unwrap_or(ip_policy), now);
        if !user.allowed {
            return CombinedDecision::denied(LimitScope::User, user);
        }

        CombinedDecision::allowed(RateLimitDecision {
            allowed: true,
            remaining: ip.remaining.min(user.remaining),
            reset_in_ms: ip.reset_in_ms.min(user.reset_in_ms),
        })
    }

    /// Check the named policy for `action` with namespaced keys.
    pub fn check_action(
        &self,
        action: ActionCategory,
        ip: IpAddr,
        user: Option<&str>,
        policies: &RatePolicies,
    ) -> CombinedDecision {
        let scoped = action.policy(policies);
        let ip_key = format!("{}:ip:{}", action.as_str(), ip);
        let user_key = user.map(|id| format!("{}:user:{}", action.as_str(), id));

        let decision = self.check_combined(
            &ip_key,
            user_key.as_deref(),
            &scoped.ip,
            scoped.user.as_ref(),
        );
        if let Some(scope) = decision.reason {
            tracing::warn!(
                action = action.as_str(),
                scope = scope.as_str(),
                client = %ip,
                reset_in_ms = decision.reset_in_ms,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(scope.as_str(), action.as_str());
        }
        decision
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    /// Drop every entry whose window has ended. Returns how many were removed.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        metrics::record_rate_limit_entries(self.entries.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run `sweep_expired` every `interval` until shutdown.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep_expired();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = limiter.len(), "Swept expired rate limit entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limit sweeper stopping");
                    break;
                }
            }
        }
    })
}

/// Middleware state: the shared app state plus the route's action category.
#[derive(Clone)]
pub struct RateLimitGuard {
    pub state: AppState,
    pub action: ActionCategory,
}

/// Middleware enforcing the route's policy for the client IP and acting owner.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let settings = guard.state.settings.load_full();
    if !settings.rate_limit.enabled {
        return next.run(request).await;
    }

    let owner = owner_id(request.headers());
    let decision = guard.state.limiter.check_action(
        guard.action,
        addr.ip(),
        owner.as_deref(),
        &settings.rate_limit.policies,
    );
    if !decision.allowed {
        return rate_limited(&decision);
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    headers.insert("x-ratelimit-reset-ms", HeaderValue::from(decision.reset_in_ms));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: RatePolicy = RatePolicy::new(3, 1000);

    #[test]
    fn test_fixed_window_sequence() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();

        let remaining: Vec<u32> = (0..3)
            .map(|i| {
                let d = limiter.check_limit_at("u1", &POLICY, t0 + Duration::from_millis(i * 10));
                assert!(d.allowed);
                d.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        let denied = limiter.check_limit_at("u1", &POLICY, t0 + Duration::from_millis(100));
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_in_ms, 900);

        // Other keys are independent.
        assert!(limiter.check_limit_at("u2", &POLICY, t0 + Duration::from_millis(100)).allowed);

        // Exactly at the window edge the window is still current.
        assert!(!limiter.check_limit_at("u1", &POLICY, t0 + Duration::from_millis(1000)).allowed);

        let renewed = limiter.check_limit_at("u1", &POLICY, t0 + Duration::from_millis(1001));
        assert!(renewed.allowed);
        assert_eq!(renewed.remaining, 2);
        assert_eq!(renewed.reset_in_ms, 1000);
    }

    #[test]
    fn test_denied_calls_do_not_increment() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        for _ in 0..10 {
            limiter.check_limit_at("k", &POLICY, t0);
        }
        let count = limiter.entries.get("k").unwrap().count;
        assert_eq!(count, POLICY.max_requests);
    }

    #[test]
    fn test_ip_denial_does_not_consume_user_budget() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        let ip_policy = RatePolicy::new(1, 1000);
        let user_policy = RatePolicy::new(5, 1000);

        let first = limiter.check_combined_at("ip", Some("user"), &ip_policy, Some(&user_policy), t0);
        assert!(first.allowed);
        assert_eq!(first.remaining, 0);

        let second = limiter.check_combined_at("ip", Some("user"), &ip_policy, Some(&user_policy), t0);
        assert!(!second.allowed);
        assert_eq!(second.reason, Some(LimitScope::Ip));
        assert_eq!(limiter.entries.get("user").unwrap().count, 1);
    }

    #[test]
    fn test_user_denial_reports_user_scope() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        let ip_policy = RatePolicy::new(10, 1000);
        let user_policy = RatePolicy::new(2, 500);

        let first = limiter.check_combined_at("ip", Some("u"), &ip_policy, Some(&user_policy), t0);
        assert_eq!(first.remaining, 1);
        assert_eq!(first.reset_in_ms, 500);
        limiter.check_combined_at("ip", Some("u"), &ip_policy, Some(&user_policy), t0);
        let third = limiter.check_combined_at("ip", Some("u"), &ip_policy, Some(&user_policy), t0);
        assert!(!third.allowed);
        assert_eq!(third.reason, Some(LimitScope::User));

        // Without a user key only the IP scope applies.
        let anon = limiter.check_combined_at("ip2", None, &ip_policy, Some(&user_policy), t0);
        assert!(anon.allowed);
        assert_eq!(anon.remaining, 9);
    }

    #[test]
    fn test_user_scope_falls_back_to_ip_policy() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        let ip_policy = RatePolicy::new(2, 1000);
        limiter.check_combined_at("a", Some("u"), &ip_policy, None, t0);
        limiter.check_combined_at("b", Some("u"), &ip_policy, None, t0);
        let third = limiter.check_combined_at("c", Some("u"), &ip_policy, None, t0);
        assert_eq!(third.reason, Some(LimitScope::User));
    }

    #[test]
    fn test_actions_use_separate_budgets() {
        let limiter = RateLimiter::new();
        let mut policies = RatePolicies::default();
        policies.auth.ip = RatePolicy::new(1, 60_000);
        let ip: IpAddr = "203.0.113.7".parse().unwrap();

        assert!(limiter.check_action(ActionCategory::Auth, ip, None, &policies).allowed);
        let denied = limiter.check_action(ActionCategory::Auth, ip, None, &policies);
        assert_eq!(denied.reason, Some(LimitScope::Ip));
        assert!(limiter.check_action(ActionCategory::Mutation, ip, None, &policies).allowed);
    }

    #[test]
    fn test_sweep_removes_expired_entries() {
        let limiter = RateLimiter::new();
        let t0 = Instant::now();
        limiter.check_limit_at("short", &RatePolicy::new(5, 100), t0);
        limiter.check_limit_at("long", &RatePolicy::new(5, 10_000), t0);
        assert_eq!(limiter.len(), 2);

        assert_eq!(limiter.sweep_expired_at(t0 + Duration::from_millis(50)), 0);
        assert_eq!(limiter.sweep_expired_at(t0 + Duration::from_millis(200)), 1);
        assert_eq!(limiter.len(), 1);
        assert!(limiter.entries.contains_key("long"));
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let decision = CombinedDecision {
            allowed: false,
            reason: Some(LimitScope::Ip),
            remaining: 0,
            reset_in_ms: 1001,
        };
        assert_eq!(decision.retry_after_secs(), 2);
        let decision = CombinedDecision { reset_in_ms: 0, ..decision };
        assert_eq!(decision.retry_after_secs(), 1);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new());
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_sweeper(limiter, Duration::from_millis(10), rx);
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper did not stop")
            .unwrap();
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(RateLimiter::new());
        let policy = RatePolicy::new(50, 60_000);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.check_limit("shared", &policy).allowed)
                        .count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
