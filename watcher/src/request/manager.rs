//! The central fetch gateway
//!
//! Every outbound page request flows through here. The gateway normalizes
//! the URL into the key shared by the response cache, the in-flight map,
//! and the circuit breaker table; concurrent fetches for the same key
//! collapse onto a single transport call whose result fans out over a
//! broadcast channel.

use super::robots::RobotsPolicy;
use super::{headers, FetchResult};
use crate::circuit::{CircuitBreaker, CircuitState};
use crate::constants::{circuit as circuit_defaults, http as limits};
use crate::errors::FetchError;
use crate::metrics::Metrics;
use chrono::Utc;
use rand::Rng;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

const TRACKING_PARAMS: [&str; 7] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
];

/// Cache and in-flight map share one lock so the lookup-or-register step
/// is atomic.
struct FetchTables {
    cache: HashMap<String, (FetchResult, Instant)>,
    in_flight: HashMap<String, broadcast::Sender<FetchResult>>,
}

enum Role {
    Leader(broadcast::Sender<FetchResult>),
    Follower(broadcast::Receiver<FetchResult>),
}

pub struct RequestManager {
    client: Client,
    tables: Mutex<FetchTables>,
    circuits: Mutex<HashMap<String, CircuitBreaker>>,
    robots: Mutex<HashMap<String, RobotsPolicy>>,
    metrics: Arc<Metrics>,
    hard_timeout: Duration,
    jitter: (f64, f64),
}

impl RequestManager {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self::with_settings(
            metrics,
            limits::HARD_TIMEOUT,
            (limits::MIN_JITTER_SECS, limits::MAX_JITTER_SECS),
        )
    }

    /// Tests shrink the deadline and disable jitter.
    pub fn with_settings(metrics: Arc<Metrics>, hard_timeout: Duration, jitter: (f64, f64)) -> Self {
        // The outer cooperative deadline is authoritative; the client's
        // own timeout sits behind it as a backstop.
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(10))
            .timeout(hard_timeout + Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            tables: Mutex::new(FetchTables {
                cache: HashMap::new(),
                in_flight: HashMap::new(),
            }),
            circuits: Mutex::new(HashMap::new()),
            robots: Mutex::new(HashMap::new()),
            metrics,
            hard_timeout,
            jitter,
        }
    }

    /// Canonical form used as the cache, coalescing, and breaker key.
    ///
    /// Tracking query keys are dropped and the remainder re-encoded in
    /// sorted order; the `url` crate lowercases scheme and authority.
    /// Idempotent.
    pub fn normalize_url(url: &str) -> String {
        let Ok(mut parsed) = Url::parse(url) else {
            return url.trim().to_string();
        };
        let mut pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        pairs.sort();
        if pairs.is_empty() {
            parsed.set_query(None);
        } else {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(pairs)
                .finish();
            parsed.set_query(Some(&encoded));
        }
        parsed.to_string()
    }

    pub async fn fetch(&self, url: &str) -> FetchResult {
        let key = Self::normalize_url(url);

        // Jitter defeats request-pattern detection.
        let delay = {
            let mut rng = rand::rng();
            rng.random_range(self.jitter.0..=self.jitter.1)
        };
        if delay > 0.0 {
            debug!("applying {:.2}s jitter for {}", delay, url);
            tokio::time::sleep(Duration::from_secs_f64(delay)).await;
        }

        if !self.circuit_allows(&key).await {
            let error = FetchError::CircuitOpen { key: key.clone() };
            warn!("{}", error);
            self.metrics.record_request(0.0, false);
            return FetchResult::failure(url, error.to_string());
        }

        let role = {
            let mut tables = self.tables.lock().await;
            let mut cached = None;
            let mut expired = false;
            if let Some((result, inserted)) = tables.cache.get(&key) {
                if inserted.elapsed() < limits::CACHE_TTL {
                    cached = Some(result.clone());
                } else {
                    expired = true;
                }
            }
            if expired {
                tables.cache.remove(&key);
            }
            if let Some(result) = cached {
                debug!("cache hit for {}", key);
                self.metrics.record_request(0.0, true);
                return result;
            }
            if let Some(sender) = tables.in_flight.get(&key) {
                debug!("coalescing onto active fetch for {}", key);
                Role::Follower(sender.subscribe())
            } else {
                let (tx, _) = broadcast::channel(16);
                tables.in_flight.insert(key.clone(), tx.clone());
                Role::Leader(tx)
            }
        };

        match role {
            Role::Follower(mut rx) => rx
                .recv()
                .await
                .unwrap_or_else(|_| FetchResult::failure(url, "coalesced fetch aborted")),
            Role::Leader(tx) => {
                let started = Instant::now();
                let result = self.lead_fetch(url, &key).await;
                self.metrics
                    .record_request(started.elapsed().as_secs_f64(), result.is_success());
                {
                    let mut tables = self.tables.lock().await;
                    // Only completed HTTP exchanges are cacheable; timeouts
                    // and transport failures should retry immediately.
                    if result.status_code != 0 {
                        tables.cache.insert(key.clone(), (result.clone(), Instant::now()));
                    }
                    tables.in_flight.remove(&key);
                }
                let _ = tx.send(result.clone());
                result
            }
        }
    }

    async fn lead_fetch(&self, url: &str, key: &str) -> FetchResult {
        if !self.robots_allows(url).await {
            let error = FetchError::RobotsDisallow {
                url: url.to_string(),
            };
            warn!("{}", error);
            return FetchResult::failure(url, error.to_string());
        }

        match timeout(self.hard_timeout, self.execute(url, key)).await {
            Ok(result) => result,
            Err(_) => {
                let error = FetchError::HardTimeout {
                    url: url.to_string(),
                    seconds: self.hard_timeout.as_secs(),
                };
                warn!("{}", error);
                self.record_circuit_failure(key).await;
                FetchResult::failure(url, error.to_string())
            }
        }
    }

    async fn execute(&self, url: &str, key: &str) -> FetchResult {
        let request_headers = headers::random_headers();
        info!("fetching {}", url);
        match self.client.get(url).headers(request_headers).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if status >= 500 || status == 429 {
                    self.record_circuit_failure(key).await;
                } else {
                    self.record_circuit_success(key).await;
                }
                match response.text().await {
                    Ok(body) => FetchResult {
                        url: url.to_string(),
                        content: Some(body),
                        status_code: status,
                        error: None,
                        timestamp: Utc::now(),
                    },
                    Err(e) => FetchResult {
                        url: url.to_string(),
                        content: None,
                        status_code: status,
                        error: Some(
                            FetchError::Transport {
                                url: url.to_string(),
                                reason: e.to_string(),
                            }
                            .to_string(),
                        ),
                        timestamp: Utc::now(),
                    },
                }
            }
            Err(e) => {
                self.record_circuit_failure(key).await;
                FetchResult::failure(
                    url,
                    FetchError::Transport {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                    .to_string(),
                )
            }
        }
    }

    /// robots.txt verdict, using a per-authority cached policy. Fetch
    /// failures and non-200 responses default to allow-all.
    async fn robots_allows(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return true;
        };
        let Some(host) = parsed.host_str() else {
            return true;
        };
        let authority = match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        };

        {
            let robots = self.robots.lock().await;
            if let Some(policy) = robots.get(&authority) {
                return policy.can_fetch(parsed.path());
            }
        }

        let robots_url = format!("{}/robots.txt", authority);
        let policy = match timeout(
            limits::ROBOTS_TIMEOUT,
            self.client.get(&robots_url).send(),
        )
        .await
        {
            Ok(Ok(response)) if response.status().as_u16() == 200 => {
                match response.text().await {
                    Ok(body) => RobotsPolicy::parse(&body),
                    Err(_) => RobotsPolicy::allow_all(),
                }
            }
            _ => RobotsPolicy::allow_all(),
        };

        let verdict = policy.can_fetch(parsed.path());
        self.robots.lock().await.insert(authority, policy);
        verdict
    }

    async fn circuit_allows(&self, key: &str) -> bool {
        let mut circuits = self.circuits.lock().await;
        circuits
            .entry(key.to_string())
            .or_insert_with(default_breaker)
            .is_allowable()
    }

    async fn record_circuit_failure(&self, key: &str) {
        let mut circuits = self.circuits.lock().await;
        circuits
            .entry(key.to_string())
            .or_insert_with(default_breaker)
            .record_failure();
    }

    async fn record_circuit_success(&self, key: &str) {
        let mut circuits = self.circuits.lock().await;
        circuits
            .entry(key.to_string())
            .or_insert_with(default_breaker)
            .record_success();
    }

    /// Breaker state for a URL, for metadata display. Unknown keys read
    /// as CLOSED.
    pub async fn circuit_state(&self, url: &str) -> CircuitState {
        let key = Self::normalize_url(url);
        let circuits = self.circuits.lock().await;
        circuits
            .get(&key)
            .map(|breaker| breaker.state())
            .unwrap_or(CircuitState::Closed)
    }
}

fn default_breaker() -> CircuitBreaker {
    CircuitBreaker::new(
        circuit_defaults::FAILURE_THRESHOLD,
        circuit_defaults::RECOVERY_TIMEOUT,
    )
}
