//! 🚚 The transport — one `reqwest::Client`, a bag of servers, and a retry habit.
//!
//! Every HTTP conversation kvbulk has with the cluster goes through here: bulk
//! POSTs from the workers, index admin calls from the lifecycle controller.
//!
//! ## Knowledge Graph 🧠
//! - `ServerPool` picks a server uniformly at random per call. The RNG is injected
//!   (seeded or from entropy) so tests can pin the dice.
//! - `request` retries transport failures and throttling statuses (429/502/503/504)
//!   with capped exponential backoff. Everything else is returned to the caller as-is.
//!   Callers can pass a `settled` check that keeps a throttling reply from being retried.
//! - Basic auth is attached only when BOTH username and password are set.
//! - Bodies go out as `application/json`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, warn};

use super::ElasticsearchSinkConfig;

/// 🔁 Retry knobs, as they appear under `[sink.retry]`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// ⏳ How long to wait before retry number `attempt` (0-based).
///
/// `initial * 2^attempt`, capped at `max`. Shifts that overflow saturate at the cap.
pub(crate) fn calculate_backoff(attempt: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let the_multiplier = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    let the_wait = initial_ms.saturating_mul(the_multiplier).min(max_ms);
    Duration::from_millis(the_wait)
}

/// 🚦 Statuses that mean "not now", not "not ever".
fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// 🎲 Eeny, meeny, miny, node.
#[derive(Debug)]
pub struct ServerPool {
    servers: Vec<String>,
    dice: Mutex<StdRng>,
}

impl ServerPool {
    /// 🏗️ Build a pool over already-normalized server URLs.
    ///
    /// # Errors
    /// 💀 An empty server list. There has to be somebody to talk to.
    pub fn new(servers: Vec<String>, dice: StdRng) -> Result<Self> {
        if servers.is_empty() {
            anyhow::bail!(
                "💀 No Elasticsearch servers configured. We brought documents to a party with no address."
            );
        }
        Ok(Self {
            servers,
            dice: Mutex::new(dice),
        })
    }

    /// 🎲 Seeded pools roll the same sequence every run. Unseeded pools ask the OS.
    pub fn from_seed(servers: Vec<String>, seed: Option<u64>) -> Result<Self> {
        let the_dice = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(servers, the_dice)
    }

    /// 🎯 One server, uniformly at random.
    pub fn pick(&self) -> &str {
        // a poisoned lock still holds a perfectly good RNG
        let mut the_dice = self.dice.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let the_chosen_one = the_dice.gen_range(0..self.servers.len());
        &self.servers[the_chosen_one]
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }
}

/// 📨 What came back: status and the full body text.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

/// 🚚 The shared HTTP transport. Clone it freely; everything inside is reference counted.
#[derive(Debug, Clone)]
pub struct EsTransport {
    client: reqwest::Client,
    pool: Arc<ServerPool>,
    credentials: Option<(String, String)>,
    retry: RetryConfig,
}

impl EsTransport {
    /// 🚀 Build the client from the sink config.
    ///
    /// 10s connect timeout, `request_timeout_secs` for the whole request,
    /// optional "trust me bro" TLS.
    pub fn new(config: &ElasticsearchSinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. Probably a cursed system cert store.")?;

        let pool = ServerPool::from_seed(config.normalized_servers(), config.server_seed)?;
        let credentials = match (&config.username, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            pool: Arc::new(pool),
            credentials,
            retry: config.retry,
        })
    }

    pub fn pool(&self) -> &ServerPool {
        &self.pool
    }

    /// 🎲 A request to whichever server the dice choose.
    pub async fn request_any(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<Reply> {
        let the_server = self.pool.pick().to_string();
        self.request(&the_server, method, path, query, body).await
    }

    /// 🎲 Like [`Self::request_any`], but `settled` may declare a throttling reply final.
    pub async fn request_any_settled(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        settled: fn(&Reply) -> bool,
    ) -> Result<Reply> {
        let the_server = self.pool.pick().to_string();
        self.request_settled(&the_server, method, path, query, body, settled)
            .await
    }

    /// 📡 A request to one specific server, with retries.
    ///
    /// Transport errors and throttling statuses are retried up to `max_retries` times.
    /// A throttling status on the last attempt is returned as a normal reply so the
    /// caller can report the body.
    ///
    /// # Errors
    /// 💀 A bad URL, or a transport error that outlived every retry.
    pub async fn request(
        &self,
        server: &str,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<Reply> {
        self.request_settled(server, method, path, query, body, |_| false)
            .await
    }

    /// 📡 [`Self::request`] with a say in retries: a throttling reply for which
    /// `settled` returns true goes straight back to the caller.
    ///
    /// # Errors
    /// 💀 Same as [`Self::request`].
    pub async fn request_settled(
        &self,
        server: &str,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        settled: fn(&Reply) -> bool,
    ) -> Result<Reply> {
        let mut the_url = Url::parse(&format!("{}/{}", server.trim_end_matches('/'), path))
            .with_context(|| format!("💀 '{server}/{path}' is not a URL. Not even a little."))?;
        if !query.is_empty() {
            the_url.query_pairs_mut().extend_pairs(query);
        }

        let mut last_failure: Option<reqwest::Error> = None;
        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let the_nap = calculate_backoff(
                    attempt - 1,
                    self.retry.initial_backoff_ms,
                    self.retry.max_backoff_ms,
                );
                debug!("😴 retry {attempt} for {method} {the_url} in {the_nap:?}");
                tokio::time::sleep(the_nap).await;
            }

            let mut the_request = self.client.request(method.clone(), the_url.clone());
            if let Some((user, password)) = &self.credentials {
                the_request = the_request.basic_auth(user, Some(password));
            }
            if let Some(body) = &body {
                the_request = the_request
                    .header("Content-Type", "application/json")
                    .body(body.clone());
            }

            match the_request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response
                        .text()
                        .await
                        .context("💀 The server answered, then forgot what it was saying mid-body.")?;
                    let the_reply = Reply { status, body: text };
                    if is_retryable_status(status)
                        && !settled(&the_reply)
                        && attempt < self.retry.max_retries
                    {
                        warn!("🚦 {method} {the_url} answered {status}, backing off");
                        continue;
                    }
                    return Ok(the_reply);
                }
                Err(err) => {
                    warn!("📡 {method} {the_url} failed on attempt {}: {err}", attempt + 1);
                    last_failure = Some(err);
                }
            }
        }

        let the_attempts = self.retry.max_retries + 1;
        match last_failure {
            Some(err) => Err(err).with_context(|| {
                format!("💀 {method} {the_url} failed after {the_attempts} attempt(s). The network has ghosted us.")
            }),
            None => anyhow::bail!("💀 {method} {the_url} ran out of attempts without an answer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &str) -> ElasticsearchSinkConfig {
        let mut the_config: ElasticsearchSinkConfig =
            serde_json::from_str(r#"{"index":"abc"}"#).expect("💀 config");
        the_config.servers = vec![server.to_string()];
        the_config.retry = RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        };
        the_config
    }

    #[test]
    fn the_one_where_backoff_doubles_then_hits_the_ceiling() {
        assert_eq!(calculate_backoff(0, 200, 10_000), Duration::from_millis(200));
        assert_eq!(calculate_backoff(1, 200, 10_000), Duration::from_millis(400));
        assert_eq!(calculate_backoff(3, 200, 10_000), Duration::from_millis(1600));
        assert_eq!(calculate_backoff(10, 200, 10_000), Duration::from_millis(10_000));
        assert_eq!(calculate_backoff(200, 200, 10_000), Duration::from_millis(10_000));
    }

    #[test]
    fn the_one_where_seeded_dice_roll_the_same_way_twice() -> Result<()> {
        let the_servers: Vec<String> = (0..5).map(|i| format!("http://es{i}:9200")).collect();
        let first = ServerPool::from_seed(the_servers.clone(), Some(42))?;
        let second = ServerPool::from_seed(the_servers.clone(), Some(42))?;
        let first_rolls: Vec<String> = (0..20).map(|_| first.pick().to_string()).collect();
        let second_rolls: Vec<String> = (0..20).map(|_| second.pick().to_string()).collect();
        assert_eq!(first_rolls, second_rolls);
        assert!(first_rolls.iter().all(|s| the_servers.contains(s)));
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_pool_is_refused() {
        assert!(ServerPool::from_seed(Vec::new(), Some(1)).is_err());
    }

    #[tokio::test]
    async fn the_one_where_a_503_gets_a_second_chance() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&the_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .mount(&the_server)
            .await;

        let the_transport = EsTransport::new(&config_for(&the_server.uri()))?;
        let the_reply = the_transport
            .request_any(Method::GET, "abc", &[], None)
            .await?;
        assert_eq!(the_reply.status, StatusCode::OK);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_throttling_outlasts_our_patience() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .expect(3)
            .mount(&the_server)
            .await;

        let the_transport = EsTransport::new(&config_for(&the_server.uri()))?;
        let the_reply = the_transport
            .request_any(Method::GET, "abc", &[], None)
            .await?;
        assert_eq!(the_reply.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(the_reply.body, "slow down");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_settled_503_is_taken_at_its_word() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("final answer"))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_transport = EsTransport::new(&config_for(&the_server.uri()))?;
        let the_reply = the_transport
            .request_any_settled(Method::GET, "abc", &[], None, |reply| {
                reply.body == "final answer"
            })
            .await?;
        assert_eq!(the_reply.status, StatusCode::SERVICE_UNAVAILABLE);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_dead_port_fails_after_every_retry() -> Result<()> {
        // 🪦 port 9 is discard; nobody should be listening on localhost
        let the_transport = EsTransport::new(&config_for("http://127.0.0.1:9"))?;
        let the_error = the_transport
            .request_any(Method::GET, "abc", &[], None)
            .await
            .unwrap_err();
        assert!(format!("{the_error:#}").contains("3 attempt(s)"));
        Ok(())
    }
}
