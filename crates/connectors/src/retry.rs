//! Adapter-level network retry (§4.1.1, §7): bounded exponential backoff for
//! the transient transport failures API adapters see mid-pagination and SQL
//! adapters see on connection hiccups. Distinct from `pipeline::retry`, which
//! retries whole failed *tables* rather than individual network calls.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct NetworkRetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for NetworkRetryPolicy {
    fn default() -> Self {
        // §4.1.1 / §6: initial delay 1-2s, cap 3 attempts per page/call.
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1500),
        }
    }
}

impl NetworkRetryPolicy {
    pub async fn run<F, Fut, T, E>(&self, label: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(err) => {
                    attempt += 1;
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    let delay = self.base_delay * (1 << (attempt - 1).min(4));
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
