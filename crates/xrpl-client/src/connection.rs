use analysis_core::AnalysisError;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

use crate::websocket::Session;

type ConnectAttempt = Shared<BoxFuture<'static, Result<Arc<Session>, AnalysisError>>>;

/// Long-lived connection to one ledger node with reconnect-on-demand.
///
/// `ensure_connected` is cheap when a live session exists. Otherwise all
/// concurrent callers await one shared connection attempt. Failures are
/// returned, never retried here.
pub struct LedgerConnection {
    url: String,
    request_timeout: Duration,
    session: RwLock<Option<Arc<Session>>>,
    attempt: Mutex<Option<ConnectAttempt>>,
    ready: Arc<AtomicBool>,
}

impl LedgerConnection {
    pub fn new(url: String, request_timeout: Duration) -> Self {
        Self {
            url,
            request_timeout,
            session: RwLock::new(None),
            attempt: Mutex::new(None),
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Health flag: true while a session is established
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn live_session(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .await
            .as_ref()
            .filter(|s| !s.is_closed())
            .cloned()
    }

    /// Establish or verify the connection. Idempotent.
    pub async fn ensure_connected(&self) -> Result<Arc<Session>, AnalysisError> {
        if let Some(session) = self.live_session().await {
            return Ok(session);
        }

        let attempt = {
            let mut slot = self.attempt.lock().await;
            if let Some(session) = self.live_session().await {
                return Ok(session);
            }
            let reusable = match slot.as_ref().map(|a| (a, a.peek())) {
                Some((pending, None)) => Some(pending.clone()),
                // finished but not yet published to `session`
                Some((_, Some(Ok(session)))) if !session.is_closed() => {
                    return Ok(session.clone());
                }
                _ => None,
            };
            match reusable {
                Some(pending) => pending,
                None => {
                    let fresh = connect(self.url.clone(), self.request_timeout, self.ready.clone())
                        .boxed()
                        .shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        let result = attempt.await;

        if let Ok(session) = &result {
            let mut current = self.session.write().await;
            let stale = current
                .as_ref()
                .map_or(true, |s| !Arc::ptr_eq(s, session));
            if stale {
                *current = Some(session.clone());
            }
        }

        let mut slot = self.attempt.lock().await;
        if slot.as_ref().map_or(false, |a| a.peek().is_some()) {
            *slot = None;
        }

        result
    }

    /// Send one command, connecting first if needed. Bounded by the
    /// request timeout.
    pub async fn request(&self, payload: Value) -> Result<Value, AnalysisError> {
        let session = self.ensure_connected().await?;
        let command = payload
            .get("command")
            .and_then(|c| c.as_str())
            .unwrap_or("unknown")
            .to_string();

        match tokio::time::timeout(self.request_timeout, session.request(payload)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout(format!(
                "{} after {}s",
                command,
                self.request_timeout.as_secs()
            ))),
        }
    }
}

async fn connect(
    url: String,
    timeout: Duration,
    ready: Arc<AtomicBool>,
) -> Result<Arc<Session>, AnalysisError> {
    let started = Instant::now();
    let outcome = tokio::time::timeout(timeout, Session::open(&url, ready.clone())).await;

    match outcome {
        Ok(Ok(session)) => {
            ready.store(true, Ordering::Release);
            tracing::info!(url = %url, duration_ms = started.elapsed().as_millis() as u64, "xrpl.connected");
            Ok(Arc::new(session))
        }
        Ok(Err(e)) => {
            ready.store(false, Ordering::Release);
            tracing::error!(url = %url, error = %e, "xrpl.connect_error");
            Err(e)
        }
        Err(_) => {
            ready.store(false, Ordering::Release);
            tracing::error!(url = %url, "xrpl.connect_timeout");
            Err(AnalysisError::Connection(format!(
                "{}: connect timed out after {}s",
                url,
                timeout.as_secs()
            )))
        }
    }
}
