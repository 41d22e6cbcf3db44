use analysis_core::AnalysisError;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type NodeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<Value, AnalysisError>>;

struct Outgoing {
    id: u64,
    payload: Value,
    reply: Reply,
}

/// One open websocket session to a ledger node.
///
/// Requests are tagged with an `id` and matched to responses by a background
/// task that owns the socket. When the socket drops, every pending request
/// fails with [`AnalysisError::Connection`] and the session reports itself
/// closed.
pub struct Session {
    tx: mpsc::UnboundedSender<Outgoing>,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Session {
    /// Open a session. `ready` is cleared when the socket goes away.
    pub async fn open(url: &str, ready: Arc<AtomicBool>) -> Result<Self, AnalysisError> {
        let (ws_stream, _) = connect_async(url)
            .await
            .map_err(|e| AnalysisError::Connection(format!("{}: {}", url, e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        tokio::spawn(run_session(ws_stream, rx, closed.clone(), ready));

        Ok(Self {
            tx,
            closed,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.tx.is_closed()
    }

    /// Send one command and wait for its response. Returns the `result`
    /// object of a successful response.
    pub async fn request(&self, mut payload: Value) -> Result<Value, AnalysisError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match payload.as_object_mut() {
            Some(obj) => {
                obj.insert("id".to_string(), Value::from(id));
            }
            None => {
                return Err(AnalysisError::InvalidData(
                    "ledger command must be a JSON object".to_string(),
                ))
            }
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Outgoing { id, payload, reply })
            .map_err(|_| AnalysisError::Connection("ledger connection closed".to_string()))?;

        let response = rx.await.map_err(|_| {
            AnalysisError::Connection("ledger connection closed before reply".to_string())
        })??;

        into_result(response)
    }
}

async fn run_session(
    ws: NodeStream,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    closed: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
) {
    let (mut write, mut read) = ws.split();
    let mut pending: HashMap<u64, Reply> = HashMap::new();

    let reason = loop {
        tokio::select! {
            out = rx.recv() => {
                match out {
                    Some(Outgoing { id, payload, reply }) => {
                        if let Err(e) = write.send(Message::Text(payload.to_string())).await {
                            let _ = reply.send(Err(AnalysisError::Connection(e.to_string())));
                            break e.to_string();
                        }
                        pending.insert(id, reply);
                    }
                    None => {
                        let _ = write.send(Message::Close(None)).await;
                        break "session dropped".to_string();
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => dispatch(&text, &mut pending),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break "closed by peer".to_string(),
                    Some(Err(e)) => break e.to_string(),
                    _ => {}
                }
            }
        }
    };

    // ready first, so anyone observing `closed` also observes not-ready
    ready.store(false, Ordering::Release);
    closed.store(true, Ordering::Release);

    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(AnalysisError::Connection(format!(
            "ledger connection lost: {}",
            reason
        ))));
    }
    tracing::warn!(reason = %reason, "xrpl.session_closed");
}

fn dispatch(text: &str, pending: &mut HashMap<u64, Reply>) {
    let value: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "xrpl.unparseable_message");
            return;
        }
    };

    match value.get("id").and_then(|v| v.as_u64()) {
        Some(id) => {
            if let Some(reply) = pending.remove(&id) {
                let _ = reply.send(Ok(value));
            }
        }
        None => {
            // subscription stream messages carry no id
            tracing::debug!(kind = ?value.get("type"), "xrpl.unsolicited_message");
        }
    }
}

/// Unwrap a response envelope into its `result`, mapping RPC errors.
pub(crate) fn into_result(mut response: Value) -> Result<Value, AnalysisError> {
    if response.get("status").and_then(|s| s.as_str()) == Some("success") {
        return Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null));
    }

    let code = response
        .get("error")
        .and_then(|e| e.as_str())
        .unwrap_or("unknown_error");
    let message = response
        .get("error_message")
        .and_then(|m| m.as_str())
        .unwrap_or("");

    Err(AnalysisError::Ledger(if message.is_empty() {
        code.to_string()
    } else {
        format!("{}: {}", code, message)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_result_success() {
        let result = into_result(json!({
            "id": 1,
            "status": "success",
            "type": "response",
            "result": {"account_data": {"Account": "rX"}}
        }))
        .unwrap();
        assert_eq!(result["account_data"]["Account"], "rX");
    }

    #[test]
    fn test_into_result_error() {
        let err = into_result(json!({
            "id": 2,
            "status": "error",
            "type": "response",
            "error": "actNotFound",
            "error_message": "Account not found."
        }))
        .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::Ledger("actNotFound: Account not found.".to_string())
        );
    }

    #[test]
    fn test_dispatch_matches_pending_id() {
        let mut pending = HashMap::new();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(7, tx);

        dispatch(r#"{"type":"ledgerClosed"}"#, &mut pending);
        assert_eq!(pending.len(), 1);

        dispatch(r#"{"id":7,"status":"success","result":{}}"#, &mut pending);
        assert!(pending.is_empty());
        let got = rx.try_recv().unwrap().unwrap();
        assert_eq!(got["id"], 7);
    }
}
