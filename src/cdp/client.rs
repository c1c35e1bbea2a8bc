//! CDP WebSocket client.
//!
//! One connection per browser. Commands are matched to responses by id via a
//! pending map; events are fanned out to every subscriber through a
//! broadcast channel. Page sessions share the connection (`flatten` mode)
//! and tag their commands with a session id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::error::CdpError;
use super::protocol::{CdpEvent, CdpMessage, CdpRequest};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;
type Pending = Arc<DashMap<u64, oneshot::Sender<Result<Value, CdpError>>>>;

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 4096;

pub struct CdpClient {
    ws_tx: Mutex<WsSink>,
    next_id: AtomicU64,
    pending: Pending,
    events: broadcast::Sender<CdpEvent>,
    call_timeout: Duration,
    recv_task: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a browser's DevTools WebSocket endpoint.
    pub async fn connect(ws_url: &str, call_timeout: Duration) -> Result<Arc<Self>, CdpError> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
        let (sink, source) = ws_stream.split();

        let pending: Pending = Arc::new(DashMap::new());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        let recv_task = tokio::spawn(receive_loop(source, pending.clone(), events.clone()));
        debug!("CDP client connected to {}", ws_url);

        Ok(Arc::new(Self {
            ws_tx: Mutex::new(sink),
            next_id: AtomicU64::new(1),
            pending,
            events,
            call_timeout,
            recv_task,
        }))
    }

    /// Send a command and wait for its result.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        };
        let json = serde_json::to_string(&request)?;
        trace!("CDP send: {}", json);

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let sent = {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await
        };
        if let Err(e) = sent {
            self.pending.remove(&id);
            return Err(e.into());
        }

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result.map_err(|e| match e {
                CdpError::Protocol { code, message, .. } => CdpError::Protocol {
                    method: method.to_string(),
                    code,
                    message,
                },
                other => other,
            }),
            Ok(Err(_)) => Err(CdpError::Closed),
            Err(_) => {
                self.pending.remove(&id);
                Err(CdpError::Timeout {
                    method: method.to_string(),
                    secs: self.call_timeout.as_secs(),
                })
            }
        }
    }

    /// Receive every event from now on. Filter by session id on the
    /// consumer side.
    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Close the WebSocket. Outstanding calls fail with [`CdpError::Closed`].
    pub async fn close(&self) {
        let mut ws = self.ws_tx.lock().await;
        if let Err(e) = ws.close().await {
            debug!("closing DevTools socket: {}", e);
        }
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

async fn receive_loop(mut source: WsSource, pending: Pending, events: broadcast::Sender<CdpEvent>) {
    while let Some(msg) = source.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                trace!("CDP recv: {}", text);
                match serde_json::from_str::<CdpMessage>(&text) {
                    Ok(msg) => dispatch(msg, &pending, &events),
                    Err(e) => warn!("Failed to parse CDP message: {}", e),
                }
            }
            Ok(Message::Close(_)) => {
                debug!("DevTools socket closed by browser");
                break;
            }
            Err(e) => {
                debug!("DevTools socket error: {}", e);
                break;
            }
            _ => {}
        }
    }
    // Dropping the senders wakes every waiter with `Closed`.
    pending.clear();
}

fn dispatch(msg: CdpMessage, pending: &Pending, events: &broadcast::Sender<CdpEvent>) {
    if let Some(id) = msg.id {
        if let Some((_, tx)) = pending.remove(&id) {
            let result = match msg.error {
                Some(err) => Err(CdpError::Protocol {
                    method: String::new(),
                    code: err.code,
                    message: err.message,
                }),
                None => Ok(msg.result.unwrap_or(Value::Null)),
            };
            let _ = tx.send(result);
        } else {
            trace!("response for unknown request {}", id);
        }
    } else if let Some(method) = msg.method {
        // No receivers is fine: nobody is waiting for events yet.
        let _ = events.send(CdpEvent {
            method,
            params: msg.params.unwrap_or(Value::Null),
            session_id: msg.session_id,
        });
    }
}
