//! JSON-lines node runtime.
//!
//! Reads one message per line from an input stream (stdin in production),
//! dispatches each request to the hosted [`Handler`] on its own task, and
//! writes replies and outbound RPCs one per line to an output stream (stdout).
//!
//! # Lifecycle
//!
//! 1. The first message must be `init`; it fixes this node's id and the
//!    cluster membership. The runtime answers `init_ok`.
//! 2. The handler is built from a [`NodeHandle`], which it may keep to issue
//!    RPCs to peers and services.
//! 3. Requests run concurrently. Replies (`in_reply_to` set) complete the
//!    matching pending RPC.
//! 4. The runtime returns when input reaches EOF, or with `Fatal` once a
//!    handler reports a fatal error. Either way, output queued before the stop
//!    is written first.

#![allow(clippy::significant_drop_tightening)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use quill_core::NodeId;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::message::{Body, ErrorCode, Message, Payload};
use crate::transport::{Handler, Transport};

// -----------------------------------------------------------------------------
// Node Handle
// -----------------------------------------------------------------------------

/// Handle for interacting with a running node: identity, topology and RPC.
///
/// Cheap to clone; clones share the outbound queue and pending-reply table.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    node_id: NodeId,
    peers: Vec<NodeId>,
    config: RuntimeConfig,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Body>>>,
    next_msg_id: AtomicU64,
}

/// Work for the writer task.
enum Outbound {
    Message(Message),
    /// Acknowledged once everything queued before it has been written.
    Flush(oneshot::Sender<()>),
}

/// Drops an RPC's pending entry when its caller stops waiting, whether the
/// call returned or its future was dropped.
struct PendingGuard<'a> {
    handle: &'a NodeHandle,
    msg_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.handle.forget(self.msg_id);
    }
}

impl NodeHandle {
    fn new(
        node_id: NodeId,
        node_ids: &[NodeId],
        config: RuntimeConfig,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let peers = node_ids
            .iter()
            .filter(|id| **id != node_id)
            .cloned()
            .collect();
        Self {
            inner: Arc::new(HandleInner {
                node_id,
                peers,
                config,
                outbound,
                pending: Mutex::new(HashMap::new()),
                next_msg_id: AtomicU64::new(1),
            }),
        }
    }

    /// Returns the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Returns the number of RPCs awaiting a reply.
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().expect("pending lock poisoned").len()
    }

    fn next_msg_id(&self) -> u64 {
        self.inner.next_msg_id.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, dest: NodeId, body: Body) -> RuntimeResult<()> {
        let message = Message {
            src: self.inner.node_id.clone(),
            dest,
            body,
        };
        self.inner
            .outbound
            .send(Outbound::Message(message))
            .map_err(|_| RuntimeError::Closed)
    }

    /// Waits until all output queued so far is written, or `timeout` passes.
    async fn flush(&self, timeout: Duration) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inner.outbound.send(Outbound::Flush(ack_tx)).is_err() {
            return;
        }
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => debug!("Writer stopped before flush"),
            Err(_) => warn!(timeout = ?timeout, "Output flush timed out"),
        }
    }

    /// Sends `payload` as the reply to request `in_reply_to` from `dest`.
    fn reply(&self, dest: NodeId, in_reply_to: Option<u64>, payload: Payload) -> RuntimeResult<()> {
        let body = Body {
            msg_id: Some(self.next_msg_id()),
            in_reply_to,
            payload,
        };
        self.send(dest, body)
    }

    /// Completes the pending RPC a reply belongs to.
    fn complete(&self, src: &NodeId, in_reply_to: u64, body: Body) {
        let waiter = self
            .inner
            .pending
            .lock()
            .expect("pending lock poisoned")
            .remove(&in_reply_to);
        match waiter {
            Some(tx) => {
                // The caller may have given up already.
                let _ = tx.send(body);
            }
            None => {
                debug!(src = %src, in_reply_to, "Reply for unknown or expired request");
            }
        }
    }

    fn forget(&self, msg_id: u64) {
        // Runs from Drop; a poisoned table must not turn into a double panic.
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.remove(&msg_id);
        }
    }
}

#[async_trait]
impl Transport for NodeHandle {
    fn node_id(&self) -> &NodeId {
        &self.inner.node_id
    }

    fn peers(&self) -> Vec<NodeId> {
        self.inner.peers.clone()
    }

    async fn call(
        &self,
        dest: &NodeId,
        payload: Payload,
        timeout: Duration,
    ) -> RuntimeResult<Payload> {
        let kind = payload.kind();
        let msg_id = self.next_msg_id();
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("pending lock poisoned")
            .insert(msg_id, tx);
        let _pending = PendingGuard {
            handle: self,
            msg_id,
        };

        let body = Body {
            msg_id: Some(msg_id),
            in_reply_to: None,
            payload,
        };
        self.send(dest.clone(), body)?;
        trace!(dest = %dest, msg_id, kind, "Sent rpc");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(body)) => match body.payload {
                Payload::Error { code, text } => Err(RuntimeError::Remote {
                    dest: dest.clone(),
                    code,
                    text,
                }),
                payload => Ok(payload),
            },
            Ok(Err(_)) => Err(RuntimeError::Closed),
            Err(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let waited_ms = timeout.as_millis().min(u128::from(u64::MAX)) as u64;
                Err(RuntimeError::Timeout {
                    dest: dest.clone(),
                    kind,
                    waited_ms,
                })
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Node
// -----------------------------------------------------------------------------

/// A node runtime that has not yet completed its handshake.
pub struct Node {
    config: RuntimeConfig,
}

impl Node {
    /// Creates a runtime with the given configuration.
    #[must_use]
    pub const fn new(config: RuntimeConfig) -> Self {
        Self { config }
    }

    /// Runs the node on stdin/stdout until EOF or a fatal error.
    ///
    /// # Errors
    ///
    /// See [`run_with_io`](Self::run_with_io).
    pub async fn run<F, H>(self, make_handler: F) -> RuntimeResult<()>
    where
        F: FnOnce(NodeHandle) -> H,
        H: Handler,
    {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run_with_io(stdin, stdout, make_handler).await
    }

    /// Runs the node over arbitrary streams.
    ///
    /// # Errors
    ///
    /// Returns `Handshake` if input does not start with a valid `init`, `Io`
    /// if reading fails, or `Fatal` if a handler reported a fatal error.
    pub async fn run_with_io<R, W, F, H>(
        self,
        reader: R,
        writer: W,
        make_handler: F,
    ) -> RuntimeResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: FnOnce(NodeHandle) -> H,
        H: Handler,
    {
        let mut lines = reader.lines();
        let init = Self::await_init(&mut lines).await?;
        let Payload::Init { node_id, node_ids } = &init.body.payload else {
            unreachable!("await_init only returns init messages");
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, outbound_rx));

        let flush_timeout = self.config.rpc_timeout;
        let handle = NodeHandle::new(node_id.clone(), node_ids, self.config, outbound_tx);
        handle.reply(init.src.clone(), init.body.msg_id, Payload::InitOk)?;
        info!(
            node_id = %node_id,
            peers = ?handle.peers(),
            "Node initialized"
        );

        let handler = Arc::new(make_handler(handle.clone()));
        let (fatal_tx, mut fatal_rx) = mpsc::channel::<String>(1);

        loop {
            tokio::select! {
                biased;
                Some(reason) = fatal_rx.recv() => {
                    error!(node_id = %node_id, reason = %reason, "Stopping node after fatal error");
                    handle.flush(flush_timeout).await;
                    return Err(RuntimeError::Fatal { message: reason });
                }
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            Self::dispatch(&line, &handle, &handler, &fatal_tx);
                        }
                        Ok(None) => {
                            info!(node_id = %node_id, "Input closed, stopping node");
                            handle.flush(flush_timeout).await;
                            return Ok(());
                        }
                        Err(e) => return Err(RuntimeError::io("read", &e)),
                    }
                }
            }
        }
    }

    /// Reads lines until the `init` message arrives.
    async fn await_init<R>(lines: &mut tokio::io::Lines<R>) -> RuntimeResult<Message>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| RuntimeError::io("read", &e))?
            else {
                return Err(RuntimeError::Handshake {
                    message: "input closed before init".to_string(),
                });
            };
            if line.trim().is_empty() {
                continue;
            }

            let message = Message::decode(&line).map_err(|e| RuntimeError::Handshake {
                message: e.to_string(),
            })?;
            match &message.body.payload {
                Payload::Init { node_id, node_ids } => {
                    if !node_ids.contains(node_id) {
                        return Err(RuntimeError::Handshake {
                            message: format!("node_ids does not contain {node_id}"),
                        });
                    }
                    return Ok(message);
                }
                other => {
                    return Err(RuntimeError::Handshake {
                        message: format!("expected init, got {}", other.kind()),
                    });
                }
            }
        }
    }

    fn dispatch<H: Handler>(
        line: &str,
        handle: &NodeHandle,
        handler: &Arc<H>,
        fatal_tx: &mpsc::Sender<String>,
    ) {
        if line.trim().is_empty() {
            return;
        }

        let message = match Message::decode(line) {
            Ok(message) => message,
            Err(RuntimeError::Decode {
                src: Some(src),
                in_reply_to: Some(in_reply_to),
                message,
                ..
            }) => {
                // A reply we cannot read still ends the caller's wait.
                warn!(src = %src, in_reply_to, error = %message, "Undecodable reply");
                let body = Body {
                    msg_id: None,
                    in_reply_to: Some(in_reply_to),
                    payload: Payload::error(ErrorCode::MalformedRequest, message),
                };
                handle.complete(&src, in_reply_to, body);
                return;
            }
            Err(RuntimeError::Decode {
                src: Some(src),
                msg_id: Some(msg_id),
                code,
                message,
                ..
            }) => {
                warn!(src = %src, msg_id, %code, error = %message, "Rejecting undecodable request");
                if handle
                    .reply(src, Some(msg_id), Payload::error(code, message))
                    .is_err()
                {
                    debug!("Runtime closed while rejecting request");
                }
                return;
            }
            Err(e) => {
                warn!(error = %e, "Dropping undecodable line");
                return;
            }
        };

        if let Some(in_reply_to) = message.body.in_reply_to {
            handle.complete(&message.src, in_reply_to, message.body);
            return;
        }

        let handle = handle.clone();
        let handler = Arc::clone(handler);
        let fatal_tx = fatal_tx.clone();
        tokio::spawn(async move {
            let Message { src, body, .. } = message;
            let kind = body.payload.kind();
            let (reply, fatal) = match handler.handle(src.clone(), body.payload).await {
                Ok(payload) => (payload, None),
                Err(e) => {
                    if e.fatal {
                        error!(src = %src, kind, error = %e.text, "Fatal error handling request");
                    } else {
                        warn!(src = %src, kind, code = %e.code, error = %e.text, "Request failed");
                    }
                    let fatal = e.fatal.then(|| e.text.clone());
                    (e.to_payload(), fatal)
                }
            };

            if handle.reply(src, body.msg_id, reply).is_err() {
                debug!(kind, "Runtime closed before reply could be sent");
            }
            if let Some(reason) = fatal {
                // A full channel means a fatal stop is already underway.
                let _ = fatal_tx.try_send(reason);
            }
        });
    }
}

/// Drains the outbound queue to the writer, one message per line.
async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = outbound.recv().await {
        let message = match item {
            Outbound::Message(message) => message,
            Outbound::Flush(ack) => {
                // Every earlier message was written and flushed already.
                let _ = ack.send(());
                continue;
            }
        };
        let line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Dropping unencodable message");
                continue;
            }
        };
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            error!(error = %e, "Output closed, stopping writer");
            return;
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
