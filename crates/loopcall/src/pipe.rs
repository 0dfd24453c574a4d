//! Pipe dispatch path: a serialization-driven client and server exchanging
//! length-prefixed frames over a loopback channel.
//!
//! The server side reads request frames, resolves them through the same
//! [`Dispatcher`] used for direct calls, and writes reply frames back. The
//! client side encodes one request, signals readiness, and waits for the
//! matching reply. Within one exchange, write-then-signal-then-read is
//! strictly ordered on both sides.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::oneshot;

use crate::client::PendingCall;
use crate::codec::{Codec, JsonCodec};
use crate::context::Context;
use crate::dispatch::Dispatcher;
use crate::error::CallError;
use crate::transport::{LoopbackEndpoint, TransportError};
use crate::wire::{encode_frame, take_frame, ReplyFrame, RequestFrame, WireError};

/// Server half of the pipe path. Owns one endpoint of a loopback channel and
/// answers every request frame that arrives on it.
pub struct PipeServer<C: Codec = JsonCodec> {
    dispatcher: Dispatcher<C>,
    endpoint: LoopbackEndpoint,
}

impl<C: Codec> PipeServer<C> {
    pub fn new(dispatcher: Dispatcher<C>, endpoint: LoopbackEndpoint) -> Self {
        PipeServer {
            dispatcher,
            endpoint,
        }
    }

    /// Answer requests until the channel closes.
    ///
    /// `cx` is the connection-scoped context handed to every handler invoked
    /// through this pipe. A clean close terminates the loop with `Ok(())`.
    /// However the loop ends, the channel is closed before returning, so a
    /// client blocked in a read observes the shutdown instead of hanging.
    pub async fn serve(self, cx: Context) -> Result<(), TransportError> {
        let result = self.run(cx).await;
        self.endpoint.close();
        result
    }

    async fn run(&self, cx: Context) -> Result<(), TransportError> {
        let mut acc = BytesMut::new();
        loop {
            while let Some(frame) = take_frame(&mut acc)? {
                self.answer(cx.clone(), &frame)?;
            }
            match self.endpoint.read().await {
                Ok(bytes) => acc.extend_from_slice(&bytes),
                Err(TransportError::Closed) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
    }

    fn answer(&self, cx: Context, frame: &[u8]) -> Result<(), TransportError> {
        let req: RequestFrame = match C::decode(frame) {
            Ok(req) => req,
            Err(err) => {
                // No id to answer under, and the stream may be desynced;
                // shutting down is the only reply the client can observe.
                tracing::warn!(error = %err, "undecodable request frame, shutting pipe down");
                return Err(TransportError::Malformed);
            }
        };
        tracing::debug!(id = req.id, method = %req.method, "pipe request");

        let reply = match self.dispatcher.dispatch(cx, &req.method, &req.params) {
            Ok(result) => ReplyFrame {
                id: req.id,
                error: None,
                result,
            },
            Err(err) => ReplyFrame {
                id: req.id,
                error: Some(WireError::from(&err)),
                result: Vec::new(),
            },
        };

        let body = match C::encode(&reply) {
            Ok(body) => body,
            Err(err) => {
                let fallback = ReplyFrame {
                    id: reply.id,
                    error: Some(WireError::from(&CallError::Encode(err.to_string()))),
                    result: Vec::new(),
                };
                C::encode(&fallback).unwrap_or_default()
            }
        };
        let framed = match encode_frame(&body) {
            Ok(framed) => framed,
            Err(err) => {
                // Reply too large to frame; substitute an error reply so the
                // client still gets an answer under the same id.
                tracing::warn!(id = reply.id, error = %err, "reply does not fit in a frame");
                let fallback = ReplyFrame {
                    id: reply.id,
                    error: Some(WireError::from(&CallError::Encode(err.to_string()))),
                    result: Vec::new(),
                };
                encode_frame(&C::encode(&fallback).unwrap_or_default())?
            }
        };
        self.endpoint.write(&framed)?;
        self.endpoint.signal();
        Ok(())
    }
}

/// Client half of the pipe path.
///
/// Clones share the endpoint; exchanges are serialized internally so only
/// one request/reply pair is in flight at a time.
pub struct PipeClient<C: Codec = JsonCodec> {
    inner: Arc<PipeClientInner>,
    _codec: PhantomData<fn() -> C>,
}

struct PipeClientInner {
    endpoint: LoopbackEndpoint,
    /// Frame accumulator; holding it doubles as the single-exchange lock.
    exchange: tokio::sync::Mutex<BytesMut>,
    next_id: AtomicU64,
}

impl Drop for PipeClientInner {
    fn drop(&mut self) {
        // The serving side blocks on read until the channel closes; make
        // sure dropping the last client handle lets it terminate.
        self.endpoint.close();
    }
}

impl<C: Codec> PipeClient<C> {
    pub fn new(endpoint: LoopbackEndpoint) -> Self {
        PipeClient {
            inner: Arc::new(PipeClientInner {
                endpoint,
                exchange: tokio::sync::Mutex::new(BytesMut::new()),
                next_id: AtomicU64::new(1),
            }),
            _codec: PhantomData,
        }
    }

    /// Issue one call over the pipe and wait for its reply.
    pub async fn call<A, R>(&self, key: &str, args: &A) -> Result<R, CallError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = C::encode(args).map_err(|e| CallError::Encode(e.to_string()))?;
        let raw = self.call_raw(key, params).await?;
        C::decode(&raw).map_err(|e| CallError::Decode(e.to_string()))
    }

    /// Issue a call asynchronously; the returned [`PendingCall`] completes
    /// exactly once. Requires a tokio runtime.
    pub fn go<A, R>(&self, key: &str, args: &A) -> PendingCall<R, C>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        match C::encode(args) {
            Err(err) => {
                let _ = tx.send(Err(CallError::Encode(err.to_string())));
            }
            Ok(params) => {
                let client = self.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    let _ = tx.send(client.call_raw(&key, params).await);
                });
            }
        }
        PendingCall::from_receiver(rx)
    }

    async fn call_raw(&self, key: &str, params: Vec<u8>) -> Result<Vec<u8>, CallError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let req = RequestFrame {
            id,
            method: key.to_string(),
            params,
        };
        let body = C::encode(&req).map_err(|e| CallError::Encode(e.to_string()))?;

        let framed = encode_frame(&body)?;
        let mut acc = self.inner.exchange.lock().await;
        self.inner.endpoint.write(&framed)?;
        self.inner.endpoint.signal();

        loop {
            if let Some(frame) = take_frame(&mut acc)? {
                let reply: ReplyFrame =
                    C::decode(&frame).map_err(|e| CallError::Decode(e.to_string()))?;
                if reply.id != id {
                    tracing::trace!(got = reply.id, want = id, "discarding stale reply frame");
                    continue;
                }
                return match reply.error {
                    Some(err) => Err(err.into()),
                    None => Ok(reply.result),
                };
            }
            let bytes = self.inner.endpoint.read().await?;
            acc.extend_from_slice(&bytes);
        }
    }

    /// Close the underlying channel. The serving side terminates cleanly.
    pub fn close(&self) {
        self.inner.endpoint.close();
    }
}

impl<C: Codec> Clone for PipeClient<C> {
    fn clone(&self) -> Self {
        PipeClient {
            inner: Arc::clone(&self.inner),
            _codec: PhantomData,
        }
    }
}

impl<C: Codec> std::fmt::Debug for PipeClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeClient").field("codec", &C::NAME).finish()
    }
}
