//! Caller-facing API: synchronous `call`, asynchronous `go`, and pipe
//! connections, all over one shared registry.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::oneshot;

use crate::codec::{Codec, JsonCodec};
use crate::context::Context;
use crate::dispatch::Dispatcher;
use crate::error::CallError;
use crate::pipe::{PipeClient, PipeServer};
use crate::registry::{ServiceBuilder, ServiceRegistry};
use crate::transport::LoopbackChannel;

/// One in-flight asynchronous invocation.
///
/// Completes exactly once: awaiting [`PendingCall::wait`] yields the final
/// result, whether the invocation succeeded, failed, or was lost.
pub struct PendingCall<R, C: Codec = JsonCodec> {
    done: oneshot::Receiver<Result<Vec<u8>, CallError>>,
    _marker: PhantomData<fn() -> (R, C)>,
}

impl<R: DeserializeOwned, C: Codec> PendingCall<R, C> {
    pub(crate) fn from_receiver(done: oneshot::Receiver<Result<Vec<u8>, CallError>>) -> Self {
        PendingCall {
            done,
            _marker: PhantomData,
        }
    }

    /// Await the completion and decode the reply.
    ///
    /// If the invocation task vanished without reporting a result, this
    /// yields [`CallError::Aborted`].
    pub async fn wait(self) -> Result<R, CallError> {
        let raw = self.done.await.map_err(|_| CallError::Aborted)??;
        C::decode(&raw).map_err(|e| CallError::Decode(e.to_string()))
    }
}

/// The caller-facing facade over a [`ServiceRegistry`].
///
/// `call` completes the invocation on the caller's thread of control before
/// returning; `go` runs it on a spawned task and hands back a
/// [`PendingCall`]; `pipe` connects a [`PipeClient`] that drives the same
/// dispatcher through a loopback channel.
pub struct Caller<C: Codec = JsonCodec> {
    dispatcher: Dispatcher<C>,
}

impl<C: Codec> Caller<C> {
    /// Create a caller with a fresh, empty registry.
    pub fn new() -> Self {
        Self::with_registry(Arc::new(ServiceRegistry::new()))
    }

    /// Create a caller over an existing registry.
    pub fn with_registry(registry: Arc<ServiceRegistry<C>>) -> Self {
        Caller {
            dispatcher: Dispatcher::new(registry),
        }
    }

    /// The registry backing this caller.
    pub fn registry(&self) -> &Arc<ServiceRegistry<C>> {
        self.dispatcher.registry()
    }

    /// Register a service. Last registration under a name wins.
    pub fn register<H: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        builder: ServiceBuilder<H, C>,
    ) {
        self.registry().register(name, builder);
    }

    /// Invoke `"Service.Method"` synchronously and decode the reply.
    pub fn call<A, R>(&self, cx: Context, key: &str, args: &A) -> Result<R, CallError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let raw = C::encode(args).map_err(|e| CallError::Encode(e.to_string()))?;
        let reply = self.dispatcher.dispatch(cx, key, &raw)?;
        C::decode(&reply).map_err(|e| CallError::Decode(e.to_string()))
    }

    /// Invoke `"Service.Method"` on a spawned task and return immediately.
    ///
    /// The [`PendingCall`] completes exactly once with the final result.
    /// Requires a tokio runtime.
    pub fn go<A, R>(&self, cx: Context, key: &str, args: &A) -> PendingCall<R, C>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        match C::encode(args) {
            Err(err) => {
                let _ = tx.send(Err(CallError::Encode(err.to_string())));
            }
            Ok(raw) => {
                let dispatcher = self.dispatcher.clone();
                let key = key.to_string();
                tokio::spawn(async move {
                    let _ = tx.send(dispatcher.dispatch(cx, &key, &raw));
                });
            }
        }
        PendingCall::from_receiver(rx)
    }

    /// Connect a [`PipeClient`] to this caller's dispatcher over a fresh
    /// loopback channel; the serving side runs on a spawned task until the
    /// client closes the channel. Requires a tokio runtime.
    pub fn pipe(&self) -> PipeClient<C> {
        self.pipe_with_context(Context::new())
    }

    /// Like [`Caller::pipe`], with a caller-supplied connection context that
    /// is handed to every handler invoked through the pipe.
    pub fn pipe_with_context(&self, cx: Context) -> PipeClient<C> {
        let (client_end, server_end) = LoopbackChannel::pair();
        let server = PipeServer::new(self.dispatcher.clone(), server_end);
        tokio::spawn(async move {
            if let Err(err) = server.serve(cx).await {
                tracing::warn!(error = %err, "pipe server terminated with error");
            }
        });
        PipeClient::new(client_end)
    }
}

impl<C: Codec> Default for Caller<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> Clone for Caller<C> {
    fn clone(&self) -> Self {
        Caller {
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl<C: Codec> std::fmt::Debug for Caller<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller")
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
