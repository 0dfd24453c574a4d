//! Dotted-key resolution and the decode → invoke → encode path.

use std::sync::Arc;

use crate::codec::{Codec, JsonCodec};
use crate::context::Context;
use crate::error::CallError;
use crate::registry::ServiceRegistry;

/// Resolves a `"Service.Method"` key against a [`ServiceRegistry`] and runs
/// the invocation: decode the request payload into the method's argument
/// type, start the reply from its default value, invoke the handler, encode
/// the reply.
///
/// The dispatcher performs no retries and no cancellation checks; honoring
/// the [`Context`] is the handler's business.
pub struct Dispatcher<C: Codec = JsonCodec> {
    registry: Arc<ServiceRegistry<C>>,
}

impl<C: Codec> Dispatcher<C> {
    pub fn new(registry: Arc<ServiceRegistry<C>>) -> Self {
        Dispatcher { registry }
    }

    /// The registry this dispatcher resolves against.
    pub fn registry(&self) -> &Arc<ServiceRegistry<C>> {
        &self.registry
    }

    /// Resolve `key` and invoke the method with the encoded payload `raw`.
    ///
    /// The key is split on its **last** `.`; a key without a separator fails
    /// with [`CallError::MalformedKey`] before the registry is consulted.
    /// Returns the encoded reply on success.
    pub fn dispatch(&self, cx: Context, key: &str, raw: &[u8]) -> Result<Vec<u8>, CallError> {
        let (service, method) = key
            .rsplit_once('.')
            .ok_or_else(|| CallError::MalformedKey(key.to_string()))?;

        let entry = self
            .registry
            .get(service)
            .ok_or_else(|| CallError::ServiceNotFound(service.to_string()))?;

        let desc = entry
            .methods()
            .get(method)
            .ok_or_else(|| CallError::MethodNotFound(format!("{service}.{method}")))?;

        tracing::trace!(service, method, payload_len = raw.len(), "dispatching call");
        desc.invoke(cx, raw)
    }
}

impl<C: Codec> Clone for Dispatcher<C> {
    fn clone(&self) -> Self {
        Dispatcher {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<C: Codec> std::fmt::Debug for Dispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .finish()
    }
}
