//! Service registry and per-service method tables.
//!
//! A service is a named collection of callable methods backed by one handler
//! instance. Methods are registered explicitly through [`ServiceBuilder`],
//! which performs the validation pass at registration time and produces an
//! immutable [`MethodTable`]; nothing about a service can change after
//! [`ServiceRegistry::register`] stores it.
//!
//! # Validation
//!
//! A method qualifies iff:
//! - its name is non-empty and starts with an ASCII uppercase letter (the
//!   exported-name convention);
//! - its name is not already taken within the same builder;
//! - its shape is `(ctx, arg, &mut reply) -> Result<(), HandlerError>` with a
//!   codec-representable argument (`DeserializeOwned`) and reply
//!   (`Serialize + Default`) — enforced by the trait bounds on
//!   [`ServiceBuilder::method`].
//!
//! A method that fails the name checks is skipped with a warning, never an
//! error; only the complete absence of a name surfaces at call time.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};

use crate::codec::{Codec, JsonCodec};
use crate::context::Context;
use crate::error::{CallError, HandlerError};

type InvokeFn = Box<dyn Fn(Context, &[u8]) -> Result<Vec<u8>, CallError> + Send + Sync>;

/// Validated metadata for one callable method: its name, argument and reply
/// type tags, and the type-erased invocable handle bound to the handler
/// instance.
pub struct MethodDescriptor {
    name: String,
    arg_type: &'static str,
    reply_type: &'static str,
    invoke: InvokeFn,
}

impl MethodDescriptor {
    /// Method name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name of the argument, for diagnostics.
    pub fn arg_type(&self) -> &'static str {
        self.arg_type
    }

    /// Type name of the reply, for diagnostics.
    pub fn reply_type(&self) -> &'static str {
        self.reply_type
    }

    /// Decode the payload, invoke the bound handler, encode the reply.
    pub(crate) fn invoke(&self, cx: Context, raw: &[u8]) -> Result<Vec<u8>, CallError> {
        (self.invoke)(cx, raw)
    }
}

impl std::fmt::Debug for MethodDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDescriptor")
            .field("name", &self.name)
            .field("arg_type", &self.arg_type)
            .field("reply_type", &self.reply_type)
            .finish_non_exhaustive()
    }
}

/// Immutable per-service table of method name to descriptor.
#[derive(Debug, Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodDescriptor>,
}

impl MethodTable {
    /// Look up a method descriptor by name.
    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Number of callable methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Iterate over the method names of this table.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// One registered service: its name, the shared handler instance, and the
/// method table built at registration time.
pub struct ServiceEntry {
    name: String,
    handler: Arc<dyn Any + Send + Sync>,
    methods: MethodTable,
}

impl ServiceEntry {
    /// Registered service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The service's method table.
    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// The handler instance, if it is of type `H`.
    pub fn handler<H: Send + Sync + 'static>(&self) -> Option<Arc<H>> {
        Arc::clone(&self.handler).downcast::<H>().ok()
    }
}

impl std::fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .finish_non_exhaustive()
    }
}

/// Builder for one service's method table.
///
/// The builder owns the handler (shared via `Arc`) and binds every accepted
/// method to it. Methods rejected by validation are skipped with a
/// `tracing` warning.
pub struct ServiceBuilder<H, C: Codec = JsonCodec> {
    handler: Arc<H>,
    methods: HashMap<String, MethodDescriptor>,
    _codec: PhantomData<fn() -> C>,
}

impl<H: Send + Sync + 'static, C: Codec> ServiceBuilder<H, C> {
    /// Build a service around a freshly owned handler.
    pub fn new(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    /// Build a service around a handler the caller keeps a reference to.
    pub fn from_arc(handler: Arc<H>) -> Self {
        ServiceBuilder {
            handler,
            methods: HashMap::new(),
            _codec: PhantomData,
        }
    }

    /// Register one method of shape `(ctx, arg, &mut reply) -> Result<(), HandlerError>`.
    ///
    /// The reply starts from `R::default()`, so map- and sequence-shaped
    /// replies are handed to the handler as empty containers that can be
    /// inserted into or appended to unconditionally.
    pub fn method<A, R, F>(mut self, name: &str, f: F) -> Self
    where
        A: DeserializeOwned + 'static,
        R: Serialize + Default + 'static,
        F: Fn(&H, Context, A, &mut R) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        if !is_exported(name) {
            tracing::warn!(
                method = name,
                handler = std::any::type_name::<H>(),
                "skipping method: name must be non-empty and start with an ASCII uppercase letter"
            );
            return self;
        }
        if self.methods.contains_key(name) {
            tracing::warn!(
                method = name,
                handler = std::any::type_name::<H>(),
                "skipping method: name already registered on this service"
            );
            return self;
        }

        let handler = Arc::clone(&self.handler);
        let invoke: InvokeFn = Box::new(move |cx: Context, raw: &[u8]| {
            let arg: A = C::decode(raw).map_err(|e| CallError::Decode(e.to_string()))?;
            let mut reply = R::default();
            f(handler.as_ref(), cx, arg, &mut reply)?;
            C::encode(&reply).map_err(|e| CallError::Encode(e.to_string()))
        });

        self.methods.insert(
            name.to_string(),
            MethodDescriptor {
                name: name.to_string(),
                arg_type: std::any::type_name::<A>(),
                reply_type: std::any::type_name::<R>(),
                invoke,
            },
        );
        self
    }

    fn into_entry(self, name: String) -> ServiceEntry {
        ServiceEntry {
            name,
            handler: self.handler,
            methods: MethodTable {
                methods: self.methods,
            },
        }
    }
}

/// Exported-name rule: non-empty, first character ASCII uppercase.
fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(|c| c.is_ascii_uppercase())
}

/// Registry mapping service names to entries.
///
/// `register` and `get` are safe to call concurrently from multiple threads
/// of control; the map is guarded by an internal lock, and method tables are
/// immutable once built so entries can be read without further locking.
/// There is no deregistration.
pub struct ServiceRegistry<C: Codec = JsonCodec> {
    services: RwLock<HashMap<String, Arc<ServiceEntry>>>,
    _codec: PhantomData<fn() -> C>,
}

impl<C: Codec> ServiceRegistry<C> {
    pub fn new() -> Self {
        ServiceRegistry {
            services: RwLock::new(HashMap::new()),
            _codec: PhantomData,
        }
    }

    /// Store a service under `name`.
    ///
    /// Duplicate names are not an error: the last registration wins and the
    /// overwrite is logged. A registration under an empty name is ignored.
    pub fn register<H: Send + Sync + 'static>(
        &self,
        name: impl Into<String>,
        builder: ServiceBuilder<H, C>,
    ) {
        let name = name.into();
        if name.is_empty() {
            tracing::warn!("ignoring service registration under an empty name");
            return;
        }

        let entry = builder.into_entry(name.clone());
        if entry.methods.is_empty() {
            tracing::warn!(service = %name, "service registered with no callable methods");
        }

        let previous = self
            .services
            .write()
            .insert(name.clone(), Arc::new(entry));
        if previous.is_some() {
            tracing::warn!(service = %name, "overwriting existing service registration");
        }
    }

    /// Look up a service by name.
    pub fn get(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.services.read().get(name).cloned()
    }

    /// Look up a service's handler instance, typed.
    pub fn get_handler<H: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<H>> {
        self.get(name)?.handler::<H>()
    }

    /// Whether a service is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Names of all registered services, in no particular order.
    pub fn service_names(&self) -> Vec<String> {
        self.services.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl<C: Codec> Default for ServiceRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec> std::fmt::Debug for ServiceRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.service_names())
            .field("codec", &C::NAME)
            .finish()
    }
}
