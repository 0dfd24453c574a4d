use std::fmt;

use crate::transport::TransportError;

/// Error reported by a service method.
///
/// Handlers communicate failure through this type; the message crosses the
/// dispatch (and, on the pipe path, the wire) verbatim, so callers observe
/// exactly what the handler reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        HandlerError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        HandlerError::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        HandlerError { message }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

/// Result type for service methods.
pub type HandlerResult = Result<(), HandlerError>;

/// Errors surfaced by the invocation path.
///
/// Every failure is returned to the immediate caller; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The method key contains no `.` separator.
    MalformedKey(String),

    /// No service is registered under the requested name.
    ServiceNotFound(String),

    /// The service exists but has no method under the requested name.
    MethodNotFound(String),

    /// The request payload did not match the method's argument type.
    Decode(String),

    /// An argument or reply value failed to encode.
    Encode(String),

    /// The handler itself reported a failure; the message is propagated
    /// verbatim.
    Handler(String),

    /// The pipe transport failed underneath the call.
    Transport(TransportError),

    /// An asynchronous call completed without delivering a result.
    Aborted,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::MalformedKey(key) => {
                write!(f, "malformed method key {key:?}: expected \"Service.Method\"")
            }
            CallError::ServiceNotFound(service) => {
                write!(f, "service {service:?} is not registered")
            }
            CallError::MethodNotFound(key) => write!(f, "unknown method {key:?}"),
            CallError::Decode(msg) => write!(f, "failed to decode payload: {msg}"),
            CallError::Encode(msg) => write!(f, "failed to encode payload: {msg}"),
            CallError::Handler(msg) => f.write_str(msg),
            CallError::Transport(err) => write!(f, "transport error: {err}"),
            CallError::Aborted => f.write_str("call aborted before completing"),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CallError::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HandlerError> for CallError {
    fn from(err: HandlerError) -> Self {
        CallError::Handler(err.message)
    }
}

impl From<TransportError> for CallError {
    fn from(err: TransportError) -> Self {
        CallError::Transport(err)
    }
}
