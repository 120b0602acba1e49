//! Unified authentication context factory.
//!
//! The crate picks exactly one authentication backend (a native platform provider, an internal
//! protocol implementation, or CredSSP) for a requested protocol and hands the caller a
//! [`SecurityContext`] driving it. The protocol engines themselves are plugged in through the
//! [`Mechanism`], [`BackendConstructor`] and [`CapabilityProbe`] traits.
//!
//! ```
//! use spnego::{AuthFactory, BackendRegistry, ErrorKind};
//!
//! let factory = AuthFactory::new(BackendRegistry::new());
//! let err = factory.client().with_protocol("bogus").execute().unwrap_err();
//!
//! assert_eq!(err.error_type, ErrorKind::InvalidProtocol);
//! ```

#[macro_use]
extern crate tracing;

pub mod auth;
pub mod backend;
pub mod capability;
pub mod channel_bindings;
pub mod config;
pub mod context;
pub mod credential;
pub mod flags;
pub mod protocol;
pub mod selection;

mod secret;

use std::{error, fmt, io, result};

use num_derive::{FromPrimitive, ToPrimitive};

pub use crate::auth::{AuthFactory, ClientBuilder, SelectionRequest, ServerBuilder};
pub use crate::backend::{BackendConstructor, BackendKind, BackendRegistry, ContextArgs, Usage};
pub use crate::capability::{CapabilityProbe, StaticProbe, ToggleProbe};
pub use crate::channel_bindings::{ChannelBindings, PeerBindings};
pub use crate::config::FactoryConfig;
pub use crate::context::iov::{BufferType, IovBuffer, IovData, IovUnwrapResult};
pub use crate::context::{ContextState, Mechanism, MechanismStep, SecurityContext, UnwrapResult};
pub use crate::credential::{unify_credentials, Credential, CredentialInput, NtlmHash, NtlmHashError};
pub use crate::flags::{ContextReq, NegotiateOptions};
pub use crate::protocol::{ProtocolName, ProtocolSet};
pub use crate::secret::Secret;
pub use crate::selection::Selection;

pub type Result<T> = result::Result<T, Error>;

/// The kind of an authentication error.
///
/// Every kind carries the SSPI status code closest to its meaning so the error can be forwarded
/// to callers that speak in `SECURITY_STATUS` values.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
pub enum ErrorKind {
    /// The requested backend cannot serve the protocol after filtering.
    UnsupportedProtocol = 0x8009_0302,
    InternalError = 0x8009_0304,
    /// The protocol string is not one of `ntlm`, `kerberos`, `negotiate` or `credssp`.
    InvalidProtocol = 0x8009_0305,
    /// Used in cases when supplied token data is missing or malformed.
    InvalidToken = 0x8009_0308,
    OperationNotSupported = 0x8009_030A,
    /// The credential form is not recognized or conflicts with the selected backend.
    InvalidCredential = 0x8009_030D,
    /// No credential was found, usually because the ambient cache is empty.
    NoCredentials = 0x8009_030E,
    MessageAltered = 0x8009_030F,
    /// A context operation was called in a state where it is not allowed.
    IllegalState = 0x8009_0310,
    /// The channel bindings asserted by the peer do not match the local ones.
    BindingMismatch = 0x8009_0346,
}

/// Holds the [`ErrorKind`] and the description of the error.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Error {
    pub error_type: ErrorKind,
    pub description: String,
}

impl Error {
    /// Allows to fill a new error easily, supplying it with a coherent description.
    pub fn new(error_type: ErrorKind, description: impl ToString) -> Self {
        Self {
            error_type,
            description: description.to_string(),
        }
    }
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.error_type, self.description)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::InternalError, format!("IO error: {:?}", err))
    }
}

impl From<NtlmHashError> for Error {
    fn from(err: NtlmHashError) -> Self {
        Self::new(ErrorKind::InvalidCredential, err)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        io::Error::other(format!("{:?}: {}", err.error_type, err.description))
    }
}
