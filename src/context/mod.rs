pub mod iov;

use std::fmt;

use tracing::Dispatch;

use self::iov::{IovBuffer, IovUnwrapResult};
use crate::{BackendKind, ChannelBindings, Error, ErrorKind, PeerBindings, ProtocolName, Result, Selection, Usage};

/// Lifecycle of a [`SecurityContext`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ContextState {
    /// Built, no token exchanged yet.
    Created,
    /// At least one step done, more tokens expected.
    Negotiating,
    /// Authentication completed; message protection is available.
    Established,
    /// Closed explicitly, on drop, or after a channel binding mismatch.
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The output of one negotiation step of a [`Mechanism`].
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct MechanismStep {
    /// Token to send to the peer, if any.
    pub token: Option<Vec<u8>>,
    /// The mechanism considers the exchange complete.
    pub complete: bool,
    /// Channel bindings asserted by the peer in its token.
    pub peer_bindings: Option<PeerBindings>,
}

impl MechanismStep {
    pub fn continue_with(token: Vec<u8>) -> Self {
        Self {
            token: Some(token),
            complete: false,
            peer_bindings: None,
        }
    }

    pub fn complete(token: Option<Vec<u8>>) -> Self {
        Self {
            token,
            complete: true,
            peer_bindings: None,
        }
    }

    pub fn with_peer_bindings(mut self, peer_bindings: PeerBindings) -> Self {
        self.peer_bindings = Some(peer_bindings);
        self
    }
}

/// The result of [`SecurityContext::unwrap`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct UnwrapResult {
    pub data: Vec<u8>,
    /// Whether the message was encrypted rather than only signed.
    pub encrypted: bool,
    /// Quality of protection applied by the peer.
    pub qop: u32,
}

/// A protocol engine driven by a [`SecurityContext`].
///
/// Implemented by the native bindings and by the internal NTLM, Negotiate and CredSSP engines.
/// The context enforces the lifecycle, so implementations may assume `wrap` and friends are only
/// called after `step` reported completion.
pub trait Mechanism: fmt::Debug + Send {
    /// Consumes the peer token (if any) and produces the next local one.
    fn step(&mut self, input: Option<&[u8]>) -> Result<MechanismStep>;

    fn wrap(&mut self, data: &[u8], encrypt: bool) -> Result<Vec<u8>>;

    fn unwrap(&mut self, data: &[u8]) -> Result<UnwrapResult>;

    fn sign(&mut self, data: &[u8]) -> Result<Vec<u8>>;

    fn verify(&mut self, data: &[u8], signature: &[u8]) -> Result<()>;

    fn wrap_iov(&mut self, _buffers: Vec<IovBuffer>, _encrypt: bool) -> Result<Vec<IovBuffer>> {
        Err(Error::new(
            ErrorKind::OperationNotSupported,
            "IOV wrapping is not supported by this backend",
        ))
    }

    fn unwrap_iov(&mut self, _buffers: Vec<IovBuffer>) -> Result<IovUnwrapResult> {
        Err(Error::new(
            ErrorKind::OperationNotSupported,
            "IOV unwrapping is not supported by this backend",
        ))
    }

    /// The protocol actually in use, e.g. `ntlm` for a Negotiate exchange that fell back.
    fn negotiated_protocol(&self) -> ProtocolName;

    fn session_key(&self) -> Option<Vec<u8>> {
        None
    }

    /// On the accepting side, the authenticated client.
    fn client_principal(&self) -> Option<String> {
        None
    }

    /// Releases backend resources. Called at most once.
    fn close(&mut self) {}
}

/// A uniform authentication context over the selected backend.
///
/// Every operation takes `&mut self`; a context is driven by one caller at a time. Dropping the
/// context closes the underlying mechanism.
pub struct SecurityContext {
    mechanism: Box<dyn Mechanism>,
    state: ContextState,
    selection: Selection,
    usage: Usage,
    channel_bindings: Option<ChannelBindings>,
    dispatch: Option<Dispatch>,
}

impl SecurityContext {
    pub(crate) fn new(
        mechanism: Box<dyn Mechanism>,
        selection: Selection,
        usage: Usage,
        channel_bindings: Option<ChannelBindings>,
        dispatch: Option<Dispatch>,
    ) -> Self {
        Self {
            mechanism,
            state: ContextState::Created,
            selection,
            usage,
            channel_bindings,
            dispatch,
        }
    }

    /// Feeds the peer token (or nothing, for the first client step) to the mechanism.
    ///
    /// Returns the token to send back, `None` if there is nothing to send. Once the mechanism
    /// reports completion the context becomes [`ContextState::Established`].
    pub fn step(&mut self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        self.dispatched(|context| context.step_impl(input))
    }

    pub fn is_established(&self) -> bool {
        self.state == ContextState::Established
    }

    /// The protocol the mechanism settled on. Use [`SecurityContext::selection`] before the exchange completes.
    pub fn negotiated_protocol(&self) -> Result<ProtocolName> {
        self.check_established("negotiated_protocol")?;

        Ok(self.dispatched_ref(|context| context.mechanism.negotiated_protocol()))
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn backend(&self) -> BackendKind {
        self.selection.kind
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn wrap(&mut self, data: &[u8], encrypt: bool) -> Result<Vec<u8>> {
        self.check_established("wrap")?;
        self.dispatched(|context| context.mechanism.wrap(data, encrypt))
    }

    pub fn unwrap(&mut self, data: &[u8]) -> Result<UnwrapResult> {
        self.check_established("unwrap")?;
        self.dispatched(|context| context.mechanism.unwrap(data))
    }

    pub fn sign(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.check_established("sign")?;
        self.dispatched(|context| context.mechanism.sign(data))
    }

    pub fn verify(&mut self, data: &[u8], signature: &[u8]) -> Result<()> {
        self.check_established("verify")?;
        self.dispatched(|context| context.mechanism.verify(data, signature))
    }

    pub fn wrap_iov(&mut self, buffers: Vec<IovBuffer>, encrypt: bool) -> Result<Vec<IovBuffer>> {
        self.check_established("wrap_iov")?;
        iov::validate_buffers(&buffers)?;

        let buffers = buffers.into_iter().map(IovBuffer::allocate).collect();
        self.dispatched(|context| context.mechanism.wrap_iov(buffers, encrypt))
    }

    pub fn unwrap_iov(&mut self, buffers: Vec<IovBuffer>) -> Result<IovUnwrapResult> {
        self.check_established("unwrap_iov")?;
        iov::validate_buffers(&buffers)?;

        self.dispatched(|context| context.mechanism.unwrap_iov(buffers))
    }

    pub fn session_key(&self) -> Result<Vec<u8>> {
        self.check_established("session_key")?;

        self.dispatched_ref(|context| {
            context.mechanism.session_key().ok_or_else(|| {
                Error::new(
                    ErrorKind::OperationNotSupported,
                    format!("The {} backend does not expose the session key", context.selection.kind),
                )
            })
        })
    }

    /// The authenticated client, available on an established accepting context.
    pub fn client_principal(&self) -> Result<Option<String>> {
        self.check_established("client_principal")?;

        Ok(self.dispatched_ref(|context| context.mechanism.client_principal()))
    }

    /// Closes the context. Further calls do nothing.
    pub fn close(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }

        self.dispatched(|context| {
            debug!(backend = %context.selection.kind, state = %context.state, "closing context");
            context.mechanism.close();
            context.state = ContextState::Closed;
        })
    }

    #[instrument(level = "debug", skip_all, fields(backend = %self.selection.kind, state = %self.state))]
    fn step_impl(&mut self, input: Option<&[u8]>) -> Result<Option<Vec<u8>>> {
        match self.state {
            ContextState::Created | ContextState::Negotiating => {}
            state => {
                return Err(Error::new(
                    ErrorKind::IllegalState,
                    format!("step is not allowed in the {} state", state),
                ))
            }
        }

        let MechanismStep {
            token,
            complete,
            peer_bindings,
        } = self.mechanism.step(input)?;

        if let (Some(local), Some(peer)) = (&self.channel_bindings, &peer_bindings) {
            if !peer.matches(local) {
                warn!("peer channel bindings do not match, closing context");
                self.close();

                return Err(Error::new(
                    ErrorKind::BindingMismatch,
                    "The channel bindings asserted by the peer do not match the local channel bindings",
                ));
            }
        }

        self.state = if complete {
            ContextState::Established
        } else {
            ContextState::Negotiating
        };
        trace!(state = %self.state, has_token = token.is_some(), "step done");

        Ok(token)
    }

    fn check_established(&self, operation: &str) -> Result<()> {
        if self.state == ContextState::Established {
            Ok(())
        } else {
            Err(Error::new(
                ErrorKind::IllegalState,
                format!("{} requires an established context, the context is {}", operation, self.state),
            ))
        }
    }

    fn dispatched<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        match self.dispatch.clone() {
            Some(dispatch) => tracing::dispatcher::with_default(&dispatch, || f(self)),
            None => f(self),
        }
    }

    fn dispatched_ref<T>(&self, f: impl FnOnce(&Self) -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, || f(self)),
            None => f(self),
        }
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("mechanism", &self.mechanism)
            .field("state", &self.state)
            .field("selection", &self.selection)
            .field("usage", &self.usage)
            .field("channel_bindings", &self.channel_bindings)
            .finish_non_exhaustive()
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        self.close();
    }
}
