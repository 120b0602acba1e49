//! Entry points: [`AuthFactory`] and its client and server builders.

use tracing::Dispatch;

use crate::config::{DEFAULT_HOSTNAME, DEFAULT_SERVICE};
use crate::selection::select_backend;
use crate::{
    unify_credentials, BackendRegistry, ChannelBindings, ContextArgs, ContextReq, Credential, CredentialInput, Error,
    ErrorKind, FactoryConfig, NegotiateOptions, ProtocolName, Result, SecurityContext, Selection, Usage,
};

/// Creates security contexts over the backends of a [`BackendRegistry`].
///
/// The factory keeps no per-call state: capability is probed again for every context, so it can
/// be shared between threads and reused for the lifetime of the process. Log events go to the
/// global subscriber, or to the [`Dispatch`] given to [`AuthFactory::with_dispatch`].
#[derive(Debug)]
pub struct AuthFactory {
    registry: BackendRegistry,
    dispatch: Option<Dispatch>,
}

impl AuthFactory {
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            dispatch: None,
        }
    }

    /// Like [`AuthFactory::new`], with every event of the factory and of its contexts sent to
    /// `dispatch` instead of the global subscriber.
    pub fn with_dispatch(registry: BackendRegistry, dispatch: Dispatch) -> Self {
        Self {
            registry,
            dispatch: Some(dispatch),
        }
    }

    /// Starts building an initiating (client side) context.
    pub fn client(&self) -> ClientBuilder<'_> {
        ClientBuilder {
            factory: self,
            request: SelectionRequest::default(),
            target: Target::default(),
        }
    }

    /// Starts building an accepting (server side) context.
    pub fn server(&self) -> ServerBuilder<'_> {
        ServerBuilder {
            factory: self,
            request: SelectionRequest::default(),
            target: Target::default(),
        }
    }

    /// Runs the selection for `request` without constructing anything.
    pub fn select(&self, request: &SelectionRequest) -> Result<Selection> {
        self.dispatched(|| self.resolve(request.clone()).map(|(selection, _)| selection))
    }

    fn resolve(&self, request: SelectionRequest) -> Result<(Selection, Vec<Credential>)> {
        let protocol: ProtocolName = request.protocol.parse()?;
        let credentials = unify_credentials(request.username, request.password)?;

        let selection = select_backend(
            &self.registry,
            protocol,
            &credentials,
            request.context_req,
            request.options,
        )?;

        Ok((selection, credentials))
    }

    fn new_context(&self, request: SelectionRequest, target: Target, usage: Usage) -> Result<SecurityContext> {
        self.dispatched(|| self.new_context_impl(request, target, usage))
    }

    #[instrument(level = "debug", skip_all, fields(protocol = %request.protocol, ?usage))]
    fn new_context_impl(&self, request: SelectionRequest, target: Target, usage: Usage) -> Result<SecurityContext> {
        let context_req = request.context_req;
        let options = request.options;

        let (selection, credentials) = self.resolve(request)?;

        let constructor = self.registry.constructor(selection.kind).ok_or_else(|| {
            Error::new(
                ErrorKind::InternalError,
                format!("The {} backend was selected but has no constructor", selection.kind),
            )
        })?;

        let args = ContextArgs {
            credentials,
            hostname: target.hostname,
            service: target.service,
            channel_bindings: target.channel_bindings.clone(),
            context_req,
            usage,
            protocol: selection.protocol,
            options,
        };
        debug!(
            backend = %selection.kind,
            protocol = %selection.protocol,
            spn = %args.service_principal_name(),
            "constructing context"
        );

        let mechanism = constructor.construct(args)?;

        Ok(SecurityContext::new(
            mechanism,
            selection,
            usage,
            target.channel_bindings,
            self.dispatch.clone(),
        ))
    }

    fn dispatched<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

/// The inputs that decide which backend is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionRequest {
    pub username: CredentialInput,
    pub password: Option<String>,
    /// One of `ntlm`, `kerberos`, `negotiate` or `credssp`, case-insensitive.
    pub protocol: String,
    pub options: NegotiateOptions,
    pub context_req: ContextReq,
}

impl Default for SelectionRequest {
    fn default() -> Self {
        Self {
            username: CredentialInput::None,
            password: None,
            protocol: ProtocolName::Negotiate.to_string(),
            options: NegotiateOptions::empty(),
            context_req: ContextReq::DEFAULT,
        }
    }
}

#[derive(Debug, Clone)]
struct Target {
    hostname: String,
    service: String,
    channel_bindings: Option<ChannelBindings>,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_owned(),
            service: DEFAULT_SERVICE.to_owned(),
            channel_bindings: None,
        }
    }
}

macro_rules! target_setters {
    () => {
        /// Seeds protocol, options, service and hostname from a [`FactoryConfig`].
        pub fn with_config(mut self, config: &FactoryConfig) -> Self {
            self.request.protocol = config.protocol.to_string();
            self.request.options = config.options;
            self.target.service = config.service.clone();
            self.target.hostname = config.hostname.clone();
            self
        }

        /// Credentials to use, tried in order by the backend.
        pub fn with_credentials(mut self, credentials: impl Into<CredentialInput>) -> Self {
            self.request.username = credentials.into();
            self
        }

        pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
            self.target.hostname = hostname.into();
            self
        }

        pub fn with_service(mut self, service: impl Into<String>) -> Self {
            self.target.service = service.into();
            self
        }

        pub fn with_channel_bindings(mut self, channel_bindings: ChannelBindings) -> Self {
            self.target.channel_bindings = Some(channel_bindings);
            self
        }

        pub fn with_context_req(mut self, context_req: ContextReq) -> Self {
            self.request.context_req = context_req;
            self
        }

        /// The protocol name; validated when the context is built.
        pub fn with_protocol(mut self, protocol: impl ToString) -> Self {
            self.request.protocol = protocol.to_string();
            self
        }

        pub fn with_options(mut self, options: NegotiateOptions) -> Self {
            self.request.options = options;
            self
        }

        /// The selection this builder would make, without constructing the context.
        pub fn selection(&self) -> Result<Selection> {
            self.factory.select(&self.request)
        }
    };
}

/// Builds an initiating context. Obtained from [`AuthFactory::client`].
#[derive(Debug)]
pub struct ClientBuilder<'a> {
    factory: &'a AuthFactory,
    request: SelectionRequest,
    target: Target,
}

impl ClientBuilder<'_> {
    /// A principal name; combined with [`ClientBuilder::with_password`] it becomes a password
    /// credential, otherwise the ambient cache for that principal is used.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.request.username = CredentialInput::Name(username.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.request.password = Some(password.into());
        self
    }

    target_setters!();

    pub fn execute(self) -> Result<SecurityContext> {
        self.factory.new_context(self.request, self.target, Usage::Initiate)
    }
}

/// Builds an accepting context. Obtained from [`AuthFactory::server`].
///
/// Without credentials the acceptor uses whatever the host caches for the service principal.
#[derive(Debug)]
pub struct ServerBuilder<'a> {
    factory: &'a AuthFactory,
    request: SelectionRequest,
    target: Target,
}

impl ServerBuilder<'_> {
    target_setters!();

    pub fn execute(self) -> Result<SecurityContext> {
        self.factory.new_context(self.request, self.target, Usage::Accept)
    }
}
