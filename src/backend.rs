use std::fmt;

use crate::{
    CapabilityProbe, ChannelBindings, ContextReq, Credential, Mechanism, NegotiateOptions, ProtocolName, ProtocolSet,
    Result,
};

/// The closed set of backends the factory can choose from.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BackendKind {
    /// Native backend A: the platform SSPI provider.
    Sspi,
    /// Native backend B: the platform GSSAPI provider.
    Gssapi,
    /// Internal SPNEGO wrapper over the internal NTLM/Kerberos engines.
    Negotiate,
    /// Internal NTLM engine.
    Ntlm,
    /// CredSSP wrapper; its inner negotiation is configured by the options.
    CredSsp,
}

impl BackendKind {
    pub fn is_native(&self) -> bool {
        matches!(self, BackendKind::Sspi | BackendKind::Gssapi)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Sspi => "SSPI",
            BackendKind::Gssapi => "GSSAPI",
            BackendKind::Negotiate => "Negotiate",
            BackendKind::Ntlm => "NTLM",
            BackendKind::CredSsp => "CredSSP",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which side of the exchange the context is for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Usage {
    /// The calling (client) side.
    Initiate,
    /// The target (server) side.
    Accept,
}

/// Everything a backend constructor receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextArgs {
    pub credentials: Vec<Credential>,
    pub hostname: String,
    pub service: String,
    pub channel_bindings: Option<ChannelBindings>,
    pub context_req: ContextReq,
    pub usage: Usage,
    pub protocol: ProtocolName,
    pub options: NegotiateOptions,
}

impl ContextArgs {
    /// The host based service principal name, e.g. `HTTP@server.example.com`.
    pub fn service_principal_name(&self) -> String {
        format!("{}@{}", self.service, self.hostname)
    }
}

/// Builds the mechanism for one backend kind.
///
/// Implemented for any `Fn(ContextArgs) -> Result<Box<dyn Mechanism>>`. Errors such as a missing
/// ambient credential are returned from here and reach the caller unchanged.
pub trait BackendConstructor: Send + Sync {
    fn construct(&self, args: ContextArgs) -> Result<Box<dyn Mechanism>>;
}

impl<F> BackendConstructor for F
where
    F: Fn(ContextArgs) -> Result<Box<dyn Mechanism>> + Send + Sync,
{
    fn construct(&self, args: ContextArgs) -> Result<Box<dyn Mechanism>> {
        self(args)
    }
}

struct NativeBackend {
    probe: Box<dyn CapabilityProbe>,
    constructor: Box<dyn BackendConstructor>,
}

/// Binds backend kinds to their constructors, and native kinds to their capability probes.
///
/// A kind without a constructor is never selected; a native kind without one advertises nothing.
#[derive(Default)]
pub struct BackendRegistry {
    sspi: Option<NativeBackend>,
    gssapi: Option<NativeBackend>,
    negotiate: Option<Box<dyn BackendConstructor>>,
    ntlm: Option<Box<dyn BackendConstructor>>,
    credssp: Option<Box<dyn BackendConstructor>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sspi(
        mut self,
        probe: impl CapabilityProbe + 'static,
        constructor: impl BackendConstructor + 'static,
    ) -> Self {
        self.sspi = Some(NativeBackend {
            probe: Box::new(probe),
            constructor: Box::new(constructor),
        });
        self
    }

    pub fn with_gssapi(
        mut self,
        probe: impl CapabilityProbe + 'static,
        constructor: impl BackendConstructor + 'static,
    ) -> Self {
        self.gssapi = Some(NativeBackend {
            probe: Box::new(probe),
            constructor: Box::new(constructor),
        });
        self
    }

    pub fn with_negotiate(mut self, constructor: impl BackendConstructor + 'static) -> Self {
        self.negotiate = Some(Box::new(constructor));
        self
    }

    pub fn with_ntlm(mut self, constructor: impl BackendConstructor + 'static) -> Self {
        self.ntlm = Some(Box::new(constructor));
        self
    }

    pub fn with_credssp(mut self, constructor: impl BackendConstructor + 'static) -> Self {
        self.credssp = Some(Box::new(constructor));
        self
    }

    pub fn is_registered(&self, kind: BackendKind) -> bool {
        self.constructor(kind).is_some()
    }

    /// Queries the native backend's probe. Non-native or unregistered kinds advertise nothing.
    pub fn available_protocols(&self, kind: BackendKind, options: NegotiateOptions) -> ProtocolSet {
        match self.native(kind) {
            Some(native) => native.probe.available_protocols(options),
            None => ProtocolSet::new(),
        }
    }

    pub(crate) fn constructor(&self, kind: BackendKind) -> Option<&dyn BackendConstructor> {
        match kind {
            BackendKind::Sspi | BackendKind::Gssapi => self.native(kind).map(|native| native.constructor.as_ref()),
            BackendKind::Negotiate => self.negotiate.as_deref(),
            BackendKind::Ntlm => self.ntlm.as_deref(),
            BackendKind::CredSsp => self.credssp.as_deref(),
        }
    }

    fn native(&self, kind: BackendKind) -> Option<&NativeBackend> {
        match kind {
            BackendKind::Sspi => self.sspi.as_ref(),
            BackendKind::Gssapi => self.gssapi.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("sspi", &self.sspi.as_ref().map(|native| &native.probe))
            .field("gssapi", &self.gssapi.as_ref().map(|native| &native.probe))
            .field("negotiate", &self.negotiate.is_some())
            .field("ntlm", &self.ntlm.is_some())
            .field("credssp", &self.credssp.is_some())
            .finish()
    }
}
