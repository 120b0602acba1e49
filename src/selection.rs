//! Backend selection.
//!
//! Selection runs in two phases. First the capability sets advertised by the native backends are
//! filtered according to the supplied credentials and requirement flags. Then a fixed precedence
//! list is walked top-down and the first matching rule decides:
//!
//! 1. `credssp` always goes to the CredSSP wrapper.
//! 2. An explicit backend override (`USE_SSPI` > `USE_GSSAPI` > `USE_NEGOTIATE` > `USE_NTLM`).
//! 3. The first native backend (SSPI, then GSSAPI) whose filtered set has the protocol. GSSAPI is
//!    always eligible for `kerberos`.
//! 4. `negotiate` goes to the internal Negotiate wrapper.
//! 5. `ntlm`, or a `negotiate` that could not be placed, goes to the internal NTLM engine.
//! 6. Anything else is unsupported.
//!
//! There is no backtracking: once a rule matches, its backend is used or the call fails.

use std::fmt;

use crate::{
    BackendKind, BackendRegistry, ContextReq, Credential, Error, ErrorKind, NegotiateOptions, ProtocolName, ProtocolSet,
    Result,
};

/// The outcome of selection: which backend to construct and the protocol it is asked for.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Selection {
    pub kind: BackendKind,
    pub protocol: ProtocolName,
}

impl Selection {
    fn new(kind: BackendKind, protocol: ProtocolName) -> Self {
        Self { kind, protocol }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind, self.protocol)
    }
}

/// Protocol sets of the two native backends for a single selection call.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct NativeCapabilities {
    pub sspi: ProtocolSet,
    pub gssapi: ProtocolSet,
}

impl NativeCapabilities {
    /// Probes both native backends. Called once per selection, never cached.
    pub fn probe(registry: &BackendRegistry, options: NegotiateOptions) -> Self {
        Self {
            sspi: registry.available_protocols(BackendKind::Sspi, options),
            gssapi: registry.available_protocols(BackendKind::Gssapi, options),
        }
    }
}

/// Removes from the native capability sets what the credentials make unusable.
///
/// * GSSAPI loses `negotiate` when a Kerberos-only credential is present, or when delegation is
///   requested together with a fresh secret (password or keytab): such credentials must go
///   through the Kerberos specific path to get a forwardable ticket.
/// * Both native backends lose `ntlm` and `negotiate` when an NT hash is present, since they
///   only accept a plaintext secret or a cache handle.
///
/// The input sets are left untouched; new sets are returned.
pub fn filter_capabilities(
    raw: &NativeCapabilities,
    credentials: &[Credential],
    context_req: ContextReq,
) -> NativeCapabilities {
    let mut filtered = raw.clone();

    if filtered.gssapi.contains(ProtocolName::Negotiate) {
        if let Some(reason) = gssapi_negotiate_exclusion(credentials, context_req) {
            debug!(reason, "GSSAPI negotiate is not usable");
            filtered.gssapi = filtered.gssapi.without(&[ProtocolName::Negotiate]);
        }
    }

    if has_nt_hash(credentials) {
        debug!("NT hash credential present, native ntlm and negotiate are not usable");

        let removed = [ProtocolName::Ntlm, ProtocolName::Negotiate];
        filtered.sspi = filtered.sspi.without(&removed);
        filtered.gssapi = filtered.gssapi.without(&removed);
    }

    filtered
}

/// The first credential that keeps GSSAPI from serving `negotiate`, described.
fn gssapi_negotiate_exclusion(credentials: &[Credential], context_req: ContextReq) -> Option<&'static str> {
    let forwardable = context_req.is_forwardable();

    credentials.iter().find_map(|credential| {
        if credential.supported_protocols() == [ProtocolName::Kerberos] {
            Some("kerberos only credential")
        } else if forwardable && credential.is_fresh_secret() {
            Some("delegation with a fresh secret")
        } else {
            None
        }
    })
}

fn has_nt_hash(credentials: &[Credential]) -> bool {
    credentials
        .iter()
        .any(|credential| matches!(credential, Credential::NtlmHash { .. }))
}

/// The backend forced by the options, if any.
pub fn backend_override(options: NegotiateOptions) -> Option<BackendKind> {
    [
        (NegotiateOptions::USE_SSPI, BackendKind::Sspi),
        (NegotiateOptions::USE_GSSAPI, BackendKind::Gssapi),
        (NegotiateOptions::USE_NEGOTIATE, BackendKind::Negotiate),
        (NegotiateOptions::USE_NTLM, BackendKind::Ntlm),
    ]
    .into_iter()
    .find(|(option, _)| options.contains(*option))
    .map(|(_, kind)| kind)
}

/// Chooses exactly one backend.
///
/// A pure function of its arguments: `raw` is the capability probed for this call and
/// `is_registered` tells which backend kinds can be constructed at all.
pub fn select(
    protocol: ProtocolName,
    credentials: &[Credential],
    context_req: ContextReq,
    options: NegotiateOptions,
    raw: &NativeCapabilities,
    is_registered: impl Fn(BackendKind) -> bool,
) -> Result<Selection> {
    let filtered = filter_capabilities(raw, credentials, context_req);

    if protocol == ProtocolName::CredSsp {
        return require_registered(Selection::new(BackendKind::CredSsp, protocol), &is_registered);
    }

    if let Some(kind) = backend_override(options) {
        return select_override(kind, protocol, credentials, context_req, &is_registered);
    }

    if is_registered(BackendKind::Sspi) && filtered.sspi.contains(protocol) {
        return Ok(Selection::new(BackendKind::Sspi, protocol));
    }

    let gssapi_eligible = protocol == ProtocolName::Kerberos || filtered.gssapi.contains(protocol);
    if is_registered(BackendKind::Gssapi) && gssapi_eligible {
        return Ok(Selection::new(BackendKind::Gssapi, protocol));
    }

    if protocol == ProtocolName::Negotiate && is_registered(BackendKind::Negotiate) {
        return Ok(Selection::new(BackendKind::Negotiate, protocol));
    }

    if matches!(protocol, ProtocolName::Ntlm | ProtocolName::Negotiate) && is_registered(BackendKind::Ntlm) {
        return Ok(Selection::new(BackendKind::Ntlm, ProtocolName::Ntlm));
    }

    Err(Error::new(
        ErrorKind::UnsupportedProtocol,
        format!("No available backend can serve the '{}' protocol", protocol),
    ))
}

/// Probes the registry and selects a backend for the given call parameters.
#[instrument(level = "debug", ret, skip(registry, credentials))]
pub fn select_backend(
    registry: &BackendRegistry,
    protocol: ProtocolName,
    credentials: &[Credential],
    context_req: ContextReq,
    options: NegotiateOptions,
) -> Result<Selection> {
    let raw = NativeCapabilities::probe(registry, options);
    debug!(sspi = %raw.sspi, gssapi = %raw.gssapi, "native capabilities");

    select(protocol, credentials, context_req, options, &raw, |kind| {
        registry.is_registered(kind)
    })
}

fn select_override(
    kind: BackendKind,
    protocol: ProtocolName,
    credentials: &[Credential],
    context_req: ContextReq,
    is_registered: &impl Fn(BackendKind) -> bool,
) -> Result<Selection> {
    if let Some(reason) = override_conflict(kind, protocol, credentials, context_req) {
        return Err(Error::new(
            ErrorKind::InvalidCredential,
            format!(
                "The {} backend was forced for '{}' but the supplied credentials cannot be used with it ({})",
                kind, protocol, reason
            ),
        ));
    }

    let protocol = match (kind, protocol) {
        (BackendKind::Ntlm, ProtocolName::Negotiate) => ProtocolName::Ntlm,
        (BackendKind::Ntlm, ProtocolName::Kerberos) => {
            return Err(Error::new(
                ErrorKind::UnsupportedProtocol,
                "The NTLM backend was forced but the 'kerberos' protocol was requested",
            ))
        }
        (_, protocol) => protocol,
    };

    require_registered(Selection::new(kind, protocol), is_registered)
}

/// Checks a forced native backend against the credential rules of [`filter_capabilities`].
///
/// Unlike filtering this does not depend on what the backend advertised.
fn override_conflict(
    kind: BackendKind,
    protocol: ProtocolName,
    credentials: &[Credential],
    context_req: ContextReq,
) -> Option<&'static str> {
    if !kind.is_native() {
        return None;
    }

    if matches!(protocol, ProtocolName::Ntlm | ProtocolName::Negotiate) && has_nt_hash(credentials) {
        return Some("native backends do not accept an NT hash");
    }

    if kind == BackendKind::Gssapi && protocol == ProtocolName::Negotiate {
        return gssapi_negotiate_exclusion(credentials, context_req);
    }

    None
}

fn require_registered(selection: Selection, is_registered: &impl Fn(BackendKind) -> bool) -> Result<Selection> {
    if is_registered(selection.kind) {
        Ok(selection)
    } else {
        Err(Error::new(
            ErrorKind::UnsupportedProtocol,
            format!(
                "The '{}' protocol requires the {} backend which is not available",
                selection.protocol, selection.kind
            ),
        ))
    }
}
