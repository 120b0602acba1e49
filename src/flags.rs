use std::str::FromStr;

use bitflags::bitflags;

use crate::{Error, ErrorKind};

bitflags! {
    /// Capabilities the caller requires from the established context.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContextReq: u32 {
        const DELEGATE = 0x1;
        const MUTUAL_AUTH = 0x2;
        const REPLAY_DETECT = 0x4;
        const SEQUENCE_DETECT = 0x8;
        const CONFIDENTIALITY = 0x10;
        const INTEGRITY = 0x20;
        const ANONYMOUS = 0x40;
        const IDENTIFY = 0x2000;
        /// Delegate only when the KDC policy marks the target as trusted for delegation.
        const DELEGATE_POLICY = 0x8_0000;
        const NO_INTEGRITY = 0x1000_0000;

        const DEFAULT = Self::MUTUAL_AUTH.bits()
            | Self::REPLAY_DETECT.bits()
            | Self::SEQUENCE_DETECT.bits()
            | Self::CONFIDENTIALITY.bits()
            | Self::INTEGRITY.bits();
    }
}

impl ContextReq {
    /// Whether any form of credential delegation was asked for.
    pub fn is_forwardable(&self) -> bool {
        self.intersects(ContextReq::DELEGATE | ContextReq::DELEGATE_POLICY)
    }
}

impl Default for ContextReq {
    fn default() -> Self {
        ContextReq::DEFAULT
    }
}

bitflags! {
    /// Hints controlling how the backend is chosen and what it must support.
    ///
    /// `USE_SSPI`, `USE_GSSAPI`, `USE_NEGOTIATE` and `USE_NTLM` force a backend. The other flags
    /// describe features the caller will use; a native backend unable to provide them reports no
    /// protocols at all.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct NegotiateOptions: u32 {
        /// Force the native SSPI backend.
        const USE_SSPI = 0x1;
        /// Force the native GSSAPI backend.
        const USE_GSSAPI = 0x2;
        /// Force the internal Negotiate wrapper.
        const USE_NEGOTIATE = 0x4;
        /// Force the internal NTLM engine.
        const USE_NTLM = 0x8;
        /// Kerberos must be usable inside Negotiate, not just NTLM.
        const NEGOTIATE_KERBEROS = 0x10;
        /// The session key must be retrievable once established.
        const SESSION_KEY = 0x20;
        /// `wrap_iov`/`unwrap_iov` must be available.
        const WRAPPING_IOV = 0x40;
        /// WinRM style header/data wrapping must be available.
        const WRAPPING_WINRM = 0x80;
    }
}

impl Default for NegotiateOptions {
    fn default() -> Self {
        NegotiateOptions::empty()
    }
}

impl NegotiateOptions {
    pub const BACKEND_OVERRIDES: NegotiateOptions = NegotiateOptions::USE_SSPI
        .union(NegotiateOptions::USE_GSSAPI)
        .union(NegotiateOptions::USE_NEGOTIATE)
        .union(NegotiateOptions::USE_NTLM);

    /// Options that change what a backend must support, as opposed to which backend is used.
    pub fn feature_hints(&self) -> NegotiateOptions {
        self.difference(NegotiateOptions::BACKEND_OVERRIDES)
    }
}

/// Parses a comma separated list such as `use_ntlm, session_key`.
///
/// Names are case-insensitive and an empty string yields no options.
impl FromStr for NegotiateOptions {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let mut options = NegotiateOptions::empty();

        for name in s.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            let option = match name.to_ascii_lowercase().as_str() {
                "use_sspi" => NegotiateOptions::USE_SSPI,
                "use_gssapi" => NegotiateOptions::USE_GSSAPI,
                "use_negotiate" => NegotiateOptions::USE_NEGOTIATE,
                "use_ntlm" => NegotiateOptions::USE_NTLM,
                "negotiate_kerberos" => NegotiateOptions::NEGOTIATE_KERBEROS,
                "session_key" => NegotiateOptions::SESSION_KEY,
                "wrapping_iov" => NegotiateOptions::WRAPPING_IOV,
                "wrapping_winrm" => NegotiateOptions::WRAPPING_WINRM,
                _ => {
                    return Err(Error::new(
                        ErrorKind::InternalError,
                        format!("unexpected negotiate option: {}", name),
                    ))
                }
            };
            options |= option;
        }

        Ok(options)
    }
}
