mod hash;

use std::fmt;

pub use self::hash::{NtlmHash, NtlmHashError, NTLM_HASH_SIZE};
use crate::{Error, ErrorKind, ProtocolName, Result, Secret};

/// Credential handed to a backend.
///
/// The order of a credential list is significant: backends try the credentials front to back,
/// so a Negotiate context given `[KerberosCCache, NtlmHash]` uses the cache for Kerberos and
/// falls back to the hash for NTLM.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Username and password; usable by every protocol.
    Password { username: String, password: Secret<String> },
    /// An existing Kerberos credential cache such as `FILE:/tmp/krb5cc_1000`.
    KerberosCCache { principal: Option<String>, ccache: String },
    /// A Kerberos keytab used to obtain a fresh ticket for `principal`.
    KerberosKeytab { principal: String, keytab: String },
    /// Precomputed NT (and optionally LM) hash; only NTLM can consume it.
    NtlmHash {
        username: String,
        lm_hash: Option<NtlmHash>,
        nt_hash: NtlmHash,
    },
    /// Whatever the host environment already caches, optionally for a specific principal.
    CredentialCache { principal: Option<String> },
}

impl Credential {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credential::Password {
            username: username.into(),
            password: Secret::new(password.into()),
        }
    }

    /// Builds an [`Credential::NtlmHash`] from a `LM:NT` or bare `NT` hex string.
    pub fn ntlm_hash(username: impl Into<String>, hashes: &str) -> Result<Self> {
        let (lm_hash, nt_hash) = NtlmHash::parse_pair(hashes)?;

        Ok(Credential::NtlmHash {
            username: username.into(),
            lm_hash,
            nt_hash,
        })
    }

    /// The sub-protocols that can consume this credential, in preference order.
    pub fn supported_protocols(&self) -> &'static [ProtocolName] {
        match self {
            Credential::Password { .. } | Credential::CredentialCache { .. } => {
                &[ProtocolName::Kerberos, ProtocolName::Ntlm]
            }
            Credential::KerberosCCache { .. } | Credential::KerberosKeytab { .. } => &[ProtocolName::Kerberos],
            Credential::NtlmHash { .. } => &[ProtocolName::Ntlm],
        }
    }

    /// The principal or username the credential is for, if it names one.
    pub fn principal(&self) -> Option<&str> {
        match self {
            Credential::Password { username, .. } | Credential::NtlmHash { username, .. } => Some(username.as_str()),
            Credential::KerberosKeytab { principal, .. } => Some(principal.as_str()),
            Credential::KerberosCCache { principal, .. } | Credential::CredentialCache { principal } => {
                principal.as_deref()
            }
        }
    }

    /// A secret supplied by the caller rather than reused from an existing cache or ticket.
    pub fn is_fresh_secret(&self) -> bool {
        matches!(self, Credential::Password { .. } | Credential::KerberosKeytab { .. })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Credential::Password { .. } => "Password",
            Credential::KerberosCCache { .. } => "KerberosCCache",
            Credential::KerberosKeytab { .. } => "KerberosKeytab",
            Credential::NtlmHash { .. } => "NtlmHash",
            Credential::CredentialCache { .. } => "CredentialCache",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::KerberosCCache { principal, ccache } => f
                .debug_struct("KerberosCCache")
                .field("principal", principal)
                .field("ccache", ccache)
                .finish(),
            Credential::KerberosKeytab { principal, keytab } => f
                .debug_struct("KerberosKeytab")
                .field("principal", principal)
                .field("keytab", keytab)
                .finish(),
            other => f
                .debug_struct(other.kind_name())
                .field("principal", &other.principal())
                .finish_non_exhaustive(),
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.principal() {
            Some(principal) => write!(f, "{}({})", self.kind_name(), principal),
            None => write!(f, "{}", self.kind_name()),
        }
    }
}

/// The `username` argument of a client: nothing, a name, a credential or a list of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CredentialInput {
    #[default]
    None,
    Name(String),
    Credential(Credential),
    List(Vec<Credential>),
}

impl From<&str> for CredentialInput {
    fn from(value: &str) -> Self {
        CredentialInput::Name(value.to_owned())
    }
}

impl From<String> for CredentialInput {
    fn from(value: String) -> Self {
        CredentialInput::Name(value)
    }
}

impl From<Credential> for CredentialInput {
    fn from(value: Credential) -> Self {
        CredentialInput::Credential(value)
    }
}

impl From<Vec<Credential>> for CredentialInput {
    fn from(value: Vec<Credential>) -> Self {
        CredentialInput::List(value)
    }
}

impl<T: Into<CredentialInput>> From<Option<T>> for CredentialInput {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

/// Normalizes the `username`/`password` arguments into an ordered, non-empty credential list.
///
/// * no username: the ambient cache for the default principal
/// * a name without password: the ambient cache for that principal
/// * a name with a password: a [`Credential::Password`]
/// * a credential or list of credentials: passed through unchanged
///
/// A password alongside a credential or list is ambiguous and rejected, as is an empty list.
pub fn unify_credentials(username: CredentialInput, password: Option<String>) -> Result<Vec<Credential>> {
    let credentials = match (username, password) {
        (CredentialInput::None, _) => vec![Credential::CredentialCache { principal: None }],
        (CredentialInput::Name(username), None) => vec![Credential::CredentialCache {
            principal: Some(username),
        }],
        (CredentialInput::Name(username), Some(password)) => vec![Credential::password(username, password)],
        (CredentialInput::Credential(_) | CredentialInput::List(_), Some(_)) => {
            return Err(Error::new(
                ErrorKind::InvalidCredential,
                "A password is only valid with a username, not with a credential or a credential list",
            ))
        }
        (CredentialInput::Credential(credential), None) => vec![credential],
        (CredentialInput::List(credentials), None) => {
            if credentials.is_empty() {
                return Err(Error::new(
                    ErrorKind::InvalidCredential,
                    "An empty credential list was provided, at least one credential is required",
                ));
            }

            credentials
        }
    };

    trace!(credentials = ?credentials, "unified credentials");

    Ok(credentials)
}
