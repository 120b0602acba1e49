use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::{Error, ErrorKind};

/// Authentication protocol a caller can request.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolName {
    Ntlm,
    Kerberos,
    Negotiate,
    CredSsp,
}

impl ProtocolName {
    pub const ALL: [ProtocolName; 4] = [
        ProtocolName::Ntlm,
        ProtocolName::Kerberos,
        ProtocolName::Negotiate,
        ProtocolName::CredSsp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolName::Ntlm => "ntlm",
            ProtocolName::Kerberos => "kerberos",
            ProtocolName::Negotiate => "negotiate",
            ProtocolName::CredSsp => "credssp",
        }
    }
}

impl fmt::Display for ProtocolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolName {
    type Err = Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ntlm" => Ok(ProtocolName::Ntlm),
            "kerberos" => Ok(ProtocolName::Kerberos),
            "negotiate" => Ok(ProtocolName::Negotiate),
            "credssp" => Ok(ProtocolName::CredSsp),
            _ => Err(Error::new(
                ErrorKind::InvalidProtocol,
                format!(
                    "Invalid protocol specified '{}', must be kerberos, negotiate, ntlm, or credssp",
                    s
                ),
            )),
        }
    }
}

/// Ordered set of protocols a backend advertises.
///
/// Insertion order is preserved and duplicates are ignored. Every filtering method returns a
/// new set, so a set handed out by a probe is never changed behind its owner's back.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ProtocolSet(Vec<ProtocolName>);

impl ProtocolSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn contains(&self, protocol: ProtocolName) -> bool {
        self.0.contains(&protocol)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ProtocolName> + '_ {
        self.0.iter().copied()
    }

    /// Returns a copy of the set with all of `removed` taken out.
    pub fn without(&self, removed: &[ProtocolName]) -> Self {
        Self(self.0.iter().copied().filter(|p| !removed.contains(p)).collect())
    }
}

impl FromIterator<ProtocolName> for ProtocolSet {
    fn from_iter<I: IntoIterator<Item = ProtocolName>>(iter: I) -> Self {
        let mut protocols = Vec::new();
        for protocol in iter {
            if !protocols.contains(&protocol) {
                protocols.push(protocol);
            }
        }

        Self(protocols)
    }
}

impl<const N: usize> From<[ProtocolName; N]> for ProtocolSet {
    fn from(protocols: [ProtocolName; N]) -> Self {
        protocols.into_iter().collect()
    }
}

impl fmt::Display for ProtocolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, protocol) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(protocol.as_str())?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitive() {
        assert_eq!("NTLM".parse::<ProtocolName>().unwrap(), ProtocolName::Ntlm);
        assert_eq!("Kerberos".parse::<ProtocolName>().unwrap(), ProtocolName::Kerberos);
        assert_eq!("negotiate".parse::<ProtocolName>().unwrap(), ProtocolName::Negotiate);
        assert_eq!("CredSSP".parse::<ProtocolName>().unwrap(), ProtocolName::CredSsp);
    }

    #[test]
    fn rejects_unknown_protocol() {
        let err = "bogus".parse::<ProtocolName>().unwrap_err();

        assert_eq!(err.error_type, ErrorKind::InvalidProtocol);
        assert!(err.description.contains("bogus"));
    }

    #[test]
    fn without_keeps_order_and_source() {
        let set = ProtocolSet::from([
            ProtocolName::Kerberos,
            ProtocolName::Negotiate,
            ProtocolName::Ntlm,
        ]);
        let filtered = set.without(&[ProtocolName::Negotiate]);

        assert_eq!(
            filtered.iter().collect::<Vec<_>>(),
            vec![ProtocolName::Kerberos, ProtocolName::Ntlm]
        );
        assert!(set.contains(ProtocolName::Negotiate));
        assert_eq!(filtered.to_string(), "[kerberos, ntlm]");
    }

    #[test]
    fn collect_drops_duplicates() {
        let set: ProtocolSet = [ProtocolName::Ntlm, ProtocolName::Ntlm, ProtocolName::Kerberos]
            .into_iter()
            .collect();

        assert_eq!(set.len(), 2);
    }
}
