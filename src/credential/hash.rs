use std::fmt;
use std::str::FromStr;

pub const NTLM_HASH_SIZE: usize = 16;

/// A 16 byte LM or NT hash.
///
/// Parsed from a 32-character hex string (case-insensitive) or taken from raw bytes.
///
/// # Example
///
/// ```
/// use spnego::NtlmHash;
///
/// let hash = "8ADB9B997580D69E69CAA2BBB68F4697".parse::<NtlmHash>().unwrap();
/// assert_eq!(hash.to_string(), "8adb9b997580d69e69caa2bbb68f4697");
/// ```
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct NtlmHash([u8; NTLM_HASH_SIZE]);

impl NtlmHash {
    pub fn from_bytes(hash: [u8; NTLM_HASH_SIZE]) -> Self {
        Self(hash)
    }

    pub fn as_bytes(&self) -> &[u8; NTLM_HASH_SIZE] {
        &self.0
    }

    /// An all-zero hash is a placeholder meaning "no hash", commonly seen for the LM half.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    /// Splits a `LM:NT` pair. A missing or all-zero LM part yields `None` for the LM hash.
    ///
    /// A string without a colon is taken as the NT hash alone.
    pub fn parse_pair(value: &str) -> Result<(Option<NtlmHash>, NtlmHash), NtlmHashError> {
        let (lm, nt) = match value.split_once(':') {
            Some((lm, nt)) => (lm.trim(), nt.trim()),
            None => ("", value.trim()),
        };

        let lm_hash = if lm.is_empty() {
            None
        } else {
            Some(lm.parse::<NtlmHash>()?).filter(|hash| !hash.is_empty())
        };

        Ok((lm_hash, nt.parse()?))
    }
}

impl From<[u8; NTLM_HASH_SIZE]> for NtlmHash {
    fn from(value: [u8; NTLM_HASH_SIZE]) -> Self {
        NtlmHash(value)
    }
}

impl TryFrom<&[u8]> for NtlmHash {
    type Error = NtlmHashError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let hash: [u8; NTLM_HASH_SIZE] = value.try_into().map_err(|_| NtlmHashError::ByteLength)?;

        Ok(NtlmHash(hash))
    }
}

impl FromStr for NtlmHash {
    type Err = NtlmHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != NTLM_HASH_SIZE * 2 {
            return Err(NtlmHashError::StringLength);
        }

        let mut hash = [0u8; NTLM_HASH_SIZE];
        for (byte, hex) in hash.iter_mut().zip(s.as_bytes().chunks_exact(2)) {
            let hex = std::str::from_utf8(hex).map_err(|_| NtlmHashError::Hex)?;
            *byte = u8::from_str_radix(hex, 16).map_err(|_| NtlmHashError::Hex)?;
        }

        Ok(NtlmHash(hash))
    }
}

impl fmt::Display for NtlmHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

// hashes are password equivalent
impl fmt::Debug for NtlmHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NtlmHash")
    }
}

/// Errors that can occur when parsing an LM or NT hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NtlmHashError {
    /// The hex string is not 32 characters long.
    StringLength,
    /// The raw hash is not 16 bytes long.
    ByteLength,
    /// The string contains non-hex characters.
    Hex,
}

impl std::error::Error for NtlmHashError {}

impl fmt::Display for NtlmHashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NtlmHashError::StringLength => write!(f, "invalid length: expected 32-character hex string for NTLM hash"),
            NtlmHashError::ByteLength => write!(f, "invalid length: expected 16 bytes for NTLM hash"),
            NtlmHashError::Hex => write!(f, "invalid hex string for NTLM hash"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NT_HASH: &str = "8adb9b997580d69e69caa2bbb68f4697";

    #[test]
    fn parse_is_case_insensitive() {
        let lower: NtlmHash = NT_HASH.parse().unwrap();
        let upper: NtlmHash = NT_HASH.to_uppercase().parse().unwrap();

        assert_eq!(lower, upper);
        assert_eq!(lower.to_string(), NT_HASH);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!("8adb9b99".parse::<NtlmHash>(), Err(NtlmHashError::StringLength));
        assert_eq!(
            "8adb9b997580d69e69caa2bbb68f46zz".parse::<NtlmHash>(),
            Err(NtlmHashError::Hex)
        );
        // multi-byte characters must not panic on slicing
        assert_eq!(
            "ééééééééééééééé".parse::<NtlmHash>().map(|_| ()),
            Err(NtlmHashError::StringLength)
        );
        assert_eq!(NtlmHash::try_from([1u8, 2, 3].as_slice()), Err(NtlmHashError::ByteLength));
    }

    #[test]
    fn parse_pair_drops_empty_lm_hash() {
        let (lm, nt) = NtlmHash::parse_pair(&format!("00000000000000000000000000000000:{}", NT_HASH)).unwrap();
        assert!(lm.is_none());
        assert_eq!(nt.to_string(), NT_HASH);

        let (lm, _) = NtlmHash::parse_pair(&format!("aad3b435b51404eeaad3b435b51404ee:{}", NT_HASH)).unwrap();
        assert_eq!(lm.unwrap().to_string(), "aad3b435b51404eeaad3b435b51404ee");

        let (lm, nt) = NtlmHash::parse_pair(NT_HASH).unwrap();
        assert!(lm.is_none());
        assert_eq!(nt.to_string(), NT_HASH);
    }

    #[test]
    fn debug_does_not_leak() {
        let hash: NtlmHash = NT_HASH.parse().unwrap();

        assert_eq!(format!("{:?}", hash), "NtlmHash");
    }
}
