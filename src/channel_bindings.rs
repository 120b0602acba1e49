use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use md5::{Digest, Md5};

use crate::{Error, ErrorKind, Result};

// two (type, len, offset) address groups and the (len, offset) of the application data
const SEC_CHANNEL_BINDINGS_SIZE: usize = 32;

pub const CHANNEL_BINDINGS_DIGEST_SIZE: usize = 16;

/// Transport properties the authentication exchange is tied to.
///
/// The caller supplies it opaquely; the factory forwards it unchanged to the chosen backend and
/// compares it against whatever the peer asserts while the context is negotiated.
///
/// # MSDN
///
/// * [SEC_CHANNEL_BINDINGS](https://docs.microsoft.com/en-us/windows/win32/api/sspi/ns-sspi-sec_channel_bindings)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelBindings {
    pub initiator_addr_type: u32,
    pub initiator: Vec<u8>,
    pub acceptor_addr_type: u32,
    pub acceptor: Vec<u8>,
    pub application_data: Vec<u8>,
}

impl ChannelBindings {
    /// Bindings carrying only application data, e.g. a `tls-server-end-point` token.
    pub fn from_application_data(application_data: impl Into<Vec<u8>>) -> Self {
        Self {
            application_data: application_data.into(),
            ..Default::default()
        }
    }

    /// Parses a `SEC_CHANNEL_BINDINGS` buffer (header followed by the referenced data).
    pub fn from_bytes<T: AsRef<[u8]>>(data: T) -> Result<Self> {
        let data = data.as_ref();

        if data.len() < SEC_CHANNEL_BINDINGS_SIZE {
            return Err(Error::new(
                ErrorKind::InvalidToken,
                format!(
                    "Invalid SEC_CHANNEL_BINDINGS buffer: buffer is too short: {}. Minimum len: {}",
                    data.len(),
                    SEC_CHANNEL_BINDINGS_SIZE,
                ),
            ));
        }

        let mut header = Cursor::new(&data[..SEC_CHANNEL_BINDINGS_SIZE]);

        let initiator_addr_type = header.read_u32::<LittleEndian>()?;
        let initiator = read_field(&mut header, data, "initiator")?;
        let acceptor_addr_type = header.read_u32::<LittleEndian>()?;
        let acceptor = read_field(&mut header, data, "acceptor")?;
        let application_data = read_field(&mut header, data, "application")?;

        Ok(Self {
            initiator_addr_type,
            initiator,
            acceptor_addr_type,
            acceptor,
            application_data,
        })
    }

    /// Encodes the bindings as a `SEC_CHANNEL_BINDINGS` buffer, data laid out after the header.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let total_len =
            SEC_CHANNEL_BINDINGS_SIZE + self.initiator.len() + self.acceptor.len() + self.application_data.len();
        let mut buffer = Vec::with_capacity(total_len);

        let mut offset = SEC_CHANNEL_BINDINGS_SIZE;
        let mut next_offset = |len: usize| {
            let current = if len > 0 { offset } else { 0 };
            offset += len;
            current
        };
        let initiator_offset = next_offset(self.initiator.len());
        let acceptor_offset = next_offset(self.acceptor.len());
        let application_offset = next_offset(self.application_data.len());

        buffer.write_u32::<LittleEndian>(self.initiator_addr_type)?;
        write_field_header(&mut buffer, &self.initiator, initiator_offset)?;
        buffer.write_u32::<LittleEndian>(self.acceptor_addr_type)?;
        write_field_header(&mut buffer, &self.acceptor, acceptor_offset)?;
        write_field_header(&mut buffer, &self.application_data, application_offset)?;

        buffer.write_all(&self.initiator)?;
        buffer.write_all(&self.acceptor)?;
        buffer.write_all(&self.application_data)?;

        Ok(buffer)
    }

    /// MD5 of the `gss_channel_bindings_struct` encoding, as carried by NTLM's `MsvAvChannelBindings`.
    pub fn digest(&self) -> [u8; CHANNEL_BINDINGS_DIGEST_SIZE] {
        let mut hasher = Md5::new();

        for (addr_type, address) in [
            (self.initiator_addr_type, &self.initiator),
            (self.acceptor_addr_type, &self.acceptor),
        ] {
            hasher.update(addr_type.to_le_bytes());
            hasher.update((address.len() as u32).to_le_bytes());
            hasher.update(address);
        }
        hasher.update((self.application_data.len() as u32).to_le_bytes());
        hasher.update(&self.application_data);

        hasher.finalize().into()
    }
}

/// Channel bindings the peer asserted during negotiation, as reported by a mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerBindings {
    /// The full binding structure (e.g. Kerberos authenticator checksum, GSS acceptor view).
    Structure(ChannelBindings),
    /// Only the MD5 digest (NTLM `MsvAvChannelBindings`).
    Digest([u8; CHANNEL_BINDINGS_DIGEST_SIZE]),
}

impl PeerBindings {
    pub fn matches(&self, local: &ChannelBindings) -> bool {
        match self {
            PeerBindings::Structure(bindings) => bindings == local,
            PeerBindings::Digest(digest) => *digest == local.digest(),
        }
    }
}

fn read_field(header: &mut Cursor<&[u8]>, data: &[u8], name: &str) -> Result<Vec<u8>> {
    let len = header.read_u32::<LittleEndian>()? as usize;
    let offset = header.read_u32::<LittleEndian>()? as usize;

    if len == 0 {
        return Ok(Vec::new());
    }

    let end = offset.checked_add(len).filter(|end| *end <= data.len()).ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidToken,
            format!(
                "Invalid SEC_CHANNEL_BINDINGS buffer: {} offset ({}) + len ({}) goes outside the buffer ({})",
                name,
                offset,
                len,
                data.len()
            ),
        )
    })?;

    Ok(data[offset..end].to_vec())
}

fn write_field_header(buffer: &mut Vec<u8>, field: &[u8], offset: usize) -> Result<()> {
    buffer.write_u32::<LittleEndian>(field.len() as u32)?;
    buffer.write_u32::<LittleEndian>(offset as u32)?;

    Ok(())
}
