use num_derive::{FromPrimitive, ToPrimitive};

use crate::{Error, ErrorKind, Result};

/// The type of an IOV buffer, with the values shared by the SSPI and GSSAPI buffer constants.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, FromPrimitive, ToPrimitive)]
pub enum BufferType {
    Empty = 0,
    Data = 1,
    Header = 2,
    PkgParams = 3,
    Trailer = 7,
    Padding = 9,
    Stream = 10,
    SignOnly = 11,
    MicToken = 12,
}

/// The content of an IOV buffer.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum IovData {
    /// The buffer bytes.
    Bytes(Vec<u8>),
    /// A buffer of this many zero bytes is allocated before the call.
    Length(usize),
    /// `true` lets the backend allocate the buffer; `false` leaves it unset.
    AutoAllocate(bool),
}

impl IovData {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            IovData::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// A single buffer passed to, and returned from, `wrap_iov`/`unwrap_iov`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IovBuffer {
    pub buffer_type: BufferType,
    pub data: IovData,
}

impl IovBuffer {
    pub fn new(buffer_type: BufferType, data: IovData) -> Self {
        Self { buffer_type, data }
    }

    pub fn data(data: impl Into<Vec<u8>>) -> Self {
        Self::new(BufferType::Data, IovData::Bytes(data.into()))
    }

    /// A buffer of the given type the backend allocates for the caller.
    pub fn auto_allocated(buffer_type: BufferType) -> Self {
        Self::new(buffer_type, IovData::AutoAllocate(true))
    }

    /// Resolves `Length` into a zeroed buffer, leaving other forms as they are.
    pub fn allocate(self) -> Self {
        match self.data {
            IovData::Length(length) => Self::new(self.buffer_type, IovData::Bytes(vec![0; length])),
            _ => self,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.data.as_bytes()
    }
}

/// Checks an IOV buffer list before it reaches a backend.
///
/// The list needs at least one data buffer, and at most one header.
pub fn validate_buffers(buffers: &[IovBuffer]) -> Result<()> {
    if !buffers.iter().any(|buffer| buffer.buffer_type == BufferType::Data) {
        return Err(Error::new(
            ErrorKind::InvalidToken,
            "IOV buffer list must contain at least one data buffer",
        ));
    }

    if buffers
        .iter()
        .filter(|buffer| buffer.buffer_type == BufferType::Header)
        .count()
        > 1
    {
        return Err(Error::new(ErrorKind::InvalidToken, "IOV buffer list contains multiple header buffers"));
    }

    Ok(())
}

/// The result of `unwrap_iov`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IovUnwrapResult {
    pub buffers: Vec<IovBuffer>,
    /// Whether the data was encrypted rather than only signed.
    pub encrypted: bool,
    /// Quality of protection applied by the peer.
    pub qop: u32,
}
