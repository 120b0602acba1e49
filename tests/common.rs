#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use spnego::{
    AuthFactory, BackendConstructor, BackendKind, BackendRegistry, BufferType, CapabilityProbe, ChannelBindings,
    ContextArgs, Credential, Error, ErrorKind, IovBuffer, IovData, IovUnwrapResult, Mechanism, MechanismStep,
    NegotiateOptions, PeerBindings, ProtocolName, ProtocolSet, StaticProbe, ToggleProbe, UnwrapResult, Usage,
};
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

lazy_static! {
    pub static ref CREDENTIALS: Credential = Credential::password("Username@DOMAIN.COM", "Password");
    pub static ref CHANNEL_BINDINGS: ChannelBindings =
        ChannelBindings::from_application_data(b"tls-server-end-point:0123456789abcdef".to_vec());
    pub static ref MESSAGE_TO_SERVER: Vec<u8> = b"Hello, server!".to_vec();
}

pub const SESSION_KEY: [u8; 16] = [0x11; 16];

const NEGOTIATE: &[u8] = b"NEGOTIATE";
const CHALLENGE: &[u8] = b"CHALLENGE";
const AUTHENTICATE: &[u8] = b"AUTHENTICATE";
const XOR_KEY: u8 = 0x5A;
const HEADER: &[u8] = b"HDR";

/// A three leg exchange (negotiate, challenge, authenticate) between two in-process peers.
///
/// The authenticate message carries the MD5 digest of the client's channel bindings, which the
/// acceptor reports back as the peer bindings.
#[derive(Debug)]
pub struct LoopbackMechanism {
    usage: Usage,
    protocol: ProtocolName,
    round: u8,
    channel_bindings: Option<ChannelBindings>,
    principal: Option<String>,
    closed: Arc<AtomicUsize>,
}

impl LoopbackMechanism {
    pub fn new(args: &ContextArgs, closed: Arc<AtomicUsize>) -> Self {
        Self {
            usage: args.usage,
            protocol: args.protocol,
            round: 0,
            channel_bindings: args.channel_bindings.clone(),
            principal: args
                .credentials
                .first()
                .and_then(|credential| credential.principal())
                .map(str::to_owned),
            closed,
        }
    }

    fn initiate(&mut self, input: Option<&[u8]>) -> spnego::Result<MechanismStep> {
        match (self.round, input) {
            (0, None) => Ok(MechanismStep::continue_with(NEGOTIATE.to_vec())),
            (1, Some(CHALLENGE)) => {
                let digest = self
                    .channel_bindings
                    .as_ref()
                    .map(ChannelBindings::digest)
                    .unwrap_or_default();
                let principal = self.principal.clone().unwrap_or_default();

                Ok(MechanismStep::complete(Some(
                    [AUTHENTICATE, digest.as_slice(), principal.as_bytes()].concat(),
                )))
            }
            _ => Err(Error::new(ErrorKind::InvalidToken, "unexpected token for the initiator")),
        }
    }

    fn accept(&mut self, input: Option<&[u8]>) -> spnego::Result<MechanismStep> {
        match (self.round, input) {
            (0, Some(NEGOTIATE)) => Ok(MechanismStep::continue_with(CHALLENGE.to_vec())),
            (1, Some(token)) if token.starts_with(AUTHENTICATE) && token.len() >= AUTHENTICATE.len() + 16 => {
                let rest = &token[AUTHENTICATE.len()..];
                let mut digest = [0u8; 16];
                digest.copy_from_slice(&rest[..16]);

                let principal = String::from_utf8_lossy(&rest[16..]).into_owned();
                self.principal = Some(principal).filter(|principal| !principal.is_empty());

                let step = MechanismStep::complete(None);
                Ok(if digest == [0u8; 16] {
                    step
                } else {
                    step.with_peer_bindings(PeerBindings::Digest(digest))
                })
            }
            _ => Err(Error::new(ErrorKind::InvalidToken, "unexpected token for the acceptor")),
        }
    }
}

fn xor(data: &[u8]) -> Vec<u8> {
    data.iter().map(|byte| byte ^ XOR_KEY).collect()
}

fn checksum(data: &[u8]) -> Vec<u8> {
    let sum = data.iter().fold(0u32, |sum, byte| sum.rotate_left(5) ^ u32::from(*byte));

    sum.to_be_bytes().to_vec()
}

impl Mechanism for LoopbackMechanism {
    fn step(&mut self, input: Option<&[u8]>) -> spnego::Result<MechanismStep> {
        let step = match self.usage {
            Usage::Initiate => self.initiate(input)?,
            Usage::Accept => self.accept(input)?,
        };
        self.round += 1;

        Ok(step)
    }

    fn wrap(&mut self, data: &[u8], encrypt: bool) -> spnego::Result<Vec<u8>> {
        let body = if encrypt { xor(data) } else { data.to_vec() };

        Ok([[u8::from(encrypt)].as_slice(), body.as_slice()].concat())
    }

    fn unwrap(&mut self, data: &[u8]) -> spnego::Result<UnwrapResult> {
        match data.split_first() {
            Some((1, body)) => Ok(UnwrapResult {
                data: xor(body),
                encrypted: true,
                qop: 0,
            }),
            Some((0, body)) => Ok(UnwrapResult {
                data: body.to_vec(),
                encrypted: false,
                qop: 0,
            }),
            _ => Err(Error::new(ErrorKind::MessageAltered, "invalid wrapped message")),
        }
    }

    fn sign(&mut self, data: &[u8]) -> spnego::Result<Vec<u8>> {
        Ok(checksum(data))
    }

    fn verify(&mut self, data: &[u8], signature: &[u8]) -> spnego::Result<()> {
        if checksum(data) == signature {
            Ok(())
        } else {
            Err(Error::new(ErrorKind::MessageAltered, "signature does not match"))
        }
    }

    fn wrap_iov(&mut self, buffers: Vec<IovBuffer>, encrypt: bool) -> spnego::Result<Vec<IovBuffer>> {
        Ok(buffers
            .into_iter()
            .map(|buffer| {
                let data = match (buffer.buffer_type, buffer.data) {
                    (BufferType::Data, IovData::Bytes(data)) if encrypt => IovData::Bytes(xor(&data)),
                    (BufferType::Header, IovData::AutoAllocate(true)) => {
                        IovData::Bytes([HEADER, [u8::from(encrypt)].as_slice()].concat())
                    }
                    (_, data) => data,
                };

                IovBuffer::new(buffer.buffer_type, data)
            })
            .collect())
    }

    fn unwrap_iov(&mut self, buffers: Vec<IovBuffer>) -> spnego::Result<IovUnwrapResult> {
        let encrypted = buffers
            .iter()
            .find(|buffer| buffer.buffer_type == BufferType::Header)
            .and_then(IovBuffer::as_bytes)
            .map(|header| header.ends_with(&[1]))
            .ok_or_else(|| Error::new(ErrorKind::InvalidToken, "missing IOV header"))?;

        let buffers = buffers
            .into_iter()
            .map(|buffer| {
                let data = match (buffer.buffer_type, buffer.data) {
                    (BufferType::Data, IovData::Bytes(data)) if encrypted => IovData::Bytes(xor(&data)),
                    (_, data) => data,
                };

                IovBuffer::new(buffer.buffer_type, data)
            })
            .collect();

        Ok(IovUnwrapResult {
            buffers,
            encrypted,
            qop: 0,
        })
    }

    fn negotiated_protocol(&self) -> ProtocolName {
        match self.protocol {
            ProtocolName::Negotiate => ProtocolName::Kerberos,
            protocol => protocol,
        }
    }

    fn session_key(&self) -> Option<Vec<u8>> {
        tracing::trace!(target: "spnego::loopback", usage = ?self.usage, "exporting session key");

        Some(SESSION_KEY.to_vec())
    }

    fn client_principal(&self) -> Option<String> {
        match self.usage {
            Usage::Accept => self.principal.clone(),
            Usage::Initiate => None,
        }
    }

    fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Every construction made by a harness, in order.
pub type ConstructionLog = Arc<Mutex<Vec<(BackendKind, ContextArgs)>>>;

pub fn loopback_constructor(
    kind: BackendKind,
    log: ConstructionLog,
    closed: Arc<AtomicUsize>,
) -> impl BackendConstructor {
    move |args: ContextArgs| -> spnego::Result<Box<dyn Mechanism>> {
        let mechanism = LoopbackMechanism::new(&args, Arc::clone(&closed));
        log.lock().unwrap().push((kind, args));

        Ok(Box::new(mechanism))
    }
}

/// Counts how often the factory asks for capability.
#[derive(Debug)]
pub struct CountingProbe<P> {
    inner: P,
    calls: Arc<AtomicUsize>,
}

impl<P: CapabilityProbe> CountingProbe<P> {
    pub fn new(inner: P, calls: Arc<AtomicUsize>) -> Self {
        Self { inner, calls }
    }
}

impl<P: CapabilityProbe> CapabilityProbe for CountingProbe<P> {
    fn available_protocols(&self, options: NegotiateOptions) -> ProtocolSet {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.available_protocols(options)
    }
}

/// A factory with every backend registered over loopback mechanisms.
pub struct Harness {
    pub factory: AuthFactory,
    pub log: ConstructionLog,
    pub closed: Arc<AtomicUsize>,
    pub probe_calls: Arc<AtomicUsize>,
    /// Turns native backend B (GSSAPI) on and off.
    pub gssapi_switch: Arc<AtomicBool>,
}

impl Harness {
    pub fn new(sspi: &[ProtocolName], gssapi: &[ProtocolName]) -> Self {
        Self::with_dispatch(sspi, gssapi, None)
    }

    pub fn with_dispatch(sspi: &[ProtocolName], gssapi: &[ProtocolName], dispatch: Option<Dispatch>) -> Self {
        let log = ConstructionLog::default();
        let closed = Arc::new(AtomicUsize::new(0));
        let probe_calls = Arc::new(AtomicUsize::new(0));

        let sspi_probe = StaticProbe::new(sspi.iter().copied().collect::<ProtocolSet>());
        let gssapi_probe = ToggleProbe::new(StaticProbe::new(gssapi.iter().copied().collect::<ProtocolSet>()));
        let gssapi_switch = gssapi_probe.switch();

        let constructor = |kind| loopback_constructor(kind, Arc::clone(&log), Arc::clone(&closed));

        let registry = BackendRegistry::new()
            .with_sspi(
                CountingProbe::new(sspi_probe, Arc::clone(&probe_calls)),
                constructor(BackendKind::Sspi),
            )
            .with_gssapi(
                CountingProbe::new(gssapi_probe, Arc::clone(&probe_calls)),
                constructor(BackendKind::Gssapi),
            )
            .with_negotiate(constructor(BackendKind::Negotiate))
            .with_ntlm(constructor(BackendKind::Ntlm))
            .with_credssp(constructor(BackendKind::CredSsp));

        let factory = match dispatch {
            Some(dispatch) => AuthFactory::with_dispatch(registry, dispatch),
            None => AuthFactory::new(registry),
        };

        Self {
            factory,
            log,
            closed,
            probe_calls,
            gssapi_switch,
        }
    }

    pub fn constructions(&self) -> Vec<(BackendKind, ContextArgs)> {
        self.log.lock().unwrap().clone()
    }

    pub fn last_construction(&self) -> (BackendKind, ContextArgs) {
        self.constructions().pop().expect("nothing was constructed")
    }
}

/// Collects formatted log output in memory.
#[derive(Debug, Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn capture_dispatch() -> (Dispatch, LogCapture) {
    let capture = LogCapture::default();
    let writer = capture.clone();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("spnego=trace"))
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    (Dispatch::new(subscriber), capture)
}
