use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{NegotiateOptions, ProtocolSet};

/// Reports which protocols a native backend can negotiate on this host right now.
///
/// The factory calls it on every selection, never caching the answer: availability depends on
/// the options of the call and on host state that may change between calls.
pub trait CapabilityProbe: Debug + Send + Sync {
    fn available_protocols(&self, options: NegotiateOptions) -> ProtocolSet;
}

impl<T: CapabilityProbe + ?Sized> CapabilityProbe for Box<T> {
    fn available_protocols(&self, options: NegotiateOptions) -> ProtocolSet {
        (**self).available_protocols(options)
    }
}

impl<T: CapabilityProbe + ?Sized> CapabilityProbe for Arc<T> {
    fn available_protocols(&self, options: NegotiateOptions) -> ProtocolSet {
        (**self).available_protocols(options)
    }
}

// a backend that is not present at all
impl CapabilityProbe for () {
    fn available_protocols(&self, _options: NegotiateOptions) -> ProtocolSet {
        ProtocolSet::new()
    }
}

/// A backend with a fixed set of protocols and a fixed set of supported feature hints.
///
/// If the caller asks for a feature hint ([`NegotiateOptions::feature_hints`]) the backend does
/// not support, it can serve nothing under those options and reports an empty set.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    protocols: ProtocolSet,
    supported_features: NegotiateOptions,
}

impl StaticProbe {
    pub fn new(protocols: impl Into<ProtocolSet>) -> Self {
        Self {
            protocols: protocols.into(),
            supported_features: NegotiateOptions::all().feature_hints(),
        }
    }

    /// A backend that is not present on this host.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn with_supported_features(mut self, features: NegotiateOptions) -> Self {
        self.supported_features = features.feature_hints();
        self
    }
}

impl CapabilityProbe for StaticProbe {
    fn available_protocols(&self, options: NegotiateOptions) -> ProtocolSet {
        let missing = options.feature_hints().difference(self.supported_features);

        if !missing.is_empty() {
            debug!(?missing, "backend cannot honour the requested options");
            return ProtocolSet::new();
        }

        self.protocols.clone()
    }
}

/// Wraps a probe with an on/off switch shared with the code that owns the host state.
#[derive(Debug, Clone)]
pub struct ToggleProbe<P> {
    inner: P,
    enabled: Arc<AtomicBool>,
}

impl<P: CapabilityProbe> ToggleProbe<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            enabled: Arc::new(AtomicBool::new(true)),
        }
    }

    /// The switch; storing `false` makes the probe report no protocols.
    pub fn switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }
}

impl<P: CapabilityProbe> CapabilityProbe for ToggleProbe<P> {
    fn available_protocols(&self, options: NegotiateOptions) -> ProtocolSet {
        if self.enabled.load(Ordering::SeqCst) {
            self.inner.available_protocols(options)
        } else {
            ProtocolSet::new()
        }
    }
}
