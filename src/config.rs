use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// How forgiving the reader and validator are about spec violations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Reject anything ISO 32000 rejects.
    Strict,
    /// Forgive common writer bugs: trailing garbage, wrong stream lengths,
    /// broken cross-reference sections (rebuilt by a linear scan).
    #[default]
    Relaxed,
    /// Skip validation entirely.
    Disabled,
}

/// Ceilings applied while decoding stream filters, to bound memory on
/// hostile inputs.
#[derive(Clone, Copy, Debug)]
pub struct DecodeLimits {
    /// Absolute ceiling on decoded bytes per stream.
    pub max_bytes: u64,
    /// Ceiling on decoded/encoded expansion ratio.
    pub max_ratio: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        DecodeLimits {
            max_bytes: 512 << 20,
            max_ratio: 100,
        }
    }
}

/// Cooperative cancellation flag shared between a caller and a running
/// load or save. Checked between objects, never mid-token.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Options accepted by the load entry points.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub validation: ValidationMode,
    pub limits: DecodeLimits,
    pub user_password: Option<Vec<u8>>,
    pub owner_password: Option<Vec<u8>>,
    pub cancel: Option<CancelSignal>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict(mut self) -> Self {
        self.validation = ValidationMode::Strict;
        self
    }

    pub fn validation(mut self, mode: ValidationMode) -> Self {
        self.validation = mode;
        self
    }

    pub fn limits(mut self, limits: DecodeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn user_password<P: Into<Vec<u8>>>(mut self, password: P) -> Self {
        self.user_password = Some(password.into());
        self
    }

    pub fn owner_password<P: Into<Vec<u8>>>(mut self, password: P) -> Self {
        self.owner_password = Some(password.into());
        self
    }

    pub fn cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub(crate) fn is_relaxed(&self) -> bool {
        self.validation != ValidationMode::Strict
    }

    pub(crate) fn check_cancelled(&self) -> crate::Result<()> {
        match &self.cancel {
            Some(signal) if signal.is_cancelled() => Err(crate::Error::Cancelled),
            _ => Ok(()),
        }
    }
}

/// Options accepted by the save entry points.
#[derive(Clone, Debug, Default)]
pub struct SaveOptions {
    /// Pack eligible objects into object streams.
    pub object_streams: bool,
    /// Emit a cross-reference stream instead of a classical table.
    pub xref_streams: bool,
    /// Override the header version on output.
    pub version: Option<String>,
    pub cancel: Option<CancelSignal>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_streams(mut self, enable: bool) -> Self {
        self.object_streams = enable;
        self
    }

    pub fn xref_streams(mut self, enable: bool) -> Self {
        self.xref_streams = enable;
        self
    }

    pub fn version<V: Into<String>>(mut self, version: V) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub(crate) fn check_cancelled(&self) -> crate::Result<()> {
        match &self.cancel {
            Some(signal) if signal.is_cancelled() => Err(crate::Error::Cancelled),
            _ => Ok(()),
        }
    }
}
