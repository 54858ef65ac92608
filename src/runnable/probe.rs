//! The capability set implemented by every probe.

use crate::combinator::Callback;
use crate::error::Error;
use crate::observability::Logger;
use crate::reactor::Reactor;
use crate::types::{Entry, Settings};

/// Static description of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDescriptor {
    /// Name written into entries as `test_name`.
    pub name: String,
    /// Version written into entries as `test_version`.
    pub version: String,
    /// True when the probe cannot run without caller-supplied input.
    pub needs_input: bool,
}

impl ProbeDescriptor {
    /// Creates a descriptor.
    pub fn new(name: impl Into<String>, version: impl Into<String>, needs_input: bool) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            needs_input,
        }
    }
}

/// Handles available to a probe body.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    /// Loop on which all I/O of the probe must complete.
    pub reactor: Reactor,
    /// Logger of the owning runnable.
    pub logger: Logger,
}

/// A measurement probe.
///
/// `main` measures one input and must invoke `cb` exactly once, on the
/// loop thread of `ctx.reactor`. A failed measurement is still an entry:
/// the probe records the failure in it instead of dropping the callback.
pub trait Probe: Send + Sync {
    /// Name, version and input requirement.
    fn descriptor(&self) -> ProbeDescriptor;

    /// Setting keys that must be present for `begin` to succeed.
    fn mandatory_settings(&self) -> &'static [&'static str] {
        &[]
    }

    /// Probe-specific setting checks run by `begin`.
    fn validate(&self, _settings: &Settings) -> Result<(), Error> {
        Ok(())
    }

    /// Measures `input`.
    fn main(&self, ctx: ProbeContext, input: String, settings: Settings, cb: Callback<Entry>);
}
