//! Per-attempt invocation context.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A declarative marker attached to the code an invocation runs, e.g.
/// "this needs a transaction". Collaborators inspect markers through the
/// context handed to every hook.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Marker(Cow<'static, str>);

impl Marker {
    pub const TRANSACTIONAL: Marker = Marker(Cow::Borrowed("transactional"));
    pub const NO_TRANSACTION: Marker = Marker(Cow::Borrowed("no-transaction"));

    pub const fn new_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What kind of invocation is running and which markers apply to it.
///
/// Built after `init` succeeds and passed by reference to every later hook of
/// the same attempt; dropped when the attempt ends, so nothing leaks into the
/// next invocation scheduled on the same worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationContext {
    invocation_type: String,
    markers: Vec<Marker>,
}

impl InvocationContext {
    pub fn new(invocation_type: impl Into<String>) -> Self {
        Self {
            invocation_type: invocation_type.into(),
            markers: Vec::new(),
        }
    }

    pub fn with_markers(mut self, markers: impl IntoIterator<Item = Marker>) -> Self {
        self.markers.extend(markers);
        self
    }

    /// Lets a plugin tell e.g. a background job apart from a request.
    pub fn invocation_type(&self) -> &str {
        &self.invocation_type
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn has_marker(&self, marker: &Marker) -> bool {
        self.markers.contains(marker)
    }
}

impl fmt::Display for InvocationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvocationType: {}. markers: ", self.invocation_type)?;
        for marker in &self.markers {
            write!(f, "{marker},")?;
        }
        Ok(())
    }
}
