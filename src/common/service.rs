//! Service names and the transport stack they are routed over.
use std::fmt::{self, Display, Formatter};

/// Wire prefix designating a service reached over the secure stack.
pub const SECURE_PREFIX: &str = "sec:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
/// Which transport pair a call or an announcement goes through.
pub enum Stack {
    /// Plain request/response channels.
    Plain,
    /// Mutually authenticated channels.
    Secure,
}

impl Stack {
    /// Name on the wire of `name` for this stack.
    pub fn wire_name(&self, name: &str) -> String {
        match self {
            Stack::Plain => name.to_string(),
            Stack::Secure => format!("{SECURE_PREFIX}{name}"),
        }
    }
}

impl Display for Stack {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Stack::Plain => write!(f, "plain"),
            Stack::Secure => write!(f, "secure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// A service to call, along with the stack to reach it through.
///
/// Converting from a string parses the `sec:` wire prefix, so `"sec:foo"` and
/// `ServiceRef::secure("foo")` are the same target.
pub struct ServiceRef {
    name: String,
    stack: Stack,
}

impl ServiceRef {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack: Stack::Plain,
        }
    }

    pub fn secure(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack: Stack::Secure,
        }
    }

    /// Service name without any stack prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stack(&self) -> Stack {
        self.stack
    }

    /// Name as announced to, and looked up in, the directory.
    pub fn wire_name(&self) -> String {
        self.stack.wire_name(&self.name)
    }
}

impl From<&str> for ServiceRef {
    fn from(value: &str) -> Self {
        match value.strip_prefix(SECURE_PREFIX) {
            Some(name) => ServiceRef::secure(name),
            None => ServiceRef::plain(value),
        }
    }
}

impl From<String> for ServiceRef {
    fn from(value: String) -> Self {
        ServiceRef::from(value.as_str())
    }
}

impl From<&String> for ServiceRef {
    fn from(value: &String) -> Self {
        ServiceRef::from(value.as_str())
    }
}

impl Display for ServiceRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_prefix() {
        let secure = ServiceRef::from("sec:rest:util:net");
        assert_eq!(secure.stack(), Stack::Secure);
        assert_eq!(secure.name(), "rest:util:net");
        assert_eq!(secure.wire_name(), "sec:rest:util:net");

        let plain = ServiceRef::from("rest:util:net");
        assert_eq!(plain.stack(), Stack::Plain);
        assert_eq!(plain.wire_name(), "rest:util:net");
    }

    #[test]
    fn prefix_only_at_the_start() {
        let service = ServiceRef::from("rest:sec:net");
        assert_eq!(service.stack(), Stack::Plain);
    }

    #[test]
    fn explicit_secure_equals_parsed() {
        assert_eq!(ServiceRef::secure("foo"), ServiceRef::from("sec:foo"));
        assert_eq!(ServiceRef::secure("foo").to_string(), "sec:foo");
    }
}
