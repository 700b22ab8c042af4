//! Set of service names offered by this process.

use std::collections::BTreeSet;

use tracing::debug;

use crate::common::SECURE_PREFIX;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Order-insensitive set of locally offered service names.
///
/// Names are stored without the `sec:` routing prefix; whether a name is also
/// advertised on the secure stack is decided at announce time.
pub struct ServiceSet {
    names: BTreeSet<String>,
}

impl ServiceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole set.
    pub fn set<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names = names.into_iter().map(strip).collect();
    }

    /// Union with `names`.
    pub fn add<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(strip));
    }

    /// Difference with `names`. Absent names are ignored.
    pub fn remove<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names.into_iter().map(strip) {
            self.names.remove(&name);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Immutable copy of the current names, in a stable order.
    pub fn snapshot(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }
}

fn strip<S: Into<String>>(name: S) -> String {
    let name = name.into();

    match name.strip_prefix(SECURE_PREFIX) {
        Some(stripped) => {
            debug!(?name, "Dropping routing prefix from offered service name");
            stripped.to_string()
        }
        None => name,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn set_is_idempotent() {
        let mut services = ServiceSet::new();

        services.set(["a", "b"]);
        let first = services.snapshot();
        services.set(["a", "b"]);

        assert_eq!(services.snapshot(), first);
        assert_eq!(first, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn set_replaces() {
        let mut services = ServiceSet::new();

        services.set(["a", "b"]);
        services.set(["c"]);

        assert_eq!(services.snapshot(), vec!["c".to_string()]);
    }

    #[test]
    fn add_is_union() {
        let mut services = ServiceSet::new();

        services.add(["x"]);
        services.add(["x"]);
        services.add(["y", "x"]);

        assert_eq!(services.snapshot(), vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn remove_absent_is_noop() {
        let mut services = ServiceSet::new();
        services.set(["a"]);

        services.remove(["z"]);
        assert_eq!(services.snapshot(), vec!["a".to_string()]);

        services.remove(["a"]);
        assert!(services.is_empty());
    }

    #[test]
    fn routing_prefix_is_not_stored() {
        let mut services = ServiceSet::new();

        services.add(["sec:a", "a"]);

        assert_eq!(services.snapshot(), vec!["a".to_string()]);
    }
}
