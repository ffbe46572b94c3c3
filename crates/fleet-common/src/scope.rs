//! Namespace scope the operator lists and watches in

use std::fmt;

/// Which namespaces ClientConfigs are read from, and which namespaces remote
/// clusters are scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum WatchScope {
    /// Every namespace
    #[default]
    All,
    /// A fixed, non-empty set of namespaces
    Namespaces(Vec<String>),
}

impl WatchScope {
    /// Parse a comma-separated namespace list (the `WATCH_NAMESPACE` format)
    ///
    /// Whitespace around entries is ignored, as are empty entries and
    /// duplicates. An empty or blank list means all namespaces.
    pub fn from_watch_namespace(value: &str) -> Self {
        let mut namespaces: Vec<String> = Vec::new();
        for ns in value.split(',').map(str::trim).filter(|ns| !ns.is_empty()) {
            if !namespaces.iter().any(|existing| existing == ns) {
                namespaces.push(ns.to_string());
            }
        }
        if namespaces.is_empty() {
            WatchScope::All
        } else {
            WatchScope::Namespaces(namespaces)
        }
    }

    /// Namespaces in scope, or an empty slice for all namespaces
    pub fn namespaces(&self) -> &[String] {
        match self {
            WatchScope::All => &[],
            WatchScope::Namespaces(ns) => ns,
        }
    }

    /// True when the scope covers every namespace
    pub fn is_all(&self) -> bool {
        matches!(self, WatchScope::All)
    }

    /// True when `namespace` is inside the scope
    pub fn contains(&self, namespace: &str) -> bool {
        match self {
            WatchScope::All => true,
            WatchScope::Namespaces(ns) => ns.iter().any(|n| n == namespace),
        }
    }
}

impl fmt::Display for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchScope::All => write!(f, "<all namespaces>"),
            WatchScope::Namespaces(ns) => write!(f, "{}", ns.join(",")),
        }
    }
}
