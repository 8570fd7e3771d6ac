use std::str::FromStr;
use std::sync::{Arc, RwLock};

use hyper::Method;

use crate::config::RouteDefinition;
use crate::error::ConfigError;

/// Host pattern supporting a single `*` wildcard ("auth.*", "*.internal", "*")
#[derive(Debug, Clone)]
pub struct HostPattern {
    pattern: String,
}

impl HostPattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        if pattern.is_empty() {
            return Err(ConfigError::ValidationError(
                "host pattern must not be empty".to_string(),
            ));
        }

        if pattern.matches('*').count() > 1 {
            return Err(ConfigError::ValidationError(format!(
                "host pattern '{}' may contain at most one '*'",
                pattern
            )));
        }

        Ok(Self {
            pattern: pattern.to_ascii_lowercase(),
        })
    }

    /// Check whether a concrete host matches this pattern
    pub fn matches(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();

        match self.pattern.split_once('*') {
            None => self.pattern == host,
            Some((prefix, suffix)) => {
                host.len() >= prefix.len() + suffix.len()
                    && host.starts_with(prefix)
                    && host.ends_with(suffix)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// A compiled routing rule
#[derive(Debug, Clone)]
pub struct RouteRule {
    /// Host pattern this rule applies to
    pub host: HostPattern,

    /// Path prefix matched on segment boundaries
    pub path_prefix: String,

    /// Methods accepted by this rule (empty means any)
    pub methods: Vec<Method>,

    /// Target name this rule forwards to
    pub target: String,

    /// Rule priority; lower numbers are evaluated first
    pub priority: u32,

    /// Whether a valid credential is required
    pub credential_required: bool,

    /// Forward the caller credential instead of stripping it
    pub forward_credential: bool,

    /// Optional allow-list of extra headers forwarded downstream
    pub allow_headers: Option<Vec<String>>,

    /// Per-request timeout in seconds
    pub timeout_seconds: u64,
}

impl RouteRule {
    fn from_definition(def: &RouteDefinition) -> Result<Self, ConfigError> {
        let methods = def
            .methods
            .iter()
            .map(|m| {
                Method::from_str(&m.to_ascii_uppercase()).map_err(|_| {
                    ConfigError::ValidationError(format!("invalid HTTP method: {}", m))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            host: HostPattern::new(&def.host)?,
            path_prefix: def.path_prefix.clone(),
            methods,
            target: def.target.clone(),
            priority: def.priority,
            credential_required: def.credential_required,
            forward_credential: def.forward_credential,
            allow_headers: def.allow_headers.clone(),
            timeout_seconds: def.timeout_seconds,
        })
    }

    /// Check whether this rule matches the given request coordinates
    fn matches(&self, host: &str, path: &str, method: &Method) -> bool {
        if !self.host.matches(host) {
            return false;
        }

        if !path_prefix_matches(&self.path_prefix, path) {
            return false;
        }

        self.methods.is_empty() || self.methods.contains(method)
    }
}

/// Prefix match on path segment boundaries: "/api" matches "/api" and
/// "/api/v1" but not "/apiv1".
fn path_prefix_matches(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }

    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Immutable, load-time-validated route table.
///
/// Request handlers only ever see a complete table; reloads build a fresh
/// table and swap the snapshot in [`Routes`].
#[derive(Debug)]
pub struct RouteTable {
    /// Rules sorted by ascending priority
    rules: Vec<RouteRule>,
}

impl RouteTable {
    /// Build a table from configuration, rejecting ambiguous rule sets.
    ///
    /// Priorities must be unique across the whole rule set so that matching
    /// is deterministic; a duplicate is a deployment error surfaced at load
    /// time, never at request time.
    pub fn build(definitions: &[RouteDefinition]) -> Result<Self, ConfigError> {
        let mut rules = definitions
            .iter()
            .map(RouteRule::from_definition)
            .collect::<Result<Vec<_>, _>>()?;

        rules.sort_by_key(|r| r.priority);

        for pair in rules.windows(2) {
            if pair[0].priority == pair[1].priority {
                return Err(ConfigError::AmbiguousRoute(format!(
                    "rules '{} {}' and '{} {}' share priority {}",
                    pair[0].host.as_str(),
                    pair[0].path_prefix,
                    pair[1].host.as_str(),
                    pair[1].path_prefix,
                    pair[0].priority
                )));
            }
        }

        Ok(Self { rules })
    }

    /// Find the first matching rule in priority order
    pub fn find(&self, host: &str, path: &str, method: &Method) -> Option<&RouteRule> {
        self.rules.iter().find(|r| r.matches(host, path, method))
    }

    /// All rules in evaluation order
    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }
}

/// Shared handle to the active route table snapshot
#[derive(Clone)]
pub struct Routes {
    table: Arc<RwLock<Arc<RouteTable>>>,
}

impl Routes {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: Arc::new(RwLock::new(Arc::new(table))),
        }
    }

    /// Current snapshot. Handlers hold the returned Arc for the duration of
    /// one request and never observe a partially reloaded table.
    pub fn snapshot(&self) -> Arc<RouteTable> {
        self.table
            .read()
            .expect("route table lock poisoned")
            .clone()
    }

    /// Atomically replace the active table
    pub fn reload(&self, table: RouteTable) {
        let mut guard = self.table.write().expect("route table lock poisoned");
        *guard = Arc::new(table);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(host: &str, prefix: &str, priority: u32) -> RouteDefinition {
        RouteDefinition {
            host: host.to_string(),
            path_prefix: prefix.to_string(),
            methods: vec![],
            target: "registry".to_string(),
            priority,
            credential_required: false,
            forward_credential: false,
            allow_headers: None,
            timeout_seconds: 30,
        }
    }

    #[test]
    fn test_host_pattern_exact_and_wildcard() {
        let exact = HostPattern::new("registry.example.com").unwrap();
        assert!(exact.matches("registry.example.com"));
        assert!(exact.matches("REGISTRY.example.com"));
        assert!(!exact.matches("auth.example.com"));

        let wildcard = HostPattern::new("auth.*").unwrap();
        assert!(wildcard.matches("auth.example.com"));
        assert!(wildcard.matches("auth.internal"));
        assert!(!wildcard.matches("registry.example.com"));

        let any = HostPattern::new("*").unwrap();
        assert!(any.matches("anything.at.all"));
    }

    #[test]
    fn test_host_pattern_rejects_multiple_wildcards() {
        assert!(HostPattern::new("*.example.*").is_err());
    }

    #[test]
    fn test_path_prefix_respects_segment_boundaries() {
        assert!(path_prefix_matches("/api", "/api"));
        assert!(path_prefix_matches("/api", "/api/v1"));
        assert!(!path_prefix_matches("/api", "/apiv1"));
        assert!(path_prefix_matches("/", "/anything"));
    }

    #[test]
    fn test_lowest_priority_number_wins() {
        let table = RouteTable::build(&[
            definition("*", "/", 200),
            definition("registry.*", "/api/2.0/mlflow", 50),
            definition("registry.*", "/api", 90),
        ])
        .unwrap();

        let rule = table
            .find("registry.example.com", "/api/2.0/mlflow/version", &Method::GET)
            .unwrap();
        assert_eq!(rule.priority, 50);

        let rule = table
            .find("registry.example.com", "/api/other", &Method::GET)
            .unwrap();
        assert_eq!(rule.priority, 90);

        let rule = table
            .find("other.example.com", "/whatever", &Method::GET)
            .unwrap();
        assert_eq!(rule.priority, 200);
    }

    #[test]
    fn test_method_restriction() {
        let mut def = definition("*", "/api", 40);
        def.methods = vec!["GET".to_string(), "HEAD".to_string()];

        let table = RouteTable::build(&[def]).unwrap();

        assert!(table.find("x", "/api", &Method::GET).is_some());
        assert!(table.find("x", "/api", &Method::POST).is_none());
    }

    #[test]
    fn test_equal_priorities_are_ambiguous_at_load_time() {
        let result = RouteTable::build(&[
            definition("registry.*", "/api", 80),
            definition("registry.*", "/api", 80),
        ]);

        assert!(matches!(result, Err(ConfigError::AmbiguousRoute(_))));
    }

    #[test]
    fn test_invalid_method_rejected_at_load_time() {
        let mut def = definition("*", "/api", 40);
        def.methods = vec!["".to_string()];

        assert!(matches!(
            RouteTable::build(&[def]),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_no_match_returns_none() {
        let table = RouteTable::build(&[definition("auth.*", "/api/v1", 40)]).unwrap();
        assert!(table.find("registry.example.com", "/api/v1", &Method::GET).is_none());
    }

    #[test]
    fn test_reload_swaps_complete_snapshot() {
        let routes = Routes::new(RouteTable::build(&[definition("*", "/old", 10)]).unwrap());

        let before = routes.snapshot();
        assert!(before.find("x", "/old", &Method::GET).is_some());

        routes.reload(RouteTable::build(&[definition("*", "/new", 10)]).unwrap());

        // The old snapshot is unchanged; the new one sees only the new table.
        assert!(before.find("x", "/old", &Method::GET).is_some());
        let after = routes.snapshot();
        assert!(after.find("x", "/old", &Method::GET).is_none());
        assert!(after.find("x", "/new", &Method::GET).is_some());
    }
}
