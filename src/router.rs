//! Routing table: path-pattern resolution with wholesale snapshot swaps.
//!
//! Lookups run against an immutable `Arc` snapshot taken at the start
//! of the request, so a refresh mid-request can never show a reader a
//! half-built table. The discovery refresh task is the sole writer.

use std::sync::{Arc, RwLock};

use crate::error::{GatewayError, Result};

/// How a pattern matches request paths
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathMatch {
    /// Pattern ended in `/**`; holds the prefix including the slash
    Prefix(String),
    /// Pattern without a glob, matched verbatim
    Exact(String),
}

/// One compiled route
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Pattern as configured, e.g. `/api/service-a/**`
    pub pattern: String,
    /// Backend base URL, trailing slash trimmed
    pub target: String,
    matcher: PathMatch,
    /// Gateway-facing prefix removed during rewrite (`/api/<service>`),
    /// None when the pattern carries no service segment
    strip: Option<String>,
}

impl RouteEntry {
    /// Compile a pattern/target pair.
    pub fn compile(pattern: &str, target: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "Route pattern must start with '/': {}",
                pattern
            )));
        }
        if target.is_empty() {
            return Err(GatewayError::Config(format!(
                "Route target must not be empty for pattern {}",
                pattern
            )));
        }

        let matcher = match pattern.strip_suffix("**") {
            Some(stem) => PathMatch::Prefix(stem.to_string()),
            None => PathMatch::Exact(pattern.to_string()),
        };
        let stem = match &matcher {
            PathMatch::Prefix(stem) => stem.as_str(),
            PathMatch::Exact(exact) => exact.as_str(),
        };

        Ok(Self {
            pattern: pattern.to_string(),
            target: target.trim_end_matches('/').to_string(),
            strip: service_strip(stem),
            matcher,
        })
    }

    fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            PathMatch::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathMatch::Exact(exact) => path == exact,
        }
    }

    /// Drop the service segment: `/api/service-a/v1/list` becomes
    /// `/api/v1/list`. Patterns without a service segment forward the
    /// path unchanged.
    fn rewritten_path(&self, path: &str) -> String {
        match &self.strip {
            Some(strip) => format!("/api{}", &path[strip.len()..]),
            None => path.to_string(),
        }
    }
}

/// `/api/<service>/...` yields `/api/<service>`, anything else None.
fn service_strip(stem: &str) -> Option<String> {
    let rest = stem.strip_prefix("/api/")?;
    let service = rest.split('/').next().filter(|s| !s.is_empty())?;
    Some(format!("/api/{}", service))
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Absolute URL to forward to, query preserved
    pub url: String,
    /// Pattern that matched
    pub pattern: String,
}

/// The swappable routing table
pub struct RouteTable {
    entries: RwLock<Arc<Vec<RouteEntry>>>,
}

impl RouteTable {
    /// Empty table; populated by the first discovery refresh.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Current table snapshot. Holding the snapshot keeps a consistent
    /// view regardless of concurrent refreshes.
    pub fn snapshot(&self) -> Arc<Vec<RouteEntry>> {
        self.entries.read().unwrap().clone()
    }

    /// Replace the table wholesale.
    pub fn replace(&self, entries: Vec<RouteEntry>) {
        *self.entries.write().unwrap() = Arc::new(entries);
    }

    /// First-match lookup in table order, with path rewrite.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<ResolvedTarget> {
        let entries = self.snapshot();
        for entry in entries.iter() {
            if entry.matches(path) {
                let mut url = format!("{}{}", entry.target, entry.rewritten_path(path));
                if let Some(query) = query {
                    url.push('?');
                    url.push_str(query);
                }
                return Some(ResolvedTarget {
                    url,
                    pattern: entry.pattern.clone(),
                });
            }
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(pattern: &str, target: &str) -> RouteEntry {
        RouteEntry::compile(pattern, target).unwrap()
    }

    fn table(entries: Vec<RouteEntry>) -> RouteTable {
        let t = RouteTable::new();
        t.replace(entries);
        t
    }

    #[test]
    fn test_glob_prefix_matching() {
        let e = entry("/api/service-a/**", "http://localhost:8081");
        assert!(e.matches("/api/service-a/v1/list"));
        assert!(e.matches("/api/service-a/"));
        assert!(!e.matches("/api/service-a"));
        assert!(!e.matches("/api/service-ab/v1/list"));
        assert!(!e.matches("/api/service-b/v1/list"));
    }

    #[test]
    fn test_exact_matching() {
        let e = entry("/api/ping", "http://localhost:8081");
        assert!(e.matches("/api/ping"));
        assert!(!e.matches("/api/ping/deep"));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        assert!(RouteEntry::compile("api/no-slash/**", "http://localhost:1").is_err());
        assert!(RouteEntry::compile("/api/x/**", "").is_err());
    }

    #[test]
    fn test_rewrite_strips_service_segment() {
        let t = table(vec![entry("/api/service-a/**", "http://localhost:8081")]);
        let resolved = t.resolve("/api/service-a/v1/list", None).unwrap();
        assert_eq!(resolved.url, "http://localhost:8081/api/v1/list");
        assert_eq!(resolved.pattern, "/api/service-a/**");
    }

    #[test]
    fn test_rewrite_preserves_query() {
        let t = table(vec![entry("/api/service-a/**", "http://localhost:8081")]);
        let resolved = t
            .resolve("/api/service-a/v1/list", Some("page=2&size=10"))
            .unwrap();
        assert_eq!(
            resolved.url,
            "http://localhost:8081/api/v1/list?page=2&size=10"
        );
    }

    #[test]
    fn test_target_trailing_slash_trimmed() {
        let t = table(vec![entry("/api/service-a/**", "http://localhost:8081/")]);
        let resolved = t.resolve("/api/service-a/v1/list", None).unwrap();
        assert_eq!(resolved.url, "http://localhost:8081/api/v1/list");
    }

    #[test]
    fn test_pattern_without_service_segment_forwards_unchanged() {
        let t = table(vec![entry("/files/**", "http://localhost:9000")]);
        let resolved = t.resolve("/files/reports/2024.pdf", None).unwrap();
        assert_eq!(resolved.url, "http://localhost:9000/files/reports/2024.pdf");
    }

    #[test]
    fn test_first_match_wins() {
        let t = table(vec![
            entry("/api/service-a/**", "http://first:8081"),
            entry("/api/service-a/**", "http://second:8082"),
        ]);
        let resolved = t.resolve("/api/service-a/v1/list", None).unwrap();
        assert_eq!(resolved.url, "http://first:8081/api/v1/list");
    }

    #[test]
    fn test_empty_table_resolves_nothing() {
        let t = RouteTable::new();
        assert!(t.is_empty());
        assert!(t.resolve("/api/service-a/v1/list", None).is_none());
    }

    #[test]
    fn test_replace_is_wholesale() {
        let t = table(vec![entry("/api/service-a/**", "http://a:1")]);
        assert!(t.resolve("/api/service-a/x", None).is_some());

        t.replace(vec![entry("/api/service-b/**", "http://b:2")]);
        assert!(t.resolve("/api/service-a/x", None).is_none());
        assert!(t.resolve("/api/service-b/x", None).is_some());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_snapshots_stay_consistent_across_refreshes() {
        let table_a = vec![
            entry("/api/one/**", "http://a:1"),
            entry("/api/two/**", "http://a:1"),
        ];
        let table_b = vec![
            entry("/api/one/**", "http://b:2"),
            entry("/api/two/**", "http://b:2"),
            entry("/api/three/**", "http://b:2"),
        ];

        let shared = Arc::new(RouteTable::new());
        shared.replace(table_a.clone());

        let writer = {
            let shared = shared.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    if i % 2 == 0 {
                        shared.replace(table_b.clone());
                    } else {
                        shared.replace(table_a.clone());
                    }
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        let snapshot = shared.snapshot();
                        // Every snapshot is one of the two full tables,
                        // homogeneous in target, never a mix.
                        let first = &snapshot[0].target;
                        assert!(snapshot.iter().all(|e| &e.target == first));
                        match snapshot.len() {
                            2 => assert_eq!(first, "http://a:1"),
                            3 => assert_eq!(first, "http://b:2"),
                            n => panic!("snapshot with unexpected length {}", n),
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
