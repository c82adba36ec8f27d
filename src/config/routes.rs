use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Deserialize;
use std::{collections::HashSet, path::Path, sync::Arc};
use thiserror::Error;
use tokio::fs;
use tracing::{error, info, warn};

use crate::gateway::pool::BackendTarget;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Paths served by the gateway itself. Proxied routes may not shadow them.
pub const RESERVED_PREFIXES: [&str; 4] = ["/v1/sessions", "/v1/users", "/v1/ws", "/health"];

// -----------------------------------------------------------------------------
// ----- Singleton -------------------------------------------------------------

static ROUTES: OnceCell<RoutesConfig> = OnceCell::new();

// -----------------------------------------------------------------------------
// ----- RoutesConfig ----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RoutesConfig {
    inner: Arc<RwLock<Vec<RouteRecord>>>,
}

// -----------------------------------------------------------------------------
// ----- RoutesConfig: Static --------------------------------------------------

impl RoutesConfig {
    pub async fn init(path: &Path) {
        let cfg = Self::from_file_async(path)
            .await
            .unwrap_or_else(|e| panic!("failed to load routes config from {:?}: {e}", path));

        ROUTES
            .set(cfg)
            .unwrap_or_else(|_| panic!("RoutesConfig::init called twice"));
    }

    /// Re-read and validate the routes file without applying it.
    ///
    /// The router and its target pools are built once at startup, so the
    /// live table never changes here; edits are reported and wait for a
    /// restart.
    pub async fn reload(path: &Path) {
        let new_cfg = match Self::from_file_async(path).await {
            Ok(cfg) => cfg,
            Err(e) => {
                error!(
                    "reload failed; keeping previous routes config. path={:?} error={}",
                    path, e
                );
                return;
            }
        };

        if Self::handle().differs_from(&new_cfg) {
            warn!(
                "routes config changed on disk; route changes need a restart to take effect. path={:?}",
                path
            );
        } else {
            info!("routes config unchanged. path={:?}", path);
        }
    }

    pub fn handle() -> &'static RoutesConfig {
        ROUTES.get().expect("Routes not initialized")
    }

    pub fn snapshot() -> Vec<RouteRecord> {
        Self::handle().routes()
    }
}

// -----------------------------------------------------------------------------
// ----- RoutesConfig: Public --------------------------------------------------

impl RoutesConfig {
    pub fn routes(&self) -> Vec<RouteRecord> {
        self.inner.read().clone()
    }

    /// True when `other` would serve a different route table.
    pub fn differs_from(&self, other: &RoutesConfig) -> bool {
        *self.inner.read() != *other.inner.read()
    }

    pub fn parse(raw: &str) -> Result<RoutesConfig, RoutesError> {
        let doc: RoutesFile = toml::from_str(raw).map_err(|e| RoutesError::Toml { source: e })?;

        let mut names = HashSet::with_capacity(doc.routes.len());
        let mut paths = HashSet::new();
        let mut routes = Vec::with_capacity(doc.routes.len());

        for entry in doc.routes {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(RoutesError::InvalidField("name".into()));
            }
            if !names.insert(name.clone()) {
                return Err(RoutesError::DuplicateRoute { name });
            }

            if entry.paths.is_empty() {
                return Err(RoutesError::NoPaths { route: name });
            }
            for path in &entry.paths {
                validate_path(&name, path)?;
                if !paths.insert(path.clone()) {
                    return Err(RoutesError::DuplicatePath { path: path.clone() });
                }
            }

            let targets = entry
                .targets
                .into_list()
                .iter()
                .map(|raw| {
                    raw.parse::<BackendTarget>()
                        .map_err(|e| RoutesError::InvalidTarget {
                            route: name.clone(),
                            target: raw.clone(),
                            reason: e.to_string(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if targets.is_empty() {
                return Err(RoutesError::EmptyPool { route: name });
            }

            routes.push(RouteRecord {
                name,
                paths: entry.paths,
                targets,
            });
        }

        if routes.is_empty() {
            return Err(RoutesError::EmptyConfig);
        }

        Ok(RoutesConfig {
            inner: Arc::new(RwLock::new(routes)),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- RoutesConfig: Private -------------------------------------------------

impl RoutesConfig {
    async fn from_file_async(path: &Path) -> Result<RoutesConfig, RoutesError> {
        let raw = fs::read_to_string(path).await.map_err(|e| RoutesError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&raw)
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: On-disk format ----------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct RoutesFile {
    #[serde(default)]
    routes: Vec<RouteFileEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct RouteFileEntry {
    name: String,
    paths: Vec<String>,
    targets: TargetList,
}

/// `targets = "a:80,b:80"` or `targets = ["a:80", "b:80"]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TargetList {
    CommaSeparated(String),
    List(Vec<String>),
}

impl TargetList {
    fn into_list(self) -> Vec<String> {
        let raw = match self {
            TargetList::CommaSeparated(s) => s.split(',').map(str::to_string).collect(),
            TargetList::List(v) => v,
        };

        raw.into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: In-memory record --------------------------------------------

/// One proxied route: every path in `paths` dispatches to `targets`.
///
/// A path ending in `/` matches its whole subtree; any other path matches
/// exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub name: String,
    pub paths: Vec<String>,
    pub targets: Vec<BackendTarget>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn validate_path(route: &str, path: &str) -> Result<(), RoutesError> {
    let invalid = |reason: &str| RoutesError::InvalidPath {
        route: route.to_string(),
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path.contains(['{', '}', '*', ':']) {
        return Err(invalid("must be a literal path"));
    }
    if RESERVED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Err(invalid("shadows a gateway endpoint"));
    }

    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RoutesError {
    #[error("routes config is empty")]
    EmptyConfig,

    #[error("duplicate [[routes]] entry for route '{name}'")]
    DuplicateRoute { name: String },

    #[error("path '{path}' is claimed by more than one route")]
    DuplicatePath { path: String },

    #[error("route '{route}' has no paths")]
    NoPaths { route: String },

    #[error("route '{route}' has an empty target pool")]
    EmptyPool { route: String },

    #[error("route '{route}': invalid path '{path}': {reason}")]
    InvalidPath {
        route: String,
        path: String,
        reason: String,
    },

    #[error("route '{route}': invalid target '{target}': {reason}")]
    InvalidTarget {
        route: String,
        target: String,
        reason: String,
    },

    #[error("invalid or missing field '{0}'")]
    InvalidField(String),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("toml parse error: {source}")]
    Toml { source: toml::de::Error },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_tmp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn parses_both_target_forms() {
        let toml = r#"
            [[routes]]
            name = "messaging"
            paths = ["/v1/channels", "/v1/channels/", "/v1/messages/"]
            targets = "messaging-1:80, https://messaging-2:4000/"

            [[routes]]
            name = "summary"
            paths = ["/v1/summary"]
            targets = ["summary:80"]
        "#;

        let tmp = write_tmp(toml);
        let cfg = RoutesConfig::from_file_async(tmp.path()).await.unwrap();
        let routes = cfg.routes();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].name, "messaging");
        assert_eq!(routes[0].paths.len(), 3);
        assert_eq!(routes[0].targets.len(), 2);
        assert_eq!(routes[0].targets[0].to_string(), "http://messaging-1:80");
        assert_eq!(routes[0].targets[1].to_string(), "https://messaging-2:4000");
        assert_eq!(routes[1].targets[0].to_string(), "http://summary:80");
    }

    #[test]
    fn empty_pool_is_rejected() {
        let toml = r#"
            [[routes]]
            name = "summary"
            paths = ["/v1/summary"]
            targets = " , "
        "#;

        let err = RoutesConfig::parse(toml).unwrap_err();
        assert!(matches!(err, RoutesError::EmptyPool { route } if route == "summary"));
    }

    #[test]
    fn reserved_and_pattern_paths_are_rejected() {
        for path in ["/v1/sessions/x", "/v1/ws", "/health", "/v1/{id}", "relative"] {
            let toml = format!(
                r#"
                [[routes]]
                name = "r"
                paths = ["{path}"]
                targets = "a:80"
                "#
            );
            let err = RoutesConfig::parse(&toml).unwrap_err();
            assert!(matches!(err, RoutesError::InvalidPath { .. }), "{path}");
        }
    }

    #[test]
    fn duplicates_are_rejected() {
        let dup_name = r#"
            [[routes]]
            name = "a"
            paths = ["/a"]
            targets = "a:80"

            [[routes]]
            name = "a"
            paths = ["/b"]
            targets = "b:80"
        "#;
        assert!(matches!(
            RoutesConfig::parse(dup_name).unwrap_err(),
            RoutesError::DuplicateRoute { .. }
        ));

        let dup_path = r#"
            [[routes]]
            name = "a"
            paths = ["/a"]
            targets = "a:80"

            [[routes]]
            name = "b"
            paths = ["/a"]
            targets = "b:80"
        "#;
        assert!(matches!(
            RoutesConfig::parse(dup_path).unwrap_err(),
            RoutesError::DuplicatePath { .. }
        ));
    }

    #[tokio::test]
    async fn reload_leaves_the_live_table_alone() {
        let before = r#"
            [[routes]]
            name = "summary"
            paths = ["/v1/summary"]
            targets = "summary:80"
        "#;
        let after = r#"
            [[routes]]
            name = "summary"
            paths = ["/v1/summary"]
            targets = "summary:80, summary-2:80"
        "#;

        let tmp = write_tmp(before);
        RoutesConfig::init(tmp.path()).await;
        assert!(!RoutesConfig::handle().differs_from(&RoutesConfig::parse(before).unwrap()));

        std::fs::write(tmp.path(), after).unwrap();
        RoutesConfig::reload(tmp.path()).await;

        let live = RoutesConfig::snapshot();
        assert_eq!(live[0].targets.len(), 1);
        assert!(RoutesConfig::handle().differs_from(&RoutesConfig::parse(after).unwrap()));
    }

    #[test]
    fn no_routes_is_an_error() {
        assert!(matches!(
            RoutesConfig::parse("").unwrap_err(),
            RoutesError::EmptyConfig
        ));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
