use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoutelensError};

/// One route as reported by the route-discovery step.
///
/// The endpoint name doubles as the handler function name. A route whose
/// handler source could not be resolved carries `source: None` and degrades
/// to an empty flow downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub endpoint: String,
    pub path: String,

    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default)]
    pub source: Option<PathBuf>,
}

/// Load a routes manifest (a JSON array of route descriptors)
pub fn load_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<RouteDescriptor>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        RoutelensError::Manifest(format!("failed to read {}: {}", path.display(), e))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        RoutelensError::Manifest(format!("invalid manifest {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn manifest_round_trips_with_optional_fields() {
        let json = r#"[
            {"endpoint": "read_root", "path": "/", "methods": ["GET"], "source": "app/main.py"},
            {"endpoint": "orphan", "path": "/orphan"}
        ]"#;

        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(json.as_bytes()).expect("write");

        let routes = load_manifest(file.path()).expect("load");
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].endpoint, "read_root");
        assert_eq!(routes[0].source, Some(PathBuf::from("app/main.py")));
        assert!(routes[1].methods.is_empty());
        assert!(routes[1].source.is_none());
    }

    #[test]
    fn malformed_manifest_is_a_manifest_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"{not json").expect("write");

        let err = load_manifest(file.path()).unwrap_err();
        assert!(matches!(err, RoutelensError::Manifest(_)));
    }
}
