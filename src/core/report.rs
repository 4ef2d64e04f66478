use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use super::flow::RouteFlow;
use super::scanner::ScannedFile;

/// Serializable envelope handed to the rendering side.
///
/// Everything inside is plain maps, sequences, strings and numbers;
/// set-valued fields already serialize as ordered sequences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowReport {
    pub project: String,
    pub generated_at: String,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sources: Vec<ScannedFile>,

    pub routes: BTreeMap<String, RouteFlow>,
}

impl FlowReport {
    pub fn new(
        project: impl Into<String>,
        sources: Vec<ScannedFile>,
        routes: BTreeMap<String, RouteFlow>,
    ) -> Self {
        Self {
            project: project.into(),
            generated_at: Utc::now().to_rfc3339(),
            sources,
            routes,
        }
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(json)
    }
}
