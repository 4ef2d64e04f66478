use std::path::{Path, PathBuf};
use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::Config;
use super::flow::{FlowAnalyzer, FlowComposer};
use super::report::FlowReport;
use super::routes::{self, RouteDescriptor};
use super::scanner::SourceScanner;

/// Main orchestration engine: scan sources, analyze functions, compose flows
pub struct Engine {
    config: Config,
    scanner: SourceScanner,
    analyzer: FlowAnalyzer,
}

impl Engine {
    /// Create a new engine instance
    pub fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        let scanner = SourceScanner::new(&config.project, &config.parsing)?;
        let analyzer = FlowAnalyzer::new()?;

        Ok(Self {
            config,
            scanner,
            analyzer,
        })
    }

    /// Run the full pipeline: scan, analyze, compose, write the report
    pub async fn analyze(
        &mut self,
        routes_path: PathBuf,
        source: Option<PathBuf>,
        output: Option<PathBuf>,
        pretty: bool,
    ) -> Result<()> {
        let source_dirs = match source {
            Some(dir) => vec![dir],
            None => self.config.project.source_dirs.clone(),
        };

        info!("Scanning {} source dir(s)", source_dirs.len());
        let scanned = self.scanner.scan_into(&source_dirs, &mut self.analyzer)?;
        info!(
            "Indexed {} functions across {} files",
            self.analyzer.index().len(),
            scanned.len()
        );

        let route_list = routes::load_manifest(&routes_path)?;
        info!("Loaded {} routes from {}", route_list.len(), routes_path.display());

        // Handlers that live outside the scanned dirs still get analyzed;
        // unresolvable ones degrade to empty flows.
        self.analyze_stray_handlers(&route_list);

        let composer = FlowComposer::new(self.analyzer.index());
        let flows = composer.build_execution_flow(&route_list);

        let sources = if self.config.output.include_sources {
            scanned
        } else {
            Vec::new()
        };
        let report = FlowReport::new(self.config.project.name.clone(), sources, flows);
        let json = report.to_json(pretty || self.config.output.pretty)?;

        match output {
            Some(path) => {
                std::fs::write(&path, json)?;
                info!("Report written to {}", path.display());
            }
            None => println!("{}", json),
        }

        Ok(())
    }

    /// Dump the analyzed flow info for one function
    pub async fn inspect(&mut self, function: &str, source: Option<PathBuf>) -> Result<()> {
        let source_dirs = match source {
            Some(dir) => vec![dir],
            None => self.config.project.source_dirs.clone(),
        };

        self.scanner.scan_into(&source_dirs, &mut self.analyzer)?;

        match self.analyzer.index().resolve(function, None) {
            Some(id) => {
                let id = id.clone();
                let info = self.analyzer.index().get(&id);
                info!("Flow info for {}", id);
                println!("{}", serde_json::to_string_pretty(&info)?);
            }
            None => warn!("Function '{}' was not found in the scanned sources", function),
        }

        Ok(())
    }

    /// Write a default configuration file
    pub async fn init(&self, path: Option<PathBuf>) -> Result<()> {
        let target = path
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Routelens.toml");

        if target.exists() {
            warn!("{} already exists, leaving it untouched", target.display());
            return Ok(());
        }

        Config::default().save(&target)?;
        info!("Wrote default configuration to {}", target.display());
        Ok(())
    }

    fn analyze_stray_handlers(&mut self, route_list: &[RouteDescriptor]) {
        for route in route_list {
            let module = route.source.as_deref().map(super::flow::module_key);
            if self
                .analyzer
                .index()
                .resolve(&route.endpoint, module.as_deref())
                .is_none()
            {
                debug!("Analyzing stray handler '{}'", route.endpoint);
                let info = self
                    .analyzer
                    .analyze(&route.endpoint, route.source.as_deref());
                if let Some(diagnostic) = info.error {
                    warn!("Handler '{}' degraded: {}", route.endpoint, diagnostic);
                }
            }
        }
    }
}
