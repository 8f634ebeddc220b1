//! Configuration system for Martlet.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/martlet/config.toml` and/or `.martlet/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Project name stamped into generated documentation.
    pub project: String,
    pub paths: PathsConfig,
    pub synth: SynthConfig,
    pub dashboard: DashboardConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            project: "eCommerce Analytics".to_string(),
            paths: PathsConfig::default(),
            synth: SynthConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Filesystem layout for a run. Relative entries are resolved against the
/// workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory containing (or receiving) the raw CSV source files.
    pub data_dir: PathBuf,
    /// The warehouse database file.
    pub database: PathBuf,
    /// Directory for generated artifacts: docs.json, queries/, dashboard.html.
    pub out_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: PathBuf::from("martlet.db"),
            out_dir: PathBuf::from("artifacts"),
        }
    }
}

impl PathsConfig {
    /// Resolve every path against a workspace root.
    ///
    /// `Path::join` keeps absolute entries as-is, so absolute paths in the
    /// config win over the workspace root.
    pub fn resolved(&self, workspace: &Path) -> PathsConfig {
        PathsConfig {
            data_dir: workspace.join(&self.data_dir),
            database: workspace.join(&self.database),
            out_dir: workspace.join(&self.out_dir),
        }
    }
}

/// Parameters for the synthetic source generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// RNG seed. Same seed, same CSVs.
    pub seed: u64,
    /// Number of users to generate.
    pub users: usize,
    /// Number of products to generate.
    pub products: usize,
    /// Upper bound of orders per user (inclusive; lower bound is zero).
    pub max_orders_per_user: usize,
    /// Upper bound of line items per order (inclusive; lower bound is one).
    pub max_items_per_order: usize,
    /// Bounds of behavioral events per user (both inclusive).
    pub min_events_per_user: usize,
    pub max_events_per_user: usize,
    /// Timestamps are drawn from this many days before the run anchor.
    pub history_days: i64,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            users: 500,
            products: 100,
            max_orders_per_user: 10,
            max_items_per_order: 5,
            min_events_per_user: 5,
            max_events_per_user: 50,
            history_days: 365,
        }
    }
}

impl SynthConfig {
    /// Validate this synth config and return any warnings.
    ///
    /// Returns human-readable warning messages for values that produce
    /// degenerate output without being outright invalid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.users == 0 {
            warnings.push("synth.users is 0, every generated file will be empty".to_string());
        }
        if self.products == 0 {
            warnings.push("synth.products is 0, orders cannot reference any product".to_string());
        }
        if self.max_orders_per_user == 0 {
            warnings.push(
                "synth.max_orders_per_user is 0, fact tables will have no order rows".to_string(),
            );
        }
        if self.min_events_per_user > self.max_events_per_user {
            warnings.push(format!(
                "synth.min_events_per_user ({}) exceeds max_events_per_user ({})",
                self.min_events_per_user, self.max_events_per_user
            ));
        }
        if self.history_days <= 0 {
            warnings.push(format!(
                "synth.history_days is {}, all timestamps will equal the run anchor",
                self.history_days
            ));
        }
        warnings
    }
}

/// Presentation settings for the rendered dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Page title of the generated HTML.
    pub title: String,
    /// How many products the ranked table shows.
    pub top_products_limit: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            title: "eCommerce Analytics Dashboard".to_string(),
            top_products_limit: 10,
        }
    }
}

impl PipelineConfig {
    /// Validate the whole config and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for w in self.synth.validate() {
            warnings.push(w);
        }
        if self.dashboard.top_products_limit == 0 {
            warnings.push("dashboard.top_products_limit is 0, the product table will be empty".to_string());
        }
        warnings
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `MARTLET_`)
/// 3. Workspace-local config (`.martlet/config.toml`)
/// 4. User config (`~/.config/martlet/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&PipelineConfig>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("io", "martlet", "martlet") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".martlet").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (MARTLET_SYNTH__SEED, MARTLET_PATHS__DATA_DIR, etc.)
    figment = figment.merge(Env::prefixed("MARTLET_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any Martlet configuration file exists (user-level or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("io", "martlet", "martlet") {
        if config_dir.config_dir().join("config.toml").exists() {
            return true;
        }
    }

    if let Some(ws) = workspace {
        if ws.join(".martlet").join("config.toml").exists() {
            return true;
        }
    }

    false
}
