//! CLI subcommand handlers.

use chrono::{DateTime, Utc};
use crate::Commands;
use crate::ConfigAction;
use martlet_core::catalog;
use martlet_core::checks::CheckStatus;
use martlet_core::models::Layer;
use martlet_core::pipeline::{Pipeline, RunSummary};
use martlet_core::schema::TIMESTAMP_FORMAT;
use martlet_core::warehouse::QueryBatch;
use std::path::Path;

const MAX_PRINT_ROWS: usize = 25;

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path, as_of: DateTime<Utc>) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace),
        Commands::Seed => handle_seed(&pipeline(workspace, as_of)?),
        Commands::Run { seed } => handle_run(&pipeline(workspace, as_of)?, seed),
        Commands::Build => handle_build(&pipeline(workspace, as_of)?),
        Commands::Check => handle_check(&pipeline(workspace, as_of)?),
        Commands::Docs => handle_docs(&pipeline(workspace, as_of)?),
        Commands::Catalog => handle_catalog(&pipeline(workspace, as_of)?),
        Commands::Dashboard => handle_dashboard(&pipeline(workspace, as_of)?),
        Commands::Query { name } => handle_query(&pipeline(workspace, as_of)?, &name),
    }
}

fn pipeline(workspace: &Path, as_of: DateTime<Utc>) -> anyhow::Result<Pipeline> {
    let config = martlet_core::config::load_config(Some(workspace), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    Ok(Pipeline::new(config, workspace, as_of))
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_dir = workspace.join(".martlet");
            std::fs::create_dir_all(&config_dir)?;

            let config_path = config_dir.join("config.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }

            let default_config = martlet_core::PipelineConfig::default();
            let toml_str = toml::to_string_pretty(&default_config)?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = martlet_core::config::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            if !martlet_core::config_exists(Some(workspace)) {
                println!("No configuration file found; showing built-in defaults.");
                println!();
            }
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

fn handle_seed(pipeline: &Pipeline) -> anyhow::Result<()> {
    let report = pipeline.seed()?;
    println!("Generated source files:");
    println!("  users:       {}", report.users);
    println!("  products:    {}", report.products);
    println!("  orders:      {}", report.orders);
    println!("  order items: {}", report.order_items);
    println!("  events:      {}", report.events);
    Ok(())
}

fn handle_run(pipeline: &Pipeline, seed: bool) -> anyhow::Result<()> {
    if seed {
        pipeline.seed()?;
    }
    let summary = pipeline.run()?;
    print_summary(&summary);
    if !summary.checks.all_passed() {
        anyhow::bail!(
            "{} of {} checks failed",
            summary.checks.total() - summary.checks.passed(),
            summary.checks.total()
        );
    }
    Ok(())
}

fn handle_build(pipeline: &Pipeline) -> anyhow::Result<()> {
    let mut warehouse = pipeline.open_warehouse()?;
    let load = pipeline.load(&mut warehouse)?;
    for source in &load.loaded {
        println!("  loaded {} ({} rows)", source.relation, source.rows);
    }
    for relation in &load.missing {
        println!("  missing source for {}", relation);
    }
    let models = pipeline.build(&warehouse)?;
    for model in &models {
        println!("  built {} [{}] ({} rows)", model.name, model.layer, model.rows);
    }
    warehouse.close()?;
    Ok(())
}

fn handle_check(pipeline: &Pipeline) -> anyhow::Result<()> {
    let warehouse = pipeline.open_warehouse()?;
    let report = pipeline.check(&warehouse);
    warehouse.close()?;

    for result in &report.results {
        match result.status {
            CheckStatus::Pass => println!("  ✓ {}", result.name),
            CheckStatus::Fail => {
                let observed = result
                    .observed
                    .map(|o| o.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!("  ✗ {} (observed {})", result.name, observed);
            }
            CheckStatus::Error => println!(
                "  ! {} ({})",
                result.name,
                result.error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!("{}/{} checks passed", report.passed(), report.total());
    if !report.all_passed() {
        anyhow::bail!("validation failed");
    }
    Ok(())
}

fn handle_docs(pipeline: &Pipeline) -> anyhow::Result<()> {
    let warehouse = pipeline.open_warehouse()?;
    let checks = pipeline.check(&warehouse);
    let path = pipeline.document(&warehouse, &checks)?;
    warehouse.close()?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn handle_catalog(pipeline: &Pipeline) -> anyhow::Result<()> {
    let warehouse = pipeline.open_warehouse()?;
    let count = pipeline.publish_catalog(&warehouse)?;
    warehouse.close()?;
    let artifacts = pipeline.artifact_paths();
    println!(
        "Validated {} queries; wrote {} and {}",
        count,
        artifacts.queries_dir.display(),
        artifacts.manifest.display()
    );
    Ok(())
}

fn handle_dashboard(pipeline: &Pipeline) -> anyhow::Result<()> {
    let warehouse = pipeline.open_warehouse()?;
    let path = pipeline.render_dashboard(&warehouse)?;
    warehouse.close()?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn handle_query(pipeline: &Pipeline, name: &str) -> anyhow::Result<()> {
    let Some(query) = catalog::find(name) else {
        let known: Vec<&str> = catalog::CATALOG.iter().map(|q| q.name).collect();
        anyhow::bail!("Unknown query '{}'. Available: {}", name, known.join(", "));
    };

    let warehouse = pipeline.open_warehouse()?;
    let anchor = pipeline.as_of().format(TIMESTAMP_FORMAT).to_string();
    let batch = warehouse.query(&query.sql(&anchor))?;
    warehouse.close()?;

    println!("{}: {}", query.name, query.description);
    print_batch(&batch);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("Run complete (as of {})", summary.as_of.to_rfc3339());
    println!();
    println!(
        "  Sources:   {} loaded, {} missing",
        summary.load.loaded.len(),
        summary.load.missing.len()
    );
    println!(
        "  Models:    {} staging, {} dimension, {} fact",
        summary.layer_count(Layer::Staging),
        summary.layer_count(Layer::Dimension),
        summary.layer_count(Layer::Fact)
    );
    println!(
        "  Checks:    {}/{} passed",
        summary.checks.passed(),
        summary.checks.total()
    );
    println!("  Queries:   {} validated", summary.queries_validated);
    println!(
        "  Totals:    {} arithmetic mismatches in fct_orders",
        summary.verification.mismatches
    );

    let sample = &summary.verification.sample;
    if sample.row_count() > 0 {
        println!();
        println!("  Sample order lines:");
        for row in 0..sample.row_count() {
            println!(
                "    order {}: {} x ${} = ${}",
                cell(sample, row, "order_id"),
                cell(sample, row, "quantity"),
                cell(sample, row, "unit_price"),
                cell(sample, row, "line_total"),
            );
        }
    }

    println!();
    println!("  Artifacts:");
    println!("    {}", summary.artifacts.database.display());
    println!("    {}", summary.artifacts.docs.display());
    println!("    {}", summary.artifacts.queries_dir.display());
    println!("    {}", summary.artifacts.manifest.display());
    println!("    {}", summary.artifacts.dashboard.display());
}

fn print_batch(batch: &QueryBatch) {
    println!("{}", batch.columns.join(" | "));
    for (i, row) in batch.rows.iter().enumerate() {
        if i == MAX_PRINT_ROWS {
            println!("... {} more rows", batch.rows.len() - MAX_PRINT_ROWS);
            break;
        }
        let line: Vec<String> = row
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "null".to_string(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", line.join(" | "));
    }
    println!("({} rows)", batch.row_count());
}

fn cell(batch: &QueryBatch, row: usize, column: &str) -> String {
    match batch.value(row, column) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Null) | None => "null".to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_init_creates_file() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, Utc::now()).unwrap();

        let config_path = workspace.join(".martlet").join("config.toml");
        assert!(config_path.exists());

        // The written file parses back as the config type
        let content = std::fs::read_to_string(&config_path).unwrap();
        let parsed: martlet_core::PipelineConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.project, "eCommerce Analytics");
        assert_eq!(parsed.synth.seed, 42);
        assert_eq!(parsed.dashboard.top_products_limit, 10);
    }

    #[test]
    fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        // First init
        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, Utc::now()).unwrap();

        let config_path = workspace.join(".martlet").join("config.toml");
        let content_first = std::fs::read_to_string(&config_path).unwrap();

        // Second init should not overwrite
        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, Utc::now()).unwrap();

        let content_second = std::fs::read_to_string(&config_path).unwrap();
        assert_eq!(content_first, content_second);
    }

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        // No config file anywhere: show falls back to built-in defaults
        let command = Commands::Config {
            action: ConfigAction::Show,
        };
        let result = handle_command(command, workspace, Utc::now());
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_show_after_init() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        // Init first
        let init_cmd = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(init_cmd, workspace, Utc::now()).unwrap();

        // Show reads the file init just wrote
        let show_cmd = Commands::Config {
            action: ConfigAction::Show,
        };
        let result = handle_command(show_cmd, workspace, Utc::now());
        assert!(result.is_ok());
    }
}
