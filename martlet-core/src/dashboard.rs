//! Static HTML dashboard rendering.
//!
//! One self-contained page: summary metric cards, four Plotly charts fed by
//! the reporting catalog, the ranked product table and a narrative summary
//! substituted from the same computed metrics. Plotly loads from its CDN;
//! everything else is inlined, so the file opens straight from disk with no
//! server behind it.

use std::path::Path;

use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::info;

use crate::catalog::{DAILY_REVENUE, EVENT_FUNNEL, REVENUE_BY_CATEGORY, TOP_PRODUCTS, USER_COHORT};
use crate::config::DashboardConfig;
use crate::error::{ModelError, Result};
use crate::persistence::atomic_write;
use crate::schema::TIMESTAMP_FORMAT;
use crate::warehouse::{QueryBatch, Warehouse};

const TEMPLATE: &str = include_str!("../templates/dashboard.hbs");

/// Mart relations the dashboard reads. Checked up front so rendering
/// against a warehouse that was never built fails with a named dependency
/// rather than a raw SQL error.
const REQUIRED_RELATIONS: &[&str] = &["dim_users", "dim_products", "fct_orders", "fct_events"];

#[derive(Debug, Serialize)]
struct DashboardContext {
    title: String,
    subtitle: String,
    generated_at: String,
    total_revenue: String,
    total_orders: String,
    avg_order_value: String,
    total_margin: String,
    top_category_name: String,
    top_category_revenue: String,
    top_category_orders: i64,
    top_category_share: String,
    top_product_name: String,
    top_product_revenue: String,
    top_product_margin: String,
    newest_cohort_users: i64,
    newest_cohort_avg_order: String,
    conversion: String,
    purchase_users: i64,
    all_users: i64,
    category_count: usize,
    margin_min: String,
    margin_max: String,
    top_products_limit: usize,
    top_products: Vec<ProductRow>,
    chart1_json: String,
    chart2_json: String,
    chart3_json: String,
    chart4_json: String,
}

/// One row of the ranked product table, pre-formatted for display.
#[derive(Debug, Serialize)]
struct ProductRow {
    name: String,
    revenue: String,
    margin: String,
}

#[derive(Serialize)]
struct CategoryChart {
    categories: Vec<String>,
    revenues: Vec<f64>,
}

#[derive(Serialize)]
struct CohortChart {
    cohorts: Vec<String>,
    users: Vec<i64>,
    orders: Vec<i64>,
}

#[derive(Serialize)]
struct FunnelChart {
    stages: Vec<String>,
    users: Vec<i64>,
}

#[derive(Serialize)]
struct DailyChart {
    dates: Vec<String>,
    revenues: Vec<f64>,
}

/// Render the dashboard page from live mart state.
pub fn render_dashboard(
    warehouse: &Warehouse,
    config: &DashboardConfig,
    as_of: DateTime<Utc>,
) -> Result<String> {
    for relation in REQUIRED_RELATIONS {
        if !warehouse.relation_exists(relation)? {
            return Err(ModelError::MissingDependency {
                relation: relation.to_string(),
                needed_by: "dashboard".to_string(),
            }
            .into());
        }
    }

    let anchor = as_of.format(TIMESTAMP_FORMAT).to_string();
    let by_category = warehouse.query(&REVENUE_BY_CATEGORY.sql(&anchor))?;
    let top_products = warehouse.query(&TOP_PRODUCTS.sql(&anchor))?;
    let cohorts = warehouse.query(&USER_COHORT.sql(&anchor))?;
    let funnel = warehouse.query(&EVENT_FUNNEL.sql(&anchor))?;
    let daily = warehouse.query(&DAILY_REVENUE.sql(&anchor))?;

    let context = build_context(
        config,
        as_of,
        &by_category,
        &top_products,
        &cohorts,
        &funnel,
        &daily,
    )?;

    let mut registry = Handlebars::new();
    registry.set_strict_mode(false);
    let html = registry
        .render_template(TEMPLATE, &context)
        .map_err(Box::new)?;
    Ok(html)
}

/// Render and write the page.
pub fn write_dashboard(
    warehouse: &Warehouse,
    config: &DashboardConfig,
    as_of: DateTime<Utc>,
    path: &Path,
) -> Result<()> {
    let html = render_dashboard(warehouse, config, as_of)?;
    atomic_write(path, html.as_bytes())?;
    info!(path = %path.display(), "Wrote dashboard");
    Ok(())
}

fn build_context(
    config: &DashboardConfig,
    as_of: DateTime<Utc>,
    by_category: &QueryBatch,
    top_products: &QueryBatch,
    cohorts: &QueryBatch,
    funnel: &QueryBatch,
    daily: &QueryBatch,
) -> Result<DashboardContext> {
    let revenues = by_category.column_f64("revenue");
    let total_revenue: f64 = revenues.iter().sum();
    let total_orders: i64 = by_category.column_i64("order_count").iter().sum();
    let total_margin: f64 = by_category.column_f64("total_margin").iter().sum();
    // The headline average is the mean of the per-category averages, not a
    // re-aggregation over line items.
    let category_averages = by_category.column_f64("avg_order_value");
    let avg_order_value = if category_averages.is_empty() {
        0.0
    } else {
        category_averages.iter().sum::<f64>() / category_averages.len() as f64
    };

    let top_category_revenue = cell_f64(by_category, 0, "revenue");
    let top_category_share = if total_revenue > 0.0 {
        100.0 * top_category_revenue / total_revenue
    } else {
        0.0
    };

    let margins: Vec<f64> = top_products
        .column_f64("margin_pct")
        .iter()
        .map(|m| m * 100.0)
        .collect();
    let margin_min = margins.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let margin_max = margins.iter().copied().reduce(f64::max).unwrap_or(0.0);

    let purchase_users = stage_users(funnel, "purchase");
    let all_users = funnel.column_i64("user_count").into_iter().max().unwrap_or(0);
    let conversion = if all_users > 0 {
        100.0 * purchase_users as f64 / all_users as f64
    } else {
        0.0
    };

    let product_rows: Vec<ProductRow> = (0..top_products
        .row_count()
        .min(config.top_products_limit))
        .map(|i| ProductRow {
            name: cell_str(top_products, i, "name"),
            revenue: money0(cell_f64(top_products, i, "revenue")),
            margin: format!("{:.1}", cell_f64(top_products, i, "margin_pct") * 100.0),
        })
        .collect();

    // The daily series arrives newest first; the time axis wants it ascending
    let mut dates = daily.column_str("order_date");
    dates.reverse();
    let mut daily_revenues = daily.column_f64("revenue");
    daily_revenues.reverse();

    Ok(DashboardContext {
        title: config.title.clone(),
        subtitle: "Batch analytics from an embedded SQLite warehouse".to_string(),
        generated_at: as_of.to_rfc3339(),
        total_revenue: money0(total_revenue),
        total_orders: thousands(total_orders),
        avg_order_value: money2(avg_order_value),
        total_margin: money0(total_margin),
        top_category_name: cell_str(by_category, 0, "category"),
        top_category_revenue: money0(top_category_revenue),
        top_category_orders: cell_i64(by_category, 0, "order_count"),
        top_category_share: format!("{top_category_share:.1}"),
        top_product_name: cell_str(top_products, 0, "name"),
        top_product_revenue: money0(cell_f64(top_products, 0, "revenue")),
        top_product_margin: format!("{:.1}", cell_f64(top_products, 0, "margin_pct") * 100.0),
        newest_cohort_users: cell_i64(cohorts, 0, "user_count"),
        newest_cohort_avg_order: money2(cell_f64(cohorts, 0, "avg_order_value")),
        conversion: format!("{conversion:.1}"),
        purchase_users,
        all_users,
        category_count: by_category.row_count(),
        margin_min: format!("{margin_min:.1}"),
        margin_max: format!("{margin_max:.1}"),
        top_products_limit: config.top_products_limit,
        top_products: product_rows,
        chart1_json: serde_json::to_string(&CategoryChart {
            categories: by_category.column_str("category"),
            revenues,
        })?,
        chart2_json: serde_json::to_string(&CohortChart {
            cohorts: cohorts.column_str("cohort"),
            users: cohorts.column_i64("user_count"),
            orders: cohorts.column_i64("total_orders"),
        })?,
        chart3_json: serde_json::to_string(&FunnelChart {
            stages: funnel.column_str("event_type"),
            users: funnel.column_i64("user_count"),
        })?,
        chart4_json: serde_json::to_string(&DailyChart {
            dates,
            revenues: daily_revenues,
        })?,
    })
}

/// Distinct users that reached a funnel stage, zero when the stage never
/// occurred.
fn stage_users(funnel: &QueryBatch, stage: &str) -> i64 {
    for row in 0..funnel.row_count() {
        if funnel.value(row, "event_type").and_then(|v| v.as_str()) == Some(stage) {
            return funnel
                .value(row, "user_count")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
        }
    }
    0
}

fn cell_f64(batch: &QueryBatch, row: usize, column: &str) -> f64 {
    batch
        .value(row, column)
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0)
}

fn cell_i64(batch: &QueryBatch, row: usize, column: &str) -> i64 {
    batch
        .value(row, column)
        .and_then(|v| v.as_i64())
        .unwrap_or(0)
}

fn cell_str(batch: &QueryBatch, row: usize, column: &str) -> String {
    batch
        .value(row, column)
        .and_then(|v| v.as_str())
        .unwrap_or("n/a")
        .to_string()
}

/// 1234567 -> "1,234,567".
fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

/// Whole-dollar display money: "$1,234,567".
fn money0(v: f64) -> String {
    let sign = if v < 0.0 { "-" } else { "" };
    format!("{sign}${}", thousands(v.abs().round() as i64))
}

/// Cent-precision display money: "$1,234.56".
fn money2(v: f64) -> String {
    let sign = if v < 0.0 { "-" } else { "" };
    let cents = (v.abs() * 100.0).round() as i64;
    format!("{sign}${}.{:02}", thousands(cents / 100), cents % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::build_models;

    fn anchor() -> DateTime<Utc> {
        chrono::DateTime::parse_from_rfc3339("2024-06-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn seeded_marts() -> Warehouse {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.execute_batch(
            "CREATE TABLE raw_users (id INTEGER, email TEXT, first_name TEXT, last_name TEXT, created_at TEXT, country TEXT, state TEXT);
             INSERT INTO raw_users VALUES
               (1, 'a@example.com', 'Jane', 'Smith', '2024-06-05T12:00:00', 'US', 'CA'),
               (2, 'b@example.com', 'Bob', 'Jones', '2024-06-05T00:00:00', 'UK', 'NY');

             CREATE TABLE raw_products (id INTEGER, name TEXT, category TEXT, price REAL, cost REAL, created_at TEXT);
             INSERT INTO raw_products VALUES
               (1, 'Product 1', 'Books', 100.0, 60.0, '2024-01-01T00:00:00'),
               (2, 'Product 2', 'Sports', 19.99, 5.0, '2024-01-02T00:00:00');

             CREATE TABLE raw_orders (id INTEGER, user_id INTEGER, order_date TEXT, status TEXT, total_amount REAL);
             INSERT INTO raw_orders VALUES
               (1, 1, '2024-06-01T09:00:00', 'completed', 150.0),
               (2, 2, '2024-06-02T09:00:00', 'pending', 80.0);

             CREATE TABLE raw_order_items (id INTEGER, order_id INTEGER, product_id INTEGER, quantity INTEGER, unit_price REAL);
             INSERT INTO raw_order_items VALUES
               (1, 1, 1, 3, 100.0),
               (2, 1, 2, 1, 19.99),
               (3, 2, 1, 1, 100.0);

             CREATE TABLE raw_events (id INTEGER, user_id INTEGER, event_type TEXT, event_date TEXT, page TEXT);
             INSERT INTO raw_events VALUES
               (1, 1, 'page_view', '2024-06-01T10:00:00', '/home'),
               (2, 1, 'purchase', '2024-06-01T10:05:00', '/checkout'),
               (3, 2, 'page_view', '2024-06-03T10:00:00', '/home');",
        )
        .unwrap();
        build_models(&wh, anchor()).unwrap();
        wh
    }

    #[test]
    fn test_thousands_grouping() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(1234567), "1,234,567");
    }

    #[test]
    fn test_money_formats() {
        assert_eq!(money0(1234567.4), "$1,234,567");
        assert_eq!(money0(999.5), "$1,000");
        assert_eq!(money2(1234.5), "$1,234.50");
        assert_eq!(money2(0.0), "$0.00");
    }

    #[test]
    fn test_render_contains_metrics_and_charts() {
        let wh = seeded_marts();
        let html = render_dashboard(&wh, &DashboardConfig::default(), anchor()).unwrap();

        assert!(html.contains("<title>eCommerce Analytics Dashboard</title>"));
        // 300.00 + 19.99 completed revenue, shown in whole dollars
        assert!(html.contains("$320"));
        assert!(html.contains("cdn.plot.ly"));
        assert!(html.contains("var chart1 ="));
        assert!(html.contains(r#""categories":["Books","Sports"]"#));
        // 1 of 2 users purchased
        assert!(html.contains("50.0%"));
        // Nothing un-rendered survives
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_render_table_respects_limit() {
        let wh = seeded_marts();
        let config = DashboardConfig {
            title: "Mart".to_string(),
            top_products_limit: 1,
        };
        let html = render_dashboard(&wh, &config, anchor()).unwrap();
        assert!(html.contains("<td>Product 1</td>"));
        assert!(!html.contains("<td>Product 2</td>"));
    }

    #[test]
    fn test_render_requires_marts() {
        let wh = Warehouse::open_in_memory().unwrap();
        let err = render_dashboard(&wh, &DashboardConfig::default(), anchor()).unwrap_err();
        assert!(err.to_string().contains("dashboard"));
        assert!(err.to_string().contains("dim_users"));
    }

    #[test]
    fn test_render_empty_marts_zeroes_metrics() {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.execute_batch(
            "CREATE TABLE raw_users (id INTEGER, email TEXT, first_name TEXT, last_name TEXT, created_at TEXT, country TEXT, state TEXT);
             CREATE TABLE raw_products (id INTEGER, name TEXT, category TEXT, price REAL, cost REAL, created_at TEXT);
             CREATE TABLE raw_orders (id INTEGER, user_id INTEGER, order_date TEXT, status TEXT, total_amount REAL);
             CREATE TABLE raw_order_items (id INTEGER, order_id INTEGER, product_id INTEGER, quantity INTEGER, unit_price REAL);
             CREATE TABLE raw_events (id INTEGER, user_id INTEGER, event_type TEXT, event_date TEXT, page TEXT);",
        )
        .unwrap();
        build_models(&wh, anchor()).unwrap();

        let html = render_dashboard(&wh, &DashboardConfig::default(), anchor()).unwrap();
        assert!(html.contains("$0"));
        assert!(html.contains("0.0%"));
        assert!(html.contains("n/a"));
    }

    #[test]
    fn test_write_dashboard_creates_file() {
        let wh = seeded_marts();
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dashboard.html");
        write_dashboard(&wh, &DashboardConfig::default(), anchor(), &path).unwrap();

        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
    }
}
