//! The reporting query catalog.
//!
//! Each entry is a named, parameterless aggregation query over the mart
//! layer, persisted as a standalone `.sql` file plus a manifest so a
//! presentation layer loads query text by name instead of embedding SQL.
//! Queries that sum revenue or margin all filter `order_status =
//! 'completed'`; pending and cancelled orders never count toward financial
//! metrics. Grouped outputs (cohorts, funnel stages, price tiers) are
//! ordered by their business sequence, not alphabetically.
//!
//! Query text carries the same `{{as_of}}` placeholder the model layer
//! uses. Substituting the run anchor at persist time keeps the written
//! artifacts parameterless and reproducible.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::Result;
use crate::persistence::{atomic_write, atomic_write_json};
use crate::schema::TIMESTAMP_FORMAT;
use crate::warehouse::Warehouse;

/// One catalog entry: the query plus the metadata the manifest carries.
#[derive(Debug, Clone, Copy)]
pub struct CatalogQuery {
    pub name: &'static str,
    pub description: &'static str,
    pub use_case: &'static str,
    pub chart_type: &'static str,
    /// Query text with the `{{as_of}}` placeholder where the run anchor is
    /// needed.
    pub template: &'static str,
}

impl CatalogQuery {
    /// Name of the persisted query file.
    pub fn file_name(&self) -> String {
        format!("{}.sql", self.name)
    }

    /// Executable SQL with the run anchor substituted in.
    pub fn sql(&self, as_of: &str) -> String {
        self.template.replace("{{as_of}}", as_of)
    }
}

pub const REVENUE_BY_CATEGORY: CatalogQuery = CatalogQuery {
    name: "revenue_by_category",
    description: "Revenue broken down by product category",
    use_case: "Category performance analysis",
    chart_type: "Bar chart",
    template: r"SELECT
    p.category,
    COUNT(DISTINCT o.order_id) AS order_count,
    COUNT(*) AS line_items,
    ROUND(SUM(o.line_total), 2) AS revenue,
    ROUND(AVG(o.line_total), 2) AS avg_order_value,
    ROUND(SUM(o.margin_dollars), 2) AS total_margin
FROM fct_orders o
JOIN dim_products p ON o.product_id = p.product_id
WHERE o.order_status = 'completed'
GROUP BY p.category
ORDER BY revenue DESC",
};

pub const TOP_PRODUCTS: CatalogQuery = CatalogQuery {
    name: "top_products",
    description: "Top 10 products by revenue",
    use_case: "Product performance",
    chart_type: "Table",
    template: r"SELECT
    p.product_id,
    p.name,
    p.category,
    ROUND(p.price, 2) AS price,
    COUNT(DISTINCT o.order_id) AS orders,
    SUM(o.quantity) AS units_sold,
    ROUND(SUM(o.line_total), 2) AS revenue,
    ROUND(SUM(o.margin_dollars), 2) AS total_margin,
    ROUND(SUM(o.margin_dollars) / SUM(o.line_total), 3) AS margin_pct
FROM fct_orders o
JOIN dim_products p ON o.product_id = p.product_id
WHERE o.order_status = 'completed'
GROUP BY p.product_id, p.name, p.category, p.price
ORDER BY revenue DESC
LIMIT 10",
};

pub const USER_COHORT: CatalogQuery = CatalogQuery {
    name: "user_cohort",
    description: "User behavior by account age cohort",
    use_case: "Cohort analysis and retention",
    chart_type: "Bar/Line chart",
    template: r"SELECT
    CASE
        WHEN u.account_age_days <= 30 THEN '0-30 days'
        WHEN u.account_age_days <= 90 THEN '31-90 days'
        WHEN u.account_age_days <= 180 THEN '91-180 days'
        ELSE '180+ days'
    END AS cohort,
    COUNT(DISTINCT u.user_id) AS user_count,
    COUNT(DISTINCT o.order_id) AS total_orders,
    ROUND(AVG(o.line_total), 2) AS avg_order_value,
    ROUND(SUM(o.line_total), 2) AS total_revenue
FROM dim_users u
LEFT JOIN fct_orders o ON u.user_id = o.user_id AND o.order_status = 'completed'
GROUP BY cohort
ORDER BY
    CASE
        WHEN cohort = '0-30 days' THEN 1
        WHEN cohort = '31-90 days' THEN 2
        WHEN cohort = '91-180 days' THEN 3
        ELSE 4
    END",
};

pub const EVENT_FUNNEL: CatalogQuery = CatalogQuery {
    name: "event_funnel",
    description: "User journey through event types",
    use_case: "Funnel analysis and conversion",
    chart_type: "Funnel chart",
    template: r"SELECT
    event_type,
    COUNT(DISTINCT user_id) AS user_count,
    COUNT(*) AS event_count,
    ROUND(100.0 * COUNT(DISTINCT user_id) /
        (SELECT COUNT(DISTINCT user_id) FROM fct_events), 1) AS pct_all_users
FROM fct_events
GROUP BY event_type
ORDER BY
    CASE
        WHEN event_type = 'page_view' THEN 1
        WHEN event_type = 'product_view' THEN 2
        WHEN event_type = 'search' THEN 3
        WHEN event_type = 'add_to_cart' THEN 4
        WHEN event_type = 'purchase' THEN 5
        ELSE 6
    END",
};

pub const DAILY_REVENUE: CatalogQuery = CatalogQuery {
    name: "daily_revenue",
    description: "Revenue trend over time",
    use_case: "Time series analysis",
    chart_type: "Line chart",
    template: r"SELECT
    DATE(o.order_date) AS order_date,
    COUNT(DISTINCT o.order_id) AS orders,
    SUM(o.quantity) AS units,
    ROUND(SUM(o.line_total), 2) AS revenue,
    ROUND(SUM(o.margin_dollars), 2) AS margin
FROM fct_orders o
WHERE o.order_status = 'completed'
GROUP BY DATE(o.order_date)
ORDER BY order_date DESC
LIMIT 30",
};

pub const CUSTOMER_LIFETIME_VALUE: CatalogQuery = CatalogQuery {
    name: "customer_lifetime_value",
    description: "Customer lifetime value with purchase history",
    use_case: "Customer segmentation and retention",
    chart_type: "Table/Scatter plot",
    template: r"SELECT
    u.user_id,
    u.email,
    u.created_at,
    COUNT(DISTINCT o.order_id) AS total_orders,
    ROUND(SUM(o.line_total), 2) AS lifetime_revenue,
    ROUND(AVG(o.line_total), 2) AS avg_order_value,
    ROUND(SUM(o.margin_dollars), 2) AS lifetime_margin,
    ROUND(100.0 * SUM(o.margin_dollars) / SUM(o.line_total), 1) AS margin_pct,
    MAX(o.order_date) AS last_purchase_date,
    CAST(ROUND(julianday('{{as_of}}') - julianday(MAX(o.order_date))) AS INTEGER) AS days_since_last_order
FROM dim_users u
LEFT JOIN fct_orders o ON u.user_id = o.user_id AND o.order_status = 'completed'
GROUP BY u.user_id, u.email, u.created_at
ORDER BY lifetime_revenue DESC
LIMIT 100",
};

pub const CATEGORY_BY_MONTH: CatalogQuery = CatalogQuery {
    name: "category_by_month",
    description: "Category performance broken down by month",
    use_case: "Month-over-month trend analysis",
    chart_type: "Grouped bar chart",
    template: r"SELECT
    strftime('%Y-%m', o.order_date) AS month,
    p.category,
    COUNT(DISTINCT o.order_id) AS orders,
    SUM(o.quantity) AS units_sold,
    ROUND(SUM(o.line_total), 2) AS revenue,
    ROUND(SUM(o.margin_dollars), 2) AS margin,
    ROUND(SUM(o.margin_dollars) / SUM(o.line_total), 3) AS margin_pct
FROM fct_orders o
JOIN dim_products p ON o.product_id = p.product_id
WHERE o.order_status = 'completed'
GROUP BY strftime('%Y-%m', o.order_date), p.category
ORDER BY month DESC, revenue DESC",
};

pub const PRODUCT_PRICE_TIERS: CatalogQuery = CatalogQuery {
    name: "product_price_tiers",
    description: "Product performance segmented by price range",
    use_case: "Price strategy and margin analysis",
    chart_type: "Bar chart",
    template: r"SELECT
    CASE
        WHEN p.price < 50 THEN 'Budget (<$50)'
        WHEN p.price < 150 THEN 'Mid-Range ($50-150)'
        WHEN p.price < 300 THEN 'Premium ($150-300)'
        ELSE 'Luxury ($300+)'
    END AS price_tier,
    COUNT(DISTINCT p.product_id) AS product_count,
    COUNT(DISTINCT o.order_id) AS orders,
    SUM(o.quantity) AS units_sold,
    ROUND(SUM(o.line_total), 2) AS revenue,
    ROUND(AVG(o.line_total), 2) AS avg_order_value,
    ROUND(SUM(o.margin_dollars), 2) AS total_margin,
    ROUND(100.0 * SUM(o.margin_dollars) / SUM(o.line_total), 1) AS margin_pct
FROM fct_orders o
JOIN dim_products p ON o.product_id = p.product_id
WHERE o.order_status = 'completed'
GROUP BY price_tier
ORDER BY
    CASE
        WHEN price_tier = 'Budget (<$50)' THEN 1
        WHEN price_tier = 'Mid-Range ($50-150)' THEN 2
        WHEN price_tier = 'Premium ($150-300)' THEN 3
        ELSE 4
    END",
};

/// Every catalog entry, in manifest order.
pub const CATALOG: &[CatalogQuery] = &[
    REVENUE_BY_CATEGORY,
    TOP_PRODUCTS,
    USER_COHORT,
    EVENT_FUNNEL,
    DAILY_REVENUE,
    CUSTOMER_LIFETIME_VALUE,
    CATEGORY_BY_MONTH,
    PRODUCT_PRICE_TIERS,
];

/// Look up a catalog entry by name.
pub fn find(name: &str) -> Option<&'static CatalogQuery> {
    CATALOG.iter().find(|q| q.name == name)
}

/// Execution outcome of one catalog query.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogResult {
    pub name: String,
    pub rows: usize,
}

/// Execute every catalog query against the warehouse.
///
/// This is the catalog's validation pass: a query that no longer matches
/// the mart layer fails here, before anything is persisted.
pub fn run_catalog(warehouse: &Warehouse, as_of: DateTime<Utc>) -> Result<Vec<CatalogResult>> {
    let anchor = as_of.format(TIMESTAMP_FORMAT).to_string();
    let mut results = Vec::with_capacity(CATALOG.len());

    for query in CATALOG {
        let batch = warehouse.query(&query.sql(&anchor))?;
        debug!(query = query.name, rows = batch.row_count(), "Validated catalog query");
        results.push(CatalogResult {
            name: query.name.to_string(),
            rows: batch.row_count(),
        });
    }

    info!("Validated {} catalog queries", results.len());
    Ok(results)
}

/// The manifest written to `queries.json`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogManifest {
    pub generated_at: String,
    pub queries: BTreeMap<String, QueryInfo>,
    pub notes: String,
}

/// Per-query manifest metadata. The query text itself lives in the
/// referenced file.
#[derive(Debug, Clone, Serialize)]
pub struct QueryInfo {
    pub description: String,
    pub use_case: String,
    pub chart_type: String,
    pub file: String,
}

/// Persist the catalog: one `.sql` file per query under `queries/`, plus
/// the `queries.json` manifest next to it.
pub fn write_catalog(out_dir: &Path, as_of: DateTime<Utc>) -> Result<()> {
    let anchor = as_of.format(TIMESTAMP_FORMAT).to_string();
    let queries_dir = out_dir.join("queries");

    let mut entries = BTreeMap::new();
    for query in CATALOG {
        let path = queries_dir.join(query.file_name());
        atomic_write(&path, format!("{}\n", query.sql(&anchor)).as_bytes())?;
        entries.insert(
            query.name.to_string(),
            QueryInfo {
                description: query.description.to_string(),
                use_case: query.use_case.to_string(),
                chart_type: query.chart_type.to_string(),
                file: query.file_name(),
            },
        );
    }

    let manifest = CatalogManifest {
        generated_at: as_of.to_rfc3339(),
        queries: entries,
        notes: "All queries validated against the warehouse and saved as standalone SQL files."
            .to_string(),
    };
    atomic_write_json(&out_dir.join("queries.json"), &manifest)?;

    info!(
        dir = %queries_dir.display(),
        count = CATALOG.len(),
        "Wrote query catalog"
    );
    Ok(())
}
