//! The declarative model registry.
//!
//! Every transformation the pipeline performs is described here as data: a
//! model's layer, grain, source relations, and per-column SQL expressions.
//! The executable `CREATE VIEW` statements and the generated documentation
//! are both derived from this one table, so the two can never drift apart.
//!
//! Views are full replacements (`DROP VIEW IF EXISTS` then `CREATE VIEW`),
//! created in registry order: staging first, then marts. Expressions that
//! need the run anchor write the `{{as_of}}` placeholder, which is
//! substituted with the pipeline's anchor timestamp at creation time, so a
//! rebuild over the same raw data with the same anchor is bit-identical.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ModelError, Result};
use crate::schema::TIMESTAMP_FORMAT;
use crate::warehouse::Warehouse;

/// Which layer of the mart a model belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Staging,
    Dimension,
    Fact,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Staging => write!(f, "staging"),
            Layer::Dimension => write!(f, "dimension"),
            Layer::Fact => write!(f, "fact"),
        }
    }
}

/// One output column of a model.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    /// SQL expression the column is computed from. When it equals the name,
    /// the column is a plain passthrough and no alias is emitted.
    pub expr: &'static str,
    pub description: &'static str,
}

/// Declarative description of one model view.
#[derive(Debug, Clone, Copy)]
pub struct ModelSpec {
    pub name: &'static str,
    pub layer: Layer,
    pub description: &'static str,
    /// What one row represents.
    pub grain: &'static str,
    /// Relations this model reads. Checked for existence before the view is
    /// created.
    pub sources: &'static [&'static str],
    /// FROM/JOIN clause following the column list.
    pub from_clause: &'static str,
    pub columns: &'static [ColumnSpec],
    /// Analytic questions this model answers. Empty for staging models,
    /// which exist to feed the marts rather than to be queried.
    pub use_case: &'static str,
    /// Extra behavioral note surfaced in the documentation. Empty when the
    /// model has nothing surprising to say.
    pub notes: &'static str,
}

impl ModelSpec {
    /// The DROP statement preceding every (re)build of this view.
    pub fn drop_sql(&self) -> String {
        format!("DROP VIEW IF EXISTS {}", self.name)
    }

    /// The CREATE VIEW statement with the run anchor substituted in.
    pub fn create_sql(&self, as_of: &str) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.expr == c.name {
                    format!("    {}", c.name)
                } else {
                    format!("    {} AS {}", c.expr, c.name)
                }
            })
            .collect();
        format!(
            "CREATE VIEW {} AS\nSELECT\n{}\nFROM {}",
            self.name,
            columns.join(",\n"),
            self.from_clause
        )
        .replace("{{as_of}}", as_of)
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }
}

/// All models, in build order. Staging views read raw tables; mart views
/// read staging.
pub const MODELS: &[ModelSpec] = &[
    ModelSpec {
        name: "stg_users",
        layer: Layer::Staging,
        description: "Typed users with account age relative to the run anchor",
        grain: "one row per user",
        sources: &["raw_users"],
        from_clause: "raw_users",
        columns: &[
            ColumnSpec {
                name: "user_id",
                expr: "id",
                description: "Natural key of the user",
            },
            ColumnSpec {
                name: "email",
                expr: "email",
                description: "Login email address",
            },
            ColumnSpec {
                name: "first_name",
                expr: "first_name",
                description: "Given name",
            },
            ColumnSpec {
                name: "last_name",
                expr: "last_name",
                description: "Family name",
            },
            ColumnSpec {
                name: "created_at",
                expr: "created_at",
                description: "Account creation timestamp, ISO-8601 text",
            },
            ColumnSpec {
                name: "account_age_days",
                expr: "CAST(julianday('{{as_of}}') - julianday(created_at) AS INTEGER)",
                description: "Whole days between account creation and the run anchor",
            },
            ColumnSpec {
                name: "country",
                expr: "country",
                description: "Country code",
            },
            ColumnSpec {
                name: "state",
                expr: "state",
                description: "State or region code",
            },
        ],
        use_case: "",
        notes: "",
    },
    ModelSpec {
        name: "stg_products",
        layer: Layer::Staging,
        description: "Typed products with money-rounded price, cost and margin ratio",
        grain: "one row per product",
        sources: &["raw_products"],
        from_clause: "raw_products",
        columns: &[
            ColumnSpec {
                name: "product_id",
                expr: "id",
                description: "Natural key of the product",
            },
            ColumnSpec {
                name: "name",
                expr: "name",
                description: "Display name",
            },
            ColumnSpec {
                name: "category",
                expr: "category",
                description: "Merchandising category",
            },
            ColumnSpec {
                name: "price",
                expr: "ROUND(CAST(price AS REAL), 2)",
                description: "List price, two decimal places",
            },
            ColumnSpec {
                name: "cost",
                expr: "ROUND(CAST(cost AS REAL), 2)",
                description: "Unit cost, two decimal places",
            },
            ColumnSpec {
                name: "margin",
                expr: "ROUND((price - cost) / price, 3)",
                description: "Margin ratio (price - cost) / price, three decimal places",
            },
            ColumnSpec {
                name: "created_at",
                expr: "created_at",
                description: "Catalog entry timestamp",
            },
        ],
        use_case: "",
        notes: "The load guard rejects non-positive prices, so the margin denominator is never zero.",
    },
    ModelSpec {
        name: "stg_orders",
        layer: Layer::Staging,
        description: "Typed order headers with money-rounded totals",
        grain: "one row per order",
        sources: &["raw_orders"],
        from_clause: "raw_orders",
        columns: &[
            ColumnSpec {
                name: "order_id",
                expr: "id",
                description: "Natural key of the order",
            },
            ColumnSpec {
                name: "user_id",
                expr: "user_id",
                description: "Ordering user",
            },
            ColumnSpec {
                name: "order_date",
                expr: "order_date",
                description: "Order placement timestamp",
            },
            ColumnSpec {
                name: "status",
                expr: "status",
                description: "Order status: completed, pending or cancelled",
            },
            ColumnSpec {
                name: "total_amount",
                expr: "ROUND(CAST(total_amount AS REAL), 2)",
                description: "Order header total, two decimal places",
            },
        ],
        use_case: "",
        notes: "",
    },
    ModelSpec {
        name: "stg_order_items",
        layer: Layer::Staging,
        description: "Typed order line items with computed line totals",
        grain: "one row per order line item",
        sources: &["raw_order_items"],
        from_clause: "raw_order_items",
        columns: &[
            ColumnSpec {
                name: "order_item_id",
                expr: "id",
                description: "Natural key of the line item",
            },
            ColumnSpec {
                name: "order_id",
                expr: "order_id",
                description: "Parent order",
            },
            ColumnSpec {
                name: "product_id",
                expr: "product_id",
                description: "Purchased product",
            },
            ColumnSpec {
                name: "quantity",
                expr: "quantity",
                description: "Units purchased",
            },
            ColumnSpec {
                name: "unit_price",
                expr: "ROUND(CAST(unit_price AS REAL), 2)",
                description: "Price per unit at order time, two decimal places",
            },
            ColumnSpec {
                name: "line_total",
                expr: "ROUND(quantity * ROUND(CAST(unit_price AS REAL), 2), 2)",
                description: "quantity times the money-rounded unit price",
            },
        ],
        use_case: "",
        notes: "unit_price is rounded to the money type before multiplication, matching how it will be reported.",
    },
    ModelSpec {
        name: "stg_events",
        layer: Layer::Staging,
        description: "Typed behavioral events",
        grain: "one row per event",
        sources: &["raw_events"],
        from_clause: "raw_events",
        columns: &[
            ColumnSpec {
                name: "event_id",
                expr: "id",
                description: "Natural key of the event",
            },
            ColumnSpec {
                name: "user_id",
                expr: "user_id",
                description: "Acting user",
            },
            ColumnSpec {
                name: "event_type",
                expr: "event_type",
                description: "One of page_view, add_to_cart, purchase, search, product_view",
            },
            ColumnSpec {
                name: "event_date",
                expr: "event_date",
                description: "Event timestamp",
            },
            ColumnSpec {
                name: "page",
                expr: "page",
                description: "Page path the event occurred on",
            },
        ],
        use_case: "",
        notes: "",
    },
    ModelSpec {
        name: "dim_users",
        layer: Layer::Dimension,
        description: "User dimension",
        grain: "one row per user",
        sources: &["stg_users"],
        from_clause: "stg_users",
        columns: &[
            ColumnSpec {
                name: "user_id",
                expr: "user_id",
                description: "Natural key of the user",
            },
            ColumnSpec {
                name: "email",
                expr: "email",
                description: "Login email address",
            },
            ColumnSpec {
                name: "first_name",
                expr: "first_name",
                description: "Given name",
            },
            ColumnSpec {
                name: "last_name",
                expr: "last_name",
                description: "Family name",
            },
            ColumnSpec {
                name: "created_at",
                expr: "created_at",
                description: "Account creation timestamp",
            },
            ColumnSpec {
                name: "account_age_days",
                expr: "account_age_days",
                description: "Whole days between account creation and the run anchor",
            },
            ColumnSpec {
                name: "country",
                expr: "country",
                description: "Country code",
            },
            ColumnSpec {
                name: "state",
                expr: "state",
                description: "State or region code",
            },
        ],
        use_case: "User analysis, segmentation, cohort analysis",
        notes: "Stable naming layer over staging; consumers join against this, never against stg_ views.",
    },
    ModelSpec {
        name: "dim_products",
        layer: Layer::Dimension,
        description: "Product dimension",
        grain: "one row per product",
        sources: &["stg_products"],
        from_clause: "stg_products",
        columns: &[
            ColumnSpec {
                name: "product_id",
                expr: "product_id",
                description: "Natural key of the product",
            },
            ColumnSpec {
                name: "name",
                expr: "name",
                description: "Display name",
            },
            ColumnSpec {
                name: "category",
                expr: "category",
                description: "Merchandising category",
            },
            ColumnSpec {
                name: "price",
                expr: "price",
                description: "List price",
            },
            ColumnSpec {
                name: "cost",
                expr: "cost",
                description: "Unit cost",
            },
            ColumnSpec {
                name: "margin",
                expr: "margin",
                description: "Margin ratio",
            },
            ColumnSpec {
                name: "created_at",
                expr: "created_at",
                description: "Catalog entry timestamp",
            },
        ],
        use_case: "Product analysis, margin analysis, category performance",
        notes: "Stable naming layer over staging; consumers join against this, never against stg_ views.",
    },
    ModelSpec {
        name: "fct_orders",
        layer: Layer::Fact,
        description: "Order line items joined to their order and product",
        grain: "one row per order line item",
        sources: &["stg_order_items", "stg_orders", "stg_products"],
        from_clause: "stg_order_items oi\nJOIN stg_orders o ON oi.order_id = o.order_id\nJOIN stg_products p ON oi.product_id = p.product_id",
        columns: &[
            ColumnSpec {
                name: "order_item_id",
                expr: "oi.order_item_id",
                description: "Natural key of the line item",
            },
            ColumnSpec {
                name: "order_id",
                expr: "o.order_id",
                description: "Parent order",
            },
            ColumnSpec {
                name: "user_id",
                expr: "o.user_id",
                description: "Ordering user",
            },
            ColumnSpec {
                name: "product_id",
                expr: "oi.product_id",
                description: "Purchased product",
            },
            ColumnSpec {
                name: "quantity",
                expr: "oi.quantity",
                description: "Units purchased",
            },
            ColumnSpec {
                name: "unit_price",
                expr: "oi.unit_price",
                description: "Price per unit at order time",
            },
            ColumnSpec {
                name: "line_total",
                expr: "oi.line_total",
                description: "Revenue of this line",
            },
            ColumnSpec {
                name: "order_total",
                expr: "o.total_amount",
                description: "Total of the parent order header",
            },
            ColumnSpec {
                name: "order_status",
                expr: "o.status",
                description: "Status of the parent order",
            },
            ColumnSpec {
                name: "order_date",
                expr: "o.order_date",
                description: "Placement timestamp of the parent order",
            },
            ColumnSpec {
                name: "margin_dollars",
                expr: "ROUND((p.price - p.cost) * oi.quantity, 2)",
                description: "Absolute margin of this line at current catalog prices",
            },
        ],
        use_case: "Revenue analysis, product performance, margin analysis, order metrics",
        notes: "Inner joins: a line item whose order or product is missing upstream is silently dropped from this fact.",
    },
    ModelSpec {
        name: "fct_events",
        layer: Layer::Fact,
        description: "Behavioral events with a per-user sequence number",
        grain: "one row per event",
        sources: &["stg_events"],
        from_clause: "stg_events",
        columns: &[
            ColumnSpec {
                name: "event_id",
                expr: "event_id",
                description: "Natural key of the event",
            },
            ColumnSpec {
                name: "user_id",
                expr: "user_id",
                description: "Acting user",
            },
            ColumnSpec {
                name: "event_type",
                expr: "event_type",
                description: "Behavioral event type",
            },
            ColumnSpec {
                name: "event_date",
                expr: "event_date",
                description: "Event timestamp",
            },
            ColumnSpec {
                name: "page",
                expr: "page",
                description: "Page path the event occurred on",
            },
            ColumnSpec {
                name: "event_sequence",
                expr: "ROW_NUMBER() OVER (PARTITION BY user_id ORDER BY event_date, event_id)",
                description: "Position of this event in the user's history, starting at 1",
            },
        ],
        use_case: "Funnel analysis, user journey, conversion tracking",
        notes: "Same-timestamp ties are broken by event_id, so the sequence is deterministic.",
    },
];

/// Models belonging to one layer, in registry order.
pub fn models_in(layer: Layer) -> impl Iterator<Item = &'static ModelSpec> {
    MODELS.iter().filter(move |m| m.layer == layer)
}

/// Look up a model by name.
pub fn find(name: &str) -> Option<&'static ModelSpec> {
    MODELS.iter().find(|m| m.name == name)
}

/// A model view that was just (re)created, with its current row count.
#[derive(Debug, Clone, Serialize)]
pub struct BuiltModel {
    pub name: String,
    pub layer: Layer,
    pub rows: i64,
}

/// Drop and recreate every model view in registry order.
///
/// Each model's declared sources are checked for existence first, so a
/// missing upstream surfaces as a named dependency error instead of a raw
/// SQL failure from deep inside the view.
pub fn build_models(warehouse: &Warehouse, as_of: DateTime<Utc>) -> Result<Vec<BuiltModel>> {
    let anchor = as_of.format(TIMESTAMP_FORMAT).to_string();
    let mut built = Vec::with_capacity(MODELS.len());

    for model in MODELS {
        for source in model.sources {
            if !warehouse.relation_exists(source)? {
                return Err(ModelError::MissingDependency {
                    relation: source.to_string(),
                    needed_by: model.name.to_string(),
                }
                .into());
            }
        }
        warehouse.execute_batch(&format!(
            "{};\n{};",
            model.drop_sql(),
            model.create_sql(&anchor)
        ))?;
        let rows = warehouse.count(model.name)?;
        debug!(model = model.name, layer = %model.layer, rows, "Created view");
        built.push(BuiltModel {
            name: model.name.to_string(),
            layer: model.layer,
            rows,
        });
    }

    info!("Built {} model views", built.len());
    Ok(built)
}
