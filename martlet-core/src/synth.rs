//! Seeded synthetic source generator.
//!
//! Writes the five raw CSV files the loader ingests. All randomness flows
//! from one `StdRng` seeded from config, so the same seed and anchor always
//! produce byte-identical files. Order line items price at the referenced
//! product's list price, which is what makes the line_total arithmetic
//! downstream checkable.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::Serialize;
use tracing::info;

use crate::config::SynthConfig;
use crate::error::Result;
use crate::persistence::atomic_write;
use crate::schema::TIMESTAMP_FORMAT;

/// The closed set of behavioral event types.
pub const EVENT_TYPES: &[&str] = &[
    "page_view",
    "add_to_cart",
    "purchase",
    "search",
    "product_view",
];

const FIRST_NAMES: &[&str] = &["John", "Jane", "Bob", "Alice", "Charlie", "Diana"];
const LAST_NAMES: &[&str] = &["Smith", "Johnson", "Williams", "Brown", "Jones"];
const COUNTRIES: &[&str] = &["US", "UK", "CA", "DE", "FR"];
const STATES: &[&str] = &["CA", "NY", "TX", "FL", "IL", "PA", "OH"];
const CATEGORIES: &[&str] = &["Electronics", "Clothing", "Home & Garden", "Sports", "Books"];
const ORDER_STATUSES: &[&str] = &["completed", "pending", "cancelled"];
const PAGES: &[&str] = &["/home", "/products", "/cart", "/checkout", "/account"];

/// Row counts of the files written by one generator invocation.
#[derive(Debug, Clone, Serialize)]
pub struct SynthReport {
    pub users: usize,
    pub products: usize,
    pub orders: usize,
    pub order_items: usize,
    pub events: usize,
}

/// Generate all five source files into `data_dir`.
///
/// Timestamps are whole-day offsets back from `as_of`, capped by
/// `history_days`.
pub fn generate(config: &SynthConfig, data_dir: &Path, as_of: DateTime<Utc>) -> Result<SynthReport> {
    let mut rng = StdRng::seed_from_u64(config.seed);

    let users = write_users(config, data_dir, as_of, &mut rng)?;
    let product_prices = write_products(config, data_dir, as_of, &mut rng)?;
    let (orders, order_items) = write_orders(config, data_dir, as_of, &mut rng, &product_prices)?;
    let events = write_events(config, data_dir, as_of, &mut rng)?;

    let report = SynthReport {
        users,
        products: product_prices.len(),
        orders,
        order_items,
        events,
    };
    info!(
        users = report.users,
        products = report.products,
        orders = report.orders,
        order_items = report.order_items,
        events = report.events,
        "Source files generated"
    );
    Ok(report)
}

fn pick<'a>(rng: &mut StdRng, pool: &'a [&'a str]) -> &'a str {
    pool[rng.gen_range(0..pool.len())]
}

fn money(rng: &mut StdRng, low: f64, high: f64) -> f64 {
    (rng.gen_range(low..=high) * 100.0).round() / 100.0
}

fn past_timestamp(rng: &mut StdRng, as_of: DateTime<Utc>, history_days: i64) -> String {
    let days = rng.gen_range(0..=history_days.max(0));
    (as_of - Duration::days(days))
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn write_file(path: &Path, rows: &[String], header: &str) -> Result<()> {
    let mut out = String::with_capacity(rows.len() * 48 + header.len() + 1);
    out.push_str(header);
    out.push('\n');
    for row in rows {
        out.push_str(row);
        out.push('\n');
    }
    atomic_write(path, out.as_bytes())?;
    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

fn write_users(
    config: &SynthConfig,
    data_dir: &Path,
    as_of: DateTime<Utc>,
    rng: &mut StdRng,
) -> Result<usize> {
    let mut rows = Vec::with_capacity(config.users);
    for id in 1..=config.users {
        rows.push(format!(
            "{id},user{id}@example.com,{},{},{},{},{}",
            pick(rng, FIRST_NAMES),
            pick(rng, LAST_NAMES),
            past_timestamp(rng, as_of, config.history_days),
            pick(rng, COUNTRIES),
            pick(rng, STATES),
        ));
    }
    write_file(
        &data_dir.join("users.csv"),
        &rows,
        "id,email,first_name,last_name,created_at,country,state",
    )?;
    Ok(rows.len())
}

/// Writes products.csv and returns the generated list prices, indexed by
/// product id minus one. Order items reference these prices verbatim.
fn write_products(
    config: &SynthConfig,
    data_dir: &Path,
    as_of: DateTime<Utc>,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let mut prices = Vec::with_capacity(config.products);
    let mut rows = Vec::with_capacity(config.products);
    for id in 1..=config.products {
        let price = money(rng, 10.0, 500.0);
        let cost = money(rng, 5.0, 250.0);
        prices.push(price);
        rows.push(format!(
            "{id},Product {id},{},{price:.2},{cost:.2},{}",
            pick(rng, CATEGORIES),
            past_timestamp(rng, as_of, config.history_days),
        ));
    }
    write_file(
        &data_dir.join("products.csv"),
        &rows,
        "id,name,category,price,cost,created_at",
    )?;
    Ok(prices)
}

fn write_orders(
    config: &SynthConfig,
    data_dir: &Path,
    as_of: DateTime<Utc>,
    rng: &mut StdRng,
    product_prices: &[f64],
) -> Result<(usize, usize)> {
    let mut order_rows = Vec::new();
    let mut item_rows = Vec::new();
    let mut order_id = 0usize;
    let mut item_id = 0usize;

    for user_id in 1..=config.users {
        for _ in 0..rng.gen_range(0..=config.max_orders_per_user) {
            order_id += 1;
            let total = money(rng, 50.0, 1000.0);
            order_rows.push(format!(
                "{order_id},{user_id},{},{},{total:.2}",
                past_timestamp(rng, as_of, config.history_days),
                pick(rng, ORDER_STATUSES),
            ));

            if product_prices.is_empty() {
                continue;
            }
            for _ in 0..rng.gen_range(1..=config.max_items_per_order.max(1)) {
                item_id += 1;
                let product_id = rng.gen_range(1..=product_prices.len());
                let quantity = rng.gen_range(1..=5);
                let unit_price = product_prices[product_id - 1];
                item_rows.push(format!(
                    "{item_id},{order_id},{product_id},{quantity},{unit_price:.2}"
                ));
            }
        }
    }

    write_file(
        &data_dir.join("orders.csv"),
        &order_rows,
        "id,user_id,order_date,status,total_amount",
    )?;
    write_file(
        &data_dir.join("order_items.csv"),
        &item_rows,
        "id,order_id,product_id,quantity,unit_price",
    )?;
    Ok((order_rows.len(), item_rows.len()))
}

fn write_events(
    config: &SynthConfig,
    data_dir: &Path,
    as_of: DateTime<Utc>,
    rng: &mut StdRng,
) -> Result<usize> {
    let hi = config.max_events_per_user.max(config.min_events_per_user);
    let mut rows = Vec::new();
    let mut event_id = 0usize;
    for user_id in 1..=config.users {
        for _ in 0..rng.gen_range(config.min_events_per_user..=hi) {
            event_id += 1;
            rows.push(format!(
                "{event_id},{user_id},{},{},{}",
                pick(rng, EVENT_TYPES),
                past_timestamp(rng, as_of, config.history_days),
                pick(rng, PAGES),
            ));
        }
    }
    write_file(
        &data_dir.join("events.csv"),
        &rows,
        "id,user_id,event_type,event_date,page",
    )?;
    Ok(rows.len())
}
