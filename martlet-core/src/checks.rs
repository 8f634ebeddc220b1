//! Parameterized data-quality checks.
//!
//! Three assertion kinds cover the whole battery; each is implemented once
//! and instantiated per relation/column. Every kind knows both the SQL that
//! produces its observed scalar and the rule that scalar must satisfy, so
//! there is no shared "zero or true" comparison to get wrong.
//!
//! Checks run independently. A failing check never stops the rest, and a
//! check whose query cannot execute at all is reported as an error, which
//! is a different outcome than a failure.

use serde::Serialize;
use tracing::{info, warn};

use crate::synth::EVENT_TYPES;
use crate::warehouse::Warehouse;

/// One data-quality assertion against a relation.
#[derive(Debug, Clone, Copy)]
pub enum CheckKind {
    /// The column contains no NULLs.
    NotNull {
        relation: &'static str,
        column: &'static str,
    },
    /// The column's values are distinct across all rows.
    Unique {
        relation: &'static str,
        column: &'static str,
    },
    /// Every non-NULL value is in the allowed set. NULLs are not counted as
    /// violations here; pair with a NotNull check when they should be.
    AcceptedValues {
        relation: &'static str,
        column: &'static str,
        allowed: &'static [&'static str],
    },
}

/// The shape of scalar a check query returns, with its passing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expectation {
    /// The query counts violations; zero passes.
    NoViolations,
    /// The query evaluates a boolean comparison; true (1) passes.
    BoolTrue,
}

impl CheckKind {
    /// Display name, also used as the stable key in generated docs.
    pub fn name(&self) -> String {
        match self {
            CheckKind::NotNull { relation, column } => {
                format!("{relation}: not_null {column}")
            }
            CheckKind::Unique { relation, column } => {
                format!("{relation}: unique {column}")
            }
            CheckKind::AcceptedValues {
                relation, column, ..
            } => format!("{relation}: accepted_values {column}"),
        }
    }

    /// The query producing this check's observed scalar.
    pub fn sql(&self) -> String {
        match self {
            CheckKind::NotNull { relation, column } => {
                format!("SELECT COUNT(*) FROM {relation} WHERE {column} IS NULL")
            }
            CheckKind::Unique { relation, column } => {
                format!("SELECT COUNT(DISTINCT {column}) = COUNT(*) FROM {relation}")
            }
            CheckKind::AcceptedValues {
                relation,
                column,
                allowed,
            } => {
                let list: Vec<String> = allowed
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect();
                format!(
                    "SELECT COUNT(*) FROM {relation} WHERE {column} NOT IN ({})",
                    list.join(", ")
                )
            }
        }
    }

    fn expectation(&self) -> Expectation {
        match self {
            CheckKind::NotNull { .. } | CheckKind::AcceptedValues { .. } => {
                Expectation::NoViolations
            }
            CheckKind::Unique { .. } => Expectation::BoolTrue,
        }
    }

    /// Whether an observed scalar satisfies this check.
    pub fn passes(&self, observed: i64) -> bool {
        match self.expectation() {
            Expectation::NoViolations => observed == 0,
            Expectation::BoolTrue => observed != 0,
        }
    }
}

/// Outcome status of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Pass,
    Fail,
    /// The check query itself could not execute.
    Error,
}

/// Result of one executed check. Serializes to the shape embedded in the
/// docs snapshot: `{test, status, result | error}`.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    #[serde(rename = "test")]
    pub name: String,
    pub status: CheckStatus,
    #[serde(rename = "result", skip_serializing_if = "Option::is_none")]
    pub observed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// All outcomes of one validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == CheckStatus::Pass)
            .count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    /// Names of checks that did not pass, failures and errors alike.
    pub fn unhealthy(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter(|r| r.status != CheckStatus::Pass)
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// The default battery over the mart layer.
pub const DEFAULT_CHECKS: &[CheckKind] = &[
    CheckKind::Unique {
        relation: "dim_users",
        column: "user_id",
    },
    CheckKind::NotNull {
        relation: "dim_users",
        column: "user_id",
    },
    CheckKind::Unique {
        relation: "dim_products",
        column: "product_id",
    },
    CheckKind::NotNull {
        relation: "dim_products",
        column: "product_id",
    },
    CheckKind::NotNull {
        relation: "fct_orders",
        column: "order_id",
    },
    CheckKind::NotNull {
        relation: "fct_orders",
        column: "user_id",
    },
    CheckKind::AcceptedValues {
        relation: "fct_events",
        column: "event_type",
        allowed: EVENT_TYPES,
    },
];

/// Run every check, collecting all outcomes. Nothing here aborts the
/// pipeline; callers decide what a failing report means.
pub fn run_checks(warehouse: &Warehouse, checks: &[CheckKind]) -> CheckReport {
    let mut results = Vec::with_capacity(checks.len());

    for check in checks {
        let name = check.name();
        let result = match warehouse.scalar_i64(&check.sql()) {
            Ok(observed) => {
                if check.passes(observed) {
                    CheckResult {
                        name,
                        status: CheckStatus::Pass,
                        observed: Some(observed),
                        error: None,
                    }
                } else {
                    warn!(check = %name, observed, "Check failed");
                    CheckResult {
                        name,
                        status: CheckStatus::Fail,
                        observed: Some(observed),
                        error: None,
                    }
                }
            }
            Err(e) => {
                warn!(check = %name, "Check could not run: {e}");
                CheckResult {
                    name,
                    status: CheckStatus::Error,
                    observed: None,
                    error: Some(e.to_string()),
                }
            }
        };
        results.push(result);
    }

    let report = CheckReport { results };
    info!("Checks complete: {}/{} passed", report.passed(), report.total());
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Warehouse {
        let wh = Warehouse::open_in_memory().unwrap();
        wh.execute_batch(
            "CREATE TABLE clean (id INTEGER, kind TEXT);
             INSERT INTO clean VALUES (1, 'a'), (2, 'b'), (3, 'a');
             CREATE TABLE dirty (id INTEGER, kind TEXT);
             INSERT INTO dirty VALUES (1, 'a'), (1, 'z'), (NULL, 'a');",
        )
        .unwrap();
        wh
    }

    #[test]
    fn test_not_null_pass_and_fail() {
        let wh = seeded();
        let pass = CheckKind::NotNull {
            relation: "clean",
            column: "id",
        };
        let fail = CheckKind::NotNull {
            relation: "dirty",
            column: "id",
        };
        let report = run_checks(&wh, &[pass, fail]);
        assert_eq!(report.results[0].status, CheckStatus::Pass);
        assert_eq!(report.results[0].observed, Some(0));
        assert_eq!(report.results[1].status, CheckStatus::Fail);
        assert_eq!(report.results[1].observed, Some(1));
    }

    #[test]
    fn test_unique_pass_and_fail() {
        let wh = seeded();
        let pass = CheckKind::Unique {
            relation: "clean",
            column: "id",
        };
        let fail = CheckKind::Unique {
            relation: "dirty",
            column: "id",
        };
        let report = run_checks(&wh, &[pass, fail]);
        assert_eq!(report.results[0].status, CheckStatus::Pass);
        // The boolean-shaped observation is 1 for true
        assert_eq!(report.results[0].observed, Some(1));
        assert_eq!(report.results[1].status, CheckStatus::Fail);
        assert_eq!(report.results[1].observed, Some(0));
    }

    #[test]
    fn test_accepted_values_counts_violations_not_nulls() {
        let wh = seeded();
        wh.execute_batch("INSERT INTO dirty VALUES (4, NULL)").unwrap();
        let check = CheckKind::AcceptedValues {
            relation: "dirty",
            column: "kind",
            allowed: &["a", "b"],
        };
        let report = run_checks(&wh, &[check]);
        // Only 'z' violates; the NULL is not a violation of this kind
        assert_eq!(report.results[0].status, CheckStatus::Fail);
        assert_eq!(report.results[0].observed, Some(1));
    }

    #[test]
    fn test_missing_relation_is_error_not_fail() {
        let wh = seeded();
        let check = CheckKind::NotNull {
            relation: "absent",
            column: "id",
        };
        let report = run_checks(&wh, &[check]);
        assert_eq!(report.results[0].status, CheckStatus::Error);
        assert!(report.results[0].observed.is_none());
        assert!(report.results[0].error.is_some());
    }

    #[test]
    fn test_one_error_does_not_stop_the_rest() {
        let wh = seeded();
        let checks = [
            CheckKind::NotNull {
                relation: "absent",
                column: "id",
            },
            CheckKind::NotNull {
                relation: "clean",
                column: "id",
            },
        ];
        let report = run_checks(&wh, &checks);
        assert_eq!(report.total(), 2);
        assert_eq!(report.passed(), 1);
        assert!(!report.all_passed());
        assert_eq!(report.unhealthy(), vec!["absent: not_null id"]);
    }

    #[test]
    fn test_pass_rule_is_per_kind() {
        let unique = CheckKind::Unique {
            relation: "t",
            column: "c",
        };
        let not_null = CheckKind::NotNull {
            relation: "t",
            column: "c",
        };
        // Identical scalars mean opposite things for the two kinds
        assert!(unique.passes(1));
        assert!(!unique.passes(0));
        assert!(not_null.passes(0));
        assert!(!not_null.passes(1));
    }

    #[test]
    fn test_default_battery_names() {
        let names: Vec<String> = DEFAULT_CHECKS.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec![
                "dim_users: unique user_id",
                "dim_users: not_null user_id",
                "dim_products: unique product_id",
                "dim_products: not_null product_id",
                "fct_orders: not_null order_id",
                "fct_orders: not_null user_id",
                "fct_events: accepted_values event_type",
            ]
        );
    }

    #[test]
    fn test_accepted_values_sql_quotes_values() {
        let check = CheckKind::AcceptedValues {
            relation: "t",
            column: "c",
            allowed: &["it's"],
        };
        assert!(check.sql().contains("'it''s'"));
    }

    #[test]
    fn test_check_result_serialized_shape() {
        let result = CheckResult {
            name: "dim_users: unique user_id".into(),
            status: CheckStatus::Pass,
            observed: Some(1),
            error: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["test"], "dim_users: unique user_id");
        assert_eq!(json["status"], "PASS");
        assert_eq!(json["result"], 1);
        assert!(json.get("error").is_none());
    }
}
