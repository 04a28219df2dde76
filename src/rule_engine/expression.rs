//! Tagged algebraic expression tree for alarm rule predicates (§4.2.1).
//!
//! Replaces threading loosely-typed JSON through the evaluator: a rule's
//! `expression` column is parsed once into this structure and evaluated
//! (or, for diagnostics, rendered to SQL) directly from it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RuleParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl CompareOp {
    fn as_sql(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
        }
    }

    pub fn evaluate_numeric(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Eq => (lhs - rhs).abs() < f64::EPSILON,
            CompareOp::Ne => (lhs - rhs).abs() >= f64::EPSILON,
        }
    }

    pub fn evaluate_string(self, lhs: &str, rhs: &str) -> Result<bool, RuleParseError> {
        match self {
            CompareOp::Eq => Ok(lhs == rhs),
            CompareOp::Ne => Ok(lhs != rhs),
            other => Err(RuleParseError::UnknownOperator(format!("{other:?} on a tag"))),
        }
    }
}

/// A parsed rule predicate. `MetricLeaf`/`TagLeaf` are the leaves;
/// `And`/`Or` combine recursively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Expr {
    #[serde(rename = "metric")]
    MetricLeaf { stable: String, metric: String, operator: CompareOp, threshold: f64 },
    #[serde(rename = "tag")]
    TagLeaf { stable: String, tag: String, operator: CompareOp, value: String },
    #[serde(rename = "and")]
    And { and: Vec<Expr> },
    #[serde(rename = "or")]
    Or { or: Vec<Expr> },
}

/// One entity's most recent row, as fed to [`Expr::evaluate`]: a tag
/// map (including `host_ip`) plus the numeric metric values for its
/// stable.
pub struct EntityRow<'a> {
    pub tags: &'a BTreeMap<String, String>,
    pub metrics: &'a BTreeMap<String, f64>,
}

impl Expr {
    /// Parse from the JSON form persisted in the Rule Store, rejecting
    /// expressions that mix stables (§4.2.1).
    pub fn parse(raw: &str) -> Result<Self, RuleParseError> {
        let expr: Expr =
            serde_json::from_str(raw).map_err(|e| RuleParseError::InvalidJson(e.to_string()))?;
        expr.validate_single_stable()?;
        Ok(expr)
    }

    fn stables(&self, out: &mut Vec<String>) {
        match self {
            Expr::MetricLeaf { stable, .. } | Expr::TagLeaf { stable, .. } => out.push(stable.clone()),
            Expr::And { and } => and.iter().for_each(|e| e.stables(out)),
            Expr::Or { or } => or.iter().for_each(|e| e.stables(out)),
        }
    }

    /// Rejects an expression tree whose leaves reference more than one
    /// stable (§4.2.1). Called by `parse()` for expressions decoded
    /// from storage, and directly by the HTTP create/update handlers
    /// for expressions decoded straight off the wire via `serde`.
    pub fn validate_single_stable(&self) -> Result<(), RuleParseError> {
        let mut stables = Vec::new();
        self.stables(&mut stables);
        if let Some(first) = stables.first() {
            for other in &stables[1..] {
                if other != first {
                    return Err(RuleParseError::MixedStables(first.clone(), other.clone()));
                }
            }
        }
        Ok(())
    }

    /// The single stable this expression is evaluated against, after
    /// `parse` has confirmed it's the only one in play.
    pub fn stable(&self) -> Option<String> {
        let mut stables = Vec::new();
        self.stables(&mut stables);
        stables.into_iter().next()
    }

    /// Every tag key referenced anywhere in the tree (used to build
    /// `GROUP BY`/the evaluated label set, §4.2.2).
    pub fn referenced_tags(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_tags(&mut out);
        out
    }

    fn collect_tags(&self, out: &mut Vec<String>) {
        match self {
            Expr::TagLeaf { tag, .. } => out.push(tag.clone()),
            Expr::MetricLeaf { .. } => {}
            Expr::And { and } => and.iter().for_each(|e| e.collect_tags(out)),
            Expr::Or { or } => or.iter().for_each(|e| e.collect_tags(out)),
        }
    }

    /// Evaluate against one entity's latest row.
    pub fn evaluate(&self, row: &EntityRow<'_>) -> bool {
        match self {
            Expr::MetricLeaf { metric, operator, threshold, .. } => row
                .metrics
                .get(metric)
                .map(|v| operator.evaluate_numeric(*v, *threshold))
                .unwrap_or(false),
            Expr::TagLeaf { tag, operator, value, .. } => row
                .tags
                .get(tag)
                .map(|v| operator.evaluate_string(v, value).unwrap_or(false))
                .unwrap_or(false),
            Expr::And { and } => and.iter().all(|e| e.evaluate(row)),
            Expr::Or { or } => or.iter().any(|e| e.evaluate(row)),
        }
    }

    /// Render the documented SQL translation contract (§4.2.2); used
    /// for diagnostics/DEBUG logging and tests, not by the live
    /// evaluation path.
    pub fn to_sql(&self) -> String {
        match self {
            Expr::MetricLeaf { metric, operator, threshold, .. } => {
                format!("{metric} {} {threshold}", operator.as_sql())
            }
            Expr::TagLeaf { tag, operator, value, .. } => {
                format!("{tag} {} '{value}'", operator.as_sql())
            }
            Expr::And { and } => join_parenthesized(and, "AND"),
            Expr::Or { or } => join_parenthesized(or, "OR"),
        }
    }

    /// Full `SELECT ... FROM <stable> WHERE ... GROUP BY ...` the
    /// original system would have issued, included for parity with the
    /// documented translation contract even though the live path
    /// evaluates in-process (§4.2.2).
    pub fn to_select_sql(&self, stable: &str, primary_metric: &str) -> String {
        let mut tags = self.referenced_tags();
        tags.sort();
        tags.dedup();
        let select_tags = if tags.is_empty() { String::new() } else { format!(", {}", tags.join(", ")) };
        let group_by = if tags.is_empty() {
            "host_ip".to_string()
        } else {
            format!("host_ip, {}", tags.join(", "))
        };
        format!(
            "SELECT LAST({primary_metric}) AS {primary_metric}, host_ip{select_tags}, ts FROM {stable} \
             WHERE ({}) AND (ts > now - 10s) GROUP BY {group_by}",
            self.to_sql()
        )
    }
}

fn join_parenthesized(exprs: &[Expr], op: &str) -> String {
    if exprs.is_empty() {
        return "1=1".to_string();
    }
    let joined = exprs.iter().map(|e| format!("({})", e.to_sql())).collect::<Vec<_>>().join(&format!(" {op} "));
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row<'a>(tags: &'a BTreeMap<String, String>, metrics: &'a BTreeMap<String, f64>) -> EntityRow<'a> {
        EntityRow { tags, metrics }
    }

    #[test]
    fn mixed_stables_rejected_at_parse() {
        let raw = r#"{"kind":"and","and":[
            {"kind":"metric","stable":"cpu","metric":"usage_percent","operator":">","threshold":90},
            {"kind":"metric","stable":"memory","metric":"usage_percent","operator":">","threshold":90}
        ]}"#;
        let err = Expr::parse(raw).unwrap_err();
        assert!(matches!(err, RuleParseError::MixedStables(_, _)));
    }

    #[test]
    fn metric_leaf_evaluates_against_latest_row() {
        let expr = Expr::MetricLeaf {
            stable: "cpu".into(),
            metric: "usage_percent".into(),
            operator: CompareOp::Gt,
            threshold: 90.0,
        };
        let mut metrics = BTreeMap::new();
        metrics.insert("usage_percent".to_string(), 95.0);
        let tags = BTreeMap::new();
        assert!(expr.evaluate(&row(&tags, &metrics)));

        metrics.insert("usage_percent".to_string(), 10.0);
        assert!(!expr.evaluate(&row(&tags, &metrics)));
    }

    #[test]
    fn and_or_combine_as_expected() {
        let hot = Expr::MetricLeaf {
            stable: "cpu".into(),
            metric: "temperature".into(),
            operator: CompareOp::Gt,
            threshold: 80.0,
        };
        let busy = Expr::MetricLeaf {
            stable: "cpu".into(),
            metric: "usage_percent".into(),
            operator: CompareOp::Gt,
            threshold: 90.0,
        };
        let and_expr = Expr::And { and: vec![hot, busy] };

        let mut metrics = BTreeMap::new();
        metrics.insert("temperature".to_string(), 85.0);
        metrics.insert("usage_percent".to_string(), 50.0);
        let tags = BTreeMap::new();
        assert!(!and_expr.evaluate(&row(&tags, &metrics)));

        metrics.insert("usage_percent".to_string(), 95.0);
        assert!(and_expr.evaluate(&row(&tags, &metrics)));
    }

    #[test]
    fn tag_leaf_equality_and_inequality() {
        let expr = Expr::TagLeaf {
            stable: "sensor".into(),
            tag: "host_ip".into(),
            operator: CompareOp::Eq,
            value: "192.168.10.5".into(),
        };
        let mut tags = BTreeMap::new();
        tags.insert("host_ip".to_string(), "192.168.10.5".to_string());
        let metrics = BTreeMap::new();
        assert!(expr.evaluate(&row(&tags, &metrics)));
    }

    #[test]
    fn to_sql_renders_documented_translation() {
        let expr = Expr::And {
            and: vec![
                Expr::MetricLeaf {
                    stable: "cpu".into(),
                    metric: "usage_percent".into(),
                    operator: CompareOp::Gt,
                    threshold: 90.0,
                },
                Expr::TagLeaf {
                    stable: "cpu".into(),
                    tag: "host_ip".into(),
                    operator: CompareOp::Eq,
                    value: "10.0.0.1".into(),
                },
            ],
        };
        let sql = expr.to_sql();
        assert_eq!(sql, "(usage_percent > 90) AND (host_ip = '10.0.0.1')");
    }

    #[test]
    fn referenced_tags_includes_every_leaf_tag() {
        let expr = Expr::Or {
            or: vec![
                Expr::TagLeaf { stable: "disk".into(), tag: "device".into(), operator: CompareOp::Eq, value: "sda".into() },
                Expr::TagLeaf { stable: "disk".into(), tag: "mount_point".into(), operator: CompareOp::Ne, value: "/".into() },
            ],
        };
        let mut tags = expr.referenced_tags();
        tags.sort();
        assert_eq!(tags, vec!["device".to_string(), "mount_point".to_string()]);
    }
}
