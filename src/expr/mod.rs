//! IF-predicate evaluation for conditional updates.
//!
//! Disconnected from the indexing flow: parse the expression, compute
//! the property set it references, load those properties from the
//! document's sort vector (cheap) or the host-stored body (fallback),
//! evaluate, and return a boolean. Every stage surfaces its failure
//! without mutating anything.

use std::cmp::Ordering;

use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::host::{Host, SearchCtx};
use crate::sorting_vector::SortableValue;

#[derive(Parser)]
#[grammar = "expr/expr.pest"]
struct PredicateParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed predicate AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Property(String),
    Num(f64),
    Str(String),
    Cmp(Box<Expr>, CmpOp, Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
}

/// A property value loaded for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Num(f64),
    Str(String),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }

    fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Nil => None,
        }
    }
}

impl Expr {
    /// Parse an expression string into an AST.
    pub fn parse(text: &str) -> Result<Expr> {
        let mut pairs = PredicateParser::parse(Rule::expression, text)
            .map_err(|e| Error::Generic(format!("Could not parse expression: {}", e)))?;
        let expression = pairs
            .next()
            .ok_or_else(|| Error::Generic("Empty expression".to_string()))?;
        let or_pair = expression
            .into_inner()
            .find(|p| p.as_rule() == Rule::or_expr)
            .ok_or_else(|| Error::Generic("Empty expression".to_string()))?;
        Ok(build_or(or_pair))
    }

    /// Every property name the expression references.
    pub fn lookup_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys(&self, keys: &mut Vec<String>) {
        match self {
            Expr::Property(name) => {
                if !keys.contains(name) {
                    keys.push(name.clone());
                }
            }
            Expr::Num(_) | Expr::Str(_) => {}
            Expr::Cmp(l, _, r) => {
                l.collect_keys(keys);
                r.collect_keys(keys);
            }
            Expr::And(parts) | Expr::Or(parts) => {
                for p in parts {
                    p.collect_keys(keys);
                }
            }
            Expr::Not(inner) => inner.collect_keys(keys),
        }
    }

    /// Evaluate against a loaded property row.
    pub fn eval(&self, row: &FxHashMap<String, Value>) -> Result<Value> {
        match self {
            Expr::Property(name) => Ok(row.get(name).cloned().unwrap_or(Value::Nil)),
            Expr::Num(n) => Ok(Value::Num(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::Cmp(l, op, r) => {
                let l = l.eval(row)?;
                let r = r.eval(row)?;
                Ok(Value::Num(compare(&l, *op, &r) as i64 as f64))
            }
            Expr::And(parts) => {
                for p in parts {
                    if !p.eval(row)?.truthy() {
                        return Ok(Value::Num(0.0));
                    }
                }
                Ok(Value::Num(1.0))
            }
            Expr::Or(parts) => {
                for p in parts {
                    if p.eval(row)?.truthy() {
                        return Ok(Value::Num(1.0));
                    }
                }
                Ok(Value::Num(0.0))
            }
            Expr::Not(inner) => Ok(Value::Num(!inner.eval(row)?.truthy() as i64 as f64)),
        }
    }
}

/// Numeric comparison when both sides coerce to numbers, lexicographic
/// otherwise. `Nil` only ever equals `Nil`.
fn compare(l: &Value, op: CmpOp, r: &Value) -> bool {
    let ordering = match (l.as_num(), r.as_num()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (l, r) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Nil, Value::Nil) => Some(Ordering::Equal),
            _ => None,
        },
    };
    match ordering {
        None => matches!(op, CmpOp::Ne),
        Some(ord) => match op {
            CmpOp::Eq => ord == Ordering::Equal,
            CmpOp::Ne => ord != Ordering::Equal,
            CmpOp::Lt => ord == Ordering::Less,
            CmpOp::Le => ord != Ordering::Greater,
            CmpOp::Gt => ord == Ordering::Greater,
            CmpOp::Ge => ord != Ordering::Less,
        },
    }
}

fn build_or(pair: Pair<'_, Rule>) -> Expr {
    let mut parts: Vec<Expr> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::and_expr)
        .map(build_and)
        .collect();
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Expr::Or(parts)
    }
}

fn build_and(pair: Pair<'_, Rule>) -> Expr {
    let mut parts: Vec<Expr> = pair
        .into_inner()
        .filter(|p| p.as_rule() == Rule::not_expr)
        .map(build_not)
        .collect();
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        Expr::And(parts)
    }
}

fn build_not(pair: Pair<'_, Rule>) -> Expr {
    let mut negated = false;
    let mut result = Expr::Num(0.0);
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::not_op => negated = true,
            Rule::not_expr => result = build_not(inner),
            Rule::comparison => result = build_comparison(inner),
            _ => {}
        }
    }
    if negated {
        Expr::Not(Box::new(result))
    } else {
        result
    }
}

fn build_comparison(pair: Pair<'_, Rule>) -> Expr {
    let mut operands = Vec::new();
    let mut op = None;
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::operand => operands.push(build_operand(inner)),
            Rule::cmp_op => {
                op = Some(match inner.as_str() {
                    "==" => CmpOp::Eq,
                    "!=" => CmpOp::Ne,
                    "<=" => CmpOp::Le,
                    ">=" => CmpOp::Ge,
                    "<" => CmpOp::Lt,
                    _ => CmpOp::Gt,
                })
            }
            _ => {}
        }
    }
    let mut iter = operands.into_iter();
    let first = iter.next().unwrap_or(Expr::Num(0.0));
    match (op, iter.next()) {
        (Some(op), Some(second)) => Expr::Cmp(Box::new(first), op, Box::new(second)),
        _ => first,
    }
}

fn build_operand(pair: Pair<'_, Rule>) -> Expr {
    for inner in pair.into_inner() {
        match inner.as_rule() {
            Rule::property => {
                return Expr::Property(inner.as_str()[1..].to_string());
            }
            Rule::number => {
                return Expr::Num(inner.as_str().parse().unwrap_or(0.0));
            }
            Rule::string => {
                let quoted = inner.as_str();
                return Expr::Str(quoted[1..quoted.len() - 1].to_string());
            }
            Rule::or_expr => return build_or(inner),
            _ => {}
        }
    }
    Expr::Num(0.0)
}

/// Evaluate an IF predicate against a document: properties resolve from
/// the metadata's sort vector when the field is sortable, falling back
/// to the host-stored document body. This path never touches indexing.
pub fn eval_expression<H: Host>(sctx: &SearchCtx<H>, key: &str, expr_text: &str) -> Result<bool> {
    let handle = sctx
        .spec
        .clone()
        .ok_or_else(|| Error::Generic(format!("Unknown index `{}`", sctx.key)))?;
    let spec = handle.read();
    let Some(md) = spec.docs.get_by_key(key) else {
        return Err(Error::NoDoc(format!("No such document `{}`", key)));
    };

    let expr = Expr::parse(expr_text)?;
    let keys = expr.lookup_keys();

    let mut row: FxHashMap<String, Value> = FxHashMap::default();
    let mut stored: Option<Vec<(String, String)>> = None;
    for name in keys {
        let from_sort_vector = spec
            .sorting_index(&name)
            .and_then(|idx| md.sort_vector.as_ref()?.get(idx))
            .and_then(|slot| match slot {
                SortableValue::Nil => None,
                SortableValue::Str(s) => Some(Value::Str(s.to_string())),
                SortableValue::Num(n) => Some(Value::Num(*n)),
            });
        let value = match from_sort_vector {
            Some(v) => v,
            None => {
                if stored.is_none() {
                    stored = Some(sctx.host.load_document(key).unwrap_or_default());
                }
                stored
                    .as_ref()
                    .and_then(|fields| {
                        fields
                            .iter()
                            .find(|(n, _)| n.eq_ignore_ascii_case(&name))
                            .map(|(_, text)| Value::Str(text.clone()))
                    })
                    .unwrap_or(Value::Nil)
            }
        };
        row.insert(name, value);
    }

    Ok(expr.eval(&row)?.truthy())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> FxHashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_parse_and_lookup_keys() {
        let expr = Expr::parse("@price > 10 && @title == 'Widget'").unwrap();
        assert_eq!(expr.lookup_keys(), vec!["price", "title"]);
    }

    #[test]
    fn test_numeric_comparisons() {
        let r = row(&[("price", Value::Num(19.99))]);
        for (text, expected) in [
            ("@price > 10", true),
            ("@price >= 19.99", true),
            ("@price < 10", false),
            ("@price == 19.99", true),
            ("@price != 19.99", false),
        ] {
            let expr = Expr::parse(text).unwrap();
            assert_eq!(expr.eval(&r).unwrap().truthy(), expected, "{}", text);
        }
    }

    #[test]
    fn test_string_comparison_and_coercion() {
        let r = row(&[("title", Value::Str("Widget".into())), ("n", Value::Str("5".into()))]);
        assert!(Expr::parse("@title == \"Widget\"")
            .unwrap()
            .eval(&r)
            .unwrap()
            .truthy());
        // numeric-looking strings compare numerically
        assert!(Expr::parse("@n < 10").unwrap().eval(&r).unwrap().truthy());
    }

    #[test]
    fn test_boolean_operators_and_grouping() {
        let r = row(&[("a", Value::Num(1.0)), ("b", Value::Num(0.0))]);
        assert!(Expr::parse("@a || @b").unwrap().eval(&r).unwrap().truthy());
        assert!(!Expr::parse("@a && @b").unwrap().eval(&r).unwrap().truthy());
        assert!(Expr::parse("!(@b) && @a").unwrap().eval(&r).unwrap().truthy());
        assert!(Expr::parse("(@a || @b) && @a").unwrap().eval(&r).unwrap().truthy());
    }

    #[test]
    fn test_missing_property_is_nil() {
        let r = row(&[]);
        assert!(!Expr::parse("@ghost == 'x'").unwrap().eval(&r).unwrap().truthy());
        assert!(Expr::parse("@ghost != 'x'").unwrap().eval(&r).unwrap().truthy());
    }

    #[test]
    fn test_parse_error_surfaces() {
        assert!(Expr::parse("@price >").is_err());
        assert!(Expr::parse("&& nope").is_err());
    }
}
