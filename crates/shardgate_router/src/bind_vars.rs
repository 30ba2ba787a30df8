//! Bind-variable plumbing: value slots in a route and the layered scope
//! they resolve against.
//!
//! A request carries an immutable base map. Each route execution layers
//! its own overlay on top (join-carried variables, sequence values, row
//! values computed during a sharded insert); the overlay is dropped when
//! the execution returns, so sibling routes sharing the request never see
//! each other's variables.

use std::collections::BTreeMap;

use shardgate_common::datum::Datum;
use shardgate_common::error::{BindVarError, GateResult, PlanError};

/// Bind variables by name (without the leading `:`).
pub type BindVars = BTreeMap<String, Datum>;

/// A value slot in a route: a literal or a reference into the bind variables.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueRef {
    Literal(Datum),
    /// `:name`
    BindVar(String),
    /// `::name`, must hold a list
    ListBindVar(String),
    /// Literal tuple, e.g. the right side of `IN (1, :a, 3)`.
    Tuple(Vec<ValueRef>),
}

impl ValueRef {
    pub fn literal(d: impl Into<Datum>) -> Self {
        ValueRef::Literal(d.into())
    }

    pub fn bind_var(name: impl Into<String>) -> Self {
        ValueRef::BindVar(name.into())
    }

    pub fn list_bind_var(name: impl Into<String>) -> Self {
        ValueRef::ListBindVar(name.into())
    }

    /// Resolve to a concrete value.
    pub fn resolve(&self, scope: &BindScope<'_>) -> GateResult<Datum> {
        match self {
            ValueRef::Literal(d) => Ok(d.clone()),
            ValueRef::BindVar(name) => scope.require(name).cloned(),
            ValueRef::ListBindVar(name) => {
                let v = scope.require(name)?;
                match v {
                    Datum::List(_) => Ok(v.clone()),
                    other => Err(not_a_list(name, other)),
                }
            }
            ValueRef::Tuple(items) => {
                let resolved = items
                    .iter()
                    .map(|i| i.resolve(scope))
                    .collect::<GateResult<Vec<_>>>()?;
                Ok(Datum::List(resolved))
            }
        }
    }

    /// Resolve a list-shaped slot (IN clause) into its member values.
    pub fn resolve_list(&self, scope: &BindScope<'_>) -> GateResult<Vec<Datum>> {
        match self {
            ValueRef::Tuple(items) => items.iter().map(|i| i.resolve(scope)).collect(),
            ValueRef::ListBindVar(name) | ValueRef::BindVar(name) => {
                match scope.require(name)? {
                    Datum::List(items) => Ok(items.clone()),
                    other => Err(not_a_list(name, other)),
                }
            }
            ValueRef::Literal(Datum::List(items)) => Ok(items.clone()),
            ValueRef::Literal(other) => Err(PlanError::Malformed(format!(
                "expected a list of values, got literal {}",
                other
            ))
            .into()),
        }
    }

    /// Render for inlining into a rewritten query: literals as SQL, bind
    /// variables as references the shard resolves itself.
    pub fn to_sql(&self) -> String {
        match self {
            ValueRef::Literal(d) => d.to_sql_literal(),
            ValueRef::BindVar(name) => format!(":{}", name),
            ValueRef::ListBindVar(name) => format!("::{}", name),
            ValueRef::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(|i| i.to_sql()).collect();
                format!("({})", inner.join(", "))
            }
        }
    }
}

fn not_a_list(name: &str, got: &Datum) -> shardgate_common::GateError {
    BindVarError::NotAList {
        name: name.to_string(),
        got: format!("{} {}", got.type_name(), got),
    }
    .into()
}

/// Resolve every slot of a row or key list.
pub fn resolve_keys(values: &[ValueRef], scope: &BindScope<'_>) -> GateResult<Vec<Datum>> {
    values.iter().map(|v| v.resolve(scope)).collect()
}

/// Immutable base plus a per-execution overlay.
#[derive(Debug, Clone)]
pub struct BindScope<'a> {
    base: &'a BindVars,
    overlay: BindVars,
}

impl<'a> BindScope<'a> {
    pub fn new(base: &'a BindVars) -> Self {
        Self {
            base,
            overlay: BindVars::new(),
        }
    }

    /// Scope whose overlay starts with the given variables.
    pub fn with_overlay(base: &'a BindVars, overlay: &BindVars) -> Self {
        Self {
            base,
            overlay: overlay.clone(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Datum> {
        self.overlay.get(name).or_else(|| self.base.get(name))
    }

    pub fn require(&self, name: &str) -> GateResult<&Datum> {
        self.get(name)
            .ok_or_else(|| BindVarError::Missing(name.to_string()).into())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Set a variable for the rest of this execution. Never touches the base.
    pub fn set(&mut self, name: impl Into<String>, value: Datum) {
        self.overlay.insert(name.into(), value);
    }

    pub fn overlay(&self) -> &BindVars {
        &self.overlay
    }

    /// Materialize base + overlay for shipping to a shard.
    pub fn flatten(&self) -> BindVars {
        let mut out = self.base.clone();
        for (k, v) in &self.overlay {
            out.insert(k.clone(), v.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardgate_common::GateError;

    fn base() -> BindVars {
        let mut bv = BindVars::new();
        bv.insert("id".into(), Datum::Int64(5));
        bv.insert("ids".into(), Datum::List(vec![Datum::Int64(1), Datum::Int64(2)]));
        bv
    }

    #[test]
    fn test_resolve_literal_and_bind_var() {
        let b = base();
        let scope = BindScope::new(&b);
        assert_eq!(ValueRef::literal(3i64).resolve(&scope).unwrap(), Datum::Int64(3));
        assert_eq!(ValueRef::bind_var("id").resolve(&scope).unwrap(), Datum::Int64(5));
    }

    #[test]
    fn test_missing_bind_var_is_fatal() {
        let b = base();
        let scope = BindScope::new(&b);
        let err = ValueRef::bind_var("nope").resolve(&scope).unwrap_err();
        assert!(matches!(err, GateError::BindVar(BindVarError::Missing(ref n)) if n == "nope"));
        assert!(err.is_user_error());
    }

    #[test]
    fn test_resolve_list_from_bind_var() {
        let b = base();
        let scope = BindScope::new(&b);
        let vals = ValueRef::list_bind_var("ids").resolve_list(&scope).unwrap();
        assert_eq!(vals, vec![Datum::Int64(1), Datum::Int64(2)]);
    }

    #[test]
    fn test_resolve_list_from_tuple_mixes_literals_and_vars() {
        let b = base();
        let scope = BindScope::new(&b);
        let tuple = ValueRef::Tuple(vec![ValueRef::literal(9i64), ValueRef::bind_var("id")]);
        assert_eq!(
            tuple.resolve_list(&scope).unwrap(),
            vec![Datum::Int64(9), Datum::Int64(5)]
        );
    }

    #[test]
    fn test_non_list_behind_list_ref_is_type_error() {
        let b = base();
        let scope = BindScope::new(&b);
        let err = ValueRef::list_bind_var("id").resolve_list(&scope).unwrap_err();
        assert!(matches!(err, GateError::BindVar(BindVarError::NotAList { .. })));
    }

    #[test]
    fn test_overlay_shadows_without_touching_base() {
        let b = base();
        let mut scope = BindScope::new(&b);
        scope.set("id", Datum::Int64(99));
        scope.set("extra", Datum::Text("x".into()));
        assert_eq!(scope.get("id"), Some(&Datum::Int64(99)));
        assert_eq!(b.get("id"), Some(&Datum::Int64(5)));
        assert!(!b.contains_key("extra"));

        let flat = scope.flatten();
        assert_eq!(flat.get("id"), Some(&Datum::Int64(99)));
        assert_eq!(flat.get("ids"), b.get("ids"));
        assert_eq!(flat.len(), 3);
    }

    #[test]
    fn test_sibling_scopes_are_isolated() {
        let b = base();
        let mut join_a = BindVars::new();
        join_a.insert("a".into(), Datum::Int64(1));
        let mut a = BindScope::with_overlay(&b, &join_a);
        let sibling = BindScope::new(&b);
        a.set("__seq0", Datum::Int64(100));
        assert!(sibling.get("a").is_none());
        assert!(sibling.get("__seq0").is_none());
    }

    #[test]
    fn test_to_sql_rendering() {
        assert_eq!(ValueRef::bind_var("_id0").to_sql(), ":_id0");
        assert_eq!(ValueRef::literal("o'k").to_sql(), "'o\\'k'");
        assert_eq!(
            ValueRef::Tuple(vec![ValueRef::literal(1i64), ValueRef::bind_var("b")]).to_sql(),
            "(1, :b)"
        );
    }
}
