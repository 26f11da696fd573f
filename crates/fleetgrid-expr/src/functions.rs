//! Function registry and built-in functions.
//!
//! Two families are registered by default:
//!
//! - **Standard** (`size`, `int`, `startsWith`, `matches`, ...) raise an
//!   evaluation error on a type mismatch.
//! - **Placement** (`hasLabel`, `inRegion`, `hasCapacity`, `costTier`, ...)
//!   fail closed: a wrong argument type yields `false` / `""` / `"standard"`.
//!
//! Both families raise [`ExprError::InvalidArguments`] when called with the
//! wrong number of arguments.

use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use fleetgrid_core::types::REGION_LABEL_KEYS;
use regex::Regex;

use crate::error::{ExprError, ExprResult};
use crate::value::{Value, ValueType};

/// Classification returned by `costTier` when metadata carries none.
pub const DEFAULT_COST_TIER: &str = "standard";

/// Separator between segments of a hierarchical workspace path.
pub const WORKSPACE_SEPARATOR: char = ':';

pub type FunctionHandler = Arc<dyn Fn(&[Value]) -> ExprResult<Value> + Send + Sync>;

/// A callable registered under a name.
#[derive(Clone)]
pub struct FunctionDef {
    name: String,
    min_args: usize,
    max_args: usize,
    return_type: ValueType,
    builtin: bool,
    handler: FunctionHandler,
}

impl FunctionDef {
    /// A custom function taking exactly `arity` arguments.
    pub fn new<F>(name: impl Into<String>, arity: usize, return_type: ValueType, handler: F) -> Self
    where
        F: Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            min_args: arity,
            max_args: arity,
            return_type,
            builtin: false,
            handler: Arc::new(handler),
        }
    }

    /// A custom function accepting `min..=max` arguments. A range with
    /// `min > max` accepts nothing and is refused at registration.
    pub fn variadic<F>(
        name: impl Into<String>,
        min: usize,
        max: usize,
        return_type: ValueType,
        handler: F,
    ) -> Self
    where
        F: Fn(&[Value]) -> ExprResult<Value> + Send + Sync + 'static,
    {
        Self {
            min_args: min,
            max_args: max,
            ..Self::new(name, min, return_type, handler)
        }
    }

    fn builtin(
        name: &str,
        arity: usize,
        return_type: ValueType,
        handler: fn(&[Value]) -> ExprResult<Value>,
    ) -> Self {
        Self {
            builtin: true,
            ..Self::new(name, arity, return_type, handler)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn return_type(&self) -> ValueType {
        self.return_type
    }

    pub fn is_builtin(&self) -> bool {
        self.builtin
    }

    pub fn arity(&self) -> RangeInclusive<usize> {
        self.min_args..=self.max_args
    }

    pub fn accepts(&self, count: usize) -> bool {
        self.arity().contains(&count)
    }

    pub fn arity_description(&self) -> String {
        if self.min_args == self.max_args {
            format!("{} argument(s)", self.min_args)
        } else {
            format!("{}..={} arguments", self.min_args, self.max_args)
        }
    }

    pub fn call(&self, args: &[Value]) -> ExprResult<Value> {
        if !self.accepts(args.len()) {
            return Err(ExprError::InvalidArguments {
                function: self.name.clone(),
                expected: self.arity_description(),
                got: args.len(),
            });
        }
        (self.handler)(args)
    }
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("min_args", &self.min_args)
            .field("max_args", &self.max_args)
            .field("return_type", &self.return_type)
            .field("builtin", &self.builtin)
            .finish()
    }
}

/// Name → function map. Cloned and swapped wholesale when a custom function
/// is registered, so compiled programs keep the snapshot they were checked
/// against.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard and placement built-ins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for def in [
            // Standard.
            FunctionDef::builtin("size", 1, ValueType::Int, size),
            FunctionDef::builtin("int", 1, ValueType::Int, to_int),
            FunctionDef::builtin("double", 1, ValueType::Double, to_double),
            FunctionDef::builtin("string", 1, ValueType::String, to_string),
            FunctionDef::builtin("startsWith", 2, ValueType::Bool, starts_with),
            FunctionDef::builtin("endsWith", 2, ValueType::Bool, ends_with),
            FunctionDef::builtin("contains", 2, ValueType::Bool, contains),
            FunctionDef::builtin("matches", 2, ValueType::Bool, matches),
            FunctionDef::builtin("lowerAscii", 1, ValueType::String, lower_ascii),
            FunctionDef::builtin("upperAscii", 1, ValueType::String, upper_ascii),
            // Placement.
            FunctionDef::builtin("hasLabel", 2, ValueType::Bool, has_label),
            FunctionDef::builtin("labelValue", 2, ValueType::String, label_value),
            FunctionDef::builtin("labelMatches", 3, ValueType::Bool, label_matches),
            FunctionDef::builtin("inRegion", 2, ValueType::Bool, in_region),
            FunctionDef::builtin("hasCapacity", 3, ValueType::Bool, has_capacity),
            FunctionDef::builtin("matchesWorkspace", 2, ValueType::Bool, matches_workspace),
            FunctionDef::builtin("inWorkspace", 2, ValueType::Bool, in_workspace),
            FunctionDef::builtin("costTier", 1, ValueType::String, cost_tier),
        ] {
            registry.register(def);
        }
        registry
    }

    /// Insert or replace a function. Returns the previous definition.
    pub fn register(&mut self, def: FunctionDef) -> Option<FunctionDef> {
        self.functions.insert(def.name.clone(), def)
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Sorted function names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn call(&self, name: &str, args: &[Value]) -> ExprResult<Value> {
        self.get(name)
            .ok_or_else(|| ExprError::UnknownFunction(name.to_string()))?
            .call(args)
    }
}

/// Function names whose argument at the given position is a regex pattern.
pub(crate) const REGEX_ARGUMENTS: [(&str, usize); 2] = [("matches", 1), ("labelMatches", 2)];

// ── Standard functions ───────────────────────────────────────────────

fn types_of(args: &[Value]) -> Vec<ValueType> {
    args.iter().map(Value::value_type).collect()
}

fn size(args: &[Value]) -> ExprResult<Value> {
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        _ => return Err(ExprError::no_overload("size", &types_of(args))),
    };
    i64::try_from(len)
        .map(Value::Int)
        .map_err(|_| ExprError::Evaluation("size overflows int".to_string()))
}

fn to_int(args: &[Value]) -> ExprResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Double(d) if d.is_finite() && *d >= i64::MIN as f64 && *d < i64::MAX as f64 => {
            Ok(Value::Int(d.trunc() as i64))
        }
        Value::Double(d) => Err(ExprError::Evaluation(format!("double {d} out of int range"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ExprError::Evaluation(format!("cannot convert {s:?} to int"))),
        _ => Err(ExprError::no_overload("int", &types_of(args))),
    }
}

fn to_double(args: &[Value]) -> ExprResult<Value> {
    match &args[0] {
        Value::Int(i) => Ok(Value::Double(*i as f64)),
        Value::Double(d) => Ok(Value::Double(*d)),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| ExprError::Evaluation(format!("cannot convert {s:?} to double"))),
        _ => Err(ExprError::no_overload("double", &types_of(args))),
    }
}

fn to_string(args: &[Value]) -> ExprResult<Value> {
    Ok(Value::String(args[0].to_string()))
}

fn string_pair<'a>(name: &str, args: &'a [Value]) -> ExprResult<(&'a str, &'a str)> {
    match (&args[0], &args[1]) {
        (Value::String(a), Value::String(b)) => Ok((a, b)),
        _ => Err(ExprError::no_overload(name, &types_of(args))),
    }
}

fn starts_with(args: &[Value]) -> ExprResult<Value> {
    let (s, prefix) = string_pair("startsWith", args)?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

fn ends_with(args: &[Value]) -> ExprResult<Value> {
    let (s, suffix) = string_pair("endsWith", args)?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

fn contains(args: &[Value]) -> ExprResult<Value> {
    match (&args[0], &args[1]) {
        (Value::String(s), Value::String(sub)) => Ok(Value::Bool(s.contains(sub.as_str()))),
        (Value::List(items), needle) => Ok(Value::Bool(items.iter().any(|v| v.loose_eq(needle)))),
        (Value::Map(map), Value::String(key)) => Ok(Value::Bool(map.contains_key(key))),
        _ => Err(ExprError::no_overload("contains", &types_of(args))),
    }
}

fn matches(args: &[Value]) -> ExprResult<Value> {
    let (s, pattern) = string_pair("matches", args)?;
    let re = Regex::new(pattern)
        .map_err(|e| ExprError::Evaluation(format!("invalid regex {pattern:?}: {e}")))?;
    Ok(Value::Bool(re.is_match(s)))
}

fn lower_ascii(args: &[Value]) -> ExprResult<Value> {
    match &args[0] {
        Value::String(s) => Ok(Value::String(s.to_ascii_lowercase())),
        _ => Err(ExprError::no_overload("lowerAscii", &types_of(args))),
    }
}

fn upper_ascii(args: &[Value]) -> ExprResult<Value> {
    match &args[0] {
        Value::String(s) => Ok(Value::String(s.to_ascii_uppercase())),
        _ => Err(ExprError::no_overload("upperAscii", &types_of(args))),
    }
}

// ── Placement functions (fail closed) ────────────────────────────────

fn label_lookup<'a>(labels: &'a Value, key: &Value) -> Option<&'a Value> {
    labels.as_map()?.get(key.as_str()?)
}

/// `hasLabel(labels, key)`
fn has_label(args: &[Value]) -> ExprResult<Value> {
    Ok(Value::Bool(label_lookup(&args[0], &args[1]).is_some()))
}

/// `labelValue(labels, key)`; empty string when absent or not a string.
fn label_value(args: &[Value]) -> ExprResult<Value> {
    let value = label_lookup(&args[0], &args[1])
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(Value::String(value.to_string()))
}

/// `labelMatches(labels, key, pattern)`; regex match on the label value.
fn label_matches(args: &[Value]) -> ExprResult<Value> {
    let matched = label_lookup(&args[0], &args[1])
        .and_then(Value::as_str)
        .zip(args[2].as_str())
        .and_then(|(value, pattern)| Regex::new(pattern).ok().map(|re| re.is_match(value)))
        .unwrap_or(false);
    Ok(Value::Bool(matched))
}

/// `inRegion(cluster, region)`; reads `cluster.region`, then the region labels.
fn in_region(args: &[Value]) -> ExprResult<Value> {
    let Some(region) = args[1].as_str() else {
        return Ok(Value::Bool(false));
    };
    let Some(cluster) = args[0].as_map() else {
        return Ok(Value::Bool(false));
    };

    let direct = cluster.get("region").and_then(Value::as_str);
    let labeled = || {
        let labels = cluster.get("labels")?.as_map()?;
        REGION_LABEL_KEYS
            .iter()
            .find_map(|key| labels.get(*key).and_then(Value::as_str))
    };
    let found = direct.or_else(labeled);
    Ok(Value::Bool(found == Some(region)))
}

/// `hasCapacity(resources, name, amount)`; `name` may be a dotted path
/// (`"available.cpu"`). False when the path is missing or non-numeric.
fn has_capacity(args: &[Value]) -> ExprResult<Value> {
    let enough = args[1]
        .as_str()
        .and_then(|path| args[0].lookup_path(path))
        .and_then(Value::as_f64)
        .zip(args[2].as_f64())
        .is_some_and(|(have, want)| have >= want);
    Ok(Value::Bool(enough))
}

fn workspace_path(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Map(map) => ["path", "name"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str)),
        _ => None,
    }
}

/// `matchesWorkspace(workspace, pattern)`; segment-wise prefix match where a
/// `*` segment matches any single segment. `root:org` matches
/// `root:org:team`; `root:*:team` matches `root:acme:team:dev`.
fn matches_workspace(args: &[Value]) -> ExprResult<Value> {
    let (Some(workspace), Some(pattern)) = (workspace_path(&args[0]), args[1].as_str()) else {
        return Ok(Value::Bool(false));
    };
    if pattern.is_empty() {
        return Ok(Value::Bool(false));
    }
    if pattern == "*" {
        return Ok(Value::Bool(true));
    }

    let segments: Vec<&str> = workspace.split(WORKSPACE_SEPARATOR).collect();
    let wanted: Vec<&str> = pattern.split(WORKSPACE_SEPARATOR).collect();
    let matched = wanted.len() <= segments.len()
        && wanted
            .iter()
            .zip(&segments)
            .all(|(want, have)| *want == "*" || want == have);
    Ok(Value::Bool(matched))
}

/// `inWorkspace(workspace, candidates)`; exact membership against a single
/// workspace path or a list of them.
fn in_workspace(args: &[Value]) -> ExprResult<Value> {
    let Some(workspace) = workspace_path(&args[0]) else {
        return Ok(Value::Bool(false));
    };
    let found = match &args[1] {
        Value::List(items) => items
            .iter()
            .filter_map(workspace_path)
            .any(|candidate| candidate == workspace),
        other => workspace_path(other) == Some(workspace),
    };
    Ok(Value::Bool(found))
}

/// `costTier(metadata)`; looks at `costTier` / `cost-tier` on the metadata
/// itself, then on its `labels` and `annotations`.
fn cost_tier(args: &[Value]) -> ExprResult<Value> {
    const KEYS: [&str; 2] = ["costTier", "cost-tier"];

    let find = |map: &Value| -> Option<String> {
        let map = map.as_map()?;
        KEYS.iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .filter(|tier| !tier.is_empty())
            .map(str::to_string)
    };

    let metadata = &args[0];
    let tier = find(metadata)
        .or_else(|| find(metadata.as_map()?.get("labels")?))
        .or_else(|| find(metadata.as_map()?.get("annotations")?))
        .unwrap_or_else(|| DEFAULT_COST_TIER.to_string());
    Ok(Value::String(tier))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, args: Vec<serde_json::Value>) -> Value {
        let args: Vec<Value> = args.into_iter().map(Value::from).collect();
        FunctionRegistry::with_builtins().call(name, &args).unwrap()
    }

    #[test]
    fn has_label_and_label_value() {
        let labels = json!({"zone": "a", "tier": 3});
        assert_eq!(call("hasLabel", vec![labels.clone(), json!("zone")]), Value::Bool(true));
        assert_eq!(call("hasLabel", vec![labels.clone(), json!("gpu")]), Value::Bool(false));
        assert_eq!(call("labelValue", vec![labels.clone(), json!("zone")]), Value::from("a"));
        assert_eq!(call("labelValue", vec![labels.clone(), json!("gpu")]), Value::from(""));
        // Non-string label value fails closed.
        assert_eq!(call("labelValue", vec![labels, json!("tier")]), Value::from(""));
    }

    #[test]
    fn placement_functions_fail_closed_on_type_mismatch() {
        assert_eq!(call("hasLabel", vec![json!("oops"), json!("zone")]), Value::Bool(false));
        assert_eq!(call("inRegion", vec![json!(42), json!("us-east-1")]), Value::Bool(false));
        assert_eq!(
            call("hasCapacity", vec![json!([]), json!("cpu"), json!(1)]),
            Value::Bool(false)
        );
        assert_eq!(call("matchesWorkspace", vec![json!(1), json!("root")]), Value::Bool(false));
        assert_eq!(call("costTier", vec![json!(null)]), Value::from("standard"));
    }

    #[test]
    fn wrong_argument_count_is_an_error() {
        let registry = FunctionRegistry::with_builtins();
        let err = registry.call("hasLabel", &[Value::Null]).unwrap_err();
        assert!(matches!(err, ExprError::InvalidArguments { got: 1, .. }));
    }

    #[test]
    fn unknown_function_is_an_error() {
        let err = FunctionRegistry::with_builtins().call("nope", &[]).unwrap_err();
        assert_eq!(err, ExprError::UnknownFunction("nope".to_string()));
    }

    #[test]
    fn in_region_reads_field_then_labels() {
        let direct = json!({"region": "us-east-1"});
        let labeled = json!({"labels": {"topology.kubernetes.io/region": "eu-west-1"}});
        assert_eq!(call("inRegion", vec![direct, json!("us-east-1")]), Value::Bool(true));
        assert_eq!(call("inRegion", vec![labeled.clone(), json!("eu-west-1")]), Value::Bool(true));
        assert_eq!(call("inRegion", vec![labeled, json!("us-east-1")]), Value::Bool(false));
    }

    #[test]
    fn has_capacity_compares_numerically() {
        let resources = json!({"cpu": 8, "available": {"memory": 1024.5}});
        let has = |resource: &str, amount: serde_json::Value| {
            call("hasCapacity", vec![resources.clone(), json!(resource), amount])
        };
        assert_eq!(has("cpu", json!(8)), Value::Bool(true));
        assert_eq!(has("cpu", json!(8.5)), Value::Bool(false));
        assert_eq!(has("available.memory", json!(1024)), Value::Bool(true));
        assert_eq!(has("gpu", json!(1)), Value::Bool(false));
    }

    #[test]
    fn workspace_matching() {
        let check =
            |ws: &str, pattern: &str| call("matchesWorkspace", vec![json!(ws), json!(pattern)]);
        assert_eq!(check("root:org:team", "root:org"), Value::Bool(true));
        assert_eq!(check("root:org", "root:org"), Value::Bool(true));
        assert_eq!(check("root:organization", "root:org"), Value::Bool(false));
        assert_eq!(check("root:acme:team:dev", "root:*:team"), Value::Bool(true));
        assert_eq!(check("root", "root:org"), Value::Bool(false));
        assert_eq!(check("anything", "*"), Value::Bool(true));

        let ws = json!({"path": "root:org"});
        assert_eq!(call("matchesWorkspace", vec![ws, json!("root")]), Value::Bool(true));
    }

    #[test]
    fn in_workspace_membership() {
        assert_eq!(
            call("inWorkspace", vec![json!("root:a"), json!(["root:b", "root:a"])]),
            Value::Bool(true)
        );
        assert_eq!(
            call("inWorkspace", vec![json!("root:a:x"), json!("root:a")]),
            Value::Bool(false)
        );
    }

    #[test]
    fn cost_tier_lookup_order() {
        assert_eq!(call("costTier", vec![json!({"costTier": "premium"})]), Value::from("premium"));
        assert_eq!(
            call("costTier", vec![json!({"labels": {"cost-tier": "economy"}})]),
            Value::from("economy")
        );
        assert_eq!(
            call("costTier", vec![json!({"annotations": {"costTier": "spot"}})]),
            Value::from("spot")
        );
        assert_eq!(call("costTier", vec![json!({"labels": {}})]), Value::from("standard"));
    }

    #[test]
    fn label_matches_uses_regex_and_fails_closed() {
        let labels = json!({"env": "prod-eu"});
        let matches = |pattern: &str| {
            call("labelMatches", vec![labels.clone(), json!("env"), json!(pattern)])
        };
        assert_eq!(matches("^prod-"), Value::Bool(true));
        assert_eq!(matches("("), Value::Bool(false));
    }

    #[test]
    fn standard_functions_raise_on_mismatch() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.call("size", &[Value::Int(1)]).is_err());
        assert_eq!(registry.call("size", &[Value::from("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(registry.call("int", &[Value::Double(2.9)]).unwrap(), Value::Int(2));
        assert!(registry.call("int", &[Value::from("x")]).is_err());
        let list = Value::List(vec![Value::Int(1)]);
        assert_eq!(
            registry.call("contains", &[list, Value::Double(1.0)]).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn custom_function_registration() {
        let mut registry = FunctionRegistry::with_builtins();
        let before = registry.len();
        registry.register(FunctionDef::new("double_it", 1, ValueType::Int, |args| {
            match &args[0] {
                Value::Int(i) => Ok(Value::Int(i * 2)),
                _ => Ok(Value::Int(0)),
            }
        }));
        assert_eq!(registry.len(), before + 1);
        assert!(!registry.get("double_it").unwrap().is_builtin());
        assert_eq!(registry.call("double_it", &[Value::Int(21)]).unwrap(), Value::Int(42));
    }
}
