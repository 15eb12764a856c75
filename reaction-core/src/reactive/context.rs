//! Reactive Context
//!
//! The context owns the property store and the dependency graph, and is the
//! only thing that writes to either. Every assignment goes through [`set`],
//! which decides whether the value is a literal or a formula, keeps the graph
//! in step with the formula's free variables, and recomputes everything
//! downstream before returning.
//!
//! # Write path
//!
//! For a formula property:
//!
//! 1. Parse the formula text and collect its free variables, minus built-ins.
//! 2. Reject the write if the new edges would close a cycle. Nothing has
//!    been touched yet, so the previous formula stays in effect.
//! 3. Declare any free variable that is not yet tracked, as a monitor-only
//!    property.
//! 4. Replace the property's edges, install the formula, recompute it.
//! 5. Cascade to every transitive dependent in topological order.
//!
//! For a stored property only steps 4 and 5 apply, with the assigned value
//! taking the place of the recomputation.
//!
//! [`set`]: ReactiveContext::set

use indexmap::IndexMap;
use tracing::{debug, debug_span, trace};

use super::property::{Declaration, Property, PropertyInfo, PropertyStore};
use crate::builtins;
use crate::config::ReactionConfig;
use crate::error::{ReactionError, Result};
use crate::expr::{is_identifier, is_keyword, Bindings, Evaluator, Formula, Interpreter};
use crate::graph::{DependencyGraph, UpdateScheduler};
use crate::serialize::{serialize, FALLBACK_FORMULA};
use crate::value::{format_number, Object, Value};

/// Options accepted by [`ReactiveContext::declare`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeclareOptions {
    /// Track the name for dependency purposes, but treat assignments to it
    /// as literal values rather than formulas.
    pub monitor_only: bool,
}

impl DeclareOptions {
    pub fn monitor_only() -> Self {
        Self { monitor_only: true }
    }
}

/// An object whose properties recompute when their inputs change.
///
/// # Example
///
/// ```
/// use reaction_core::ReactiveContext;
///
/// let mut sheet = ReactiveContext::new();
/// sheet.reactive(["hp", "damageLoss"]).unwrap();
/// sheet.set("hp", "(con + siz)/2").unwrap();
/// sheet.set("damageLoss", "hp / 10").unwrap();
///
/// sheet.set("con", 10).unwrap();
/// sheet.set("siz", 12).unwrap();
/// assert_eq!(sheet.get("hp").as_number(), Some(11.0));
///
/// sheet.set("siz", 16).unwrap();
/// assert_eq!(sheet.get("damageLoss").as_number(), Some(1.3));
/// ```
pub struct ReactiveContext<E = Interpreter> {
    config: ReactionConfig,
    evaluator: E,
    store: PropertyStore,
    graph: DependencyGraph,
    /// Plain values written to names that are not tracked.
    ambient: Object,
}

impl ReactiveContext<Interpreter> {
    /// Create an empty context with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ReactionConfig::default())
    }

    /// Create an empty context evaluating formulas with the built-in
    /// interpreter under `config`.
    pub fn with_config(config: ReactionConfig) -> Self {
        let evaluator = Interpreter::new(config.clone());
        Self::with_evaluator(evaluator, config)
    }

    /// Wrap an existing object. Its entries start out as untracked values
    /// and are adopted by the first declaration of the same name.
    pub fn from_object(object: Object) -> Self {
        let mut context = Self::new();
        context.ambient = object;
        context
    }
}

impl Default for ReactiveContext<Interpreter> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Evaluator> ReactiveContext<E> {
    /// Create an empty context that evaluates formulas with `evaluator`.
    pub fn with_evaluator(evaluator: E, config: ReactionConfig) -> Self {
        Self {
            config,
            evaluator,
            store: PropertyStore::new(),
            graph: DependencyGraph::new(),
            ambient: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &ReactionConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Declare `names` as tracked properties.
    ///
    /// Every name is validated before any is declared. A name already
    /// tracked as monitor-only is promoted to a formula property when
    /// declared without `monitor_only`, keeping its current value.
    pub fn declare<I, S>(&mut self, names: I, options: DeclareOptions) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<S> = names.into_iter().collect();
        for name in &names {
            validate_name(name.as_ref())?;
        }
        for name in &names {
            self.declare_one(name.as_ref(), options.monitor_only, Declaration::Explicit)?;
        }
        Ok(())
    }

    /// Declare `names` as formula properties.
    pub fn reactive<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.declare(names, DeclareOptions::default())
    }

    /// Declare `names` as monitor-only properties.
    pub fn monitor<I, S>(&mut self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.declare(names, DeclareOptions::monitor_only())
    }

    /// Assign to `name`.
    ///
    /// On a formula property, strings are formula text and numbers are
    /// constant formulas; any other value is converted to formula text with
    /// [`serialize`]. On a stored property the value is stored as is. Names
    /// that are not tracked receive a plain value and trigger nothing.
    ///
    /// Either way, every transitive dependent is recomputed before this
    /// returns.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let _span = debug_span!("set", property = name).entered();

        let Some(property) = self.store.get(name) else {
            trace!(property = name, "untracked write");
            self.ambient.insert(name.to_string(), value);
            return Ok(());
        };

        if property.is_formula() {
            let source = match value {
                Value::String(text) => text,
                Value::Number(n) => format_number(n),
                other => serialize(&other),
            };
            self.define_formula(name, &source)
        } else {
            self.assign_value(name, value)
        }
    }

    /// Give `name` the formula `source`, declaring it if needed.
    pub fn set_formula(&mut self, name: &str, source: &str) -> Result<()> {
        validate_name(name)?;
        let _span = debug_span!("set_formula", property = name).entered();
        self.define_formula(name, source)
    }

    /// Store a literal in `name`, declaring it if needed. A formula property
    /// loses its formula and its dependency edges; its dependents keep
    /// reading it.
    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        validate_name(name)?;
        let _span = debug_span!("set_value", property = name).entered();

        if !self.store.contains(name) {
            self.declare_one(name, true, Declaration::Explicit)?;
        }
        if let Some(property) = self.store.get_mut(name) {
            if property.is_formula() {
                property.demote();
                self.graph.clear_dependencies(name);
                debug!(property = name, "formula replaced by a stored value");
            }
        }
        self.assign_value(name, value.into())
    }

    /// Current value of `name`. Unknown names read as `undefined`.
    pub fn get(&self, name: &str) -> Value {
        self.value(name).cloned().unwrap_or_default()
    }

    /// Current value of `name`, tracked or not.
    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.store.get(name) {
            Some(property) => Some(property.value()),
            None => self.ambient.get(name),
        }
    }

    /// True for tracked and untracked names alike.
    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(name) || self.ambient.contains_key(name)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.store.contains(name)
    }

    pub fn is_formula(&self, name: &str) -> bool {
        self.store.get(name).is_some_and(Property::is_formula)
    }

    /// Formula text of `name`, if it is a formula property.
    pub fn formula(&self, name: &str) -> Option<&str> {
        self.store.get(name)?.formula().map(Formula::source)
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.store.get(name)
    }

    /// Direct dependencies of `name`.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.graph.dependencies(name).collect()
    }

    /// Direct dependents of `name`.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.graph.dependents(name).collect()
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Tracked names in declaration order, then untracked names.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.store.names().chain(self.ambient.keys().map(String::as_str))
    }

    pub fn len(&self) -> usize {
        self.store.len() + self.ambient.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every tracked property.
    pub fn properties(&self) -> Vec<PropertyInfo> {
        self.store
            .iter()
            .map(|(name, property)| PropertyInfo::new(name, property))
            .collect()
    }

    fn declare_one(&mut self, name: &str, monitor_only: bool, declaration: Declaration) -> Result<()> {
        if let Some(property) = self.store.get(name) {
            let promoted = if !monitor_only && !property.is_formula() {
                Some(self.snapshot(name, property.value())?)
            } else {
                None
            };
            if let Some(property) = self.store.get_mut(name) {
                if let Some(formula) = promoted {
                    debug!(property = name, formula = formula.source(), "promoted to formula property");
                    property.set_formula(formula);
                }
                if declaration == Declaration::Explicit {
                    property.mark_explicit();
                }
            }
            return Ok(());
        }

        let value = self.ambient.shift_remove(name).unwrap_or_default();
        let property = if monitor_only {
            Property::stored(value, declaration)
        } else {
            let formula = self.snapshot(name, &value)?;
            Property::with_formula(formula, value, declaration)
        };
        debug!(property = name, monitor_only, ?declaration, "declared");
        self.store.insert(name, property);
        Ok(())
    }

    /// Constant formula reproducing `value`.
    fn snapshot(&self, name: &str, value: &Value) -> Result<Formula> {
        Formula::parse(&serialize(value), &self.config)
            .or_else(|_| Formula::parse(FALLBACK_FORMULA, &self.config))
            .map_err(|error| ReactionError::from_eval(name, error))
    }

    fn define_formula(&mut self, name: &str, source: &str) -> Result<()> {
        let formula =
            Formula::parse(source, &self.config).map_err(|error| ReactionError::from_eval(name, error))?;
        let deps: Vec<String> = formula
            .free_variables()
            .filter(|var| !builtins::is_builtin(var))
            .map(str::to_string)
            .collect();

        self.graph.check_acyclic(name, &deps)?;

        if !self.store.contains(name) {
            self.declare_one(name, false, Declaration::Explicit)?;
        }
        for dep in &deps {
            if !self.store.contains(dep) {
                self.declare_one(dep, true, Declaration::Implicit)?;
            }
        }
        self.graph.add_dependencies(name, &deps)?;

        debug!(property = name, formula = source, dependencies = ?deps, "formula accepted");
        if let Some(property) = self.store.get_mut(name) {
            property.set_formula(formula);
        }

        self.recompute(name)?;
        self.cascade(name)
    }

    fn assign_value(&mut self, name: &str, value: Value) -> Result<()> {
        trace!(property = name, %value, "stored");
        if let Some(property) = self.store.get_mut(name) {
            property.set_value(value);
        }
        self.cascade(name)
    }

    /// Re-evaluate the formula of `name` against the current values of its
    /// free variables. On failure the previous value is kept.
    fn recompute(&mut self, name: &str) -> Result<()> {
        let Some(formula) = self.store.get(name).and_then(Property::formula) else {
            return Ok(());
        };

        let bindings: Bindings = formula
            .free_variables()
            .map(|var| {
                let value = builtins::lookup(var).unwrap_or_else(|| self.get(var));
                (var.to_string(), value)
            })
            .collect();

        let value = self
            .evaluator
            .evaluate(formula, &bindings)
            .map_err(|error| ReactionError::from_eval(name, error))?;

        trace!(property = name, %value, "recomputed");
        if let Some(property) = self.store.get_mut(name) {
            property.set_value(value);
        }
        Ok(())
    }

    fn cascade(&mut self, name: &str) -> Result<()> {
        let order: Vec<String> = UpdateScheduler::new(&self.graph)
            .mark_changed(name)
            .into_iter()
            .map(str::to_string)
            .collect();
        if order.is_empty() {
            return Ok(());
        }

        debug!(property = name, affected = order.len(), "cascading");
        for dependent in &order {
            self.recompute(dependent)?;
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    if !is_identifier(name) {
        return Err(ReactionError::InvalidName {
            name: name.to_string(),
        });
    }
    if is_keyword(name) || builtins::is_builtin(name) {
        return Err(ReactionError::ReservedName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalError;
    use crate::reactive::PropertyKind;

    fn number(context: &ReactiveContext<impl Evaluator>, name: &str) -> Option<f64> {
        context.get(name).as_number()
    }

    #[test]
    fn stored_values_cascade() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["hp"]).unwrap();
        sheet.set("hp", "(con + siz)/2").unwrap();

        sheet.set("con", 10).unwrap();
        assert!(number(&sheet, "hp").unwrap().is_nan());

        sheet.set("siz", 12).unwrap();
        assert_eq!(number(&sheet, "hp"), Some(11.0));
    }

    #[test]
    fn free_variables_are_declared_monitor_only() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["hp"]).unwrap();
        sheet.set("hp", "(con + siz)/2").unwrap();

        let con = sheet.property("con").unwrap();
        assert_eq!(con.kind(), PropertyKind::Stored);
        assert_eq!(con.declaration(), Declaration::Implicit);
        assert_eq!(sheet.dependencies("hp"), ["con", "siz"]);
        assert_eq!(sheet.dependents("con"), ["hp"]);
    }

    #[test]
    fn numbers_are_constant_formulas() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["edu"]).unwrap();
        sheet.set("edu", 6).unwrap();

        assert_eq!(sheet.formula("edu"), Some("6"));
        assert_eq!(number(&sheet, "edu"), Some(6.0));
    }

    #[test]
    fn composite_values_assigned_to_formulas_are_serialized() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["stats"]).unwrap();
        sheet.set("stats", Value::array([1, 2])).unwrap();

        assert_eq!(sheet.formula("stats"), Some("[1,2]"));
        assert_eq!(sheet.get("stats"), Value::array([1, 2]));
    }

    #[test]
    fn ambient_values_are_adopted_on_declaration() {
        let mut object = Object::new();
        object.insert("str".into(), Value::from(14));
        let mut sheet = ReactiveContext::from_object(object);

        assert!(!sheet.is_declared("str"));
        assert_eq!(number(&sheet, "str"), Some(14.0));

        sheet.reactive(["dmg"]).unwrap();
        sheet.set("dmg", "str * 2").unwrap();

        assert!(sheet.is_declared("str"));
        assert_eq!(number(&sheet, "dmg"), Some(28.0));
    }

    #[test]
    fn untracked_writes_do_not_declare() {
        let mut sheet = ReactiveContext::new();
        sheet.set("note", "just text").unwrap();

        assert!(!sheet.is_declared("note"));
        assert_eq!(sheet.get("note").as_str(), Some("just text"));
        assert_eq!(sheet.len(), 1);
    }

    #[test]
    fn promotion_keeps_current_value() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["hp"]).unwrap();
        sheet.set("hp", "con * 2").unwrap();
        sheet.set("con", 7).unwrap();

        sheet.reactive(["con"]).unwrap();
        assert!(sheet.is_formula("con"));
        assert_eq!(sheet.formula("con"), Some("7"));
        assert_eq!(number(&sheet, "hp"), Some(14.0));

        // Now a formula property, so strings are formulas.
        sheet.set("con", "3 + 4 + 1").unwrap();
        assert_eq!(number(&sheet, "hp"), Some(16.0));
    }

    #[test]
    fn redeclaring_is_a_no_op() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["hp"]).unwrap();
        sheet.set("hp", "con + 1").unwrap();
        sheet.set("con", 1).unwrap();

        sheet.reactive(["hp"]).unwrap();
        sheet.monitor(["con"]).unwrap();

        assert_eq!(sheet.formula("hp"), Some("con + 1"));
        assert_eq!(number(&sheet, "hp"), Some(2.0));
        assert!(!sheet.is_formula("con"));
    }

    #[test]
    fn cycle_leaves_previous_formula_in_effect() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["mood", "humor"]).unwrap();
        sheet.set("mood", "humor + 1").unwrap();
        sheet.set("humor", 1).unwrap();

        let err = sheet.set("humor", "mood * 2").unwrap_err();
        assert_eq!(err, ReactionError::CycleDetected { name: "humor".into() });

        assert_eq!(sheet.formula("humor"), Some("1"));
        assert_eq!(sheet.dependents("mood"), Vec::<&str>::new());
        assert_eq!(number(&sheet, "mood"), Some(2.0));
    }

    #[test]
    fn rejected_formula_declares_nothing() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["a"]).unwrap();
        sheet.set("a", "a + fresh").unwrap_err();
        assert!(!sheet.is_declared("fresh"));
    }

    #[test]
    fn syntax_errors_are_reported_before_any_change() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["hp"]).unwrap();
        sheet.set("hp", "con + 1").unwrap();

        let err = sheet.set("hp", "(con +").unwrap_err();
        assert!(matches!(
            err,
            ReactionError::Evaluation {
                source: EvalError::Syntax { .. },
                ..
            }
        ));
        assert_eq!(sheet.formula("hp"), Some("con + 1"));
    }

    #[test]
    fn set_value_demotes_formula() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["hp", "damageLoss"]).unwrap();
        sheet.set("hp", "con * 2").unwrap();
        sheet.set("damageLoss", "hp / 10").unwrap();

        sheet.set_value("hp", 50).unwrap();

        assert!(!sheet.is_formula("hp"));
        assert!(sheet.dependencies("hp").is_empty());
        assert!(sheet.dependents("con").is_empty());
        assert_eq!(number(&sheet, "damageLoss"), Some(5.0));

        // Later writes to the old input no longer reach it.
        sheet.set("con", 4).unwrap();
        assert_eq!(number(&sheet, "hp"), Some(50.0));
    }

    #[test]
    fn set_formula_declares_and_promotes() {
        let mut sheet = ReactiveContext::new();
        sheet.set_formula("idea", "edu * 5").unwrap();
        sheet.set("edu", 6).unwrap();

        assert!(sheet.is_formula("idea"));
        assert_eq!(number(&sheet, "idea"), Some(30.0));

        sheet.set_formula("edu", "2 * 3 + 1").unwrap();
        assert!(sheet.is_formula("edu"));
        assert_eq!(number(&sheet, "idea"), Some(35.0));
    }

    #[test]
    fn reserved_and_invalid_names_are_rejected() {
        let mut sheet = ReactiveContext::new();

        let err = sheet.reactive(["ok", "Math"]).unwrap_err();
        assert_eq!(err, ReactionError::ReservedName { name: "Math".into() });
        assert!(!sheet.is_declared("ok"));

        let err = sheet.monitor(["new"]).unwrap_err();
        assert_eq!(err, ReactionError::ReservedName { name: "new".into() });

        let err = sheet.set_formula("2fast", "1").unwrap_err();
        assert_eq!(err, ReactionError::InvalidName { name: "2fast".into() });
    }

    #[test]
    fn builtins_resolve_without_declaration() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["best"]).unwrap();
        sheet.set("best", "Math.max(con, siz)").unwrap();
        sheet.set("con", 10).unwrap();
        sheet.set("siz", 12).unwrap();

        assert_eq!(number(&sheet, "best"), Some(12.0));
        assert!(!sheet.is_declared("Math"));
        assert_eq!(sheet.dependencies("best"), ["con", "siz"]);
    }

    #[test]
    fn properties_snapshot_lists_tracked_names() {
        let mut sheet = ReactiveContext::new();
        sheet.reactive(["hp"]).unwrap();
        sheet.set("hp", "con + 1").unwrap();
        sheet.set("loose", 3).unwrap();

        let names: Vec<String> = sheet.properties().into_iter().map(|info| info.name).collect();
        assert_eq!(names, ["hp", "con"]);
        assert_eq!(sheet.keys().collect::<Vec<_>>(), ["hp", "con", "loose"]);
    }
}
