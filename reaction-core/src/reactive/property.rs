//! Property Store
//!
//! One record per tracked name. A property is either a formula property,
//! whose value is derived from its formula and recomputed when an input
//! changes, or a stored property, whose value is whatever was last assigned.

use indexmap::IndexMap;
use serde::Serialize;

use crate::expr::Formula;
use crate::value::Value;

/// Whether a property's value is derived or assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Value set directly, never recomputed.
    Stored,
    /// Value derived from a formula.
    Formula,
}

/// How a property came to be tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Declaration {
    /// Declared by the caller.
    Explicit,
    /// Discovered as a free variable of another property's formula.
    Implicit,
}

/// A tracked property.
#[derive(Debug, Clone)]
pub struct Property {
    kind: PropertyKind,
    formula: Option<Formula>,
    value: Value,
    declaration: Declaration,
}

impl Property {
    pub(crate) fn stored(value: Value, declaration: Declaration) -> Self {
        Self {
            kind: PropertyKind::Stored,
            formula: None,
            value,
            declaration,
        }
    }

    pub(crate) fn with_formula(formula: Formula, value: Value, declaration: Declaration) -> Self {
        Self {
            kind: PropertyKind::Formula,
            formula: Some(formula),
            value,
            declaration,
        }
    }

    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    pub fn is_formula(&self) -> bool {
        self.kind == PropertyKind::Formula
    }

    /// The current formula. Present exactly when the property is a formula
    /// property.
    pub fn formula(&self) -> Option<&Formula> {
        self.formula.as_ref()
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn declaration(&self) -> Declaration {
        self.declaration
    }

    pub(crate) fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    /// Install a formula, turning a stored property into a formula property.
    /// The current value is kept until the next recomputation.
    pub(crate) fn set_formula(&mut self, formula: Formula) {
        self.kind = PropertyKind::Formula;
        self.formula = Some(formula);
    }

    /// Drop the formula, keeping the last computed value.
    pub(crate) fn demote(&mut self) {
        self.kind = PropertyKind::Stored;
        self.formula = None;
    }

    pub(crate) fn mark_explicit(&mut self) {
        self.declaration = Declaration::Explicit;
    }
}

/// All tracked properties of one context, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    properties: IndexMap<String, Property>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub(crate) fn get_mut(&mut self, name: &str) -> Option<&mut Property> {
        self.properties.get_mut(name)
    }

    pub(crate) fn insert(&mut self, name: &str, property: Property) {
        self.properties.insert(name.to_string(), property);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.properties.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> + '_ {
        self.properties.iter().map(|(name, property)| (name.as_str(), property))
    }
}

/// Serializable summary of a property, for inspection and debugging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyInfo {
    pub name: String,
    pub kind: PropertyKind,
    pub declaration: Declaration,
    pub formula: Option<String>,
    pub value: String,
}

impl PropertyInfo {
    pub(crate) fn new(name: &str, property: &Property) -> Self {
        Self {
            name: name.to_string(),
            kind: property.kind(),
            declaration: property.declaration(),
            formula: property.formula().map(|f| f.source().to_string()),
            value: property.value().to_display(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReactionConfig;

    fn formula(source: &str) -> Formula {
        Formula::parse(source, &ReactionConfig::default()).unwrap()
    }

    #[test]
    fn promotion_keeps_value() {
        let mut property = Property::stored(Value::from(10), Declaration::Implicit);
        assert!(!property.is_formula());
        assert!(property.formula().is_none());

        property.set_formula(formula("10"));
        property.mark_explicit();

        assert!(property.is_formula());
        assert_eq!(property.value(), &Value::from(10));
        assert_eq!(property.declaration(), Declaration::Explicit);
    }

    #[test]
    fn demotion_drops_formula() {
        let mut property = Property::with_formula(formula("a + 1"), Value::from(2), Declaration::Explicit);
        property.demote();
        assert_eq!(property.kind(), PropertyKind::Stored);
        assert!(property.formula().is_none());
        assert_eq!(property.value(), &Value::from(2));
    }

    #[test]
    fn store_preserves_declaration_order() {
        let mut store = PropertyStore::new();
        store.insert("hp", Property::stored(Value::Undefined, Declaration::Explicit));
        store.insert("con", Property::stored(Value::Undefined, Declaration::Implicit));

        assert_eq!(store.names().collect::<Vec<_>>(), ["hp", "con"]);
        assert_eq!(store.len(), 2);
        assert!(store.contains("con"));
    }

    #[test]
    fn info_serializes_to_json() {
        let property = Property::with_formula(formula("(con + siz)/2"), Value::from(11), Declaration::Explicit);
        let info = PropertyInfo::new("hp", &property);
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["kind"], "formula");
        assert_eq!(json["declaration"], "explicit");
        assert_eq!(json["formula"], "(con + siz)/2");
        assert_eq!(json["value"], "11");
    }
}
