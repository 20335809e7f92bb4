//! Ordered, ancestor-scoped queries.

use std::cmp::Ordering;

use gauge_types::Key;
use serde_json::Value;

use crate::cursor::Cursor;
use crate::entity::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
}

/// Equality filter. An array-valued property matches when any element equals `value`.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub property: String,
    pub value: Value,
}

impl Filter {
    /// Equality on the indexed value; array properties match any element.
    pub fn matches(&self, entity: &Entity) -> bool {
        match entity.indexed(&self.property) {
            Some(Value::Array(items)) => items.contains(&self.value),
            Some(value) => value == &self.value,
            None => false,
        }
    }
}

/// A range query over one namespace.
///
/// Results are ordered by `order`, then by key. Filters are ANDed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub namespace: Option<String>,
    /// `None` matches every kind (used for descendant sweeps).
    pub kind: Option<String>,
    pub ancestor: Option<Key>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub keys_only: bool,
    pub limit: Option<usize>,
    pub start: Option<Cursor>,
}

impl Query {
    /// All entities of `kind` in `namespace`.
    pub fn kind(namespace: Option<&str>, kind: impl Into<String>) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    /// Every strict descendant of `ancestor`, of any kind.
    pub fn descendants(ancestor: &Key) -> Self {
        Self {
            namespace: ancestor.namespace().map(str::to_string),
            ancestor: Some(ancestor.clone()),
            ..Self::default()
        }
    }

    pub fn with_ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn filter(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            property: property.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_asc(mut self, property: impl Into<String>) -> Self {
        self.order.push(Order {
            property: property.into(),
            direction: Direction::Ascending,
        });
        self
    }

    pub fn order_desc(mut self, property: impl Into<String>) -> Self {
        self.order.push(Order {
            property: property.into(),
            direction: Direction::Descending,
        });
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    /// At most `limit` results per run.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume after the position a previous run ended on.
    pub fn start(mut self, cursor: Cursor) -> Self {
        self.start = Some(cursor);
        self
    }

    /// `true` if the entity is in scope and passes every filter.
    ///
    /// Entities missing an ordered property are not in that index and never match.
    pub fn matches(&self, entity: &Entity) -> bool {
        let key = &entity.key;
        if key.namespace() != self.namespace.as_deref() {
            return false;
        }
        if let Some(kind) = &self.kind {
            if key.kind() != kind {
                return false;
            }
        }
        if let Some(ancestor) = &self.ancestor {
            if !key.is_descendant_of(ancestor) {
                return false;
            }
        }
        if !self.filters.iter().all(|f| f.matches(entity)) {
            return false;
        }
        self.order
            .iter()
            .all(|o| entity.indexed(&o.property).is_some())
    }

    /// Values of the ordered properties, in order.
    pub fn sort_values(&self, entity: &Entity) -> Vec<Value> {
        self.order
            .iter()
            .map(|o| entity.indexed(&o.property).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Compare two positions `(sort values, key)` in this query's order.
    pub fn compare_positions(
        &self,
        a: (&[Value], &Key),
        b: (&[Value], &Key),
    ) -> Ordering {
        for (i, order) in self.order.iter().enumerate() {
            let ord = compare_values(
                a.0.get(i).unwrap_or(&Value::Null),
                b.0.get(i).unwrap_or(&Value::Null),
            );
            let ord = match order.direction {
                Direction::Ascending => ord,
                Direction::Descending => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.1.cmp(b.1)
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over property values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Properties;
    use serde_json::json;

    fn entity(ns: &str, kind: &str, name: &str, props: Value) -> Entity {
        let Value::Object(map) = props else {
            panic!("props must be an object")
        };
        Entity::new(Key::root(Some(ns), kind, name).unwrap(), map)
    }

    #[test]
    fn array_filter_matches_any_element() {
        let e = entity("ns", "Component", "a", json!({"tags": ["ui", "forms"]}));
        let q = Query::kind(Some("ns"), "Component")
            .filter("tags", "ui")
            .filter("tags", "forms");
        assert!(q.matches(&e));

        let q = q.filter("tags", "charts");
        assert!(!q.matches(&e));
    }

    #[test]
    fn unindexed_property_never_matches() {
        let e = entity("ns", "Version", "1.0.0", json!({"docs": "x"})).with_unindexed(["docs"]);
        assert!(!Query::kind(Some("ns"), "Version").filter("docs", "x").matches(&e));
        assert!(!Query::kind(Some("ns"), "Version").order_asc("docs").matches(&e));
    }

    #[test]
    fn scope_checks() {
        let parent = Key::root(Some("ns"), "Run", "r1").unwrap();
        let child = Entity::new(parent.child("Log", "1").unwrap(), Properties::new());

        assert!(Query::descendants(&parent).matches(&child));
        assert!(!Query::kind(Some("other"), "Log").matches(&child));
        assert!(Query::kind(Some("ns"), "Log").matches(&child));
        assert!(!Query::kind(Some("ns"), "Run").matches(&child));
    }

    #[test]
    fn descending_order_then_key() {
        let q = Query::kind(None, "Run").order_desc("created");
        let k1 = Key::root(None, "Run", "a").unwrap();
        let k2 = Key::root(None, "Run", "b").unwrap();
        let newer = [json!("2024-02-01")];
        let older = [json!("2024-01-01")];

        assert_eq!(q.compare_positions((&newer[..], &k2), (&older[..], &k1)), Ordering::Less);
        assert_eq!(q.compare_positions((&older[..], &k1), (&older[..], &k2)), Ordering::Less);
    }

    #[test]
    fn value_ordering() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 2, 0])), Ordering::Less);
    }
}
