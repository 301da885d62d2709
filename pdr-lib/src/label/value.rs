use std::fmt::{self, Display};

use serde::Serialize;

use super::Block;

/// A number paired with an optional unit, e.g., `-0.785042 <rad>`.
///
/// Equality only considers the numeric component.
#[derive(Debug, Clone, Serialize)]
pub struct Quantity {
    pub value: f64,
    pub units: Option<String>,
}

impl Quantity {
    pub fn new(value: f64, units: Option<&str>) -> Self {
        Self {
            value,
            units: units.map(str::to_string),
        }
    }

    /// True when the units are `<BYTES>` (case-insensitive).
    pub fn is_bytes(&self) -> bool {
        self.units
            .as_deref()
            .is_some_and(|u| u.trim().eq_ignore_ascii_case("BYTES"))
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

/// A single label value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
    Quantity(Quantity),
    /// An ordered `( ... )` collection.
    Sequence(Vec<Value>),
    /// A `{ ... }` collection. Element order is kept as written.
    Set(Vec<Value>),
    Block(Block),
}

impl Value {
    /// Integer view. Reals with no fractional part and quantities also qualify.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Real(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Value::Quantity(q) if q.value.fract() == 0.0 && q.value.is_finite() => {
                Some(q.value as i64)
            }
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Quantity(q) => Some(q.value),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Value::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Elements of a sequence or set.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(v) | Value::Set(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_quantity(&self) -> Option<&Quantity> {
        match self {
            Value::Quantity(q) => Some(q),
            _ => None,
        }
    }

    pub fn is_block(&self) -> bool {
        matches!(self, Value::Block(_))
    }

    /// Copy of this value with quantities replaced by their numeric component, including
    /// quantities nested in collections.
    #[must_use]
    pub fn unwrapped(&self) -> Value {
        match self {
            Value::Quantity(q) => Value::Real(q.value),
            Value::Sequence(v) => Value::Sequence(v.iter().map(Value::unwrapped).collect()),
            Value::Set(v) => Value::Set(v.iter().map(Value::unwrapped).collect()),
            other => other.clone(),
        }
    }

    /// Human-readable name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Quantity(_) => "quantity",
            Value::Sequence(_) => "sequence",
            Value::Set(_) => "set",
            Value::Block(_) => "block",
        }
    }
}

fn join(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{v}")?;
    }
    Ok(())
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v:?}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Quantity(q) => match &q.units {
                Some(u) => write!(f, "{:?} <{u}>", q.value),
                None => write!(f, "{:?}", q.value),
            },
            Value::Sequence(v) => {
                write!(f, "(")?;
                join(f, v)?;
                write!(f, ")")
            }
            Value::Set(v) => {
                write!(f, "{{")?;
                join(f, v)?;
                write!(f, "}}")
            }
            Value::Block(b) => write!(f, "<block of {} entries>", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Block> for Value {
    fn from(v: Block) -> Self {
        Value::Block(v)
    }
}

impl From<Quantity> for Value {
    fn from(v: Quantity) -> Self {
        Value::Quantity(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantity_equality_ignores_units() {
        assert_eq!(
            Quantity::new(1.0, Some("rad")),
            Quantity::new(1.0, Some("deg"))
        );
        assert!(Quantity::new(10.0, Some(" bytes ")).is_bytes());
    }

    #[test]
    fn unwrapped_reaches_into_sequences() {
        let v = Value::Sequence(vec![
            Quantity::new(-0.5, Some("rad")).into(),
            Quantity::new(2.0, Some("rad")).into(),
        ]);
        assert_eq!(
            v.unwrapped(),
            Value::Sequence(vec![Value::Real(-0.5), Value::Real(2.0)])
        );
    }

    #[test]
    fn display() {
        let v = Value::Sequence(vec![1.into(), "A".into(), Value::Set(vec![2.into()])]);
        assert_eq!(v.to_string(), "(1, A, {2})");
    }

    #[test]
    fn integer_views() {
        assert_eq!(Value::Real(3.0).as_i64(), Some(3));
        assert_eq!(Value::Real(3.5).as_i64(), None);
        assert_eq!(Value::Text(" 12 ".into()).as_i64(), Some(12));
        let q: Value = Quantity::new(300.0, Some("BYTES")).into();
        assert_eq!(q.as_i64(), Some(300));
    }
}
