use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::addr::Addr;
use crate::observe::Observed;
use crate::target::{Target, TargetId};

/// A dynamically typed value held by a [`Target`].
///
/// Equality follows identity semantics: primitives compare by value (floats by
/// their bit pattern, with every NaN equal to every other NaN), composites by
/// the allocation they point at.
#[derive(Clone, Default)]
pub enum Value {
	#[default]
	Null,
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(Rc<str>),
	Target(Target),
	Observed(Observed),
	Opaque(Opaque),
}

/// A composite value whose kind is outside the observable allow-list.
///
/// Wrapping it is a no-op: it is stored and returned as-is.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
	pub fn new<T: Any>(value: T) -> Self {
		Opaque(Rc::new(value))
	}

	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.0.downcast_ref()
	}

	pub fn ptr_eq(&self, other: &Opaque) -> bool {
		self.addr() == other.addr()
	}

	pub(crate) fn addr(&self) -> Addr {
		Addr::of(&self.0)
	}
}

/// Hashable, non-owning identity of a [`Value`].
///
/// Used as the dependency key of set members and map entries so the
/// dependency graph never keeps a composite key alive.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ValueKey {
	Null,
	Bool(bool),
	Int(i64),
	Float(u64),
	Str(Rc<str>),
	Target(TargetId),
	Opaque(Addr),
}

fn float_bits(value: f64) -> u64 {
	if value.is_nan() {
		f64::NAN.to_bits()
	} else {
		value.to_bits()
	}
}

impl Value {
	/// Identity key of this value; wrapped views key as their raw target.
	pub fn key(&self) -> ValueKey {
		match self {
			Value::Null => ValueKey::Null,
			Value::Bool(b) => ValueKey::Bool(*b),
			Value::Int(i) => ValueKey::Int(*i),
			Value::Float(f) => ValueKey::Float(float_bits(*f)),
			Value::Str(s) => ValueKey::Str(s.clone()),
			Value::Target(t) => ValueKey::Target(t.id()),
			Value::Observed(o) => ValueKey::Target(o.id()),
			Value::Opaque(o) => ValueKey::Opaque(o.addr()),
		}
	}

	/// `true` for targets, wrapped views and opaque composites.
	pub fn is_object(&self) -> bool {
		matches!(self, Value::Target(_) | Value::Observed(_) | Value::Opaque(_))
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Value::Null)
	}

	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Value::Bool(b) => Some(*b),
			_ => None,
		}
	}

	pub fn as_int(&self) -> Option<i64> {
		match self {
			Value::Int(i) => Some(*i),
			_ => None,
		}
	}

	pub fn as_float(&self) -> Option<f64> {
		match self {
			Value::Float(f) => Some(*f),
			Value::Int(i) => Some(*i as f64),
			_ => None,
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_target(&self) -> Option<&Target> {
		match self {
			Value::Target(t) => Some(t),
			_ => None,
		}
	}

	pub fn as_observed(&self) -> Option<&Observed> {
		match self {
			Value::Observed(o) => Some(o),
			_ => None,
		}
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::Null, Value::Null) => true,
			(Value::Bool(a), Value::Bool(b)) => a == b,
			(Value::Int(a), Value::Int(b)) => a == b,
			(Value::Float(a), Value::Float(b)) => float_bits(*a) == float_bits(*b),
			(Value::Str(a), Value::Str(b)) => a == b,
			(Value::Target(a), Value::Target(b)) => a.ptr_eq(b),
			(Value::Observed(a), Value::Observed(b)) => a.ptr_eq(b),
			(Value::Opaque(a), Value::Opaque(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

impl Eq for Value {}

impl Hash for Value {
	fn hash<H: Hasher>(&self, state: &mut H) {
		std::mem::discriminant(self).hash(state);
		match self {
			Value::Null => {}
			Value::Bool(b) => b.hash(state),
			Value::Int(i) => i.hash(state),
			Value::Float(f) => float_bits(*f).hash(state),
			Value::Str(s) => s.hash(state),
			Value::Target(t) => t.id().hash(state),
			Value::Observed(o) => o.addr().hash(state),
			Value::Opaque(o) => o.addr().hash(state),
		}
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Null => f.write_str("null"),
			Value::Bool(b) => Display::fmt(b, f),
			Value::Int(i) => Display::fmt(i, f),
			Value::Float(v) => Display::fmt(v, f),
			Value::Str(s) => f.write_str(s),
			Value::Target(t) => write!(f, "[{} {}]", t.kind(), t.id()),
			Value::Observed(o) => write!(f, "[{} {} {}]", o.mode(), o.kind(), o.id()),
			Value::Opaque(_) => f.write_str("[opaque]"),
		}
	}
}

impl Debug for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Value::Str(s) => Debug::fmt(s, f),
			other => Display::fmt(other, f),
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<i32> for Value {
	fn from(value: i32) -> Self {
		Value::Int(value.into())
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Int(value)
	}
}

impl From<usize> for Value {
	fn from(value: usize) -> Self {
		Value::Int(value as i64)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Str(value.into())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::Str(value.into())
	}
}

impl From<Rc<str>> for Value {
	fn from(value: Rc<str>) -> Self {
		Value::Str(value)
	}
}

impl From<Target> for Value {
	fn from(value: Target) -> Self {
		Value::Target(value)
	}
}

impl From<Observed> for Value {
	fn from(value: Observed) -> Self {
		Value::Observed(value)
	}
}

impl From<Opaque> for Value {
	fn from(value: Opaque) -> Self {
		Value::Opaque(value)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Value::Null, Into::into)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nan_is_same_value() {
		assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
		assert_ne!(Value::Float(0.0), Value::Float(-0.0));
		assert_ne!(Value::Int(1), Value::Float(1.0));
	}

	#[test]
	fn composites_compare_by_identity() {
		let a = Target::record();
		let b = Target::record();
		assert_eq!(Value::from(a.clone()), Value::from(a.clone()));
		assert_ne!(Value::from(a.clone()), Value::from(b));
		assert_eq!(Value::from(a.clone()).key(), ValueKey::Target(a.id()));

		let opaque = Opaque::new(3u8);
		assert_eq!(Value::from(opaque.clone()), Value::from(opaque.clone()));
		assert_eq!(opaque.downcast_ref::<u8>(), Some(&3));
	}
}
