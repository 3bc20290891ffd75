//! Observation layer: wrapped views over raw targets.
//!
//! Every read through an [`Observed`] view is reported with
//! [`track`](crate::track) and every effective write with
//! [`trigger`](crate::trigger). Records and lists are handled in [`base`],
//! sets and maps in [`collection`].

mod base;
mod collection;

use std::fmt;
use std::rc::{Rc, Weak};
use std::thread::LocalKey;

use fxhash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::addr::Addr;
use crate::dep::Key;
use crate::effect::{track, trigger, OpType, TriggerInfo};
use crate::error::Error;
use crate::target::{Kind, Target, TargetId};
use crate::value::Value;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Mode {
	/// Reads track, writes trigger.
	Mutable,
	/// Reads track, writes are refused.
	Readonly,
}

impl fmt::Display for Mode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Mode::Mutable => "reactive",
			Mode::Readonly => "readonly",
		})
	}
}

type ViewCache = std::cell::RefCell<FxHashMap<TargetId, Weak<ObservedBody>>>;

thread_local! {
	static RAW_TO_MUTABLE: ViewCache = ViewCache::default();
	static RAW_TO_READONLY: ViewCache = ViewCache::default();
}

fn views(mode: Mode) -> &'static LocalKey<ViewCache> {
	match mode {
		Mode::Mutable => &RAW_TO_MUTABLE,
		Mode::Readonly => &RAW_TO_READONLY,
	}
}

/// A tracking view over one [`Target`] in one [`Mode`].
///
/// At most one view per (target, mode) is alive at a time; wrapping the same
/// target again returns a handle to it.
#[derive(Clone)]
pub struct Observed {
	body: Rc<ObservedBody>,
}

struct ObservedBody {
	raw: Target,
	mode: Mode,
}

impl Drop for ObservedBody {
	fn drop(&mut self) {
		let this = Addr::of_ref(&*self);
		let id = self.raw.id();
		let _ = views(self.mode).try_with(|views| {
			if let Ok(mut views) = views.try_borrow_mut() {
				if views.get(&id).is_some_and(|view| Addr::of_weak(view) == this) {
					views.remove(&id);
				}
			}
		});
	}
}

fn cached_view(target: &Target, mode: Mode) -> Option<Observed> {
	let id = target.id();
	let body = views(mode).with(|views| views.borrow().get(&id).and_then(Weak::upgrade))?;
	Some(Observed { body })
}

fn create_view(target: &Target, mode: Mode) -> Observed {
	let id = target.id();
	let body = Rc::new(ObservedBody {
		raw: target.clone(),
		mode,
	});
	views(mode).with(|views| views.borrow_mut().insert(id, Rc::downgrade(&body)));
	trace!(target_id = %id, %mode, "created view");

	Observed { body }
}

/// Wraps `value` in `mode`, or explains why it cannot be wrapped.
pub fn try_wrap(value: &Value, mode: Mode) -> Result<Observed, Error> {
	let target = match value {
		// A readonly view is never loosened by a mutable wrap.
		Value::Observed(view) if view.mode() == mode || view.is_readonly() => return Ok(view.clone()),
		Value::Observed(view) => view.raw().clone(),
		Value::Target(target) => target.clone(),
		Value::Opaque(_) => return Err(Error::NotObservable),
		primitive => return Err(Error::NotAnObject(primitive.to_string())),
	};

	let mode = match mode {
		Mode::Mutable if target.is_marked_readonly() => Mode::Readonly,
		mode => mode,
	};

	// A live view outlives marks applied after it was created.
	if let Some(view) = cached_view(&target, mode) {
		return Ok(view);
	}

	if target.is_non_observable() {
		return Err(Error::NotObservable);
	}

	Ok(create_view(&target, mode))
}

/// Wraps `value` in `mode`.
///
/// Primitives are returned unchanged with a warning; opaque values and targets
/// marked non-observable are returned unchanged.
pub fn wrap(value: impl Into<Value>, mode: Mode) -> Value {
	let value = value.into();
	match try_wrap(&value, mode) {
		Ok(view) => Value::Observed(view),
		Err(err @ Error::NotAnObject(_)) => {
			warn!("{err}");
			value
		}
		Err(err) => {
			debug!(%mode, "{err}");
			value
		}
	}
}

pub fn reactive(value: impl Into<Value>) -> Value {
	wrap(value, Mode::Mutable)
}

pub fn readonly(value: impl Into<Value>) -> Value {
	wrap(value, Mode::Readonly)
}

/// The raw value behind a view; any other value is returned as-is.
pub fn unwrap(value: &Value) -> Value {
	match value {
		Value::Observed(view) => Value::Target(view.raw().clone()),
		other => other.clone(),
	}
}

pub fn is_wrapped(value: &Value) -> bool {
	matches!(value, Value::Observed(_))
}

pub fn is_readonly(value: &Value) -> bool {
	matches!(value, Value::Observed(view) if view.is_readonly())
}

/// Future mutable wraps of `target` produce readonly views instead.
pub fn mark_readonly(target: &Target) -> Target {
	target.set_readonly_mark();
	target.clone()
}

/// Future wraps of `target` return it unwrapped. A view that is still alive
/// keeps being returned until it drops.
pub fn mark_non_observable(target: &Target) -> Target {
	target.set_non_observable_mark();
	target.clone()
}

/// What every target kind supports through a view.
pub(crate) trait Handler {
	fn get(&self, view: &Observed, key: &Value) -> Value;
	fn has(&self, view: &Observed, key: &Value) -> bool;
	fn set(&self, view: &Observed, key: Value, value: Value);
	fn delete(&self, view: &Observed, key: &Value) -> bool;
	fn keys(&self, view: &Observed) -> Vec<Value>;
	fn len(&self, view: &Observed) -> usize;
	fn clear(&self, view: &Observed);

	fn values(&self, view: &Observed) -> Vec<Value> {
		self.keys(view).iter().map(|key| self.get(view, key)).collect()
	}

	fn entries(&self, view: &Observed) -> Vec<(Value, Value)> {
		self.keys(view)
			.into_iter()
			.map(|key| {
				let value = self.get(view, &key);
				(key, value)
			})
			.collect()
	}
}

fn handler(kind: Kind) -> &'static dyn Handler {
	match kind {
		Kind::Record => &base::RecordHandler,
		Kind::List => &base::ListHandler,
		Kind::Set => &collection::SetHandler,
		Kind::Map => &collection::MapHandler,
	}
}

impl Observed {
	pub fn raw(&self) -> &Target {
		&self.body.raw
	}

	pub fn mode(&self) -> Mode {
		self.body.mode
	}

	pub fn is_readonly(&self) -> bool {
		self.body.mode == Mode::Readonly
	}

	pub fn id(&self) -> TargetId {
		self.body.raw.id()
	}

	pub fn kind(&self) -> Kind {
		self.body.raw.kind()
	}

	pub fn ptr_eq(&self, other: &Observed) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	pub(crate) fn addr(&self) -> Addr {
		Addr::of(&self.body)
	}

	/// Reads `key`; composite results come back wrapped in this view's mode.
	pub fn get(&self, key: impl Into<Value>) -> Value {
		handler(self.kind()).get(self, &key.into())
	}

	pub fn has(&self, key: impl Into<Value>) -> bool {
		handler(self.kind()).has(self, &key.into())
	}

	pub fn set(&self, key: impl Into<Value>, value: impl Into<Value>) {
		if let Err(err) = self.try_set(key, value) {
			warn!(target_id = %self.id(), "{err}");
		}
	}

	pub fn try_set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<(), Error> {
		let key = key.into();
		self.check_writable("set", &key)?;
		handler(self.kind()).set(self, key, value.into());
		Ok(())
	}

	/// Removes `key`, returning whether it was present.
	pub fn delete(&self, key: impl Into<Value>) -> bool {
		let key = key.into();
		self.writable("delete", &key) && handler(self.kind()).delete(self, &key)
	}

	pub fn keys(&self) -> Vec<Value> {
		handler(self.kind()).keys(self)
	}

	pub fn values(&self) -> Vec<Value> {
		handler(self.kind()).values(self)
	}

	pub fn entries(&self) -> Vec<(Value, Value)> {
		handler(self.kind()).entries(self)
	}

	pub fn len(&self) -> usize {
		handler(self.kind()).len(self)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn clear(&self) {
		if self.writable("clear", &Value::Null) {
			handler(self.kind()).clear(self)
		}
	}

	/// Adds a member to a set, or appends to a list.
	pub fn add(&self, value: impl Into<Value>) {
		let value = value.into();
		if !self.writable("add", &value) {
			return;
		}
		match self.kind() {
			Kind::Set => collection::SetHandler.add(self, value),
			Kind::List => base::ListHandler.push(self, value),
			kind => self.unsupported("add", kind),
		}
	}

	pub fn push(&self, value: impl Into<Value>) {
		let value = value.into();
		if !self.writable("push", &value) {
			return;
		}
		match self.kind() {
			Kind::List => base::ListHandler.push(self, value),
			kind => self.unsupported("push", kind),
		}
	}

	pub fn pop(&self) -> Option<Value> {
		if !self.writable("pop", &Value::Null) {
			return None;
		}
		match self.kind() {
			Kind::List => base::ListHandler.pop(self),
			kind => {
				self.unsupported("pop", kind);
				None
			}
		}
	}

	/// Inserts into a list at `index`, shifting later items up.
	pub fn insert(&self, index: usize, value: impl Into<Value>) {
		if !self.writable("insert", &Value::from(index)) {
			return;
		}
		match self.kind() {
			Kind::List => base::ListHandler.insert(self, index, value.into()),
			kind => self.unsupported("insert", kind),
		}
	}

	pub(crate) fn track(&self, op: OpType, key: Key) {
		track(self.id(), op, key);
	}

	pub(crate) fn trigger(&self, op: OpType, key: Option<Key>, info: Option<TriggerInfo>) {
		trigger(self.id(), op, key, info);
	}

	/// Wraps composite values read out of this view, lazily, in its mode.
	pub(crate) fn wrap_child(&self, value: Value) -> Value {
		match value {
			Value::Target(_) => try_wrap(&value, self.mode()).map(Value::Observed).unwrap_or(value),
			other => other,
		}
	}

	/// Reports an `Add` for a new key, or a `Set` when an existing value changed.
	pub(crate) fn written(&self, key: Key, previous: Option<Value>, value: Value) {
		match previous {
			None => self.trigger(OpType::Add, Some(key), Some(TriggerInfo::added(value))),
			Some(old) if old != value => self.trigger(OpType::Set, Some(key), Some(TriggerInfo::changed(old, value))),
			Some(_) => {}
		}
	}

	pub(crate) fn unsupported(&self, op: &'static str, kind: Kind) {
		warn!(target_id = %self.id(), "{}", Error::Unsupported { op, kind });
	}

	fn check_writable(&self, op: &'static str, key: &Value) -> Result<(), Error> {
		match self.mode() {
			Mode::Mutable => Ok(()),
			Mode::Readonly => Err(Error::Readonly {
				op,
				key: key.to_string(),
			}),
		}
	}

	fn writable(&self, op: &'static str, key: &Value) -> bool {
		match self.check_writable(op, key) {
			Ok(()) => true,
			Err(err) => {
				warn!(target_id = %self.id(), "{err}");
				false
			}
		}
	}
}

impl PartialEq for Observed {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

impl Eq for Observed {}

impl fmt::Debug for Observed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Observed")
			.field("id", &self.id())
			.field("mode", &self.mode())
			.field("kind", &self.kind())
			.finish()
	}
}

/// Index of a list slot, if `key` names one.
pub(crate) fn index_of(key: &Value) -> Option<usize> {
	match key {
		Value::Int(i) => usize::try_from(*i).ok(),
		_ => None,
	}
}

/// Record field name for `key`; non-string keys use their display form.
pub(crate) fn prop_of(key: &Value) -> Rc<str> {
	match key {
		Value::Str(name) => name.clone(),
		other => other.to_string().into(),
	}
}
