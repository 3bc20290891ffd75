use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use fxhash::{FxBuildHasher, FxHashMap};
use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::effect::{Effect, OpType};
use crate::target::TargetId;
use crate::value::ValueKey;

/// Key of a dependency within one target.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Key {
	/// Named field of a record.
	Prop(Rc<str>),
	/// Slot of a list.
	Index(usize),
	/// Member of a set or key of a map.
	Value(ValueKey),
	/// The target's shape: its key set, length and iteration order.
	Iterate,
}

impl fmt::Display for Key {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Key::Prop(name) => f.write_str(name),
			Key::Index(index) => write!(f, "[{index}]"),
			Key::Value(key) => write!(f, "{key:?}"),
			Key::Iterate => f.write_str("<iterate>"),
		}
	}
}

impl From<&str> for Key {
	fn from(name: &str) -> Self {
		Key::Prop(name.into())
	}
}

impl From<usize> for Key {
	fn from(index: usize) -> Self {
		Key::Index(index)
	}
}

/// The set of effects subscribed to one (target, key) pair.
///
/// Compared by identity. Subscribers keep their insertion order, which is the
/// order they are dispatched in within their group.
#[derive(Clone, Default)]
pub struct Dep {
	subscribers: Rc<RefCell<SmallVec<[Effect; 4]>>>,
}

impl Dep {
	pub fn ptr_eq(&self, other: &Dep) -> bool {
		Rc::ptr_eq(&self.subscribers, &other.subscribers)
	}

	pub fn contains(&self, effect: &Effect) -> bool {
		self.subscribers.borrow().iter().any(|e| e.ptr_eq(effect))
	}

	pub fn len(&self) -> usize {
		self.subscribers.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub(crate) fn add(&self, effect: Effect) {
		self.subscribers.borrow_mut().push(effect);
	}

	pub(crate) fn remove(&self, effect: &Effect) {
		// The removed handle may be the last one; drop it after the borrow ends.
		let removed = {
			let mut subscribers = self.subscribers.borrow_mut();
			subscribers
				.iter()
				.position(|e| e.ptr_eq(effect))
				.map(|index| subscribers.remove(index))
		};
		drop(removed);
	}

	pub(crate) fn subscribers(&self) -> SmallVec<[Effect; 4]> {
		self.subscribers.borrow().clone()
	}

	fn take(&self) -> SmallVec<[Effect; 4]> {
		std::mem::take(&mut *self.subscribers.borrow_mut())
	}
}

impl fmt::Debug for Dep {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dep").field("subscribers", &self.len()).finish()
	}
}

type DepsMap = IndexMap<Key, Dep, FxBuildHasher>;

thread_local! {
	static TARGET_MAP: RefCell<FxHashMap<TargetId, DepsMap>> = RefCell::new(FxHashMap::default());
}

/// Locates the dependency for `(target, key)`, creating it and the target's
/// dependency map on first use.
pub(crate) fn dep_for(target: TargetId, key: Key) -> Dep {
	TARGET_MAP.with(|map| {
		map.borrow_mut()
			.entry(target)
			.or_default()
			.entry(key)
			.or_default()
			.clone()
	})
}

/// Dependencies a mutation of `op` on `key` has to notify, or `None` when the
/// target was never tracked.
pub(crate) fn affected(target: TargetId, op: OpType, key: Option<&Key>) -> Option<SmallVec<[Dep; 4]>> {
	TARGET_MAP.with(|map| {
		let map = map.borrow();
		let deps = map.get(&target)?;

		let mut affected = SmallVec::new();
		if op == OpType::Clear {
			affected.extend(deps.values().cloned());
			return Some(affected);
		}

		if let Some(dep) = key.and_then(|key| deps.get(key)) {
			affected.push(dep.clone());
		}

		if matches!(op, OpType::Add | OpType::Delete) {
			if let Some(dep) = deps.get(&Key::Iterate) {
				if !affected.iter().any(|d: &Dep| d.ptr_eq(dep)) {
					affected.push(dep.clone());
				}
			}
		}

		Some(affected)
	})
}

/// `true` once anything has tracked a key of `target`.
pub fn is_tracked(target: TargetId) -> bool {
	TARGET_MAP.with(|map| map.borrow().contains_key(&target))
}

/// Number of effects currently subscribed to `(target, key)`.
pub fn subscriber_count(target: TargetId, key: &Key) -> usize {
	TARGET_MAP.with(|map| {
		map.borrow()
			.get(&target)
			.and_then(|deps| deps.get(key))
			.map_or(0, Dep::len)
	})
}

pub(crate) fn lookup(target: TargetId, key: &Key) -> Option<Dep> {
	TARGET_MAP.with(|map| map.borrow().get(&target).and_then(|deps| deps.get(key)).cloned())
}

/// Drops every dependency recorded for `target` and unsubscribes the effects
/// that held them.
///
/// [`Target`](crate::Target)s call this when they are dropped. Reactive
/// primitives that minted their own [`TargetId`] call it themselves.
pub fn release(target: TargetId) {
	let deps = TARGET_MAP
		.try_with(|map| map.try_borrow_mut().ok().and_then(|mut map| map.remove(&target)))
		.ok()
		.flatten();

	let Some(deps) = deps else {
		return;
	};

	trace!(target_id = %target, deps = deps.len(), "released target");

	for dep in deps.values() {
		let subscribers = dep.take();
		for effect in &subscribers {
			effect.forget(dep);
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::effect::{track, trigger, EffectOptions};

	#[test]
	fn untracked_target_has_no_map() {
		let id = TargetId::new();
		assert!(!is_tracked(id));
		assert!(affected(id, OpType::Set, Some(&Key::from("a"))).is_none());
	}

	#[test]
	fn add_reaches_iteration_dependency() {
		let id = TargetId::new();
		let effect = crate::effect(
			move || {
				track(id, OpType::Iterate, Key::Iterate);
				track(id, OpType::Get, Key::from("a"));
			},
			EffectOptions::default(),
		);

		let on_set = affected(id, OpType::Set, Some(&Key::from("b"))).unwrap();
		assert!(on_set.is_empty());

		let on_add = affected(id, OpType::Add, Some(&Key::from("b"))).unwrap();
		assert_eq!(on_add.len(), 1);
		assert!(on_add[0].contains(&effect));

		let on_clear = affected(id, OpType::Clear, None).unwrap();
		assert_eq!(on_clear.len(), 2);

		trigger(id, OpType::Clear, None, None);
		release(id);
		assert!(!is_tracked(id));
		assert_eq!(effect.dependency_count(), 0);
	}
}
