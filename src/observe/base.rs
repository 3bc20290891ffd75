use std::cmp::Ordering;

use tracing::warn;

use super::{index_of, prop_of, unwrap, Handler, Observed};
use crate::dep::Key;
use crate::effect::{OpType, TriggerInfo};
use crate::value::Value;

pub(crate) struct RecordHandler;

impl Handler for RecordHandler {
	fn get(&self, view: &Observed, key: &Value) -> Value {
		let name = prop_of(key);
		view.track(OpType::Get, Key::Prop(name.clone()));
		let value = view.raw().record_ref().and_then(|record| record.get(&*name).cloned());
		view.wrap_child(value.unwrap_or_default())
	}

	fn has(&self, view: &Observed, key: &Value) -> bool {
		let name = prop_of(key);
		view.track(OpType::Has, Key::Prop(name.clone()));
		view.raw()
			.record_ref()
			.is_some_and(|record| record.contains_key(&*name))
	}

	fn set(&self, view: &Observed, key: Value, value: Value) {
		let name = prop_of(&key);
		let value = unwrap(&value);
		let previous = match view.raw().record_mut() {
			Some(mut record) => record.insert(name.clone(), value.clone()),
			None => return,
		};
		view.written(Key::Prop(name), previous, value);
	}

	fn delete(&self, view: &Observed, key: &Value) -> bool {
		let name = prop_of(key);
		let removed = view
			.raw()
			.record_mut()
			.and_then(|mut record| record.shift_remove(&*name));

		match removed {
			Some(old) => {
				view.trigger(OpType::Delete, Some(Key::Prop(name)), Some(TriggerInfo::deleted(old)));
				true
			}
			None => false,
		}
	}

	fn keys(&self, view: &Observed) -> Vec<Value> {
		view.track(OpType::Iterate, Key::Iterate);
		view.raw()
			.record_ref()
			.map(|record| record.keys().map(|name| Value::Str(name.clone())).collect())
			.unwrap_or_default()
	}

	fn len(&self, view: &Observed) -> usize {
		view.track(OpType::Iterate, Key::Iterate);
		view.raw().len()
	}

	fn clear(&self, view: &Observed) {
		let old = view.raw().record_mut().map(|mut record| std::mem::take(&mut *record));
		if old.is_some_and(|old| !old.is_empty()) {
			view.trigger(OpType::Clear, None, None);
		}
	}
}

pub(crate) struct ListHandler;

impl ListHandler {
	pub(crate) fn push(&self, view: &Observed, value: Value) {
		let value = unwrap(&value);
		edit(view, usize::MAX, |list| list.push(value));
	}

	pub(crate) fn pop(&self, view: &Observed) -> Option<Value> {
		let last = view.raw().len().checked_sub(1)?;
		let popped = edit(view, last, Vec::pop).flatten()?;
		Some(view.wrap_child(popped))
	}

	pub(crate) fn insert(&self, view: &Observed, index: usize, value: Value) {
		let value = unwrap(&value);
		edit(view, index, |list| {
			let at = index.min(list.len());
			list.insert(at, value);
		});
	}

	/// Removes the item at `index`, shifting later items down.
	pub(crate) fn remove(&self, view: &Observed, index: usize) -> Option<Value> {
		edit(view, index, |list| (index < list.len()).then(|| list.remove(index))).flatten()
	}
}

/// Applies `apply` to the list and reports every slot from `from` on that
/// changed: `Set` for replaced items, `Add` and `Delete` where the length moved.
fn edit<R>(view: &Observed, from: usize, apply: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
	let (from, result, before, after) = {
		let mut list = view.raw().list_mut()?;
		let from = from.min(list.len());
		let before = list[from..].to_vec();
		let result = apply(&mut *list);
		let after = list.get(from..).map(<[Value]>::to_vec).unwrap_or_default();
		(from, result, before, after)
	};

	for offset in 0..before.len().max(after.len()) {
		let key = Key::Index(from + offset);
		match (before.get(offset), after.get(offset)) {
			(Some(old), Some(new)) if old != new => {
				view.trigger(OpType::Set, Some(key), Some(TriggerInfo::changed(old.clone(), new.clone())))
			}
			(None, Some(new)) => view.trigger(OpType::Add, Some(key), Some(TriggerInfo::added(new.clone()))),
			(Some(old), None) => view.trigger(OpType::Delete, Some(key), Some(TriggerInfo::deleted(old.clone()))),
			_ => {}
		}
	}

	Some(result)
}

impl Handler for ListHandler {
	fn get(&self, view: &Observed, key: &Value) -> Value {
		let Some(index) = index_of(key) else {
			return Value::Null;
		};
		view.track(OpType::Get, Key::Index(index));
		let value = view.raw().list_ref().and_then(|list| list.get(index).cloned());
		view.wrap_child(value.unwrap_or_default())
	}

	fn has(&self, view: &Observed, key: &Value) -> bool {
		let Some(index) = index_of(key) else {
			return false;
		};
		view.track(OpType::Has, Key::Index(index));
		index < view.raw().len()
	}

	fn set(&self, view: &Observed, key: Value, value: Value) {
		let Some(index) = index_of(&key) else {
			warn!(target_id = %view.id(), "invalid list index {key}");
			return;
		};
		let value = unwrap(&value);

		let previous = {
			let Some(mut list) = view.raw().list_mut() else {
				return;
			};
			match index.cmp(&list.len()) {
				Ordering::Less => Some(std::mem::replace(&mut list[index], value.clone())),
				Ordering::Equal => {
					list.push(value.clone());
					None
				}
				// Only the slot right after the end can be added; no holes.
				Ordering::Greater => {
					let len = list.len();
					drop(list);
					warn!(target_id = %view.id(), len, "list index {index} is out of bounds");
					return;
				}
			}
		};

		view.written(Key::Index(index), previous, value);
	}

	fn delete(&self, view: &Observed, key: &Value) -> bool {
		index_of(key).is_some_and(|index| self.remove(view, index).is_some())
	}

	fn keys(&self, view: &Observed) -> Vec<Value> {
		view.track(OpType::Iterate, Key::Iterate);
		(0..view.raw().len()).map(Value::from).collect()
	}

	fn len(&self, view: &Observed) -> usize {
		view.track(OpType::Iterate, Key::Iterate);
		view.raw().len()
	}

	fn clear(&self, view: &Observed) {
		let old = view.raw().list_mut().map(|mut list| std::mem::take(&mut *list));
		if old.is_some_and(|old| !old.is_empty()) {
			view.trigger(OpType::Clear, None, None);
		}
	}
}
