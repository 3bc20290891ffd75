use super::{unwrap, Handler, Observed};
use crate::dep::Key;
use crate::effect::{OpType, TriggerInfo};
use crate::target::Kind;
use crate::value::Value;

pub(crate) struct SetHandler;

impl SetHandler {
	pub(crate) fn add(&self, view: &Observed, value: Value) {
		let value = unwrap(&value);
		let added = view
			.raw()
			.set_mut()
			.is_some_and(|mut set| set.insert(value.clone()));

		if added {
			view.trigger(OpType::Add, Some(Key::Value(value.key())), Some(TriggerInfo::added(value)));
		}
	}

	fn members(&self, view: &Observed) -> Vec<Value> {
		view.track(OpType::Iterate, Key::Iterate);
		let members: Vec<Value> = view
			.raw()
			.set_ref()
			.map(|set| set.iter().cloned().collect())
			.unwrap_or_default();
		members.into_iter().map(|member| view.wrap_child(member)).collect()
	}
}

impl Handler for SetHandler {
	/// Sets have no values apart from their members.
	fn get(&self, view: &Observed, _key: &Value) -> Value {
		view.unsupported("get", Kind::Set);
		Value::Null
	}

	fn has(&self, view: &Observed, key: &Value) -> bool {
		let member = unwrap(key);
		view.track(OpType::Has, Key::Value(member.key()));
		view.raw().set_ref().is_some_and(|set| set.contains(&member))
	}

	fn set(&self, view: &Observed, _key: Value, _value: Value) {
		view.unsupported("set", Kind::Set);
	}

	fn delete(&self, view: &Observed, key: &Value) -> bool {
		let member = unwrap(key);
		let removed = view.raw().set_mut().and_then(|mut set| set.shift_take(&member));

		match removed {
			Some(old) => {
				view.trigger(OpType::Delete, Some(Key::Value(old.key())), Some(TriggerInfo::deleted(old)));
				true
			}
			None => false,
		}
	}

	fn keys(&self, view: &Observed) -> Vec<Value> {
		self.members(view)
	}

	fn values(&self, view: &Observed) -> Vec<Value> {
		self.members(view)
	}

	fn entries(&self, view: &Observed) -> Vec<(Value, Value)> {
		self.members(view)
			.into_iter()
			.map(|member| (member.clone(), member))
			.collect()
	}

	fn len(&self, view: &Observed) -> usize {
		view.track(OpType::Iterate, Key::Iterate);
		view.raw().len()
	}

	fn clear(&self, view: &Observed) {
		let old = view.raw().set_mut().map(|mut set| std::mem::take(&mut *set));
		if old.is_some_and(|old| !old.is_empty()) {
			view.trigger(OpType::Clear, None, None);
		}
	}
}

pub(crate) struct MapHandler;

impl Handler for MapHandler {
	fn get(&self, view: &Observed, key: &Value) -> Value {
		let key = unwrap(key);
		view.track(OpType::Get, Key::Value(key.key()));
		let value = view.raw().map_ref().and_then(|map| map.get(&key).cloned());
		view.wrap_child(value.unwrap_or_default())
	}

	fn has(&self, view: &Observed, key: &Value) -> bool {
		let key = unwrap(key);
		view.track(OpType::Has, Key::Value(key.key()));
		view.raw().map_ref().is_some_and(|map| map.contains_key(&key))
	}

	fn set(&self, view: &Observed, key: Value, value: Value) {
		let key = unwrap(&key);
		let value = unwrap(&value);
		let previous = match view.raw().map_mut() {
			Some(mut map) => map.insert(key.clone(), value.clone()),
			None => return,
		};
		view.written(Key::Value(key.key()), previous, value);
	}

	fn delete(&self, view: &Observed, key: &Value) -> bool {
		let key = unwrap(key);
		let removed = view.raw().map_mut().and_then(|mut map| map.shift_remove(&key));

		match removed {
			Some(old) => {
				view.trigger(OpType::Delete, Some(Key::Value(key.key())), Some(TriggerInfo::deleted(old)));
				true
			}
			None => false,
		}
	}

	fn keys(&self, view: &Observed) -> Vec<Value> {
		view.track(OpType::Iterate, Key::Iterate);
		let keys: Vec<Value> = view
			.raw()
			.map_ref()
			.map(|map| map.keys().cloned().collect())
			.unwrap_or_default();
		keys.into_iter().map(|key| view.wrap_child(key)).collect()
	}

	fn len(&self, view: &Observed) -> usize {
		view.track(OpType::Iterate, Key::Iterate);
		view.raw().len()
	}

	fn clear(&self, view: &Observed) {
		let old = view.raw().map_mut().map(|mut map| std::mem::take(&mut *map));
		if old.is_some_and(|old| !old.is_empty()) {
			view.trigger(OpType::Clear, None, None);
		}
	}
}
