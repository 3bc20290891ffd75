use std::cell::{Cell, RefCell};
use std::rc::Rc;

use reactivity::{
	batch, computed, computed_with, depth, effect, is_readonly, is_tracked, list, queue_job, reactive, readonly, record,
	stop, subscriber_count, untracked, unwrap, Effect, EffectOptions, Error, Key, Observed, Target, Value,
};


use mock::Spy;

fn view(value: Value) -> Observed {
	value.as_observed().cloned().expect("value is a view")
}

fn int(value: Value) -> i64 {
	value.as_int().unwrap_or_default()
}

#[test]
fn effect_logs_only_on_change() {
	mock::init_tracing();
	let state = view(reactive(record! { "a" => 1 }));
	let mock = mock::SharedMock::new();

	mock.get().expect_log().with(mockall::predicate::eq(1)).times(1).return_const(());

	let _log = effect(
		{
			let state = state.clone();
			let mock = mock.clone();
			move || {
				let a = int(state.get("a"));
				mock.get().log(a);
			}
		},
		EffectOptions::default(),
	);

	mock.get().checkpoint();

	mock.get().expect_log().with(mockall::predicate::eq(2)).times(1).return_const(());
	state.set("a", 2);
	mock.get().checkpoint();

	mock.get().expect_log().times(0).return_const(());
	state.set("a", 2);
	mock.get().checkpoint();
}

#[test]
fn computed_is_lazy_and_recomputes_once() {
	let state = view(reactive(record! { "a" => 1 }));
	let mock = mock::SharedMock::new();

	let doubled = computed({
		let state = state.clone();
		let mock = mock.clone();
		move || {
			let a = int(state.get("a"));
			mock.get().log(a);
			a * 2
		}
	});

	mock.get().expect_log().times(1).return_const(());
	assert_eq!(doubled.get(), 2);
	assert_eq!(doubled.get(), 2);
	mock.get().checkpoint();

	mock.get().expect_log().times(0).return_const(());
	state.set("a", 3);
	assert!(doubled.is_dirty());
	mock.get().checkpoint();

	mock.get().expect_log().times(1).return_const(());
	assert_eq!(doubled.get(), 6);
	assert_eq!(doubled.get(), 6);
	mock.get().checkpoint();
}

#[test]
fn computed_chains_propagate_to_readers() {
	let state = view(reactive(record! { "a" => 1 }));
	let doubled = computed({
		let state = state.clone();
		move || int(state.get("a")) * 2
	});
	let next = computed({
		let doubled = doubled.clone();
		move || doubled.get() + 1
	});
	let seen = Rc::new(Cell::new(0));

	let _reader = Effect::new({
		let next = next.clone();
		let seen = seen.clone();
		move || seen.set(next.get())
	});
	assert_eq!(seen.get(), 3);

	state.set("a", 5);
	assert_eq!(seen.get(), 11);
	assert!(!doubled.is_dirty());
	assert!(!next.is_dirty());
}

#[test]
fn writable_computed_forwards_writes() {
	let state = view(reactive(record! { "a" => 1 }));
	let writes = Rc::new(Cell::new(0));
	let value = computed_with(
		{
			let state = state.clone();
			move || int(state.get("a"))
		},
		{
			let state = state.clone();
			let writes = writes.clone();
			move |next: i64| {
				writes.set(writes.get() + 1);
				state.set("a", next);
			}
		},
	);
	assert_eq!(value.get(), 1);

	// The setter ran but changed nothing, so nothing marked the value dirty.
	value.set(1);
	assert_eq!(writes.get(), 1);
	assert!(!value.is_dirty());

	value.set(4);
	assert_eq!(writes.get(), 2);
	assert!(value.is_dirty());
	assert_eq!(value.get(), 4);
	assert!(!value.is_dirty());
}

#[test]
fn stopped_effect_never_runs_again() {
	let state = view(reactive(record! { "a" => 1 }));
	let runs = Rc::new(Cell::new(0));

	let watcher = Effect::new({
		let state = state.clone();
		let runs = runs.clone();
		move || {
			state.get("a");
			runs.set(runs.get() + 1);
		}
	});
	assert_eq!(runs.get(), 1);

	stop(&watcher);
	assert_eq!(watcher.dependency_count(), 0);
	assert_eq!(subscriber_count(state.id(), &Key::from("a")), 0);

	state.set("a", 2);
	state.set("a", 3);
	assert_eq!(runs.get(), 1);
}

#[test]
fn computed_values_are_invalidated_before_effects_run() {
	let state = view(reactive(record! { "a" => 1 }));
	let doubled = computed({
		let state = state.clone();
		move || int(state.get("a")) * 2
	});
	let seen: Rc<RefCell<Vec<(i64, i64)>>> = Rc::default();

	// Reads the plain key first so the effect subscribes before the computed one.
	let _effect = Effect::new({
		let state = state.clone();
		let doubled = doubled.clone();
		let seen = seen.clone();
		move || {
			let a = int(state.get("a"));
			seen.borrow_mut().push((a, doubled.get()));
		}
	});

	state.set("a", 5);
	state.set("a", 7);
	assert_eq!(*seen.borrow(), [(1, 2), (5, 10), (7, 14)]);
}

#[test]
fn stale_dependencies_are_dropped() {
	let state = view(reactive(record! { "flag" => true, "a" => 1, "b" => 2 }));
	let runs = Rc::new(Cell::new(0));

	let branch = Effect::new({
		let state = state.clone();
		let runs = runs.clone();
		move || {
			runs.set(runs.get() + 1);
			if state.get("flag").as_bool() == Some(true) {
				state.get("a");
			} else {
				state.get("b");
			}
		}
	});
	assert!(branch.is_subscribed(state.id(), &Key::from("a")));

	state.set("flag", false);
	assert_eq!(runs.get(), 2);
	assert!(!branch.is_subscribed(state.id(), &Key::from("a")));
	assert!(branch.is_subscribed(state.id(), &Key::from("b")));

	state.set("a", 10);
	assert_eq!(runs.get(), 2);
	state.set("b", 20);
	assert_eq!(runs.get(), 3);
	assert_eq!(branch.dependency_count(), 2);
}

#[test]
fn wrapping_is_idempotent_and_reversible() {
	let raw = Target::record();
	let first = reactive(raw.clone());
	assert_eq!(reactive(raw.clone()), first);
	assert_eq!(reactive(first.clone()), first);
	assert_eq!(unwrap(&first), Value::Target(raw.clone()));

	let frozen = readonly(raw.clone());
	assert!(is_readonly(&frozen));
	assert_eq!(readonly(first), frozen);
	assert_eq!(unwrap(&frozen), Value::Target(raw));
}

#[test]
fn readonly_views_refuse_writes() {
	let inner = record! { "b" => 2 };
	let raw = record! { "a" => 1, "nested" => inner.clone() };
	let frozen = view(readonly(raw.clone()));
	let runs = Rc::new(Cell::new(0));

	let _reader = Effect::new({
		let frozen = frozen.clone();
		let runs = runs.clone();
		move || {
			frozen.get("a");
			runs.set(runs.get() + 1);
		}
	});

	frozen.set("a", 2);
	assert!(!frozen.delete("a"));
	frozen.clear();
	assert!(matches!(frozen.try_set("a", 3), Err(Error::Readonly { op: "set", .. })));
	assert_eq!(int(frozen.get("a")), 1);
	assert_eq!(raw.len(), 2);
	assert_eq!(runs.get(), 1);

	let nested = frozen.get("nested");
	assert!(is_readonly(&nested));
	view(nested).set("b", 3);
	assert_eq!(int(view(reactive(inner)).get("b")), 2);
}

#[test]
fn clear_notifies_every_reader() {
	let map = Target::from_map([(Value::from("a"), Value::from(1)), (Value::from("b"), Value::from(2))]);
	let map = view(reactive(map));
	let runs = Rc::new(Cell::new(0));

	let _reader = Effect::new({
		let map = map.clone();
		let runs = runs.clone();
		move || {
			map.get("a");
			runs.set(runs.get() + 1);
		}
	});

	map.clear();
	assert_eq!(runs.get(), 2);
	assert!(map.is_empty());

	map.clear();
	assert_eq!(runs.get(), 2);
}

#[test]
fn iteration_follows_shape_changes_only() {
	let items = view(reactive(list![1, 2]));
	let lengths: Rc<RefCell<Vec<usize>>> = Rc::default();

	let _reader = Effect::new({
		let items = items.clone();
		let lengths = lengths.clone();
		move || lengths.borrow_mut().push(items.len())
	});

	items.set(0, 10);
	items.push(3);
	items.pop();
	items.add(4);
	assert_eq!(*lengths.borrow(), [2, 3, 2, 3]);
	assert_eq!(items.values(), [Value::from(10), Value::from(2), Value::from(4)]);
}

#[test]
fn untracked_reads_do_not_subscribe() {
	let state = view(reactive(record! { "a" => 1 }));
	let runs = Rc::new(Cell::new(0));

	let reader = Effect::new({
		let state = state.clone();
		let runs = runs.clone();
		move || {
			untracked(|| state.get("a"));
			runs.set(runs.get() + 1);
		}
	});

	state.set("a", 2);
	assert_eq!(runs.get(), 1);
	assert_eq!(reader.dependency_count(), 0);
}

#[test]
fn batched_writes_run_effect_once() {
	let state = view(reactive(record! { "a" => 1, "b" => 1 }));
	let sums: Rc<RefCell<Vec<i64>>> = Rc::default();

	let _sum = effect(
		{
			let state = state.clone();
			let sums = sums.clone();
			move || sums.borrow_mut().push(int(state.get("a")) + int(state.get("b")))
		},
		EffectOptions::new().scheduler(queue_job),
	);

	batch(|| {
		state.set("a", 2);
		state.set("b", 3);
		state.set("a", 4);
	});

	assert_eq!(*sums.borrow(), [2, 7]);
}

#[test]
fn nested_effect_restores_outer_tracking() {
	let state = view(reactive(record! { "outer" => 1, "inner" => 1 }));
	let inner: Rc<RefCell<Option<Effect>>> = Rc::default();

	let outer = Effect::new({
		let state = state.clone();
		let inner = inner.clone();
		move || {
			let nested = Effect::new({
				let state = state.clone();
				move || {
					state.get("inner");
				}
			});
			if let Some(previous) = inner.borrow_mut().replace(nested) {
				previous.stop();
			}
			state.get("outer");
		}
	});

	assert_eq!(depth(), 0);
	assert!(outer.is_subscribed(state.id(), &Key::from("outer")));
	assert!(!outer.is_subscribed(state.id(), &Key::from("inner")));

	let nested = inner.borrow().clone().expect("inner effect created");
	assert!(nested.is_subscribed(state.id(), &Key::from("inner")));
	assert!(!nested.is_subscribed(state.id(), &Key::from("outer")));
	nested.stop();
}

#[test]
fn dropping_a_target_releases_its_dependencies() {
	let raw = record! { "a" => 1 };
	let id = raw.id();
	let state = view(reactive(raw));

	let reader = Effect::new({
		let state = state.clone();
		move || {
			state.get("a");
		}
	});
	assert_eq!(reader.dependency_count(), 1);

	reader.stop();
	drop(reader);
	drop(state);
	assert!(!is_tracked(id));
}

#[test]
fn readonly_computed_reports_writes() {
	let value = computed(|| 1);
	assert_eq!(value.try_set(2), Err(Error::ReadonlyComputed));
}
