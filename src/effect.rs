use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use fxhash::FxHashSet;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::addr::Addr;
use crate::dep::{self, Dep, Key};
use crate::stack;
use crate::target::TargetId;
use crate::value::Value;

/// Kind of access reported to [`track`] or [`trigger`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OpType {
	Get,
	Has,
	Iterate,
	Set,
	Add,
	Delete,
	Clear,
}

impl fmt::Display for OpType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			OpType::Get => "get",
			OpType::Has => "has",
			OpType::Iterate => "iterate",
			OpType::Set => "set",
			OpType::Add => "add",
			OpType::Delete => "delete",
			OpType::Clear => "clear",
		})
	}
}

/// Values attached to a trigger for debugging hooks.
#[derive(Clone, Default, Debug)]
pub struct TriggerInfo {
	pub old_value: Option<Value>,
	pub new_value: Option<Value>,
}

impl TriggerInfo {
	pub fn changed(old_value: Value, new_value: Value) -> Self {
		TriggerInfo {
			old_value: Some(old_value),
			new_value: Some(new_value),
		}
	}

	pub fn added(new_value: Value) -> Self {
		TriggerInfo {
			old_value: None,
			new_value: Some(new_value),
		}
	}

	pub fn deleted(old_value: Value) -> Self {
		TriggerInfo {
			old_value: Some(old_value),
			new_value: None,
		}
	}
}

/// Passed to `on_track` and `on_trigger` hooks.
#[derive(Clone, Debug)]
pub struct DebuggerEvent {
	pub effect: Effect,
	pub target: TargetId,
	pub op: OpType,
	pub key: Option<Key>,
	pub info: Option<TriggerInfo>,
}

pub type Scheduler = Rc<dyn Fn(&Effect)>;
pub type DebuggerHook = Rc<dyn Fn(&DebuggerEvent)>;

#[derive(Clone, Default)]
pub struct EffectOptions {
	pub name: Option<&'static str>,
	/// Do not run on creation.
	pub lazy: bool,
	/// Backs a derived value; dispatched before plain effects.
	pub computed: bool,
	/// Called instead of running the effect when it is triggered.
	pub scheduler: Option<Scheduler>,
	pub on_track: Option<DebuggerHook>,
	pub on_trigger: Option<DebuggerHook>,
	pub on_stop: Option<Rc<dyn Fn()>>,
}

impl EffectOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn name(mut self, name: &'static str) -> Self {
		self.name = Some(name);
		self
	}

	pub fn lazy(mut self) -> Self {
		self.lazy = true;
		self
	}

	pub fn computed(mut self) -> Self {
		self.computed = true;
		self
	}

	pub fn scheduler(mut self, scheduler: impl Fn(&Effect) + 'static) -> Self {
		self.scheduler = Some(Rc::new(scheduler));
		self
	}

	pub fn on_track(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
		self.on_track = Some(Rc::new(hook));
		self
	}

	pub fn on_trigger(mut self, hook: impl Fn(&DebuggerEvent) + 'static) -> Self {
		self.on_trigger = Some(Rc::new(hook));
		self
	}

	pub fn on_stop(mut self, hook: impl Fn() + 'static) -> Self {
		self.on_stop = Some(Rc::new(hook));
		self
	}
}

impl fmt::Debug for EffectOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EffectOptions")
			.field("name", &self.name)
			.field("lazy", &self.lazy)
			.field("computed", &self.computed)
			.field("scheduler", &self.scheduler.is_some())
			.finish_non_exhaustive()
	}
}

/// A re-runnable unit of work whose dependencies are discovered while it runs.
///
/// An effect stays subscribed (and alive) for as long as it depends on
/// something, whether or not a handle to it is kept; [`Effect::stop`] detaches it.
#[derive(Clone)]
pub struct Effect {
	body: Rc<EffectBody>,
}

struct EffectBody {
	active: Cell<bool>,
	func: RefCell<Box<dyn FnMut()>>,
	deps: RefCell<SmallVec<[Dep; 4]>>,
	options: EffectOptions,
}

/// Creates an effect and, unless `options.lazy` is set, runs it once.
pub fn effect(func: impl FnMut() + 'static, options: EffectOptions) -> Effect {
	let effect = Effect {
		body: Rc::new(EffectBody {
			active: Cell::new(true),
			func: RefCell::new(Box::new(func)),
			deps: RefCell::new(SmallVec::new()),
			options,
		}),
	};

	if !effect.body.options.lazy {
		effect.run();
	}

	effect
}

pub fn stop(effect: &Effect) {
	effect.stop()
}

impl Effect {
	#[must_use]
	pub fn new(func: impl FnMut() + 'static) -> Self {
		effect(func, EffectOptions::default())
	}

	/// Runs the effect, rebuilding its dependencies from what it reads.
	///
	/// A stopped effect just calls its function. An effect that is already on
	/// the stack is not run again and `false` is returned; its dependencies are
	/// left as they are.
	pub fn run(&self) -> bool {
		if !self.is_active() {
			return self.call();
		}

		if stack::contains(self) {
			trace!(effect = self.name(), "skipped re-entrant run");
			return false;
		}

		self.cleanup();
		let _guard = stack::push(self.clone());
		self.call()
	}

	fn call(&self) -> bool {
		match self.body.func.try_borrow_mut() {
			Ok(mut func) => {
				(*func)();
				true
			}
			Err(_) => {
				warn!(effect = self.name(), "effect invoked while already running");
				false
			}
		}
	}

	/// Unsubscribes from everything and deactivates. Idempotent.
	pub fn stop(&self) {
		if !self.is_active() {
			return;
		}

		self.cleanup();
		if let Some(on_stop) = &self.body.options.on_stop {
			on_stop();
		}
		self.body.active.set(false);
		debug!(effect = self.name(), "effect stopped");
	}

	pub fn is_active(&self) -> bool {
		self.body.active.get()
	}

	pub fn is_computed(&self) -> bool {
		self.body.options.computed
	}

	pub fn name(&self) -> &'static str {
		self.body.options.name.unwrap_or("<unnamed>")
	}

	pub fn options(&self) -> &EffectOptions {
		&self.body.options
	}

	/// Number of dependencies recorded by the most recent run.
	pub fn dependency_count(&self) -> usize {
		self.body.deps.borrow().len()
	}

	/// `true` if this effect is subscribed to `(target, key)`, checked in both
	/// directions.
	pub fn is_subscribed(&self, target: TargetId, key: &Key) -> bool {
		let Some(dep) = dep::lookup(target, key) else {
			return false;
		};
		dep.contains(self) && self.body.deps.borrow().iter().any(|d| d.ptr_eq(&dep))
	}

	pub fn ptr_eq(&self, other: &Effect) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	pub(crate) fn addr(&self) -> Addr {
		Addr::of(&self.body)
	}

	pub(crate) fn deps(&self) -> SmallVec<[Dep; 4]> {
		self.body.deps.borrow().clone()
	}

	/// Subscribes to `dep` in both directions. Returns `false` if already subscribed.
	pub(crate) fn subscribe(&self, dep: &Dep) -> bool {
		if dep.contains(self) {
			return false;
		}
		dep.add(self.clone());
		self.body.deps.borrow_mut().push(dep.clone());
		true
	}

	/// Removes `dep` from this effect's list only; the caller owns the other side.
	pub(crate) fn forget(&self, dep: &Dep) {
		let removed = {
			let mut deps = self.body.deps.borrow_mut();
			deps.iter()
				.position(|d| d.ptr_eq(dep))
				.map(|index| deps.remove(index))
		};
		drop(removed);
	}

	fn cleanup(&self) {
		let deps = std::mem::take(&mut *self.body.deps.borrow_mut());
		for dep in &deps {
			dep.remove(self);
		}
	}
}

impl fmt::Debug for Effect {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Effect")
			.field("name", &self.name())
			.field("active", &self.is_active())
			.field("deps", &self.dependency_count())
			.finish()
	}
}

/// Records that the innermost running effect reads `(target, key)`.
///
/// `OpType::Iterate` always records the iteration key.
pub fn track(target: TargetId, op: OpType, key: Key) {
	if !stack::is_tracking_enabled() {
		return;
	}

	let Some(effect) = stack::active_effect() else {
		return;
	};

	let key = if op == OpType::Iterate { Key::Iterate } else { key };
	let dep = dep::dep_for(target, key.clone());

	if effect.subscribe(&dep) {
		trace!(effect = effect.name(), target_id = %target, %op, %key, "track");
		if let Some(on_track) = &effect.body.options.on_track {
			on_track(&DebuggerEvent {
				effect: effect.clone(),
				target,
				op,
				key: Some(key),
				info: None,
			});
		}
	}
}

/// Notifies every effect depending on `(target, key)`.
///
/// `Add` and `Delete` also notify the iteration key; `Clear` notifies every
/// dependency of the target. Computed effects are dispatched before plain ones.
pub fn trigger(target: TargetId, op: OpType, key: Option<Key>, info: Option<TriggerInfo>) {
	let Some(deps) = dep::affected(target, op, key.as_ref()) else {
		return;
	};

	let mut seen = FxHashSet::default();
	let mut computed: SmallVec<[Effect; 4]> = SmallVec::new();
	let mut plain: SmallVec<[Effect; 8]> = SmallVec::new();

	for dep in &deps {
		for effect in dep.subscribers() {
			if !seen.insert(effect.addr()) {
				continue;
			}
			if effect.is_computed() {
				computed.push(effect);
			} else {
				plain.push(effect);
			}
		}
	}

	trace!(
		target_id = %target,
		%op,
		key = ?key,
		computed = computed.len(),
		plain = plain.len(),
		"trigger"
	);

	for effect in computed.iter().chain(plain.iter()) {
		schedule_run(effect, target, op, key.as_ref(), info.as_ref());
	}
}

fn schedule_run(effect: &Effect, target: TargetId, op: OpType, key: Option<&Key>, info: Option<&TriggerInfo>) {
	// Stopped by an effect dispatched earlier in the same round.
	if !effect.is_active() {
		return;
	}

	if let Some(on_trigger) = &effect.body.options.on_trigger {
		on_trigger(&DebuggerEvent {
			effect: effect.clone(),
			target,
			op,
			key: key.cloned(),
			info: info.cloned(),
		});
	}

	match &effect.body.options.scheduler {
		Some(scheduler) => scheduler(effect),
		None => {
			effect.run();
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use std::cell::RefCell;

	#[test]
	fn lazy_effect_waits_for_run() {
		let runs = Rc::new(Cell::new(0));
		let effect = effect(
			{
				let runs = runs.clone();
				move || runs.set(runs.get() + 1)
			},
			EffectOptions::new().lazy(),
		);
		assert_eq!(runs.get(), 0);
		assert!(effect.run());
		assert_eq!(runs.get(), 1);
	}

	#[test]
	fn stack_is_popped_after_panic() {
		let failing = effect(|| panic!("boom"), EffectOptions::new().lazy());
		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| failing.run()));
		assert!(result.is_err());
		assert_eq!(stack::depth(), 0);
		assert!(Effect::new(|| {}).run());
	}

	#[test]
	fn re_entrant_run_is_skipped() {
		let slot: Rc<RefCell<Option<Effect>>> = Rc::default();
		let nested = Rc::new(Cell::new(None));
		let effect = effect(
			{
				let slot = slot.clone();
				let nested = nested.clone();
				move || {
					if let Some(me) = slot.borrow().as_ref() {
						nested.set(Some(me.run()));
					}
				}
			},
			EffectOptions::new().lazy(),
		);
		*slot.borrow_mut() = Some(effect.clone());
		assert!(effect.run());
		assert_eq!(nested.get(), Some(false));
		slot.borrow_mut().take();
	}

	#[test]
	fn stop_is_idempotent_and_calls_hook_once() {
		let stops = Rc::new(Cell::new(0));
		let effect = effect(
			|| {},
			EffectOptions::new().on_stop({
				let stops = stops.clone();
				move || stops.set(stops.get() + 1)
			}),
		);
		effect.stop();
		stop(&effect);
		assert_eq!(stops.get(), 1);
		assert!(!effect.is_active());
	}

	#[test]
	fn hooks_see_track_and_trigger() {
		let id = TargetId::new();
		let events: Rc<RefCell<Vec<(OpType, Option<Key>)>>> = Rc::default();
		let _effect = effect(
			move || track(id, OpType::Get, Key::from("a")),
			EffectOptions::new()
				.on_track({
					let events = events.clone();
					move |e| events.borrow_mut().push((e.op, e.key.clone()))
				})
				.on_trigger({
					let events = events.clone();
					move |e| events.borrow_mut().push((e.op, e.key.clone()))
				}),
		);

		trigger(id, OpType::Set, Some(Key::from("a")), Some(TriggerInfo::changed(1.into(), 2.into())));

		assert_eq!(
			*events.borrow(),
			[
				(OpType::Get, Some(Key::from("a"))),
				(OpType::Set, Some(Key::from("a"))),
				// re-run subscribes afresh
				(OpType::Get, Some(Key::from("a"))),
			]
		);
		crate::dep::release(id);
	}
}
