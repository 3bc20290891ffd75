use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::warn;

use crate::effect::{effect, Effect, EffectOptions};
use crate::error::Error;
use crate::stack;

/// A lazily evaluated, cached value derived from observed state.
///
/// The getter runs on the first read and again only after something it read
/// has changed. Effects reading a computed value subscribe to everything the
/// getter read, so they re-run when the derived value would change.
pub struct Computed<T> {
	body: Rc<ComputedBody<T>>,
}

impl<T> Clone for Computed<T> {
	fn clone(&self) -> Self {
		Self {
			body: self.body.clone(),
		}
	}
}

struct ComputedBody<T> {
	effect: Effect,
	value: Rc<RefCell<Option<T>>>,
	dirty: Rc<Cell<bool>>,
	setter: Option<Box<dyn Fn(T)>>,
}

impl<T> Drop for ComputedBody<T> {
	fn drop(&mut self) {
		self.effect.stop();
	}
}

/// Read-only derived value; writes log a warning.
pub fn computed<T: 'static>(getter: impl Fn() -> T + 'static) -> Computed<T> {
	Computed::build(getter, None)
}

/// Derived value whose writes are forwarded to `set`.
pub fn computed_with<T: 'static>(get: impl Fn() -> T + 'static, set: impl Fn(T) + 'static) -> Computed<T> {
	Computed::build(get, Some(Box::new(set)))
}

impl<T: 'static> Computed<T> {
	fn build(getter: impl Fn() -> T + 'static, setter: Option<Box<dyn Fn(T)>>) -> Self {
		let value = Rc::new(RefCell::new(None));
		let dirty = Rc::new(Cell::new(true));

		let effect = effect(
			{
				let value = value.clone();
				move || {
					let next = getter();
					*value.borrow_mut() = Some(next);
				}
			},
			EffectOptions::new().name("computed").lazy().computed().scheduler({
				let dirty = dirty.clone();
				move |_| dirty.set(true)
			}),
		);

		Computed {
			body: Rc::new(ComputedBody {
				effect,
				value,
				dirty,
				setter,
			}),
		}
	}

	/// Calls `func` with the current value, recomputing first if needed.
	///
	/// Fails with [`Error::CyclicComputed`] when read from inside its own getter.
	pub fn try_with<R>(&self, func: impl FnOnce(&T) -> R) -> Result<R, Error> {
		let body = &self.body;
		if body.dirty.get() && body.effect.run() {
			body.dirty.set(false);
		}

		track_child_run(&body.effect);

		if body.dirty.get() {
			return Err(Error::CyclicComputed);
		}

		let value = body.value.borrow();
		value.as_ref().map(func).ok_or(Error::CyclicComputed)
	}

	/// Like [`Computed::try_with`].
	///
	/// # Panics
	///
	/// When read from inside its own getter, or when `func` causes this value to
	/// be recomputed.
	pub fn with<R>(&self, func: impl FnOnce(&T) -> R) -> R {
		match self.try_with(func) {
			Ok(result) => result,
			Err(err) => panic!("{err}"),
		}
	}

	/// # Panics
	///
	/// When read from inside its own getter.
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.with(T::clone)
	}

	/// Forwards to the setter. Does not mark the value dirty by itself.
	pub fn set(&self, value: T) {
		if let Err(err) = self.try_set(value) {
			warn!("{err}");
		}
	}

	pub fn try_set(&self, value: T) -> Result<(), Error> {
		match &self.body.setter {
			Some(setter) => {
				setter(value);
				Ok(())
			}
			None => Err(Error::ReadonlyComputed),
		}
	}

	pub fn is_dirty(&self) -> bool {
		self.body.dirty.get()
	}

	/// The backing effect, e.g. to stop the computed value.
	pub fn effect(&self) -> &Effect {
		&self.body.effect
	}
}

/// Links the innermost running effect to every dependency `child` holds, so a
/// reader of a derived value re-runs when the value's inputs change.
fn track_child_run(child: &Effect) {
	if !stack::is_tracking_enabled() {
		return;
	}

	let Some(parent) = stack::active_effect() else {
		return;
	};

	for dep in child.deps() {
		parent.subscribe(&dep);
	}
}

impl<T> Debug for Computed<T>
where
	T: Debug,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut s = f.debug_struct("Computed");
		s.field("dirty", &self.body.dirty.get());
		if let Ok(value) = self.body.value.try_borrow() {
			s.field("value", &*value);
		}
		s.finish()
	}
}
