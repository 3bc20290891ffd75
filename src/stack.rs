use std::cell::{Cell, RefCell};

use crate::effect::Effect;

thread_local! {
	static EFFECT_STACK: RefCell<Vec<Effect>> = const { RefCell::new(Vec::new()) };
	static SHOULD_TRACK: Cell<bool> = const { Cell::new(true) };
}

/// The innermost running effect, if any.
pub fn active_effect() -> Option<Effect> {
	EFFECT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// Number of effects currently running, nested.
pub fn depth() -> usize {
	EFFECT_STACK.with(|stack| stack.borrow().len())
}

pub(crate) fn contains(effect: &Effect) -> bool {
	EFFECT_STACK.with(|stack| stack.borrow().iter().any(|e| e.ptr_eq(effect)))
}

/// Pushes `effect`; it is popped when the returned guard drops, including
/// during unwinding.
pub(crate) fn push(effect: Effect) -> StackGuard {
	EFFECT_STACK.with(|stack| stack.borrow_mut().push(effect));
	StackGuard(())
}

pub(crate) struct StackGuard(());

impl Drop for StackGuard {
	fn drop(&mut self) {
		let popped = EFFECT_STACK.try_with(|stack| stack.borrow_mut().pop());
		drop(popped);
	}
}

pub fn pause_tracking() {
	SHOULD_TRACK.with(|flag| flag.set(false));
}

pub fn resume_tracking() {
	SHOULD_TRACK.with(|flag| flag.set(true));
}

pub fn is_tracking_enabled() -> bool {
	SHOULD_TRACK.with(Cell::get)
}

/// Runs `func` with tracking paused, restoring the previous state afterwards.
pub fn untracked<R>(func: impl FnOnce() -> R) -> R {
	struct Restore(bool);

	impl Drop for Restore {
		fn drop(&mut self) {
			let _ = SHOULD_TRACK.try_with(|flag| flag.set(self.0));
		}
	}

	let _restore = Restore(SHOULD_TRACK.with(|flag| flag.replace(false)));
	func()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn untracked_restores_previous_state() {
		assert!(is_tracking_enabled());
		untracked(|| assert!(!is_tracking_enabled()));
		assert!(is_tracking_enabled());

		pause_tracking();
		untracked(|| ());
		assert!(!is_tracking_enabled());
		resume_tracking();
	}
}
