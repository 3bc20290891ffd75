use std::cell::{Cell, RefCell};

use fxhash::FxHashMap;
use tracing::{error, trace};

use crate::addr::Addr;
use crate::effect::Effect;

/// How often one effect may be re-queued within a single flush.
pub const RECURSION_LIMIT: usize = 100;

thread_local! {
	static STARTED: Cell<bool> = const { Cell::new(false) };
	static MICROTASK: Cell<bool> = const { Cell::new(false) };
	static FLUSHING: Cell<bool> = const { Cell::new(false) };
	static QUEUE: RefCell<Vec<Effect>> = const { RefCell::new(Vec::new()) };
}

pub fn in_batch() -> bool {
	STARTED.with(Cell::get)
}

/// Runs `func` with [`queue_job`] deferring effects, then flushes the queue
/// once the outermost batch returns.
pub fn batch<R>(func: impl FnOnce() -> R) -> R {
	let is_root = batch_start();
	let _guard = is_root.then_some(BatchGuard);
	let result = func();
	if is_root {
		batch_stop();
		if !is_microtask_scheduled() {
			flush_jobs();
		}
	}
	result
}

/// Ends the batch if `func` unwinds.
struct BatchGuard;

impl Drop for BatchGuard {
	fn drop(&mut self) {
		let _ = STARTED.try_with(|started| started.set(false));
	}
}

fn batch_start() -> bool {
	!STARTED.with(|started| started.replace(true))
}

#[cfg(target_arch = "wasm32")]
fn batch_start_microtask() -> bool {
	!MICROTASK.with(|scheduled| scheduled.replace(true))
}

fn is_microtask_scheduled() -> bool {
	MICROTASK.with(Cell::get)
}

fn batch_stop() {
	STARTED.with(|started| started.set(false));
}

/// Scheduler that defers `effect` while a batch or a flush is in progress and
/// runs it right away otherwise.
///
/// ```
/// use reactivity::{effect, queue_job, EffectOptions};
///
/// let job = effect(|| {}, EffectOptions::new().scheduler(queue_job));
/// # job.stop();
/// ```
pub fn queue_job(effect: &Effect) {
	if !in_batch() && !FLUSHING.with(Cell::get) {
		effect.run();
		return;
	}

	QUEUE.with(|queue| {
		let mut queue = queue.borrow_mut();
		if !queue.iter().any(|queued| queued.ptr_eq(effect)) {
			trace!(effect = effect.name(), "queued");
			queue.push(effect.clone());
		}
	});
}

/// Runs queued effects until the queue stays empty.
///
/// Jobs queued while flushing run in the same flush. An effect re-queued more
/// than [`RECURSION_LIMIT`] times is dropped from the flush.
pub fn flush_jobs() {
	if FLUSHING.with(|flushing| flushing.replace(true)) {
		return;
	}

	struct Flushing;

	impl Drop for Flushing {
		fn drop(&mut self) {
			let _ = FLUSHING.try_with(|flushing| flushing.set(false));
		}
	}

	let _flushing = Flushing;
	let mut runs: FxHashMap<Addr, usize> = FxHashMap::default();

	loop {
		let jobs = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
		if jobs.is_empty() {
			break;
		}

		for job in jobs {
			let count = runs.entry(job.addr()).or_default();
			*count += 1;
			if *count > RECURSION_LIMIT {
				error!(
					effect = job.name(),
					limit = RECURSION_LIMIT,
					"maximum recursive updates exceeded, dropping job"
				);
				continue;
			}
			job.run();
		}
	}
}

/// Without a JS event loop there is no microtask to defer to; flushes on return.
#[cfg(not(target_arch = "wasm32"))]
pub fn batch_microtask(func: impl FnOnce()) {
	batch(func)
}

/// Like [`batch`], but flushes in a JS microtask instead of on return.
#[cfg(target_arch = "wasm32")]
pub fn batch_microtask(func: impl FnOnce()) {
	let is_root = batch_start();
	let is_first_microtask = batch_start_microtask();
	func();
	if is_root {
		batch_stop();
	}

	if is_first_microtask {
		microtask::queue(|| {
			flush_jobs();
			MICROTASK.with(|scheduled| scheduled.set(false));
		});
	}
}

#[cfg(target_arch = "wasm32")]
mod microtask {
	use wasm_bindgen::prelude::*;

	#[wasm_bindgen]
	extern "C" {
		#[wasm_bindgen(js_name = queueMicrotask)]
		fn queue_microtask(closure: &JsValue);
	}

	pub(super) fn queue(func: impl FnOnce() + 'static) {
		queue_microtask(&Closure::once_into_js(func));
	}
}
