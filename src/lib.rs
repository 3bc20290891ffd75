//! Fine-grained reactivity.
//!
//! Composite values ([`Target`]s) are observed through [`Observed`] views.
//! Effects that read through a view are re-run when what they read changes;
//! [`Computed`] values are derived lazily and cached until their inputs change.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use reactivity::{reactive, Effect, Target};
//!
//! let state = reactive(Target::record());
//! let state = state.as_observed().unwrap().clone();
//! let seen = Rc::new(Cell::new(0));
//!
//! let _effect = Effect::new({
//!     let state = state.clone();
//!     let seen = seen.clone();
//!     move || seen.set(state.get("count").as_int().unwrap_or_default())
//! });
//!
//! state.set("count", 2);
//! assert_eq!(seen.get(), 2);
//! ```

pub mod macros;

mod addr;
mod batch;
mod computed;
mod dep;
mod effect;
mod error;
mod observe;
mod stack;
mod target;
mod value;

pub use batch::{batch, batch_microtask, flush_jobs, in_batch, queue_job, RECURSION_LIMIT};
pub use computed::{computed, computed_with, Computed};
pub use dep::{is_tracked, release, subscriber_count, Dep, Key};
pub use effect::{
	effect, stop, track, trigger, DebuggerEvent, DebuggerHook, Effect, EffectOptions, OpType, Scheduler, TriggerInfo,
};
pub use error::Error;
pub use observe::{
	is_readonly, is_wrapped, mark_non_observable, mark_readonly, reactive, readonly, try_wrap, unwrap, wrap, Mode,
	Observed,
};
pub use stack::{active_effect, depth, is_tracking_enabled, pause_tracking, resume_tracking, untracked};
pub use target::{Data, Kind, Record, Target, TargetId, ValueMap, ValueSet};
pub use value::{Opaque, Value, ValueKey};
