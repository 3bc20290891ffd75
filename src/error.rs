use crate::target::Kind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
	#[error("value cannot be made reactive: {0}")]
	NotAnObject(String),

	#[error("value is not observable")]
	NotObservable,

	#[error("{op} operation on key \"{key}\" failed: target is readonly")]
	Readonly { op: &'static str, key: String },

	#[error("write operation failed: computed value is readonly")]
	ReadonlyComputed,

	#[error("computed value was read while computing itself")]
	CyclicComputed,

	#[error("{op} is not supported on {kind} targets")]
	Unsupported { op: &'static str, kind: Kind },
}
