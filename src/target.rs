use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use fxhash::FxBuildHasher;
use indexmap::{IndexMap, IndexSet};

use crate::value::Value;

pub type Record = IndexMap<Rc<str>, Value, FxBuildHasher>;
pub type ValueSet = IndexSet<Value, FxBuildHasher>;
pub type ValueMap = IndexMap<Value, Value, FxBuildHasher>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity token of an observable target.
///
/// Dependency maps are keyed by this token, never by the target itself, so the
/// graph does not keep targets alive. Reactive primitives that are not
/// [`Target`]s (single-value boxes and the like) mint their own token and call
/// [`track`](crate::track) / [`trigger`](crate::trigger) with it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct TargetId(u64);

impl TargetId {
	pub fn new() -> Self {
		TargetId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
	}
}

impl Default for TargetId {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Display for TargetId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Kind {
	Record,
	List,
	Set,
	Map,
}

impl fmt::Display for Kind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Kind::Record => "record",
			Kind::List => "list",
			Kind::Set => "set",
			Kind::Map => "map",
		})
	}
}

/// Raw contents of a target.
pub enum Data {
	Record(Record),
	List(Vec<Value>),
	Set(ValueSet),
	Map(ValueMap),
}

impl Data {
	pub fn kind(&self) -> Kind {
		match self {
			Data::Record(_) => Kind::Record,
			Data::List(_) => Kind::List,
			Data::Set(_) => Kind::Set,
			Data::Map(_) => Kind::Map,
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Data::Record(r) => r.len(),
			Data::List(l) => l.len(),
			Data::Set(s) => s.len(),
			Data::Map(m) => m.len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// A raw composite value that can be observed.
///
/// Reading or writing a `Target` directly is untracked: only access through an
/// [`Observed`](crate::Observed) view reports to the dependency graph.
#[derive(Clone)]
pub struct Target {
	body: Rc<TargetBody>,
}

struct TargetBody {
	id: TargetId,
	data: RefCell<Data>,
	readonly: Cell<bool>,
	non_observable: Cell<bool>,
}

impl Drop for TargetBody {
	fn drop(&mut self) {
		crate::dep::release(self.id);
	}
}

impl Target {
	pub fn new(data: Data) -> Self {
		Target {
			body: Rc::new(TargetBody {
				id: TargetId::new(),
				data: RefCell::new(data),
				readonly: Cell::new(false),
				non_observable: Cell::new(false),
			}),
		}
	}

	pub fn record() -> Self {
		Self::new(Data::Record(Record::default()))
	}

	pub fn list() -> Self {
		Self::new(Data::List(Vec::new()))
	}

	pub fn set() -> Self {
		Self::new(Data::Set(ValueSet::default()))
	}

	pub fn map() -> Self {
		Self::new(Data::Map(ValueMap::default()))
	}

	pub fn from_record<K: Into<Rc<str>>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
		let record = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
		Self::new(Data::Record(record))
	}

	pub fn from_list(items: impl IntoIterator<Item = Value>) -> Self {
		Self::new(Data::List(items.into_iter().collect()))
	}

	pub fn from_set(items: impl IntoIterator<Item = Value>) -> Self {
		Self::new(Data::Set(items.into_iter().collect()))
	}

	pub fn from_map(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
		Self::new(Data::Map(entries.into_iter().collect()))
	}

	pub fn id(&self) -> TargetId {
		self.body.id
	}

	pub fn kind(&self) -> Kind {
		self.body.data.borrow().kind()
	}

	pub fn len(&self) -> usize {
		self.body.data.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn ptr_eq(&self, other: &Target) -> bool {
		Rc::ptr_eq(&self.body, &other.body)
	}

	/// Untracked read access to the raw contents.
	pub fn data(&self) -> Ref<'_, Data> {
		self.body.data.borrow()
	}

	/// Untracked write access to the raw contents. Nothing is triggered.
	pub fn data_mut(&self) -> RefMut<'_, Data> {
		self.body.data.borrow_mut()
	}

	pub fn is_marked_readonly(&self) -> bool {
		self.body.readonly.get()
	}

	pub fn is_non_observable(&self) -> bool {
		self.body.non_observable.get()
	}

	pub(crate) fn set_readonly_mark(&self) {
		self.body.readonly.set(true);
	}

	pub(crate) fn set_non_observable_mark(&self) {
		self.body.non_observable.set(true);
	}

	pub(crate) fn record_ref(&self) -> Option<Ref<'_, Record>> {
		Ref::filter_map(self.data(), |data| match data {
			Data::Record(r) => Some(r),
			_ => None,
		})
		.ok()
	}

	pub(crate) fn record_mut(&self) -> Option<RefMut<'_, Record>> {
		RefMut::filter_map(self.data_mut(), |data| match data {
			Data::Record(r) => Some(r),
			_ => None,
		})
		.ok()
	}

	pub(crate) fn list_ref(&self) -> Option<Ref<'_, Vec<Value>>> {
		Ref::filter_map(self.data(), |data| match data {
			Data::List(l) => Some(l),
			_ => None,
		})
		.ok()
	}

	pub(crate) fn list_mut(&self) -> Option<RefMut<'_, Vec<Value>>> {
		RefMut::filter_map(self.data_mut(), |data| match data {
			Data::List(l) => Some(l),
			_ => None,
		})
		.ok()
	}

	pub(crate) fn set_ref(&self) -> Option<Ref<'_, ValueSet>> {
		Ref::filter_map(self.data(), |data| match data {
			Data::Set(s) => Some(s),
			_ => None,
		})
		.ok()
	}

	pub(crate) fn set_mut(&self) -> Option<RefMut<'_, ValueSet>> {
		RefMut::filter_map(self.data_mut(), |data| match data {
			Data::Set(s) => Some(s),
			_ => None,
		})
		.ok()
	}

	pub(crate) fn map_ref(&self) -> Option<Ref<'_, ValueMap>> {
		Ref::filter_map(self.data(), |data| match data {
			Data::Map(m) => Some(m),
			_ => None,
		})
		.ok()
	}

	pub(crate) fn map_mut(&self) -> Option<RefMut<'_, ValueMap>> {
		RefMut::filter_map(self.data_mut(), |data| match data {
			Data::Map(m) => Some(m),
			_ => None,
		})
		.ok()
	}
}

impl fmt::Debug for Target {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Target")
			.field("id", &self.id())
			.field("kind", &self.kind())
			.field("len", &self.len())
			.finish()
	}
}
