use std::fmt;
use std::rc::{Rc, Weak};

/// Identity of a shared allocation.
///
/// Two handles share an `Addr` iff they point at the same allocation, which
/// lets identity-compared values (effects, views, opaque values) be used as
/// hash keys without keeping the allocation alive.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(usize);

impl Addr {
	pub fn of<T: ?Sized>(ptr: &Rc<T>) -> Self {
		Addr(Rc::as_ptr(ptr) as *const () as usize)
	}

	pub fn of_weak<T: ?Sized>(ptr: &Weak<T>) -> Self {
		Addr(Weak::as_ptr(ptr) as *const () as usize)
	}

	/// Address of a value living inside an `Rc`, as seen from `&self`.
	pub fn of_ref<T: ?Sized>(value: &T) -> Self {
		Addr(value as *const T as *const () as usize)
	}
}

impl fmt::Debug for Addr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{:#x}", self.0)
	}
}
