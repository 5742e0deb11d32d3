use std::{
    error::Error,
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    ptr::{self, NonNull},
};

use super::{anchor::AnchorPtr, ledger};

/// Exclusive custody of a heap-allocated object.
///
/// `Uniq` is move-only: no copy operation exists, so every transfer of
/// ownership is an explicit move, and a moved-from handle is statically
/// dead: its destruction is a no-op because it no longer exists.
/// Dropping a `Uniq` runs the object's destructor and frees its storage.
///
/// A struct embedding a `Uniq` cannot be cloned into a growable
/// container; the attempt is rejected before it runs:
///
/// ```compile_fail
/// #[derive(Clone)]
/// struct Slot
/// {
///     keep: custody::Uniq<i32>,
/// }
/// ```
///
/// Nor can a shared owner hand over exclusivity, even by move, since
/// other strong owners may exist:
///
/// ```compile_fail
/// let s = custody::Shared::new(5);
/// let u: custody::Uniq<i32> = s.into();
/// ```
#[repr(transparent)]
pub struct Uniq<T>
{
    ptr: NonNull<T>,
    _owns: PhantomData<T>,
}

impl<T> Uniq<T>
{
    /// Allocate an object on the heap under exclusive custody.
    pub fn new(it: T) -> Self
    {
        ledger::register_object();
        Self {
            ptr: unsafe { NonNull::new_unchecked(Box::into_raw(Box::new(it))) },
            _owns: PhantomData,
        }
    }

    /// Take exclusive custody of a raw heap pointer.
    ///
    /// # Safety
    ///
    /// `raw` must come from `Box::into_raw` on a live `Box<T>`, and no
    /// other owner of any kind may hold that address. Handing over an
    /// address in automatic, static, or global storage, or the same
    /// address twice, is undefined behavior: the eventual destroy runs
    /// against storage the allocator never handed out, or runs twice.
    /// Nothing here checks for it.
    pub unsafe fn from_raw(raw: *mut T) -> Self
    {
        ledger::register_object();
        Self {
            ptr: NonNull::new_unchecked(raw),
            _owns: PhantomData,
        }
    }

    /// Give up custody and hand the raw pointer back to the caller.
    pub fn into_raw(self) -> *mut T
    {
        let ptr = self.ptr;
        std::mem::forget(self);
        ledger::deregister_object();
        ptr.as_ptr()
    }

    /// Free the allocation and return the object by value.
    pub fn into_inner(self) -> T
    {
        let ptr = self.ptr;
        std::mem::forget(self);
        ledger::deregister_object();
        *unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    /// Rebase into a fresh shared-ownership group, consuming this handle.
    ///
    /// Also available as `From<Uniq<T>>` on [`Shared`].
    pub fn into_shared(self) -> Shared<T>
    {
        let obj = self.ptr;
        std::mem::forget(self);
        Shared {
            obj,
            anchor: AnchorPtr::adopted(obj),
            _owns: PhantomData,
        }
    }

    /// Non-owning view of the held address, for inspection only. Feeding
    /// it to another owner or to a manual free is undefined behavior.
    pub fn as_ptr(&self) -> *const T { self.ptr.as_ptr() }
}

impl<T> Deref for Uniq<T>
{
    type Target = T;

    fn deref(&self) -> &Self::Target { unsafe { self.ptr.as_ref() } }
}

impl<T> DerefMut for Uniq<T>
{
    fn deref_mut(&mut self) -> &mut Self::Target { unsafe { self.ptr.as_mut() } }
}

impl<T> Drop for Uniq<T>
{
    fn drop(&mut self)
    {
        unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
        ledger::deregister_object();
    }
}

impl<T> fmt::Debug for Uniq<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Uniq").field("ptr", &self.ptr).finish()
    }
}

/// Reference-counted custody of a heap-allocated object.
///
/// Cloning shares the same anchor and bumps the strong count; the object
/// is destroyed the moment the count reaches zero, even while weak
/// observers remain. The destroy operation is captured once, at the call
/// that created the group ([`Shared::new`], [`Shared::from_raw`], or the
/// move out of a [`Uniq`]), and never recomputed from a handle's static
/// type.
///
/// No other owner kind converts into a `Shared` by plain assignment:
///
/// ```compile_fail
/// let s = custody::Shared::new(5);
/// let w = s.alias();
/// let s2: custody::Shared<i32> = w;
/// ```
pub struct Shared<T>
{
    obj: NonNull<T>,
    anchor: AnchorPtr,
    _owns: PhantomData<T>,
}

impl<T> Shared<T>
{
    /// Allocate object and anchor together in one allocation.
    ///
    /// The destroy operation bound here is the one for the concrete `T`
    /// of this call, so the full destructor chain always runs at group
    /// death.
    pub fn new(it: T) -> Self
    {
        ledger::register_object();
        let (anchor, obj) = AnchorPtr::inline(it);
        Self {
            obj,
            anchor,
            _owns: PhantomData,
        }
    }

    /// Take a raw heap pointer into a fresh shared-ownership group. The
    /// anchor is allocated separately from the object.
    ///
    /// The destroy operation is bound to the `T` of this call, the
    /// static type of the pointer expression handed in, not anything
    /// discovered later through the group.
    ///
    /// # Safety
    ///
    /// Same contract as [`Uniq::from_raw`]. In particular: adopting one
    /// address into two independent groups produces two anchors that each
    /// claim the object and each eventually destroy it: a double free.
    /// So does manually freeing an address any handle still owns, whether
    /// that address came from [`Shared::as_ptr`] or from the original
    /// variable. Neither is guarded.
    pub unsafe fn from_raw(raw: *mut T) -> Self
    {
        ledger::register_object();
        let obj = NonNull::new_unchecked(raw);
        Self {
            obj,
            anchor: AnchorPtr::adopted(obj),
            _owns: PhantomData,
        }
    }

    /// Derive a weak observer of this group.
    pub fn alias(&self) -> Weak<T>
    {
        self.anchor.bump_weak();
        Weak {
            obj: self.obj,
            anchor: self.anchor,
        }
    }

    /// Number of live strong owners in this group.
    pub fn strong_count(&self) -> usize { self.anchor.strong() }

    /// Number of live weak observers of this group.
    pub fn weak_count(&self) -> usize { self.anchor.weak() }

    /// Non-owning view of the managed address, for inspection only.
    pub fn as_ptr(&self) -> *const T { self.obj.as_ptr() }

    /// Whether two handles belong to the same group.
    pub fn ptr_eq(&self, other: &Shared<T>) -> bool
    {
        self.obj.as_ptr() == other.obj.as_ptr()
    }

    /// Move the object out if this is the last strong owner.
    ///
    /// On success any remaining weak observers are left expired: the
    /// object slot is vacated and upgrades fail from then on. Hands the
    /// handle back unchanged when other strong owners exist.
    pub fn try_into_inner(self) -> Result<T, Self>
    {
        if self.anchor.strong() != 1 {
            return Err(self);
        }
        let obj = self.obj;
        let anchor = self.anchor;
        std::mem::forget(self);
        let it = unsafe { ptr::read(obj.as_ptr()) };
        anchor.vacate_last();
        Ok(it)
    }

    /// Erase the object type, keeping only the strong-owner role.
    pub fn erase(self) -> Erased
    {
        let anchor = self.anchor;
        std::mem::forget(self);
        Erased { anchor }
    }
}

impl<T> Clone for Shared<T>
{
    /// Adds a strong owner to the same group.
    fn clone(&self) -> Self
    {
        self.anchor.bump_strong();
        Self {
            obj: self.obj,
            anchor: self.anchor,
            _owns: PhantomData,
        }
    }
}

impl<T> Drop for Shared<T>
{
    fn drop(&mut self) { self.anchor.release_strong(); }
}

impl<T> Deref for Shared<T>
{
    type Target = T;

    fn deref(&self) -> &Self::Target { unsafe { self.obj.as_ref() } }
}

impl<T> From<Uniq<T>> for Shared<T>
{
    /// Ownership transfers: the `Uniq` is consumed and its pointer
    /// rebased into a freshly created anchor.
    fn from(it: Uniq<T>) -> Shared<T> { it.into_shared() }
}

impl<T> fmt::Debug for Shared<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Shared")
            .field("obj", &self.obj)
            .field("anchor", &self.anchor)
            .finish()
    }
}

/// Non-owning observer of a shared-ownership group.
///
/// A `Weak` never reaches the object directly; it must upgrade first, and
/// the upgrade succeeds only while strong owners remain. Holding any
/// number of observers cannot extend the object's lifetime, only the
/// anchor's.
///
/// There is no way to build a `Weak` from a raw pointer: observation
/// without an existing strong owner would imply ownership over an address
/// this crate never vetted.
///
/// ```compile_fail
/// let raw = Box::into_raw(Box::new(5));
/// let w: custody::Weak<i32> = custody::Weak::from(raw);
/// ```
///
/// Nor does a [`Uniq`] produce one; exclusive custody has no observers:
///
/// ```compile_fail
/// let u = custody::Uniq::new(5);
/// let w: custody::Weak<i32> = u.into();
/// ```
pub struct Weak<T>
{
    obj: NonNull<T>,
    anchor: AnchorPtr,
}

impl<T> Weak<T>
{
    /// Attempt to join the observed group as a strong owner.
    ///
    /// Returns `None` once the group has no strong owner left. This is
    /// the non-failing path; constructing a [`Shared`] directly via
    /// `TryFrom` performs the same check but treats expiry as an error.
    pub fn upgrade(&self) -> Option<Shared<T>>
    {
        if self.anchor.strong() == 0 {
            None
        } else {
            self.anchor.bump_strong();
            Some(Shared {
                obj: self.obj,
                anchor: self.anchor,
                _owns: PhantomData,
            })
        }
    }

    /// Number of strong owners currently in the observed group.
    pub fn strong_count(&self) -> usize { self.anchor.strong() }
}

impl<T> Clone for Weak<T>
{
    fn clone(&self) -> Self
    {
        self.anchor.bump_weak();
        Self {
            obj: self.obj,
            anchor: self.anchor,
        }
    }
}

impl<T> Drop for Weak<T>
{
    fn drop(&mut self) { self.anchor.release_weak(); }
}

impl<'a, T> TryFrom<&'a Weak<T>> for Shared<T>
{
    type Error = Expired;

    /// Direct construction from an observer expects success: an expired
    /// target is an error here, where [`Weak::upgrade`] would return
    /// `None`.
    fn try_from(it: &'a Weak<T>) -> Result<Self, Expired> { it.upgrade().ok_or(Expired) }
}

impl<T> fmt::Debug for Weak<T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Weak")
            .field("obj", &self.obj)
            .field("anchor", &self.anchor)
            .finish()
    }
}

/// Type-erased strong owner.
///
/// Produced by [`Shared::erase`]. Keeps the managed object alive without
/// knowing its type; the destroy operation captured at group construction
/// still runs in full when the last strong owner goes, erased or not.
/// That capture is what makes a heterogeneous keep-alive list safe.
pub struct Erased
{
    anchor: AnchorPtr,
}

impl Erased
{
    /// Number of strong owners in the group, this handle included.
    pub fn strong_count(&self) -> usize { self.anchor.strong() }
}

impl Clone for Erased
{
    fn clone(&self) -> Self
    {
        self.anchor.bump_strong();
        Self { anchor: self.anchor }
    }
}

impl Drop for Erased
{
    fn drop(&mut self) { self.anchor.release_strong(); }
}

impl fmt::Debug for Erased
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("Erased").field("anchor", &self.anchor).finish()
    }
}

/// Error from constructing a [`Shared`] out of an observer whose group
/// already lost its last strong owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired;

impl fmt::Display for Expired
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str("expired weak reference")
    }
}

impl Error for Expired {}
