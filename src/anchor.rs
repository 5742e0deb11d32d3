use std::{
    cell::Cell,
    fmt,
    mem::{ManuallyDrop, MaybeUninit},
    ptr::NonNull,
};

use crate::ledger;

/// Bookkeeping record at the head of every shared-ownership group.
///
/// The destroy, vacate, and release operations are monomorphized at the
/// construction call that first binds a typed pointer to the group, then
/// stored erased. They are never recomputed from the static type of a
/// handle that reaches the group later.
pub(crate) struct Header
{
    strong: Cell<usize>,
    weak: Cell<usize>,
    /// Runs the managed object's destructor. On the adoption path this
    /// also frees the object's own allocation.
    destroy: unsafe fn(NonNull<Header>),
    /// Frees the object's storage after the value was moved out by hand.
    vacate: unsafe fn(NonNull<Header>),
    /// Frees the anchor storage itself.
    release: unsafe fn(NonNull<Header>),
}

impl Header
{
    fn new(
        destroy: unsafe fn(NonNull<Header>),
        vacate: unsafe fn(NonNull<Header>),
        release: unsafe fn(NonNull<Header>),
    ) -> Self
    {
        Header {
            strong: Cell::new(1),
            weak: Cell::new(0),
            destroy,
            vacate,
            release,
        }
    }
}

/// Factory-path anchor: the object lives inside the same allocation as
/// the header.
#[repr(C)]
struct InlineAnchor<T>
{
    head: Header,
    data: MaybeUninit<T>,
}

/// Adoption-path anchor: the object keeps the separate allocation it
/// arrived with.
#[repr(C)]
struct AdoptedAnchor<T>
{
    head: Header,
    obj: NonNull<T>,
}

/// Erased handle to an anchor of either kind.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub(crate) struct AnchorPtr(NonNull<Header>);

impl AnchorPtr
{
    /// Allocate object and header together in one allocation.
    pub(crate) fn inline<T>(it: T) -> (AnchorPtr, NonNull<T>)
    {
        let raw = Box::into_raw(Box::new(InlineAnchor {
            head: Header::new(
                destroy_inline::<T>,
                vacate_inline::<T>,
                release_inline::<T>,
            ),
            data: MaybeUninit::new(it),
        }));
        ledger::register_anchor();
        unsafe {
            let obj = NonNull::new_unchecked((*raw).data.as_mut_ptr());
            (AnchorPtr(NonNull::new_unchecked(raw).cast()), obj)
        }
    }

    /// Allocate a header for an object that already has its own storage.
    pub(crate) fn adopted<T>(obj: NonNull<T>) -> AnchorPtr
    {
        let raw = Box::into_raw(Box::new(AdoptedAnchor {
            head: Header::new(
                destroy_adopted::<T>,
                vacate_adopted::<T>,
                release_adopted::<T>,
            ),
            obj,
        }));
        ledger::register_anchor();
        AnchorPtr(unsafe { NonNull::new_unchecked(raw) }.cast())
    }

    fn head(&self) -> &Header { unsafe { self.0.as_ref() } }

    pub(crate) fn strong(&self) -> usize { self.head().strong.get() }

    pub(crate) fn weak(&self) -> usize { self.head().weak.get() }

    pub(crate) fn bump_strong(&self)
    {
        let n = self.head().strong.get();
        if n == usize::MAX {
            panic!("strong count overflow");
        }
        self.head().strong.set(n + 1);
    }

    pub(crate) fn bump_weak(&self)
    {
        let n = self.head().weak.get();
        if n == usize::MAX {
            panic!("weak count overflow");
        }
        self.head().weak.set(n + 1);
    }

    /// Drop one strong owner. At zero the managed object is destroyed
    /// immediately; the anchor storage goes only once no weak observer is
    /// left either.
    ///
    /// The weak count is read before the destroy call runs: the destructor
    /// may drop an observer of this same group, and that nested release
    /// must not race this one into freeing the anchor twice.
    pub(crate) fn release_strong(self)
    {
        let head = self.head();
        let n = head.strong.get() - 1;
        head.strong.set(n);
        if n > 0 {
            return;
        }
        let weaks = head.weak.get();
        let destroy = head.destroy;
        let release = head.release;
        unsafe { destroy(self.0) };
        ledger::deregister_object();
        if weaks == 0 {
            unsafe { release(self.0) };
            ledger::deregister_anchor();
        }
    }

    /// Drop one weak observer; the last one out on a dead group frees the
    /// anchor storage.
    pub(crate) fn release_weak(self)
    {
        let head = self.head();
        let n = head.weak.get() - 1;
        head.weak.set(n);
        if n == 0 && head.strong.get() == 0 {
            let release = head.release;
            unsafe { release(self.0) };
            ledger::deregister_anchor();
        }
    }

    /// Clear the last strong owner after the value was already moved out.
    /// Remaining observers see an expired group.
    pub(crate) fn vacate_last(self)
    {
        let head = self.head();
        head.strong.set(0);
        let weaks = head.weak.get();
        let vacate = head.vacate;
        let release = head.release;
        unsafe { vacate(self.0) };
        ledger::deregister_object();
        if weaks == 0 {
            unsafe { release(self.0) };
            ledger::deregister_anchor();
        }
    }
}

impl fmt::Debug for AnchorPtr
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("AnchorPtr")
            .field("strong", &self.strong())
            .field("weak", &self.weak())
            .finish()
    }
}

unsafe fn destroy_inline<T>(head: NonNull<Header>)
{
    let mut anchor = head.cast::<InlineAnchor<T>>();
    anchor.as_mut().data.assume_init_drop();
}

unsafe fn vacate_inline<T>(_head: NonNull<Header>)
{
    // The slot is part of the anchor allocation; nothing to free until
    // release.
}

unsafe fn release_inline<T>(head: NonNull<Header>)
{
    // MaybeUninit carries no drop glue, so this frees the storage without
    // touching the (already destroyed or moved-out) payload.
    drop(Box::from_raw(head.cast::<InlineAnchor<T>>().as_ptr()));
}

unsafe fn destroy_adopted<T>(head: NonNull<Header>)
{
    let obj = head.cast::<AdoptedAnchor<T>>().as_ref().obj;
    drop(Box::from_raw(obj.as_ptr()));
}

unsafe fn vacate_adopted<T>(head: NonNull<Header>)
{
    let obj = head.cast::<AdoptedAnchor<T>>().as_ref().obj;
    drop(Box::from_raw(obj.as_ptr() as *mut ManuallyDrop<T>));
}

unsafe fn release_adopted<T>(head: NonNull<Header>)
{
    drop(Box::from_raw(head.cast::<AdoptedAnchor<T>>().as_ptr()));
}
