// descriptor.rs - Runtime description of a storable type
//
// A descriptor carries everything type-erased storage needs to hold values of
// one type: its layout plus the clone and drop operations. Moves are plain
// byte copies in Rust, so they need no function pointer.

use crate::ecs::{Component, ComponentId};
use std::any::TypeId;
use std::fmt;
use std::mem::{align_of, needs_drop, size_of};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique descriptor id. Archetype signatures are sorted by it.
pub type TypeDescriptorId = u64;

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

type CloneFn = unsafe fn(*const u8, *mut u8);
type CloneManyFn = unsafe fn(*const u8, *mut u8, usize);
type DropFn = unsafe fn(*mut u8);

/// Layout and value operations for one component type.
pub struct TypeDescriptor {
    id: TypeDescriptorId,
    component_id: ComponentId,
    name: String,
    size: usize,
    align: usize,
    type_id: Option<TypeId>,
    trivially_copyable: bool,
    clone_fn: Option<CloneFn>,
    clone_many_fn: Option<CloneManyFn>,
    drop_fn: Option<DropFn>,
}

impl TypeDescriptor {
    /// Describe a Rust component type.
    pub fn of<T: Component>() -> Self {
        Self::typed::<T>(T::ID, T::NAME, T::TRIVIALLY_COPYABLE)
    }

    pub(crate) fn typed<T>(component_id: ComponentId, name: &str, trivially_copyable: bool) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self {
            id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
            component_id,
            name: name.to_string(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            type_id: Some(TypeId::of::<T>()),
            trivially_copyable,
            clone_fn: (!trivially_copyable).then_some(clone_one::<T> as CloneFn),
            clone_many_fn: (!trivially_copyable).then_some(clone_many::<T> as CloneManyFn),
            drop_fn: needs_drop::<T>().then_some(drop_one::<T> as DropFn),
        }
    }

    /// Describe a plain-bytes type known only at run time.
    ///
    /// Raw values are copied bytewise and never need dropping. `align` must be
    /// a power of two and `size` a multiple of it.
    pub fn raw(component_id: ComponentId, name: impl Into<String>, size: usize, align: usize) -> Self {
        assert!(
            align.is_power_of_two(),
            "raw component {component_id} alignment {align} is not a power of two"
        );
        assert_eq!(
            size % align,
            0,
            "raw component {component_id} size {size} is not a multiple of its alignment {align}"
        );
        Self {
            id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
            component_id,
            name: name.into(),
            size,
            align,
            type_id: None,
            trivially_copyable: true,
            clone_fn: None,
            clone_many_fn: None,
            drop_fn: None,
        }
    }

    #[inline]
    pub fn id(&self) -> TypeDescriptorId {
        self.id
    }

    #[inline]
    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn align(&self) -> usize {
        self.align
    }

    #[inline]
    pub fn is_trivially_copyable(&self) -> bool {
        self.trivially_copyable
    }

    #[inline]
    pub fn is_trivially_destructible(&self) -> bool {
        self.drop_fn.is_none()
    }

    /// Raw descriptors have no Rust type behind them.
    #[inline]
    pub fn is_raw(&self) -> bool {
        self.type_id.is_none()
    }

    #[inline]
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_id
    }

    /// Whether this descriptor describes the Rust type `T`.
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == Some(TypeId::of::<T>())
    }

    /// Write a clone of the value at `src` into uninitialized `dst`.
    ///
    /// # Safety
    /// `src` must point at a live value of this type and `dst` at writable,
    /// suitably aligned, uninitialized storage that does not overlap it.
    pub unsafe fn clone_to(&self, src: *const u8, dst: *mut u8) {
        match self.clone_fn {
            Some(clone) => unsafe { clone(src, dst) },
            None => unsafe { ptr::copy_nonoverlapping(src, dst, self.size) },
        }
    }

    /// Clone `count` contiguous values from `src` into `dst`.
    ///
    /// # Safety
    /// Same as [`clone_to`](Self::clone_to) for every element.
    pub unsafe fn clone_many_to(&self, src: *const u8, dst: *mut u8, count: usize) {
        match self.clone_many_fn {
            Some(clone_many) => unsafe { clone_many(src, dst, count) },
            None => unsafe { ptr::copy_nonoverlapping(src, dst, self.size * count) },
        }
    }

    /// Move the value at `src` into uninitialized `dst`. The source is left
    /// logically uninitialized and must not be dropped afterwards.
    ///
    /// # Safety
    /// As for [`clone_to`](Self::clone_to); `src` and `dst` may be equal.
    #[inline]
    pub unsafe fn move_to(&self, src: *const u8, dst: *mut u8) {
        if src != dst as *const u8 {
            unsafe { ptr::copy_nonoverlapping(src, dst, self.size) };
        }
    }

    /// Run the value's destructor in place, if it has one.
    ///
    /// # Safety
    /// `ptr` must point at a live value of this type, which is dead afterwards.
    #[inline]
    pub unsafe fn drop_in_place(&self, ptr: *mut u8) {
        if let Some(drop) = self.drop_fn {
            unsafe { drop(ptr) };
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("id", &self.id)
            .field("component_id", &self.component_id)
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("raw", &self.is_raw())
            .finish()
    }
}

unsafe fn clone_one<T: Clone>(src: *const u8, dst: *mut u8) {
    unsafe {
        let value = (*src.cast::<T>()).clone();
        ptr::write(dst.cast::<T>(), value);
    }
}

unsafe fn clone_many<T: Clone>(src: *const u8, dst: *mut u8, count: usize) {
    let src = src.cast::<T>();
    let dst = dst.cast::<T>();
    for i in 0..count {
        unsafe { ptr::write(dst.add(i), (*src.add(i)).clone()) };
    }
}

unsafe fn drop_one<T>(ptr: *mut u8) {
    unsafe { ptr::drop_in_place(ptr.cast::<T>()) };
}
