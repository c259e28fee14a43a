use std::alloc;
use std::alloc::Layout;
use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::types::{TypeDescriptor, TypeOps, TypeRegistry, VOID};

/// Values whose size fits here (and whose alignment fits the buffer) are
/// stored without touching the heap.
pub const INLINE_CAPACITY: usize = 16;

const INLINE_ALIGN: usize = 8;

#[repr(C, align(8))]
struct InlineBuf {
    bytes: [MaybeUninit<u8>; INLINE_CAPACITY],
}

impl InlineBuf {
    fn new() -> Self {
        Self {
            bytes: [MaybeUninit::uninit(); INLINE_CAPACITY],
        }
    }
}

enum Storage {
    Inline(InlineBuf),
    Heap { ptr: NonNull<u8>, layout: Layout },
}

impl Storage {
    /// Allocates uninitialized storage sized for the descriptor. The bytes
    /// must be written before any descriptor op reads them.
    fn for_descriptor(desc: &TypeDescriptor) -> Storage {
        if fits_inline(desc) {
            Storage::Inline(InlineBuf::new())
        } else {
            let layout = desc.layout;
            let ptr = unsafe { alloc::alloc(layout) };
            let Some(ptr) = NonNull::new(ptr) else {
                alloc::handle_alloc_error(layout);
            };
            Storage::Heap { ptr, layout }
        }
    }

    fn ptr(&self) -> *const u8 {
        match self {
            Storage::Inline(buf) => buf.bytes.as_ptr().cast::<u8>(),
            Storage::Heap { ptr, .. } => ptr.as_ptr(),
        }
    }

    fn ptr_mut(&mut self) -> *mut u8 {
        match self {
            Storage::Inline(buf) => buf.bytes.as_mut_ptr().cast::<u8>(),
            Storage::Heap { ptr, .. } => ptr.as_ptr(),
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        if let Storage::Heap { ptr, layout } = self {
            unsafe { alloc::dealloc(ptr.as_ptr(), *layout) };
        }
    }
}

fn fits_inline(desc: &TypeDescriptor) -> bool {
    desc.size() == 0 || (desc.size() <= INLINE_CAPACITY && desc.align() <= INLINE_ALIGN)
}

/// A type-erased value: a descriptor plus inline or exclusively-owned heap
/// storage. Every construct/clone/drop goes through the descriptor's
/// operation record.
pub struct Var {
    desc: Arc<TypeDescriptor>,
    storage: Storage,
}

// Registration requires Send + Sync payloads, so erased storage is safe to
// move and share across threads.
unsafe impl Send for Var {}
unsafe impl Sync for Var {}

impl Var {
    /// The inert placeholder value (zero-sized `void` type).
    pub fn void() -> Var {
        Var {
            desc: VOID.clone(),
            storage: Storage::Inline(InlineBuf::new()),
        }
    }

    pub(crate) fn from_value<T: 'static>(desc: Arc<TypeDescriptor>, value: T) -> Var {
        debug_assert_eq!(desc.rust_id, TypeId::of::<T>());
        let mut storage = Storage::for_descriptor(&desc);
        unsafe { storage.ptr_mut().cast::<T>().write(value) };
        Var { desc, storage }
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.desc
    }

    pub fn type_label(&self) -> &str {
        self.desc.label()
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.storage, Storage::Inline(_))
    }

    fn ops(&self) -> &TypeOps {
        &self.desc.ops
    }

    fn data(&self) -> *const u8 {
        self.storage.ptr()
    }

    fn data_mut(&mut self) -> *mut u8 {
        self.storage.ptr_mut()
    }

    /// Identity comparison against `T`'s registration key.
    pub fn is<T: 'static>(&self) -> bool {
        self.desc.rust_id == TypeId::of::<T>()
    }

    pub fn same_type(&self, other: &Var) -> bool {
        Arc::ptr_eq(&self.desc, &other.desc) || self.desc.rust_id == other.desc.rust_id
    }

    /// Reinterpret the storage as `T`.
    ///
    /// # Safety
    /// The caller must have confirmed `is::<T>()`; anything else is
    /// undefined behavior. This is the explicit escape hatch, not a
    /// checked accessor.
    pub unsafe fn as_ref_unchecked<T>(&self) -> &T {
        &*self.data().cast::<T>()
    }

    /// Mutable variant of [`Var::as_ref_unchecked`].
    ///
    /// # Safety
    /// Same contract: `is::<T>()` must hold.
    pub unsafe fn as_mut_unchecked<T>(&mut self) -> &mut T {
        &mut *self.data_mut().cast::<T>()
    }

    /// Checked accessor: the value if already `T`, else the result of a
    /// registered cast, else `T::default()`. Never fails.
    pub fn get<T: Clone + Default + 'static>(&self) -> T {
        if self.is::<T>() {
            return unsafe { self.as_ref_unchecked::<T>() }.clone();
        }
        if let Some(cast) = self.desc.cast_to_id(TypeId::of::<T>()) {
            let tmp = cast(self);
            debug_assert!(tmp.is::<T>());
            return unsafe { tmp.as_ref_unchecked::<T>() }.clone();
        }
        T::default()
    }

    pub fn can_be(&self, target: &TypeDescriptor) -> bool {
        self.desc.cast_to(target).is_some()
    }

    /// Convert this Var in place to hold a `T` (via cast when available,
    /// else default construction) and rebind its descriptor.
    pub fn make<T: Clone + Default + 'static>(&mut self, types: &TypeRegistry) -> &mut T {
        if !self.is::<T>() {
            let next = match self.desc.cast_to_id(TypeId::of::<T>()) {
                Some(cast) => cast(self),
                None => types.var(T::default()),
            };
            *self = next;
        }
        unsafe { self.as_mut_unchecked::<T>() }
    }

    /// Move the held value out, leaving this Var holding a freshly
    /// default-constructed value of its original type.
    pub fn take(&mut self) -> Var {
        let mut storage = Storage::for_descriptor(&self.desc);
        unsafe { (self.desc.ops.default)(storage.ptr_mut()) };
        let fresh = Var {
            desc: self.desc.clone(),
            storage,
        };
        mem::replace(self, fresh)
    }

    pub fn hash_value(&self) -> u32 {
        unsafe { (self.ops().hash)(self.data()) }
    }

    /// Literal text form; the reader maps it back onto an equal scalar.
    pub fn text(&self) -> String {
        let mut out = String::new();
        unsafe { (self.ops().text)(self.data(), &mut out) };
        out
    }

    pub fn to_json(&self) -> Option<serde_json::Value> {
        self.ops().to_json.map(|f| unsafe { f(self.data()) })
    }

    /// Comparison of same-typed, comparison-capable values. None means the
    /// pair is not meaningfully comparable.
    pub fn compare(&self, other: &Var) -> Option<Ordering> {
        if !self.same_type(other) {
            return None;
        }
        self.ops()
            .cmp
            .map(|f| unsafe { f(self.data(), other.data()) })
    }

    /// Domain-meaningful equality: same type, comparison hook says equal.
    pub fn semantic_eq(&self, other: &Var) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    fn apply_binary(
        &mut self,
        rhs: &Var,
        pick: fn(&TypeOps) -> Option<unsafe fn(*mut u8, *const u8)>,
    ) {
        let Some(op) = pick(self.ops()) else {
            return;
        };
        if self.same_type(rhs) {
            unsafe { op(self.data_mut(), rhs.data()) };
        } else if let Some(cast) = rhs.desc.cast_to_id(self.desc.rust_id) {
            let tmp = cast(rhs);
            unsafe { op(self.data_mut(), tmp.data()) };
        }
    }

    pub fn add_assign_var(&mut self, rhs: &Var) {
        self.apply_binary(rhs, |ops| ops.add);
    }

    pub fn sub_assign_var(&mut self, rhs: &Var) {
        self.apply_binary(rhs, |ops| ops.sub);
    }

    pub fn mul_assign_var(&mut self, rhs: &Var) {
        self.apply_binary(rhs, |ops| ops.mul);
    }

    pub fn div_assign_var(&mut self, rhs: &Var) {
        self.apply_binary(rhs, |ops| ops.div);
    }

    pub fn rem_assign_var(&mut self, rhs: &Var) {
        self.apply_binary(rhs, |ops| ops.rem);
    }

    pub fn negate(&mut self) {
        if let Some(op) = self.ops().neg {
            unsafe { op(self.data_mut()) };
        }
    }
}

impl Default for Var {
    fn default() -> Self {
        Var::void()
    }
}

impl Clone for Var {
    fn clone(&self) -> Self {
        let mut storage = Storage::for_descriptor(&self.desc);
        unsafe { (self.desc.ops.clone)(self.data(), storage.ptr_mut()) };
        Var {
            desc: self.desc.clone(),
            storage,
        }
    }
}

impl Drop for Var {
    fn drop(&mut self) {
        unsafe { (self.desc.ops.drop)(self.data_mut()) };
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Var) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Var {}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Var) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Var {
    /// Same-typed comparable values order through their hook; everything
    /// else falls back to the descriptor-pointer tie-break so Vars can
    /// live in ordered containers. The tie-break carries no domain
    /// meaning.
    fn cmp(&self, other: &Var) -> Ordering {
        if let Some(ordering) = self.compare(other) {
            return ordering;
        }
        let a = Arc::as_ptr(&self.desc) as usize;
        let b = Arc::as_ptr(&other.desc) as usize;
        a.cmp(&b)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        unsafe { (self.ops().print)(self.data(), &mut out) };
        f.write_str(&out)
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Var<{}>({})", self.type_label(), self)
    }
}
