use std::alloc::Layout;
use std::any::TypeId;
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::ops::{AddAssign, DivAssign, MulAssign, Neg, RemAssign, SubAssign};
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;

use crate::symbols::{hash_name, Symbol, SymbolTable};
use crate::var::Var;

/// Directed conversion between two registered types. The produced Var is
/// fully formed, descriptor included.
pub type CastFn = Arc<dyn Fn(&Var) -> Var + Send + Sync>;

type BinaryOp = unsafe fn(*mut u8, *const u8);
type UnaryOp = unsafe fn(*mut u8);

/// The per-type operation record every Var dispatches through. All
/// pointers are monomorphized at registration; none assume a concrete
/// type at the call site.
pub(crate) struct TypeOps {
    pub(crate) default: unsafe fn(*mut u8),
    pub(crate) clone: unsafe fn(*const u8, *mut u8),
    pub(crate) drop: unsafe fn(*mut u8),
    pub(crate) print: unsafe fn(*const u8, &mut String),
    pub(crate) text: unsafe fn(*const u8, &mut String),
    pub(crate) hash: unsafe fn(*const u8) -> u32,
    pub(crate) cmp: Option<unsafe fn(*const u8, *const u8) -> Ordering>,
    pub(crate) add: Option<BinaryOp>,
    pub(crate) sub: Option<BinaryOp>,
    pub(crate) mul: Option<BinaryOp>,
    pub(crate) div: Option<BinaryOp>,
    pub(crate) rem: Option<BinaryOp>,
    pub(crate) neg: Option<UnaryOp>,
    pub(crate) to_json: Option<unsafe fn(*const u8) -> serde_json::Value>,
}

struct CastEntry {
    apply: CastFn,
}

pub struct TypeDescriptor {
    name: Symbol,
    label: Arc<str>,
    size: usize,
    align: usize,
    pub(crate) layout: Layout,
    pub(crate) rust_id: TypeId,
    pub(crate) ops: TypeOps,
    casts: RwLock<HashMap<TypeId, CastEntry>>,
}

impl TypeDescriptor {
    pub fn name(&self) -> Symbol {
        self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn has_cmp(&self) -> bool {
        self.ops.cmp.is_some()
    }

    /// Cast function toward `target`, or None when no such conversion was
    /// declared. Absence is a normal outcome, not an error.
    pub fn cast_to(&self, target: &TypeDescriptor) -> Option<CastFn> {
        self.cast_to_id(target.rust_id)
    }

    pub(crate) fn cast_to_id(&self, target: TypeId) -> Option<CastFn> {
        self.casts
            .read()
            .unwrap()
            .get(&target)
            .map(|entry| entry.apply.clone())
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("label", &self.label)
            .field("size", &self.size)
            .finish()
    }
}

unsafe fn noop_unary(_: *mut u8) {}
unsafe fn noop_clone(_: *const u8, _: *mut u8) {}
unsafe fn noop_write(_: *const u8, _: &mut String) {}
unsafe fn zero_hash(_: *const u8) -> u32 {
    0
}
unsafe fn void_cmp(_: *const u8, _: *const u8) -> Ordering {
    Ordering::Equal
}

/// Descriptor of the zero-sized placeholder every default-constructed Var
/// holds. Shared by all registries.
pub(crate) static VOID: Lazy<Arc<TypeDescriptor>> = Lazy::new(|| {
    Arc::new(TypeDescriptor {
        name: Symbol(hash_name("void")),
        label: Arc::from("void"),
        size: 0,
        align: 1,
        layout: Layout::new::<()>(),
        rust_id: TypeId::of::<()>(),
        ops: TypeOps {
            default: noop_unary,
            clone: noop_clone,
            drop: noop_unary,
            print: noop_write,
            text: noop_write,
            hash: zero_hash,
            cmp: Some(void_cmp),
            add: None,
            sub: None,
            mul: None,
            div: None,
            rem: None,
            neg: None,
            to_json: None,
        },
        casts: RwLock::new(HashMap::new()),
    })
});

unsafe fn default_op<T: Default>(dst: *mut u8) {
    dst.cast::<T>().write(T::default());
}

unsafe fn clone_op<T: Clone>(src: *const u8, dst: *mut u8) {
    dst.cast::<T>().write((*src.cast::<T>()).clone());
}

unsafe fn drop_op<T>(p: *mut u8) {
    std::ptr::drop_in_place(p.cast::<T>());
}

unsafe fn print_op<T: fmt::Display>(p: *const u8, out: &mut String) {
    let _ = write!(out, "{}", &*p.cast::<T>());
}

unsafe fn hash_op<T: Hash>(p: *const u8) -> u32 {
    let mut hasher = DefaultHasher::new();
    (*p.cast::<T>()).hash(&mut hasher);
    hasher.finish() as u32
}

unsafe fn cmp_op<T: PartialOrd>(a: *const u8, b: *const u8) -> Ordering {
    (*a.cast::<T>())
        .partial_cmp(&*b.cast::<T>())
        .unwrap_or(Ordering::Equal)
}

unsafe fn add_op<T: AddAssign + Copy>(a: *mut u8, b: *const u8) {
    *a.cast::<T>() += *b.cast::<T>();
}

unsafe fn sub_op<T: SubAssign + Copy>(a: *mut u8, b: *const u8) {
    *a.cast::<T>() -= *b.cast::<T>();
}

unsafe fn mul_op<T: MulAssign + Copy>(a: *mut u8, b: *const u8) {
    *a.cast::<T>() *= *b.cast::<T>();
}

unsafe fn div_op<T: DivAssign + Copy>(a: *mut u8, b: *const u8) {
    *a.cast::<T>() /= *b.cast::<T>();
}

unsafe fn rem_op<T: RemAssign + Copy>(a: *mut u8, b: *const u8) {
    *a.cast::<T>() %= *b.cast::<T>();
}

unsafe fn neg_op<T: Neg<Output = T> + Copy>(p: *mut u8) {
    let value = *p.cast::<T>();
    p.cast::<T>().write(-value);
}

unsafe fn to_json_op<T: serde::Serialize>(p: *const u8) -> serde_json::Value {
    serde_json::to_value(&*p.cast::<T>()).unwrap_or(serde_json::Value::Null)
}

#[derive(Default)]
struct RegistryState {
    by_rust: HashMap<TypeId, Arc<TypeDescriptor>>,
    by_name: HashMap<Symbol, Arc<TypeDescriptor>>,
}

/// The closed type universe: populated during initialization, read-only
/// during execution.
pub struct TypeRegistry {
    symbols: Arc<SymbolTable>,
    state: RwLock<RegistryState>,
}

impl TypeRegistry {
    pub fn new(symbols: Arc<SymbolTable>) -> Self {
        Self {
            symbols,
            state: RwLock::new(RegistryState::default()),
        }
    }

    pub fn symbols(&self) -> &Arc<SymbolTable> {
        &self.symbols
    }

    /// Start registering `T`. Capability setters on the builder mirror the
    /// optional descriptor hooks; `finish` publishes the descriptor or
    /// returns the existing one when `T` was already registered.
    pub fn register<T>(&self, name: &str) -> TypeBuilder<'_, T>
    where
        T: Clone + Default + fmt::Display + Send + Sync + 'static,
    {
        TypeBuilder {
            registry: self,
            label: name.to_string(),
            ops: TypeOps {
                default: default_op::<T>,
                clone: clone_op::<T>,
                drop: drop_op::<T>,
                print: print_op::<T>,
                text: print_op::<T>,
                hash: zero_hash,
                cmp: None,
                add: None,
                sub: None,
                mul: None,
                div: None,
                rem: None,
                neg: None,
                to_json: None,
            },
            _marker: PhantomData,
        }
    }

    /// Descriptor for `T`. The type universe is closed after process
    /// initialization, so an unregistered lookup is a host-embedding bug.
    pub fn describe<T: 'static>(&self) -> Arc<TypeDescriptor> {
        self.try_describe::<T>().unwrap_or_else(|| {
            panic!(
                "type {} was never registered",
                std::any::type_name::<T>()
            )
        })
    }

    pub fn try_describe<T: 'static>(&self) -> Option<Arc<TypeDescriptor>> {
        self.state
            .read()
            .unwrap()
            .by_rust
            .get(&TypeId::of::<T>())
            .cloned()
    }

    pub fn describe_name(&self, name: Symbol) -> Option<Arc<TypeDescriptor>> {
        self.state.read().unwrap().by_name.get(&name).cloned()
    }

    pub fn get_cast(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> Option<CastFn> {
        from.cast_to(to)
    }

    /// Install a directed cast. A cast from a type to itself is silently
    /// ignored: identity conversion is the caller's no-op.
    pub fn declare_cast<A, B>(&self, convert: fn(&A) -> B)
    where
        A: 'static,
        B: 'static,
    {
        if TypeId::of::<A>() == TypeId::of::<B>() {
            return;
        }
        let from = self.describe::<A>();
        let to = self.describe::<B>();
        let apply: CastFn = Arc::new(move |var: &Var| {
            let a = unsafe { var.as_ref_unchecked::<A>() };
            Var::from_value(to.clone(), convert(a))
        });
        from.casts
            .write()
            .unwrap()
            .insert(TypeId::of::<B>(), CastEntry { apply });
    }

    /// Construct a Var holding `value`, dispatching storage through the
    /// registered descriptor.
    pub fn var<T: 'static>(&self, value: T) -> Var {
        Var::from_value(self.describe::<T>(), value)
    }
}

#[must_use]
pub struct TypeBuilder<'r, T> {
    registry: &'r TypeRegistry,
    label: String,
    ops: TypeOps,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T> TypeBuilder<'r, T>
where
    T: Clone + Default + fmt::Display + Send + Sync + 'static,
{
    pub fn can_cmp(mut self) -> Self
    where
        T: PartialOrd,
    {
        self.ops.cmp = Some(cmp_op::<T>);
        self
    }

    pub fn can_math(mut self) -> Self
    where
        T: AddAssign + SubAssign + MulAssign + DivAssign + Neg<Output = T> + Copy,
    {
        self.ops.add = Some(add_op::<T>);
        self.ops.sub = Some(sub_op::<T>);
        self.ops.mul = Some(mul_op::<T>);
        self.ops.div = Some(div_op::<T>);
        self.ops.neg = Some(neg_op::<T>);
        self
    }

    pub fn can_rem(mut self) -> Self
    where
        T: RemAssign + Copy,
    {
        self.ops.rem = Some(rem_op::<T>);
        self
    }

    pub fn can_hash(mut self) -> Self
    where
        T: Hash,
    {
        self.ops.hash = hash_op::<T>;
        self
    }

    pub fn can_serde(mut self) -> Self
    where
        T: serde::Serialize,
    {
        self.ops.to_json = Some(to_json_op::<T>);
        self
    }

    pub(crate) fn with_hash_op(mut self, op: unsafe fn(*const u8) -> u32) -> Self {
        self.ops.hash = op;
        self
    }

    pub(crate) fn with_text_op(mut self, op: unsafe fn(*const u8, &mut String)) -> Self {
        self.ops.text = op;
        self
    }

    pub(crate) fn with_add_op(mut self, op: BinaryOp) -> Self {
        self.ops.add = Some(op);
        self
    }

    pub(crate) fn with_div_op(mut self, op: BinaryOp) -> Self {
        self.ops.div = Some(op);
        self
    }

    pub(crate) fn with_rem_op(mut self, op: BinaryOp) -> Self {
        self.ops.rem = Some(op);
        self
    }

    pub fn finish(self) -> Arc<TypeDescriptor> {
        let rust_id = TypeId::of::<T>();
        let name = self.registry.symbols.intern(&self.label);
        let mut state = self.registry.state.write().unwrap();
        if let Some(existing) = state.by_rust.get(&rust_id) {
            return existing.clone();
        }
        if let Some(clash) = state.by_name.get(&name) {
            panic!(
                "type name {:?} already registered for another type",
                clash.label()
            );
        }
        let descriptor = Arc::new(TypeDescriptor {
            name,
            label: Arc::from(self.label.as_str()),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
            layout: Layout::new::<T>(),
            rust_id,
            ops: self.ops,
            casts: RwLock::new(HashMap::new()),
        });
        state.by_rust.insert(rust_id, descriptor.clone());
        state.by_name.insert(name, descriptor.clone());
        descriptor
    }
}
