//! Runtime values, environments, and the extern table.
//!
//! Everything a program can evaluate to lives in [`RuntimeValue`]. Host
//! functions are [`NativeFn`]s that collect arguments one at a time until
//! saturated; host objects the core cannot inspect travel as [`Opaque`]
//! handles. The extern table assigns stable indices to host values so that
//! compiled code can refer to them without owning them.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Type;

/// A source-level literal, as carried by compiled code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Num(f64),
    Str(String),
    Bool(bool),
}

impl Literal {
    pub fn to_runtime(&self) -> RuntimeValue {
        match self {
            Literal::Int(v) => RuntimeValue::Int(*v),
            Literal::Num(v) => RuntimeValue::Num(*v),
            Literal::Str(v) => RuntimeValue::Str(v.clone()),
            Literal::Bool(v) => RuntimeValue::Bool(*v),
        }
    }
}

/// A host function that supports partial application.
///
/// Calling an unsaturated `NativeFn` yields a new one carrying the argument;
/// the underlying implementation runs only once all `arity` arguments have
/// been collected.
#[derive(Clone)]
pub struct NativeFn {
    name: String,
    arity: usize,
    collected: Vec<RuntimeValue>,
    run: Rc<dyn Fn(&[RuntimeValue]) -> Result<RuntimeValue, CoreError>>,
}

impl NativeFn {
    pub fn new(
        name: &str,
        arity: usize,
        run: impl Fn(&[RuntimeValue]) -> Result<RuntimeValue, CoreError> + 'static,
    ) -> NativeFn {
        NativeFn {
            name: name.to_string(),
            arity,
            collected: Vec::new(),
            run: Rc::new(run),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, arg: RuntimeValue) -> Result<RuntimeValue, CoreError> {
        let mut collected = self.collected.clone();
        collected.push(arg);
        if collected.len() >= self.arity {
            (self.run)(&collected)
        } else {
            Ok(RuntimeValue::Native(NativeFn {
                name: self.name.clone(),
                arity: self.arity,
                collected,
                run: Rc::clone(&self.run),
            }))
        }
    }

    /// Whether two natives share the same underlying implementation.
    pub fn same_impl(&self, other: &NativeFn) -> bool {
        // compare data pointers only; the vtable half may differ per crate
        Rc::as_ptr(&self.run) as *const () == Rc::as_ptr(&other.run) as *const ()
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .field("collected", &self.collected)
            .finish_non_exhaustive()
    }
}

/// A host object the language treats as a black box. Two opaques are the
/// same value only when they wrap the same allocation.
#[derive(Clone)]
pub struct Opaque {
    tag: String,
    handle: Rc<dyn Any>,
}

impl Opaque {
    pub fn new(tag: &str, handle: Rc<dyn Any>) -> Opaque {
        Opaque {
            tag: tag.to_string(),
            handle,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn handle(&self) -> &Rc<dyn Any> {
        &self.handle
    }

    pub fn same_handle(&self, other: &Opaque) -> bool {
        Rc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opaque")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

/// Every value a program can produce.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
    Int(i64),
    Num(f64),
    Str(String),
    Bool(bool),
    Unit,
    List(Vec<RuntimeValue>),
    Native(NativeFn),
    Closure {
        param: String,
        body: Rc<crate::value::Code>,
        env: Env,
    },
    Opaque(Opaque),
}

impl RuntimeValue {
    /// Identity comparison for host-provided values. Structural values are
    /// never "the same referent"; closures and literals always report false.
    pub fn same_referent(&self, other: &RuntimeValue) -> bool {
        match (self, other) {
            (RuntimeValue::Native(a), RuntimeValue::Native(b)) => {
                a.same_impl(b) && a.collected == b.collected
            }
            (RuntimeValue::Opaque(a), RuntimeValue::Opaque(b)) => a.same_handle(b),
            _ => false,
        }
    }
}

impl PartialEq for RuntimeValue {
    fn eq(&self, other: &RuntimeValue) -> bool {
        match (self, other) {
            (RuntimeValue::Int(a), RuntimeValue::Int(b)) => a == b,
            (RuntimeValue::Num(a), RuntimeValue::Num(b)) => a == b,
            (RuntimeValue::Str(a), RuntimeValue::Str(b)) => a == b,
            (RuntimeValue::Bool(a), RuntimeValue::Bool(b)) => a == b,
            (RuntimeValue::Unit, RuntimeValue::Unit) => true,
            (RuntimeValue::List(a), RuntimeValue::List(b)) => a == b,
            (RuntimeValue::Native(a), RuntimeValue::Native(b)) => {
                a.same_impl(b) && a.collected == b.collected
            }
            (RuntimeValue::Opaque(a), RuntimeValue::Opaque(b)) => a.same_handle(b),
            _ => false,
        }
    }
}

impl fmt::Display for RuntimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeValue::Int(v) => write!(f, "{v}"),
            RuntimeValue::Num(v) => write!(f, "{v}"),
            RuntimeValue::Str(v) => write!(f, "{v:?}"),
            RuntimeValue::Bool(v) => write!(f, "{v}"),
            RuntimeValue::Unit => write!(f, "()"),
            RuntimeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            RuntimeValue::Native(native) => write!(f, "<native {}>", native.name),
            RuntimeValue::Closure { param, .. } => write!(f, "<lambda {param}>"),
            RuntimeValue::Opaque(opaque) => write!(f, "<{}>", opaque.tag),
        }
    }
}

/// A persistent binding environment. Extension shares the tail, so closures
/// capture their scope without copying it.
#[derive(Debug, Clone, Default)]
pub struct Env {
    head: Option<Rc<EnvNode>>,
}

#[derive(Debug)]
struct EnvNode {
    name: String,
    value: RuntimeValue,
    parent: Option<Rc<EnvNode>>,
}

impl Env {
    pub fn empty() -> Env {
        Env::default()
    }

    pub fn extend(&self, name: &str, value: RuntimeValue) -> Env {
        Env {
            head: Some(Rc::new(EnvNode {
                name: name.to_string(),
                value,
                parent: self.head.clone(),
            })),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&RuntimeValue> {
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            if current.name == name {
                return Some(&current.value);
            }
            node = current.parent.as_deref();
        }
        None
    }
}

#[derive(Debug, Clone)]
struct ExternEntry {
    name: String,
    ty: Type,
    value: RuntimeValue,
}

/// The table of host values compiled code refers to by index.
///
/// Interning is memoized by referent: registering the same native function
/// or opaque handle twice yields the original slot, and the type recorded at
/// first registration wins.
#[derive(Debug, Clone, Default)]
pub struct Externs {
    entries: Rc<RefCell<Vec<ExternEntry>>>,
}

impl Externs {
    pub fn new() -> Externs {
        Externs::default()
    }

    pub fn intern(&self, name: &str, ty: Type, value: RuntimeValue) -> (usize, Type) {
        let mut entries = self.entries.borrow_mut();
        for (index, entry) in entries.iter().enumerate() {
            if entry.value.same_referent(&value) {
                return (index, entry.ty.clone());
            }
        }
        entries.push(ExternEntry {
            name: name.to_string(),
            ty: ty.clone(),
            value,
        });
        (entries.len() - 1, ty)
    }

    pub fn get(&self, index: usize) -> Option<RuntimeValue> {
        self.entries.borrow().get(index).map(|entry| entry.value.clone())
    }

    pub fn name(&self, index: usize) -> Option<String> {
        self.entries.borrow().get(index).map(|entry| entry.name.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
