//! The type algebra.
//!
//! Types exist to answer two questions: how many more arguments can a value
//! accept, and is an implicit conversion between two atoms legal. Nothing
//! here attempts inference; the model is deliberately partial.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::CoreError;

/// The closed set of type shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    /// A concrete named type the core never looks inside, e.g. `i` or a
    /// host-object tag.
    Atom(String),
    /// Matches anything. As a function type it has unbounded arity; it never
    /// needs conversion and never guarantees a shape.
    Dynamic,
    /// A unary function from the first type to the second. Multi-argument
    /// functions are nested (curried) `Function`s.
    Function(Box<Type>, Box<Type>),
    /// A named container over one argument, e.g. `[]` over `i` for a list
    /// of integers.
    Parametrized(String, Box<Type>),
}

impl Type {
    pub fn atom(name: &str) -> Type {
        Type::Atom(name.to_string())
    }

    pub fn function(arg: Type, ret: Type) -> Type {
        Type::Function(Box::new(arg), Box::new(ret))
    }

    pub fn list(element: Type) -> Type {
        Type::Parametrized("[]".to_string(), Box::new(element))
    }

    /// How many arguments a value of this type can still accept. `-1` means
    /// unbounded (dynamic); atoms and containers accept none.
    pub fn value_arity(&self) -> i32 {
        match self {
            Type::Atom(_) | Type::Parametrized(_, _) => 0,
            Type::Dynamic => -1,
            Type::Function(_, ret) => 1 + ret.value_arity().max(0),
        }
    }

    /// The declared argument type, when this is a function. A dynamic is not
    /// a known function; callers that apply dynamics go by arity instead.
    pub fn arg_type(&self) -> Option<Type> {
        match self {
            Type::Function(arg, _) => Some((**arg).clone()),
            _ => None,
        }
    }

    pub fn return_type(&self) -> Option<Type> {
        match self {
            Type::Function(_, ret) => Some((**ret).clone()),
            _ => None,
        }
    }

    /// Structural match with `Dynamic` as a wildcard on either side, at any
    /// position. No coercions are considered here.
    pub fn accepts(&self, found: &Type) -> bool {
        match (self, found) {
            (Type::Dynamic, _) | (_, Type::Dynamic) => true,
            (Type::Atom(a), Type::Atom(b)) => a == b,
            (Type::Function(a1, r1), Type::Function(a2, r2)) => {
                a1.accepts(a2) && r1.accepts(r2)
            }
            (Type::Parametrized(n1, a1), Type::Parametrized(n2, a2)) => {
                n1 == n2 && a1.accepts(a2)
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Atom(name) => write!(f, "{name}"),
            Type::Dynamic => write!(f, "."),
            Type::Function(arg, ret) => write!(f, "({arg} -> {ret})"),
            Type::Parametrized(name, arg) => {
                if name == "[]" {
                    write!(f, "[{arg}]")
                } else {
                    write!(f, "{name}[{arg}]")
                }
            }
        }
    }
}

/// Registered atom-to-atom conversions.
///
/// Each entry names the extern slot holding the conversion function. A
/// missing direct pair may be bridged through exactly one intermediate atom;
/// the search runs once per distinct pair and is cached, negative results
/// included.
#[derive(Debug, Default)]
pub struct Coercions {
    direct: BTreeMap<(String, String), usize>,
    cache: RefCell<HashMap<(String, String), Option<Vec<usize>>>>,
}

impl Coercions {
    pub fn new() -> Coercions {
        Coercions::default()
    }

    pub fn register(&mut self, from: &str, to: &str, step: usize) -> Result<(), CoreError> {
        let key = (from.to_string(), to.to_string());
        if self.direct.contains_key(&key) {
            return Err(CoreError::Registration(format!(
                "conversion from {from} to {to} is already registered"
            )));
        }
        self.direct.insert(key, step);
        // a new pair can invalidate cached searches, negative ones included
        self.cache.borrow_mut().clear();
        Ok(())
    }

    /// The conversion plan from one atom to another, as extern slots to
    /// apply in order, or `None` when no path exists.
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<usize>> {
        let key = (from.to_string(), to.to_string());
        if let Some(cached) = self.cache.borrow().get(&key) {
            return cached.clone();
        }
        let found = self.search(from, to);
        self.cache.borrow_mut().insert(key, found.clone());
        found
    }

    fn search(&self, from: &str, to: &str) -> Option<Vec<usize>> {
        if let Some(&step) = self.direct.get(&(from.to_string(), to.to_string())) {
            return Some(vec![step]);
        }
        // bridge through one intermediate, first hit in key order
        for ((f, mid), &first) in &self.direct {
            if f != from {
                continue;
            }
            if let Some(&second) = self.direct.get(&(mid.clone(), to.to_string())) {
                return Some(vec![first, second]);
            }
        }
        None
    }
}

/// Best-effort unification of a found type against an expected one.
///
/// Success yields the conversion plan to apply to the found value: empty
/// when the types already match, one or two steps when atom coercion is
/// needed. Failure names both types.
pub fn unify(found: &Type, expected: &Type, coercions: &Coercions) -> Result<Vec<usize>, CoreError> {
    if expected.accepts(found) {
        return Ok(Vec::new());
    }
    if let (Type::Atom(from), Type::Atom(to)) = (found, expected) {
        if let Some(plan) = coercions.path(from, to) {
            return Ok(plan);
        }
    }
    Err(CoreError::Type(format!(
        "no conversion from {found} to {expected}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_counts_nested_functions() {
        assert_eq!(Type::atom("i").value_arity(), 0);
        assert_eq!(Type::list(Type::atom("i")).value_arity(), 0);
        assert_eq!(Type::Dynamic.value_arity(), -1);
        let binary = Type::function(Type::atom("n"), Type::function(Type::atom("n"), Type::atom("n")));
        assert_eq!(binary.value_arity(), 2);
        let into_dynamic = Type::function(Type::atom("n"), Type::Dynamic);
        assert_eq!(into_dynamic.value_arity(), 1);
    }

    #[test]
    fn only_functions_expose_argument_and_return_types() {
        let unary = Type::function(Type::atom("i"), Type::atom("n"));
        assert_eq!(unary.arg_type(), Some(Type::atom("i")));
        assert_eq!(unary.return_type(), Some(Type::atom("n")));
        assert_eq!(Type::Dynamic.arg_type(), None);
        assert_eq!(Type::Dynamic.return_type(), None);
        assert_eq!(Type::atom("i").arg_type(), None);
        assert_eq!(Type::list(Type::atom("i")).arg_type(), None);
    }

    #[test]
    fn dynamic_matches_anything_at_any_position() {
        let concrete = Type::function(Type::atom("i"), Type::atom("n"));
        let wild = Type::function(Type::Dynamic, Type::atom("n"));
        assert!(wild.accepts(&concrete));
        assert!(concrete.accepts(&wild));
        assert!(Type::Dynamic.accepts(&concrete));
        assert!(concrete.accepts(&Type::Dynamic));
    }

    #[test]
    fn mismatched_atoms_do_not_match_structurally() {
        assert!(!Type::atom("i").accepts(&Type::atom("s")));
        assert!(!Type::list(Type::atom("i")).accepts(&Type::atom("i")));
    }

    #[test]
    fn duplicate_conversions_are_rejected() {
        let mut coercions = Coercions::new();
        coercions.register("i", "n", 0).expect("register");
        let err = coercions.register("i", "n", 1).unwrap_err();
        assert!(matches!(err, CoreError::Registration(_)));
    }

    #[test]
    fn direct_conversion_wins_over_a_bridge() {
        let mut coercions = Coercions::new();
        coercions.register("i", "q", 0).expect("register");
        coercions.register("q", "n", 1).expect("register");
        coercions.register("i", "n", 2).expect("register");
        assert_eq!(coercions.path("i", "n"), Some(vec![2]));
    }

    #[test]
    fn bridges_through_one_intermediate() {
        let mut coercions = Coercions::new();
        coercions.register("i", "q", 0).expect("register");
        coercions.register("q", "n", 1).expect("register");
        assert_eq!(coercions.path("i", "n"), Some(vec![0, 1]));
        assert_eq!(coercions.path("n", "i"), None);
    }

    #[test]
    fn later_registration_invalidates_a_cached_miss() {
        let mut coercions = Coercions::new();
        assert_eq!(coercions.path("i", "n"), None);
        coercions.register("i", "n", 7).expect("register");
        assert_eq!(coercions.path("i", "n"), Some(vec![7]));
    }

    #[test]
    fn unify_reports_both_types_on_failure() {
        let coercions = Coercions::new();
        let err = unify(&Type::atom("s"), &Type::atom("n"), &coercions).unwrap_err();
        match err {
            CoreError::Type(message) => {
                assert!(message.contains('s'));
                assert!(message.contains('n'));
            }
            other => panic!("expected a type error, got {other:?}"),
        }
    }

    #[test]
    fn renders_compact_type_text() {
        let ty = Type::function(Type::atom("n"), Type::function(Type::Dynamic, Type::atom("b")));
        assert_eq!(ty.to_string(), "(n -> (. -> b))");
        assert_eq!(Type::list(Type::Dynamic).to_string(), "[.]");
    }
}
