//! Typed program fragments and their evaluator.
//!
//! Parsing produces [`Value`]s: a static [`Type`] paired with a [`Code`]
//! tree. Application is checked here, at composition time, and implicit
//! conversions are spliced into the tree as [`Code::Coerce`] nodes, so by
//! the time [`eval`] runs there is nothing left to check but runtime shape.

use std::fmt;
use std::rc::Rc;

use crate::error::CoreError;
use crate::runtime::{Env, Externs, Literal, RuntimeValue};
use crate::types::{unify, Coercions, Type};

/// The compiled expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Code {
    Lit(Literal),
    /// A slot in the extern table.
    Extern(usize),
    Var(String),
    Lambda {
        param: String,
        body: Rc<Code>,
    },
    Apply {
        func: Rc<Code>,
        arg: Rc<Code>,
    },
    /// Apply extern `step` to `inner` before use. Inserted by [`Value::apply`]
    /// when an implicit conversion is needed.
    Coerce {
        step: usize,
        inner: Rc<Code>,
    },
    List(Vec<Code>),
    If {
        cond: Rc<Code>,
        then: Rc<Code>,
        otherwise: Rc<Code>,
    },
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Lit(Literal::Int(v)) => write!(f, "{v}"),
            Code::Lit(Literal::Num(v)) => write!(f, "{v}"),
            Code::Lit(Literal::Str(v)) => write!(f, "{v:?}"),
            Code::Lit(Literal::Bool(v)) => write!(f, "{v}"),
            Code::Extern(index) => write!(f, "<extern #{index}>"),
            Code::Var(name) => write!(f, "{name}"),
            Code::Lambda { param, body } => write!(f, "(\\{param} {body})"),
            Code::Apply { func, arg } => write!(f, "({func} {arg})"),
            Code::Coerce { inner, .. } => write!(f, "{inner}"),
            Code::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Code::If { cond, then, otherwise } => write!(f, "(? {cond} {then} {otherwise})"),
        }
    }
}

/// A typed fragment of compiled code.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    pub ty: Type,
    pub code: Code,
}

impl Value {
    pub fn new(ty: Type, code: Code) -> Value {
        Value { ty, code }
    }

    /// A literal, validated by a serialize-and-reparse round trip. Values
    /// that cannot survive the trip (non-finite floats, mostly) are not
    /// representable and are rejected up front.
    pub fn literal(ty: Type, literal: Literal) -> Result<Value, CoreError> {
        let rendered = serde_json::to_string(&literal)
            .map_err(|e| CoreError::Literal(format!("cannot serialize literal: {e}")))?;
        let reparsed: Literal = serde_json::from_str(&rendered)
            .map_err(|e| CoreError::Literal(format!("{rendered} does not round-trip: {e}")))?;
        if reparsed != literal {
            return Err(CoreError::Literal(format!("{rendered} does not round-trip")));
        }
        Ok(Value::new(ty, Code::Lit(literal)))
    }

    pub fn var(name: &str, ty: Type) -> Value {
        Value::new(ty, Code::Var(name.to_string()))
    }

    pub fn lambda(param: &str, param_ty: Type, body: Value) -> Value {
        Value::new(
            Type::function(param_ty, body.ty),
            Code::Lambda {
                param: param.to_string(),
                body: Rc::new(body.code),
            },
        )
    }

    /// Apply this value to an argument, checking types and splicing in any
    /// implicit conversion the argument needs.
    pub fn apply(&self, arg: Value, coercions: &Coercions) -> Result<Value, CoreError> {
        match &self.ty {
            Type::Dynamic => Ok(Value::new(
                Type::Dynamic,
                Code::Apply {
                    func: Rc::new(self.code.clone()),
                    arg: Rc::new(arg.code),
                },
            )),
            Type::Function(param, ret) => {
                let plan = unify(&arg.ty, param, coercions).map_err(|err| match err {
                    CoreError::Type(message) => CoreError::Type(format!(
                        "cannot apply '{}' to '{}': {message}",
                        self.code, arg.code
                    )),
                    other => other,
                })?;
                let converted = plan.into_iter().fold(arg.code, |inner, step| Code::Coerce {
                    step,
                    inner: Rc::new(inner),
                });
                Ok(Value::new(
                    (**ret).clone(),
                    Code::Apply {
                        func: Rc::new(self.code.clone()),
                        arg: Rc::new(converted),
                    },
                ))
            }
            other => Err(CoreError::Type(format!(
                "cannot apply non-function '{}' of type {other} to argument of type {}",
                self.code, arg.ty
            ))),
        }
    }

    /// The same code under a different static type.
    pub fn typed(self, ty: Type) -> Value {
        Value { ty, code: self.code }
    }

    /// Convert this value to the expected type, splicing coercion steps as
    /// needed.
    pub fn convert(self, expected: &Type, coercions: &Coercions) -> Result<Value, CoreError> {
        let plan = unify(&self.ty, expected, coercions)?;
        let code = plan.into_iter().fold(self.code, |inner, step| Code::Coerce {
            step,
            inner: Rc::new(inner),
        });
        Ok(Value::new(expected.clone(), code))
    }
}

/// Evaluate a code tree under an environment and an extern table.
pub fn eval(code: &Code, env: &Env, externs: &Externs) -> Result<RuntimeValue, CoreError> {
    match code {
        Code::Lit(literal) => Ok(literal.to_runtime()),
        Code::Extern(index) => externs.get(*index).ok_or_else(|| {
            CoreError::Runtime(format!("extern #{index} is not registered"))
        }),
        Code::Var(name) => env
            .lookup(name)
            .cloned()
            .ok_or_else(|| CoreError::Runtime(format!("unbound variable '{name}'"))),
        Code::Lambda { param, body } => Ok(RuntimeValue::Closure {
            param: param.clone(),
            body: Rc::clone(body),
            env: env.clone(),
        }),
        Code::Apply { func, arg } => {
            let func = eval(func, env, externs)?;
            let arg = eval(arg, env, externs)?;
            call(func, arg, externs)
        }
        Code::Coerce { step, inner } => {
            let inner = eval(inner, env, externs)?;
            let converter = externs.get(*step).ok_or_else(|| {
                CoreError::Runtime(format!("extern #{step} is not registered"))
            })?;
            call(converter, inner, externs)
        }
        Code::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(eval(item, env, externs)?);
            }
            Ok(RuntimeValue::List(values))
        }
        Code::If { cond, then, otherwise } => match eval(cond, env, externs)? {
            RuntimeValue::Bool(true) => eval(then, env, externs),
            RuntimeValue::Bool(false) => eval(otherwise, env, externs),
            other => Err(CoreError::Runtime(format!(
                "condition evaluated to non-boolean value {other}"
            ))),
        },
    }
}

/// Call a runtime function value with one argument.
pub fn call(
    func: RuntimeValue,
    arg: RuntimeValue,
    externs: &Externs,
) -> Result<RuntimeValue, CoreError> {
    match func {
        RuntimeValue::Native(native) => native.call(arg),
        RuntimeValue::Closure { param, body, env } => {
            eval(&body, &env.extend(&param, arg), externs)
        }
        other => Err(CoreError::Runtime(format!(
            "cannot call non-function value {other}"
        ))),
    }
}
