//! The host-facing surface: one registry owns the grammar, the type
//! dispatcher, the coercion table, and the extern table, and compiles
//! source against all four.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::builtins;
use crate::dispatch::Dispatch;
use crate::error::CoreError;
use crate::grammar::ExprGrammar;
use crate::peg::{skip_blank, Parser, Reply};
use crate::resolve;
use crate::runtime::{Env, Externs, NativeFn, RuntimeValue};
use crate::types::{Coercions, Type};
use crate::value::{eval, Code, Value};

/// A compiled expression, ready to evaluate any number of times.
#[derive(Debug, Clone)]
pub struct Program {
    pub ty: Type,
    code: Code,
    externs: Externs,
}

impl Program {
    pub fn code(&self) -> &Code {
        &self.code
    }

    pub fn invoke(&self) -> Result<RuntimeValue, CoreError> {
        eval(&self.code, &Env::empty(), &self.externs)
    }
}

/// The language instance: everything registered so far, plus the compiler.
pub struct Registry {
    grammar: ExprGrammar,
    types: Dispatch<Type>,
    coercions: Rc<RefCell<Coercions>>,
    externs: Externs,
    expr: Parser<Value>,
}

impl Registry {
    /// An empty registry: no syntax, no names, no conversions.
    pub fn new() -> Registry {
        let grammar = ExprGrammar::new();
        let coercions = Rc::new(RefCell::new(Coercions::new()));
        let expr = resolve::expression(grammar.downgrade(), Rc::downgrade(&coercions));
        Registry {
            grammar,
            types: Dispatch::new(),
            coercions,
            externs: Externs::new(),
            expr,
        }
    }

    /// A registry with the standard prelude installed.
    pub fn with_prelude() -> Result<Registry, CoreError> {
        let registry = Registry::new();
        builtins::install(&registry)?;
        Ok(registry)
    }

    pub fn grammar(&self) -> &ExprGrammar {
        &self.grammar
    }

    pub fn types(&self) -> &Dispatch<Type> {
        &self.types
    }

    pub fn coercions(&self) -> &Rc<RefCell<Coercions>> {
        &self.coercions
    }

    pub fn externs(&self) -> &Externs {
        &self.externs
    }

    /// The full-expression parser. Operator parsers that contain
    /// subexpressions recurse through this.
    pub fn expression(&self) -> Parser<Value> {
        self.expr.clone()
    }

    /// Register an operator form in the root scope, keyed by its leading
    /// text.
    pub fn register_operator(&self, prefix: &str, parser: Parser<Value>) -> Result<(), CoreError> {
        debug!(prefix, "registering operator");
        self.grammar.root().register_op(prefix, parser)
    }

    pub fn register_literal(&self, parser: Parser<Value>) {
        self.grammar.root().register_literal(parser);
    }

    pub fn register_last_resort(&self, parser: Parser<Value>) {
        self.grammar.register_last_resort(parser);
    }

    /// Bind a name in the root scope.
    pub fn bind(&self, name: &str, value: Value) -> Result<(), CoreError> {
        debug!(name, ty = %value.ty, "binding name");
        self.grammar.root().bind(name, value)
    }

    /// Register a named type form, keyed by its leading text.
    pub fn register_type(&self, prefix: &str, parser: Parser<Type>) -> Result<(), CoreError> {
        self.types.register(prefix, parser)
    }

    /// Register an implicit conversion between two atoms. The conversion
    /// function lands in the extern table like any other host function.
    pub fn register_coercion(
        &self,
        from: &str,
        to: &str,
        convert: impl Fn(&RuntimeValue) -> Result<RuntimeValue, CoreError> + 'static,
    ) -> Result<(), CoreError> {
        let name = format!("{from}->{to}");
        let native = NativeFn::new(&name, 1, move |args| convert(&args[0]));
        let ty = Type::function(Type::atom(from), Type::atom(to));
        let (step, _) = self
            .externs
            .intern(&name, ty, RuntimeValue::Native(native));
        self.coercions.borrow_mut().register(from, to, step)
    }

    /// Wrap a host value as a typed extern reference. Registering the same
    /// native or opaque again returns the original slot and its type.
    pub fn extern_value(&self, name: &str, ty: Type, value: RuntimeValue) -> Value {
        let (index, ty) = self.externs.intern(name, ty, value);
        Value::new(ty, Code::Extern(index))
    }

    /// Wrap a host function of fixed arity as a typed extern reference.
    pub fn extern_fn(
        &self,
        name: &str,
        args: &[Type],
        ret: Type,
        run: impl Fn(&[RuntimeValue]) -> Result<RuntimeValue, CoreError> + 'static,
    ) -> Result<Value, CoreError> {
        if args.is_empty() {
            return Err(CoreError::Registration(format!(
                "extern function '{name}' declares no arguments; use extern_value for constants"
            )));
        }
        let ty = args
            .iter()
            .rev()
            .fold(ret, |ret, arg| Type::function(arg.clone(), ret));
        let native = NativeFn::new(name, args.len(), run);
        Ok(self.extern_value(name, ty, RuntimeValue::Native(native)))
    }

    /// Compile a source string into a program. The whole input must be one
    /// expression, blanks and comments aside.
    pub fn compile(&self, source: &str) -> Result<Program, CoreError> {
        self.grammar.reset_diagnostics();
        let input = source.as_bytes();
        match self.expr.parse(input, 0) {
            Reply::Accept(value, end) => {
                let end = skip_blank(input, end);
                if end != input.len() {
                    return Err(CoreError::Syntax {
                        position: end,
                        message: format!("unexpected trailing input {}", snippet(input, end)),
                    });
                }
                debug!(ty = %value.ty, "compiled program");
                Ok(Program {
                    ty: value.ty,
                    code: value.code,
                    externs: self.externs.clone(),
                })
            }
            Reply::Reject => {
                let position = self.grammar.deepest_reject();
                Err(CoreError::Syntax {
                    position,
                    message: format!("no expression recognized at {}", snippet(input, position)),
                })
            }
            Reply::Abort(err) => Err(err),
        }
    }

    /// Compile and immediately evaluate.
    pub fn run(&self, source: &str) -> Result<RuntimeValue, CoreError> {
        self.compile(source)?.invoke()
    }
}

impl Default for Registry {
    fn default() -> Registry {
        Registry::new()
    }
}

fn snippet(input: &[u8], at: usize) -> String {
    if at >= input.len() {
        return "end of input".to_string();
    }
    let window = &input[at..input.len().min(at + 24)];
    let text = String::from_utf8_lossy(window);
    if at + 24 < input.len() {
        format!("'{text}...'")
    } else {
        format!("'{text}'")
    }
}
