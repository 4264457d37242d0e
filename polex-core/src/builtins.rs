//! The standard prelude.
//!
//! Everything here is ordinary registration against a [`Registry`]: the
//! numeric and string literal forms, grouping and list syntax, the ternary,
//! lambdas, both let forms, the Polish-notation operators, and the `i` to
//! `n` widening coercion. Nothing in this module is special-cased by the
//! engine; a host crate could install a different prelude the same way.

use std::rc::Rc;

use crate::dispatch::WeakDispatch;
use crate::error::CoreError;
use crate::grammar::{Scope, WeakGrammar};
use crate::peg::{literal, pattern, pure, skip_blank, whitespaced, Parser, Reply};
use crate::registry::Registry;
use crate::runtime::{Literal, NativeFn, RuntimeValue};
use crate::types::Type;
use crate::value::{Code, Value};

/// Word shape shared by lambda parameters and let-bound names.
const WORD: &str = r"[A-Za-z_][0-9A-Za-z_]*";

/// Install the full prelude into a registry.
pub fn install(registry: &Registry) -> Result<(), CoreError> {
    install_types(registry)?;
    install_literals(registry)?;
    install_syntax(registry)?;
    install_operators(registry)?;
    install_constants(registry)?;
    registry.register_coercion("i", "n", |value| match value {
        RuntimeValue::Int(v) => Ok(RuntimeValue::Num(*v as f64)),
        other => Err(CoreError::Runtime(format!(
            "cannot widen {other} to a number"
        ))),
    })
}

fn int_type() -> Type {
    Type::atom("i")
}

fn num_type() -> Type {
    Type::atom("n")
}

fn str_type() -> Type {
    Type::atom("s")
}

fn bool_type() -> Type {
    Type::atom("b")
}

fn unop_type() -> Type {
    Type::function(Type::Dynamic, Type::Dynamic)
}

fn binop_type() -> Type {
    Type::function(Type::Dynamic, unop_type())
}

fn compare_type() -> Type {
    Type::function(Type::Dynamic, Type::function(Type::Dynamic, bool_type()))
}

/// A reference into the type dispatcher that skips leading blanks, for use
/// inside compound type forms.
fn type_ref(types: WeakDispatch<Type>) -> Parser<Type> {
    Parser::new(move |input: &[u8], at: usize| {
        let Some(types) = types.upgrade() else {
            return Reply::Reject;
        };
        types.parse(input, skip_blank(input, at))
    })
}

/// The type annotation grammar, Polish like everything else: `i n s b _`,
/// `[]T`, `->AB`, and `(T)`.
fn install_types(registry: &Registry) -> Result<(), CoreError> {
    let types = registry.types();
    let sub = type_ref(types.downgrade());
    types.register("i", pure(int_type()))?;
    types.register("n", pure(num_type()))?;
    types.register("s", pure(str_type()))?;
    types.register("b", pure(bool_type()))?;
    types.register("_", pure(Type::Dynamic))?;
    types.register("[]", sub.clone().map(Type::list))?;
    types.register(
        "->",
        sub.clone()
            .then(sub.clone())
            .map(|(arg, ret)| Type::function(arg, ret)),
    )?;
    types.register("(", sub.then_ignore(whitespaced(literal(")"))))?;
    Ok(())
}

/// Literal forms, tried in reverse registration order: strings, then
/// floats, then integers. Floats require a decimal point, so plain digit
/// runs fall through to the integer form.
fn install_literals(registry: &Registry) -> Result<(), CoreError> {
    let int = pattern(r"-?\d+")?.try_map(|text| {
        let value = text.parse::<i64>().map_err(|_| {
            CoreError::Literal(format!("integer literal '{text}' is out of range"))
        })?;
        Value::literal(int_type(), Literal::Int(value))
    });
    registry.register_literal(int);

    let float = pattern(r"-?(?:\d*\.\d+|\d+\.\d*)(?:[eE][+-]?\d+)?")?.try_map(|text| {
        let value = text.parse::<f64>().map_err(|_| {
            CoreError::Literal(format!("numeric literal '{text}' is malformed"))
        })?;
        Value::literal(num_type(), Literal::Num(value))
    });
    registry.register_literal(float);

    let string = pattern(r#""((?:[^"\\]|\\.)*)""#)?
        .try_map(|text| Value::literal(str_type(), Literal::Str(unescape(&text))));
    registry.register_literal(string);
    Ok(())
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Grouping, lists, the ternary, lambdas, and both let forms.
fn install_syntax(registry: &Registry) -> Result<(), CoreError> {
    let expr = registry.expression();
    let word = pattern(WORD)?;
    let quoted = pattern(r"'(\S+)")?;

    registry.register_operator("(", expr.clone().then_ignore(whitespaced(literal(")"))))?;

    let element = expr.clone().then_ignore(whitespaced(literal(",")).optional());
    let list = element
        .repeated(0, None)
        .then_ignore(whitespaced(literal("]")))
        .map(|elements: Vec<Value>| {
            let ty = Type::list(homogeneous_type(&elements));
            let code = Code::List(elements.into_iter().map(|value| value.code).collect());
            Value::new(ty, code)
        });
    registry.register_operator("[", list)?;

    registry.register_operator("?", ternary_parser(registry.grammar().downgrade()))?;
    registry.register_operator(
        "\\",
        lambda_parser(
            registry.grammar().downgrade(),
            registry.types().downgrade(),
            expr.clone(),
            word.clone(),
        ),
    )?;
    registry.register_operator(
        ":",
        runtime_let_parser(registry.grammar().downgrade(), expr.clone(), word.clone()),
    )?;
    registry.register_last_resort(let_rewrite_parser(
        registry.grammar().downgrade(),
        expr,
        word,
        quoted,
    ));
    Ok(())
}

/// The shared element type of a list, or `Dynamic` when elements disagree.
fn homogeneous_type(elements: &[Value]) -> Type {
    let mut found: Option<&Type> = None;
    for element in elements {
        match found {
            None => found = Some(&element.ty),
            Some(ty) if *ty == element.ty => {}
            Some(_) => return Type::Dynamic,
        }
    }
    found.cloned().unwrap_or(Type::Dynamic)
}

fn is_bool_like(ty: &Type) -> bool {
    matches!(ty, Type::Dynamic) || *ty == bool_type()
}

/// `? cond then else` over three single terms. Branches stay unevaluated
/// until the condition picks one.
fn ternary_parser(grammar: WeakGrammar) -> Parser<Value> {
    Parser::new(move |input: &[u8], at: usize| {
        let Some(grammar) = grammar.upgrade() else {
            return Reply::Reject;
        };
        let mut cursor = at;
        let mut parts = Vec::with_capacity(3);
        for _ in 0..3 {
            match grammar.parse(input, cursor) {
                Reply::Accept(value, next) => {
                    parts.push(value);
                    cursor = next;
                }
                Reply::Reject => return Reply::Reject,
                Reply::Abort(err) => return Reply::Abort(err),
            }
        }
        let otherwise = parts.pop().expect("three parts were collected");
        let then = parts.pop().expect("three parts were collected");
        let cond = parts.pop().expect("three parts were collected");
        if !is_bool_like(&cond.ty) {
            return Reply::Abort(CoreError::Type(format!(
                "ternary condition must be boolean, found {}",
                cond.ty
            )));
        }
        let ty = if then.ty == otherwise.ty {
            then.ty.clone()
        } else {
            Type::Dynamic
        };
        let code = Code::If {
            cond: Rc::new(cond.code),
            then: Rc::new(then.code),
            otherwise: Rc::new(otherwise.code),
        };
        Reply::Accept(Value::new(ty, code), cursor)
    })
}

/// `\param body` and `\param:type body`. The body is a full expression
/// parsed under a scope where the parameter is a typed variable reference.
fn lambda_parser(
    grammar: WeakGrammar,
    types: WeakDispatch<Type>,
    expr: Parser<Value>,
    word: Parser<String>,
) -> Parser<Value> {
    Parser::new(move |input: &[u8], at: usize| {
        let Some(grammar) = grammar.upgrade() else {
            return Reply::Reject;
        };
        let at = skip_blank(input, at);
        let (param, mut cursor) = match word.parse(input, at) {
            Reply::Accept(param, next) => (param, next),
            Reply::Reject => return Reply::Reject,
            Reply::Abort(err) => return Reply::Abort(err),
        };
        let mut param_ty = Type::Dynamic;
        if input.get(cursor) == Some(&b':') {
            let Some(types) = types.upgrade() else {
                return Reply::Reject;
            };
            match types.parse(input, cursor + 1) {
                Reply::Accept(ty, next) => {
                    param_ty = ty;
                    cursor = next;
                }
                Reply::Reject => {
                    return Reply::Abort(CoreError::Syntax {
                        position: cursor + 1,
                        message: format!("expected a type annotation for parameter '{param}'"),
                    });
                }
                Reply::Abort(err) => return Reply::Abort(err),
            }
        }
        let scope = Scope::new();
        scope
            .bind(&param, Value::var(&param, param_ty.clone()))
            .expect("a fresh scope has no bindings");
        let guard = grammar.enter(scope);
        let body = expr.parse(input, cursor);
        drop(guard);
        match body {
            Reply::Accept(body, next) => {
                Reply::Accept(Value::lambda(&param, param_ty.clone(), body), next)
            }
            other => other,
        }
    })
}

/// `: name value body`. The value is a single term; the body is a full
/// expression under a scope where `name` refers to a runtime variable, so
/// the value is evaluated once no matter how often the body uses it.
fn runtime_let_parser(grammar: WeakGrammar, expr: Parser<Value>, word: Parser<String>) -> Parser<Value> {
    Parser::new(move |input: &[u8], at: usize| {
        let Some(grammar) = grammar.upgrade() else {
            return Reply::Reject;
        };
        let at = skip_blank(input, at);
        let (name, cursor) = match word.parse(input, at) {
            Reply::Accept(name, next) => (name, next),
            Reply::Reject => return Reply::Reject,
            Reply::Abort(err) => return Reply::Abort(err),
        };
        let (bound, cursor) = match grammar.parse(input, cursor) {
            Reply::Accept(bound, next) => (bound, next),
            Reply::Reject => return Reply::Reject,
            Reply::Abort(err) => return Reply::Abort(err),
        };
        let scope = Scope::new();
        scope
            .bind(&name, Value::var(&name, bound.ty.clone()))
            .expect("a fresh scope has no bindings");
        let guard = grammar.enter(scope);
        let body = expr.parse(input, cursor);
        drop(guard);
        match body {
            Reply::Accept(body, next) => {
                let ty = body.ty.clone();
                let code = Code::Apply {
                    func: Rc::new(Code::Lambda {
                        param: name.clone(),
                        body: Rc::new(body.code),
                    }),
                    arg: Rc::new(bound.code),
                };
                Reply::Accept(Value::new(ty, code), next)
            }
            other => other,
        }
    })
}

/// The last-resort form `name value body` (or `'name value body`, which
/// also rebinds names that are already visible). The parsed value itself is
/// bound, so every use of the name inlines it.
fn let_rewrite_parser(
    grammar: WeakGrammar,
    expr: Parser<Value>,
    word: Parser<String>,
    quoted: Parser<String>,
) -> Parser<Value> {
    Parser::new(move |input: &[u8], at: usize| {
        let Some(grammar) = grammar.upgrade() else {
            return Reply::Reject;
        };
        let at = skip_blank(input, at);
        let (name, cursor) = match quoted.parse(input, at) {
            Reply::Accept(name, next) => (name, next),
            Reply::Abort(err) => return Reply::Abort(err),
            Reply::Reject => match word.parse(input, at) {
                Reply::Accept(name, next) => (name, next),
                Reply::Reject => return Reply::Reject,
                Reply::Abort(err) => return Reply::Abort(err),
            },
        };
        let (bound, cursor) = match grammar.parse(input, cursor) {
            Reply::Accept(bound, next) => (bound, next),
            Reply::Reject => return Reply::Reject,
            Reply::Abort(err) => return Reply::Abort(err),
        };
        let scope = Scope::new();
        scope
            .bind(&name, bound)
            .expect("a fresh scope has no bindings");
        let guard = grammar.enter(scope);
        let body = expr.parse(input, cursor);
        drop(guard);
        body
    })
}

/// Polish-notation operators. `/` alone takes its operands flipped (the
/// divisor comes first); `**` applies the base first and `%` keeps source
/// order. All of them are plain extern functions bound to names.
fn install_operators(registry: &Registry) -> Result<(), CoreError> {
    bind_binop(registry, "+", add_values)?;
    bind_binop(registry, "*", mul_values)?;
    bind_unop(registry, "-", neg_value)?;
    bind_binop(registry, "/", |a, b| div_values(b, a))?;
    bind_binop(registry, "%", rem_values)?;
    bind_binop(registry, "**", pow_values)?;
    bind_compare(registry, "<", |a, b| {
        Ok(RuntimeValue::Bool(compare_values(a, b)? == std::cmp::Ordering::Less))
    })?;
    bind_compare(registry, ">", |a, b| {
        Ok(RuntimeValue::Bool(compare_values(a, b)? == std::cmp::Ordering::Greater))
    })?;
    bind_compare(registry, "=", |a, b| Ok(RuntimeValue::Bool(a == b)))?;
    registry.bind(".", compose_value())
}

fn install_constants(registry: &Registry) -> Result<(), CoreError> {
    registry.bind("pi", Value::literal(num_type(), Literal::Num(std::f64::consts::PI))?)?;
    registry.bind("tau", Value::literal(num_type(), Literal::Num(std::f64::consts::TAU))?)?;
    registry.bind("true", Value::literal(bool_type(), Literal::Bool(true))?)?;
    registry.bind("false", Value::literal(bool_type(), Literal::Bool(false))?)?;
    Ok(())
}

fn bind_binop(
    registry: &Registry,
    name: &str,
    run: impl Fn(&RuntimeValue, &RuntimeValue) -> Result<RuntimeValue, CoreError> + 'static,
) -> Result<(), CoreError> {
    let native = NativeFn::new(name, 2, move |args| run(&args[0], &args[1]));
    let value = registry.extern_value(name, binop_type(), RuntimeValue::Native(native));
    registry.bind(name, value)
}

fn bind_unop(
    registry: &Registry,
    name: &str,
    run: impl Fn(&RuntimeValue) -> Result<RuntimeValue, CoreError> + 'static,
) -> Result<(), CoreError> {
    let native = NativeFn::new(name, 1, move |args| run(&args[0]));
    let value = registry.extern_value(name, unop_type(), RuntimeValue::Native(native));
    registry.bind(name, value)
}

fn bind_compare(
    registry: &Registry,
    name: &str,
    run: impl Fn(&RuntimeValue, &RuntimeValue) -> Result<RuntimeValue, CoreError> + 'static,
) -> Result<(), CoreError> {
    let native = NativeFn::new(name, 2, move |args| run(&args[0], &args[1]));
    let value = registry.extern_value(name, compare_type(), RuntimeValue::Native(native));
    registry.bind(name, value)
}

/// `.` composes two functions: `. f g` applies `f` after `g`. Built as pure
/// code rather than a native so the result stays callable like any lambda.
fn compose_value() -> Value {
    let applied = Code::Apply {
        func: Rc::new(Code::Var("f".to_string())),
        arg: Rc::new(Code::Apply {
            func: Rc::new(Code::Var("g".to_string())),
            arg: Rc::new(Code::Var("x".to_string())),
        }),
    };
    let code = Code::Lambda {
        param: "f".to_string(),
        body: Rc::new(Code::Lambda {
            param: "g".to_string(),
            body: Rc::new(Code::Lambda {
                param: "x".to_string(),
                body: Rc::new(applied),
            }),
        }),
    };
    Value::new(Type::function(Type::Dynamic, binop_type()), code)
}

fn as_num(value: &RuntimeValue) -> Option<f64> {
    match value {
        RuntimeValue::Int(v) => Some(*v as f64),
        RuntimeValue::Num(v) => Some(*v),
        _ => None,
    }
}

fn add_values(a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, CoreError> {
    match (a, b) {
        (RuntimeValue::Int(x), RuntimeValue::Int(y)) => Ok(RuntimeValue::Int(x.wrapping_add(*y))),
        (RuntimeValue::Str(x), RuntimeValue::Str(y)) => Ok(RuntimeValue::Str(format!("{x}{y}"))),
        (RuntimeValue::List(x), RuntimeValue::List(y)) => {
            let mut items = x.clone();
            items.extend(y.iter().cloned());
            Ok(RuntimeValue::List(items))
        }
        _ => match (as_num(a), as_num(b)) {
            (Some(x), Some(y)) => Ok(RuntimeValue::Num(x + y)),
            _ => Err(CoreError::Runtime(format!("cannot add {a} and {b}"))),
        },
    }
}

fn mul_values(a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, CoreError> {
    match (a, b) {
        (RuntimeValue::Int(x), RuntimeValue::Int(y)) => Ok(RuntimeValue::Int(x.wrapping_mul(*y))),
        _ => match (as_num(a), as_num(b)) {
            (Some(x), Some(y)) => Ok(RuntimeValue::Num(x * y)),
            _ => Err(CoreError::Runtime(format!("cannot multiply {a} and {b}"))),
        },
    }
}

fn neg_value(value: &RuntimeValue) -> Result<RuntimeValue, CoreError> {
    match value {
        RuntimeValue::Int(v) => Ok(RuntimeValue::Int(v.wrapping_neg())),
        RuntimeValue::Num(v) => Ok(RuntimeValue::Num(-v)),
        other => Err(CoreError::Runtime(format!("cannot negate {other}"))),
    }
}

/// Division is always true division; two integers yield a number.
fn div_values(dividend: &RuntimeValue, divisor: &RuntimeValue) -> Result<RuntimeValue, CoreError> {
    match (as_num(dividend), as_num(divisor)) {
        (Some(x), Some(y)) => {
            if y == 0.0 {
                Err(CoreError::Runtime(
                    "division by zero is not allowed".to_string(),
                ))
            } else {
                Ok(RuntimeValue::Num(x / y))
            }
        }
        _ => Err(CoreError::Runtime(format!(
            "cannot divide {dividend} by {divisor}"
        ))),
    }
}

fn rem_values(a: &RuntimeValue, b: &RuntimeValue) -> Result<RuntimeValue, CoreError> {
    match (a, b) {
        (RuntimeValue::Int(x), RuntimeValue::Int(y)) => {
            if *y == 0 {
                Err(CoreError::Runtime(
                    "modulo by zero is not allowed".to_string(),
                ))
            } else {
                Ok(RuntimeValue::Int(x.wrapping_rem(*y)))
            }
        }
        _ => match (as_num(a), as_num(b)) {
            (Some(x), Some(y)) => {
                if y == 0.0 {
                    Err(CoreError::Runtime(
                        "modulo by zero is not allowed".to_string(),
                    ))
                } else {
                    Ok(RuntimeValue::Num(x % y))
                }
            }
            _ => Err(CoreError::Runtime(format!("cannot take {a} modulo {b}"))),
        },
    }
}

fn pow_values(base: &RuntimeValue, exponent: &RuntimeValue) -> Result<RuntimeValue, CoreError> {
    match (base, exponent) {
        (RuntimeValue::Int(b), RuntimeValue::Int(e)) if *e >= 0 => {
            let exponent = u32::try_from(*e)
                .map_err(|_| CoreError::Runtime("overflow during pow".to_string()))?;
            b.checked_pow(exponent)
                .map(RuntimeValue::Int)
                .ok_or_else(|| CoreError::Runtime("overflow during pow".to_string()))
        }
        _ => match (as_num(base), as_num(exponent)) {
            (Some(b), Some(e)) => Ok(RuntimeValue::Num(b.powf(e))),
            _ => Err(CoreError::Runtime(format!(
                "cannot raise {base} to {exponent}"
            ))),
        },
    }
}

fn compare_values(a: &RuntimeValue, b: &RuntimeValue) -> Result<std::cmp::Ordering, CoreError> {
    match (a, b) {
        (RuntimeValue::Int(x), RuntimeValue::Int(y)) => Ok(x.cmp(y)),
        (RuntimeValue::Str(x), RuntimeValue::Str(y)) => Ok(x.cmp(y)),
        _ => match (as_num(a), as_num(b)) {
            (Some(x), Some(y)) => x
                .partial_cmp(&y)
                .ok_or_else(|| CoreError::Runtime(format!("cannot order {a} and {b}"))),
            _ => Err(CoreError::Runtime(format!("cannot compare {a} and {b}"))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{Externs, Opaque};
    use crate::value::call;
    use std::any::Any;

    fn run(source: &str) -> RuntimeValue {
        Registry::with_prelude()
            .expect("prelude")
            .run(source)
            .expect("run")
    }

    fn run_err(source: &str) -> CoreError {
        Registry::with_prelude()
            .expect("prelude")
            .run(source)
            .unwrap_err()
    }

    fn typed(source: &str) -> String {
        Registry::with_prelude()
            .expect("prelude")
            .compile(source)
            .expect("compile")
            .ty
            .to_string()
    }

    #[test]
    fn adds_integers() {
        assert_eq!(run("+ 1 2"), RuntimeValue::Int(3));
    }

    #[test]
    fn resolves_nested_applications_by_arity() {
        assert_eq!(run("+ 1 * 2 3"), RuntimeValue::Int(7));
    }

    #[test]
    fn undersaturated_operators_compile_to_functions() {
        let registry = Registry::with_prelude().expect("prelude");
        let program = registry.compile("+ 1").expect("compile");
        let partial = program.invoke().expect("invoke");
        assert!(matches!(partial, RuntimeValue::Native(_)));
        let result = call(partial, RuntimeValue::Int(2), &Externs::new()).expect("call");
        assert_eq!(result, RuntimeValue::Int(3));
    }

    #[test]
    fn division_takes_the_divisor_first() {
        assert_eq!(run("/ 2 6"), RuntimeValue::Num(3.0));
        assert_eq!(run("/ 2 5"), RuntimeValue::Num(2.5));
    }

    #[test]
    fn division_by_zero_fails() {
        let err = run_err("/ 0 1");
        assert!(matches!(err, CoreError::Runtime(_)));
    }

    #[test]
    fn exponentiation_takes_the_base_first() {
        assert_eq!(run("** 2 3"), RuntimeValue::Int(8));
        assert_eq!(run("** 1.5 2"), RuntimeValue::Num(2.25));
    }

    #[test]
    fn integer_pow_overflow_is_an_error() {
        let err = run_err("** 99 10");
        assert!(matches!(err, CoreError::Runtime(_)));
    }

    #[test]
    fn modulo_keeps_source_operand_order() {
        assert_eq!(run("% 7 3"), RuntimeValue::Int(1));
        assert!(matches!(run_err("% 7 0"), CoreError::Runtime(_)));
    }

    #[test]
    fn minus_negates_a_single_operand() {
        assert_eq!(run("- 5"), RuntimeValue::Int(-5));
        assert_eq!(run("+ 1 - 2"), RuntimeValue::Int(-1));
    }

    #[test]
    fn adds_strings_and_lists() {
        assert_eq!(run(r#"+ "ab" "cd""#), RuntimeValue::Str("abcd".to_string()));
        assert_eq!(
            run("+ [1, 2] [3]"),
            RuntimeValue::List(vec![
                RuntimeValue::Int(1),
                RuntimeValue::Int(2),
                RuntimeValue::Int(3),
            ])
        );
    }

    #[test]
    fn homogeneous_lists_type_precisely() {
        assert_eq!(typed("[1, 2, 3]"), "[i]");
        assert_eq!(typed(r#"[1, "a"]"#), "[.]");
        assert_eq!(typed("[]"), "[.]");
    }

    #[test]
    fn list_elements_are_full_expressions() {
        assert_eq!(
            run("[+ 1 2, * 2 3]"),
            RuntimeValue::List(vec![RuntimeValue::Int(3), RuntimeValue::Int(6)])
        );
    }

    #[test]
    fn comparisons_return_booleans() {
        assert_eq!(run("< 1 2"), RuntimeValue::Bool(true));
        assert_eq!(run("> 1 2"), RuntimeValue::Bool(false));
        assert_eq!(run(r#"< "a" "b""#), RuntimeValue::Bool(true));
        assert_eq!(typed("< 1 2"), "b");
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(run("= [1, 2] [1, 2]"), RuntimeValue::Bool(true));
        assert_eq!(run("= 1 2"), RuntimeValue::Bool(false));
    }

    #[test]
    fn ternary_chooses_by_condition() {
        assert_eq!(run(r#"? (< 1 2) "yes" "no""#), RuntimeValue::Str("yes".to_string()));
        assert_eq!(run(r#"? (> 1 2) "yes" "no""#), RuntimeValue::Str("no".to_string()));
    }

    #[test]
    fn ternary_branches_are_lazy() {
        assert_eq!(run("? false (/ 0 1) 5"), RuntimeValue::Int(5));
    }

    #[test]
    fn ternary_conditions_must_be_boolean() {
        let err = run_err("? 1 2 3");
        assert!(matches!(err, CoreError::Type(_)));
    }

    #[test]
    fn lambdas_apply_to_arguments() {
        assert_eq!(run(r"(\x + x 1) 5"), RuntimeValue::Int(6));
    }

    #[test]
    fn annotated_parameters_coerce_their_arguments() {
        assert_eq!(run(r"(\x:n + x 1) 2"), RuntimeValue::Num(3.0));
        assert_eq!(typed(r"\x:n + x 1"), "(n -> .)");
    }

    #[test]
    fn annotations_parse_polish_type_forms() {
        assert_eq!(typed(r"\x:[]i x"), "([i] -> [i])");
        assert_eq!(typed(r"\f:->in f"), "((i -> n) -> (i -> n))");
        assert_eq!(typed(r"\f:(->in) f"), "((i -> n) -> (i -> n))");
    }

    #[test]
    fn malformed_annotations_abort() {
        let err = run_err(r"\x:q x");
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn rewrite_let_inlines_the_bound_value() {
        assert_eq!(run("x 5 + x x"), RuntimeValue::Int(10));
    }

    #[test]
    fn runtime_let_compiles_to_an_application() {
        let registry = Registry::with_prelude().expect("prelude");
        let program = registry.compile(": y 10 + y y").expect("compile");
        assert!(matches!(program.code(), Code::Apply { .. }));
        assert_eq!(program.invoke().expect("invoke"), RuntimeValue::Int(20));
    }

    #[test]
    fn quoted_names_rebind_existing_bindings() {
        assert_eq!(run("'pi 3 + pi pi"), RuntimeValue::Int(6));
    }

    #[test]
    fn unbound_names_are_syntax_errors() {
        let err = run_err("nope");
        assert!(matches!(err, CoreError::Syntax { .. }));
    }

    #[test]
    fn constants_are_available() {
        assert_eq!(run("pi"), RuntimeValue::Num(std::f64::consts::PI));
        assert_eq!(run("tau"), RuntimeValue::Num(std::f64::consts::TAU));
    }

    #[test]
    fn compose_applies_right_to_left() {
        assert_eq!(run(r"(. (\a * a 2) (\b + b 1)) 5"), RuntimeValue::Int(12));
    }

    #[test]
    fn strings_unescape_standard_sequences() {
        assert_eq!(run(r#""a\nb""#), RuntimeValue::Str("a\nb".to_string()));
        assert_eq!(run(r#""say \"hi\"""#), RuntimeValue::Str("say \"hi\"".to_string()));
    }

    #[test]
    fn out_of_range_integer_literals_abort() {
        let err = run_err("99999999999999999999");
        assert!(matches!(err, CoreError::Literal(_)));
    }

    #[test]
    fn non_finite_float_literals_abort() {
        let err = run_err("1.0e999");
        assert!(matches!(err, CoreError::Literal(_)));
    }

    #[test]
    fn comments_and_blanks_are_skipped() {
        assert_eq!(run("+ 1 # add\n  2"), RuntimeValue::Int(3));
    }

    #[test]
    fn opaque_host_values_flow_through_programs() {
        let registry = Registry::with_prelude().expect("prelude");
        let handle: Rc<dyn Any> = Rc::new(7i64);
        let boxed = registry.extern_value(
            "b",
            Type::atom("box"),
            RuntimeValue::Opaque(Opaque::new("box", handle)),
        );
        registry.bind("b", boxed).expect("bind");
        let unbox = registry
            .extern_fn("unbox", &[Type::atom("box")], int_type(), |args| {
                match &args[0] {
                    RuntimeValue::Opaque(opaque) => opaque
                        .handle()
                        .downcast_ref::<i64>()
                        .map(|v| RuntimeValue::Int(*v))
                        .ok_or_else(|| CoreError::Runtime("not an integer box".to_string())),
                    other => Err(CoreError::Runtime(format!("expected a box, found {other}"))),
                }
            })
            .expect("extern");
        registry.bind("unbox", unbox).expect("bind");
        assert_eq!(registry.run("+ 1 unbox b").expect("run"), RuntimeValue::Int(8));
    }
}
