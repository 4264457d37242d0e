//! Saturation-aware application of adjacent terms.
//!
//! Adjacent terms normally associate leftward, curried-style. That reading
//! is abandoned exactly when it is provably wrong: if the head cannot accept
//! every remaining term, later function-typed terms are deferred so they can
//! collect their own arguments first. `+ 1 * 2 3` therefore resolves to
//! `(+ 1) ((* 2) 3)` rather than overapplying `+`. When several readings
//! remain possible, the head is left undersaturated and inner functions
//! consume as much as they can. Dynamic-typed heads never defer; an
//! unbounded arity can always take one more argument.

use std::cell::RefCell;
use std::rc::Weak;

use tracing::trace;

use crate::error::CoreError;
use crate::grammar::WeakGrammar;
use crate::peg::{Parser, Reply};
use crate::types::Coercions;
use crate::value::Value;

/// Resolve a run of adjacent terms into a single application tree.
pub fn associate_applications(
    terms: Vec<Value>,
    coercions: &Coercions,
) -> Result<Value, CoreError> {
    let mut terms = terms.into_iter();
    let first = terms
        .next()
        .ok_or_else(|| CoreError::Type("empty application sequence".to_string()))?;
    let mut stack = vec![first];
    // counts the head itself, so after the first decrement it is the number
    // of terms from the current one to the end
    let mut remaining = terms.len() + 1;

    for term in terms {
        remaining -= 1;
        let top_arity = stack
            .last()
            .expect("application stack is never empty")
            .ty
            .value_arity();
        if top_arity < 0 {
            let top = stack.pop().expect("application stack is never empty");
            stack.push(top.apply(term, coercions)?);
        } else if remaining > top_arity as usize && term.ty.arg_type().is_some() {
            trace!(remaining, top_arity, "deferring function-typed term");
            stack.push(term);
        } else {
            let top = stack.pop().expect("application stack is never empty");
            stack.push(top.apply(term, coercions)?);
            // back out of saturated deferrals; they cannot take more terms
            while stack.len() > 1
                && stack
                    .last()
                    .expect("application stack is never empty")
                    .ty
                    .value_arity()
                    == 0
            {
                let arg = stack.pop().expect("application stack is never empty");
                let func = stack.pop().expect("application stack is never empty");
                stack.push(func.apply(arg, coercions)?);
            }
        }
    }

    let mut result = stack.pop().expect("application stack is never empty");
    while let Some(func) = stack.pop() {
        result = func.apply(result, coercions)?;
    }
    Ok(result)
}

/// A parser for a full expression: one or more terms from the grammar,
/// resolved into a single application tree. Holds only weak handles, since
/// the grammar itself registers parsers built from this one.
pub fn expression(grammar: WeakGrammar, coercions: Weak<RefCell<Coercions>>) -> Parser<Value> {
    Parser::new(move |input: &[u8], at: usize| {
        let Some(grammar) = grammar.upgrade() else {
            return Reply::Reject;
        };
        let Some(coercions) = coercions.upgrade() else {
            return Reply::Reject;
        };
        let mut terms = Vec::new();
        let mut cursor = at;
        loop {
            match grammar.parse(input, cursor) {
                Reply::Accept(value, next) => {
                    // a zero-width term would repeat forever
                    let stalled = next == cursor;
                    terms.push(value);
                    cursor = next;
                    if stalled {
                        break;
                    }
                }
                Reply::Reject => break,
                Reply::Abort(err) => return Reply::Abort(err),
            }
        }
        if terms.is_empty() {
            return Reply::Reject;
        }
        match associate_applications(terms, &coercions.borrow()) {
            Ok(value) => Reply::Accept(value, cursor),
            Err(err) => Reply::Abort(err),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::ExprGrammar;
    use crate::runtime::Literal;
    use crate::types::Type;
    use crate::value::Code;
    use std::rc::Rc;

    fn int(v: i64) -> Value {
        Value::new(Type::atom("i"), Code::Lit(Literal::Int(v)))
    }

    fn unary(name: &str) -> Value {
        Value::var(name, Type::function(Type::atom("i"), Type::atom("i")))
    }

    fn binary(name: &str) -> Value {
        Value::var(
            name,
            Type::function(
                Type::atom("i"),
                Type::function(Type::atom("i"), Type::atom("i")),
            ),
        )
    }

    fn resolve(terms: Vec<Value>) -> Result<Value, CoreError> {
        associate_applications(terms, &Coercions::new())
    }

    #[test]
    fn a_single_term_passes_through() {
        let result = resolve(vec![int(7)]).expect("resolve");
        assert_eq!(result.code, Code::Lit(Literal::Int(7)));
    }

    #[test]
    fn saturated_heads_defer_later_functions() {
        let terms = vec![binary("+"), int(1), binary("*"), int(2), int(3)];
        let result = resolve(terms).expect("resolve");
        assert_eq!(result.code.to_string(), "((+ 1) ((* 2) 3))");
        assert_eq!(result.ty, Type::atom("i"));
    }

    #[test]
    fn unary_chains_nest_rightward() {
        let terms = vec![unary("f"), unary("g"), int(1)];
        let result = resolve(terms).expect("resolve");
        assert_eq!(result.code.to_string(), "(f (g 1))");
    }

    #[test]
    fn exact_arities_associate_leftward() {
        let terms = vec![binary("f"), int(1), int(2)];
        let result = resolve(terms).expect("resolve");
        assert_eq!(result.code.to_string(), "((f 1) 2)");
    }

    #[test]
    fn dynamic_heads_consume_every_term() {
        let terms = vec![Value::var("d", Type::Dynamic), int(1), unary("f"), int(2)];
        let result = resolve(terms).expect("resolve");
        assert_eq!(result.code.to_string(), "(((d 1) f) 2)");
        assert_eq!(result.ty, Type::Dynamic);
    }

    #[test]
    fn overapplication_is_a_type_error() {
        let err = resolve(vec![unary("f"), int(1), int(2)]).unwrap_err();
        assert!(matches!(err, CoreError::Type(_)));
        let err = resolve(vec![int(1), int(2)]).unwrap_err();
        assert!(matches!(err, CoreError::Type(_)));
    }

    #[test]
    fn dynamic_terms_are_not_deferred_as_heads() {
        // unlike a known unary function, a dynamic argument cannot rescue
        // the overapplied head by collecting the trailing term itself
        let err = resolve(vec![unary("f"), Value::var("d", Type::Dynamic), int(1)]).unwrap_err();
        assert!(matches!(err, CoreError::Type(_)));
    }

    #[test]
    fn an_empty_sequence_is_a_type_error() {
        assert!(matches!(resolve(vec![]), Err(CoreError::Type(_))));
    }

    #[test]
    fn parses_terms_until_the_grammar_rejects() {
        let grammar = ExprGrammar::new();
        grammar.root().bind("f", unary("f")).expect("bind");
        grammar.root().bind("x", int(1)).expect("bind");
        let coercions = Rc::new(RefCell::new(Coercions::new()));
        let parser = expression(grammar.downgrade(), Rc::downgrade(&coercions));
        match parser.parse(b"f x ;", 0) {
            Reply::Accept(value, next) => {
                assert_eq!(value.code.to_string(), "(f 1)");
                // the cursor sits after the last accepted term
                assert_eq!(next, 3);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn association_failures_abort_the_parse() {
        let grammar = ExprGrammar::new();
        grammar.root().bind("x", int(1)).expect("bind");
        let coercions = Rc::new(RefCell::new(Coercions::new()));
        let parser = expression(grammar.downgrade(), Rc::downgrade(&coercions));
        match parser.parse(b"x x", 0) {
            Reply::Abort(CoreError::Type(_)) => {}
            other => panic!("expected an abort, got {other:?}"),
        }
    }

    #[test]
    fn a_dropped_grammar_rejects_quietly() {
        let grammar = ExprGrammar::new();
        let weak = grammar.downgrade();
        let coercions = Rc::new(RefCell::new(Coercions::new()));
        let parser = expression(weak, Rc::downgrade(&coercions));
        drop(grammar);
        assert!(matches!(parser.parse(b"1", 0), Reply::Reject));
    }
}
