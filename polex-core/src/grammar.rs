//! The extensible expression grammar.
//!
//! A grammar is a stack of scopes, innermost last. Each scope tries its
//! bindings first, then its literal forms, then its operator forms, and an
//! outer scope is consulted only when every inner one rejects. Binding forms
//! push a fresh scope while they parse their body and pop it on the way out,
//! guard-style, so a failed parse can never leave the stack dirty.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::dispatch::Dispatch;
use crate::error::CoreError;
use crate::peg::{skip_blank, Alt, Parser, Reply};
use crate::value::Value;

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// One layer of the grammar: names bound here, literal forms, and operators.
#[derive(Clone, Default)]
pub struct Scope {
    bindings: Dispatch<Value>,
    literals: Alt<Value>,
    ops: Dispatch<Value>,
}

impl Scope {
    pub fn new() -> Scope {
        Scope::default()
    }

    /// Bind a name to a fixed parsed value. Names that end in a word byte
    /// only match when the next byte is not one, so `pi` does not claim the
    /// front of `pix`.
    pub fn bind(&self, name: &str, value: Value) -> Result<(), CoreError> {
        if self.bindings.contains(name) {
            return Err(CoreError::Registration(format!(
                "name '{name}' is already bound in this scope"
            )));
        }
        let wordy_end = name.bytes().last().is_some_and(is_word_byte);
        let parser = Parser::new(move |input: &[u8], at: usize| {
            if wordy_end && input.get(at).copied().is_some_and(is_word_byte) {
                return Reply::Reject;
            }
            Reply::Accept(value.clone(), at)
        });
        self.bindings.register(name, parser)
    }

    pub fn register_literal(&self, parser: Parser<Value>) {
        self.literals.push(parser);
    }

    pub fn register_op(&self, prefix: &str, parser: Parser<Value>) -> Result<(), CoreError> {
        self.ops.register(prefix, parser)
    }

    pub fn parse(&self, input: &[u8], at: usize) -> Reply<Value> {
        match self.bindings.parse(input, at) {
            Reply::Reject => {}
            other => return other,
        }
        match self.literals.parse(input, at) {
            Reply::Reject => {}
            other => return other,
        }
        self.ops.parse(input, at)
    }
}

struct GrammarInner {
    scopes: RefCell<Vec<Scope>>,
    last_resort: Alt<Value>,
    deepest_reject: Cell<usize>,
}

/// The term grammar: a scope stack plus a last-resort alternative tried
/// after every scope has rejected.
#[derive(Clone)]
pub struct ExprGrammar {
    inner: Rc<GrammarInner>,
}

impl ExprGrammar {
    pub fn new() -> ExprGrammar {
        ExprGrammar {
            inner: Rc::new(GrammarInner {
                scopes: RefCell::new(vec![Scope::new()]),
                last_resort: Alt::new(),
                deepest_reject: Cell::new(0),
            }),
        }
    }

    /// The outermost scope, where prelude and host registrations land.
    pub fn root(&self) -> Scope {
        self.inner
            .scopes
            .borrow()
            .first()
            .cloned()
            .expect("grammar always has a root scope")
    }

    /// Push a scope for the duration of the returned guard.
    pub fn enter(&self, scope: Scope) -> ScopeGuard {
        let mut scopes = self.inner.scopes.borrow_mut();
        scopes.push(scope);
        trace!(depth = scopes.len(), "entering scope");
        ScopeGuard {
            grammar: Rc::downgrade(&self.inner),
        }
    }

    /// Register a parser tried only after every scope has rejected.
    pub fn register_last_resort(&self, parser: Parser<Value>) {
        self.inner.last_resort.push(parser);
    }

    pub fn reset_diagnostics(&self) {
        self.inner.deepest_reject.set(0);
    }

    /// The furthest offset at which the whole grammar rejected since the
    /// last reset. Used to point syntax errors at the failing term.
    pub fn deepest_reject(&self) -> usize {
        self.inner.deepest_reject.get()
    }

    /// Parse one term: skip blanks, then try scopes innermost first, then
    /// the last resort.
    pub fn parse(&self, input: &[u8], at: usize) -> Reply<Value> {
        let at = skip_blank(input, at);
        // snapshot so a binding form may push scopes while we iterate
        let scopes: Vec<Scope> = self.inner.scopes.borrow().iter().rev().cloned().collect();
        for scope in scopes {
            match scope.parse(input, at) {
                Reply::Reject => {}
                other => return other,
            }
        }
        match self.inner.last_resort.parse(input, at) {
            Reply::Reject => {
                let deepest = self.inner.deepest_reject.get();
                self.inner.deepest_reject.set(deepest.max(at));
                Reply::Reject
            }
            other => other,
        }
    }

    pub fn downgrade(&self) -> WeakGrammar {
        WeakGrammar {
            inner: Rc::downgrade(&self.inner),
        }
    }
}

impl Default for ExprGrammar {
    fn default() -> ExprGrammar {
        ExprGrammar::new()
    }
}

/// A weak handle for parsers that live inside the grammar they parse with.
#[derive(Clone)]
pub struct WeakGrammar {
    inner: Weak<GrammarInner>,
}

impl WeakGrammar {
    pub fn upgrade(&self) -> Option<ExprGrammar> {
        self.inner.upgrade().map(|inner| ExprGrammar { inner })
    }
}

/// Pops the scope it guards when dropped, even on an abort path.
#[must_use]
pub struct ScopeGuard {
    grammar: Weak<GrammarInner>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Some(inner) = self.grammar.upgrade() {
            let mut scopes = inner.scopes.borrow_mut();
            scopes.pop();
            trace!(depth = scopes.len(), "leaving scope");
        }
    }
}
