//! Parsing primitives.
//!
//! Every parser is a pure function from a byte buffer and an offset to a
//! [`Reply`]. Rejection is an ordinary, recoverable outcome that choice and
//! repetition backtrack over; [`Reply::Abort`] carries a semantic error
//! raised after a successful match and is never recovered by a combinator.

use std::cell::RefCell;
use std::rc::Rc;

use regex::bytes::Regex;

use crate::error::CoreError;

/// Outcome of running a parser at a given offset.
#[derive(Debug)]
pub enum Reply<T> {
    /// The parse succeeded, producing a value and the next offset.
    Accept(T, usize),
    /// The parse did not match here. Silent and backtrackable.
    Reject,
    /// A semantic error occurred past the point of no return.
    Abort(CoreError),
}

/// A shareable parser producing `T`.
pub struct Parser<T> {
    run: Rc<dyn Fn(&[u8], usize) -> Reply<T>>,
}

impl<T> Clone for Parser<T> {
    fn clone(&self) -> Self {
        Parser {
            run: Rc::clone(&self.run),
        }
    }
}

impl<T> std::fmt::Debug for Parser<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser").finish_non_exhaustive()
    }
}

impl<T: 'static> Parser<T> {
    pub fn new(run: impl Fn(&[u8], usize) -> Reply<T> + 'static) -> Parser<T> {
        Parser { run: Rc::new(run) }
    }

    pub fn parse(&self, input: &[u8], at: usize) -> Reply<T> {
        (self.run)(input, at)
    }

    pub fn map<U: 'static>(self, f: impl Fn(T) -> U + 'static) -> Parser<U> {
        Parser::new(move |input, at| match self.parse(input, at) {
            Reply::Accept(value, next) => Reply::Accept(f(value), next),
            Reply::Reject => Reply::Reject,
            Reply::Abort(e) => Reply::Abort(e),
        })
    }

    /// Maps the result through a fallible function. An `Err` becomes
    /// [`Reply::Abort`]: the match already consumed input, so the failure is
    /// semantic rather than syntactic.
    pub fn try_map<U: 'static>(
        self,
        f: impl Fn(T) -> Result<U, CoreError> + 'static,
    ) -> Parser<U> {
        Parser::new(move |input, at| match self.parse(input, at) {
            Reply::Accept(value, next) => match f(value) {
                Ok(mapped) => Reply::Accept(mapped, next),
                Err(e) => Reply::Abort(e),
            },
            Reply::Reject => Reply::Reject,
            Reply::Abort(e) => Reply::Abort(e),
        })
    }

    /// Uses the first result to choose the parser for the remaining input.
    pub fn flat_map<U: 'static>(self, f: impl Fn(T) -> Parser<U> + 'static) -> Parser<U> {
        Parser::new(move |input, at| match self.parse(input, at) {
            Reply::Accept(value, next) => f(value).parse(input, next),
            Reply::Reject => Reply::Reject,
            Reply::Abort(e) => Reply::Abort(e),
        })
    }

    pub fn filter(self, predicate: impl Fn(&T) -> bool + 'static) -> Parser<T> {
        Parser::new(move |input, at| match self.parse(input, at) {
            Reply::Accept(value, next) => {
                if predicate(&value) {
                    Reply::Accept(value, next)
                } else {
                    Reply::Reject
                }
            }
            other => other,
        })
    }

    /// Never rejects: inner rejection yields `None` without consuming input.
    /// Aborts still propagate.
    pub fn optional(self) -> Parser<Option<T>> {
        Parser::new(move |input, at| match self.parse(input, at) {
            Reply::Accept(value, next) => Reply::Accept(Some(value), next),
            Reply::Reject => Reply::Accept(None, at),
            Reply::Abort(e) => Reply::Abort(e),
        })
    }

    /// Greedy repetition. Rejects when fewer than `min` matches occur;
    /// `max = None` is unbounded.
    pub fn repeated(self, min: usize, max: Option<usize>) -> Parser<Vec<T>> {
        Parser::new(move |input, at| {
            let mut results = Vec::new();
            let mut cursor = at;
            loop {
                if max.is_some_and(|m| results.len() >= m) {
                    break;
                }
                match self.parse(input, cursor) {
                    Reply::Accept(value, next) => {
                        results.push(value);
                        // a zero-width match would repeat forever
                        if next == cursor {
                            break;
                        }
                        cursor = next;
                    }
                    Reply::Reject => break,
                    Reply::Abort(e) => return Reply::Abort(e),
                }
            }
            if results.len() < min {
                Reply::Reject
            } else {
                Reply::Accept(results, cursor)
            }
        })
    }

    pub fn then<U: 'static>(self, other: Parser<U>) -> Parser<(T, U)> {
        Parser::new(move |input, at| match self.parse(input, at) {
            Reply::Accept(a, next) => match other.parse(input, next) {
                Reply::Accept(b, end) => Reply::Accept((a, b), end),
                Reply::Reject => Reply::Reject,
                Reply::Abort(e) => Reply::Abort(e),
            },
            Reply::Reject => Reply::Reject,
            Reply::Abort(e) => Reply::Abort(e),
        })
    }

    pub fn then_ignore<U: 'static>(self, other: Parser<U>) -> Parser<T> {
        self.then(other).map(|(a, _)| a)
    }

    pub fn ignore_then<U: 'static>(self, other: Parser<U>) -> Parser<U> {
        self.then(other).map(|(_, b)| b)
    }

    pub fn to<U: Clone + 'static>(self, value: U) -> Parser<U> {
        self.map(move |_| value.clone())
    }
}

/// Succeeds without consuming input, yielding a clone of `value`.
pub fn pure<T: Clone + 'static>(value: T) -> Parser<T> {
    Parser::new(move |_, at| Reply::Accept(value.clone(), at))
}

/// Zero-width success.
pub fn empty() -> Parser<()> {
    pure(())
}

/// Parses the exact bytes of `text`.
pub fn literal(text: &str) -> Parser<String> {
    let text = text.to_string();
    Parser::new(move |input, at| {
        let bytes = text.as_bytes();
        if input.get(at..).is_some_and(|rest| rest.starts_with(bytes)) {
            Reply::Accept(text.clone(), at + bytes.len())
        } else {
            Reply::Reject
        }
    })
}

/// An anchored regex match at the cursor.
///
/// Returns the whole match when the pattern declares no capture group, or
/// the group's text when it declares exactly one. More than one group is a
/// registration error pointing at [`pattern_groups`].
pub fn pattern(pattern: &str) -> Result<Parser<String>, CoreError> {
    let re = compile_anchored(pattern)?;
    let groups = re.captures_len() - 1;
    if groups > 1 {
        return Err(CoreError::Registration(format!(
            "pattern /{pattern}/ declares {groups} capture groups; use pattern_groups instead"
        )));
    }
    Ok(Parser::new(move |input, at| {
        let Some(caps) = re.captures(&input[at.min(input.len())..]) else {
            return Reply::Reject;
        };
        let Some(whole) = caps.get(0) else {
            return Reply::Reject;
        };
        let text = if groups == 0 {
            String::from_utf8_lossy(whole.as_bytes()).into_owned()
        } else {
            caps.get(1)
                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                .unwrap_or_default()
        };
        Reply::Accept(text, at + whole.end())
    }))
}

/// Like [`pattern`] but for patterns with several capture groups; yields all
/// of them in order, a non-participating group as an empty string.
pub fn pattern_groups(pattern: &str) -> Result<Parser<Vec<String>>, CoreError> {
    let re = compile_anchored(pattern)?;
    let groups = re.captures_len() - 1;
    if groups == 0 {
        return Err(CoreError::Registration(format!(
            "pattern /{pattern}/ declares no capture groups"
        )));
    }
    Ok(Parser::new(move |input, at| {
        let Some(caps) = re.captures(&input[at.min(input.len())..]) else {
            return Reply::Reject;
        };
        let Some(whole) = caps.get(0) else {
            return Reply::Reject;
        };
        let texts = (1..=groups)
            .map(|i| {
                caps.get(i)
                    .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                    .unwrap_or_default()
            })
            .collect();
        Reply::Accept(texts, at + whole.end())
    }))
}

fn compile_anchored(pattern: &str) -> Result<Regex, CoreError> {
    Regex::new(&format!("^(?:{pattern})"))
        .map_err(|e| CoreError::Registration(format!("invalid pattern /{pattern}/: {e}")))
}

/// Homogeneous ordered sequence; all parsers must succeed in order.
pub fn sequence<T: 'static>(parsers: Vec<Parser<T>>) -> Parser<Vec<T>> {
    Parser::new(move |input, at| {
        let mut results = Vec::with_capacity(parsers.len());
        let mut cursor = at;
        for parser in &parsers {
            match parser.parse(input, cursor) {
                Reply::Accept(value, next) => {
                    results.push(value);
                    cursor = next;
                }
                Reply::Reject => return Reply::Reject,
                Reply::Abort(e) => return Reply::Abort(e),
            }
        }
        Reply::Accept(results, cursor)
    })
}

/// An ordered choice that can grow and shrink after construction. The
/// last-added alternative is tried first.
pub struct Alt<T> {
    options: Rc<RefCell<Vec<Parser<T>>>>,
}

impl<T> Clone for Alt<T> {
    fn clone(&self) -> Self {
        Alt {
            options: Rc::clone(&self.options),
        }
    }
}

impl<T: 'static> Default for Alt<T> {
    fn default() -> Self {
        Alt::new()
    }
}

impl<T: 'static> Alt<T> {
    pub fn new() -> Alt<T> {
        Alt {
            options: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn push(&self, parser: Parser<T>) {
        self.options.borrow_mut().push(parser);
    }

    pub fn pop(&self) -> Option<Parser<T>> {
        self.options.borrow_mut().pop()
    }

    pub fn len(&self) -> usize {
        self.options.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.borrow().is_empty()
    }

    pub fn parse(&self, input: &[u8], at: usize) -> Reply<T> {
        // snapshot so an alternative may extend this alt while it runs
        let options: Vec<Parser<T>> = self.options.borrow().iter().rev().cloned().collect();
        for parser in &options {
            match parser.parse(input, at) {
                Reply::Accept(value, next) => return Reply::Accept(value, next),
                Reply::Reject => continue,
                Reply::Abort(e) => return Reply::Abort(e),
            }
        }
        Reply::Reject
    }

    pub fn parser(&self) -> Parser<T> {
        let alt = self.clone();
        Parser::new(move |input, at| alt.parse(input, at))
    }
}

/// Advances past spaces, tabs, newlines, and `#` comments running to the
/// end of the line.
pub fn skip_blank(input: &[u8], mut at: usize) -> usize {
    while at < input.len() {
        match input[at] {
            b' ' | b'\t' | b'\r' | b'\n' => at += 1,
            b'#' => {
                while at < input.len() && input[at] != b'\n' {
                    at += 1;
                }
            }
            _ => break,
        }
    }
    at
}

/// Skips blanks and comments, then runs `parser`.
pub fn whitespaced<T: 'static>(parser: Parser<T>) -> Parser<T> {
    Parser::new(move |input, at| parser.parse(input, skip_blank(input, at)))
}
