//! Longest-match prefix routing.
//!
//! A [`Dispatch`] maps fixed byte prefixes to sub-parsers. Prefixes are
//! grouped by length and tried longest first; the first length whose exact
//! text is registered commits the dispatch. If the committed sub-parser
//! rejects, the whole dispatch rejects. There is no probing of shorter
//! prefixes after a longer one matched textually.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::{Rc, Weak};

use crate::error::CoreError;
use crate::peg::{Parser, Reply};

pub struct Dispatch<T> {
    by_length: Rc<RefCell<BTreeMap<usize, HashMap<Vec<u8>, Parser<T>>>>>,
}

impl<T> Clone for Dispatch<T> {
    fn clone(&self) -> Self {
        Dispatch {
            by_length: Rc::clone(&self.by_length),
        }
    }
}

impl<T: 'static> Default for Dispatch<T> {
    fn default() -> Self {
        Dispatch::new()
    }
}

impl<T: 'static> Dispatch<T> {
    pub fn new() -> Dispatch<T> {
        Dispatch {
            by_length: Rc::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Registers `parser` under a fixed prefix. Registering an empty or
    /// already-present prefix is an error; collisions are caught here, at
    /// build time, instead of surfacing as runtime ambiguity.
    pub fn register(&self, prefix: &str, parser: Parser<T>) -> Result<(), CoreError> {
        if prefix.is_empty() {
            return Err(CoreError::Registration(
                "cannot register an empty prefix".to_string(),
            ));
        }
        let key = prefix.as_bytes().to_vec();
        let mut by_length = self.by_length.borrow_mut();
        let table = by_length.entry(key.len()).or_default();
        if table.contains_key(&key) {
            return Err(CoreError::Registration(format!(
                "prefix '{prefix}' is already registered"
            )));
        }
        table.insert(key, parser);
        Ok(())
    }

    pub fn contains(&self, prefix: &str) -> bool {
        self.by_length
            .borrow()
            .get(&prefix.len())
            .is_some_and(|table| table.contains_key(prefix.as_bytes()))
    }

    pub fn len(&self) -> usize {
        self.by_length.borrow().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn parse(&self, input: &[u8], at: usize) -> Reply<T> {
        let committed = {
            let by_length = self.by_length.borrow();
            let mut found = None;
            for (&len, table) in by_length.iter().rev() {
                let Some(key) = input.get(at..at + len) else {
                    continue;
                };
                if let Some(parser) = table.get(key) {
                    found = Some((len, parser.clone()));
                    break;
                }
            }
            found
        };
        match committed {
            Some((len, parser)) => parser.parse(input, at + len),
            None => Reply::Reject,
        }
    }

    pub fn parser(&self) -> Parser<T> {
        let dispatch = self.clone();
        Parser::new(move |input, at| dispatch.parse(input, at))
    }

    pub fn downgrade(&self) -> WeakDispatch<T> {
        WeakDispatch {
            by_length: Rc::downgrade(&self.by_length),
        }
    }
}

/// A non-owning handle, used by sub-parsers that recurse into the dispatch
/// they are registered in.
pub struct WeakDispatch<T> {
    by_length: Weak<RefCell<BTreeMap<usize, HashMap<Vec<u8>, Parser<T>>>>>,
}

impl<T> Clone for WeakDispatch<T> {
    fn clone(&self) -> Self {
        WeakDispatch {
            by_length: Weak::clone(&self.by_length),
        }
    }
}

impl<T: 'static> WeakDispatch<T> {
    pub fn upgrade(&self) -> Option<Dispatch<T>> {
        self.by_length.upgrade().map(|by_length| Dispatch { by_length })
    }
}
