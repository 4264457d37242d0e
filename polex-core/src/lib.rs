//! Core engine for the Polex expression language.
//!
//! This crate provides a self-extensible Polish-notation expression
//! compiler. The pipeline is roughly:
//!
//!   source text
//!     -> peg        (combinators; accept / reject / abort replies)
//!     -> grammar    (scoped bindings, literals, operator dispatch)
//!     -> resolve    (saturation-aware application of adjacent terms)
//!     -> value      (typed Code trees, coercions spliced in)
//!     -> eval       (tree walk against the extern table)
//!
//! Grammars are live: operator parsers registered through a [`Registry`]
//! may themselves extend the grammar while a parse is in flight, which is
//! how bindings, lambdas, and let forms work. Higher-level tools (the CLI,
//! embedding hosts) should depend on this crate rather than reimplementing
//! the pipeline.

// ---------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------

pub mod error;

// ---------------------------------------------------------------------
// Parsing primitives: combinators and prefix dispatch
// ---------------------------------------------------------------------

pub mod dispatch;
pub mod peg;

// ---------------------------------------------------------------------
// Semantic layers: types, runtime values, typed code
// ---------------------------------------------------------------------

pub mod runtime;
pub mod types;
pub mod value;

// ---------------------------------------------------------------------
// The extensible grammar and application resolution
// ---------------------------------------------------------------------

pub mod grammar;
pub mod resolve;

// ---------------------------------------------------------------------
// Builtins and host-facing assembly
// ---------------------------------------------------------------------

pub mod builtins;
pub mod registry;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use error::CoreError;
pub use registry::{Program, Registry};
pub use runtime::{Literal, RuntimeValue};
pub use types::Type;
pub use value::{Code, Value};
