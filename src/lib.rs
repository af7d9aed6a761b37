//! An incremental Protocol Buffers compiler front-end.
//!
//! `protolith` turns `.proto` source text into fully resolved,
//! diagnosable IR suitable for descriptor emission. It is a compiler
//! *service* rather than a batch tool: every stage — tokenization,
//! parsing, legalization, IR construction — is a memoized query under a
//! parallel execution engine with fine-grained invalidation, so editing
//! one file recomputes only what that edit can affect.
//!
//! The pipeline per file is one-way: source text → token tree → syntax
//! tree → IR. Control flows top-down: the IR of a file depends on the
//! IR of its imports plus its own syntax tree, which depends on its
//! token stream.
//!
//! ```no_run
//! use protolith::{MapOpener, Session};
//!
//! let opener = MapOpener::new()
//!     .add("hello.proto", "syntax = \"proto3\";\nmessage Hello { string name = 1; }");
//! let session = Session::new(Box::new(opener));
//! let result = session.compile(&["hello.proto"]);
//! assert!(!result.has_errors());
//! let file = result.files[0].as_ref().unwrap();
//! assert_eq!(file.types.len(), 1);
//! ```
//!
//! The core performs no I/O beyond what its [`Opener`] is asked for and
//! never renders diagnostics; it produces structured [`Diagnostic`]
//! values and leaves presentation to the host.

pub mod arena;
pub mod ast;
pub mod context;
pub mod engine;
pub mod intern;
pub mod ir;
pub mod legalize;
pub mod lexer;
pub mod opener;
pub mod parser;
pub mod queries;
pub mod report;
pub mod session;
pub mod span;
pub mod syntax;
pub mod token;

pub use crate::engine::CancelToken;
pub use crate::opener::{ChainOpener, FsOpener, MapOpener, Opener};
pub use crate::report::{Diagnostic, Edit, Report, Severity, Snippet};
pub use crate::session::{CompileResult, Session, SessionOptions};
pub use crate::span::Span;
pub use crate::syntax::SyntaxMode;
