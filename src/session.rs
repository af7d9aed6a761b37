//! The compiler session.
//!
//! A [`Session`] owns everything with state: the interner, the query
//! executor, and the opener. There is no process-global state anywhere
//! in the crate; two sessions never share caches. Dropping the session
//! drops every memoized artifact.

use std::sync::Arc;

use crate::engine::{CancelToken, Executor};
use crate::intern::{Interner, Name};
use crate::ir::FileIr;
use crate::opener::{clean_import_path, Opener};
use crate::queries::{Artifact, CompileEnv, CompileQuery};
use crate::report::{Diagnostic, Severity};

/// Session-construction knobs.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Maximum concurrently computing queries.
    pub parallelism: usize,
    /// Extra debug tracing; seeded once from `PROTOLITH_DEBUG`.
    pub debug: bool,
}

impl Default for SessionOptions {
    fn default() -> SessionOptions {
        SessionOptions {
            parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            debug: std::env::var_os("PROTOLITH_DEBUG").is_some(),
        }
    }
}

/// The result of compiling a set of root files.
#[derive(Debug)]
pub struct CompileResult {
    /// One entry per requested root, in request order; `None` when that
    /// root failed outright (for example, its file did not exist).
    pub files: Vec<Option<Arc<FileIr>>>,
    /// All diagnostics from the roots and everything they imported,
    /// deduplicated.
    pub diagnostics: Vec<Diagnostic>,
    /// True when any root hard-failed.
    pub failed: bool,
    /// True when any root was recomputed rather than recalled.
    pub changed: bool,
}

impl CompileResult {
    /// Hosts deciding an exit code should exit nonzero exactly when
    /// this is true.
    pub fn has_errors(&self) -> bool {
        self.failed
            || self
                .diagnostics
                .iter()
                .any(|diagnostic| diagnostic.severity >= Severity::Error)
    }
}

/// An incremental compiler instance.
pub struct Session {
    interner: Arc<Interner>,
    executor: Executor<CompileQuery>,
    env: CompileEnv,
    options: SessionOptions,
}

impl Session {
    pub fn new(opener: Box<dyn Opener>) -> Session {
        Session::with_options(opener, SessionOptions::default())
    }

    pub fn with_options(opener: Box<dyn Opener>, options: SessionOptions) -> Session {
        let interner = Arc::new(Interner::new());
        Session {
            executor: Executor::new(options.parallelism),
            env: CompileEnv::new(interner.clone(), opener),
            interner,
            options,
        }
    }

    pub fn interner(&self) -> &Interner {
        &self.interner
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    fn path_name(&self, path: &str) -> Name {
        self.interner.intern(&clean_import_path(path))
    }

    /// Compiles `paths` to IR, reusing every memoized stage that is
    /// still valid.
    pub fn compile(&self, paths: &[&str]) -> CompileResult {
        self.compile_with_token(paths, &CancelToken::new())
    }

    /// Like [`Session::compile`], but abortable. A cancelled run leaves
    /// the caches exactly as a never-started run would.
    pub fn compile_with_token(&self, paths: &[&str], token: &CancelToken) -> CompileResult {
        let roots: Vec<CompileQuery> = paths
            .iter()
            .map(|path| CompileQuery::Ir(self.path_name(path)))
            .collect();
        if self.options.debug {
            log::debug!("compile roots: {roots:?}");
        }
        let outcomes = self.executor.run(&self.env, token, &roots);

        let mut files = Vec::with_capacity(outcomes.len());
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let mut failed = false;
        let mut changed = false;
        for outcome in outcomes {
            failed |= outcome.failed;
            changed |= outcome.changed;
            files.push(match outcome.value {
                Some(Artifact::Ir(ir)) => Some(ir),
                _ => None,
            });
            for diagnostic in outcome.errors {
                if !diagnostics.contains(&diagnostic) {
                    diagnostics.push(diagnostic);
                }
            }
        }
        CompileResult {
            files,
            diagnostics,
            failed,
            changed,
        }
    }

    /// Evicts everything derived from `paths`. The next compile
    /// recomputes those files and every file that depends on them.
    pub fn invalidate(&self, paths: &[&str]) {
        let keys: Vec<CompileQuery> = paths
            .iter()
            .map(|path| CompileQuery::Lex(self.path_name(path)))
            .collect();
        self.executor.invalidate(&keys);
    }

    /// Number of memoized query results, an introspection aid.
    pub fn cached_queries(&self) -> usize {
        self.executor.cached_len()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("cached_queries", &self.cached_queries())
            .finish()
    }
}
