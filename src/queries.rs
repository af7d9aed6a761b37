//! The compiler's queries.
//!
//! Three queries per file, each memoized by the engine: `Lex` turns
//! bytes into tokens, `Parse` turns tokens into a legalized syntax tree,
//! and `Ir` builds the resolved IR from the tree plus the `Ir` of every
//! direct import. Data flows one way; control flows top-down from the
//! root `Ir` queries a session asks for.

use std::sync::Arc;

use parking_lot::Mutex;
use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;

use crate::ast::ImportModifier;
use crate::context::FileContext;
use crate::engine::{Fail, Query, QueryCtx};
use crate::intern::{Interner, Name};
use crate::ir::{build_file, BuildInput, FileIr, ImportKind, ResolvedImport};
use crate::legalize::legalize;
use crate::lexer::{lex, Lexed};
use crate::opener::{clean_import_path, OpenError, Opener};
use crate::parser::parse;
use crate::report::{Diagnostic, Report};
use crate::span::Span;

/// One stage of one file.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompileQuery {
    Lex(Name),
    Parse(Name),
    Ir(Name),
}

/// What each stage produces.
#[derive(Clone)]
pub enum Artifact {
    Tokens(Arc<Lexed>),
    Ast(Arc<FileContext>),
    Ir(Arc<FileIr>),
}

impl Artifact {
    pub fn as_ir(&self) -> Option<&Arc<FileIr>> {
        match self {
            Artifact::Ir(ir) => Some(ir),
            _ => None,
        }
    }
}

/// Shared environment for all compile queries in a session.
pub struct CompileEnv {
    pub interner: Arc<Interner>,
    pub opener: Box<dyn Opener>,
    /// Import edges seen so far, for cycle refusal. Keyed by interned
    /// path id.
    import_graph: Mutex<DiGraphMap<u32, ()>>,
}

impl CompileEnv {
    pub fn new(interner: Arc<Interner>, opener: Box<dyn Opener>) -> CompileEnv {
        CompileEnv {
            interner,
            opener,
            import_graph: Mutex::new(DiGraphMap::new()),
        }
    }

    /// Records `from -> to`; false if the edge would close a cycle.
    fn record_import(&self, from: Name, to: Name) -> bool {
        let mut graph = self.import_graph.lock();
        graph.add_node(from.as_u32());
        graph.add_node(to.as_u32());
        if from == to || has_path_connecting(&*graph, to.as_u32(), from.as_u32(), None) {
            return false;
        }
        graph.add_edge(from.as_u32(), to.as_u32(), ());
        true
    }
}

impl Query for CompileQuery {
    type Value = Artifact;
    type Env = CompileEnv;

    fn run(&self, cx: &QueryCtx<'_, Self>) -> Result<Artifact, Fail> {
        match self {
            CompileQuery::Lex(path) => run_lex(cx, *path),
            CompileQuery::Parse(path) => run_parse(cx, *path),
            CompileQuery::Ir(path) => run_ir(cx, *path),
        }
    }
}

/// Drains `report`, stamping each span with the file it points into so
/// diagnostics stay attributable after cross-file aggregation.
fn drain_stamped(cx: &QueryCtx<'_, CompileQuery>, report: &Report, file: Name) {
    for mut diagnostic in report.drain() {
        for snippet in &mut diagnostic.snippets {
            snippet.file.get_or_insert(file);
        }
        cx.report(diagnostic);
    }
}

fn run_lex(cx: &QueryCtx<'_, CompileQuery>, path: Name) -> Result<Artifact, Fail> {
    let env = cx.env();
    let path_text = env.interner.resolve(path);
    log::debug!("lex {path_text}");

    let opened = match env.opener.open(&path_text) {
        Ok(opened) => opened,
        Err(OpenError::NotFound) => {
            cx.report(Diagnostic::error(format!("file not found: `{path_text}`")));
            return cx.fail();
        }
        Err(OpenError::Io(error)) => {
            cx.report(Diagnostic::error(format!(
                "could not read `{path_text}`: {error}"
            )));
            return cx.fail();
        }
    };

    let report = Report::new();
    let lexed = lex(&opened.bytes, &report);
    drain_stamped(cx, &report, path);
    Ok(Artifact::Tokens(Arc::new(lexed)))
}

fn run_parse(cx: &QueryCtx<'_, CompileQuery>, path: Name) -> Result<Artifact, Fail> {
    let resolved = cx.resolve(&[CompileQuery::Lex(path)])?;
    let lexed = match resolved.into_iter().next().and_then(|r| r.value) {
        Some(Artifact::Tokens(lexed)) => lexed,
        _ => return cx.fail(),
    };

    let env = cx.env();
    log::debug!("parse {}", env.interner.resolve(path));
    let report = Report::new();
    let parsed = parse(&lexed.text, &lexed.stream, &report);
    let syntax = legalize(&lexed.text, &lexed.stream, &parsed.ast, &parsed.file, &report);
    drain_stamped(cx, &report, path);

    Ok(Artifact::Ast(FileContext::new(
        path, lexed, parsed.ast, parsed.file, syntax,
    )))
}

fn run_ir(cx: &QueryCtx<'_, CompileQuery>, path: Name) -> Result<Artifact, Fail> {
    let resolved = cx.resolve(&[CompileQuery::Parse(path)])?;
    let file_cx = match resolved.into_iter().next().and_then(|r| r.value) {
        Some(Artifact::Ast(file_cx)) => file_cx,
        _ => return cx.fail(),
    };

    let env = cx.env();
    log::debug!("ir {}", env.interner.resolve(path));
    let report = Report::new();

    // Direct imports from the syntax tree.
    let mut declared: Vec<(Name, ImportKind, Span)> = Vec::new();
    for decl in &file_cx.root.decls {
        let Some(import) = file_cx.ast.import(*decl) else {
            continue;
        };
        let Some(text) = import.value.and_then(|v| file_cx.string_text(v)) else {
            continue;
        };
        let import_path = env.interner.intern(&clean_import_path(&text));
        let kind = match import.modifier {
            Some((ImportModifier::Public, _)) => ImportKind::Public,
            Some((ImportModifier::Weak, _)) => ImportKind::Weak,
            None => ImportKind::Regular,
        };

        if declared.iter().any(|(existing, _, _)| *existing == import_path) {
            report.push(
                Diagnostic::warning(format!("`{text}` is imported more than once"))
                    .with_deletion(import.span, "remove the duplicate import"),
            );
            continue;
        }
        if !env.record_import(path, import_path) {
            report.push(
                Diagnostic::error(format!("importing `{text}` would form an import cycle"))
                    .with_span(import.span, "this import completes the cycle"),
            );
            continue;
        }
        declared.push((import_path, kind, import.span));
    }

    // Imports resolve in parallel; a failed import leaves a hole that
    // stage 4 will diagnose as unknown types.
    let queries: Vec<CompileQuery> = declared
        .iter()
        .map(|(import_path, _, _)| CompileQuery::Ir(*import_path))
        .collect();
    let results = cx.resolve(&queries)?;

    let imports: Vec<ResolvedImport> = declared
        .iter()
        .zip(results)
        .map(|((import_path, kind, span), result)| ResolvedImport {
            path: *import_path,
            kind: *kind,
            span: *span,
            file: result.value.as_ref().and_then(|v| v.as_ir()).cloned(),
        })
        .collect();

    let ir = build_file(BuildInput {
        cx: file_cx,
        imports,
        interner: &env.interner,
        report: &report,
    });
    drain_stamped(cx, &report, path);
    Ok(Artifact::Ir(Arc::new(ir)))
}
