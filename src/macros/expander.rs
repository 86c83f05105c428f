//! The macro expander.
//!
//! A single recursive rewrite over the tree. On every node the four shape matchers run
//! in turn; on a match the bound macro is called, missing locations in its output are
//! filled from the invocation site, and (unless expanding one layer only) the output is
//! expanded again. Subtrees wrapped in `Done` are never revisited.
//!
//! Recursion is bounded by `Config::max_expansion_depth`; a macro that keeps
//! re-emitting its own invocation fails with `ExpansionDepthExceeded` instead of
//! exhausting the stack. Setting the limit to `None` removes the bound.
//!
//! After the top-level pass, [`global_postprocess`] strips the `Done` markers and fills
//! any location still missing.

use std::rc::Rc;

use tracing::{debug, trace};

use super::{detect, BindingTable, MacroResult, SyntaxKind, Tree};
use crate::{
    ast::{Expr, ExprKind, Loc, Module, Stmt, StmtKind},
    err_at, err_msg,
    runtime::Session,
    syntax::{unparse_expr, unparse_stmts},
    walker::{
        fix_missing_locations_expr, fix_missing_locations_module, fix_missing_locations_stmts,
        walk_expr, walk_stmt, Transformer, Visitor,
    },
    TrellisError,
};

type ExpandResult<T> = Result<T, TrellisError>;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Expands every macro in `module` and runs the global postprocess.
pub fn expand_macros(
    module: Module,
    bindings: Rc<BindingTable>,
    filename: &str,
    session: &Session,
) -> ExpandResult<Module> {
    let mut expander = MacroExpander::new(bindings, filename, session);
    let expansion = expander.visit_module(module)?;
    global_postprocess(expansion)
}

/// Removes `Done` markers and fills missing locations.
pub fn global_postprocess(module: Module) -> ExpandResult<Module> {
    let mut module = MarkerStripper.visit_module(module)?;
    fix_missing_locations_module(&mut module);
    Ok(module)
}

/// Fails if any `Done` marker survived postprocessing.
pub fn check_no_markers_remaining(module: &Module, filename: &str) -> ExpandResult<()> {
    struct Markers(Vec<Option<Loc>>);

    impl Visitor for Markers {
        fn visit_expr(&mut self, expr: &Expr) {
            if matches!(expr.kind, ExprKind::Done(_)) {
                self.0.push(expr.loc);
            }
            crate::walker::walk_expr_ref(self, expr);
        }

        fn visit_stmt(&mut self, stmt: &Stmt) {
            if matches!(stmt.kind, StmtKind::Done(_)) {
                self.0.push(stmt.loc);
            }
            crate::walker::walk_stmt_ref(self, stmt);
        }
    }

    let mut markers = Markers(Vec::new());
    markers.visit_body(&module.body);
    match markers.0.first() {
        None => Ok(()),
        Some(loc) => Err(err_at!(
            Internal,
            filename,
            *loc,
            "{} expansion marker(s) remain after expansion",
            markers.0.len()
        )),
    }
}

/// Services handed to a macro during its invocation.
pub struct MacroContext<'a, 's> {
    expander: &'a mut MacroExpander<'s>,
    /// The shape of this invocation.
    pub syntax: SyntaxKind,
    /// The `as` target of a block invocation.
    pub alias: Option<String>,
    /// Location of the invocation node.
    pub invocation: Option<Loc>,
    /// The name the macro is bound to in this module.
    pub name: String,
}

impl<'a, 's> MacroContext<'a, 's> {
    /// Fully expands `tree` with the expander that invoked this macro.
    pub fn expand(&mut self, tree: Tree) -> ExpandResult<Tree> {
        self.expander.visit_recursively(tree)
    }

    /// Expands exactly one layer of macros in `tree`.
    pub fn expand_once(&mut self, tree: Tree) -> ExpandResult<Tree> {
        self.expander.visit_once(tree)
    }

    pub fn to_source(&self, tree: &Tree) -> String {
        match tree {
            Tree::Expr(expr) => unparse_expr(expr),
            Tree::Stmts(stmts) => unparse_stmts(stmts),
        }
    }

    pub fn filename(&self) -> &str {
        &self.expander.filename
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.expander.bindings
    }

    pub fn session(&self) -> &'s Session {
        self.expander.session
    }

    /// Whether the invoking expander is in recursive mode.
    pub fn is_recursive(&self) -> bool {
        self.expander.recursive
    }
}

// ============================================================================
// EXPANDER
// ============================================================================

pub struct MacroExpander<'s> {
    bindings: Rc<BindingTable>,
    filename: String,
    session: &'s Session,
    recursive: bool,
    depth: usize,
    max_depth: Option<usize>,
}

impl<'s> MacroExpander<'s> {
    pub fn new(bindings: Rc<BindingTable>, filename: &str, session: &'s Session) -> Self {
        Self {
            bindings,
            filename: filename.to_string(),
            max_depth: session.config().max_expansion_depth,
            session,
            recursive: true,
            depth: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn visit_tree(&mut self, tree: Tree) -> ExpandResult<Tree> {
        match tree {
            Tree::Expr(expr) => Ok(Tree::Expr(self.visit_expr(expr)?)),
            Tree::Stmts(stmts) => Ok(Tree::Stmts(self.visit_body(stmts)?)),
        }
    }

    /// Expands `tree` to fixpoint, whatever mode the expander is in.
    pub fn visit_recursively(&mut self, tree: Tree) -> ExpandResult<Tree> {
        self.with_mode(true, |e| e.visit_tree(tree))
    }

    /// Expands one layer of macros in `tree`; macro output is not revisited.
    pub fn visit_once(&mut self, tree: Tree) -> ExpandResult<Tree> {
        self.with_mode(false, |e| e.visit_tree(tree))
    }

    fn with_mode<T>(
        &mut self,
        recursive: bool,
        f: impl FnOnce(&mut Self) -> ExpandResult<T>,
    ) -> ExpandResult<T> {
        let saved = std::mem::replace(&mut self.recursive, recursive);
        let result = f(self);
        self.recursive = saved;
        result
    }

    /// Calls macro `name` on `tree`, fills locations, and re-expands the output when
    /// in recursive mode.
    fn apply(
        &mut self,
        name: &str,
        syntax: SyntaxKind,
        tree: Tree,
        invocation: Option<Loc>,
        alias: Option<String>,
    ) -> MacroResult {
        let function = self.bindings.get(name).cloned().ok_or_else(|| {
            err_at!(
                UnboundMacro,
                self.filename,
                invocation,
                "no binding for macro '{}'",
                name
            )
        })?;

        if let Some(limit) = self.max_depth {
            if self.depth >= limit {
                return Err(err_at!(
                    ExpansionDepthExceeded,
                    self.filename,
                    invocation,
                    "macro expansion exceeded depth {} while expanding '{}'",
                    limit,
                    name
                )
                .with_help("a macro that re-emits its own invocation never reaches a fixpoint"));
            }
        }

        debug!(
            target: "trellis::expander",
            macro_name = name,
            syntax = syntax.as_str(),
            line = invocation.map(|l| l.line),
            depth = self.depth,
            "expanding macro"
        );

        self.depth += 1;
        let result = self.invoke(function.as_ref(), name, syntax, tree, invocation, alias);
        self.depth -= 1;
        result
    }

    fn invoke(
        &mut self,
        function: &dyn super::MacroFunction,
        name: &str,
        syntax: SyntaxKind,
        tree: Tree,
        invocation: Option<Loc>,
        alias: Option<String>,
    ) -> MacroResult {
        let expansion = {
            let mut ctx = MacroContext {
                expander: self,
                syntax,
                alias,
                invocation,
                name: name.to_string(),
            };
            function.expand(tree, &mut ctx)?
        };

        let Some(mut expansion) = expansion else {
            trace!(target: "trellis::expander", macro_name = name, "macro deleted its invocation");
            return Ok(None);
        };

        match &mut expansion {
            Tree::Expr(expr) => fix_missing_locations_expr(expr, invocation),
            Tree::Stmts(stmts) => fix_missing_locations_stmts(stmts, invocation),
        }

        if self.recursive {
            expansion = self.visit_tree(expansion)?;
        }
        Ok(Some(expansion))
    }

    /// Converts a macro result for an expression position.
    fn into_expr(&self, name: &str, result: Option<Tree>, loc: Option<Loc>) -> ExpandResult<Expr> {
        match result {
            None => Err(err_at!(
                Syntax,
                self.filename,
                loc,
                "macro '{}' returned None in an expression position",
                name
            )),
            Some(tree) => tree.into_expr().ok_or_else(|| {
                err_at!(
                    Syntax,
                    self.filename,
                    loc,
                    "macro '{}' returned statements in an expression position",
                    name
                )
            }),
        }
    }

    fn expand_name(&mut self, expr: Expr, name: String) -> ExpandResult<Expr> {
        let loc = expr.loc;
        // Name macros run one layer only; their output is revisited below unless it is
        // the very name they were given.
        let result = self.with_mode(false, |e| {
            e.apply(&name, SyntaxKind::Name, Tree::Expr(expr), loc, None)
        })?;
        let new = self.into_expr(&name, result, loc)?;
        if !self.recursive {
            return Ok(new);
        }
        if new.is_name(&name) {
            let loc = new.loc;
            return Ok(Expr::at(ExprKind::Done(Box::new(new)), loc));
        }
        // The revisit is part of this application, so it counts towards the depth limit.
        self.depth += 1;
        let result = self.visit_expr(new);
        self.depth -= 1;
        result
    }

    fn expand_decorated(&mut self, stmt: Stmt) -> ExpandResult<Vec<Stmt>> {
        let Stmt { kind, loc } = stmt;
        let (macros, kind) = match kind {
            StmtKind::FunctionDef {
                name,
                params,
                body,
                decorators,
            } => {
                let (macros, others) = detect::split_decorators(decorators, &self.bindings);
                let kind = StmtKind::FunctionDef {
                    name,
                    params,
                    body,
                    decorators: others,
                };
                (macros, kind)
            }
            StmtKind::ClassDef {
                name,
                body,
                decorators,
            } => {
                let (macros, others) = detect::split_decorators(decorators, &self.bindings);
                (
                    macros,
                    StmtKind::ClassDef {
                        name,
                        body,
                        decorators: others,
                    },
                )
            }
            other => return Err(err_msg!(Internal, "not a decorated definition: {:?}", other)),
        };

        // Innermost (closest to the definition) first; each macro consumes the previous
        // result, and a deletion stops the chain.
        let mut current = Some(Tree::Stmts(vec![Stmt::at(kind, loc)]));
        for name in macros.iter().rev() {
            let Some(tree) = current.take() else { break };
            current = self.apply(name, SyntaxKind::Decorator, tree, loc, None)?;
            if current.is_none() {
                break;
            }
        }
        Ok(current.map(Tree::into_stmts).unwrap_or_default())
    }
}

impl<'s> Transformer for MacroExpander<'s> {
    fn visit_expr(&mut self, expr: Expr) -> ExpandResult<Expr> {
        if matches!(expr.kind, ExprKind::Done(_)) {
            return Ok(expr);
        }

        if let Some(name) = detect::expr_macro(&expr, &self.bindings).map(str::to_string) {
            let loc = expr.loc;
            let ExprKind::Subscript { index, .. } = expr.kind else {
                return Err(err_msg!(Internal, "expr macro '{}' without a subscript", name));
            };
            let result = self.apply(&name, SyntaxKind::Expr, Tree::Expr(*index), loc, None)?;
            return self.into_expr(&name, result, loc);
        }

        if let Some(name) = detect::name_macro(&expr, &self.bindings).map(str::to_string) {
            return self.expand_name(expr, name);
        }

        match expr.kind {
            // A bare base identifier is never an invocation on its own.
            ExprKind::Subscript { value, index } if value.as_name().is_some() => {
                let index = Box::new(self.visit_expr(*index)?);
                Ok(Expr::at(ExprKind::Subscript { value, index }, expr.loc))
            }
            kind => walk_expr(self, Expr::at(kind, expr.loc)),
        }
    }

    fn visit_stmt(&mut self, stmt: Stmt) -> ExpandResult<Vec<Stmt>> {
        if matches!(stmt.kind, StmtKind::Done(_)) {
            return Ok(vec![stmt]);
        }

        if let Some(name) = detect::block_macro(&stmt, &self.bindings).map(str::to_string) {
            let loc = stmt.loc;
            let StmtKind::With { alias, body, .. } = stmt.kind else {
                return Err(err_msg!(Internal, "block macro '{}' without a with", name));
            };
            let result = self.apply(&name, SyntaxKind::Block, Tree::Stmts(body), loc, alias)?;
            return Ok(result.map(Tree::into_stmts).unwrap_or_default());
        }

        if !detect::decorator_macros(&stmt, &self.bindings).is_empty() {
            return self.expand_decorated(stmt);
        }

        Ok(vec![walk_stmt(self, stmt)?])
    }
}

// ============================================================================
// POSTPROCESS
// ============================================================================

struct MarkerStripper;

impl Transformer for MarkerStripper {
    fn visit_expr(&mut self, expr: Expr) -> ExpandResult<Expr> {
        match expr.kind {
            ExprKind::Done(inner) => self.visit_expr(*inner),
            kind => walk_expr(self, Expr::at(kind, expr.loc)),
        }
    }

    fn visit_stmt(&mut self, stmt: Stmt) -> ExpandResult<Vec<Stmt>> {
        match stmt.kind {
            StmtKind::Done(stmts) => self.visit_body(stmts),
            kind => Ok(vec![walk_stmt(self, Stmt::at(kind, stmt.loc))?]),
        }
    }
}
