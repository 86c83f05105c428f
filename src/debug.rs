//! Debugging aids for macro authors.
//!
//! Both macros are exported by the native module `trellis.debug`:
//!
//! ```text
//! from trellis.debug import macros, step_expansion, show_bindings
//!
//! with step_expansion:
//!     x = double[double[1]]
//!
//! show_bindings
//! ```

use tracing::debug;

use crate::{
    ast::{Constant, Expr, ExprKind},
    err_at,
    macros::{MacroCollector, MacroContext, MacroResult, NativeMacro, SyntaxKind, Tree},
};

/// Expands its argument one layer at a time, printing the tree after each step.
///
/// Works as an expression macro (`step_expansion[...]`) or a block macro.
pub fn step_expansion() -> NativeMacro {
    NativeMacro::new("step_expansion", |tree: Tree, ctx: &mut MacroContext<'_, '_>| -> MacroResult {
        if !matches!(ctx.syntax, SyntaxKind::Expr | SyntaxKind::Block) {
            return Err(err_at!(
                Syntax,
                ctx.filename(),
                ctx.invocation,
                "step_expansion is an expr and block macro only"
            ));
        }

        let output = ctx.session().output().clone();
        let line = ctx.invocation.map_or(0, |loc| loc.line);
        output.emit(&format!("**Tree {}:{} before macro expansion:", ctx.filename(), line));
        output.emit(&indent(&ctx.to_source(&tree)));

        let limit = ctx.session().config().max_expansion_depth;
        let mut tree = tree;
        let mut steps = 0usize;
        loop {
            let bindings = ctx.bindings().clone();
            let mut collector = MacroCollector::new(&bindings);
            collector.collect(&tree);
            if collector.is_empty() {
                break;
            }
            if limit.map_or(false, |limit| steps >= limit) {
                return Err(err_at!(
                    ExpansionDepthExceeded,
                    ctx.filename(),
                    ctx.invocation,
                    "step_expansion gave up after {} steps",
                    steps
                ));
            }
            tree = ctx.expand_once(tree)?;
            steps += 1;
            debug!(target: "trellis::debug", step = steps, "expansion step");
            output.emit(&format!("**Tree {}:{} after step {}:", ctx.filename(), line, steps));
            output.emit(&indent(&ctx.to_source(&tree)));
        }

        let plural = if steps == 1 { "" } else { "s" };
        output.emit(&format!("**Macro expansion complete after {} step{}.", steps, plural));
        Ok(Some(tree))
    })
}

/// A name macro that prints the macro bindings of the module it appears in, then
/// expands to `None`.
pub fn show_bindings() -> NativeMacro {
    NativeMacro::new("show_bindings", |tree: Tree, ctx: &mut MacroContext<'_, '_>| -> MacroResult {
        let output = ctx.session().output().clone();
        let line = ctx.invocation.map_or(0, |loc| loc.line);
        output.emit(&format!("Macro bindings for {}:{}:", ctx.filename(), line));
        let names = ctx.bindings().names();
        if names.is_empty() {
            output.emit("    <no bindings>");
        }
        for name in names {
            output.emit(&format!("    {}", name));
        }
        let loc = tree.as_expr().and_then(|e| e.loc);
        Ok(Some(Tree::Expr(Expr::at(ExprKind::Constant(Constant::None), loc))))
    })
    .name_macro()
}

fn indent(source: &str) -> String {
    source
        .trim_end()
        .lines()
        .map(|line| format!("    {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        ast::{builder, BinOp},
        macros::{expand_macros, BindingTable},
        runtime::{Session, SharedOutput},
        syntax::{parse_module, unparse_module},
    };

    fn double() -> NativeMacro {
        NativeMacro::new("double", |tree, _ctx| {
            let expr = tree.into_expr().unwrap_or_else(builder::none);
            Ok(Some(Tree::Expr(builder::binop(expr, BinOp::Mul, builder::int(2)))))
        })
    }

    #[test]
    fn steps_are_printed_one_layer_at_a_time() {
        let (output, buffer) = SharedOutput::buffer();
        let session = Session::with_output(Default::default(), output);
        let bindings = BindingTable::new().with_native(double()).with_native(step_expansion());
        let module = parse_module("x = step_expansion[double[double[1]]]\n", "s.trl").unwrap();
        let expanded = expand_macros(module, Rc::new(bindings), "s.trl", &session).unwrap();
        assert_eq!(unparse_module(&expanded), "x = 1 * 2 * 2\n");

        let text = buffer.borrow().buffer.clone();
        assert!(text.starts_with("**Tree s.trl:1 before macro expansion:\n    double[double[1]]"));
        assert!(text.contains("after step 1:\n    double[1] * 2"));
        assert!(text.ends_with("**Macro expansion complete after 2 steps."));
    }

    #[test]
    fn bindings_are_listed() {
        let (output, buffer) = SharedOutput::buffer();
        let session = Session::with_output(Default::default(), output);
        let bindings = BindingTable::new().with_native(double()).with_native(show_bindings());
        let module = parse_module("show_bindings\n", "b.trl").unwrap();
        let expanded = expand_macros(module, Rc::new(bindings), "b.trl", &session).unwrap();
        assert_eq!(unparse_module(&expanded), "None\n");
        assert_eq!(buffer.borrow().buffer, "Macro bindings for b.trl:1:\n    double\n    show_bindings");
    }
}
