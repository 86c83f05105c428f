//! Unified, `miette`-based diagnostics for the Trellis engine.
//!
//! Every failure produced while parsing, expanding, compiling or running a module is a
//! [`TrellisError`]. The variants follow the error classes of the expansion pipeline:
//! syntax errors at invocation sites, import failures, binding inconsistencies, and the
//! host runtime's own evaluation errors.
//!
//! # Error Construction Macros
//!
//! - **Use `err_msg!` for message-only errors.**
//!   - `err_msg!(Import, "no module named '{}'", name)`
//!
//! - **Use `err_at!` when a file name and location are known.** The message is prefixed
//!   with `file:line:` and the location is kept for labelled rendering.
//!   - `err_at!(Syntax, filename, stmt.loc, "missing module name in macro-import")`
//!
//! Attach source text for rich rendering with [`TrellisError::with_source`], and a help
//! line with [`TrellisError::with_help`].

use std::sync::Arc;

use miette::{Diagnostic, LabeledSpan, NamedSource, SourceCode};
use thiserror::Error;

use crate::ast::Loc;

pub type SourceArc = Arc<NamedSource<String>>;

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Type-safe error classification that corresponds to `TrellisError` variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Malformed invocation syntax, missing module names, bad phase markers
    Syntax,
    /// Surface syntax the parser cannot read
    Parse,
    /// Modules or dialects that cannot be resolved
    Import,
    /// Macro attributes missing from their definition module
    MacroBinding,
    /// Expansion looked up a macro that discovery never bound
    UnboundMacro,
    /// The configured expansion depth was reached
    ExpansionDepth,
    /// Runtime evaluation errors in the host interpreter
    Eval,
    /// Runtime type mismatches
    Type,
    /// Filesystem access
    Io,
    /// API misuse and engine invariants
    Internal,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Syntax => "Syntax",
            ErrorType::Parse => "Parse",
            ErrorType::Import => "Import",
            ErrorType::MacroBinding => "MacroBinding",
            ErrorType::UnboundMacro => "UnboundMacro",
            ErrorType::ExpansionDepth => "ExpansionDepthExceeded",
            ErrorType::Eval => "Eval",
            ErrorType::Type => "Type",
            ErrorType::Io => "Io",
            ErrorType::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an error happened, and how to help.
#[derive(Debug, Default)]
pub struct ErrorContext {
    pub filename: Option<String>,
    pub loc: Option<Loc>,
    /// Source text of `filename`, when the caller still has it.
    pub source: Option<SourceArc>,
    pub help: Option<String>,
}

impl ErrorContext {
    /// Returns an empty error context.
    pub fn none() -> Self {
        Self::default()
    }

    /// Creates a context pointing at `loc` inside `filename`.
    pub fn at(filename: impl AsRef<str>, loc: Option<Loc>) -> Self {
        Self {
            filename: Some(filename.as_ref().to_string()),
            loc,
            source: None,
            help: None,
        }
    }
}

/// Unified error type for all Trellis failure modes.
#[derive(Debug, Error)]
pub enum TrellisError {
    #[error("Syntax error: {message}")]
    Syntax {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Parse error: {message}")]
    Parse {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Import error: {message}")]
    Import {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Macro binding error: {message}")]
    MacroBinding {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Unbound macro: {message}")]
    UnboundMacro {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Expansion depth exceeded: {message}")]
    ExpansionDepthExceeded {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Evaluation error: {message}")]
    Eval {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Type error: {message}")]
    Type {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("I/O error: {message}")]
    Io {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        ctx: ErrorContext,
        #[source]
        source: Option<BoxedCause>,
    },
}

impl TrellisError {
    fn parts(&self) -> (&String, &ErrorContext) {
        match self {
            TrellisError::Syntax { message, ctx, .. }
            | TrellisError::Parse { message, ctx, .. }
            | TrellisError::Import { message, ctx, .. }
            | TrellisError::MacroBinding { message, ctx, .. }
            | TrellisError::UnboundMacro { message, ctx, .. }
            | TrellisError::ExpansionDepthExceeded { message, ctx, .. }
            | TrellisError::Eval { message, ctx, .. }
            | TrellisError::Type { message, ctx, .. }
            | TrellisError::Io { message, ctx, .. }
            | TrellisError::Internal { message, ctx, .. } => (message, ctx),
        }
    }

    fn parts_mut(&mut self) -> (&mut String, &mut ErrorContext, &mut Option<BoxedCause>) {
        match self {
            TrellisError::Syntax { message, ctx, source }
            | TrellisError::Parse { message, ctx, source }
            | TrellisError::Import { message, ctx, source }
            | TrellisError::MacroBinding { message, ctx, source }
            | TrellisError::UnboundMacro { message, ctx, source }
            | TrellisError::ExpansionDepthExceeded { message, ctx, source }
            | TrellisError::Eval { message, ctx, source }
            | TrellisError::Type { message, ctx, source }
            | TrellisError::Io { message, ctx, source }
            | TrellisError::Internal { message, ctx, source } => (message, ctx, source),
        }
    }

    /// Returns the type-safe error classification for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            TrellisError::Syntax { .. } => ErrorType::Syntax,
            TrellisError::Parse { .. } => ErrorType::Parse,
            TrellisError::Import { .. } => ErrorType::Import,
            TrellisError::MacroBinding { .. } => ErrorType::MacroBinding,
            TrellisError::UnboundMacro { .. } => ErrorType::UnboundMacro,
            TrellisError::ExpansionDepthExceeded { .. } => ErrorType::ExpansionDepth,
            TrellisError::Eval { .. } => ErrorType::Eval,
            TrellisError::Type { .. } => ErrorType::Type,
            TrellisError::Io { .. } => ErrorType::Io,
            TrellisError::Internal { .. } => ErrorType::Internal,
        }
    }

    /// The bare message, without the variant prefix.
    pub fn message(&self) -> &str {
        self.parts().0
    }

    pub fn context(&self) -> &ErrorContext {
        self.parts().1
    }

    /// Attaches the source text the location refers to.
    pub fn with_source(mut self, name: impl AsRef<str>, text: impl Into<String>) -> Self {
        let (_, ctx, _) = self.parts_mut();
        if ctx.source.is_none() {
            ctx.source = Some(Arc::new(NamedSource::new(name.as_ref(), text.into())));
        }
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.parts_mut().1.help = Some(help.into());
        self
    }

    /// Locates an error that carries no file name yet: the message gets the
    /// `file:line:` prefix and the context records the location.
    pub fn located(mut self, filename: impl AsRef<str>, loc: Option<Loc>) -> Self {
        let (message, ctx, _) = self.parts_mut();
        if ctx.filename.is_none() {
            *message = format_located(&filename, loc, message);
            ctx.filename = Some(filename.as_ref().to_string());
            ctx.loc = loc;
        }
        self
    }

    /// Chains `cause` as the underlying error.
    pub fn caused_by(mut self, cause: TrellisError) -> Self {
        *self.parts_mut().2 = Some(Box::new(cause));
        self
    }
}

impl From<std::io::Error> for TrellisError {
    fn from(err: std::io::Error) -> Self {
        TrellisError::Io {
            message: err.to_string(),
            ctx: ErrorContext::none(),
            source: Some(Box::new(err)),
        }
    }
}

impl Diagnostic for TrellisError {
    fn code<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        Some(Box::new(format!("trellis::{}", self.error_type())))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn std::fmt::Display + 'a>> {
        self.context()
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn std::fmt::Display + 'a>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.context()
            .source
            .as_ref()
            .map(|s| s.as_ref() as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let (message, ctx) = self.parts();
        let source = ctx.source.as_ref()?;
        let loc = ctx.loc?;
        let offset = offset_of(source.inner(), loc)?;
        let label = LabeledSpan::new(Some(message.clone()), offset, 1);
        Some(Box::new(std::iter::once(label)))
    }
}

/// Byte offset of a line/column location inside `text`.
fn offset_of(text: &str, loc: Loc) -> Option<usize> {
    let line_start = if loc.line <= 1 {
        0
    } else {
        text.match_indices('\n')
            .nth(loc.line as usize - 2)
            .map(|(idx, _)| idx + 1)?
    };
    let offset = line_start + loc.col as usize;
    (offset <= text.len()).then_some(offset)
}

/// Prefixes `message` with `file:line:` when a location is known.
pub fn format_located(filename: impl AsRef<str>, loc: Option<Loc>, message: &str) -> String {
    match loc {
        Some(loc) => format!("{}:{}: {}", filename.as_ref(), loc.line, message),
        None => format!("{}: {}", filename.as_ref(), message),
    }
}

/// Constructs a `TrellisError` variant with a formatted message and no context.
#[macro_export]
macro_rules! err_msg {
    ($variant:ident, $($arg:tt)+) => {
        $crate::TrellisError::$variant {
            message: format!($($arg)+),
            ctx: $crate::ErrorContext::none(),
            source: None,
        }
    };
}

/// Constructs a `TrellisError` variant located at `loc` (an `Option<Loc>`) in `file`.
#[macro_export]
macro_rules! err_at {
    ($variant:ident, $file:expr, $loc:expr, $($arg:tt)+) => {
        $crate::TrellisError::$variant {
            message: $crate::diagnostics::format_located(&$file, $loc, &format!($($arg)+)),
            ctx: $crate::ErrorContext::at(&$file, $loc),
            source: None,
        }
    };
}

#[cfg(test)]
mod diagnostics_tests {
    use miette::Report;

    use super::*;

    #[test]
    fn located_errors_carry_file_and_line() {
        let err = crate::err_at!(
            Syntax,
            "pkg/mod.trl",
            Some(Loc::new(3, 4)),
            "missing module name in macro-import"
        );
        assert_eq!(err.error_type(), ErrorType::Syntax);
        assert_eq!(
            err.message(),
            "pkg/mod.trl:3: missing module name in macro-import"
        );
        assert_eq!(err.context().loc, Some(Loc::new(3, 4)));
    }

    #[test]
    fn report_renders_label_and_help() {
        let err = crate::err_at!(Import, "a.trl", Some(Loc::new(2, 0)), "no module named 'x'")
            .with_source("a.trl", "x = 1\nfrom x import macros, m\n")
            .with_help("check the search roots");
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("no module named 'x'"));
        assert!(output.contains("check the search roots"));
    }

    #[test]
    fn causes_are_chained() {
        let cause = crate::err_msg!(Parse, "unexpected token");
        let err = crate::err_msg!(Import, "failed to parse m.trl").caused_by(cause);
        let output = format!("{:?}", Report::new(err));
        assert!(output.contains("failed to parse m.trl"));
        assert!(output.contains("unexpected token"));
    }

    #[test]
    fn source_is_exposed_through_the_error_trait() {
        let bare = crate::err_msg!(Import, "failed to parse m.trl");
        assert!(std::error::Error::source(&bare).is_none());

        let err = bare.caused_by(crate::err_msg!(Parse, "unexpected token"));
        let cause = std::error::Error::source(&err).map(|c| c.to_string());
        assert!(cause.unwrap().contains("unexpected token"));
    }

    #[test]
    fn located_only_applies_once() {
        let err = crate::err_msg!(Type, "unsupported operand")
            .located("m.trl", Some(Loc::new(5, 0)))
            .located("other.trl", Some(Loc::new(9, 0)));
        assert_eq!(err.message(), "m.trl:5: unsupported operand");
        assert_eq!(err.context().filename.as_deref(), Some("m.trl"));
    }

    #[test]
    fn offsets_follow_lines() {
        let text = "ab\ncde\nf";
        assert_eq!(offset_of(text, Loc::new(1, 1)), Some(1));
        assert_eq!(offset_of(text, Loc::new(2, 2)), Some(5));
        assert_eq!(offset_of(text, Loc::new(3, 0)), Some(7));
        assert_eq!(offset_of(text, Loc::new(9, 0)), None);
    }
}
