//! Trellis: macro expansion with dialects and multi-phase compilation.
//!
//! The pipeline is driven from [`compiler`]; [`importer`] plugs it into module
//! loading; [`cli`] is the command-line front end.

use std::sync::Once;

pub use crate::diagnostics::{ErrorContext, ErrorType, TrellisError};

pub mod ast;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod debug;
pub mod diagnostics;
pub mod dialects;
pub mod importer;
pub mod macros;
pub mod multiphase;
pub mod runtime;
pub mod splicing;
pub mod syntax;
pub mod walker;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=trellis=debug`; events go to
/// stderr so they never mix with expanded source on stdout.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(filter)
                .init();
        }
    });
}
