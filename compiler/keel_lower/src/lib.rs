//! Aggregate lowering for the Keel low-level IR.
//!
//! Rewrites a module built over structured types (structs, unions,
//! fixed-length arrays, recursive `apply` types and the reflective
//! metatype) into a module in which every type is a concrete register type
//! and every aggregate that does not fit one is handled through explicit
//! memory instructions.
//!
//! # Architecture
//!
//! - **Lowered model** (`lowered.rs`): [`LoweredType`] and [`LoweredValue`],
//!   each in register, split or blob (types) and empty, register or split
//!   (values) form.
//! - **Rewriter** (`rewrite/`): the memoized type and value rules behind
//!   the [`Rewriter`] trait, with the module-wide [`ModuleRewriter`].
//! - **Function runner** (`function/`): [`FunctionRunner`] lowers one body,
//!   instruction by instruction, with a function-local cache.
//! - **Targets** (`target/`): [`TargetCallback`] plus [`SimpleTarget`] and
//!   the System V [`SysVAmd64Target`], sharing the driver in
//!   [`target::common`].
//! - **Pass** (`pass/`): [`LoweringPass`] runs the phases over a module.
//!
//! # Debugging
//!
//! Enable tracing with environment variables:
//! - `KEEL_LOG=keel_lower=debug` - functions, globals and ABI decisions
//! - `KEEL_LOG=keel_lower=trace` - every type lowering (very verbose)
//!
//! `RUST_LOG` is used when `KEEL_LOG` is not set.
//!
//! # Example
//!
//! ```ignore
//! use keel_lower::{verify_lowered, LoweringConfig, LoweringPass, SysVAmd64Target};
//!
//! let target = SysVAmd64Target;
//! let lowered = LoweringPass::new(&target)
//!     .with_config(LoweringConfig::default())
//!     .run(&module)?;
//! verify_lowered(&lowered)?;
//! ```

mod config;
mod error;
mod function;
mod globals;
mod lowered;
mod pass;
mod rewrite;
pub mod target;
mod verify;

#[cfg(test)]
mod test_helpers;

pub use config::LoweringConfig;
pub use error::{ErrorKind, LoweringError};
pub use function::FunctionRunner;
pub use lowered::{
    LoweredRegister, LoweredType, LoweredTypeMode, LoweredValue, LoweredValueMode,
    ParameterCategory,
};
pub use pass::LoweringPass;
pub use rewrite::{ModuleRewriter, Rewriter};
pub use target::{SimpleTarget, SysVAmd64Target, TargetCallback, TypeSizeAlignment};
pub use verify::verify_lowered;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Does nothing unless `KEEL_LOG` or
/// `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let directives = std::env::var("KEEL_LOG").or_else(|_| std::env::var("RUST_LOG"));
        if let Ok(directives) = directives {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::new(directives))
                .init();
        }
    });
}
