//! The lowering pass driver.
//!
//! Lowering a module runs four phases over one [`ModuleRewriter`]:
//!
//! 1. declare every function through [`TargetCallback::lower_function`],
//! 2. declare every global with its storage type,
//! 3. lower global initializers,
//! 4. rewrite function bodies.
//!
//! Declarations come first so references to functions and globals resolve
//! in any order. On error the partially built output is dropped.

use tracing::{debug, info_span};

use keel_ir::Module;

use crate::function::FunctionRunner;
use crate::globals::{declare_globals, lower_initializers};
use crate::{LoweringConfig, LoweringError, ModuleRewriter, TargetCallback};

/// Aggregate lowering for one target.
pub struct LoweringPass<'t> {
    target: &'t dyn TargetCallback,
    config: LoweringConfig,
}

impl<'t> LoweringPass<'t> {
    pub fn new(target: &'t dyn TargetCallback) -> Self {
        LoweringPass {
            target,
            config: LoweringConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: LoweringConfig) -> Self {
        self.config = config;
        self
    }

    #[inline]
    pub fn config(&self) -> &LoweringConfig {
        &self.config
    }

    /// Lower `source` into a new module.
    pub fn run(&self, source: &Module) -> Result<Module, LoweringError> {
        let _span = info_span!("lower_module", module = %source.name).entered();
        let mut rewriter = ModuleRewriter::new(source, &self.config, self.target);

        for id in source.function_ids() {
            let lowered = self.target.lower_function(&mut rewriter, id)?;
            rewriter.map_function(id, lowered);
        }
        declare_globals(&mut rewriter)?;
        lower_initializers(&mut rewriter)?;
        for id in source.function_ids() {
            FunctionRunner::run(&mut rewriter, id)?;
        }

        let output = rewriter.into_output();
        debug!(
            functions = output.functions.len(),
            globals = output.globals.len(),
            terms = output.graph.len(),
            "lowered module"
        );
        Ok(output)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
mod tests;
