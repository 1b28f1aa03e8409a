//! Calling-convention driver shared by the targets.
//!
//! A target only decides how each parameter type crosses a call
//! ([`ParameterClassifier`]). Everything else is the same for every
//! target and lives here:
//!
//! - [`lower_function`]: the output function type,
//! - [`lower_function_entry`]: decoding parameters in the callee,
//! - [`lower_function_call`]: encoding arguments and decoding the result
//!   at a call site,
//! - [`lower_return`]: encoding the returned value.
//!
//! # Passing modes
//!
//! | Mode | Parameter | Return |
//! |------|-----------|--------|
//! | `Direct` | the register lowering | the register lowering |
//! | `Coerce(t)` | reloaded as `t` through a stack slot | same |
//! | `Indirect` | byte pointer to a caller copy | hidden first byte-pointer parameter (`Sret`) |
//! | `Ignore` | not passed | `Void` |

use tracing::debug;

use keel_ir::{FunctionId, TermId, TermKind};

use crate::rewrite::zero_or_undef;
use crate::{FunctionRunner, LoweredValue, LoweringError, ModuleRewriter, Rewriter};

// ---------------------------------------------------------------------------
// Passing mode enums
// ---------------------------------------------------------------------------

/// How a parameter is passed to the callee.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamPassing {
    /// Passed as its register lowering.
    Direct,
    /// Stored to memory and reloaded as the given output register type of
    /// the same size.
    Coerce(TermId),
    /// Passed as a byte pointer to a copy made by the caller.
    Indirect,
    /// Not passed at all; the callee sees an undefined value.
    Ignore,
}

/// How a return value is passed back to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReturnPassing {
    Direct,
    Coerce(TermId),
    /// Written through a hidden first parameter pointing at caller memory.
    Sret,
    /// Nothing is returned.
    Void,
}

impl From<ParamPassing> for ReturnPassing {
    fn from(passing: ParamPassing) -> Self {
        match passing {
            ParamPassing::Direct => ReturnPassing::Direct,
            ParamPassing::Coerce(ty) => ReturnPassing::Coerce(ty),
            ParamPassing::Indirect => ReturnPassing::Sret,
            ParamPassing::Ignore => ReturnPassing::Void,
        }
    }
}

// ---------------------------------------------------------------------------
// ABI descriptors
// ---------------------------------------------------------------------------

/// Physical ABI for a single parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamAbi {
    /// Source parameter type.
    pub ty: TermId,
    pub passing: ParamPassing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReturnAbi {
    /// Source result type.
    pub ty: TermId,
    pub passing: ReturnPassing,
}

/// Complete physical ABI for a source function type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionAbi {
    pub params: Vec<ParamAbi>,
    pub return_abi: ReturnAbi,
    /// Whether the source type already returns through an explicit sret
    /// parameter.
    pub source_sret: bool,
}

impl FunctionAbi {
    /// Whether the output function takes a hidden return pointer first.
    pub fn has_sret_param(&self) -> bool {
        self.return_abi.passing == ReturnPassing::Sret
    }
}

/// Per-target decision of how one parameter type is passed.
pub trait ParameterClassifier {
    fn parameter_passing<'a, R: Rewriter<'a> + ?Sized>(
        &self,
        rw: &mut R,
        ty: TermId,
    ) -> Result<ParamPassing, LoweringError>;
}

// ---------------------------------------------------------------------------
// ABI computation
// ---------------------------------------------------------------------------

/// Compute the ABI of source function type `fn_ty`.
///
/// A `Direct` decision for a type without a register lowering falls back
/// to `Indirect`.
pub fn compute_function_abi<'a, C, R>(
    classifier: &C,
    rw: &mut R,
    fn_ty: TermId,
) -> Result<FunctionAbi, LoweringError>
where
    C: ParameterClassifier + ?Sized,
    R: Rewriter<'a> + ?Sized,
{
    let TermKind::FunctionType {
        result,
        params,
        sret,
    } = rw.source_graph().kind(fn_ty).clone()
    else {
        return Err(LoweringError::internal("not a function type").at(fn_ty));
    };

    let mut param_abis = Vec::with_capacity(params.len());
    for ty in params {
        let passing = classify(classifier, rw, ty)?;
        param_abis.push(ParamAbi { ty, passing });
    }

    let passing = if sret {
        ReturnPassing::Void
    } else {
        classify(classifier, rw, result)?.into()
    };

    Ok(FunctionAbi {
        params: param_abis,
        return_abi: ReturnAbi {
            ty: result,
            passing,
        },
        source_sret: sret,
    })
}

fn classify<'a, C, R>(classifier: &C, rw: &mut R, ty: TermId) -> Result<ParamPassing, LoweringError>
where
    C: ParameterClassifier + ?Sized,
    R: Rewriter<'a> + ?Sized,
{
    let passing = classifier.parameter_passing(rw, ty)?;
    let passing = match passing {
        ParamPassing::Direct if !rw.rewrite_type(ty)?.is_register() => ParamPassing::Indirect,
        other => other,
    };
    debug!(?ty, ?passing, "classified parameter type");
    Ok(passing)
}

/// The output function type for `abi`.
fn lowered_function_type<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    abi: &FunctionAbi,
) -> Result<TermId, LoweringError> {
    let mut params = Vec::with_capacity(abi.params.len() + 1);
    if abi.has_sret_param() {
        params.push(TermId::BYTE_PTR);
    }
    for param in &abi.params {
        match param.passing {
            ParamPassing::Direct => params.push(register_type(rw, param.ty)?),
            ParamPassing::Coerce(ty) => params.push(ty),
            ParamPassing::Indirect => params.push(TermId::BYTE_PTR),
            ParamPassing::Ignore => {}
        }
    }
    let result = match abi.return_abi.passing {
        ReturnPassing::Direct => register_type(rw, abi.return_abi.ty)?,
        ReturnPassing::Coerce(ty) => ty,
        ReturnPassing::Sret | ReturnPassing::Void => TermId::EMPTY,
    };
    let sret = abi.source_sret || abi.has_sret_param();
    Ok(rw.output_graph().function_type(result, &params, sret)?)
}

fn register_type<'a, R: Rewriter<'a> + ?Sized>(
    rw: &mut R,
    ty: TermId,
) -> Result<TermId, LoweringError> {
    rw.rewrite_type(ty)?
        .register_type()
        .ok_or_else(|| LoweringError::internal("direct passing of a non-register type").at(ty))
}

// ---------------------------------------------------------------------------
// Driver entry points
// ---------------------------------------------------------------------------

/// Declare the output counterpart of source function `function`.
pub fn lower_function<C: ParameterClassifier + ?Sized>(
    classifier: &C,
    rewriter: &mut ModuleRewriter<'_>,
    function: FunctionId,
) -> Result<FunctionId, LoweringError> {
    let source = rewriter.source_module().function(function);
    let abi = compute_function_abi(classifier, rewriter, source.ty)?;
    let fn_ty = lowered_function_type(rewriter, &abi)?;
    let lowered = rewriter
        .output_mut()
        .declare_function(source.name.clone(), fn_ty)?;
    debug!(name = %source.name, sret = abi.has_sret_param(), "declared function");
    Ok(lowered)
}

/// Map every source parameter to a value built from the output
/// parameters, at the start of the entry block.
pub fn lower_function_entry<C: ParameterClassifier + ?Sized>(
    classifier: &C,
    runner: &mut FunctionRunner<'_, '_>,
) -> Result<(), LoweringError> {
    let source_ty = runner
        .source_module()
        .function(runner.source_function())
        .ty;
    let abi = compute_function_abi(classifier, runner, source_ty)?;
    let source_params = runner.source_params();
    let params = runner.params();
    let mut next = usize::from(abi.has_sret_param());

    for (&source_param, param) in source_params.iter().zip(&abi.params) {
        let lowered_ty = runner.rewrite_type(param.ty)?;
        let value = match param.passing {
            ParamPassing::Ignore => zero_or_undef(runner, param.ty, false)?,
            ParamPassing::Direct => {
                let value = output_param(&params, &mut next)?;
                LoweredValue::register(lowered_ty, false, value)
            }
            ParamPassing::Indirect => {
                let pointer = output_param(&params, &mut next)?;
                runner.load_value(&lowered_ty, pointer)?
            }
            ParamPassing::Coerce(ty) => {
                let value = output_param(&params, &mut next)?;
                let slot = runner.builder().alloca(ty, None, None)?;
                runner.builder().store(value, slot)?;
                let loaded = runner.load_value(&lowered_ty, slot)?;
                runner.builder().freea(slot)?;
                loaded
            }
        };
        runner.add_mapping(source_param, value);
    }
    Ok(())
}

fn output_param(params: &[TermId], next: &mut usize) -> Result<TermId, LoweringError> {
    let param = params
        .get(*next)
        .copied()
        .ok_or_else(|| LoweringError::internal("output function has too few parameters"))?;
    *next += 1;
    Ok(param)
}

/// Emit a call of source function pointer `target` with source arguments
/// `args`.
pub fn lower_function_call<C: ParameterClassifier + ?Sized>(
    classifier: &C,
    runner: &mut FunctionRunner<'_, '_>,
    target: TermId,
    args: &[TermId],
) -> Result<LoweredValue, LoweringError> {
    let fn_ty = runner
        .source_graph()
        .pointer_target(target)
        .ok_or_else(|| LoweringError::internal("call target is not a pointer").at(target))?;
    let abi = compute_function_abi(classifier, runner, fn_ty)?;
    let depth = runner.alloca_depth();
    let result_ty = runner.rewrite_type(abi.return_abi.ty)?;

    let mut lowered_args = Vec::with_capacity(args.len() + 1);
    let sret_slot = if abi.has_sret_param() {
        let slot = runner.alloca_type(&result_ty)?;
        lowered_args.push(runner.output_graph().pointer_cast(slot, TermId::BYTE, None)?);
        Some(slot)
    } else {
        None
    };

    for (&arg, param) in args.iter().zip(&abi.params) {
        let value = runner.rewrite_value(arg)?;
        match param.passing {
            ParamPassing::Ignore => {}
            ParamPassing::Direct => {
                let register = value.register_value().ok_or_else(|| {
                    LoweringError::internal("direct argument is not a register").at(arg)
                })?;
                lowered_args.push(register);
            }
            ParamPassing::Indirect => {
                let slot = runner.alloca_type(value.ty())?;
                runner.store_value(&value, slot)?;
                lowered_args.push(runner.output_graph().pointer_cast(slot, TermId::BYTE, None)?);
            }
            ParamPassing::Coerce(ty) => {
                let slot = runner.builder().alloca(ty, None, None)?;
                runner.store_value(&value, slot)?;
                lowered_args.push(runner.builder().load(slot)?);
                runner.builder().freea(slot)?;
            }
        }
    }

    let lowered_fn_ty = lowered_function_type(runner, &abi)?;
    let callee = runner.rewrite_value_register(target)?;
    let callee = runner
        .output_graph()
        .pointer_cast(callee.value, lowered_fn_ty, None)?;
    let call = runner.builder().call(callee, &lowered_args)?;

    let result = match abi.return_abi.passing {
        ReturnPassing::Sret => match sret_slot {
            Some(slot) => runner.load_value(&result_ty, slot)?,
            None => return Err(LoweringError::internal("sret call without a return slot")),
        },
        ReturnPassing::Coerce(ty) => {
            let slot = runner.builder().alloca(ty, None, None)?;
            runner.builder().store(call, slot)?;
            let loaded = runner.load_value(&result_ty, slot)?;
            runner.builder().freea(slot)?;
            loaded
        }
        ReturnPassing::Void => zero_or_undef(runner, abi.return_abi.ty, false)?,
        ReturnPassing::Direct => LoweredValue::register(result_ty, false, call),
    };
    runner.alloca_free_from(depth)?;
    Ok(result)
}

/// Emit the return of source value `value` from the current function.
pub fn lower_return<C: ParameterClassifier + ?Sized>(
    classifier: &C,
    runner: &mut FunctionRunner<'_, '_>,
    value: TermId,
) -> Result<(), LoweringError> {
    let source_ty = runner
        .source_module()
        .function(runner.source_function())
        .ty;
    let abi = compute_function_abi(classifier, runner, source_ty)?;

    match abi.return_abi.passing {
        ReturnPassing::Void => {
            runner.builder().ret_void()?;
        }
        ReturnPassing::Direct => {
            let value = runner.rewrite_value_register(value)?;
            runner.builder().ret(value.value)?;
        }
        ReturnPassing::Sret => {
            let value = runner.rewrite_value(value)?;
            let slot = runner
                .params()
                .first()
                .copied()
                .ok_or_else(|| LoweringError::internal("sret function without a return pointer"))?;
            runner.store_value(&value, slot)?;
            runner.builder().ret_void()?;
        }
        ReturnPassing::Coerce(ty) => {
            let value = runner.rewrite_value(value)?;
            let slot = runner.builder().alloca(ty, None, None)?;
            runner.store_value(&value, slot)?;
            let coerced = runner.builder().load(slot)?;
            runner.builder().freea(slot)?;
            runner.builder().ret(coerced)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
