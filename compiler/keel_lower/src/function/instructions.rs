//! Instruction lowering rules.

use keel_ir::{InstKind, Instruction, TermId, TermKind};

use super::FunctionRunner;
use crate::rewrite::size_register;
use crate::{LoweredValue, LoweringError, Rewriter};

impl FunctionRunner<'_, '_> {
    pub(super) fn lower_instruction(
        &mut self,
        instruction: &Instruction,
    ) -> Result<(), LoweringError> {
        let result = instruction.value;
        let lowered = match &instruction.kind {
            InstKind::Return(value) => {
                self.alloca_free(None)?;
                let target = self.target();
                target.lower_return(self, *value)?;
                None
            }
            InstKind::Br(block) => {
                let blocks = self.prepare_jump(&[*block])?;
                self.builder().br(blocks[0])?;
                None
            }
            InstKind::CondBr {
                condition,
                if_true,
                if_false,
            } => {
                let condition = self.rewrite_value_register(*condition)?;
                let blocks = self.prepare_jump(&[*if_true, *if_false])?;
                self.builder().cond_br(condition.value, blocks[0], blocks[1])?;
                None
            }
            InstKind::Unreachable => {
                self.builder().unreachable()?;
                None
            }
            InstKind::Call { target, args } => {
                let callbacks = self.target();
                Some(callbacks.lower_function_call(self, *target, args)?)
            }
            InstKind::Alloca {
                element_type,
                count,
                alignment,
            } => Some(self.lower_alloca(result, *element_type, *count, *alignment)?),
            InstKind::AllocaConst(value) => {
                let value = self.rewrite_value_register(*value)?;
                let pointer = self.builder().alloca_const(value.value)?;
                self.push_alloca(pointer);
                Some(self.byte_pointer_result(result, pointer)?)
            }
            InstKind::FreeAlloca(pointer) => {
                let pointer = self.rewrite_value_register(*pointer)?;
                let allocation = self.allocation_pointer(pointer.value);
                self.alloca_free(Some(allocation))?;
                None
            }
            InstKind::Load(pointer) => {
                let ty = self.source_graph().type_of(result);
                let ty = self.rewrite_type(ty)?;
                let pointer = self.rewrite_value_register(*pointer)?;
                Some(self.load_value(&ty, pointer.value)?)
            }
            InstKind::Store { value, pointer } => {
                let value = self.rewrite_value(*value)?;
                let pointer = self.rewrite_value_register(*pointer)?;
                self.store_value(&value, pointer.value)?;
                None
            }
            InstKind::MemCpy {
                dest,
                src,
                count,
                alignment,
            } => {
                self.lower_memory_op(*dest, Some(*src), *count, *alignment)?;
                None
            }
            InstKind::MemZero {
                dest,
                count,
                alignment,
            } => {
                self.lower_memory_op(*dest, None, *count, *alignment)?;
                None
            }
            InstKind::Eval(value) => {
                let value = self.rewrite_value(*value)?;
                self.eval_value(&value)?;
                None
            }
            InstKind::Solidify(value) => {
                self.lower_solidify(*value)?;
                None
            }
        };

        let lowered = match lowered {
            Some(lowered) => lowered,
            None => LoweredValue::empty(self.rewrite_type(TermId::EMPTY)?),
        };
        self.add_mapping(result, lowered);
        Ok(())
    }

    fn lower_alloca(
        &mut self,
        result: TermId,
        element_type: TermId,
        count: Option<TermId>,
        alignment: Option<TermId>,
    ) -> Result<LoweredValue, LoweringError> {
        let element = self.rewrite_type(element_type)?;
        let count = count.map(|count| size_register(self, count)).transpose()?;
        let alignment = alignment
            .map(|alignment| size_register(self, alignment))
            .transpose()?;

        let pointer = if let Some(register_type) = element.register_type() {
            self.builder().alloca(
                register_type,
                count.map(|count| count.value),
                alignment.map(|alignment| alignment.value),
            )?
        } else {
            let output = self.output_graph();
            let size = match count {
                Some(count) => output.mul(count.value, element.size())?,
                None => element.size(),
            };
            let alignment = match alignment {
                Some(alignment) => output.max(alignment.value, element.alignment())?,
                None => element.alignment(),
            };
            self.builder()
                .alloca(TermId::BYTE, Some(size), Some(alignment))?
        };
        self.push_alloca(pointer);
        self.byte_pointer_result(result, pointer)
    }

    /// The lowering of a pointer-typed instruction result held in `pointer`.
    fn byte_pointer_result(
        &mut self,
        result: TermId,
        pointer: TermId,
    ) -> Result<LoweredValue, LoweringError> {
        let ty = self.source_graph().type_of(result);
        let ty = self.rewrite_type(ty)?;
        let value = self.output_graph().pointer_cast(pointer, TermId::BYTE, None)?;
        Ok(LoweredValue::register(ty, false, value))
    }

    /// `memcpy` when `src` is given, `memzero` otherwise.
    fn lower_memory_op(
        &mut self,
        dest: TermId,
        src: Option<TermId>,
        count: TermId,
        alignment: TermId,
    ) -> Result<(), LoweringError> {
        let element_type = self.source_graph().pointer_target(dest).ok_or_else(|| {
            LoweringError::internal("memory operation on a non-pointer").at(dest)
        })?;
        let element = self.rewrite_type(element_type)?;
        let dest = self.rewrite_value_register(dest)?.value;
        let src = src
            .map(|src| self.rewrite_value_register(src))
            .transpose()?
            .map(|src| src.value);
        let count = size_register(self, count)?.value;
        let alignment = size_register(self, alignment)?.value;
        let to_bytes = self.config().memcpy_to_bytes;

        let output = self.output_graph();
        let (pointee, count, alignment) = match element.register_type() {
            Some(register_type) if !to_bytes => (register_type, count, alignment),
            _ => {
                let bytes = output.mul(count, element.size())?;
                let alignment = output.max(alignment, element.alignment())?;
                (TermId::BYTE, bytes, alignment)
            }
        };
        let dest = output.pointer_cast(dest, pointee, None)?;
        let src = src
            .map(|src| output.pointer_cast(src, pointee, None))
            .transpose()?;

        let mut builder = self.builder();
        match src {
            Some(src) => builder.memcpy(dest, src, count, alignment)?,
            None => builder.memzero(dest, count, alignment)?,
        };
        Ok(())
    }

    /// Fix the value of a constant type: uses of the constant later in
    /// this function lower to the solidified value.
    fn lower_solidify(&mut self, value: TermId) -> Result<(), LoweringError> {
        let ty = self.source_graph().type_of(value);
        let TermKind::ConstantType(constant) = *self.source_graph().kind(ty) else {
            return Err(
                LoweringError::internal("solidify of a value without a constant type").at(value),
            );
        };
        let lowered = self.rewrite_value(value)?;
        self.solidified = true;
        self.add_mapping(constant, lowered);
        Ok(())
    }
}
