//! Instruction builder.
//!
//! `FunctionBuilder` wraps a module and a function and appends instructions
//! at the end of the current block. Value construction goes straight to the
//! module's graph through [`FunctionBuilder::graph`].

use crate::{BlockId, FunctionId, Graph, InstKind, IrError, Module, TermId, TermList};

/// Appends instructions to the blocks of one function.
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    function: FunctionId,
    current_block: Option<BlockId>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn new(module: &'m mut Module, function: FunctionId) -> Self {
        FunctionBuilder {
            module,
            function,
            current_block: None,
        }
    }

    #[inline]
    pub fn function(&self) -> FunctionId {
        self.function
    }

    pub fn module(&self) -> &Module {
        self.module
    }

    pub fn module_mut(&mut self) -> &mut Module {
        self.module
    }

    pub fn graph(&mut self) -> &mut Graph {
        &mut self.module.graph
    }

    // -- Block management --

    /// Append a new block to the function.
    pub fn new_block(&mut self) -> BlockId {
        self.module.add_block(self.function)
    }

    /// Position the builder at the end of `block`.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.current_block = Some(block);
    }

    #[inline]
    pub fn current_block(&self) -> Option<BlockId> {
        self.current_block
    }

    /// Check if the current block already ends in a terminator.
    pub fn current_block_terminated(&self) -> bool {
        self.current_block.is_some_and(|block| {
            self.module
                .function(self.function)
                .block(block)
                .terminator()
                .is_some()
        })
    }

    /// Append `kind` to the current block.
    pub fn emit(&mut self, kind: InstKind) -> Result<TermId, IrError> {
        let block = self.current_block.ok_or(IrError::NoInsertPoint)?;
        self.module.push_instruction(self.function, block, kind)
    }

    // -- Memory --

    pub fn alloca(
        &mut self,
        element_type: TermId,
        count: Option<TermId>,
        alignment: Option<TermId>,
    ) -> Result<TermId, IrError> {
        self.emit(InstKind::Alloca {
            element_type,
            count,
            alignment,
        })
    }

    pub fn alloca_const(&mut self, value: TermId) -> Result<TermId, IrError> {
        self.emit(InstKind::AllocaConst(value))
    }

    pub fn freea(&mut self, pointer: TermId) -> Result<TermId, IrError> {
        self.emit(InstKind::FreeAlloca(pointer))
    }

    pub fn load(&mut self, pointer: TermId) -> Result<TermId, IrError> {
        self.emit(InstKind::Load(pointer))
    }

    pub fn store(&mut self, value: TermId, pointer: TermId) -> Result<TermId, IrError> {
        self.emit(InstKind::Store { value, pointer })
    }

    pub fn memcpy(
        &mut self,
        dest: TermId,
        src: TermId,
        count: TermId,
        alignment: TermId,
    ) -> Result<TermId, IrError> {
        self.emit(InstKind::MemCpy {
            dest,
            src,
            count,
            alignment,
        })
    }

    pub fn memzero(
        &mut self,
        dest: TermId,
        count: TermId,
        alignment: TermId,
    ) -> Result<TermId, IrError> {
        self.emit(InstKind::MemZero {
            dest,
            count,
            alignment,
        })
    }

    // -- Calls and control flow --

    pub fn call(&mut self, target: TermId, args: &[TermId]) -> Result<TermId, IrError> {
        self.emit(InstKind::Call {
            target,
            args: TermList::from_slice(args),
        })
    }

    pub fn ret(&mut self, value: TermId) -> Result<TermId, IrError> {
        self.emit(InstKind::Return(value))
    }

    pub fn ret_void(&mut self) -> Result<TermId, IrError> {
        self.ret(TermId::EMPTY_VALUE)
    }

    pub fn br(&mut self, target: BlockId) -> Result<TermId, IrError> {
        self.emit(InstKind::Br(target))
    }

    pub fn cond_br(
        &mut self,
        condition: TermId,
        if_true: BlockId,
        if_false: BlockId,
    ) -> Result<TermId, IrError> {
        self.emit(InstKind::CondBr {
            condition,
            if_true,
            if_false,
        })
    }

    pub fn unreachable(&mut self) -> Result<TermId, IrError> {
        self.emit(InstKind::Unreachable)
    }

    pub fn eval(&mut self, value: TermId) -> Result<TermId, IrError> {
        self.emit(InstKind::Eval(value))
    }

    pub fn solidify(&mut self, value: TermId) -> Result<TermId, IrError> {
        self.emit(InstKind::Solidify(value))
    }
}
