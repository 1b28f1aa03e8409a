//! Modules, functions, blocks and instructions.
//!
//! A [`Module`] owns one [`Graph`] shared by all of its functions and
//! globals. Instructions live in basic blocks; each instruction's result is
//! an `InstructionResult` term, so instruction results can be used as
//! operands of other terms like any other value.

use crate::{BlockId, FunctionId, GlobalId, Graph, IrError, TermId, TermKind, TermList};

// ── Instructions ────────────────────────────────────────────────────

/// The operation performed by an instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    // === Terminators ===
    /// Return `value` (the empty value for `void`).
    Return(TermId),
    Br(BlockId),
    CondBr {
        condition: TermId,
        if_true: BlockId,
        if_false: BlockId,
    },
    Unreachable,

    // === Calls ===
    Call {
        target: TermId,
        args: TermList,
    },

    // === Stack memory ===
    /// Stack allocation of `count` elements (default 1).
    Alloca {
        element_type: TermId,
        count: Option<TermId>,
        alignment: Option<TermId>,
    },
    /// Stack allocation initialised with a constant value.
    AllocaConst(TermId),
    /// Free the allocation and everything allocated after it.
    FreeAlloca(TermId),

    // === Memory access ===
    Load(TermId),
    Store {
        value: TermId,
        pointer: TermId,
    },
    MemCpy {
        dest: TermId,
        src: TermId,
        count: TermId,
        alignment: TermId,
    },
    MemZero {
        dest: TermId,
        count: TermId,
        alignment: TermId,
    },

    // === Miscellaneous ===
    /// Force evaluation of a value.
    Eval(TermId),
    /// Fix the value of a constant type for the rest of the function.
    Solidify(TermId),
}

impl InstKind {
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Return(_) | InstKind::Br(_) | InstKind::CondBr { .. } | InstKind::Unreachable
        )
    }

    /// Value operands, in order.
    pub fn operands(&self) -> TermList {
        let mut out = TermList::new();
        match self {
            InstKind::Br(_) | InstKind::Unreachable => {}
            InstKind::Return(value)
            | InstKind::AllocaConst(value)
            | InstKind::FreeAlloca(value)
            | InstKind::Load(value)
            | InstKind::Eval(value)
            | InstKind::Solidify(value) => out.push(*value),
            InstKind::CondBr { condition, .. } => out.push(*condition),
            InstKind::Call { target, args } => {
                out.push(*target);
                out.extend(args.iter().copied());
            }
            InstKind::Alloca {
                element_type,
                count,
                alignment,
            } => {
                out.push(*element_type);
                out.extend(count.iter().copied());
                out.extend(alignment.iter().copied());
            }
            InstKind::Store { value, pointer } => out.extend([*value, *pointer]),
            InstKind::MemCpy {
                dest,
                src,
                count,
                alignment,
            } => out.extend([*dest, *src, *count, *alignment]),
            InstKind::MemZero {
                dest,
                count,
                alignment,
            } => out.extend([*dest, *count, *alignment]),
        }
        out
    }

    /// Successor blocks of a terminator.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            InstKind::Br(target) => vec![*target],
            InstKind::CondBr {
                if_true, if_false, ..
            } => vec![*if_true, *if_false],
            _ => Vec::new(),
        }
    }
}

/// A single instruction and the term naming its result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub value: TermId,
    pub kind: InstKind,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub instructions: Vec<Instruction>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.kind.is_terminator())
    }
}

// ── Functions and globals ───────────────────────────────────────────

/// A function definition or declaration.
#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    /// The `FunctionType` term.
    pub ty: TermId,
    /// One `Parameter` term per parameter.
    pub params: Vec<TermId>,
    /// Basic blocks; the first is the entry block. Empty for declarations.
    pub blocks: Vec<Block>,
    /// The `FunctionRef` term (a pointer to this function).
    pub reference: TermId,
    next_result: u32,
}

impl Function {
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn entry(&self) -> Option<BlockId> {
        (!self.blocks.is_empty()).then_some(BlockId::new(0))
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Block ids in layout order.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "block count is bounded by u32 ids"
    )]
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        let len = self.blocks.len() as u32;
        (0..len).map(BlockId::new)
    }

    /// Successors of `id`, read off its terminator.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        self.block(id)
            .terminator()
            .map(|terminator| terminator.kind.successors())
            .unwrap_or_default()
    }

    /// Block ids in reverse postorder from the entry, so every block comes
    /// after its dominators. Blocks unreachable from the entry follow in
    /// layout order.
    ///
    /// Iterative DFS with an explicit stack, so deep CFGs do not recurse.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let num_blocks = self.blocks.len();
        let mut visited = vec![false; num_blocks];
        let mut postorder = Vec::with_capacity(num_blocks);

        // (block, successors pushed)
        let mut stack: Vec<(BlockId, bool)> = self.entry().into_iter().map(|e| (e, false)).collect();
        while let Some(&mut (block, ref mut children_done)) = stack.last_mut() {
            if *children_done {
                postorder.push(block);
                stack.pop();
                continue;
            }
            *children_done = true;
            if block.index() >= num_blocks || visited[block.index()] {
                stack.pop();
                continue;
            }
            visited[block.index()] = true;
            for successor in self.successors(block).into_iter().rev() {
                if successor.index() < num_blocks && !visited[successor.index()] {
                    stack.push((successor, false));
                }
            }
        }

        postorder.reverse();
        postorder.extend(self.block_ids().filter(|id| !visited[id.index()]));
        postorder
    }
}

#[derive(Clone, Debug)]
pub struct GlobalVariable {
    pub name: String,
    /// Type of the stored value.
    pub ty: TermId,
    /// Initializer, if any.
    pub value: Option<TermId>,
    pub constant: bool,
    pub alignment: Option<TermId>,
    /// The `GlobalRef` term (a pointer to the storage).
    pub reference: TermId,
}

// ── Module ──────────────────────────────────────────────────────────

/// A compilation unit: one term graph plus the functions and globals
/// defined over it.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: String,
    pub graph: Graph,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVariable>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_graph(name, Graph::new())
    }

    /// Create an empty module over an existing graph.
    pub fn with_graph(name: impl Into<String>, graph: Graph) -> Self {
        Module {
            name: name.into(),
            graph,
            functions: Vec::new(),
            globals: Vec::new(),
        }
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    pub fn global(&self, id: GlobalId) -> &GlobalVariable {
        &self.globals[id.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FunctionId> {
        self.function_ids().find(|&id| self.function(id).name == name)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "function count is bounded by u32 ids"
    )]
    pub fn function_ids(&self) -> impl Iterator<Item = FunctionId> {
        let len = self.functions.len() as u32;
        (0..len).map(FunctionId::new)
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "global count is bounded by u32 ids"
    )]
    pub fn global_ids(&self) -> impl Iterator<Item = GlobalId> {
        let len = self.globals.len() as u32;
        (0..len).map(GlobalId::new)
    }

    /// Declare a function of type `ty` (a `FunctionType` term).
    ///
    /// The function has no blocks until [`Module::add_block`] is called.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "function and parameter counts are bounded by u32 ids"
    )]
    pub fn declare_function(
        &mut self,
        name: impl Into<String>,
        ty: TermId,
    ) -> Result<FunctionId, IrError> {
        let TermKind::FunctionType { params, .. } = self.graph.kind(ty).clone() else {
            return Err(IrError::NotAFunction(ty));
        };
        let id = FunctionId::new(self.functions.len() as u32);
        let mut param_terms = Vec::with_capacity(params.len());
        for (index, &param_ty) in params.iter().enumerate() {
            let kind = TermKind::Parameter {
                function: id,
                index: index as u32,
            };
            param_terms.push(self.graph.intern_typed(kind, param_ty)?);
        }
        let pointer_ty = self.graph.pointer_type(ty)?;
        let reference = self.graph.intern_typed(TermKind::FunctionRef(id), pointer_ty)?;
        self.functions.push(Function {
            name: name.into(),
            ty,
            params: param_terms,
            blocks: Vec::new(),
            reference,
            next_result: 0,
        });
        Ok(id)
    }

    /// Declare a global variable holding a value of type `ty`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "global count is bounded by u32 ids"
    )]
    pub fn declare_global(
        &mut self,
        name: impl Into<String>,
        ty: TermId,
        constant: bool,
    ) -> Result<GlobalId, IrError> {
        let id = GlobalId::new(self.globals.len() as u32);
        let pointer_ty = self.graph.pointer_type(ty)?;
        let reference = self.graph.intern_typed(TermKind::GlobalRef(id), pointer_ty)?;
        self.globals.push(GlobalVariable {
            name: name.into(),
            ty,
            value: None,
            constant,
            alignment: None,
            reference,
        });
        Ok(id)
    }

    /// Install the initializer of a global; it must have the global's type.
    pub fn set_global_value(&mut self, id: GlobalId, value: TermId) -> Result<(), IrError> {
        let global = &mut self.globals[id.index()];
        let found = self.graph.type_of(value);
        if found != global.ty {
            return Err(IrError::TypeMismatch {
                expected: global.ty,
                found,
            });
        }
        global.value = Some(value);
        Ok(())
    }

    pub fn set_global_alignment(&mut self, id: GlobalId, alignment: TermId) {
        self.globals[id.index()].alignment = Some(alignment);
    }

    /// Append an empty block to `function`.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "block count is bounded by u32 ids"
    )]
    pub fn add_block(&mut self, function: FunctionId) -> BlockId {
        let blocks = &mut self.functions[function.index()].blocks;
        let id = BlockId::new(blocks.len() as u32);
        blocks.push(Block::default());
        id
    }

    /// Append an instruction to a block and return its result term.
    ///
    /// The result type follows from the instruction: calls yield the
    /// callee's result, allocas yield a pointer, loads yield the pointee.
    /// Everything else yields the empty type.
    pub fn push_instruction(
        &mut self,
        function: FunctionId,
        block: BlockId,
        kind: InstKind,
    ) -> Result<TermId, IrError> {
        if self.functions[function.index()].blocks[block.index()]
            .terminator()
            .is_some()
        {
            return Err(IrError::BlockTerminated(block));
        }
        let ty = self.instruction_type(&kind)?;
        let func = &mut self.functions[function.index()];
        let index = func.next_result;
        func.next_result += 1;
        let value = self
            .graph
            .intern_typed(TermKind::InstructionResult { function, index }, ty)?;
        self.functions[function.index()].blocks[block.index()]
            .instructions
            .push(Instruction { value, kind });
        Ok(value)
    }

    fn instruction_type(&mut self, kind: &InstKind) -> Result<TermId, IrError> {
        let graph = &mut self.graph;
        match kind {
            InstKind::Call { target, args } => {
                let fn_ty = graph
                    .pointer_target(*target)
                    .ok_or(IrError::NotAFunction(*target))?;
                let TermKind::FunctionType { result, params, .. } = graph.kind(fn_ty) else {
                    return Err(IrError::NotAFunction(*target));
                };
                if params.len() != args.len() {
                    return Err(IrError::ArgumentCount {
                        expected: params.len(),
                        found: args.len(),
                    });
                }
                for (&param, &arg) in params.iter().zip(args) {
                    let found = graph.type_of(arg);
                    if found != param {
                        return Err(IrError::TypeMismatch {
                            expected: param,
                            found,
                        });
                    }
                }
                Ok(*result)
            }
            InstKind::Alloca { element_type, .. } => graph.pointer_type(*element_type),
            InstKind::AllocaConst(value) => {
                let ty = graph.type_of(*value);
                graph.pointer_type(ty)
            }
            InstKind::Load(pointer) => graph
                .pointer_target(*pointer)
                .ok_or(IrError::NotAPointer(*pointer)),
            InstKind::Store { value, pointer } => {
                let target = graph
                    .pointer_target(*pointer)
                    .ok_or(IrError::NotAPointer(*pointer))?;
                let found = graph.type_of(*value);
                if found != target {
                    return Err(IrError::TypeMismatch {
                        expected: target,
                        found,
                    });
                }
                Ok(TermId::EMPTY)
            }
            InstKind::MemCpy { dest, src, .. } => {
                for pointer in [dest, src] {
                    graph
                        .pointer_target(*pointer)
                        .ok_or(IrError::NotAPointer(*pointer))?;
                }
                Ok(TermId::EMPTY)
            }
            InstKind::MemZero { dest, .. } | InstKind::FreeAlloca(dest) => {
                graph
                    .pointer_target(*dest)
                    .ok_or(IrError::NotAPointer(*dest))?;
                Ok(TermId::EMPTY)
            }
            InstKind::Solidify(value) => match graph.kind(graph.type_of(*value)) {
                TermKind::ConstantType(_) => Ok(TermId::EMPTY),
                _ => Err(IrError::NotAConstant(*value)),
            },
            InstKind::CondBr { condition, .. } => {
                let found = graph.type_of(*condition);
                if found != TermId::BOOL {
                    return Err(IrError::TypeMismatch {
                        expected: TermId::BOOL,
                        found,
                    });
                }
                Ok(TermId::EMPTY)
            }
            InstKind::Return(_)
            | InstKind::Br(_)
            | InstKind::Unreachable
            | InstKind::Eval(_) => Ok(TermId::EMPTY),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests panic on unexpected construction errors"
)]
mod tests;
