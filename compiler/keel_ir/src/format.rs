//! Textual dump of terms and modules.
//!
//! The output is meant for humans reading `tracing` logs and test failure
//! messages, not for parsing back.

use std::fmt;

use crate::{Graph, InstKind, Instruction, IntWidth, Module, TermId, TermKind};

/// Display adapter returned by [`Graph::display`].
pub struct TermDisplay<'g> {
    graph: &'g Graph,
    term: TermId,
}

impl Graph {
    /// Render `term` and its operands as text.
    pub fn display(&self, term: TermId) -> TermDisplay<'_> {
        TermDisplay { graph: self, term }
    }
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_term(f, self.graph, self.term)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, graph: &Graph, terms: &[TermId]) -> fmt::Result {
    for (i, &term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_term(f, graph, term)?;
    }
    Ok(())
}

fn write_call(
    f: &mut fmt::Formatter<'_>,
    graph: &Graph,
    name: &str,
    operands: &[TermId],
) -> fmt::Result {
    write!(f, "{name}(")?;
    write_list(f, graph, operands)?;
    f.write_str(")")
}

fn write_term(f: &mut fmt::Formatter<'_>, graph: &Graph, term: TermId) -> fmt::Result {
    match graph.kind(term) {
        TermKind::Metatype => f.write_str("type"),
        TermKind::Empty => f.write_str("empty"),
        TermKind::Block => f.write_str("block"),
        TermKind::Bool => f.write_str("bool"),
        TermKind::Byte => f.write_str("byte"),
        TermKind::Int { width, signed } => {
            write!(f, "{}{}", if *signed { "i" } else { "u" }, width.name())
        }
        TermKind::Float(width) => f.write_str(width.name()),
        TermKind::Pointer { target, .. } => {
            f.write_str("*")?;
            write_term(f, graph, *target)
        }
        TermKind::Array { element, length } => {
            f.write_str("[")?;
            write_term(f, graph, *element)?;
            f.write_str("; ")?;
            write_term(f, graph, *length)?;
            f.write_str("]")
        }
        TermKind::Struct(members) => {
            f.write_str("struct {")?;
            write_list(f, graph, members)?;
            f.write_str("}")
        }
        TermKind::Union(members) => {
            f.write_str("union {")?;
            write_list(f, graph, members)?;
            f.write_str("}")
        }
        TermKind::Apply { recursive, args } => {
            write!(f, "{}<", graph.recursive(*recursive).name)?;
            write_list(f, graph, args)?;
            f.write_str(">")
        }
        TermKind::FunctionType {
            result,
            params,
            sret,
        } => {
            f.write_str("fn(")?;
            write_list(f, graph, params)?;
            f.write_str(") -> ")?;
            write_term(f, graph, *result)?;
            if *sret {
                f.write_str(" sret")?;
            }
            Ok(())
        }
        TermKind::UpwardReferenceType => f.write_str("upref"),
        TermKind::MetatypeValue { size, alignment } => {
            write_call(f, graph, "metatype", &[*size, *alignment])
        }
        TermKind::ConstantType(value) => write_call(f, graph, "constant", &[*value]),
        TermKind::RecursiveParameter { recursive, index } => {
            write!(f, "%{}.{index}", graph.recursive(*recursive).name)
        }

        TermKind::IntValue {
            width,
            signed,
            bits,
        } => {
            if *signed {
                write!(f, "{}", width.sign_extend(*bits))?;
            } else {
                write!(f, "{bits}")?;
            }
            match width {
                IntWidth::IPtr if !*signed => Ok(()),
                _ => write!(f, "{}{}", if *signed { "i" } else { "u" }, width.name()),
            }
        }
        TermKind::BoolValue(value) => write!(f, "{value}"),
        TermKind::FloatValue { width, bits } => write!(f, "{}({bits:#x})", width.name()),
        TermKind::EmptyValue => f.write_str("()"),
        TermKind::Undef(ty) => write_call(f, graph, "undef", &[*ty]),
        TermKind::Zero(ty) => write_call(f, graph, "zero", &[*ty]),
        TermKind::StructValue(members) => {
            f.write_str("{")?;
            write_list(f, graph, members)?;
            f.write_str("}")
        }
        TermKind::ArrayValue { elements, .. } => {
            f.write_str("[")?;
            write_list(f, graph, elements)?;
            f.write_str("]")
        }
        TermKind::Binary { op, lhs, rhs } => write_call(f, graph, op.name(), &[*lhs, *rhs]),
        TermKind::FunctionRef(id) => write!(f, "@{id:?}"),
        TermKind::GlobalRef(id) => write!(f, "@{id:?}"),
        TermKind::Parameter { function, index } => write!(f, "%{function:?}.p{index}"),
        TermKind::InstructionResult { function, index } => write!(f, "%{function:?}.r{index}"),
        kind => write_call(f, graph, kind_name(kind), &kind.operands()),
    }
}

fn kind_name(kind: &TermKind) -> &'static str {
    match kind {
        TermKind::UnionValue { .. } => "union_value",
        TermKind::ApplyValue { .. } => "apply_value",
        TermKind::ElementValue { .. } => "element",
        TermKind::ElementPtr { .. } => "element_ptr",
        TermKind::StructElementOffset { .. } => "struct_element_offset",
        TermKind::UpwardReference { .. } => "upref",
        TermKind::OuterPtr(_) => "outer_ptr",
        TermKind::PointerOffset { .. } => "pointer_offset",
        TermKind::PointerCast { .. } => "pointer_cast",
        TermKind::MetatypeSize(_) => "sizeof",
        TermKind::MetatypeAlignment(_) => "alignof",
        TermKind::Select { .. } => "select",
        TermKind::Neg(_) => "neg",
        TermKind::BitCast { .. } => "bitcast",
        _ => "term",
    }
}

// ── Modules ─────────────────────────────────────────────────────────

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        let graph = &self.graph;
        for global in &self.globals {
            let keyword = if global.constant { "const" } else { "global" };
            write!(f, "\n{keyword} {}: {}", global.name, graph.display(global.ty))?;
            if let Some(value) = global.value {
                write!(f, " = {}", graph.display(value))?;
            }
            writeln!(f, ";")?;
        }
        for function in &self.functions {
            write!(f, "\nfn {}: {}", function.name, graph.display(function.ty))?;
            if function.is_declaration() {
                writeln!(f, ";")?;
                continue;
            }
            writeln!(f, " {{")?;
            for (id, block) in function.block_ids().zip(&function.blocks) {
                writeln!(f, "{id:?}:")?;
                for instruction in &block.instructions {
                    write_instruction(f, graph, instruction)?;
                }
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }
}

fn write_instruction(
    f: &mut fmt::Formatter<'_>,
    graph: &Graph,
    instruction: &Instruction,
) -> fmt::Result {
    let value = instruction.value;
    let name = match &instruction.kind {
        InstKind::Return(_) => "return",
        InstKind::Br(target) => return writeln!(f, "  br {target:?}"),
        InstKind::CondBr {
            condition,
            if_true,
            if_false,
        } => {
            return writeln!(
                f,
                "  cond_br {}, {if_true:?}, {if_false:?}",
                graph.display(*condition)
            )
        }
        InstKind::Unreachable => "unreachable",
        InstKind::Call { .. } => "call",
        InstKind::Alloca { .. } => "alloca",
        InstKind::AllocaConst(_) => "alloca_const",
        InstKind::FreeAlloca(_) => "freea",
        InstKind::Load(_) => "load",
        InstKind::Store { .. } => "store",
        InstKind::MemCpy { .. } => "memcpy",
        InstKind::MemZero { .. } => "memzero",
        InstKind::Eval(_) => "eval",
        InstKind::Solidify(_) => "solidify",
    };
    if graph.type_of(value) == TermId::EMPTY {
        write!(f, "  {name}")?;
    } else {
        write!(f, "  {} = {name}", graph.display(value))?;
    }
    for (i, operand) in instruction.kind.operands().into_iter().enumerate() {
        let sep = if i == 0 { " " } else { ", " };
        write!(f, "{sep}{}", graph.display(operand))?;
    }
    writeln!(f)
}
