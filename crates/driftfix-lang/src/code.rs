//! Bytecode code objects.
//!
//! A `CodeObject` holds instructions, a constant pool (which may nest
//! further code objects), a name table, and a compact line table. The
//! line table records an entry only when the source line changes;
//! lookup takes the nearest preceding entry, so every instruction maps
//! to the line of the statement it belongs to.

use std::path::PathBuf;
use std::rc::Rc;

// ============================================================================
// Instructions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Op {
    Nop,
    LoadConst,
    LoadName,
    StoreName,
    LoadAttr,
    StoreAttr,
    DeleteAttr,
    LoadIndex,
    StoreIndex,
    BuildList,
    ListAppend,
    MakeFunction,
    Call,
    CallKw,
    Jump,
    JumpIfFalse,
    JumpIfTrue,
    JumpIfFalseOrPop,
    JumpIfTrueOrPop,
    GetIter,
    ForIter,
    BinaryOp,
    UnaryOp,
    Return,
    Pop,
    AssertFail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instr {
    pub op: Op,
    pub arg: u32,
}

// ============================================================================
// Constants
// ============================================================================

/// Compile-time constant. The pool is deduplicated by full structural
/// equality; nested code objects compare line tables too, so two
/// functions are one constant only when their positions also agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Const {
    Nil,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Keyword-argument name list for `CallKw`.
    Names(Vec<String>),
    Code(Rc<CodeObject>),
}

// ============================================================================
// Code Objects
// ============================================================================

/// Instruction-stream identity: opcode, raw argument, and line for
/// every instruction. Used as the cache key that ties a live frame's
/// code back to a correlated compile of the same source.
pub type Fingerprint = Vec<(u16, u32, u32)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeObject {
    pub name: String,
    pub file: PathBuf,
    pub params: Vec<String>,
    pub instrs: Vec<Instr>,
    pub consts: Vec<Const>,
    pub names: Vec<String>,
    /// `(instruction offset, line)` entries, offset-ascending, recorded
    /// only when the line changes.
    pub lines: Vec<(u32, u32)>,
}

impl CodeObject {
    /// Line for the instruction at `offset`: the nearest preceding
    /// line-table entry.
    pub fn line_at(&self, offset: usize) -> Option<u32> {
        let mut line = None;
        for &(entry_offset, entry_line) in &self.lines {
            if entry_offset as usize > offset {
                break;
            }
            line = Some(entry_line);
        }
        line
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.instrs
            .iter()
            .enumerate()
            .map(|(offset, instr)| {
                (
                    instr.op as u16,
                    instr.arg,
                    self.line_at(offset).unwrap_or(0),
                )
            })
            .collect()
    }

    /// Nested code objects in pool order.
    pub fn code_consts(&self) -> Vec<Rc<CodeObject>> {
        self.consts
            .iter()
            .filter_map(|c| match c {
                Const::Code(code) => Some(Rc::clone(code)),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
