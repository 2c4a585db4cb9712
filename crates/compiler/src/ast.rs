//! Lowered parse tree handed to the code generator.
//!
//! One discriminated node type; every walk (folding, validation, dump) is
//! an exhaustive match. Nodes reference symbols by `SymbolId` only; the
//! arena in `ProgramDef` owns them.

use std::path::PathBuf;

use crate::symbol::{BaseType, FullType, SymbolArena, SymbolId, SymbolMap};
use crate::variant::Variant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Modulo,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    Eqv,
    Neqv,
    In,
}

impl BinaryOp {
    /// Source spelling, for diagnostics and the tree dump.
    pub fn listing(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IntDiv => "DIV",
            BinaryOp::Modulo => "MOD",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "+",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::Eqv => "EQV",
            BinaryOp::Neqv => "NEQV",
            BinaryOp::In => "IN",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    /// Operators that take integer operands (floats accepted by
    /// truncation) and yield Integer.
    pub fn is_integer_op(self) -> bool {
        matches!(
            self,
            BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::Eqv
                | BinaryOp::Neqv
                | BinaryOp::IntDiv
                | BinaryOp::Modulo
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// One argument in a call; `by_ref` follows the callee's parameter
/// linkage.
#[derive(Debug, Clone)]
pub struct Argument {
    pub node: ParseNode,
    pub by_ref: bool,
}

/// Substring selector `s$(start:end)`; omitted ends default to 1 and the
/// string length.
#[derive(Debug, Clone)]
pub struct Substring {
    pub start: Option<Box<ParseNode>>,
    pub end: Option<Box<ParseNode>>,
}

#[derive(Debug, Clone)]
pub struct Branch {
    /// `None` marks the ELSE / OTHERWISE branch.
    pub test: Option<ParseNode>,
    pub body: Vec<ParseNode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    For,
    While,
    Repeat,
    /// LOOP..ENDLOOP; the body must leave through EXIT.
    Forever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputTerminator {
    Newline,
    NextZone,
    None,
}

#[derive(Debug, Clone)]
pub struct InputPosition {
    pub row: Box<ParseNode>,
    pub col: Box<ParseNode>,
    pub width: Option<Box<ParseNode>>,
}

#[derive(Debug, Clone)]
pub enum ParseNode {
    Number(Variant),
    Str(String),
    Identifier {
        sym: SymbolId,
        indexes: Vec<ParseNode>,
        substring: Option<Substring>,
    },
    Binary {
        op: BinaryOp,
        ty: FullType,
        left: Box<ParseNode>,
        right: Box<ParseNode>,
    },
    Unary {
        op: UnaryOp,
        ty: FullType,
        operand: Box<ParseNode>,
    },
    Assignment {
        targets: Vec<ParseNode>,
        values: Vec<ParseNode>,
    },
    Call {
        sym: SymbolId,
        args: Vec<Argument>,
    },
    ExtCall {
        library: String,
        name: String,
        args: Vec<Argument>,
        ty: FullType,
        inline: bool,
    },
    /// PRINT-style payload: a heterogeneous run of items.
    VarArg(Vec<ParseNode>),
    Conditional {
        branches: Vec<Branch>,
    },
    Loop {
        kind: LoopKind,
        var: Option<SymbolId>,
        start: Option<Box<ParseNode>>,
        end: Option<Box<ParseNode>>,
        step: Option<Box<ParseNode>>,
        /// Controlling expression for WHILE (pre-test) and UNTIL
        /// (post-test) loops.
        break_expr: Option<Box<ParseNode>>,
        body: Vec<ParseNode>,
    },
    /// EXIT [WHEN cond] out of the enclosing LOOP.
    Break {
        condition: Option<Box<ParseNode>>,
    },
    Return(Option<Box<ParseNode>>),
    Goto(SymbolId),
    MarkLabel(SymbolId),
    MarkFilename(PathBuf),
    MarkLine(u32),
    Trappable {
        body: Vec<ParseNode>,
        handler: Vec<ParseNode>,
        err_sym: SymbolId,
        errtext_sym: SymbolId,
    },
    ReadData {
        targets: Vec<ParseNode>,
        data_sym: SymbolId,
        index_sym: SymbolId,
        eod_sym: SymbolId,
    },
    Input {
        file: Option<Box<ParseNode>>,
        prompt: Option<String>,
        position: Option<InputPosition>,
        terminator: InputTerminator,
        targets: Vec<ParseNode>,
    },
}

impl ParseNode {
    /// Static type of an expression node. Statement nodes answer `None`.
    pub fn ty(&self, arena: &SymbolArena) -> FullType {
        match self {
            ParseNode::Number(Variant::Int(_)) => FullType::of(BaseType::Integer),
            ParseNode::Number(Variant::Float(_)) => FullType::of(BaseType::Float),
            ParseNode::Number(Variant::Double(_)) => FullType::of(BaseType::Double),
            ParseNode::Number(Variant::Str(_)) | ParseNode::Str(_) => FullType::of(BaseType::Char),
            ParseNode::Identifier { sym, .. } => arena.get(*sym).full_type,
            ParseNode::Binary { ty, .. } | ParseNode::Unary { ty, .. } => *ty,
            ParseNode::Call { sym, .. } => arena.get(*sym).full_type,
            ParseNode::ExtCall { ty, .. } => *ty,
            _ => FullType::of(BaseType::None),
        }
    }

    /// True for literal `Number` nodes (the folding fixpoint).
    pub fn is_constant(&self) -> bool {
        matches!(self, ParseNode::Number(_))
    }

    /// Integer value of a constant node, when it is one.
    pub fn constant_int(&self) -> Option<i32> {
        match self {
            ParseNode::Number(v) if v.is_numeric() => Some(v.as_i32()),
            _ => None,
        }
    }
}

/// A compiled routine and its local symbols.
#[derive(Debug, Clone)]
pub struct Procedure {
    pub sym: SymbolId,
    pub locals: SymbolMap,
    pub body: Vec<ParseNode>,
    pub closed: bool,
    pub catch_exceptions: bool,
}

/// Root of the lowered tree: what the code generator consumes.
#[derive(Debug, Clone)]
pub struct ProgramDef {
    pub name: String,
    pub arena: SymbolArena,
    pub globals: SymbolMap,
    pub procedures: Vec<Procedure>,
    /// True iff any routine was marked as the entry point.
    pub executable: bool,
}

impl ProgramDef {
    pub fn find_procedure(&self, name: &str) -> Option<&Procedure> {
        self.procedures
            .iter()
            .find(|p| self.arena.get(p.sym).name.eq_ignore_ascii_case(name))
    }
}
