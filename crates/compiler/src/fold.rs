//! Bottom-up constant folding over expression trees.
//!
//! Besides evaluating constant subtrees, folding applies the algebraic
//! identities (x+0, x*1, x^0, ...) and lowers DIV/MOD to the IDIV/IMOD
//! intrinsics and IN to INDEX. Folding an already-folded tree is a no-op.

use crate::ast::{Argument, BinaryOp, ParseNode, Substring, UnaryOp};
use crate::diag::{Diagnostics, ErrorCode};
use crate::intrinsics;
use crate::symbol::{BaseType, FullType, SymbolArena};
use crate::variant::Variant;

/// Fold one expression tree. `line` locates any division-by-zero report.
pub(crate) fn fold(
    node: ParseNode,
    arena: &SymbolArena,
    diags: &mut Diagnostics,
    line: Option<u32>,
) -> ParseNode {
    match node {
        ParseNode::Binary {
            op,
            ty,
            left,
            right,
        } => {
            let left = fold(*left, arena, diags, line);
            let right = fold(*right, arena, diags, line);
            fold_binary(op, ty, left, right, diags, line)
        }
        ParseNode::Unary { op, ty, operand } => {
            let operand = fold(*operand, arena, diags, line);
            fold_unary(op, ty, operand)
        }
        ParseNode::Identifier {
            sym,
            indexes,
            substring,
        } => ParseNode::Identifier {
            sym,
            indexes: indexes
                .into_iter()
                .map(|n| fold(n, arena, diags, line))
                .collect(),
            substring: substring.map(|s| Substring {
                start: s.start.map(|n| Box::new(fold(*n, arena, diags, line))),
                end: s.end.map(|n| Box::new(fold(*n, arena, diags, line))),
            }),
        },
        ParseNode::Call { sym, args } => ParseNode::Call {
            sym,
            args: fold_args(args, arena, diags, line),
        },
        ParseNode::ExtCall {
            library,
            name,
            args,
            ty,
            inline,
        } => ParseNode::ExtCall {
            library,
            name,
            args: fold_args(args, arena, diags, line),
            ty,
            inline,
        },
        other => other,
    }
}

fn fold_args(
    args: Vec<Argument>,
    arena: &SymbolArena,
    diags: &mut Diagnostics,
    line: Option<u32>,
) -> Vec<Argument> {
    args.into_iter()
        .map(|a| Argument {
            node: fold(a.node, arena, diags, line),
            by_ref: a.by_ref,
        })
        .collect()
}

/// A literal zero/one in the type the expression was equalised to.
fn typed_literal(ty: FullType, n: i32) -> ParseNode {
    let v = match ty.base {
        BaseType::Float => Variant::Float(n as f32),
        BaseType::Double => Variant::Double(n as f64),
        _ => Variant::Int(n),
    };
    ParseNode::Number(v)
}

/// Floor division, Comal's rounding convention.
fn comal_div(a: i32, b: i32) -> i32 {
    let q = a.wrapping_div(b);
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) { q - 1 } else { q }
}

fn comal_mod(a: i32, b: i32) -> i32 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r < 0) != (b < 0) {
        r.wrapping_add(b)
    } else {
        r
    }
}

fn extcall2(intr: &intrinsics::Intrinsic, ty: FullType, left: ParseNode, right: ParseNode) -> ParseNode {
    ParseNode::ExtCall {
        library: intr.library.to_string(),
        name: intr.symbol.to_string(),
        args: vec![
            Argument {
                node: left,
                by_ref: false,
            },
            Argument {
                node: right,
                by_ref: false,
            },
        ],
        ty,
        inline: false,
    }
}

fn fold_binary(
    op: BinaryOp,
    ty: FullType,
    left: ParseNode,
    right: ParseNode,
    diags: &mut Diagnostics,
    line: Option<u32>,
) -> ParseNode {
    let rebuild = |left: ParseNode, right: ParseNode| ParseNode::Binary {
        op,
        ty,
        left: Box::new(left),
        right: Box::new(right),
    };

    // Literal string concatenation.
    if op == BinaryOp::Concat
        && let (ParseNode::Str(a), ParseNode::Str(b)) = (&left, &right)
    {
        return ParseNode::Str(format!("{}{}", a, b));
    }

    // Both operands constant: compute now.
    if let (ParseNode::Number(a), ParseNode::Number(b)) = (&left, &right) {
        let result = match op {
            BinaryOp::Add => a.add(b),
            BinaryOp::Sub => a.sub(b),
            BinaryOp::Mul => a.mul(b),
            BinaryOp::Div => a.div(b),
            BinaryOp::Pow => a.pow(b),
            BinaryOp::IntDiv | BinaryOp::Modulo => {
                let (x, y) = (a.as_i32(), b.as_i32());
                if y == 0 {
                    Err("division by zero".to_string())
                } else if op == BinaryOp::IntDiv {
                    Ok(Variant::Int(comal_div(x, y)))
                } else {
                    Ok(Variant::Int(comal_mod(x, y)))
                }
            }
            BinaryOp::And => Ok(Variant::Int(a.as_i32() & b.as_i32())),
            BinaryOp::Or => Ok(Variant::Int(a.as_i32() | b.as_i32())),
            BinaryOp::Xor | BinaryOp::Neqv => Ok(Variant::Int(a.as_i32() ^ b.as_i32())),
            BinaryOp::Eqv => Ok(Variant::Int(!(a.as_i32() ^ b.as_i32()))),
            _ if op.is_comparison() => a.compare(b).map(|ord| {
                let hit = match op {
                    BinaryOp::Eq => ord.is_eq(),
                    BinaryOp::Ne => ord.is_ne(),
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Le => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                };
                Variant::Int(hit as i32)
            }),
            _ => Err(String::new()),
        };
        match result {
            Ok(v) => return ParseNode::Number(v),
            Err(msg) if !msg.is_empty() => {
                diags.error(ErrorCode::DivisionByZero, line, msg);
                return rebuild(left, right);
            }
            Err(_) => {}
        }
    }

    // Algebraic identities.
    match op {
        BinaryOp::Add => {
            if constant_is(&left, 0) {
                return right;
            }
            if constant_is(&right, 0) {
                return left;
            }
        }
        BinaryOp::Sub => {
            if constant_is(&right, 0) {
                return left;
            }
        }
        BinaryOp::Mul => {
            if constant_is(&left, 0) || constant_is(&right, 0) {
                return typed_literal(ty, 0);
            }
            if constant_is(&left, 1) {
                return right;
            }
            if constant_is(&right, 1) {
                return left;
            }
        }
        BinaryOp::Pow => {
            if constant_is(&right, 0) {
                return typed_literal(ty, 1);
            }
            if constant_is(&right, 1) {
                return left;
            }
            if constant_is(&right, -1) {
                return ParseNode::Binary {
                    op: BinaryOp::Div,
                    ty,
                    left: Box::new(typed_literal(ty, 1)),
                    right: Box::new(left),
                };
            }
        }
        // Rounding differs from the host divide, so non-constant DIV/MOD
        // become intrinsic calls.
        BinaryOp::IntDiv => return extcall2(&intrinsics::IDIV, ty, left, right),
        BinaryOp::Modulo => return extcall2(&intrinsics::IMOD, ty, left, right),
        // a IN b: position of a within b.
        BinaryOp::In => return extcall2(&intrinsics::INDEX, ty, right, left),
        _ => {}
    }

    rebuild(left, right)
}

fn fold_unary(op: UnaryOp, ty: FullType, operand: ParseNode) -> ParseNode {
    if let ParseNode::Number(v) = &operand {
        match op {
            UnaryOp::Neg => {
                if let Ok(n) = v.neg() {
                    return ParseNode::Number(n);
                }
            }
            UnaryOp::Not => {
                if v.is_numeric() {
                    return ParseNode::Number(Variant::Int(v.is_zero() as i32));
                }
            }
        }
    }
    ParseNode::Unary {
        op,
        ty,
        operand: Box::new(operand),
    }
}

fn constant_is(node: &ParseNode, n: i32) -> bool {
    matches!(node, ParseNode::Number(v) if v.equals_int(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{SymScope, Symbol, SymbolId};

    fn arena_with_var() -> (SymbolArena, SymbolId) {
        let mut arena = SymbolArena::new();
        let id = arena.alloc(Symbol::var(
            "X",
            FullType::of(BaseType::Float),
            SymScope::Local,
        ));
        (arena, id)
    }

    fn var(id: SymbolId) -> ParseNode {
        ParseNode::Identifier {
            sym: id,
            indexes: Vec::new(),
            substring: None,
        }
    }

    fn bin(op: BinaryOp, left: ParseNode, right: ParseNode) -> ParseNode {
        ParseNode::Binary {
            op,
            ty: FullType::of(BaseType::Float),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn int(n: i32) -> ParseNode {
        ParseNode::Number(Variant::Int(n))
    }

    fn diags() -> Diagnostics {
        Diagnostics::new(4, false)
    }

    #[test]
    fn test_constant_arithmetic() {
        let (arena, _) = arena_with_var();
        let mut d = diags();
        // 2 + 3 * 4
        let tree = bin(BinaryOp::Add, int(2), bin(BinaryOp::Mul, int(3), int(4)));
        let folded = fold(tree, &arena, &mut d, None);
        assert!(matches!(folded, ParseNode::Number(Variant::Int(14))));
    }

    #[test]
    fn test_identities_leave_variable() {
        let (arena, x) = arena_with_var();
        let mut d = diags();
        for tree in [
            bin(BinaryOp::Add, var(x), int(0)),
            bin(BinaryOp::Add, int(0), var(x)),
            bin(BinaryOp::Sub, var(x), int(0)),
            bin(BinaryOp::Mul, var(x), int(1)),
            bin(BinaryOp::Mul, int(1), var(x)),
            bin(BinaryOp::Pow, var(x), int(1)),
        ] {
            let folded = fold(tree, &arena, &mut d, None);
            assert!(
                matches!(folded, ParseNode::Identifier { sym, .. } if sym == x),
                "expected bare variable"
            );
        }
    }

    #[test]
    fn test_zero_and_one_literals() {
        let (arena, x) = arena_with_var();
        let mut d = diags();
        let folded = fold(bin(BinaryOp::Mul, var(x), int(0)), &arena, &mut d, None);
        assert!(matches!(folded, ParseNode::Number(v) if v.is_zero()));
        let folded = fold(bin(BinaryOp::Pow, var(x), int(0)), &arena, &mut d, None);
        assert!(matches!(folded, ParseNode::Number(v) if v.equals_int(1)));
    }

    #[test]
    fn test_pow_minus_one_becomes_reciprocal() {
        let (arena, x) = arena_with_var();
        let mut d = diags();
        let folded = fold(bin(BinaryOp::Pow, var(x), int(-1)), &arena, &mut d, None);
        match folded {
            ParseNode::Binary { op, left, .. } => {
                assert_eq!(op, BinaryOp::Div);
                assert!(matches!(*left, ParseNode::Number(v) if v.equals_int(1)));
            }
            other => panic!("expected division, got {:?}", other),
        }
    }

    #[test]
    fn test_div_mod_lower_to_intrinsics() {
        let (arena, x) = arena_with_var();
        let mut d = diags();
        let folded = fold(
            bin(BinaryOp::IntDiv, var(x), int(2)),
            &arena,
            &mut d,
            None,
        );
        match folded {
            ParseNode::ExtCall { name, library, .. } => {
                assert_eq!(name, "IDIV");
                assert_eq!(library, "Intrinsics");
            }
            other => panic!("expected IDIV call, got {:?}", other),
        }
    }

    #[test]
    fn test_constant_div_mod_use_floor_convention() {
        let (arena, _) = arena_with_var();
        let mut d = diags();
        let folded = fold(bin(BinaryOp::IntDiv, int(-7), int(2)), &arena, &mut d, None);
        assert!(matches!(folded, ParseNode::Number(Variant::Int(-4))));
        let folded = fold(bin(BinaryOp::Modulo, int(-7), int(2)), &arena, &mut d, None);
        assert!(matches!(folded, ParseNode::Number(Variant::Int(1))));
    }

    #[test]
    fn test_division_by_zero_reports_and_keeps_tree() {
        let (arena, _) = arena_with_var();
        let mut d = diags();
        let folded = fold(bin(BinaryOp::Div, int(1), int(0)), &arena, &mut d, Some(30));
        assert!(d.has_errors());
        assert!(matches!(folded, ParseNode::Binary { .. }));
    }

    #[test]
    fn test_comparison_folds_to_int() {
        let (arena, _) = arena_with_var();
        let mut d = diags();
        let folded = fold(bin(BinaryOp::Lt, int(1), int(2)), &arena, &mut d, None);
        assert!(matches!(folded, ParseNode::Number(Variant::Int(1))));
    }

    #[test]
    fn test_string_concat_literal() {
        let (arena, _) = arena_with_var();
        let mut d = diags();
        let tree = ParseNode::Binary {
            op: BinaryOp::Concat,
            ty: FullType::of(BaseType::Char),
            left: Box::new(ParseNode::Str("AB".into())),
            right: Box::new(ParseNode::Str("CD".into())),
        };
        let folded = fold(tree, &arena, &mut d, None);
        assert!(matches!(folded, ParseNode::Str(s) if s == "ABCD"));
    }

    #[test]
    fn test_folding_is_idempotent() {
        let (arena, x) = arena_with_var();
        let mut d = diags();
        let tree = bin(
            BinaryOp::Add,
            bin(BinaryOp::Mul, var(x), int(1)),
            bin(BinaryOp::Add, int(2), int(3)),
        );
        let once = fold(tree, &arena, &mut d, None);
        let twice = fold(once.clone(), &arena, &mut d, None);
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn test_not_folds_logically() {
        let (arena, _) = arena_with_var();
        let mut d = diags();
        let tree = ParseNode::Unary {
            op: UnaryOp::Not,
            ty: FullType::of(BaseType::Integer),
            operand: Box::new(int(0)),
        };
        assert!(matches!(
            fold(tree, &arena, &mut d, None),
            ParseNode::Number(Variant::Int(1))
        ));
    }
}
