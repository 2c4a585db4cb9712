//! Expression parser: recursive-descent precedence climbing with type
//! equalisation and constant folding.
//!
//! Precedence, low to high:
//! 1 XOR/BITXOR EQV NEQV, 2 OR/BITOR, 3 AND/BITAND, 4 NOT, 5 comparisons
//! and IN, 6 + -, 7 * / DIV MOD, 8 unary + -, 10 ^ (right-associative).

use crate::ast::{Argument, BinaryOp, ParseNode, Substring, UnaryOp};
use crate::diag::ErrorCode;
use crate::driver::Compiler;
use crate::fold;
use crate::intrinsics::{self, Intrinsic};
use crate::symbol::{BaseType, FullType, Linkage, SymClass, SymScope, Symbol, SymbolId, Value};
use crate::token::{Keyword, Token};
use crate::variant::Variant;

const LOWEST: u8 = 1;
const NOT_LEVEL: u8 = 4;
const UNARY_LEVEL: u8 = 8;

/// Binary operator for a token: (operator, precedence, right-associative).
fn binary_op(token: &Token) -> Option<(BinaryOp, u8, bool)> {
    let entry = match token {
        Token::Kw(Keyword::Xor) | Token::Kw(Keyword::Bitxor) => (BinaryOp::Xor, 1, false),
        Token::Kw(Keyword::Eqv) => (BinaryOp::Eqv, 1, false),
        Token::Kw(Keyword::Neqv) => (BinaryOp::Neqv, 1, false),
        Token::Kw(Keyword::Or) | Token::Kw(Keyword::Bitor) => (BinaryOp::Or, 2, false),
        Token::Kw(Keyword::And) | Token::Kw(Keyword::Bitand) => (BinaryOp::And, 3, false),
        Token::Lt => (BinaryOp::Lt, 5, false),
        Token::Le => (BinaryOp::Le, 5, false),
        Token::Eq => (BinaryOp::Eq, 5, false),
        Token::Ne => (BinaryOp::Ne, 5, false),
        Token::Ge => (BinaryOp::Ge, 5, false),
        Token::Gt => (BinaryOp::Gt, 5, false),
        Token::Kw(Keyword::In) => (BinaryOp::In, 5, false),
        Token::Plus => (BinaryOp::Add, 6, false),
        Token::Minus => (BinaryOp::Sub, 6, false),
        Token::Star => (BinaryOp::Mul, 7, false),
        Token::Slash => (BinaryOp::Div, 7, false),
        Token::Kw(Keyword::Div) => (BinaryOp::IntDiv, 7, false),
        Token::Kw(Keyword::Mod) => (BinaryOp::Modulo, 7, false),
        Token::Caret => (BinaryOp::Pow, 10, true),
        _ => return None,
    };
    Some(entry)
}

impl Compiler<'_> {
    /// Parse a full expression and fold it.
    pub(crate) fn parse_expression(&mut self) -> ParseNode {
        let node = self.parse_expr_level(LOWEST);
        self.fold_expr(node)
    }

    pub(crate) fn fold_expr(&mut self, node: ParseNode) -> ParseNode {
        let line = self.diag_line();
        fold::fold(node, &self.arena, &mut *self.diags, line)
    }

    /// An expression required to be numeric (floats accepted; integer
    /// contexts truncate at runtime).
    pub(crate) fn parse_int_expression(&mut self) -> ParseNode {
        let node = self.parse_expression();
        if !node.ty(&self.arena).is_numeric() {
            self.err(ErrorCode::IntegerExpected, "integer expression expected");
        }
        node
    }

    pub(crate) fn parse_string_expression(&mut self) -> ParseNode {
        let node = self.parse_expression();
        if !node.ty(&self.arena).is_string() {
            self.err(ErrorCode::StringExpected, "string expression expected");
        }
        node
    }

    /// An integer expression that must fold to a constant.
    pub(crate) fn parse_constant_int(&mut self, what: &str) -> i32 {
        let node = self.parse_int_expression();
        match node.constant_int() {
            Some(v) => v,
            None => {
                self.err(
                    ErrorCode::ConstantExpected,
                    format!("constant {} expected", what),
                );
                0
            }
        }
    }

    fn parse_expr_level(&mut self, level: u8) -> ParseNode {
        let mut left = self.parse_operand();
        loop {
            let Some((op, prec, right_assoc)) = binary_op(self.line.peek()) else {
                break;
            };
            if prec < level {
                break;
            }
            self.line.next_token();
            let right = self.parse_expr_level(if right_assoc { prec } else { prec + 1 });
            left = self.make_binary(op, left, right);
        }
        left
    }

    /// Build a binary node with the equalised result type. A mismatch is
    /// reported once; parsing continues with the broader type to avoid
    /// cascades.
    fn make_binary(&mut self, op: BinaryOp, left: ParseNode, right: ParseNode) -> ParseNode {
        let lt = left.ty(&self.arena);
        let rt = right.ty(&self.arena);
        let (op, ty) = self.equalise(op, lt, rt);
        ParseNode::Binary {
            op,
            ty,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn equalise(&mut self, op: BinaryOp, lt: FullType, rt: FullType) -> (BinaryOp, FullType) {
        let widest = if lt.base == BaseType::Double || rt.base == BaseType::Double {
            BaseType::Double
        } else if lt.base == BaseType::Float || rt.base == BaseType::Float {
            BaseType::Float
        } else {
            BaseType::Integer
        };

        match op {
            // String '+' is concatenation.
            BinaryOp::Add | BinaryOp::Concat if lt.is_string() && rt.is_string() => {
                let base = if lt.base == BaseType::FixedChar || rt.base == BaseType::FixedChar {
                    BaseType::FixedChar
                } else {
                    BaseType::Char
                };
                (
                    BinaryOp::Concat,
                    FullType {
                        base,
                        width: lt.width.max(rt.width),
                    },
                )
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Pow => {
                if !lt.is_numeric() || !rt.is_numeric() {
                    self.err(
                        ErrorCode::TypeMismatch,
                        format!("'{}' needs numeric operands", op.listing()),
                    );
                }
                (op, FullType::of(widest))
            }
            op if op.is_integer_op() => {
                if !lt.is_numeric() || !rt.is_numeric() {
                    self.err(
                        ErrorCode::TypeMismatch,
                        format!("'{}' needs numeric operands", op.listing()),
                    );
                }
                (op, FullType::of(BaseType::Integer))
            }
            BinaryOp::In => {
                if !lt.is_string() || !rt.is_string() {
                    self.err(ErrorCode::TypeMismatch, "'IN' needs string operands");
                }
                (op, FullType::of(BaseType::Integer))
            }
            _ => {
                // Comparisons: numerics widen, strings compare strings.
                if lt.is_numeric() != rt.is_numeric() {
                    self.err(
                        ErrorCode::TypeMismatch,
                        "cannot compare string and numeric values",
                    );
                }
                (op, FullType::of(BaseType::Integer))
            }
        }
    }

    fn parse_operand(&mut self) -> ParseNode {
        let token = self.line.next_token();
        match token {
            Token::LParen => {
                let node = self.parse_expr_level(LOWEST);
                self.expect(&Token::RParen);
                node
            }
            Token::Kw(Keyword::Not) => {
                let operand = self.parse_expr_level(NOT_LEVEL);
                if !operand.ty(&self.arena).is_numeric() {
                    self.err(ErrorCode::NumberExpected, "'NOT' needs a numeric operand");
                }
                ParseNode::Unary {
                    op: UnaryOp::Not,
                    ty: FullType::of(BaseType::Integer),
                    operand: Box::new(operand),
                }
            }
            Token::Minus => {
                let operand = self.parse_expr_level(UNARY_LEVEL);
                let ty = operand.ty(&self.arena);
                let ty = if ty.is_numeric() {
                    ty
                } else {
                    self.err(ErrorCode::NumberExpected, "'-' needs a numeric operand");
                    FullType::of(BaseType::Float)
                };
                ParseNode::Unary {
                    op: UnaryOp::Neg,
                    ty,
                    operand: Box::new(operand),
                }
            }
            Token::Plus => self.parse_expr_level(UNARY_LEVEL),
            Token::Int(v) => ParseNode::Number(Variant::Int(v)),
            Token::Float(v) => ParseNode::Number(Variant::Float(v)),
            Token::Str(s) => ParseNode::Str(s),
            Token::Kw(Keyword::True) => ParseNode::Number(Variant::Int(1)),
            Token::Kw(Keyword::False) => ParseNode::Number(Variant::Int(0)),
            Token::Kw(Keyword::Pi) => ParseNode::Number(Variant::Float(std::f32::consts::PI)),
            // The error state globals read as plain variables.
            Token::Kw(Keyword::Err) => self.runtime_var("_ERR", FullType::of(BaseType::Integer)),
            Token::Kw(Keyword::ErrtextS) => {
                self.runtime_var("_ERRTEXT$", FullType::from_suffix("$"))
            }
            Token::Kw(Keyword::Eod) => self.runtime_var("_EOD", FullType::of(BaseType::Integer)),
            Token::Kw(Keyword::Rnd) => self.parse_rnd(),
            Token::Kw(kw) if intrinsics::lookup(kw).is_some() => self.parse_intrinsic(kw),
            Token::Identifier(name) => self.parse_identifier_operand(name),
            Token::Error { message, text } => {
                self.err(
                    ErrorCode::UnexpectedToken,
                    format!("{}: '{}'", message, text),
                );
                ParseNode::Number(Variant::Int(0))
            }
            other => {
                self.line.push_back();
                self.err(
                    ErrorCode::UnexpectedToken,
                    format!("expression expected, found '{}'", other),
                );
                ParseNode::Number(Variant::Int(0))
            }
        }
    }

    pub(crate) fn runtime_var(&mut self, name: &str, ty: FullType) -> ParseNode {
        let id = self.runtime_global(name, ty);
        self.mark_referenced(id);
        ParseNode::Identifier {
            sym: id,
            indexes: Vec::new(),
            substring: None,
        }
    }

    /// RND is both the zero-argument real generator and the two-argument
    /// integer range form.
    fn parse_rnd(&mut self) -> ParseNode {
        if self.consume(&Token::LParen) {
            let lo = self.parse_int_expression();
            self.expect(&Token::Comma);
            let hi = self.parse_int_expression();
            self.expect(&Token::RParen);
            self.ext_call(&intrinsics::RND_RANGE, vec![lo, hi], FullType::of(BaseType::Integer))
        } else {
            let intr = intrinsics::lookup(Keyword::Rnd).unwrap();
            let ty = FullType::of(intr.result);
            self.ext_call(&intr, Vec::new(), ty)
        }
    }

    pub(crate) fn ext_call(
        &mut self,
        intr: &Intrinsic,
        args: Vec<ParseNode>,
        ty: FullType,
    ) -> ParseNode {
        ParseNode::ExtCall {
            library: intr.library.to_string(),
            name: intr.symbol.to_string(),
            args: args
                .into_iter()
                .map(|node| Argument {
                    node,
                    by_ref: false,
                })
                .collect(),
            ty,
            inline: intr.inline && !self.opts.no_inline,
        }
    }

    fn parse_intrinsic(&mut self, kw: Keyword) -> ParseNode {
        let intr = intrinsics::lookup(kw).unwrap();
        let mut args = Vec::new();
        let mut arg_ty = FullType::of(BaseType::Float);

        if !intr.args.is_empty() {
            if !self.expect(&Token::LParen) {
                return ParseNode::Number(Variant::Int(0));
            }
            for (i, want) in intr.args.iter().enumerate() {
                if i > 0 {
                    self.expect(&Token::Comma);
                }
                let node = self.parse_expression();
                let ty = node.ty(&self.arena);
                match want {
                    BaseType::Char => {
                        if !ty.is_string() {
                            self.err(
                                ErrorCode::StringExpected,
                                format!("'{}' needs a string argument", kw.name()),
                            );
                        }
                    }
                    BaseType::Integer => {
                        if !ty.is_numeric() {
                            self.err(
                                ErrorCode::IntegerExpected,
                                format!("'{}' needs an integer argument", kw.name()),
                            );
                        }
                    }
                    _ => {
                        if !ty.is_numeric() {
                            self.err(
                                ErrorCode::NumberExpected,
                                format!("'{}' needs a numeric argument", kw.name()),
                            );
                        }
                    }
                }
                arg_ty = ty;
                args.push(node);
            }
            self.expect(&Token::RParen);
        }

        let ty = match intr.result {
            BaseType::Generic => arg_ty,
            base => FullType::of(base),
        };
        self.ext_call(&intr, args, ty)
    }

    // ---- identifiers -------------------------------------------------------

    /// Implicitly declare a variable in the current scope, typed by its
    /// suffix and zero/empty initialised.
    pub(crate) fn create_local(&mut self, name: &str) -> SymbolId {
        let ty = FullType::from_suffix(name);
        let scope = if self.scopes.in_routine() {
            SymScope::Local
        } else {
            SymScope::Global
        };
        let mut sym = Symbol::var(name, ty, scope);
        sym.defined = true;
        sym.value = Some(Value::Scalar(match ty.base {
            BaseType::Integer => Variant::Int(0),
            BaseType::FixedChar | BaseType::Char => Variant::Str(String::new()),
            _ => Variant::Float(0.0),
        }));
        let id = self.arena.alloc(sym);
        self.scopes.add_to_current(name, id);
        id
    }

    /// Resolve a name that is about to receive a value (assignment LHS,
    /// INPUT/READ target, FOR variable). Outside strict mode and CLOSED
    /// routines an unknown name is created implicitly.
    pub(crate) fn resolve_target(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.scopes.resolve(name) {
            return id;
        }
        if self.opts.strict || self.scopes.in_closed() {
            self.err(
                ErrorCode::UndefinedVariable,
                format!("undefined variable '{}'", name),
            );
        }
        self.create_local(name)
    }

    /// Resolve a name read as a value. Unknown names are an error; a
    /// recovery symbol is still created so the report comes once.
    pub(crate) fn resolve_operand(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.scopes.resolve(name) {
            return id;
        }
        self.err(
            ErrorCode::UndefinedVariable,
            format!("undefined variable '{}'", name),
        );
        self.create_local(name)
    }

    pub(crate) fn parse_identifier_operand(&mut self, name: String) -> ParseNode {
        if let Some(id) = self.scopes.resolve(&name) {
            match self.arena.get(id).class {
                SymClass::Function | SymClass::Inline => {
                    self.mark_referenced(id);
                    let args = self.parse_call_args(id);
                    return ParseNode::Call { sym: id, args };
                }
                SymClass::Subroutine => {
                    self.err(
                        ErrorCode::UndefinedFunction,
                        format!("'{}' is a procedure and returns no value", name),
                    );
                    self.skip_paren_group();
                    return ParseNode::Number(Variant::Int(0));
                }
                SymClass::Label => {
                    self.err(
                        ErrorCode::TypeMismatch,
                        format!("label '{}' cannot be used in an expression", name),
                    );
                    return ParseNode::Number(Variant::Int(0));
                }
                SymClass::Var => {
                    return self.finish_variable(id);
                }
            }
        }
        let id = self.resolve_operand(&name);
        self.finish_variable(id)
    }

    /// Consume a stray parenthesised group after an unusable name.
    fn skip_paren_group(&mut self) {
        if !self.consume(&Token::LParen) {
            return;
        }
        let mut depth = 1usize;
        while depth > 0 && !self.line.at_end() {
            match self.line.next_token() {
                Token::LParen => depth += 1,
                Token::RParen => depth -= 1,
                _ => {}
            }
        }
    }

    /// Indexes and substring selectors after a variable name, with the
    /// symbol-shape checks of the resolution rules.
    pub(crate) fn finish_variable(&mut self, id: SymbolId) -> ParseNode {
        self.mark_referenced(id);
        let mut indexes = Vec::new();
        let mut substring = None;

        if self.consume(&Token::LParen) {
            if self.consume(&Token::Colon) {
                // (:end) or (:)
                let end = if *self.line.peek() == Token::RParen {
                    None
                } else {
                    Some(Box::new(self.parse_int_expression()))
                };
                substring = Some(Substring { start: None, end });
                self.expect(&Token::RParen);
            } else {
                let first = self.parse_expression();
                if self.consume(&Token::Colon) {
                    let end = if *self.line.peek() == Token::RParen {
                        None
                    } else {
                        Some(Box::new(self.parse_int_expression()))
                    };
                    substring = Some(Substring {
                        start: Some(Box::new(first)),
                        end,
                    });
                    self.expect(&Token::RParen);
                } else {
                    indexes.push(first);
                    while self.consume(&Token::Comma) {
                        indexes.push(self.parse_expression());
                    }
                    self.expect(&Token::RParen);
                    // A second group after array indexes selects a
                    // substring of a string element.
                    if *self.line.peek() == Token::LParen {
                        self.line.next_token();
                        let start = if *self.line.peek() == Token::Colon {
                            None
                        } else {
                            Some(Box::new(self.parse_int_expression()))
                        };
                        self.expect(&Token::Colon);
                        let end = if *self.line.peek() == Token::RParen {
                            None
                        } else {
                            Some(Box::new(self.parse_int_expression()))
                        };
                        substring = Some(Substring { start, end });
                        self.expect(&Token::RParen);
                    }
                }
            }
        }

        let (sym_ty, dims_len, is_array, name) = {
            let sym = self.arena.get(id);
            (
                sym.full_type,
                sym.dims.len(),
                sym.is_array(),
                sym.name.clone(),
            )
        };

        if substring.is_some() && sym_ty.base != BaseType::FixedChar {
            self.err(
                ErrorCode::BadSubstringSpec,
                format!("substring needs a fixed string, '{}' is {}", name, sym_ty.base.name()),
            );
        }
        if is_array {
            if indexes.is_empty() {
                self.err(
                    ErrorCode::MissingArrayDimensions,
                    format!("array '{}' needs {} index(es)", name, dims_len),
                );
            } else if indexes.len() != dims_len {
                self.err(
                    ErrorCode::MissingArrayDimensions,
                    format!(
                        "array '{}' has {} dimension(s), {} index(es) given",
                        name,
                        dims_len,
                        indexes.len()
                    ),
                );
            }
        } else if !indexes.is_empty() {
            self.err(
                ErrorCode::UndefinedFunction,
                format!("'{}' is not an array or function", name),
            );
        }
        for index in &indexes {
            if !index.ty(&self.arena).is_numeric() {
                self.err(ErrorCode::IntegerExpected, "array index must be numeric");
                break;
            }
        }
        if self.opts.strict && sym_ty.base == BaseType::FixedChar && sym_ty.width == 0 {
            self.err(
                ErrorCode::MissingStringDeclaration,
                format!("'{}' needs a declared width", name),
            );
        }

        ParseNode::Identifier {
            sym: id,
            indexes,
            substring,
        }
    }

    /// Arguments of a PROC/FUNC call, validated against the declared
    /// parameters.
    pub(crate) fn parse_call_args(&mut self, id: SymbolId) -> Vec<Argument> {
        let (params, routine_name) = {
            let sym = self.arena.get(id);
            (sym.params.clone(), sym.name.clone())
        };

        let mut nodes = Vec::new();
        if self.consume(&Token::LParen) {
            if !self.consume(&Token::RParen) {
                loop {
                    nodes.push(self.parse_expression());
                    if !self.consume(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen);
            }
        }

        if nodes.len() != params.len() {
            self.err(
                ErrorCode::ParameterCountMismatch,
                format!(
                    "'{}' expects {} parameter(s), {} given",
                    routine_name,
                    params.len(),
                    nodes.len()
                ),
            );
        }

        let mut args = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let by_ref = match params.get(i) {
                Some(param_id) => {
                    let (p_ty, p_linkage, p_array, p_name) = {
                        let p = self.arena.get(*param_id);
                        (p.full_type, p.linkage, p.is_array(), p.name.clone())
                    };
                    let a_ty = node.ty(&self.arena);
                    let by_ref = p_linkage == Linkage::ByRef;
                    if by_ref && !matches!(node, ParseNode::Identifier { .. }) {
                        self.err(
                            ErrorCode::TypeMismatch,
                            format!("REF parameter '{}' needs a variable", p_name),
                        );
                    } else if p_array {
                        let whole_array = matches!(
                            &node,
                            ParseNode::Identifier { sym, indexes, .. }
                                if indexes.is_empty() && self.arena.get(*sym).is_array()
                        );
                        if !whole_array {
                            self.err(
                                ErrorCode::TypeMismatch,
                                format!("parameter '{}' needs a whole array", p_name),
                            );
                        }
                    } else if by_ref {
                        if a_ty.base != p_ty.base {
                            self.err(
                                ErrorCode::TypeMismatch,
                                format!(
                                    "REF parameter '{}' is {}, argument is {}",
                                    p_name,
                                    p_ty.base.name(),
                                    a_ty.base.name()
                                ),
                            );
                        }
                    } else if p_ty.is_numeric() != a_ty.is_numeric() {
                        self.err(
                            ErrorCode::TypeMismatch,
                            format!(
                                "parameter '{}' is {}, argument is {}",
                                p_name,
                                p_ty.base.name(),
                                a_ty.base.name()
                            ),
                        );
                    }
                    by_ref
                }
                None => false,
            };
            args.push(Argument { node, by_ref });
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::Diagnostics;
    use crate::line::Line;
    use crate::options::Options;

    fn parse_with(opts: &Options, src: &str) -> (ParseNode, Diagnostics) {
        let mut diags = Diagnostics::new(4, false);
        let node = {
            let mut c = Compiler::new(opts, &mut diags);
            c.line = Line::from_text(src);
            c.parse_expression()
        };
        (node, diags)
    }

    fn parse(src: &str) -> (ParseNode, Diagnostics) {
        parse_with(&Options::default(), src)
    }

    #[test]
    fn test_precedence_folds() {
        let (node, diags) = parse("2+3*4");
        assert!(!diags.has_errors());
        assert!(matches!(node, ParseNode::Number(Variant::Int(14))));
    }

    #[test]
    fn test_pow_right_associative() {
        let (node, _) = parse("2^3^2");
        assert!(matches!(node, ParseNode::Number(Variant::Int(512))));
    }

    #[test]
    fn test_unary_minus_binds_tighter_than_mul() {
        let (node, _) = parse("-2*3");
        assert!(matches!(node, ParseNode::Number(Variant::Int(-6))));
    }

    #[test]
    fn test_not_binds_looser_than_comparison() {
        let (node, _) = parse("NOT 1 < 2");
        // NOT (1 < 2) = NOT 1 = 0
        assert!(matches!(node, ParseNode::Number(Variant::Int(0))));
    }

    #[test]
    fn test_keyword_constants() {
        let (node, _) = parse("TRUE + TRUE");
        assert!(matches!(node, ParseNode::Number(Variant::Int(2))));
        let (node, _) = parse("FALSE");
        assert!(matches!(node, ParseNode::Number(Variant::Int(0))));
    }

    #[test]
    fn test_string_concat_becomes_literal() {
        let (node, diags) = parse("\"AB\"+\"CD\"");
        assert!(!diags.has_errors());
        assert!(matches!(node, ParseNode::Str(s) if s == "ABCD"));
    }

    #[test]
    fn test_string_plus_number_is_type_mismatch() {
        let (_, diags) = parse("\"AB\"+1");
        assert!(diags.has_errors());
        assert!(diags.items()[0].to_string().contains("TYPEMISMATCH"));
    }

    #[test]
    fn test_in_lowers_to_index() {
        let (node, diags) = parse("\"A\" IN \"CAT\"");
        assert!(!diags.has_errors());
        match node {
            ParseNode::ExtCall { name, args, ty, .. } => {
                assert_eq!(name, "INDEX");
                assert_eq!(args.len(), 2);
                assert_eq!(ty.base, BaseType::Integer);
            }
            other => panic!("expected INDEX call, got {:?}", other),
        }
    }

    #[test]
    fn test_intrinsic_call() {
        let (node, diags) = parse("LEN(\"HELLO\")");
        assert!(!diags.has_errors());
        match node {
            ParseNode::ExtCall { name, library, ty, .. } => {
                assert_eq!(name, "LEN");
                assert_eq!(library, "Intrinsics");
                assert_eq!(ty.base, BaseType::Integer);
            }
            other => panic!("expected LEN call, got {:?}", other),
        }
    }

    #[test]
    fn test_intrinsic_argument_type_checked() {
        let (_, diags) = parse("LEN(3)");
        assert!(diags.has_errors());
        assert!(diags.items()[0].to_string().contains("STRINGEXPECTED"));
    }

    #[test]
    fn test_abs_result_follows_argument() {
        let (node, _) = parse("ABS(X#)");
        // X# errors as undefined but recovers as Integer, so ABS is Integer.
        match node {
            ParseNode::ExtCall { ty, .. } => assert_eq!(ty.base, BaseType::Integer),
            other => panic!("expected ABS call, got {:?}", other),
        }
    }

    #[test]
    fn test_rnd_forms() {
        let (node, _) = parse("RND");
        assert!(matches!(node, ParseNode::ExtCall { ref name, ref args, .. }
            if name == "RND" && args.is_empty()));
        let (node, _) = parse("RND(1,6)");
        assert!(matches!(node, ParseNode::ExtCall { ref name, ref args, ty, .. }
            if name == "RND" && args.len() == 2 && ty.base == BaseType::Integer));
    }

    #[test]
    fn test_undefined_variable_in_rvalue_reports() {
        let (_, diags) = parse("A#+1");
        assert!(diags.has_errors());
        assert!(diags.items()[0].to_string().contains("UNDEFINEDVARIABLE"));
    }

    #[test]
    fn test_err_reads_runtime_global() {
        let (node, diags) = parse("ERR");
        assert!(!diags.has_errors());
        assert!(matches!(node, ParseNode::Identifier { .. }));
    }

    #[test]
    fn test_division_by_zero_is_reported() {
        let (_, diags) = parse("1/0");
        assert!(diags.has_errors());
        assert!(diags.items()[0].to_string().contains("DIVISIONBYZERO"));
    }

    #[test]
    fn test_comparison_type_is_integer() {
        let (node, _) = parse("1.5 < X");
        // X is undefined (reported) but the comparison still types Integer.
        if let ParseNode::Binary { ty, .. } = node {
            assert_eq!(ty.base, BaseType::Integer);
        } else {
            panic!("expected comparison node");
        }
    }
}
