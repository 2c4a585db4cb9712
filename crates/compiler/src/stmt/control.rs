//! Control-flow statements: IF/ELIF, CASE/WHEN, the loop family,
//! EXIT, TRAP/HANDLER, labels and GOTO.

use crate::ast::{BinaryOp, Branch, LoopKind, ParseNode};
use crate::diag::ErrorCode;
use crate::driver::Compiler;
use crate::intrinsics::LIB_RUNTIME;
use crate::symbol::{BaseType, FullType, SymClass, Symbol, SymbolId};
use crate::token::{Keyword, Token};

impl Compiler<'_> {
    /// `IF e THEN body [ELIF e THEN body]* [ELSE body] ENDIF`, or the
    /// single-line `IF e THEN stmt`.
    pub(crate) fn parse_if(&mut self, body: &mut Vec<ParseNode>) {
        let test = self.parse_int_expression();
        self.expect_kw(Keyword::Then);

        if !self.line.at_end() {
            let stmt = self.compile_single();
            body.push(ParseNode::Conditional {
                branches: vec![Branch {
                    test: Some(test),
                    body: stmt,
                }],
            });
            return;
        }

        let mut branches = Vec::new();
        let mut test = Some(test);
        loop {
            let (block, ender) = self.compile_nested(&[
                Token::Kw(Keyword::Elif),
                Token::Kw(Keyword::Else),
                Token::Kw(Keyword::Endif),
            ]);
            branches.push(Branch {
                test: test.take(),
                body: block,
            });
            match ender {
                Token::Kw(Keyword::Elif) => {
                    test = Some(self.parse_int_expression());
                    self.expect_kw(Keyword::Then);
                    self.expect_end_of_statement();
                }
                Token::Kw(Keyword::Else) => {
                    self.expect_end_of_statement();
                    let (block, _) = self.compile_nested(&[Token::Kw(Keyword::Endif)]);
                    branches.push(Branch {
                        test: None,
                        body: block,
                    });
                    break;
                }
                _ => break,
            }
        }
        body.push(ParseNode::Conditional { branches });
    }

    /// `CASE e OF / WHEN v[,..] body / OTHERWISE body / ENDCASE`. Each
    /// WHEN expands to `e = v1 OR e = v2 OR ..`.
    pub(crate) fn parse_case(&mut self, body: &mut Vec<ParseNode>) {
        let subject = self.parse_expression();
        self.expect_kw(Keyword::Of);
        self.expect_end_of_statement();

        // Nothing may stand between CASE OF and the first WHEN. This scan
        // produces no tree block, so it must not take a block number.
        let mut stray = Vec::new();
        let mut ender = self.compile_block(
            &[Token::Kw(Keyword::When), Token::Kw(Keyword::Endcase)],
            &mut stray,
        );
        if stray
            .iter()
            .any(|n| !matches!(n, ParseNode::MarkLine(_)))
        {
            self.err(
                ErrorCode::UnexpectedToken,
                "statements are not allowed between CASE and the first WHEN",
            );
        }

        let mut branches = Vec::new();
        while ender == Token::Kw(Keyword::When) {
            let test = self.parse_when_tests(&subject);
            self.expect_end_of_statement();
            let (block, next) = self.compile_nested(&[
                Token::Kw(Keyword::When),
                Token::Kw(Keyword::Otherwise),
                Token::Kw(Keyword::Endcase),
            ]);
            branches.push(Branch {
                test: Some(test),
                body: block,
            });
            ender = next;
        }

        if ender == Token::Kw(Keyword::Otherwise) {
            self.expect_end_of_statement();
            let (block, _) = self.compile_nested(&[Token::Kw(Keyword::Endcase)]);
            branches.push(Branch {
                test: None,
                body: block,
            });
        }

        body.push(ParseNode::Conditional { branches });
    }

    /// `v1, v2, ..` after WHEN, expanded against the CASE subject.
    fn parse_when_tests(&mut self, subject: &ParseNode) -> ParseNode {
        let mut test: Option<ParseNode> = None;
        loop {
            let value = self.parse_expression();
            let subject_ty = subject.ty(&self.arena);
            let value_ty = value.ty(&self.arena);
            if subject_ty.is_numeric() != value_ty.is_numeric() {
                self.err(
                    ErrorCode::TypeMismatch,
                    "WHEN value does not match the CASE expression type",
                );
            }
            let compare = ParseNode::Binary {
                op: BinaryOp::Eq,
                ty: FullType::of(BaseType::Integer),
                left: Box::new(subject.clone()),
                right: Box::new(value),
            };
            test = Some(match test {
                None => compare,
                Some(prev) => ParseNode::Binary {
                    op: BinaryOp::Or,
                    ty: FullType::of(BaseType::Integer),
                    left: Box::new(prev),
                    right: Box::new(compare),
                },
            });
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        test.unwrap_or_else(|| self.int_node(0))
    }

    /// `FOR id := start TO end [STEP step] DO`, multi-line up to
    /// `NEXT [id]` or single-line with the statement after DO. The loop
    /// variable lives in a per-FOR scope.
    pub(crate) fn parse_for(&mut self, body: &mut Vec<ParseNode>) {
        let name = match self.line.next_token() {
            Token::Identifier(name) => name,
            other => {
                self.err(
                    ErrorCode::ExpectedToken,
                    format!("loop variable expected, found '{}'", other),
                );
                self.skip_to_eol();
                return;
            }
        };

        self.scopes.push_for();
        let ty = FullType::from_suffix(&name);
        if !ty.is_numeric() {
            self.err(
                ErrorCode::NumberExpected,
                format!("loop variable '{}' must be numeric", name),
            );
        }
        let var = {
            let mut sym = Symbol::var(&name, ty, crate::symbol::SymScope::Local);
            sym.defined = true;
            sym.referenced = true;
            let id = self.arena.alloc(sym);
            self.scopes.add_to_current(&name, id);
            id
        };

        if !self.consume(&Token::Assign) && !(!self.opts.strict && self.consume(&Token::Eq)) {
            self.err(ErrorCode::ExpectedToken, "':=' expected after FOR variable");
        }
        let start = self.parse_int_expression();
        self.expect_kw(Keyword::To);
        let end = self.parse_int_expression();
        let step = if self.consume_kw(Keyword::Step) {
            Some(self.parse_int_expression())
        } else {
            None
        };
        self.warn_if_skipped(&start, &end, step.as_ref());
        self.expect_kw(Keyword::Do);

        self.loop_stack.push(LoopKind::For);
        let loop_body = if !self.line.at_end() {
            self.compile_single()
        } else {
            let (block, _) = self.compile_nested(&[Token::Kw(Keyword::Next)]);
            // NEXT may repeat the loop variable.
            if let Token::Identifier(next_name) = self.line.peek().clone() {
                self.line.next_token();
                if !next_name.eq_ignore_ascii_case(&name) {
                    self.err(
                        ErrorCode::UnexpectedToken,
                        format!("NEXT {} does not match FOR {}", next_name, name),
                    );
                }
            }
            block
        };
        self.loop_stack.pop();
        self.scopes.pop_frame();

        body.push(ParseNode::Loop {
            kind: LoopKind::For,
            var: Some(var),
            start: Some(Box::new(start)),
            end: Some(Box::new(end)),
            step: step.map(Box::new),
            break_expr: None,
            body: loop_body,
        });
    }

    /// Constant bounds that can never iterate draw a warning.
    fn warn_if_skipped(&mut self, start: &ParseNode, end: &ParseNode, step: Option<&ParseNode>) {
        let (Some(s), Some(e)) = (start.constant_int(), end.constant_int()) else {
            return;
        };
        let k = match step {
            Some(node) => match node.constant_int() {
                Some(k) => k,
                None => return,
            },
            None => 1,
        };
        let skipped = (k > 0 && s > e) || (k < 0 && s < e) || k == 0;
        if skipped {
            self.warn(ErrorCode::LoopSkipped, "FOR loop never iterates");
        }
    }

    /// `WHILE e DO body ENDWHILE` or single-line `WHILE e DO stmt`.
    pub(crate) fn parse_while(&mut self, body: &mut Vec<ParseNode>) {
        let test = self.parse_int_expression();
        self.expect_kw(Keyword::Do);
        self.loop_stack.push(LoopKind::While);
        let loop_body = if !self.line.at_end() {
            self.compile_single()
        } else {
            let (block, _) = self.compile_nested(&[Token::Kw(Keyword::Endwhile)]);
            block
        };
        self.loop_stack.pop();
        body.push(ParseNode::Loop {
            kind: LoopKind::While,
            var: None,
            start: None,
            end: None,
            step: None,
            break_expr: Some(Box::new(test)),
            body: loop_body,
        });
    }

    /// `REPEAT body UNTIL e` (post-tested).
    pub(crate) fn parse_repeat(&mut self, body: &mut Vec<ParseNode>) {
        self.expect_end_of_statement();
        self.loop_stack.push(LoopKind::Repeat);
        let (block, _) = self.compile_nested(&[Token::Kw(Keyword::Until)]);
        self.loop_stack.pop();
        let test = self.parse_int_expression();
        body.push(ParseNode::Loop {
            kind: LoopKind::Repeat,
            var: None,
            start: None,
            end: None,
            step: None,
            break_expr: Some(Box::new(test)),
            body: block,
        });
    }

    /// `LOOP body ENDLOOP`; the body leaves through EXIT.
    pub(crate) fn parse_loop(&mut self, body: &mut Vec<ParseNode>) {
        self.expect_end_of_statement();
        self.loop_stack.push(LoopKind::Forever);
        let (block, _) = self.compile_nested(&[Token::Kw(Keyword::Endloop)]);
        self.loop_stack.pop();
        body.push(ParseNode::Loop {
            kind: LoopKind::Forever,
            var: None,
            start: None,
            end: None,
            step: None,
            break_expr: None,
            body: block,
        });
    }

    /// `EXIT [WHEN e]`: break from the enclosing LOOP.
    pub(crate) fn parse_exit(&mut self, body: &mut Vec<ParseNode>) {
        if !self.loop_stack.contains(&LoopKind::Forever) {
            self.err(ErrorCode::BadExit, "EXIT outside a LOOP block");
        }
        let condition = if self.consume_kw(Keyword::When) {
            Some(Box::new(self.parse_int_expression()))
        } else {
            None
        };
        body.push(ParseNode::Break { condition });
    }

    /// `TRAP body [HANDLER body] ENDTRAP`, or `TRAP ESC +|-`.
    pub(crate) fn parse_trap(&mut self, body: &mut Vec<ParseNode>) {
        if self.consume_kw(Keyword::Esc) {
            let on = match self.line.next_token() {
                Token::Plus => 1,
                Token::Minus => 0,
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("'+' or '-' expected after TRAP ESC, found '{}'", other),
                    );
                    1
                }
            };
            let flag = self.int_node(on);
            body.push(self.runtime_call(LIB_RUNTIME, "SETESCAPE", vec![flag]));
            return;
        }

        self.expect_end_of_statement();
        self.saw_trap = true;
        let err_sym = self.runtime_global("_ERR", FullType::of(BaseType::Integer));
        let errtext_sym = self.runtime_global("_ERRTEXT$", FullType::from_suffix("$"));

        let (block, ender) = self.compile_nested(&[
            Token::Kw(Keyword::Handler),
            Token::Kw(Keyword::Endtrap),
        ]);
        let handler = if ender == Token::Kw(Keyword::Handler) {
            self.expect_end_of_statement();
            let (handler, _) = self.compile_nested(&[Token::Kw(Keyword::Endtrap)]);
            handler
        } else {
            Vec::new()
        };

        body.push(ParseNode::Trappable {
            body: block,
            handler,
            err_sym,
            errtext_sym,
        });
    }

    /// `LABEL id[:]` and the bare `id:` form handled by the identifier
    /// dispatch.
    pub(crate) fn parse_label(&mut self, body: &mut Vec<ParseNode>) {
        let name = match self.line.next_token() {
            Token::Identifier(name) => name,
            other => {
                self.err(
                    ErrorCode::ExpectedToken,
                    format!("label name expected, found '{}'", other),
                );
                self.skip_to_eol();
                return;
            }
        };
        self.consume(&Token::Colon);
        let id = self.get_or_make_label(&name, true);
        body.push(ParseNode::MarkLabel(id));
    }

    pub(crate) fn parse_goto(&mut self, body: &mut Vec<ParseNode>) {
        let name = match self.line.next_token() {
            Token::Identifier(name) => name,
            other => {
                self.err(
                    ErrorCode::ExpectedToken,
                    format!("label name expected after GOTO, found '{}'", other),
                );
                self.skip_to_eol();
                return;
            }
        };
        let id = self.get_or_make_label(&name, false);
        self.mark_referenced(id);
        body.push(ParseNode::Goto(id));
    }

    /// Labels are scoped to one routine; lookup never consults outer
    /// scopes or globals. A declaration fixes the label's block depth.
    pub(crate) fn get_or_make_label(&mut self, name: &str, is_declaration: bool) -> SymbolId {
        if let Some(id) = self.scopes.resolve_in_routine(name) {
            let class = self.arena.get(id).class;
            if class == SymClass::Label {
                if is_declaration {
                    if self.arena.get(id).defined {
                        self.err(
                            ErrorCode::LabelAlreadyDeclared,
                            format!("label '{}' is already declared", name),
                        );
                    } else {
                        let depth = self.block_depth;
                        let sym = self.arena.get_mut(id);
                        sym.defined = true;
                        sym.depth = depth;
                    }
                }
                return id;
            }
            self.err(
                ErrorCode::TypeMismatch,
                format!("'{}' is not a label", name),
            );
        }
        let mut sym = Symbol::label(name, self.block_depth);
        sym.defined = is_declaration;
        if !is_declaration {
            // Depth is fixed when the declaration is seen.
            sym.depth = 0;
        }
        let id = self.arena.alloc(sym);
        self.scopes.add_to_routine(name, id);
        id
    }
}
