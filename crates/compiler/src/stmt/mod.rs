//! Statement parser: one routine per keyword, block compilation with
//! end-token sets, and the statement-ordering state machine.
//!
//! Error recovery: a syntax error is reported with the current line
//! number, the rest of the line is consumed, and parsing continues with
//! the next line.

pub mod control;
pub mod decl;
pub mod io;

use crate::ast::{BinaryOp, ParseNode};
use crate::diag::ErrorCode;
use crate::driver::{BlockState, Compiler};
use crate::symbol::SymClass;
use crate::token::{Keyword, Token};
use crate::variant::Variant;

impl Compiler<'_> {
    /// Compile lines into `body` until one opens with a token from
    /// `enders`; that token is consumed and returned. End of stream
    /// reports MISSINGENDSTATEMENT and returns `EndOfFile`.
    pub(crate) fn compile_block(
        &mut self,
        enders: &[Token],
        body: &mut Vec<ParseNode>,
    ) -> Token {
        loop {
            if !self.next_line() {
                self.err(
                    ErrorCode::MissingEndStatement,
                    format!("missing '{}'", enders[0]),
                );
                return Token::EndOfFile;
            }
            body.push(self.mark_line_node());
            if self.line.at_end() {
                continue;
            }
            let head = self.line.peek().clone();
            if enders.contains(&head) {
                self.line.next_token();
                return head;
            }
            self.parse_statement(body);
            self.expect_end_of_statement();
        }
    }

    /// An inner block (IF branch, loop body, TRAP region). Every block
    /// gets the next number from a pre-order counter that never rewinds
    /// within a routine; labels remember their block's number and the
    /// post-validation walk reproduces the same numbering to reject GOTOs
    /// into blocks opened after their own.
    pub(crate) fn compile_nested(&mut self, enders: &[Token]) -> (Vec<ParseNode>, Token) {
        self.block_depth += 1;
        let mut body = Vec::new();
        let ender = self.compile_block(enders, &mut body);
        (body, ender)
    }

    /// Single-statement body of a one-line IF/FOR/WHILE; numbers like any
    /// other block.
    pub(crate) fn compile_single(&mut self) -> Vec<ParseNode> {
        self.block_depth += 1;
        let mut body = Vec::new();
        self.parse_statement(&mut body);
        body
    }

    /// Parse one statement, dispatching on its first token.
    pub(crate) fn parse_statement(&mut self, body: &mut Vec<ParseNode>) {
        match self.line.peek().clone() {
            Token::Kw(kw) => self.parse_keyword_statement(kw, body),
            Token::Identifier(name) => {
                self.line.next_token();
                self.parse_named_statement(name, body);
            }
            Token::Error { message, text } => {
                self.line.next_token();
                self.err(
                    ErrorCode::UnexpectedToken,
                    format!("{}: '{}'", message, text),
                );
                self.skip_to_eol();
            }
            other => {
                self.line.next_token();
                self.err(
                    ErrorCode::UnexpectedToken,
                    format!("statement expected, found '{}'", other),
                );
                self.skip_to_eol();
            }
        }
    }

    fn parse_keyword_statement(&mut self, kw: Keyword, body: &mut Vec<ParseNode>) {
        // Keywords that open their own classification.
        match kw {
            Keyword::Module | Keyword::Export => {
                self.line.next_token();
                if !self.enter_state(BlockState::Program) {
                    self.skip_to_eol();
                    return;
                }
                if kw == Keyword::Module {
                    self.parse_module();
                } else {
                    self.parse_export();
                }
                return;
            }
            Keyword::Proc | Keyword::Func => {
                self.line.next_token();
                self.enter_state(BlockState::Subfunc);
                self.parse_routine(kw == Keyword::Func);
                return;
            }
            // A block ender with no open block.
            Keyword::Endproc
            | Keyword::Endfunc
            | Keyword::Endif
            | Keyword::Endcase
            | Keyword::Endwhile
            | Keyword::Endloop
            | Keyword::Endtrap
            | Keyword::Next
            | Keyword::Until
            | Keyword::Elif
            | Keyword::Else
            | Keyword::When
            | Keyword::Otherwise
            | Keyword::Handler => {
                self.line.next_token();
                self.err(
                    ErrorCode::UnexpectedToken,
                    format!("'{}' without a matching block", kw.name()),
                );
                self.skip_to_eol();
                return;
            }
            _ => {}
        }

        if !self.enter_state(BlockState::Statement) {
            self.skip_to_eol();
            return;
        }
        self.line.next_token();
        match kw {
            Keyword::Let => {
                // LET is optional noise before an assignment.
                match self.line.next_token() {
                    Token::Identifier(name) => self.parse_named_statement(name, body),
                    other => {
                        self.err(
                            ErrorCode::ExpectedToken,
                            format!("variable expected after LET, found '{}'", other),
                        );
                        self.skip_to_eol();
                    }
                }
            }
            Keyword::Dim => self.parse_dim(),
            Keyword::Import => self.parse_import(),
            Keyword::Return => self.parse_return(body),
            Keyword::Exec => self.parse_exec(body),
            Keyword::If => self.parse_if(body),
            Keyword::Case => self.parse_case(body),
            Keyword::For => self.parse_for(body),
            Keyword::While => self.parse_while(body),
            Keyword::Repeat => self.parse_repeat(body),
            Keyword::Loop => self.parse_loop(body),
            Keyword::Exit => self.parse_exit(body),
            Keyword::Trap => self.parse_trap(body),
            Keyword::Label => self.parse_label(body),
            Keyword::Goto => self.parse_goto(body),
            Keyword::Data => self.parse_data(),
            Keyword::Read => self.parse_read(body),
            Keyword::Restore => self.parse_restore(body),
            Keyword::Open => self.parse_open(body),
            Keyword::Close => self.parse_close(body),
            Keyword::Create => self.parse_create(body),
            Keyword::Delete => self.parse_delete(body),
            Keyword::Write => self.parse_write(body),
            Keyword::Input => self.parse_input(body),
            Keyword::Print => self.parse_print(body),
            Keyword::Page => self.parse_page(body),
            Keyword::Cursor => self.parse_cursor(body),
            Keyword::Colour => self.parse_colour(body),
            Keyword::Zone => self.parse_zone(body),
            Keyword::Randomize => self.parse_randomize(body),
            Keyword::Dir | Keyword::Cat => self.parse_dir(body),
            Keyword::Stop => self.parse_stop_end(body, "STOP"),
            Keyword::End => self.parse_stop_end(body, "END"),
            Keyword::Report => self.parse_report(body),
            other => {
                self.err(
                    ErrorCode::TokenNotPermitted,
                    format!("'{}' cannot start a statement", other.name()),
                );
                self.skip_to_eol();
            }
        }
    }

    /// A statement opening with an identifier: a label declaration, a
    /// statement function, a procedure call, or an assignment list. The
    /// statement-function check comes before the state transition because
    /// its classification differs.
    fn parse_named_statement(&mut self, name: String, body: &mut Vec<ParseNode>) {
        // `name(params) = expr` on an unknown name defines a statement
        // function (it runs the Specification transition itself).
        if self.scopes.resolve(&name).is_none()
            && *self.line.peek() == Token::LParen
            && self.try_statement_function(&name)
        {
            return;
        }

        if !self.enter_state(BlockState::Statement) {
            self.skip_to_eol();
            return;
        }

        // `name:` at end of line declares a label.
        if *self.line.peek() == Token::Colon {
            let mark = self.line.mark();
            self.line.next_token();
            if self.line.at_end() {
                let id = self.get_or_make_label(&name, true);
                body.push(ParseNode::MarkLabel(id));
                return;
            }
            self.line.rewind_to(mark);
        }

        // A known procedure name is a call statement.
        if let Some(id) = self.scopes.resolve(&name)
            && self.arena.get(id).class == SymClass::Subroutine
        {
            self.mark_referenced(id);
            let args = self.parse_call_args(id);
            body.push(ParseNode::Call { sym: id, args });
            return;
        }

        self.parse_assignment(name, body);
    }

    /// A comma-separated list of `target := value` (or `:+` / `:-`
    /// compound) assignments, collected into one node.
    fn parse_assignment(&mut self, first_name: String, body: &mut Vec<ParseNode>) {
        let mut targets = Vec::new();
        let mut values = Vec::new();
        let mut name = first_name;

        loop {
            let id = self.resolve_target(&name);
            let target = self.finish_variable(id);
            let target_ty = target.ty(&self.arena);

            let op = self.line.next_token();
            let compound = match op {
                Token::Assign => None,
                Token::IncAssign => Some(BinaryOp::Add),
                Token::DecAssign => Some(BinaryOp::Sub),
                Token::Eq if !self.opts.strict => None,
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("':=' expected, found '{}'", other),
                    );
                    self.skip_to_eol();
                    return;
                }
            };

            let value = self.parse_expression();
            let value = match compound {
                Some(op) => {
                    let node = self.make_compound(op, target.clone(), value);
                    self.fold_expr(node)
                }
                None => value,
            };

            let value_ty = value.ty(&self.arena);
            if target_ty.is_numeric() != value_ty.is_numeric() {
                self.err(
                    ErrorCode::TypeMismatch,
                    format!(
                        "cannot assign {} to {}",
                        value_ty.base.name(),
                        target_ty.base.name()
                    ),
                );
            }

            targets.push(target);
            values.push(value);

            if !self.consume(&Token::Comma) {
                break;
            }
            match self.line.next_token() {
                Token::Identifier(next) => name = next,
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("variable expected, found '{}'", other),
                    );
                    self.skip_to_eol();
                    break;
                }
            }
        }

        body.push(ParseNode::Assignment { targets, values });
    }

    /// Build `target op value` for `:+` / `:-`.
    fn make_compound(&mut self, op: BinaryOp, target: ParseNode, value: ParseNode) -> ParseNode {
        let lt = target.ty(&self.arena);
        let rt = value.ty(&self.arena);
        let (op, ty) = match (op, lt.is_string() && rt.is_string()) {
            (BinaryOp::Add, true) => (BinaryOp::Concat, lt),
            (op, _) => {
                if !lt.is_numeric() || !rt.is_numeric() {
                    self.err(
                        ErrorCode::TypeMismatch,
                        "compound assignment needs matching types",
                    );
                }
                (op, lt)
            }
        };
        ParseNode::Binary {
            op,
            ty,
            left: Box::new(target),
            right: Box::new(value),
        }
    }

    /// Build an integer literal node (lowering helper).
    pub(crate) fn int_node(&self, value: i32) -> ParseNode {
        ParseNode::Number(Variant::Int(value))
    }
}
