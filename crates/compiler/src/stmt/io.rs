//! I/O statements and their lowering to runtime calls.
//!
//! PRINT collects its items into a vararg payload with a parallel format
//! string: one character per entry (`I` int, `F` float, `S` string,
//! `T` tab, `H` comma-zone, `V` semicolon-null, `N` newline, `6` form
//! feed). File statements become FileManager calls with the mode words
//! translated to mode strings.

use crate::ast::{Argument, InputPosition, InputTerminator, ParseNode};
use crate::diag::ErrorCode;
use crate::driver::Compiler;
use crate::intrinsics::{LIB_FILE, LIB_INTRINSICS, LIB_PRINT, LIB_RUNTIME};
use crate::symbol::{BaseType, FullType};
use crate::token::{Keyword, Token};

impl Compiler<'_> {
    /// External statement call: by-value arguments, no result.
    pub(crate) fn runtime_call(
        &self,
        library: &str,
        name: &str,
        args: Vec<ParseNode>,
    ) -> ParseNode {
        ParseNode::ExtCall {
            library: library.to_string(),
            name: name.to_string(),
            args: args
                .into_iter()
                .map(|node| Argument {
                    node,
                    by_ref: false,
                })
                .collect(),
            ty: FullType::of(BaseType::None),
            inline: false,
        }
    }

    /// `PRINT [FILE fh:] [AT r,c:] [USING fmt:] items`.
    pub(crate) fn parse_print(&mut self, body: &mut Vec<ParseNode>) {
        let mut file = None;
        if self.consume_kw(Keyword::File) {
            file = Some(self.parse_int_expression());
            self.expect(&Token::Colon);
        }
        if self.consume_kw(Keyword::At) {
            if file.is_some() {
                self.err(
                    ErrorCode::IllegalAtWithFile,
                    "AT cannot be combined with FILE",
                );
            }
            let row = self.parse_int_expression();
            self.expect(&Token::Comma);
            let col = self.parse_int_expression();
            self.expect(&Token::Colon);
            body.push(self.runtime_call(LIB_RUNTIME, "CURSOR", vec![row, col]));
        }
        let using = if self.consume_kw(Keyword::Using) {
            let fmt = self.parse_string_expression();
            self.expect(&Token::Colon);
            Some(fmt)
        } else {
            None
        };

        let mut fmt = String::new();
        let mut items = Vec::new();
        let mut at_separator = false;
        while !self.line.at_end() {
            match self.line.peek().clone() {
                Token::Comma => {
                    self.line.next_token();
                    fmt.push('H');
                    at_separator = true;
                }
                Token::Semi => {
                    self.line.next_token();
                    fmt.push('V');
                    at_separator = true;
                }
                Token::Kw(Keyword::Tab) => {
                    self.line.next_token();
                    self.expect(&Token::LParen);
                    let column = self.parse_int_expression();
                    self.expect(&Token::RParen);
                    fmt.push('T');
                    items.push(column);
                    at_separator = false;
                }
                Token::Kw(Keyword::Page) => {
                    self.line.next_token();
                    fmt.push('6');
                    at_separator = false;
                }
                _ => {
                    let before = self.line.mark();
                    let item = self.parse_expression();
                    if self.line.mark() == before {
                        // The operand parser gave up without consuming
                        // anything; drop the rest of the line.
                        self.skip_to_eol();
                        break;
                    }
                    let ty = item.ty(&self.arena);
                    fmt.push(match ty.base {
                        BaseType::Integer => 'I',
                        BaseType::Char | BaseType::FixedChar => 'S',
                        _ => 'F',
                    });
                    items.push(item);
                    at_separator = false;
                }
            }
        }
        if !at_separator {
            fmt.push('N');
        }

        // USING pre-formats the payload into one string item.
        let (fmt, items) = match using {
            Some(fmt_expr) => {
                let mut args = vec![Argument {
                    node: fmt_expr,
                    by_ref: false,
                }];
                args.push(Argument {
                    node: ParseNode::VarArg(items),
                    by_ref: false,
                });
                let call = ParseNode::ExtCall {
                    library: LIB_INTRINSICS.to_string(),
                    name: "USING".to_string(),
                    args,
                    ty: FullType::of(BaseType::Char),
                    inline: false,
                };
                let fmt = if fmt.ends_with('N') { "SN" } else { "S" };
                (fmt.to_string(), vec![call])
            }
            None => (fmt, items),
        };

        let mut args = Vec::new();
        let has_file = file.is_some();
        if let Some(fh) = file {
            args.push(fh);
        }
        args.push(ParseNode::Str(fmt));
        args.push(ParseNode::VarArg(items));
        let name = if has_file { "PRINTFILE" } else { "PRINT" };
        body.push(self.runtime_call(LIB_PRINT, name, args));
    }

    /// `INPUT [FILE fh:] [AT r,c[,w]:] ["prompt":] id[, ..][;|,]`.
    pub(crate) fn parse_input(&mut self, body: &mut Vec<ParseNode>) {
        let mut file = None;
        if self.consume_kw(Keyword::File) {
            file = Some(Box::new(self.parse_int_expression()));
            self.expect(&Token::Colon);
        }

        let mut position = None;
        if self.consume_kw(Keyword::At) {
            if file.is_some() {
                self.err(
                    ErrorCode::IllegalAtWithFile,
                    "AT cannot be combined with FILE",
                );
            }
            let row = Box::new(self.parse_int_expression());
            self.expect(&Token::Comma);
            let col = Box::new(self.parse_int_expression());
            let width = if self.consume(&Token::Comma) {
                Some(Box::new(self.parse_int_expression()))
            } else {
                None
            };
            self.expect(&Token::Colon);
            position = Some(InputPosition { row, col, width });
        }

        let mut prompt = None;
        if let Token::Str(text) = self.line.peek().clone() {
            self.line.next_token();
            self.expect(&Token::Colon);
            prompt = Some(text);
        }

        let mut targets = Vec::new();
        let mut terminator = InputTerminator::Newline;
        loop {
            match self.line.next_token() {
                Token::Identifier(name) => {
                    let id = self.resolve_target(&name);
                    targets.push(self.finish_variable(id));
                }
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("variable expected in INPUT, found '{}'", other),
                    );
                    self.skip_to_eol();
                    break;
                }
            }
            if self.consume(&Token::Comma) {
                if self.line.at_end() {
                    terminator = InputTerminator::NextZone;
                    break;
                }
                continue;
            }
            if self.consume(&Token::Semi) {
                terminator = InputTerminator::None;
            }
            break;
        }

        // One string target at most, it must come last, and string arrays
        // are not accepted.
        let last = targets.len().saturating_sub(1);
        for (i, target) in targets.iter().enumerate() {
            let ty = target.ty(&self.arena);
            if !ty.is_string() {
                continue;
            }
            let array = matches!(
                target,
                ParseNode::Identifier { sym, .. } if self.arena.get(*sym).is_array()
            );
            if array {
                self.err(
                    ErrorCode::TypeMismatch,
                    "string arrays may not receive INPUT",
                );
            } else if i != last {
                self.err(
                    ErrorCode::TypeMismatch,
                    "a string INPUT variable must come last",
                );
            }
        }

        body.push(ParseNode::Input {
            file,
            prompt,
            position,
            terminator,
            targets,
        });
    }

    // ---- file statements ---------------------------------------------------

    /// `OPEN [FILE] fh, name, READ|WRITE|APPEND|RANDOM [, recsize]`.
    pub(crate) fn parse_open(&mut self, body: &mut Vec<ParseNode>) {
        self.consume_kw(Keyword::File);
        let fh = self.parse_int_expression();
        self.expect(&Token::Comma);
        let name = self.parse_string_expression();
        self.expect(&Token::Comma);

        let mode = match self.line.next_token() {
            Token::Kw(Keyword::Read) => "r",
            Token::Kw(Keyword::Write) => "w",
            Token::Kw(Keyword::Append) => "w+",
            Token::Kw(Keyword::Random) => "x",
            other => {
                self.err(
                    ErrorCode::ExpectedToken,
                    format!("file mode expected, found '{}'", other),
                );
                "r"
            }
        };

        let mut args = vec![fh, name, ParseNode::Str(mode.to_string())];
        if mode == "x" && self.consume(&Token::Comma) {
            args.push(self.parse_int_expression());
        }
        body.push(self.runtime_call(LIB_FILE, "OPEN", args));
    }

    /// `CLOSE [[FILE] fh]`; without a handle every open file closes.
    pub(crate) fn parse_close(&mut self, body: &mut Vec<ParseNode>) {
        self.consume_kw(Keyword::File);
        let args = if self.line.at_end() {
            Vec::new()
        } else {
            vec![self.parse_int_expression()]
        };
        body.push(self.runtime_call(LIB_FILE, "CLOSE", args));
    }

    /// `CREATE name [, records [, recsize]]`.
    pub(crate) fn parse_create(&mut self, body: &mut Vec<ParseNode>) {
        let mut args = vec![self.parse_string_expression()];
        while self.consume(&Token::Comma) {
            args.push(self.parse_int_expression());
        }
        body.push(self.runtime_call(LIB_FILE, "CREATE", args));
    }

    /// `DELETE name`.
    pub(crate) fn parse_delete(&mut self, body: &mut Vec<ParseNode>) {
        let name = self.parse_string_expression();
        body.push(self.runtime_call(LIB_FILE, "DELETE", vec![name]));
    }

    /// `READ FILE fh[, rec]: id[, ..]`: binary record read, targets by
    /// reference.
    pub(crate) fn parse_read_file(&mut self, body: &mut Vec<ParseNode>) {
        self.consume_kw(Keyword::File);
        let fh = self.parse_int_expression();
        let rec = if self.consume(&Token::Comma) {
            Some(self.parse_int_expression())
        } else {
            None
        };
        self.expect(&Token::Colon);

        let mut targets = Vec::new();
        loop {
            match self.line.next_token() {
                Token::Identifier(name) => {
                    let id = self.resolve_target(&name);
                    targets.push(self.finish_variable(id));
                }
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("variable expected in READ FILE, found '{}'", other),
                    );
                    self.skip_to_eol();
                    break;
                }
            }
            if !self.consume(&Token::Comma) {
                break;
            }
        }

        let mut args = vec![
            Argument {
                node: fh,
                by_ref: false,
            },
        ];
        if let Some(rec) = rec {
            args.push(Argument {
                node: rec,
                by_ref: false,
            });
        }
        args.push(Argument {
            node: ParseNode::VarArg(targets),
            by_ref: true,
        });
        body.push(ParseNode::ExtCall {
            library: LIB_FILE.to_string(),
            name: "READ".to_string(),
            args,
            ty: FullType::of(BaseType::None),
            inline: false,
        });
    }

    /// `WRITE FILE fh[, rec]: e[, ..]`: binary record write.
    pub(crate) fn parse_write(&mut self, body: &mut Vec<ParseNode>) {
        self.consume_kw(Keyword::File);
        let fh = self.parse_int_expression();
        let rec = if self.consume(&Token::Comma) {
            Some(self.parse_int_expression())
        } else {
            None
        };
        self.expect(&Token::Colon);

        let mut items = Vec::new();
        loop {
            items.push(self.parse_expression());
            if !self.consume(&Token::Comma) {
                break;
            }
        }

        let mut args = vec![fh];
        if let Some(rec) = rec {
            args.push(rec);
        }
        args.push(ParseNode::VarArg(items));
        body.push(self.runtime_call(LIB_FILE, "WRITE", args));
    }

    // ---- console statements ------------------------------------------------

    pub(crate) fn parse_page(&mut self, body: &mut Vec<ParseNode>) {
        body.push(self.runtime_call(LIB_RUNTIME, "CLS", Vec::new()));
    }

    pub(crate) fn parse_cursor(&mut self, body: &mut Vec<ParseNode>) {
        let row = self.parse_int_expression();
        self.expect(&Token::Comma);
        let col = self.parse_int_expression();
        body.push(self.runtime_call(LIB_RUNTIME, "CURSOR", vec![row, col]));
    }

    pub(crate) fn parse_colour(&mut self, body: &mut Vec<ParseNode>) {
        let colour = self.parse_int_expression();
        body.push(self.runtime_call(LIB_RUNTIME, "COLOUR", vec![colour]));
    }

    pub(crate) fn parse_zone(&mut self, body: &mut Vec<ParseNode>) {
        let width = self.parse_int_expression();
        body.push(self.runtime_call(LIB_FILE, "set_Zone", vec![width]));
    }

    pub(crate) fn parse_randomize(&mut self, body: &mut Vec<ParseNode>) {
        let args = if self.line.at_end() {
            Vec::new()
        } else {
            vec![self.parse_int_expression()]
        };
        body.push(self.runtime_call(LIB_RUNTIME, "RANDOMIZE", args));
    }

    pub(crate) fn parse_dir(&mut self, body: &mut Vec<ParseNode>) {
        let args = if self.line.at_end() {
            Vec::new()
        } else {
            vec![self.parse_string_expression()]
        };
        body.push(self.runtime_call(LIB_RUNTIME, "CATALOG", args));
    }

    /// `STOP [msg]` / `END [msg]`: runtime halt with the current line.
    pub(crate) fn parse_stop_end(&mut self, body: &mut Vec<ParseNode>, which: &str) {
        let message = if self.line.at_end() {
            ParseNode::Str(String::new())
        } else {
            self.parse_string_expression()
        };
        let line = self.int_node(self.comal_line as i32);
        body.push(self.runtime_call(LIB_RUNTIME, which, vec![message, line]));
    }

    /// `REPORT [code]`: raise (or re-raise inside a HANDLER).
    pub(crate) fn parse_report(&mut self, body: &mut Vec<ParseNode>) {
        let args = if self.line.at_end() {
            Vec::new()
        } else {
            vec![self.parse_int_expression()]
        };
        body.push(self.runtime_call(LIB_RUNTIME, "REPORT", args));
    }
}
