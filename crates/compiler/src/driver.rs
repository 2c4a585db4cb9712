//! Two-pass compilation driver.
//!
//! Pass 0 pre-scans PROC/FUNC headers into the global collection so every
//! routine is known (with parameter types and linkage) before any call
//! site is compiled. Pass 1 compiles each line into the parse tree. After
//! all input, post-validation checks GOTO depths and EXPORT bindings and
//! settles the executable flag.

use std::path::PathBuf;

use crate::ast::{LoopKind, ParseNode, Procedure, ProgramDef};
use crate::diag::{Diagnostics, ErrorCode};
use crate::lexer::tokenize;
use crate::line::Line;
use crate::options::Options;
use crate::scope::ScopeStack;
use crate::store::LineStore;
use crate::symbol::{
    BaseType, Dimension, FullType, Linkage, Modifiers, SymClass, SymScope, Symbol, SymbolArena,
    SymbolId,
};
use crate::token::{Keyword, Token};
use crate::variant::Variant;

/// Name of the implicit entry-point routine.
pub const MAIN_NAME: &str = "Main";

/// Block-state machine for statement ordering. A statement is legal only
/// when its class is not earlier than the current state; `Subfunc`
/// transitions are always legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum BlockState {
    None,
    /// MODULE / EXPORT.
    Program,
    /// PROC / FUNC definitions.
    Subfunc,
    /// Statement functions.
    Specification,
    /// Everything else executable.
    Statement,
}

/// One input file's worth of tokenised lines.
struct SourceChunk {
    filename: Option<String>,
    lines: Vec<Line>,
}

pub struct Compiler<'a> {
    pub(crate) opts: &'a Options,
    pub(crate) diags: &'a mut Diagnostics,
    pub(crate) arena: SymbolArena,
    pub(crate) scopes: ScopeStack,
    pub(crate) procedures: Vec<Procedure>,
    chunks: Vec<SourceChunk>,
    /// Working lines of the chunk pass 1 is compiling.
    lines: Vec<Line>,
    index: usize,
    pub(crate) line: Line,
    pub(crate) comal_line: u32,
    pub(crate) physical_line: u32,
    pub(crate) module_name: String,
    pub(crate) state: BlockState,
    pub(crate) loop_stack: Vec<LoopKind>,
    pub(crate) block_depth: u32,
    pub(crate) executable: bool,
    pub(crate) current_routine: Option<SymbolId>,
    /// The routine being compiled contains a TRAP region.
    pub(crate) saw_trap: bool,
    /// The routine being compiled contains a RETURN.
    pub(crate) saw_return: bool,
    pub(crate) main_body: Vec<ParseNode>,
    /// Last (line, message) reported, for same-cause de-duplication.
    last_report: Option<(u32, String)>,
}

impl<'a> Compiler<'a> {
    pub fn new(opts: &'a Options, diags: &'a mut Diagnostics) -> Self {
        Compiler {
            opts,
            diags,
            arena: SymbolArena::new(),
            scopes: ScopeStack::new(),
            procedures: Vec::new(),
            chunks: Vec::new(),
            lines: Vec::new(),
            index: 0,
            line: Line::new(Vec::new()),
            comal_line: 0,
            physical_line: 0,
            module_name: String::new(),
            state: BlockState::None,
            loop_stack: Vec::new(),
            block_depth: 0,
            executable: false,
            current_routine: None,
            saw_trap: false,
            saw_return: false,
            main_body: Vec::new(),
            last_report: None,
        }
    }

    /// Queue plain source text. Physical line numbers are recorded for
    /// `--ide` reporting; Comal line numbers are whatever the text carries.
    pub fn add_source_text(&mut self, text: &str, filename: Option<String>) {
        let mut lines = Vec::new();
        for (i, src) in text.lines().enumerate() {
            let mut line = Line::new(tokenize(src));
            line.set_physical(i as u32 + 1);
            lines.push(line);
        }
        self.chunks.push(SourceChunk { filename, lines });
    }

    /// Queue pre-built lines (the REPL's synthetic `_Direct` wrapper uses
    /// this; internal names are not lexable).
    pub fn add_lines(&mut self, lines: Vec<Line>, filename: Option<String>) {
        self.chunks.push(SourceChunk { filename, lines });
    }

    /// Queue the contents of a line store (the RUN/SCAN path).
    pub fn add_store(&mut self, store: &LineStore, filename: Option<String>) {
        let mut cursor = store.cursor();
        let mut lines = Vec::new();
        while let Some(line) = cursor.next_line() {
            lines.push(line);
        }
        self.chunks.push(SourceChunk { filename, lines });
    }

    /// Run both passes over all queued sources and produce the tree.
    pub fn compile(mut self) -> ProgramDef {
        for i in 0..self.chunks.len() {
            self.diags.set_filename(self.chunks[i].filename.clone());
            self.scan_headers(i);
        }
        self.inject_main();

        for i in 0..self.chunks.len() {
            let filename = self.chunks[i].filename.clone();
            self.diags.set_filename(filename.clone());
            self.lines = std::mem::take(&mut self.chunks[i].lines);
            self.index = 0;
            if let Some(name) = filename {
                self.main_body
                    .push(ParseNode::MarkFilename(PathBuf::from(name)));
            }
            self.compile_top_level();
        }
        self.diags.set_filename(None);

        self.finish_main();
        self.post_validate();

        let name = if self.module_name.is_empty() {
            MAIN_NAME.to_string()
        } else {
            self.module_name.clone()
        };
        ProgramDef {
            name,
            arena: self.arena,
            globals: self.scopes.globals,
            procedures: self.procedures,
            executable: self.executable,
        }
    }

    // ---- diagnostics ------------------------------------------------------

    /// Line attached to diagnostics: the Comal line, or the physical line
    /// under `--ide` (and for unnumbered text), or nothing for direct
    /// statements.
    pub(crate) fn diag_line(&self) -> Option<u32> {
        if self.opts.ide && self.physical_line > 0 {
            Some(self.physical_line)
        } else if self.comal_line > 0 {
            Some(self.comal_line)
        } else if self.physical_line > 0 {
            Some(self.physical_line)
        } else {
            None
        }
    }

    /// Report an error, de-duplicating a repeat of the same message on the
    /// same line (repeated lexer Error tokens, cascading mismatches).
    pub(crate) fn err(&mut self, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        let key = (self.comal_line, message.clone());
        if self.last_report.as_ref() == Some(&key) {
            return;
        }
        self.diags.error(code, self.diag_line(), message);
        self.last_report = Some(key);
    }

    pub(crate) fn warn(&mut self, code: ErrorCode, message: impl Into<String>) {
        self.diags.warning(code, self.diag_line(), message);
    }

    // ---- line stream ------------------------------------------------------

    /// Load the next line of the current chunk; consumes its leading line
    /// number. False at end of chunk.
    pub(crate) fn next_line(&mut self) -> bool {
        let Some(line) = self.lines.get(self.index) else {
            return false;
        };
        self.index += 1;
        self.line = line.clone();
        self.line.reset();
        self.physical_line = self.line.physical();
        self.comal_line = self.line.take_line_number();
        self.last_report = None;
        true
    }

    pub(crate) fn mark_line_node(&self) -> ParseNode {
        let n = if self.comal_line > 0 {
            self.comal_line
        } else {
            self.physical_line
        };
        ParseNode::MarkLine(n)
    }

    // ---- token helpers ----------------------------------------------------

    /// Consume the next token when it matches; otherwise report
    /// EXPECTEDTOKEN, push the token back, and answer false.
    pub(crate) fn expect(&mut self, expected: &Token) -> bool {
        let got = self.line.next_token();
        if got == *expected {
            return true;
        }
        self.line.push_back();
        self.err(
            ErrorCode::ExpectedToken,
            format!("expected '{}' but found '{}'", expected, got),
        );
        false
    }

    pub(crate) fn expect_kw(&mut self, kw: Keyword) -> bool {
        self.expect(&Token::Kw(kw))
    }

    /// Consume the token when it matches; no diagnostics either way.
    pub(crate) fn consume(&mut self, token: &Token) -> bool {
        if *self.line.peek() == *token {
            self.line.next_token();
            true
        } else {
            false
        }
    }

    pub(crate) fn consume_kw(&mut self, kw: Keyword) -> bool {
        self.consume(&Token::Kw(kw))
    }

    pub(crate) fn check_kw(&mut self, kw: Keyword) -> bool {
        self.line.peek().is_kw(kw)
    }

    /// Everything on the line should have been consumed; report and skip
    /// the rest when it was not.
    pub(crate) fn expect_end_of_statement(&mut self) {
        if !self.line.at_end() {
            let got = self.line.next_token();
            self.err(
                ErrorCode::EndOfStatement,
                format!("end of statement expected, found '{}'", got),
            );
            self.skip_to_eol();
        }
    }

    pub(crate) fn skip_to_eol(&mut self) {
        while !self.line.at_end() {
            self.line.next_token();
        }
    }

    // ---- block-state machine ----------------------------------------------

    /// Admit a statement of the given class, advancing the state machine.
    /// False (with a report) when the statement comes too late.
    pub(crate) fn enter_state(&mut self, class: BlockState) -> bool {
        if class == BlockState::Subfunc {
            self.state = self.state.max(BlockState::Subfunc);
            return true;
        }
        if class < self.state {
            self.err(
                ErrorCode::TokenNotPermitted,
                "statement is not permitted at this point in the program",
            );
            return false;
        }
        self.state = self.state.max(class);
        true
    }

    // ---- shared symbol helpers ---------------------------------------------

    /// Fetch or install one of the process-global runtime symbols
    /// (`_DATA`, `_DATAINDEX`, `_EOD`, `_ERR`, `_ERRTEXT$`).
    pub(crate) fn runtime_global(&mut self, name: &str, ty: FullType) -> SymbolId {
        if let Some(id) = self.scopes.globals.get(name) {
            return id;
        }
        let mut sym = Symbol::var(name, ty, SymScope::Global);
        sym.modifiers |= Modifiers::STATIC | Modifiers::HIDDEN;
        sym.defined = true;
        sym.referenced = true;
        let id = self.arena.alloc(sym);
        self.scopes.globals.insert(name, id);
        id
    }

    pub(crate) fn mark_referenced(&mut self, id: SymbolId) {
        let line = self.diag_line();
        let sym = self.arena.get_mut(id);
        sym.referenced = true;
        if sym.ref_line.is_none() {
            sym.ref_line = line;
        }
    }

    // ---- pass 0 ------------------------------------------------------------

    /// Scan one chunk for PROC/FUNC headers, declaring global routine
    /// symbols with captured parameter types and linkage.
    fn scan_headers(&mut self, chunk: usize) {
        let mut parents: Vec<SymbolId> = Vec::new();
        for li in 0..self.chunks[chunk].lines.len() {
            let mut line = self.chunks[chunk].lines[li].clone();
            line.reset();
            self.comal_line = line.take_line_number();
            self.physical_line = line.physical();
            self.last_report = None;

            let class = match line.peek() {
                Token::Kw(Keyword::Proc) => SymClass::Subroutine,
                Token::Kw(Keyword::Func) => SymClass::Function,
                Token::Kw(Keyword::Endproc) | Token::Kw(Keyword::Endfunc) => {
                    parents.pop();
                    continue;
                }
                _ => continue,
            };
            line.next_token();

            let name = match line.next_token() {
                Token::Identifier(name) => name,
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("routine name expected, found '{}'", other),
                    );
                    continue;
                }
            };

            let full_type = if class == SymClass::Function {
                FullType::from_suffix(&name)
            } else {
                FullType::of(BaseType::None)
            };

            // A second definition is an error unless the existing entry is
            // a forward declaration (EXPORT) awaiting its body.
            let id = match self.scopes.globals.get(&name) {
                Some(existing) => {
                    let sym = self.arena.get(existing);
                    if sym.defined || !sym.is_routine() {
                        self.err(
                            ErrorCode::SubfuncDefined,
                            format!("'{}' is already defined", name),
                        );
                        continue;
                    }
                    let sym = self.arena.get_mut(existing);
                    sym.class = class;
                    sym.full_type = full_type;
                    existing
                }
                None => {
                    let sym = Symbol::routine(&name, class, full_type);
                    let id = self.arena.alloc(sym);
                    self.scopes.globals.insert(&name, id);
                    id
                }
            };

            let params = self.scan_params(&mut line);
            {
                let sym = self.arena.get_mut(id);
                sym.parent = parents.last().copied();
                sym.params = params;
                sym.defined = true;
            }

            // Header trailers: CLOSED and/or EXTERNAL "lib".
            let mut is_external = false;
            loop {
                match line.peek() {
                    Token::Kw(Keyword::Closed) => {
                        line.next_token();
                    }
                    Token::Kw(Keyword::External) => {
                        line.next_token();
                        match line.next_token() {
                            Token::Str(lib) => {
                                let sym = self.arena.get_mut(id);
                                sym.modifiers |= Modifiers::EXTERNAL;
                                sym.external_library = Some(lib);
                            }
                            other => self.err(
                                ErrorCode::ExpectedToken,
                                format!("library name string expected, found '{}'", other),
                            ),
                        }
                        is_external = true;
                    }
                    _ => break,
                }
            }

            if !is_external {
                parents.push(id);
            }
        }
    }

    /// Parse a parenthesised parameter list into fresh Parameter symbols.
    fn scan_params(&mut self, line: &mut Line) -> Vec<SymbolId> {
        let mut params = Vec::new();
        if *line.peek() != Token::LParen {
            return params;
        }
        line.next_token();
        if *line.peek() == Token::RParen {
            line.next_token();
            return params;
        }

        loop {
            let by_ref = if line.peek().is_kw(Keyword::Ref) {
                line.next_token();
                true
            } else {
                false
            };

            let name = match line.next_token() {
                Token::Identifier(name) => name,
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("parameter name expected, found '{}'", other),
                    );
                    // Recover at the closing parenthesis.
                    while !line.at_end() && *line.peek() != Token::RParen {
                        line.next_token();
                    }
                    break;
                }
            };

            let mut sym = Symbol::var(&name, FullType::from_suffix(&name), SymScope::Parameter);
            sym.linkage = if by_ref { Linkage::ByRef } else { Linkage::ByVal };
            sym.defined = true;

            // `name()` or `name(,,)`: an array parameter; commas count the
            // dimensions, bounds come from the caller.
            if *line.peek() == Token::LParen {
                line.next_token();
                let mut dims = 1usize;
                while *line.peek() == Token::Comma {
                    line.next_token();
                    dims += 1;
                }
                if *line.peek() == Token::RParen {
                    line.next_token();
                } else {
                    self.err(
                        ErrorCode::ExpectedToken,
                        "')' expected after array parameter",
                    );
                }
                sym.modifiers |= Modifiers::FLATARRAY;
                sym.linkage = Linkage::ByRef;
                sym.dims = (0..dims)
                    .map(|_| Dimension {
                        low: ParseNode::Number(Variant::Int(1)),
                        high: ParseNode::Number(Variant::Int(0)),
                    })
                    .collect();
            }

            if params
                .iter()
                .any(|p: &SymbolId| self.arena.get(*p).name.eq_ignore_ascii_case(&name))
            {
                self.err(
                    ErrorCode::ParameterDefined,
                    format!("duplicate parameter '{}'", name),
                );
            } else {
                params.push(self.arena.alloc(sym));
            }

            if *line.peek() == Token::Comma {
                line.next_token();
                continue;
            }
            break;
        }

        if *line.peek() == Token::RParen {
            line.next_token();
        } else {
            self.err(ErrorCode::ExpectedToken, "')' expected in parameter list");
        }
        params
    }

    fn inject_main(&mut self) {
        if self.scopes.globals.get(MAIN_NAME).is_some() {
            return;
        }
        let mut sym = Symbol::routine(MAIN_NAME, SymClass::Subroutine, FullType::of(BaseType::None));
        sym.modifiers |= Modifiers::ENTRYPOINT | Modifiers::HIDDEN;
        sym.defined = true;
        let id = self.arena.alloc(sym);
        self.scopes.globals.insert(MAIN_NAME, id);
    }

    // ---- pass 1 ------------------------------------------------------------

    /// Compile the current chunk. Statements outside any PROC/FUNC fall
    /// into the implicit Main body.
    fn compile_top_level(&mut self) {
        let mut body = std::mem::take(&mut self.main_body);
        while self.next_line() {
            body.push(self.mark_line_node());
            if self.line.at_end() {
                continue;
            }
            self.parse_statement(&mut body);
            self.expect_end_of_statement();
        }
        self.main_body = body;
    }

    /// Wrap the accumulated top-level statements into the Main entry
    /// point.
    fn finish_main(&mut self) {
        let mut body = std::mem::take(&mut self.main_body);
        let has_code = body
            .iter()
            .any(|n| !matches!(n, ParseNode::MarkLine(_) | ParseNode::MarkFilename(_)));
        if !has_code {
            return;
        }
        let Some(id) = self.scopes.globals.get(MAIN_NAME) else {
            return;
        };
        if self.arena.get(id).class != SymClass::Subroutine || !self.arena.get(id).params.is_empty()
        {
            // A user FUNC named Main cannot take the entry role.
            return;
        }
        body.push(ParseNode::Return(None));
        self.arena.get_mut(id).modifiers |= Modifiers::ENTRYPOINT;
        self.executable = true;
        self.procedures.push(Procedure {
            sym: id,
            locals: crate::symbol::SymbolMap::new(),
            body,
            closed: false,
            catch_exceptions: self.saw_trap,
        });
    }

    // ---- post-validation ---------------------------------------------------

    fn post_validate(&mut self) {
        // Exported routines that never got a body.
        for id in self.arena.ids().collect::<Vec<_>>() {
            let sym = self.arena.get(id);
            if sym.modifiers.contains(Modifiers::EXPORTED) && !sym.defined {
                let name = sym.name.clone();
                self.comal_line = 0;
                self.physical_line = 0;
                self.warn(
                    ErrorCode::MissingExport,
                    format!("exported routine '{}' was never defined", name),
                );
            }
        }

        // GOTO may not jump into an inner block. The walk renumbers the
        // blocks exactly as the parser did (pre-order within a routine),
        // so a label's recorded block number is comparable with the
        // number of the block a GOTO sits in.
        let procedures = std::mem::take(&mut self.procedures);
        for proc in &procedures {
            self.comal_line = 0;
            self.physical_line = 0;
            let mut counter = 0u32;
            self.walk_goto(&proc.body, 0, &mut counter);
        }
        self.procedures = procedures;
    }

    fn walk_goto(&mut self, body: &[ParseNode], block_id: u32, counter: &mut u32) {
        for node in body {
            match node {
                ParseNode::MarkLine(n) => self.comal_line = *n,
                ParseNode::Goto(sym) => {
                    let label = self.arena.get(*sym);
                    if label.depth > block_id {
                        let name = label.name.clone();
                        self.err(
                            ErrorCode::GotoIntoBlock,
                            format!("GOTO target '{}' is inside an inner block", name),
                        );
                    }
                }
                ParseNode::Conditional { branches } => {
                    for branch in branches {
                        *counter += 1;
                        let id = *counter;
                        self.walk_goto(&branch.body, id, counter);
                    }
                }
                ParseNode::Loop { body, .. } => {
                    *counter += 1;
                    let id = *counter;
                    self.walk_goto(body, id, counter);
                }
                ParseNode::Trappable { body, handler, .. } => {
                    *counter += 1;
                    let id = *counter;
                    self.walk_goto(body, id, counter);
                    *counter += 1;
                    let id = *counter;
                    self.walk_goto(handler, id, counter);
                }
                _ => {}
            }
        }
    }
}
