//! Declarations and routine compilation: MODULE/EXPORT, DIM, PROC/FUNC,
//! RETURN, IMPORT, EXEC, statement functions, and DATA/READ/RESTORE.

use crate::ast::{ParseNode, Procedure};
use crate::diag::ErrorCode;
use crate::driver::{BlockState, Compiler};
use crate::symbol::{
    BaseType, Dimension, FullType, Modifiers, SymClass, SymScope, Symbol, SymbolMap, Value,
    MAX_DIMENSIONS,
};
use crate::token::{Keyword, Token};
use crate::variant::Variant;

impl Compiler<'_> {
    /// `MODULE name`: names the program.
    pub(crate) fn parse_module(&mut self) {
        match self.line.next_token() {
            Token::Identifier(name) => {
                if !self.module_name.is_empty() {
                    self.err(ErrorCode::TokenNotPermitted, "MODULE was already given");
                    return;
                }
                let mut sym = Symbol::var(&name, FullType::of(BaseType::Program), SymScope::Global);
                sym.modifiers |= Modifiers::HIDDEN;
                sym.defined = true;
                sym.class = SymClass::Var;
                let id = self.arena.alloc(sym);
                self.scopes.globals.insert(&name, id);
                self.module_name = name;
            }
            other => self.err(
                ErrorCode::ExpectedToken,
                format!("module name expected, found '{}'", other),
            ),
        }
    }

    /// `EXPORT name[, ..]`: marks routines visible to other modules.
    /// Forward declarations are allowed; the definition binds later.
    pub(crate) fn parse_export(&mut self) {
        loop {
            match self.line.next_token() {
                Token::Identifier(name) => {
                    match self.scopes.globals.get(&name) {
                        Some(id) => {
                            if self.arena.get(id).modifiers.contains(Modifiers::EXPORTED) {
                                self.err(
                                    ErrorCode::AlreadyExported,
                                    format!("'{}' is already exported", name),
                                );
                            } else {
                                self.arena.get_mut(id).modifiers |= Modifiers::EXPORTED;
                            }
                        }
                        None => {
                            let mut sym = Symbol::routine(
                                &name,
                                SymClass::Subroutine,
                                FullType::of(BaseType::None),
                            );
                            sym.modifiers |= Modifiers::EXPORTED;
                            sym.defined = false;
                            let id = self.arena.alloc(sym);
                            self.scopes.globals.insert(&name, id);
                        }
                    }
                }
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("routine name expected after EXPORT, found '{}'", other),
                    );
                    self.skip_to_eol();
                    return;
                }
            }
            if !self.consume(&Token::Comma) {
                return;
            }
        }
    }

    /// `DIM id[(bounds)][ OF width][, ..]`: declares variables, array
    /// dimensions, and fixed string widths.
    pub(crate) fn parse_dim(&mut self) {
        loop {
            let name = match self.line.next_token() {
                Token::Identifier(name) => name,
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("variable name expected in DIM, found '{}'", other),
                    );
                    self.skip_to_eol();
                    return;
                }
            };

            let mut ty = FullType::from_suffix(&name);
            let mut dims = Vec::new();

            if self.consume(&Token::LParen) {
                loop {
                    let first = self.parse_int_expression();
                    let dim = if self.consume(&Token::Colon) {
                        let high = self.parse_int_expression();
                        Dimension { low: first, high }
                    } else {
                        Dimension {
                            low: self.int_node(1),
                            high: first,
                        }
                    };
                    if let (Some(lo), Some(hi)) =
                        (dim.low.constant_int(), dim.high.constant_int())
                        && hi < lo
                        && hi > 0
                    {
                        self.err(
                            ErrorCode::ArrayIllegalBounds,
                            format!("array bounds {}:{} are empty", lo, hi),
                        );
                    }
                    dims.push(dim);
                    if !self.consume(&Token::Comma) {
                        break;
                    }
                }
                self.expect(&Token::RParen);
                if dims.len() > MAX_DIMENSIONS {
                    self.err(
                        ErrorCode::TooManyDimensions,
                        format!("arrays are limited to {} dimensions", MAX_DIMENSIONS),
                    );
                    dims.truncate(MAX_DIMENSIONS);
                }
            }

            if self.consume_kw(Keyword::Of) {
                let width = self.parse_constant_int("string width");
                if ty.base != BaseType::FixedChar {
                    self.err(ErrorCode::InvalidOf, "OF is only legal for string variables");
                } else if width <= 0 {
                    self.err(ErrorCode::InvalidOf, "string width must be positive");
                } else {
                    ty.width = width as u32;
                }
            }

            // Re-DIM of a known name updates it; otherwise a fresh symbol
            // lands in the current scope.
            let scope = if self.scopes.in_routine() {
                SymScope::Local
            } else {
                SymScope::Global
            };
            let value = if dims.is_empty() {
                Some(Value::Scalar(match ty.base {
                    BaseType::Integer => Variant::Int(0),
                    BaseType::FixedChar | BaseType::Char => Variant::Str(String::new()),
                    _ => Variant::Float(0.0),
                }))
            } else {
                None
            };

            match self.scopes.resolve_in_current(&name) {
                Some(id) if self.arena.get(id).class == SymClass::Var => {
                    let sym = self.arena.get_mut(id);
                    sym.full_type = ty;
                    sym.dims = dims;
                    sym.defined = true;
                    if sym.value.is_none() {
                        sym.value = value;
                    }
                }
                _ => {
                    let mut sym = Symbol::var(&name, ty, scope);
                    sym.dims = dims;
                    sym.defined = true;
                    sym.value = value;
                    let id = self.arena.alloc(sym);
                    self.scopes.add_to_current(&name, id);
                }
            }

            if !self.consume(&Token::Comma) {
                return;
            }
        }
    }

    /// `IMPORT id[, ..]`: adds globals into a CLOSED routine's import
    /// set.
    pub(crate) fn parse_import(&mut self) {
        if !self.scopes.in_closed() {
            self.err(ErrorCode::NotInClosed, "IMPORT is only legal in CLOSED routines");
            self.skip_to_eol();
            return;
        }
        loop {
            match self.line.next_token() {
                Token::Identifier(name) => {
                    match self.scopes.globals.get(&name) {
                        Some(id) => {
                            let inserted = self
                                .scopes
                                .imports_mut()
                                .map(|imports| imports.insert(&name, id))
                                .unwrap_or(false);
                            if !inserted {
                                self.err(
                                    ErrorCode::AlreadyImported,
                                    format!("'{}' is already imported", name),
                                );
                            }
                        }
                        None => self.err(
                            ErrorCode::UndefinedVariable,
                            format!("'{}' is not a global name", name),
                        ),
                    }
                }
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("name expected after IMPORT, found '{}'", other),
                    );
                    self.skip_to_eol();
                    return;
                }
            }
            if !self.consume(&Token::Comma) {
                return;
            }
        }
    }

    /// `RETURN [e]`: expression required in a FUNC, forbidden in a PROC.
    pub(crate) fn parse_return(&mut self, body: &mut Vec<ParseNode>) {
        let routine = self.current_routine;
        let (class, routine_ty) = match routine {
            Some(id) => {
                let sym = self.arena.get(id);
                (sym.class, sym.full_type)
            }
            None => (SymClass::Subroutine, FullType::of(BaseType::None)),
        };

        self.saw_return = true;
        if class == SymClass::Function {
            let value = self.parse_expression();
            let value_ty = value.ty(&self.arena);
            if routine_ty.is_numeric() != value_ty.is_numeric() {
                self.err(
                    ErrorCode::TypeMismatch,
                    format!(
                        "function returns {}, value is {}",
                        routine_ty.base.name(),
                        value_ty.base.name()
                    ),
                );
            }
            body.push(ParseNode::Return(Some(Box::new(value))));
        } else {
            if !self.line.at_end() {
                self.err(
                    ErrorCode::IllegalReturn,
                    "RETURN in a PROC cannot carry a value",
                );
                self.skip_to_eol();
            }
            body.push(ParseNode::Return(None));
        }
    }

    /// `EXEC name[(args)]`: explicit procedure call.
    pub(crate) fn parse_exec(&mut self, body: &mut Vec<ParseNode>) {
        let name = match self.line.next_token() {
            Token::Identifier(name) => name,
            other => {
                self.err(
                    ErrorCode::ExpectedToken,
                    format!("procedure name expected after EXEC, found '{}'", other),
                );
                self.skip_to_eol();
                return;
            }
        };
        match self.scopes.resolve(&name) {
            Some(id) if self.arena.get(id).is_routine() => {
                self.mark_referenced(id);
                let args = self.parse_call_args(id);
                body.push(ParseNode::Call { sym: id, args });
            }
            _ => {
                self.err(
                    ErrorCode::MethodNotFound,
                    format!("unknown procedure '{}'", name),
                );
                self.skip_to_eol();
            }
        }
    }

    /// Speculative parse of `name(p1, p2, ..) = expr`: a statement
    /// function. Answers false (cursor restored) when the shape does not
    /// match.
    pub(crate) fn try_statement_function(&mut self, name: &str) -> bool {
        let mark = self.line.mark();
        self.line.next_token(); // (

        let mut param_names = Vec::new();
        if *self.line.peek() != Token::RParen {
            loop {
                match self.line.next_token() {
                    Token::Identifier(p) => param_names.push(p),
                    _ => {
                        self.line.rewind_to(mark);
                        return false;
                    }
                }
                if !self.consume(&Token::Comma) {
                    break;
                }
            }
        }
        if self.line.next_token() != Token::RParen || self.line.next_token() != Token::Eq {
            self.line.rewind_to(mark);
            return false;
        }

        if !self.enter_state(BlockState::Specification) {
            self.skip_to_eol();
            return true;
        }

        // Parameters scope only over the defining expression.
        let mut params = Vec::new();
        self.scopes.push_for();
        for p in &param_names {
            let mut sym = Symbol::var(p, FullType::from_suffix(p), SymScope::Parameter);
            sym.defined = true;
            sym.referenced = true;
            let id = self.arena.alloc(sym);
            if !self.scopes.add_to_current(p, id) {
                self.err(
                    ErrorCode::ParameterDefined,
                    format!("duplicate parameter '{}'", p),
                );
            }
            params.push(id);
        }
        let expr = self.parse_expression();
        self.scopes.pop_frame();

        let ty = FullType::from_suffix(name);
        let expr_ty = expr.ty(&self.arena);
        if ty.is_numeric() != expr_ty.is_numeric() {
            self.err(
                ErrorCode::TypeMismatch,
                format!(
                    "statement function '{}' is {}, expression is {}",
                    name,
                    ty.base.name(),
                    expr_ty.base.name()
                ),
            );
        }

        let mut sym = Symbol::routine(name, SymClass::Inline, ty);
        sym.scope = SymScope::Local;
        sym.params = params;
        sym.defined = true;
        sym.inline_expr = Some(Box::new(expr));
        sym.parent = self.current_routine;
        let id = self.arena.alloc(sym);
        self.scopes.add_to_routine(name, id);
        true
    }

    // ---- DATA / READ / RESTORE ---------------------------------------------

    /// The three process-global data symbols, installed on first use.
    fn data_globals(&mut self) -> (crate::symbol::SymbolId, crate::symbol::SymbolId, crate::symbol::SymbolId) {
        let data = self.runtime_global("_DATA", FullType::of(BaseType::Float));
        self.arena.get_mut(data).modifiers |= Modifiers::FLATARRAY;
        let index = self.runtime_global("_DATAINDEX", FullType::of(BaseType::Integer));
        if self.arena.get(index).value.is_none() {
            self.arena.get_mut(index).value = Some(Value::Scalar(Variant::Int(0)));
        }
        let eod = self.runtime_global("_EOD", FullType::of(BaseType::Integer));
        if self.arena.get(eod).value.is_none() {
            self.arena.get_mut(eod).value = Some(Value::Scalar(Variant::Int(0)));
        }
        (data, index, eod)
    }

    /// `DATA constant[, ..]`: appends reals to the program's data array.
    /// Emits no executable node.
    pub(crate) fn parse_data(&mut self) {
        let (data, _, _) = self.data_globals();
        loop {
            let mut neg = false;
            let mut tok = self.line.next_token();
            while matches!(tok, Token::Plus | Token::Minus) {
                if tok == Token::Minus {
                    neg = !neg;
                }
                tok = self.line.next_token();
            }
            let value = match tok {
                Token::Int(v) => v as f32,
                Token::Float(v) => v,
                other => {
                    self.err(
                        ErrorCode::NumberExpected,
                        format!("numeric constant expected in DATA, found '{}'", other),
                    );
                    self.skip_to_eol();
                    return;
                }
            };
            let value = Variant::Float(if neg { -value } else { value });
            let sym = self.arena.get_mut(data);
            match &mut sym.value {
                Some(Value::Array(items)) => items.push(value),
                _ => sym.value = Some(Value::Array(vec![value])),
            }
            if !self.consume(&Token::Comma) {
                return;
            }
        }
    }

    /// `READ id[, ..]`: sequential reads from the data array, each
    /// coerced to its target's type. `READ FILE` routes to the file
    /// statement parser.
    pub(crate) fn parse_read(&mut self, body: &mut Vec<ParseNode>) {
        if self.check_kw(Keyword::File) {
            self.parse_read_file(body);
            return;
        }
        let (data, index, eod) = self.data_globals();
        let mut targets = Vec::new();
        loop {
            match self.line.next_token() {
                Token::Identifier(name) => {
                    let id = self.resolve_target(&name);
                    let target = self.finish_variable(id);
                    if !target.ty(&self.arena).is_numeric() {
                        self.err(
                            ErrorCode::TypeMismatch,
                            format!("READ target '{}' must be numeric", name),
                        );
                    }
                    targets.push(target);
                }
                other => {
                    self.err(
                        ErrorCode::ExpectedToken,
                        format!("variable expected in READ, found '{}'", other),
                    );
                    self.skip_to_eol();
                    break;
                }
            }
            if !self.consume(&Token::Comma) {
                break;
            }
        }
        body.push(ParseNode::ReadData {
            targets,
            data_sym: data,
            index_sym: index,
            eod_sym: eod,
        });
    }

    /// `RESTORE`: rewinds the data index and clears end-of-data.
    pub(crate) fn parse_restore(&mut self, body: &mut Vec<ParseNode>) {
        let (_, index, eod) = self.data_globals();
        let target = |sym| ParseNode::Identifier {
            sym,
            indexes: Vec::new(),
            substring: None,
        };
        body.push(ParseNode::Assignment {
            targets: vec![target(index), target(eod)],
            values: vec![self.int_node(0), self.int_node(0)],
        });
    }

    // ---- PROC / FUNC -------------------------------------------------------

    /// Pass-1 compilation of a routine: bind the pass-0 symbol, open a
    /// scope with parameters (and the import set when CLOSED), compile the
    /// body, then run the close-out checks.
    pub(crate) fn parse_routine(&mut self, is_func: bool) {
        let name = match self.line.next_token() {
            Token::Identifier(name) => name,
            other => {
                self.err(
                    ErrorCode::ExpectedToken,
                    format!("routine name expected, found '{}'", other),
                );
                self.skip_to_eol();
                return;
            }
        };

        let id = match self.scopes.globals.get(&name) {
            Some(id) if self.arena.get(id).is_routine() => id,
            _ => {
                // Pass 0 errored on this header; recover with a throwaway.
                let class = if is_func {
                    SymClass::Function
                } else {
                    SymClass::Subroutine
                };
                let sym = Symbol::routine(&name, class, FullType::from_suffix(&name));
                let id = self.arena.alloc(sym);
                self.scopes.globals.insert(&name, id);
                id
            }
        };

        // The header tokens were parsed by pass 0; skip the parameter
        // group and read the trailers.
        self.skip_header_params();
        let closed = self.consume_kw(Keyword::Closed);
        if self.consume_kw(Keyword::External) {
            self.line.next_token(); // the library string
            return;
        }
        self.expect_end_of_statement();

        let imports = if closed { self.build_imports(id) } else { SymbolMap::new() };
        self.scopes.push_routine(closed, imports);
        for pid in self.arena.get(id).params.clone() {
            let pname = self.arena.get(pid).name.clone();
            self.scopes.add_to_current(&pname, pid);
        }

        let saved_routine = self.current_routine;
        let saved_state = self.state;
        let saved_trap = self.saw_trap;
        let saved_return = self.saw_return;
        let saved_depth = self.block_depth;
        self.current_routine = Some(id);
        self.state = BlockState::Subfunc;
        self.saw_trap = false;
        self.saw_return = false;
        self.block_depth = 0;

        let mut proc_body = Vec::new();
        let ender = if is_func {
            Token::Kw(Keyword::Endfunc)
        } else {
            Token::Kw(Keyword::Endproc)
        };
        self.compile_block(std::slice::from_ref(&ender), &mut proc_body);

        self.close_routine(id, is_func, &mut proc_body);

        let locals = self.scopes.pop_frame();
        let catch_exceptions = self.saw_trap;
        self.current_routine = saved_routine;
        self.state = saved_state;
        self.saw_trap = saved_trap;
        self.saw_return = saved_return;
        self.block_depth = saved_depth;

        self.arena.get_mut(id).defined = true;
        self.procedures.push(Procedure {
            sym: id,
            locals,
            body: proc_body,
            closed,
            catch_exceptions,
        });
    }

    /// Skip the already-scanned `(params)` group on a routine header.
    fn skip_header_params(&mut self) {
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

    /// Import set of a fresh CLOSED routine: inherited imports, the
    /// routine itself, and its directly nested routines.
    fn build_imports(&mut self, id: crate::symbol::SymbolId) -> SymbolMap {
        let mut imports = match self.scopes.current_imports() {
            Some(inherited) => inherited.clone(),
            None => SymbolMap::new(),
        };
        let name = self.arena.get(id).name.clone();
        imports.insert(&name, id);
        for child in self.arena.ids().collect::<Vec<_>>() {
            let sym = self.arena.get(child);
            if sym.parent == Some(id) && sym.is_routine() {
                let child_name = sym.name.clone();
                imports.insert(&child_name, child);
            }
        }
        imports
    }

    /// End-of-routine checks: RETURN presence, undefined labels, string
    /// defaults, unused symbols.
    fn close_routine(&mut self, id: crate::symbol::SymbolId, is_func: bool, body: &mut Vec<ParseNode>) {
        let name = self.arena.get(id).name.clone();
        if is_func && !self.saw_return {
            self.err(
                ErrorCode::MissingReturn,
                format!("FUNC '{}' has no RETURN", name),
            );
        }
        if !is_func && !self.saw_return {
            self.warn(
                ErrorCode::MissingReturn,
                format!("PROC '{}' has no RETURN", name),
            );
        }
        if !matches!(body.last(), Some(ParseNode::Return(_))) {
            body.push(ParseNode::Return(None));
        }

        for local in self.scopes.current_ids().to_vec() {
            let sym = self.arena.get(local);
            let (class, defined, referenced, ty, is_array, has_value, modifiers, local_name) = (
                sym.class,
                sym.defined,
                sym.referenced,
                sym.full_type,
                sym.is_array(),
                sym.value.is_some(),
                sym.modifiers,
                sym.name.clone(),
            );

            if class == SymClass::Label && !defined {
                self.err(
                    ErrorCode::UndefinedLabel,
                    format!("label '{}' is never declared", local_name),
                );
                continue;
            }
            if class == SymClass::Var
                && ty.base == BaseType::FixedChar
                && !is_array
                && !has_value
            {
                self.arena.get_mut(local).value =
                    Some(Value::Scalar(Variant::Str(String::new())));
            }
            if !referenced
                && !modifiers.contains(Modifiers::HIDDEN)
                && !modifiers.contains(Modifiers::RETVAL)
                && class != SymClass::Label
            {
                self.warn(
                    ErrorCode::UnusedVariable,
                    format!("'{}' is never used", local_name),
                );
            }
        }
    }
}
