//! Comal 80 compiler front end.
//!
//! Turns Comal source text (plain listings or previously saved tokenised
//! images) into a type-checked, lowered parse tree ([`ProgramDef`]) for a
//! downstream code generator. Also home of the line store and tokenised
//! image format the interactive editor works against.
//!
//! ```rust,ignore
//! use comalc::{compile_text, Diagnostics, Options};
//!
//! let opts = Options::default();
//! let mut diags = Diagnostics::new(opts.warn_level, opts.warn_as_error);
//! let program = compile_text("10 PRINT \"HELLO\"", None, &opts, &mut diags);
//! if diags.has_errors() {
//!     eprintln!("{}", diags.summary());
//! }
//! ```

pub mod ast;
pub mod diag;
pub mod driver;
pub mod dump;
pub mod expr;
pub mod fold;
pub mod image;
pub mod intrinsics;
pub mod lexer;
pub mod line;
pub mod listing;
pub mod options;
pub mod scope;
pub mod stmt;
pub mod store;
pub mod symbol;
pub mod token;
pub mod variant;

pub use ast::{ParseNode, ProgramDef};
pub use diag::{Diagnostic, Diagnostics, ErrorCode, Severity};
pub use driver::Compiler;
pub use line::Line;
pub use options::Options;
pub use store::LineStore;
pub use token::{Keyword, Token};

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// Execution backend for RUN and `--run`. Code generation is outside this
/// crate; callers plug their generator in through this seam.
pub trait Executor {
    fn run(&mut self, program: &ProgramDef) -> Result<(), String>;
}

/// Placeholder backend used when no code generator is attached.
pub struct NoExecutor;

impl Executor for NoExecutor {
    fn run(&mut self, _program: &ProgramDef) -> Result<(), String> {
        Err("no code generator is attached".to_string())
    }
}

/// Build and run a compiler over `diags`, converting internal panics into
/// a COMPILERFAILURE diagnostic (unless dev mode re-raises). The compiler
/// only lives inside this call, so `diags` is free again for the failure
/// report.
fn run_compiler(
    opts: &Options,
    diags: &mut Diagnostics,
    feed: impl FnOnce(&mut Compiler<'_>),
) -> Option<ProgramDef> {
    let result = {
        let mut compiler = Compiler::new(opts, diags);
        feed(&mut compiler);
        panic::catch_unwind(AssertUnwindSafe(move || compiler.compile()))
    };
    match result {
        Ok(program) => Some(program),
        Err(payload) => {
            if opts.dev_mode {
                panic::resume_unwind(payload);
            }
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "internal compiler error".to_string());
            diags.error(ErrorCode::CompilerFailure, None, message);
            None
        }
    }
}

/// Compile one source string.
pub fn compile_text(
    source: &str,
    filename: Option<String>,
    opts: &Options,
    diags: &mut Diagnostics,
) -> Option<ProgramDef> {
    run_compiler(opts, diags, |compiler| {
        compiler.add_source_text(source, filename);
    })
}

/// Compile the contents of a line store (RUN/SCAN).
pub fn compile_store(
    store: &LineStore,
    opts: &Options,
    diags: &mut Diagnostics,
) -> Option<ProgramDef> {
    run_compiler(opts, diags, |compiler| {
        compiler.add_store(store, None);
    })
}

/// Compile every file named in the options into one program. Files ending
/// in `.cml` load as tokenised images; everything else reads as text.
pub fn compile_files(opts: &Options, diags: &mut Diagnostics) -> Option<ProgramDef> {
    enum Source {
        Text(String, String),
        Image(LineStore, String),
    }

    let mut sources = Vec::new();
    for name in &opts.source_files {
        let path = Path::new(name);
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("cml")) {
            match image::load(path) {
                Ok(store) => sources.push(Source::Image(store, name.clone())),
                Err(e) => diags.error(ErrorCode::SourceFileNotFound, None, e),
            }
        } else {
            match std::fs::read_to_string(path) {
                Ok(text) => sources.push(Source::Text(text, name.clone())),
                Err(e) => diags.error(
                    ErrorCode::SourceFileNotFound,
                    None,
                    format!("Cannot open {}: {}", name, e),
                ),
            }
        }
    }
    if diags.has_errors() {
        return None;
    }

    run_compiler(opts, diags, |compiler| {
        for source in &sources {
            match source {
                Source::Text(text, name) => compiler.add_source_text(text, Some(name.clone())),
                Source::Image(store, name) => compiler.add_store(store, Some(name.clone())),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::LoopKind;
    use crate::symbol::{BaseType, SymClass};
    use crate::variant::Variant;

    fn compile(source: &str) -> (Option<ProgramDef>, Diagnostics) {
        let opts = Options::default();
        let mut diags = Diagnostics::new(opts.warn_level, opts.warn_as_error);
        let program = compile_text(source, None, &opts, &mut diags);
        (program, diags)
    }

    fn errors(diags: &Diagnostics) -> Vec<String> {
        diags.items().iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_function_with_folded_body() {
        // S1: FUNC F RETURN 2+3*4.
        let (program, diags) = compile("10 FUNC F\n20 RETURN 2+3*4\n30 ENDFUNC\n");
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        let f = program.find_procedure("F").expect("F missing");
        let folded = f.body.iter().any(|n| {
            matches!(n, ParseNode::Return(Some(v))
                if matches!(**v, ParseNode::Number(Variant::Int(14))))
        });
        assert!(folded, "RETURN 2+3*4 should fold to 14");
    }

    #[test]
    fn test_local_not_visible_across_routines() {
        // S2: A# is local to P; G cannot read it.
        let source = "\
10 PROC P
20 DIM A#
30 A#:=10
40 A#:+5
50 ENDPROC
60 FUNC G
70 EXEC P
80 RETURN A#
90 ENDFUNC
";
        let (_, diags) = compile(source);
        assert!(diags.has_errors());
        assert!(
            errors(&diags).iter().any(|e| e.contains("UNDEFINEDVARIABLE") && e.contains("A#")),
            "{:?}",
            errors(&diags)
        );
    }

    #[test]
    fn test_string_width_declaration() {
        // S3: DIM S$ OF 5, LEN intrinsic.
        let source = "\
10 FUNC H
20 DIM S$ OF 5
30 S$:=\"HELLO\"
40 RETURN LEN(S$)
50 ENDFUNC
";
        let (program, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        let h = program.find_procedure("H").unwrap();
        let s = h.locals.get("s$").expect("S$ not local");
        assert_eq!(program.arena.get(s).full_type.base, BaseType::FixedChar);
        assert_eq!(program.arena.get(s).full_type.width, 5);
    }

    #[test]
    fn test_for_loop_with_implicit_accumulator() {
        // S4: FOR creates its own loop variable; J appears implicitly.
        let source = "\
10 FUNC K
20 FOR I:=1 TO 10 DO
30 J:+I
40 NEXT I
50 RETURN J
60 ENDFUNC
";
        let (program, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        let k = program.find_procedure("K").unwrap();
        let has_for = k.body.iter().any(|n| {
            matches!(n, ParseNode::Loop { kind: LoopKind::For, var: Some(_), .. })
        });
        assert!(has_for);
        assert!(k.locals.get("j").is_some(), "J should be an implicit local");
    }

    #[test]
    fn test_closed_routine_cannot_reach_globals() {
        // S6: CLOSED blocks outer names entirely.
        let source = "\
10 A:=7
20 PROC P CLOSED
30 A:=1
40 ENDPROC
";
        let (_, diags) = compile(source);
        assert!(
            errors(&diags).iter().any(|e| e.contains("UNDEFINEDVARIABLE")),
            "{:?}",
            errors(&diags)
        );
    }

    #[test]
    fn test_import_opens_the_global() {
        let source = "\
10 A:=7
20 PROC P CLOSED
30 IMPORT A
40 A:=1
50 ENDPROC
";
        let (_, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
    }

    #[test]
    fn test_goto_into_block_rejected() {
        // S7: jumping into a FOR body.
        let source = "\
10 IF 1 THEN GOTO L
20 FOR I:=1 TO 10 DO
30 L:
40 NEXT I
";
        let (_, diags) = compile(source);
        assert!(
            errors(&diags).iter().any(|e| e.contains("GOTOINTOBLOCK")),
            "{:?}",
            errors(&diags)
        );
    }

    #[test]
    fn test_goto_within_same_depth_allowed() {
        let source = "\
10 GOTO DONE
20 PRINT \"skipped\"
30 DONE:
40 PRINT \"end\"
";
        let (_, diags) = compile(source);
        assert!(
            !errors(&diags).iter().any(|e| e.contains("GOTOINTOBLOCK")),
            "{:?}",
            errors(&diags)
        );
    }

    #[test]
    fn test_pass0_sees_later_functions() {
        // Call before definition works because pass 0 scans headers.
        let source = "\
10 X:=Double'It(4)
20 FUNC Double'It(n)
30 RETURN n*2
40 ENDFUNC
";
        let (program, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        let id = program.globals.get("double'it").unwrap();
        assert_eq!(program.arena.get(id).class, SymClass::Function);
        assert_eq!(program.arena.get(id).params.len(), 1);
    }

    #[test]
    fn test_implicit_main_sets_executable() {
        let (program, diags) = compile("10 PRINT \"HI\"\n");
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        assert!(program.executable);
        assert!(program.find_procedure("Main").is_some());
    }

    #[test]
    fn test_library_of_functions_is_not_executable() {
        let (program, diags) = compile("10 FUNC F\n20 RETURN 1\n30 ENDFUNC\n");
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        assert!(!program.unwrap().executable);
    }

    #[test]
    fn test_exit_outside_loop() {
        let (_, diags) = compile("10 EXIT\n");
        assert!(errors(&diags).iter().any(|e| e.contains("BADEXIT")));
    }

    #[test]
    fn test_exit_inside_loop_ok() {
        let source = "\
10 LOOP
20 EXIT WHEN TRUE
30 ENDLOOP
";
        let (_, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
    }

    #[test]
    fn test_missing_endif_reported() {
        let source = "10 IF 1 THEN\n20 PRINT 1\n";
        let (_, diags) = compile(source);
        assert!(
            errors(&diags).iter().any(|e| e.contains("MISSINGENDSTATEMENT")),
            "{:?}",
            errors(&diags)
        );
    }

    #[test]
    fn test_func_requires_return() {
        let (_, diags) = compile("10 FUNC F\n20 ENDFUNC\n");
        assert!(errors(&diags).iter().any(|e| e.contains("MISSINGRETURN")));
    }

    #[test]
    fn test_case_when_expands_to_conditional() {
        let source = "\
10 C:=2
20 CASE C OF
30 WHEN 1,2
40 PRINT \"low\"
50 OTHERWISE
60 PRINT \"high\"
70 ENDCASE
";
        let (program, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        let main = program.find_procedure("Main").unwrap();
        let cond = main.body.iter().find_map(|n| match n {
            ParseNode::Conditional { branches } => Some(branches),
            _ => None,
        });
        let branches = cond.expect("CASE should lower to a Conditional");
        assert_eq!(branches.len(), 2);
        assert!(branches[0].test.is_some());
        assert!(branches[1].test.is_none());
    }

    #[test]
    fn test_data_read_restore() {
        let source = "\
10 DATA 1, 2.5, -3
20 READ A, B, C
30 RESTORE
";
        let (program, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        let data = program.globals.get("_DATA").expect("_DATA missing");
        match program.arena.get(data).value.as_ref() {
            Some(crate::symbol::Value::Array(items)) => assert_eq!(items.len(), 3),
            other => panic!("expected data array, got {:?}", other),
        }
        assert!(program.globals.get("_DATAINDEX").is_some());
        assert!(program.globals.get("_EOD").is_some());
    }

    #[test]
    fn test_trap_sets_error_globals() {
        let source = "\
10 TRAP
20 PRINT \"trying\"
30 HANDLER
40 PRINT ERR
50 ENDTRAP
";
        let (program, diags) = compile(source);
        assert!(!diags.has_errors(), "{:?}", errors(&diags));
        let program = program.unwrap();
        assert!(program.globals.get("_ERR").is_some());
        assert!(program.globals.get("_ERRTEXT$").is_some());
        let main = program.find_procedure("Main").unwrap();
        assert!(main.catch_exceptions);
    }

    #[test]
    fn test_duplicate_proc_rejected() {
        let source = "\
10 PROC P
20 ENDPROC
30 PROC P
40 ENDPROC
";
        let (_, diags) = compile(source);
        assert!(errors(&diags).iter().any(|e| e.contains("SUBFUNCDEFINED")));
    }

    #[test]
    fn test_exported_undefined_routine_warns() {
        let (_, diags) = compile("10 EXPORT helper\n");
        assert!(
            errors(&diags).iter().any(|e| e.contains("MISSINGEXPORT")),
            "{:?}",
            errors(&diags)
        );
    }

    #[test]
    fn test_strict_requires_declarations() {
        let opts = Options::new().with_strict(true);
        let mut diags = Diagnostics::new(4, false);
        compile_text("10 A:=1\n", None, &opts, &mut diags);
        assert!(
            diags.items().iter().any(|d| d.to_string().contains("UNDEFINEDVARIABLE")),
        );

        let mut diags = Diagnostics::new(4, false);
        compile_text("10 DIM A\n20 A:=1\n", None, &opts, &mut diags);
        assert!(!diags.has_errors());
    }

    #[test]
    fn test_strict_rejects_plain_equals_assignment() {
        let opts = Options::new().with_strict(true);
        let mut diags = Diagnostics::new(4, false);
        compile_text("10 DIM A\n20 A = 1\n", None, &opts, &mut diags);
        assert!(
            diags.items().iter().any(|d| d.to_string().contains("EXPECTEDTOKEN")),
        );
    }

    #[test]
    fn test_compiler_failure_is_caught() {
        // A degenerate input must never panic through the public API.
        let (_, diags) = compile("10 PRINT ((((((\n");
        // Whatever diagnostics come out, we must get here without panic.
        let _ = diags.items();
    }
}
