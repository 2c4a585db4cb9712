//! Direct-mode command processor over the live line store.
//!
//! Every command is parsed with the same tokeniser as program text. A
//! line starting with a number edits the store; a recognised command word
//! runs here; anything else compiles into a synthetic `_Direct` routine
//! and goes to the executor.

use std::io::IsTerminal;
use std::path::Path;

use comalc::diag::Diagnostics;
use comalc::line::Line;
use comalc::store::LineStore;
use comalc::token::{Keyword, Token};
use comalc::{
    compile_store, image, listing, Compiler, Executor, NoExecutor, Options, ProgramDef,
};

/// What the main loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

/// Host-side line editing the session needs from its front end.
pub trait LineEditor {
    /// Hand a line to the user for editing and return the result.
    fn read_edit(&mut self, prompt: &str, initial: &str) -> Result<String, String>;
    /// Yes/no question; answers false on anything but yes.
    fn confirm(&mut self, prompt: &str) -> bool;
}

struct AutoState {
    next: u32,
    step: u32,
}

pub struct Session {
    opts: Options,
    store: LineStore,
    undo: Option<Vec<Line>>,
    auto: Option<AutoState>,
    /// Compiled tree of the current store; dropped on any mutation.
    cached: Option<ProgramDef>,
    executor: Box<dyn Executor>,
}

impl Session {
    pub fn new(opts: Options) -> Self {
        Session {
            opts,
            store: LineStore::new(),
            undo: None,
            auto: None,
            cached: None,
            executor: Box::new(NoExecutor),
        }
    }

    /// Install an execution backend (the default reports that none is
    /// attached).
    pub fn with_executor(mut self, executor: Box<dyn Executor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn store(&self) -> &LineStore {
        &self.store
    }

    /// Prompt for the next read: the pending line number in AUTO mode.
    pub fn prompt(&self) -> String {
        match &self.auto {
            Some(auto) => format!("{} ", auto.next),
            None => "> ".to_string(),
        }
    }

    fn touch(&mut self) {
        self.cached = None;
    }

    /// Process one input line.
    pub fn handle_line(&mut self, input: &str, editor: &mut dyn LineEditor) -> Outcome {
        let text = input.trim_end();

        // AUTO mode: an empty line leaves it, anything else is stored
        // under the pending number.
        if self.auto.is_some() {
            if text.trim().is_empty() {
                self.auto = None;
                return Outcome::Continue;
            }
            let numbered = if text.trim_start().starts_with(|c: char| c.is_ascii_digit()) {
                text.to_string()
            } else {
                let auto = self.auto.as_ref().unwrap();
                format!("{} {}", auto.next, text)
            };
            let line = Line::from_text(&numbered);
            let number = line.number();
            self.store.insert_or_replace(line);
            self.touch();
            if let Some(auto) = &mut self.auto {
                auto.next = number + auto.step;
            }
            return Outcome::Continue;
        }

        if text.trim().is_empty() {
            return Outcome::Continue;
        }

        // A leading line number edits the store; a bare number deletes
        // that line.
        let mut line = Line::from_text(text);
        if line.number() > 0 {
            let number = line.number();
            line.reset();
            line.take_line_number();
            if line.at_end() {
                self.store.delete_range(number, number);
            } else {
                line.reset();
                self.store.insert_or_replace(line);
            }
            self.touch();
            return Outcome::Continue;
        }

        line.reset();
        match line.peek().clone() {
            Token::Kw(Keyword::Auto) => {
                line.next_token();
                self.cmd_auto(&mut line)
            }
            Token::Kw(Keyword::New) => self.cmd_new(),
            Token::Kw(Keyword::Old) => self.cmd_old(),
            Token::Kw(Keyword::Del) => {
                line.next_token();
                self.cmd_del(&mut line)
            }
            Token::Kw(Keyword::Renum) => {
                line.next_token();
                self.cmd_renum(&mut line)
            }
            Token::Kw(Keyword::List) => {
                line.next_token();
                self.cmd_list(&mut line, true)
            }
            Token::Kw(Keyword::Display) => {
                line.next_token();
                self.cmd_list(&mut line, false)
            }
            Token::Kw(Keyword::Find) => {
                line.next_token();
                self.cmd_find(&mut line)
            }
            Token::Kw(Keyword::Change) => {
                line.next_token();
                self.cmd_change(&mut line)
            }
            Token::Kw(Keyword::Enter) => {
                line.next_token();
                self.cmd_enter(&mut line)
            }
            Token::Kw(Keyword::Merge) => {
                line.next_token();
                self.cmd_merge(&mut line)
            }
            Token::Kw(Keyword::Load) => {
                line.next_token();
                self.cmd_load(&mut line)
            }
            Token::Kw(Keyword::Save) => {
                line.next_token();
                self.cmd_save(&mut line)
            }
            Token::Kw(Keyword::Cat) | Token::Kw(Keyword::Dir) => {
                line.next_token();
                self.cmd_dir(&mut line)
            }
            Token::Kw(Keyword::Edit) => {
                line.next_token();
                self.cmd_edit(&mut line, editor)
            }
            Token::Kw(Keyword::Run) => self.cmd_run(),
            Token::Kw(Keyword::Scan) => self.cmd_scan(),
            Token::Kw(Keyword::Bye) => {
                if self.store.is_modified()
                    && !editor.confirm("Program is not saved. Quit anyway (y/n)? ")
                {
                    return Outcome::Continue;
                }
                return Outcome::Quit;
            }
            _ => self.run_direct(text),
        }
        Outcome::Continue
    }

    // ---- ranges -----------------------------------------------------------

    /// `n`, `n-`, `n-m`, `-m`, or a procedure name.
    fn parse_range(&mut self, line: &mut Line) -> Option<(u32, u32)> {
        match line.next_token() {
            Token::Int(n) if n > 0 => {
                let lo = n as u32;
                if *line.peek() == Token::Minus {
                    line.next_token();
                    match line.next_token() {
                        Token::Int(m) if m > 0 => Some((lo, m as u32)),
                        Token::Eol => Some((lo, u32::MAX)),
                        _ => {
                            println!("Bad line range");
                            None
                        }
                    }
                } else {
                    Some((lo, lo))
                }
            }
            Token::Minus => match line.next_token() {
                Token::Int(m) if m > 0 => Some((0, m as u32)),
                _ => {
                    println!("Bad line range");
                    None
                }
            },
            Token::Identifier(name) => match self.store.find_procedure(&name) {
                Some(range) => Some(range),
                None => {
                    println!("No procedure named {}", name);
                    None
                }
            },
            Token::Eol => Some((0, u32::MAX)),
            _ => {
                println!("Bad line range");
                None
            }
        }
    }

    fn expect_filename(&mut self, line: &mut Line) -> Option<String> {
        match line.next_token() {
            Token::Str(name) => Some(name),
            _ => {
                println!("Filename expected");
                None
            }
        }
    }

    // ---- commands ---------------------------------------------------------

    fn cmd_auto(&mut self, line: &mut Line) {
        let (start, step) = two_numbers(line);
        let step = step.unwrap_or(10);
        let next = start.unwrap_or_else(|| self.store.max_line_number() + step);
        self.auto = Some(AutoState { next, step });
    }

    fn cmd_new(&mut self) {
        self.undo = Some(self.store.replace_lines(Vec::new()));
        self.store.set_modified(false);
        self.touch();
    }

    fn cmd_old(&mut self) {
        match self.undo.take() {
            Some(lines) => {
                self.undo = Some(self.store.replace_lines(lines));
                self.touch();
            }
            None => println!("Nothing to restore"),
        }
    }

    fn cmd_del(&mut self, line: &mut Line) {
        if line.at_end() {
            println!("Line range expected");
            return;
        }
        if let Some((lo, hi)) = self.parse_range(line) {
            let removed = self.store.delete_range(lo, hi);
            println!("{} line(s) deleted", removed);
            self.touch();
        }
    }

    fn cmd_renum(&mut self, line: &mut Line) {
        let (start, step) = two_numbers(line);
        self.store.renumber(start.unwrap_or(10), step.unwrap_or(10));
        self.touch();
    }

    fn cmd_list(&mut self, line: &mut Line, with_numbers: bool) {
        let mut range = None;
        if !line.at_end() && !line.peek().is_kw(Keyword::To) {
            match self.parse_range(line) {
                Some(r) => range = Some(r),
                None => return,
            }
        }
        let text = listing::list(&self.store, range, with_numbers);
        if line.peek().is_kw(Keyword::To) {
            line.next_token();
            if let Some(name) = self.expect_filename(line) {
                if let Err(e) = std::fs::write(&name, &text) {
                    println!("Cannot write {}: {}", name, e);
                }
            }
        } else {
            print!("{}", text);
        }
    }

    fn cmd_find(&mut self, line: &mut Line) {
        let Some(needle) = self.expect_filename(line) else {
            return;
        };
        for stored in self.store.iter() {
            if listing::statement_text(stored).contains(&needle) {
                println!("{:>4} {}", stored.number(), listing::statement_text(stored));
            }
        }
    }

    fn cmd_change(&mut self, line: &mut Line) {
        let Some(from) = self.expect_filename(line) else {
            return;
        };
        if !matches!(line.next_token(), Token::Comma) {
            println!("CHANGE needs two strings");
            return;
        }
        let Some(to) = self.expect_filename(line) else {
            return;
        };
        let mut changed = Vec::new();
        for stored in self.store.iter() {
            let text = listing::statement_text(stored);
            if text.contains(&from) {
                let replaced = format!("{} {}", stored.number(), text.replace(&from, &to));
                changed.push(Line::from_text(&replaced));
            }
        }
        let count = changed.len();
        for line in changed {
            self.store.insert_or_replace(line);
        }
        println!("{} line(s) changed", count);
        if count > 0 {
            self.touch();
        }
    }

    fn cmd_enter(&mut self, line: &mut Line) {
        let Some(name) = self.expect_filename(line) else {
            return;
        };
        let text = match std::fs::read_to_string(&name) {
            Ok(text) => text,
            Err(e) => {
                println!("Cannot open {}: {}", name, e);
                return;
            }
        };
        self.undo = Some(self.store.replace_lines(Vec::new()));
        let mut last = 0u32;
        for src in text.lines() {
            if src.trim().is_empty() {
                continue;
            }
            let mut line = Line::from_text(src);
            let number = line.number();
            if number == 0 {
                line.set_number(last + 10);
            } else if number <= last {
                println!("Line numbers must ascend at line {}", number);
            }
            last = line.number();
            self.store.insert_or_replace(line);
        }
        self.touch();
    }

    fn cmd_merge(&mut self, line: &mut Line) {
        let Some(name) = self.expect_filename(line) else {
            return;
        };
        let text = match std::fs::read_to_string(&name) {
            Ok(text) => text,
            Err(e) => {
                println!("Cannot open {}: {}", name, e);
                return;
            }
        };
        let mut next = self.store.max_line_number() + 10;
        for src in text.lines() {
            if src.trim().is_empty() {
                continue;
            }
            let mut line = Line::from_text(src);
            line.set_number(next);
            next += 10;
            self.store.insert_or_replace(line);
        }
        self.store.renumber(10, 10);
        self.touch();
    }

    fn cmd_load(&mut self, line: &mut Line) {
        let Some(name) = self.expect_filename(line) else {
            return;
        };
        match image::load(Path::new(&name)) {
            Ok(store) => {
                self.undo = Some(self.store.replace_lines(Vec::new()));
                self.store = store;
                self.store.set_modified(false);
                self.touch();
            }
            Err(e) => println!("{}", e),
        }
    }

    fn cmd_save(&mut self, line: &mut Line) {
        let Some(name) = self.expect_filename(line) else {
            return;
        };
        match image::save(&self.store, Path::new(&name)) {
            Ok(()) => self.store.set_modified(false),
            Err(e) => println!("{}", e),
        }
    }

    fn cmd_dir(&mut self, line: &mut Line) {
        let pattern = match line.next_token() {
            Token::Str(p) => Some(p),
            _ => None,
        };
        match std::fs::read_dir(".") {
            Ok(entries) => {
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .filter(|n| pattern.as_deref().is_none_or(|p| n.contains(p)))
                    .collect();
                names.sort();
                for name in names {
                    println!("{}", name);
                }
            }
            Err(e) => println!("Cannot read directory: {}", e),
        }
    }

    fn cmd_edit(&mut self, line: &mut Line, editor: &mut dyn LineEditor) {
        let number = match line.next_token() {
            Token::Int(n) if n > 0 => n as u32,
            _ => {
                println!("Line number expected");
                return;
            }
        };
        let Some(stored) = self.store.get(number) else {
            println!("No line {}", number);
            return;
        };
        let initial = format!("{} {}", number, listing::statement_text(stored));
        match editor.read_edit("", &initial) {
            Ok(edited) => {
                let new_line = Line::from_text(&edited);
                if new_line.number() == 0 {
                    println!("Edited line has no line number");
                    return;
                }
                if new_line.number() != number {
                    self.store.delete_range(number, number);
                }
                self.store.insert_or_replace(new_line);
                self.touch();
            }
            Err(e) => println!("{}", e),
        }
    }

    /// Compile the store, reusing the cached tree when nothing changed.
    fn compile(&mut self) -> bool {
        if self.cached.is_some() {
            return true;
        }
        let mut diags = Diagnostics::new(self.opts.warn_level, self.opts.warn_as_error);
        let program = compile_store(&self.store, &self.opts, &mut diags);
        print_diagnostics(&diags);
        match program {
            Some(program) if !diags.has_errors() => {
                self.cached = Some(program);
                true
            }
            _ => {
                println!("{}", diags.summary());
                false
            }
        }
    }

    fn cmd_run(&mut self) {
        if !self.compile() {
            return;
        }
        let program = self.cached.as_ref().unwrap();
        if let Err(e) = self.executor.run(program) {
            println!("{}", e);
        }
    }

    fn cmd_scan(&mut self) {
        if self.compile() {
            println!("No errors");
        }
    }

    /// Anything else: compile the statement into a synthetic `_Direct`
    /// routine against the current program and hand it to the executor.
    /// The wrapper lines are built from tokens because `_Direct` is an
    /// internal name the tokeniser would not accept.
    fn run_direct(&mut self, text: &str) {
        let wrapped = vec![
            Line::new(vec![
                Token::Kw(Keyword::Proc),
                Token::Space,
                Token::Identifier("_Direct".to_string()),
            ]),
            Line::from_text(text),
            Line::new(vec![Token::Kw(Keyword::Endproc)]),
        ];
        let mut diags = Diagnostics::new(self.opts.warn_level, self.opts.warn_as_error);
        let program = {
            let mut compiler = Compiler::new(&self.opts, &mut diags);
            compiler.add_store(&self.store, None);
            compiler.add_lines(wrapped, None);
            compiler.compile()
        };
        print_diagnostics(&diags);
        if diags.has_errors() {
            return;
        }
        if let Err(e) = self.executor.run(&program) {
            println!("{}", e);
        }
    }
}

/// `[n][,m]` argument pair used by AUTO and RENUM.
fn two_numbers(line: &mut Line) -> (Option<u32>, Option<u32>) {
    let mut take_number = |line: &mut Line| match line.peek() {
        Token::Int(n) => {
            let n = *n;
            line.next_token();
            (n > 0).then_some(n as u32)
        }
        _ => None,
    };
    let first = take_number(line);
    let second = if *line.peek() == Token::Comma {
        line.next_token();
        take_number(line)
    } else {
        None
    };
    (first, second)
}

/// Print diagnostics, errors in red on a terminal.
pub fn print_diagnostics(diags: &Diagnostics) {
    let color = std::io::stderr().is_terminal();
    for item in diags.items() {
        if color && item.severity == comalc::Severity::Error {
            eprintln!("\x1b[31m{}\x1b[0m", item);
        } else {
            eprintln!("{}", item);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        confirm_answer: bool,
        edit_result: String,
    }

    impl LineEditor for Scripted {
        fn read_edit(&mut self, _prompt: &str, _initial: &str) -> Result<String, String> {
            Ok(self.edit_result.clone())
        }
        fn confirm(&mut self, _prompt: &str) -> bool {
            self.confirm_answer
        }
    }

    fn editor() -> Scripted {
        Scripted {
            confirm_answer: true,
            edit_result: String::new(),
        }
    }

    fn session_with(lines: &[&str]) -> Session {
        let mut session = Session::new(Options::default());
        let mut ed = editor();
        for line in lines {
            session.handle_line(line, &mut ed);
        }
        session
    }

    #[test]
    fn test_numbered_lines_edit_the_store() {
        let session = session_with(&["10 A:=1", "20 B:=2", "15 C:=3"]);
        let numbers: Vec<u32> = session.store().iter().map(|l| l.number()).collect();
        assert_eq!(numbers, vec![10, 15, 20]);
    }

    #[test]
    fn test_bare_number_deletes() {
        let session = session_with(&["10 A:=1", "20 B:=2", "10"]);
        assert_eq!(session.store().len(), 1);
        assert!(session.store().get(10).is_none());
    }

    #[test]
    fn test_auto_numbering() {
        let mut session = session_with(&[]);
        let mut ed = editor();
        session.handle_line("AUTO 100,5", &mut ed);
        assert_eq!(session.prompt(), "100 ");
        session.handle_line("A:=1", &mut ed);
        assert_eq!(session.prompt(), "105 ");
        session.handle_line("B:=2", &mut ed);
        session.handle_line("", &mut ed); // leaves AUTO
        assert_eq!(session.prompt(), "> ");
        assert_eq!(session.store().get(100).unwrap().text(), "100 A:=1");
        assert_eq!(session.store().get(105).unwrap().text(), "105 B:=2");
    }

    #[test]
    fn test_new_and_old() {
        let mut session = session_with(&["10 A:=1"]);
        let mut ed = editor();
        session.handle_line("NEW", &mut ed);
        assert!(session.store().is_empty());
        session.handle_line("OLD", &mut ed);
        assert_eq!(session.store().len(), 1);
    }

    #[test]
    fn test_del_and_renum() {
        let mut session = session_with(&["10 A:=1", "20 B:=2", "30 C:=3"]);
        let mut ed = editor();
        session.handle_line("DEL 20", &mut ed);
        assert!(session.store().get(20).is_none());
        session.handle_line("RENUM 100,10", &mut ed);
        let numbers: Vec<u32> = session.store().iter().map(|l| l.number()).collect();
        assert_eq!(numbers, vec![100, 110]);
    }

    #[test]
    fn test_change_retokenises() {
        let mut session = session_with(&["10 total:=1"]);
        let mut ed = editor();
        session.handle_line("CHANGE \"total\",\"sum\"", &mut ed);
        assert_eq!(session.store().get(10).unwrap().text(), "10 sum:=1");
    }

    #[test]
    fn test_edit_replaces_line() {
        let mut session = session_with(&["10 A:=1"]);
        let mut ed = Scripted {
            confirm_answer: true,
            edit_result: "10 A:=42".to_string(),
        };
        session.handle_line("EDIT 10", &mut ed);
        assert_eq!(session.store().get(10).unwrap().text(), "10 A:=42");
    }

    #[test]
    fn test_save_load_list_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.cml");
        let path_str = path.to_string_lossy().into_owned();

        let mut session = session_with(&["10 DIM S$ OF 5", "20 S$:=\"HELLO\"", "30 PRINT S$"]);
        let mut ed = editor();
        let before = listing::list(session.store(), None, true);

        session.handle_line(&format!("SAVE \"{}\"", path_str), &mut ed);
        session.handle_line("NEW", &mut ed);
        assert!(session.store().is_empty());
        session.handle_line(&format!("LOAD \"{}\"", path_str), &mut ed);
        let after = listing::list(session.store(), None, true);
        assert_eq!(before, after);
    }

    #[test]
    fn test_enter_auto_numbers_unnumbered_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("src.lst");
        std::fs::write(&path, "A:=1\n20 B:=2\nC:=3\n").unwrap();

        let mut session = session_with(&[]);
        let mut ed = editor();
        session.handle_line(
            &format!("ENTER \"{}\"", path.to_string_lossy()),
            &mut ed,
        );
        let numbers: Vec<u32> = session.store().iter().map(|l| l.number()).collect();
        assert_eq!(numbers, vec![10, 20, 30]);
    }

    #[test]
    fn test_range_by_procedure_name() {
        let mut session = session_with(&[
            "10 PROC greet",
            "20 PRINT \"hi\"",
            "30 ENDPROC",
            "40 A:=1",
        ]);
        let mut line = Line::from_text("greet");
        assert_eq!(session.parse_range(&mut line), Some((10, 30)));
    }

    #[test]
    fn test_bye_honours_modified_flag() {
        let mut session = session_with(&["10 A:=1"]);
        let mut no = Scripted {
            confirm_answer: false,
            edit_result: String::new(),
        };
        assert_eq!(session.handle_line("BYE", &mut no), Outcome::Continue);
        let mut yes = editor();
        assert_eq!(session.handle_line("BYE", &mut yes), Outcome::Quit);
    }
}
