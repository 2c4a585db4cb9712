//! Listing formatter for LIST and DISPLAY.
//!
//! Lines print from their tokens (the lossless fingerprint), indented by
//! block context: the counter rises after PROC/FUNC/FOR/WHILE/LOOP/CASE/
//! IF/HANDLER/REPEAT and falls on their END* tokens. Single-line IF/FOR/
//! WHILE forms do not open a block.

use std::fmt::Write as _;

use crate::line::Line;
use crate::store::{statement_head, LineStore};
use crate::token::{Keyword, Token};

/// Statement text of a line without its line number.
pub fn statement_text(line: &Line) -> String {
    let mut tokens = line.tokens().iter().peekable();
    while matches!(tokens.peek(), Some(Token::Space)) {
        tokens.next();
    }
    if matches!(tokens.peek(), Some(Token::Int(_))) {
        tokens.next();
        if matches!(tokens.peek(), Some(Token::Space)) {
            tokens.next();
        }
    }
    tokens.map(|t| t.to_string()).collect()
}

/// True when a block-opening line carries its body on the same line
/// (single-line IF/FOR/WHILE), so it opens no listing block.
fn is_single_line_form(line: &Line, opener: Keyword) -> bool {
    let closer = match opener {
        Keyword::If => Keyword::Then,
        Keyword::For | Keyword::While => Keyword::Do,
        _ => return false,
    };
    let mut seen_closer = false;
    for token in line.tokens() {
        if seen_closer && !matches!(token, Token::Space | Token::Eol | Token::Comment(_)) {
            return true;
        }
        if token.is_kw(closer) {
            seen_closer = true;
        }
    }
    false
}

/// Indentation change of a line: (outdent for this line, indent after).
fn indent_shift(line: &Line) -> (bool, bool) {
    let Some(Token::Kw(kw)) = statement_head(line).0 else {
        return (false, false);
    };
    match kw {
        Keyword::Proc | Keyword::Func => {
            // EXTERNAL routines have no body.
            let external = line
                .tokens()
                .iter()
                .any(|t| t.is_kw(Keyword::External));
            (false, !external)
        }
        Keyword::If | Keyword::For | Keyword::While => {
            (false, !is_single_line_form(line, *kw))
        }
        Keyword::Loop | Keyword::Case | Keyword::Repeat => (false, true),
        Keyword::Handler | Keyword::Elif | Keyword::Else | Keyword::When | Keyword::Otherwise => {
            (true, true)
        }
        Keyword::Endproc
        | Keyword::Endfunc
        | Keyword::Endif
        | Keyword::Endcase
        | Keyword::Endwhile
        | Keyword::Endloop
        | Keyword::Endtrap
        | Keyword::Next
        | Keyword::Until => (true, false),
        _ => (false, false),
    }
}

/// Render lines in `lo..=hi` (the whole store by default). DISPLAY passes
/// `with_numbers = false`.
pub fn list(store: &LineStore, range: Option<(u32, u32)>, with_numbers: bool) -> String {
    let (lo, hi) = range.unwrap_or((0, u32::MAX));
    let mut out = String::new();
    let mut indent = 0usize;

    for line in store.iter() {
        let (outdent, indent_after) = indent_shift(line);
        let this_indent = indent.saturating_sub(outdent as usize);
        let n = line.number();
        if n >= lo && n <= hi {
            if with_numbers {
                let _ = write!(out, "{:>4} ", n);
            }
            let _ = writeln!(out, "{}{}", "  ".repeat(this_indent), statement_text(line));
        }
        indent = this_indent + indent_after as usize;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_of(sources: &[&str]) -> LineStore {
        let mut store = LineStore::new();
        for src in sources {
            store.insert_or_replace(Line::from_text(src));
        }
        store
    }

    #[test]
    fn test_statement_text_strips_number() {
        let line = Line::from_text("100 PRINT \"X\"");
        assert_eq!(statement_text(&line), "PRINT \"X\"");
        let line = Line::from_text("A:=1");
        assert_eq!(statement_text(&line), "A:=1");
    }

    #[test]
    fn test_block_indentation() {
        let store = store_of(&[
            "10 PROC greet",
            "20 FOR I:=1 TO 3 DO",
            "30 PRINT I",
            "40 NEXT I",
            "50 ENDPROC",
        ]);
        let text = list(&store, None, true);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  10 PROC greet");
        assert_eq!(lines[1], "  20   FOR I:=1 TO 3 DO");
        assert_eq!(lines[2], "  30     PRINT I");
        assert_eq!(lines[3], "  40   NEXT I");
        assert_eq!(lines[4], "  50 ENDPROC");
    }

    #[test]
    fn test_single_line_if_does_not_indent() {
        let store = store_of(&["10 IF A THEN PRINT A", "20 PRINT 2"]);
        let text = list(&store, None, true);
        assert!(text.lines().nth(1).unwrap().ends_with("PRINT 2"));
        assert!(!text.lines().nth(1).unwrap().contains("  PRINT 2"));
    }

    #[test]
    fn test_else_outdents_itself() {
        let store = store_of(&[
            "10 IF A THEN",
            "20 PRINT 1",
            "30 ELSE",
            "40 PRINT 2",
            "50 ENDIF",
        ]);
        let text = list(&store, None, true);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "  10 IF A THEN");
        assert_eq!(lines[2], "  30 ELSE");
        assert_eq!(lines[4], "  50 ENDIF");
        assert_eq!(lines[1], "  20   PRINT 1");
        assert_eq!(lines[3], "  40   PRINT 2");
    }

    #[test]
    fn test_range_filter() {
        let store = store_of(&["10 A:=1", "20 B:=2", "30 C:=3"]);
        let text = list(&store, Some((15, 25)), true);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("20 B:=2"));
    }

    #[test]
    fn test_display_without_numbers() {
        let store = store_of(&["10 A:=1"]);
        let text = list(&store, None, false);
        assert_eq!(text, "A:=1\n");
    }

    #[test]
    fn test_listing_identical_after_retokenise() {
        // The fingerprint property: listing a line and re-tokenising it
        // reproduces the same listing.
        let store = store_of(&["10 IF A>=2 THEN PRINT \"ok\" ! done"]);
        let text = list(&store, None, true);
        let again = Line::from_text(text.lines().next().unwrap().trim_start());
        assert_eq!(statement_text(&again), "IF A>=2 THEN PRINT \"ok\" ! done");
    }
}
