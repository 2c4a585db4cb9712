//! Ordered store of tokenised program lines.
//!
//! The store is the unit the editor mutates and the compiler reads. Lines
//! are kept sorted by line number; numbers are strictly ascending and
//! positive, with at most one line per number.

use crate::line::Line;
use crate::token::{Keyword, Token};

#[derive(Debug, Default, Clone)]
pub struct LineStore {
    lines: Vec<Line>,
    modified: bool,
}

impl LineStore {
    pub fn new() -> Self {
        LineStore::default()
    }

    /// Build a store from lines already carrying ascending numbers.
    pub fn from_lines(lines: Vec<Line>) -> Self {
        let mut store = LineStore::new();
        for line in lines {
            store.insert_or_replace(line);
        }
        store.modified = false;
        store
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.modified = true;
    }

    /// Swap out the whole line vector (undo support). Returns the previous
    /// contents.
    pub fn replace_lines(&mut self, lines: Vec<Line>) -> Vec<Line> {
        self.modified = true;
        std::mem::replace(&mut self.lines, lines)
    }

    pub fn max_line_number(&self) -> u32 {
        self.lines.last().map(|l| l.number()).unwrap_or(0)
    }

    /// Insert in sorted position; a same-numbered line replaces in place.
    /// Lines numbered 0 (direct statements) are not stored.
    pub fn insert_or_replace(&mut self, line: Line) {
        let number = line.number();
        if number == 0 {
            return;
        }
        match self.lines.binary_search_by_key(&number, |l| l.number()) {
            Ok(i) => self.lines[i] = line,
            Err(i) => self.lines.insert(i, line),
        }
        self.modified = true;
    }

    pub fn get(&self, number: u32) -> Option<&Line> {
        self.lines
            .binary_search_by_key(&number, |l| l.number())
            .ok()
            .map(|i| &self.lines[i])
    }

    /// Delete all lines with `lo <= number <= hi`; returns how many went.
    pub fn delete_range(&mut self, lo: u32, hi: u32) -> usize {
        let before = self.lines.len();
        self.lines.retain(|l| {
            let n = l.number();
            n < lo || n > hi
        });
        let removed = before - self.lines.len();
        if removed > 0 {
            self.modified = true;
        }
        removed
    }

    /// Rewrite every line number as `start + step * index`, preserving
    /// order and all other tokens.
    pub fn renumber(&mut self, start: u32, step: u32) {
        for (i, line) in self.lines.iter_mut().enumerate() {
            line.set_number(start + step * i as u32);
        }
        if !self.lines.is_empty() {
            self.modified = true;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Line> {
        self.lines.iter()
    }

    /// Restartable iteration cursor for the compiler.
    pub fn cursor(&self) -> LineCursor<'_> {
        LineCursor {
            lines: &self.lines,
            index: 0,
        }
    }

    /// Locate the line range of a PROC/FUNC by name (case-insensitive).
    /// `start` is the header line, `end` the matching ENDPROC/ENDFUNC.
    pub fn find_procedure(&self, name: &str) -> Option<(u32, u32)> {
        let mut start = None;
        let mut depth = 0usize;
        for line in &self.lines {
            let (head, word) = statement_head(line);
            match head {
                Some(Token::Kw(Keyword::Proc)) | Some(Token::Kw(Keyword::Func)) => {
                    if start.is_none() {
                        if let Some(Token::Identifier(id)) = word
                            && id.eq_ignore_ascii_case(name)
                        {
                            start = Some(line.number());
                        }
                    } else {
                        depth += 1;
                    }
                }
                Some(Token::Kw(Keyword::Endproc)) | Some(Token::Kw(Keyword::Endfunc)) => {
                    if let Some(lo) = start {
                        if depth == 0 {
                            return Some((lo, line.number()));
                        }
                        depth -= 1;
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// First non-line-number token of a line and the token after it.
pub fn statement_head(line: &Line) -> (Option<&Token>, Option<&Token>) {
    let mut iter = line
        .tokens()
        .iter()
        .filter(|t| !matches!(t, Token::Space));
    let mut head = iter.next();
    if matches!(head, Some(Token::Int(_))) {
        head = iter.next();
    }
    (head, iter.next())
}

/// Cursor over a store snapshot, handing out working copies of each line
/// in ascending order.
pub struct LineCursor<'a> {
    lines: &'a [Line],
    index: usize,
}

impl<'a> LineCursor<'a> {
    /// Clone of the next line, cursor reset, or `None` at the end.
    pub fn next_line(&mut self) -> Option<Line> {
        let line = self.lines.get(self.index)?;
        self.index += 1;
        let mut line = line.clone();
        line.reset();
        Some(line)
    }

    pub fn reset(&mut self) {
        self.index = 0;
    }
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

    fn numbers(store: &LineStore) -> Vec<u32> {
        store.iter().map(|l| l.number()).collect()
    }

    #[test]
    fn test_insert_keeps_ascending_order() {
        let store = store_of(&["30 C:=3", "10 A:=1", "20 B:=2"]);
        assert_eq!(numbers(&store), vec![10, 20, 30]);
    }

    #[test]
    fn test_same_number_replaces() {
        let mut store = store_of(&["10 A:=1"]);
        store.insert_or_replace(Line::from_text("10 A:=99"));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(10).unwrap().text(), "10 A:=99");
    }

    #[test]
    fn test_delete_range() {
        let mut store = store_of(&["10 A:=1", "20 B:=2", "30 C:=3", "40 D:=4"]);
        assert_eq!(store.delete_range(15, 30), 2);
        assert_eq!(numbers(&store), vec![10, 40]);
    }

    #[test]
    fn test_renumber_preserves_content_and_order() {
        let mut store = store_of(&["7 A:=1", "13 B:=2", "99 C:=3"]);
        store.renumber(100, 5);
        assert_eq!(numbers(&store), vec![100, 105, 110]);
        assert_eq!(store.get(105).unwrap().text(), "105 B:=2");
    }

    #[test]
    fn test_monotonicity_after_mutation_mix() {
        let mut store = store_of(&["10 A:=1", "20 B:=2"]);
        store.insert_or_replace(Line::from_text("15 X:=0"));
        store.delete_range(20, 20);
        store.insert_or_replace(Line::from_text("5 Y:=0"));
        store.renumber(10, 10);
        let ns = numbers(&store);
        assert!(ns.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ns, vec![10, 20, 30]);
    }

    #[test]
    fn test_find_procedure() {
        let store = store_of(&[
            "10 PROC outer",
            "20 PROC inner",
            "30 ENDPROC",
            "40 ENDPROC",
            "50 FUNC f",
            "60 ENDFUNC",
        ]);
        assert_eq!(store.find_procedure("outer"), Some((10, 40)));
        assert_eq!(store.find_procedure("INNER"), Some((20, 30)));
        assert_eq!(store.find_procedure("f"), Some((50, 60)));
        assert_eq!(store.find_procedure("missing"), None);
    }

    #[test]
    fn test_modified_flag() {
        let mut store = store_of(&["10 A:=1"]);
        store.set_modified(false);
        store.insert_or_replace(Line::from_text("20 B:=2"));
        assert!(store.is_modified());
        store.set_modified(false);
        store.delete_range(1, 5);
        assert!(!store.is_modified());
    }

    #[test]
    fn test_cursor_is_restartable() {
        let store = store_of(&["10 A:=1", "20 B:=2"]);
        let mut cursor = store.cursor();
        assert_eq!(cursor.next_line().unwrap().number(), 10);
        assert_eq!(cursor.next_line().unwrap().number(), 20);
        assert!(cursor.next_line().is_none());
        cursor.reset();
        assert_eq!(cursor.next_line().unwrap().number(), 10);
    }
}
