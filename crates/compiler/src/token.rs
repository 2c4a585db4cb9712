//! Token model for Comal source lines.
//!
//! Every token carries a stable numeric tag used by the tokenised-image
//! format (see `image`). Tags are append-only: once a value has shipped it
//! is never reassigned, so an image saved by any version loads in all later
//! versions. Keywords serialise as `KEYWORD_TAG_BASE + discriminant`.

use std::fmt;

/// First tag value used by keyword tokens. Tags below this belong to the
/// structural/operator tokens in [`Token::tag`].
pub const KEYWORD_TAG_BASE: u8 = 64;

/// Reserved words of the language, direct-mode commands included (the
/// interactive command processor parses with the same tokeniser).
///
/// Discriminants are the serialisation sub-tags; the `ALL` table is indexed
/// by discriminant and sorted by spelling, so lookup is a binary search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Keyword {
    Abs = 0,
    And = 1,
    Append = 2,
    At = 3,
    Atn = 4,
    Auto = 5,
    Bitand = 6,
    Bitor = 7,
    Bitxor = 8,
    Bye = 9,
    Case = 10,
    Cat = 11,
    Change = 12,
    ChrS = 13,
    Close = 14,
    Closed = 15,
    Colour = 16,
    Cos = 17,
    Create = 18,
    Curcol = 19,
    Currow = 20,
    Cursor = 21,
    Data = 22,
    Del = 23,
    Delete = 24,
    Dim = 25,
    Dir = 26,
    Display = 27,
    Div = 28,
    Do = 29,
    Edit = 30,
    Elif = 31,
    Else = 32,
    End = 33,
    Endcase = 34,
    Endfunc = 35,
    Endif = 36,
    Endloop = 37,
    Endproc = 38,
    Endtrap = 39,
    Endwhile = 40,
    Enter = 41,
    Eod = 42,
    Eof = 43,
    Eqv = 44,
    Err = 45,
    ErrtextS = 46,
    Esc = 47,
    Exec = 48,
    Exit = 49,
    Exp = 50,
    Export = 51,
    External = 52,
    False = 53,
    File = 54,
    Find = 55,
    For = 56,
    Freefile = 57,
    Func = 58,
    GetS = 59,
    Goto = 60,
    Handler = 61,
    If = 62,
    Import = 63,
    In = 64,
    Input = 65,
    Int = 66,
    KeyS = 67,
    Label = 68,
    Len = 69,
    Let = 70,
    List = 71,
    Load = 72,
    Log = 73,
    Loop = 74,
    Merge = 75,
    Mod = 76,
    Module = 77,
    Neqv = 78,
    New = 79,
    Next = 80,
    Not = 81,
    Of = 82,
    Old = 83,
    Open = 84,
    Or = 85,
    Ord = 86,
    Otherwise = 87,
    Page = 88,
    Pi = 89,
    Print = 90,
    Proc = 91,
    Random = 92,
    Randomize = 93,
    Read = 94,
    Ref = 95,
    Renum = 96,
    Repeat = 97,
    Report = 98,
    Restore = 99,
    Return = 100,
    Rnd = 101,
    Run = 102,
    Save = 103,
    Scan = 104,
    Sgn = 105,
    Sin = 106,
    SpcS = 107,
    Sqr = 108,
    Step = 109,
    Stop = 110,
    StrS = 111,
    Tab = 112,
    Tan = 113,
    Then = 114,
    Time = 115,
    To = 116,
    Trap = 117,
    True = 118,
    Until = 119,
    Using = 120,
    Val = 121,
    When = 122,
    While = 123,
    Write = 124,
    Xor = 125,
    Zone = 126,
}

/// Keyword table, indexed by discriminant and sorted by spelling.
pub const ALL_KEYWORDS: &[(Keyword, &str)] = &[
    (Keyword::Abs, "ABS"),
    (Keyword::And, "AND"),
    (Keyword::Append, "APPEND"),
    (Keyword::At, "AT"),
    (Keyword::Atn, "ATN"),
    (Keyword::Auto, "AUTO"),
    (Keyword::Bitand, "BITAND"),
    (Keyword::Bitor, "BITOR"),
    (Keyword::Bitxor, "BITXOR"),
    (Keyword::Bye, "BYE"),
    (Keyword::Case, "CASE"),
    (Keyword::Cat, "CAT"),
    (Keyword::Change, "CHANGE"),
    (Keyword::ChrS, "CHR$"),
    (Keyword::Close, "CLOSE"),
    (Keyword::Closed, "CLOSED"),
    (Keyword::Colour, "COLOUR"),
    (Keyword::Cos, "COS"),
    (Keyword::Create, "CREATE"),
    (Keyword::Curcol, "CURCOL"),
    (Keyword::Currow, "CURROW"),
    (Keyword::Cursor, "CURSOR"),
    (Keyword::Data, "DATA"),
    (Keyword::Del, "DEL"),
    (Keyword::Delete, "DELETE"),
    (Keyword::Dim, "DIM"),
    (Keyword::Dir, "DIR"),
    (Keyword::Display, "DISPLAY"),
    (Keyword::Div, "DIV"),
    (Keyword::Do, "DO"),
    (Keyword::Edit, "EDIT"),
    (Keyword::Elif, "ELIF"),
    (Keyword::Else, "ELSE"),
    (Keyword::End, "END"),
    (Keyword::Endcase, "ENDCASE"),
    (Keyword::Endfunc, "ENDFUNC"),
    (Keyword::Endif, "ENDIF"),
    (Keyword::Endloop, "ENDLOOP"),
    (Keyword::Endproc, "ENDPROC"),
    (Keyword::Endtrap, "ENDTRAP"),
    (Keyword::Endwhile, "ENDWHILE"),
    (Keyword::Enter, "ENTER"),
    (Keyword::Eod, "EOD"),
    (Keyword::Eof, "EOF"),
    (Keyword::Eqv, "EQV"),
    (Keyword::Err, "ERR"),
    (Keyword::ErrtextS, "ERRTEXT$"),
    (Keyword::Esc, "ESC"),
    (Keyword::Exec, "EXEC"),
    (Keyword::Exit, "EXIT"),
    (Keyword::Exp, "EXP"),
    (Keyword::Export, "EXPORT"),
    (Keyword::External, "EXTERNAL"),
    (Keyword::False, "FALSE"),
    (Keyword::File, "FILE"),
    (Keyword::Find, "FIND"),
    (Keyword::For, "FOR"),
    (Keyword::Freefile, "FREEFILE"),
    (Keyword::Func, "FUNC"),
    (Keyword::GetS, "GET$"),
    (Keyword::Goto, "GOTO"),
    (Keyword::Handler, "HANDLER"),
    (Keyword::If, "IF"),
    (Keyword::Import, "IMPORT"),
    (Keyword::In, "IN"),
    (Keyword::Input, "INPUT"),
    (Keyword::Int, "INT"),
    (Keyword::KeyS, "KEY$"),
    (Keyword::Label, "LABEL"),
    (Keyword::Len, "LEN"),
    (Keyword::Let, "LET"),
    (Keyword::List, "LIST"),
    (Keyword::Load, "LOAD"),
    (Keyword::Log, "LOG"),
    (Keyword::Loop, "LOOP"),
    (Keyword::Merge, "MERGE"),
    (Keyword::Mod, "MOD"),
    (Keyword::Module, "MODULE"),
    (Keyword::Neqv, "NEQV"),
    (Keyword::New, "NEW"),
    (Keyword::Next, "NEXT"),
    (Keyword::Not, "NOT"),
    (Keyword::Of, "OF"),
    (Keyword::Old, "OLD"),
    (Keyword::Open, "OPEN"),
    (Keyword::Or, "OR"),
    (Keyword::Ord, "ORD"),
    (Keyword::Otherwise, "OTHERWISE"),
    (Keyword::Page, "PAGE"),
    (Keyword::Pi, "PI"),
    (Keyword::Print, "PRINT"),
    (Keyword::Proc, "PROC"),
    (Keyword::Random, "RANDOM"),
    (Keyword::Randomize, "RANDOMIZE"),
    (Keyword::Read, "READ"),
    (Keyword::Ref, "REF"),
    (Keyword::Renum, "RENUM"),
    (Keyword::Repeat, "REPEAT"),
    (Keyword::Report, "REPORT"),
    (Keyword::Restore, "RESTORE"),
    (Keyword::Return, "RETURN"),
    (Keyword::Rnd, "RND"),
    (Keyword::Run, "RUN"),
    (Keyword::Save, "SAVE"),
    (Keyword::Scan, "SCAN"),
    (Keyword::Sgn, "SGN"),
    (Keyword::Sin, "SIN"),
    (Keyword::SpcS, "SPC$"),
    (Keyword::Sqr, "SQR"),
    (Keyword::Step, "STEP"),
    (Keyword::Stop, "STOP"),
    (Keyword::StrS, "STR$"),
    (Keyword::Tab, "TAB"),
    (Keyword::Tan, "TAN"),
    (Keyword::Then, "THEN"),
    (Keyword::Time, "TIME"),
    (Keyword::To, "TO"),
    (Keyword::Trap, "TRAP"),
    (Keyword::True, "TRUE"),
    (Keyword::Until, "UNTIL"),
    (Keyword::Using, "USING"),
    (Keyword::Val, "VAL"),
    (Keyword::When, "WHEN"),
    (Keyword::While, "WHILE"),
    (Keyword::Write, "WRITE"),
    (Keyword::Xor, "XOR"),
    (Keyword::Zone, "ZONE"),
];

impl Keyword {
    /// Canonical (upper-case) spelling, as printed by LIST.
    pub fn name(self) -> &'static str {
        ALL_KEYWORDS[self as usize].1
    }

    /// Case-insensitive reserved-word lookup. `word` may be any casing.
    pub fn lookup(word: &str) -> Option<Keyword> {
        let upper = word.to_ascii_uppercase();
        ALL_KEYWORDS
            .binary_search_by(|(_, name)| (*name).cmp(upper.as_str()))
            .ok()
            .map(|i| ALL_KEYWORDS[i].0)
    }

    /// Reverse of the discriminant, for image deserialisation.
    pub fn from_u8(n: u8) -> Option<Keyword> {
        ALL_KEYWORDS.get(n as usize).map(|(k, _)| *k)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One lexical token. The variant determines the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// End of line. Every line ends with exactly one.
    Eol,
    /// A run of whitespace, collapsed to a single token so listings
    /// reproduce their original spacing.
    Space,
    /// Synthetic end-of-program marker returned by the line cursor when the
    /// store is exhausted. Never stored in a line.
    EndOfFile,
    /// Identifier with original casing preserved; lookup is case-insensitive.
    Identifier(String),
    /// String literal, quotes stripped and `""` unescaped.
    Str(String),
    /// Integer literal.
    Int(i32),
    /// Floating-point literal.
    Float(f32),
    /// Comment text, introducer (`!` or `//`) included, verbatim.
    Comment(String),
    /// Lexical error carried as data; the parser reports it when pulled.
    Error { message: String, text: String },
    /// `:=`
    Assign,
    /// `:+`
    IncAssign,
    /// `:-`
    DecAssign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    Semi,
    Colon,
    Apostrophe,
    Tilde,
    Kw(Keyword),
}

impl Token {
    /// Stable serialisation tag. Append-only; never reassign a shipped value.
    pub fn tag(&self) -> u8 {
        match self {
            Token::Eol => 0,
            Token::Space => 1,
            Token::EndOfFile => 2,
            Token::Identifier(_) => 3,
            Token::Str(_) => 4,
            Token::Int(_) => 5,
            Token::Float(_) => 6,
            Token::Comment(_) => 7,
            Token::Error { .. } => 8,
            Token::Assign => 9,
            Token::IncAssign => 10,
            Token::DecAssign => 11,
            Token::Eq => 12,
            Token::Ne => 13,
            Token::Lt => 14,
            Token::Le => 15,
            Token::Gt => 16,
            Token::Ge => 17,
            Token::Plus => 18,
            Token::Minus => 19,
            Token::Star => 20,
            Token::Slash => 21,
            Token::Caret => 22,
            Token::LParen => 23,
            Token::RParen => 24,
            Token::Comma => 25,
            Token::Semi => 26,
            Token::Colon => 27,
            Token::Apostrophe => 28,
            Token::Tilde => 29,
            Token::Kw(k) => KEYWORD_TAG_BASE + *k as u8,
        }
    }

    /// Rebuild a payloadless token from its tag. Payload-bearing tags
    /// (identifier, string, numbers, comment, error) return `None`; the
    /// image reader handles those itself.
    pub fn simple_from_tag(tag: u8) -> Option<Token> {
        if tag >= KEYWORD_TAG_BASE {
            return Keyword::from_u8(tag - KEYWORD_TAG_BASE).map(Token::Kw);
        }
        Some(match tag {
            0 => Token::Eol,
            1 => Token::Space,
            2 => Token::EndOfFile,
            9 => Token::Assign,
            10 => Token::IncAssign,
            11 => Token::DecAssign,
            12 => Token::Eq,
            13 => Token::Ne,
            14 => Token::Lt,
            15 => Token::Le,
            16 => Token::Gt,
            17 => Token::Ge,
            18 => Token::Plus,
            19 => Token::Minus,
            20 => Token::Star,
            21 => Token::Slash,
            22 => Token::Caret,
            23 => Token::LParen,
            24 => Token::RParen,
            25 => Token::Comma,
            26 => Token::Semi,
            27 => Token::Colon,
            28 => Token::Apostrophe,
            29 => Token::Tilde,
            _ => return None,
        })
    }

    /// True for the tokens statement parsing treats as end-of-line:
    /// `Eol`, comments, and the synthetic end-of-program marker.
    pub fn is_line_ender(&self) -> bool {
        matches!(self, Token::Eol | Token::Comment(_) | Token::EndOfFile)
    }

    /// True when the token is a specific keyword.
    pub fn is_kw(&self, kw: Keyword) -> bool {
        matches!(self, Token::Kw(k) if *k == kw)
    }
}

/// Format a float literal so it scans back as a float (always keeps a `.`
/// or exponent).
pub fn format_float(v: f32) -> String {
    let s = format!("{}", v);
    if s.contains('.') || s.contains('e') || s.contains('E') || s.contains("inf") || s.contains("NaN")
    {
        s
    } else {
        format!("{}.0", s)
    }
}

impl fmt::Display for Token {
    /// Listing text of the token. Concatenating a line's tokens reproduces
    /// its source verbatim (the fingerprint property).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Eol | Token::EndOfFile => Ok(()),
            Token::Space => f.write_str(" "),
            Token::Identifier(name) => f.write_str(name),
            Token::Str(text) => write!(f, "\"{}\"", text.replace('"', "\"\"")),
            Token::Int(v) => write!(f, "{}", v),
            Token::Float(v) => f.write_str(&format_float(*v)),
            Token::Comment(text) => f.write_str(text),
            Token::Error { text, .. } => f.write_str(text),
            Token::Assign => f.write_str(":="),
            Token::IncAssign => f.write_str(":+"),
            Token::DecAssign => f.write_str(":-"),
            Token::Eq => f.write_str("="),
            Token::Ne => f.write_str("<>"),
            Token::Lt => f.write_str("<"),
            Token::Le => f.write_str("<="),
            Token::Gt => f.write_str(">"),
            Token::Ge => f.write_str(">="),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Caret => f.write_str("^"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Comma => f.write_str(","),
            Token::Semi => f.write_str(";"),
            Token::Colon => f.write_str(":"),
            Token::Apostrophe => f.write_str("'"),
            Token::Tilde => f.write_str("~"),
            Token::Kw(k) => f.write_str(k.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_table_indexed_by_discriminant() {
        for (i, (kw, _)) in ALL_KEYWORDS.iter().enumerate() {
            assert_eq!(*kw as usize, i, "table out of order at {}", i);
        }
    }

    #[test]
    fn test_keyword_table_sorted_by_spelling() {
        for pair in ALL_KEYWORDS.windows(2) {
            assert!(
                pair[0].1 < pair[1].1,
                "'{}' must sort before '{}'",
                pair[0].1,
                pair[1].1
            );
        }
    }

    #[test]
    fn test_lookup_case_insensitive() {
        assert_eq!(Keyword::lookup("proc"), Some(Keyword::Proc));
        assert_eq!(Keyword::lookup("Proc"), Some(Keyword::Proc));
        assert_eq!(Keyword::lookup("ENDWHILE"), Some(Keyword::Endwhile));
        assert_eq!(Keyword::lookup("chr$"), Some(Keyword::ChrS));
        assert_eq!(Keyword::lookup("frobnicate"), None);
    }

    #[test]
    fn test_tags_are_stable() {
        // Spot-check shipped tag values. These must never change.
        assert_eq!(Token::Eol.tag(), 0);
        assert_eq!(Token::Identifier("A".into()).tag(), 3);
        assert_eq!(Token::Int(1).tag(), 5);
        assert_eq!(Token::Assign.tag(), 9);
        assert_eq!(Token::Tilde.tag(), 29);
        assert_eq!(Token::Kw(Keyword::Abs).tag(), KEYWORD_TAG_BASE);
        assert_eq!(Token::Kw(Keyword::Zone).tag(), KEYWORD_TAG_BASE + 126);
    }

    #[test]
    fn test_simple_from_tag_round_trip() {
        let simples = [
            Token::Eol,
            Token::Space,
            Token::EndOfFile,
            Token::Assign,
            Token::IncAssign,
            Token::Le,
            Token::Caret,
            Token::Kw(Keyword::Proc),
            Token::Kw(Keyword::Endfunc),
        ];
        for t in simples {
            assert_eq!(Token::simple_from_tag(t.tag()), Some(t.clone()));
        }
        // Payload tags are not simple.
        assert_eq!(Token::simple_from_tag(3), None);
        assert_eq!(Token::simple_from_tag(8), None);
    }

    #[test]
    fn test_display_reproduces_source() {
        assert_eq!(Token::Kw(Keyword::Print).to_string(), "PRINT");
        assert_eq!(Token::Str("say \"hi\"".into()).to_string(), "\"say \"\"hi\"\"\"");
        assert_eq!(Token::Float(2.5).to_string(), "2.5");
        assert_eq!(Token::Float(3.0).to_string(), "3.0");
        assert_eq!(Token::Ne.to_string(), "<>");
    }
}
