//! Line tokeniser.
//!
//! Maps one source line to a token sequence ending in `Eol`. Lexical
//! problems never abort tokenisation: they become `Token::Error` values in
//! the stream, and the parser reports them when it pulls them.

use crate::token::{Keyword, Token};

/// Identifiers longer than this produce an `Error` token.
pub const MAX_IDENTIFIER_LEN: usize = 80;

/// Tokenise one source line. The result always ends with exactly one `Eol`.
pub fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            tokens.push(Token::Space);
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()))
        {
            i = scan_number(&chars, i, &mut tokens);
            continue;
        }

        if c.is_ascii_alphabetic() {
            i = scan_word(&chars, i, &mut tokens);
            continue;
        }

        if c == '"' {
            i = scan_string(&chars, i, &mut tokens);
            continue;
        }

        if c == '!' {
            let rest: String = chars[i..].iter().collect();
            tokens.push(Token::Comment(rest));
            break;
        }

        // Operators, multi-character first.
        let next = chars.get(i + 1).copied();
        let (token, width) = match (c, next) {
            (':', Some('=')) => (Token::Assign, 2),
            (':', Some('+')) => (Token::IncAssign, 2),
            (':', Some('-')) => (Token::DecAssign, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('<', Some('>')) => (Token::Ne, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('/', Some('/')) => {
                let rest: String = chars[i..].iter().collect();
                tokens.push(Token::Comment(rest));
                break;
            }
            (':', _) => (Token::Colon, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('=', _) => (Token::Eq, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('^', _) => (Token::Caret, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            (';', _) => (Token::Semi, 1),
            ('\'', _) => (Token::Apostrophe, 1),
            ('~', _) => (Token::Tilde, 1),
            _ => (
                Token::Error {
                    message: format!("unexpected character '{}'", c),
                    text: c.to_string(),
                },
                1,
            ),
        };
        tokens.push(token);
        i += width;
    }

    tokens.push(Token::Eol);
    tokens
}

/// Numeric literal: optional leading `.`, integer part, optional fraction,
/// optional `E[+|-]digits`. Any fraction or exponent makes it a float.
fn scan_number(chars: &[char], start: usize, tokens: &mut Vec<Token>) -> usize {
    let mut i = start;
    let mut has_frac = false;
    let mut has_exp = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
        has_frac = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }

    // Exponent is consumed only when well-formed; otherwise the E starts
    // the next token.
    if i < chars.len() && (chars[i] == 'E' || chars[i] == 'e') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            while j < chars.len() && chars[j].is_ascii_digit() {
                j += 1;
            }
            has_exp = true;
            i = j;
        }
    }

    let text: String = chars[start..i].iter().collect();
    if has_frac || has_exp {
        match text.parse::<f32>() {
            Ok(v) if v.is_finite() => tokens.push(Token::Float(v)),
            _ => tokens.push(Token::Error {
                message: "number out of range".to_string(),
                text,
            }),
        }
    } else {
        match text.parse::<i32>() {
            Ok(v) => tokens.push(Token::Int(v)),
            Err(_) => tokens.push(Token::Error {
                message: "number out of range".to_string(),
                text,
            }),
        }
    }
    i
}

/// Identifier or reserved word: letter, then letters/digits/apostrophes,
/// with an optional trailing `#` or `$` sigil included in the word.
fn scan_word(chars: &[char], start: usize, tokens: &mut Vec<Token>) -> usize {
    let mut i = start;
    while i < chars.len()
        && (chars[i].is_ascii_alphanumeric() || chars[i] == '\'')
    {
        i += 1;
    }
    if i < chars.len() && (chars[i] == '#' || chars[i] == '$') {
        i += 1;
    }

    let word: String = chars[start..i].iter().collect();
    if word.chars().count() > MAX_IDENTIFIER_LEN {
        tokens.push(Token::Error {
            message: format!("identifier exceeds {} characters", MAX_IDENTIFIER_LEN),
            text: word.chars().take(MAX_IDENTIFIER_LEN).collect(),
        });
        return i;
    }

    match Keyword::lookup(&word) {
        Some(kw) => tokens.push(Token::Kw(kw)),
        None => tokens.push(Token::Identifier(word)),
    }
    i
}

/// String literal; `""` inside is a literal quote. Unterminated strings
/// yield an `Error` token carrying the consumed text.
fn scan_string(chars: &[char], start: usize, tokens: &mut Vec<Token>) -> usize {
    let mut i = start + 1;
    let mut value = String::new();

    while i < chars.len() {
        if chars[i] == '"' {
            if chars.get(i + 1) == Some(&'"') {
                value.push('"');
                i += 2;
                continue;
            }
            tokens.push(Token::Str(value));
            return i + 1;
        }
        value.push(chars[i]);
        i += 1;
    }

    let text: String = chars[start..].iter().collect();
    tokens.push(Token::Error {
        message: "unterminated string literal".to_string(),
        text,
    });
    chars.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(text: &str) -> Vec<Token> {
        tokenize(text)
    }

    #[test]
    fn test_line_number_and_statement() {
        let t = toks("10 PRINT \"HELLO\"");
        assert_eq!(
            t,
            vec![
                Token::Int(10),
                Token::Space,
                Token::Kw(Keyword::Print),
                Token::Space,
                Token::Str("HELLO".into()),
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_whitespace_collapses() {
        let t = toks("A    :=\t 1");
        assert_eq!(
            t,
            vec![
                Token::Identifier("A".into()),
                Token::Space,
                Token::Assign,
                Token::Space,
                Token::Int(1),
                Token::Eol,
            ]
        );
    }

    #[test]
    fn test_identifier_sigils_and_case() {
        let t = toks("Count# total$ x'2");
        assert_eq!(t[0], Token::Identifier("Count#".into()));
        assert_eq!(t[2], Token::Identifier("total$".into()));
        assert_eq!(t[4], Token::Identifier("x'2".into()));
    }

    #[test]
    fn test_keywords_case_insensitive() {
        let t = toks("proc Endproc chr$");
        assert_eq!(t[0], Token::Kw(Keyword::Proc));
        assert_eq!(t[2], Token::Kw(Keyword::Endproc));
        assert_eq!(t[4], Token::Kw(Keyword::ChrS));
    }

    #[test]
    fn test_numeric_literals() {
        assert_eq!(toks("42")[0], Token::Int(42));
        assert_eq!(toks("2.5")[0], Token::Float(2.5));
        assert_eq!(toks(".5")[0], Token::Float(0.5));
        assert_eq!(toks("1E3")[0], Token::Float(1000.0));
        assert_eq!(toks("2E-2")[0], Token::Float(0.02));
    }

    #[test]
    fn test_integer_overflow_is_error_token() {
        match &toks("99999999999")[0] {
            Token::Error { text, .. } => assert_eq!(text, "99999999999"),
            other => panic!("expected Error token, got {:?}", other),
        }
    }

    #[test]
    fn test_exponent_not_consumed_when_malformed() {
        // "2E" is the integer 2 followed by the identifier E.
        let t = toks("2E");
        assert_eq!(t[0], Token::Int(2));
        assert_eq!(t[1], Token::Identifier("E".into()));
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(toks("\"say \"\"hi\"\"\"")[0], Token::Str("say \"hi\"".into()));
    }

    #[test]
    fn test_unterminated_string() {
        match &toks("\"oops")[0] {
            Token::Error { message, .. } => assert!(message.contains("unterminated")),
            other => panic!("expected Error token, got {:?}", other),
        }
    }

    #[test]
    fn test_multi_char_operators() {
        let t = toks("a:=b:+c:-d<=e>=f<>g");
        assert_eq!(t[1], Token::Assign);
        assert_eq!(t[3], Token::IncAssign);
        assert_eq!(t[5], Token::DecAssign);
        assert_eq!(t[7], Token::Le);
        assert_eq!(t[9], Token::Ge);
        assert_eq!(t[11], Token::Ne);
    }

    #[test]
    fn test_comments() {
        let t = toks("10 A:=1 ! trailing note");
        assert_eq!(t[t.len() - 2], Token::Comment("! trailing note".into()));
        let t = toks("A:=1 // slashes too");
        assert_eq!(t[t.len() - 2], Token::Comment("// slashes too".into()));
    }

    #[test]
    fn test_identifier_cap() {
        let long = "A".repeat(90);
        match &toks(&long)[0] {
            Token::Error { message, text } => {
                assert!(message.contains("80"));
                assert_eq!(text.len(), 80);
            }
            other => panic!("expected Error token, got {:?}", other),
        }
    }

    #[test]
    fn test_every_line_ends_with_single_eol() {
        for src in ["", "   ", "10 PRINT", "! comment only"] {
            let t = toks(src);
            assert_eq!(t.last(), Some(&Token::Eol));
            assert_eq!(t.iter().filter(|t| **t == Token::Eol).count(), 1);
        }
    }
}
