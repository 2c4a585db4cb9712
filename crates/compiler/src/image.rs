//! Tokenised-image (de)serialisation: the on-disk form used by SAVE/LOAD.
//!
//! A line serialises as its tokens in order, each as a tag byte plus
//! payload; the file is the concatenation of per-line streams with no
//! header and no checksum. Version compatibility rests entirely on the
//! append-only tag policy in `token`.
//!
//! Payload layout: identifier/string/comment are length-prefixed (u16
//! little-endian) UTF-8; integers are i32 little-endian; floats are IEEE754
//! bits little-endian; an error token is two length-prefixed strings.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use crate::line::Line;
use crate::store::LineStore;
use crate::token::Token;

fn invalid() -> io::Error {
    io::Error::new(ErrorKind::InvalidData, "Invalid program file")
}

fn write_str(w: &mut impl Write, s: &str) -> io::Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(io::Error::new(ErrorKind::InvalidInput, "string too long"));
    }
    w.write_all(&(bytes.len() as u16).to_le_bytes())?;
    w.write_all(bytes)
}

fn read_str(r: &mut impl Read) -> io::Result<String> {
    let mut len = [0u8; 2];
    r.read_exact(&mut len)?;
    let mut bytes = vec![0u8; u16::from_le_bytes(len) as usize];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| invalid())
}

pub fn write_token(w: &mut impl Write, token: &Token) -> io::Result<()> {
    w.write_all(&[token.tag()])?;
    match token {
        Token::Identifier(s) | Token::Str(s) | Token::Comment(s) => write_str(w, s),
        Token::Int(v) => w.write_all(&v.to_le_bytes()),
        Token::Float(v) => w.write_all(&v.to_le_bytes()),
        Token::Error { message, text } => {
            write_str(w, message)?;
            write_str(w, text)
        }
        _ => Ok(()),
    }
}

pub fn read_token(r: &mut impl Read) -> io::Result<Token> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag)?;
    let tag = tag[0];
    match tag {
        3 => Ok(Token::Identifier(read_str(r)?)),
        4 => Ok(Token::Str(read_str(r)?)),
        5 => {
            let mut b = [0u8; 4];
            r.read_exact(&mut b)?;
            Ok(Token::Int(i32::from_le_bytes(b)))
        }
        6 => {
            let mut b = [0u8; 4];
            r.read_exact(&mut b)?;
            Ok(Token::Float(f32::from_le_bytes(b)))
        }
        7 => Ok(Token::Comment(read_str(r)?)),
        8 => Ok(Token::Error {
            message: read_str(r)?,
            text: read_str(r)?,
        }),
        _ => Token::simple_from_tag(tag).ok_or_else(invalid),
    }
}

pub fn write_line(w: &mut impl Write, line: &Line) -> io::Result<()> {
    for token in line.tokens() {
        write_token(w, token)?;
    }
    Ok(())
}

/// Read one line's tokens, up to and including `Eol`. Returns `None` on a
/// clean end of stream (before any token of the line was read).
pub fn read_line_image(r: &mut impl Read) -> io::Result<Option<Line>> {
    let mut tokens = Vec::new();
    loop {
        match read_token(r) {
            Ok(Token::Eol) => {
                tokens.push(Token::Eol);
                return Ok(Some(Line::new(tokens)));
            }
            Ok(token) => tokens.push(token),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof && tokens.is_empty() => {
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(invalid()),
            Err(e) => return Err(e),
        }
    }
}

pub fn save_to_writer(w: &mut impl Write, store: &LineStore) -> io::Result<()> {
    for line in store.iter() {
        write_line(w, line)?;
    }
    Ok(())
}

pub fn load_from_reader(r: &mut impl Read) -> io::Result<LineStore> {
    let mut lines = Vec::new();
    while let Some(line) = read_line_image(r)? {
        lines.push(line);
    }
    Ok(LineStore::from_lines(lines))
}

/// Serialise the store to a tokenised program file.
pub fn save(store: &LineStore, path: &Path) -> Result<(), String> {
    let file = File::create(path)
        .map_err(|e| format!("Cannot create {}: {}", path.display(), e))?;
    let mut w = BufWriter::new(file);
    save_to_writer(&mut w, store)
        .and_then(|_| w.flush())
        .map_err(|e| format!("Cannot write {}: {}", path.display(), e))
}

/// Load a tokenised program file into a fresh store.
pub fn load(path: &Path) -> Result<LineStore, String> {
    let file = File::open(path)
        .map_err(|e| format!("Cannot open {}: {}", path.display(), e))?;
    let mut r = BufReader::new(file);
    load_from_reader(&mut r).map_err(|e| {
        if e.kind() == ErrorKind::InvalidData || e.kind() == ErrorKind::UnexpectedEof {
            "Invalid program file".to_string()
        } else {
            format!("Cannot read {}: {}", path.display(), e)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    fn image_of(store: &LineStore) -> Vec<u8> {
        let mut bytes = Vec::new();
        save_to_writer(&mut bytes, store).unwrap();
        bytes
    }

    #[test]
    fn test_token_round_trip() {
        let sources = [
            "10 PRINT \"HELLO\", A#; 2.5",
            "20 IF x'2>=3 THEN GOTO done ! note",
            "30 A$:=\"quote \"\" inside\"",
            "40 WHILE TRUE DO ENDWHILE // tail",
        ];
        for src in sources {
            let tokens = tokenize(src);
            let mut bytes = Vec::new();
            for t in &tokens {
                write_token(&mut bytes, t).unwrap();
            }
            let mut r = bytes.as_slice();
            let line = read_line_image(&mut r).unwrap().unwrap();
            assert_eq!(line.tokens(), tokens.as_slice(), "round trip of {:?}", src);
        }
    }

    #[test]
    fn test_image_bytes_stable() {
        // serialise(deserialise(bytes)) == bytes
        let store = LineStore::from_lines(vec![
            Line::from_text("10 FOR I:=1 TO 10 DO"),
            Line::from_text("20 NEXT I"),
        ]);
        let bytes = image_of(&store);
        let reloaded = load_from_reader(&mut bytes.as_slice()).unwrap();
        assert_eq!(image_of(&reloaded), bytes);
    }

    #[test]
    fn test_error_token_round_trip() {
        let tokens = tokenize("10 A:=99999999999");
        let mut bytes = Vec::new();
        for t in &tokens {
            write_token(&mut bytes, t).unwrap();
        }
        let line = read_line_image(&mut bytes.as_slice()).unwrap().unwrap();
        assert_eq!(line.tokens(), tokens.as_slice());
    }

    #[test]
    fn test_empty_stream_is_empty_store() {
        let store = load_from_reader(&mut [].as_slice()).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_truncated_line_is_invalid() {
        let store = LineStore::from_lines(vec![Line::from_text("10 PRINT \"X\"")]);
        let mut bytes = image_of(&store);
        bytes.truncate(bytes.len() - 1); // drop the Eol tag
        assert!(load_from_reader(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_unknown_tag_is_invalid() {
        let bytes = [250u8, 0];
        assert!(load_from_reader(&mut bytes.as_slice()).is_err());
    }

    #[test]
    fn test_save_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prog.cml");
        let store = LineStore::from_lines(vec![
            Line::from_text("10 DIM S$ OF 5"),
            Line::from_text("20 S$:=\"HELLO\""),
        ]);
        save(&store, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(20).unwrap().text(), "20 S$:=\"HELLO\"");
    }

    #[test]
    fn test_load_corrupt_file_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.cml");
        std::fs::write(&path, [250u8, 1, 2, 3]).unwrap();
        assert_eq!(load(&path).unwrap_err(), "Invalid program file");
    }
}
