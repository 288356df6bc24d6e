//! Minimal C tokenizer.
//!
//! Produces identifiers, numbers, literals and punctuation with line numbers.
//! Comments and preprocessor lines (including `\` continuations) are skipped.

use memchr::{memchr, memchr_iter, memmem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident,
    Number,
    /// String or character literal, quotes included.
    Literal,
    /// `->`
    Arrow,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Token<'s> {
    pub kind: TokenKind,
    pub text: &'s str,
    pub line: usize,
}

impl Token<'_> {
    pub fn is(&self, text: &str) -> bool {
        self.text == text
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }
}

pub(crate) fn tokenize(src: &str) -> Vec<Token<'_>> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::with_capacity(bytes.len() / 4);
    let mut pos = 0;
    let mut line = 1;
    let mut line_start = true;

    while let Some(&b) = bytes.get(pos) {
        let next = bytes.get(pos + 1).copied();
        match b {
            b'\n' => {
                line += 1;
                pos += 1;
                line_start = true;
                continue;
            }
            b' ' | b'\t' | b'\r' | 0x0b | 0x0c => {
                pos += 1;
                continue;
            }
            b'#' if line_start => {
                pos = skip_directive(bytes, pos, &mut line);
                continue;
            }
            b'/' if next == Some(b'/') => {
                pos = memchr(b'\n', &bytes[pos..]).map_or(bytes.len(), |i| pos + i);
                continue;
            }
            b'/' if next == Some(b'*') => {
                let end = memmem::find(&bytes[pos + 2..], b"*/").map_or(bytes.len(), |i| pos + 2 + i + 2);
                line += newlines(&bytes[pos..end]);
                pos = end;
                continue;
            }
            b'"' | b'\'' => {
                let end = skip_quoted(bytes, pos, b);
                tokens.push(Token {
                    kind: TokenKind::Literal,
                    text: &src[pos..end],
                    line,
                });
                pos = end;
            }
            b'-' if next == Some(b'>') => {
                tokens.push(Token {
                    kind: TokenKind::Arrow,
                    text: &src[pos..pos + 2],
                    line,
                });
                pos += 2;
            }
            b if b.is_ascii_alphabetic() || b == b'_' => {
                let end = scan(bytes, pos, |c| c.is_ascii_alphanumeric() || c == b'_');
                tokens.push(Token {
                    kind: TokenKind::Ident,
                    text: &src[pos..end],
                    line,
                });
                pos = end;
            }
            b if b.is_ascii_digit() => {
                let end = scan(bytes, pos, |c| c.is_ascii_alphanumeric() || c == b'_' || c == b'.');
                tokens.push(Token {
                    kind: TokenKind::Number,
                    text: &src[pos..end],
                    line,
                });
                pos = end;
            }
            b if b.is_ascii() => {
                tokens.push(Token {
                    kind: TokenKind::Punct,
                    text: &src[pos..pos + 1],
                    line,
                });
                pos += 1;
            }
            // non-ASCII bytes only occur inside identifiers of other encodings; skip
            _ => {
                pos += 1;
                continue;
            }
        }
        line_start = false;
    }

    tokens
}

fn scan(bytes: &[u8], start: usize, accept: impl Fn(u8) -> bool) -> usize {
    bytes[start..]
        .iter()
        .position(|&c| !accept(c))
        .map_or(bytes.len(), |i| start + i)
}

fn newlines(bytes: &[u8]) -> usize {
    memchr_iter(b'\n', bytes).count()
}

/// Position of the newline ending a preprocessor line, following continuations.
fn skip_directive(bytes: &[u8], start: usize, line: &mut usize) -> usize {
    let mut pos = start;
    loop {
        let Some(offset) = memchr(b'\n', &bytes[pos..]) else {
            return bytes.len();
        };
        let end = pos + offset;
        let body = &bytes[pos..end];
        let body = body.strip_suffix(b"\r").unwrap_or(body);
        if body.ends_with(b"\\") {
            *line += 1;
            pos = end + 1;
        } else {
            return end;
        }
    }
}

/// End (exclusive) of a quoted literal. Unterminated literals stop at the line end.
fn skip_quoted(bytes: &[u8], start: usize, quote: u8) -> usize {
    let mut pos = start + 1;
    while let Some(&c) = bytes.get(pos) {
        match c {
            b'\\' => pos += 2,
            b'\n' => return pos,
            c if c == quote => return pos + 1,
            _ => pos += 1,
        }
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<&str> {
        tokenize(src).into_iter().map(|t| t.text).collect()
    }

    #[test]
    fn skips_comments_and_directives() {
        let src = "#include <Uefi.h>\n#define X(a) \\\n  (a)\n/* block\n comment */ int // tail\nmain;";
        let tokens = tokenize(src);
        let names: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(names, ["int", "main", ";"]);
        assert_eq!(tokens[0].line, 5);
        assert_eq!(tokens[1].line, 6);
    }

    #[test]
    fn literals_hide_their_contents() {
        let tokens = tokenize(r#"Print (L"a(b) \" // c", 'x', '\'');"#);
        assert_eq!(tokens[2].text, "L");
        assert_eq!(tokens[3].text, r#""a(b) \" // c""#);
        assert_eq!(tokens[3].kind, TokenKind::Literal);
        assert_eq!(tokens.len(), 10);
        assert_eq!(texts(r#"'\''"#), [r#"'\''"#]);
    }

    #[test]
    fn arrows_and_numbers() {
        assert_eq!(
            texts("This->Fn(0x1F, 1.5)"),
            ["This", "->", "Fn", "(", "0x1F", ",", "1.5", ")"]
        );
    }

    #[test]
    fn hash_inside_a_line_is_punctuation() {
        assert_eq!(texts("a # b"), ["a", "#", "b"]);
    }
}
