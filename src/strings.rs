const QUOTES: &[char] = &['"', '\'', '`'];

/// Strip one leading and one trailing quote character (`"`, `'` or `` ` ``).
pub fn dequote(raw: &str) -> &str {
    let trimmed = raw.strip_prefix(QUOTES).unwrap_or(raw);
    trimmed.strip_suffix(QUOTES).unwrap_or(trimmed)
}

/// Convert a JavaScript string literal, as it appears in source, into the
/// text it denotes. Surrounding quotes are removed first.
///
/// Handles single-character escapes (`\n`, `\"`, ...), `\0`, octal (`\075`),
/// hex (`\x3d`), unicode (`\u003d`) and braced code point (`\u{3d}`) escapes.
/// Never fails: malformed escapes degrade to the characters that follow them.
pub fn decode(input: &str) -> String {
    let mut lx = Lexer::new(dequote(input));

    loop {
        lx.accept_run(|c| c != '\\');
        lx.emit_literal();

        // backslash
        if lx.next().is_none() {
            break;
        }
        lx.ignore();

        let Some(c) = lx.next() else { break };
        match c {
            'b' => lx.emit_char('\u{8}'),
            'f' => lx.emit_char('\u{c}'),
            'n' => lx.emit_char('\n'),
            'r' => lx.emit_char('\r'),
            't' => lx.emit_char('\t'),
            'v' => lx.emit_char('\u{b}'),
            '\'' | '"' | '\\' => lx.emit_char(c),
            '0' if !lx.peek().is_some_and(|p| p.is_ascii_digit()) => lx.emit_char('\0'),
            '0' => {
                lx.accept_run(|p| p.is_digit(8));
                lx.emit_number(8);
            }
            'x' => {
                lx.ignore();
                if lx.accept_n(|p| p.is_ascii_hexdigit(), 2) {
                    lx.emit_number(16);
                } else if lx.at_end() {
                    break;
                }
            }
            'u' => {
                lx.ignore();
                if lx.accept(|p| p == '{') {
                    lx.ignore();
                    lx.accept_run(|p| p.is_ascii_hexdigit());
                    lx.emit_number(16);
                    if lx.accept(|p| p == '}') {
                        lx.ignore();
                    }
                } else if lx.accept_n(|p| p.is_ascii_hexdigit(), 4) {
                    lx.emit_utf16_unit();
                } else if lx.at_end() {
                    break;
                }
            }
            // Unknown escape: the character stays pending and joins the next literal run.
            _ => {}
        }
    }

    lx.out
}

struct Lexer<'s> {
    input: &'s str,
    start: usize,
    pos: usize,
    out: String,
}

impl<'s> Lexer<'s> {
    fn new(input: &'s str) -> Self {
        Lexer {
            input,
            start: 0,
            pos: 0,
            out: String::with_capacity(input.len()),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn accept(&mut self, valid: impl Fn(char) -> bool) -> bool {
        match self.peek() {
            Some(c) if valid(c) => {
                self.pos += c.len_utf8();
                true
            }
            _ => false,
        }
    }

    fn accept_n(&mut self, valid: impl Fn(char) -> bool, n: usize) -> bool {
        (0..n).all(|_| self.accept(&valid))
    }

    fn accept_run(&mut self, valid: impl Fn(char) -> bool) {
        while self.accept(&valid) {}
    }

    fn pending(&self) -> &'s str {
        &self.input[self.start..self.pos]
    }

    fn ignore(&mut self) {
        self.start = self.pos;
    }

    fn emit_literal(&mut self) {
        self.out.push_str(self.pending());
        self.ignore();
    }

    fn emit_char(&mut self, c: char) {
        self.out.push(c);
        self.ignore();
    }

    fn emit_number(&mut self, radix: u32) {
        let digits = self.pending();
        match u32::from_str_radix(digits, radix) {
            Ok(n) => self.out.push(char::from_u32(n).unwrap_or(char::REPLACEMENT_CHARACTER)),
            Err(_) => self.out.push_str(digits),
        }
        self.ignore();
    }

    /// `\uXXXX` escapes are UTF-16 code units; join a high surrogate with a
    /// directly following `\uXXXX` low surrogate.
    fn emit_utf16_unit(&mut self) {
        let Ok(unit) = u16::from_str_radix(self.pending(), 16) else {
            self.emit_literal();
            return;
        };
        if (0xD800..0xDC00).contains(&unit) {
            if let Some(low) = self.trailing_low_surrogate() {
                self.pos += 6;
                let c = char::decode_utf16([unit, low])
                    .next()
                    .and_then(Result::ok)
                    .unwrap_or(char::REPLACEMENT_CHARACTER);
                self.emit_char(c);
                return;
            }
        }
        self.emit_char(char::from_u32(u32::from(unit)).unwrap_or(char::REPLACEMENT_CHARACTER));
    }

    fn trailing_low_surrogate(&self) -> Option<u16> {
        let rest = self.input[self.pos..].strip_prefix("\\u")?;
        let digits = rest.get(..4)?;
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let low = u16::from_str_radix(digits, 16).ok()?;
        (0xDC00..0xE000).contains(&low).then_some(low)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_escapes_in_context() {
        let cases = [
            (r#""foo bar""#, "foo bar"),
            (r#""foo\\bar""#, r"foo\bar"),
            (r#""foo\"bar""#, r#"foo"bar"#),
            (r#""foo\'bar""#, "foo'bar"),
            (r#""foo\075bar""#, "foo=bar"),
            (r#""foo\tbar""#, "foo\tbar"),
            (r#""foo\vbar""#, "foo\u{b}bar"),
            (r#""foo\u003dbar""#, "foo=bar"),
            (r#""foo\u{00000000003d}bar""#, "foo=bar"),
            (r#""foo\075""#, "foo="),
            (r#""foo\x3d""#, "foo="),
            (r#""foo\\""#, r"foo\"),
            (r#""\075foo""#, "=foo"),
            (r#""\x3dfoo""#, "=foo"),
            (r#""\\foo""#, r"\foo"),
            (r#""\075\x3d""#, "=="),
            (r#""\u{00000003d}\x3d""#, "=="),
            (r#""/help/doc/user_ed.jsp?loc\x3dhelp\x26target\x3d""#, "/help/doc/user_ed.jsp?loc=help&target="),
        ];
        for (input, want) in cases {
            assert_eq!(decode(input), want, "decoding {input}");
        }
    }

    #[test]
    fn malformed_escapes_degrade() {
        assert_eq!(decode(r#""\poo""#), "poo");
        assert_eq!(decode(r#""\u{0003doops""#), "=oops");
        assert_eq!(decode(r"foo\x3"), "foo");
        assert_eq!(decode(r"foo\u00"), "foo");
        assert_eq!(decode(r"foo\x3zbar"), "foo3zbar");
        assert_eq!(decode(r"trailing\"), "trailing");
    }

    #[test]
    fn null_and_surrogates() {
        assert_eq!(decode(r"a\0b"), "a\0b");
        assert_eq!(decode(r"\ud83d\ude00"), "\u{1F600}");
        assert_eq!(decode(r"x\ud83dy"), "x\u{FFFD}y");
    }

    #[test]
    fn dequote_strips_one_pair() {
        assert_eq!(dequote("'abc'"), "abc");
        assert_eq!(dequote("`tpl`"), "tpl");
        assert_eq!(dequote("\"\""), "");
        assert_eq!(dequote("bare"), "bare");
        assert_eq!(dequote("\"open"), "open");
    }
}
