use crate::util::U24;

use super::Tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub tag: Tag,
    pub length: U24,
    pub offset: u32,
}

impl Token {
    pub const EOF: Token = Token { tag: Tag::Eof, length: U24::ZERO, offset: 0 };

    pub fn byte_range(self) -> std::ops::Range<usize> {
        let start = self.offset as usize;
        start..start + self.length.to_usize()
    }

    pub fn end(self) -> u32 {
        self.offset + self.length.to_u32()
    }
}

pub struct Tokenizer<'src> {
    source: &'src str,
    offset: usize,
    template_starts: TemplateOffsetIter,
    template_ends: TemplateOffsetIter,
}

type TemplateOffsetIter = std::iter::Peekable<std::vec::IntoIter<u32>>;

impl<'src> Tokenizer<'src> {
    pub fn new(source: &'src str) -> Tokenizer<'src> {
        assert!(
            u32::try_from(source.len()).is_ok(),
            "source code is larger than what can be represented with 32-bit integer"
        );

        let delimiters = TemplateDelimiters::find(source);

        Tokenizer {
            source,
            offset: 0,
            template_starts: delimiters.starts.into_iter().peekable(),
            template_ends: delimiters.ends.into_iter().peekable(),
        }
    }

    pub fn next(&mut self) -> Token {
        self.offset += whitespace(&self.source[self.offset..]);
        let (tag, length) = self.strip_token();
        let token = Token {
            tag,
            length: U24::from_usize(length).expect("token exceeds maximum length"),
            offset: self.offset as u32,
        };
        self.offset += length;
        token
    }

    fn at_template_delimiter(iter: &mut TemplateOffsetIter, offset: usize) -> bool {
        if iter.peek() == Some(&(offset as u32)) {
            iter.next();
            true
        } else {
            false
        }
    }

    fn strip_token(&mut self) -> (Tag, usize) {
        let source = &self.source[self.offset..];
        let Some(&first) = source.as_bytes().first() else { return (Tag::Eof, 0) };
        let second = source.as_bytes().get(1).copied();
        let third = source.as_bytes().get(2).copied();

        match first {
            b'_' | b'a'..=b'z' | b'A'..=b'Z' => {
                let len = identifier(source);
                (classify_identifier(&source[..len]), len)
            },

            b'0' => number_prefix_0(source),
            b'1'..=b'9' => number_decimal(source),
            b'.' if second.is_some_and(|x| x.is_ascii_digit()) => number_decimal(source),

            b'<' => {
                if Self::at_template_delimiter(&mut self.template_starts, self.offset) {
                    return (Tag::TemplateListStart, 1);
                }
                match (second, third) {
                    (Some(b'<'), Some(b'=')) => (Tag::LessLessEqual, 3),
                    (Some(b'<'), _) => (Tag::LessLess, 2),
                    (Some(b'='), _) => (Tag::LessEqual, 2),
                    _ => (Tag::Less, 1),
                }
            },
            b'>' => {
                if Self::at_template_delimiter(&mut self.template_ends, self.offset) {
                    return (Tag::TemplateListEnd, 1);
                }
                match (second, third) {
                    (Some(b'>'), Some(b'=')) => (Tag::GreaterGreaterEqual, 3),
                    (Some(b'>'), _) => (Tag::GreaterGreater, 2),
                    (Some(b'='), _) => (Tag::GreaterEqual, 2),
                    _ => (Tag::Greater, 1),
                }
            },

            b'/' => match second {
                Some(b'/' | b'*') => (Tag::Comment, comment(source)),
                Some(b'=') => (Tag::SlashEqual, 2),
                _ => (Tag::Slash, 1),
            },
            b'-' => match second {
                Some(b'>') => (Tag::ThinArrowRight, 2),
                Some(b'-') => (Tag::MinusMinus, 2),
                Some(b'=') => (Tag::MinusEqual, 2),
                _ => (Tag::Minus, 1),
            },
            b'+' => match second {
                Some(b'+') => (Tag::PlusPlus, 2),
                Some(b'=') => (Tag::PlusEqual, 2),
                _ => (Tag::Plus, 1),
            },
            b'&' => match second {
                Some(b'&') => (Tag::AmpersandAmpersand, 2),
                Some(b'=') => (Tag::AmpersandEqual, 2),
                _ => (Tag::Ampersand, 1),
            },
            b'|' => match second {
                Some(b'|') => (Tag::BarBar, 2),
                Some(b'=') => (Tag::BarEqual, 2),
                _ => (Tag::Bar, 1),
            },
            b'=' => with_equal(second, Tag::Equal, Tag::EqualEqual),
            b'!' => with_equal(second, Tag::Exclamation, Tag::ExclamationEqual),
            b'%' => with_equal(second, Tag::Percent, Tag::PercentEqual),
            b'*' => with_equal(second, Tag::Asterisk, Tag::AsteriskEqual),
            b'^' => with_equal(second, Tag::Chevron, Tag::ChevronEqual),

            b'@' => (Tag::AtSign, 1),
            b'(' => (Tag::LParen, 1),
            b')' => (Tag::RParen, 1),
            b'[' => (Tag::LBracket, 1),
            b']' => (Tag::RBracket, 1),
            b'{' => (Tag::LCurly, 1),
            b'}' => (Tag::RCurly, 1),
            b'.' => (Tag::Dot, 1),
            b',' => (Tag::Comma, 1),
            b':' => (Tag::Colon, 1),
            b';' => (Tag::SemiColon, 1),
            b'~' => (Tag::Tilde, 1),

            byte => {
                // non-ASCII identifiers
                let len = identifier(source);
                if len != 0 {
                    return (classify_identifier(&source[..len]), len);
                }
                (Tag::InvalidToken, utf8_codepoint_length(byte).into())
            },
        }
    }
}

fn with_equal(next: Option<u8>, single: Tag, double: Tag) -> (Tag, usize) {
    match next {
        Some(b'=') => (double, 2),
        _ => (single, 1),
    }
}

/// Byte offsets of every `<` and `>` which delimit a template list, found using the template list
/// discovery algorithm from the WGSL specification.
#[derive(Debug)]
struct TemplateDelimiters {
    starts: Vec<u32>,
    ends: Vec<u32>,
}

impl TemplateDelimiters {
    fn find(source: &str) -> Self {
        struct Pending {
            depth: u32,
            start: u32,
        }

        let bytes = source.as_bytes();
        let mut pending = Vec::<Pending>::new();
        let mut starts = Vec::new();
        let mut ends = Vec::new();

        let mut depth = 0u32;
        let mut offset = 0usize;

        let discard_nested = |pending: &mut Vec<Pending>, depth: u32| {
            while pending.last().is_some_and(|x| x.depth >= depth) {
                pending.pop();
            }
        };

        loop {
            offset = skip_trivia(source, offset);
            let Some(&byte) = bytes.get(offset) else { break };

            match byte {
                b'>' => {
                    if let Some(last) = pending.last() {
                        if last.depth == depth {
                            starts.push(last.start);
                            ends.push(offset as u32);
                            pending.pop();
                            offset += 1;
                            continue;
                        }
                    }
                    offset += 1;
                    if bytes.get(offset) == Some(&b'=') {
                        offset += 1;
                    }
                },
                b'(' | b'[' => {
                    depth += 1;
                    offset += 1;
                },
                b')' | b']' => {
                    discard_nested(&mut pending, depth);
                    depth = depth.saturating_sub(1);
                    offset += 1;
                },
                b'!' => {
                    offset += 1;
                    if bytes.get(offset) == Some(&b'=') {
                        offset += 1;
                    }
                },
                b'=' => {
                    offset += 1;
                    if bytes.get(offset) == Some(&b'=') {
                        offset += 1;
                        continue;
                    }
                    // assignment: nothing to the left can be a template
                    depth = 0;
                    pending.clear();
                },
                b';' | b'{' | b':' => {
                    offset += 1;
                    depth = 0;
                    pending.clear();
                },
                _ if source[offset..].starts_with("&&") || source[offset..].starts_with("||") => {
                    discard_nested(&mut pending, depth);
                    offset += 2;
                },
                _ => {
                    let ident_length = identifier(&source[offset..]);
                    if ident_length != 0 {
                        offset = skip_trivia(source, offset + ident_length);
                        if bytes.get(offset) != Some(&b'<') {
                            continue;
                        }
                        offset += 1;
                        if matches!(bytes.get(offset), Some(b'<' | b'=')) {
                            offset += 1;
                            continue;
                        }
                        pending.push(Pending { depth, start: offset as u32 - 1 });
                        continue;
                    }

                    let number_length = number_conservative(&source[offset..]);
                    if number_length != 0 {
                        offset += number_length;
                        continue;
                    }

                    offset += usize::from(utf8_codepoint_length(byte));
                },
            }
        }

        starts.sort_unstable();
        assert!(starts.windows(2).all(|x| x[0] < x[1]));
        assert!(ends.windows(2).all(|x| x[0] < x[1]));

        TemplateDelimiters { starts, ends }
    }
}

fn skip_trivia(source: &str, mut offset: usize) -> usize {
    loop {
        offset += whitespace(&source[offset..]);
        let comment = comment(&source[offset..]);
        if comment == 0 {
            return offset;
        }
        offset += comment;
    }
}

/// Assuming we have the first byte of a valid UTF-8 encoded codepoint, returns its length.
fn utf8_codepoint_length(first_byte: u8) -> u8 {
    #[allow(clippy::match_overlapping_arm)]
    match first_byte {
        ..=0b0111_1111 => 1,
        ..=0b1101_1111 => 2,
        ..=0b1110_1111 => 3,
        ..=0b1111_1111 => 4,
    }
}

fn identifier(source: &str) -> usize {
    let mut chars = source.chars();
    let Some(first) = chars.next() else { return 0 };
    if !(first == '_' || first.is_alphabetic()) {
        return 0;
    }

    let mut rest = chars.as_str().len();
    while let Some(x) = chars.next() {
        if x == '_' || x.is_alphanumeric() {
            rest = chars.as_str().len();
        } else {
            break;
        }
    }
    source.len() - rest
}

fn classify_identifier(identifier: &str) -> Tag {
    match identifier {
        "alias" => Tag::KeywordAlias,
        "break" => Tag::KeywordBreak,
        "case" => Tag::KeywordCase,
        "const" => Tag::KeywordConst,
        "const_assert" => Tag::KeywordConstAssert,
        "continue" => Tag::KeywordContinue,
        "continuing" => Tag::KeywordContinuing,
        "default" => Tag::KeywordDefault,
        "diagnostic" => Tag::KeywordDiagnostic,
        "discard" => Tag::KeywordDiscard,
        "else" => Tag::KeywordElse,
        "enable" => Tag::KeywordEnable,
        "false" => Tag::KeywordFalse,
        "fn" => Tag::KeywordFn,
        "for" => Tag::KeywordFor,
        "if" => Tag::KeywordIf,
        "let" => Tag::KeywordLet,
        "loop" => Tag::KeywordLoop,
        "override" => Tag::KeywordOverride,
        "requires" => Tag::KeywordRequires,
        "return" => Tag::KeywordReturn,
        "struct" => Tag::KeywordStruct,
        "switch" => Tag::KeywordSwitch,
        "true" => Tag::KeywordTrue,
        "var" => Tag::KeywordVar,
        "while" => Tag::KeywordWhile,
        _ => Tag::Identifier,
    }
}

fn number_prefix_0(source: &str) -> (Tag, usize) {
    let bytes = source.as_bytes();
    debug_assert_eq!(bytes[0], b'0');

    if !matches!(bytes.get(1), Some(b'x' | b'X')) {
        return number_decimal(source);
    }

    //   0[xX][0-9a-fA-F]+[iu]?
    //   0[xX][0-9a-fA-F]*\.[0-9a-fA-F]+([pP][+-]?[0-9]+[fh]?)?
    //   0[xX][0-9a-fA-F]+\.[0-9a-fA-F]*([pP][+-]?[0-9]+[fh]?)?
    //   0[xX][0-9a-fA-F]+[pP][+-]?[0-9]+[fh]?
    let mut i = 2;
    let mut integer = true;

    i += digits(&bytes[i..], u8::is_ascii_hexdigit);

    if bytes.get(i) == Some(&b'.') {
        integer = false;
        i += 1;
        i += digits(&bytes[i..], u8::is_ascii_hexdigit);
    }

    if matches!(bytes.get(i), Some(b'p' | b'P')) {
        integer = false;
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        i += digits(&bytes[i..], u8::is_ascii_digit);

        // `f` and `h` are hex digits, so they only act as suffix after an exponent
        if matches!(bytes.get(i), Some(b'f' | b'h')) {
            i += 1;
        }
    }

    if integer && matches!(bytes.get(i), Some(b'i' | b'u')) {
        i += 1;
    }

    (if integer { Tag::IntegerHex } else { Tag::FloatHex }, i)
}

fn number_decimal(source: &str) -> (Tag, usize) {
    //   0[iu]?
    //   [1-9][0-9]*[iu]?
    //   [0-9]+[fh]
    //   [0-9]*\.[0-9]+([eE][+-]?[0-9]+)?[fh]?
    //   [0-9]+\.[0-9]*([eE][+-]?[0-9]+)?[fh]?
    //   [0-9]+[eE][+-]?[0-9]+[fh]?
    let bytes = source.as_bytes();
    let mut integer = true;

    let mut i = digits(bytes, u8::is_ascii_digit);

    if bytes.get(i) == Some(&b'.') {
        integer = false;
        i += 1;
        i += digits(&bytes[i..], u8::is_ascii_digit);
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        integer = false;
        i += 1;
        if matches!(bytes.get(i), Some(b'+' | b'-')) {
            i += 1;
        }
        i += digits(&bytes[i..], u8::is_ascii_digit);
    }

    if matches!(bytes.get(i), Some(b'f' | b'h')) {
        integer = false;
        i += 1;
    } else if integer && matches!(bytes.get(i), Some(b'i' | b'u')) {
        i += 1;
    }

    (if integer { Tag::IntegerDecimal } else { Tag::FloatDecimal }, i)
}

fn digits(bytes: &[u8], predicate: fn(&u8) -> bool) -> usize {
    bytes.iter().take_while(|x| predicate(x)).count()
}

/// Matches anything that has the general shape of a number: it starts with a digit followed by
/// zero or more digits, letters (for exponents and precise typed literals), and pluses or minuses
/// (for exponents).
fn number_conservative(source: &str) -> usize {
    let bytes = source.as_bytes();
    if !bytes.first().is_some_and(u8::is_ascii_digit) {
        return 0;
    }
    1 + digits(&bytes[1..], |x| x.is_ascii_alphanumeric() || matches!(x, b'+' | b'-' | b'.'))
}

fn comment(source: &str) -> usize {
    if source.starts_with("//") {
        return source.find('\n').unwrap_or(source.len());
    }

    if !source.starts_with("/*") {
        return 0;
    }

    let mut i = 2;
    let mut depth = 1;
    while i < source.len() {
        if source[i..].starts_with("/*") {
            depth += 1;
            i += 2;
        } else if source[i..].starts_with("*/") {
            depth -= 1;
            i += 2;
            if depth == 0 {
                break;
            }
        } else {
            i += 1;
        }
    }
    i
}

fn whitespace(source: &str) -> usize {
    source.find(|x: char| !x.is_whitespace()).unwrap_or(source.len())
}

#[derive(Clone, Copy)]
pub struct TokenSet {
    bits: u128,
}

impl TokenSet {
    pub const fn empty() -> TokenSet {
        TokenSet { bits: 0 }
    }

    pub const fn new(tokens: &[Tag]) -> TokenSet {
        Self::empty().with_many(tokens)
    }

    pub const fn with_many(mut self, mut tokens: &[Tag]) -> TokenSet {
        while let Some((token, rest)) = tokens.split_first() {
            tokens = rest;
            self.bits |= Self::mask(*token);
        }
        self
    }

    pub const fn contains(self, token: Tag) -> bool {
        self.bits & Self::mask(token) != 0
    }

    pub const fn union(self, other: TokenSet) -> TokenSet {
        TokenSet { bits: self.bits | other.bits }
    }

    const fn mask(token: Tag) -> u128 {
        assert!((token as u8) < 128);
        1u128 << token as u8
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    fn check_tokens(source: &str, expected: expect_test::Expect) {
        let mut tokenizer = Tokenizer::new(source);
        let mut output = String::new();
        loop {
            let token = tokenizer.next();
            if token.tag == Tag::Eof {
                break;
            }
            output += &format!("{:?} {:?}\n", token.tag, &source[token.byte_range()]);
        }
        expected.assert_eq(&output);
    }

    fn check_template_lists(source: &str, expected: expect_test::Expect) {
        let delimiters = TemplateDelimiters::find(source);
        let output = format!("starts: {:?}\nends: {:?}\n", delimiters.starts, delimiters.ends);
        expected.assert_eq(&output);
    }

    #[test]
    fn numbers() {
        check_tokens(
            "1 0 12u 0x1Fi 1.5 .5f 2e10 1h 0x1p4 0x1.8p-1h 3f",
            expect![[r#"
                IntegerDecimal "1"
                IntegerDecimal "0"
                IntegerDecimal "12u"
                IntegerHex "0x1Fi"
                FloatDecimal "1.5"
                FloatDecimal ".5f"
                FloatDecimal "2e10"
                FloatDecimal "1h"
                FloatHex "0x1p4"
                FloatHex "0x1.8p-1h"
                FloatDecimal "3f"
            "#]],
        );
    }

    #[test]
    fn templated_type() {
        check_tokens(
            "var<storage, read> x: array<vec4<f32>>;",
            expect![[r#"
                KeywordVar "var"
                TemplateListStart "<"
                Identifier "storage"
                Comma ","
                Identifier "read"
                TemplateListEnd ">"
                Identifier "x"
                Colon ":"
                Identifier "array"
                TemplateListStart "<"
                Identifier "vec4"
                TemplateListStart "<"
                Identifier "f32"
                TemplateListEnd ">"
                TemplateListEnd ">"
                SemiColon ";"
            "#]],
        );
    }

    #[test]
    fn comments_are_tokens() {
        check_tokens(
            "a /* nested /* comment */ */ b // trailing",
            expect![[r#"
                Identifier "a"
                Comment "/* nested /* comment */ */"
                Identifier "b"
                Comment "// trailing"
            "#]],
        );
    }

    #[test]
    fn template_lists_nested() {
        check_template_lists(
            "array<array<vec4<f32>, 2>, 3>",
            expect![[r#"
                starts: [5, 11, 16]
                ends: [20, 24, 28]
            "#]],
        );
    }

    #[test]
    fn template_lists_parens_significant() {
        check_template_lists(
            "array<i32,select(2,3,a>b)>",
            expect![[r#"
                starts: [5]
                ends: [25]
            "#]],
        );
    }

    #[test]
    fn template_lists_comparisons() {
        check_template_lists(
            "a < b || c > d",
            expect![[r#"
                starts: []
                ends: []
            "#]],
        );
        check_template_lists(
            "a << 1 >> 3",
            expect![[r#"
                starts: []
                ends: []
            "#]],
        );
        check_template_lists(
            "A<(B>=C)>",
            expect![[r#"
                starts: [1]
                ends: [8]
            "#]],
        );
    }
}
