//! Lexer for the Ruby subset understood by the compiler.
//!
//! Ruby's grammar is whitespace sensitive in a handful of places
//! (`foo -1` versus `foo - 1`, `foo [1]` versus `foo[1]`, `:sym` versus a
//! ternary colon). The lexer resolves the cases it can from the previous
//! token and records on every token whether whitespace preceded it, so the
//! parser can settle the rest.

use crate::error::ParseError;
use crate::span::Span;

/// Piece of a string-like literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrSegment {
    Text(String),
    /// Byte range of the body of a `#{...}` interpolation.
    Code(Span),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Alias,
    And,
    Begin,
    Break,
    Case,
    Class,
    Def,
    Do,
    Else,
    Elsif,
    End,
    Ensure,
    False,
    File,
    If,
    Module,
    Next,
    Nil,
    Not,
    Or,
    Rescue,
    Return,
    SelfKw,
    Super,
    Then,
    True,
    Undef,
    Unless,
    Until,
    When,
    While,
    Yield,
}

impl Keyword {
    pub fn from_ident(text: &str) -> Option<Keyword> {
        let keyword = match text {
            "alias" => Keyword::Alias,
            "and" => Keyword::And,
            "begin" => Keyword::Begin,
            "break" => Keyword::Break,
            "case" => Keyword::Case,
            "class" => Keyword::Class,
            "def" => Keyword::Def,
            "do" => Keyword::Do,
            "else" => Keyword::Else,
            "elsif" => Keyword::Elsif,
            "end" => Keyword::End,
            "ensure" => Keyword::Ensure,
            "false" => Keyword::False,
            "__FILE__" => Keyword::File,
            "if" => Keyword::If,
            "module" => Keyword::Module,
            "next" => Keyword::Next,
            "nil" => Keyword::Nil,
            "not" => Keyword::Not,
            "or" => Keyword::Or,
            "rescue" => Keyword::Rescue,
            "return" => Keyword::Return,
            "self" => Keyword::SelfKw,
            "super" => Keyword::Super,
            "then" => Keyword::Then,
            "true" => Keyword::True,
            "undef" => Keyword::Undef,
            "unless" => Keyword::Unless,
            "until" => Keyword::Until,
            "when" => Keyword::When,
            "while" => Keyword::While,
            "yield" => Keyword::Yield,
            _ => return None,
        };
        Some(keyword)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Alias => "alias",
            Keyword::And => "and",
            Keyword::Begin => "begin",
            Keyword::Break => "break",
            Keyword::Case => "case",
            Keyword::Class => "class",
            Keyword::Def => "def",
            Keyword::Do => "do",
            Keyword::Else => "else",
            Keyword::Elsif => "elsif",
            Keyword::End => "end",
            Keyword::Ensure => "ensure",
            Keyword::False => "false",
            Keyword::File => "__FILE__",
            Keyword::If => "if",
            Keyword::Module => "module",
            Keyword::Next => "next",
            Keyword::Nil => "nil",
            Keyword::Not => "not",
            Keyword::Or => "or",
            Keyword::Rescue => "rescue",
            Keyword::Return => "return",
            Keyword::SelfKw => "self",
            Keyword::Super => "super",
            Keyword::Then => "then",
            Keyword::True => "true",
            Keyword::Undef => "undef",
            Keyword::Unless => "unless",
            Keyword::Until => "until",
            Keyword::When => "when",
            Keyword::While => "while",
            Keyword::Yield => "yield",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Eof,
    Newline,
    Semi,

    // Literals and names
    Int(String),
    Float(String),
    Str(Vec<StrSegment>),
    XStr(Vec<StrSegment>),
    Symbol(String),
    DSymbol(Vec<StrSegment>),
    Words(Vec<String>),
    Ident(String),
    Const(String),
    IVar(String),
    GVar(String),
    /// `name:` inside hashes and argument lists.
    Label(String),
    Keyword(Keyword),

    // Punctuation
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Dot2,
    Dot3,
    ColonColon,
    Colon,
    Question,
    Arrow,
    Pipe,

    // Operators
    Assign,
    OpAssign(String),
    Plus,
    Minus,
    Star,
    Pow,
    Slash,
    Percent,
    Eq,
    Eqq,
    NotEq,
    Match,
    NotMatch,
    Lt,
    Le,
    Gt,
    Ge,
    Cmp,
    AndAnd,
    OrOr,
    Bang,
    Tilde,
    Amp,
    Caret,
    Shl,
    Shr,
}

impl TokenKind {
    /// Whether a token of this kind can end an operand.
    fn ends_value(&self) -> bool {
        matches!(
            self,
            TokenKind::Int(_)
                | TokenKind::Float(_)
                | TokenKind::Str(_)
                | TokenKind::XStr(_)
                | TokenKind::Symbol(_)
                | TokenKind::DSymbol(_)
                | TokenKind::Words(_)
                | TokenKind::Ident(_)
                | TokenKind::Const(_)
                | TokenKind::IVar(_)
                | TokenKind::GVar(_)
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Keyword(
                    Keyword::End
                        | Keyword::SelfKw
                        | Keyword::Nil
                        | Keyword::True
                        | Keyword::False
                        | Keyword::File
                )
        )
    }

    /// Whether a newline after a token of this kind continues the expression.
    fn continues_line(&self) -> bool {
        matches!(
            self,
            TokenKind::Comma
                | TokenKind::Dot
                | TokenKind::Dot2
                | TokenKind::Dot3
                | TokenKind::ColonColon
                | TokenKind::Colon
                | TokenKind::Question
                | TokenKind::Arrow
                | TokenKind::Pipe
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::LBrace
                | TokenKind::Assign
                | TokenKind::OpAssign(_)
                | TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Star
                | TokenKind::Pow
                | TokenKind::Slash
                | TokenKind::Percent
                | TokenKind::Eq
                | TokenKind::Eqq
                | TokenKind::NotEq
                | TokenKind::Match
                | TokenKind::NotMatch
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::Cmp
                | TokenKind::AndAnd
                | TokenKind::OrOr
                | TokenKind::Amp
                | TokenKind::Caret
                | TokenKind::Shl
                | TokenKind::Shr
                | TokenKind::Newline
                | TokenKind::Semi
                | TokenKind::Keyword(Keyword::And | Keyword::Or | Keyword::Not)
        )
    }
}

/// A single token with its kind and span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// Whitespace or a comment separates this token from the previous one.
    pub spaced: bool,
}

/// Result of lexing a whole unit.
#[derive(Debug)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    /// Text after an `__END__` line, if the unit has one.
    pub end_data: Option<String>,
}

/// Lex a whole unit, honouring the `__END__` marker.
pub fn lex(file: &str, source: &str) -> Result<Lexed, ParseError> {
    let mut lexer = Lexer::new(file, source, 0, source.len(), true);
    lexer.run()?;
    Ok(Lexed {
        tokens: lexer.tokens,
        end_data: lexer.end_data,
    })
}

/// Lex the body of an interpolation. Spans stay relative to `source`.
pub fn lex_range(file: &str, source: &str, span: Span) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(file, source, span.start as usize, span.end as usize, false);
    lexer.run()?;
    Ok(lexer.tokens)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Escapes {
    /// Double-quoted: full escape processing and interpolation.
    Double,
    /// Single-quoted: only `\\` and an escaped delimiter.
    Single,
    /// X-strings: text kept verbatim, interpolation still applies.
    Verbatim,
}

struct Lexer<'src> {
    file: &'src str,
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    end: usize,
    allow_end_marker: bool,
    spaced: bool,
    tokens: Vec<Token>,
    end_data: Option<String>,
}

impl<'src> Lexer<'src> {
    fn new(file: &'src str, source: &'src str, start: usize, end: usize, allow_end_marker: bool) -> Self {
        Lexer {
            file,
            source,
            bytes: source.as_bytes(),
            index: start,
            end,
            allow_end_marker,
            spaced: false,
            tokens: Vec::new(),
            end_data: None,
        }
    }

    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(ch) = self.peek() {
            if self.at_line_start() {
                if self.allow_end_marker && self.at_end_marker() {
                    break;
                }
                if self.rest().starts_with("=begin") {
                    self.skip_block_comment()?;
                    continue;
                }
            }

            match ch {
                b' ' | b'\t' | b'\r' => {
                    self.index += 1;
                    self.spaced = true;
                }
                b'\\' if matches!(self.peek_at(1), Some(b'\n')) => {
                    self.index += 2;
                    self.spaced = true;
                }
                b'\\' if self.rest().starts_with("\\\r\n") => {
                    self.index += 3;
                    self.spaced = true;
                }
                b'#' => {
                    while let Some(c) = self.peek() {
                        if c == b'\n' {
                            break;
                        }
                        self.index += 1;
                    }
                    self.spaced = true;
                }
                b'\n' => {
                    let start = self.index;
                    self.index += 1;
                    self.newline(start);
                    self.spaced = true;
                }
                _ => self.lex_token()?,
            }
        }

        let eof = self.end as u32;
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            span: Span::new(eof, eof),
            spaced: true,
        });
        Ok(())
    }

    fn newline(&mut self, start: usize) {
        let continues = self
            .tokens
            .last()
            .map(|token| token.kind.continues_line())
            .unwrap_or(true);
        if (continues && !self.operator_names_method()) || self.next_line_starts_with_dot() {
            return;
        }
        self.push(TokenKind::Newline, start);
    }

    /// `def ==`, `alias equal? ==` and `recv.+` end a line on an operator
    /// that is a method name, not a binary operator.
    fn operator_names_method(&self) -> bool {
        let len = self.tokens.len();
        let before = |n: usize| len.checked_sub(n).map(|idx| &self.tokens[idx].kind);
        matches!(
            before(2),
            Some(TokenKind::Keyword(Keyword::Def | Keyword::Alias) | TokenKind::Dot)
        ) || matches!(before(3), Some(TokenKind::Keyword(Keyword::Alias)))
    }

    fn next_line_starts_with_dot(&self) -> bool {
        let mut idx = self.index;
        while idx < self.end && matches!(self.bytes[idx], b' ' | b'\t' | b'\r' | b'\n') {
            idx += 1;
        }
        idx + 1 < self.end && self.bytes[idx] == b'.' && self.bytes[idx + 1] != b'.'
    }

    fn at_line_start(&self) -> bool {
        self.index == 0 || self.bytes[self.index - 1] == b'\n'
    }

    fn at_end_marker(&mut self) -> bool {
        let rest = self.rest();
        let Some(after) = rest.strip_prefix("__END__") else {
            return false;
        };
        let data_start = if after.is_empty() {
            self.end
        } else if after.starts_with('\n') {
            self.index + "__END__\n".len()
        } else if after.starts_with("\r\n") {
            self.index + "__END__\r\n".len()
        } else {
            return false;
        };
        self.end_data = Some(self.source[data_start..self.end].to_string());
        self.index = self.end;
        true
    }

    fn skip_block_comment(&mut self) -> Result<(), ParseError> {
        let start = self.index;
        loop {
            match self.rest().find('\n') {
                Some(offset) => self.index += offset + 1,
                None => {
                    return Err(self.error_at(start, "embedded document meets end of file"));
                }
            }
            if self.rest().starts_with("=end") {
                match self.rest().find('\n') {
                    Some(offset) => self.index += offset + 1,
                    None => self.index = self.end,
                }
                self.spaced = true;
                return Ok(());
            }
        }
    }

    fn lex_token(&mut self) -> Result<(), ParseError> {
        let start = self.index;
        let ch = self.bytes[start];
        match ch {
            b'(' => self.single(TokenKind::LParen),
            b')' => self.single(TokenKind::RParen),
            b'[' => self.single(TokenKind::LBracket),
            b']' => self.single(TokenKind::RBracket),
            b'{' => self.single(TokenKind::LBrace),
            b'}' => self.single(TokenKind::RBrace),
            b',' => self.single(TokenKind::Comma),
            b';' => self.single(TokenKind::Semi),
            b'?' => self.single(TokenKind::Question),
            b'~' => self.single(TokenKind::Tilde),
            b'"' => {
                self.index += 1;
                let segments = self.string_body(b'"', b'"', Escapes::Double)?;
                self.push(TokenKind::Str(segments), start);
            }
            b'\'' => {
                self.index += 1;
                let segments = self.string_body(b'\'', b'\'', Escapes::Single)?;
                self.push(TokenKind::Str(segments), start);
            }
            b'`' => {
                self.index += 1;
                let segments = self.string_body(b'`', b'`', Escapes::Verbatim)?;
                self.push(TokenKind::XStr(segments), start);
            }
            b'0'..=b'9' => self.number(start)?,
            b'@' => self.instance_variable(start)?,
            b'$' => self.global_variable(start)?,
            b':' => self.colon(start)?,
            b'%' => self.percent(start)?,
            b'.' => {
                if self.rest().starts_with("...") {
                    self.operator(3, TokenKind::Dot3);
                } else if self.rest().starts_with("..") {
                    self.operator(2, TokenKind::Dot2);
                } else {
                    self.single(TokenKind::Dot);
                }
            }
            b'*' => self.longest(&[
                ("**=", TokenKind::OpAssign("**".into())),
                ("**", TokenKind::Pow),
                ("*=", TokenKind::OpAssign("*".into())),
                ("*", TokenKind::Star),
            ]),
            b'<' => self.longest(&[
                ("<=>", TokenKind::Cmp),
                ("<<=", TokenKind::OpAssign("<<".into())),
                ("<<", TokenKind::Shl),
                ("<=", TokenKind::Le),
                ("<", TokenKind::Lt),
            ]),
            b'>' => self.longest(&[
                (">>=", TokenKind::OpAssign(">>".into())),
                (">>", TokenKind::Shr),
                (">=", TokenKind::Ge),
                (">", TokenKind::Gt),
            ]),
            b'=' => self.longest(&[
                ("===", TokenKind::Eqq),
                ("==", TokenKind::Eq),
                ("=~", TokenKind::Match),
                ("=>", TokenKind::Arrow),
                ("=", TokenKind::Assign),
            ]),
            b'!' => self.longest(&[
                ("!=", TokenKind::NotEq),
                ("!~", TokenKind::NotMatch),
                ("!", TokenKind::Bang),
            ]),
            b'&' => self.longest(&[
                ("&&=", TokenKind::OpAssign("&&".into())),
                ("&&", TokenKind::AndAnd),
                ("&=", TokenKind::OpAssign("&".into())),
                ("&", TokenKind::Amp),
            ]),
            b'|' => self.longest(&[
                ("||=", TokenKind::OpAssign("||".into())),
                ("||", TokenKind::OrOr),
                ("|=", TokenKind::OpAssign("|".into())),
                ("|", TokenKind::Pipe),
            ]),
            b'+' => self.longest(&[("+=", TokenKind::OpAssign("+".into())), ("+", TokenKind::Plus)]),
            b'-' => {
                if self.rest().starts_with("->") {
                    return Err(self.error_at(start, "lambda literals are not supported"));
                }
                self.longest(&[("-=", TokenKind::OpAssign("-".into())), ("-", TokenKind::Minus)])
            }
            b'/' => self.longest(&[("/=", TokenKind::OpAssign("/".into())), ("/", TokenKind::Slash)]),
            b'^' => self.longest(&[("^=", TokenKind::OpAssign("^".into())), ("^", TokenKind::Caret)]),
            _ if is_ident_start(ch) => self.identifier(start),
            _ => {
                let found = self.source[start..].chars().next().unwrap_or('?');
                return Err(self.error_at(start, format!("unexpected character '{found}'")));
            }
        }
        Ok(())
    }

    fn identifier(&mut self, start: usize) {
        while self.peek().is_some_and(is_ident_continue) {
            self.index += 1;
        }
        let is_const = self.bytes[start].is_ascii_uppercase();
        if matches!(self.peek(), Some(b'?' | b'!')) && self.peek_at(1) != Some(b'=') {
            self.index += 1;
        }
        let text = &self.source[start..self.index];

        let after_dot = matches!(
            self.tokens.last().map(|token| &token.kind),
            Some(TokenKind::Dot)
        );
        let label_follows = self.peek() == Some(b':') && self.peek_at(1) != Some(b':');
        let kind = if label_follows && !is_const && !after_dot && !self.prev_is(&TokenKind::Question) {
            self.index += 1;
            TokenKind::Label(text.to_string())
        } else if is_const {
            TokenKind::Const(text.to_string())
        } else if after_dot {
            TokenKind::Ident(text.to_string())
        } else if let Some(keyword) = Keyword::from_ident(text) {
            TokenKind::Keyword(keyword)
        } else {
            TokenKind::Ident(text.to_string())
        };
        self.push(kind, start);
    }

    fn number(&mut self, start: usize) -> Result<(), ParseError> {
        let radix = match (self.bytes[start], self.peek_at(1)) {
            (b'0', Some(b'x' | b'X')) => Some(16),
            (b'0', Some(b'b' | b'B')) => Some(2),
            (b'0', Some(b'o' | b'O')) => Some(8),
            (b'0', Some(b'd' | b'D')) => Some(10),
            _ => None,
        };
        if let Some(radix) = radix {
            self.index += 2;
            let body_start = self.index;
            while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == b'_') {
                self.index += 1;
            }
            self.check_digits(start, body_start, radix)?;
            let text = self.source[start..self.index].to_string();
            self.push(TokenKind::Int(text), start);
            return Ok(());
        }

        self.digits();
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            self.index += 1;
            self.digits();
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let signed = matches!(self.peek_at(1), Some(b'+' | b'-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.index += digit_at;
                self.digits();
            }
        }

        let text = self.source[start..self.index].to_string();
        let kind = if is_float {
            TokenKind::Float(text)
        } else {
            if self.bytes[start] == b'0' && self.index - start > 1 {
                self.check_digits(start, start + 1, 8)?;
            }
            TokenKind::Int(text)
        };
        self.push(kind, start);
        Ok(())
    }

    /// Digits of a prefixed or leading-zero integer must fit its radix.
    fn check_digits(&self, start: usize, body_start: usize, radix: u32) -> Result<(), ParseError> {
        let body = &self.source[body_start..self.index];
        if !body.bytes().any(|c| c != b'_') {
            return Err(self.error_at(start, "numeric literal without digits"));
        }
        if let Some(offset) = body
            .bytes()
            .position(|c| c != b'_' && !(c as char).is_digit(radix))
        {
            return Err(self.error_at(body_start + offset, "invalid digit in numeric literal"));
        }
        Ok(())
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == b'_') {
            self.index += 1;
        }
    }

    fn instance_variable(&mut self, start: usize) -> Result<(), ParseError> {
        if self.peek_at(1) == Some(b'@') {
            return Err(self.error_at(start, "class variables are not supported"));
        }
        self.index += 1;
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error_at(start, "'@' without identifiers is not allowed"));
        }
        while self.peek().is_some_and(is_ident_continue) {
            self.index += 1;
        }
        let name = self.source[start + 1..self.index].to_string();
        self.push(TokenKind::IVar(name), start);
        Ok(())
    }

    fn global_variable(&mut self, start: usize) -> Result<(), ParseError> {
        self.index += 1;
        match self.peek() {
            Some(c) if is_ident_continue(c) => {
                while self.peek().is_some_and(is_ident_continue) {
                    self.index += 1;
                }
            }
            Some(c) if b"!@&~=/\\,;.<>_*$?:\"'0".contains(&c) => self.index += 1,
            _ => return Err(self.error_at(start, "'$' without identifiers is not allowed")),
        }
        let name = self.source[start + 1..self.index].to_string();
        self.push(TokenKind::GVar(name), start);
        Ok(())
    }

    fn colon(&mut self, start: usize) -> Result<(), ParseError> {
        if self.peek_at(1) == Some(b':') {
            self.operator(2, TokenKind::ColonColon);
            return Ok(());
        }
        if !self.literal_allowed() {
            self.single(TokenKind::Colon);
            return Ok(());
        }

        match self.peek_at(1) {
            Some(b'"') => {
                self.index += 2;
                let segments = self.string_body(b'"', b'"', Escapes::Double)?;
                self.push(TokenKind::DSymbol(segments), start);
            }
            Some(b'\'') => {
                self.index += 2;
                let segments = self.string_body(b'\'', b'\'', Escapes::Single)?;
                self.push(TokenKind::DSymbol(segments), start);
            }
            Some(c) if is_ident_start(c) || c == b'@' || c == b'$' => {
                self.index += 1;
                let name_start = self.index;
                while matches!(self.peek(), Some(b'@' | b'$')) {
                    self.index += 1;
                }
                while self.peek().is_some_and(is_ident_continue) {
                    self.index += 1;
                }
                match self.peek() {
                    Some(b'?' | b'!') if self.peek_at(1) != Some(b'=') => self.index += 1,
                    Some(b'=') if !matches!(self.peek_at(1), Some(b'=' | b'~' | b'>')) => {
                        self.index += 1
                    }
                    _ => {}
                }
                let name = self.source[name_start..self.index].to_string();
                self.push(TokenKind::Symbol(name), start);
            }
            _ => {
                const OPERATORS: &[&str] = &[
                    "[]=", "[]", "<=>", "===", "==", "=~", "!=", "!~", "**", "+@", "-@", "<<",
                    ">>", "<=", ">=", "+", "-", "*", "/", "%", "<", ">", "!", "&", "|", "^", "~",
                ];
                let rest = &self.source[start + 1..self.end];
                match OPERATORS.iter().find(|op| rest.starts_with(*op)) {
                    Some(op) => {
                        self.index += 1 + op.len();
                        self.push(TokenKind::Symbol(op.to_string()), start);
                    }
                    None => self.single(TokenKind::Colon),
                }
            }
        }
        Ok(())
    }

    fn percent(&mut self, start: usize) -> Result<(), ParseError> {
        if !self.literal_allowed() {
            self.longest(&[("%=", TokenKind::OpAssign("%".into())), ("%", TokenKind::Percent)]);
            return Ok(());
        }

        let (kind, delimiter_at) = match self.peek_at(1) {
            Some(c @ (b'x' | b'w' | b'W' | b'q' | b'Q')) if self.peek_at(2).is_some_and(is_delimiter) => {
                (c, 2)
            }
            Some(c) if is_delimiter(c) => (b'Q', 1),
            _ => {
                self.longest(&[("%=", TokenKind::OpAssign("%".into())), ("%", TokenKind::Percent)]);
                return Ok(());
            }
        };

        let open = self.bytes[start + delimiter_at];
        let close = closing_delimiter(open);
        self.index = start + delimiter_at + 1;
        let token = match kind {
            b'x' => TokenKind::XStr(self.string_body(open, close, Escapes::Verbatim)?),
            b'q' => TokenKind::Str(self.string_body(open, close, Escapes::Single)?),
            b'Q' => TokenKind::Str(self.string_body(open, close, Escapes::Double)?),
            _ => {
                let segments = self.string_body(open, close, Escapes::Single)?;
                let text: String = segments
                    .into_iter()
                    .map(|segment| match segment {
                        StrSegment::Text(text) => text,
                        StrSegment::Code(_) => String::new(),
                    })
                    .collect();
                TokenKind::Words(text.split_whitespace().map(str::to_string).collect())
            }
        };
        self.push(token, start);
        Ok(())
    }

    /// Scan a string body up to and including `close`.
    fn string_body(&mut self, open: u8, close: u8, escapes: Escapes) -> Result<Vec<StrSegment>, ParseError> {
        let literal_start = self.index.saturating_sub(1);
        let mut segments = Vec::new();
        let mut text = String::new();
        let mut depth = 0usize;

        loop {
            let Some(ch) = self.peek() else {
                return Err(self.error_at(literal_start, "unterminated string meets end of file"));
            };
            if ch == close && depth == 0 {
                self.index += 1;
                break;
            }
            if open != close {
                if ch == open {
                    depth += 1;
                } else if ch == close {
                    depth -= 1;
                }
            }

            match ch {
                b'\\' => {
                    let next = self.peek_at(1);
                    match escapes {
                        Escapes::Double => self.escape(&mut text)?,
                        Escapes::Single => {
                            if next == Some(b'\\') || next == Some(close) {
                                text.push(next.map(char::from).unwrap_or('\\'));
                                self.index += 2;
                            } else {
                                text.push('\\');
                                self.index += 1;
                            }
                        }
                        Escapes::Verbatim => {
                            if next == Some(close) {
                                text.push(char::from(close));
                                self.index += 2;
                            } else {
                                text.push('\\');
                                self.index += 1;
                                if let Some(c) = self.next_char() {
                                    text.push(c);
                                }
                            }
                        }
                    }
                }
                b'#' if escapes != Escapes::Single && self.peek_at(1) == Some(b'{') => {
                    if !text.is_empty() {
                        segments.push(StrSegment::Text(std::mem::take(&mut text)));
                    }
                    let span = self.interpolation()?;
                    segments.push(StrSegment::Code(span));
                }
                _ => {
                    if let Some(c) = self.next_char() {
                        text.push(c);
                    }
                }
            }
        }

        if !text.is_empty() || segments.is_empty() {
            segments.push(StrSegment::Text(text));
        }
        Ok(segments)
    }

    /// Consume `#{ ... }` and return the span of its body.
    fn interpolation(&mut self) -> Result<Span, ParseError> {
        let open_at = self.index;
        self.index += 2;
        let body_start = self.index;
        let mut depth = 0usize;
        while let Some(ch) = self.peek() {
            match ch {
                b'{' => depth += 1,
                b'}' if depth == 0 => {
                    let span = Span::new(body_start as u32, self.index as u32);
                    self.index += 1;
                    return Ok(span);
                }
                b'}' => depth -= 1,
                b'"' | b'\'' => {
                    let quote = ch;
                    self.index += 1;
                    while let Some(c) = self.peek() {
                        if c == b'\\' {
                            self.index += 1;
                        } else if c == quote {
                            break;
                        }
                        self.index += 1;
                    }
                }
                _ => {}
            }
            self.index += 1;
        }
        Err(self.error_at(open_at, "unterminated string interpolation"))
    }

    fn escape(&mut self, text: &mut String) -> Result<(), ParseError> {
        let start = self.index;
        self.index += 1;
        let Some(c) = self.next_char() else {
            return Err(self.error_at(start, "unterminated escape sequence"));
        };
        match c {
            'n' => text.push('\n'),
            't' => text.push('\t'),
            'r' => text.push('\r'),
            '0' => text.push('\0'),
            's' => text.push(' '),
            'e' => text.push('\u{1b}'),
            'a' => text.push('\u{7}'),
            'b' => text.push('\u{8}'),
            'f' => text.push('\u{c}'),
            'v' => text.push('\u{b}'),
            '\n' => {}
            'x' => {
                let digits = self.take_while(2, |c| c.is_ascii_hexdigit());
                let value = u32::from_str_radix(digits, 16)
                    .map_err(|_| self.error_at(start, "invalid hex escape"))?;
                text.push(char::from_u32(value).unwrap_or('\u{fffd}'));
            }
            'u' => {
                let digits = if self.peek() == Some(b'{') {
                    self.index += 1;
                    let digits = self.take_while(6, |c| c.is_ascii_hexdigit());
                    if self.peek() != Some(b'}') {
                        return Err(self.error_at(start, "unterminated Unicode escape"));
                    }
                    self.index += 1;
                    digits
                } else {
                    self.take_while(4, |c| c.is_ascii_hexdigit())
                };
                let value = u32::from_str_radix(digits, 16)
                    .map_err(|_| self.error_at(start, "invalid Unicode escape"))?;
                let ch = char::from_u32(value)
                    .ok_or_else(|| self.error_at(start, "invalid Unicode codepoint"))?;
                text.push(ch);
            }
            other => text.push(other),
        }
        Ok(())
    }

    fn take_while(&mut self, max: usize, predicate: impl Fn(u8) -> bool) -> &'src str {
        let start = self.index;
        while self.index - start < max && self.peek().is_some_and(&predicate) {
            self.index += 1;
        }
        &self.source[start..self.index]
    }

    /// Whether `:` and `%` here start a literal rather than an operator.
    fn literal_allowed(&self) -> bool {
        let prev_is_value = self
            .tokens
            .last()
            .is_some_and(|token| token.kind.ends_value());
        if !prev_is_value {
            return true;
        }
        let next_is_space = matches!(self.peek_at(1), None | Some(b' ' | b'\t' | b'\r' | b'\n'));
        let prev_is_ident = matches!(
            self.tokens.last().map(|token| &token.kind),
            Some(TokenKind::Ident(_))
        );
        prev_is_ident && self.spaced && !next_is_space
    }

    fn prev_is(&self, kind: &TokenKind) -> bool {
        self.tokens.last().is_some_and(|token| &token.kind == kind)
    }

    fn single(&mut self, kind: TokenKind) {
        self.operator(1, kind);
    }

    fn operator(&mut self, len: usize, kind: TokenKind) {
        let start = self.index;
        self.index += len;
        self.push(kind, start);
    }

    fn longest(&mut self, candidates: &[(&str, TokenKind)]) {
        for (text, kind) in candidates {
            if self.rest().starts_with(text) {
                self.operator(text.len(), kind.clone());
                return;
            }
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start as u32, self.index as u32),
            spaced: self.spaced,
        });
        self.spaced = false;
    }

    fn rest(&self) -> &'src str {
        &self.source[self.index..self.end]
    }

    fn peek(&self) -> Option<u8> {
        (self.index < self.end).then(|| self.bytes[self.index])
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        let idx = self.index + offset;
        (idx < self.end).then(|| self.bytes[idx])
    }

    fn next_char(&mut self) -> Option<char> {
        let c = self.source[self.index..self.end].chars().next()?;
        self.index += c.len_utf8();
        Some(c)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::at(self.file, self.source, offset, message)
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_' || ch >= 0x80
}

fn is_ident_continue(ch: u8) -> bool {
    is_ident_start(ch) || ch.is_ascii_digit()
}

fn is_delimiter(ch: u8) -> bool {
    matches!(ch, b'(' | b'[' | b'{' | b'<' | b'|' | b'!' | b'/' | b'^')
}

fn closing_delimiter(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        b'{' => b'}',
        b'<' => b'>',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex("test.rb", source)
            .expect("lex")
            .tokens
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn lexes_numbers_with_exponents() {
        assert_eq!(
            kinds("3.142 123e1 123E+10 1_000 0x1f"),
            vec![
                TokenKind::Float("3.142".into()),
                TokenKind::Float("123e1".into()),
                TokenKind::Float("123E+10".into()),
                TokenKind::Int("1_000".into()),
                TokenKind::Int("0x1f".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_digits_outside_the_radix() {
        for source in ["0x", "0b102", "09", "0o9", "0d1a"] {
            let err = lex("test.rb", source).expect_err(source);
            assert_eq!(err.line, 1, "{source}");
        }
        let err = lex("test.rb", "x = 0b102").expect_err("binary literal");
        assert_eq!(err.column, 9);
        assert!(err.message.contains("invalid digit"));
        assert!(lex("test.rb", "0 0.5 017 0d19 0B1_0").is_ok());
    }

    #[test]
    fn splits_string_interpolation() {
        let tokens = kinds("\"hello #{100}\"");
        let TokenKind::Str(segments) = &tokens[0] else {
            panic!("expected string, got {:?}", tokens[0]);
        };
        assert_eq!(segments[0], StrSegment::Text("hello ".into()));
        assert_eq!(segments[1], StrSegment::Code(Span::new(9, 12)));
    }

    #[test]
    fn keeps_xstring_escapes_verbatim() {
        let tokens = kinds("`\"hello\\nworld\"`");
        assert_eq!(
            tokens[0],
            TokenKind::XStr(vec![StrSegment::Text("\"hello\\nworld\"".into())])
        );
        let tokens = kinds("%x{\"hello\\nworld\"}");
        assert_eq!(
            tokens[0],
            TokenKind::XStr(vec![StrSegment::Text("\"hello\\nworld\"".into())])
        );
    }

    #[test]
    fn distinguishes_symbols_from_ternary_colons() {
        assert_eq!(
            kinds("a ? b : c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Question,
                TokenKind::Ident("b".into()),
                TokenKind::Colon,
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("undef_method :new"),
            vec![
                TokenKind::Ident("undef_method".into()),
                TokenKind::Symbol("new".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn stops_at_end_marker() {
        let lexed = lex("test.rb", "DATA\n__END__\nFord Perfect").expect("lex");
        assert_eq!(lexed.end_data.as_deref(), Some("Ford Perfect"));
        assert_eq!(
            lexed.tokens.into_iter().map(|t| t.kind).collect::<Vec<_>>(),
            vec![
                TokenKind::Const("DATA".into()),
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn end_marker_must_be_alone_on_its_line() {
        let lexed = lex("test.rb", "x = __END__x").expect("lex");
        assert!(lexed.end_data.is_none());
    }

    #[test]
    fn skips_newlines_after_operators_and_before_leading_dots() {
        assert_eq!(
            kinds("a +\nb\n  .c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Plus,
                TokenKind::Ident("b".into()),
                TokenKind::Dot,
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_after_dot_are_method_names() {
        assert_eq!(
            kinds("self.class"),
            vec![
                TokenKind::Keyword(Keyword::SelfKw),
                TokenKind::Dot,
                TokenKind::Ident("class".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_labels_and_words() {
        assert_eq!(
            kinds("foo a: %w[x y]"),
            vec![
                TokenKind::Ident("foo".into()),
                TokenKind::Label("a".into()),
                TokenKind::Words(vec!["x".into(), "y".into()]),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn reports_unterminated_strings() {
        let err = lex("test.rb", "x = \"abc").unwrap_err();
        assert_eq!((err.line, err.column), (1, 5));
    }

    #[test]
    fn skips_embedded_documents() {
        assert_eq!(
            kinds("=begin\nignored\n=end\nx"),
            vec![TokenKind::Ident("x".into()), TokenKind::Eof]
        );
    }
}
