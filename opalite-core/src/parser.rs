//! Recursive-descent parser producing [`Program`]s.
//!
//! Local variables are tracked while parsing, as in Ruby: an identifier is
//! a local variable only if an assignment or parameter introduced it earlier
//! in the current scope; otherwise it is a call on `self`.

use std::collections::HashSet;

use crate::ast::{
    Block, Call, ConstBase, Expr, Params, Program, RescueClause, StrPart, Target, WhenClause,
};
use crate::error::ParseError;
use crate::lexer::{Keyword, StrSegment, Token, TokenKind, lex, lex_range};
use crate::span::Span;

/// Parse one unit.
pub fn parse(file: &str, source: &str) -> Result<Program, ParseError> {
    let lexed = lex(file, source)?;
    let mut parser = Parser::new(file, source, lexed.tokens);
    let body = parser.parse_stmts()?;
    parser.expect(&TokenKind::Eof, "end of input")?;
    Ok(Program {
        body,
        end_data: lexed.end_data,
    })
}

struct LocalScope {
    names: HashSet<String>,
    /// Blocks see the locals of the scope they appear in.
    inherits: bool,
}

struct Parser<'src> {
    file: &'src str,
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    scopes: Vec<LocalScope>,
    /// Non-zero while a trailing `do` belongs to an outer construct.
    no_do: usize,
}

type PResult<T> = Result<T, ParseError>;

impl<'src> Parser<'src> {
    fn new(file: &'src str, source: &'src str, tokens: Vec<Token>) -> Self {
        Parser {
            file,
            source,
            tokens,
            pos: 0,
            scopes: vec![LocalScope {
                names: HashSet::new(),
                inherits: false,
            }],
            no_do: 0,
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_stmts(&mut self) -> PResult<Vec<Expr>> {
        let mut body = Vec::new();
        loop {
            self.skip_terms();
            if is_body_end(self.peek()) {
                break;
            }
            body.push(self.parse_stmt()?);
            if !self.is_term() && !is_body_end(self.peek()) {
                return Err(self.unexpected());
            }
        }
        Ok(body)
    }

    fn parse_stmt(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_expr_stmt()?;
        loop {
            expr = match self.peek() {
                TokenKind::Keyword(Keyword::If) => {
                    self.advance();
                    let cond = self.parse_expr_stmt()?;
                    Expr::If {
                        cond: Box::new(cond),
                        then_body: vec![expr],
                        else_body: Vec::new(),
                    }
                }
                TokenKind::Keyword(Keyword::Unless) => {
                    self.advance();
                    let cond = self.parse_expr_stmt()?;
                    Expr::If {
                        cond: Box::new(cond),
                        then_body: Vec::new(),
                        else_body: vec![expr],
                    }
                }
                TokenKind::Keyword(kw @ (Keyword::While | Keyword::Until)) => {
                    let until = *kw == Keyword::Until;
                    self.advance();
                    let cond = self.parse_expr_stmt()?;
                    let (body, do_while) = match expr {
                        Expr::Begin {
                            body,
                            rescues,
                            else_body: None,
                            ensure: None,
                        } if rescues.is_empty() => (body, true),
                        other => (vec![other], false),
                    };
                    Expr::While {
                        cond: Box::new(cond),
                        body,
                        until,
                        do_while,
                    }
                }
                TokenKind::Keyword(Keyword::Rescue) => {
                    self.advance();
                    let fallback = self.parse_expr_stmt()?;
                    Expr::Begin {
                        body: vec![expr],
                        rescues: vec![RescueClause {
                            classes: Vec::new(),
                            var: None,
                            body: vec![fallback],
                        }],
                        else_body: None,
                        ensure: None,
                    }
                }
                _ => break,
            };
        }
        Ok(expr)
    }

    /// `not`, `and` and `or`: the loosest-binding operators.
    fn parse_expr_stmt(&mut self) -> PResult<Expr> {
        let mut left = self.parse_not_expr()?;
        loop {
            if self.eat_keyword(Keyword::And) {
                let right = self.parse_not_expr()?;
                left = Expr::And(Box::new(left), Box::new(right));
            } else if self.eat_keyword(Keyword::Or) {
                let right = self.parse_not_expr()?;
                left = Expr::Or(Box::new(left), Box::new(right));
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_not_expr(&mut self) -> PResult<Expr> {
        if self.eat_keyword(Keyword::Not) {
            let operand = self.parse_not_expr()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_expr()
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn parse_expr(&mut self) -> PResult<Expr> {
        let start = self.pos;
        let left = self.parse_ternary()?;
        match self.peek().clone() {
            TokenKind::Assign => {
                let target = self.to_target(left, start)?;
                self.advance();
                let value = self.parse_expr()?;
                Ok(Expr::Asgn {
                    target,
                    value: Box::new(value),
                })
            }
            TokenKind::OpAssign(op) => {
                let target = self.to_target(left, start)?;
                self.advance();
                let value = self.parse_expr()?;
                Ok(Expr::OpAsgn {
                    target,
                    op,
                    value: Box::new(value),
                })
            }
            _ => Ok(left),
        }
    }

    fn to_target(&mut self, expr: Expr, start: usize) -> PResult<Target> {
        let target = match expr {
            Expr::LVar(name) => Target::LVar(name),
            Expr::Call(call) if call.is_bare() && is_local_name(&call.name) => {
                self.declare(&call.name);
                Target::LVar(call.name)
            }
            Expr::IVar(name) => Target::IVar(name),
            Expr::GVar(name) => Target::GVar(name),
            Expr::Const { base, name } => Target::Const { base, name },
            Expr::Call(Call {
                recv: Some(recv),
                name,
                args,
                block: None,
                block_arg: None,
            }) if name == "[]" => Target::Index { recv, args },
            Expr::Call(Call {
                recv: Some(recv),
                name,
                args,
                block: None,
                block_arg: None,
            }) if args.is_empty() && is_local_name(&name) => Target::Attr { recv, name },
            _ => {
                let offset = self.tokens[start].span.start as usize;
                return Err(self.error_at(offset, "cannot assign to this expression"));
            }
        };
        Ok(target)
    }

    fn parse_ternary(&mut self) -> PResult<Expr> {
        let cond = self.parse_range()?;
        if !self.eat(&TokenKind::Question) {
            return Ok(cond);
        }
        self.skip_newlines();
        let then_expr = self.parse_ternary()?;
        self.skip_newlines();
        self.expect(&TokenKind::Colon, "':' in ternary")?;
        self.skip_newlines();
        let else_expr = self.parse_ternary()?;
        Ok(Expr::Ternary {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    fn parse_range(&mut self) -> PResult<Expr> {
        let start = self.parse_binary(0)?;
        let exclusive = match self.peek() {
            TokenKind::Dot2 => false,
            TokenKind::Dot3 => true,
            _ => return Ok(start),
        };
        self.advance();
        let end = self.parse_binary(0)?;
        Ok(Expr::Range {
            start: Box::new(start),
            end: Box::new(end),
            exclusive,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let Some((prec, op)) = binary_operator(self.peek()) else {
                return Ok(left);
            };
            if prec < min_prec {
                return Ok(left);
            }
            self.advance();
            self.skip_newlines();
            let right = self.parse_binary(prec + 1)?;
            left = match op {
                "||" => Expr::Or(Box::new(left), Box::new(right)),
                "&&" => Expr::And(Box::new(left), Box::new(right)),
                "!~" => Expr::Not(Box::new(Expr::Call(Call::new(Some(left), "=~", vec![right])))),
                _ => Expr::Call(Call::new(Some(left), op, vec![right])),
            };
        }
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        match self.peek() {
            TokenKind::Minus | TokenKind::Plus => {
                let negative = self.at(&TokenKind::Minus);
                self.advance();
                let literal_follows = !self.peek_token().spaced
                    && matches!(self.peek(), TokenKind::Int(_) | TokenKind::Float(_));
                if literal_follows {
                    let token = self.advance().kind;
                    // `-2 ** 2` is `-(2 ** 2)`; the sign only folds into the
                    // literal when no power follows.
                    let fold = negative && !self.at(&TokenKind::Pow);
                    let sign = if fold { "-" } else { "" };
                    let literal = match token {
                        TokenKind::Int(text) => Expr::Int(format!("{sign}{text}")),
                        TokenKind::Float(text) => Expr::Float(format!("{sign}{text}")),
                        _ => return Err(self.error_before("expected a number")),
                    };
                    let base = self.parse_postfix(literal)?;
                    let power = self.parse_pow_tail(base)?;
                    if negative && !fold {
                        return Ok(Expr::Call(Call::new(Some(power), "-@", Vec::new())));
                    }
                    return Ok(power);
                }
                let operand = self.parse_unary()?;
                let name = if negative { "-@" } else { "+@" };
                Ok(Expr::Call(Call::new(Some(operand), name, Vec::new())))
            }
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Not(Box::new(operand)))
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::Call(Call::new(Some(operand), "~", Vec::new())))
            }
            _ => {
                let primary = self.parse_primary()?;
                let base = self.parse_postfix(primary)?;
                self.parse_pow_tail(base)
            }
        }
    }

    fn parse_pow_tail(&mut self, base: Expr) -> PResult<Expr> {
        if !self.eat(&TokenKind::Pow) {
            return Ok(base);
        }
        let exponent = self.parse_unary()?;
        Ok(Expr::Call(Call::new(Some(base), "**", vec![exponent])))
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> PResult<Expr> {
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    self.advance();
                    self.skip_newlines();
                    let name = self.method_name_after_dot()?;
                    expr = self.parse_call_rest(Some(expr), name)?;
                }
                TokenKind::ColonColon => {
                    self.advance();
                    match self.advance().kind {
                        TokenKind::Const(name) if !self.call_parens_follow() => {
                            expr = Expr::Const {
                                base: ConstBase::Scoped(Box::new(expr)),
                                name,
                            };
                        }
                        TokenKind::Const(name) | TokenKind::Ident(name) => {
                            expr = self.parse_call_rest(Some(expr), name)?;
                        }
                        _ => return Err(self.error_before("expected a name after '::'")),
                    }
                }
                TokenKind::LBracket
                    if !self.peek_token().spaced || matches!(expr, Expr::LVar(_)) =>
                {
                    self.advance();
                    let mut call = Call::new(Some(expr), "[]", Vec::new());
                    self.parse_delimited_args(&mut call, &TokenKind::RBracket)?;
                    expr = Expr::Call(call);
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_rest(&mut self, recv: Option<Expr>, name: String) -> PResult<Expr> {
        let mut call = Call::new(recv, name, Vec::new());
        if self.call_parens_follow() {
            self.advance();
            self.parse_delimited_args(&mut call, &TokenKind::RParen)?;
        } else if self.command_arg_start() {
            self.parse_command_args(&mut call)?;
        }
        self.parse_block_into(&mut call.block)?;
        Ok(Expr::Call(call))
    }

    fn parse_block_into(&mut self, slot: &mut Option<Box<Block>>) -> PResult<()> {
        if self.at(&TokenKind::LBrace) {
            *slot = Some(Box::new(self.parse_block(&TokenKind::RBrace)?));
        } else if self.at_keyword(Keyword::Do) && self.no_do == 0 {
            *slot = Some(Box::new(self.parse_block(&TokenKind::Keyword(Keyword::End))?));
        }
        Ok(())
    }

    fn parse_block(&mut self, close: &TokenKind) -> PResult<Block> {
        self.advance();
        self.push_scope(true);
        let saved = std::mem::replace(&mut self.no_do, 0);
        let params = if self.eat(&TokenKind::Pipe) {
            self.parse_block_params()?
        } else {
            self.eat(&TokenKind::OrOr);
            Params::default()
        };
        let body = self.parse_stmts()?;
        self.expect(close, "end of block")?;
        self.no_do = saved;
        self.pop_scope();
        Ok(Block { params, body })
    }

    fn parse_block_params(&mut self) -> PResult<Params> {
        let mut params = Params::default();
        loop {
            self.skip_newlines();
            if self.eat(&TokenKind::Pipe) {
                return Ok(params);
            }
            match self.advance().kind {
                TokenKind::Ident(name) => {
                    self.declare(&name);
                    if self.eat(&TokenKind::Assign) {
                        let default = self.parse_unary()?;
                        params.optional.push((name, default));
                    } else {
                        params.required.push(name);
                    }
                }
                TokenKind::Star => {
                    let name = self.param_name()?;
                    params.rest = Some(name);
                }
                TokenKind::Amp => {
                    let name = self.param_name()?;
                    params.block = Some(name);
                }
                TokenKind::LParen => {
                    return Err(self.error_before("destructuring block parameters are not supported"));
                }
                _ => return Err(self.error_before("unexpected token in block parameters")),
            }
            if !self.eat(&TokenKind::Comma) {
                self.skip_newlines();
                self.expect(&TokenKind::Pipe, "'|' after block parameters")?;
                return Ok(params);
            }
        }
    }

    fn parse_def_params(&mut self, close: Option<&TokenKind>) -> PResult<Params> {
        let mut params = Params::default();
        if let Some(close) = close {
            self.skip_newlines();
            if self.eat(close) {
                return Ok(params);
            }
        }
        loop {
            self.skip_newlines_if(close.is_some());
            match self.advance().kind {
                TokenKind::Ident(name) => {
                    self.declare(&name);
                    if self.eat(&TokenKind::Assign) {
                        let default = self.parse_ternary()?;
                        params.optional.push((name, default));
                    } else {
                        params.required.push(name);
                    }
                }
                TokenKind::Star => {
                    let name = self.param_name()?;
                    params.rest = Some(name);
                }
                TokenKind::Amp => {
                    let name = self.param_name()?;
                    params.block = Some(name);
                }
                TokenKind::Label(_) => {
                    return Err(self.error_before("keyword arguments are not supported"));
                }
                _ => return Err(self.error_before("unexpected token in method parameters")),
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        if let Some(close) = close {
            self.skip_newlines();
            self.expect(close, "')' after method parameters")?;
        }
        Ok(params)
    }

    fn param_name(&mut self) -> PResult<String> {
        match self.advance().kind {
            TokenKind::Ident(name) => {
                self.declare(&name);
                Ok(name)
            }
            _ => Err(self.error_before("expected a parameter name")),
        }
    }

    /// Arguments inside `( )` or `[ ]`; the opening token is already consumed.
    fn parse_delimited_args(&mut self, call: &mut Call, close: &TokenKind) -> PResult<()> {
        let saved = std::mem::replace(&mut self.no_do, 0);
        let mut pairs = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(close) {
                break;
            }
            self.parse_arg(call, &mut pairs)?;
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                self.skip_newlines();
                self.expect(close, "closing delimiter of argument list")?;
                break;
            }
        }
        if !pairs.is_empty() {
            call.args.push(Expr::Hash(pairs));
        }
        self.no_do = saved;
        Ok(())
    }

    fn parse_command_args(&mut self, call: &mut Call) -> PResult<()> {
        self.no_do += 1;
        let mut pairs = Vec::new();
        loop {
            self.parse_arg(call, &mut pairs)?;
            if !self.eat(&TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        if !pairs.is_empty() {
            call.args.push(Expr::Hash(pairs));
        }
        self.no_do -= 1;
        Ok(())
    }

    fn parse_arg(&mut self, call: &mut Call, pairs: &mut Vec<(Expr, Expr)>) -> PResult<()> {
        match self.peek().clone() {
            TokenKind::Star => {
                self.advance();
                let value = self.parse_ternary()?;
                call.args.push(Expr::Splat(Box::new(value)));
            }
            TokenKind::Amp => {
                self.advance();
                let value = self.parse_ternary()?;
                call.block_arg = Some(Box::new(value));
            }
            TokenKind::Label(name) => {
                self.advance();
                self.skip_newlines();
                let value = self.parse_expr()?;
                pairs.push((Expr::Sym(name), value));
            }
            _ => {
                let value = self.parse_expr()?;
                if self.eat(&TokenKind::Arrow) {
                    self.skip_newlines();
                    let pair_value = self.parse_expr()?;
                    pairs.push((value, pair_value));
                } else {
                    call.args.push(value);
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Primaries
    // -----------------------------------------------------------------

    fn parse_primary(&mut self) -> PResult<Expr> {
        let token = self.peek_token().clone();
        match token.kind {
            TokenKind::Int(text) => {
                self.advance();
                Ok(Expr::Int(text))
            }
            TokenKind::Float(text) => {
                self.advance();
                Ok(Expr::Float(text))
            }
            TokenKind::Str(segments) => {
                self.advance();
                let mut parts = self.str_parts(segments)?;
                while let TokenKind::Str(next) = self.peek().clone() {
                    self.advance();
                    parts.extend(self.str_parts(next)?);
                }
                Ok(plain_or(parts, Expr::Str, Expr::DStr))
            }
            TokenKind::XStr(segments) => {
                self.advance();
                Ok(Expr::XStr(self.str_parts(segments)?))
            }
            TokenKind::Symbol(name) => {
                self.advance();
                Ok(Expr::Sym(name))
            }
            TokenKind::DSymbol(segments) => {
                self.advance();
                let parts = self.str_parts(segments)?;
                Ok(plain_or(parts, Expr::Sym, Expr::DSym))
            }
            TokenKind::Words(words) => {
                self.advance();
                Ok(Expr::Array(words.into_iter().map(Expr::Str).collect()))
            }
            TokenKind::IVar(name) => {
                self.advance();
                Ok(Expr::IVar(name))
            }
            TokenKind::GVar(name) => {
                self.advance();
                Ok(Expr::GVar(name))
            }
            TokenKind::Const(name) => {
                self.advance();
                if self.call_parens_follow() {
                    return self.parse_call_rest(None, name);
                }
                Ok(Expr::Const {
                    base: ConstBase::Lexical,
                    name,
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.is_local(&name) && !self.call_parens_follow() {
                    return Ok(Expr::LVar(name));
                }
                self.parse_call_rest(None, name)
            }
            TokenKind::ColonColon => {
                self.advance();
                match self.advance().kind {
                    TokenKind::Const(name) => Ok(Expr::Const {
                        base: ConstBase::Top,
                        name,
                    }),
                    _ => Err(self.error_before("expected a constant after '::'")),
                }
            }
            TokenKind::LParen => {
                self.advance();
                let saved = std::mem::replace(&mut self.no_do, 0);
                let mut body = self.parse_stmts()?;
                self.expect(&TokenKind::RParen, "')'")?;
                self.no_do = saved;
                Ok(match body.len() {
                    0 => Expr::Nil,
                    1 => body.remove(0),
                    _ => Expr::Seq(body),
                })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut call = Call::new(None, "[]", Vec::new());
                self.parse_delimited_args(&mut call, &TokenKind::RBracket)?;
                if call.block_arg.is_some() {
                    return Err(self.error_at(token.span.start as usize, "block argument in array literal"));
                }
                Ok(Expr::Array(call.args))
            }
            TokenKind::LBrace => self.parse_hash(),
            TokenKind::Keyword(keyword) => self.parse_keyword(keyword),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_hash(&mut self) -> PResult<Expr> {
        self.advance();
        let saved = std::mem::replace(&mut self.no_do, 0);
        let mut pairs = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(&TokenKind::RBrace) {
                break;
            }
            let key = if let TokenKind::Label(name) = self.peek().clone() {
                self.advance();
                Expr::Sym(name)
            } else {
                let key = self.parse_expr()?;
                self.skip_newlines();
                self.expect(&TokenKind::Arrow, "'=>' in hash literal")?;
                key
            };
            self.skip_newlines();
            let value = self.parse_expr()?;
            pairs.push((key, value));
            self.skip_newlines();
            if !self.eat(&TokenKind::Comma) {
                self.skip_newlines();
                self.expect(&TokenKind::RBrace, "'}' after hash literal")?;
                break;
            }
        }
        self.no_do = saved;
        Ok(Expr::Hash(pairs))
    }

    fn parse_keyword(&mut self, keyword: Keyword) -> PResult<Expr> {
        match keyword {
            Keyword::Nil => self.simple(Expr::Nil),
            Keyword::True => self.simple(Expr::True),
            Keyword::False => self.simple(Expr::False),
            Keyword::SelfKw => self.simple(Expr::SelfRef),
            Keyword::File => self.simple(Expr::Str(self.file.to_string())),
            Keyword::If | Keyword::Unless => {
                self.advance();
                let expr = self.parse_if_tail(keyword == Keyword::Unless)?;
                self.expect_keyword(Keyword::End)?;
                Ok(expr)
            }
            Keyword::While | Keyword::Until => {
                self.advance();
                self.no_do += 1;
                let cond = self.parse_expr_stmt()?;
                self.no_do -= 1;
                if !self.eat_keyword(Keyword::Do) {
                    self.require_term()?;
                }
                let body = self.parse_stmts()?;
                self.expect_keyword(Keyword::End)?;
                Ok(Expr::While {
                    cond: Box::new(cond),
                    body,
                    until: keyword == Keyword::Until,
                    do_while: false,
                })
            }
            Keyword::Case => self.parse_case(),
            Keyword::Begin => {
                self.advance();
                self.parse_begin_body()
            }
            Keyword::Def => self.parse_def(),
            Keyword::Class => self.parse_class(),
            Keyword::Module => {
                self.advance();
                let (base, name) = self.parse_cpath()?;
                self.push_scope(false);
                let body = self.parse_stmts()?;
                self.expect_keyword(Keyword::End)?;
                self.pop_scope();
                Ok(Expr::Module { base, name, body })
            }
            Keyword::Return => {
                self.advance();
                Ok(Expr::Return(self.parse_jump_value()?))
            }
            Keyword::Break => {
                self.advance();
                Ok(Expr::Break(self.parse_jump_value()?))
            }
            Keyword::Next => {
                self.advance();
                Ok(Expr::Next(self.parse_jump_value()?))
            }
            Keyword::Yield => {
                self.advance();
                let mut call = Call::new(None, "yield", Vec::new());
                if self.call_parens_follow() {
                    self.advance();
                    self.parse_delimited_args(&mut call, &TokenKind::RParen)?;
                } else if self.command_arg_start() {
                    self.parse_command_args(&mut call)?;
                }
                Ok(Expr::Yield(call.args))
            }
            Keyword::Super => {
                self.advance();
                let mut call = Call::new(None, "super", Vec::new());
                let explicit = if self.call_parens_follow() {
                    self.advance();
                    self.parse_delimited_args(&mut call, &TokenKind::RParen)?;
                    true
                } else if self.command_arg_start() {
                    self.parse_command_args(&mut call)?;
                    true
                } else {
                    false
                };
                self.parse_block_into(&mut call.block)?;
                Ok(Expr::Super {
                    args: explicit.then_some(call.args),
                    block: call.block,
                    block_arg: call.block_arg,
                })
            }
            Keyword::Alias => {
                self.advance();
                let new_name = self.method_name_operand()?;
                let old_name = self.method_name_operand()?;
                Ok(Expr::Alias { new_name, old_name })
            }
            Keyword::Undef => {
                self.advance();
                let mut names = vec![self.method_name_operand()?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.method_name_operand()?);
                }
                Ok(Expr::Undef(names))
            }
            Keyword::Not => {
                self.advance();
                let operand = self.parse_expr()?;
                Ok(Expr::Not(Box::new(operand)))
            }
            _ => Err(self.unexpected()),
        }
    }

    fn simple(&mut self, expr: Expr) -> PResult<Expr> {
        self.advance();
        Ok(expr)
    }

    /// Everything after `if`/`unless`/`elsif` up to, not including, `end`.
    fn parse_if_tail(&mut self, negate: bool) -> PResult<Expr> {
        let cond = self.parse_expr_stmt()?;
        self.parse_then()?;
        let body = self.parse_stmts()?;
        let else_body = if self.eat_keyword(Keyword::Elsif) {
            vec![self.parse_if_tail(false)?]
        } else if self.eat_keyword(Keyword::Else) {
            self.parse_stmts()?
        } else {
            Vec::new()
        };
        let (then_body, else_body) = if negate {
            (else_body, body)
        } else {
            (body, else_body)
        };
        Ok(Expr::If {
            cond: Box::new(cond),
            then_body,
            else_body,
        })
    }

    fn parse_then(&mut self) -> PResult<()> {
        if self.eat_keyword(Keyword::Then) {
            return Ok(());
        }
        self.require_term()?;
        self.skip_terms();
        self.eat_keyword(Keyword::Then);
        Ok(())
    }

    fn parse_case(&mut self) -> PResult<Expr> {
        self.advance();
        let subject = if self.is_term() {
            None
        } else {
            Some(Box::new(self.parse_expr_stmt()?))
        };
        self.skip_terms();
        let mut whens = Vec::new();
        while self.eat_keyword(Keyword::When) {
            let mut values = Vec::new();
            loop {
                if self.eat(&TokenKind::Star) {
                    let value = self.parse_ternary()?;
                    values.push(Expr::Splat(Box::new(value)));
                } else {
                    values.push(self.parse_ternary()?);
                }
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
                self.skip_newlines();
            }
            self.parse_then()?;
            let body = self.parse_stmts()?;
            whens.push(WhenClause { values, body });
        }
        if whens.is_empty() {
            return Err(self.error_here("case without when clauses"));
        }
        let else_body = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_stmts()?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Expr::Case {
            subject,
            whens,
            else_body,
        })
    }

    /// Body of `begin`/`def`, with its `rescue`/`else`/`ensure` clauses and `end`.
    fn parse_begin_body(&mut self) -> PResult<Expr> {
        let body = self.parse_stmts()?;
        let mut rescues = Vec::new();
        while self.eat_keyword(Keyword::Rescue) {
            let mut classes = Vec::new();
            while !self.is_term()
                && !self.at(&TokenKind::Arrow)
                && !self.at_keyword(Keyword::Then)
            {
                classes.push(self.parse_ternary()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            let var = if self.eat(&TokenKind::Arrow) {
                Some(self.param_name()?)
            } else {
                None
            };
            self.parse_then()?;
            let body = self.parse_stmts()?;
            rescues.push(RescueClause { classes, var, body });
        }
        let else_body = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_stmts()?)
        } else {
            None
        };
        let ensure = if self.eat_keyword(Keyword::Ensure) {
            Some(self.parse_stmts()?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End)?;
        Ok(Expr::Begin {
            body,
            rescues,
            else_body,
            ensure,
        })
    }

    fn parse_def(&mut self) -> PResult<Expr> {
        self.advance();
        let singleton = match (self.peek().clone(), self.peek_nth(1)) {
            (TokenKind::Keyword(Keyword::SelfKw), TokenKind::Dot) => Some(Expr::SelfRef),
            (TokenKind::Const(name), TokenKind::Dot) => Some(Expr::Const {
                base: ConstBase::Lexical,
                name,
            }),
            (TokenKind::Ident(name), TokenKind::Dot) if self.is_local(&name) => Some(Expr::LVar(name)),
            (TokenKind::Ident(name), TokenKind::Dot) => Some(Expr::Call(Call::new(None, name, Vec::new()))),
            _ => None,
        };
        if singleton.is_some() {
            self.advance();
            self.advance();
        }
        let name = self.def_method_name()?;

        self.push_scope(false);
        let params = if self.at(&TokenKind::LParen) {
            self.advance();
            self.parse_def_params(Some(&TokenKind::RParen))?
        } else if self.is_term() {
            Params::default()
        } else {
            self.parse_def_params(None)?
        };
        let body = match self.parse_begin_body()? {
            Expr::Begin {
                body,
                rescues,
                else_body: None,
                ensure: None,
            } if rescues.is_empty() => body,
            begin => vec![begin],
        };
        self.pop_scope();

        Ok(Expr::Def {
            singleton: singleton.map(Box::new),
            name,
            params,
            body,
        })
    }

    fn parse_class(&mut self) -> PResult<Expr> {
        self.advance();
        if self.eat(&TokenKind::Shl) {
            let target = self.parse_expr()?;
            self.push_scope(false);
            let body = self.parse_stmts()?;
            self.expect_keyword(Keyword::End)?;
            self.pop_scope();
            return Ok(Expr::SClass {
                target: Box::new(target),
                body,
            });
        }
        let (base, name) = self.parse_cpath()?;
        let superclass = if self.eat(&TokenKind::Lt) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.push_scope(false);
        let body = self.parse_stmts()?;
        self.expect_keyword(Keyword::End)?;
        self.pop_scope();
        Ok(Expr::Class {
            base,
            name,
            superclass,
            body,
        })
    }

    fn parse_cpath(&mut self) -> PResult<(ConstBase, String)> {
        let mut base = if self.eat(&TokenKind::ColonColon) {
            ConstBase::Top
        } else {
            ConstBase::Lexical
        };
        let mut name = match self.advance().kind {
            TokenKind::Const(name) => name,
            _ => return Err(self.error_before("class/module name must be CONSTANT")),
        };
        while self.at(&TokenKind::ColonColon) {
            self.advance();
            let TokenKind::Const(next) = self.advance().kind else {
                return Err(self.error_before("class/module name must be CONSTANT"));
            };
            base = ConstBase::Scoped(Box::new(Expr::Const { base, name }));
            name = next;
        }
        Ok((base, name))
    }

    fn parse_jump_value(&mut self) -> PResult<Option<Box<Expr>>> {
        if !can_start_value(self.peek()) {
            return Ok(None);
        }
        let first = self.parse_expr()?;
        if !self.at(&TokenKind::Comma) {
            return Ok(Some(Box::new(first)));
        }
        let mut values = vec![first];
        while self.eat(&TokenKind::Comma) {
            values.push(self.parse_expr()?);
        }
        Ok(Some(Box::new(Expr::Array(values))))
    }

    // -----------------------------------------------------------------
    // Names
    // -----------------------------------------------------------------

    fn method_name_after_dot(&mut self) -> PResult<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) | TokenKind::Const(name) => Ok(name),
            TokenKind::Keyword(keyword) => Ok(keyword.as_str().to_string()),
            kind => operator_name(&kind)
                .map(str::to_string)
                .ok_or_else(|| self.error_before("expected a method name after '.'")),
        }
    }

    fn def_method_name(&mut self) -> PResult<String> {
        let token = self.advance();
        let mut name = match token.kind {
            TokenKind::Ident(name) | TokenKind::Const(name) => name,
            TokenKind::Keyword(keyword) => keyword.as_str().to_string(),
            TokenKind::LBracket => {
                self.expect(&TokenKind::RBracket, "']' in method name")?;
                "[]".to_string()
            }
            kind => operator_name(&kind)
                .map(str::to_string)
                .ok_or_else(|| self.error_before("expected a method name"))?,
        };
        let setter = self.at(&TokenKind::Assign)
            && !self.peek_token().spaced
            && (is_local_name(&name) || name == "[]");
        if setter {
            self.advance();
            name.push('=');
        }
        Ok(name)
    }

    /// Operand of `alias`/`undef`: a bare name, operator or symbol.
    fn method_name_operand(&mut self) -> PResult<String> {
        let token = self.advance();
        match token.kind {
            TokenKind::Ident(name) | TokenKind::Const(name) | TokenKind::Symbol(name) => Ok(name),
            TokenKind::GVar(name) => Ok(format!("${name}")),
            TokenKind::Keyword(keyword) => Ok(keyword.as_str().to_string()),
            TokenKind::LBracket => {
                self.expect(&TokenKind::RBracket, "']' in method name")?;
                Ok("[]".to_string())
            }
            kind => operator_name(&kind)
                .map(str::to_string)
                .ok_or_else(|| self.error_before("expected a method name")),
        }
    }

    // -----------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------

    fn str_parts(&mut self, segments: Vec<StrSegment>) -> PResult<Vec<StrPart>> {
        segments
            .into_iter()
            .map(|segment| match segment {
                StrSegment::Text(text) => Ok(StrPart::Lit(text)),
                StrSegment::Code(span) => Ok(StrPart::Code(self.parse_embedded(span)?)),
            })
            .collect()
    }

    fn parse_embedded(&mut self, span: Span) -> PResult<Vec<Expr>> {
        let tokens = lex_range(self.file, self.source, span)?;
        let saved_tokens = std::mem::replace(&mut self.tokens, tokens);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let saved_no_do = std::mem::replace(&mut self.no_do, 0);
        let result = self
            .parse_stmts()
            .and_then(|body| self.expect(&TokenKind::Eof, "'}'").map(|_| body));
        self.tokens = saved_tokens;
        self.pos = saved_pos;
        self.no_do = saved_no_do;
        result
    }

    // -----------------------------------------------------------------
    // Local scopes
    // -----------------------------------------------------------------

    fn push_scope(&mut self, inherits: bool) {
        self.scopes.push(LocalScope {
            names: HashSet::new(),
            inherits,
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        if self.is_local(name) {
            return;
        }
        if let Some(scope) = self.scopes.last_mut() {
            scope.names.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.names.contains(name) {
                return true;
            }
            if !scope.inherits {
                break;
            }
        }
        false
    }

    // -----------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------

    fn peek_token(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek(&self) -> &TokenKind {
        &self.peek_token().kind
    }

    fn peek_nth(&self, n: usize) -> TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx].kind.clone()
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_keyword(&self, keyword: Keyword) -> bool {
        self.at(&TokenKind::Keyword(keyword))
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        self.eat(&TokenKind::Keyword(keyword))
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> PResult<()> {
        if self.eat(kind) {
            return Ok(());
        }
        Err(self.error_here(format!("expected {what}, found {}", describe(self.peek()))))
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> PResult<()> {
        self.expect(&TokenKind::Keyword(keyword), &format!("'{}'", keyword.as_str()))
    }

    fn is_term(&self) -> bool {
        matches!(self.peek(), TokenKind::Newline | TokenKind::Semi)
    }

    fn require_term(&mut self) -> PResult<()> {
        if self.is_term() {
            self.skip_terms();
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn skip_terms(&mut self) {
        while self.is_term() {
            self.advance();
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(&TokenKind::Newline) {
            self.advance();
        }
    }

    fn skip_newlines_if(&mut self, condition: bool) {
        if condition {
            self.skip_newlines();
        }
    }

    /// `(` directly after a name, without whitespace, starts its argument list.
    fn call_parens_follow(&self) -> bool {
        self.at(&TokenKind::LParen) && !self.peek_token().spaced
    }

    /// Whether the current token starts the arguments of a parenthesis-free call.
    fn command_arg_start(&self) -> bool {
        let token = self.peek_token();
        if !token.spaced {
            return false;
        }
        let next_glued = !self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].spaced;
        match &token.kind {
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
            | TokenKind::Label(_)
            | TokenKind::LBracket
            | TokenKind::LParen => true,
            TokenKind::Keyword(keyword) => matches!(
                keyword,
                Keyword::Nil
                    | Keyword::True
                    | Keyword::False
                    | Keyword::SelfKw
                    | Keyword::File
                    | Keyword::Not
                    | Keyword::Super
                    | Keyword::Yield
                    | Keyword::Case
                    | Keyword::Begin
            ),
            TokenKind::ColonColon
            | TokenKind::Bang
            | TokenKind::Tilde
            | TokenKind::Minus
            | TokenKind::Star
            | TokenKind::Amp => next_glued,
            _ => false,
        }
    }

    fn unexpected(&self) -> ParseError {
        self.error_here(format!("unexpected {}", describe(self.peek())))
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.peek_token().span.start as usize, message)
    }

    /// Error located at the token just consumed.
    fn error_before(&self, message: impl Into<String>) -> ParseError {
        let idx = self.pos.saturating_sub(1);
        self.error_at(self.tokens[idx].span.start as usize, message)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> ParseError {
        ParseError::at(self.file, self.source, offset, message)
    }
}

fn is_body_end(kind: &TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Eof
            | TokenKind::RBrace
            | TokenKind::RParen
            | TokenKind::Keyword(
                Keyword::End
                    | Keyword::Else
                    | Keyword::Elsif
                    | Keyword::When
                    | Keyword::Rescue
                    | Keyword::Ensure
            )
    )
}

/// Whether `return`/`break`/`next` is followed by a value.
fn can_start_value(kind: &TokenKind) -> bool {
    match kind {
        TokenKind::Keyword(keyword) => !matches!(
            keyword,
            Keyword::If
                | Keyword::Unless
                | Keyword::While
                | Keyword::Until
                | Keyword::Rescue
                | Keyword::And
                | Keyword::Or
                | Keyword::Then
                | Keyword::Do
                | Keyword::Else
                | Keyword::Elsif
                | Keyword::When
                | Keyword::Ensure
                | Keyword::End
        ),
        TokenKind::Eof
        | TokenKind::Newline
        | TokenKind::Semi
        | TokenKind::RBrace
        | TokenKind::RParen
        | TokenKind::RBracket
        | TokenKind::Comma
        | TokenKind::Colon => false,
        _ => true,
    }
}

fn is_local_name(name: &str) -> bool {
    name.starts_with(|c: char| c == '_' || c.is_lowercase())
        && !name.ends_with('?')
        && !name.ends_with('!')
}

fn binary_operator(kind: &TokenKind) -> Option<(u8, &'static str)> {
    let entry = match kind {
        TokenKind::OrOr => (0, "||"),
        TokenKind::AndAnd => (1, "&&"),
        TokenKind::Cmp => (2, "<=>"),
        TokenKind::Eq => (2, "=="),
        TokenKind::Eqq => (2, "==="),
        TokenKind::NotEq => (2, "!="),
        TokenKind::Match => (2, "=~"),
        TokenKind::NotMatch => (2, "!~"),
        TokenKind::Lt => (3, "<"),
        TokenKind::Le => (3, "<="),
        TokenKind::Gt => (3, ">"),
        TokenKind::Ge => (3, ">="),
        TokenKind::Pipe => (4, "|"),
        TokenKind::Caret => (4, "^"),
        TokenKind::Amp => (5, "&"),
        TokenKind::Shl => (6, "<<"),
        TokenKind::Shr => (6, ">>"),
        TokenKind::Plus => (7, "+"),
        TokenKind::Minus => (7, "-"),
        TokenKind::Star => (8, "*"),
        TokenKind::Slash => (8, "/"),
        TokenKind::Percent => (8, "%"),
        _ => return None,
    };
    Some(entry)
}

fn operator_name(kind: &TokenKind) -> Option<&'static str> {
    let name = match kind {
        TokenKind::Plus => "+",
        TokenKind::Minus => "-",
        TokenKind::Star => "*",
        TokenKind::Pow => "**",
        TokenKind::Slash => "/",
        TokenKind::Percent => "%",
        TokenKind::Eq => "==",
        TokenKind::Eqq => "===",
        TokenKind::NotEq => "!=",
        TokenKind::Match => "=~",
        TokenKind::Lt => "<",
        TokenKind::Le => "<=",
        TokenKind::Gt => ">",
        TokenKind::Ge => ">=",
        TokenKind::Cmp => "<=>",
        TokenKind::Bang => "!",
        TokenKind::Tilde => "~",
        TokenKind::Amp => "&",
        TokenKind::Pipe => "|",
        TokenKind::Caret => "^",
        TokenKind::Shl => "<<",
        TokenKind::Shr => ">>",
        _ => return None,
    };
    Some(name)
}

/// Collapse literal-only parts into `plain`, otherwise build `dynamic`.
fn plain_or(
    parts: Vec<StrPart>,
    plain: fn(String) -> Expr,
    dynamic: fn(Vec<StrPart>) -> Expr,
) -> Expr {
    if parts.iter().all(|part| matches!(part, StrPart::Lit(_))) {
        let text = parts
            .into_iter()
            .map(|part| match part {
                StrPart::Lit(text) => text,
                StrPart::Code(_) => String::new(),
            })
            .collect();
        plain(text)
    } else {
        dynamic(parts)
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Newline => "newline".to_string(),
        TokenKind::Int(text) | TokenKind::Float(text) => format!("number {text}"),
        TokenKind::Str(_) => "string literal".to_string(),
        TokenKind::XStr(_) => "x-string".to_string(),
        TokenKind::Symbol(name) => format!("symbol :{name}"),
        TokenKind::Ident(name) | TokenKind::Const(name) => format!("'{name}'"),
        TokenKind::IVar(name) => format!("'@{name}'"),
        TokenKind::GVar(name) => format!("'${name}'"),
        TokenKind::Label(name) => format!("label '{name}:'"),
        TokenKind::Keyword(keyword) => format!("'{}'", keyword.as_str()),
        other => match operator_name(other) {
            Some(op) => format!("'{op}'"),
            None => format!("{other:?}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_body(source: &str) -> Vec<Expr> {
        parse("test.rb", source).expect("parse").body
    }

    fn call(expr: &Expr) -> &Call {
        match expr {
            Expr::Call(call) => call,
            other => panic!("expected call, got {other:?}"),
        }
    }

    #[test]
    fn parses_command_call_with_string() {
        let body = parse_body("require 'pippo'");
        let require = call(&body[0]);
        assert_eq!(require.name, "require");
        assert_eq!(require.args, vec![Expr::Str("pippo".into())]);
    }

    #[test]
    fn distinguishes_locals_from_calls() {
        let body = parse_body("a = 1\na\nb");
        assert!(matches!(&body[0], Expr::Asgn { target: Target::LVar(name), .. } if name == "a"));
        assert_eq!(body[1], Expr::LVar("a".into()));
        assert!(call(&body[2]).is_bare());
    }

    #[test]
    fn parses_blocks_with_params() {
        let body = parse_body("self.map { |a| a + 10 }");
        let map = call(&body[0]);
        let block = map.block.as_ref().expect("block");
        assert_eq!(block.params.required, vec!["a".to_string()]);
        let add = call(&block.body[0]);
        assert_eq!(add.name, "+");
        assert_eq!(add.recv.as_deref(), Some(&Expr::LVar("a".into())));
    }

    #[test]
    fn do_block_binds_to_outer_command() {
        let body = parse_body("foo bar do\n 1\nend");
        let foo = call(&body[0]);
        assert_eq!(foo.name, "foo");
        assert!(foo.block.is_some());
        assert!(call(&foo.args[0]).block.is_none());
    }

    #[test]
    fn parses_binary_precedence() {
        let body = parse_body("1 + 2 * 3");
        let add = call(&body[0]);
        assert_eq!(add.name, "+");
        assert_eq!(call(&add.args[0]).name, "*");
    }

    #[test]
    fn unary_minus_on_literals_folds_into_the_literal() {
        assert_eq!(parse_body("-5"), vec![Expr::Int("-5".into())]);
        let body = parse_body("foo -1");
        assert_eq!(call(&body[0]).args, vec![Expr::Int("-1".into())]);
        let body = parse_body("x = 3\nx - 1");
        assert_eq!(call(&body[1]).name, "-");
    }

    #[test]
    fn parses_class_with_superclass_and_methods() {
        let body = parse_body("class Foo < Bar\n  def initialize(a, b = 2, *rest, &blk)\n    @a = a\n  end\nend");
        let Expr::Class { name, superclass, body, .. } = &body[0] else {
            panic!("expected class");
        };
        assert_eq!(name, "Foo");
        assert!(superclass.is_some());
        let Expr::Def { name, params, body, .. } = &body[0] else {
            panic!("expected def");
        };
        assert_eq!(name, "initialize");
        assert_eq!(params.required, vec!["a".to_string()]);
        assert_eq!(params.optional.len(), 1);
        assert_eq!(params.rest.as_deref(), Some("rest"));
        assert_eq!(params.block.as_deref(), Some("blk"));
        assert!(matches!(&body[0], Expr::Asgn { target: Target::IVar(name), .. } if name == "a"));
    }

    #[test]
    fn parses_operator_and_singleton_method_names() {
        let body = parse_body("def ENV.[]= name, value\n  name\nend\ndef ==(other)\nend\ndef !\n  1\nend");
        let Expr::Def { singleton, name, params, .. } = &body[0] else {
            panic!("expected def");
        };
        assert!(singleton.is_some());
        assert_eq!(name, "[]=");
        assert_eq!(params.required, vec!["name".to_string(), "value".to_string()]);
        assert!(matches!(&body[1], Expr::Def { name, .. } if name == "=="));
        assert!(matches!(&body[2], Expr::Def { name, .. } if name == "!"));
    }

    #[test]
    fn negates_powers_of_negative_literals() {
        let body = parse_body("-2 ** 2\n-2.abs");
        let negation = call(&body[0]);
        assert_eq!(negation.name, "-@");
        let power = call(negation.recv.as_deref().expect("negated operand"));
        assert_eq!(power.name, "**");
        assert!(matches!(power.recv.as_deref(), Some(Expr::Int(text)) if text == "2"));
        assert!(matches!(power.args.as_slice(), [Expr::Int(text)] if text == "2"));

        let abs = call(&body[1]);
        assert_eq!(abs.name, "abs");
        assert!(matches!(abs.recv.as_deref(), Some(Expr::Int(text)) if text == "-2"));
    }

    #[test]
    fn parses_alias_with_operators_and_keywords() {
        let body = parse_body("alias equal? ==\nalias singleton_class class");
        assert_eq!(
            body,
            vec![
                Expr::Alias {
                    new_name: "equal?".into(),
                    old_name: "==".into()
                },
                Expr::Alias {
                    new_name: "singleton_class".into(),
                    old_name: "class".into()
                },
            ]
        );
    }

    #[test]
    fn parses_singleton_class_body() {
        let body = parse_body("class << self\n  undef_method :new\nend");
        let Expr::SClass { target, body } = &body[0] else {
            panic!("expected singleton class");
        };
        assert_eq!(**target, Expr::SelfRef);
        assert_eq!(call(&body[0]).args, vec![Expr::Sym("new".into())]);
    }

    #[test]
    fn parses_interpolation_with_outer_locals() {
        let body = parse_body("name = 1\n\"a #{name}\"");
        let Expr::DStr(parts) = &body[1] else {
            panic!("expected dstr");
        };
        assert_eq!(parts[1], StrPart::Code(vec![Expr::LVar("name".into())]));
    }

    #[test]
    fn parses_modifiers() {
        let body = parse_body("foo if bar\nbaz while qux");
        assert!(matches!(&body[0], Expr::If { then_body, .. } if then_body.len() == 1));
        assert!(matches!(&body[1], Expr::While { do_while: false, .. }));
    }

    #[test]
    fn parses_begin_rescue_ensure() {
        let body = parse_body("begin\n  a\nrescue Foo, Bar => e\n  e\nensure\n  b\nend");
        let Expr::Begin { rescues, ensure, .. } = &body[0] else {
            panic!("expected begin");
        };
        assert_eq!(rescues[0].classes.len(), 2);
        assert_eq!(rescues[0].var.as_deref(), Some("e"));
        assert_eq!(rescues[0].body, vec![Expr::LVar("e".into())]);
        assert!(ensure.is_some());
    }

    #[test]
    fn parses_case_when() {
        let body = parse_body("case x\nwhen 1, 2 then :a\nelse :b\nend");
        let Expr::Case { subject, whens, else_body } = &body[0] else {
            panic!("expected case");
        };
        assert!(subject.is_some());
        assert_eq!(whens[0].values.len(), 2);
        assert_eq!(else_body.as_deref(), Some(&[Expr::Sym("b".into())][..]));
    }

    #[test]
    fn parses_hash_and_array_literals() {
        let body = parse_body("{ a: 1, 'b' => [2, *c] }");
        let Expr::Hash(pairs) = &body[0] else {
            panic!("expected hash");
        };
        assert_eq!(pairs[0].0, Expr::Sym("a".into()));
        let Expr::Array(items) = &pairs[1].1 else {
            panic!("expected array");
        };
        assert!(matches!(items[1], Expr::Splat(_)));
    }

    #[test]
    fn parses_block_pass_symbol() {
        let body = parse_body("$x.reverse.each(&:call) if $x");
        let Expr::If { then_body, .. } = &body[0] else {
            panic!("expected if");
        };
        let each = call(&then_body[0]);
        assert_eq!(each.block_arg.as_deref(), Some(&Expr::Sym("call".into())));
    }

    #[test]
    fn parses_scoped_constants() {
        let body = parse_body("A::B\n::C\nclass D::E; end");
        assert!(matches!(&body[0], Expr::Const { base: ConstBase::Scoped(_), name } if name == "B"));
        assert!(matches!(&body[1], Expr::Const { base: ConstBase::Top, name } if name == "C"));
        assert!(matches!(&body[2], Expr::Class { base: ConstBase::Scoped(_), name, .. } if name == "E"));
    }

    #[test]
    fn reports_position_of_unexpected_tokens() {
        let err = parse("broken.rb", "a = 1\nb = )").unwrap_err();
        assert_eq!(err.file, "broken.rb");
        assert_eq!((err.line, err.column), (2, 5));
    }

    #[test]
    fn reports_missing_end() {
        let err = parse("broken.rb", "class Foo\n  def bar\n  end\n").unwrap_err();
        assert!(err.message.contains("'end'"), "{}", err.message);
    }

    #[test]
    fn keeps_end_data() {
        let program = parse("test.rb", "DATA\n__END__\nFord Perfect").expect("parse");
        assert_eq!(program.end_data.as_deref(), Some("Ford Perfect"));
    }
}
