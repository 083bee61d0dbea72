//! Parser for MineScript syntax
//!
//! Hand-written tokenizer + recursive descent over a C-like surface:
//!
//! ```text
//! void load() {
//!     int xs[] = [1, 2, 3];
//!     for (int i = 0; i < 3; i++) {
//!         print("@a", "red", xs[i]);
//!     }
//!     /say hello
//! }
//! ```
//!
//! A line whose first non-blank character is `/` is a raw game command and
//! is carried through to the output pack unchanged (without the slash).

use crate::ast::{
    BinOp, CmpOp, Declarator, Expr, Fixity, ForInit, IncDecOp, Param, Program, Span, Stat,
};
use crate::types::Type;

const KEYWORDS: &[&str] = &[
    "void", "int", "char", "if", "else", "for", "while", "return", "break", "print",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    Str,
    Char,
    Symbol,
    /// Raw game command payload (leading `/` stripped)
    Command,
}

/// A token with source position information
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Line number (0-indexed)
    pub line: usize,
    /// Column number (0-indexed)
    pub column: usize,
}

impl Token {
    fn new(kind: TokenKind, text: String, line: usize, column: usize) -> Self {
        Token {
            kind,
            text,
            line,
            column,
        }
    }

    fn span(&self) -> Span {
        Span::new(self.line, self.column)
    }
}

/// Split source text into tokens
pub fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut line = 0;
    let mut column = 0;
    // True until the first non-whitespace character of the current line
    let mut at_line_start = true;

    while i < chars.len() {
        let c = chars[i];

        if c == '\n' {
            i += 1;
            line += 1;
            column = 0;
            at_line_start = true;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            column += 1;
            continue;
        }

        // Raw command: `/` opening a line (but not a `//` comment)
        if c == '/' && at_line_start && chars.get(i + 1) != Some(&'/') {
            let start_col = column;
            let mut text = String::new();
            i += 1;
            column += 1;
            while i < chars.len() && chars[i] != '\n' {
                text.push(chars[i]);
                i += 1;
                column += 1;
            }
            tokens.push(Token::new(
                TokenKind::Command,
                text.trim().to_string(),
                line,
                start_col,
            ));
            at_line_start = false;
            continue;
        }

        // Line comment
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
                column += 1;
            }
            continue;
        }

        at_line_start = false;

        if c.is_ascii_digit() {
            let start_col = column;
            let mut text = String::new();
            while i < chars.len() && chars[i].is_ascii_digit() {
                text.push(chars[i]);
                i += 1;
                column += 1;
            }
            tokens.push(Token::new(TokenKind::Number, text, line, start_col));
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start_col = column;
            let mut text = String::new();
            if c == '$' {
                text.push('$');
                i += 1;
                column += 1;
                if i >= chars.len() || !(chars[i].is_alphabetic() || chars[i] == '_') {
                    return Err(format!(
                        "Expected a name after '$' at line {}, column {}",
                        line + 1,
                        start_col + 1
                    ));
                }
            }
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                text.push(chars[i]);
                i += 1;
                column += 1;
            }
            tokens.push(Token::new(TokenKind::Ident, text, line, start_col));
            continue;
        }

        if c == '"' {
            let start_line = line;
            let start_col = column;
            let mut text = String::new();
            i += 1;
            column += 1;
            loop {
                if i >= chars.len() || chars[i] == '\n' {
                    return Err(format!(
                        "Unclosed string literal at line {}, column {} - missing closing quote",
                        start_line + 1,
                        start_col + 1
                    ));
                }
                if chars[i] == '"' {
                    i += 1;
                    column += 1;
                    break;
                }
                if chars[i] == '\\' {
                    let (escaped, width) = read_escape(&chars, i, line, column)?;
                    text.push(escaped);
                    i += width;
                    column += width;
                    continue;
                }
                text.push(chars[i]);
                i += 1;
                column += 1;
            }
            tokens.push(Token::new(TokenKind::Str, text, start_line, start_col));
            continue;
        }

        if c == '\'' {
            let start_col = column;
            i += 1;
            column += 1;
            let value = if chars.get(i) == Some(&'\\') {
                let (escaped, width) = read_escape(&chars, i, line, column)?;
                i += width;
                column += width;
                escaped
            } else {
                match chars.get(i) {
                    Some(&ch) if ch != '\'' && ch != '\n' => {
                        i += 1;
                        column += 1;
                        ch
                    }
                    _ => {
                        return Err(format!(
                            "Empty character literal at line {}, column {}",
                            line + 1,
                            start_col + 1
                        ));
                    }
                }
            };
            if chars.get(i) != Some(&'\'') {
                return Err(format!(
                    "Unclosed character literal at line {}, column {}",
                    line + 1,
                    start_col + 1
                ));
            }
            i += 1;
            column += 1;
            if (value as u32) > 0xFF {
                return Err(format!(
                    "Character literal out of range at line {}, column {} (must be an 8-bit code)",
                    line + 1,
                    start_col + 1
                ));
            }
            tokens.push(Token::new(
                TokenKind::Char,
                value.to_string(),
                line,
                start_col,
            ));
            continue;
        }

        // Two-character symbols first
        let pair: String = chars[i..chars.len().min(i + 2)].iter().collect();
        if matches!(pair.as_str(), "++" | "--" | "==" | "!=" | "<=" | ">=") {
            tokens.push(Token::new(TokenKind::Symbol, pair, line, column));
            i += 2;
            column += 2;
            continue;
        }
        if "+-*/%=<>()[]{},;".contains(c) {
            tokens.push(Token::new(TokenKind::Symbol, c.to_string(), line, column));
            i += 1;
            column += 1;
            continue;
        }

        return Err(format!(
            "Unexpected character '{}' at line {}, column {}",
            c,
            line + 1,
            column + 1
        ));
    }

    Ok(tokens)
}

/// Read a backslash escape starting at `chars[i]`; returns (char, width)
fn read_escape(
    chars: &[char],
    i: usize,
    line: usize,
    column: usize,
) -> Result<(char, usize), String> {
    match chars.get(i + 1) {
        Some('n') => Ok(('\n', 2)),
        Some('t') => Ok(('\t', 2)),
        Some('r') => Ok(('\r', 2)),
        Some('0') => Ok(('\0', 2)),
        Some('\\') => Ok(('\\', 2)),
        Some('\'') => Ok(('\'', 2)),
        Some('"') => Ok(('"', 2)),
        other => Err(format!(
            "Unknown escape sequence '\\{}' at line {}, column {}",
            other.map(|c| c.to_string()).unwrap_or_default(),
            line + 1,
            column + 1
        )),
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, String> {
        Ok(Parser {
            tokens: tokenize(source)?,
            pos: 0,
        })
    }

    pub fn parse(&mut self) -> Result<Program, String> {
        let mut program = Program::new();
        while !self.is_at_end() {
            program.stats.push(self.parse_stat()?);
        }
        Ok(program)
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check_symbol(&self, text: &str) -> bool {
        self.current()
            .is_some_and(|t| t.kind == TokenKind::Symbol && t.text == text)
    }

    fn check_ident(&self, text: &str) -> bool {
        self.current()
            .is_some_and(|t| t.kind == TokenKind::Ident && t.text == text)
    }

    /// Consume the symbol if present; report whether it was
    fn consume_symbol(&mut self, text: &str) -> bool {
        if self.check_symbol(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, text: &str) -> Result<Span, String> {
        match self.current() {
            Some(t) if t.kind == TokenKind::Symbol && t.text == text => {
                let span = t.span();
                self.pos += 1;
                Ok(span)
            }
            Some(t) => Err(format!(
                "Expected '{}' at line {}, column {}, got '{}'",
                text,
                t.line + 1,
                t.column + 1,
                t.text
            )),
            None => Err(format!("Expected '{}', got end of input", text)),
        }
    }

    fn expect_name(&mut self) -> Result<Token, String> {
        match self.current() {
            Some(t) if t.kind == TokenKind::Ident && !KEYWORDS.contains(&t.text.as_str()) => {
                let token = t.clone();
                self.pos += 1;
                Ok(token)
            }
            Some(t) => Err(format!(
                "Expected a name at line {}, column {}, got '{}'",
                t.line + 1,
                t.column + 1,
                t.text
            )),
            None => Err("Expected a name, got end of input".to_string()),
        }
    }

    /// Scalar type keyword at the current position, without consuming
    fn peek_type(&self) -> Option<Type> {
        self.current()
            .filter(|t| t.kind == TokenKind::Ident)
            .and_then(|t| Type::from_keyword(&t.text))
    }

    fn token_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn parse_stat(&mut self) -> Result<Stat, String> {
        let token = match self.current() {
            Some(t) => t.clone(),
            None => return Err("Unexpected end of input".to_string()),
        };

        if token.kind == TokenKind::Command {
            self.pos += 1;
            let span = token.span();
            return Ok(Stat::Command {
                text: token.text,
                span,
            });
        }

        if token.kind == TokenKind::Symbol && token.text == "{" {
            return self.parse_block();
        }

        if token.kind == TokenKind::Ident {
            match token.text.as_str() {
                "void" => return self.parse_function(),
                "int" | "char" => {
                    // `type name (` opens a function, anything else a declaration
                    let looks_like_function = self
                        .token_at(1)
                        .is_some_and(|t| t.kind == TokenKind::Ident)
                        && self
                            .token_at(2)
                            .is_some_and(|t| t.kind == TokenKind::Symbol && t.text == "(");
                    if looks_like_function {
                        return self.parse_function();
                    }
                    let decl = self.parse_var_decl()?;
                    self.expect_symbol(";")?;
                    return Ok(decl);
                }
                "if" => return self.parse_if(),
                "for" => return self.parse_for(),
                "while" => return self.parse_while(),
                "return" => {
                    self.pos += 1;
                    let value = if self.check_symbol(";") {
                        None
                    } else {
                        Some(self.parse_expr()?)
                    };
                    self.expect_symbol(";")?;
                    return Ok(Stat::Return {
                        value,
                        span: token.span(),
                    });
                }
                "break" => {
                    self.pos += 1;
                    self.expect_symbol(";")?;
                    return Ok(Stat::Break { span: token.span() });
                }
                "print" => {
                    self.pos += 1;
                    self.expect_symbol("(")?;
                    let mut args = Vec::new();
                    if !self.check_symbol(")") {
                        args.push(self.parse_expr()?);
                        while self.consume_symbol(",") {
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect_symbol(")")?;
                    self.expect_symbol(";")?;
                    return Ok(Stat::Print {
                        args,
                        span: token.span(),
                    });
                }
                _ => {}
            }
        }

        let expr = self.parse_expr()?;
        self.expect_symbol(";")?;
        Ok(Stat::Expr {
            expr,
            span: token.span(),
        })
    }

    fn parse_block(&mut self) -> Result<Stat, String> {
        let span = self.expect_symbol("{")?;
        let mut stats = Vec::new();
        while !self.check_symbol("}") {
            if self.is_at_end() {
                return Err("Unexpected end of input inside a block".to_string());
            }
            stats.push(self.parse_stat()?);
        }
        self.expect_symbol("}")?;
        Ok(Stat::Block { stats, span })
    }

    fn parse_function(&mut self) -> Result<Stat, String> {
        let type_token = self
            .advance()
            .ok_or_else(|| "Expected a function return type".to_string())?;
        let ret = if type_token.text == "void" {
            None
        } else {
            Some(Type::from_keyword(&type_token.text).ok_or_else(|| {
                format!(
                    "Unknown type '{}' at line {}, column {}",
                    type_token.text,
                    type_token.line + 1,
                    type_token.column + 1
                )
            })?)
        };
        let name = self.expect_name()?;
        self.expect_symbol("(")?;
        let mut params = Vec::new();
        if !self.check_symbol(")") {
            loop {
                let ty = self.peek_type().ok_or_else(|| {
                    format!(
                        "Expected a parameter type at line {}, column {}",
                        self.current().map(|t| t.line + 1).unwrap_or(0),
                        self.current().map(|t| t.column + 1).unwrap_or(0)
                    )
                })?;
                self.pos += 1;
                let param_name = self.expect_name()?;
                let param_span = param_name.span();
                params.push(Param {
                    name: param_name.text,
                    ty,
                    span: param_span,
                });
                if !self.consume_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol(")")?;
        let body = self.parse_stat()?;
        Ok(Stat::Function {
            ret,
            name: name.text,
            params,
            body: Box::new(body),
            span: type_token.span(),
        })
    }

    /// Parse `type declarator (, declarator)*` without the trailing `;`
    fn parse_var_decl(&mut self) -> Result<Stat, String> {
        let type_token = self
            .advance()
            .ok_or_else(|| "Expected a type".to_string())?;
        let ty = Type::from_keyword(&type_token.text).ok_or_else(|| {
            format!(
                "Unknown type '{}' at line {}, column {}",
                type_token.text,
                type_token.line + 1,
                type_token.column + 1
            )
        })?;
        let mut decls = Vec::new();
        loop {
            let name_token = self.expect_name_or_sigil()?;
            let (name, compile_time) = split_sigil(&name_token.text);
            let array = if self.consume_symbol("[") {
                self.expect_symbol("]")?;
                true
            } else {
                false
            };
            let init = if self.consume_symbol("=") {
                Some(self.parse_expr()?)
            } else {
                None
            };
            decls.push(Declarator {
                name,
                compile_time,
                array,
                init,
                span: name_token.span(),
            });
            if !self.consume_symbol(",") {
                break;
            }
        }
        Ok(Stat::VarDecl {
            ty,
            decls,
            span: type_token.span(),
        })
    }

    /// A plain name or a `$`-prefixed one
    fn expect_name_or_sigil(&mut self) -> Result<Token, String> {
        match self.current() {
            Some(t)
                if t.kind == TokenKind::Ident
                    && !KEYWORDS.contains(&t.text.trim_start_matches('$')) =>
            {
                let token = t.clone();
                self.pos += 1;
                Ok(token)
            }
            Some(t) => Err(format!(
                "Expected a variable name at line {}, column {}, got '{}'",
                t.line + 1,
                t.column + 1,
                t.text
            )),
            None => Err("Expected a variable name, got end of input".to_string()),
        }
    }

    fn parse_if(&mut self) -> Result<Stat, String> {
        let token = self.advance().expect("checked by caller");
        self.expect_symbol("(")?;
        let cond = self.parse_expr()?;
        self.expect_symbol(")")?;
        let then_branch = Box::new(self.parse_stat()?);
        let else_branch = if self.check_ident("else") {
            self.pos += 1;
            Some(Box::new(self.parse_stat()?))
        } else {
            None
        };
        Ok(Stat::If {
            cond,
            then_branch,
            else_branch,
            span: token.span(),
        })
    }

    fn parse_for(&mut self) -> Result<Stat, String> {
        let token = self.advance().expect("checked by caller");
        self.expect_symbol("(")?;
        let init = if self.peek_type().is_some() {
            ForInit::Decl(Box::new(self.parse_var_decl()?))
        } else {
            ForInit::Expr(self.parse_expr()?)
        };
        self.expect_symbol(";")?;
        let cond = self.parse_expr()?;
        self.expect_symbol(";")?;
        let update = self.parse_expr()?;
        self.expect_symbol(")")?;
        let body = Box::new(self.parse_stat()?);
        Ok(Stat::For {
            init,
            cond,
            update,
            body,
            span: token.span(),
        })
    }

    fn parse_while(&mut self) -> Result<Stat, String> {
        let token = self.advance().expect("checked by caller");
        self.expect_symbol("(")?;
        let cond = self.parse_expr()?;
        self.expect_symbol(")")?;
        let body = Box::new(self.parse_stat()?);
        Ok(Stat::While {
            cond,
            body,
            span: token.span(),
        })
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_assignment()
    }

    /// `name = expr`, `name[i] = expr`, or fall through to comparison
    fn parse_assignment(&mut self) -> Result<Expr, String> {
        let start = self.pos;
        if let Some(token) = self.current()
            && token.kind == TokenKind::Ident
            && !KEYWORDS.contains(&token.text.trim_start_matches('$'))
        {
            let name_token = token.clone();
            self.pos += 1;
            let index = if self.consume_symbol("[") {
                let idx = self.parse_expr()?;
                self.expect_symbol("]")?;
                Some(Box::new(idx))
            } else {
                None
            };
            if self.consume_symbol("=") {
                let value = self.parse_assignment()?;
                let (name, compile_time) = split_sigil(&name_token.text);
                return Ok(Expr::Assign {
                    name,
                    compile_time,
                    index,
                    value: Some(Box::new(value)),
                    span: name_token.span(),
                });
            }
        }
        self.pos = start;
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_additive()?;
        let op = match self.current() {
            Some(t) if t.kind == TokenKind::Symbol => match t.text.as_str() {
                "==" => Some(CmpOp::Eq),
                "!=" => Some(CmpOp::Ne),
                "<" => Some(CmpOp::Lt),
                "<=" => Some(CmpOp::Le),
                ">" => Some(CmpOp::Gt),
                ">=" => Some(CmpOp::Ge),
                _ => None,
            },
            _ => None,
        };
        match op {
            Some(op) => {
                let span = self.advance().expect("operator present").span();
                let rhs = self.parse_additive()?;
                Ok(Expr::Compare {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    span,
                })
            }
            None => Ok(lhs),
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.check_symbol("+") {
                BinOp::Add
            } else if self.check_symbol("-") {
                BinOp::Sub
            } else {
                break;
            };
            let span = self.advance().expect("operator present").span();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.check_symbol("*") {
                BinOp::Mul
            } else if self.check_symbol("/") {
                BinOp::Div
            } else if self.check_symbol("%") {
                BinOp::Rem
            } else {
                break;
            };
            let span = self.advance().expect("operator present").span();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        // Negative literal: `-` directly before a number
        if self.check_symbol("-")
            && self
                .token_at(1)
                .is_some_and(|t| t.kind == TokenKind::Number)
        {
            let minus = self.advance().expect("minus present");
            let number = self.advance().expect("number present");
            let value = parse_wrapping(&number.text).wrapping_neg();
            return Ok(Expr::Int {
                value,
                span: minus.span(),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let token = match self.current() {
            Some(t) => t.clone(),
            None => return Err("Unexpected end of input in expression".to_string()),
        };

        match token.kind {
            TokenKind::Number => {
                self.pos += 1;
                Ok(Expr::Int {
                    value: parse_wrapping(&token.text),
                    span: token.span(),
                })
            }
            TokenKind::Str => {
                self.pos += 1;
                let span = token.span();
                Ok(Expr::Str {
                    value: token.text,
                    span,
                })
            }
            TokenKind::Char => {
                self.pos += 1;
                let value = token.text.parse::<u32>().unwrap_or(0) as u8;
                Ok(Expr::Char {
                    value,
                    span: token.span(),
                })
            }
            TokenKind::Symbol => match token.text.as_str() {
                "[" => {
                    self.pos += 1;
                    let mut elements = Vec::new();
                    if !self.check_symbol("]") {
                        elements.push(self.parse_expr()?);
                        while self.consume_symbol(",") {
                            elements.push(self.parse_expr()?);
                        }
                    }
                    self.expect_symbol("]")?;
                    Ok(Expr::Array {
                        elements,
                        span: token.span(),
                    })
                }
                "(" => {
                    // Cast if the parentheses hold exactly a type keyword
                    if let Some(next) = self.token_at(1)
                        && next.kind == TokenKind::Ident
                        && Type::from_keyword(&next.text).is_some()
                        && self
                            .token_at(2)
                            .is_some_and(|t| t.kind == TokenKind::Symbol && t.text == ")")
                    {
                        self.pos += 1;
                        let ty_token = self.advance().expect("type present");
                        let ty = Type::from_keyword(&ty_token.text).expect("checked above");
                        self.expect_symbol(")")?;
                        let expr = self.parse_unary()?;
                        return Ok(Expr::Cast {
                            ty,
                            expr: Box::new(expr),
                            span: token.span(),
                        });
                    }
                    self.pos += 1;
                    let inner = self.parse_expr()?;
                    self.expect_symbol(")")?;
                    Ok(Expr::Parens {
                        inner: Box::new(inner),
                        span: token.span(),
                    })
                }
                "++" | "--" => {
                    self.pos += 1;
                    let op = if token.text == "++" {
                        IncDecOp::Inc
                    } else {
                        IncDecOp::Dec
                    };
                    let name_token = self.expect_name_or_sigil()?;
                    let (name, compile_time) = split_sigil(&name_token.text);
                    Ok(Expr::IncDec {
                        name,
                        compile_time,
                        op,
                        fixity: Fixity::Pre,
                        span: token.span(),
                    })
                }
                _ => Err(format!(
                    "Unexpected '{}' at line {}, column {}",
                    token.text,
                    token.line + 1,
                    token.column + 1
                )),
            },
            TokenKind::Ident => {
                if KEYWORDS.contains(&token.text.trim_start_matches('$')) {
                    return Err(format!(
                        "Unexpected keyword '{}' at line {}, column {}",
                        token.text,
                        token.line + 1,
                        token.column + 1
                    ));
                }
                self.pos += 1;
                let (name, compile_time) = split_sigil(&token.text);

                // Call
                if !compile_time && self.check_symbol("(") {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !self.check_symbol(")") {
                        args.push(self.parse_expr()?);
                        while self.consume_symbol(",") {
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect_symbol(")")?;
                    return Ok(Expr::Call {
                        name,
                        args,
                        span: token.span(),
                    });
                }

                // Postfix increment / decrement
                if self.check_symbol("++") || self.check_symbol("--") {
                    let op_token = self.advance().expect("operator present");
                    let op = if op_token.text == "++" {
                        IncDecOp::Inc
                    } else {
                        IncDecOp::Dec
                    };
                    return Ok(Expr::IncDec {
                        name,
                        compile_time,
                        op,
                        fixity: Fixity::Post,
                        span: token.span(),
                    });
                }

                // Name reference, possibly indexed
                let index = if self.consume_symbol("[") {
                    let idx = self.parse_expr()?;
                    self.expect_symbol("]")?;
                    Some(Box::new(idx))
                } else {
                    None
                };
                Ok(Expr::Assign {
                    name,
                    compile_time,
                    index,
                    value: None,
                    span: token.span(),
                })
            }
            TokenKind::Command => Err(format!(
                "Unexpected game command at line {}, column {}",
                token.line + 1,
                token.column + 1
            )),
        }
    }
}

fn split_sigil(text: &str) -> (String, bool) {
    match text.strip_prefix('$') {
        Some(rest) => (rest.to_string(), true),
        None => (text.to_string(), false),
    }
}

/// Parse a decimal literal with 32-bit wrap-around
fn parse_wrapping(text: &str) -> i32 {
    let mut value = 0i32;
    for c in text.bytes() {
        value = value.wrapping_mul(10).wrapping_add((c - b'0') as i32);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        Parser::new(source).unwrap().parse().unwrap()
    }

    #[test]
    fn test_tokenize_symbols_and_positions() {
        let tokens = tokenize("x == 3;\ny++;").unwrap();
        assert_eq!(tokens[1].text, "==");
        assert_eq!(tokens[1].kind, TokenKind::Symbol);
        assert_eq!(tokens[4].text, "y");
        assert_eq!(tokens[4].line, 1);
        assert_eq!(tokens[4].column, 0);
    }

    #[test]
    fn test_tokenize_command_line() {
        let tokens = tokenize("void load() {\n    /say hello world\n}").unwrap();
        let cmd = tokens.iter().find(|t| t.kind == TokenKind::Command).unwrap();
        assert_eq!(cmd.text, "say hello world");
        assert_eq!(cmd.line, 1);
    }

    #[test]
    fn test_tokenize_comment_is_not_command() {
        let tokens = tokenize("// just a note\nint x;").unwrap();
        assert!(tokens.iter().all(|t| t.kind != TokenKind::Command));
        assert_eq!(tokens[0].text, "int");
    }

    #[test]
    fn test_tokenize_unclosed_string() {
        let err = tokenize("\"abc").unwrap_err();
        assert!(err.contains("Unclosed string literal"));
    }

    #[test]
    fn test_parse_function_with_params() {
        let program = parse("int f(int x, char c) { return x; }");
        match &program.stats[0] {
            Stat::Function {
                ret, name, params, ..
            } => {
                assert_eq!(*ret, Some(Type::Int));
                assert_eq!(name, "f");
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].name, "x");
                assert_eq!(params[1].ty, Type::Char);
            }
            other => panic!("expected function, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_declaration_forms() {
        let program = parse("int a, b = 2, xs[] = [1, 2], $n = 3;");
        match &program.stats[0] {
            Stat::VarDecl { ty, decls, .. } => {
                assert_eq!(*ty, Type::Int);
                assert_eq!(decls.len(), 4);
                assert!(decls[0].init.is_none());
                assert!(decls[1].init.is_some());
                assert!(decls[2].array);
                assert!(decls[3].compile_time);
                assert_eq!(decls[3].name, "n");
            }
            other => panic!("expected declaration, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_precedence() {
        let program = parse("void load() { int x = 2 + 3 * 4; }");
        let Stat::Function { body, .. } = &program.stats[0] else {
            panic!("expected function");
        };
        let Stat::Block { stats, .. } = body.as_ref() else {
            panic!("expected block");
        };
        let Stat::VarDecl { decls, .. } = &stats[0] else {
            panic!("expected declaration");
        };
        match decls[0].init.as_ref().unwrap() {
            Expr::Binary { op, rhs, .. } => {
                assert_eq!(*op, BinOp::Add);
                assert!(matches!(rhs.as_ref(), Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_cast_vs_parens() {
        let program = parse("void load() { int x = (int) 'c'; int y = (1 + 2); }");
        let Stat::Function { body, .. } = &program.stats[0] else {
            panic!("expected function");
        };
        let Stat::Block { stats, .. } = body.as_ref() else {
            panic!("expected block");
        };
        let Stat::VarDecl { decls, .. } = &stats[0] else {
            panic!("expected declaration");
        };
        assert!(matches!(
            decls[0].init.as_ref().unwrap(),
            Expr::Cast { ty: Type::Int, .. }
        ));
        let Stat::VarDecl { decls, .. } = &stats[1] else {
            panic!("expected declaration");
        };
        assert!(matches!(decls[0].init.as_ref().unwrap(), Expr::Parens { .. }));
    }

    #[test]
    fn test_parse_for_with_declaration_init() {
        let program = parse("void tick() { for (int i = 0; i < 3; i++) {} }");
        let Stat::Function { body, .. } = &program.stats[0] else {
            panic!("expected function");
        };
        let Stat::Block { stats, .. } = body.as_ref() else {
            panic!("expected block");
        };
        let Stat::For { init, cond, update, .. } = &stats[0] else {
            panic!("expected for");
        };
        assert!(matches!(init, ForInit::Decl(_)));
        assert!(matches!(cond, Expr::Compare { op: CmpOp::Lt, .. }));
        assert!(matches!(
            update,
            Expr::IncDec {
                fixity: Fixity::Post,
                op: IncDecOp::Inc,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_assignment_chain() {
        let program = parse("void load() { a = b = 1; }");
        let Stat::Function { body, .. } = &program.stats[0] else {
            panic!("expected function");
        };
        let Stat::Block { stats, .. } = body.as_ref() else {
            panic!("expected block");
        };
        let Stat::Expr { expr, .. } = &stats[0] else {
            panic!("expected expression statement");
        };
        let Expr::Assign { name, value, .. } = expr else {
            panic!("expected assignment");
        };
        assert_eq!(name, "a");
        assert!(matches!(
            value.as_deref(),
            Some(Expr::Assign { value: Some(_), .. })
        ));
    }

    #[test]
    fn test_parse_indexed_assignment() {
        let program = parse("void load() { xs[i + 1] = 4; }");
        let Stat::Function { body, .. } = &program.stats[0] else {
            panic!("expected function");
        };
        let Stat::Block { stats, .. } = body.as_ref() else {
            panic!("expected block");
        };
        let Stat::Expr { expr, .. } = &stats[0] else {
            panic!("expected expression statement");
        };
        let Expr::Assign { index, value, .. } = expr else {
            panic!("expected assignment");
        };
        assert!(index.is_some());
        assert!(value.is_some());
    }

    #[test]
    fn test_parse_print_statement() {
        let program = parse("void load() { print(\"@a\", \"red\", 1, 'c'); }");
        let Stat::Function { body, .. } = &program.stats[0] else {
            panic!("expected function");
        };
        let Stat::Block { stats, .. } = body.as_ref() else {
            panic!("expected block");
        };
        let Stat::Print { args, .. } = &stats[0] else {
            panic!("expected print");
        };
        assert_eq!(args.len(), 4);
        assert!(matches!(args[0], Expr::Str { .. }));
        assert!(matches!(args[3], Expr::Char { value: 99, .. }));
    }

    #[test]
    fn test_parse_negative_literal() {
        let program = parse("int $n = -5;");
        let Stat::VarDecl { decls, .. } = &program.stats[0] else {
            panic!("expected declaration");
        };
        assert!(matches!(
            decls[0].init.as_ref().unwrap(),
            Expr::Int { value: -5, .. }
        ));
    }

    #[test]
    fn test_parse_error_missing_semicolon() {
        let err = Parser::new("void load() { int x = 1 }")
            .unwrap()
            .parse()
            .unwrap_err();
        assert!(err.contains("Expected ';'"), "got: {}", err);
    }
}
