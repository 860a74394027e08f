pub mod token;

use crate::ast::{
    self, Attribute, AttributeKind, BinaryOp, Block, CaseSelector, Expr, ExprId, ExprKind,
    FloatSuffix, GlobalDecl, Ident, IntSuffix, Literal, Module, Span, Stmt, StmtId, StmtKind,
    SwitchClause, TemplatedIdent, UnaryOp, VarId, Variable, VariableKind,
};
use crate::diagnostic::{Diagnostics, LineIndex};

use self::token::{Token, TokenSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
    /// A virtual token signifying the end of file.
    Eof = 0,

    /// An invalid token which could not be classified.
    InvalidToken,

    Comment,

    Identifier,

    IntegerDecimal,
    IntegerHex,
    FloatDecimal,
    FloatHex,

    KeywordAlias,
    KeywordBreak,
    KeywordCase,
    KeywordConst,
    KeywordConstAssert,
    KeywordContinue,
    KeywordContinuing,
    KeywordDefault,
    KeywordDiagnostic,
    KeywordDiscard,
    KeywordElse,
    KeywordEnable,
    KeywordFalse,
    KeywordFn,
    KeywordFor,
    KeywordIf,
    KeywordLet,
    KeywordLoop,
    KeywordOverride,
    KeywordRequires,
    KeywordReturn,
    KeywordStruct,
    KeywordSwitch,
    KeywordTrue,
    KeywordVar,
    KeywordWhile,

    AtSign,
    ThinArrowRight,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LCurly,
    RCurly,
    Dot,
    Comma,
    Colon,
    SemiColon,

    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Chevron,
    Tilde,

    PlusEqual,
    MinusEqual,
    AsteriskEqual,
    SlashEqual,
    PercentEqual,
    ChevronEqual,
    AmpersandEqual,
    BarEqual,

    PlusPlus,
    MinusMinus,

    Less,
    LessEqual,
    LessLess,
    LessLessEqual,

    Greater,
    GreaterEqual,
    GreaterGreater,
    GreaterGreaterEqual,

    Equal,
    EqualEqual,

    Exclamation,
    ExclamationEqual,

    Ampersand,
    AmpersandAmpersand,

    Bar,
    BarBar,

    /// A `<` opening a template list.
    TemplateListStart,
    /// A `>` closing a template list.
    TemplateListEnd,
}

impl Tag {
    pub const fn token_description(self) -> &'static str {
        match self {
            Tag::Eof => "the end of file",
            Tag::InvalidToken => "an invalid token",
            Tag::Comment => "a comment",
            Tag::Identifier => "an identifier",
            Tag::IntegerDecimal | Tag::IntegerHex => "an integer literal",
            Tag::FloatDecimal | Tag::FloatHex => "a floating point literal",
            Tag::KeywordAlias => "`alias`",
            Tag::KeywordBreak => "`break`",
            Tag::KeywordCase => "`case`",
            Tag::KeywordConst => "`const`",
            Tag::KeywordConstAssert => "`const_assert`",
            Tag::KeywordContinue => "`continue`",
            Tag::KeywordContinuing => "`continuing`",
            Tag::KeywordDefault => "`default`",
            Tag::KeywordDiagnostic => "`diagnostic`",
            Tag::KeywordDiscard => "`discard`",
            Tag::KeywordElse => "`else`",
            Tag::KeywordEnable => "`enable`",
            Tag::KeywordFalse => "`false`",
            Tag::KeywordFn => "`fn`",
            Tag::KeywordFor => "`for`",
            Tag::KeywordIf => "`if`",
            Tag::KeywordLet => "`let`",
            Tag::KeywordLoop => "`loop`",
            Tag::KeywordOverride => "`override`",
            Tag::KeywordRequires => "`requires`",
            Tag::KeywordReturn => "`return`",
            Tag::KeywordStruct => "`struct`",
            Tag::KeywordSwitch => "`switch`",
            Tag::KeywordTrue => "`true`",
            Tag::KeywordVar => "`var`",
            Tag::KeywordWhile => "`while`",
            Tag::AtSign => "`@`",
            Tag::ThinArrowRight => "`->`",
            Tag::LParen => "`(`",
            Tag::RParen => "`)`",
            Tag::LBracket => "`[`",
            Tag::RBracket => "`]`",
            Tag::LCurly => "`{`",
            Tag::RCurly => "`}`",
            Tag::Dot => "`.`",
            Tag::Comma => "`,`",
            Tag::Colon => "`:`",
            Tag::SemiColon => "`;`",
            Tag::Plus => "`+`",
            Tag::Minus => "`-`",
            Tag::Asterisk => "`*`",
            Tag::Slash => "`/`",
            Tag::Percent => "`%`",
            Tag::Chevron => "`^`",
            Tag::Tilde => "`~`",
            Tag::PlusEqual => "`+=`",
            Tag::MinusEqual => "`-=`",
            Tag::AsteriskEqual => "`*=`",
            Tag::SlashEqual => "`/=`",
            Tag::PercentEqual => "`%=`",
            Tag::ChevronEqual => "`^=`",
            Tag::AmpersandEqual => "`&=`",
            Tag::BarEqual => "`|=`",
            Tag::PlusPlus => "`++`",
            Tag::MinusMinus => "`--`",
            Tag::Less => "`<`",
            Tag::LessEqual => "`<=`",
            Tag::LessLess => "`<<`",
            Tag::LessLessEqual => "`<<=`",
            Tag::Greater => "`>`",
            Tag::GreaterEqual => "`>=`",
            Tag::GreaterGreater => "`>>`",
            Tag::GreaterGreaterEqual => "`>>=`",
            Tag::Equal => "`=`",
            Tag::EqualEqual => "`==`",
            Tag::Exclamation => "`!`",
            Tag::ExclamationEqual => "`!=`",
            Tag::Ampersand => "`&`",
            Tag::AmpersandAmpersand => "`&&`",
            Tag::Bar => "`|`",
            Tag::BarBar => "`||`",
            Tag::TemplateListStart => "`<`",
            Tag::TemplateListEnd => "`>`",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    Unexpected { found: Token, expected: Expected },
    Invalid { span: Span, message: String },
}

impl Error {
    pub fn span(&self) -> Span {
        match self {
            Error::Unexpected { found, .. } => Span::new(found.offset, found.end()),
            Error::Invalid { span, .. } => *span,
        }
    }

    pub fn message(&self, source: &str) -> String {
        let (found, expected) = match self {
            Error::Unexpected { found, expected } => (found, expected),
            Error::Invalid { message, .. } => return message.clone(),
        };

        let found = match found.tag {
            Tag::Eof => "the end of file".to_string(),
            _ => {
                let snippet = &source[found.byte_range()];
                let print_safe = snippet.bytes().all(|x| x.is_ascii_graphic() || x == b' ');
                if print_safe {
                    format!("`{snippet}`")
                } else {
                    format!("`{}`", snippet.escape_debug().collect::<String>())
                }
            },
        };

        format!("{}, but found {found}", expected.message())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Expected {
    Token(Tag),
    Attribute,
    Declaration,
    Expression,
    Statement,
    AssignmentOrCall,
}

impl Expected {
    pub fn message(self) -> String {
        match self {
            Expected::Token(token) => format!("expected {}", token.token_description()),
            Expected::Attribute => "expected an attribute".into(),
            Expected::Declaration => "expected a declaration".into(),
            Expected::Expression => "expected an expression".into(),
            Expected::Statement => "expected a statement".into(),
            Expected::AssignmentOrCall => "expected an assignment or a function call".into(),
        }
    }
}

type Result<T, E = Error> = std::result::Result<T, E>;

/// Parses a WGSL module. Parsing stops at the first syntax error.
pub fn parse(source: &str) -> Result<Module, Diagnostics> {
    let lines = LineIndex::new(source);
    let mut parser = Parser::new(source);
    match parser.module() {
        Ok(()) => {
            let mut module = parser.module;
            module.lines = Some(lines);
            Ok(module)
        },
        Err(error) => {
            tracing::debug!(?error, "syntax error");
            let mut diagnostics = Diagnostics::new();
            let location = lines.location(error.span().start);
            diagnostics.error(Some(location), error.message(source));
            Err(diagnostics)
        },
    }
}

struct Parser<'src> {
    source: &'src str,
    tokens: token::Tokenizer<'src>,
    current_token: Token,
    previous_token: Token,
    module: Module,
    fuel: u32,
}

impl<'src> Parser<'src> {
    const MAX_FUEL: u32 = 128;

    fn new(source: &'src str) -> Parser<'src> {
        let mut parser = Parser {
            source,
            tokens: token::Tokenizer::new(source),
            current_token: Token::EOF,
            previous_token: Token::EOF,
            module: Module::default(),
            fuel: 0,
        };
        parser.advance();
        parser
    }

    fn advance(&mut self) {
        self.fuel = Self::MAX_FUEL;
        self.previous_token = self.current_token;
        self.current_token = loop {
            let token = self.tokens.next();
            if token.tag != Tag::Comment {
                break token;
            }
        };
    }

    fn peek(&mut self) -> Tag {
        assert_ne!(self.fuel, 0, "parser ran out of fuel (got stuck in a loop)");
        self.fuel -= 1;
        self.current_token.tag
    }

    fn at(&mut self, token: Tag) -> bool {
        self.peek() == token
    }

    fn at_any(&mut self, set: TokenSet) -> bool {
        set.contains(self.peek())
    }

    fn consume(&mut self, token: Tag) -> bool {
        if self.at(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Tag) -> Result<Token> {
        if self.at(token) {
            let found = self.current_token;
            self.advance();
            Ok(found)
        } else {
            Err(self.unexpected(Expected::Token(token)))
        }
    }

    fn unexpected(&self, expected: Expected) -> Error {
        Error::Unexpected { found: self.current_token, expected }
    }

    fn start(&self) -> u32 {
        self.current_token.offset
    }

    /// The span from `start` to the end of the last consumed token.
    fn span_from(&self, start: u32) -> Span {
        Span::new(start, self.previous_token.end().max(start))
    }

    fn text(&self, token: Token) -> &'src str {
        &self.source[token.byte_range()]
    }

    fn identifier(&mut self) -> Result<Ident> {
        let token = self.expect(Tag::Identifier)?;
        let symbol = self.module.symbols.intern(self.text(token));
        Ok(Ident { symbol, span: Span::new(token.offset, token.end()) })
    }

    fn expr(&mut self, kind: ExprKind, span: Span) -> ExprId {
        self.module.exprs.insert(Expr { kind, span })
    }

    fn stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        self.module.stmts.insert(Stmt { kind, span })
    }
}

impl Parser<'_> {
    fn module(&mut self) -> Result<()> {
        loop {
            match self.peek() {
                Tag::Eof => break,

                Tag::KeywordEnable => {
                    self.advance();
                    loop {
                        let name = self.identifier()?;
                        self.module.enables.push(name);
                        if !self.consume(Tag::Comma) || self.at(Tag::SemiColon) {
                            break;
                        }
                    }
                    self.expect(Tag::SemiColon)?;
                },

                Tag::KeywordRequires => {
                    self.advance();
                    loop {
                        self.identifier()?;
                        if !self.consume(Tag::Comma) || self.at(Tag::SemiColon) {
                            break;
                        }
                    }
                    self.expect(Tag::SemiColon)?;
                },

                Tag::KeywordDiagnostic => {
                    self.advance();
                    self.diagnostic_control()?;
                    self.expect(Tag::SemiColon)?;
                },

                Tag::SemiColon => self.advance(),

                Tag::KeywordAlias => {
                    let start = self.start();
                    self.advance();
                    let name = self.identifier()?;
                    self.expect(Tag::Equal)?;
                    let ty = self.type_specifier()?;
                    self.expect(Tag::SemiColon)?;
                    let span = self.span_from(start);
                    let alias = self.module.aliases.insert(ast::Alias { name, ty, span });
                    self.module.decls.push(GlobalDecl::Alias(alias));
                },

                Tag::KeywordConstAssert => {
                    let stmt = self.const_assert()?;
                    self.module.decls.push(GlobalDecl::ConstAssert(stmt));
                },

                Tag::KeywordStruct => self.struct_declaration()?,

                _ => {
                    let start = self.start();
                    let attributes = self.attributes()?;

                    match self.peek() {
                        tag @ (Tag::KeywordConst | Tag::KeywordOverride | Tag::KeywordVar) => {
                            let var = self.variable_declaration(start, tag, attributes)?;
                            self.module.decls.push(GlobalDecl::Var(var));
                        },
                        Tag::KeywordFn => self.function(start, attributes)?,
                        _ => return Err(self.unexpected(Expected::Declaration)),
                    }
                },
            }
        }
        Ok(())
    }

    /// `(severity, rule)` of a `diagnostic` directive or attribute. The content is not used.
    fn diagnostic_control(&mut self) -> Result<()> {
        self.expect(Tag::LParen)?;
        while self.at(Tag::Identifier) {
            self.identifier()?;
            if self.consume(Tag::Dot) {
                self.identifier()?;
            }
            if !self.at(Tag::RParen) {
                self.expect(Tag::Comma)?;
            }
        }
        self.expect(Tag::RParen)?;
        Ok(())
    }

    fn struct_declaration(&mut self) -> Result<()> {
        let start = self.start();
        self.expect(Tag::KeywordStruct)?;
        let name = self.identifier()?;

        let mut members = Vec::new();
        self.expect(Tag::LCurly)?;
        while self.at(Tag::Identifier) || self.at(Tag::AtSign) {
            let member_start = self.start();
            let attributes = self.attributes()?;
            let name = self.identifier()?;
            self.expect(Tag::Colon)?;
            let ty = self.type_specifier()?;
            let span = self.span_from(member_start);
            if !self.at(Tag::RCurly) {
                self.expect(Tag::Comma)?;
            }
            members.push(ast::StructMember { name, ty, attributes, span });
        }
        self.expect(Tag::RCurly)?;

        let span = self.span_from(start);
        let strukt = self.module.structs.insert(ast::Struct { name, members, span });
        self.module.decls.push(GlobalDecl::Struct(strukt));
        Ok(())
    }

    fn function(&mut self, start: u32, attributes: Vec<Attribute>) -> Result<()> {
        self.expect(Tag::KeywordFn)?;
        let name = self.identifier()?;

        let mut params = Vec::new();
        self.expect(Tag::LParen)?;
        while self.at(Tag::Identifier) || self.at(Tag::AtSign) {
            let param_start = self.start();
            let attributes = self.attributes()?;
            let name = self.identifier()?;
            self.expect(Tag::Colon)?;
            let ty = self.type_specifier()?;
            let span = self.span_from(param_start);
            params.push(self.module.vars.insert(Variable {
                kind: VariableKind::Parameter,
                name,
                template: Vec::new(),
                ty: Some(ty),
                initializer: None,
                attributes,
                span,
            }));
            if !self.at(Tag::RParen) {
                self.expect(Tag::Comma)?;
            }
        }
        self.expect(Tag::RParen)?;

        let mut return_type = None;
        let mut return_attributes = Vec::new();
        if self.consume(Tag::ThinArrowRight) {
            return_attributes = self.attributes()?;
            return_type = Some(self.type_specifier()?);
        }

        let body = self.block()?;
        let span = self.span_from(start);
        let func = self.module.functions.insert(ast::Function {
            name,
            attributes,
            params,
            return_type,
            return_attributes,
            body,
            span,
        });
        self.module.decls.push(GlobalDecl::Function(func));
        Ok(())
    }

    fn const_assert(&mut self) -> Result<StmtId> {
        let start = self.start();
        self.expect(Tag::KeywordConstAssert)?;
        let condition = self.expression()?;
        self.expect(Tag::SemiColon)?;
        Ok(self.stmt(StmtKind::ConstAssert(condition), self.span_from(start)))
    }

    /// Parses `var`, `let`, `const` and `override` declarations, including the trailing semicolon.
    fn variable_declaration(
        &mut self,
        start: u32,
        tag: Tag,
        attributes: Vec<Attribute>,
    ) -> Result<VarId> {
        self.expect(tag)?;

        let kind = match tag {
            Tag::KeywordVar => VariableKind::Var,
            Tag::KeywordLet => VariableKind::Let,
            Tag::KeywordConst => VariableKind::Const,
            Tag::KeywordOverride => VariableKind::Override,
            _ => unreachable!("not a variable declaration: {tag:?}"),
        };

        let mut template = Vec::new();
        if kind == VariableKind::Var && self.at(Tag::TemplateListStart) {
            template = self.template_list()?;
        }

        let name = self.identifier()?;
        let ty = if self.consume(Tag::Colon) { Some(self.type_specifier()?) } else { None };
        let initializer = if self.consume(Tag::Equal) { Some(self.expression()?) } else { None };
        self.expect(Tag::SemiColon)?;

        let span = self.span_from(start);
        Ok(self.module.vars.insert(Variable {
            kind,
            name,
            template,
            ty,
            initializer,
            attributes,
            span,
        }))
    }

    fn attributes(&mut self) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::new();
        while self.at(Tag::AtSign) {
            let start = self.start();
            self.advance();

            // `const` is a keyword, but also the name of an attribute
            let name = if self.at(Tag::KeywordConst) {
                self.advance();
                "const"
            } else if self.at(Tag::KeywordDiagnostic) {
                self.advance();
                self.diagnostic_control()?;
                continue;
            } else if self.at(Tag::Identifier) {
                let token = self.current_token;
                self.advance();
                self.text(token)
            } else {
                return Err(self.unexpected(Expected::Attribute));
            };

            let Some(kind) = AttributeKind::from_name(name) else {
                return Err(Error::Invalid {
                    span: self.span_from(start),
                    message: format!("expected an attribute, but found `{name}`"),
                });
            };

            let args = if self.at(Tag::LParen) { self.argument_list()? } else { Vec::new() };
            attributes.push(Attribute { kind, args, span: self.span_from(start) });
        }
        Ok(attributes)
    }

    fn argument_list(&mut self) -> Result<Vec<ExprId>> {
        self.expect(Tag::LParen)?;
        let mut args = Vec::new();
        while !self.at(Tag::RParen) {
            args.push(self.expression()?);
            if !self.at(Tag::RParen) {
                self.expect(Tag::Comma)?;
            }
        }
        self.expect(Tag::RParen)?;
        Ok(args)
    }

    fn template_list(&mut self) -> Result<Vec<ExprId>> {
        self.expect(Tag::TemplateListStart)?;
        let mut args = Vec::new();
        while !self.at(Tag::TemplateListEnd) {
            args.push(self.expression()?);
            if !self.at(Tag::TemplateListEnd) {
                self.expect(Tag::Comma)?;
            }
        }
        self.expect(Tag::TemplateListEnd)?;
        Ok(args)
    }

    fn type_specifier(&mut self) -> Result<ExprId> {
        let start = self.start();
        let ident = self.templated_identifier()?;
        Ok(self.expr(ExprKind::Ident(ident), self.span_from(start)))
    }

    fn templated_identifier(&mut self) -> Result<TemplatedIdent> {
        let ident = self.identifier()?;
        let template =
            if self.at(Tag::TemplateListStart) { self.template_list()? } else { Vec::new() };
        Ok(TemplatedIdent { ident, template })
    }
}

const STATEMENT_FIRST: TokenSet = EXPRESSION_FIRST.with_many(&[
    Tag::KeywordReturn,
    Tag::KeywordConstAssert,
    Tag::KeywordDiscard,
    Tag::KeywordBreak,
    Tag::KeywordContinue,
    Tag::KeywordLet,
    Tag::KeywordVar,
    Tag::KeywordConst,
    Tag::KeywordIf,
    Tag::KeywordFor,
    Tag::KeywordLoop,
    Tag::KeywordWhile,
    Tag::KeywordSwitch,
    Tag::SemiColon,
    Tag::LCurly,
    Tag::AtSign,
]);

pub const ASSIGNMENT_OPS: TokenSet = TokenSet::new(&[
    Tag::Equal,
    Tag::LessLessEqual,
    Tag::GreaterGreaterEqual,
    Tag::PlusEqual,
    Tag::MinusEqual,
    Tag::AsteriskEqual,
    Tag::SlashEqual,
    Tag::PercentEqual,
    Tag::ChevronEqual,
    Tag::AmpersandEqual,
    Tag::BarEqual,
]);

impl Parser<'_> {
    fn block(&mut self) -> Result<Block> {
        let start = self.start();
        self.expect(Tag::LCurly)?;
        let mut stmts = Vec::new();
        while !self.at(Tag::RCurly) {
            if !self.at_any(STATEMENT_FIRST) {
                return Err(self.unexpected(Expected::Statement));
            }
            if let Some(stmt) = self.statement()? {
                stmts.push(stmt);
            }
        }
        self.expect(Tag::RCurly)?;
        Ok(Block { stmts, span: self.span_from(start) })
    }

    /// Returns `None` for empty statements.
    fn statement(&mut self) -> Result<Option<StmtId>> {
        let start = self.start();
        let kind = match self.peek() {
            Tag::SemiColon => {
                self.advance();
                return Ok(None);
            },

            Tag::KeywordReturn => {
                self.advance();
                let value = if self.at(Tag::SemiColon) { None } else { Some(self.expression()?) };
                self.expect(Tag::SemiColon)?;
                StmtKind::Return(value)
            },

            Tag::KeywordConstAssert => return self.const_assert().map(Some),

            Tag::KeywordDiscard => {
                self.advance();
                self.expect(Tag::SemiColon)?;
                StmtKind::Discard
            },

            Tag::KeywordBreak => {
                self.advance();
                let kind = if self.consume(Tag::KeywordIf) {
                    StmtKind::BreakIf(self.expression()?)
                } else {
                    StmtKind::Break
                };
                self.expect(Tag::SemiColon)?;
                kind
            },

            Tag::KeywordContinue => {
                self.advance();
                self.expect(Tag::SemiColon)?;
                StmtKind::Continue
            },

            tag @ (Tag::KeywordLet | Tag::KeywordConst | Tag::KeywordVar) => {
                StmtKind::Decl(self.variable_declaration(start, tag, Vec::new())?)
            },

            _ if self.at_any(EXPRESSION_FIRST) => return self.statement_expression(true).map(Some),

            _ => {
                // attributes on compound statements do not affect semantics
                self.attributes()?;
                match self.peek() {
                    Tag::LCurly => StmtKind::Block(self.block()?),
                    Tag::KeywordIf => return self.if_statement().map(Some),
                    Tag::KeywordLoop => self.loop_statement()?,
                    Tag::KeywordFor => self.for_statement()?,
                    Tag::KeywordWhile => {
                        self.advance();
                        let condition = self.expression()?;
                        let body = self.block()?;
                        StmtKind::While { condition, body }
                    },
                    Tag::KeywordSwitch => self.switch_statement()?,
                    _ => return Err(self.unexpected(Expected::Statement)),
                }
            },
        };

        Ok(Some(self.stmt(kind, self.span_from(start))))
    }

    fn if_statement(&mut self) -> Result<StmtId> {
        let start = self.start();
        self.expect(Tag::KeywordIf)?;
        let condition = self.expression()?;
        let accept = self.block()?;

        let mut reject = None;
        if self.consume(Tag::KeywordElse) {
            if self.at(Tag::KeywordIf) {
                reject = Some(self.if_statement()?);
            } else {
                let else_start = self.start();
                let block = self.block()?;
                reject = Some(self.stmt(StmtKind::Block(block), self.span_from(else_start)));
            }
        }

        Ok(self.stmt(StmtKind::If { condition, accept, reject }, self.span_from(start)))
    }

    fn loop_statement(&mut self) -> Result<StmtKind> {
        self.expect(Tag::KeywordLoop)?;
        self.attributes()?;

        let body_start = self.start();
        self.expect(Tag::LCurly)?;
        let mut stmts = Vec::new();
        let mut continuing = None;
        while !self.at(Tag::RCurly) {
            if self.consume(Tag::KeywordContinuing) {
                self.attributes()?;
                continuing = Some(self.block()?);
                break;
            }
            if let Some(stmt) = self.statement()? {
                stmts.push(stmt);
            }
        }
        self.expect(Tag::RCurly)?;

        let body = Block { stmts, span: self.span_from(body_start) };
        Ok(StmtKind::Loop { body, continuing })
    }

    fn for_statement(&mut self) -> Result<StmtKind> {
        self.expect(Tag::KeywordFor)?;
        self.expect(Tag::LParen)?;

        let init_start = self.start();
        let init = match self.peek() {
            tag @ (Tag::KeywordLet | Tag::KeywordConst | Tag::KeywordVar) => {
                let var = self.variable_declaration(init_start, tag, Vec::new())?;
                Some(self.stmt(StmtKind::Decl(var), self.span_from(init_start)))
            },
            Tag::SemiColon => {
                self.advance();
                None
            },
            _ => Some(self.statement_expression(true)?),
        };

        let condition = if self.at(Tag::SemiColon) { None } else { Some(self.expression()?) };
        self.expect(Tag::SemiColon)?;

        let update =
            if self.at(Tag::RParen) { None } else { Some(self.statement_expression(false)?) };
        self.expect(Tag::RParen)?;

        let body = self.block()?;
        Ok(StmtKind::For { init, condition, update, body })
    }

    fn switch_statement(&mut self) -> Result<StmtKind> {
        self.expect(Tag::KeywordSwitch)?;
        let selector = self.expression()?;
        self.attributes()?;

        const CASE_FOLLOWS: TokenSet = TokenSet::new(&[Tag::Colon, Tag::LCurly, Tag::AtSign]);

        let mut clauses = Vec::new();
        self.expect(Tag::LCurly)?;
        while self.at(Tag::KeywordCase) || self.at(Tag::KeywordDefault) {
            let start = self.start();
            let mut selectors = Vec::new();

            if self.consume(Tag::KeywordCase) {
                loop {
                    if self.at(Tag::KeywordDefault) {
                        let token = self.current_token;
                        self.advance();
                        selectors.push(CaseSelector::Default(Span::new(token.offset, token.end())));
                    } else {
                        selectors.push(CaseSelector::Expr(self.expression()?));
                    }
                    if self.at_any(CASE_FOLLOWS) {
                        break;
                    }
                    self.expect(Tag::Comma)?;
                    if self.at_any(CASE_FOLLOWS) {
                        break;
                    }
                }
            } else {
                let token = self.expect(Tag::KeywordDefault)?;
                selectors.push(CaseSelector::Default(Span::new(token.offset, token.end())));
            }

            self.consume(Tag::Colon);
            self.attributes()?;
            let body = self.block()?;
            clauses.push(SwitchClause { selectors, body, span: self.span_from(start) });
        }
        self.expect(Tag::RCurly)?;

        Ok(StmtKind::Switch { selector, clauses })
    }

    /// Assignments, increments, decrements and function calls.
    fn statement_expression(&mut self, semi: bool) -> Result<StmtId> {
        let start = self.start();
        let lhs = if self.at(Tag::Identifier) && self.text(self.current_token) == "_" {
            self.advance();
            self.expr(ExprKind::Phony, self.span_from(start))
        } else {
            self.expression()?
        };

        let kind = match self.peek() {
            Tag::PlusPlus => {
                self.advance();
                StmtKind::Increment(lhs)
            },
            Tag::MinusMinus => {
                self.advance();
                StmtKind::Decrement(lhs)
            },
            tag if ASSIGNMENT_OPS.contains(tag) => {
                self.advance();
                let op = match tag {
                    Tag::Equal => None,
                    Tag::PlusEqual => Some(BinaryOp::Add),
                    Tag::MinusEqual => Some(BinaryOp::Subtract),
                    Tag::AsteriskEqual => Some(BinaryOp::Multiply),
                    Tag::SlashEqual => Some(BinaryOp::Divide),
                    Tag::PercentEqual => Some(BinaryOp::Modulo),
                    Tag::AmpersandEqual => Some(BinaryOp::And),
                    Tag::BarEqual => Some(BinaryOp::Or),
                    Tag::ChevronEqual => Some(BinaryOp::Xor),
                    Tag::LessLessEqual => Some(BinaryOp::ShiftLeft),
                    Tag::GreaterGreaterEqual => Some(BinaryOp::ShiftRight),
                    _ => unreachable!("not an assignment operator: {tag:?}"),
                };
                let rhs = self.expression()?;
                StmtKind::Assign { lhs, op, rhs }
            },
            _ if matches!(self.module.exprs[lhs].kind, ExprKind::Call { .. }) => StmtKind::Call(lhs),
            _ => return Err(self.unexpected(Expected::AssignmentOrCall)),
        };

        if semi {
            self.expect(Tag::SemiColon)?;
        }

        Ok(self.stmt(kind, self.span_from(start)))
    }
}

const EXPRESSION_PRIMARY_FIRST: TokenSet = TokenSet::new(&[
    Tag::Identifier,
    Tag::IntegerDecimal,
    Tag::IntegerHex,
    Tag::FloatDecimal,
    Tag::FloatHex,
    Tag::LParen,
    Tag::KeywordTrue,
    Tag::KeywordFalse,
]);

const EXPRESSION_UNARY_OPS: TokenSet =
    TokenSet::new(&[Tag::Minus, Tag::Ampersand, Tag::Asterisk, Tag::Exclamation, Tag::Tilde]);

const EXPRESSION_FIRST: TokenSet = EXPRESSION_PRIMARY_FIRST.union(EXPRESSION_UNARY_OPS);

impl Parser<'_> {
    fn expression(&mut self) -> Result<ExprId> {
        if !self.at_any(EXPRESSION_FIRST) {
            return Err(self.unexpected(Expected::Expression));
        }
        self.expression_infix(0)
    }

    fn expression_infix(&mut self, left_binding_power: u8) -> Result<ExprId> {
        // higher binding power means it binds tighter. Multiplication binds tighter than addition.
        fn binding_power(op: Tag) -> Option<(u8, BinaryOp)> {
            Some(match op {
                Tag::Asterisk => (7, BinaryOp::Multiply),
                Tag::Slash => (7, BinaryOp::Divide),
                Tag::Percent => (7, BinaryOp::Modulo),

                Tag::LessLess => (6, BinaryOp::ShiftLeft),
                Tag::GreaterGreater => (6, BinaryOp::ShiftRight),

                Tag::Chevron => (5, BinaryOp::Xor),
                Tag::Ampersand => (5, BinaryOp::And),
                Tag::Bar => (5, BinaryOp::Or),

                Tag::Plus => (4, BinaryOp::Add),
                Tag::Minus => (4, BinaryOp::Subtract),

                Tag::Less => (3, BinaryOp::Less),
                Tag::LessEqual => (3, BinaryOp::LessEqual),
                Tag::Greater => (3, BinaryOp::Greater),
                Tag::GreaterEqual => (3, BinaryOp::GreaterEqual),
                Tag::EqualEqual => (3, BinaryOp::Equal),
                Tag::ExclamationEqual => (3, BinaryOp::NotEqual),

                Tag::AmpersandAmpersand => (2, BinaryOp::LogicalAnd),

                Tag::BarBar => (1, BinaryOp::LogicalOr),

                _ => return None,
            })
        }

        let start = self.start();
        let mut lhs = self.expression_prefix()?;

        loop {
            let tag = self.peek();
            let Some((right_binding_power, op)) = binding_power(tag) else { break };
            if left_binding_power >= right_binding_power {
                break;
            }
            self.advance();
            let rhs = self.expression_infix(right_binding_power)?;
            lhs = self.expr(ExprKind::Binary { op, lhs, rhs }, self.span_from(start));
        }

        Ok(lhs)
    }

    fn expression_prefix(&mut self) -> Result<ExprId> {
        let start = self.start();
        let op = match self.peek() {
            Tag::Minus => UnaryOp::Negate,
            Tag::Exclamation => UnaryOp::Not,
            Tag::Tilde => UnaryOp::Complement,
            Tag::Ampersand => UnaryOp::AddressOf,
            Tag::Asterisk => UnaryOp::Indirection,
            _ => return self.expression_suffix(),
        };
        self.advance();
        let operand = self.expression_prefix()?;
        Ok(self.expr(ExprKind::Unary { op, operand }, self.span_from(start)))
    }

    fn expression_suffix(&mut self) -> Result<ExprId> {
        let start = self.start();
        let mut base = self.expression_primary()?;

        loop {
            match self.peek() {
                Tag::Dot => {
                    self.advance();
                    let member = self.identifier()?;
                    base = self.expr(ExprKind::Member { base, member }, self.span_from(start));
                },
                Tag::LBracket => {
                    self.advance();
                    let index = self.expression()?;
                    self.expect(Tag::RBracket)?;
                    base = self.expr(ExprKind::Index { base, index }, self.span_from(start));
                },
                _ => break,
            }
        }

        Ok(base)
    }

    fn expression_primary(&mut self) -> Result<ExprId> {
        let start = self.start();
        let token = self.current_token;
        let kind = match self.peek() {
            Tag::Identifier => {
                let callee = self.templated_identifier()?;
                if self.at(Tag::LParen) {
                    let args = self.argument_list()?;
                    ExprKind::Call { callee, args }
                } else {
                    ExprKind::Ident(callee)
                }
            },

            Tag::KeywordTrue | Tag::KeywordFalse => {
                self.advance();
                ExprKind::Literal(Literal::Bool(token.tag == Tag::KeywordTrue))
            },

            tag @ (Tag::IntegerDecimal | Tag::IntegerHex | Tag::FloatDecimal | Tag::FloatHex) => {
                self.advance();
                let literal = parse_number(tag, self.text(token)).ok_or_else(|| Error::Invalid {
                    span: Span::new(token.offset, token.end()),
                    message: format!("numeric literal `{}` cannot be represented", self.text(token)),
                })?;
                ExprKind::Literal(literal)
            },

            Tag::LParen => {
                self.advance();
                let inner = self.expression()?;
                self.expect(Tag::RParen)?;
                return Ok(inner);
            },

            token => {
                assert!(!EXPRESSION_PRIMARY_FIRST.contains(token));
                return Err(self.unexpected(Expected::Expression));
            },
        };
        Ok(self.expr(kind, self.span_from(start)))
    }
}

/// Converts the text of a numeric literal into its value, or `None` if it does not fit in the
/// abstract numeric types.
fn parse_number(tag: Tag, text: &str) -> Option<Literal> {
    match tag {
        Tag::IntegerDecimal | Tag::IntegerHex => {
            let (digits, suffix) = match text.as_bytes().last() {
                Some(b'i') => (&text[..text.len() - 1], IntSuffix::I),
                Some(b'u') => (&text[..text.len() - 1], IntSuffix::U),
                _ => (text, IntSuffix::None),
            };
            let value = match tag {
                Tag::IntegerHex => i64::from_str_radix(&digits[2..], 16).ok()?,
                _ => digits.parse::<i64>().ok()?,
            };
            Some(Literal::Int { value, suffix })
        },
        Tag::FloatDecimal => {
            let (digits, suffix) = float_suffix(text);
            let value = digits.parse::<f64>().ok()?;
            value.is_finite().then_some(Literal::Float { value, suffix })
        },
        Tag::FloatHex => {
            // hex digits include `f`, so a suffix is only present after an exponent
            let (digits, suffix) = if text.contains(['p', 'P']) {
                float_suffix(text)
            } else {
                (text, FloatSuffix::None)
            };
            let value = parse_hex_float(&digits[2..])?;
            value.is_finite().then_some(Literal::Float { value, suffix })
        },
        _ => None,
    }
}

fn float_suffix(text: &str) -> (&str, FloatSuffix) {
    match text.as_bytes().last() {
        Some(b'f') => (&text[..text.len() - 1], FloatSuffix::F),
        Some(b'h') => (&text[..text.len() - 1], FloatSuffix::H),
        _ => (text, FloatSuffix::None),
    }
}

/// Parses `[0-9a-fA-F]*(\.[0-9a-fA-F]*)?([pP][+-]?[0-9]+)?`.
fn parse_hex_float(text: &str) -> Option<f64> {
    let (mantissa, exponent) = match text.find(['p', 'P']) {
        Some(index) => (&text[..index], text[index + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    let mut value = 0.0f64;
    for digit in whole.chars() {
        value = value * 16.0 + f64::from(digit.to_digit(16)?);
    }
    let mut scale = 1.0 / 16.0;
    for digit in fraction.chars() {
        value += f64::from(digit.to_digit(16)?) * scale;
        scale /= 16.0;
    }

    Some(value * 2f64.powi(exponent))
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    fn check(source: &str, expected: expect_test::Expect) {
        let text = match parse(source) {
            Ok(module) => format!("{:#?}", module.decls),
            Err(errors) => errors.to_string(),
        };
        expected.assert_eq(&text);
    }

    fn check_error(source: &str, expected: expect_test::Expect) {
        match parse(source) {
            Ok(_) => panic!("expected a syntax error"),
            Err(errors) => expected.assert_eq(&errors.to_string()),
        }
    }

    fn parse_expr(source: &str) -> (Module, ExprId) {
        let module = parse(&format!("const x = {source};")).expect("syntax error");
        let GlobalDecl::Var(var) = module.decls[0] else { panic!("expected a constant") };
        let init = module.vars[var].initializer.expect("missing initializer");
        (module, init)
    }

    fn render(module: &Module, expr: ExprId) -> String {
        match &module.exprs[expr].kind {
            ExprKind::Ident(ident) => module.name(ident.ident).to_string(),
            ExprKind::Literal(Literal::Int { value, .. }) => value.to_string(),
            ExprKind::Literal(Literal::Float { value, .. }) => format!("{value:?}"),
            ExprKind::Literal(Literal::Bool(value)) => value.to_string(),
            ExprKind::Call { callee, args } => {
                let args: Vec<_> = args.iter().map(|arg| render(module, *arg)).collect();
                format!("{}({})", module.name(callee.ident), args.join(", "))
            },
            ExprKind::Index { base, index } => {
                format!("{}[{}]", render(module, *base), render(module, *index))
            },
            ExprKind::Member { base, member } => {
                format!("{}.{}", render(module, *base), module.name(*member))
            },
            ExprKind::Unary { op, operand } => {
                format!("({}{})", op.as_str(), render(module, *operand))
            },
            ExprKind::Binary { op, lhs, rhs } => {
                format!("({} {} {})", render(module, *lhs), op.as_str(), render(module, *rhs))
            },
            ExprKind::Phony => "_".into(),
        }
    }

    fn check_expr(source: &str, expected: expect_test::Expect) {
        let (module, expr) = parse_expr(source);
        expected.assert_eq(&render(&module, expr));
    }

    #[test]
    fn precedence() {
        check_expr("1 + 2 * 3 - 4", expect!["((1 + (2 * 3)) - 4)"]);
        check_expr("a < b && c || !d", expect!["(((a < b) && c) || (!d))"]);
        check_expr("-x.y[2] << 1u", expect!["((-x.y[2]) << 1)"]);
        check_expr("*&p", expect!["(*(&p))"]);
    }

    #[test]
    fn literals() {
        check_expr("0x10", expect!["16"]);
        check_expr("1.5e2f", expect!["150.0"]);
        check_expr("0x1.8p1", expect!["3.0"]);
        check_expr("vec2(1, 2.)", expect!["vec2(1, 2.0)"]);
    }

    #[test]
    fn templated_call() {
        let (module, expr) = parse_expr("array<f32, 2>(1, 2)");
        let ExprKind::Call { callee, args } = &module.exprs[expr].kind else { panic!() };
        assert_eq!(module.name(callee.ident), "array");
        assert_eq!(callee.template.len(), 2);
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn declarations() {
        check(
            indoc::indoc! {r#"
                enable f16;
                alias T = vec4<f32>;
                struct S { @align(16) a: f32, b: T }
                @group(0) @binding(1) var<storage, read_write> buffer: S;
                const c = 1;
                override o: u32;
                const_assert c == 1;
                @fragment fn main(@location(0) x: f32) -> @location(0) vec4<f32> {
                    return vec4(x);
                }
            "#},
            expect![[r#"
                [
                    Alias(
                        #0,
                    ),
                    Struct(
                        #0,
                    ),
                    Var(
                        #0,
                    ),
                    Var(
                        #1,
                    ),
                    Var(
                        #2,
                    ),
                    ConstAssert(
                        #0,
                    ),
                    Function(
                        #0,
                    ),
                ]"#]],
        );
    }

    #[test]
    fn statements() {
        let module = parse(indoc::indoc! {r#"
            fn main() {
                var i = 0;
                for (var j = 0; j < 4; j++) { i += j; }
                for (;;) { break; }
                loop {
                    if i > 10 { break; } else if i < 0 { return; } else { i--; }
                    continuing { break if i == 3; }
                }
                while i != 0 { i = i - 1; }
                switch i { case 1, 2: { } case default { } }
                _ = i;
                discard;
            }
        "#})
        .expect("syntax error");
        let GlobalDecl::Function(main) = module.decls[0] else { panic!() };
        let kinds: Vec<_> = module.functions[main]
            .body
            .stmts
            .iter()
            .map(|stmt| match &module.stmts[*stmt].kind {
                StmtKind::Decl(_) => "decl",
                StmtKind::For { condition: Some(_), .. } => "for",
                StmtKind::For { condition: None, .. } => "for(;;)",
                StmtKind::Loop { continuing: Some(_), .. } => "loop+continuing",
                StmtKind::While { .. } => "while",
                StmtKind::Switch { clauses, .. } if clauses.len() == 2 => "switch",
                StmtKind::Assign { lhs, .. }
                    if module.exprs[*lhs].kind == ExprKind::Phony =>
                {
                    "phony"
                },
                StmtKind::Discard => "discard",
                other => panic!("unexpected statement {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            ["decl", "for", "for(;;)", "loop+continuing", "while", "switch", "phony", "discard"]
        );
    }

    #[test]
    fn error_missing_semicolon() {
        check_error(
            indoc::indoc! {r#"
                fn main() {
                    let x = 1
                }
            "#},
            expect!["3:1 error: expected `;`, but found `}`"],
        );
    }

    #[test]
    fn error_module_scope_let() {
        check_error("let x = 1;", expect!["1:1 error: expected a declaration, but found `let`"]);
    }

    #[test]
    fn error_expression_statement() {
        check_error(
            "fn f() { 1 + 2; }",
            expect!["1:15 error: expected an assignment or a function call, but found `;`"],
        );
    }

    #[test]
    fn error_integer_overflow() {
        check_error(
            "const x = 9223372036854775808;",
            expect!["1:11 error: numeric literal `9223372036854775808` cannot be represented"],
        );
    }
}
