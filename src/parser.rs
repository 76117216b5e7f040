//! Parser for Datascript.
//!
//! This module provides a recursive-descent parser that transforms a stream
//! of tokens into an Abstract Syntax Tree (AST). One token of lookahead is
//! buffered; `eat`/`expect` consume and validate the current token, and
//! binary-expression precedence is handled by a single precedence-climbing
//! loop consulting [`crate::pratt`].
//!
//! # Example
//!
//! ```rust
//! use datascript::parser::Parser;
//!
//! let mut parser = Parser::new("declare x = 2 + 3 * 4;").unwrap();
//! let program = parser.parse_program().unwrap();
//! ```

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::pratt::{infix_binding_power, prefix_binding_power};

/// The parser for Datascript source text.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    peeked: Option<Token>,
}

impl<'a> Parser<'a> {
    /// Creates a new parser for the given source text.
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            previous: Token::default(),
            peeked: None,
        })
    }

    /// Parses the full source as a top-level program.
    pub fn parse_program(&mut self) -> Result<Stmt, ParseError> {
        let mut body = Vec::new();
        while self.current.kind != TokenKind::Eof {
            body.push(self.parse_statement()?);
        }
        Ok(Stmt::Program { body })
    }

    // ----------------------------------------------------------------
    // Token plumbing
    // ----------------------------------------------------------------

    fn advance(&mut self) -> Result<(), ParseError> {
        let next = match self.peeked.take() {
            Some(t) => t,
            None => self.lexer.next_token()?,
        };
        self.previous = std::mem::replace(&mut self.current, next);
        Ok(())
    }

    fn peek(&mut self) -> Result<&Token, ParseError> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap())
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Result<bool, ParseError> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token, ParseError> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(ParseError::UnexpectedToken {
                expected: message.to_string(),
                found: self.current.kind,
                lexeme: self.current.lexeme.clone(),
                span: self.current.span,
            })
        }
    }

    fn expect_identifier(&mut self) -> Result<(String, Span), ParseError> {
        let tok = self.expect(TokenKind::Identifier, "identifier")?;
        Ok((tok.lexeme, tok.span))
    }

    // ----------------------------------------------------------------
    // Statements
    // ----------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        match self.current.kind {
            TokenKind::Declare => self.parse_var_declaration(),
            TokenKind::Func => self.parse_function_declaration(),
            TokenKind::Class | TokenKind::Schema => self.parse_class_declaration(),
            TokenKind::If => self.parse_if_statement(),
            TokenKind::While => self.parse_while_statement(),
            TokenKind::Return => self.parse_return_statement(),
            TokenKind::Break => {
                let span = self.current.span;
                self.advance()?;
                self.eat(TokenKind::Semicolon)?;
                Ok(Stmt::BreakStatement { span })
            }
            TokenKind::Continue => {
                let span = self.current.span;
                self.advance()?;
                self.eat(TokenKind::Semicolon)?;
                Ok(Stmt::ContinueStatement { span })
            }
            TokenKind::Try => self.parse_try_statement(),
            TokenKind::Throw => self.parse_throw_statement(),
            TokenKind::Import => self.parse_import_statement(),
            TokenKind::Export => self.parse_export_statement(),
            TokenKind::Database => self.parse_database_statement(),
            TokenKind::Collection => self.parse_collection_statement(),
            TokenKind::Use => self.parse_use_collection_statement(),
            TokenKind::Using => self.parse_using_statement(),
            _ => self.parse_expr_statement(),
        }
    }

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(body)
    }

    fn parse_var_declaration(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance()?; // declare
        let is_const = self.eat(TokenKind::Const)?;
        let (name, _) = self.expect_identifier()?;
        let initializer = if self.eat(TokenKind::Eq)? {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        if is_const && initializer.is_none() {
            return Err(ParseError::ConstWithoutInitializer { name, span: start });
        }
        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::VarDeclaration {
            name,
            is_const,
            initializer,
            span: start,
        })
    }

    fn parse_type_annotation(&mut self) -> Result<TypeAnnotation, ParseError> {
        let base_tok = self.current.clone();
        let base = if self.check(TokenKind::Identifier) {
            self.advance()?;
            base_tok.lexeme
        } else {
            // Allow a handful of keywords to double as base type names
            // (e.g. a field named `default: string`). Any identifier-like
            // keyword lexeme is accepted verbatim.
            self.advance()?;
            base_tok.lexeme
        };
        let mut array_depth = 0;
        while self.check(TokenKind::LBracket) {
            self.advance()?;
            self.expect(TokenKind::RBracket, "']'")?;
            array_depth += 1;
        }
        Ok(TypeAnnotation {
            base,
            array_depth,
            span: base_tok.span,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            let (name, span) = self.expect_identifier()?;
            let annotation = if self.eat(TokenKind::Colon)? {
                Some(self.parse_type_annotation()?)
            } else {
                None
            };
            let default = if self.eat(TokenKind::Eq)? {
                Some(Box::new(self.parse_expression()?))
            } else {
                None
            };
            params.push(Param {
                name,
                annotation,
                default,
                span,
            });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        Ok(params)
    }

    fn parse_function_declaration(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // func
        let (name, _) = self.expect_identifier()?;
        let params = self.parse_params()?;
        let body = self.parse_block()?;
        Ok(Stmt::FunctionDeclaration {
            name,
            params,
            body,
            span,
        })
    }

    fn parse_class_declaration(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // class | schema
        let (name, _) = self.expect_identifier()?;

        let base = if self.eat(TokenKind::Extends)? {
            Some(self.expect_identifier()?.0)
        } else {
            None
        };

        let constructor_params = if self.eat(TokenKind::Create)? {
            Some(self.parse_params()?)
        } else {
            None
        };

        self.expect(TokenKind::LBrace, "'{'")?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            members.push(self.parse_class_member()?);
        }
        self.expect(TokenKind::RBrace, "'}'")?;

        Ok(Stmt::ClassDeclaration {
            name,
            base,
            constructor_params,
            members,
            span,
        })
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, ParseError> {
        let span = self.current.span;
        let forced_required = if self.eat(TokenKind::Required)? {
            Some(true)
        } else if self.eat(TokenKind::Optional)? {
            Some(false)
        } else {
            None
        };

        let (name, _) = self.expect_identifier()?;

        if self.check(TokenKind::LParen) {
            let params = self.parse_params()?;
            let body = self.parse_block()?;
            return Ok(ClassMember::Method(MethodDecl {
                name,
                params,
                body,
                span,
            }));
        }

        let annotation = if self.eat(TokenKind::Colon)? {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let initializer = if self.eat(TokenKind::Eq)? {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;

        let required = forced_required.unwrap_or(initializer.is_none());

        Ok(ClassMember::Field(FieldDecl {
            name,
            annotation,
            required,
            initializer,
            span,
        }))
    }

    fn parse_if_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // if
        self.expect(TokenKind::LParen, "'('")?;
        let condition = Box::new(self.parse_expression()?);
        self.expect(TokenKind::RParen, "')'")?;
        let then_branch = self.parse_block()?;
        let else_branch = if self.eat(TokenKind::Else)? {
            if self.check(TokenKind::If) {
                Some(vec![self.parse_if_statement()?])
            } else {
                Some(self.parse_block()?)
            }
        } else {
            None
        };
        Ok(Stmt::IfStatement {
            condition,
            then_branch,
            else_branch,
            span,
        })
    }

    fn parse_while_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // while
        self.expect(TokenKind::LParen, "'('")?;
        let condition = Box::new(self.parse_expression()?);
        self.expect(TokenKind::RParen, "')'")?;
        let body = self.parse_block()?;
        Ok(Stmt::WhileStatement {
            condition,
            body,
            span,
        })
    }

    fn parse_return_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // return
        let value = if self.check(TokenKind::Semicolon) || self.check(TokenKind::RBrace) {
            None
        } else {
            Some(Box::new(self.parse_expression()?))
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::ReturnStatement { value, span })
    }

    fn parse_try_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // try
        let try_block = self.parse_block()?;
        self.expect(TokenKind::Catch, "'catch'")?;
        let catch_param = if self.eat(TokenKind::LParen)? {
            let (name, _) = self.expect_identifier()?;
            self.expect(TokenKind::RParen, "')'")?;
            Some(name)
        } else {
            None
        };
        let catch_block = self.parse_block()?;
        Ok(Stmt::TryCatchStatement {
            try_block,
            catch_param,
            catch_block,
            span,
        })
    }

    fn parse_throw_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // throw
        let value = Box::new(self.parse_expression()?);
        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::ThrowStatement { value, span })
    }

    fn parse_import_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // import
        let specifier_tok = self.expect(TokenKind::String, "module specifier string")?;
        let specifier = specifier_tok.lexeme;

        let mut namespace_alias = None;
        let mut exposing = Vec::new();
        let mut default_alias = None;

        loop {
            if self.eat(TokenKind::As)? {
                namespace_alias = Some(self.expect_identifier()?.0);
            } else if self.eat(TokenKind::Exposing)? {
                self.expect(TokenKind::LBrace, "'{'")?;
                while !self.check(TokenKind::RBrace) {
                    let (name, nspan) = self.expect_identifier()?;
                    exposing.push(ExposedName { name, span: nspan });
                    if !self.eat(TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(TokenKind::RBrace, "'}'")?;
            } else if self.eat(TokenKind::Default)? {
                default_alias = Some(self.expect_identifier()?.0);
            } else {
                break;
            }
        }

        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::ImportStatement {
            specifier,
            namespace_alias,
            exposing,
            default_alias,
            span,
        })
    }

    fn parse_export_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // export

        if self.eat(TokenKind::Default)? {
            let expr = Box::new(self.parse_expression()?);
            self.eat(TokenKind::Semicolon)?;
            return Ok(Stmt::ExportDeclaration {
                kind: ExportKind::Default(expr),
                span,
            });
        }

        if self.check(TokenKind::LBrace) {
            self.advance()?;
            let mut names = Vec::new();
            while !self.check(TokenKind::RBrace) {
                let (name, nspan) = self.expect_identifier()?;
                names.push(ExposedName { name, span: nspan });
                if !self.eat(TokenKind::Comma)? {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "'}'")?;
            self.eat(TokenKind::Semicolon)?;
            return Ok(Stmt::ExportDeclaration {
                kind: ExportKind::Named(names),
                span,
            });
        }

        let decl = self.parse_statement()?;
        Ok(Stmt::ExportDeclaration {
            kind: ExportKind::Declaration(Box::new(decl)),
            span,
        })
    }

    fn parse_database_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // database
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::Eq, "'='")?;
        let initializer = Box::new(self.parse_expression()?);
        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::DatabaseStatement {
            name,
            initializer,
            span,
        })
    }

    fn parse_collection_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // collection
        let (name, _) = self.expect_identifier()?;
        let initializer = if self.eat(TokenKind::Eq)? {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::CollectionStatement {
            name,
            initializer,
            span,
        })
    }

    fn parse_use_collection_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // use
        self.expect(TokenKind::Collection, "'collection'")?;
        let (name, _) = self.expect_identifier()?;
        let options = if self.eat(TokenKind::With)? {
            Some(Box::new(self.parse_expression()?))
        } else {
            None
        };
        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::UseCollectionStatement {
            name,
            options,
            span,
        })
    }

    fn parse_using_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        self.advance()?; // using
        self.expect(TokenKind::Mongo, "'mongo'")?;
        self.expect(TokenKind::From, "'from'")?;
        let uri = Box::new(self.parse_logical_or()?);

        let mut database = None;
        let mut alias = None;
        let mut options = None;

        loop {
            if self.eat(TokenKind::Database)? {
                database = Some(Box::new(self.parse_logical_or()?));
            } else if self.eat(TokenKind::As)? {
                alias = Some(self.expect_identifier()?.0);
            } else if self.eat(TokenKind::With)? {
                options = Some(Box::new(self.parse_logical_or()?));
            } else {
                break;
            }
        }

        let body = self.parse_block()?;
        Ok(Stmt::UsingStatement {
            uri,
            database,
            alias,
            options,
            body,
            span,
        })
    }

    fn parse_expr_statement(&mut self) -> Result<Stmt, ParseError> {
        let span = self.current.span;
        let expr = Box::new(self.parse_expression()?);
        self.eat(TokenKind::Semicolon)?;
        Ok(Stmt::ExprStatement { expr, span })
    }

    // ----------------------------------------------------------------
    // Expressions
    // ----------------------------------------------------------------

    /// Parses an expression at the lowest precedence (assignment).
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.parse_dsl_layer()?;
        if self.check(TokenKind::Eq) {
            let span = self.current.span;
            self.advance()?;
            let name = match &lhs {
                Expr::Identifier { name, .. } => name.clone(),
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "assignment target (identifier)".to_string(),
                        found: self.previous.kind,
                        lexeme: self.previous.lexeme.clone(),
                        span: lhs.span(),
                    });
                }
            };
            let value = Box::new(self.parse_assignment()?);
            return Ok(Expr::AssignmentExpr { name, value, span });
        }
        Ok(lhs)
    }

    /// The DSL layer: `<- ! !! ? ?? |>` infix, and `target update ... where
    /// ... set ... [with ...]`. Sits between assignment and the ordinary
    /// binary-operator ladder because its operands are full sub-expressions
    /// rather than same-precedence binary terms.
    fn parse_dsl_layer(&mut self) -> Result<Expr, ParseError> {
        let mut target = self.parse_logical_or()?;

        loop {
            let op = match self.current.kind {
                TokenKind::Arrow => MongoOp::Insert,
                TokenKind::Bang => MongoOp::DeleteOne,
                TokenKind::BangBang => MongoOp::DeleteMany,
                TokenKind::Question => MongoOp::FindOne,
                TokenKind::QQ => MongoOp::FindMany,
                TokenKind::Pipe => MongoOp::Aggregate,
                _ => break,
            };
            let span = self.current.span;
            self.advance()?;
            let operand = Box::new(self.parse_logical_or()?);
            target = Expr::MongoOperationExpr {
                collection: Box::new(target),
                op,
                operand,
                span,
            };
        }

        if self.check(TokenKind::Update) {
            let span = self.current.span;
            self.advance()?;
            let many = self.eat(TokenKind::Many)?;
            self.expect(TokenKind::Where, "'where'")?;
            let filter = Box::new(self.parse_dsl_filter()?);
            self.expect(TokenKind::Set, "'set'")?;
            let update = Box::new(self.parse_logical_or()?);
            let options = if self.eat(TokenKind::With)? {
                Some(Box::new(self.parse_logical_or()?))
            } else {
                None
            };
            target = Expr::MongoUpdateExpr {
                target: Box::new(target),
                filter,
                update,
                options,
                many,
                span,
            };
        }

        Ok(target)
    }

    /// The filter clause of an `update` construct: either a `query { ... }`
    /// or any expression evaluating to an object.
    fn parse_dsl_filter(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical_or()
    }

    fn parse_logical_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(0)
    }

    /// Precedence-climbing loop over the ordinary binary operator ladder
    /// (logical or/and, equality, relational, additive, multiplicative),
    /// consulting [`crate::pratt::infix_binding_power`].
    fn parse_binary(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_unary()?;

        loop {
            let Some((left_bp, right_bp)) = infix_binding_power(self.current.kind) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            let op_kind = self.current.kind;
            let span = self.current.span;
            self.advance()?;
            let rhs = self.parse_binary(right_bp)?;
            let op = Self::binary_op(op_kind);
            lhs = Expr::BinaryExpr {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
                span,
            };
        }

        Ok(lhs)
    }

    fn binary_op(kind: TokenKind) -> BinaryOp {
        match kind {
            TokenKind::OrOr => BinaryOp::Or,
            TokenKind::AndAnd => BinaryOp::And,
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::LtEq => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::GtEq => BinaryOp::Ge,
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            other => unreachable!("not a binary operator token: {other:?}"),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if let Some(_bp) = prefix_binding_power(self.current.kind) {
            let span = self.current.span;
            match self.current.kind {
                TokenKind::Await => {
                    self.advance()?;
                    let operand = Box::new(self.parse_unary()?);
                    return Ok(Expr::AwaitExpr { operand, span });
                }
                TokenKind::Bang => {
                    self.advance()?;
                    let operand = Box::new(self.parse_unary()?);
                    return Ok(Expr::UnaryExpr {
                        op: '!',
                        operand,
                        span,
                    });
                }
                TokenKind::Minus => {
                    self.advance()?;
                    let operand = Box::new(self.parse_unary()?);
                    return Ok(Expr::UnaryExpr {
                        op: '-',
                        operand,
                        span,
                    });
                }
                _ => unreachable!(),
            }
        }
        self.parse_call()
    }

    fn parse_call(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;

        loop {
            if self.check(TokenKind::LParen) {
                let span = self.current.span;
                self.advance()?;
                let mut args = Vec::new();
                while !self.check(TokenKind::RParen) {
                    args.push(self.parse_expression()?);
                    if !self.eat(TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(TokenKind::RParen, "')'")?;
                expr = Expr::CallExpr {
                    callee: Box::new(expr),
                    args,
                    span,
                };
            } else if self.check(TokenKind::Dot) {
                let span = self.current.span;
                self.advance()?;
                let (property, _) = self.expect_identifier()?;
                expr = Expr::MemberExpr {
                    object: Box::new(expr),
                    computed: None,
                    property,
                    span,
                };
            } else if self.check(TokenKind::LBracket) {
                let span = self.current.span;
                self.advance()?;
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket, "']'")?;
                expr = Expr::MemberExpr {
                    object: Box::new(expr),
                    computed: Some(Box::new(index)),
                    property: String::new(),
                    span,
                };
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let span = self.current.span;
        match self.current.kind {
            TokenKind::Number => {
                let value: f64 = self.current.lexeme.parse().expect("lexer validated number");
                self.advance()?;
                Ok(Expr::NumericLiteral { value, span })
            }
            TokenKind::String => {
                let value = self.current.lexeme.clone();
                self.advance()?;
                Ok(Expr::StringLiteral { value, span })
            }
            TokenKind::True => {
                self.advance()?;
                Ok(Expr::BooleanLiteral { value: true, span })
            }
            TokenKind::False => {
                self.advance()?;
                Ok(Expr::BooleanLiteral { value: false, span })
            }
            TokenKind::Null => {
                self.advance()?;
                Ok(Expr::NullLiteral { span })
            }
            TokenKind::Identifier => {
                let name = self.current.lexeme.clone();
                self.advance()?;
                Ok(Expr::Identifier { name, span })
            }
            TokenKind::LParen => {
                self.advance()?;
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => {
                self.advance()?;
                let mut elements = Vec::new();
                while !self.check(TokenKind::RBracket) {
                    elements.push(self.parse_expression()?);
                    if !self.eat(TokenKind::Comma)? {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(Expr::ArrayLiteral { elements, span })
            }
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Query => self.parse_query_expr(),
            _ => Err(ParseError::UnexpectedToken {
                expected: "expression".to_string(),
                found: self.current.kind,
                lexeme: self.current.lexeme.clone(),
                span,
            }),
        }
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let span = self.current.span;
        self.advance()?; // '{'
        let mut entries = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let (key, key_span) = self.expect_identifier()?;
            let value = if self.eat(TokenKind::Colon)? {
                self.parse_expression()?
            } else {
                // shorthand { x } -> { x: x }
                Expr::Identifier {
                    name: key.clone(),
                    span: key_span,
                }
            };
            entries.push(ObjectEntry { key, value });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::ObjectLiteral { entries, span })
    }

    fn parse_query_expr(&mut self) -> Result<Expr, ParseError> {
        let span = self.current.span;
        self.advance()?; // query
        self.expect(TokenKind::LBrace, "'{'")?;
        let mut conditions = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let (field, fspan) = self.expect_identifier()?;
            let op = match self.current.kind {
                TokenKind::EqEq => CompareOp::Eq,
                TokenKind::NotEq => CompareOp::Ne,
                TokenKind::Lt => CompareOp::Lt,
                TokenKind::LtEq => CompareOp::Le,
                TokenKind::Gt => CompareOp::Gt,
                TokenKind::GtEq => CompareOp::Ge,
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "comparison operator (==, !=, <, <=, >, >=)".to_string(),
                        found: self.current.kind,
                        lexeme: self.current.lexeme.clone(),
                        span: self.current.span,
                    });
                }
            };
            self.advance()?;
            let value = self.parse_binary(0)?;
            conditions.push(QueryCondition {
                field,
                op,
                value,
                span: fspan,
            });
            if !self.eat(TokenKind::Comma)? {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "'}'")?;
        Ok(Expr::MongoQueryExpr { conditions, span })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Stmt {
        Parser::new(src).unwrap().parse_program().unwrap()
    }

    #[test]
    fn parses_var_declaration_with_precedence() {
        let prog = parse("declare x = 2 + 3 * 4;");
        match prog {
            Stmt::Program { body } => {
                assert_eq!(body.len(), 1);
                match &body[0] {
                    Stmt::VarDeclaration {
                        name, initializer, ..
                    } => {
                        assert_eq!(name, "x");
                        match initializer.as_deref().unwrap() {
                            Expr::BinaryExpr { op, .. } => assert_eq!(*op, BinaryOp::Add),
                            other => panic!("expected binary expr, got {other:?}"),
                        }
                    }
                    other => panic!("expected var decl, got {other:?}"),
                }
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn const_without_initializer_is_fatal() {
        let err = Parser::new("declare const x;").unwrap().parse_program();
        assert!(err.is_err());
    }

    #[test]
    fn parses_class_with_extends_and_required_field() {
        let prog = parse(
            "schema A { required name: string; greet() { return \"hi \" + name; } }\n\
             schema B extends A { required age: number; }",
        );
        match prog {
            Stmt::Program { body } => {
                assert_eq!(body.len(), 2);
                match &body[1] {
                    Stmt::ClassDeclaration { name, base, .. } => {
                        assert_eq!(name, "B");
                        assert_eq!(base.as_deref(), Some("A"));
                    }
                    other => panic!("expected class decl, got {other:?}"),
                }
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_try_catch_with_optional_param() {
        let prog = parse("try { throw \"boom\"; } catch (e) { print(e); }");
        match prog {
            Stmt::Program { body } => match &body[0] {
                Stmt::TryCatchStatement { catch_param, .. } => {
                    assert_eq!(catch_param.as_deref(), Some("e"));
                }
                other => panic!("expected try/catch, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_import_with_exposing() {
        let prog = parse("import \"./m.ds\" exposing { add };");
        match prog {
            Stmt::Program { body } => match &body[0] {
                Stmt::ImportStatement {
                    specifier,
                    exposing,
                    ..
                } => {
                    assert_eq!(specifier, "./m.ds");
                    assert_eq!(exposing.len(), 1);
                    assert_eq!(exposing[0].name, "add");
                }
                other => panic!("expected import, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_mongo_query_expr() {
        let prog = parse("declare q = query { a == 1, a > 0, b != 2 };");
        match prog {
            Stmt::Program { body } => match &body[0] {
                Stmt::VarDeclaration { initializer, .. } => match initializer.as_deref().unwrap() {
                    Expr::MongoQueryExpr { conditions, .. } => assert_eq!(conditions.len(), 3),
                    other => panic!("expected mongo query, got {other:?}"),
                },
                other => panic!("expected var decl, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_mongo_operation_chain() {
        let prog = parse("users <- { name: \"ada\" };");
        match prog {
            Stmt::Program { body } => match &body[0] {
                Stmt::ExprStatement { expr, .. } => match expr.as_ref() {
                    Expr::MongoOperationExpr { op, .. } => assert_eq!(*op, MongoOp::Insert),
                    other => panic!("expected mongo op, got {other:?}"),
                },
                other => panic!("expected expr stmt, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_update_where_set_with() {
        let prog = parse(
            "users update many where query { a == 1 } set { x: 2 } with { upsert: true };",
        );
        match prog {
            Stmt::Program { body } => match &body[0] {
                Stmt::ExprStatement { expr, .. } => match expr.as_ref() {
                    Expr::MongoUpdateExpr { many, options, .. } => {
                        assert!(*many);
                        assert!(options.is_some());
                    }
                    other => panic!("expected mongo update, got {other:?}"),
                },
                other => panic!("expected expr stmt, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_member_and_call_chain() {
        let prog = parse("a.b.c(1, 2)[0];");
        match prog {
            Stmt::Program { body } => match &body[0] {
                Stmt::ExprStatement { expr, .. } => {
                    assert!(matches!(expr.as_ref(), Expr::MemberExpr { .. }));
                }
                other => panic!("expected expr stmt, got {other:?}"),
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn parses_using_mongo_block() {
        let prog = parse(
            "using mongo from \"mongodb://x\" database \"d\" as db { collection users; }",
        );
        match prog {
            Stmt::Program { body } => {
                assert!(matches!(body[0], Stmt::UsingStatement { .. }));
            }
            _ => unreachable!(),
        }
    }
}
