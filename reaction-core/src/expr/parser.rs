//! Recursive-descent parser for formulas.
//!
//! Precedence, loosest first:
//!
//! ```text
//! conditional  a ? b : c
//! or           ||
//! and          &&
//! equality     === !== == !=
//! relational   < <= > >=
//! additive     + -
//! term         * / %
//! unary        ! - + typeof
//! postfix      .name  [index]  (args)   new Callee(args)
//! ```

use std::rc::Rc;

use super::ast::{BinaryOp, Expr, FunctionLiteral, Literal, LogicalOp, UnaryOp};
use super::lexer::{tokenize, Punct, Token, TokenKind};
use crate::config::ReactionConfig;
use crate::error::EvalError;
use crate::value::format_number;

/// Parse a complete formula.
///
/// `max_nesting_depth` bounds the parser's own recursion and
/// `max_eval_depth` bounds the height of the resulting tree, so that
/// adversarial input fails with [`EvalError::DepthExceeded`] instead of
/// overflowing the stack in any later walk over the tree.
pub fn parse(source: &str, config: &ReactionConfig) -> Result<Expr, EvalError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth: config.max_nesting_depth,
        max_height: config.max_eval_depth,
    };
    let expr = parser.expression()?;
    // A single trailing semicolon is tolerated.
    parser.eat(Punct::Semicolon);
    match &parser.peek().kind {
        TokenKind::Eof => parser.bounded(expr),
        _ => Err(parser.unexpected()),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    max_depth: usize,
    max_height: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof and we never advance past it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn check(&self, punct: Punct) -> bool {
        self.peek().kind == TokenKind::Punct(punct)
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek().kind, TokenKind::Keyword(k) if k == keyword)
    }

    fn eat(&mut self, punct: Punct) -> bool {
        if self.check(punct) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: Punct) -> Result<(), EvalError> {
        if self.eat(punct) {
            Ok(())
        } else {
            let token = self.peek();
            Err(EvalError::syntax(
                token.offset,
                format!("expected '{}' but found {}", punct.as_str(), describe(&token.kind)),
            ))
        }
    }

    fn unexpected(&self) -> EvalError {
        let token = self.peek();
        EvalError::syntax(token.offset, format!("unexpected {}", describe(&token.kind)))
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(EvalError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Reject trees taller than the height budget. Called wherever a loop
    /// extends a chain (`a + b + c`, `a.b.c`) since those grow the tree
    /// without recursing.
    fn bounded(&self, expr: Expr) -> Result<Expr, EvalError> {
        if expr.height() > self.max_height {
            return Err(EvalError::DepthExceeded {
                limit: self.max_height,
            });
        }
        Ok(expr)
    }

    fn expression(&mut self) -> Result<Expr, EvalError> {
        self.enter()?;
        let expr = self.conditional();
        self.leave();
        expr
    }

    fn conditional(&mut self) -> Result<Expr, EvalError> {
        let test = self.logical_or()?;
        if !self.eat(Punct::Question) {
            return Ok(test);
        }
        let consequent = self.expression()?;
        self.expect(Punct::Colon)?;
        let alternate = self.expression()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn logical_or(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.logical_and()?;
        while self.eat(Punct::OrOr) {
            let right = self.logical_and()?;
            left = self.bounded(Expr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            })?;
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> Result<Expr, EvalError> {
        let mut left = self.equality()?;
        while self.eat(Punct::AndAnd) {
            let right = self.equality()?;
            left = self.bounded(Expr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            })?;
        }
        Ok(left)
    }

    fn binary_level(
        &mut self,
        operators: &[(Punct, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, EvalError>,
    ) -> Result<Expr, EvalError> {
        let mut left = next(self)?;
        'outer: loop {
            for (punct, op) in operators {
                if self.eat(*punct) {
                    let right = next(self)?;
                    left = self.bounded(Expr::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                    })?;
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn equality(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                (Punct::EqEqEq, BinaryOp::StrictEq),
                (Punct::NotEqEq, BinaryOp::StrictNe),
                (Punct::EqEq, BinaryOp::LooseEq),
                (Punct::NotEq, BinaryOp::LooseNe),
            ],
            Self::relational,
        )
    }

    fn relational(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                (Punct::Le, BinaryOp::Le),
                (Punct::Ge, BinaryOp::Ge),
                (Punct::Lt, BinaryOp::Lt),
                (Punct::Gt, BinaryOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[(Punct::Plus, BinaryOp::Add), (Punct::Minus, BinaryOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr, EvalError> {
        self.binary_level(
            &[
                (Punct::Star, BinaryOp::Mul),
                (Punct::Slash, BinaryOp::Div),
                (Punct::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        let op = match &self.peek().kind {
            TokenKind::Punct(Punct::Bang) => Some(UnaryOp::Not),
            TokenKind::Punct(Punct::Minus) => Some(UnaryOp::Neg),
            TokenKind::Punct(Punct::Plus) => Some(UnaryOp::Plus),
            TokenKind::Keyword("typeof") => Some(UnaryOp::TypeOf),
            _ => None,
        };
        let Some(op) = op else {
            return self.postfix();
        };
        self.advance();
        self.enter()?;
        let operand = self.unary();
        self.leave();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
        })
    }

    fn postfix(&mut self) -> Result<Expr, EvalError> {
        let mut expr = if self.check_keyword("new") {
            self.new_expression()?
        } else {
            self.primary()?
        };
        loop {
            if self.eat(Punct::Dot) {
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: self.property_name()?,
                };
            } else if self.eat(Punct::LBracket) {
                let index = self.expression()?;
                self.expect(Punct::RBracket)?;
                expr = Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(index),
                };
            } else if self.eat(Punct::LParen) {
                let args = self.arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                };
            } else {
                return Ok(expr);
            }
            expr = self.bounded(expr)?;
        }
    }

    /// `new Callee.member[index](args)`; the argument list is optional.
    fn new_expression(&mut self) -> Result<Expr, EvalError> {
        self.advance();
        self.enter()?;
        let callee = if self.check_keyword("new") {
            self.new_expression()
        } else {
            self.primary()
        };
        self.leave();
        let mut callee = callee?;
        loop {
            if self.eat(Punct::Dot) {
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: self.property_name()?,
                };
            } else if self.eat(Punct::LBracket) {
                let index = self.expression()?;
                self.expect(Punct::RBracket)?;
                callee = Expr::Index {
                    object: Box::new(callee),
                    index: Box::new(index),
                };
            } else {
                break;
            }
            callee = self.bounded(callee)?;
        }
        let args = if self.eat(Punct::LParen) {
            self.arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            args,
        })
    }

    /// Comma separated expressions up to the closing parenthesis.
    fn arguments(&mut self) -> Result<Vec<Expr>, EvalError> {
        self.list(Punct::RParen)
    }

    fn list(&mut self, close: Punct) -> Result<Vec<Expr>, EvalError> {
        let mut items = Vec::new();
        while !self.eat(close) {
            items.push(self.expression()?);
            if !self.eat(Punct::Comma) {
                self.expect(close)?;
                break;
            }
        }
        Ok(items)
    }

    /// Name after a `.`; reserved words are allowed here.
    fn property_name(&mut self) -> Result<String, EvalError> {
        match self.advance().kind {
            TokenKind::Ident(name) => Ok(name),
            TokenKind::Keyword(keyword) => Ok(keyword.to_string()),
            other => Err(EvalError::syntax(
                self.peek().offset,
                format!("expected property name but found {}", describe(&other)),
            )),
        }
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let token = self.advance();
        let expr = match token.kind {
            TokenKind::Number(n) => Expr::Literal(Literal::Number(n)),
            TokenKind::Str(s) => Expr::Literal(Literal::String(s)),
            TokenKind::Ident(name) => Expr::Ident(name),
            TokenKind::Keyword("true") => Expr::Literal(Literal::Bool(true)),
            TokenKind::Keyword("false") => Expr::Literal(Literal::Bool(false)),
            TokenKind::Keyword("null") => Expr::Literal(Literal::Null),
            TokenKind::Keyword("undefined") => Expr::Literal(Literal::Undefined),
            TokenKind::Keyword("NaN") => Expr::Literal(Literal::Number(f64::NAN)),
            TokenKind::Keyword("Infinity") => Expr::Literal(Literal::Number(f64::INFINITY)),
            TokenKind::Keyword("function") => self.function_literal()?,
            TokenKind::Punct(Punct::LParen) => {
                let inner = self.expression()?;
                self.expect(Punct::RParen)?;
                inner
            }
            TokenKind::Punct(Punct::LBracket) => Expr::Array(self.list(Punct::RBracket)?),
            TokenKind::Punct(Punct::LBrace) => self.object_literal()?,
            other => {
                return Err(EvalError::syntax(
                    token.offset,
                    format!("unexpected {}", describe(&other)),
                ))
            }
        };
        Ok(expr)
    }

    fn object_literal(&mut self) -> Result<Expr, EvalError> {
        let mut entries = Vec::new();
        while !self.eat(Punct::RBrace) {
            let key_token = self.advance();
            let (key, shorthand) = match key_token.kind {
                TokenKind::Ident(name) => (name, true),
                TokenKind::Keyword(keyword) => (keyword.to_string(), false),
                TokenKind::Str(s) => (s, false),
                TokenKind::Number(n) => (format_number(n), false),
                other => {
                    return Err(EvalError::syntax(
                        key_token.offset,
                        format!("expected property key but found {}", describe(&other)),
                    ))
                }
            };
            let value = if self.eat(Punct::Colon) {
                self.expression()?
            } else if shorthand && (self.check(Punct::Comma) || self.check(Punct::RBrace)) {
                Expr::Ident(key.clone())
            } else {
                return Err(self.unexpected());
            };
            entries.push((key, value));
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RBrace)?;
                break;
            }
        }
        Ok(Expr::Object(entries))
    }

    /// Everything after the `function` keyword.
    fn function_literal(&mut self) -> Result<Expr, EvalError> {
        let name = match &self.peek().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Some(name)
            }
            _ => None,
        };
        self.expect(Punct::LParen)?;
        let mut params = Vec::new();
        while !self.eat(Punct::RParen) {
            let token = self.advance();
            match token.kind {
                TokenKind::Ident(param) => params.push(param),
                other => {
                    return Err(EvalError::syntax(
                        token.offset,
                        format!("expected parameter name but found {}", describe(&other)),
                    ))
                }
            }
            if !self.eat(Punct::Comma) {
                self.expect(Punct::RParen)?;
                break;
            }
        }
        self.expect(Punct::LBrace)?;
        if !self.check_keyword("return") {
            return Err(self.unexpected());
        }
        self.advance();
        let body = self.expression()?;
        self.eat(Punct::Semicolon);
        self.expect(Punct::RBrace)?;
        Ok(Expr::Function(Rc::new(FunctionLiteral { name, params, body })))
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", format_number(*n)),
        TokenKind::Str(s) => format!("string \"{}\"", s),
        TokenKind::Ident(name) => format!("identifier '{}'", name),
        TokenKind::Keyword(keyword) => format!("keyword '{}'", keyword),
        TokenKind::Punct(punct) => format!("'{}'", punct.as_str()),
        TokenKind::Eof => "end of formula".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Expr {
        parse(source, &ReactionConfig::default()).unwrap()
    }

    fn nesting(limit: usize) -> ReactionConfig {
        ReactionConfig {
            max_nesting_depth: limit,
            ..ReactionConfig::default()
        }
    }

    fn ident(name: &str) -> Box<Expr> {
        Box::new(Expr::Ident(name.into()))
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let expr = parse_ok("a + b * c");
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: ident("a"),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: ident("b"),
                    right: ident("c"),
                }),
            }
        );
    }

    #[test]
    fn member_access_allows_whitespace_after_dot() {
        let expr = parse_ok("b. d");
        assert_eq!(
            expr,
            Expr::Member {
                object: ident("b"),
                property: "d".into(),
            }
        );
    }

    #[test]
    fn new_with_arguments_then_method_call() {
        let expr = parse_ok("new Date(y, m).getTime()");
        let Expr::Call { callee, args } = expr else {
            panic!("expected call");
        };
        assert!(args.is_empty());
        let Expr::Member { object, property } = *callee else {
            panic!("expected member");
        };
        assert_eq!(property, "getTime");
        assert!(matches!(*object, Expr::New { ref args, .. } if args.len() == 2));
    }

    #[test]
    fn object_literal_with_shorthand() {
        let expr = parse_ok("{c: 0, \"x y\": 1, d}");
        let Expr::Object(entries) = expr else {
            panic!("expected object");
        };
        let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["c", "x y", "d"]);
        assert_eq!(entries[2].1, Expr::Ident("d".into()));
    }

    #[test]
    fn function_literal() {
        let expr = parse_ok("function double(x) { return x * 2; }");
        let Expr::Function(function) = expr else {
            panic!("expected function");
        };
        assert_eq!(function.name.as_deref(), Some("double"));
        assert_eq!(function.params, ["x"]);
    }

    #[test]
    fn conditional_is_right_associative() {
        let expr = parse_ok("a ? b : c ? d : e");
        let Expr::Conditional { alternate, .. } = expr else {
            panic!("expected conditional");
        };
        assert!(matches!(*alternate, Expr::Conditional { .. }));
    }

    #[test]
    fn syntax_errors_report_offset() {
        let config = ReactionConfig::default();
        let err = parse("(a + ", &config).unwrap_err();
        assert!(matches!(err, EvalError::Syntax { position: 5, .. }));
        assert!(parse("a b", &config).is_err());
        assert!(parse("", &config).is_err());
    }

    #[test]
    fn nesting_beyond_limit_is_rejected() {
        let source = format!("{}1{}", "(".repeat(40), ")".repeat(40));
        assert_eq!(parse(&source, &nesting(16)), Err(EvalError::DepthExceeded { limit: 16 }));
        assert!(parse(&source, &nesting(64)).is_ok());
        assert_eq!(
            parse(&"-".repeat(40), &nesting(16)),
            Err(EvalError::DepthExceeded { limit: 16 })
        );
    }

    #[test]
    fn long_chains_are_bounded_by_tree_height() {
        let config = ReactionConfig {
            max_eval_depth: 32,
            ..ReactionConfig::default()
        };
        let terms = |n: usize| vec!["a"; n].join(" + ");

        // n terms make a left spine of n - 1 additions over a leaf.
        assert_eq!(parse(&terms(32), &config).unwrap().height(), 32);
        assert_eq!(parse(&terms(33), &config), Err(EvalError::DepthExceeded { limit: 32 }));

        let members = format!("a{}", ".b".repeat(40));
        assert_eq!(parse(&members, &config), Err(EvalError::DepthExceeded { limit: 32 }));

        let calls = format!("f{}", "()".repeat(40));
        assert_eq!(parse(&calls, &config), Err(EvalError::DepthExceeded { limit: 32 }));
    }

    #[test]
    fn very_long_chains_fail_without_building_the_whole_tree() {
        let source = vec!["x"; 100_000].join(" * ");
        assert_eq!(
            parse(&source, &ReactionConfig::default()),
            Err(EvalError::DepthExceeded { limit: 256 })
        );
    }
}
