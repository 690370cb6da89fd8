use crate::ast::*;
use crate::lexer::Token;

/// Binding power of operators, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Logical,     // and or
    Equals,      // = ~=
    LessGreater, // < >
    Sum,         // + -
    Product,     // * / mod
    Prefix,      // not -x
    Application, // f | x
}

fn infix_precedence(token: &Token) -> Option<Precedence> {
    Some(match token {
        Token::And | Token::Or => Precedence::Logical,
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Star | Token::Slash | Token::Mod => Precedence::Product,
        Token::Pipe => Precedence::Application,
        _ => return None,
    })
}

fn binary_op(token: &Token) -> Option<BinOp> {
    Some(match token {
        Token::Plus => BinOp::Add,
        Token::Minus => BinOp::Subtract,
        Token::Star => BinOp::Multiply,
        Token::Slash => BinOp::Divide,
        Token::Mod => BinOp::Modulo,
        Token::Eq => BinOp::Equals,
        Token::NotEq => BinOp::NotEquals,
        Token::Gt => BinOp::GreaterThan,
        Token::Lt => BinOp::LessThan,
        Token::And => BinOp::And,
        Token::Or => BinOp::Or,
        _ => return None,
    })
}

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

/// Parse a lexed token stream; every recovered error is returned.
pub fn parse(tokens: Vec<(Token, std::ops::Range<usize>)>) -> std::result::Result<Program, Vec<ParseError>> {
    let tokens = tokens.into_iter().map(|(t, r)| (t, Span::from(r))).collect();
    let (program, errors) = Parser::new(tokens).parse_program();
    if errors.is_empty() { Ok(program) } else { Err(errors) }
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, s)) => *s,
            // Point just past the last token at EOF
            None => self
                .tokens
                .last()
                .map(|(_, s)| Span { start: s.end, end: s.end })
                .unwrap_or(Span::UNKNOWN),
        }
    }

    fn prev_span(&self) -> Span {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|(_, s)| *s)
            .unwrap_or(Span::UNKNOWN)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => Err(self.error("MAL-P002", format!("expected {}, got {}", expected, tok))),
            None => Err(self.error("MAL-P003", format!("expected {}, got end of input", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(name)
            }
            Some(tok) => Err(self.error("MAL-P004", format!("expected identifier, got {}", tok))),
            None => Err(self.error("MAL-P003", "expected identifier, got end of input".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            position: self.pos,
            span: self.peek_span(),
            message,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    // ---- Statements ----

    pub fn parse_program(&mut self) -> (Program, Vec<ParseError>) {
        let mut statements = Vec::new();
        let mut errors: Vec<ParseError> = Vec::new();
        const MAX_ERRORS: usize = 20;

        while !self.at_end() {
            if errors.len() >= MAX_ERRORS {
                break;
            }
            let start = self.pos;
            match self.parse_statement() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    tracing::debug!(code = e.code, message = %e.message, "parse error, resynchronising");
                    errors.push(e);
                    self.sync_to_statement(start);
                }
            }
        }

        (Program { statements }, errors)
    }

    /// Skip ahead to the next `define` or `puts`, always making progress.
    fn sync_to_statement(&mut self, failed_at: usize) {
        if self.pos == failed_at {
            self.advance();
        }
        while let Some(tok) = self.peek() {
            if matches!(tok, Token::Define | Token::Puts) {
                break;
            }
            self.advance();
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        let start = self.peek_span();
        match self.peek() {
            Some(Token::Define) => {
                self.advance();
                let name = self.expect_ident()?;
                self.expect(&Token::As)?;
                let value = self.parse_expr(Precedence::Lowest)?;
                if self.peek() == Some(&Token::End) {
                    self.advance();
                }
                Ok(Stmt::new(StmtKind::Define { name, value }, start.merge(self.prev_span())))
            }
            Some(Token::Puts) => {
                self.advance();
                let value = self.parse_expr(Precedence::Lowest)?;
                let span = start.merge(value.span);
                Ok(Stmt::new(StmtKind::Puts { value }, span))
            }
            _ => {
                let value = self.parse_expr(Precedence::Lowest)?;
                let span = value.span;
                Ok(Stmt::new(StmtKind::Expression { value }, span))
            }
        }
    }

    // ---- Expressions ----

    fn parse_expr(&mut self, precedence: Precedence) -> Result<Expr> {
        let mut left = self.parse_prefix()?;
        while let Some(next) = self.peek().and_then(infix_precedence) {
            if precedence >= next {
                break;
            }
            left = self.parse_infix(left, next)?;
        }
        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let start = self.peek_span();
        let Some(tok) = self.advance() else {
            return Err(self.error("MAL-P003", "expected an expression, got end of input".into()));
        };
        let kind = match tok {
            Token::Integer(value) => ExprKind::Integer { value },
            Token::Text(value) => ExprKind::Text { value },
            Token::True => ExprKind::Bool { value: true },
            Token::False => ExprKind::Bool { value: false },
            Token::Nil => ExprKind::Nil,
            Token::Ident(name) => ExprKind::Ident { name },
            Token::Not | Token::Minus => {
                let op = if tok == Token::Not { UnaryOp::Not } else { UnaryOp::Negate };
                let operand = self.parse_expr(Precedence::Prefix)?;
                ExprKind::Prefix { op, operand: Box::new(operand) }
            }
            Token::LParen => {
                let inner = self.parse_expr(Precedence::Lowest)?;
                let close = self.expect(&Token::RParen)?;
                return Ok(Expr::new(inner.node, start.merge(close)));
            }
            Token::If => {
                let condition = self.parse_expr(Precedence::Lowest)?;
                self.expect(&Token::Then)?;
                let consequence = self.parse_expr(Precedence::Lowest)?;
                let alternative = if self.peek() == Some(&Token::Else) {
                    self.advance();
                    Some(Box::new(self.parse_expr(Precedence::Lowest)?))
                } else {
                    None
                };
                ExprKind::If {
                    condition: Box::new(condition),
                    consequence: Box::new(consequence),
                    alternative,
                }
            }
            Token::Lambda => {
                let param = self.expect_ident()?;
                self.expect(&Token::Dot)?;
                let body = self.parse_expr(Precedence::Lowest)?;
                ExprKind::Lambda { param, body: Box::new(body) }
            }
            other => {
                self.pos -= 1;
                return Err(self.error("MAL-P001", format!("unexpected {} at start of expression", other)));
            }
        };
        Ok(Expr::new(kind, start.merge(self.prev_span())))
    }

    fn parse_infix(&mut self, left: Expr, precedence: Precedence) -> Result<Expr> {
        let Some(tok) = self.advance() else {
            return Err(self.error("MAL-P003", "expected an operator, got end of input".into()));
        };
        if tok == Token::Pipe {
            // The argument extends as far right as possible
            let argument = self.parse_expr(Precedence::Lowest)?;
            let span = left.span.merge(argument.span);
            return Ok(Expr::new(
                ExprKind::Apply { function: Box::new(left), argument: Box::new(argument) },
                span,
            ));
        }
        let Some(op) = binary_op(&tok) else {
            self.pos -= 1;
            return Err(self.error("MAL-P001", format!("unexpected {} in operator position", tok)));
        };
        let right = self.parse_expr(precedence)?;
        let span = left.span.merge(right.span);
        Ok(Expr::new(
            ExprKind::Infix { op, left: Box::new(left), right: Box::new(right) },
            span,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;
    use num_bigint::BigInt;

    fn parse_str(source: &str) -> Program {
        parse(lexer::lex(source).unwrap()).unwrap()
    }

    fn parse_errors(source: &str) -> Vec<ParseError> {
        parse(lexer::lex(source).unwrap()).unwrap_err()
    }

    fn only_expr(source: &str) -> ExprKind {
        let program = parse_str(source);
        assert_eq!(program.statements.len(), 1);
        match &program.statements[0].node {
            StmtKind::Expression { value } => value.node.clone(),
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    fn int(n: i64) -> ExprKind {
        ExprKind::Integer { value: BigInt::from(n) }
    }

    #[test]
    fn parse_define_with_and_without_end() {
        let program = parse_str("define a as 1 end define b as 2 puts a");
        assert_eq!(program.statements.len(), 3);
        assert!(matches!(&program.statements[0].node, StmtKind::Define { name, .. } if name == "a"));
        assert!(matches!(&program.statements[1].node, StmtKind::Define { name, .. } if name == "b"));
        assert!(matches!(&program.statements[2].node, StmtKind::Puts { .. }));
    }

    #[test]
    fn parse_product_binds_tighter_than_sum() {
        let ExprKind::Infix { op, left, right } = only_expr("1 + 2 * 3") else {
            panic!("expected infix");
        };
        assert_eq!(op, BinOp::Add);
        assert_eq!(left.node, int(1));
        assert!(matches!(right.node, ExprKind::Infix { op: BinOp::Multiply, .. }));
    }

    #[test]
    fn parse_subtraction_is_left_associative() {
        let ExprKind::Infix { op, left, right } = only_expr("10 - 4 - 3") else {
            panic!("expected infix");
        };
        assert_eq!(op, BinOp::Subtract);
        assert!(matches!(left.node, ExprKind::Infix { op: BinOp::Subtract, .. }));
        assert_eq!(right.node, int(3));
    }

    #[test]
    fn parse_mod_is_a_product_operator() {
        let ExprKind::Infix { op, right, .. } = only_expr("1 + 7 mod 4") else {
            panic!("expected infix");
        };
        assert_eq!(op, BinOp::Add);
        assert!(matches!(right.node, ExprKind::Infix { op: BinOp::Modulo, .. }));
    }

    #[test]
    fn parse_comparison_below_arithmetic() {
        let ExprKind::Infix { op, .. } = only_expr("1 + 1 = 2") else {
            panic!("expected infix");
        };
        assert_eq!(op, BinOp::Equals);
    }

    #[test]
    fn parse_prefix_operators() {
        assert!(matches!(only_expr("not true"), ExprKind::Prefix { op: UnaryOp::Not, .. }));
        let ExprKind::Infix { left, .. } = only_expr("-2 * 3") else {
            panic!("expected infix");
        };
        assert!(matches!(left.node, ExprKind::Prefix { op: UnaryOp::Negate, .. }));
    }

    #[test]
    fn parse_grouping_overrides_precedence() {
        let ExprKind::Infix { op, left, .. } = only_expr("(1 + 2) * 3") else {
            panic!("expected infix");
        };
        assert_eq!(op, BinOp::Multiply);
        assert!(matches!(left.node, ExprKind::Infix { op: BinOp::Add, .. }));
    }

    #[test]
    fn parse_if_with_and_without_else() {
        let ExprKind::If { alternative, .. } = only_expr("if 1 < 2 then 3 else 4") else {
            panic!("expected if");
        };
        assert!(alternative.is_some());
        let ExprKind::If { alternative, .. } = only_expr("if true then 1") else {
            panic!("expected if");
        };
        assert!(alternative.is_none());
    }

    #[test]
    fn parse_lambda_body_extends_right() {
        let ExprKind::Lambda { param, body } = only_expr("lambda n . n * 2 + 1") else {
            panic!("expected lambda");
        };
        assert_eq!(param, "n");
        assert!(matches!(body.node, ExprKind::Infix { op: BinOp::Add, .. }));
    }

    #[test]
    fn parse_application_argument_extends_right() {
        let ExprKind::Apply { function, argument } = only_expr("f | x + 1") else {
            panic!("expected application");
        };
        assert_eq!(function.node, ExprKind::Ident { name: "f".to_string() });
        assert!(matches!(argument.node, ExprKind::Infix { op: BinOp::Add, .. }));
    }

    #[test]
    fn parse_application_of_lambda_literal() {
        let ExprKind::Apply { function, argument } = only_expr("(lambda x . x) | 7") else {
            panic!("expected application");
        };
        assert!(matches!(function.node, ExprKind::Lambda { .. }));
        assert_eq!(argument.node, int(7));
    }

    #[test]
    fn parse_logical_operators_lowest() {
        let ExprKind::Infix { op, .. } = only_expr("1 = 1 and 2 = 2") else {
            panic!("expected infix");
        };
        assert_eq!(op, BinOp::And);
    }

    #[test]
    fn parse_spans_cover_expression() {
        let program = parse_str("puts 1 + 22");
        let StmtKind::Puts { value } = &program.statements[0].node else {
            panic!("expected puts");
        };
        assert_eq!(value.span, Span { start: 5, end: 11 });
        assert_eq!(program.statements[0].span, Span { start: 0, end: 11 });
    }

    #[test]
    fn parse_error_missing_as() {
        let errors = parse_errors("define x 5");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, "MAL-P002");
        assert!(errors[0].message.contains("'as'"));
    }

    #[test]
    fn parse_error_at_end_of_input() {
        let errors = parse_errors("puts 1 +");
        assert_eq!(errors[0].code, "MAL-P003");
    }

    #[test]
    fn parse_error_unexpected_token() {
        let errors = parse_errors(") 1");
        assert_eq!(errors[0].code, "MAL-P001");
        assert_eq!(errors[0].span, Span { start: 0, end: 1 });
    }

    #[test]
    fn parse_recovers_at_next_statement() {
        let errors = parse_errors("define as 1\nputs 2\ndefine y 3\nputs 4");
        assert_eq!(errors.len(), 2);
    }
}
