//! # Parser
//!
//! Recursive-descent parser for rendered rule source.
//!
//! ```text
//! program := rule*
//! rule    := "rule" IDENT STRING? ("salience" INT)? "{" "when" expr "then" stmt* "}"
//! stmt    := IDENT "." MUTATOR "(" STRING "," expr ")" ";"
//!          | "Retract" "(" STRING ")" ";"
//! expr    := and ("||" and)*
//! and     := cmp ("&&" cmp)*
//! cmp     := unary (CMP_OP unary)?
//! unary   := "!" unary | primary
//! primary := literal | "(" expr ")" | IDENT "." GETTER "(" STRING ")"
//! ```

use super::ast::{mutation_op, Expr, Getter, RuleDecl, Stmt};
use super::errors::{EngineError, EngineResult};
use super::lexer::{Lexer, Token, TokenKind};
use crate::rule::{CompareOp, FactValue, LogicOp};

/// Parse rule source into declarations
pub fn parse(source: &str) -> EngineResult<Vec<RuleDecl>> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser { tokens, cursor: 0 }.parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser {
    fn parse_program(&mut self) -> EngineResult<Vec<RuleDecl>> {
        let mut rules = Vec::new();
        while self.peek().kind != TokenKind::Eof {
            rules.push(self.parse_rule()?);
        }
        Ok(rules)
    }

    fn parse_rule(&mut self) -> EngineResult<RuleDecl> {
        self.expect_keyword("rule")?;
        let name = self.expect_ident()?;

        let description = match &self.peek().kind {
            TokenKind::Str(s) => {
                let s = s.clone();
                self.advance();
                s
            }
            _ => String::new(),
        };

        let salience = if self.is_keyword("salience") {
            self.advance();
            match self.advance().kind {
                TokenKind::Int(n) => n,
                _ => return Err(self.error_at_previous("expected integer salience")),
            }
        } else {
            0
        };

        self.expect(TokenKind::LBrace, "'{'")?;
        self.expect_keyword("when")?;
        let when = self.parse_expr()?;
        self.expect_keyword("then")?;

        let mut then = Vec::new();
        while self.peek().kind != TokenKind::RBrace {
            if self.peek().kind == TokenKind::Eof {
                return Err(self.error_here("unexpected end of input, expected '}'"));
            }
            then.push(self.parse_stmt()?);
        }
        self.advance();

        Ok(RuleDecl {
            name,
            description,
            salience,
            when,
            then,
        })
    }

    fn parse_stmt(&mut self) -> EngineResult<Stmt> {
        let head = self.expect_ident()?;
        if head == "Retract" {
            self.expect(TokenKind::LParen, "'('")?;
            let target = self.expect_string()?;
            self.expect(TokenKind::RParen, "')'")?;
            self.expect(TokenKind::Semicolon, "';'")?;
            return Ok(Stmt::Retract(target));
        }

        self.expect(TokenKind::Dot, "'.'")?;
        let func = self.expect_ident()?;
        let op = mutation_op(&func)
            .ok_or_else(|| self.error_at_previous(format!("unknown function '{}'", func)))?;
        self.expect(TokenKind::LParen, "'('")?;
        let name = self.expect_string()?;
        self.expect(TokenKind::Comma, "','")?;
        let value = self.parse_expr()?;
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semicolon, "';'")?;

        Ok(Stmt::Mutate {
            var: head,
            op,
            name,
            value,
        })
    }

    // ==================
    // Expressions
    // ==================

    fn parse_expr(&mut self) -> EngineResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek().kind == TokenKind::OrOr {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Logic {
                op: LogicOp::Or,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> EngineResult<Expr> {
        let mut lhs = self.parse_compare()?;
        while self.peek().kind == TokenKind::AndAnd {
            self.advance();
            let rhs = self.parse_compare()?;
            lhs = Expr::Logic {
                op: LogicOp::And,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_compare(&mut self) -> EngineResult<Expr> {
        let lhs = self.parse_unary()?;
        let op = match self.peek().kind {
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => CompareOp::Neq,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Gte => CompareOp::Gte,
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Lte => CompareOp::Lte,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_unary()?;
        Ok(Expr::Compare {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_unary(&mut self) -> EngineResult<Expr> {
        if self.peek().kind == TokenKind::Bang {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> EngineResult<Expr> {
        let token = self.advance();
        match token.kind {
            TokenKind::Int(n) => Ok(Expr::Literal(FactValue::Int(n))),
            TokenKind::Float(f) => Ok(Expr::Literal(FactValue::Float(f))),
            TokenKind::Str(s) => Ok(Expr::Literal(FactValue::Str(s))),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(ident) if ident == "true" => Ok(Expr::Literal(FactValue::Bool(true))),
            TokenKind::Ident(ident) if ident == "false" => {
                Ok(Expr::Literal(FactValue::Bool(false)))
            }
            TokenKind::Ident(var) => {
                self.expect(TokenKind::Dot, "'.'")?;
                let func = self.expect_ident()?;
                let getter = Getter::from_name(&func)
                    .ok_or_else(|| self.error_at_previous(format!("unknown getter '{}'", func)))?;
                self.expect(TokenKind::LParen, "'('")?;
                let name = self.expect_string()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(Expr::Fact { var, getter, name })
            }
            other => Err(EngineError::syntax(
                token.line,
                token.column,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    // ==================
    // Token helpers
    // ==================

    fn peek(&self) -> &Token {
        // The lexer always terminates with Eof, and advance never moves past it.
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.cursor += 1;
        }
        token
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(&self.peek().kind, TokenKind::Ident(ident) if ident == keyword)
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> EngineResult<()> {
        if self.peek().kind == kind {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected {}", what)))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> EngineResult<()> {
        if self.is_keyword(keyword) {
            self.advance();
            Ok(())
        } else {
            Err(self.error_here(format!("expected '{}'", keyword)))
        }
    }

    fn expect_ident(&mut self) -> EngineResult<String> {
        match self.peek().kind.clone() {
            TokenKind::Ident(ident) => {
                self.advance();
                Ok(ident)
            }
            _ => Err(self.error_here("expected identifier")),
        }
    }

    fn expect_string(&mut self) -> EngineResult<String> {
        match self.peek().kind.clone() {
            TokenKind::Str(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.error_here("expected string literal")),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> EngineError {
        let token = self.peek();
        EngineError::syntax(token.line, token.column, message)
    }

    fn error_at_previous(&self, message: impl Into<String>) -> EngineError {
        let token = &self.tokens[self.cursor.saturating_sub(1)];
        EngineError::syntax(token.line, token.column, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::MathOp;

    const SOURCE: &str = r#"rule Rule10K "run 10K" salience 10 {
  when
    Var.GetInt("distance") >= 10000 && !(Var.GetBool("banned") == true)
  then
    Var.Add("credit", 1);
    Retract("Rule10K");
}"#;

    #[test]
    fn test_parse_rule() {
        let rules = parse(SOURCE).unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.name, "Rule10K");
        assert_eq!(rule.description, "run 10K");
        assert_eq!(rule.salience, 10);
        assert!(matches!(rule.when, Expr::Logic { op: LogicOp::And, .. }));
        assert_eq!(
            rule.then,
            vec![
                Stmt::Mutate {
                    var: "Var".into(),
                    op: MathOp::Add,
                    name: "credit".into(),
                    value: Expr::Literal(FactValue::Int(1)),
                },
                Stmt::Retract("Rule10K".into()),
            ]
        );
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let rules = parse("rule R { when true || false && false then }").unwrap();
        match &rules[0].when {
            Expr::Logic { op, rhs, .. } => {
                assert_eq!(*op, LogicOp::Or);
                assert!(matches!(**rhs, Expr::Logic { op: LogicOp::And, .. }));
            }
            other => panic!("unexpected expr: {other:?}"),
        }
        assert_eq!(rules[0].salience, 0);
    }

    #[test]
    fn test_unknown_function_is_syntax_error() {
        let err = parse("rule R { when true then Var.Modulo(\"x\", 2); }").unwrap_err();
        assert!(matches!(err, EngineError::Syntax { line: 1, .. }));
    }

    #[test]
    fn test_unknown_getter_is_syntax_error() {
        assert!(parse("rule R { when Var.GetDate(\"x\") then }").is_err());
    }

    #[test]
    fn test_missing_brace() {
        let err = parse("rule R { when true then Retract(\"R\");").unwrap_err();
        assert!(err.to_string().contains("expected '}'"));
    }
}
