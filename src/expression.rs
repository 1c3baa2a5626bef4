//! Standalone Boolean/arithmetic expression evaluator.
//!
//! Query/Control/SUB/Action-reason clauses keep their raw expression text at
//! parse time; this module re-tokenizes that text independently at
//! evaluation time against a [`Context`]. Precedence, lowest to highest:
//! `||`, `&&`, comparison, additive, multiplicative, primary.
//!
//! Unlike the Python original, whitespace is skipped token-by-token rather
//! than stripped from the source text up front, so a string literal
//! containing internal spaces survives re-lexing intact.

use crate::context::Context;
use crate::error::EvaluationError;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::model::Value;

pub fn evaluate(expr: &str, ctx: &dyn Context) -> Result<Value, EvaluationError> {
    let tokens = Lexer::new(expr)
        .tokenize()
        .map_err(|e| EvaluationError::Syntax(e.to_string()))?;
    let mut parser = ExprParser { tokens, pos: 0, ctx };
    let value = parser.parse_or()?;
    if !parser.is_eof() {
        return Err(EvaluationError::Syntax(format!(
            "unexpected trailing token at position {}",
            parser.pos
        )));
    }
    Ok(value)
}

/// Truthiness used by `&&`, `||`, and bare-boolean contexts.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(s) | Value::Path(s) => !s.is_empty(),
        Value::Null => false,
        Value::List(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    ctx: &'a dyn Context,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.tokens[self.pos].kind.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn consume_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), TokenKind::Op(o) if *o == op) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.parse_and()?;
        while self.consume_op("||") {
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.parse_comparison()?;
        while self.consume_op("&&") {
            let right = self.parse_comparison()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(o @ ("==" | "!=" | ">" | "<" | ">=" | "<=")) => *o,
                _ => break,
            };
            self.advance();
            let right = self.parse_additive()?;
            left = Value::Bool(compare(op, &left, &right)?);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(o @ ("+" | "-")) => *o,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = arithmetic(op, &left, &right)?;
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Value, EvaluationError> {
        let mut left = self.parse_primary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Op(o @ ("*" | "/")) => *o,
                _ => break,
            };
            self.advance();
            let right = self.parse_primary()?;
            left = arithmetic(op, &left, &right)?;
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<Value, EvaluationError> {
        match self.advance() {
            TokenKind::Symbol('(') => {
                let value = self.parse_or()?;
                if !matches!(self.advance(), TokenKind::Symbol(')')) {
                    return Err(EvaluationError::Syntax("expected ')'".to_string()));
                }
                Ok(value)
            }
            TokenKind::Str(s) => Ok(Value::String(s)),
            TokenKind::Int(i) => Ok(Value::Int(i)),
            TokenKind::Float(f) => Ok(Value::Float(f)),
            TokenKind::Bool(b) => Ok(Value::Bool(b)),
            TokenKind::Null => Ok(Value::Null),
            TokenKind::Ident(path) => self
                .ctx
                .get(&path)
                .ok_or(EvaluationError::UnresolvedPath(path)),
            other => Err(EvaluationError::Syntax(format!(
                "unexpected token {other:?}"
            ))),
        }
    }
}

fn numeric(op: &str, value: &Value) -> Result<f64, EvaluationError> {
    value.as_f64().ok_or_else(|| EvaluationError::NonNumericOperand {
        op: op.to_string(),
        value: format!("{value:?}"),
    })
}

fn arithmetic(op: &str, left: &Value, right: &Value) -> Result<Value, EvaluationError> {
    let l = numeric(op, left)?;
    let r = numeric(op, right)?;
    let result = match op {
        "+" => l + r,
        "-" => l - r,
        "*" => l * r,
        "/" => {
            if r == 0.0 {
                return Err(EvaluationError::DivisionByZero);
            }
            l / r
        }
        _ => unreachable!(),
    };
    if matches!(left, Value::Int(_)) && matches!(right, Value::Int(_)) && op != "/" {
        Ok(Value::Int(result as i64))
    } else {
        Ok(Value::Float(result))
    }
}

/// `==`/`!=` cover every value kind; relational operators require numerics.
fn compare(op: &str, left: &Value, right: &Value) -> Result<bool, EvaluationError> {
    match op {
        "==" => Ok(values_equal(left, right)),
        "!=" => Ok(!values_equal(left, right)),
        _ => {
            let l = numeric(op, left)?;
            let r = numeric(op, right)?;
            Ok(match op {
                ">" => l > r,
                "<" => l < r,
                ">=" => l >= r,
                "<=" => l <= r,
                _ => unreachable!(),
            })
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            left.as_f64() == right.as_f64()
        }
        _ => left == right,
    }
}

/// Does this string contain any operator that marks it as an expression
/// rather than a human-readable literal? Shared by the guardrail
/// (`reason`/`policyExpr`) and minifier's decision to treat a field as raw
/// expression text.
pub fn is_expression(text: &str) -> bool {
    const OPS: [&str; 8] = ["==", "!=", ">=", "<=", "&&", "||", ">", "<"];
    OPS.iter().any(|op| text.contains(op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MapContext;

    #[test]
    fn arithmetic_precedence() {
        let ctx = MapContext::new();
        let result = evaluate("2 + 3 * 4", &ctx).unwrap();
        assert_eq!(result, Value::Int(14));
    }

    #[test]
    fn comparison_and_logic() {
        let ctx = MapContext::new();
        let result = evaluate("1 < 2 && 3 > 2", &ctx).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn division_by_zero() {
        let ctx = MapContext::new();
        assert_eq!(
            evaluate("1 / 0", &ctx).unwrap_err(),
            EvaluationError::DivisionByZero
        );
    }

    #[test]
    fn null_equality() {
        let ctx = MapContext::new();
        assert_eq!(evaluate("null == null", &ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn string_with_internal_whitespace_survives() {
        let ctx = MapContext::new();
        let result = evaluate(r#""hello world" == "hello world""#, &ctx).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn path_resolution() {
        let mut ctx = MapContext::new();
        ctx.set("count", Value::Int(5));
        assert_eq!(evaluate("count > 3", &ctx).unwrap(), Value::Bool(true));
    }

    #[test]
    fn detects_expression_text() {
        assert!(is_expression("count > 3"));
        assert!(!is_expression("deploy requires manual sign-off"));
    }
}
