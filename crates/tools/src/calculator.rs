//! `Calc` tool: arithmetic the model shouldn't do in its head.
//!
//! Binary operations plus `evaluate`, which accepts an expression with
//! `+ - * / % ^`, parentheses and unary minus. Whole-number results are
//! returned as JSON integers.

use async_trait::async_trait;
use serde_json::Value;
use stepwise_core::error::ToolError;
use stepwise_core::tool::{Tool, ToolContext, ToolMember};

pub struct CalcTool;

#[async_trait]
impl Tool for CalcTool {
    fn description(&self) -> &str {
        "Exact arithmetic on numbers and expressions"
    }

    fn members(&self) -> Vec<ToolMember> {
        let binary = |name: &str, description: &str| {
            ToolMember::operation(name, description)
                .param("a", "number", "Left operand")
                .param("b", "number", "Right operand")
        };
        vec![
            binary("add", "Returns a + b"),
            binary("subtract", "Returns a - b"),
            binary("multiply", "Returns a * b"),
            binary("divide", "Returns a / b. Fails when b is zero"),
            ToolMember::operation(
                "evaluate",
                "Evaluates an expression with + - * / % ^, parentheses and decimals",
            )
            .param("expression", "string", "The expression, e.g. '(2 + 3) * 4'"),
        ]
    }

    async fn call(
        &self,
        operation: &str,
        args: Vec<Value>,
        _ctx: &mut ToolContext<'_>,
    ) -> Result<Value, ToolError> {
        let failed = |reason: EvalError| ToolError::ExecutionFailed {
            operation: format!("Calc.{operation}"),
            reason: reason.to_string(),
        };

        let result = match operation {
            "add" => number_arg(&args, 0, "a")? + number_arg(&args, 1, "b")?,
            "subtract" => number_arg(&args, 0, "a")? - number_arg(&args, 1, "b")?,
            "multiply" => number_arg(&args, 0, "a")? * number_arg(&args, 1, "b")?,
            "divide" => {
                let (a, b) = (number_arg(&args, 0, "a")?, number_arg(&args, 1, "b")?);
                if b == 0.0 {
                    return Err(failed(EvalError::DivisionByZero));
                }
                a / b
            }
            "evaluate" => {
                let expression = args
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::InvalidArguments("expression must be a string".into()))?;
                evaluate(expression).map_err(failed)?
            }
            other => {
                return Err(ToolError::ExecutionFailed {
                    operation: format!("Calc.{other}"),
                    reason: "unsupported operation".into(),
                });
            }
        };

        to_json_number(result).ok_or_else(|| failed(EvalError::NotFinite))
    }
}

/// Read a numeric argument. Numeric strings are accepted since models
/// often quote numbers.
fn number_arg(args: &[Value], index: usize, name: &str) -> Result<f64, ToolError> {
    match args.get(index) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| ToolError::InvalidArguments(format!("{name} must be a number")))
}

/// Whole numbers become JSON integers so `2 + 3` renders as `5`, not `5.0`.
fn to_json_number(value: f64) -> Option<Value> {
    if !value.is_finite() {
        return None;
    }
    if value.fract() == 0.0 && value.abs() < 1e15 {
        Some(Value::from(value as i64))
    } else {
        serde_json::Number::from_f64(value).map(Value::Number)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Unexpected character '{0}' at offset {1}")]
    UnexpectedChar(char, usize),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("Expected closing parenthesis")]
    UnclosedParen,

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Result is not a finite number")]
    NotFinite,
}

/// Evaluate an arithmetic expression.
pub fn evaluate(expr: &str) -> Result<f64, EvalError> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let result = parser.expr()?;
    match parser.peek() {
        None => Ok(result),
        Some(tok) => Err(EvalError::UnexpectedToken(format!("{tok:?}"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Token {
    Number(f64),
    Op(char),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        match c {
            c if c.is_whitespace() => {}
            '+' | '-' | '*' | '/' | '%' | '^' => tokens.push(Token::Op(c)),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::from(c);
                while let Some(&(_, next)) = chars.peek() {
                    if !(next.is_ascii_digit() || next == '.') {
                        break;
                    }
                    literal.push(next);
                    chars.next();
                }
                let n = literal
                    .parse()
                    .map_err(|_| EvalError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Number(n));
            }
            c => return Err(EvalError::UnexpectedChar(c, offset)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.peek();
        self.pos += usize::from(tok.is_some());
        tok
    }

    // expr = term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            self.next();
            let right = self.term()?;
            left = if op == '+' { left + right } else { left - right };
        }
        Ok(left)
    }

    // term = unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, EvalError> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek() {
            self.next();
            let right = self.unary()?;
            left = match op {
                '*' => left * right,
                _ if right == 0.0 => return Err(EvalError::DivisionByZero),
                '/' => left / right,
                _ => left % right,
            };
        }
        Ok(left)
    }

    // unary = '-' unary | power
    fn unary(&mut self) -> Result<f64, EvalError> {
        if let Some(Token::Op('-')) = self.peek() {
            self.next();
            return Ok(-self.unary()?);
        }
        self.power()
    }

    // power = primary ('^' unary)?   (right-associative)
    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.next();
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // primary = NUMBER | '(' expr ')'
    fn primary(&mut self) -> Result<f64, EvalError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::UnclosedParen),
                }
            }
            Some(tok) => Err(EvalError::UnexpectedToken(format!("{tok:?}"))),
            None => Err(EvalError::UnexpectedEnd),
        }
    }
}
