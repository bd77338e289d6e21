//! Sandboxed arithmetic expression evaluation.
//!
//! Backs the agent's `calculate` tool. Expressions are tokenized and parsed
//! into an AST, every identifier and call target is checked against a fixed
//! math namespace, and only then is the tree evaluated. Nothing outside the
//! allow-list is reachable, so a prompted model cannot turn the calculator
//! into code execution.

use thiserror::Error;

/// Typed evaluation failures. Rejections happen before any evaluation.
#[derive(Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("unexpected character '{0}' in expression")]
    UnexpectedChar(char),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected token at offset {0}")]
    UnexpectedToken(usize),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' expects {expected} argument(s), got {got}")]
    WrongArity {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression result is not a finite number")]
    NotFinite,
}

/// Functions the evaluator may call, with their arity.
const FUNCTIONS: &[(&str, usize)] = &[
    ("sqrt", 1),
    ("abs", 1),
    ("fabs", 1),
    ("floor", 1),
    ("ceil", 1),
    ("round", 1),
    ("trunc", 1),
    ("exp", 1),
    ("log", 1),
    ("log2", 1),
    ("log10", 1),
    ("sin", 1),
    ("cos", 1),
    ("tan", 1),
    ("asin", 1),
    ("acos", 1),
    ("atan", 1),
    ("sinh", 1),
    ("cosh", 1),
    ("tanh", 1),
    ("degrees", 1),
    ("radians", 1),
    ("pow", 2),
    ("atan2", 2),
    ("hypot", 2),
    ("fmod", 2),
    ("min", 2),
    ("max", 2),
];

/// Named constants the evaluator resolves.
fn constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        "tau" => Some(std::f64::consts::TAU),
        _ => None,
    }
}

fn function_arity(name: &str) -> Option<usize> {
    FUNCTIONS
        .iter()
        .find(|(candidate, _)| *candidate == name)
        .map(|(_, arity)| *arity)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Power,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Ident(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

/// Evaluate an arithmetic expression against the fixed math namespace.
///
/// Both `^` and `**` denote exponentiation. The expression is fully parsed
/// and validated before evaluation; identifiers or calls outside the
/// namespace are rejected with a typed error and nothing is executed.
pub fn evaluate(expression: &str) -> Result<f64, EvalError> {
    let tokens = tokenize(expression)?;
    let ast = Parser::new(tokens).parse()?;
    validate(&ast)?;
    let value = eval(&ast)?;
    if !value.is_finite() {
        return Err(EvalError::NotFinite);
    }
    Ok(value)
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, EvalError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push((Token::Plus, i));
                i += 1;
            }
            '-' => {
                tokens.push((Token::Minus, i));
                i += 1;
            }
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    tokens.push((Token::Power, i));
                    i += 2;
                } else {
                    tokens.push((Token::Star, i));
                    i += 1;
                }
            }
            '/' => {
                tokens.push((Token::Slash, i));
                i += 1;
            }
            '%' => {
                tokens.push((Token::Percent, i));
                i += 1;
            }
            '^' => {
                tokens.push((Token::Power, i));
                i += 1;
            }
            '(' => {
                tokens.push((Token::LParen, i));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, i));
                i += 1;
            }
            ',' => {
                tokens.push((Token::Comma, i));
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // Exponent suffix, e.g. 2e10 or 1.5e-3
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| EvalError::UnexpectedToken(start))?;
                tokens.push((Token::Number(value), start));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                tokens.push((Token::Ident(name), start));
            }
            other => return Err(EvalError::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// Precedence-climbing parser. Power is right-associative and binds tighter
/// than unary minus, matching conventional math notation (`-2^2` is `-4`).
struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<(Token, usize)>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn parse(mut self) -> Result<Expr, EvalError> {
        if self.tokens.is_empty() {
            return Err(EvalError::UnexpectedEnd);
        }
        let expr = self.parse_expr(0)?;
        match self.peek() {
            None => Ok(expr),
            Some((_, offset)) => Err(EvalError::UnexpectedToken(*offset)),
        }
    }

    fn peek(&self) -> Option<&(Token, usize)> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), EvalError> {
        match self.advance() {
            Some((token, _)) if token == *expected => Ok(()),
            Some((_, offset)) => Err(EvalError::UnexpectedToken(offset)),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, EvalError> {
        let mut lhs = self.parse_prefix()?;

        while let Some((token, _)) = self.peek() {
            let (op, l_bp, r_bp) = match token {
                Token::Plus => (BinaryOp::Add, 1, 2),
                Token::Minus => (BinaryOp::Sub, 1, 2),
                Token::Star => (BinaryOp::Mul, 3, 4),
                Token::Slash => (BinaryOp::Div, 3, 4),
                Token::Percent => (BinaryOp::Mod, 3, 4),
                Token::Power => (BinaryOp::Pow, 9, 8),
                _ => break,
            };
            if l_bp < min_bp {
                break;
            }
            self.advance();
            let rhs = self.parse_expr(r_bp)?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, EvalError> {
        match self.advance() {
            Some((Token::Number(value), _)) => Ok(Expr::Number(value)),
            Some((Token::Ident(name), _)) => {
                if matches!(self.peek(), Some((Token::LParen, _))) {
                    self.advance();
                    let args = self.parse_args()?;
                    Ok(Expr::Call { name, args })
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some((Token::Minus, _)) => {
                // Unary minus binds looser than power: -2^2 parses as -(2^2)
                let operand = self.parse_expr(5)?;
                Ok(Expr::Neg(Box::new(operand)))
            }
            Some((Token::Plus, _)) => self.parse_expr(5),
            Some((Token::LParen, _)) => {
                let inner = self.parse_expr(0)?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some((_, offset)) => Err(EvalError::UnexpectedToken(offset)),
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, EvalError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some((Token::RParen, _))) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr(0)?);
            match self.advance() {
                Some((Token::Comma, _)) => continue,
                Some((Token::RParen, _)) => return Ok(args),
                Some((_, offset)) => return Err(EvalError::UnexpectedToken(offset)),
                None => return Err(EvalError::UnexpectedEnd),
            }
        }
    }
}

/// Reject identifiers and call targets outside the allow-listed namespace
/// before anything is evaluated.
fn validate(expr: &Expr) -> Result<(), EvalError> {
    match expr {
        Expr::Number(_) => Ok(()),
        Expr::Ident(name) => {
            if constant(name).is_none() {
                return Err(EvalError::UnknownIdentifier(name.clone()));
            }
            Ok(())
        }
        Expr::Neg(operand) => validate(operand),
        Expr::Binary { lhs, rhs, .. } => {
            validate(lhs)?;
            validate(rhs)
        }
        Expr::Call { name, args } => {
            let Some(expected) = function_arity(name) else {
                return Err(EvalError::UnknownFunction(name.clone()));
            };
            if args.len() != expected {
                return Err(EvalError::WrongArity {
                    name: name.clone(),
                    expected,
                    got: args.len(),
                });
            }
            for arg in args {
                validate(arg)?;
            }
            Ok(())
        }
    }
}

fn eval(expr: &Expr) -> Result<f64, EvalError> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Ident(name) => {
            constant(name).ok_or_else(|| EvalError::UnknownIdentifier(name.clone()))
        }
        Expr::Neg(operand) => Ok(-eval(operand)?),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs)?;
            let rhs = eval(rhs)?;
            match op {
                BinaryOp::Add => Ok(lhs + rhs),
                BinaryOp::Sub => Ok(lhs - rhs),
                BinaryOp::Mul => Ok(lhs * rhs),
                BinaryOp::Div => {
                    if rhs == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    Ok(lhs / rhs)
                }
                BinaryOp::Mod => {
                    if rhs == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    Ok(lhs.rem_euclid(rhs))
                }
                BinaryOp::Pow => Ok(lhs.powf(rhs)),
            }
        }
        Expr::Call { name, args } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(eval(arg)?);
            }
            apply(name, &values)
        }
    }
}

fn apply(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let unary = |f: fn(f64) -> f64| f(args[0]);
    let value = match (name, args.len()) {
        ("sqrt", 1) => unary(f64::sqrt),
        ("abs", 1) | ("fabs", 1) => unary(f64::abs),
        ("floor", 1) => unary(f64::floor),
        ("ceil", 1) => unary(f64::ceil),
        ("round", 1) => unary(f64::round),
        ("trunc", 1) => unary(f64::trunc),
        ("exp", 1) => unary(f64::exp),
        ("log", 1) => unary(f64::ln),
        ("log2", 1) => unary(f64::log2),
        ("log10", 1) => unary(f64::log10),
        ("sin", 1) => unary(f64::sin),
        ("cos", 1) => unary(f64::cos),
        ("tan", 1) => unary(f64::tan),
        ("asin", 1) => unary(f64::asin),
        ("acos", 1) => unary(f64::acos),
        ("atan", 1) => unary(f64::atan),
        ("sinh", 1) => unary(f64::sinh),
        ("cosh", 1) => unary(f64::cosh),
        ("tanh", 1) => unary(f64::tanh),
        ("degrees", 1) => unary(f64::to_degrees),
        ("radians", 1) => unary(f64::to_radians),
        ("pow", 2) => args[0].powf(args[1]),
        ("atan2", 2) => args[0].atan2(args[1]),
        ("hypot", 2) => args[0].hypot(args[1]),
        ("fmod", 2) => {
            if args[1] == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            args[0] % args[1]
        }
        ("min", 2) => args[0].min(args[1]),
        ("max", 2) => args[0].max(args[1]),
        _ => return Err(EvalError::UnknownFunction(name.to_string())),
    };
    Ok(value)
}
