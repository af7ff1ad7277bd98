use crate::table::TIME_COLUMN;
use crate::traits::{Evaluation, ModelFunction, Parameters, StateVars};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;

/// OpCodes for the Stack-based Virtual Machine.
#[derive(Debug, Clone, Copy)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value held in a slot. Slot layout: `[t, params.., states.., assigned..]`.
    LoadSlot(usize),
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Neg,
    Call(Function),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Exp,
    Ln,
    Sqrt,
    Abs,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "exp" => Function::Exp,
            "ln" => Function::Ln,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            _ => return None,
        })
    }

    fn apply(self, x: f64) -> f64 {
        match self {
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Exp => x.exp(),
            Function::Ln => x.ln(),
            Function::Sqrt => x.sqrt(),
            Function::Abs => x.abs(),
        }
    }
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating equations.
pub struct VM;

impl VM {
    /// Runs `bytecode` against `slots`. Compiled code is balanced, so the stack holds
    /// exactly one value at the end.
    pub fn execute(bytecode: &Bytecode, slots: &[f64], stack: &mut Vec<f64>) -> f64 {
        stack.clear();

        for op in &bytecode.ops {
            match *op {
                OpCode::LoadConst(val) => stack.push(val),
                OpCode::LoadSlot(idx) => stack.push(slots[idx]),
                OpCode::Neg => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(-a);
                }
                OpCode::Call(f) => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(f.apply(a));
                }
                binary => {
                    let b = stack.pop().unwrap_or(f64::NAN);
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(match binary {
                        OpCode::Add => a + b,
                        OpCode::Sub => a - b,
                        OpCode::Mul => a * b,
                        OpCode::Div => a / b,
                        _ => a.powf(b),
                    });
                }
            }
        }

        stack.pop().unwrap_or(f64::NAN)
    }
}

// --- AST & Parser ---

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, char, Box<Expr>), // + - * / ^
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Resolves names to slots while assignments are compiled in order.
struct Compiler {
    slots: HashMap<String, usize>,
}

impl Compiler {
    fn new() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }

    fn declare(&mut self, name: &str) -> Result<usize> {
        if self.slots.contains_key(name) {
            bail!("`{}` is defined more than once", name);
        }
        let idx = self.slots.len();
        self.slots.insert(name.to_string(), idx);
        Ok(idx)
    }

    fn compile(&self, expr: &Expr) -> Result<Bytecode> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<()> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                let idx = self
                    .slots
                    .get(name)
                    .ok_or_else(|| anyhow!("Unknown variable or parameter: {}", name))?;
                ops.push(OpCode::LoadSlot(*idx));
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    '+' => OpCode::Add,
                    '-' => OpCode::Sub,
                    '*' => OpCode::Mul,
                    '/' => OpCode::Div,
                    '^' => OpCode::Pow,
                    _ => bail!("Unknown binary operator: {}", op),
                });
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                let f = Function::from_name(func)
                    .ok_or_else(|| anyhow!("Unknown function: {}", func))?;
                self.compile_recursive(arg, ops)?;
                ops.push(OpCode::Call(f));
            }
        }
        Ok(())
    }
}

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, String> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!("Unexpected trailing input in `{}`", input));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                let exponent_sign =
                    (d == '-' || d == '+') && num_str.ends_with(|p| p == 'e' || p == 'E');
                if d.is_ascii_digit() || d == '.' || d == 'e' || d == 'E' || exponent_sign {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let value = num_str
                .parse()
                .map_err(|_| format!("Invalid number literal `{}`", num_str))?;
            tokens.push(Token::Number(value));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => return Err(format!("Unexpected character `{}`", other)),
            });
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn parse_expression(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_factor()?;

        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some('+'),
            Some(Token::Minus) => Some('-'),
            _ => None,
        } {
            self.consume();
            let right = self.parse_factor()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some('*'),
            Some(Token::Slash) => Some('/'),
            _ => None,
        } {
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let expr = self.parse_unary()?;
            return Ok(Expr::Neg(Box::new(expr)));
        }
        self.parse_power()
    }

    // Right-associative, binds tighter than unary minus: -x^2 == -(x^2).
    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), '^', Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.consume();
                    let arg = self.parse_expression()?;
                    if let Some(Token::RParen) = self.consume() {
                        Ok(Expr::Call(name, Box::new(arg)))
                    } else {
                        Err("Expected ')'".to_string())
                    }
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                if let Some(Token::RParen) = self.consume() {
                    Ok(expr)
                } else {
                    Err("Expected ')'".to_string())
                }
            }
            Some(token) => Err(format!("Unexpected token {:?}", token)),
            None => Err("Unexpected end of expression".to_string()),
        }
    }
}

// --- ExpressionModel ---

/// A model function defined by text assignments evaluated in calculation order,
/// e.g. `["concG = G / vol", "UGGC = concG * kGC", "dGdt = PGOG - UGGC"]`.
///
/// Every assigned name appears in the evaluation. An input missing from the maps
/// passed to `evaluate` reads as NaN, which the engine reports as a numeric error.
#[derive(Debug, Clone)]
pub struct ExpressionModel {
    parameter_names: Vec<String>,
    state_names: Vec<String>,
    assigned: Vec<String>,
    equations: Vec<Bytecode>,
}

impl ExpressionModel {
    pub fn new<S: AsRef<str>>(
        parameter_names: &[String],
        state_names: &[String],
        assignments: &[S],
    ) -> Result<Self> {
        let mut compiler = Compiler::new();
        compiler.declare(TIME_COLUMN)?;
        for name in parameter_names.iter().chain(state_names) {
            compiler.declare(name)?;
        }

        let mut assigned = Vec::with_capacity(assignments.len());
        let mut equations = Vec::with_capacity(assignments.len());
        for line in assignments {
            let line = line.as_ref();
            let (lhs, rhs) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("Expected `name = expression`, got `{}`", line))?;
            let name = lhs.trim();
            if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                bail!("Invalid assignment target `{}`", name);
            }
            let expr = parse(rhs).map_err(|err| anyhow!("In `{}`: {}", name, err))?;
            // Compiled before declaring, so a name cannot refer to itself.
            let code = compiler.compile(&expr)?;
            compiler.declare(name)?;
            assigned.push(name.to_string());
            equations.push(code);
        }

        Ok(Self {
            parameter_names: parameter_names.to_vec(),
            state_names: state_names.to_vec(),
            assigned,
            equations,
        })
    }

    /// Names this model outputs, in calculation order.
    pub fn assigned_names(&self) -> &[String] {
        &self.assigned
    }
}

impl ModelFunction for ExpressionModel {
    fn evaluate(&self, parameters: &Parameters, state: &StateVars, t: f64) -> Evaluation {
        let capacity =
            1 + self.parameter_names.len() + self.state_names.len() + self.assigned.len();
        let mut slots = Vec::with_capacity(capacity);
        slots.push(t);
        for name in &self.parameter_names {
            slots.push(parameters.get(name).copied().unwrap_or(f64::NAN));
        }
        for name in &self.state_names {
            slots.push(state.get(name).copied().unwrap_or(f64::NAN));
        }

        let mut stack = Vec::with_capacity(16);
        let mut out = Evaluation::with_capacity(self.assigned.len());
        for (name, code) in self.assigned.iter().zip(&self.equations) {
            let value = VM::execute(code, &slots, &mut stack);
            slots.push(value);
            out.insert(name.clone(), value);
        }
        out
    }
}
