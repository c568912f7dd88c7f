//! Compiler from specification strings to [`Distribution`]s.
//!
//! Grammar (whitespace is insignificant):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('^' unary)?
//! primary := number | 'x' | 'pi' | 'e'
//!          | TEMPLATE '(' expr (',' expr)* ')'
//!          | function '(' expr ')'
//!          | '(' expr ')'
//! ```
//!
//! A specification made only of templates joined by `+` is a mixture: each
//! template is discretized on its own and the densities are added bin by bin.
//! Anything else is a free-form density in `x`, where a template term stands
//! for its analytic density.

use crate::distribution::{Distribution, trapezoid_densities, valid_params};
use crate::template::Template;
use sumlab_error::{DistributionError, ParseError, SumlabError};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Caret => "^".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let bytes: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let (pos, ch) = bytes[i];
        let single = match ch {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '^' => Some(Token::Caret),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            tokens.push((token, pos));
            i += 1;
            continue;
        }

        if ch.is_whitespace() {
            i += 1;
        } else if ch.is_ascii_digit() || ch == '.' {
            let start = i;
            while i < bytes.len() && (bytes[i].1.is_ascii_digit() || bytes[i].1 == '.') {
                i += 1;
            }
            // exponent only when followed by a digit, so `2e` stays `2` then `e`
            if i < bytes.len() && matches!(bytes[i].1, 'e' | 'E') {
                let mut j = i + 1;
                if j < bytes.len() && matches!(bytes[j].1, '+' | '-') {
                    j += 1;
                }
                if j < bytes.len() && bytes[j].1.is_ascii_digit() {
                    i = j;
                    while i < bytes.len() && bytes[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let end = bytes.get(i).map_or(src.len(), |&(p, _)| p);
            let literal = &src[pos..end];
            let value = literal.parse::<f64>().map_err(|_| ParseError::InvalidNumber {
                literal: literal.to_string(),
                pos: bytes[start].0,
            })?;
            tokens.push((Token::Number(value), pos));
        } else if ch.is_alphabetic() || ch == '_' {
            while i < bytes.len() && (bytes[i].1.is_alphanumeric() || bytes[i].1 == '_') {
                i += 1;
            }
            let end = bytes.get(i).map_or(src.len(), |&(p, _)| p);
            tokens.push((Token::Ident(src[pos..end].to_string()), pos));
        } else {
            return Err(ParseError::UnexpectedChar { ch, pos });
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Log,
    Sqrt,
    Abs,
}

impl Func {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "exp" => Func::Exp,
            "ln" => Func::Ln,
            "log" => Func::Log,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.sin(),
            Func::Cos => v.cos(),
            Func::Tan => v.tan(),
            Func::Exp => v.exp(),
            Func::Ln => v.ln(),
            Func::Log => v.log10(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone)]
enum Expr {
    Num(f64),
    Var,
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
    Template(Template),
}

impl Expr {
    fn eval(&self, x: f64) -> f64 {
        match self {
            Expr::Num(v) => *v,
            Expr::Var => x,
            Expr::Neg(e) => -e.eval(x),
            Expr::Binary(op, l, r) => {
                let (a, b) = (l.eval(x), r.eval(x));
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                }
            }
            Expr::Call(f, e) => f.apply(e.eval(x)),
            Expr::Template(t) => t.density(x),
        }
    }

    fn depends_on_x(&self) -> bool {
        match self {
            Expr::Num(_) => false,
            Expr::Var | Expr::Template(_) => true,
            Expr::Neg(e) | Expr::Call(_, e) => e.depends_on_x(),
            Expr::Binary(_, l, r) => l.depends_on_x() || r.depends_on_x(),
        }
    }

    /// The templates of a pure `T1 + T2 + ...` sum, in source order.
    fn mixture_terms<'a>(&'a self, out: &mut Vec<&'a Template>) -> bool {
        match self {
            Expr::Template(t) => {
                out.push(t);
                true
            }
            Expr::Binary(BinOp::Add, l, r) => l.mixture_terms(out) && r.mixture_terms(out),
            _ => false,
        }
    }
}

/// Deepest nesting of `expr`/`unary`/`power` the parser will descend into.
const MAX_DEPTH: usize = 256;

/// Most operator and call nodes one expression may hold. Evaluating and
/// dropping the tree recurses once per level, so long chains are bounded too.
const MAX_NODES: usize = 4096;

struct ExprParser<'a> {
    tokens: &'a [(Token, usize)],
    pos: usize,
    depth: usize,
    nodes: usize,
    lower: f64,
    upper: f64,
}

impl<'a> ExprParser<'a> {
    /// Source offset of the next token, or of the last one at end of input.
    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or(self.tokens.last())
            .map_or(0, |(_, pos)| *pos)
    }

    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SumlabError>,
    ) -> Result<T, SumlabError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::TooDeep { pos: self.offset() }.into());
        }
        self.depth += 1;
        let out = f(self);
        self.depth -= 1;
        out
    }

    /// Count one interior node of the expression tree.
    fn grow(&mut self, node: Expr) -> Result<Expr, SumlabError> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            return Err(ParseError::TooComplex {
                limit: MAX_NODES,
                pos: self.offset(),
            }
            .into());
        }
        Ok(node)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<&'a (Token, usize)> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Token, expected: &'static str) -> Result<(), SumlabError> {
        match self.next() {
            Some((t, _)) if *t == want => Ok(()),
            Some((t, pos)) => Err(ParseError::UnexpectedToken {
                found: t.describe(),
                expected,
                pos: *pos,
            }
            .into()),
            None => Err(ParseError::UnexpectedEnd { expected }.into()),
        }
    }

    fn expr(&mut self) -> Result<Expr, SumlabError> {
        self.nested(|p| {
            let mut lhs = p.term()?;
            loop {
                let op = match p.peek() {
                    Some(Token::Plus) => BinOp::Add,
                    Some(Token::Minus) => BinOp::Sub,
                    _ => return Ok(lhs),
                };
                p.pos += 1;
                let rhs = p.term()?;
                lhs = p.grow(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))?;
            }
        })
    }

    fn term(&mut self) -> Result<Expr, SumlabError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = self.grow(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))?;
        }
    }

    fn unary(&mut self) -> Result<Expr, SumlabError> {
        self.nested(|p| match p.peek() {
            Some(Token::Minus) => {
                p.pos += 1;
                let operand = p.unary()?;
                p.grow(Expr::Neg(Box::new(operand)))
            }
            Some(Token::Plus) => {
                p.pos += 1;
                p.unary()
            }
            _ => p.power(),
        })
    }

    fn power(&mut self) -> Result<Expr, SumlabError> {
        self.nested(|p| {
            let base = p.primary()?;
            if let Some(Token::Caret) = p.peek() {
                p.pos += 1;
                let exponent = p.unary()?;
                return p.grow(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
            }
            Ok(base)
        })
    }

    fn primary(&mut self) -> Result<Expr, SumlabError> {
        const EXPECTED: &str = "a number, `x`, a call, or `(`";
        let Some((token, pos)) = self.next() else {
            return Err(ParseError::UnexpectedEnd { expected: EXPECTED }.into());
        };
        match token {
            Token::Number(v) => Ok(Expr::Num(*v)),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "`)`")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    self.call(name)
                } else {
                    match name.as_str() {
                        "x" => Ok(Expr::Var),
                        "pi" => Ok(Expr::Num(std::f64::consts::PI)),
                        "e" => Ok(Expr::Num(std::f64::consts::E)),
                        _ => Err(ParseError::UnknownIdentifier { name: name.clone() }.into()),
                    }
                }
            }
            other => Err(ParseError::UnexpectedToken {
                found: other.describe(),
                expected: EXPECTED,
                pos: *pos,
            }
            .into()),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn arguments(&mut self) -> Result<Vec<Expr>, SumlabError> {
        let mut args = vec![self.expr()?];
        loop {
            match self.next() {
                Some((Token::Comma, _)) => args.push(self.expr()?),
                Some((Token::RParen, _)) => return Ok(args),
                Some((t, pos)) => {
                    return Err(ParseError::UnexpectedToken {
                        found: t.describe(),
                        expected: "`,` or `)`",
                        pos: *pos,
                    }
                    .into());
                }
                None => return Err(ParseError::UnexpectedEnd { expected: "`)`" }.into()),
            }
        }
    }

    fn call(&mut self, name: &str) -> Result<Expr, SumlabError> {
        let args = self.arguments()?;

        if let Some(arity) = Template::arity(name) {
            if args.len() != arity {
                return Err(ParseError::WrongArity {
                    name: name.to_string(),
                    expected: arity,
                    found: args.len(),
                }
                .into());
            }
            let mut values = Vec::with_capacity(arity);
            for (index, arg) in args.iter().enumerate() {
                if arg.depends_on_x() {
                    return Err(ParseError::NonConstantArgument {
                        name: name.to_string(),
                        index,
                    }
                    .into());
                }
                values.push(arg.eval(0.0));
            }
            let template = Template::from_call(name, &values, self.lower, self.upper)
                .ok_or_else(|| ParseError::UnknownTemplate { name: name.to_string() })??;
            return Ok(Expr::Template(template));
        }

        let Some(func) = Func::lookup(name) else {
            return Err(if name.starts_with(char::is_uppercase) {
                ParseError::UnknownTemplate { name: name.to_string() }.into()
            } else {
                ParseError::UnknownFunction { name: name.to_string() }.into()
            });
        };
        if args.len() != 1 {
            return Err(ParseError::WrongArity {
                name: name.to_string(),
                expected: 1,
                found: args.len(),
            }
            .into());
        }
        let arg = args.into_iter().next().map(Box::new);
        match arg {
            Some(arg) => self.grow(Expr::Call(func, arg)),
            None => Err(ParseError::UnexpectedEnd { expected: "an argument" }.into()),
        }
    }
}

/// Stateless compiler bound to one bin grid.
#[derive(Debug, Clone, Copy)]
pub struct Parser {
    bins: i64,
    lower: f64,
    upper: f64,
}

impl Parser {
    pub fn new(bins: i64, lower: f64, upper: f64) -> Result<Self, DistributionError> {
        valid_params(bins, lower, upper)?;
        Ok(Self { bins, lower, upper })
    }

    pub fn parse(&self, spec: &str) -> Result<Distribution, SumlabError> {
        let tokens = tokenize(spec)?;
        if tokens.is_empty() {
            return Err(ParseError::Empty.into());
        }

        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            nodes: 0,
            lower: self.lower,
            upper: self.upper,
        };
        let expr = parser.expr()?;
        if let Some((_, pos)) = tokens.get(parser.pos) {
            return Err(ParseError::TrailingInput { pos: *pos }.into());
        }

        let bins = usize::try_from(self.bins)
            .map_err(|_| DistributionError::TooManyBins(self.bins))?;
        let mut terms = Vec::new();
        let (pdf, clamped) = if expr.mixture_terms(&mut terms) {
            let mut total: Option<Vec<f64>> = None;
            for template in terms {
                let (pdf, _) =
                    trapezoid_densities(bins, self.lower, self.upper, |x| template.density(x))?;
                total = Some(match total {
                    None => pdf,
                    Some(acc) => acc.iter().zip(&pdf).map(|(a, b)| a + b).collect(),
                });
            }
            (total.unwrap_or_default(), Vec::new())
        } else {
            trapezoid_densities(bins, self.lower, self.upper, |x| expr.eval(x))?
        };

        Ok(Distribution::from_density(self.lower, self.upper, pdf, clamped)?)
    }
}

/// Parse `spec` on a `bins`-bin grid over `[lower, upper]`.
pub fn parse(spec: &str, bins: i64, lower: f64, upper: f64) -> Result<Distribution, SumlabError> {
    Parser::new(bins, lower, upper)?.parse(spec)
}
