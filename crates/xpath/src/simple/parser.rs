use super::lexer::{Token, tokenize};
use crate::error::XPathError;

/// Functions the built-in evaluator knows; anything else is a static error.
const FUNCTIONS: &[&str] = &[
    "instance",
    "index",
    "count",
    "last",
    "position",
    "string",
    "number",
    "boolean",
    "not",
    "true",
    "false",
    "concat",
    "sum",
    "string-length",
    "normalize-space",
    "contains",
    "starts-with",
    "floor",
    "ceiling",
    "round",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Attribute,
    SelfAxis,
    Parent,
    Descendant,
    DescendantOrSelf,
    Ancestor,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "attribute" => Self::Attribute,
            "self" => Self::SelfAxis,
            "parent" => Self::Parent,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "ancestor" => Self::Ancestor,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathStart {
    Root,
    Context,
    Filter(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Variable(String),
    Function(String, Vec<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Filter(Box<Expr>, Vec<Expr>),
    Path(PathStart, Vec<Step>),
}

pub fn parse(expression: &str) -> Result<Expr, XPathError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser {
        expression,
        tokens,
        cursor: 0,
    };
    let parsed = parser.or_expr()?;
    if parser.cursor < parser.tokens.len() {
        return Err(parser.error("unexpected trailing tokens"));
    }
    Ok(parsed)
}

struct Parser<'src> {
    expression: &'src str,
    tokens: Vec<Token>,
    cursor: usize,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> XPathError {
        XPathError::static_error(self.expression, message)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token, message: &str) -> Result<(), XPathError> {
        if self.eat(expected) { Ok(()) } else { Err(self.error(message)) }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.and_expr()?;
        while self.eat_keyword("or") {
            let right = self.and_expr()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.equality_expr()?;
        while self.eat_keyword("and") {
            let right = self.equality_expr()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality_expr(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.relational_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => return Ok(left),
            };
            self.cursor += 1;
            let right = self.relational_expr()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn relational_expr(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.additive_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::LtEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::GtEq,
                _ => return Ok(left),
            };
            self.cursor += 1;
            let right = self.additive_expr()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn additive_expr(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.multiplicative_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.cursor += 1;
            let right = self.multiplicative_expr()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative_expr(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.unary_expr()?;
        loop {
            let operator = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Name(name)) if name == "div" => BinaryOp::Div,
                Some(Token::Name(name)) if name == "mod" => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.cursor += 1;
            let right = self.unary_expr()?;
            left = Expr::Binary(operator, Box::new(left), Box::new(right));
        }
    }

    fn unary_expr(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Negate(Box::new(self.unary_expr()?)));
        }
        self.union_expr()
    }

    fn union_expr(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Variable(_) | Token::LParen | Token::Literal(_) | Token::Number(_)) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen) && !matches!(name.as_str(), "text" | "node")
            }
            _ => false,
        }
    }

    fn path_expr(&mut self) -> Result<Expr, XPathError> {
        if self.starts_primary() {
            let primary = self.primary_expr()?;
            let mut predicates = Vec::new();
            while self.peek() == Some(&Token::LBracket) {
                predicates.push(self.predicate()?);
            }
            let filtered = if predicates.is_empty() {
                primary
            } else {
                Expr::Filter(Box::new(primary), predicates)
            };
            let mut steps = Vec::new();
            if self.continue_relative_path(&mut steps)? {
                return Ok(Expr::Path(PathStart::Filter(Box::new(filtered)), steps));
            }
            return Ok(filtered);
        }

        let mut steps = Vec::new();
        if self.eat(&Token::Slash) {
            if self.starts_step() {
                steps.push(self.step()?);
                self.continue_relative_path(&mut steps)?;
            }
            return Ok(Expr::Path(PathStart::Root, steps));
        }
        if self.eat(&Token::DoubleSlash) {
            steps.push(descendant_or_self());
            steps.push(self.step()?);
            self.continue_relative_path(&mut steps)?;
            return Ok(Expr::Path(PathStart::Root, steps));
        }
        if !self.starts_step() {
            return Err(self.error("expected an expression"));
        }
        steps.push(self.step()?);
        self.continue_relative_path(&mut steps)?;
        Ok(Expr::Path(PathStart::Context, steps))
    }

    fn continue_relative_path(&mut self, steps: &mut Vec<Step>) -> Result<bool, XPathError> {
        let mut extended = false;
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self());
                steps.push(self.step()?);
            } else {
                return Ok(extended);
            }
            extended = true;
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(name)), Some(Token::DoubleColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(name).ok_or_else(|| self.error("unknown axis"))?;
            self.cursor += 2;
            axis
        } else {
            Axis::Child
        };
        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) if matches!(name.as_str(), "text" | "node") && self.peek() == Some(&Token::LParen) => {
                self.cursor += 1;
                self.expect(&Token::RParen, "expected `)` after node type test")?;
                if name == "text" { NodeTest::Text } else { NodeTest::Node }
            }
            Some(Token::Name(name)) => NodeTest::Name(name),
            _ => return Err(self.error("expected a node test")),
        };
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.predicate()?);
        }
        Ok(Step { axis, test, predicates })
    }

    fn predicate(&mut self) -> Result<Expr, XPathError> {
        self.expect(&Token::LBracket, "expected `[`")?;
        let predicate = self.or_expr()?;
        self.expect(&Token::RBracket, "expected `]`")?;
        Ok(predicate)
    }

    fn primary_expr(&mut self) -> Result<Expr, XPathError> {
        match self.advance() {
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Literal(text)) => Ok(Expr::Literal(text)),
            Some(Token::Number(number)) => Ok(Expr::Number(number)),
            Some(Token::LParen) => {
                let inner = self.or_expr()?;
                self.expect(&Token::RParen, "expected `)`")?;
                Ok(inner)
            }
            Some(Token::Name(name)) => {
                let local = name.rsplit(':').next().unwrap_or(&name).to_owned();
                if !FUNCTIONS.contains(&local.as_str()) {
                    return Err(self.error(&format!("unknown function `{name}`")));
                }
                self.expect(&Token::LParen, "expected `(`")?;
                let mut arguments = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        arguments.push(self.or_expr()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma, "expected `,` or `)`")?;
                    }
                }
                Ok(Expr::Function(local, arguments))
            }
            _ => Err(self.error("expected a primary expression")),
        }
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}
