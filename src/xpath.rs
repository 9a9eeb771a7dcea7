//! A parser for the XPath 1.0 expressions found in templates.
//!
//! Nothing is evaluated. The typed tree lets the checker and the normalizer
//! recognize the shapes they care about (`@attr`, equality tests, function
//! calls) and treat everything else as unknown.
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExprError {
    #[error("Unexpected end of expression")]
    UnexpectedEnd,
    #[error("Unexpected token {0}")]
    UnexpectedToken(String),
    #[error("Unterminated string literal")]
    UnterminatedLiteral,
    #[error("Unexpected character '{0}'")]
    UnexpectedCharacter(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Or,
    And,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Plus,
    Minus,
    Multiply,
    Div,
    Mod,
    Union,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::Or => "or",
            Operator::And => "and",
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Div => "div",
            Operator::Mod => "mod",
            Operator::Union => "|",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Ancestor,
    AncestorOrSelf,
    Attribute,
    Child,
    Descendant,
    DescendantOrSelf,
    Following,
    FollowingSibling,
    Namespace,
    Parent,
    Preceding,
    PrecedingSibling,
    SelfAxis,
}

impl Axis {
    const ALL: [Axis; 13] = [
        Axis::Ancestor,
        Axis::AncestorOrSelf,
        Axis::Attribute,
        Axis::Child,
        Axis::Descendant,
        Axis::DescendantOrSelf,
        Axis::Following,
        Axis::FollowingSibling,
        Axis::Namespace,
        Axis::Parent,
        Axis::Preceding,
        Axis::PrecedingSibling,
        Axis::SelfAxis,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            Axis::Ancestor => "ancestor",
            Axis::AncestorOrSelf => "ancestor-or-self",
            Axis::Attribute => "attribute",
            Axis::Child => "child",
            Axis::Descendant => "descendant",
            Axis::DescendantOrSelf => "descendant-or-self",
            Axis::Following => "following",
            Axis::FollowingSibling => "following-sibling",
            Axis::Namespace => "namespace",
            Axis::Parent => "parent",
            Axis::Preceding => "preceding",
            Axis::PrecedingSibling => "preceding-sibling",
            Axis::SelfAxis => "self",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeTest {
    /// A name, `*` or `prefix:*`.
    Name(String),
    Node,
    Text,
    Comment,
    ProcessingInstruction(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Number(f64),
    Variable(String),
    Function {
        name: String,
        arguments: Vec<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Operator,
        right: Box<Expr>,
    },
    Negate(Box<Expr>),
    /// A location path. `.` is a relative path of one `self::node()` step.
    Path { absolute: bool, steps: Vec<Step> },
    /// A primary expression with predicates, followed by location steps.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

// Functions whose result is a number or a boolean, whatever the input.
const SCALAR_FUNCTIONS: &[&str] = &[
    "boolean",
    "ceiling",
    "contains",
    "count",
    "false",
    "floor",
    "lang",
    "last",
    "not",
    "number",
    "position",
    "round",
    "starts-with",
    "string-length",
    "sum",
    "true",
];

// Functions whose result is made of their arguments.
const STRING_FUNCTIONS: &[&str] = &[
    "concat",
    "normalize-space",
    "string",
    "substring",
    "substring-after",
    "substring-before",
    "translate",
];

impl Expr {
    /// Parse an expression.
    ///
    /// ```rust
    /// use tagrules::Expr;
    ///
    /// let expr = Expr::parse("@id")?;
    /// assert_eq!(expr.as_attribute(), Some("id"));
    /// assert!(Expr::parse("count(document('x'))")?.calls_function("document"));
    /// # Ok::<(), tagrules::ExprError>(())
    /// ```
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, position: 0 };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::UnexpectedToken(token.to_string())),
        }
    }

    /// The attribute name if the expression is exactly `@name`.
    pub fn as_attribute(&self) -> Option<&str> {
        match self {
            Expr::Path {
                absolute: false,
                steps,
            } => match steps.as_slice() {
                [Step {
                    axis: Axis::Attribute,
                    test: NodeTest::Name(name),
                    predicates,
                }] if predicates.is_empty() && !name.contains('*') => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether the expression is `.`.
    pub fn is_context_item(&self) -> bool {
        matches!(self, Expr::Path { absolute: false, steps } if matches!(
            steps.as_slice(),
            [Step { axis: Axis::SelfAxis, test: NodeTest::Node, predicates }] if predicates.is_empty()
        ))
    }

    /// Whether the expression calls the named function anywhere, including
    /// in predicates and arguments.
    pub fn calls_function(&self, name: &str) -> bool {
        let in_steps = |steps: &[Step]| {
            steps
                .iter()
                .flat_map(|step| &step.predicates)
                .any(|predicate| predicate.calls_function(name))
        };
        match self {
            Expr::Literal(_) | Expr::Number(_) | Expr::Variable(_) => false,
            Expr::Function {
                name: function,
                arguments,
            } => function == name || arguments.iter().any(|a| a.calls_function(name)),
            Expr::Binary { left, right, .. } => {
                left.calls_function(name) || right.calls_function(name)
            }
            Expr::Negate(expr) => expr.calls_function(name),
            Expr::Path { steps, .. } => in_steps(steps),
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                primary.calls_function(name)
                    || predicates.iter().any(|p| p.calls_function(name))
                    || in_steps(steps)
            }
        }
    }

    /// The attributes whose values can end up in the string value of this
    /// expression, evaluated against the tag's own node.
    ///
    /// Literals, numbers and booleans contribute nothing. `None` means the
    /// expression cannot be assessed, e.g. it reads elements, variables or
    /// anything computed by an unknown function.
    pub fn sources(&self) -> Option<Vec<String>> {
        match self {
            Expr::Literal(_) | Expr::Number(_) => Some(Vec::new()),
            Expr::Path { .. } => self.as_attribute().map(|name| vec![name.to_string()]),
            Expr::Function { name, arguments } => {
                if SCALAR_FUNCTIONS.contains(&name.as_str()) {
                    return Some(Vec::new());
                }
                // Without arguments they read the context node.
                if !STRING_FUNCTIONS.contains(&name.as_str()) || arguments.is_empty() {
                    return None;
                }
                let mut sources = Vec::new();
                for argument in arguments {
                    for source in argument.sources()? {
                        if !sources.contains(&source) {
                            sources.push(source);
                        }
                    }
                }
                Some(sources)
            }
            Expr::Binary {
                operator: Operator::Union,
                ..
            } => None,
            Expr::Binary { .. } | Expr::Negate(_) => Some(Vec::new()),
            Expr::Variable(_) | Expr::Filter { .. } => None,
        }
    }

    /// Decompose a disjunction of equality tests against a single variable
    /// part, e.g. `@x = 1 or @x = 'a'`, into the variable part and the
    /// values it is compared to.
    pub fn equality_terms(&self) -> Option<(String, Vec<String>)> {
        let mut terms = Vec::new();
        self.collect_disjunction(&mut terms);
        let mut key: Option<String> = None;
        let mut values = Vec::new();
        for term in terms {
            let Expr::Binary {
                left,
                operator: Operator::Equal,
                right,
            } = term
            else {
                return None;
            };
            let (variable, constant) = match (left.constant_value(), right.constant_value()) {
                (None, Some(value)) => (left, value),
                (Some(value), None) => (right, value),
                _ => return None,
            };
            if !variable.is_comparable() {
                return None;
            }
            let variable = variable.to_string();
            match &key {
                Some(key) if *key != variable => return None,
                Some(_) => {}
                None => key = Some(variable),
            }
            values.push(constant);
        }
        key.map(|key| (key, values))
    }

    fn collect_disjunction<'a>(&'a self, terms: &mut Vec<&'a Expr>) {
        match self {
            Expr::Binary {
                left,
                operator: Operator::Or,
                right,
            } => {
                left.collect_disjunction(terms);
                right.collect_disjunction(terms);
            }
            _ => terms.push(self),
        }
    }

    fn constant_value(&self) -> Option<String> {
        match self {
            Expr::Literal(value) => Some(value.clone()),
            Expr::Number(number) => Some(format_number(*number)),
            _ => None,
        }
    }

    fn is_comparable(&self) -> bool {
        matches!(self, Expr::Variable(_)) || self.as_attribute().is_some() || self.is_context_item()
    }
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

impl Display for Step {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match (&self.axis, &self.test) {
            (Axis::SelfAxis, NodeTest::Node) if self.predicates.is_empty() => {
                return f.write_str(".")
            }
            (Axis::Parent, NodeTest::Node) if self.predicates.is_empty() => {
                return f.write_str("..")
            }
            (Axis::Attribute, _) => f.write_str("@")?,
            (Axis::Child, _) => {}
            (axis, _) => write!(f, "{}::", axis.as_str())?,
        }
        match &self.test {
            NodeTest::Name(name) => f.write_str(name)?,
            NodeTest::Node => f.write_str("node()")?,
            NodeTest::Text => f.write_str("text()")?,
            NodeTest::Comment => f.write_str("comment()")?,
            NodeTest::ProcessingInstruction(None) => f.write_str("processing-instruction()")?,
            NodeTest::ProcessingInstruction(Some(target)) => {
                write!(f, "processing-instruction('{}')", target)?
            }
        }
        for predicate in &self.predicates {
            write!(f, "[{}]", predicate)?;
        }
        Ok(())
    }
}

fn write_steps(f: &mut Formatter<'_>, steps: &[Step], absolute: bool) -> std::fmt::Result {
    if absolute {
        f.write_str("/")?;
    }
    for (index, step) in steps.iter().enumerate() {
        if index > 0 {
            f.write_str("/")?;
        }
        write!(f, "{}", step)?;
    }
    Ok(())
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(value) if value.contains('\'') => write!(f, "\"{}\"", value),
            Expr::Literal(value) => write!(f, "'{}'", value),
            Expr::Number(number) => f.write_str(&format_number(*number)),
            Expr::Variable(name) => write!(f, "${}", name),
            Expr::Function { name, arguments } => {
                write!(f, "{}(", name)?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", argument)?;
                }
                f.write_str(")")
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => write!(f, "({} {} {})", left, operator.as_str(), right),
            Expr::Negate(expr) => write!(f, "-{}", expr),
            Expr::Path { absolute, steps } => write_steps(f, steps, *absolute),
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                write!(f, "{}", primary)?;
                for predicate in predicates {
                    write!(f, "[{}]", predicate)?;
                }
                if !steps.is_empty() {
                    f.write_str("/")?;
                    write_steps(f, steps, false)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Literal(String),
    Number(f64),
    Variable(String),
    NameTest(String),
    NodeType(String),
    FunctionName(String),
    AxisName(String),
    Operator(Operator),
    Slash,
    DoubleSlash,
    At,
    Dot,
    DotDot,
    DoubleColon,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Literal(value) => write!(f, "'{}'", value),
            Token::Number(number) => write!(f, "{}", format_number(*number)),
            Token::Variable(name) => write!(f, "${}", name),
            Token::NameTest(name)
            | Token::NodeType(name)
            | Token::FunctionName(name)
            | Token::AxisName(name) => write!(f, "'{}'", name),
            Token::Operator(operator) => write!(f, "'{}'", operator.as_str()),
            Token::Slash => f.write_str("'/'"),
            Token::DoubleSlash => f.write_str("'//'"),
            Token::At => f.write_str("'@'"),
            Token::Dot => f.write_str("'.'"),
            Token::DotDot => f.write_str("'..'"),
            Token::DoubleColon => f.write_str("'::'"),
            Token::LeftParen => f.write_str("'('"),
            Token::RightParen => f.write_str("')'"),
            Token::LeftBracket => f.write_str("'['"),
            Token::RightBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

const NODE_TYPES: &[&str] = &["comment", "node", "processing-instruction", "text"];

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// A `*` or a name is an operator unless there is no preceding token or
    /// the preceding token is `@`, `::`, `(`, `[`, `,` or an operator.
    fn operator_expected(&self) -> bool {
        match self.tokens.last() {
            None => false,
            Some(token) => !matches!(
                token,
                Token::At
                    | Token::DoubleColon
                    | Token::LeftParen
                    | Token::LeftBracket
                    | Token::Comma
                    | Token::Operator(_)
                    | Token::Slash
                    | Token::DoubleSlash
            ),
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
    }

    fn next_is(&mut self, expected: char) -> bool {
        self.chars.next_if(|(_, c)| *c == expected).is_some()
    }

    fn name(&mut self, start: usize) -> &'a str {
        let mut end = self.source.len();
        while let Some((index, c)) = self.chars.peek().copied() {
            if !is_name_char(c) {
                end = index;
                break;
            }
            self.chars.next();
        }
        &self.source[start..end]
    }

    fn rest(&mut self) -> &'a str {
        match self.chars.peek() {
            Some((index, _)) => &self.source[*index..],
            None => "",
        }
    }

    fn number(&mut self, start: usize) -> Result<Token, ExprError> {
        let mut end = self.source.len();
        while let Some((index, c)) = self.chars.peek().copied() {
            if !(c.is_ascii_digit() || c == '.') {
                end = index;
                break;
            }
            self.chars.next();
        }
        let text = &self.source[start..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExprError::UnexpectedToken(format!("'{}'", text)))
    }

    fn qualified_name(&mut self, start: usize) -> Result<Token, ExprError> {
        let local = self.name(start);
        // `prefix:local` or `prefix:*`, but not `axis::`
        let rest = self.rest();
        let name = if rest.starts_with(':') && !rest.starts_with("::") {
            self.chars.next();
            match self.chars.peek().copied() {
                Some((_, '*')) => {
                    self.chars.next();
                    format!("{}:*", local)
                }
                Some((index, c)) if is_name_start(c) => {
                    self.chars.next();
                    format!("{}:{}", local, self.name(index))
                }
                _ => return Err(ExprError::UnexpectedCharacter(':')),
            }
        } else {
            local.to_string()
        };

        if self.operator_expected() {
            return match name.as_str() {
                "and" => Ok(Token::Operator(Operator::And)),
                "or" => Ok(Token::Operator(Operator::Or)),
                "div" => Ok(Token::Operator(Operator::Div)),
                "mod" => Ok(Token::Operator(Operator::Mod)),
                _ => Err(ExprError::UnexpectedToken(format!("'{}'", name))),
            };
        }

        let rest = self.rest().trim_start();
        if rest.starts_with("::") {
            return Ok(Token::AxisName(name));
        }
        if rest.starts_with('(') {
            if NODE_TYPES.contains(&name.as_str()) {
                return Ok(Token::NodeType(name));
            }
            return Ok(Token::FunctionName(name));
        }
        Ok(Token::NameTest(name))
    }

    fn literal(&mut self, quote: char) -> Result<Token, ExprError> {
        let mut value = String::new();
        for (_, c) in self.chars.by_ref() {
            if c == quote {
                return Ok(Token::Literal(value));
            }
            value.push(c);
        }
        Err(ExprError::UnterminatedLiteral)
    }

    fn token(&mut self) -> Result<Option<Token>, ExprError> {
        self.skip_whitespace();
        let Some((start, c)) = self.chars.next() else {
            return Ok(None);
        };
        let token = match c {
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            ',' => Token::Comma,
            '@' => Token::At,
            '|' => Token::Operator(Operator::Union),
            '+' => Token::Operator(Operator::Plus),
            '-' => Token::Operator(Operator::Minus),
            '=' => Token::Operator(Operator::Equal),
            '!' if self.next_is('=') => Token::Operator(Operator::NotEqual),
            '<' if self.next_is('=') => Token::Operator(Operator::LessOrEqual),
            '<' => Token::Operator(Operator::Less),
            '>' if self.next_is('=') => Token::Operator(Operator::GreaterOrEqual),
            '>' => Token::Operator(Operator::Greater),
            '/' if self.next_is('/') => Token::DoubleSlash,
            '/' => Token::Slash,
            ':' if self.next_is(':') => Token::DoubleColon,
            '"' | '\'' => self.literal(c)?,
            '$' => {
                let Some((index, c)) = self.chars.next() else {
                    return Err(ExprError::UnexpectedEnd);
                };
                if !is_name_start(c) {
                    return Err(ExprError::UnexpectedCharacter(c));
                }
                match self.qualified_name(index)? {
                    Token::NameTest(name)
                    | Token::FunctionName(name)
                    | Token::NodeType(name)
                    | Token::AxisName(name) => Token::Variable(name),
                    token => return Err(ExprError::UnexpectedToken(token.to_string())),
                }
            }
            '*' if self.operator_expected() => Token::Operator(Operator::Multiply),
            '*' => Token::NameTest("*".to_string()),
            '.' if self.next_is('.') => Token::DotDot,
            '.' if matches!(self.chars.peek(), Some((_, c)) if c.is_ascii_digit()) => {
                self.number(start)?
            }
            '.' => Token::Dot,
            c if c.is_ascii_digit() => self.number(start)?,
            c if is_name_start(c) => self.qualified_name(start)?,
            c => return Err(ExprError::UnexpectedCharacter(c)),
        };
        Ok(Some(token))
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut lexer = Lexer {
        chars: source.char_indices().peekable(),
        source,
        tokens: Vec::new(),
    };
    while let Some(token) = lexer.token()? {
        lexer.tokens.push(token);
    }
    Ok(lexer.tokens)
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn next(&mut self) -> Result<Token, ExprError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or(ExprError::UnexpectedEnd)?;
        self.position += 1;
        Ok(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.next()? {
            token if token == expected => Ok(()),
            token => Err(ExprError::UnexpectedToken(token.to_string())),
        }
    }

    fn eat_operator(&mut self, operators: &[Operator]) -> Option<Operator> {
        match self.peek() {
            Some(Token::Operator(operator)) if operators.contains(operator) => {
                let operator = *operator;
                self.position += 1;
                Some(operator)
            }
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        self.binary(0)
    }

    /// Binary operators by increasing precedence. Unary minus binds tighter
    /// than all of them but looser than `|`.
    fn binary(&mut self, level: usize) -> Result<Expr, ExprError> {
        const LEVELS: &[&[Operator]] = &[
            &[Operator::Or],
            &[Operator::And],
            &[Operator::Equal, Operator::NotEqual],
            &[
                Operator::Less,
                Operator::LessOrEqual,
                Operator::Greater,
                Operator::GreaterOrEqual,
            ],
            &[Operator::Plus, Operator::Minus],
            &[Operator::Multiply, Operator::Div, Operator::Mod],
        ];
        let Some(operators) = LEVELS.get(level) else {
            return self.unary();
        };
        let mut left = self.binary(level + 1)?;
        while let Some(operator) = self.eat_operator(operators) {
            let right = self.binary(level + 1)?;
            left = Expr::Binary {
                left: Box::new(left),
                operator,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_operator(&[Operator::Minus]).is_some() {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.union()
    }

    fn union(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.path()?;
        while self.eat_operator(&[Operator::Union]).is_some() {
            let right = self.path()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: Operator::Union,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn path(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(
                Token::Variable(_)
                | Token::LeftParen
                | Token::Literal(_)
                | Token::Number(_)
                | Token::FunctionName(_),
            ) => self.filter(),
            Some(Token::Slash) => {
                self.position += 1;
                let steps = if self.step_follows() {
                    self.relative_path()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.position += 1;
                let mut steps = vec![descendant_or_self()];
                steps.extend(self.relative_path()?);
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(_) => Ok(Expr::Path {
                absolute: false,
                steps: self.relative_path()?,
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn filter(&mut self) -> Result<Expr, ExprError> {
        let primary = self.primary()?;
        let predicates = self.predicates()?;
        let mut steps = Vec::new();
        if self.eat(&Token::Slash) {
            steps = self.relative_path()?;
        } else if self.eat(&Token::DoubleSlash) {
            steps.push(descendant_or_self());
            steps.extend(self.relative_path()?);
        }
        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next()? {
            Token::Variable(name) => Ok(Expr::Variable(name)),
            Token::Literal(value) => Ok(Expr::Literal(value)),
            Token::Number(number) => Ok(Expr::Number(number)),
            Token::LeftParen => {
                let expr = self.expr()?;
                self.expect(Token::RightParen)?;
                Ok(expr)
            }
            Token::FunctionName(name) => {
                self.expect(Token::LeftParen)?;
                let mut arguments = Vec::new();
                if !self.eat(&Token::RightParen) {
                    loop {
                        arguments.push(self.expr()?);
                        if self.eat(&Token::RightParen) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                Ok(Expr::Function { name, arguments })
            }
            token => Err(ExprError::UnexpectedToken(token.to_string())),
        }
    }

    fn step_follows(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::NameTest(_)
                    | Token::NodeType(_)
                    | Token::AxisName(_)
                    | Token::At
                    | Token::Dot
                    | Token::DotDot
            )
        )
    }

    fn relative_path(&mut self) -> Result<Vec<Step>, ExprError> {
        let mut steps = vec![self.step()?];
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self());
                steps.push(self.step()?);
            } else {
                return Ok(steps);
            }
        }
    }

    fn step(&mut self) -> Result<Step, ExprError> {
        let axis = match self.next()? {
            Token::Dot => return Ok(self_node()),
            Token::DotDot => {
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                })
            }
            Token::At => Axis::Attribute,
            Token::AxisName(name) => {
                self.expect(Token::DoubleColon)?;
                Axis::ALL
                    .into_iter()
                    .find(|axis| axis.as_str() == name)
                    .ok_or(ExprError::UnexpectedToken(format!("'{}'", name)))?
            }
            _ => {
                self.position -= 1;
                Axis::Child
            }
        };
        let test = match self.next()? {
            Token::NameTest(name) => NodeTest::Name(name),
            Token::NodeType(name) => {
                self.expect(Token::LeftParen)?;
                let test = match name.as_str() {
                    "comment" => NodeTest::Comment,
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    _ => match self.peek() {
                        Some(Token::Literal(target)) => {
                            let target = target.clone();
                            self.position += 1;
                            NodeTest::ProcessingInstruction(Some(target))
                        }
                        _ => NodeTest::ProcessingInstruction(None),
                    },
                };
                self.expect(Token::RightParen)?;
                test
            }
            token => return Err(ExprError::UnexpectedToken(token.to_string())),
        };
        Ok(Step {
            axis,
            test,
            predicates: self.predicates()?,
        })
    }

    fn predicates(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LeftBracket) {
            predicates.push(self.expr()?);
            self.expect(Token::RightBracket)?;
        }
        Ok(predicates)
    }
}

fn self_node() -> Step {
    Step {
        axis: Axis::SelfAxis,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}
