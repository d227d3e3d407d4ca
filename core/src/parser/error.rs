use crate::api::{Diagnostic, Severity};
use crate::parser::{Rule, Span};

/// Parser error with the location of the first malformed construct.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

/// Specific kinds of parse errors
#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    /// Unexpected token
    UnexpectedToken { expected: String, found: String },
    /// Unclosed delimiter
    UnclosedDelimiter { delimiter: char },
    /// Invalid number literal
    InvalidNumber { text: String },
    /// Malformed escape sequence inside a string literal
    InvalidEscape { message: String },
    /// Maximum nesting depth exceeded
    MaxDepthExceeded { max_depth: usize },
    /// Other parse errors (catch-all for Pest errors we don't specifically handle)
    Other { message: String },
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Convert to a Diagnostic for API boundary
    pub fn to_diagnostic(&self, source: &str) -> Diagnostic {
        let (message, code, help) = match &self.kind {
            ParseErrorKind::UnexpectedToken { expected, found } => (
                format!("Expected {}, found {}", expected, found),
                "P001",
                vec![],
            ),
            ParseErrorKind::UnclosedDelimiter { delimiter } => (
                format!("Unclosed delimiter '{}'", delimiter),
                "P002",
                vec!["Add the missing closing delimiter".to_string()],
            ),
            ParseErrorKind::InvalidNumber { text } => (
                format!("Invalid number literal '{}'", text),
                "P003",
                vec!["Check the number format".to_string()],
            ),
            ParseErrorKind::MaxDepthExceeded { max_depth } => (
                format!("Nesting depth exceeds maximum of {} levels", max_depth),
                "P004",
                vec!["Reduce nesting or split the script into smaller blocks".to_string()],
            ),
            ParseErrorKind::InvalidEscape { message } => (
                format!("Invalid string literal: {}", message),
                "P005",
                vec![r#"Supported escapes are \n \r \t \0 \\ \" \' \uNNNN and \UNNNNNNNN"#.to_string()],
            ),
            ParseErrorKind::Other { message } => (message.clone(), "P999", vec![]),
        };

        Diagnostic::new(Severity::Error, message, self.span.clone(), source)
            .with_code(code)
            .with_help(help)
    }
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let diagnostic = self.to_diagnostic("");
        write!(f, "{}: {}", diagnostic.severity, diagnostic.message)?;
        if let Some(ref code) = diagnostic.code {
            write!(f, " [{}]", code)?;
        }
        write!(f, " at {}..{}", self.span.0.start, self.span.0.end)
    }
}

impl std::error::Error for ParseError {}

/// Convert Pest error to human-readable ParseError
pub fn convert_pest_error(err: pest::error::Error<Rule>) -> ParseError {
    use pest::error::ErrorVariant;

    let span = match err.location {
        pest::error::InputLocation::Pos(pos) => Span(pos..pos),
        pest::error::InputLocation::Span((start, end)) => Span(start..end),
    };

    let kind = match err.variant {
        ErrorVariant::ParsingError {
            positives,
            negatives,
        } => ParseErrorKind::UnexpectedToken {
            expected: format_expected_rules(&positives),
            found: format_found_rules(&negatives),
        },
        ErrorVariant::CustomError { message } => ParseErrorKind::Other { message },
    };

    ParseError::new(kind, span)
}

fn describe_rule(rule: Rule) -> &'static str {
    match rule {
        Rule::semi => "';'",
        Rule::colon => "':'",
        Rule::comma => "','",
        Rule::assign => "'='",
        Rule::lparen => "'('",
        Rule::rparen => "')'",
        Rule::lbrace => "'{'",
        Rule::rbrace => "'}'",
        Rule::kw_let
        | Rule::kw_print
        | Rule::kw_if
        | Rule::kw_while
        | Rule::kw_for
        | Rule::kw_return => "statement",
        Rule::kw_fn => "function declaration",
        Rule::kw_else => "'else'",
        Rule::type_name => "type name",
        Rule::ident => "identifier",
        Rule::number | Rule::string | Rule::boolean | Rule::nil => "literal",
        Rule::or
        | Rule::and
        | Rule::eq
        | Rule::neq
        | Rule::le
        | Rule::ge
        | Rule::lt
        | Rule::gt
        | Rule::add
        | Rule::sub
        | Rule::mul
        | Rule::div
        | Rule::rem
        | Rule::incr
        | Rule::decr => "operator",
        Rule::EOI => "end of input",
        _ => "expression",
    }
}

/// Format expected rules in a human-readable way
fn format_expected_rules(rules: &[Rule]) -> String {
    let mut concepts: Vec<&str> = Vec::new();
    for rule in rules {
        let concept = describe_rule(*rule);
        if !concepts.contains(&concept) {
            concepts.push(concept);
        }
    }

    match concepts.split_last() {
        None => "something else".to_string(),
        Some((only, [])) => only.to_string(),
        Some((last, rest)) => format!("{} or {}", rest.join(", "), last),
    }
}

/// Format found rules in a human-readable way
fn format_found_rules(rules: &[Rule]) -> String {
    match rules.first() {
        None => "unexpected token".to_string(),
        Some(rule) => describe_rule(*rule).to_string(),
    }
}
