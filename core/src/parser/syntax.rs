// Syntax structures shared by the parser, the compiler and the VM.

use core::{cell::RefCell, fmt, ops::Range};

use bumpalo::Bump;
use hashbrown::{DefaultHashBuilder, HashMap};

/// Side table mapping arena-allocated nodes to their source spans.
///
/// Nodes are keyed by address, so a node must be looked up through the same
/// reference the parser allocated.
#[derive(Debug)]
pub struct AnnotatedSource<'a, T> {
    pub source: &'a str,
    spans: RefCell<HashMap<*const T, Span, DefaultHashBuilder, &'a Bump>>,
}

impl<'a, T> AnnotatedSource<'a, T> {
    pub fn new(arena: &'a Bump, source: &'a str) -> Self {
        Self {
            source,
            spans: RefCell::new(HashMap::new_in(arena)),
        }
    }
    pub fn add_span(&self, node: &T, span: Span) {
        let p = node as *const _;
        self.spans.borrow_mut().insert(p, span);
    }
    pub fn span_of(&self, node: &T) -> Option<Span> {
        let p = node as *const _;
        self.spans.borrow().get(&p).cloned()
    }
    pub fn snippet(&self, span: Span) -> &str {
        &self.source[span.0]
    }
}

/// Byte range into the script source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Span(pub Range<usize>);

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self(start..end)
    }
    pub fn combine(a: &Span, b: &Span) -> Span {
        Span::new(a.0.start, b.0.end)
    }
    pub fn str_of<'a>(&self, source: &'a str) -> &'a str {
        &source[self.0.start..self.0.end]
    }

    /// 1-based line and column (in characters) of the span start.
    pub fn line_col(&self, source: &str) -> (usize, usize) {
        let start = self.0.start.min(source.len());
        let before = source.get(..start).unwrap_or(source);
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = before[line_start..].chars().count() + 1;
        (line, column)
    }
}

impl From<pest::Span<'_>> for Span {
    fn from(s: pest::Span<'_>) -> Self {
        Self(s.start()..s.end())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

/// `x++` and `x--`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StepOp {
    Incr,
    Decr,
}

impl StepOp {
    pub fn symbol(self) -> &'static str {
        match self {
            StepOp::Incr => "++",
            StepOp::Decr => "--",
        }
    }
}

/// Short-circuiting logical operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BoolOp::And => "&&",
            BoolOp::Or => "||",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Neq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Le => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Ge => ">=",
        }
    }
}

macro_rules! impl_display_symbol {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.symbol())
                }
            }
        )*
    };
}

impl_display_symbol!(BinaryOp, UnaryOp, StepOp, BoolOp, ComparisonOp);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = "let a = 1;\nprint(a);\n  dkv(\"x\");";
        assert_eq!(Span::new(0, 3).line_col(source), (1, 1));
        assert_eq!(Span::new(11, 16).line_col(source), (2, 1));
        assert_eq!(Span::new(23, 26).line_col(source), (3, 3));
    }

    #[test]
    fn test_line_col_counts_characters() {
        let source = "print(\"é\"); x";
        let pos = source.find('x').unwrap();
        assert_eq!(Span::new(pos, pos + 1).line_col(source), (1, 13));
    }

    #[test]
    fn test_annotated_source_keys_by_address() {
        let arena = Bump::new();
        let source = "1 + 1";
        let table: AnnotatedSource<'_, u32> = AnnotatedSource::new(&arena, source);

        // Equal values at different addresses keep their own spans.
        let left: &u32 = arena.alloc(1);
        let right: &u32 = arena.alloc(1);
        table.add_span(left, Span::new(0, 1));
        table.add_span(right, Span::new(4, 5));

        assert_eq!(table.span_of(left), Some(Span::new(0, 1)));
        assert_eq!(table.span_of(right), Some(Span::new(4, 5)));
        assert_eq!(table.span_of(&1), None);
        assert_eq!(table.snippet(Span::new(4, 5)), "1");
    }

    #[test]
    fn test_combine() {
        let a = Span::new(2, 4);
        let b = Span::new(7, 9);
        assert_eq!(Span::combine(&a, &b), Span::new(2, 9));
        assert_eq!(Span::combine(&a, &b).str_of("0123456789"), "2345678");
    }
}
