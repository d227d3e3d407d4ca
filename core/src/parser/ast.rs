use core::fmt;

use crate::parser::{
    BinaryOp, BoolOp, ComparisonOp, Span, StepOp, UnaryOp, syntax::AnnotatedSource,
};

/// A parsed script: top-level statements plus span tables for error reporting.
#[derive(Debug)]
pub struct ParsedScript<'a> {
    pub statements: &'a [&'a Stmt<'a>],
    pub exprs: &'a AnnotatedSource<'a, Expr<'a>>,
    pub stmts: &'a AnnotatedSource<'a, Stmt<'a>>,
}

impl<'a> ParsedScript<'a> {
    pub fn source(&self) -> &'a str {
        self.exprs.source
    }

    pub fn expr_span(&self, expr: &Expr<'a>) -> Span {
        self.exprs.span_of(expr).unwrap_or_default()
    }

    pub fn stmt_span(&self, stmt: &Stmt<'a>) -> Span {
        self.stmts.span_of(stmt).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt<'a> {
    /// `let name: type = init;` with both the annotation and the initializer optional.
    Let {
        name: &'a str,
        ty: Option<TypeAnnotation<'a>>,
        init: Option<&'a Expr<'a>>,
    },
    Assign {
        name: &'a str,
        value: &'a Expr<'a>,
    },
    Print {
        args: &'a [&'a Expr<'a>],
    },
    /// `x++;` or `x--;`
    Step {
        name: &'a str,
        op: StepOp,
    },
    If {
        cond: &'a Expr<'a>,
        then_block: &'a [&'a Stmt<'a>],
        // Either another `If` or a `Block`.
        else_branch: Option<&'a Stmt<'a>>,
    },
    While {
        cond: &'a Expr<'a>,
        body: &'a [&'a Stmt<'a>],
    },
    /// `for init; cond; update { body }`. `init` is a `Let`, `Assign` or
    /// `Step`; `update` an `Assign` or `Step`. A missing condition loops
    /// forever.
    For {
        init: Option<&'a Stmt<'a>>,
        cond: Option<&'a Expr<'a>>,
        update: Option<&'a Stmt<'a>>,
        body: &'a [&'a Stmt<'a>],
    },
    /// Top-level function declaration.
    Fn {
        name: &'a str,
        params: &'a [Param<'a>],
        body: &'a [&'a Stmt<'a>],
    },
    Return(Option<&'a Expr<'a>>),
    Block(&'a [&'a Stmt<'a>]),
    Expr(&'a Expr<'a>),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr<'a> {
    Binary {
        op: BinaryOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
    },
    Boolean {
        op: BoolOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
    },
    Comparison {
        op: ComparisonOp,
        left: &'a Expr<'a>,
        right: &'a Expr<'a>,
    },
    Unary {
        op: UnaryOp,
        expr: &'a Expr<'a>,
    },
    /// Call of a builtin or a declared function, e.g. `len(s)`.
    Call {
        name: &'a str,
        args: &'a [&'a Expr<'a>],
    },
    /// `dkv(...)`: a command sent to the host.
    HostCommand {
        args: &'a [&'a Expr<'a>],
    },
    Literal(Literal<'a>),
    Ident(&'a str),
}

impl<'a> Expr<'a> {
    pub fn as_ptr(&self) -> *const Self {
        self as *const _
    }
}

#[derive(Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Nil,
    Bool(bool),
    Number(f64),
    Str(&'a str),
}

impl fmt::Debug for Literal<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Nil => write!(f, "Nil"),
            Literal::Bool(b) => write!(f, "Bool({b})"),
            Literal::Number(n) => write!(f, "Number({n})"),
            Literal::Str(s) => write!(f, "Str({s:?})"),
        }
    }
}

/// A function parameter with its optional annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Param<'a> {
    pub name: &'a str,
    pub ty: Option<TypeAnnotation<'a>>,
    pub span: Span,
}

/// The `: type` part of a `let` or a parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation<'a> {
    pub name: &'a str,
    pub span: Span,
}
