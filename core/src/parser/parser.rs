use bumpalo::Bump;
use lazy_static::lazy_static;
use pest::Parser;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest_derive::Parser;

use crate::parser::{
    AnnotatedSource, BinaryOp, BoolOp, ComparisonOp, Expr, Literal, Param, ParseError,
    ParseErrorKind, ParsedScript, Span, StepOp, Stmt, TypeAnnotation, UnaryOp,
    error::convert_pest_error,
};
use crate::syntax::string_literal::unescape_string;

lazy_static! {
    // Note: precedence is defined lowest to highest.
    static ref PRATT_PARSER: PrattParser<Rule> = PrattParser::new()
        .op(Op::infix(Rule::or, Assoc::Left))            // `||`
        .op(Op::infix(Rule::and, Assoc::Left))           // `&&`
        .op(
            Op::infix(Rule::eq, Assoc::Left) |
            Op::infix(Rule::neq, Assoc::Left)
        )                                                // `==`, `!=`
        .op(
            Op::infix(Rule::lt, Assoc::Left) |
            Op::infix(Rule::le, Assoc::Left) |
            Op::infix(Rule::gt, Assoc::Left) |
            Op::infix(Rule::ge, Assoc::Left)
        )                                                // `<`, `<=`, `>`, `>=`
        .op(
            Op::infix(Rule::add, Assoc::Left) |
            Op::infix(Rule::sub, Assoc::Left)
        )                                                // `+`, `-`
        .op(
            Op::infix(Rule::mul, Assoc::Left) |
            Op::infix(Rule::div, Assoc::Left) |
            Op::infix(Rule::rem, Assoc::Left)
        )                                                // `*`, `/`, `%`
        .op(Op::prefix(Rule::neg) | Op::prefix(Rule::not)) // `-`, `!`
        ;
}

#[derive(Parser)]
#[grammar = "parser/dkv.pest"]
pub struct ScriptParser;

/// Default limit for nested blocks, parentheses and prefix operators.
pub const DEFAULT_MAX_DEPTH: usize = 128;

pub fn parse<'a>(arena: &'a Bump, source: &'a str) -> Result<ParsedScript<'a>, ParseError> {
    parse_with_max_depth(arena, source, DEFAULT_MAX_DEPTH)
}

/// Parse a script, rejecting nesting deeper than `max_depth`.
pub fn parse_with_max_depth<'a>(
    arena: &'a Bump,
    source: &'a str,
    max_depth: usize,
) -> Result<ParsedScript<'a>, ParseError> {
    let scan = scan_source(source, max_depth);
    if let Some(pos) = scan.too_deep_at {
        return Err(ParseError::new(
            ParseErrorKind::MaxDepthExceeded { max_depth },
            Span::new(pos, pos + 1),
        ));
    }

    let mut pairs = ScriptParser::parse(Rule::program, source).map_err(|err| {
        // A string running to the end of input makes pest report a confusing
        // location, so point at the opening quote instead.
        match scan.unclosed_string_at {
            Some(pos) => ParseError::new(
                ParseErrorKind::UnclosedDelimiter { delimiter: '"' },
                Span::new(pos, pos + 1),
            ),
            None => convert_pest_error(err),
        }
    })?;

    let program = pairs.next().ok_or_else(|| {
        ParseError::new(
            ParseErrorKind::Other {
                message: "missing program".to_string(),
            },
            Span::new(0, source.len()),
        )
    })?;

    let builder = AstBuilder {
        arena,
        exprs: arena.alloc(AnnotatedSource::new(arena, source)),
        stmts: arena.alloc(AnnotatedSource::new(arena, source)),
    };
    let statements = builder.statements(program.into_inner())?;

    Ok(ParsedScript {
        statements,
        exprs: builder.exprs,
        stmts: builder.stmts,
    })
}

struct Scan {
    too_deep_at: Option<usize>,
    unclosed_string_at: Option<usize>,
}

/// Lightweight pass over the raw text that tracks strings, comments, bracket
/// depth and runs of prefix operators. Runs before pest so that deeply nested
/// input never reaches the recursive descent or the Pratt parser.
///
/// Each `-` or `!` in operand position nests its operand one level deeper
/// than the enclosing brackets.
fn scan_source(source: &str, max_depth: usize) -> Scan {
    let too_deep = |pos| Scan {
        too_deep_at: Some(pos),
        unclosed_string_at: None,
    };

    let mut depth = 0usize;
    let mut prefix_run = 0usize;
    // True when the previous token ends an operand, so a `-` is binary.
    let mut after_operand = false;
    let mut string_start: Option<usize> = None;
    let mut chars = source.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        if string_start.is_some() {
            match ch {
                '\\' => {
                    chars.next();
                }
                '"' => {
                    string_start = None;
                    after_operand = true;
                }
                _ => {}
            }
            continue;
        }
        match ch {
            c if c.is_whitespace() => continue,
            '/' if matches!(chars.peek(), Some((_, '/'))) => {
                while let Some((_, c)) = chars.next() {
                    if c == '\n' {
                        break;
                    }
                }
                continue;
            }
            '-' | '!' if !after_operand => {
                prefix_run += 1;
                if depth + prefix_run > max_depth {
                    return too_deep(pos);
                }
                continue;
            }
            '"' => string_start = Some(pos),
            '(' | '{' => {
                depth += 1;
                if depth > max_depth {
                    return too_deep(pos);
                }
                after_operand = false;
            }
            ')' => {
                depth = depth.saturating_sub(1);
                after_operand = true;
            }
            '}' => {
                depth = depth.saturating_sub(1);
                after_operand = false;
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut end = pos + 1;
                while let Some(&(next, c)) = chars.peek() {
                    if !(c.is_ascii_alphanumeric() || c == '_' || c == '.') {
                        break;
                    }
                    end = next + 1;
                    chars.next();
                }
                // Keywords that are followed by an expression.
                after_operand = !matches!(&source[pos..end], "if" | "while" | "return");
            }
            _ => after_operand = false,
        }
        prefix_run = 0;
    }

    Scan {
        too_deep_at: None,
        unclosed_string_at: string_start,
    }
}

/// Punctuation and keyword tokens carry no information once parsed.
fn is_token(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::semi
            | Rule::colon
            | Rule::comma
            | Rule::assign
            | Rule::lparen
            | Rule::rparen
            | Rule::lbrace
            | Rule::rbrace
            | Rule::kw_let
            | Rule::kw_if
            | Rule::kw_else
            | Rule::kw_while
            | Rule::kw_for
            | Rule::kw_fn
            | Rule::kw_return
            | Rule::kw_print
            | Rule::kw_dkv
            | Rule::EOI
    )
}

fn significant<'a>(pairs: Pairs<'a, Rule>) -> impl Iterator<Item = Pair<'a, Rule>> {
    pairs.filter(|p| !is_token(p.as_rule()))
}

fn unexpected(pair: &Pair<'_, Rule>) -> ParseError {
    ParseError::new(
        ParseErrorKind::Other {
            message: format!("Unexpected {:?} in parse tree", pair.as_rule()),
        },
        pair.as_span().into(),
    )
}

fn missing(what: &str, span: Span) -> ParseError {
    ParseError::new(
        ParseErrorKind::Other {
            message: format!("Missing {}", what),
        },
        span,
    )
}

struct AstBuilder<'a> {
    arena: &'a Bump,
    exprs: &'a AnnotatedSource<'a, Expr<'a>>,
    stmts: &'a AnnotatedSource<'a, Stmt<'a>>,
}

impl<'a> AstBuilder<'a> {
    fn alloc_expr(&self, expr: Expr<'a>, span: Span) -> &'a Expr<'a> {
        let expr = self.arena.alloc(expr);
        self.exprs.add_span(expr, span);
        expr
    }

    fn alloc_stmt(&self, stmt: Stmt<'a>, span: Span) -> &'a Stmt<'a> {
        let stmt = self.arena.alloc(stmt);
        self.stmts.add_span(stmt, span);
        stmt
    }

    fn span_of(&self, expr: &Expr<'a>) -> Span {
        self.exprs.span_of(expr).unwrap_or_default()
    }

    fn statements(&self, pairs: Pairs<'a, Rule>) -> Result<&'a [&'a Stmt<'a>], ParseError> {
        let statements = significant(pairs)
            .map(|pair| self.statement(pair))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.arena.alloc_slice_copy(&statements))
    }

    fn statement(&self, pair: Pair<'a, Rule>) -> Result<&'a Stmt<'a>, ParseError> {
        let span: Span = pair.as_span().into();
        let stmt = match pair.as_rule() {
            Rule::let_stmt | Rule::let_clause => {
                let mut name = None;
                let mut ty = None;
                let mut init = None;
                for part in significant(pair.into_inner()) {
                    match part.as_rule() {
                        Rule::ident => name = Some(part.as_str()),
                        Rule::type_name => {
                            ty = Some(TypeAnnotation {
                                name: part.as_str(),
                                span: part.as_span().into(),
                            })
                        }
                        Rule::expression => init = Some(self.expr(part)?),
                        _ => return Err(unexpected(&part)),
                    }
                }
                Stmt::Let {
                    name: name.ok_or_else(|| missing("variable name", span.clone()))?,
                    ty,
                    init,
                }
            }
            Rule::assign_stmt | Rule::assign_clause => {
                let mut parts = significant(pair.into_inner());
                let name = parts
                    .next()
                    .ok_or_else(|| missing("variable name", span.clone()))?
                    .as_str();
                let value = self.expr(
                    parts
                        .next()
                        .ok_or_else(|| missing("assigned value", span.clone()))?,
                )?;
                Stmt::Assign { name, value }
            }
            Rule::print_stmt => {
                let args = significant(pair.into_inner())
                    .next()
                    .ok_or_else(|| missing("print arguments", span.clone()))?;
                Stmt::Print {
                    args: self.args(args)?,
                }
            }
            Rule::step_stmt | Rule::step_clause => {
                let mut name = None;
                let mut op = None;
                for part in significant(pair.into_inner()) {
                    match part.as_rule() {
                        Rule::ident => name = Some(part.as_str()),
                        Rule::incr => op = Some(StepOp::Incr),
                        Rule::decr => op = Some(StepOp::Decr),
                        _ => return Err(unexpected(&part)),
                    }
                }
                Stmt::Step {
                    name: name.ok_or_else(|| missing("variable name", span.clone()))?,
                    op: op.ok_or_else(|| missing("'++' or '--'", span.clone()))?,
                }
            }
            Rule::if_stmt => self.if_chain(pair, &span)?,
            Rule::while_stmt => {
                let mut parts = significant(pair.into_inner());
                let cond = self.expr(
                    parts
                        .next()
                        .ok_or_else(|| missing("condition", span.clone()))?,
                )?;
                let body = self.block_body(
                    parts
                        .next()
                        .ok_or_else(|| missing("loop body", span.clone()))?,
                )?;
                Stmt::While { cond, body }
            }
            Rule::for_stmt => {
                // The two `;` of the header separate init, condition and update.
                let mut section = 0;
                let mut init = None;
                let mut cond = None;
                let mut update = None;
                let mut body = None;
                for part in pair.into_inner() {
                    match part.as_rule() {
                        Rule::semi => section += 1,
                        Rule::let_clause | Rule::assign_clause | Rule::step_clause
                            if section == 0 =>
                        {
                            init = Some(self.statement(part)?)
                        }
                        Rule::assign_clause | Rule::step_clause => {
                            update = Some(self.statement(part)?)
                        }
                        Rule::expression => cond = Some(self.expr(part)?),
                        Rule::block => body = Some(self.block_body(part)?),
                        rule if is_token(rule) => {}
                        _ => return Err(unexpected(&part)),
                    }
                }
                Stmt::For {
                    init,
                    cond,
                    update,
                    body: body.ok_or_else(|| missing("loop body", span.clone()))?,
                }
            }
            Rule::fn_decl => {
                let mut parts = significant(pair.into_inner());
                let name = parts
                    .next()
                    .ok_or_else(|| missing("function name", span.clone()))?
                    .as_str();
                let params = self.params(
                    parts
                        .next()
                        .ok_or_else(|| missing("parameters", span.clone()))?,
                )?;
                let body = self.block_body(
                    parts
                        .next()
                        .ok_or_else(|| missing("function body", span.clone()))?,
                )?;
                Stmt::Fn { name, params, body }
            }
            Rule::return_stmt => {
                let value = significant(pair.into_inner())
                    .next()
                    .map(|p| self.expr(p))
                    .transpose()?;
                Stmt::Return(value)
            }
            Rule::block => Stmt::Block(self.statements(pair.into_inner())?),
            Rule::expr_stmt => {
                let expr = significant(pair.into_inner())
                    .next()
                    .ok_or_else(|| missing("expression", span.clone()))?;
                Stmt::Expr(self.expr(expr)?)
            }
            Rule::empty_stmt => Stmt::Empty,
            _ => return Err(unexpected(&pair)),
        };
        Ok(self.alloc_stmt(stmt, span))
    }

    /// Builds `if a {..} else if b {..} else {..}` as nested `If` statements,
    /// innermost first.
    fn if_chain(&self, pair: Pair<'a, Rule>, span: &Span) -> Result<Stmt<'a>, ParseError> {
        let end = span.0.end;
        let mut arms = Vec::new();
        let mut else_branch = None;
        let mut arm_start = span.0.start;
        let mut cond = None;

        for part in pair.into_inner() {
            match part.as_rule() {
                Rule::kw_if => arm_start = part.as_span().start(),
                Rule::expression => cond = Some(self.expr(part)?),
                Rule::block => {
                    let block_span: Span = part.as_span().into();
                    let body = self.block_body(part)?;
                    match cond.take() {
                        Some(cond) => arms.push((arm_start, cond, body)),
                        None => else_branch = Some(self.alloc_stmt(Stmt::Block(body), block_span)),
                    }
                }
                rule if is_token(rule) => {}
                _ => return Err(unexpected(&part)),
            }
        }

        while arms.len() > 1 {
            let Some((start, cond, then_block)) = arms.pop() else {
                break;
            };
            let arm = Stmt::If {
                cond,
                then_block,
                else_branch,
            };
            else_branch = Some(self.alloc_stmt(arm, Span::new(start, end)));
        }
        let (_, cond, then_block) = arms
            .pop()
            .ok_or_else(|| missing("condition", span.clone()))?;
        Ok(Stmt::If {
            cond,
            then_block,
            else_branch,
        })
    }

    fn params(&self, pair: Pair<'a, Rule>) -> Result<&'a [Param<'a>], ParseError> {
        let params = significant(pair.into_inner())
            .map(|param| {
                let span: Span = param.as_span().into();
                let mut parts = significant(param.into_inner());
                let name = parts
                    .next()
                    .ok_or_else(|| missing("parameter name", span.clone()))?
                    .as_str();
                let ty = parts.next().map(|ty| TypeAnnotation {
                    name: ty.as_str(),
                    span: ty.as_span().into(),
                });
                Ok(Param { name, ty, span })
            })
            .collect::<Result<Vec<_>, ParseError>>()?;
        Ok(self.arena.alloc_slice_fill_iter(params))
    }

    fn block_body(&self, pair: Pair<'a, Rule>) -> Result<&'a [&'a Stmt<'a>], ParseError> {
        match pair.as_rule() {
            Rule::block => self.statements(pair.into_inner()),
            _ => Err(unexpected(&pair)),
        }
    }

    fn args(&self, pair: Pair<'a, Rule>) -> Result<&'a [&'a Expr<'a>], ParseError> {
        let args = significant(pair.into_inner())
            .map(|p| self.expr(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.arena.alloc_slice_copy(&args))
    }

    fn expr(&self, pair: Pair<'a, Rule>) -> Result<&'a Expr<'a>, ParseError> {
        let span: Span = pair.as_span().into();
        match pair.as_rule() {
            Rule::expression => PRATT_PARSER
                .map_primary(|primary| self.expr(primary))
                .map_prefix(|op, rhs| {
                    let rhs = rhs?;
                    let op_span: Span = op.as_span().into();
                    let unary = match op.as_rule() {
                        Rule::neg => UnaryOp::Neg,
                        Rule::not => UnaryOp::Not,
                        _ => return Err(unexpected(&op)),
                    };
                    let span = Span::combine(&op_span, &self.span_of(rhs));
                    Ok(self.alloc_expr(Expr::Unary { op: unary, expr: rhs }, span))
                })
                .map_infix(|lhs, op, rhs| {
                    let (left, right) = (lhs?, rhs?);
                    let span = Span::combine(&self.span_of(left), &self.span_of(right));
                    let expr = match op.as_rule() {
                        Rule::add => binary(BinaryOp::Add, left, right),
                        Rule::sub => binary(BinaryOp::Sub, left, right),
                        Rule::mul => binary(BinaryOp::Mul, left, right),
                        Rule::div => binary(BinaryOp::Div, left, right),
                        Rule::rem => binary(BinaryOp::Rem, left, right),
                        Rule::and => Expr::Boolean { op: BoolOp::And, left, right },
                        Rule::or => Expr::Boolean { op: BoolOp::Or, left, right },
                        Rule::eq => comparison(ComparisonOp::Eq, left, right),
                        Rule::neq => comparison(ComparisonOp::Neq, left, right),
                        Rule::lt => comparison(ComparisonOp::Lt, left, right),
                        Rule::le => comparison(ComparisonOp::Le, left, right),
                        Rule::gt => comparison(ComparisonOp::Gt, left, right),
                        Rule::ge => comparison(ComparisonOp::Ge, left, right),
                        _ => return Err(unexpected(&op)),
                    };
                    Ok(self.alloc_expr(expr, span))
                })
                .parse(pair.into_inner()),

            Rule::grouped => {
                let inner = significant(pair.into_inner())
                    .next()
                    .ok_or_else(|| missing("expression", span.clone()))?;
                self.expr(inner)
            }

            Rule::number => {
                let text = pair.as_str();
                let value = text.parse::<f64>().map_err(|_| {
                    ParseError::new(
                        ParseErrorKind::InvalidNumber {
                            text: text.to_string(),
                        },
                        span.clone(),
                    )
                })?;
                Ok(self.alloc_expr(Expr::Literal(Literal::Number(value)), span))
            }

            Rule::string => {
                let inner = pair
                    .into_inner()
                    .next()
                    .ok_or_else(|| missing("string content", span.clone()))?;
                let start = inner.as_span().start();
                let value = unescape_string(self.arena, inner.as_str()).map_err(|err| {
                    let pos = start + err.pos();
                    ParseError::new(
                        ParseErrorKind::InvalidEscape {
                            message: err.to_string(),
                        },
                        Span::new(pos, pos + 2),
                    )
                })?;
                Ok(self.alloc_expr(Expr::Literal(Literal::Str(value)), span))
            }

            Rule::boolean => {
                let value = pair.as_str() == "true";
                Ok(self.alloc_expr(Expr::Literal(Literal::Bool(value)), span))
            }

            Rule::nil => Ok(self.alloc_expr(Expr::Literal(Literal::Nil), span)),

            Rule::ident => Ok(self.alloc_expr(Expr::Ident(pair.as_str()), span)),

            Rule::call => {
                let mut parts = significant(pair.into_inner());
                let name = parts
                    .next()
                    .ok_or_else(|| missing("function name", span.clone()))?
                    .as_str();
                let args = self.args(
                    parts
                        .next()
                        .ok_or_else(|| missing("arguments", span.clone()))?,
                )?;
                Ok(self.alloc_expr(Expr::Call { name, args }, span))
            }

            Rule::host_call => {
                let args = significant(pair.into_inner())
                    .next()
                    .ok_or_else(|| missing("arguments", span.clone()))?;
                let args = self.args(args)?;
                Ok(self.alloc_expr(Expr::HostCommand { args }, span))
            }

            _ => Err(unexpected(&pair)),
        }
    }
}

fn binary<'a>(op: BinaryOp, left: &'a Expr<'a>, right: &'a Expr<'a>) -> Expr<'a> {
    Expr::Binary { op, left, right }
}

fn comparison<'a>(op: ComparisonOp, left: &'a Expr<'a>, right: &'a Expr<'a>) -> Expr<'a> {
    Expr::Comparison { op, left, right }
}
