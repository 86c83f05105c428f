//! Trellis parser.
//!
//! Converts source text into an [`ast::Module`](crate::ast::Module) with a location on
//! every node. Each logical line goes through the pest grammar; the block structure is
//! then rebuilt from indentation. The parser is purely syntactic: macro invocations are
//! ordinary subscripts, `with` blocks, decorators and names at this point.

use pest::{error::InputLocation, iterators::Pair, Parser};
use pest_derive::Parser;

use super::lines::{split_logical_lines, LogicalLine};
use crate::{
    ast::{Alias, BinOp, Constant, Expr, ExprKind, Loc, Module, Stmt, StmtKind, UnaryOp},
    err_at, err_msg, TrellisError,
};

#[derive(Parser)]
#[grammar = "syntax/grammar.pest"]
struct TrellisParser;

type ParseResult<T> = Result<T, TrellisError>;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Parses a whole source file.
pub fn parse_module(source: &str, filename: &str) -> ParseResult<Module> {
    parse_lines(source, filename).map_err(|e| e.with_source(filename, source))
}

/// Parses source text that must contain exactly one statement.
pub fn parse_statement(source: &str, filename: &str) -> ParseResult<Stmt> {
    let mut module = parse_module(source, filename)?;
    if module.body.len() != 1 {
        return Err(err_msg!(
            Parse,
            "{}: expected a single statement, found {}",
            filename,
            module.body.len()
        ));
    }
    module
        .body
        .pop()
        .ok_or_else(|| err_msg!(Internal, "statement vanished while parsing"))
}

/// Parses a single expression.
pub fn parse_expr(source: &str, filename: &str) -> ParseResult<Expr> {
    match parse_statement(source, filename)?.kind {
        StmtKind::Expr(expr) => Ok(expr),
        other => Err(err_msg!(
            Parse,
            "{}: expected an expression, found a {} statement",
            filename,
            Stmt::new(other).type_name()
        )),
    }
}

fn parse_lines(source: &str, filename: &str) -> ParseResult<Module> {
    let lines = split_logical_lines(source, filename)?;
    let parsed = lines
        .iter()
        .map(|line| parse_line(line, filename))
        .collect::<ParseResult<Vec<_>>>()?;
    let mut builder = BlockBuilder {
        lines: &parsed,
        filename,
        pos: 0,
    };
    let body = builder.block(0)?;
    Ok(Module::new(body))
}

// ============================================================================
// LINE LEVEL
// ============================================================================

#[derive(Debug, Clone)]
enum Header {
    Def { name: String, params: Vec<String> },
    Class { name: String },
    With { item: Expr, alias: Option<String> },
    If(Expr),
    Elif(Expr),
    Else,
    While(Expr),
    For { target: String, iter: Expr },
}

#[derive(Debug, Clone)]
enum LineItem {
    Simple(Vec<Stmt>),
    Decorator(Expr),
    /// A compound statement header and its inline body, if any.
    Header(Header, Vec<Stmt>),
}

#[derive(Debug, Clone)]
struct ParsedLine {
    loc: Loc,
    indent: usize,
    item: LineItem,
}

fn parse_line(line: &LogicalLine, filename: &str) -> ParseResult<ParsedLine> {
    let mut pairs = TrellisParser::parse(Rule::line, &line.text)
        .map_err(|e| convert_parse_error(e, line, filename))?;
    let line_pair = pairs
        .next()
        .ok_or_else(|| err_msg!(Internal, "grammar produced no line"))?;
    let item_pair = line_pair
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .ok_or_else(|| err_msg!(Internal, "grammar produced an empty line"))?;

    let builder = LineBuilder { line, filename };
    let item = match item_pair.as_rule() {
        Rule::decorator => {
            let expr = builder.first_inner(item_pair)?;
            LineItem::Decorator(builder.expr(expr)?)
        }
        Rule::simple_stmts => LineItem::Simple(builder.simple_stmts(item_pair)?),
        _ => {
            let (header, inline) = builder.header(item_pair)?;
            LineItem::Header(header, inline)
        }
    };

    Ok(ParsedLine {
        loc: line.start(),
        indent: line.indent,
        item,
    })
}

fn convert_parse_error(
    err: pest::error::Error<Rule>,
    line: &LogicalLine,
    filename: &str,
) -> TrellisError {
    let offset = match err.location {
        InputLocation::Pos(pos) => pos,
        InputLocation::Span((start, _)) => start,
    };
    let loc = line.loc_at(offset);
    err_at!(
        Parse,
        filename,
        Some(loc),
        "invalid syntax at column {}: {}",
        loc.col,
        err.variant.message()
    )
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_and
            | Rule::kw_as
            | Rule::kw_assert
            | Rule::kw_break
            | Rule::kw_class
            | Rule::kw_continue
            | Rule::kw_def
            | Rule::kw_elif
            | Rule::kw_else
            | Rule::kw_for
            | Rule::kw_from
            | Rule::kw_if
            | Rule::kw_import
            | Rule::kw_in
            | Rule::kw_lambda
            | Rule::kw_not
            | Rule::kw_or
            | Rule::kw_pass
            | Rule::kw_return
            | Rule::kw_while
            | Rule::kw_with
    )
}

/// Children of `pair` with keyword tokens removed.
fn significant(pair: Pair<'_, Rule>) -> Vec<Pair<'_, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule())).collect()
}

struct LineBuilder<'a> {
    line: &'a LogicalLine,
    filename: &'a str,
}

impl<'a> LineBuilder<'a> {
    fn loc(&self, pair: &Pair<'_, Rule>) -> Option<Loc> {
        Some(self.line.loc_at(pair.as_span().start()))
    }

    fn error(&self, pair: &Pair<'_, Rule>, message: &str) -> TrellisError {
        err_at!(Parse, self.filename, self.loc(pair), "{}", message)
    }

    fn first_inner<'i>(&self, pair: Pair<'i, Rule>) -> ParseResult<Pair<'i, Rule>> {
        let rule = pair.as_rule();
        significant(pair)
            .into_iter()
            .next()
            .ok_or_else(|| err_msg!(Internal, "grammar rule {:?} has no children", rule))
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn header(&self, pair: Pair<'_, Rule>) -> ParseResult<(Header, Vec<Stmt>)> {
        let rule = pair.as_rule();
        let mut parts = significant(pair);
        let has_inline = parts
            .last()
            .map_or(false, |p| p.as_rule() == Rule::simple_stmts);
        let inline = match parts.pop() {
            Some(stmts) if has_inline => self.simple_stmts(stmts)?,
            Some(other) => {
                parts.push(other);
                Vec::new()
            }
            None => Vec::new(),
        };
        let mut parts = parts.into_iter();

        let header = match rule {
            Rule::def_header => {
                let name = self.identifier(parts.next())?;
                let params = match parts.next() {
                    Some(list) => self.params(list),
                    None => Vec::new(),
                };
                Header::Def { name, params }
            }
            Rule::class_header => Header::Class {
                name: self.identifier(parts.next())?,
            },
            Rule::with_header => {
                let item = self.required_expr(parts.next())?;
                let alias = parts.next().map(|p| p.as_str().to_string());
                Header::With { item, alias }
            }
            Rule::if_header => Header::If(self.required_expr(parts.next())?),
            Rule::elif_header => Header::Elif(self.required_expr(parts.next())?),
            Rule::else_header => Header::Else,
            Rule::while_header => Header::While(self.required_expr(parts.next())?),
            Rule::for_header => {
                let target = self.identifier(parts.next())?;
                let iter = self.required_expr(parts.next())?;
                Header::For { target, iter }
            }
            other => return Err(err_msg!(Internal, "unexpected header rule {:?}", other)),
        };
        Ok((header, inline))
    }

    fn simple_stmts(&self, pair: Pair<'_, Rule>) -> ParseResult<Vec<Stmt>> {
        pair.into_inner().map(|p| self.simple_stmt(p)).collect()
    }

    fn simple_stmt(&self, pair: Pair<'_, Rule>) -> ParseResult<Stmt> {
        let loc = self.loc(&pair);
        let kind = match pair.as_rule() {
            Rule::import_from => self.import_from(pair)?,
            Rule::import_stmt => {
                let mut parts = significant(pair).into_iter();
                let module = parts
                    .next()
                    .map(|p| p.as_str().to_string())
                    .unwrap_or_default();
                let asname = parts.next().map(|p| p.as_str().to_string());
                StmtKind::Import { module, asname }
            }
            Rule::return_stmt => {
                let value = significant(pair)
                    .into_iter()
                    .next()
                    .map(|p| self.expr_list(p))
                    .transpose()?;
                StmtKind::Return(value)
            }
            Rule::pass_stmt => StmtKind::Pass,
            Rule::break_stmt => StmtKind::Break,
            Rule::continue_stmt => StmtKind::Continue,
            Rule::assert_stmt => {
                let mut parts = significant(pair).into_iter();
                let test = self.required_expr(parts.next())?;
                let msg = parts.next().map(|p| self.expr(p)).transpose()?;
                StmtKind::Assert { test, msg }
            }
            Rule::assign_stmt => {
                let mut parts = pair.into_inner();
                let target = self.target(parts.next())?;
                let _op = parts.next();
                let value = match parts.next() {
                    Some(p) => self.expr_list(p)?,
                    None => return Err(err_msg!(Internal, "assignment without a value")),
                };
                StmtKind::Assign { target, value }
            }
            Rule::aug_assign_stmt => {
                let mut parts = pair.into_inner();
                let target = self.target(parts.next())?;
                let op_text = parts.next().map(|p| p.as_str()).unwrap_or("+=");
                let op = BinOp::from_symbol(op_text.trim_end_matches('='))
                    .ok_or_else(|| err_msg!(Internal, "unknown operator {}", op_text))?;
                let value = self.required_expr(parts.next())?;
                let combined = Expr::at(
                    ExprKind::BinOp {
                        op,
                        left: Box::new(target.clone()),
                        right: Box::new(value),
                    },
                    target.loc,
                );
                StmtKind::Assign {
                    target,
                    value: combined,
                }
            }
            Rule::expr_stmt => StmtKind::Expr(self.expr_list(self.first_inner(pair)?)?),
            other => return Err(err_msg!(Internal, "unexpected statement rule {:?}", other)),
        };
        Ok(Stmt::at(kind, loc))
    }

    fn import_from(&self, pair: Pair<'_, Rule>) -> ParseResult<StmtKind> {
        let mut module = None;
        let mut level = 0;
        let mut names = Vec::new();
        for part in significant(pair) {
            match part.as_rule() {
                Rule::import_source => {
                    for piece in part.into_inner() {
                        match piece.as_rule() {
                            Rule::relative_dots => level = piece.as_str().len(),
                            _ => module = Some(piece.as_str().to_string()),
                        }
                    }
                }
                Rule::import_names => {
                    for alias in part.into_inner() {
                        let mut idents = significant(alias).into_iter();
                        let name = self.identifier(idents.next())?;
                        let asname = idents.next().map(|p| p.as_str().to_string());
                        names.push(Alias { name, asname });
                    }
                }
                _ => {}
            }
        }
        Ok(StmtKind::ImportFrom {
            module,
            level,
            names,
        })
    }

    fn target(&self, pair: Option<Pair<'_, Rule>>) -> ParseResult<Expr> {
        let pair = pair.ok_or_else(|| err_msg!(Internal, "assignment without a target"))?;
        let target = self.expr(pair)?;
        match target.kind {
            ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {
                Ok(target)
            }
            _ => Err(err_at!(
                Parse,
                self.filename,
                target.loc,
                "cannot assign to {}",
                target.type_name()
            )),
        }
    }

    fn params(&self, pair: Pair<'_, Rule>) -> Vec<String> {
        pair.into_inner().map(|p| p.as_str().to_string()).collect()
    }

    fn identifier(&self, pair: Option<Pair<'_, Rule>>) -> ParseResult<String> {
        pair.map(|p| p.as_str().to_string())
            .ok_or_else(|| err_msg!(Internal, "missing identifier"))
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn required_expr(&self, pair: Option<Pair<'_, Rule>>) -> ParseResult<Expr> {
        match pair {
            Some(p) => self.expr(p),
            None => Err(err_msg!(Internal, "missing expression")),
        }
    }

    /// A comma-separated list: one expression, or a tuple if there is a comma.
    fn expr_list(&self, pair: Pair<'_, Rule>) -> ParseResult<Expr> {
        let loc = self.loc(&pair);
        let trailing_comma = pair.as_str().trim_end().ends_with(',');
        let mut items = pair
            .into_inner()
            .map(|p| self.expr(p))
            .collect::<ParseResult<Vec<_>>>()?;
        if items.len() == 1 && !trailing_comma {
            if let Some(single) = items.pop() {
                return Ok(single);
            }
        }
        Ok(Expr::at(ExprKind::Tuple(items), loc))
    }

    fn expr(&self, pair: Pair<'_, Rule>) -> ParseResult<Expr> {
        let loc = self.loc(&pair);
        match pair.as_rule() {
            Rule::expr | Rule::paren_expr | Rule::postfix if pair.clone().into_inner().count() == 1 => {
                self.expr(self.first_inner(pair)?)
            }
            Rule::expr_list => self.expr_list(pair),

            Rule::lambda_expr => {
                let mut params = Vec::new();
                let mut body = None;
                for part in significant(pair) {
                    match part.as_rule() {
                        Rule::param_list => params = self.params(part),
                        _ => body = Some(self.expr(part)?),
                    }
                }
                let body = body.ok_or_else(|| err_msg!(Internal, "lambda without a body"))?;
                Ok(Expr::at(
                    ExprKind::Lambda {
                        params,
                        body: Box::new(body),
                    },
                    loc,
                ))
            }

            Rule::ternary => {
                let mut parts = significant(pair).into_iter();
                let body = self.required_expr(parts.next())?;
                match (parts.next(), parts.next()) {
                    (Some(test), Some(orelse)) => Ok(Expr::at(
                        ExprKind::IfExp {
                            test: Box::new(self.expr(test)?),
                            body: Box::new(body),
                            orelse: Box::new(self.expr(orelse)?),
                        },
                        loc,
                    )),
                    _ => Ok(body),
                }
            }

            Rule::or_expr | Rule::and_expr => {
                let op = if pair.as_rule() == Rule::or_expr {
                    BinOp::Or
                } else {
                    BinOp::And
                };
                let mut operands = significant(pair).into_iter();
                let mut acc = self.required_expr(operands.next())?;
                for operand in operands {
                    acc = Expr::at(
                        ExprKind::BinOp {
                            op,
                            left: Box::new(acc),
                            right: Box::new(self.expr(operand)?),
                        },
                        loc,
                    );
                }
                Ok(acc)
            }

            Rule::not_expr => {
                let mut inner = pair.into_inner();
                let first = inner
                    .next()
                    .ok_or_else(|| err_msg!(Internal, "empty not-expression"))?;
                if first.as_rule() == Rule::kw_not {
                    let operand = self.required_expr(inner.next())?;
                    Ok(Expr::at(
                        ExprKind::UnaryOp {
                            op: UnaryOp::Not,
                            operand: Box::new(operand),
                        },
                        loc,
                    ))
                } else {
                    self.expr(first)
                }
            }

            Rule::comparison | Rule::arith | Rule::term => {
                let mut inner = pair.into_inner();
                let mut acc = self.required_expr(inner.next())?;
                while let Some(op_pair) = inner.next() {
                    let op = BinOp::from_symbol(op_pair.as_str())
                        .ok_or_else(|| self.error(&op_pair, "unknown operator"))?;
                    let right = self.required_expr(inner.next())?;
                    acc = Expr::at(
                        ExprKind::BinOp {
                            op,
                            left: Box::new(acc),
                            right: Box::new(right),
                        },
                        loc,
                    );
                }
                Ok(acc)
            }

            Rule::factor => {
                let mut inner = pair.into_inner();
                let first = inner
                    .next()
                    .ok_or_else(|| err_msg!(Internal, "empty factor"))?;
                if first.as_rule() == Rule::unary_op {
                    let op = if first.as_str() == "-" {
                        UnaryOp::Neg
                    } else {
                        UnaryOp::Pos
                    };
                    let operand = self.required_expr(inner.next())?;
                    Ok(Expr::at(
                        ExprKind::UnaryOp {
                            op,
                            operand: Box::new(operand),
                        },
                        loc,
                    ))
                } else {
                    self.expr(first)
                }
            }

            Rule::postfix => {
                let mut inner = pair.into_inner();
                let mut acc = self.required_expr(inner.next())?;
                for trailer in inner {
                    let kind = match trailer.as_rule() {
                        Rule::call_args => ExprKind::Call {
                            func: Box::new(acc),
                            args: trailer
                                .into_inner()
                                .map(|p| self.expr(p))
                                .collect::<ParseResult<Vec<_>>>()?,
                        },
                        Rule::index => ExprKind::Subscript {
                            value: Box::new(acc),
                            index: Box::new(self.expr_list(self.first_inner(trailer)?)?),
                        },
                        Rule::attr => ExprKind::Attribute {
                            value: Box::new(acc),
                            attr: self.first_inner(trailer)?.as_str().to_string(),
                        },
                        other => {
                            return Err(err_msg!(Internal, "unexpected trailer {:?}", other))
                        }
                    };
                    acc = Expr::at(kind, loc);
                }
                Ok(acc)
            }

            Rule::tuple_display | Rule::list_display => {
                let is_list = pair.as_rule() == Rule::list_display;
                let items = pair
                    .into_inner()
                    .map(|p| self.expr(p))
                    .collect::<ParseResult<Vec<_>>>()?;
                let kind = if is_list {
                    ExprKind::List(items)
                } else {
                    ExprKind::Tuple(items)
                };
                Ok(Expr::at(kind, loc))
            }

            Rule::number => {
                let value = pair
                    .as_str()
                    .parse::<i64>()
                    .map_err(|_| self.error(&pair, "integer literal out of range"))?;
                Ok(Expr::at(ExprKind::Constant(Constant::Int(value)), loc))
            }
            Rule::string => {
                let value = unescape_string(pair.as_str());
                Ok(Expr::at(ExprKind::Constant(Constant::Str(value)), loc))
            }
            Rule::true_lit => Ok(Expr::at(ExprKind::Constant(Constant::Bool(true)), loc)),
            Rule::false_lit => Ok(Expr::at(ExprKind::Constant(Constant::Bool(false)), loc)),
            Rule::none_lit => Ok(Expr::at(ExprKind::Constant(Constant::None), loc)),
            Rule::identifier => Ok(Expr::at(ExprKind::Name(pair.as_str().to_string()), loc)),

            other => Err(err_msg!(Internal, "unexpected expression rule {:?}", other)),
        }
    }
}

/// Strips the quotes from a string literal and resolves escapes.
fn unescape_string(raw: &str) -> String {
    let quote_len = if raw.starts_with("\"\"\"") || raw.starts_with("'''") {
        3
    } else {
        1
    };
    let body = raw
        .get(quote_len..raw.len().saturating_sub(quote_len))
        .unwrap_or_default();

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

// ============================================================================
// BLOCK STRUCTURE
// ============================================================================

struct BlockBuilder<'a> {
    lines: &'a [ParsedLine],
    filename: &'a str,
    pos: usize,
}

impl<'a> BlockBuilder<'a> {
    fn block(&mut self, indent: usize) -> ParseResult<Vec<Stmt>> {
        let lines = self.lines;
        let mut body = Vec::new();
        while let Some(line) = lines.get(self.pos) {
            if line.indent < indent {
                break;
            }
            if line.indent > indent {
                return Err(err_at!(Parse, self.filename, Some(line.loc), "unexpected indent"));
            }
            match &line.item {
                LineItem::Simple(stmts) => {
                    body.extend(stmts.iter().cloned());
                    self.pos += 1;
                }
                LineItem::Decorator(_) => body.push(self.decorated(indent)?),
                LineItem::Header(Header::If(_), _) => body.push(self.if_chain(indent)?),
                LineItem::Header(Header::Elif(_), _) | LineItem::Header(Header::Else, _) => {
                    return Err(err_at!(
                        Parse,
                        self.filename,
                        Some(line.loc),
                        "'elif' or 'else' without a matching 'if'"
                    ));
                }
                LineItem::Header(header, inline) => {
                    self.pos += 1;
                    let suite = self.suite(line, inline, indent)?;
                    body.push(self.compound(header.clone(), suite, Vec::new(), line.loc)?);
                }
            }
        }
        Ok(body)
    }

    /// The body belonging to the header `line`.
    fn suite(&mut self, line: &ParsedLine, inline: &[Stmt], indent: usize) -> ParseResult<Vec<Stmt>> {
        if !inline.is_empty() {
            return Ok(inline.to_vec());
        }
        match self.lines.get(self.pos) {
            Some(next) if next.indent > indent => self.block(next.indent),
            _ => Err(err_at!(
                Parse,
                self.filename,
                Some(line.loc),
                "expected an indented block"
            )),
        }
    }

    fn decorated(&mut self, indent: usize) -> ParseResult<Stmt> {
        let lines = self.lines;
        let mut decorators = Vec::new();
        while let Some(ParsedLine {
            item: LineItem::Decorator(expr),
            indent: line_indent,
            ..
        }) = lines.get(self.pos)
        {
            if *line_indent != indent {
                break;
            }
            decorators.push(expr.clone());
            self.pos += 1;
        }

        match lines.get(self.pos) {
            Some(line) if line.indent == indent => match &line.item {
                LineItem::Header(header @ (Header::Def { .. } | Header::Class { .. }), inline) => {
                    self.pos += 1;
                    let suite = self.suite(line, inline, indent)?;
                    self.compound(header.clone(), suite, decorators, line.loc)
                }
                _ => Err(err_at!(
                    Parse,
                    self.filename,
                    Some(line.loc),
                    "decorators must be followed by 'def' or 'class'"
                )),
            },
            Some(line) => Err(err_at!(
                Parse,
                self.filename,
                Some(line.loc),
                "decorators must be followed by 'def' or 'class'"
            )),
            None => Err(err_msg!(
                Parse,
                "{}: unexpected end of file after decorator",
                self.filename
            )),
        }
    }

    fn if_chain(&mut self, indent: usize) -> ParseResult<Stmt> {
        let lines = self.lines;
        let mut clauses = Vec::new();
        let mut orelse = Vec::new();

        while let Some(line) = lines.get(self.pos) {
            if line.indent != indent {
                break;
            }
            match &line.item {
                LineItem::Header(Header::If(test), inline) if clauses.is_empty() => {
                    self.pos += 1;
                    let body = self.suite(line, inline, indent)?;
                    clauses.push((test.clone(), body, line.loc));
                }
                LineItem::Header(Header::Elif(test), inline) if !clauses.is_empty() => {
                    self.pos += 1;
                    let body = self.suite(line, inline, indent)?;
                    clauses.push((test.clone(), body, line.loc));
                }
                LineItem::Header(Header::Else, inline) if !clauses.is_empty() => {
                    self.pos += 1;
                    orelse = self.suite(line, inline, indent)?;
                    break;
                }
                _ => break,
            }
        }

        let mut tail = orelse;
        for (test, body, loc) in clauses.into_iter().rev() {
            tail = vec![Stmt::at(
                StmtKind::If {
                    test,
                    body,
                    orelse: tail,
                },
                Some(loc),
            )];
        }
        tail.pop()
            .ok_or_else(|| err_msg!(Internal, "if-chain without an 'if' clause"))
    }

    fn compound(
        &self,
        header: Header,
        body: Vec<Stmt>,
        decorators: Vec<Expr>,
        loc: Loc,
    ) -> ParseResult<Stmt> {
        let kind = match header {
            Header::Def { name, params } => StmtKind::FunctionDef {
                name,
                params,
                body,
                decorators,
            },
            Header::Class { name } => StmtKind::ClassDef {
                name,
                body,
                decorators,
            },
            Header::With { item, alias } => StmtKind::With { item, alias, body },
            Header::While(test) => StmtKind::While { test, body },
            Header::For { target, iter } => StmtKind::For { target, iter, body },
            Header::If(_) | Header::Elif(_) | Header::Else => {
                return Err(err_msg!(Internal, "conditional header outside an if-chain"))
            }
        };
        Ok(Stmt::at(kind, Some(loc)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::diagnostics::ErrorType;

    fn parse(source: &str) -> Module {
        parse_module(source, "test.trl").unwrap()
    }

    #[test]
    fn subscript_invocation_shape() {
        let expr = parse_expr("double[21]", "test.trl").unwrap();
        match expr.kind {
            ExprKind::Subscript { value, index } => {
                assert!(value.is_name("double"));
                assert_eq!(index.kind, ExprKind::Constant(Constant::Int(21)));
            }
            other => panic!("expected subscript, got {:?}", other),
        }
        assert_eq!(expr.loc, Some(Loc::new(1, 0)));
    }

    #[test]
    fn macro_import_with_alias() {
        let module = parse("from mypkg.macros import macros, foo as bar\n");
        assert_eq!(
            module.body[0].kind,
            StmtKind::ImportFrom {
                module: Some("mypkg.macros".into()),
                level: 0,
                names: vec![Alias::new("macros"), Alias::with_asname("foo", "bar")],
            }
        );
    }

    #[test]
    fn relative_import_without_module() {
        let module = parse("from .. import macros, m\n");
        match &module.body[0].kind {
            StmtKind::ImportFrom { module, level, .. } => {
                assert_eq!(module, &None);
                assert_eq!(*level, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decorators_attach_in_source_order() {
        let module = parse("@outer\n@inner\ndef f(x):\n    return x\n");
        match &module.body[0].kind {
            StmtKind::FunctionDef {
                name, decorators, ..
            } => {
                assert_eq!(name, "f");
                let names: Vec<_> = decorators.iter().filter_map(|d| d.as_name()).collect();
                assert_eq!(names, vec!["outer", "inner"]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(module.body[0].loc, Some(Loc::new(3, 0)));
    }

    #[test]
    fn with_block_alias_and_body() {
        let module = parse("with phase[1]:\n    x = 1\n    y = 2\n");
        match &module.body[0].kind {
            StmtKind::With { item, alias, body } => {
                assert!(matches!(item.kind, ExprKind::Subscript { .. }));
                assert_eq!(alias, &None);
                assert_eq!(body.len(), 2);
                assert_eq!(body[1].loc, Some(Loc::new(3, 4)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn elif_chains_nest_in_orelse() {
        let module = parse("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        assert_eq!(module.body.len(), 1);
        match &module.body[0].kind {
            StmtKind::If { orelse, .. } => match &orelse[0].kind {
                StmtKind::If { orelse, .. } => assert_eq!(orelse.len(), 1),
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keywords_do_not_shadow_identifiers() {
        let module = parse("assertion = 1\nimported = iffy\n");
        assert_eq!(module.body.len(), 2);
    }

    #[test]
    fn precedence_of_arithmetic() {
        let expr = parse_expr("1 + 2 * 3", "test.trl").unwrap();
        match expr.kind {
            ExprKind::BinOp { op, right, .. } => {
                assert_eq!(op, BinOp::Add);
                assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn strings_are_unescaped() {
        let expr = parse_expr(r#""a\nb""#, "test.trl").unwrap();
        assert_eq!(expr.kind, ExprKind::Constant(Constant::Str("a\nb".into())));
    }

    #[test]
    fn docstring_is_first_statement() {
        let module = parse("\"\"\"Module doc.\"\"\"\nx = 1\n");
        assert_eq!(module.docstring(), Some("Module doc."));
    }

    #[test]
    fn unexpected_indent_is_reported() {
        let err = parse_module("x = 1\n    y = 2\n", "test.trl").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Parse);
        assert!(err.message().contains("test.trl:2"));
    }

    #[test]
    fn missing_block_is_reported() {
        let err = parse_module("def f():\nx = 1\n", "test.trl").unwrap_err();
        assert!(err.message().contains("expected an indented block"));
    }

    #[test]
    fn grammar_errors_carry_location() {
        let err = parse_module("x = 1\ny = (1 +\n", "test.trl").unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Parse);
        assert!(err.message().starts_with("test.trl:2"));
    }

    #[test]
    fn augmented_assignment_desugars() {
        let module = parse("x += 2\n");
        match &module.body[0].kind {
            StmtKind::Assign { value, .. } => {
                assert!(matches!(value.kind, ExprKind::BinOp { op: BinOp::Add, .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
