//! Expression grammar for the sandbox language.
//!
//! Precedence, loosest to tightest: conditional, `or`, `and`, `not`,
//! comparisons and membership, additive, multiplicative, unary minus, power,
//! postfix (method call, attribute, subscript), primary. The only permitted
//! top-level statement forms are a single binding `name = expr` and
//! `assert expr`; their admissibility is a validator policy decision, so the
//! grammar parses them unconditionally.

use super::core::{ParseError, Parser};
use super::prelude::*;
use crate::sandbox::ast;
use crate::sandbox::tokenizer::{keyword::Keyword, symbol::Delimiter, symbol::Operator, Token};

/// Parses a complete submission from a significant-token stream, requiring
/// every token to be consumed.
pub fn parse(tokens: &[Token]) -> Result<ast::Program, ParseError> {
    let (pos, program) = parse_program().parse(tokens, 0)?;
    if pos != tokens.len() {
        return Err(ParseError::Fail(format!(
            "unexpected trailing input starting at {}",
            tokens[pos]
        )));
    }
    Ok(program)
}

pub fn parse_program() -> impl Parser<Token, ast::Program> {
    with_context(
        choice(vec![
            Box::new(parse_binding()),
            Box::new(parse_assert()),
            Box::new(map(parse_expression(), ast::Program::Expr)),
        ]),
        "program",
    )
}

fn parse_binding() -> impl Parser<Token, ast::Program> {
    with_context(
        map(
            tuple3(
                parse_identifier(),
                as_unit(equal(Token::Operator(Operator::Assign))),
                parse_expression(),
            ),
            |(name, _, value)| ast::Program::Binding { name, value },
        ),
        "binding",
    )
}

fn parse_assert() -> impl Parser<Token, ast::Program> {
    with_context(
        map(
            preceded(
                as_unit(equal(Token::Keyword(Keyword::Assert))),
                parse_expression(),
            ),
            ast::Program::Assert,
        ),
        "assertion",
    )
}

pub fn parse_expression() -> impl Parser<Token, ast::Expr> {
    with_context(lazy(parse_conditional), "expression")
}

/// `value if condition else alternative`
fn parse_conditional() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(
                parse_logical_or(),
                optional(tuple2(
                    preceded(
                        as_unit(equal(Token::Keyword(Keyword::If))),
                        parse_logical_or(),
                    ),
                    preceded(
                        as_unit(equal(Token::Keyword(Keyword::Else))),
                        lazy(parse_expression),
                    ),
                )),
            ),
            |(value, tail)| match tail {
                None => value,
                Some((condition, alternative)) => ast::Expr::Conditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(value),
                    else_branch: Box::new(alternative),
                },
            },
        ),
        "conditional",
    )
}

fn parse_logical_or() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(
                parse_logical_and(),
                many(tuple2(parse_operator_or(), parse_logical_and())),
            ),
            fold_binary_ops,
        ),
        "logical or",
    )
}

fn parse_logical_and() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(parse_not(), many(tuple2(parse_operator_and(), parse_not()))),
            fold_binary_ops,
        ),
        "logical and",
    )
}

fn parse_not() -> impl Parser<Token, ast::Expr> {
    with_context(
        choice(vec![
            Box::new(map(
                preceded(
                    as_unit(equal(Token::Keyword(Keyword::Not))),
                    parse_comparison(),
                ),
                |operand| ast::Expr::UnaryOp {
                    op: ast::UnaryOperator::Not,
                    operand: Box::new(operand),
                },
            )),
            Box::new(parse_comparison()),
        ]),
        "negation",
    )
}

fn parse_comparison() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(
                parse_additive(),
                many(tuple2(parse_operator_comparison(), parse_additive())),
            ),
            fold_binary_ops,
        ),
        "comparison",
    )
}

fn parse_additive() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(
                parse_multiplicative(),
                many(tuple2(
                    choice(vec![
                        Box::new(parse_operator_add()),
                        Box::new(parse_operator_subtract()),
                    ]),
                    parse_multiplicative(),
                )),
            ),
            fold_binary_ops,
        ),
        "additive",
    )
}

fn parse_multiplicative() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(
                parse_unary(),
                many(tuple2(
                    choice(vec![
                        Box::new(parse_operator_multiply()),
                        Box::new(parse_operator_floor_divide()),
                        Box::new(parse_operator_divide()),
                        Box::new(parse_operator_modulo()),
                    ]),
                    parse_unary(),
                )),
            ),
            fold_binary_ops,
        ),
        "multiplicative",
    )
}

fn parse_unary() -> impl Parser<Token, ast::Expr> {
    with_context(
        choice(vec![
            Box::new(map(
                preceded(
                    as_unit(equal(Token::Operator(Operator::Minus))),
                    parse_power(),
                ),
                |operand| ast::Expr::UnaryOp {
                    op: ast::UnaryOperator::Negate,
                    operand: Box::new(operand),
                },
            )),
            Box::new(parse_power()),
        ]),
        "unary",
    )
}

/// Exponentiation is right-associative; the exponent re-enters at unary level
/// so `-2 ** -3` parses the way the surface language reads.
fn parse_power() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(
                parse_postfix(),
                optional(preceded(
                    as_unit(equal(Token::Operator(Operator::Pow))),
                    lazy(parse_unary),
                )),
            ),
            |(base, exponent)| match exponent {
                None => base,
                Some(exponent) => ast::Expr::BinaryOp {
                    op: ast::BinaryOperator::Power,
                    left: Box::new(base),
                    right: Box::new(exponent),
                },
            },
        ),
        "power",
    )
}

enum Postfix {
    Method(String, Vec<ast::Expr>),
    Attribute(String),
    Subscript(ast::IndexExpr),
}

fn parse_postfix() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(parse_primary(), many(parse_postfix_op())),
            |(base, ops)| {
                ops.into_iter().fold(base, |receiver, op| match op {
                    Postfix::Method(method, arguments) => ast::Expr::MethodCall {
                        receiver: Box::new(receiver),
                        method,
                        arguments,
                    },
                    Postfix::Attribute(attribute) => ast::Expr::Attribute {
                        receiver: Box::new(receiver),
                        attribute,
                    },
                    Postfix::Subscript(index) => ast::Expr::Index {
                        value: Box::new(receiver),
                        index: Box::new(index),
                    },
                })
            },
        ),
        "postfix",
    )
}

fn parse_postfix_op() -> impl Parser<Token, Postfix> {
    choice(vec![
        // .method(args)
        Box::new(map(
            tuple2(
                preceded(
                    as_unit(equal(Token::Operator(Operator::Dot))),
                    parse_identifier(),
                ),
                parse_call_arguments(),
            ),
            |(method, arguments)| Postfix::Method(method, arguments),
        )),
        // bare .attribute, kept so the validator can name the offence
        Box::new(map(
            preceded(
                as_unit(equal(Token::Operator(Operator::Dot))),
                parse_identifier(),
            ),
            Postfix::Attribute,
        )),
        // [index] / [start:stop:step]
        Box::new(map(
            delimited(
                as_unit(equal(Token::Delimiter(Delimiter::OpenBracket))),
                parse_index_expression(),
                as_unit(equal(Token::Delimiter(Delimiter::CloseBracket))),
            ),
            Postfix::Subscript,
        )),
    ])
}

fn parse_index_expression() -> impl Parser<Token, ast::IndexExpr> {
    with_context(
        choice(vec![
            Box::new(map(
                tuple3(
                    optional(parse_expression()),
                    preceded(
                        as_unit(equal(Token::Delimiter(Delimiter::Colon))),
                        optional(parse_expression()),
                    ),
                    optional(preceded(
                        as_unit(equal(Token::Delimiter(Delimiter::Colon))),
                        optional(parse_expression()),
                    )),
                ),
                |(start, stop, step)| ast::IndexExpr::Slice {
                    start,
                    stop,
                    step: step.flatten(),
                },
            )),
            Box::new(map(parse_expression(), ast::IndexExpr::Single)),
        ]),
        "subscript",
    )
}

fn parse_primary() -> impl Parser<Token, ast::Expr> {
    with_context(
        choice(vec![
            Box::new(parse_function_call()),
            Box::new(map(parse_literal(), ast::Expr::Literal)),
            Box::new(map(parse_identifier(), ast::Expr::Name)),
            Box::new(parse_group_or_tuple()),
            Box::new(parse_list_comprehension()),
            Box::new(parse_list_display()),
            Box::new(parse_map_display()),
        ]),
        "primary",
    )
}

fn parse_function_call() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            tuple2(parse_identifier(), parse_call_arguments()),
            |(function, arguments)| ast::Expr::Call {
                function,
                arguments,
            },
        ),
        "function call",
    )
}

fn parse_call_arguments() -> impl Parser<Token, Vec<ast::Expr>> {
    delimited(
        as_unit(equal(Token::Delimiter(Delimiter::OpenParen))),
        separated_list(
            lazy(parse_expression),
            as_unit(equal(Token::Delimiter(Delimiter::Comma))),
        ),
        as_unit(equal(Token::Delimiter(Delimiter::CloseParen))),
    )
}

/// A parenthesised expression, or a tuple display when commas are present.
fn parse_group_or_tuple() -> impl Parser<Token, ast::Expr> {
    with_context(
        choice(vec![
            Box::new(map(
                tuple2(
                    as_unit(equal(Token::Delimiter(Delimiter::OpenParen))),
                    as_unit(equal(Token::Delimiter(Delimiter::CloseParen))),
                ),
                |_| ast::Expr::Tuple(vec![]),
            )),
            Box::new(map(
                delimited(
                    as_unit(equal(Token::Delimiter(Delimiter::OpenParen))),
                    tuple3(
                        lazy(parse_expression),
                        many(preceded(
                            as_unit(equal(Token::Delimiter(Delimiter::Comma))),
                            lazy(parse_expression),
                        )),
                        optional(as_unit(equal(Token::Delimiter(Delimiter::Comma)))),
                    ),
                    as_unit(equal(Token::Delimiter(Delimiter::CloseParen))),
                ),
                |(first, rest, trailing)| {
                    if rest.is_empty() && trailing.is_none() {
                        first
                    } else {
                        let mut items = vec![first];
                        items.extend(rest);
                        ast::Expr::Tuple(items)
                    }
                },
            )),
        ]),
        "group",
    )
}

fn parse_list_comprehension() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            delimited(
                as_unit(equal(Token::Delimiter(Delimiter::OpenBracket))),
                tuple3(
                    lazy(parse_expression),
                    tuple2(
                        preceded(
                            as_unit(equal(Token::Keyword(Keyword::For))),
                            parse_identifier(),
                        ),
                        preceded(
                            as_unit(equal(Token::Keyword(Keyword::In))),
                            lazy(parse_expression),
                        ),
                    ),
                    optional(preceded(
                        as_unit(equal(Token::Keyword(Keyword::If))),
                        lazy(parse_expression),
                    )),
                ),
                as_unit(equal(Token::Delimiter(Delimiter::CloseBracket))),
            ),
            |(element, (binding, iterable), condition)| ast::Expr::ListComp {
                element: Box::new(element),
                binding,
                iterable: Box::new(iterable),
                condition: condition.map(Box::new),
            },
        ),
        "list comprehension",
    )
}

fn parse_list_display() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            delimited(
                as_unit(equal(Token::Delimiter(Delimiter::OpenBracket))),
                separated_list(
                    lazy(parse_expression),
                    as_unit(equal(Token::Delimiter(Delimiter::Comma))),
                ),
                as_unit(equal(Token::Delimiter(Delimiter::CloseBracket))),
            ),
            ast::Expr::List,
        ),
        "list display",
    )
}

fn parse_map_display() -> impl Parser<Token, ast::Expr> {
    with_context(
        map(
            delimited(
                as_unit(equal(Token::Delimiter(Delimiter::OpenBrace))),
                separated_list(
                    map(
                        tuple3(
                            lazy(parse_expression),
                            as_unit(equal(Token::Delimiter(Delimiter::Colon))),
                            lazy(parse_expression),
                        ),
                        |(key, _, value)| (key, value),
                    ),
                    as_unit(equal(Token::Delimiter(Delimiter::Comma))),
                ),
                as_unit(equal(Token::Delimiter(Delimiter::CloseBrace))),
            ),
            ast::Expr::Map,
        ),
        "map display",
    )
}

fn parse_identifier() -> impl Parser<Token, String> {
    satisfy(|token: &Token| match token {
        Token::Identifier(name) => Some(name.clone()),
        _ => None,
    })
}

fn parse_literal() -> impl Parser<Token, ast::Literal> {
    use crate::sandbox::tokenizer::Literal as TokenLiteral;
    satisfy(|token: &Token| match token {
        Token::Literal(TokenLiteral::Integer(i)) => Some(ast::Literal::Integer(*i)),
        Token::Literal(TokenLiteral::Float(f)) => Some(ast::Literal::Float(*f)),
        Token::Literal(TokenLiteral::String(s)) => Some(ast::Literal::String(s.clone())),
        Token::Literal(TokenLiteral::Boolean(b)) => Some(ast::Literal::Boolean(*b)),
        Token::Literal(TokenLiteral::Null) => Some(ast::Literal::Null),
        _ => None,
    })
}

fn fold_binary_ops(
    (first, rest): (ast::Expr, Vec<(ast::BinaryOperator, ast::Expr)>),
) -> ast::Expr {
    rest.into_iter()
        .fold(first, |left, (op, right)| ast::Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
}

fn parse_operator_or() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Keyword(Keyword::Or)), |_| {
        ast::BinaryOperator::Or
    })
}

fn parse_operator_and() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Keyword(Keyword::And)), |_| {
        ast::BinaryOperator::And
    })
}

fn parse_operator_comparison() -> impl Parser<Token, ast::BinaryOperator> {
    with_context(
        choice(vec![
            Box::new(parse_comparison_equal()),
            Box::new(parse_comparison_not_equal()),
            Box::new(parse_comparison_greater_equal()),
            Box::new(parse_comparison_less_equal()),
            Box::new(parse_comparison_greater()),
            Box::new(parse_comparison_less()),
            Box::new(parse_operator_not_in()),
            Box::new(parse_operator_in()),
        ]),
        "comparison operator",
    )
}

fn parse_comparison_equal() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::EqualEqual)), |_| {
        ast::BinaryOperator::Equal
    })
}

fn parse_comparison_not_equal() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::NotEqual)), |_| {
        ast::BinaryOperator::NotEqual
    })
}

fn parse_comparison_greater() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::Greater)), |_| {
        ast::BinaryOperator::GreaterThan
    })
}

fn parse_comparison_greater_equal() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::GreaterEqual)), |_| {
        ast::BinaryOperator::GreaterThanEqual
    })
}

fn parse_comparison_less() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::Less)), |_| {
        ast::BinaryOperator::LessThan
    })
}

fn parse_comparison_less_equal() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::LessEqual)), |_| {
        ast::BinaryOperator::LessThanEqual
    })
}

fn parse_operator_in() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Keyword(Keyword::In)), |_| {
        ast::BinaryOperator::In
    })
}

fn parse_operator_not_in() -> impl Parser<Token, ast::BinaryOperator> {
    map(
        tuple2(
            equal(Token::Keyword(Keyword::Not)),
            equal(Token::Keyword(Keyword::In)),
        ),
        |_| ast::BinaryOperator::NotIn,
    )
}

fn parse_operator_add() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::Plus)), |_| {
        ast::BinaryOperator::Add
    })
}

fn parse_operator_subtract() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::Minus)), |_| {
        ast::BinaryOperator::Subtract
    })
}

fn parse_operator_multiply() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::Star)), |_| {
        ast::BinaryOperator::Multiply
    })
}

fn parse_operator_divide() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::Slash)), |_| {
        ast::BinaryOperator::Divide
    })
}

fn parse_operator_floor_divide() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::FloorDiv)), |_| {
        ast::BinaryOperator::FloorDivide
    })
}

fn parse_operator_modulo() -> impl Parser<Token, ast::BinaryOperator> {
    map(equal(Token::Operator(Operator::Percent)), |_| {
        ast::BinaryOperator::Modulo
    })
}
