use std::collections::{BTreeSet, HashSet};

use once_cell::sync::Lazy;
use pest::iterators::{Pair, Pairs};
use pest::pratt_parser::{Assoc, Op, PrattParser};
use pest::Parser;
use pest_derive::Parser;
use thiserror::Error;

use crate::expression::ScoreExpr;
use crate::Real;

#[derive(Parser)]
#[grammar = "grammar.pest"] // relative to project `src`
struct FormulaParser;

/// Failure while turning a formula string into a [`ScoreExpr`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The input is not a well-formed expression at all.
    #[error("syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),

    /// The input parses, but uses a construct outside the arithmetic subset.
    #[error("unsupported construct: {construct}")]
    UnsupportedConstruct { construct: String },

    /// The formula references a variable that is not on the whitelist.
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },

    /// A numeric literal the scalar type cannot represent.
    #[error("invalid numeric literal `{literal}`")]
    InvalidNumber { literal: String },
}

fn unsupported(construct: impl Into<String>) -> ParseError {
    ParseError::UnsupportedConstruct {
        construct: construct.into(),
    }
}

/// The closed set of variable names formulas may reference.
///
/// This is configuration, not policy baked into the evaluator: the caller
/// decides which table columns are exposed to formula authors.
#[derive(Clone, Debug, Default)]
pub struct VariableSet {
    names: BTreeSet<String>,
}

impl VariableSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Every variable name mentioned by `input`, whitelisted or not.
pub fn parse_variable_names(input: &str) -> Result<HashSet<String>, ParseError> {
    Ok(FormulaParser::parse(Rule::formula, input)
        .map_err(Box::new)?
        .flatten()
        .filter(|p| p.as_rule() == Rule::variable)
        .map(|p| p.as_str().to_string())
        .collect())
}

impl<R: Real> ScoreExpr<R> {
    /// Parse `input` into a validated scoring formula.
    ///
    /// Two gates run in sequence. The pest grammar accepts a deliberately
    /// wider surface than the evaluator understands, so the first gate only
    /// rejects malformed input ([`ParseError::Syntax`]). The second gate
    /// lowers the parse tree into the closed [`ScoreExpr`] variants and
    /// rejects every recognized-but-forbidden construct by name
    /// ([`ParseError::UnsupportedConstruct`]), and resolves variables
    /// against `allowed` ([`ParseError::UnknownVariable`]).
    pub fn parse(input: &str, allowed: &VariableSet) -> Result<Self, ParseError> {
        let pairs = FormulaParser::parse(Rule::formula, input).map_err(Box::new)?;
        let mut exprs: Vec<_> = pairs.filter(|p| p.as_rule() == Rule::expr).collect();
        if exprs.len() > 1 {
            return Err(unsupported("multiple statements"));
        }
        match exprs.pop() {
            Some(expr) => lower(expr.into_inner(), allowed),
            None => Err(unsupported("empty formula")),
        }
    }
}

static PRATT: Lazy<PrattParser<Rule>> = Lazy::new(|| {
    use Assoc::*;
    use Rule::*;

    PrattParser::new()
        .op(Op::infix(assign, Right))
        .op(Op::infix(or, Left))
        .op(Op::infix(and, Left))
        .op(Op::infix(eq, Left)
            | Op::infix(neq, Left)
            | Op::infix(less, Left)
            | Op::infix(le, Left)
            | Op::infix(greater, Left)
            | Op::infix(ge, Left))
        .op(Op::infix(bitor, Left) | Op::infix(bitand, Left))
        .op(Op::infix(shl, Left) | Op::infix(shr, Left))
        .op(Op::infix(add, Left) | Op::infix(subtract, Left))
        .op(Op::infix(multiply, Left) | Op::infix(divide, Left) | Op::infix(rem, Left))
        .op(Op::infix(power, Right))
        .op(Op::prefix(neg) | Op::prefix(not) | Op::prefix(bitnot))
        .op(Op::postfix(attr) | Op::postfix(index))
});

fn lower<R: Real>(input: Pairs<Rule>, allowed: &VariableSet) -> Result<ScoreExpr<R>, ParseError> {
    PRATT
        .map_primary(|primary: Pair<Rule>| match primary.as_rule() {
            Rule::expr => lower(primary.into_inner(), allowed),
            Rule::number => {
                let literal = primary.as_str();
                literal
                    .parse::<R>()
                    .map(ScoreExpr::Literal)
                    .map_err(|_| ParseError::InvalidNumber {
                        literal: literal.to_string(),
                    })
            }
            Rule::variable => {
                let name = primary.as_str();
                if allowed.contains(name) {
                    Ok(ScoreExpr::Var(name.to_string()))
                } else {
                    Err(ParseError::UnknownVariable {
                        name: name.to_string(),
                    })
                }
            }
            Rule::call => Err(unsupported("function call")),
            Rule::string => Err(unsupported("string literal")),
            rule => Err(unsupported(format!("{rule:?}"))),
        })
        .map_prefix(|op, operand| match op.as_rule() {
            Rule::neg => Ok(ScoreExpr::Neg(Box::new(operand?))),
            Rule::not => Err(unsupported("boolean negation")),
            Rule::bitnot => Err(unsupported("bitwise operator")),
            rule => Err(unsupported(format!("{rule:?}"))),
        })
        .map_postfix(|_operand, op| match op.as_rule() {
            Rule::attr => Err(unsupported("attribute access")),
            Rule::index => Err(unsupported("subscript access")),
            rule => Err(unsupported(format!("{rule:?}"))),
        })
        .map_infix(|lhs, op, rhs| match op.as_rule() {
            Rule::add => Ok(ScoreExpr::Add(Box::new(lhs?), Box::new(rhs?))),
            Rule::subtract => Ok(ScoreExpr::Sub(Box::new(lhs?), Box::new(rhs?))),
            Rule::multiply => Ok(ScoreExpr::Mul(Box::new(lhs?), Box::new(rhs?))),
            Rule::divide => Ok(ScoreExpr::Div(Box::new(lhs?), Box::new(rhs?))),
            Rule::power => Err(unsupported("exponentiation")),
            Rule::rem => Err(unsupported("modulo")),
            Rule::eq | Rule::neq | Rule::less | Rule::le | Rule::greater | Rule::ge => {
                Err(unsupported("comparison operator"))
            }
            Rule::and | Rule::or => Err(unsupported("boolean operator")),
            Rule::bitand | Rule::bitor | Rule::shl | Rule::shr => {
                Err(unsupported("bitwise operator"))
            }
            Rule::assign => Err(unsupported("assignment")),
            rule => Err(unsupported(format!("{rule:?}"))),
        })
        .parse(input)
}
