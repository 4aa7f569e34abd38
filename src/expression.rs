/// A validated scoring formula.
///
/// These seven variants are the entire language the evaluator understands:
/// the four arithmetic operators, negation, numeric constants, and named
/// per-row variables. Anything else a formula string contains is rejected
/// during lowering and can never reach evaluation, because there is no
/// variant to represent it. Trees are immutable once built and every
/// consumer matches exhaustively.
#[derive(Clone, Debug, PartialEq)]
pub enum ScoreExpr<R> {
    // Binary ops.
    Add(Box<ScoreExpr<R>>, Box<ScoreExpr<R>>),
    Div(Box<ScoreExpr<R>>, Box<ScoreExpr<R>>),
    Mul(Box<ScoreExpr<R>>, Box<ScoreExpr<R>>),
    Sub(Box<ScoreExpr<R>>, Box<ScoreExpr<R>>),

    // Unary negation.
    Neg(Box<ScoreExpr<R>>),

    // Constant, broadcast across every row.
    Literal(R),

    // Input column, looked up by name at evaluation time.
    Var(String),
}
