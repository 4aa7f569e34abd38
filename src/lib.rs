//! Vectorized ranking-formula evaluator and comparator.
//!
//! # Why?
//!
//! Analysts tune product search by editing scoring formulas like
//! `ranking_score * (1 + asp_boost)` and watching how the result order
//! reshuffles. The formula string is untrusted input, so it is parsed
//! against a closed arithmetic grammar (numbers, whitelisted variables,
//! `+ - * /`, unary minus, parentheses) and evaluated column-wise over the
//! product table. Nothing outside that subset evaluates: the grammar
//! accepts a wider surface on purpose, and lowering rejects each
//! recognized-but-forbidden construct by name, so a formula containing a
//! function call or a comparison fails with a message saying so rather
//! than a generic syntax error. There is no fallback evaluation path.
//!
//! Intermediate operations run on vectors of input data at a time (with
//! optional data parallelism via the `rayon` feature), reusing scratch
//! registers across evaluations.
//!
//! # Example
//!
//! ```rust
//! use ranking_sim::*;
//!
//! let allowed = VariableSet::new(["ranking_score", "asp_boost", "pop_boost"]);
//! let mut table = Bindings::new(3);
//! table
//!     .bind("ranking_score", vec![10.0, 20.0, 30.0])
//!     .bind("asp_boost", vec![1.0, 0.0, 0.0]);
//!
//! let cmp = compare_formulas(
//!     &table,
//!     &allowed,
//!     "ranking_score * (1 + asp_boost)",
//!     "ranking_score",
//! )
//! .unwrap();
//!
//! assert_eq!(cmp.rank_a, vec![2, 3, 1]);
//! assert_eq!(cmp.rank_b, vec![3, 2, 1]);
//! // Positive delta: formula B ranks the row worse than formula A.
//! assert_eq!(cmp.rank_delta, vec![1, -1, 0]);
//! ```

mod compare;
mod evaluate;
mod expression;
mod parse;
mod rank;

/// Uses the [`pest`] parsing expression grammar language.
///
/// ```text
#[doc = include_str!("grammar.pest")]
/// ```
pub mod grammar_doc {}

pub use compare::*;
pub use evaluate::*;
pub use expression::*;
pub use parse::{parse_variable_names, ParseError, VariableSet};
pub use rank::*;

/// Scalar type formulas evaluate over.
pub trait Real: num_traits::Float + std::str::FromStr + Send + Sync {}
impl Real for f32 {}
impl Real for f64 {}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyst_whitelist() -> VariableSet {
        VariableSet::new(["ranking_score", "asp_boost", "pop_boost"])
    }

    #[test]
    fn operator_precedence() {
        let allowed = analyst_whitelist();
        let mut registers = Registers::new(1);

        let parsed = ScoreExpr::<f64>::parse("2 + 3 * 4", &allowed).unwrap();
        assert_eq!(
            parsed.evaluate_without_vars(&mut registers).unwrap(),
            vec![14.0]
        );

        let parsed = ScoreExpr::<f64>::parse("(2 + 3) * 4", &allowed).unwrap();
        assert_eq!(
            parsed.evaluate_without_vars(&mut registers).unwrap(),
            vec![20.0]
        );

        let parsed = ScoreExpr::<f64>::parse("-2 + 3", &allowed).unwrap();
        assert_eq!(
            parsed.evaluate_without_vars(&mut registers).unwrap(),
            vec![1.0]
        );

        let parsed = ScoreExpr::<f64>::parse("8 / 4 * 3", &allowed).unwrap();
        assert_eq!(
            parsed.evaluate_without_vars(&mut registers).unwrap(),
            vec![6.0]
        );
    }

    #[test]
    fn f32_expression() {
        let allowed = analyst_whitelist();
        let mut table = Bindings::new(2);
        table.bind("ranking_score", vec![2.0f32, 4.0]);
        let mut registers = Registers::new(2);
        let parsed = ScoreExpr::<f32>::parse("ranking_score * 1.5", &allowed).unwrap();
        let output = parsed.evaluate(&table, &mut registers).unwrap();
        assert_eq!(&output, &[3.0, 6.0]);
    }

    #[test]
    fn end_to_end_rank_comparison() {
        let mut table = Bindings::new(3);
        table
            .bind("ranking_score", vec![10.0, 20.0, 30.0])
            .bind("asp_boost", vec![1.0, 0.0, 0.0])
            .bind("pop_boost", vec![0.0, 0.0, 0.0]);

        let cmp = compare_formulas(
            &table,
            &analyst_whitelist(),
            "ranking_score * (1 + asp_boost)",
            "ranking_score",
        )
        .unwrap();

        assert_eq!(cmp.score_a, vec![20.0, 20.0, 30.0]);
        assert_eq!(cmp.score_b, vec![10.0, 20.0, 30.0]);
        assert_eq!(cmp.rank_a, vec![2, 3, 1]);
        assert_eq!(cmp.rank_b, vec![3, 2, 1]);
        assert_eq!(cmp.rank_delta, vec![1, -1, 0]);

        let summary = cmp.summary(2);
        assert_eq!(summary.top_k_overlap, 1);
        assert_eq!(summary.improved, 1);
        assert_eq!(summary.worsened, 1);
    }

    #[test]
    fn hostile_formulas_never_evaluate() {
        let allowed = analyst_whitelist();
        for input in [
            "__import__(\"os\")",
            "ranking_score.__class__",
            "open(\"/etc/passwd\")",
            "ranking_score if pop_boost else 0",
            "lambda: 1",
        ] {
            let result = ScoreExpr::<f64>::parse(input, &allowed);
            assert!(result.is_err(), "{input} must not parse");
        }
    }

    #[test]
    fn nan_scores_rank_last_end_to_end() {
        let allowed = VariableSet::new(["x"]);
        let mut table = Bindings::<f64>::new(3);
        table.bind("x", vec![0.0, 1.0, 2.0]);
        // Row 0 divides zero by zero and scores NaN.
        let cmp = compare_formulas(&table, &allowed, "x / x", "x").unwrap();
        assert!(cmp.score_a[0].is_nan());
        assert_eq!(cmp.rank_a, vec![3, 1, 2]);
    }
}
