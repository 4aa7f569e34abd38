use std::collections::{BTreeMap, HashSet};

use log::debug;
use thiserror::Error;

use crate::evaluate::{Bindings, EvalError, Registers};
use crate::expression::ScoreExpr;
use crate::parse::{ParseError, VariableSet};
use crate::rank::{clamp_nonnegative, dense_ranks_desc, rank_delta};
use crate::Real;

/// Any failure while scoring a table with a formula.
///
/// Formula errors are user input errors, not transient faults: callers
/// display the message and stop, they do not retry.
#[derive(Debug, Error)]
pub enum FormulaError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Row-aligned outcome of scoring one table with two formulas.
///
/// Scores are post-clamp (negative values raised to zero before ranking).
#[derive(Clone, Debug)]
pub struct Comparison<R> {
    pub score_a: Vec<R>,
    pub score_b: Vec<R>,
    pub rank_a: Vec<u32>,
    pub rank_b: Vec<u32>,
    /// `rank_b - rank_a`; positive means formula B ranks the row worse.
    pub rank_delta: Vec<i64>,
}

/// Score every row of `table` with both formulas and rank the results.
///
/// Each formula is parsed against the `allowed` whitelist, evaluated
/// column-wise, clamped with [`clamp_nonnegative`], and ranked descending.
/// The first failure aborts the whole comparison; there are no partial
/// results.
pub fn compare_formulas<R: Real>(
    table: &Bindings<R>,
    allowed: &VariableSet,
    formula_a: &str,
    formula_b: &str,
) -> Result<Comparison<R>, FormulaError> {
    let expr_a: ScoreExpr<R> = ScoreExpr::parse(formula_a, allowed)?;
    let expr_b: ScoreExpr<R> = ScoreExpr::parse(formula_b, allowed)?;

    let mut registers = Registers::new(table.row_count());
    let mut score_a = expr_a.evaluate(table, &mut registers)?;
    let mut score_b = expr_b.evaluate(table, &mut registers)?;
    clamp_nonnegative(&mut score_a);
    clamp_nonnegative(&mut score_b);

    let rank_a = dense_ranks_desc(&score_a);
    let rank_b = dense_ranks_desc(&score_b);
    let rank_delta = rank_delta(&rank_a, &rank_b);
    debug!(
        "compared {formula_a:?} against {formula_b:?} over {} rows",
        table.row_count()
    );

    Ok(Comparison {
        score_a,
        score_b,
        rank_a,
        rank_b,
        rank_delta,
    })
}

impl<R: Real> Comparison<R> {
    pub fn row_count(&self) -> usize {
        self.rank_a.len()
    }

    /// Rows ranked in the top `k` by either formula, sorted by `rank_a`.
    pub fn top_k_rows(&self, k: u32) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..self.row_count())
            .filter(|&row| self.rank_a[row] <= k || self.rank_b[row] <= k)
            .collect();
        rows.sort_by_key(|&row| self.rank_a[row]);
        rows
    }

    /// Ordered histogram of rank movement, for charting the reshuffle.
    pub fn delta_distribution(&self) -> BTreeMap<i64, usize> {
        let mut counts = BTreeMap::new();
        for &delta in &self.rank_delta {
            *counts.entry(delta).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self, top_k: u32) -> RankSummary {
        let a_top: HashSet<usize> = (0..self.row_count())
            .filter(|&row| self.rank_a[row] <= top_k)
            .collect();
        let b_top: HashSet<usize> = (0..self.row_count())
            .filter(|&row| self.rank_b[row] <= top_k)
            .collect();
        let mean_abs_rank_shift = if self.rank_delta.is_empty() {
            0.0
        } else {
            let total: f64 = self
                .rank_delta
                .iter()
                .map(|delta| delta.unsigned_abs() as f64)
                .sum();
            total / self.rank_delta.len() as f64
        };
        RankSummary {
            top_k_overlap: a_top.intersection(&b_top).count(),
            mean_abs_rank_shift,
            improved: self.rank_delta.iter().filter(|&&delta| delta < 0).count(),
            worsened: self.rank_delta.iter().filter(|&&delta| delta > 0).count(),
        }
    }
}

/// Aggregate view of how much a formula change reshuffled the ranking.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RankSummary {
    /// Rows present in both formulas' top k.
    pub top_k_overlap: usize,
    pub mean_abs_rank_shift: f64,
    /// Rows formula B moved up (`rank_delta < 0`).
    pub improved: usize,
    /// Rows formula B moved down (`rank_delta > 0`).
    pub worsened: usize,
}
