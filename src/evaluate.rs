use std::collections::HashMap;

use thiserror::Error;

use crate::expression::ScoreExpr;
use crate::Real;

#[cfg(feature = "rayon")]
use rayon::prelude::{
    IndexedParallelIterator, IntoParallelRefIterator, ParallelExtend, ParallelIterator,
};

/// Failure while evaluating a [`ScoreExpr`] over bound columns.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    /// The tree references a variable the bindings do not supply.
    ///
    /// This check runs on every variable node, so it holds even for trees
    /// that were built without going through [`ScoreExpr::parse`].
    #[error("unknown variable `{name}`")]
    UnknownVariable { name: String },
}

/// Per-row input columns, keyed by variable name.
///
/// Every column holds exactly `row_count` values; [`Bindings::bind`] enforces
/// this at insertion so evaluation never sees ragged inputs.
#[derive(Clone, Debug)]
pub struct Bindings<R> {
    row_count: usize,
    columns: HashMap<String, Vec<R>>,
}

impl<R: Real> Bindings<R> {
    pub fn new(row_count: usize) -> Self {
        Self {
            row_count,
            columns: HashMap::new(),
        }
    }

    /// Attach one column. Panics if `values` is not `row_count` long.
    pub fn bind(&mut self, name: impl Into<String>, values: Vec<R>) -> &mut Self {
        assert_eq!(values.len(), self.row_count);
        self.columns.insert(name.into(), values);
        self
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column(&self, name: &str) -> Option<&[R]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

fn lookup<'a, R: Real>(bindings: &'a Bindings<R>, name: &str) -> Result<&'a [R], EvalError> {
    bindings.column(name).ok_or_else(|| EvalError::UnknownVariable {
        name: name.to_string(),
    })
}

impl<R: Real> ScoreExpr<R> {
    pub fn evaluate_without_vars(&self, registers: &mut Registers<R>) -> Result<Vec<R>, EvalError> {
        self.evaluate(&Bindings::new(registers.register_length), registers)
    }

    /// Calculates the per-row results of the formula component-wise.
    ///
    /// Evaluation is a pure function of the tree and `bindings`: left operand
    /// before right, no state carried between calls. Division by zero follows
    /// IEEE 754, so `x / 0` is ±infinity and `0 / 0` is NaN, never an error;
    /// downstream ranking sorts NaN scores last.
    ///
    /// The result is unclamped. Raising negative scores to zero is a separate
    /// step ([`crate::clamp_nonnegative`]) applied before ranking.
    pub fn evaluate(
        &self,
        bindings: &Bindings<R>,
        registers: &mut Registers<R>,
    ) -> Result<Vec<R>, EvalError> {
        assert_eq!(bindings.row_count(), registers.register_length);
        self.evaluate_recursive(bindings, registers)
    }

    fn evaluate_recursive(
        &self,
        bindings: &Bindings<R>,
        registers: &mut Registers<R>,
    ) -> Result<Vec<R>, EvalError> {
        match self {
            Self::Add(lhs, rhs) => {
                evaluate_binary_op(|lhs, rhs| lhs + rhs, lhs, rhs, bindings, registers)
            }
            Self::Div(lhs, rhs) => {
                evaluate_binary_op(|lhs, rhs| lhs / rhs, lhs, rhs, bindings, registers)
            }
            Self::Literal(value) => {
                let mut output = registers.allocate();
                output.extend(std::iter::repeat(*value).take(registers.register_length));
                Ok(output)
            }
            Self::Mul(lhs, rhs) => {
                evaluate_binary_op(|lhs, rhs| lhs * rhs, lhs, rhs, bindings, registers)
            }
            Self::Neg(only) => evaluate_unary_op(|only| -only, only, bindings, registers),
            Self::Sub(lhs, rhs) => {
                evaluate_binary_op(|lhs, rhs| lhs - rhs, lhs, rhs, bindings, registers)
            }
            // This branch is only taken when the entire formula is the
            // identity map of one column.
            Self::Var(name) => {
                let column = lookup(bindings, name)?;
                let mut output = registers.allocate();
                output.extend_from_slice(column);
                Ok(output)
            }
        }
    }
}

fn evaluate_binary_op<R: Real>(
    op: fn(R, R) -> R,
    lhs: &ScoreExpr<R>,
    rhs: &ScoreExpr<R>,
    bindings: &Bindings<R>,
    registers: &mut Registers<R>,
) -> Result<Vec<R>, EvalError> {
    // Bare variable operands borrow their column directly. This avoids
    // copying input data into a register.
    let mut lhs_reg = None;
    let lhs_values: &[R] = if let ScoreExpr::Var(name) = lhs {
        lookup(bindings, name)?
    } else {
        lhs_reg = Some(lhs.evaluate_recursive(bindings, registers)?);
        lhs_reg.as_ref().unwrap()
    };
    let mut rhs_reg = None;
    let rhs_values: &[R] = if let ScoreExpr::Var(name) = rhs {
        lookup(bindings, name)?
    } else {
        rhs_reg = Some(rhs.evaluate_recursive(bindings, registers)?);
        rhs_reg.as_ref().unwrap()
    };
    // Allocate this output register as lazily as possible.
    let mut output = registers.allocate();

    #[cfg(feature = "rayon")]
    {
        output.par_extend(
            lhs_values
                .par_iter()
                .zip(rhs_values.par_iter())
                .map(|(lhs, rhs)| op(*lhs, *rhs)),
        );
    }
    #[cfg(not(feature = "rayon"))]
    {
        output.extend(
            lhs_values
                .iter()
                .zip(rhs_values.iter())
                .map(|(lhs, rhs)| op(*lhs, *rhs)),
        );
    }

    if let Some(r) = lhs_reg {
        registers.recycle(r);
    }
    if let Some(r) = rhs_reg {
        registers.recycle(r);
    }
    Ok(output)
}

fn evaluate_unary_op<R: Real>(
    op: fn(R) -> R,
    only: &ScoreExpr<R>,
    bindings: &Bindings<R>,
    registers: &mut Registers<R>,
) -> Result<Vec<R>, EvalError> {
    let mut only_reg = None;
    let only_values: &[R] = if let ScoreExpr::Var(name) = only {
        lookup(bindings, name)?
    } else {
        only_reg = Some(only.evaluate_recursive(bindings, registers)?);
        only_reg.as_ref().unwrap()
    };
    let mut output = registers.allocate();

    #[cfg(feature = "rayon")]
    {
        output.par_extend(only_values.par_iter().map(|only| op(*only)));
    }
    #[cfg(not(feature = "rayon"))]
    {
        output.extend(only_values.iter().map(|only| op(*only)));
    }

    if let Some(r) = only_reg {
        registers.recycle(r);
    }
    Ok(output)
}

/// Scratch space for evaluation. Can be reused across evaluations with the
/// same row count.
///
/// Recycles registers once intermediate calculations have finished, so a
/// formula with many operators settles into a small number of allocations.
pub struct Registers<R> {
    num_allocations: usize,
    pool: Vec<Vec<R>>,
    register_length: usize,
}

impl<R: Real> Registers<R> {
    pub fn new(register_length: usize) -> Self {
        Self {
            num_allocations: 0,
            pool: vec![],
            register_length,
        }
    }

    fn recycle(&mut self, mut used: Vec<R>) {
        used.clear();
        self.pool.push(used);
    }

    fn allocate(&mut self) -> Vec<R> {
        self.pool.pop().unwrap_or_else(|| {
            self.num_allocations += 1;
            Vec::with_capacity(self.register_length)
        })
    }

    pub fn num_allocations(&self) -> usize {
        self.num_allocations
    }
}
