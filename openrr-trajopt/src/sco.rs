//! Modeling types shared with the sequential convex optimizer.
//!
//! The optimizer itself lives outside of this crate. It hands the flattened
//! trajectory `x` to [`Cost`] and [`Constraint`] implementations and receives
//! convex (affine / hinge) approximations back.

use std::fmt;

use crate::errors::*;

/// Handle of one decision variable, i.e. an index into the flattened trajectory vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(usize);

impl Var {
    pub fn new(index: usize) -> Self {
        Var(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }

    /// Read the value of this variable from `x`
    pub fn value(&self, x: &[f64]) -> Result<f64> {
        x.get(self.0).copied().ok_or(Error::VarOutOfRange {
            index: self.0,
            len: x.len(),
        })
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

pub type VarVector = Vec<Var>;

/// Extract the values of `vars` from `x`, keeping the order of `vars`
pub fn get_vec(x: &[f64], vars: &[Var]) -> Result<Vec<f64>> {
    vars.iter().map(|v| v.value(x)).collect()
}

/// Row-major `rows x cols` array of variables (one row per trajectory step)
#[derive(Debug, Clone)]
pub struct VarArray {
    rows: usize,
    cols: usize,
    vars: VarVector,
}

impl VarArray {
    /// Create variables `offset..offset + rows * cols`
    pub fn new(rows: usize, cols: usize, offset: usize) -> Self {
        Self {
            rows,
            cols,
            vars: (offset..offset + rows * cols).map(Var::new).collect(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> VarVector {
        self.vars[i * self.cols..(i + 1) * self.cols].to_vec()
    }

    pub fn at(&self, i: usize, j: usize) -> Var {
        self.vars[i * self.cols + j]
    }

    pub fn flatten(&self) -> &[Var] {
        &self.vars
    }
}

/// Affine expression `constant + Σ coeffs[i] * x[vars[i]]`
///
/// A linearized distance `d0 + g·(x − x0)` is stored with
/// `constant = d0 − g·x0`, so it can be evaluated at any `x` directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AffExpr {
    pub constant: f64,
    pub coeffs: Vec<f64>,
    pub vars: VarVector,
}

impl AffExpr {
    pub fn from_constant(constant: f64) -> Self {
        Self {
            constant,
            ..Default::default()
        }
    }

    pub fn add_term(&mut self, var: Var, coeff: f64) {
        self.vars.push(var);
        self.coeffs.push(coeff);
    }

    /// `self += Σ coeffs[i] * vars[i]`
    pub fn inc_dot(&mut self, coeffs: &[f64], vars: &[Var]) {
        debug_assert_eq!(coeffs.len(), vars.len());
        self.coeffs.extend_from_slice(coeffs);
        self.vars.extend_from_slice(vars);
    }

    pub fn value(&self, x: &[f64]) -> Result<f64> {
        let mut out = self.constant;
        for (coeff, var) in self.coeffs.iter().zip(&self.vars) {
            out += coeff * var.value(x)?;
        }
        Ok(out)
    }

    /// `constant − expr`
    pub fn negated_from(constant: f64, expr: &AffExpr) -> Self {
        Self {
            constant: constant - expr.constant,
            coeffs: expr.coeffs.iter().map(|c| -c).collect(),
            vars: expr.vars.clone(),
        }
    }
}

/// The convex program the optimizer is building for the current iterate
pub trait Model {
    /// Add a new variable with the given bounds
    fn add_var(&mut self, name: &str, lower: f64, upper: f64) -> Var;
    fn num_vars(&self) -> usize;
}

/// Minimal [`Model`] which only keeps track of the variables it hands out
#[derive(Debug, Clone, Default)]
pub struct BasicModel {
    names: Vec<String>,
    bounds: Vec<(f64, f64)>,
}

impl BasicModel {
    /// Create a model which already contains `num_vars` unbounded variables
    pub fn new(num_vars: usize) -> Self {
        let mut model = Self::default();
        for i in 0..num_vars {
            model.add_var(&format!("x{i}"), f64::NEG_INFINITY, f64::INFINITY);
        }
        model
    }

    pub fn var_name(&self, var: Var) -> Option<&str> {
        self.names.get(var.index()).map(String::as_str)
    }

    pub fn var_bounds(&self, var: Var) -> Option<(f64, f64)> {
        self.bounds.get(var.index()).copied()
    }
}

impl Model for BasicModel {
    fn add_var(&mut self, name: &str, lower: f64, upper: f64) -> Var {
        self.names.push(name.to_owned());
        self.bounds.push((lower, upper));
        Var::new(self.names.len() - 1)
    }

    fn num_vars(&self) -> usize {
        self.names.len()
    }
}

/// Convex objective built around the current iterate
#[derive(Debug, Clone, Default)]
pub struct ConvexObjective {
    /// `coeff * pos(expr)` terms in terms of the trajectory variables
    hinges: Vec<(AffExpr, f64)>,
    /// Linear part of the epigraph objective (`Σ coeff * h`)
    pub objective: AffExpr,
    /// Auxiliary variables added to the model
    pub aux_vars: VarVector,
    /// `expr − h <= 0` for each hinge
    pub ineqs: Vec<AffExpr>,
}

impl ConvexObjective {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `coeff * pos(expr)` to the objective
    pub fn add_hinge(&mut self, model: &mut dyn Model, expr: AffExpr, coeff: f64) {
        let hinge = model.add_var("hinge", 0.0, f64::INFINITY);
        let mut cnt = expr.clone();
        cnt.add_term(hinge, -1.0);
        self.ineqs.push(cnt);
        self.objective.add_term(hinge, coeff);
        self.aux_vars.push(hinge);
        self.hinges.push((expr, coeff));
    }

    pub fn num_hinges(&self) -> usize {
        self.hinges.len()
    }

    pub fn hinges(&self) -> &[(AffExpr, f64)] {
        &self.hinges
    }

    /// Value of the convex approximation at `x`
    pub fn value(&self, x: &[f64]) -> Result<f64> {
        let mut out = 0.0;
        for (expr, coeff) in &self.hinges {
            out += coeff * expr.value(x)?.max(0.0);
        }
        Ok(out)
    }
}

/// Affine inequalities `expr <= 0` built around the current iterate
#[derive(Debug, Clone, Default)]
pub struct ConvexConstraints {
    pub ineqs: Vec<AffExpr>,
}

impl ConvexConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_ineq(&mut self, expr: AffExpr) {
        self.ineqs.push(expr);
    }

    pub fn violations(&self, x: &[f64]) -> Result<Vec<f64>> {
        self.ineqs
            .iter()
            .map(|expr| Ok(expr.value(x)?.max(0.0)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintType {
    Eq,
    Ineq,
}

/// Cost term evaluated by the optimizer
pub trait Cost {
    fn name(&self) -> &str;
    fn value(&self, x: &[f64]) -> Result<f64>;
    fn convex(&self, x: &[f64], model: &mut dyn Model) -> Result<ConvexObjective>;
    fn vars(&self) -> VarVector;
}

/// Constraint term evaluated by the optimizer
pub trait Constraint {
    fn name(&self) -> &str;
    fn constraint_type(&self) -> ConstraintType;
    fn value(&self, x: &[f64]) -> Result<Vec<f64>>;
    fn convex(&self, x: &[f64], model: &mut dyn Model) -> Result<ConvexConstraints>;
    fn vars(&self) -> VarVector;

    fn violations(&self, x: &[f64]) -> Result<Vec<f64>> {
        let values = self.value(x)?;
        Ok(match self.constraint_type() {
            ConstraintType::Eq => values.into_iter().map(f64::abs).collect(),
            ConstraintType::Ineq => values.into_iter().map(|v| v.max(0.0)).collect(),
        })
    }

    fn violation(&self, x: &[f64]) -> Result<f64> {
        Ok(self.violations(x)?.iter().sum())
    }
}
