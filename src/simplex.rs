//! Nelder-Mead direct search.
//!
//! Derivative-free: only objective values are compared, so the objective may
//! be discontinuous (the window planner snaps to discrete slices).

use ndarray::Array1;
use serde::{Deserialize, Serialize};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Scale factors for the initial simplex around the start point.
const INITIAL_LOW: f64 = 0.9;
const INITIAL_HIGH: f64 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexOptions {
    pub max_iterations: usize,
    /// Convergence tolerance on vertex distance to the best vertex.
    pub xatol: f64,
    /// Convergence tolerance on objective spread across the simplex.
    pub fatol: f64,
}

impl Default for SimplexOptions {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            xatol: 1e-4,
            fatol: 1e-4,
        }
    }
}

/// Best vertex and its objective value after one iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub params: Vec<f64>,
    pub cost: f64,
}

#[derive(Debug, Clone)]
pub struct SimplexResult {
    pub best: Array1<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub history: Vec<IterationRecord>,
}

/// Initial simplex: every coordinate at 0.9 of `x0`, then one vertex per
/// dimension with that coordinate at 1.1 instead.
pub fn initial_simplex(x0: &Array1<f64>) -> Vec<Array1<f64>> {
    let low = x0 * INITIAL_LOW;
    let mut vertices = vec![low.clone()];
    for i in 0..x0.len() {
        let mut vertex = low.clone();
        vertex[i] = x0[i] * INITIAL_HIGH;
        vertices.push(vertex);
    }
    vertices
}

/// Minimize `objective` starting from `x0`
pub fn minimize<F>(mut objective: F, x0: &Array1<f64>, options: &SimplexOptions) -> SimplexResult
where
    F: FnMut(&Array1<f64>) -> f64,
{
    let mut simplex = initial_simplex(x0);
    let mut values: Vec<f64> = simplex.iter().map(&mut objective).collect();
    let mut evaluations = values.len();
    sort_simplex(&mut simplex, &mut values);

    let n = x0.len();
    let mut history = Vec::new();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        if has_converged(&simplex, &values, options) {
            converged = true;
            break;
        }

        let centroid = centroid(&simplex[..n]);
        let worst = &simplex[n];

        let reflected = combine(&centroid, 1.0 + REFLECTION, worst, -REFLECTION);
        let f_reflected = objective(&reflected);
        evaluations += 1;

        let mut shrink = false;
        if f_reflected < values[0] {
            let expanded = combine(
                &centroid,
                1.0 + REFLECTION * EXPANSION,
                worst,
                -REFLECTION * EXPANSION,
            );
            let f_expanded = objective(&expanded);
            evaluations += 1;
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
        } else if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
        } else if f_reflected < values[n] {
            let outside = combine(
                &centroid,
                1.0 + CONTRACTION * REFLECTION,
                worst,
                -CONTRACTION * REFLECTION,
            );
            let f_outside = objective(&outside);
            evaluations += 1;
            if f_outside <= f_reflected {
                simplex[n] = outside;
                values[n] = f_outside;
            } else {
                shrink = true;
            }
        } else {
            let inside = combine(&centroid, 1.0 - CONTRACTION, worst, CONTRACTION);
            let f_inside = objective(&inside);
            evaluations += 1;
            if f_inside < values[n] {
                simplex[n] = inside;
                values[n] = f_inside;
            } else {
                shrink = true;
            }
        }

        if shrink {
            let best = simplex[0].clone();
            for j in 1..=n {
                simplex[j] = combine(&best, 1.0 - SHRINK, &simplex[j], SHRINK);
                values[j] = objective(&simplex[j]);
                evaluations += 1;
            }
        }

        iterations += 1;
        sort_simplex(&mut simplex, &mut values);
        history.push(IterationRecord {
            params: simplex[0].to_vec(),
            cost: values[0],
        });
    }

    if !converged {
        converged = has_converged(&simplex, &values, options);
    }

    SimplexResult {
        best: simplex[0].clone(),
        value: values[0],
        iterations,
        evaluations,
        converged,
        history,
    }
}

/// `a * wa + b * wb`
fn combine(a: &Array1<f64>, wa: f64, b: &Array1<f64>, wb: f64) -> Array1<f64> {
    let mut out = a * wa;
    out.scaled_add(wb, b);
    out
}

fn centroid(vertices: &[Array1<f64>]) -> Array1<f64> {
    let mut sum = Array1::zeros(vertices[0].len());
    for vertex in vertices {
        sum += vertex;
    }
    sum /= vertices.len() as f64;
    sum
}

fn sort_simplex(simplex: &mut Vec<Array1<f64>>, values: &mut Vec<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    *simplex = order.iter().map(|&i| simplex[i].clone()).collect();
    *values = order.iter().map(|&i| values[i]).collect();
}

fn has_converged(simplex: &[Array1<f64>], values: &[f64], options: &SimplexOptions) -> bool {
    let best = &simplex[0];
    let x_spread = simplex[1..]
        .iter()
        .flat_map(|vertex| vertex.iter().zip(best.iter()).map(|(a, b)| (a - b).abs()))
        .fold(0.0, f64::max);
    let f_spread = values[1..]
        .iter()
        .map(|value| (value - values[0]).abs())
        .fold(0.0, f64::max);
    x_spread <= options.xatol && f_spread <= options.fatol
}
