//! Statistics derived from an attainment grid
//!
//! Every function here is a pure read of the grid: calling it twice
//! without new observations gives the same result.


use super::{AttainmentGrid, Scale};

/// Attained-run counts, indexed `[evaluation bucket][value bucket]`.
#[must_use]
pub fn histogram(grid: &AttainmentGrid) -> Vec<Vec<u64>> {
    if grid.value_buckets() == 0 {
        return vec![Vec::new(); grid.evaluation_buckets()];
    }
    grid.cells()
        .chunks(grid.value_buckets())
        .map(<[u64]>::to_vec)
        .collect()
}

/// Fraction of runs attaining each cell; all zero before the first run.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn distribution(grid: &AttainmentGrid) -> Vec<Vec<f64>> {
    let runs = grid.runs();
    histogram(grid)
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|count| if runs == 0 { 0.0 } else { count as f64 / runs as f64 })
                .collect()
        })
        .collect()
}

/// Total attained-run count over all cells.
#[must_use]
pub fn sum(grid: &AttainmentGrid) -> u64 {
    grid.cells().iter().sum()
}

/// Fraction of (run, cell) pairs attained, in `[0, 1]`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn volume(grid: &AttainmentGrid) -> f64 {
    let total = grid.runs() as f64 * grid.cells().len() as f64;
    if total == 0.0 {
        return 0.0;
    }
    sum(grid) as f64 / total
}

/// Per evaluation bucket, fraction of (run, value bucket) pairs attained.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn surface(grid: &AttainmentGrid) -> Vec<f64> {
    let total = grid.runs() as f64 * grid.value_buckets() as f64;
    histogram(grid)
        .into_iter()
        .map(|row| {
            if total == 0.0 {
                0.0
            } else {
                row.iter().sum::<u64>() as f64 / total
            }
        })
        .collect()
}

/// Volume with every cell weighted by the relative raw width of its
/// buckets, in `[0, 1]`. Differs from [`volume`] on logarithmic axes.
#[must_use]
pub fn weighted_volume(grid: &AttainmentGrid, evaluations: &Scale, values: &Scale) -> f64 {
    distribution(grid)
        .iter()
        .enumerate()
        .map(|(e, row)| {
            let w_evals = evaluations.relative_width(e);
            row.iter()
                .enumerate()
                .map(|(v, p)| p * w_evals * values.relative_width(v))
                .sum::<f64>()
        })
        .sum()
}

const SHADES: [char; 10] = [' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'];

/// Plain-text picture of the attainment distribution.
///
/// One line per value bucket, best targets at the bottom for
/// minimization; one character per evaluation bucket, darker for a higher
/// fraction of runs.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn render(grid: &AttainmentGrid, evaluations: &Scale, values: &Scale) -> String {
    let dist = distribution(grid);
    let mut out = String::new();
    for v in (0..grid.value_buckets()).rev() {
        let (low, high) = values.bounds(v);
        out.push_str(&format!("{low:>10.3e} .. {high:<10.3e} |"));
        for row in &dist {
            let level = (row[v] * (SHADES.len() - 1) as f64).round() as usize;
            out.push(SHADES[level.min(SHADES.len() - 1)]);
        }
        out.push_str("|\n");
    }
    out.push_str(&format!(
        "{:>25}{} .. {} evaluations, {} run(s)\n",
        "",
        evaluations.min(),
        evaluations.max(),
        grid.runs()
    ));
    out
}
