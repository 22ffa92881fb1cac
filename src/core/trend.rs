//! Trend lines for the displacement time series.

use serde::{Deserialize, Serialize};

/// Days per year used to express velocities in mm/yr
pub const DAYS_PER_YEAR: f64 = 365.25;

/// Default LOESS bandwidth, the fraction of points in each local fit
pub const DEFAULT_LOESS_BANDWIDTH: f64 = 0.3;

/// Trend fitting method offered for the time series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrendMethod {
    #[default]
    LinearRegression,
    Loess,
}

impl std::str::FromStr for TrendMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" | "linear-regression" | "linear regression" => Ok(TrendMethod::LinearRegression),
            "loess" | "lowess" => Ok(TrendMethod::Loess),
            _ => Err(format!("unknown trend method: {}", s)),
        }
    }
}

/// Ordinary least squares fit `y = intercept + slope * x`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    /// Standard error of the slope, `None` with fewer than 3 points
    pub slope_stderr: Option<f64>,
    pub r_squared: f64,
}

impl LinearFit {
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }
}

/// Least squares line through `(x, y)`; `None` for fewer than 2 points or constant `x`
pub fn linear_fit(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        let dy = y[i] - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let sse: f64 = (0..n)
        .map(|i| {
            let residual = y[i] - (intercept + slope * x[i]);
            residual * residual
        })
        .sum();

    let slope_stderr = if n > 2 {
        Some((sse / (nf - 2.0) / sxx).sqrt())
    } else {
        None
    };

    let r_squared = if syy == 0.0 { 1.0 } else { 1.0 - sse / syy };

    Some(LinearFit {
        slope,
        intercept,
        slope_stderr,
        r_squared,
    })
}

/// Locally weighted linear regression evaluated at each `x`.
///
/// Each local fit uses the nearest `ceil(bandwidth * n)` points (at least 2)
/// with tricube weights. `x` must be sorted ascending.
pub fn loess(x: &[f64], y: &[f64], bandwidth: f64) -> Vec<f64> {
    let n = x.len().min(y.len());
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![y[0]];
    }

    let span = ((bandwidth * n as f64).ceil() as usize).clamp(2, n);
    let mut fitted = Vec::with_capacity(n);

    for i in 0..n {
        let x0 = x[i];

        // slide a window of `span` points to the nearest neighbours of x0
        let mut left = i.saturating_sub(span - 1).min(n - span);
        while left + span < n && x0 - x[left] > x[left + span] - x0 {
            left += 1;
        }
        let right = left + span;

        let max_dist = (x0 - x[left]).abs().max((x[right - 1] - x0).abs());

        let mut sw = 0.0;
        let mut swx = 0.0;
        let mut swy = 0.0;
        let mut swxx = 0.0;
        let mut swxy = 0.0;
        for j in left..right {
            let w = if max_dist > 0.0 {
                let u = ((x[j] - x0) / max_dist).abs();
                if u < 1.0 {
                    (1.0 - u * u * u).powi(3)
                } else {
                    0.0
                }
            } else {
                1.0
            };
            sw += w;
            swx += w * x[j];
            swy += w * y[j];
            swxx += w * x[j] * x[j];
            swxy += w * x[j] * y[j];
        }

        if sw == 0.0 {
            fitted.push(y[i]);
            continue;
        }

        let mx = swx / sw;
        let my = swy / sw;
        let var = swxx / sw - mx * mx;
        let value = if var.abs() < 1e-12 {
            my
        } else {
            let slope = (swxy / sw - mx * my) / var;
            my + slope * (x0 - mx)
        };
        fitted.push(value);
    }

    fitted
}
