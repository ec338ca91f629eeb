//! One-dimensional logistic regression.
//!
//! Minimizes `0.5·w² + C·Σ logloss(y, σ(b + w·x))`: the slope is L2-penalized,
//! the intercept is not. Solved with damped Newton–Raphson on the 2×2 system.

/// Fitted `p = σ(intercept + slope·x)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticModel {
    pub intercept: f64,
    pub slope: f64,
}

impl LogisticModel {
    pub fn predict(&self, x: f64) -> f64 {
        sigmoid(self.intercept + self.slope * x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticFit {
    pub model: LogisticModel,
    pub iterations: usize,
    pub converged: bool,
}

pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)` without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

fn objective(x: &[f64], y: &[bool], c: f64, b: f64, w: f64) -> f64 {
    let loss: f64 = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| {
            let z = b + w * xi;
            // -log σ(z) for positives, -log(1 - σ(z)) for negatives
            if yi {
                softplus(-z)
            } else {
                softplus(z)
            }
        })
        .sum();
    0.5 * w * w + c * loss
}

/// Fit on paired samples. `c` is the inverse regularization strength.
///
/// Callers must ensure both classes are present; with a single class the
/// intercept runs off to infinity and the fit reports `converged == false`.
pub fn fit(x: &[f64], y: &[bool], c: f64, max_iter: usize, tol: f64) -> LogisticFit {
    let mut b = 0.0;
    let mut w = 0.0;
    let mut current = objective(x, y, c, b, w);

    for iter in 0..max_iter {
        let (mut gb, mut gw) = (0.0, w);
        let (mut hbb, mut hbw, mut hww) = (0.0, 0.0, 1.0);
        for (&xi, &yi) in x.iter().zip(y) {
            let p = sigmoid(b + w * xi);
            let r = p - if yi { 1.0 } else { 0.0 };
            let s = p * (1.0 - p);
            gb += c * r;
            gw += c * r * xi;
            hbb += c * s;
            hbw += c * s * xi;
            hww += c * s * xi * xi;
        }

        if gb.abs().max(gw.abs()) < tol {
            return LogisticFit {
                model: LogisticModel { intercept: b, slope: w },
                iterations: iter,
                converged: true,
            };
        }

        // Tiny ridge on the intercept keeps the system solvable when every
        // prediction saturates.
        let hbb = hbb + 1e-12;
        let det = hbb * hww - hbw * hbw;
        let (db, dw) = if det.abs() > f64::EPSILON {
            ((hww * gb - hbw * gw) / det, (hbb * gw - hbw * gb) / det)
        } else {
            (gb / hbb, gw / hww)
        };

        let mut step = 1.0;
        loop {
            let nb = b - step * db;
            let nw = w - step * dw;
            let next = objective(x, y, c, nb, nw);
            // Near the optimum the decrease drops below rounding noise.
            if next <= current + 1e-12 * current.abs().max(1.0) || step < 1e-10 {
                b = nb;
                w = nw;
                current = next;
                break;
            }
            step *= 0.5;
        }
    }

    LogisticFit {
        model: LogisticModel { intercept: b, slope: w },
        iterations: max_iter,
        converged: false,
    }
}
