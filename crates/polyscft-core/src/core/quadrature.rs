use serde::Deserialize;

/// Integration rule over the contour points of one chain block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContourQuadrature {
    /// Extended trapezoid rule: half weight at both block ends.
    #[default]
    Trapezoid,
    /// Composite Simpson rule, closed with a 3/8 panel when the interval
    /// count is odd.
    Simpson,
}

impl ContourQuadrature {
    /// Weights for `n_intervals + 1` equally spaced points, in units of the
    /// spacing.
    pub fn weights(self, n_intervals: usize) -> Vec<f64> {
        match self {
            Self::Trapezoid => trapezoid_weights(n_intervals),
            Self::Simpson => simpson_weights(n_intervals),
        }
    }
}

fn trapezoid_weights(n: usize) -> Vec<f64> {
    let mut w = vec![1.0; n + 1];
    if n == 0 {
        w[0] = 0.0;
        return w;
    }
    w[0] = 0.5;
    w[n] = 0.5;
    w
}

fn simpson_weights(n: usize) -> Vec<f64> {
    if n < 2 {
        return trapezoid_weights(n);
    }

    let mut w = vec![0.0; n + 1];
    let simpson_end = if n % 2 == 0 { n } else { n - 3 };
    for panel in (0..simpson_end).step_by(2) {
        w[panel] += 1.0 / 3.0;
        w[panel + 1] += 4.0 / 3.0;
        w[panel + 2] += 1.0 / 3.0;
    }
    if n % 2 == 1 {
        let s = simpson_end;
        w[s] += 3.0 / 8.0;
        w[s + 1] += 9.0 / 8.0;
        w[s + 2] += 9.0 / 8.0;
        w[s + 3] += 3.0 / 8.0;
    }
    w
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn integrate(rule: ContourQuadrature, n: usize, f: impl Fn(f64) -> f64) -> f64 {
        let h = 1.0 / n as f64;
        rule.weights(n)
            .iter()
            .enumerate()
            .map(|(i, w)| w * f(i as f64 * h) * h)
            .sum()
    }

    #[test]
    fn trapezoid_weights_halve_the_ends() {
        assert_eq!(ContourQuadrature::Trapezoid.weights(2), vec![0.5, 1.0, 0.5]);
        assert_eq!(ContourQuadrature::Trapezoid.weights(1), vec![0.5, 0.5]);
    }

    #[test]
    fn weights_sum_to_interval_count() {
        for rule in [ContourQuadrature::Trapezoid, ContourQuadrature::Simpson] {
            for n in 1..12 {
                let total: f64 = rule.weights(n).iter().sum();
                assert!((total - n as f64).abs() < TOLERANCE, "{rule:?} n={n}");
            }
        }
    }

    #[test]
    fn simpson_is_exact_for_cubics_with_even_and_odd_counts() {
        let cubic = |x: f64| 2.0 * x * x * x - x * x + 3.0 * x + 1.0;
        let exact = 0.5 - 1.0 / 3.0 + 1.5 + 1.0;
        for n in [2, 3, 4, 5, 8, 9] {
            let approx = integrate(ContourQuadrature::Simpson, n, cubic);
            assert!((approx - exact).abs() < 1e-12, "n={n}: {approx}");
        }
    }

    #[test]
    fn trapezoid_is_exact_for_linear_functions() {
        let approx = integrate(ContourQuadrature::Trapezoid, 7, |x| 3.0 * x - 2.0);
        assert!((approx - (-0.5)).abs() < TOLERANCE);
    }

    #[test]
    fn simpson_with_one_interval_falls_back_to_trapezoid() {
        assert_eq!(ContourQuadrature::Simpson.weights(1), vec![0.5, 0.5]);
    }
}
