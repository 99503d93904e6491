//! Chi-square objective over observed data.

use super::types::ResponseModel;
use crate::error::{Error, Result};
use crate::params::ParameterStore;

/// Uncertainties at or below this value exclude their point from the sum.
pub const SIGMA_EPSILON: f64 = 1e-5;

/// Observed abscissae, values and 1-sigma uncertainties.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservedData {
    xs: Vec<f64>,
    ys: Vec<f64>,
    es: Vec<f64>,
}

impl ObservedData {
    pub fn new(xs: Vec<f64>, ys: Vec<f64>, es: Vec<f64>) -> Result<Self> {
        if ys.len() != xs.len() {
            return Err(Error::SizeMismatch {
                what: "observed values",
                expected: xs.len(),
                actual: ys.len(),
            });
        }
        if es.len() != xs.len() {
            return Err(Error::SizeMismatch {
                what: "observed uncertainties",
                expected: xs.len(),
                actual: es.len(),
            });
        }
        if xs.is_empty() {
            return Err(Error::EmptyData);
        }
        Ok(Self { xs, ys, es })
    }

    pub fn xs(&self) -> &[f64] {
        &self.xs
    }

    pub fn ys(&self) -> &[f64] {
        &self.ys
    }

    pub fn es(&self) -> &[f64] {
        &self.es
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    /// Same points with every uncertainty replaced by `sigma`.
    pub fn with_constant_error(&self, sigma: f64) -> Self {
        Self {
            xs: self.xs.clone(),
            ys: self.ys.clone(),
            es: vec![sigma; self.xs.len()],
        }
    }
}

/// Breakdown of one chi-square evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ChiSquare {
    pub value: f64,
    /// Points that contributed to `value`.
    pub included: usize,
    /// Points skipped because their uncertainty is below [`SIGMA_EPSILON`].
    pub skipped: usize,
    /// Points skipped because the prediction or its term is not finite.
    pub degenerate: Vec<usize>,
}

impl ChiSquare {
    pub fn is_degenerate(&self) -> bool {
        !self.degenerate.is_empty()
    }

    /// Chi-square for comparison against a reference evaluation that
    /// included `baseline_included` points. An evaluation that lost points
    /// to degeneracy, or included none, scores `f64::INFINITY`: dropping
    /// points must never look like an improvement.
    pub fn score(&self, baseline_included: usize) -> f64 {
        if self.included == 0 || self.included < baseline_included {
            f64::INFINITY
        } else {
            self.value
        }
    }
}

/// Model prediction plus its chi-square.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub predicted: Vec<f64>,
    pub chi_square: ChiSquare,
}

/// `Σ ((p - o) / s)^2` over points with `s > SIGMA_EPSILON`.
pub fn chi_square(predicted: &[f64], observed: &[f64], sigma: &[f64]) -> Result<f64> {
    chi_square_terms(predicted, observed, sigma).map(|c| c.value)
}

/// Like [`chi_square`], also reporting excluded points.
pub fn chi_square_terms(predicted: &[f64], observed: &[f64], sigma: &[f64]) -> Result<ChiSquare> {
    if observed.len() != predicted.len() {
        return Err(Error::SizeMismatch {
            what: "observed values",
            expected: predicted.len(),
            actual: observed.len(),
        });
    }
    if sigma.len() != predicted.len() {
        return Err(Error::SizeMismatch {
            what: "uncertainties",
            expected: predicted.len(),
            actual: sigma.len(),
        });
    }

    let mut out = ChiSquare {
        value: 0.0,
        included: 0,
        skipped: 0,
        degenerate: Vec::new(),
    };
    for (i, ((&p, &o), &s)) in predicted.iter().zip(observed).zip(sigma).enumerate() {
        if s <= SIGMA_EPSILON {
            out.skipped += 1;
            continue;
        }
        let term = ((p - o) / s).powi(2);
        if !p.is_finite() || !term.is_finite() {
            out.degenerate.push(i);
            continue;
        }
        out.value += term;
        out.included += 1;
    }
    Ok(out)
}

/// A response model bound to a parameter store layout and a data set.
#[derive(Debug, Clone)]
pub struct Objective<M> {
    model: M,
    data: ObservedData,
    binding: Vec<usize>,
    store_len: usize,
}

impl<M: ResponseModel> Objective<M> {
    /// Binds each model parameter name to its store index.
    pub fn new(model: M, data: ObservedData, store: &ParameterStore) -> Result<Self> {
        let binding = model
            .parameter_names()
            .iter()
            .map(|name| store.index_of(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            model,
            data,
            binding,
            store_len: store.len(),
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn data(&self) -> &ObservedData {
        &self.data
    }

    fn check_len(&self, values: &[f64]) -> Result<()> {
        if values.len() != self.store_len {
            return Err(Error::SizeMismatch {
                what: "parameter vector",
                expected: self.store_len,
                actual: values.len(),
            });
        }
        Ok(())
    }

    /// Model values at every observed abscissa for a full store vector.
    pub fn evaluate(&self, values: &[f64]) -> Result<Vec<f64>> {
        self.check_len(values)?;
        let params: Vec<f64> = self.binding.iter().map(|&i| values[i]).collect();
        let mut out = vec![0.0; self.data.len()];
        self.model.evaluate(&params, self.data.xs(), &mut out);
        Ok(out)
    }

    pub fn evaluation(&self, values: &[f64]) -> Result<Evaluation> {
        let predicted = self.evaluate(values)?;
        let chi_square = chi_square_terms(&predicted, self.data.ys(), self.data.es())?;
        Ok(Evaluation {
            predicted,
            chi_square,
        })
    }

    pub fn chi_square_of(&self, values: &[f64]) -> Result<ChiSquare> {
        self.evaluation(values).map(|e| e.chi_square)
    }

    /// Chi-square at the store's current values, nothing varied.
    pub fn evaluate_frozen(&self, store: &ParameterStore) -> Result<f64> {
        self.chi_square_of(store.values()).map(|c| c.value)
    }

    /// Weighted residuals `(p - o) / s`, zero for excluded points.
    pub fn residuals(&self, values: &[f64]) -> Result<Vec<f64>> {
        let predicted = self.evaluate(values)?;
        Ok(predicted
            .iter()
            .zip(self.data.ys())
            .zip(self.data.es())
            .map(|((&p, &o), &s)| {
                if s <= SIGMA_EPSILON {
                    return 0.0;
                }
                let r = (p - o) / s;
                if r.is_finite() && (r * r).is_finite() {
                    r
                } else {
                    0.0
                }
            })
            .collect())
    }

    /// Number of points that can contribute to the chi-square.
    pub fn weighted_points(&self) -> usize {
        self.data.es().iter().filter(|&&s| s > SIGMA_EPSILON).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterRow;
    use approx::assert_relative_eq;

    #[derive(Debug)]
    struct Line;

    impl ResponseModel for Line {
        fn parameter_names(&self) -> &[&str] {
            &["Offset", "Slope"]
        }

        fn evaluate(&self, params: &[f64], xs: &[f64], out: &mut [f64]) {
            for (y, &x) in out.iter_mut().zip(xs) {
                *y = params[0] + params[1] * x;
            }
        }
    }

    fn store() -> ParameterStore {
        ParameterStore::from_rows(&[
            ParameterRow::new("Slope", 2.0, "f", -10.0, 10.0, 0.1),
            ParameterRow::new("Unused", 9.0, "t", 0.0, 10.0, 0.1),
            ParameterRow::new("Offset", 1.0, "f", -10.0, 10.0, 0.1),
        ])
        .unwrap()
    }

    #[test]
    fn test_chi_square_basic() {
        let chi = chi_square(&[1.0, 2.0], &[0.0, 0.0], &[1.0, 2.0]).unwrap();
        assert_relative_eq!(chi, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_chi_square_skips_tiny_sigma() {
        let c = chi_square_terms(&[1.0, 100.0], &[0.0, 0.0], &[1.0, 1e-6]).unwrap();
        assert_relative_eq!(c.value, 1.0, epsilon = 1e-12);
        assert_eq!(c.skipped, 1);
        assert_eq!(c.included, 1);
    }

    #[test]
    fn test_chi_square_size_mismatch() {
        let err = chi_square(&[1.0, 2.0], &[0.0], &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, Error::SizeMismatch { .. }));
    }

    #[test]
    fn test_chi_square_degenerate_point_excluded() {
        let c = chi_square_terms(&[f64::NAN, 2.0, f64::INFINITY], &[0.0; 3], &[1.0; 3]).unwrap();
        assert_relative_eq!(c.value, 4.0, epsilon = 1e-12);
        assert_eq!(c.degenerate, vec![0, 2]);
    }

    #[test]
    fn test_all_degenerate_scores_infinite() {
        let c = chi_square_terms(&[f64::NAN, f64::INFINITY], &[1.0, 2.0], &[1.0; 2]).unwrap();
        assert_eq!(c.value, 0.0);
        assert_eq!(c.included, 0);
        assert_eq!(c.score(0), f64::INFINITY);
    }

    #[test]
    fn test_score_penalizes_lost_points() {
        let full = chi_square_terms(&[1.0, 1.0], &[0.0, 0.0], &[1.0; 2]).unwrap();
        let partial = chi_square_terms(&[f64::NAN, 1.0], &[0.0, 0.0], &[1.0; 2]).unwrap();
        assert_eq!(full.score(2), 2.0);
        assert_eq!(partial.score(full.included), f64::INFINITY);
        assert_eq!(partial.score(1), 1.0);
    }

    #[test]
    fn test_observed_data_validation() {
        assert_eq!(
            ObservedData::new(vec![], vec![], vec![]),
            Err(Error::EmptyData)
        );
        assert!(ObservedData::new(vec![1.0], vec![1.0, 2.0], vec![1.0]).is_err());
    }

    #[test]
    fn test_objective_binds_by_name() {
        let s = store();
        let data = ObservedData::new(vec![0.0, 1.0], vec![1.0, 3.0], vec![1.0, 1.0]).unwrap();
        let obj = Objective::new(Line, data, &s).unwrap();
        assert_eq!(obj.evaluate(s.values()).unwrap(), vec![1.0, 3.0]);
        assert_relative_eq!(obj.evaluate_frozen(&s).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_objective_missing_parameter() {
        let s = ParameterStore::from_rows(&[ParameterRow::new("Slope", 2.0, "f", -1.0, 1.0, 0.1)])
            .unwrap();
        let data = ObservedData::new(vec![0.0], vec![1.0], vec![1.0]).unwrap();
        assert_eq!(
            Objective::new(Line, data, &s).unwrap_err(),
            Error::UnknownParameter("Offset".into())
        );
    }

    #[test]
    fn test_residuals_zero_for_excluded() {
        let s = store();
        let data = ObservedData::new(vec![0.0, 1.0], vec![0.0, 0.0], vec![2.0, 0.0]).unwrap();
        let obj = Objective::new(Line, data, &s).unwrap();
        assert_eq!(obj.residuals(s.values()).unwrap(), vec![0.5, 0.0]);
        assert_eq!(obj.weighted_points(), 1);
    }
}
