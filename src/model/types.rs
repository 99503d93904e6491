//! Core trait for parametric response models.

/// A parametric curve evaluated at a set of abscissae.
///
/// The refinement binds [`parameter_names`](ResponseModel::parameter_names)
/// to store entries once; `evaluate` then receives the values in exactly
/// that order.
///
/// # Examples
///
/// ```ignore
/// struct Line;
///
/// impl ResponseModel for Line {
///     fn parameter_names(&self) -> &[&str] {
///         &["Offset", "Slope"]
///     }
///
///     fn evaluate(&self, params: &[f64], xs: &[f64], out: &mut [f64]) {
///         for (y, &x) in out.iter_mut().zip(xs) {
///             *y = params[0] + params[1] * x;
///         }
///     }
/// }
/// ```
pub trait ResponseModel: Send + Sync {
    /// Names of the model parameters, in evaluation order.
    fn parameter_names(&self) -> &[&str];

    /// Writes the model value at each `xs[i]` into `out[i]`.
    ///
    /// `out` has the same length as `xs`. Implementations may write
    /// non-finite values; callers treat them as degenerate points.
    fn evaluate(&self, params: &[f64], xs: &[f64], out: &mut [f64]);
}

impl<M: ResponseModel + ?Sized> ResponseModel for &M {
    fn parameter_names(&self) -> &[&str] {
        (**self).parameter_names()
    }

    fn evaluate(&self, params: &[f64], xs: &[f64], out: &mut [f64]) {
        (**self).evaluate(params, xs, out)
    }
}
