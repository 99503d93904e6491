//! Thermal/epithermal d-spacing to time-of-flight conversion.
//!
//! The instrument response blends an epithermal linear term and a thermal
//! term through a complementary error function crossover:
//!
//! ```text
//! n     = 0.5 * erfc(Width * (Tcross - 1/d))
//! TOF_e = Zero + Dtt1 * d
//! TOF_t = Zerot + Dtt1t * d - Dtt2t / d
//! TOF   = n * TOF_e + (1 - n) * TOF_t
//! ```

use super::types::ResponseModel;
use statrs::function::erf::erfc;

const NAMES: [&str; 7] = ["Dtt1", "Dtt1t", "Dtt2t", "Zero", "Zerot", "Width", "Tcross"];

/// Back-to-back thermal neutron d → TOF model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThermalNeutronDtoTof;

impl ThermalNeutronDtoTof {
    pub fn new() -> Self {
        Self
    }

    /// Time of flight for a single d-spacing.
    #[allow(clippy::too_many_arguments)]
    pub fn tof(
        d: f64,
        dtt1: f64,
        dtt1t: f64,
        dtt2t: f64,
        zero: f64,
        zerot: f64,
        width: f64,
        tcross: f64,
    ) -> f64 {
        let n = 0.5 * erfc(width * (tcross - 1.0 / d));
        let th_e = zero + dtt1 * d;
        let th_t = zerot + dtt1t * d - dtt2t / d;
        n * th_e + (1.0 - n) * th_t
    }
}

impl ResponseModel for ThermalNeutronDtoTof {
    fn parameter_names(&self) -> &[&str] {
        &NAMES
    }

    fn evaluate(&self, params: &[f64], xs: &[f64], out: &mut [f64]) {
        let [dtt1, dtt1t, dtt2t, zero, zerot, width, tcross] = [
            params[0], params[1], params[2], params[3], params[4], params[5], params[6],
        ];
        for (tof, &d) in out.iter_mut().zip(xs) {
            *tof = Self::tof(d, dtt1, dtt1t, dtt2t, zero, zerot, width, tcross);
        }
    }
}
