//! Pseudo-Voigt line shape.
//!
//! Both the Gaussian and the Lorentzian part are height-normalised: each is 1
//! at the center and 1/2 at `center ± fwhm / 2`, so `amplitude` is the peak
//! height regardless of the mix.

use std::f64::consts::LN_2;

/// Parameters per component in the flat solver encoding.
pub const PARAMS_PER_PEAK: usize = 4;

/// σ of a Gaussian with the given FWHM.
pub fn fwhm_to_sigma(fwhm: f64) -> f64 {
    fwhm / (2.0 * (2.0 * LN_2).sqrt())
}

/// γ (half width) of a Lorentzian with the given FWHM.
pub fn fwhm_to_gamma(fwhm: f64) -> f64 {
    fwhm / 2.0
}

pub fn gaussian(x: f64, center: f64, fwhm: f64) -> f64 {
    let sigma = fwhm_to_sigma(fwhm);
    (-(x - center).powi(2) / (2.0 * sigma * sigma)).exp()
}

pub fn lorentzian(x: f64, center: f64, fwhm: f64) -> f64 {
    let u = (x - center) / fwhm_to_gamma(fwhm);
    1.0 / (1.0 + u * u)
}

/// `amplitude * ((1 - mix) * G + mix * L)`; `mix` 0 is pure Gaussian, 1 pure
/// Lorentzian.
pub fn pseudo_voigt(x: f64, amplitude: f64, center: f64, fwhm: f64, mix: f64) -> f64 {
    amplitude * ((1.0 - mix) * gaussian(x, center, fwhm) + mix * lorentzian(x, center, fwhm))
}

/// One pseudo-Voigt component.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoVoigt {
    pub amplitude: f64,
    pub center: f64,
    pub fwhm: f64,
    pub mix: f64,
}

impl PseudoVoigt {
    pub fn eval(&self, x: f64) -> f64 {
        pseudo_voigt(x, self.amplitude, self.center, self.fwhm, self.mix)
    }

    pub fn curve(&self, x: &[f64]) -> Vec<f64> {
        x.iter().map(|&xi| self.eval(xi)).collect()
    }

    /// Decode `[amplitude, center, fwhm, mix]`.
    pub fn from_params(p: &[f64]) -> Self {
        PseudoVoigt {
            amplitude: p[0],
            center: p[1],
            fwhm: p[2],
            mix: p[3],
        }
    }

    pub fn to_params(&self) -> [f64; PARAMS_PER_PEAK] {
        [self.amplitude, self.center, self.fwhm, self.mix]
    }
}

/// Pointwise sum of all components.
pub fn multi_peak(x: &[f64], peaks: &[PseudoVoigt]) -> Vec<f64> {
    x.iter()
        .map(|&xi| peaks.iter().map(|p| p.eval(xi)).sum())
        .collect()
}

/// Components from a flat `[amp, center, fwhm, mix] * N` vector.
pub fn decode_params(params: &[f64]) -> Vec<PseudoVoigt> {
    params
        .chunks_exact(PARAMS_PER_PEAK)
        .map(PseudoVoigt::from_params)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn pure_gaussian_limit() {
        let (c, w) = (284.8, 1.2);
        assert_relative_eq!(pseudo_voigt(c, 3.0, c, w, 0.0), 3.0);
        assert_relative_eq!(pseudo_voigt(c + w / 2.0, 3.0, c, w, 0.0), 1.5, max_relative = 1e-12);
        assert_relative_eq!(pseudo_voigt(c - w / 2.0, 3.0, c, w, 0.0), 1.5, max_relative = 1e-12);

        let sigma = fwhm_to_sigma(w);
        let x = c + 1.0;
        let closed = 3.0 * (-1.0 / (2.0 * sigma * sigma)).exp();
        assert_relative_eq!(pseudo_voigt(x, 3.0, c, w, 0.0), closed, max_relative = 1e-12);
    }

    #[test]
    fn pure_lorentzian_limit() {
        let (c, w) = (531.5, 1.3);
        assert_relative_eq!(pseudo_voigt(c, 2.0, c, w, 1.0), 2.0);
        assert_relative_eq!(pseudo_voigt(c + w / 2.0, 2.0, c, w, 1.0), 1.0, max_relative = 1e-12);

        let x = c + 2.0;
        let gamma = w / 2.0;
        let closed = 2.0 * gamma * gamma / ((x - c).powi(2) + gamma * gamma);
        assert_relative_eq!(pseudo_voigt(x, 2.0, c, w, 1.0), closed, max_relative = 1e-12);
    }

    #[test]
    fn multi_peak_is_the_sum_of_components() {
        let peaks = decode_params(&[1.0, 284.8, 1.0, 0.3, 0.5, 286.3, 1.2, 0.1]);
        assert_eq!(peaks.len(), 2);
        let x = [284.0, 285.5, 287.0];
        let total = multi_peak(&x, &peaks);
        for (i, &xi) in x.iter().enumerate() {
            assert_relative_eq!(total[i], peaks[0].eval(xi) + peaks[1].eval(xi));
        }
        assert_eq!(peaks[1].to_params(), [0.5, 286.3, 1.2, 0.1]);
    }
}
