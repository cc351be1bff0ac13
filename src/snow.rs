use crate::error::Nldas2Error;

pub const KELVIN_OFFSET: f64 = 273.15;

/// Default rain/snow thresholds in °C.
pub const T_RAIN: f64 = 2.5;
pub const T_SNOW: f64 = 0.6;

pub fn kelvin_to_celsius(k: f64) -> f64 {
    k - KELVIN_OFFSET
}

/// Temperature thresholds for partitioning precipitation into snow.
///
/// Above `t_rain` all precipitation is rain, below `t_snow` all of it is snow,
/// and in between the snow fraction falls linearly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnowParams {
    /// °C
    pub t_rain: f64,
    /// °C
    pub t_snow: f64,
}

impl Default for SnowParams {
    fn default() -> Self {
        Self {
            t_rain: T_RAIN,
            t_snow: T_SNOW,
        }
    }
}

impl SnowParams {
    pub fn new(t_rain: f64, t_snow: f64) -> Result<Self, Nldas2Error> {
        let p = Self { t_rain, t_snow };
        p.validate()?;
        Ok(p)
    }

    pub(crate) fn validate(&self) -> Result<(), Nldas2Error> {
        if !self.t_rain.is_finite() || !self.t_snow.is_finite() || self.t_rain <= self.t_snow {
            return Err(Nldas2Error::input_value(
                "snow_params",
                ["t_rain and t_snow in degC with t_rain > t_snow"],
            ));
        }
        Ok(())
    }

    /// Snow for one sample; `temp_c` in °C, result in the units of `prcp`.
    pub fn snow(&self, prcp: f64, temp_c: f64) -> f64 {
        if prcp.is_nan() || temp_c.is_nan() {
            f64::NAN
        } else if temp_c > self.t_rain {
            0.0
        } else if temp_c < self.t_snow {
            prcp
        } else {
            prcp * (self.t_rain - temp_c) / (self.t_rain - self.t_snow)
        }
    }

    /// Element-wise snow for aligned precipitation and Kelvin temperature.
    pub(crate) fn snow_from_kelvin(&self, prcp: &[f64], temp_k: &[f64]) -> Vec<f64> {
        prcp.iter()
            .zip(temp_k)
            .map(|(&p, &t)| self.snow(p, kelvin_to_celsius(t)))
            .collect()
    }
}
