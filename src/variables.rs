use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::Nldas2Error;

/// Product prefix for the hourly 0.125° forcing file A.
pub(crate) const PRODUCT: &str = "NLDAS:NLDAS_FORA0125_H.002";

/// Hourly NLDAS2 forcing variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    Prcp,
    Pet,
    Temp,
    WindU,
    WindV,
    Rlds,
    Rsds,
    Humidity,
}

/// Metadata attached to each variable in returned frames and datasets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableAttrs {
    pub nldas_name: String,
    pub long_name: String,
    pub units: String,
}

impl VariableAttrs {
    pub(crate) fn new(nldas_name: &str, long_name: &str, units: &str) -> Self {
        Self {
            nldas_name: nldas_name.to_string(),
            long_name: long_name.to_string(),
            units: units.to_string(),
        }
    }
}

impl Variable {
    const ALL: [Variable; 8] = [
        Variable::Prcp,
        Variable::Pet,
        Variable::Temp,
        Variable::WindU,
        Variable::WindV,
        Variable::Rlds,
        Variable::Rsds,
        Variable::Humidity,
    ];

    pub fn all() -> &'static [Variable] {
        &Self::ALL
    }

    pub fn name(&self) -> &'static str {
        match self {
            Variable::Prcp => "prcp",
            Variable::Pet => "pet",
            Variable::Temp => "temp",
            Variable::WindU => "wind_u",
            Variable::WindV => "wind_v",
            Variable::Rlds => "rlds",
            Variable::Rsds => "rsds",
            Variable::Humidity => "humidity",
        }
    }

    pub fn nldas_name(&self) -> &'static str {
        match self {
            Variable::Prcp => "APCPsfc",
            Variable::Pet => "PEVAPsfc",
            Variable::Temp => "TMP2m",
            Variable::WindU => "UGRD10m",
            Variable::WindV => "VGRD10m",
            Variable::Rlds => "DLWRFsfc",
            Variable::Rsds => "DSWRFsfc",
            Variable::Humidity => "SPFH2m",
        }
    }

    pub fn long_name(&self) -> &'static str {
        match self {
            Variable::Prcp => "Precipitation hourly total",
            Variable::Pet => "Potential evaporation",
            Variable::Temp => "2-m above ground temperature",
            Variable::WindU => "10-m above ground zonal wind",
            Variable::WindV => "10-m above ground meridional wind",
            Variable::Rlds => "Surface DW longwave radiation flux",
            Variable::Rsds => "Surface DW shortwave radiation flux",
            Variable::Humidity => "2-m above ground specific humidity",
        }
    }

    pub fn units(&self) -> &'static str {
        match self {
            Variable::Prcp | Variable::Pet => "mm",
            Variable::Temp => "K",
            Variable::WindU | Variable::WindV => "m/s",
            Variable::Rlds | Variable::Rsds => "W/m^2",
            Variable::Humidity => "kg/kg",
        }
    }

    pub fn attrs(&self) -> VariableAttrs {
        VariableAttrs::new(self.nldas_name(), self.long_name(), self.units())
    }

    /// Identifier used in the `variable` query parameter.
    pub fn service_id(&self) -> String {
        format!("{}:{}", PRODUCT, self.nldas_name())
    }

    pub fn from_nldas_name(name: &str) -> Option<Variable> {
        Self::ALL.iter().copied().find(|v| v.nldas_name() == name)
    }

    /// Resolves an optional list of short names; `None` selects every variable.
    ///
    /// Duplicates are dropped, keeping the first occurrence.
    pub fn resolve<S: AsRef<str>>(names: Option<&[S]>) -> anyhow::Result<Vec<Variable>> {
        let Some(names) = names else {
            return Ok(Self::ALL.to_vec());
        };

        let mut out: Vec<Variable> = Vec::with_capacity(names.len());
        for name in names {
            let v: Variable = name.as_ref().parse()?;
            if !out.contains(&v) {
                out.push(v);
            }
        }
        if out.is_empty() {
            return Err(Nldas2Error::input_value("variables", Self::ALL.iter().map(|v| v.name())).into());
        }
        Ok(out)
    }
}

impl FromStr for Variable {
    type Err = Nldas2Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| Nldas2Error::input_value("variables", Self::ALL.iter().map(|v| v.name())))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
