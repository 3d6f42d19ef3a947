use crate::error::{ColocationError, Result};

/// Known units: (spelling, dimension, scale to base unit, offset to base unit)
const UNIT_TABLE: &[(&str, &str, f64, f64)] = &[
    // mass concentration, base ug m-3
    ("ug m-3", "mass_concentration", 1.0, 0.0),
    ("ug/m3", "mass_concentration", 1.0, 0.0),
    ("ug m**-3", "mass_concentration", 1.0, 0.0),
    ("µg m-3", "mass_concentration", 1.0, 0.0),
    ("ng m-3", "mass_concentration", 1e-3, 0.0),
    ("mg m-3", "mass_concentration", 1e3, 0.0),
    ("g m-3", "mass_concentration", 1e6, 0.0),
    ("kg m-3", "mass_concentration", 1e9, 0.0),
    // extinction / absorption / scattering coefficients, base Mm-1
    ("Mm-1", "inverse_length", 1.0, 0.0),
    ("1/Mm", "inverse_length", 1.0, 0.0),
    ("km-1", "inverse_length", 1e3, 0.0),
    ("1/km", "inverse_length", 1e3, 0.0),
    ("m-1", "inverse_length", 1e6, 0.0),
    ("1/m", "inverse_length", 1e6, 0.0),
    // length, base m
    ("m", "length", 1.0, 0.0),
    ("km", "length", 1e3, 0.0),
    ("cm", "length", 1e-2, 0.0),
    ("mm", "length", 1e-3, 0.0),
    ("um", "length", 1e-6, 0.0),
    ("nm", "length", 1e-9, 0.0),
    // temperature, base K
    ("K", "temperature", 1.0, 0.0),
    ("degC", "temperature", 1.0, 273.15),
    ("C", "temperature", 1.0, 273.15),
    // mole fraction, base mol mol-1
    ("mol mol-1", "mole_fraction", 1.0, 0.0),
    ("ppm", "mole_fraction", 1e-6, 0.0),
    ("ppb", "mole_fraction", 1e-9, 0.0),
    ("nmol mol-1", "mole_fraction", 1e-9, 0.0),
    // dimensionless
    ("1", "dimensionless", 1.0, 0.0),
    ("", "dimensionless", 1.0, 0.0),
    ("-", "dimensionless", 1.0, 0.0),
    ("dimensionless", "dimensionless", 1.0, 0.0),
    ("%", "dimensionless", 1e-2, 0.0),
];

fn lookup(unit: &str) -> Option<(&'static str, f64, f64)> {
    let unit = unit.trim();
    UNIT_TABLE
        .iter()
        .find(|(name, _, _, _)| *name == unit)
        .map(|(_, dim, scale, offset)| (*dim, *scale, *offset))
}

/// Linear conversion `to = from * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitConversion {
    pub scale: f64,
    pub offset: f64,
}

impl UnitConversion {
    pub const IDENTITY: UnitConversion = UnitConversion {
        scale: 1.0,
        offset: 0.0,
    };

    /// Conversion from `from` into `to`; fails if either unit is unknown or
    /// the two measure different quantities
    pub fn between(from: &str, to: &str) -> Result<Self> {
        if from.trim() == to.trim() {
            return Ok(Self::IDENTITY);
        }
        let mismatch = || ColocationError::UnitMismatch {
            from: from.to_string(),
            to: to.to_string(),
        };
        let (dim_from, scale_from, offset_from) = lookup(from).ok_or_else(mismatch)?;
        let (dim_to, scale_to, offset_to) = lookup(to).ok_or_else(mismatch)?;
        if dim_from != dim_to {
            return Err(mismatch());
        }

        Ok(Self {
            scale: scale_from / scale_to,
            offset: (offset_from - offset_to) / scale_to,
        })
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn apply(&self, value: f64) -> f64 {
        value * self.scale + self.offset
    }
}
