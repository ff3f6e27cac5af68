//! Fixed unit conversion table.
//!
//! Every unit belongs to one [`Dimension`] and is described by an affine map onto that
//! dimension's base unit (`base = value * scale + offset`). Conversion goes through the base.
//!
//! Angles are converted by pure linear scaling: values are never normalized into a range, so
//! `-90 deg` becomes `-π/2 rad` and `450 deg` becomes `2.5π rad`.

use std::f64::consts::TAU;

use thiserror::Error;

/// Physical dimension of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Length,
    PerLength,
    Angle,
    Temperature,
    Time,
    Energy,
    Count,
    Dimensionless,
}

#[derive(Debug, Clone, Copy)]
struct UnitDef {
    symbol: &'static str,
    dimension: Dimension,
    scale: f64,
    offset: f64,
}

const fn linear(symbol: &'static str, dimension: Dimension, scale: f64) -> UnitDef {
    UnitDef {
        symbol,
        dimension,
        scale,
        offset: 0.0,
    }
}

// Base units: m, 1/m, turn, K, s, eV, counts, 1.
const TABLE: &[UnitDef] = &[
    linear("m", Dimension::Length, 1.0),
    linear("cm", Dimension::Length, 1e-2),
    linear("mm", Dimension::Length, 1e-3),
    linear("um", Dimension::Length, 1e-6),
    linear("µm", Dimension::Length, 1e-6),
    linear("nm", Dimension::Length, 1e-9),
    linear("angstrom", Dimension::Length, 1e-10),
    linear("Å", Dimension::Length, 1e-10),
    linear("1/m", Dimension::PerLength, 1.0),
    linear("1/cm", Dimension::PerLength, 1e2),
    linear("1/mm", Dimension::PerLength, 1e3),
    linear("1/nm", Dimension::PerLength, 1e9),
    linear("1/angstrom", Dimension::PerLength, 1e10),
    linear("1/Å", Dimension::PerLength, 1e10),
    linear("turn", Dimension::Angle, 1.0),
    linear("deg", Dimension::Angle, 1.0 / 360.0),
    linear("rad", Dimension::Angle, 1.0 / TAU),
    linear("mrad", Dimension::Angle, 1e-3 / TAU),
    linear("K", Dimension::Temperature, 1.0),
    UnitDef {
        symbol: "C",
        dimension: Dimension::Temperature,
        scale: 1.0,
        offset: 273.15,
    },
    linear("s", Dimension::Time, 1.0),
    linear("ms", Dimension::Time, 1e-3),
    linear("us", Dimension::Time, 1e-6),
    linear("min", Dimension::Time, 60.0),
    linear("h", Dimension::Time, 3600.0),
    linear("eV", Dimension::Energy, 1.0),
    linear("keV", Dimension::Energy, 1e3),
    linear("counts", Dimension::Count, 1.0),
    linear("pixel", Dimension::Count, 1.0),
    linear("1", Dimension::Dimensionless, 1.0),
];

fn lookup(symbol: &str) -> Option<&'static UnitDef> {
    TABLE.iter().find(|u| u.symbol == symbol)
}

/// Unit conversion failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnitError {
    #[error("unknown unit '{0}'")]
    Unknown(String),
    #[error("cannot convert '{from}' to '{to}'")]
    Incompatible { from: String, to: String },
}

/// Dimension of a known unit.
pub fn dimension_of(symbol: &str) -> Option<Dimension> {
    lookup(symbol).map(|u| u.dimension)
}

/// Convert `value` from unit `from` to unit `to`.
pub fn convert(value: f64, from: &str, to: &str) -> Result<f64, UnitError> {
    let src = lookup(from).ok_or_else(|| UnitError::Unknown(from.to_string()))?;
    let dst = lookup(to).ok_or_else(|| UnitError::Unknown(to.to_string()))?;
    if src.dimension != dst.dimension {
        return Err(UnitError::Incompatible {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    if src.symbol == dst.symbol {
        return Ok(value);
    }
    let base = value * src.scale + src.offset;
    Ok((base - dst.offset) / dst.scale)
}
