//! Figura de mérito intersección sobre unión.

use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::RunConfig;
use crate::engine::{SpatialEngine, TableRef};
use crate::errors::EngineError;
use crate::mask::PixelCounts;
use crate::pipeline::MaskPipeline;

/// Resultado del FOM. `Undefined` es un valor distinguido (unión vacía: ni
/// detección ni verdad de campo), nunca se convierte en 0 ni en 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Fom {
    Defined(f64),
    Undefined,
}

impl Fom {
    pub fn from_counts(counts: PixelCounts) -> Result<Self, EngineError> {
        if counts.intersection > counts.union {
            return Err(EngineError::Malformed(format!("intersection {} > union {}", counts.intersection, counts.union)));
        }
        if counts.union == 0 {
            return Ok(Fom::Undefined);
        }
        Ok(Fom::Defined(counts.intersection as f64 / counts.union as f64))
    }

    pub fn value(self) -> Option<f64> {
        match self {
            Fom::Defined(v) => Some(v),
            Fom::Undefined => None,
        }
    }

    pub fn is_defined(self) -> bool {
        matches!(self, Fom::Defined(_))
    }
}

impl fmt::Display for Fom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fom::Defined(v) => write!(f, "{v}"),
            Fom::Undefined => f.write_str("undefined"),
        }
    }
}

/// Reduce el raster `mask_sum` de la corrida a su FOM. Supone que el pipeline
/// ya lo produjo.
pub fn compute_fom<E: SpatialEngine + ?Sized>(engine: &E, config: &RunConfig) -> Result<Fom, EngineError> {
    let counts = engine.pixel_counts(&config.db, &config.schema)?;
    let fom = Fom::from_counts(counts)?;
    debug!("compute_fom: run_id={} intersection={} union={} fom={fom}",
           config.run_id,
           counts.intersection,
           counts.union);
    Ok(fom)
}

/// Proceso completo de una corrida: pipeline de máscaras y luego FOM.
pub fn evaluate_run<E: SpatialEngine + ?Sized>(engine: &E, config: &RunConfig, ground_truth: &TableRef) -> Result<Fom, EngineError> {
    MaskPipeline::new(engine).run(config, ground_truth)?;
    compute_fom(engine, config).map_err(|e| e.in_step("compute_fom"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(intersection: u64, union: u64) -> PixelCounts {
        PixelCounts { intersection, union }
    }

    #[test]
    fn ratio_of_intersection_over_union() {
        assert_eq!(Fom::from_counts(counts(1, 3)).unwrap(), Fom::Defined(1.0 / 3.0));
        assert_eq!(Fom::from_counts(counts(4, 4)).unwrap(), Fom::Defined(1.0));
        assert_eq!(Fom::from_counts(counts(0, 7)).unwrap(), Fom::Defined(0.0));
    }

    #[test]
    fn empty_union_is_undefined_not_zero() {
        let fom = Fom::from_counts(counts(0, 0)).unwrap();
        assert_eq!(fom, Fom::Undefined);
        assert_eq!(fom.value(), None);
        assert_eq!(fom.to_string(), "undefined");
    }

    #[test]
    fn impossible_counts_are_rejected() {
        assert!(matches!(Fom::from_counts(counts(5, 2)), Err(EngineError::Malformed(_))));
    }
}
