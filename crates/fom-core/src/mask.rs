//! Máscaras binarias y raster de comparación.
//!
//! El álgebra raster real vive en el motor espacial; estas estructuras
//! describen el mismo contrato en memoria (lo usa `InMemorySpatialEngine`) y
//! definen `PixelCounts`, la forma del resultado de la reducción del FOM.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Índice de pixel (fila, columna) sobre la grilla de análisis.
pub type Cell = (i64, i64);

/// Extensión rectangular inclusiva en índices de pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub min: Cell,
    pub max: Cell,
}

impl Extent {
    pub fn new(min: Cell, max: Cell) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        cell.0 >= self.min.0 && cell.0 <= self.max.0 && cell.1 >= self.min.1 && cell.1 <= self.max.1
    }

    /// Expande la extensión `margin` pixeles por lado.
    pub fn grow(&self, margin: i64) -> Self {
        Self { min: (self.min.0 - margin, self.min.1 - margin),
               max: (self.max.0 + margin, self.max.1 + margin) }
    }
}

/// Máscara binaria: el conjunto de pixeles con valor 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryMask {
    cells: BTreeSet<Cell>,
}

impl BinaryMask {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cell: Cell) {
        self.cells.insert(cell);
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// OR lógico.
    pub fn union(&self, other: &BinaryMask) -> BinaryMask {
        BinaryMask { cells: self.cells.union(&other.cells).copied().collect() }
    }

    /// Remuestrea a una grilla `factor` veces más fina: cada pixel pasa a
    /// cubrir `factor x factor` pixeles.
    pub fn upsample(&self, factor: i64) -> BinaryMask {
        let mut out = BinaryMask::new();
        for &(r, c) in &self.cells {
            for dr in 0..factor {
                for dc in 0..factor {
                    out.insert((r * factor + dr, c * factor + dc));
                }
            }
        }
        out
    }

    /// Descarta pixeles fuera de `extent`.
    pub fn clip(&self, extent: &Extent) -> BinaryMask {
        BinaryMask { cells: self.cells.iter().copied().filter(|c| extent.contains(*c)).collect() }
    }

    /// Extensión mínima que contiene la máscara (`None` si está vacía).
    pub fn extent(&self) -> Option<Extent> {
        let first = self.cells.iter().next()?;
        let mut ext = Extent::new(*first, *first);
        for &(r, c) in &self.cells {
            ext.min = (ext.min.0.min(r), ext.min.1.min(c));
            ext.max = (ext.max.0.max(r), ext.max.1.max(c));
        }
        Some(ext)
    }
}

impl FromIterator<Cell> for BinaryMask {
    fn from_iter<I: IntoIterator<Item = Cell>>(iter: I) -> Self {
        BinaryMask { cells: iter.into_iter().collect() }
    }
}

/// Raster de comparación con valores {0,1,2}. Sólo se guardan los pixeles
/// distintos de cero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonRaster {
    values: BTreeMap<Cell, u8>,
}

impl ComparisonRaster {
    /// Raster todo-cero (unión vacía).
    pub fn zeros() -> Self {
        Self::default()
    }

    /// Suma pixel a pixel de dos máscaras 0/1.
    pub fn sum(detection: &BinaryMask, truth: &BinaryMask) -> Self {
        let mut values = BTreeMap::new();
        for cell in detection.cells().chain(truth.cells()) {
            *values.entry(*cell).or_insert(0u8) += 1;
        }
        Self { values }
    }

    pub fn value(&self, cell: Cell) -> u8 {
        self.values.get(&cell).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> PixelCounts {
        let intersection = self.values.values().filter(|v| **v == 2).count() as u64;
        let union = self.values.values().filter(|v| **v > 0).count() as u64;
        PixelCounts { intersection, union }
    }
}

/// Resultado de la reducción: pixeles con valor 2 y pixeles con valor > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelCounts {
    pub intersection: u64,
    pub union: u64,
}
