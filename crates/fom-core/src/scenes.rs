//! Índice tipado de escenas ya procesadas.
//!
//! Reemplaza el diccionario de listas con claves de tipo variable (string o
//! entero) por un mapa `DayKey -> {AcquisitionStamp}` ordenado. Las claves se
//! normalizan una sola vez al construirlas.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneKeyError {
    #[error("invalid day key: {0}")]
    Day(String),
    #[error("invalid acquisition stamp: {0}")]
    Stamp(String),
}

/// Día juliano `YYYYJJJ` (p.ej. `2016269`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn parse(raw: &str) -> Result<Self, SceneKeyError> {
        let s = raw.trim();
        if s.len() != 7 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SceneKeyError::Day(raw.to_string()));
        }
        let year: i32 = s[..4].parse().map_err(|_| SceneKeyError::Day(raw.to_string()))?;
        let ordinal: u32 = s[4..].parse().map_err(|_| SceneKeyError::Day(raw.to_string()))?;
        NaiveDate::from_yo_opt(year, ordinal).map(DayKey)
                                             .ok_or_else(|| SceneKeyError::Day(raw.to_string()))
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DayKey {
    fn from(d: NaiveDate) -> Self {
        DayKey(d)
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y%j"))
    }
}

/// Sello de adquisición `dYYYYMMDD_tHHMMSSF` (décimas de segundo al final).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AcquisitionStamp(NaiveDateTime);

impl AcquisitionStamp {
    pub fn parse(raw: &str) -> Result<Self, SceneKeyError> {
        let err = || SceneKeyError::Stamp(raw.to_string());
        let s = raw.trim();
        let (d, t) = s.split_once('_').ok_or_else(err)?;
        let d = d.strip_prefix('d').ok_or_else(err)?;
        let t = t.strip_prefix('t').ok_or_else(err)?;
        if t.len() != 7 || !t.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let date = NaiveDate::parse_from_str(d, "%Y%m%d").map_err(|_| err())?;
        let hms = NaiveTime::parse_from_str(&t[..6], "%H%M%S").map_err(|_| err())?;
        let tenths: u32 = t[6..].parse().map_err(|_| err())?;
        let time = hms + chrono::Duration::milliseconds(i64::from(tenths) * 100);
        Ok(AcquisitionStamp(date.and_time(time)))
    }

    pub fn day(self) -> DayKey {
        DayKey(self.0.date())
    }
}

impl fmt::Display for AcquisitionStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tenths = self.0.and_utc().timestamp_subsec_millis() / 100;
        write!(f, "d{}_t{}{}", self.0.format("%Y%m%d"), self.0.format("%H%M%S"), tenths)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedScenes {
    by_day: BTreeMap<DayKey, BTreeSet<AcquisitionStamp>>,
}

impl ProcessedScenes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Construye el índice desde filas `(year_jday, time_stamp)` tal como
    /// vienen de la tabla `processed_scenes`.
    pub fn from_rows<I, D, T>(rows: I) -> Result<Self, SceneKeyError>
        where I: IntoIterator<Item = (D, T)>,
              D: AsRef<str>,
              T: AsRef<str>
    {
        let mut idx = ProcessedScenes::new();
        for (day, stamp) in rows {
            idx.insert(DayKey::parse(day.as_ref())?, AcquisitionStamp::parse(stamp.as_ref())?);
        }
        Ok(idx)
    }

    pub fn insert(&mut self, day: DayKey, stamp: AcquisitionStamp) {
        self.by_day.entry(day).or_default().insert(stamp);
    }

    pub fn contains(&self, stamp: AcquisitionStamp) -> bool {
        self.by_day.get(&stamp.day()).is_some_and(|s| s.contains(&stamp))
    }

    pub fn days(&self) -> impl Iterator<Item = &DayKey> {
        self.by_day.keys()
    }

    pub fn stamps(&self, day: DayKey) -> impl Iterator<Item = &AcquisitionStamp> {
        self.by_day.get(&day).into_iter().flatten()
    }

    /// Sellos candidatos aún no procesados, ordenados y sin duplicados.
    pub fn pending<I: IntoIterator<Item = AcquisitionStamp>>(&self, candidates: I) -> Vec<AcquisitionStamp> {
        let fresh: BTreeSet<AcquisitionStamp> = candidates.into_iter().filter(|s| !self.contains(*s)).collect();
        fresh.into_iter().collect()
    }
}
