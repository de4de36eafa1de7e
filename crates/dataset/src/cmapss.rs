use std::path::{Path, PathBuf};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

/// Columns per row: unit, cycle, 3 operational settings, 21 sensors.
pub const COLUMN_COUNT: usize = 26;
/// Rows in a served sequence.
pub const SEQUENCE_LEN: usize = 50;
/// Settings and sensors; unit and cycle are dropped.
pub const FEATURE_COUNT: usize = COLUMN_COUNT - 2;

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("test data file missing: {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("dataset contains no engine units")]
    Empty,
}

/// All cycles recorded for one engine, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: u32,
    pub rows: Vec<[f64; COLUMN_COUNT]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub unit_id: u32,
    pub sequence: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    units: Vec<Unit>,
}

impl Dataset {
    pub async fn load(path: &Path) -> Result<Self, DatasetError> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(DatasetError::Missing(path.to_path_buf()));
            }
            Err(source) => {
                return Err(DatasetError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::parse(&text)
    }

    /// Parse whitespace-separated rows. Units keep first-appearance order.
    pub fn parse(text: &str) -> Result<Self, DatasetError> {
        let mut units: Vec<Unit> = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if line.trim().is_empty() {
                continue;
            }
            let row = parse_row(line, line_no)?;
            let unit_id = unit_id(row[0], line_no)?;
            match units.iter_mut().find(|unit| unit.id == unit_id) {
                Some(unit) => unit.rows.push(row),
                None => units.push(Unit {
                    id: unit_id,
                    rows: vec![row],
                }),
            }
        }
        if units.is_empty() {
            return Err(DatasetError::Empty);
        }
        Ok(Self { units })
    }

    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn unit(&self, id: u32) -> Option<&Unit> {
        self.units.iter().find(|unit| unit.id == id)
    }

    /// Sequence for a random unit.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Sample> {
        self.units.choose(rng).map(Unit::sample)
    }
}

impl Unit {
    /// The last [`SEQUENCE_LEN`] cycles, left-padded with copies of the
    /// first cycle when the engine has fewer.
    pub fn sample(&self) -> Sample {
        let mut sequence = Vec::with_capacity(SEQUENCE_LEN);
        if let Some(first) = self.rows.first() {
            for _ in self.rows.len()..SEQUENCE_LEN {
                sequence.push(features(first));
            }
        }
        let skip = self.rows.len().saturating_sub(SEQUENCE_LEN);
        sequence.extend(self.rows[skip..].iter().map(features));
        Sample {
            unit_id: self.id,
            sequence,
        }
    }
}

fn features(row: &[f64; COLUMN_COUNT]) -> Vec<f64> {
    row[2..].to_vec()
}

fn parse_row(line: &str, line_no: usize) -> Result<[f64; COLUMN_COUNT], DatasetError> {
    let mut row = [0.0; COLUMN_COUNT];
    let mut count = 0;
    for field in line.split_whitespace() {
        if count == COLUMN_COUNT {
            return Err(DatasetError::Parse {
                line: line_no,
                message: format!("expected {} columns, found more", COLUMN_COUNT),
            });
        }
        row[count] = field.parse().map_err(|_| DatasetError::Parse {
            line: line_no,
            message: format!("invalid number {:?} in column {}", field, count + 1),
        })?;
        count += 1;
    }
    if count != COLUMN_COUNT {
        return Err(DatasetError::Parse {
            line: line_no,
            message: format!("expected {} columns, found {}", COLUMN_COUNT, count),
        });
    }
    Ok(row)
}

fn unit_id(value: f64, line_no: usize) -> Result<u32, DatasetError> {
    if value.fract() == 0.0 && value >= 0.0 && value <= u32::MAX as f64 {
        Ok(value as u32)
    } else {
        Err(DatasetError::Parse {
            line: line_no,
            message: format!("invalid unit number {}", value),
        })
    }
}
