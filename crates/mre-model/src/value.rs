//! Structured value variants held by data states.
//!
//! Every value that enters a data state is one of the closed set of shapes
//! defined here. Adding a shape means adding a variant, which forces every
//! match over [`StructuredValue`] to be updated.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{ModelError, Result};

/// Structural type tag for a catalogue entry.
///
/// Each tag corresponds to exactly one [`StructuredValue`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralType {
    Scalar,
    Series,
    Table,
    TimeSeries,
    Geometry,
    Matrix,
    Mapping,
}

impl StructuralType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StructuralType::Scalar => "scalar",
            StructuralType::Series => "series",
            StructuralType::Table => "table",
            StructuralType::TimeSeries => "time_series",
            StructuralType::Geometry => "geometry",
            StructuralType::Matrix => "matrix",
            StructuralType::Mapping => "mapping",
        }
    }
}

impl fmt::Display for StructuralType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StructuralType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "scalar" => Ok(StructuralType::Scalar),
            "series" => Ok(StructuralType::Series),
            "table" => Ok(StructuralType::Table),
            "time_series" | "timeseries" => Ok(StructuralType::TimeSeries),
            "geometry" => Ok(StructuralType::Geometry),
            "matrix" => Ok(StructuralType::Matrix),
            "mapping" => Ok(StructuralType::Mapping),
            _ => Err(format!("Unknown structural type: {}", s)),
        }
    }
}

/// A single scalar payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Float(f64),
    Integer(i64),
    Text(String),
    Flag(bool),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Float(_) => "float",
            Scalar::Integer(_) => "integer",
            Scalar::Text(_) => "text",
            Scalar::Flag(_) => "flag",
        }
    }

    /// Numeric view of the scalar, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Float(value) => Some(*value),
            Scalar::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    fn check_finite(&self) -> std::result::Result<(), String> {
        if let Scalar::Float(value) = self
            && !value.is_finite()
        {
            return Err("float scalar must be finite".to_string());
        }
        Ok(())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Float(value) => write!(f, "{value}"),
            Scalar::Integer(value) => write!(f, "{value}"),
            Scalar::Text(value) => write!(f, "{value}"),
            Scalar::Flag(value) => write!(f, "{value}"),
        }
    }
}

/// Ordered sequence of (key, value) points.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub points: Vec<(String, f64)>,
}

impl Series {
    pub fn new(points: Vec<(String, f64)>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.points
            .iter()
            .find(|(point_key, _)| point_key == key)
            .map(|(_, value)| *value)
    }
}

/// Named columns and ordered rows of scalars.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. The row width must match the column count.
    pub fn push_row(&mut self, row: Vec<Scalar>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(ModelError::Shape {
                message: format!(
                    "row width {} does not match {} columns",
                    row.len(),
                    self.columns.len()
                ),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Values of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Scalar>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }
}

/// Ordered (timestamp, value) samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub samples: Vec<(DateTime<Utc>, f64)>,
}

impl TimeSeries {
    pub fn new(samples: Vec<(DateTime<Utc>, f64)>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Geometric payloads with coordinate validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Point { x: f64, y: f64, z: Option<f64> },
    Polygon { vertices: Vec<[f64; 2]> },
}

/// 2-D numeric grid with row and column labels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    pub row_labels: Vec<String>,
    pub column_labels: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl Matrix {
    pub fn new(row_labels: Vec<String>, column_labels: Vec<String>, values: Vec<Vec<f64>>) -> Self {
        Self {
            row_labels,
            column_labels,
            values,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.row_labels.len(), self.column_labels.len())
    }

    pub fn get(&self, row: usize, column: usize) -> Option<f64> {
        self.values.get(row).and_then(|r| r.get(column)).copied()
    }
}

/// A typed value as stored in a data state.
///
/// Serialization is exact: `from_bytes(to_bytes(v))` reproduces `v` for any
/// value accepted by catalogue validation. Equality is structural and exact,
/// which change detection in state diffing relies on; non-finite samples are
/// rejected by validation before they can reach a state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredValue {
    Scalar(Scalar),
    Series(Series),
    Table(Table),
    TimeSeries(TimeSeries),
    Geometry(Geometry),
    Matrix(Matrix),
    Mapping(BTreeMap<String, JsonValue>),
}

impl StructuredValue {
    /// The structural type tag of this value.
    pub fn structural_type(&self) -> StructuralType {
        match self {
            StructuredValue::Scalar(_) => StructuralType::Scalar,
            StructuredValue::Series(_) => StructuralType::Series,
            StructuredValue::Table(_) => StructuralType::Table,
            StructuredValue::TimeSeries(_) => StructuralType::TimeSeries,
            StructuredValue::Geometry(_) => StructuralType::Geometry,
            StructuredValue::Matrix(_) => StructuralType::Matrix,
            StructuredValue::Mapping(_) => StructuralType::Mapping,
        }
    }

    /// Check internal consistency of the payload, independent of any
    /// catalogue entry. Returns a diagnostic message on failure.
    pub fn verify(&self) -> std::result::Result<(), String> {
        match self {
            StructuredValue::Scalar(scalar) => scalar.check_finite(),
            StructuredValue::Series(series) => {
                for (key, value) in &series.points {
                    if !value.is_finite() {
                        return Err(format!("series value for '{key}' must be finite"));
                    }
                }
                Ok(())
            }
            StructuredValue::Table(table) => {
                for (index, row) in table.rows().iter().enumerate() {
                    if row.len() != table.width() {
                        return Err(format!(
                            "row {} has width {}, expected {}",
                            index,
                            row.len(),
                            table.width()
                        ));
                    }
                    for scalar in row {
                        scalar.check_finite()?;
                    }
                }
                Ok(())
            }
            StructuredValue::TimeSeries(series) => {
                let mut previous: Option<DateTime<Utc>> = None;
                for (stamp, value) in &series.samples {
                    if !value.is_finite() {
                        return Err(format!("sample at {stamp} must be finite"));
                    }
                    if let Some(previous) = previous
                        && *stamp < previous
                    {
                        return Err(format!(
                            "timestamps must be non-decreasing ({stamp} follows {previous})"
                        ));
                    }
                    previous = Some(*stamp);
                }
                Ok(())
            }
            StructuredValue::Geometry(geometry) => verify_geometry(geometry),
            StructuredValue::Matrix(matrix) => {
                let (rows, columns) = matrix.shape();
                if matrix.values.len() != rows {
                    return Err(format!(
                        "matrix has {} value rows, expected {} row labels",
                        matrix.values.len(),
                        rows
                    ));
                }
                for (index, row) in matrix.values.iter().enumerate() {
                    if row.len() != columns {
                        return Err(format!(
                            "matrix row {} has width {}, expected {}",
                            index,
                            row.len(),
                            columns
                        ));
                    }
                    if row.iter().any(|value| !value.is_finite()) {
                        return Err(format!("matrix row {index} contains a non-finite value"));
                    }
                }
                Ok(())
            }
            StructuredValue::Mapping(_) => Ok(()),
        }
    }

    /// Exact byte serialization of the value.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ModelError::Encode {
            message: e.to_string(),
        })
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| ModelError::Decode {
            message: e.to_string(),
        })
    }

    /// One-line description for display surfaces.
    pub fn summary(&self) -> String {
        match self {
            StructuredValue::Scalar(scalar) => format!("scalar ({})", scalar.type_name()),
            StructuredValue::Series(series) => format!("series, {} points", series.len()),
            StructuredValue::Table(table) => {
                format!("table, {} rows x {} columns", table.height(), table.width())
            }
            StructuredValue::TimeSeries(series) => {
                format!("time series, {} samples", series.len())
            }
            StructuredValue::Geometry(Geometry::Point { .. }) => "point".to_string(),
            StructuredValue::Geometry(Geometry::Polygon { vertices }) => {
                format!("polygon, {} vertices", vertices.len())
            }
            StructuredValue::Matrix(matrix) => {
                let (rows, columns) = matrix.shape();
                format!("matrix, {rows} x {columns}")
            }
            StructuredValue::Mapping(mapping) => format!("mapping, {} keys", mapping.len()),
        }
    }
}

fn verify_geometry(geometry: &Geometry) -> std::result::Result<(), String> {
    match geometry {
        Geometry::Point { x, y, z } => {
            if !x.is_finite() || !y.is_finite() {
                return Err("point coordinates must be finite".to_string());
            }
            if let Some(z) = z
                && !z.is_finite()
            {
                return Err("point elevation must be finite".to_string());
            }
            Ok(())
        }
        Geometry::Polygon { vertices } => {
            if vertices.len() < 3 {
                return Err(format!(
                    "polygon needs at least 3 vertices, found {}",
                    vertices.len()
                ));
            }
            for vertex in vertices {
                if vertex.iter().any(|coordinate| !coordinate.is_finite()) {
                    return Err("polygon coordinates must be finite".to_string());
                }
            }
            Ok(())
        }
    }
}
