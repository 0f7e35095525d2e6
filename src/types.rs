use ndarray::Array2;
use num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Complex-valued SAR sample (I + jQ)
pub type SarComplex = Complex<f64>;

/// 2D real-valued raster buffer (rows x columns)
pub type SarRealImage = Array2<f64>;

/// 2D complex raster buffer (rows x columns)
pub type SarImage = Array2<SarComplex>;

/// Rectangular pixel region in raster coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rectangle {
    pub fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge
    pub fn max_x(&self) -> usize {
        self.x + self.width
    }

    /// Exclusive bottom edge
    pub fn max_y(&self) -> usize {
        self.y + self.height
    }

    pub fn area(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether the (possibly negative) pixel coordinate falls inside the rectangle
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x as i64 && y >= self.y as i64 && x < self.max_x() as i64 && y < self.max_y() as i64
    }

    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.max_x() <= self.max_x()
            && other.max_y() <= self.max_y()
    }

    /// Clip to `[0, width) x [0, height)`
    pub fn clamp_to(&self, width: usize, height: usize) -> Rectangle {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Rectangle {
            x,
            y,
            width: self.max_x().min(width) - x,
            height: self.max_y().min(height) - y,
        }
    }
}

impl std::fmt::Display for Rectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[x={}, y={}, w={}, h={}]", self.x, self.y, self.width, self.height)
    }
}

/// Physical meaning of a band's sample values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BandUnit {
    Amplitude,
    Intensity,
    /// In-phase component of a complex pair
    Real,
    /// Quadrature component of a complex pair
    Imaginary,
    /// Intensity in decibels
    IntensityDb,
    Phase,
    Unknown,
}

impl BandUnit {
    pub fn is_complex(&self) -> bool {
        matches!(self, BandUnit::Real | BandUnit::Imaginary)
    }

    /// Whether the speckle filters know how to interpret samples of this unit
    pub fn is_supported(&self) -> bool {
        !matches!(self, BandUnit::Phase | BandUnit::Unknown)
    }

    /// Map an intensity-domain result back into this unit.
    ///
    /// Complex pairs are filtered as intensity and stay intensity.
    pub fn encode_intensity(&self, intensity: f64) -> f64 {
        match self {
            BandUnit::Amplitude => intensity.sqrt(),
            BandUnit::IntensityDb => linear_to_db(intensity),
            _ => intensity,
        }
    }
}

impl std::fmt::Display for BandUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BandUnit::Amplitude => "amplitude",
            BandUnit::Intensity => "intensity",
            BandUnit::Real => "real",
            BandUnit::Imaginary => "imaginary",
            BandUnit::IntensityDb => "intensity_db",
            BandUnit::Phase => "phase",
            BandUnit::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for BandUnit {
    type Err = SarError;

    /// Never fails: unrecognised unit strings map to `Unknown`, which the
    /// filters reject later when they see it.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = match s.trim().to_lowercase().as_str() {
            "amplitude" => BandUnit::Amplitude,
            "intensity" => BandUnit::Intensity,
            "real" | "i" => BandUnit::Real,
            "imaginary" | "q" => BandUnit::Imaginary,
            "intensity_db" | "db" => BandUnit::IntensityDb,
            "phase" | "radians" => BandUnit::Phase,
            _ => BandUnit::Unknown,
        };
        Ok(unit)
    }
}

/// `10^(v/10)`
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 10.0)
}

/// `10*log10(v)`
pub fn linear_to_db(linear: f64) -> f64 {
    10.0 * linear.log10()
}

/// Error types for speckle filtering
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported band unit: {0}")]
    UnsupportedUnit(String),

    #[error("Band not found: {0}")]
    BandNotFound(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),
}

/// Result type for speckle filtering operations
pub type SarResult<T> = Result<T, SarError>;
