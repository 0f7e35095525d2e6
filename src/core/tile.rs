use crate::io::RasterSource;
use crate::types::{db_to_linear, BandUnit, Rectangle, SarError, SarRealImage, SarResult};

/// Which representation of a pixel a filter works with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleDomain {
    /// Power: `amplitude^2`, `I^2 + Q^2`, or delinearised dB
    Intensity,
    /// The band's own linear scale: amplitude stays amplitude, dB is delinearised
    Native,
}

/// Exact no-data comparison. A NaN sentinel matches NaN samples.
#[inline]
pub fn is_no_data(value: f64, no_data_value: f64) -> bool {
    value == no_data_value || (no_data_value.is_nan() && value.is_nan())
}

/// Source pixels backing one output tile: the tile plus its half-window margin,
/// clamped to the raster bounds.
#[derive(Debug, Clone)]
pub struct SourceTile {
    rect: Rectangle,
    band1: SarRealImage,
    band2: Option<SarRealImage>,
    no_data_value: f64,
    unit: BandUnit,
}

impl SourceTile {
    /// Wrap a single detected band (amplitude, intensity or dB)
    pub fn new(rect: Rectangle, data: SarRealImage, unit: BandUnit, no_data_value: f64) -> SarResult<Self> {
        check_shape(&rect, &data)?;
        if unit.is_complex() {
            return Err(SarError::UnsupportedUnit(format!(
                "{} band supplied without its complex counterpart",
                unit
            )));
        }
        Ok(Self {
            rect,
            band1: data,
            band2: None,
            no_data_value,
            unit,
        })
    }

    /// Wrap an I/Q pair
    pub fn complex(
        rect: Rectangle,
        real: SarRealImage,
        imaginary: SarRealImage,
        no_data_value: f64,
    ) -> SarResult<Self> {
        check_shape(&rect, &real)?;
        check_shape(&rect, &imaginary)?;
        Ok(Self {
            rect,
            band1: real,
            band2: Some(imaginary),
            no_data_value,
            unit: BandUnit::Real,
        })
    }

    /// Fetch `region` for one band, or for a real/imaginary pair, from the raster source
    pub fn fetch<S: RasterSource + ?Sized>(
        source: &S,
        band_names: &[&str],
        region: &Rectangle,
    ) -> SarResult<Self> {
        match band_names {
            [name] => {
                let band = source.fetch_region(name, region)?;
                Self::new(band.rect, band.data, band.unit, band.no_data_value)
            }
            [name_i, name_q] => {
                let band_i = source.fetch_region(name_i, region)?;
                let band_q = source.fetch_region(name_q, region)?;
                if !(band_i.unit.is_complex() && band_q.unit.is_complex()) {
                    return Err(SarError::UnsupportedUnit(format!(
                        "expected a real/imaginary pair, got {} and {}",
                        band_i.unit, band_q.unit
                    )));
                }
                if band_i.rect != band_q.rect {
                    return Err(SarError::Processing(format!(
                        "Complex bands returned different regions {} and {}",
                        band_i.rect, band_q.rect
                    )));
                }
                Self::complex(band_i.rect, band_i.data, band_q.data, band_i.no_data_value)
            }
            _ => Err(SarError::InvalidParameter(format!(
                "expected 1 or 2 source bands, got {}",
                band_names.len()
            ))),
        }
    }

    pub fn rect(&self) -> &Rectangle {
        &self.rect
    }

    pub fn unit(&self) -> BandUnit {
        self.unit
    }

    pub fn no_data_value(&self) -> f64 {
        self.no_data_value
    }

    pub fn is_complex(&self) -> bool {
        self.band2.is_some()
    }

    /// Reject units no filter can interpret
    pub fn ensure_supported(&self, filter_name: &str) -> SarResult<()> {
        if self.unit.is_supported() {
            Ok(())
        } else {
            Err(SarError::UnsupportedUnit(format!("{} cannot filter {} bands", filter_name, self.unit)))
        }
    }

    /// Map an intensity-domain result back to the band unit (sqrt for amplitude, dB relinearised)
    pub fn encode(&self, intensity: f64) -> f64 {
        if is_no_data(intensity, self.no_data_value) || self.is_complex() {
            intensity
        } else {
            self.unit.encode_intensity(intensity)
        }
    }

    /// Map a native-domain result back to the band unit (only dB needs relinearising)
    pub fn encode_native(&self, value: f64) -> f64 {
        if !is_no_data(value, self.no_data_value) && self.unit == BandUnit::IntensityDb {
            self.unit.encode_intensity(value)
        } else {
            value
        }
    }

    /// Sample in the requested domain, or the no-data value when the pixel is
    /// outside the tile or flagged invalid
    pub fn sample(&self, x: i64, y: i64, domain: SampleDomain) -> f64 {
        if !self.rect.contains(x, y) {
            return self.no_data_value;
        }
        let r = y as usize - self.rect.y;
        let c = x as usize - self.rect.x;

        let v = self.band1[[r, c]];
        if is_no_data(v, self.no_data_value) {
            return self.no_data_value;
        }

        if let Some(band2) = &self.band2 {
            let q = band2[[r, c]];
            if is_no_data(q, self.no_data_value) {
                return self.no_data_value;
            }
            return num_complex::Complex::new(v, q).norm_sqr();
        }

        match (self.unit, domain) {
            (BandUnit::Amplitude, SampleDomain::Intensity) => v * v,
            (BandUnit::IntensityDb, _) => db_to_linear(v),
            _ => v,
        }
    }

    #[inline]
    pub fn intensity(&self, x: i64, y: i64) -> f64 {
        self.sample(x, y, SampleDomain::Intensity)
    }

    #[inline]
    pub fn native(&self, x: i64, y: i64) -> f64 {
        self.sample(x, y, SampleDomain::Native)
    }
}

fn check_shape(rect: &Rectangle, data: &SarRealImage) -> SarResult<()> {
    if data.dim() != (rect.height, rect.width) {
        return Err(SarError::Processing(format!(
            "Buffer of shape {:?} does not match region {}",
            data.dim(),
            rect
        )));
    }
    Ok(())
}
