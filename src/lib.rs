//! SARdine speckle: adaptive speckle filtering for SAR imagery
//!
//! Frost, Gamma-MAP, IDAN, Lee Sigma and Refined Lee filters (plus Mean,
//! Median and Lee) sharing one tile-based call contract. Every filter is a
//! pure function of its source tile, so whole bands are filtered tile by tile
//! in parallel.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::config::SpeckleFilterParams;
pub use crate::core::{create_filter, SpeckleFilter, SpeckleFilterProcessor, SpeckleFilterType};
pub use crate::io::{BandRegion, MemoryRaster, RasterSource};
pub use crate::types::{BandUnit, Rectangle, SarComplex, SarError, SarImage, SarRealImage, SarResult};

#[cfg(feature = "python")]
mod python {
    use crate::config::SpeckleFilterParams;
    use crate::core::SpeckleFilterProcessor;
    use crate::types::{BandUnit, SarError};
    use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
    use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
    use pyo3::prelude::*;

    fn to_py_err(err: SarError) -> PyErr {
        match err {
            SarError::InvalidParameter(_) | SarError::UnsupportedUnit(_) | SarError::XmlParsing(_) => {
                PyValueError::new_err(err.to_string())
            }
            SarError::Io(_) => PyIOError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }

    /// Filter a 2-D float64 array with the named speckle filter.
    ///
    /// `params_xml` may hold a `<parameters>` block overriding the defaults;
    /// `filter` always wins over the block's `<filter>` element.
    #[pyfunction]
    #[pyo3(signature = (image, filter, unit = "intensity", no_data_value = 0.0, params_xml = None))]
    fn apply_speckle_filter<'py>(
        py: Python<'py>,
        image: PyReadonlyArray2<'py, f64>,
        filter: &str,
        unit: &str,
        no_data_value: f64,
        params_xml: Option<&str>,
    ) -> PyResult<&'py PyArray2<f64>> {
        let mut params = match params_xml {
            Some(xml) => SpeckleFilterParams::from_xml_str(xml).map_err(to_py_err)?,
            None => SpeckleFilterParams::default(),
        };
        params.filter = filter.parse().map_err(to_py_err)?;
        let unit: BandUnit = unit.parse().map_err(to_py_err)?;

        let processor = SpeckleFilterProcessor::new(params).map_err(to_py_err)?;
        let array = image.as_array().to_owned();
        let filtered = py
            .allow_threads(|| processor.filter_array(&array, unit, no_data_value))
            .map_err(to_py_err)?;
        Ok(filtered.into_pyarray(py))
    }

    /// Moment-based equivalent number of looks of a 2-D float64 array
    #[pyfunction]
    #[pyo3(signature = (image, unit = "intensity", no_data_value = 0.0))]
    fn estimate_number_of_looks(image: PyReadonlyArray2<'_, f64>, unit: &str, no_data_value: f64) -> PyResult<f64> {
        let unit: BandUnit = unit.parse().map_err(to_py_err)?;
        let array = image.as_array().to_owned();
        SpeckleFilterProcessor::estimate_number_of_looks(&array, unit, no_data_value).map_err(to_py_err)
    }

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(apply_speckle_filter, m)?)?;
        m.add_function(wrap_pyfunction!(estimate_number_of_looks, m)?)?;
        Ok(())
    }
}
