use crate::core::speckle_filter::SpeckleFilterType;
use crate::types::{SarError, SarResult};
use quick_xml::de::from_str;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Speckle filtering parameters.
///
/// Field names follow the `<parameters>` block of a processing-graph node, so
/// a node's XML can be deserialized directly:
///
/// ```xml
/// <parameters>
///   <filter>Lee Sigma</filter>
///   <numLooksStr>2</numLooksStr>
///   <windowSize>9x9</windowSize>
///   <sigmaStr>0.8</sigmaStr>
/// </parameters>
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeckleFilterParams {
    #[serde(rename = "filter")]
    pub filter: SpeckleFilterType,
    /// Window width for Mean, Median, Frost, Gamma Map and Lee (odd)
    #[serde(rename = "filterSizeX")]
    pub filter_size_x: usize,
    /// Window height for Mean, Median, Frost, Gamma Map and Lee (odd)
    #[serde(rename = "filterSizeY")]
    pub filter_size_y: usize,
    /// Frost damping factor
    #[serde(rename = "dampingFactor")]
    pub damping_factor: f64,
    /// Estimate the ENL per tile instead of using `enl` (Gamma Map, Lee)
    #[serde(rename = "estimateENL")]
    pub estimate_enl: bool,
    #[serde(rename = "enl")]
    pub enl: f64,
    /// Number of looks for Lee Sigma ("1".."4") and IDAN
    #[serde(rename = "numLooksStr")]
    pub num_looks_str: String,
    /// Lee Sigma filter window, "5x5" to "11x11"
    #[serde(rename = "windowSize")]
    pub window_size: String,
    /// Lee Sigma point-target window, "3x3" or "5x5"
    #[serde(rename = "targetWindowSizeStr")]
    pub target_window_size_str: String,
    /// Lee Sigma confidence level, "0.5" to "0.9"
    #[serde(rename = "sigmaStr")]
    pub sigma_str: String,
    /// IDAN adaptive neighborhood size
    #[serde(rename = "anSize")]
    pub an_size: usize,
    /// Edge length of the square tiles processed in parallel
    #[serde(rename = "tileSize")]
    pub tile_size: usize,
}

impl Default for SpeckleFilterParams {
    fn default() -> Self {
        Self {
            filter: SpeckleFilterType::RefinedLee,
            filter_size_x: 3,
            filter_size_y: 3,
            damping_factor: 2.0,
            estimate_enl: false,
            enl: 1.0,
            num_looks_str: "1".to_string(),
            window_size: "7x7".to_string(),
            target_window_size_str: "3x3".to_string(),
            sigma_str: "0.9".to_string(),
            an_size: 50,
            tile_size: 512,
        }
    }
}

impl SpeckleFilterParams {
    /// Parameters with a given filter and defaults for everything else
    pub fn for_filter(filter: SpeckleFilterType) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn from_xml_str(xml: &str) -> SarResult<Self> {
        from_str::<SpeckleFilterParams>(xml)
            .map_err(|e| SarError::XmlParsing(format!("Failed to parse speckle filter parameters: {}", e)))
    }

    pub fn from_xml_file<P: AsRef<Path>>(path: P) -> SarResult<Self> {
        let path = path.as_ref();
        log::info!("Loading speckle filter parameters from {}", path.display());
        let xml = std::fs::read_to_string(path)?;
        Self::from_xml_str(&xml)
    }

    /// Lee Sigma filter window edge, parsed from `window_size`
    pub fn window_size(&self) -> SarResult<usize> {
        parse_window_size(&self.window_size)
    }

    /// Lee Sigma target window edge, parsed from `target_window_size_str`
    pub fn target_window_size(&self) -> SarResult<usize> {
        parse_window_size(&self.target_window_size_str)
    }
}

/// Parse a square window size string such as `"7x7"`
pub fn parse_window_size(s: &str) -> SarResult<usize> {
    let re = regex::Regex::new(r"^\s*(\d+)\s*[xX]\s*(\d+)\s*$")
        .map_err(|e| SarError::Processing(format!("Invalid window size pattern: {}", e)))?;

    let captures = re
        .captures(s)
        .ok_or_else(|| SarError::InvalidParameter(format!("Unknown window size: {}", s)))?;

    let width: usize = captures[1]
        .parse()
        .map_err(|_| SarError::InvalidParameter(format!("Unknown window size: {}", s)))?;
    let height: usize = captures[2]
        .parse()
        .map_err(|_| SarError::InvalidParameter(format!("Unknown window size: {}", s)))?;

    if width != height {
        return Err(SarError::InvalidParameter(format!(
            "Window size must be square, got {}",
            s
        )));
    }
    Ok(width)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_window_size() {
        assert_eq!(parse_window_size("7x7").unwrap(), 7);
        assert_eq!(parse_window_size(" 11X11 ").unwrap(), 11);
        assert!(parse_window_size("7x5").is_err());
        assert!(parse_window_size("seven").is_err());
    }

    #[test]
    fn test_defaults() {
        let params = SpeckleFilterParams::default();
        assert_eq!(params.filter, SpeckleFilterType::RefinedLee);
        assert_eq!(params.window_size().unwrap(), 7);
        assert_eq!(params.target_window_size().unwrap(), 3);
        assert_eq!(params.an_size, 50);
    }

    #[test]
    fn test_partial_xml_keeps_defaults() {
        let xml = r#"
            <parameters>
                <filter>Lee Sigma</filter>
                <numLooksStr>2</numLooksStr>
                <windowSize>9x9</windowSize>
                <sigmaStr>0.8</sigmaStr>
            </parameters>
        "#;
        let result = SpeckleFilterParams::from_xml_str(xml);
        assert!(result.is_ok(), "{:?}", result.err());
        let params = result.unwrap();
        assert_eq!(params.filter, SpeckleFilterType::LeeSigma);
        assert_eq!(params.num_looks_str, "2");
        assert_eq!(params.window_size().unwrap(), 9);
        assert_eq!(params.sigma_str, "0.8");
        assert_eq!(params.filter_size_x, 3);
        assert_eq!(params.tile_size, 512);
    }

    #[test]
    fn test_xml_numeric_and_boolean_fields() {
        let xml = r#"
            <parameters>
                <filter>Gamma Map</filter>
                <filterSizeX>5</filterSizeX>
                <filterSizeY>7</filterSizeY>
                <estimateENL>true</estimateENL>
                <enl>3.5</enl>
            </parameters>
        "#;
        let params = SpeckleFilterParams::from_xml_str(xml).unwrap();
        assert_eq!(params.filter, SpeckleFilterType::GammaMap);
        assert_eq!((params.filter_size_x, params.filter_size_y), (5, 7));
        assert!(params.estimate_enl);
        assert_eq!(params.enl, 3.5);
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let xml = "<parameters><filter>Wiener</filter></parameters>";
        assert!(matches!(
            SpeckleFilterParams::from_xml_str(xml),
            Err(SarError::XmlParsing(_))
        ));
    }
}
