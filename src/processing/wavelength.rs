//! Wavelength table derivation.
//!
//! The spectral axis of every corrected frame maps to physical wavelengths
//! through one of three calibration schemes carried in the camera settings.

use crate::capture::WavelengthSettings;
use thiserror::Error;

/// Wavelength derivation errors.
#[derive(Debug, Clone, Error)]
pub enum WavelengthError {
    #[error("wavelength table must be non-empty")]
    EmptyTable,
    #[error("linear scheme needs at least 2 bands, got {0}")]
    TooFewBands(usize),
}

/// Derives the per-band wavelength table in nanometres.
pub fn derive_wavelengths(settings: &WavelengthSettings) -> Result<Vec<f32>, WavelengthError> {
    let wavelengths = match settings {
        WavelengthSettings::Table { wavelength_nm } => {
            if wavelength_nm.is_empty() {
                return Err(WavelengthError::EmptyTable);
            }
            wavelength_nm.clone()
        }
        WavelengthSettings::Dispersion {
            start_nm,
            dispersion_nm_px,
            offset_px,
            bands,
        } => {
            if *bands == 0 {
                return Err(WavelengthError::EmptyTable);
            }
            (0..*bands)
                .map(|i| start_nm + (*offset_px + i) as f32 * dispersion_nm_px)
                .collect()
        }
        WavelengthSettings::Linear {
            start_nm,
            end_nm,
            bands,
        } => {
            if *bands < 2 {
                return Err(WavelengthError::TooFewBands(*bands));
            }
            let step = (end_nm - start_nm) / (*bands - 1) as f32;
            (0..*bands).map(|i| start_nm + i as f32 * step).collect()
        }
    };

    tracing::info!(
        bands = wavelengths.len(),
        first_nm = wavelengths[0],
        last_nm = wavelengths[wavelengths.len() - 1],
        "Wavelength table derived"
    );
    Ok(wavelengths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_table() {
        let settings = WavelengthSettings::Table {
            wavelength_nm: vec![450.0, 550.0, 650.0],
        };
        assert_eq!(derive_wavelengths(&settings).unwrap(), vec![450.0, 550.0, 650.0]);
    }

    #[test]
    fn test_empty_table_rejected() {
        let settings = WavelengthSettings::Table {
            wavelength_nm: vec![],
        };
        assert!(matches!(
            derive_wavelengths(&settings),
            Err(WavelengthError::EmptyTable)
        ));
    }

    #[test]
    fn test_dispersion_scheme() {
        let settings = WavelengthSettings::Dispersion {
            start_nm: 400.0,
            dispersion_nm_px: 0.5,
            offset_px: 100,
            bands: 3,
        };
        let wl = derive_wavelengths(&settings).unwrap();
        assert_eq!(wl, vec![450.0, 450.5, 451.0]);
    }

    #[test]
    fn test_linear_scheme() {
        let settings = WavelengthSettings::Linear {
            start_nm: 400.0,
            end_nm: 1000.0,
            bands: 4,
        };
        let wl = derive_wavelengths(&settings).unwrap();
        assert_eq!(wl, vec![400.0, 600.0, 800.0, 1000.0]);
    }

    #[test]
    fn test_linear_needs_two_bands() {
        let settings = WavelengthSettings::Linear {
            start_nm: 400.0,
            end_nm: 1000.0,
            bands: 1,
        };
        assert!(matches!(
            derive_wavelengths(&settings),
            Err(WavelengthError::TooFewBands(1))
        ));
    }
}
