//! # NMEA 0183 Sentence Decoder
//!
//! Decodes the position-bearing sentences emitted by serial GPS receivers.
//!
//! Frame structure: `$` + talker (2) + type (3) + `,` fields + `*` + checksum (2 hex) + CRLF
//!
//! **Checksum**: XOR of every byte between `$` and `*`
//!
//! Supported sentence types (any talker: `GP`, `GN`, `GL`, `GA`, `BD`):
//! - `GGA`: fix data, valid when the quality field is non-zero
//! - `RMC`: recommended minimum, valid when the status field is `A`
//!
//! Coordinates are `ddmm.mmmm` / `dddmm.mmmm` with a hemisphere letter.

use thiserror::Error;

/// Errors produced while decoding a sentence
#[derive(Debug, Clone, Error, PartialEq)]
pub enum NmeaError {
    /// Line does not look like an NMEA sentence
    #[error("Malformed sentence: {0}")]
    Malformed(String),

    /// Checksum does not match the sentence body
    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },

    /// Well-formed sentence that carries no position
    #[error("Unsupported sentence type: {0}")]
    Unsupported(String),
}

/// Position carried by a GGA or RMC sentence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmeaFix {
    /// Decimal degrees, `None` when the receiver left the field empty
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Receiver reports the fix as usable
    pub valid: bool,
}

impl NmeaFix {
    /// Coordinates of a usable fix.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.valid, self.latitude, self.longitude) {
            (true, Some(lat), Some(lng)) => Some((lat, lng)),
            _ => None,
        }
    }
}

/// Calculate the NMEA checksum (XOR of all bytes)
///
/// # Examples
///
/// ```
/// use crashtrack::position::nmea::nmea_checksum;
///
/// assert_eq!(nmea_checksum(b""), 0);
/// assert_eq!(nmea_checksum(b"AB"), b'A' ^ b'B');
/// ```
pub fn nmea_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &byte| acc ^ byte)
}

/// Decode a single sentence into a fix
///
/// # Errors
///
/// Returns error if:
/// - The line does not start with `$` or lacks a `*HH` checksum
/// - The checksum does not match
/// - The sentence is neither GGA nor RMC, or is truncated
pub fn parse_sentence(line: &str) -> Result<NmeaFix, NmeaError> {
    let line = line.trim_end_matches(['\r', '\n']);

    let body_and_sum = line
        .strip_prefix('$')
        .ok_or_else(|| NmeaError::Malformed("missing '$'".to_string()))?;

    let (body, sum) = body_and_sum
        .rsplit_once('*')
        .ok_or_else(|| NmeaError::Malformed("missing checksum".to_string()))?;

    let actual = u8::from_str_radix(sum, 16)
        .map_err(|_| NmeaError::Malformed(format!("bad checksum field '{}'", sum)))?;
    let expected = nmea_checksum(body.as_bytes());
    if expected != actual {
        return Err(NmeaError::Checksum { expected, actual });
    }

    let fields: Vec<&str> = body.split(',').collect();
    let address = fields[0];
    if address.len() != 5 || !address.is_ascii() {
        return Err(NmeaError::Malformed(format!("bad address '{}'", address)));
    }

    match &address[2..] {
        "GGA" => parse_gga(&fields),
        "RMC" => parse_rmc(&fields),
        other => Err(NmeaError::Unsupported(other.to_string())),
    }
}

/// `GGA,time,lat,N,lng,E,quality,...`
fn parse_gga(fields: &[&str]) -> Result<NmeaFix, NmeaError> {
    if fields.len() < 7 {
        return Err(NmeaError::Malformed(format!("GGA has {} fields", fields.len())));
    }

    let quality: u8 = fields[6].parse().unwrap_or(0);

    Ok(NmeaFix {
        latitude: parse_coordinate(fields[2], fields[3])?,
        longitude: parse_coordinate(fields[4], fields[5])?,
        valid: quality > 0,
    })
}

/// `RMC,time,status,lat,N,lng,E,...`
fn parse_rmc(fields: &[&str]) -> Result<NmeaFix, NmeaError> {
    if fields.len() < 7 {
        return Err(NmeaError::Malformed(format!("RMC has {} fields", fields.len())));
    }

    Ok(NmeaFix {
        latitude: parse_coordinate(fields[3], fields[4])?,
        longitude: parse_coordinate(fields[5], fields[6])?,
        valid: fields[2] == "A",
    })
}

/// Largest magnitude allowed for each hemisphere letter.
fn hemisphere_limit(hemisphere: &str) -> Option<f64> {
    match hemisphere {
        "N" | "S" => Some(90.0),
        "E" | "W" => Some(180.0),
        _ => None,
    }
}

/// Convert `ddmm.mmmm` plus hemisphere into signed decimal degrees.
///
/// Empty fields read as `None`. Unparseable, non-finite, negative or
/// out-of-range values are malformed.
fn parse_coordinate(value: &str, hemisphere: &str) -> Result<Option<f64>, NmeaError> {
    if value.is_empty() {
        return Ok(None);
    }

    let malformed =
        || NmeaError::Malformed(format!("bad coordinate '{},{}'", value, hemisphere));

    let limit = hemisphere_limit(hemisphere).ok_or_else(malformed)?;
    let raw: f64 = value.parse().map_err(|_| malformed())?;
    if !raw.is_finite() || raw < 0.0 {
        return Err(malformed());
    }

    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    if minutes >= 60.0 || decimal > limit {
        return Err(malformed());
    }

    match hemisphere {
        "S" | "W" => Ok(Some(-decimal)),
        _ => Ok(Some(decimal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Frame a body with its checksum.
    fn sentence(body: &str) -> String {
        format!("${}*{:02X}\r\n", body, nmea_checksum(body.as_bytes()))
    }

    #[test]
    fn test_checksum_xor() {
        assert_eq!(nmea_checksum(&[0x01, 0x02, 0x04]), 0x07);
        assert_eq!(nmea_checksum(&[0xFF, 0xFF]), 0x00);
    }

    #[test]
    fn test_parse_gga_fix() {
        let line = sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        let fix = parse_sentence(&line).unwrap();

        let (lat, lng) = fix.position().unwrap();
        assert!((lat - 48.1173).abs() < 1e-6);
        assert!((lng - 11.516_666).abs() < 1e-5);
    }

    #[test]
    fn test_parse_gga_no_fix() {
        let line = sentence("GPGGA,123519,,,,,0,00,,,M,,M,,");
        let fix = parse_sentence(&line).unwrap();
        assert!(!fix.valid);
        assert_eq!(fix.position(), None);
    }

    #[test]
    fn test_parse_rmc_southern_western() {
        let line = sentence("GNRMC,081836,A,3751.65,S,14507.36,W,000.0,360.0,130998,011.3,E");
        let fix = parse_sentence(&line).unwrap();

        let (lat, lng) = fix.position().unwrap();
        assert!((lat - (-37.860_833)).abs() < 1e-5);
        assert!((lng - (-145.122_667)).abs() < 1e-5);
    }

    #[test]
    fn test_parse_rmc_void_status() {
        let line = sentence("GPRMC,081836,V,3751.65,S,14507.36,E,000.0,360.0,130998,011.3,E");
        let fix = parse_sentence(&line).unwrap();
        assert!(!fix.valid);
        assert_eq!(fix.position(), None);
    }

    #[test]
    fn test_checksum_mismatch() {
        let result =
            parse_sentence("$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*00");
        assert!(matches!(result, Err(NmeaError::Checksum { actual: 0x00, .. })));
    }

    #[test]
    fn test_missing_dollar() {
        assert!(matches!(parse_sentence("GPGGA,1*00"), Err(NmeaError::Malformed(_))));
    }

    #[test]
    fn test_missing_checksum() {
        assert!(matches!(parse_sentence("$GPGGA,123519"), Err(NmeaError::Malformed(_))));
    }

    #[test]
    fn test_unsupported_sentence() {
        let line = sentence("GPGSV,3,1,11,03,03,111,00");
        assert_eq!(
            parse_sentence(&line),
            Err(NmeaError::Unsupported("GSV".to_string()))
        );
    }

    #[test]
    fn test_truncated_gga() {
        let line = sentence("GPGGA,123519,4807.038");
        assert!(matches!(parse_sentence(&line), Err(NmeaError::Malformed(_))));
    }

    #[test]
    fn test_parse_coordinate_rejects_bad_hemisphere() {
        assert!(matches!(parse_coordinate("4807.038", "X"), Err(NmeaError::Malformed(_))));
        assert_eq!(parse_coordinate("", "N"), Ok(None));
        assert!(matches!(parse_coordinate("abc", "N"), Err(NmeaError::Malformed(_))));
    }

    #[test]
    fn test_parse_coordinate_rejects_non_finite() {
        for value in ["inf", "NaN", "-inf", "infinity"] {
            assert!(
                matches!(parse_coordinate(value, "N"), Err(NmeaError::Malformed(_))),
                "accepted {}",
                value
            );
        }
    }

    #[test]
    fn test_parse_coordinate_rejects_out_of_range() {
        // 95 degrees north
        assert!(matches!(parse_coordinate("9500.000", "N"), Err(NmeaError::Malformed(_))));
        // 181 degrees east
        assert!(matches!(parse_coordinate("18100.000", "E"), Err(NmeaError::Malformed(_))));
        // 75 minutes
        assert!(matches!(parse_coordinate("4875.000", "N"), Err(NmeaError::Malformed(_))));
        assert!(matches!(parse_coordinate("-4807.038", "N"), Err(NmeaError::Malformed(_))));

        assert_eq!(parse_coordinate("9000.000", "S"), Ok(Some(-90.0)));
        assert_eq!(parse_coordinate("18000.000", "W"), Ok(Some(-180.0)));
    }

    #[test]
    fn test_gga_with_infinite_latitude_is_malformed() {
        let line = sentence("GPGGA,123519,inf,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,");
        assert!(matches!(parse_sentence(&line), Err(NmeaError::Malformed(_))));
    }
}
