//! Conversion of cardinal-delimited position tokens to decimal degrees.
//!
//! DSC equipment reports a position as two tokens that embed the hemisphere
//! letter instead of a sign:
//!
//! ```text
//! 5325.71N    latitude,  DDMM.mm followed by N/S
//! 01433.82E   longitude, DDDMM.mm followed by E/W
//! ```
//!
//! A second form splits whole degrees and minutes around the letter
//! (`53N25.71`). Both are accepted.

use nom::{
    IResult, Parser,
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, map_res, opt, recognize},
};
use serde::Serialize;
use thiserror::Error;

/// Errors from decoding a position token.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Missing hemisphere letter in position token: {0:?}")]
    MissingHemisphere(String),

    #[error("Invalid number in position token: {0:?}")]
    InvalidNumber(String),

    #[error("Coordinate out of range: {0:?}")]
    OutOfRange(String),
}

/// A decoded position in decimal degrees. Positive is North/East.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPosition {
    pub latitude_degrees: f64,
    pub longitude_degrees: f64,
}

impl GeoPosition {
    /// Decode a raw latitude/longitude token pair.
    pub fn from_raw(raw_lat: &str, raw_long: &str) -> Result<Self, GeoError> {
        Ok(Self {
            latitude_degrees: decode_latitude(raw_lat)?,
            longitude_degrees: decode_longitude(raw_long)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Axis {
    Latitude,
    Longitude,
}

impl Axis {
    fn hemispheres(self) -> &'static str {
        match self {
            Axis::Latitude => "NS",
            Axis::Longitude => "EW",
        }
    }

    fn limit(self) -> f64 {
        match self {
            Axis::Latitude => 90.0,
            Axis::Longitude => 180.0,
        }
    }
}

/// Decode a latitude token such as `5325.71N`.
pub fn decode_latitude(token: &str) -> Result<f64, GeoError> {
    decode_token(token, Axis::Latitude)
}

/// Decode a longitude token such as `01433.82W`.
pub fn decode_longitude(token: &str) -> Result<f64, GeoError> {
    decode_token(token, Axis::Longitude)
}

/// Parse an unsigned decimal number.
fn parse_number(input: &str) -> IResult<&str, f64> {
    map_res(recognize((digit1, opt((char('.'), digit1)))), |s: &str| {
        s.parse::<f64>()
    })
    .parse(input)
}

/// Parse `<number><hemisphere>[<number>]`.
fn parse_cardinal<'a>(
    input: &'a str,
    hemispheres: &'static str,
) -> IResult<&'a str, (f64, char, Option<f64>)> {
    all_consuming((parse_number, one_of(hemispheres), opt(parse_number))).parse(input)
}

fn decode_token(token: &str, axis: Axis) -> Result<f64, GeoError> {
    let trimmed = token.trim();
    let hemispheres = axis.hemispheres();

    if !trimmed.contains(|c: char| hemispheres.contains(c)) {
        return Err(GeoError::MissingHemisphere(token.to_string()));
    }

    let (_, (head, hemisphere, tail)) = parse_cardinal(trimmed, hemispheres)
        .map_err(|_| GeoError::InvalidNumber(token.to_string()))?;

    let magnitude = match tail {
        // Whole degrees before the letter, minutes after it
        Some(minutes) => {
            if minutes >= 60.0 {
                return Err(GeoError::OutOfRange(token.to_string()));
            }
            head + minutes / 60.0
        }
        // Degrees and minutes packed together as DDMM.mmm
        None => {
            let degrees = (head / 100.0).trunc();
            let minutes = head - degrees * 100.0;
            if minutes >= 60.0 {
                return Err(GeoError::OutOfRange(token.to_string()));
            }
            degrees + minutes / 60.0
        }
    };

    if magnitude > axis.limit() {
        return Err(GeoError::OutOfRange(token.to_string()));
    }

    Ok(match hemisphere {
        'S' | 'W' => -magnitude,
        _ => magnitude,
    })
}
