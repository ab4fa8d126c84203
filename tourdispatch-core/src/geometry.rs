//! Encoded polyline decoding and the route paths handed to renderers.
//!
//! Optimizer geometries use the polyline algorithm: latitude and longitude are scaled to
//! fixed-point integers, delta-encoded against the previous point, zig-zag folded, and
//! emitted as 5-bit chunks offset by 63 into printable ASCII.

use tracing::warn;

use crate::model::GeoPoint;
use crate::state::TourView;

/// Decimal digits used by the optimizer.
pub const DEFAULT_PRECISION: u8 = 5;

const CHUNK_BITS: u32 = 5;
const CHUNK_MASK: i64 = 0x1f;
const CONTINUATION: i64 = 0x20;
const ASCII_OFFSET: u8 = 63;
const MAX_SHIFT: u32 = 60;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
/// Malformed encoded polyline.
pub enum DecodeError {
    /// Input ended in the middle of a value.
    #[error("truncated value at byte {offset}")]
    Truncated {
        /// Byte offset where the value started.
        offset: usize,
    },
    /// Byte outside the printable range of the encoding.
    #[error("invalid byte {byte:#04x} at {offset}")]
    InvalidByte {
        /// Byte offset.
        offset: usize,
        /// Offending byte.
        byte: u8,
    },
    /// A latitude was not followed by a longitude.
    #[error("latitude without matching longitude")]
    UnbalancedPair,
    /// A value, or the running coordinate sum, does not fit in 64 bits.
    #[error("value overflow at byte {offset}")]
    Overflow {
        /// Byte offset where the value started.
        offset: usize,
    },
    /// Precision too large to scale coordinates.
    #[error("unsupported precision {0}")]
    Precision(u8),
}

/// Streaming decoder yielding one coordinate per latitude/longitude pair.
///
/// The decoder stops permanently after the first error.
#[derive(Debug, Clone)]
pub struct PolylineDecoder<'src> {
    bytes: &'src [u8],
    cursor: usize,
    factor: f64,
    lat: i64,
    lon: i64,
    failed: bool,
}

impl<'src> PolylineDecoder<'src> {
    /// Start decoding `encoded` at the given precision.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Precision`] when the precision cannot be represented.
    pub fn new(encoded: &'src str, precision: u8) -> Result<Self, DecodeError> {
        Ok(Self {
            bytes: encoded.as_bytes(),
            cursor: 0,
            factor: scale_factor(precision)?,
            lat: 0,
            lon: 0,
            failed: false,
        })
    }

    fn next_delta(&mut self) -> Result<i64, DecodeError> {
        let start = self.cursor;
        let mut result: i64 = 0;
        let mut shift: u32 = 0;
        loop {
            let Some(&byte) = self.bytes.get(self.cursor) else {
                return Err(DecodeError::Truncated { offset: start });
            };
            if !(ASCII_OFFSET..=ASCII_OFFSET + 0x3f).contains(&byte) {
                return Err(DecodeError::InvalidByte {
                    offset: self.cursor,
                    byte,
                });
            }
            if shift > MAX_SHIFT {
                return Err(DecodeError::Overflow { offset: start });
            }
            self.cursor += 1;
            let chunk = i64::from(byte - ASCII_OFFSET);
            result |= (chunk & CHUNK_MASK) << shift;
            shift += CHUNK_BITS;
            if chunk & CONTINUATION == 0 {
                break;
            }
        }
        if result & 1 == 1 {
            Ok(!(result >> 1))
        } else {
            Ok(result >> 1)
        }
    }

    #[expect(
        clippy::cast_precision_loss,
        reason = "fixed-point coordinates stay far below 2^52"
    )]
    fn to_point(&self) -> GeoPoint {
        GeoPoint::new(self.lat as f64 / self.factor, self.lon as f64 / self.factor)
    }
}

impl Iterator for PolylineDecoder<'_> {
    type Item = Result<GeoPoint, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor >= self.bytes.len() {
            return None;
        }
        let start = self.cursor;
        let pair = self.next_delta().and_then(|lat_delta| {
            if self.cursor >= self.bytes.len() {
                return Err(DecodeError::UnbalancedPair);
            }
            self.next_delta().map(|lon_delta| (lat_delta, lon_delta))
        });
        let running = pair.and_then(|(lat_delta, lon_delta)| {
            self.lat
                .checked_add(lat_delta)
                .zip(self.lon.checked_add(lon_delta))
                .ok_or(DecodeError::Overflow { offset: start })
        });
        match running {
            Ok((lat, lon)) => {
                self.lat = lat;
                self.lon = lon;
                Some(Ok(self.to_point()))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Decode an encoded polyline into coordinates.
///
/// # Errors
///
/// Returns a [`DecodeError`] for truncated, out-of-alphabet, unbalanced, or overflowing input.
pub fn decode(encoded: &str, precision: u8) -> Result<Vec<GeoPoint>, DecodeError> {
    PolylineDecoder::new(encoded, precision)?.collect()
}

/// Encode coordinates as a polyline, rounding to the given precision.
///
/// # Errors
///
/// Returns [`DecodeError::Precision`] when the precision cannot be represented.
pub fn encode(points: &[GeoPoint], precision: u8) -> Result<String, DecodeError> {
    let factor = scale_factor(precision)?;
    let mut encoded = String::new();
    let mut previous = (0_i64, 0_i64);
    for point in points {
        let current = (to_fixed(point.lat, factor), to_fixed(point.lon, factor));
        encode_value(current.0 - previous.0, &mut encoded);
        encode_value(current.1 - previous.1, &mut encoded);
        previous = current;
    }
    Ok(encoded)
}

fn scale_factor(precision: u8) -> Result<f64, DecodeError> {
    if precision > 9 {
        return Err(DecodeError::Precision(precision));
    }
    Ok(10_f64.powi(i32::from(precision)))
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "coordinates scaled by at most 1e9 fit in i64"
)]
fn to_fixed(value: f64, factor: f64) -> i64 {
    (value * factor).round() as i64
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "emitted chunks are masked to six bits"
)]
fn encode_value(delta: i64, out: &mut String) {
    let mut folded = if delta < 0 { !(delta << 1) } else { delta << 1 };
    while folded >= CONTINUATION {
        push_chunk((CONTINUATION | (folded & CHUNK_MASK)) as u8, out);
        folded >>= CHUNK_BITS;
    }
    push_chunk(folded as u8, out);
}

fn push_chunk(chunk: u8, out: &mut String) {
    out.push(char::from(chunk + ASCII_OFFSET));
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Where the points of a [`RoutePath`] come from.
pub enum PathSource {
    /// Road geometry decoded from the optimizer.
    Encoded,
    /// Straight segments depot, stops in order, depot.
    StraightLine,
}

#[derive(Debug, Clone, PartialEq)]
/// Polyline to draw for a tour.
pub struct RoutePath {
    /// Ordered coordinates.
    pub points: Vec<GeoPoint>,
    /// Origin of the coordinates.
    pub source: PathSource,
}

/// Compute the path for a tour, preferring the encoded geometry and falling back to straight
/// lines between the depot and the resolved stops.
///
/// Geometry that fails to decode, or decodes to any point outside valid latitude and
/// longitude, is discarded as a whole.
#[must_use]
pub fn route_path(tour: &TourView, depot: Option<GeoPoint>) -> RoutePath {
    if let Some(encoded) = tour.tour.geometry.as_deref().filter(|raw| !raw.is_empty()) {
        match decode(encoded, DEFAULT_PRECISION) {
            Ok(points) if points.is_empty() => {}
            Ok(points) if points.iter().all(GeoPoint::is_valid) => {
                return RoutePath {
                    points,
                    source: PathSource::Encoded,
                };
            }
            Ok(_) => {
                warn!(
                    tour = %tour.tour.id,
                    "geometry leaves the coordinate range, falling back to straight route"
                );
            }
            Err(err) => {
                warn!(tour = %tour.tour.id, error = %err, "falling back to straight route");
            }
        }
    }
    straight_line(tour, depot)
}

fn straight_line(tour: &TourView, depot: Option<GeoPoint>) -> RoutePath {
    let mut points: Vec<GeoPoint> = depot.into_iter().collect();
    points.extend(
        tour.stops
            .iter()
            .filter_map(|stop| stop.collection_point.location),
    );
    if let Some(depot_point) = depot
        && !tour.stops.is_empty()
    {
        points.push(depot_point);
    }
    RoutePath {
        points,
        source: PathSource::StraightLine,
    }
}
