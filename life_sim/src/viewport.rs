//! Validation and normalization of client-proposed viewports.

use life_proto::Viewport;
use serde_json::Value as JsonValue;
use thiserror::Error;

/// Why a viewport request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidViewport {
    #[error("Viewport must be an object")]
    NotAnObject,
    #[error("Viewport fields must be integers")]
    NotInteger,
    #[error("Viewport rows/cols must be > 0")]
    NonPositive,
    #[error("Requested viewport area too large")]
    TooLarge,
}

/// Dimensions of the world a viewport is negotiated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorldBounds {
    pub rows: u32,
    pub cols: u32,
}

impl WorldBounds {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows: rows.max(1),
            cols: cols.max(1),
        }
    }
}

/// Turn a raw `viewport` payload into a usable [`Viewport`].
///
/// Missing fields default to the origin and the full world size. The origin
/// always wraps toroidally; the size is clamped to the world. The area guard
/// applies to the requested size, before clamping.
pub fn normalize(
    raw: &JsonValue,
    bounds: WorldBounds,
    max_area: u64,
) -> Result<Viewport, InvalidViewport> {
    let empty = serde_json::Map::new();
    let fields = match raw {
        JsonValue::Object(fields) => fields,
        JsonValue::Null => &empty,
        _ => return Err(InvalidViewport::NotAnObject),
    };
    let field = |name: &str, default: i128| match fields.get(name) {
        None => Ok(default),
        Some(value) => coerce_int(value).ok_or(InvalidViewport::NotInteger),
    };

    let x = field("x", 0)?;
    let y = field("y", 0)?;
    let rows = field("rows", i128::from(bounds.rows))?;
    let cols = field("cols", i128::from(bounds.cols))?;

    if rows <= 0 || cols <= 0 {
        return Err(InvalidViewport::NonPositive);
    }
    match (rows as u128).checked_mul(cols as u128) {
        Some(area) if area <= u128::from(max_area) => {}
        _ => return Err(InvalidViewport::TooLarge),
    }

    Ok(Viewport {
        x: x.rem_euclid(i128::from(bounds.cols)) as u32,
        y: y.rem_euclid(i128::from(bounds.rows)) as u32,
        rows: rows.min(i128::from(bounds.rows)) as u32,
        cols: cols.min(i128::from(bounds.cols)) as u32,
    })
}

/// Integer coercion accepted for viewport fields: integers, finite floats
/// (truncated toward zero), booleans and numeric strings.
///
/// Values are widened to `i128` so every JSON integer fits. Floats beyond
/// that range saturate, which the area guard then rejects for sizes.
fn coerce_int(value: &JsonValue) -> Option<i128> {
    match value {
        JsonValue::Number(number) => number
            .as_i64()
            .map(i128::from)
            .or_else(|| number.as_u64().map(i128::from))
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i128)
            }),
        JsonValue::Bool(flag) => Some(i128::from(*flag)),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
