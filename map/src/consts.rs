//! Engine-wide tuning constants.

/// Grid cell size, in world pixels, for a fresh document.
pub const CELL_SIZE_DEFAULT: f64 = 40.0;

/// Cell size assumed for persisted documents that predate the field.
pub const CELL_SIZE_LEGACY_DEFAULT: f64 = 60.0;

/// Allowed grid cell size, in world pixels.
pub const CELL_SIZE_MIN: f64 = 10.0;
pub const CELL_SIZE_MAX: f64 = 200.0;

/// Allowed real-world scale per cell, in meters.
pub const METERS_PER_CELL_MIN: f64 = 0.1;
pub const METERS_PER_CELL_MAX: f64 = 50.0;

/// Fixed conversion for documents that stored feet per cell.
pub const FEET_TO_METERS: f64 = 0.3048;

/// Annotation stroke width bounds, in world pixels.
pub const STROKE_WIDTH_MIN: f64 = 1.0;
pub const STROKE_WIDTH_MAX: f64 = 16.0;

/// Operator-side zoom bounds.
pub const OPERATOR_ZOOM_MIN: f64 = 0.25;
pub const OPERATOR_ZOOM_MAX: f64 = 3.5;

/// Viewer-side zoom bounds (viewers may pull back further).
pub const VIEWER_ZOOM_MIN: f64 = 0.2;
pub const VIEWER_ZOOM_MAX: f64 = 5.0;

/// Multiplicative zoom step per wheel notch.
pub const WHEEL_ZOOM_STEP: f64 = 1.08;

/// Minimum squared distance, in world pixels, between recorded freehand
/// points. Filters out the point flood a slow drag would otherwise produce.
pub const PATH_MIN_SEGMENT_SQ: f64 = 9.0;

/// Fill opacity applied to committed filled shapes.
pub const SHAPE_FILL_OPACITY: f64 = 0.18;

/// Fill opacity for the in-progress preview shape.
pub const PREVIEW_FILL_OPACITY: f64 = 0.12;

/// Lifetime of a ping overlay, from its timestamp.
pub const PING_DURATION_MS: i64 = 4000;

/// Period of the ping pulse ring.
pub const PING_PULSE_MS: i64 = 900;

/// Censor-code roll period: the label advances once per tick.
pub const CENSOR_TICK_MS: i64 = 60;
