//! Shape-level normalization: tolerance collapse and schema key filtering.

use serde_json::{Map, Value};

use crate::domain::{
    error::CanonicalizationError,
    schema::{DEFAULT_SUBTYPE, ShapeSchema, integral_subtype, normalize_subtype_text},
};

const MIDPOINT_DECIMALS: i32 = 6;

/// Collapse a dimension given as a number or `{nominal, minimum, maximum}`
/// into the single nominal value.
pub fn normalize_dimension(key: &str, value: &Value) -> Result<f64, CanonicalizationError> {
    let invalid = || CanonicalizationError::InvalidDimension {
        key: key.to_string(),
    };

    let tolerance = match value {
        Value::Number(number) => return number.as_f64().ok_or_else(invalid),
        Value::Object(tolerance) => tolerance,
        _ => return Err(invalid()),
    };

    let field = |name: &str| -> Result<Option<f64>, CanonicalizationError> {
        match tolerance.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(number)) => number.as_f64().map(Some).ok_or_else(invalid),
            Some(_) => Err(invalid()),
        }
    };

    let nominal = field("nominal")?;
    let minimum = field("minimum")?;
    let maximum = field("maximum")?;

    let value = match (nominal, minimum, maximum) {
        (Some(nominal), _, _) => nominal,
        (None, Some(minimum), None) => minimum,
        (None, None, Some(maximum)) => maximum,
        (None, Some(minimum), Some(maximum)) => round_to(midpoint(minimum, maximum)),
        (None, None, None) => {
            return Err(CanonicalizationError::EmptyDimension {
                key: key.to_string(),
            });
        }
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid())
    }
}

fn midpoint(minimum: f64, maximum: f64) -> f64 {
    let sum = minimum + maximum;
    if sum.is_finite() {
        sum / 2.0
    } else {
        minimum / 2.0 + maximum / 2.0
    }
}

/// Values too large to scale already have no fractional digits to round.
fn round_to(value: f64) -> f64 {
    let scale = 10f64.powi(MIDPOINT_DECIMALS);
    let scaled = value * scale;
    if scaled.is_finite() {
        scaled.round() / scale
    } else {
        value
    }
}

/// Drop every dimension key the schema does not list for `(family, subtype)`.
pub fn filter_allowed_keys(
    schema: &dyn ShapeSchema,
    family: &str,
    subtype: &str,
    dimensions: Map<String, Value>,
) -> Result<Map<String, Value>, CanonicalizationError> {
    let allowed = schema
        .dimension_keys(family, subtype)
        .ok_or_else(|| CanonicalizationError::UnknownFamily {
            family: family.to_string(),
            subtype: subtype.to_string(),
        })?;

    Ok(dimensions
        .into_iter()
        .filter(|(key, _)| allowed.contains(key))
        .collect())
}

/// Canonical `{family, familySubtype, dimensions}` form of a shape object.
///
/// Any other shape fields (names, aliases, catalogue metadata) do not change
/// geometry and are dropped.
pub fn canonicalize_shape(
    schema: &dyn ShapeSchema,
    path: &str,
    shape: &Map<String, Value>,
) -> Result<Value, CanonicalizationError> {
    let family = match shape.get("family") {
        Some(Value::String(family)) => family.trim().to_ascii_lowercase(),
        Some(_) => {
            return Err(CanonicalizationError::invalid_field(
                format!("{path}.family"),
                "a string",
            ));
        }
        None => {
            return Err(CanonicalizationError::invalid_field(
                format!("{path}.family"),
                "present",
            ));
        }
    };
    let subtype = normalize_subtype(path, shape.get("familySubtype"))?;

    let raw_dimensions = match shape.get("dimensions").or_else(|| shape.get("dims")) {
        Some(Value::Object(dimensions)) => dimensions.clone(),
        None => Map::new(),
        Some(_) => {
            return Err(CanonicalizationError::invalid_field(
                format!("{path}.dimensions"),
                "an object",
            ));
        }
    };

    let filtered = filter_allowed_keys(schema, &family, &subtype, raw_dimensions)?;
    let mut dimensions = Map::new();
    for (key, value) in filtered {
        let nominal = normalize_dimension(&key, &value)?;
        dimensions.insert(key, Value::from(nominal));
    }

    let mut canonical = Map::new();
    canonical.insert("family".to_string(), Value::String(family));
    canonical.insert("familySubtype".to_string(), Value::String(subtype));
    canonical.insert("dimensions".to_string(), Value::Object(dimensions));
    Ok(Value::Object(canonical))
}

/// `familySubtype` may arrive as a number or a string; integral numbers lose
/// their fraction so `1`, `1.0` and `"1"` agree.
fn normalize_subtype(path: &str, value: Option<&Value>) -> Result<String, CanonicalizationError> {
    let invalid = || {
        CanonicalizationError::invalid_field(
            format!("{path}.familySubtype"),
            "a non-negative integer or string",
        )
    };
    match value {
        None | Some(Value::Null) => Ok(DEFAULT_SUBTYPE.to_string()),
        Some(Value::String(text)) => Ok(normalize_subtype_text(text)),
        Some(Value::Number(number)) => match number.as_u64() {
            Some(integer) => Ok(integer.to_string()),
            None => integral_subtype(number.as_f64()).ok_or_else(invalid),
        },
        Some(_) => Err(invalid()),
    }
}
