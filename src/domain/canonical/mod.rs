//! Request canonicalization: equivalent requests must serialize identically.

mod dimensions;
mod json;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

pub use dimensions::{canonicalize_shape, filter_allowed_keys, normalize_dimension};
pub use json::{canonical_json, strip_nulls};

use super::{
    entities::GenerationRequest,
    error::CanonicalizationError,
    schema::ShapeSchema,
    types::{ArtifactKind, ModelFormat, OperationKind},
};

/// Core fields that never influence geometry.
const CORE_DROPPED_FIELDS: &[&str] = &[
    "name",
    "manufacturerInfo",
    "distributorsInfo",
    "processedDescription",
];
const MAGNETIC_DROPPED_FIELDS: &[&str] = &["manufacturerInfo", "distributorsInfo"];

/// Deterministic normal form of a [`GenerationRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRequest {
    kind: OperationKind,
    #[serde(rename = "spec")]
    body: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<ModelFormat>,
}

impl CanonicalRequest {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn model_format(&self) -> Option<ModelFormat> {
        self.format
    }

    pub fn artifact_kind(&self) -> ArtifactKind {
        self.kind.artifact_kind(self.format)
    }

    /// Options as they take part in the fingerprint; empty for kinds they cannot affect.
    pub fn options_value(&self) -> Value {
        let mut options = Map::new();
        if let Some(format) = self.format {
            options.insert(
                "format".to_string(),
                Value::String(format.as_str().to_string()),
            );
        }
        Value::Object(options)
    }

    pub fn canonical_json(&self) -> String {
        canonical_json(&self.body)
    }
}

#[derive(Clone)]
pub struct Canonicalizer {
    schema: Arc<dyn ShapeSchema>,
}

impl Canonicalizer {
    pub fn new(schema: Arc<dyn ShapeSchema>) -> Self {
        Self { schema }
    }

    pub fn canonicalize(
        &self,
        request: &GenerationRequest,
    ) -> Result<CanonicalRequest, CanonicalizationError> {
        let kind = request.kind;
        let payload = match strip_nulls(request.payload.clone()) {
            Value::Object(payload) => payload,
            _ => return Err(CanonicalizationError::PayloadNotObject { kind }),
        };

        let body = match kind {
            OperationKind::ShapeModel | OperationKind::TechnicalDrawing => {
                canonicalize_shape(self.schema.as_ref(), "shape", &payload)?
            }
            OperationKind::CoreModel | OperationKind::GappingDrawing => {
                self.canonicalize_core("core", payload, true)?
            }
            OperationKind::FieldPlot => {
                let mut selected = select(kind, &payload, &["magnetic", "operatingPoint"])?;
                let magnetic = take_object(&mut selected, "magnetic")?;
                selected.insert(
                    "magnetic".to_string(),
                    self.canonicalize_magnetic(magnetic)?,
                );
                let include_fringing = match payload.get("includeFringing") {
                    None => true,
                    Some(Value::Bool(flag)) => *flag,
                    Some(_) => {
                        return Err(CanonicalizationError::invalid_field(
                            "includeFringing",
                            "a boolean",
                        ));
                    }
                };
                selected.insert(
                    "includeFringing".to_string(),
                    Value::Bool(include_fringing),
                );
                Value::Object(selected)
            }
            OperationKind::TurnsPlot => {
                let mut selected = select(kind, &payload, &["magnetic"])?;
                let magnetic = take_object(&mut selected, "magnetic")?;
                selected.insert(
                    "magnetic".to_string(),
                    self.canonicalize_magnetic(magnetic)?,
                );
                Value::Object(selected)
            }
            OperationKind::WirePlot => {
                let mut selected = select(kind, &payload, &["wire"])?;
                let mut wire = take_object(&mut selected, "wire")?;
                reduce_alias(&mut wire, "material", "wire.material")?;
                selected.insert("wire".to_string(), Value::Object(wire));
                Value::Object(selected)
            }
            OperationKind::CurrentDensityPlot => {
                Value::Object(select(kind, &payload, &["wire", "operatingPoint"])?)
            }
        };

        let format = kind
            .produces_model()
            .then(|| request.options.format.unwrap_or_default());

        Ok(CanonicalRequest { kind, body, format })
    }

    /// Cores keep their functional and geometrical descriptions; the embedded
    /// shape is canonicalized when given as an object.
    fn canonicalize_core(
        &self,
        path: &str,
        core: Map<String, Value>,
        reduce_material: bool,
    ) -> Result<Value, CanonicalizationError> {
        let mut core = core;
        for field in CORE_DROPPED_FIELDS {
            core.remove(*field);
        }

        let mut functional = match core.remove("functionalDescription") {
            Some(Value::Object(functional)) => functional,
            Some(_) => {
                return Err(CanonicalizationError::invalid_field(
                    format!("{path}.functionalDescription"),
                    "an object",
                ));
            }
            None => {
                return Err(CanonicalizationError::invalid_field(
                    format!("{path}.functionalDescription"),
                    "present",
                ));
            }
        };
        functional.remove("name");

        let shape = match functional.get("shape") {
            Some(Value::Object(shape)) => {
                let shape_path = format!("{path}.functionalDescription.shape");
                Some(canonicalize_shape(self.schema.as_ref(), &shape_path, shape)?)
            }
            _ => None,
        };
        if let Some(shape) = shape {
            functional.insert("shape".to_string(), shape);
        }
        if reduce_material {
            reduce_alias(
                &mut functional,
                "material",
                &format!("{path}.functionalDescription.material"),
            )?;
        }

        let mut canonical = Map::new();
        canonical.insert(
            "functionalDescription".to_string(),
            Value::Object(functional),
        );
        if let Some(geometrical) = core.remove("geometricalDescription") {
            canonical.insert("geometricalDescription".to_string(), geometrical);
        }
        Ok(Value::Object(canonical))
    }

    fn canonicalize_magnetic(
        &self,
        magnetic: Map<String, Value>,
    ) -> Result<Value, CanonicalizationError> {
        let mut magnetic = magnetic;
        for field in MAGNETIC_DROPPED_FIELDS {
            magnetic.remove(*field);
        }
        let core = match magnetic.remove("core") {
            Some(Value::Object(core)) => Some(self.canonicalize_core("magnetic.core", core, false)?),
            other => other,
        };
        if let Some(core) = core {
            magnetic.insert("core".to_string(), core);
        }
        Ok(Value::Object(magnetic))
    }
}

/// Keep only the listed top-level fields, all of which are required.
fn select(
    kind: OperationKind,
    payload: &Map<String, Value>,
    required: &[&'static str],
) -> Result<Map<String, Value>, CanonicalizationError> {
    let mut selected = Map::new();
    for &field in required {
        let value = payload
            .get(field)
            .ok_or(CanonicalizationError::MissingField { kind, field })?;
        selected.insert(field.to_string(), value.clone());
    }
    Ok(selected)
}

fn take_object(
    selected: &mut Map<String, Value>,
    field: &'static str,
) -> Result<Map<String, Value>, CanonicalizationError> {
    match selected.remove(field) {
        Some(Value::Object(object)) => Ok(object),
        _ => Err(CanonicalizationError::invalid_field(field, "an object")),
    }
}

/// Replace an object-or-name field by its bare name.
fn reduce_alias(
    object: &mut Map<String, Value>,
    field: &str,
    path: &str,
) -> Result<(), CanonicalizationError> {
    let name = match object.get(field) {
        None | Some(Value::String(_)) => return Ok(()),
        Some(Value::Object(alias)) => match alias.get("name") {
            Some(Value::String(name)) => name.clone(),
            _ => {
                return Err(CanonicalizationError::MalformedAlias {
                    path: path.to_string(),
                });
            }
        },
        Some(_) => {
            return Err(CanonicalizationError::MalformedAlias {
                path: path.to_string(),
            });
        }
    };
    object.insert(field.to_string(), Value::String(name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use serde_json::json;

    use super::*;
    use crate::domain::entities::GenerationRequest;

    struct FixedSchema(BTreeMap<(String, String), BTreeSet<String>>);

    impl ShapeSchema for FixedSchema {
        fn dimension_keys(&self, family: &str, subtype: &str) -> Option<&BTreeSet<String>> {
            self.0.get(&(family.to_string(), subtype.to_string()))
        }
    }

    fn canonicalizer() -> Canonicalizer {
        let mut families = BTreeMap::new();
        families.insert(
            ("e".to_string(), "1".to_string()),
            ["A", "B", "C", "D", "E", "F"]
                .into_iter()
                .map(String::from)
                .collect(),
        );
        Canonicalizer::new(Arc::new(FixedSchema(families)))
    }

    fn core(material: Value, dims: Value) -> Value {
        json!({
            "name": "My core",
            "functionalDescription": {
                "type": "two-piece set",
                "material": material,
                "shape": {"family": "e", "familySubtype": 1, "dimensions": dims, "name": "E 20"},
                "gapping": [],
                "numberStacks": 1
            }
        })
    }

    #[test]
    fn material_object_reduces_to_name_for_core_models() {
        let canonicalizer = canonicalizer();
        let by_name = canonicalizer
            .canonicalize(&GenerationRequest::new(
                OperationKind::CoreModel,
                core(json!("3C97"), json!({"A": 20})),
            ))
            .expect("by name");
        let by_object = canonicalizer
            .canonicalize(&GenerationRequest::new(
                OperationKind::CoreModel,
                core(json!({"name": "3C97", "permeability": {}}), json!({"A": 20.0})),
            ))
            .expect("by object");
        assert_eq!(by_name.canonical_json(), by_object.canonical_json());
    }

    #[test]
    fn core_model_defaults_to_stl_and_other_kinds_drop_options() {
        let canonicalizer = canonicalizer();
        let model = canonicalizer
            .canonicalize(&GenerationRequest::new(
                OperationKind::CoreModel,
                core(json!("N87"), json!({"A": 20})),
            ))
            .expect("model");
        assert_eq!(model.model_format(), Some(ModelFormat::Stl));

        let drawing = canonicalizer
            .canonicalize(
                &GenerationRequest::new(OperationKind::TechnicalDrawing, json!({"family": "e"}))
                    .with_format(ModelFormat::Step),
            )
            .expect("drawing");
        assert_eq!(drawing.options_value(), json!({}));
    }

    #[test]
    fn field_plot_selects_fields_and_defaults_fringing() {
        let canonicalizer = canonicalizer();
        let request = GenerationRequest::new(
            OperationKind::FieldPlot,
            json!({
                "magnetic": {"coil": {"bobbin": "basic"}, "manufacturerInfo": {"name": "x"}},
                "operatingPoint": {"excitationsPerWinding": []},
                "unrelated": 42
            }),
        );
        let canonical = canonicalizer.canonicalize(&request).expect("field plot");
        assert_eq!(
            canonical.body(),
            &json!({
                "magnetic": {"coil": {"bobbin": "basic"}},
                "operatingPoint": {"excitationsPerWinding": []},
                "includeFringing": true
            })
        );
    }

    #[test]
    fn missing_required_field_is_reported() {
        let err = canonicalizer()
            .canonicalize(&GenerationRequest::new(
                OperationKind::CurrentDensityPlot,
                json!({"wire": {"type": "round"}}),
            ))
            .expect_err("missing operating point");
        assert_eq!(
            err,
            CanonicalizationError::MissingField {
                kind: OperationKind::CurrentDensityPlot,
                field: "operatingPoint"
            }
        );
    }

    #[test]
    fn malformed_material_alias_is_rejected() {
        let err = canonicalizer()
            .canonicalize(&GenerationRequest::new(
                OperationKind::GappingDrawing,
                core(json!({"permeability": 2000}), json!({})),
            ))
            .expect_err("alias without name");
        assert!(matches!(err, CanonicalizationError::MalformedAlias { .. }));
    }

    #[test]
    fn null_fields_do_not_affect_canonical_form() {
        let canonicalizer = canonicalizer();
        let plain = canonicalizer
            .canonicalize(&GenerationRequest::new(
                OperationKind::ShapeModel,
                json!({"family": "e", "dimensions": {"A": 1}}),
            ))
            .expect("plain");
        let with_nulls = canonicalizer
            .canonicalize(&GenerationRequest::new(
                OperationKind::ShapeModel,
                json!({"family": "e", "familySubtype": null, "dimensions": {"A": 1, "B": null}}),
            ))
            .expect("with nulls");
        assert_eq!(plain, with_nulls);
    }
}
