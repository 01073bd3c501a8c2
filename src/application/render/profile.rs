//! Painter settings passed by value with every render call.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::domain::{canonical::CanonicalRequest, types::OperationKind};

const BOBBIN_COLOR: &str = "0x539796";
const BOBBIN_COLOR_TRANSLUCENT: &str = "0x7F539796";
const MARGIN_COLOR: &str = "0xfff05b";
const MARGIN_COLOR_TRANSLUCENT: &str = "0x7Ffff05b";
const TEXT_COLOR: &str = "0xd4d4d4";
const LINES_COLOR: &str = "0x1a1a1a";
const DRAWING_COLOR: &str = "#d4d4d4";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_simple_litz: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_advanced_litz: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_include_fringing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_cci_coordinates_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_color_bobbin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_color_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_color_lines: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub painter_color_margin: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projection_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension_color: Option<String>,
}

impl RenderProfile {
    pub fn for_request(request: &CanonicalRequest, cci_coordinates_path: Option<&Path>) -> Self {
        let cci = cci_coordinates_path.map(Path::to_path_buf);
        match request.kind() {
            OperationKind::ShapeModel | OperationKind::CoreModel => Self::default(),
            OperationKind::TechnicalDrawing | OperationKind::GappingDrawing => Self {
                projection_color: Some(DRAWING_COLOR.to_string()),
                dimension_color: Some(DRAWING_COLOR.to_string()),
                ..Self::default()
            },
            OperationKind::FieldPlot => Self {
                painter_simple_litz: Some(true),
                painter_advanced_litz: Some(false),
                painter_include_fringing: Some(
                    request
                        .body()
                        .get("includeFringing")
                        .and_then(|flag| flag.as_bool())
                        .unwrap_or(true),
                ),
                painter_cci_coordinates_path: cci,
                painter_color_bobbin: Some(BOBBIN_COLOR_TRANSLUCENT.to_string()),
                painter_color_text: Some(TEXT_COLOR.to_string()),
                painter_color_lines: Some(LINES_COLOR.to_string()),
                painter_color_margin: Some(MARGIN_COLOR_TRANSLUCENT.to_string()),
                ..Self::default()
            },
            OperationKind::TurnsPlot => Self {
                painter_simple_litz: Some(true),
                painter_advanced_litz: Some(false),
                painter_cci_coordinates_path: cci,
                ..Self::default()
            },
            OperationKind::WirePlot => Self {
                painter_simple_litz: Some(false),
                painter_advanced_litz: Some(false),
                painter_cci_coordinates_path: cci,
                painter_color_bobbin: Some(BOBBIN_COLOR.to_string()),
                painter_color_margin: Some(MARGIN_COLOR.to_string()),
                ..Self::default()
            },
            OperationKind::CurrentDensityPlot => Self {
                painter_simple_litz: Some(false),
                painter_advanced_litz: Some(false),
                painter_cci_coordinates_path: cci,
                ..Self::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, BTreeSet},
        sync::Arc,
    };

    use serde_json::json;

    use super::*;
    use crate::domain::{
        canonical::Canonicalizer, entities::GenerationRequest, schema::ShapeSchema,
    };

    struct NoShapes(BTreeMap<(String, String), BTreeSet<String>>);

    impl ShapeSchema for NoShapes {
        fn dimension_keys(&self, family: &str, subtype: &str) -> Option<&BTreeSet<String>> {
            self.0.get(&(family.to_string(), subtype.to_string()))
        }
    }

    #[test]
    fn field_plot_profile_carries_fringing_flag() {
        let canonicalizer = Canonicalizer::new(Arc::new(NoShapes(BTreeMap::new())));
        let request = canonicalizer
            .canonicalize(&GenerationRequest::new(
                OperationKind::FieldPlot,
                json!({"magnetic": {"coil": {}}, "operatingPoint": {}, "includeFringing": false}),
            ))
            .expect("canonical");

        let profile = RenderProfile::for_request(&request, Some(Path::new("/opt/cci")));
        assert_eq!(profile.painter_include_fringing, Some(false));
        assert_eq!(profile.painter_simple_litz, Some(true));
        assert_eq!(
            profile.painter_cci_coordinates_path.as_deref(),
            Some(Path::new("/opt/cci"))
        );

        let settings = serde_json::to_value(&profile).expect("serialize");
        assert_eq!(settings["painterColorBobbin"], json!("0x7F539796"));
        assert!(settings.get("projectionColor").is_none());
    }
}
