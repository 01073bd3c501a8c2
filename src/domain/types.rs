//! Shared domain enumerations for generation requests and stored artifacts.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::{UnknownFormat, UnknownKind};

/// Artifact-producing operations the renderer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    ShapeModel,
    CoreModel,
    TechnicalDrawing,
    GappingDrawing,
    FieldPlot,
    TurnsPlot,
    WirePlot,
    CurrentDensityPlot,
}

impl OperationKind {
    pub const ALL: [OperationKind; 8] = [
        OperationKind::ShapeModel,
        OperationKind::CoreModel,
        OperationKind::TechnicalDrawing,
        OperationKind::GappingDrawing,
        OperationKind::FieldPlot,
        OperationKind::TurnsPlot,
        OperationKind::WirePlot,
        OperationKind::CurrentDensityPlot,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::ShapeModel => "shape_model",
            OperationKind::CoreModel => "core_model",
            OperationKind::TechnicalDrawing => "technical_drawing",
            OperationKind::GappingDrawing => "gapping_drawing",
            OperationKind::FieldPlot => "field_plot",
            OperationKind::TurnsPlot => "turns_plot",
            OperationKind::WirePlot => "wire_plot",
            OperationKind::CurrentDensityPlot => "current_density_plot",
        }
    }

    /// Directory below the cache root that holds this kind's artifacts.
    pub fn directory(self) -> &'static str {
        match self {
            OperationKind::ShapeModel => "shapes",
            OperationKind::CoreModel => "cores",
            OperationKind::TechnicalDrawing => "technical_drawings",
            OperationKind::GappingDrawing => "gapping_drawings",
            OperationKind::FieldPlot => "field_plots",
            OperationKind::TurnsPlot => "turns_plots",
            OperationKind::WirePlot => "wire_plots",
            OperationKind::CurrentDensityPlot => "current_density_plots",
        }
    }

    /// Whether the operation yields a 3D model whose format the caller picks.
    pub fn produces_model(self) -> bool {
        matches!(self, OperationKind::ShapeModel | OperationKind::CoreModel)
    }

    pub fn artifact_kind(self, model_format: Option<ModelFormat>) -> ArtifactKind {
        let format = match self {
            OperationKind::ShapeModel | OperationKind::CoreModel => {
                match model_format.unwrap_or_default() {
                    ModelFormat::Stl => ArtifactFormat::Stl,
                    ModelFormat::Step => ArtifactFormat::Step,
                }
            }
            OperationKind::TechnicalDrawing | OperationKind::GappingDrawing => {
                ArtifactFormat::Json
            }
            OperationKind::FieldPlot
            | OperationKind::TurnsPlot
            | OperationKind::WirePlot
            | OperationKind::CurrentDensityPlot => ArtifactFormat::Svg,
        };
        ArtifactKind {
            operation: self,
            format,
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            OperationKind::ShapeModel => "_shape",
            OperationKind::CoreModel => "_core",
            OperationKind::TechnicalDrawing => "_views",
            OperationKind::GappingDrawing => "_gapping_views",
            OperationKind::FieldPlot
            | OperationKind::TurnsPlot
            | OperationKind::WirePlot
            | OperationKind::CurrentDensityPlot => "",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = UnknownKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| UnknownKind(value.to_string()))
    }
}

/// Output format for mesh-producing operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFormat {
    #[default]
    Stl,
    Step,
}

impl ModelFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelFormat::Stl => "stl",
            ModelFormat::Step => "step",
        }
    }
}

impl FromStr for ModelFormat {
    type Err = UnknownFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "stl" => Ok(ModelFormat::Stl),
            "step" | "stp" => Ok(ModelFormat::Step),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFormat {
    Stl,
    Step,
    Svg,
    Json,
}

impl ArtifactFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactFormat::Stl => "stl",
            ArtifactFormat::Step => "step",
            ArtifactFormat::Svg => "svg",
            ArtifactFormat::Json => "json",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Stl => "stl",
            ArtifactFormat::Step => "stp",
            ArtifactFormat::Svg => "svg",
            ArtifactFormat::Json => "json",
        }
    }
}

impl FromStr for ArtifactFormat {
    type Err = UnknownFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "stl" => Ok(ArtifactFormat::Stl),
            "step" | "stp" => Ok(ArtifactFormat::Step),
            "svg" => Ok(ArtifactFormat::Svg),
            "json" => Ok(ArtifactFormat::Json),
            other => Err(UnknownFormat(other.to_string())),
        }
    }
}

/// Operation plus concrete output format; decides the on-disk location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactKind {
    pub operation: OperationKind,
    pub format: ArtifactFormat,
}

impl ArtifactKind {
    pub fn directory(&self) -> &'static str {
        self.operation.directory()
    }

    /// Filename suffix appended to the fingerprint, e.g. `_core.stl`.
    pub fn suffix(&self) -> String {
        format!(
            "{}.{}",
            self.operation.file_stem(),
            self.format.extension()
        )
    }

    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}{}", self.suffix())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.operation.as_str(), self.format.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Succeeded,
    FailedTransient,
    FailedPermanent,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Succeeded => "succeeded",
            JobState::FailedTransient => "failed_transient",
            JobState::FailedPermanent => "failed_permanent",
        }
    }
}
