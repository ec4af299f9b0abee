use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Format used for `Step::created_at`, e.g. `17/10/2026, 14:03:22`.
pub const CREATED_AT_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(Uuid);

impl ScenarioId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ScenarioId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(Uuid);

impl StepId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidentialityLevel {
    Public,
    Internal,
    Confidential,
    RestrictedConfidential,
    Secret,
}

impl ConfidentialityLevel {
    pub const ALL: [ConfidentialityLevel; 5] = [
        ConfidentialityLevel::Public,
        ConfidentialityLevel::Internal,
        ConfidentialityLevel::Confidential,
        ConfidentialityLevel::RestrictedConfidential,
        ConfidentialityLevel::Secret,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ConfidentialityLevel::Public => "Public",
            ConfidentialityLevel::Internal => "Internal",
            ConfidentialityLevel::Confidential => "Confidential",
            ConfidentialityLevel::RestrictedConfidential => "Restricted Confidential",
            ConfidentialityLevel::Secret => "Secret",
        }
    }

    /// Text stamped diagonally across every page.
    pub fn watermark_text(&self) -> String {
        self.label().to_uppercase()
    }
}

impl Default for ConfidentialityLevel {
    fn default() -> Self {
        ConfidentialityLevel::Public
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    NotOk,
    Pending,
}

impl StepStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StepStatus::Ok => "OK",
            StepStatus::NotOk => "NOT OK",
            StepStatus::Pending => "PENDING",
        }
    }
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Pending
    }
}

/// Reference to an image: a file-system style path (or URL-like string) or
/// an inline `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ImageSource {
    Path(String),
    Inline(String),
}

impl ImageSource {
    pub fn as_str(&self) -> &str {
        match self {
            ImageSource::Path(value) | ImageSource::Inline(value) => value,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ImageSource::Inline(_))
    }

    /// Short, log-safe description; inline payloads are not echoed.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(path) => path.clone(),
            ImageSource::Inline(uri) => {
                let header = uri.split(',').next().unwrap_or("data:");
                format!("{header},<{} bytes>", uri.len())
            }
        }
    }
}

impl From<&str> for ImageSource {
    fn from(value: &str) -> Self {
        if value.trim_start().starts_with("data:") {
            ImageSource::Inline(value.trim().to_string())
        } else {
            ImageSource::Path(value.to_string())
        }
    }
}

impl From<String> for ImageSource {
    fn from(value: String) -> Self {
        ImageSource::from(value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub id: StepId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: StepStatus,
    pub created_at: String,
    #[serde(default)]
    pub image: Option<ImageSource>,
}

impl Step {
    /// Creates a step and stamps `created_at` with the current local time.
    /// The timestamp is never recomputed afterwards.
    pub fn new(description: impl Into<String>, status: StepStatus) -> Self {
        let created_at = chrono::Local::now().format(CREATED_AT_FORMAT).to_string();
        Self::with_created_at(description, status, created_at)
    }

    pub fn with_created_at(
        description: impl Into<String>,
        status: StepStatus,
        created_at: impl Into<String>,
    ) -> Self {
        Self {
            id: StepId::new(),
            description: description.into(),
            status,
            created_at: created_at.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<ImageSource>) -> Self {
        self.image = Some(image.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub id: ScenarioId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: ScenarioId::new(),
            description: description.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }
}

/// Complete input of one render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub work_item_id: String,
    #[serde(default)]
    pub tester_name: String,
    #[serde(default)]
    pub confidentiality: ConfidentialityLevel,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default)]
    pub header_logo_a: Option<ImageSource>,
    #[serde(default)]
    pub header_logo_b: Option<ImageSource>,
}

impl Record {
    pub fn new(
        work_item_id: impl Into<String>,
        tester_name: impl Into<String>,
        confidentiality: ConfidentialityLevel,
    ) -> Self {
        Self {
            work_item_id: work_item_id.into(),
            tester_name: tester_name.into(),
            confidentiality,
            scenarios: Vec::new(),
            header_logo_a: None,
            header_logo_b: None,
        }
    }

    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    pub fn with_logos(
        mut self,
        logo_a: impl Into<ImageSource>,
        logo_b: impl Into<ImageSource>,
    ) -> Self {
        self.header_logo_a = Some(logo_a.into());
        self.header_logo_b = Some(logo_b.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn step_count(&self) -> usize {
        self.scenarios.iter().map(|scenario| scenario.steps.len()).sum()
    }

    /// Ids that appear more than once across scenarios and steps.
    /// Layout is order-based, so duplicates only matter for traceability.
    pub fn duplicate_ids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        let ids = self.scenarios.iter().flat_map(|scenario| {
            std::iter::once(scenario.id.as_uuid())
                .chain(scenario.steps.iter().map(|step| step.id.as_uuid()))
        });
        for id in ids {
            if !seen.insert(id) && !duplicates.contains(&id) {
                duplicates.push(id);
            }
        }
        duplicates
    }
}
