use serde::ser::{Serialize, SerializeMap, Serializer};

/// Number of severity levels the classifier emits.
pub const NUM_CLASSES: usize = 5;

/// Severity labels in class-index order.
pub const CLASSES: [&str; NUM_CLASSES] = ["No DR", "Mild", "Moderate", "Severe", "Proliferative DR"];

/// Clinical risk attached to a severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum RiskTier {
    Low,
    #[serde(rename = "Low-Medium")]
    LowMedium,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low",
            RiskTier::LowMedium => "Low-Medium",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
            RiskTier::Critical => "Critical",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable description of one severity level.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct SeverityRecord {
    pub level: &'static str,
    pub description: &'static str,
    pub recommendation: &'static str,
    pub color: &'static str,
    pub risk: RiskTier,
}

pub static SEVERITY_TABLE: [SeverityRecord; NUM_CLASSES] = [
    SeverityRecord {
        level: "No DR",
        description: "No signs of diabetic retinopathy detected.",
        recommendation: "Continue regular eye examinations and maintain good blood sugar control.",
        color: "#10b981",
        risk: RiskTier::Low,
    },
    SeverityRecord {
        level: "Mild",
        description: "Mild non-proliferative diabetic retinopathy detected.",
        recommendation: "Schedule a follow-up examination within 6-12 months. Maintain strict blood sugar control.",
        color: "#3b82f6",
        risk: RiskTier::LowMedium,
    },
    SeverityRecord {
        level: "Moderate",
        description: "Moderate non-proliferative diabetic retinopathy detected.",
        recommendation: "Consult with an ophthalmologist within 3-6 months. Close monitoring required.",
        color: "#f59e0b",
        risk: RiskTier::Medium,
    },
    SeverityRecord {
        level: "Severe",
        description: "Severe non-proliferative diabetic retinopathy detected.",
        recommendation: "Immediate consultation with a retinal specialist required. Treatment may be necessary.",
        color: "#ef4444",
        risk: RiskTier::High,
    },
    SeverityRecord {
        level: "Proliferative DR",
        description: "Proliferative diabetic retinopathy detected.",
        recommendation: "Urgent medical attention required. Immediate treatment necessary to prevent vision loss.",
        color: "#dc2626",
        risk: RiskTier::Critical,
    },
];

/// Look up the record for `index`, falling back to level 0 when the index
/// is outside the table.
pub fn severity_info(index: usize) -> &'static SeverityRecord {
    SEVERITY_TABLE.get(index).unwrap_or(&SEVERITY_TABLE[0])
}

/// Per-class percentages, serialized as a JSON object in class-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities(Vec<(&'static str, f64)>);

impl ClassProbabilities {
    pub fn new(entries: Vec<(&'static str, f64)>) -> Self {
        Self(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, f64)> {
        self.0.iter()
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, pct) in &self.0 {
            map.serialize_entry(label, pct)?;
        }
        map.end()
    }
}

/// Outcome of one prediction request.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PredictionResult {
    pub severity_value: usize,
    pub severity_class: &'static str,
    /// Percentage, rounded to 2 decimals
    pub confidence: f64,
    pub probabilities: ClassProbabilities,
    pub info: SeverityRecord,
}
