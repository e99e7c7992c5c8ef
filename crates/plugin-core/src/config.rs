use serde::{Deserialize, Deserializer, Serialize};

use crate::error::PipelineError;

/// `error.forward_umo` value meaning "send to every id in `admins_id`".
pub const ADMIN_SET: &str = "admin-set";
const ADMIN_SET_LEGACY: &str = "admin";

/// Shaping options shared by every pipeline step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub parse_at: ParseAtConfig,
    pub at_prob: f64,
    pub error: ErrorConfig,
    #[serde(deserialize_with = "string_list")]
    pub admins_id: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseAtConfig {
    /// Substitute a real mention once a fake one has been stripped.
    pub enable: bool,
    /// Substitute `@name ` text instead of a native mention segment.
    pub at_str: bool,
}

impl Default for ParseAtConfig {
    fn default() -> Self {
        Self {
            enable: true,
            at_str: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorConfig {
    pub keywords: Vec<String>,
    /// Empty means the reply is dropped instead of replaced.
    pub custom_msg: String,
    pub forward_umo: String,
}

impl ErrorConfig {
    #[must_use]
    pub fn forwards_to_admins(&self) -> bool {
        let target = self.forward_umo.trim();
        target == ADMIN_SET || target == ADMIN_SET_LEGACY
    }
}

impl PipelineConfig {
    pub fn from_value(value: serde_yaml::Value) -> Result<Self, PipelineError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let cfg: Self = serde_yaml::from_value(value)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(0.0..=1.0).contains(&self.at_prob) {
            return Err(PipelineError::InvalidConfig(format!(
                "at_prob must be within [0, 1], got {}",
                self.at_prob
            )));
        }
        if self.error.forwards_to_admins() && self.admins_id.is_empty() {
            tracing::warn!(
                "error.forward_umo targets the admin set but admins_id is empty; keyword hits will fail"
            );
        }
        Ok(())
    }
}

/// Operator ids are often numeric in YAML; keep them as strings either way.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Int(i64),
    }

    let ids = Vec::<Id>::deserialize(deserializer)?;
    Ok(ids
        .into_iter()
        .map(|id| match id {
            Id::Str(s) => s,
            Id::Int(n) => n.to_string(),
        })
        .collect())
}
