use serde::Deserialize;

pub const DEFAULT_TOP: u32 = 3;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Per-request options. Every field is optional; zero, empty and absent
/// values all resolve to the documented defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Overrides {
    /// Truthy turns captions *off*. Long-standing client contract.
    pub semantic_captions: Option<bool>,
    pub top: Option<u32>,
    pub exclude_category: Option<String>,
    pub semantic_ranker: Option<bool>,
    pub prompt_template: Option<String>,
    pub temperature: Option<f32>,
}

impl Overrides {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn use_semantic_captions(&self) -> bool {
        !self.semantic_captions.unwrap_or(false)
    }

    pub fn top(&self) -> u32 {
        self.top.filter(|&t| t > 0).unwrap_or(DEFAULT_TOP)
    }

    /// OData filter excluding one category, with `'` doubled per OData quoting.
    pub fn category_filter(&self) -> Option<String> {
        self.exclude_category
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| format!("category ne '{}'", c.replace('\'', "''")))
    }

    pub fn semantic_ranker(&self) -> bool {
        self.semantic_ranker.unwrap_or(false)
    }

    pub fn prompt_template(&self) -> Option<&str> {
        self.prompt_template.as_deref().filter(|t| !t.is_empty())
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
            .filter(|&t| t != 0.0)
            .unwrap_or(DEFAULT_TEMPERATURE)
    }
}
