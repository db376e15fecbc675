use serde::{Deserialize, Serialize};

pub const TITLE_MAX_LEN: usize = 45;
pub const DESCRIPTION_MAX_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    #[default]
    Unknown,
    Electronics,
    Cd,
}

impl ItemType {
    /// Numeric code carried over from the legacy catalogue
    pub fn legacy_code(&self) -> i64 {
        match self {
            ItemType::Unknown => 1,
            ItemType::Electronics => 2,
            ItemType::Cd => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Unknown => "UNKNOWN",
            ItemType::Electronics => "ELECTRONICS",
            ItemType::Cd => "CD",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "UNKNOWN" => Some(ItemType::Unknown),
            "ELECTRONICS" => Some(ItemType::Electronics),
            "CD" => Some(ItemType::Cd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl StockItem {
    pub fn new(item_type: ItemType, title: String, description: Option<String>) -> Self {
        Self {
            id: None,
            item_type,
            title,
            description,
        }
    }

    /// Column constraints of the `stock_item` table
    pub fn validate(&self) -> Result<(), String> {
        if self.title.is_empty() {
            return Err("title must not be empty".to_string());
        }
        if self.title.chars().count() > TITLE_MAX_LEN {
            return Err(format!("title must be at most {} characters", TITLE_MAX_LEN));
        }
        if let Some(description) = &self.description {
            if description.chars().count() > DESCRIPTION_MAX_LEN {
                return Err(format!(
                    "description must be at most {} characters",
                    DESCRIPTION_MAX_LEN
                ));
            }
        }
        Ok(())
    }
}
