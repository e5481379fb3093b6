//! Joined dataset entity (spec §3 "Dataset entities").

use serde::{Deserialize, Serialize};

/// Recognized title types (spec §4.5 "Titles whose `titleType` is not
/// in the recognized-type mapping are counted but not emitted").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleType {
    Movie,
    Series,
    Short,
}

impl TitleType {
    /// Map a raw `titleType` column value to a recognized type, or
    /// `None` if it falls outside the mapping.
    pub fn from_raw(raw: &str) -> Option<Self> {
        match raw {
            "movie" | "tvMovie" => Some(TitleType::Movie),
            "tvSeries" | "tvMiniSeries" => Some(TitleType::Series),
            "short" | "tvShort" => Some(TitleType::Short),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TitleType::Movie => "movie",
            TitleType::Series => "series",
            TitleType::Short => "short",
        }
    }
}

/// One joined (basics ⋈ ratings) title, post-filter (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub id: String,
    #[serde(rename = "type")]
    pub title_type: TitleType,
    pub title: String,
    pub start_year: Option<u16>,
    pub end_year: Option<u16>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    pub is_adult: bool,
    pub rating: f32,
    pub votes: u64,
}

impl Title {
    /// The decade bucket this title belongs to, if it has a start
    /// year (spec §4.5 "Per-decade list").
    pub fn decade(&self) -> Option<u16> {
        self.start_year.map(|y| (y / 10) * 10)
    }
}
