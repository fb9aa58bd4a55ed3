use std::{fmt, str::FromStr};

/// One item a user rated, as persisted in the json collection.
#[derive(Clone, Debug, PartialEq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RatedItem {
    pub title_ru: String,
    pub title_orig: Option<String>,
    pub rating: u8,
    pub year: Option<String>,
    pub details_url: String,
    /// Only filled in for films
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    /// Fields an older or newer dump wrote that this version does not know about
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Subject {
    Films,
    Books,
    Games,
    Serials,
}

impl Subject {
    pub const ALL: [Subject; 4] = [
        Subject::Films,
        Subject::Books,
        Subject::Games,
        Subject::Serials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Films => "films",
            Subject::Books => "books",
            Subject::Games => "games",
            Subject::Serials => "serials",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subject::ALL
            .into_iter()
            .find(|subject| subject.as_str() == s)
            .ok_or_else(|| {
                let known = Subject::ALL.map(|subject| subject.as_str()).join(", ");

                format!("unknown subject `{}`, expected one of: {}", s, known)
            })
    }
}
