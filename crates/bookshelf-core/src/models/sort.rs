use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BookshelfError;

/// Ordering applied to catalog listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortCriteria {
    /// Store order (insertion order of ids).
    #[default]
    None,
    TitleAsc,
    TitleDesc,
    AuthorAsc,
    AuthorDesc,
    RatingAsc,
    RatingDesc,
}

impl SortCriteria {
    pub const ALL: [SortCriteria; 7] = [
        Self::None,
        Self::TitleAsc,
        Self::TitleDesc,
        Self::AuthorAsc,
        Self::AuthorDesc,
        Self::RatingAsc,
        Self::RatingDesc,
    ];

    /// `ORDER BY` clause for the `books` table. Text columns compare without
    /// case, matching the case-insensitive filters; ties fall back to id.
    pub(crate) fn order_by(self) -> &'static str {
        match self {
            Self::None => "ORDER BY id ASC",
            Self::TitleAsc => "ORDER BY title COLLATE NOCASE ASC, id ASC",
            Self::TitleDesc => "ORDER BY title COLLATE NOCASE DESC, id ASC",
            Self::AuthorAsc => "ORDER BY author COLLATE NOCASE ASC, id ASC",
            Self::AuthorDesc => "ORDER BY author COLLATE NOCASE DESC, id ASC",
            Self::RatingAsc => "ORDER BY rating ASC, id ASC",
            Self::RatingDesc => "ORDER BY rating DESC, id ASC",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::TitleAsc => "title-asc",
            Self::TitleDesc => "title-desc",
            Self::AuthorAsc => "author-asc",
            Self::AuthorDesc => "author-desc",
            Self::RatingAsc => "rating-asc",
            Self::RatingDesc => "rating-desc",
        }
    }
}

impl std::fmt::Display for SortCriteria {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortCriteria {
    type Err = BookshelfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|criteria| criteria.name() == normalized)
            .ok_or_else(|| BookshelfError::ValidationError(format!("Invalid sort criteria: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for criteria in SortCriteria::ALL {
            assert_eq!(criteria.to_string().parse::<SortCriteria>().unwrap(), criteria);
        }
        assert_eq!("TITLE_ASC".parse::<SortCriteria>().unwrap(), SortCriteria::TitleAsc);
        assert!("by-year".parse::<SortCriteria>().is_err());
    }
}
