use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Closed set of task categories.
///
/// In memory this is a plain sum type. At the persistence boundary it is
/// written as its canonical tag (`"Work"`, `"Personal"`); decoding an
/// unrecognized tag falls back to [`Category::DEFAULT`] instead of failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Work,
    Personal,
}

/// Presentation color associated with a category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CategoryColor {
    Blue,
    Purple,
}

impl CategoryColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryColor::Blue => "blue",
            CategoryColor::Purple => "purple",
        }
    }
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Work, Category::Personal];

    /// Category used for new records when none is given and for stored tags
    /// that no longer decode.
    pub const DEFAULT: Category = Category::Personal;

    /// Canonical stored tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Work => "Work",
            Category::Personal => "Personal",
        }
    }

    /// Exact tag lookup. Returns `None` for anything that is not a canonical tag.
    pub fn parse_tag(tag: &str) -> Option<Category> {
        Category::ALL.into_iter().find(|c| c.as_str() == tag)
    }

    /// Fail-closed decode used when reading persisted data.
    pub fn from_tag(tag: &str) -> Category {
        match Category::parse_tag(tag) {
            Some(category) => category,
            None => {
                tracing::warn!(
                    tag = %tag,
                    fallback = %Category::DEFAULT,
                    "unrecognized category tag"
                );
                Category::DEFAULT
            }
        }
    }

    /// Symbol identifier for the category's icon.
    pub fn icon(&self) -> &'static str {
        match self {
            Category::Work => "briefcase.fill",
            Category::Personal => "person.fill",
        }
    }

    pub fn color(&self) -> CategoryColor {
        match self {
            Category::Work => CategoryColor::Blue,
            Category::Personal => CategoryColor::Purple,
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::DEFAULT
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tag = String::deserialize(deserializer)?;
        Ok(Category::from_tag(&tag))
    }
}
