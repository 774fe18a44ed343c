use std::fmt::Display;

/// A single value in an inventory table.
///
/// Source files are read as text; the quantity and unit price columns are
/// then coerced to [`Cell::Number`] (or [`Cell::Missing`] when the text isn't
/// a number). Empty fields, and fields spelling out a missing value such as
/// `NA`, `N/A`, `null` or `nan` (see [`NA_VALUES`]), load as [`Cell::Missing`].
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Cell {
    #[default]
    Missing,
    Text(String),
    Number(f64),
}

/// Field values read as missing. Matching is exact and case-sensitive.
pub const NA_VALUES: [&str; 19] = [
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

impl Cell {
    /// Creates a text cell from a raw CSV field, treating empty fields and
    /// [`NA_VALUES`] as missing.
    #[must_use]
    pub fn from_field(field: &str) -> Self {
        if NA_VALUES.contains(&field) {
            Self::Missing
        } else {
            Self::Text(field.to_string())
        }
    }

    /// Converts the cell to a number, leniently.
    ///
    /// Numbers stay as they are, text is parsed with [`parse_or_missing`], and
    /// anything else becomes [`Cell::Missing`].
    #[must_use]
    pub fn into_numeric(self) -> Self {
        match self {
            Self::Text(s) => parse_or_missing(&s).map_or(Self::Missing, Self::Number),
            Self::Number(n) if n.is_nan() => Self::Missing,
            other => other,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

/// Formats the cell the way it's written to CSV: missing cells are empty.
impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Text(s) => f.pad(s),
            Self::Number(n) => f.pad(&n.to_string()),
        }
    }
}

/// Parses `s` as a number, returning `None` for anything that isn't one.
///
/// Surrounding whitespace is ignored. Empty strings and `NaN` are treated as
/// missing.
///
/// # Examples
///
/// ```
/// # use stock::parse_or_missing;
/// assert_eq!(parse_or_missing(" 12 "), Some(12.0));
/// assert_eq!(parse_or_missing("0.99"), Some(0.99));
/// assert_eq!(parse_or_missing("twelve"), None);
/// assert_eq!(parse_or_missing(""), None);
/// ```
#[must_use]
pub fn parse_or_missing(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}
