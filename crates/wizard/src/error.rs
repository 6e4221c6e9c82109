//! Wizard error types.

use thiserror::Error;

/// The five request sections validated against allow-lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Filter,
    Sort,
    Include,
    Field,
    Append,
}

impl QueryKind {
    /// Plural noun used in messages and logs.
    pub fn plural(self) -> &'static str {
        match self {
            QueryKind::Filter => "filters",
            QueryKind::Sort => "sorts",
            QueryKind::Include => "includes",
            QueryKind::Field => "fields",
            QueryKind::Append => "appends",
        }
    }
}

/// Wizard errors.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error(
        "requested filter(s) `{}` are not allowed, allowed filter(s) are `{}`",
        .unknown.join(", "),
        .allowed.join(", ")
    )]
    InvalidFilterQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    #[error(
        "requested sort(s) `{}` are not allowed, allowed sort(s) are `{}`",
        .unknown.join(", "),
        .allowed.join(", ")
    )]
    InvalidSortQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    #[error(
        "requested include(s) `{}` are not allowed, allowed include(s) are `{}`",
        .unknown.join(", "),
        .allowed.join(", ")
    )]
    InvalidIncludeQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    #[error(
        "requested field(s) `{}` are not allowed, allowed field(s) are `{}`",
        .unknown.join(", "),
        .allowed.join(", ")
    )]
    InvalidFieldQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    #[error(
        "requested append(s) `{}` are not allowed, allowed append(s) are `{}`",
        .unknown.join(", "),
        .allowed.join(", ")
    )]
    InvalidAppendQuery {
        unknown: Vec<String>,
        allowed: Vec<String>,
    },

    #[error("query failed: {0:#}")]
    Query(#[from] anyhow::Error),
}

impl WizardError {
    /// Build the validation error for `kind`.
    pub fn invalid(kind: QueryKind, unknown: Vec<String>, allowed: Vec<String>) -> Self {
        match kind {
            QueryKind::Filter => WizardError::InvalidFilterQuery { unknown, allowed },
            QueryKind::Sort => WizardError::InvalidSortQuery { unknown, allowed },
            QueryKind::Include => WizardError::InvalidIncludeQuery { unknown, allowed },
            QueryKind::Field => WizardError::InvalidFieldQuery { unknown, allowed },
            QueryKind::Append => WizardError::InvalidAppendQuery { unknown, allowed },
        }
    }

    /// The section a validation error refers to.
    pub fn kind(&self) -> Option<QueryKind> {
        match self {
            WizardError::InvalidFilterQuery { .. } => Some(QueryKind::Filter),
            WizardError::InvalidSortQuery { .. } => Some(QueryKind::Sort),
            WizardError::InvalidIncludeQuery { .. } => Some(QueryKind::Include),
            WizardError::InvalidFieldQuery { .. } => Some(QueryKind::Field),
            WizardError::InvalidAppendQuery { .. } => Some(QueryKind::Append),
            _ => None,
        }
    }

    /// Requested names that were not allowed.
    pub fn unknown(&self) -> &[String] {
        match self {
            WizardError::InvalidFilterQuery { unknown, .. }
            | WizardError::InvalidSortQuery { unknown, .. }
            | WizardError::InvalidIncludeQuery { unknown, .. }
            | WizardError::InvalidFieldQuery { unknown, .. }
            | WizardError::InvalidAppendQuery { unknown, .. } => unknown,
            _ => &[],
        }
    }

    /// Names that were allowed when validation failed.
    pub fn allowed(&self) -> &[String] {
        match self {
            WizardError::InvalidFilterQuery { allowed, .. }
            | WizardError::InvalidSortQuery { allowed, .. }
            | WizardError::InvalidIncludeQuery { allowed, .. }
            | WizardError::InvalidFieldQuery { allowed, .. }
            | WizardError::InvalidAppendQuery { allowed, .. } => allowed,
            _ => &[],
        }
    }
}

/// Result type alias using WizardError.
pub type WizardResult<T> = Result<T, WizardError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn invalid_maps_kind_to_variant() {
        let err = WizardError::invalid(
            QueryKind::Sort,
            vec!["age".to_string()],
            vec!["name".to_string(), "id".to_string()],
        );
        assert!(matches!(err, WizardError::InvalidSortQuery { .. }));
        assert_eq!(err.kind(), Some(QueryKind::Sort));
        assert_eq!(err.unknown(), ["age"]);
        assert_eq!(err.allowed(), ["name", "id"]);
    }

    #[test]
    fn message_lists_names() {
        let err = WizardError::invalid(
            QueryKind::Filter,
            vec!["a".to_string(), "b".to_string()],
            vec!["c".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "requested filter(s) `a, b` are not allowed, allowed filter(s) are `c`"
        );
    }

    #[test]
    fn query_errors_have_no_lists() {
        let err = WizardError::from(anyhow::anyhow!("engine offline"));
        assert_eq!(err.kind(), None);
        assert!(err.unknown().is_empty());
        assert!(err.to_string().contains("engine offline"));
    }
}
