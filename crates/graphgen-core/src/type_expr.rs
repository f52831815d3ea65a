use thiserror::Error;

type Result<T> = std::result::Result<T, TypeExprError>;

/// A possibly-wrapped reference to a named type, mirroring the SDL
/// grammar `Type`, `Type!`, `[Type]`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeExpr {
    Named(String),
    NonNull(Box<TypeExpr>),
    List(Box<TypeExpr>),
}

impl TypeExpr {
    /// Parses a raw type-reference text. Each step trims the wrapping
    /// punctuation and recurses on the strictly smaller remainder, so
    /// parsing always terminates.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(TypeExprError::Empty);
        }

        if let Some(inner) = trimmed.strip_suffix('!') {
            return Ok(Self::NonNull(Box::new(Self::parse(inner)?)));
        }

        if let Some(inner) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            return Ok(Self::List(Box::new(Self::parse(inner)?)));
        }

        if is_name(trimmed) {
            return Ok(Self::Named(trimmed.to_string()));
        }

        Err(TypeExprError::Malformed {
            text: text.to_string(),
        })
    }

    /// The innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::NonNull(inner) | Self::List(inner) => inner.named_type(),
        }
    }

    /// Number of `NonNull`/`List` wrappers around the named type.
    pub fn depth(&self) -> usize {
        match self {
            Self::Named(_) => 0,
            Self::NonNull(inner) | Self::List(inner) => 1 + inner.depth(),
        }
    }
}

impl std::fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::NonNull(inner) => write!(f, "{inner}!"),
            Self::List(inner) => write!(f, "[{inner}]"),
        }
    }
}

fn is_name(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, Error, PartialEq)]
pub enum TypeExprError {
    #[error("empty type expression")]
    Empty,

    #[error("malformed type expression: `{text}`")]
    Malformed {
        text: String,
    },
}
