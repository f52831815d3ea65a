use crate::facts::SchemaFacts;
use crate::profile::LanguageProfile;
use crate::type_expr::TypeExpr;
use crate::type_expr::TypeExprError;
use tera::Tera;
use thiserror::Error;

type Result<T> = std::result::Result<T, ResolveError>;

/// Which representation of a type a template asked for: the target
/// language's native token, or the schema-facing name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeClass {
    Native,
    Schema,
}

impl TypeClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "Native",
            Self::Schema => "Schema",
        }
    }
}

/// Recursive descent over a type expression, rendering each layer
/// through a `{class}{key}` fragment template. Pure function of its
/// inputs; safe to call concurrently from multiple generation units
/// against the same shared facts.
pub struct TypeResolver<'a> {
    facts: &'a SchemaFacts,
    profile: &'a LanguageProfile,
    fragments: &'a Tera,
}

impl<'a> TypeResolver<'a> {
    pub fn new(facts: &'a SchemaFacts, profile: &'a LanguageProfile, fragments: &'a Tera) -> Self {
        Self {
            facts,
            profile,
            fragments,
        }
    }

    /// Accepts either a bare type-name token or a full type expression.
    pub fn render_text(
        &self,
        class: TypeClass,
        text: &str,
        package: Option<&str>,
    ) -> Result<String> {
        let expr = TypeExpr::parse(text)?;
        self.render(class, &expr, package)
    }

    pub fn render(
        &self,
        class: TypeClass,
        expr: &TypeExpr,
        package: Option<&str>,
    ) -> Result<String> {
        match expr {
            TypeExpr::Named(name) => self.render_named(class, name, package),
            TypeExpr::NonNull(inner) => self.render_wrapper(class, "NonNull", inner, package),
            TypeExpr::List(inner) => self.render_wrapper(class, "List", inner, package),
        }
    }

    fn render_named(&self, class: TypeClass, name: &str, package: Option<&str>) -> Result<String> {
        // A `*`-prefixed qualifier marks pointer rendering for scalar
        // tokens; the remainder qualifies user-defined type names.
        let (star, package) = split_pointer_marker(package);

        if let Some(token) = self.profile.scalar(name) {
            let rendered_name = match class {
                TypeClass::Native => format!("{star}{token}"),
                TypeClass::Schema => name.to_string(),
            };
            return self.render_fragment(
                format!("{}Named", class.as_str()),
                &rendered_name,
                package,
            );
        }

        let def = self
            .facts
            .lookup(name)
            .ok_or_else(|| ResolveError::UndefinedType {
                name: name.to_string(),
            })?;

        let qualified = match package {
            "" => def.name.clone(),
            pkg => format!("{pkg}.{}", def.name),
        };
        self.render_fragment(
            format!("{}{}", class.as_str(), def.kind.as_str()),
            &qualified,
            package,
        )
    }

    fn render_wrapper(
        &self,
        class: TypeClass,
        wrapper: &str,
        inner: &TypeExpr,
        package: Option<&str>,
    ) -> Result<String> {
        let resolved_inner = self.render(class, inner, package)?;

        let key = format!("{}{wrapper}", class.as_str());
        let mut context = tera::Context::new();
        context.insert("type", &resolved_inner);
        context.insert("package", package.unwrap_or(""));
        self.render_key(&key, &context)
    }

    fn render_fragment(&self, key: String, name: &str, package: &str) -> Result<String> {
        let mut context = tera::Context::new();
        context.insert("name", name);
        context.insert("package", package);
        self.render_key(&key, &context)
    }

    fn render_key(&self, key: &str, context: &tera::Context) -> Result<String> {
        self.fragments
            .render(key, context)
            .map_err(|err| match &err.kind {
                tera::ErrorKind::TemplateNotFound(_) => ResolveError::MissingFragment {
                    key: key.to_string(),
                },
                _ => ResolveError::FragmentRenderFailed {
                    key: key.to_string(),
                    err: Box::new(err),
                },
            })
    }
}

fn split_pointer_marker(package: Option<&str>) -> (&'static str, &str) {
    match package.unwrap_or("") {
        pkg if pkg.starts_with('*') => ("*", &pkg[1..]),
        pkg => ("", pkg),
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("type with name `{name}` is not defined")]
    UndefinedType {
        name: String,
    },

    #[error("no template fragment found for dispatch key `{key}`")]
    MissingFragment {
        key: String,
    },

    #[error("template fragment `{key}` failed to render: {err}")]
    FragmentRenderFailed {
        key: String,
        err: Box<tera::Error>,
    },

    #[error(transparent)]
    InvalidTypeExpr(#[from] TypeExprError),
}
