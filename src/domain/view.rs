use serde::Serialize;
use serde_json::Value;

/// What the thin front end shows the user: a template to render, or a redirect.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    Render { template: String, context: Value },
    Redirect { location: String },
}

impl View {
    pub fn render(template: impl Into<String>, context: Value) -> Self {
        Self::Render {
            template: template.into(),
            context,
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }

    pub fn template(&self) -> Option<&str> {
        match self {
            Self::Render { template, .. } => Some(template),
            Self::Redirect { .. } => None,
        }
    }

    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Render { .. } => None,
            Self::Redirect { location } => Some(location),
        }
    }
}
