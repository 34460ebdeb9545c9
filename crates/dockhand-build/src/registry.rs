//! Public URL of a pushed image.

use thiserror::Error;

pub use dockhand_core::DEFAULT_REGISTRY_URL_TEMPLATE;

const OWNER: &str = "{owner}";
const REPOSITORY: &str = "{repository}";

/// Template turning `owner` and `repository` into a browsable registry URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUrlFormat {
    template: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("registry URL template must contain {0}")]
pub struct MissingPlaceholder(pub &'static str);

impl RegistryUrlFormat {
    pub fn new(template: impl Into<String>) -> Result<Self, MissingPlaceholder> {
        let template = template.into();
        for placeholder in [OWNER, REPOSITORY] {
            if !template.contains(placeholder) {
                return Err(MissingPlaceholder(placeholder));
            }
        }
        Ok(Self { template })
    }

    pub fn format(&self, owner: &str, repository: &str) -> String {
        self.template
            .replace(OWNER, owner)
            .replace(REPOSITORY, repository)
    }
}

impl Default for RegistryUrlFormat {
    fn default() -> Self {
        Self {
            template: DEFAULT_REGISTRY_URL_TEMPLATE.to_string(),
        }
    }
}
