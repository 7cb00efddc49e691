//! Administration menu links.

use serde::Serialize;

/// One entry in an admin panel menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminLink {
    pub url: String,
    pub text: String,
    /// Icon class for the menu renderer.
    pub icon: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<AdminLink>,
}

impl AdminLink {
    pub fn new(url: impl Into<String>, text: impl Into<String>, icon: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
            icon: icon.into(),
            links: Vec::new(),
        }
    }

    /// Attach a sub-link.
    pub fn with_link(mut self, link: AdminLink) -> Self {
        self.links.push(link);
        self
    }
}
