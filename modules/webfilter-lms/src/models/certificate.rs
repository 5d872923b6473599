use serde_json::{Map, Value};

/// What the certificate page is about to be rendered with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CertificateRender {
    pub context: Map<String, Value>,
    pub custom_template: Option<String>,
}

impl CertificateRender {
    pub fn new(context: Map<String, Value>) -> Self {
        Self {
            context,
            custom_template: None,
        }
    }
}
