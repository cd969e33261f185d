//! Service metadata exchanged with the broker

use chrono::Local;
use serde::{ Deserialize, Serialize };
use serde_json::Value;

/// Format of `activationDate`
pub const ACTIVATION_DATE_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Description of a published service.
///
/// The broker indexes services by `methodName`, which it assigns when the
/// service registers; the name is read back from discovery results but never
/// sent, so a republished service does not claim its old name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetadata {
    #[serde(default)]
    title: String,
    #[serde(default)]
    owner: String,
    #[serde(default)]
    application_field: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    activation_date: String,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default, alias = "method", skip_serializing)]
    method_name: Option<String>,
}

impl ServiceMetadata {
    /// Metadata for a new service, activated now
    pub fn new(title: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            owner: owner.into(),
            application_field: None,
            description: None,
            activation_date: Local::now().format(ACTIVATION_DATE_FORMAT).to_string(),
            signature: None,
            keywords: Vec::new(),
            method_name: None,
        }
    }

    /// Decode one entry of a discovery result
    pub fn from_json(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn application_field(&self) -> Option<&str> {
        self.application_field.as_deref()
    }

    pub fn set_application_field(&mut self, field: impl Into<String>) {
        self.application_field = Some(field.into());
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn activation_date(&self) -> &str {
        &self.activation_date
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn set_signature(&mut self, signature: impl Into<String>) {
        self.signature = Some(signature.into());
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn set_keywords(&mut self, keywords: Vec<String>) {
        self.keywords = keywords;
    }

    pub fn add_keyword(&mut self, keyword: impl Into<String>) {
        self.keywords.push(keyword.into());
    }

    /// Name assigned by the broker, once registered
    pub fn method_name(&self) -> Option<&str> {
        self.method_name.as_deref()
    }

    pub(crate) fn set_method_name(&mut self, method: impl Into<String>) {
        self.method_name = Some(method.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use serde_json::json;

    #[test]
    fn test_activation_date_is_set_once() {
        let meta = ServiceMetadata::new("sum", "alice");
        assert!(NaiveDateTime::parse_from_str(meta.activation_date(), ACTIVATION_DATE_FORMAT).is_ok());
        assert!(meta.method_name().is_none());
    }

    #[test]
    fn test_json_uses_camel_case() {
        let mut meta = ServiceMetadata::new("sum", "alice");
        meta.set_application_field("math");
        meta.add_keyword("add");
        meta.add_keyword("numbers");

        let value = meta.to_json();
        assert_eq!(value["applicationField"], json!("math"));
        assert_eq!(value["keywords"], json!(["add", "numbers"]));
        assert_eq!(value["description"], Value::Null);
        assert!(value.get("methodName").is_none());
    }

    #[test]
    fn test_decode_discovery_entry() {
        let entry = json!({
            "title": "sum",
            "owner": "alice",
            "activationDate": "2024/01/02 03:04:05",
            "keywords": ["add"],
            "method": "sum1"
        });
        let meta = ServiceMetadata::from_json(&entry).unwrap();
        assert_eq!(meta.method_name(), Some("sum1"));
        assert_eq!(meta.activation_date(), "2024/01/02 03:04:05");
        assert_eq!(meta.keywords(), ["add".to_string()]);
        assert!(meta.signature().is_none());

        let renamed = json!({ "title": "t", "owner": "o", "methodName": "t" });
        assert_eq!(ServiceMetadata::from_json(&renamed).unwrap().method_name(), Some("t"));

        assert!(ServiceMetadata::from_json(&json!("not an object")).is_none());
    }
}
