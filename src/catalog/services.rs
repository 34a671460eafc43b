use crate::model::ServiceEntry;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;

/// Catalog description of one third-party integration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub fields: Vec<FieldDef>,

    #[serde(default)]
    pub android: Option<AndroidFragments>,

    #[serde(default)]
    pub ios: Option<IosFragments>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDef {
    pub id: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub default: Option<String>,

    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AndroidFragments {
    pub meta_data: Vec<MetaDataSpec>,
    pub queries: Vec<ElementTemplate>,
    pub application_data: Vec<ElementTemplate>,
    pub string_resources: Vec<StringResourceSpec>,
}

/// `<meta-data android:name=… android:value=…/>` inside `<application>`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaDataSpec {
    pub name: String,

    #[serde(default)]
    pub value_field: Option<String>,

    /// Literal value used when no field supplies one
    #[serde(default)]
    pub value: Option<String>,

    /// Store the value in strings.xml and reference it as `@string/<name>`
    #[serde(default)]
    pub string_resource: Option<String>,

    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StringResourceSpec {
    pub name: String,
    pub value_field: String,
}

/// An XML element with `{fieldId}` placeholders in attribute values.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementTemplate {
    pub tag: String,

    #[serde(default)]
    pub attributes: AttributeList,

    #[serde(default)]
    pub children: Vec<ElementTemplate>,
}

impl ElementTemplate {
    /// The attribute used to recognise this element in a document:
    /// `android:authorities` first, then `android:name`, searched depth first.
    pub fn identity(&self) -> Option<(&str, &str)> {
        for key in ["android:authorities", "android:name"] {
            if let Some(value) = self.attributes.get(key) {
                return Some((key, value));
            }
        }
        self.children.iter().find_map(|c| c.identity())
    }

    /// Same as [`identity`](Self::identity) but restricted to this element's own attributes.
    pub fn own_identity(&self) -> Option<(&str, &str)> {
        ["android:authorities", "android:name"]
            .into_iter()
            .find_map(|key| self.attributes.get(key).map(|v| (key, v)))
    }
}

/// Attribute pairs in catalog order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList(pub Vec<(String, String)>);

impl AttributeList {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for AttributeList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = AttributeList;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of attribute names to string values")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut pairs = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, String>()? {
                    pairs.push((key, value));
                }
                Ok(AttributeList(pairs))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IosFragments {
    pub plist_entries: Vec<PlistEntrySpec>,
    pub url_schemes: Vec<UrlSchemeSpec>,
    pub entitlements: Vec<EntitlementSpec>,
    pub app_delegate: Option<AppDelegateSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlistValueKind {
    String,
    Boolean,
    Array,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum StaticValue {
    Flag(bool),
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlistEntrySpec {
    pub key: String,

    #[serde(rename = "type")]
    pub kind: PlistValueKind,

    #[serde(default)]
    pub value_field: Option<String>,

    #[serde(default)]
    pub value: Option<StaticValue>,

    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlSchemeSpec {
    pub value_field: String,

    #[serde(default)]
    pub prefix: Option<String>,
}

/// An array-valued entitlement such as associated domains.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSpec {
    pub key: String,

    #[serde(default)]
    pub value_field: Option<String>,

    #[serde(default)]
    pub values: Vec<String>,

    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppDelegateSpec {
    #[serde(default)]
    pub import: Option<String>,

    pub code: String,
}

impl ServiceConfig {
    pub fn field(&self, id: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Value for `field`: the entry's non-empty value, else the catalog default.
    pub fn resolve<'a>(&'a self, entry: &'a ServiceEntry, field: &str) -> Option<&'a str> {
        entry.value(field).or_else(|| {
            self.field(field)
                .and_then(|f| f.default.as_deref())
                .filter(|v| !v.is_empty())
        })
    }

    /// Whether any declared field resolves differently for the two entries.
    pub fn values_differ(&self, a: &ServiceEntry, b: &ServiceEntry) -> bool {
        self.fields.iter().any(|f| {
            self.resolve(a, &f.id).map(str::trim) != self.resolve(b, &f.id).map(str::trim)
        })
    }

    /// Substitute every `{fieldId}` in `template`. Unknown or empty fields
    /// become empty strings.
    pub fn fill(&self, template: &str, entry: &ServiceEntry) -> String {
        fill_placeholders(template, |field| self.resolve(entry, field).map(str::to_string))
    }

    /// Value of every field, entry values first then catalog defaults.
    pub fn defaults_entry(&self) -> ServiceEntry {
        let mut entry = ServiceEntry::new(self.id.clone());
        for field in &self.fields {
            if let Some(default) = field.default.as_deref().filter(|v| !v.is_empty()) {
                entry.values.insert(field.id.clone(), default.to_string());
            }
        }
        entry
    }
}

/// Field ids referenced as `{fieldId}` in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_field_id(&after[..close]) => {
                found.push(after[..close].to_string());
                rest = &after[close + 1..];
            }
            Some(_) => rest = after,
            None => break,
        }
    }
    found
}

/// Regex source matching any filled copy of `template`: literal text is
/// escaped and each `{fieldId}` becomes a single-line wildcard. With `named`,
/// the first occurrence of each field is a capture group named after it.
pub fn placeholder_pattern(template: &str, named: bool) -> String {
    let mut pattern = String::new();
    let mut seen: Vec<&str> = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_field_id(&after[..close]) => {
                let field = &after[..close];
                if named && !seen.contains(&field) {
                    pattern.push_str(&format!("(?P<{}>[^\\n\"]*?)", field));
                    seen.push(field);
                } else {
                    pattern.push_str("[^\\n\"]*?");
                }
                rest = &after[close + 1..];
            }
            _ => {
                pattern.push_str(r"\{");
                rest = after;
            }
        }
    }
    pattern.push_str(&regex::escape(rest));
    pattern
}

fn is_field_id(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Replace `{fieldId}` occurrences using `lookup`; braces that do not wrap a
/// field id are copied through untouched.
pub fn fill_placeholders<F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_field_id(&after[..close]) => {
                out.push_str(&lookup(&after[..close]).unwrap_or_default());
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_order_preserved() {
        let json = r#"{"tag": "activity", "attributes": {"android:name": "X", "android:exported": "true", "android:label": "{title}"}}"#;
        let el: ElementTemplate = serde_json::from_str(json).unwrap();
        let keys: Vec<_> = el.attributes.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["android:name", "android:exported", "android:label"]);
    }

    #[test]
    fn test_fill_placeholders() {
        let filled = fill_placeholders("fb{appId}://{missing} {not a field}", |f| {
            (f == "appId").then(|| "123".to_string())
        });
        assert_eq!(filled, "fb123:// {not a field}");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders(r#"GMSServices.provideAPIKey("{apiKey}") { {x} }"#),
            vec!["apiKey", "x"]
        );
    }

    #[test]
    fn test_identity_prefers_authorities() {
        let json = r#"{"tag": "provider", "attributes": {"android:name": "P", "android:authorities": "com.x.provider"}}"#;
        let el: ElementTemplate = serde_json::from_str(json).unwrap();
        assert_eq!(el.identity(), Some(("android:authorities", "com.x.provider")));
    }
}
