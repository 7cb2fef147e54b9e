//! Parsing of `aapt dump xmltree` output into an XML document.
//!
//! The dump is an indentation-structured text rendering of a compiled
//! manifest: the leading whitespace width of each line encodes nesting
//! depth, and the first token names the kind of node -
//! `N:` declares a namespace, `E:` opens an element, `A:` attaches an
//! attribute to the innermost open element.
//!
//! [`parse_xml_tree`] turns a dump into an owned [`XmlDocument`];
//! [`AndroidManifest`] is the narrow view the test workflow needs: the
//! package name and the main launcher activity.
//!
//! # Example
//!
//! ```
//! use devicekit_core::android::manifest::{parse_xml_tree, AndroidManifest};
//!
//! let dump = "\
//! N: android=http://schemas.android.com/apk/res/android
//!   E: manifest (line=2)
//!     A: package=\"com.example.app\" (Raw: \"com.example.app\")
//! ";
//! let manifest = AndroidManifest::new(parse_xml_tree(dump).unwrap());
//! assert_eq!(manifest.package_name(), Some("com.example.app"));
//! ```

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// The namespace URI the `android:` prefix conventionally declares.
pub const ANDROID_NAMESPACE: &str = "http://schemas.android.com/apk/res/android";

/// The namespace URI for xmlns declaration attributes themselves.
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^N:\s*(?P<ns>[^=]+)=(?P<url>.*)$").expect("valid regex"));
static ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^E:\s*(?:(?P<ns>[^:]+):)?(?P<name>.*) \(line=\d+\)$").expect("valid regex")
});
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^A:\s*(?:(?P<ns>[^:]+):)?(?P<name>[^(]+)(?:\(.*\))?=(?P<value>.*)$")
        .expect("valid regex")
});
static RAW_VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?P<value>.*)"\s*\(Raw:.*\)"#).expect("valid regex"));

/// Errors raised while parsing a manifest dump; each names the failing line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("invalid namespace: {line}")]
    InvalidNamespace { line: String },

    #[error("invalid element: {line}")]
    InvalidElement { line: String },

    #[error("invalid attribute: {line}")]
    InvalidAttribute { line: String },

    #[error("unknown xml namespace '{prefix}': {line}")]
    UnknownNamespace { prefix: String, line: String },

    #[error("attribute outside of any element: {line}")]
    AttributeOutsideElement { line: String },
}

/// A parsed manifest dump.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlDocument {
    pub roots: Vec<XmlElement>,
}

impl XmlDocument {
    /// The document's first root element, when one was parsed.
    pub fn root(&self) -> Option<&XmlElement> {
        self.roots.first()
    }
}

/// An element with its resolved namespace, attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlElement {
    /// Resolved namespace URI, when the element name carried a prefix.
    pub namespace: Option<String>,
    pub name: String,
    pub attributes: Vec<XmlAttribute>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn new(namespace: Option<String>, name: String) -> Self {
        Self {
            namespace,
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// The first un-namespaced child with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children_named(name).next()
    }

    /// All un-namespaced children with the given name.
    pub fn children_named<'a, 'b>(&'a self, name: &'b str) -> impl Iterator<Item = &'a XmlElement> + 'b
    where
        'a: 'b,
    {
        self.children
            .iter()
            .filter(move |child| child.namespace.is_none() && child.name == name)
    }

    /// The value of the un-namespaced attribute with the given name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.namespace.is_none() && attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    /// The value of the attribute with the given namespace URI and name.
    pub fn attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.namespace.as_deref() == Some(namespace) && attr.name == name)
            .map(|attr| attr.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Resolved namespace URI, when the attribute name carried a prefix.
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

/// Parses a manifest dump into an [`XmlDocument`].
///
/// Maintains a stack of open elements with their recorded indent, starting
/// from a virtual root at indent 0. An element line closes every open
/// element whose recorded indent is at least as deep as its own, independent
/// of absolute indent width. Namespace declarations register the first
/// occurrence of a prefix only; using an undeclared prefix is an error.
pub fn parse_xml_tree(dump: &str) -> Result<XmlDocument, ManifestError> {
    let mut namespaces: Vec<(String, String)> = Vec::new();
    let mut roots: Vec<XmlElement> = Vec::new();
    let mut stack: Vec<(XmlElement, usize)> = Vec::new();
    let mut xmlns_attached = false;

    for raw in dump.lines() {
        let trimmed = raw.trim_start();
        if trimmed.is_empty() {
            continue;
        }
        let indent = raw.len() - trimmed.len();

        if trimmed.starts_with('N') {
            let caps = NAMESPACE_RE
                .captures(trimmed)
                .ok_or_else(|| ManifestError::InvalidNamespace {
                    line: raw.to_string(),
                })?;
            let prefix = caps["ns"].to_string();
            if !namespaces.iter().any(|(known, _)| *known == prefix) {
                namespaces.push((prefix, caps["url"].to_string()));
            }
        } else if trimmed.starts_with('E') {
            while stack
                .last()
                .is_some_and(|(_, recorded)| *recorded >= indent)
            {
                if let Some((closed, _)) = stack.pop() {
                    attach(&mut stack, &mut roots, closed);
                }
            }

            let caps = ELEMENT_RE
                .captures(trimmed)
                .ok_or_else(|| ManifestError::InvalidElement {
                    line: raw.to_string(),
                })?;
            let namespace =
                resolve_prefix(caps.name("ns").map(|m| m.as_str()), &namespaces, raw)?;
            let mut element = XmlElement::new(namespace, caps["name"].to_string());

            // The first element to land at the document level carries every
            // namespace declared so far as xmlns attributes.
            if stack.is_empty() && !xmlns_attached {
                for (prefix, url) in &namespaces {
                    element.attributes.push(XmlAttribute {
                        namespace: Some(XMLNS_NAMESPACE.to_string()),
                        name: prefix.clone(),
                        value: url.clone(),
                    });
                }
                xmlns_attached = true;
            }

            stack.push((element, indent));
        } else if trimmed.starts_with('A') {
            let caps = ATTRIBUTE_RE
                .captures(trimmed)
                .ok_or_else(|| ManifestError::InvalidAttribute {
                    line: raw.to_string(),
                })?;
            let namespace =
                resolve_prefix(caps.name("ns").map(|m| m.as_str()), &namespaces, raw)?;

            let raw_value = &caps["value"];
            let value = RAW_VALUE_RE
                .captures(raw_value)
                .map(|caps| caps["value"].to_string())
                .unwrap_or_else(|| raw_value.to_string());

            let Some((open, _)) = stack.last_mut() else {
                return Err(ManifestError::AttributeOutsideElement {
                    line: raw.to_string(),
                });
            };
            open.attributes.push(XmlAttribute {
                namespace,
                name: caps["name"].to_string(),
                value,
            });
        }
    }

    while let Some((closed, _)) = stack.pop() {
        attach(&mut stack, &mut roots, closed);
    }

    Ok(XmlDocument { roots })
}

fn attach(stack: &mut [(XmlElement, usize)], roots: &mut Vec<XmlElement>, closed: XmlElement) {
    match stack.last_mut() {
        Some((parent, _)) => parent.children.push(closed),
        None => roots.push(closed),
    }
}

fn resolve_prefix(
    prefix: Option<&str>,
    namespaces: &[(String, String)],
    line: &str,
) -> Result<Option<String>, ManifestError> {
    let Some(prefix) = prefix.filter(|p| !p.trim().is_empty()) else {
        return Ok(None);
    };
    namespaces
        .iter()
        .find(|(known, _)| known == prefix)
        .map(|(_, url)| Some(url.clone()))
        .ok_or_else(|| ManifestError::UnknownNamespace {
            prefix: prefix.to_string(),
            line: line.to_string(),
        })
}

/// Read-only projection of a parsed manifest dump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidManifest {
    document: XmlDocument,
}

impl AndroidManifest {
    pub fn new(document: XmlDocument) -> Self {
        Self { document }
    }

    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// The root element's `package` attribute.
    pub fn package_name(&self) -> Option<&str> {
        self.document.root()?.attribute("package")
    }

    /// The name of the first activity whose intent-filter carries both the
    /// MAIN action and the LAUNCHER category.
    pub fn main_launcher_activity(&self) -> Option<&str> {
        const MAIN_ACTION: &str = "android.intent.action.MAIN";
        const LAUNCHER_CATEGORY: &str = "android.intent.category.LAUNCHER";

        let application = self.document.root()?.child("application")?;
        application
            .children_named("activity")
            .find(|activity| {
                activity.children_named("intent-filter").any(|filter| {
                    filter.children_named("action").any(|action| {
                        action.attribute_ns(ANDROID_NAMESPACE, "name") == Some(MAIN_ACTION)
                    }) && filter.children_named("category").any(|category| {
                        category.attribute_ns(ANDROID_NAMESPACE, "name")
                            == Some(LAUNCHER_CATEGORY)
                    })
                })
            })
            .and_then(|activity| activity.attribute_ns(ANDROID_NAMESPACE, "name"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_line_registers_first_occurrence_only() {
        let dump = "\
N: android=http://schemas.android.com/apk/res/android
N: android=http://example.com/shadowed
  E: manifest (line=1)
    A: android:versionCode(0x0101021b)=(type 0x10)0x1
";
        let doc = parse_xml_tree(dump).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(
            root.attribute_ns(ANDROID_NAMESPACE, "versionCode"),
            Some("(type 0x10)0x1")
        );
    }

    #[test]
    fn xmlns_attributes_land_on_the_first_root_element() {
        let dump = "\
N: android=http://schemas.android.com/apk/res/android
  E: manifest (line=1)
    E: application (line=5)
";
        let doc = parse_xml_tree(dump).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(
            root.attribute_ns(XMLNS_NAMESPACE, "android"),
            Some(ANDROID_NAMESPACE)
        );
        assert!(root.child("application").unwrap().attributes.is_empty());
    }

    #[test]
    fn raw_decorated_values_are_unwrapped() {
        let dump = "\
  E: manifest (line=1)
    A: package=\"net.dot.devicetests\" (Raw: \"net.dot.devicetests\")
    A: platformBuildVersionCode=(type 0x10)0x1d
";
        let doc = parse_xml_tree(dump).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.attribute("package"), Some("net.dot.devicetests"));
        assert_eq!(
            root.attribute("platformBuildVersionCode"),
            Some("(type 0x10)0x1d")
        );
    }

    #[test]
    fn undeclared_prefix_is_an_error() {
        let dump = "\
  E: manifest (line=1)
    A: android:name=\"x\" (Raw: \"x\")
";
        let err = parse_xml_tree(dump).unwrap_err();
        assert!(matches!(err, ManifestError::UnknownNamespace { ref prefix, .. } if prefix == "android"));
    }

    #[test]
    fn attribute_before_any_element_is_an_error() {
        let err = parse_xml_tree("  A: package=\"x\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::AttributeOutsideElement { .. }));
    }

    #[test]
    fn malformed_element_line_is_an_error() {
        let err = parse_xml_tree("  E: manifest without line marker\n").unwrap_err();
        assert!(matches!(err, ManifestError::InvalidElement { .. }));
    }

    #[test]
    fn nesting_follows_relative_indent_not_absolute_width() {
        // The second sibling uses a different absolute indent than the first,
        // but both are shallower than their children.
        let dump = "\
 E: manifest (line=1)
     E: uses-sdk (line=2)
     E: application (line=3)
         E: activity (line=4)
";
        let doc = parse_xml_tree(dump).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].name, "uses-sdk");
        assert_eq!(root.children[1].name, "application");
        assert_eq!(root.children[1].children[0].name, "activity");
    }

    #[test]
    fn sibling_at_equal_indent_closes_previous_element() {
        let dump = "\
E: a (line=1)
  E: b (line=2)
  E: c (line=3)
";
        let doc = parse_xml_tree(dump).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(root.children.len(), 2);
        assert!(root.children[0].children.is_empty());
    }

    #[test]
    fn parsing_is_deterministic() {
        let dump = "\
N: android=http://schemas.android.com/apk/res/android
  E: manifest (line=1)
    A: package=\"com.example\" (Raw: \"com.example\")
    E: application (line=2)
      A: android:label=@0x7f0c001b
";
        let first = parse_xml_tree(dump).unwrap();
        let second = parse_xml_tree(dump).unwrap();
        assert_eq!(first, second);
    }
}
