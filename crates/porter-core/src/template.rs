//! CloudFormation template model and assembly
//!
//! An override document is parsed loosely first and then resolved into typed
//! [`Resource`]s, so a malformed document and a malformed resource graph are
//! reported as different failures.

use crate::error::{Result, TemplateError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, error, info};

pub const FORMAT_VERSION: &str = "2010-09-09";

/// Prefix of CloudFormation pseudo parameters (`AWS::Region`, ...)
const PSEUDO_PARAMETER_PREFIX: &str = "AWS::";

fn default_format_version() -> String {
    FORMAT_VERSION.to_string()
}

/// Fully resolved template
///
/// Maps are ordered, so serializing the same template always yields the same
/// bytes and therefore the same digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,

    #[serde(rename = "Description", skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(rename = "Parameters", skip_serializing_if = "Map::is_empty")]
    pub parameters: Map<String, Value>,

    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, Resource>,

    /// Other top-level sections (Outputs, Mappings, Conditions, ...) kept verbatim
    #[serde(flatten)]
    pub sections: Map<String, Value>,
}

impl Default for Template {
    fn default() -> Self {
        Self::new()
    }
}

impl Template {
    pub fn new() -> Self {
        Self {
            format_version: default_format_version(),
            description: String::new(),
            parameters: Map::new(),
            resources: BTreeMap::new(),
            sections: Map::new(),
        }
    }

    /// Names of all resources of `resource_type`, in name order
    pub fn resource_names_of_type(&self, resource_type: &str) -> Vec<String> {
        self.resources
            .iter()
            .filter(|(_, r)| r.resource_type == resource_type)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Serialize to the bytes that get mirrored locally and staged
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Check that every `Ref`, `Fn::GetAtt` and `DependsOn` points at
    /// something the template declares or `provided` will add later
    fn check_references(&self, provided: &[&str]) -> Result<()> {
        let declared =
            |t: &str| self.resources.contains_key(t) || provided.iter().any(|p| *p == t);
        for (name, resource) in &self.resources {
            let mut targets = Vec::new();
            for value in resource.properties.values() {
                collect_references(value, &mut targets);
            }
            if let Some(depends_on) = resource.attributes.get("DependsOn") {
                match depends_on {
                    Value::String(target) => targets.push(Reference::Resource(target.clone())),
                    Value::Array(items) => targets.extend(
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(|t| Reference::Resource(t.to_string())),
                    ),
                    _ => {
                        return Err(resolution(name, "DependsOn must be a string or an array"));
                    }
                }
            }

            for target in targets {
                let known = match &target {
                    Reference::Ref(t) => {
                        declared(t.as_str())
                            || self.parameters.contains_key(t)
                            || t.starts_with(PSEUDO_PARAMETER_PREFIX)
                    }
                    Reference::Resource(t) => declared(t.as_str()),
                };
                if !known {
                    return Err(resolution(
                        name,
                        format!("reference to undeclared '{}'", target.name()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A single resource definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    #[serde(rename = "Properties", skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,

    /// Metadata, DependsOn, Condition, DeletionPolicy, ...
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            attributes: Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    fn resolve(name: &str, value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(resolution(name, "definition is not an object"));
        };

        let resource_type = match fields.remove("Type") {
            Some(Value::String(t)) if !t.is_empty() => t,
            Some(_) => return Err(resolution(name, "Type must be a non-empty string")),
            None => return Err(resolution(name, "missing Type")),
        };

        let properties = match fields.remove("Properties") {
            None => Map::new(),
            Some(Value::Object(p)) => p,
            Some(_) => return Err(resolution(name, "Properties must be an object")),
        };

        Ok(Self {
            resource_type,
            properties,
            attributes: fields,
        })
    }
}

/// Override document as read from disk, before resolution
#[derive(Debug, Deserialize)]
struct TemplateDocument {
    #[serde(rename = "AWSTemplateFormatVersion", default = "default_format_version")]
    format_version: String,

    #[serde(rename = "Description", default)]
    description: String,

    #[serde(rename = "Parameters", default)]
    parameters: Map<String, Value>,

    #[serde(rename = "Resources", default)]
    resources: Map<String, Value>,

    #[serde(flatten)]
    sections: Map<String, Value>,
}

impl Default for TemplateDocument {
    fn default() -> Self {
        Self {
            format_version: default_format_version(),
            description: String::new(),
            parameters: Map::new(),
            resources: Map::new(),
            sections: Map::new(),
        }
    }
}

impl TemplateDocument {
    fn resolve(self, provided: &[&str]) -> Result<Template> {
        let resources = self
            .resources
            .into_iter()
            .map(|(name, value)| Resource::resolve(&name, value).map(|r| (name, r)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        let template = Template {
            format_version: self.format_version,
            description: self.description,
            parameters: self.parameters,
            resources,
            sections: self.sections,
        };
        template.check_references(provided)?;

        debug!(resources = template.resources.len(), "Resolved template");
        Ok(template)
    }
}

/// Builds the starting template for a region
pub struct TemplateAssembler;

impl TemplateAssembler {
    /// Load `override_path` (or start empty) and resolve its resources
    pub fn assemble(override_path: Option<&Path>) -> Result<Template> {
        Self::assemble_with(override_path, &[])
    }

    /// Like [`assemble`](Self::assemble), but references to `provided` resolve
    /// even when the override does not declare them; mutation adds them later
    pub fn assemble_with(override_path: Option<&Path>, provided: &[&str]) -> Result<Template> {
        let document = match override_path {
            Some(path) => {
                info!(path = %path.display(), "Using custom stack definition");
                Self::load(path)?
            }
            None => TemplateDocument::default(),
        };

        document
            .resolve(provided)
            .inspect_err(|e| error!(error = %e, "Template resolution failed"))
    }

    fn load(path: &Path) -> Result<TemplateDocument> {
        let file = File::open(path)
            .map_err(|source| TemplateError::Io {
                path: path.to_path_buf(),
                source,
            })
            .inspect_err(|e| error!(error = %e, "Failed to open stack definition"))?;

        serde_json::from_reader(BufReader::new(file))
            .map_err(|source| TemplateError::Parse {
                path: path.to_path_buf(),
                source,
            })
            .inspect_err(|e| error!(error = %e, "Failed to decode stack definition"))
    }
}

enum Reference {
    /// `Ref`: a resource, a parameter or a pseudo parameter
    Ref(String),
    /// `Fn::GetAtt` / `DependsOn`: a resource
    Resource(String),
}

impl Reference {
    fn name(&self) -> &str {
        match self {
            Reference::Ref(t) | Reference::Resource(t) => t,
        }
    }
}

fn collect_references(value: &Value, out: &mut Vec<Reference>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    out.push(Reference::Ref(target.clone()));
                    return;
                }
                match map.get("Fn::GetAtt") {
                    Some(Value::Array(args)) => {
                        if let Some(Value::String(target)) = args.first() {
                            out.push(Reference::Resource(target.clone()));
                        }
                        return;
                    }
                    Some(Value::String(dotted)) => {
                        let target = dotted.split('.').next().unwrap_or(dotted);
                        out.push(Reference::Resource(target.to_string()));
                        return;
                    }
                    _ => {}
                }
            }
            for nested in map.values() {
                collect_references(nested, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        _ => {}
    }
}

fn resolution(resource: &str, message: impl Into<String>) -> TemplateError {
    TemplateError::Resolution {
        resource: resource.to_string(),
        message: message.into(),
    }
}
