//! Deployment-specific template mutation
//!
//! Runs in a fixed order: description, mandatory resources, then the
//! resource-mapping transforms. A failing rule aborts the whole mutation; the
//! caller discards the partially mutated template.

mod mandatory;
mod transforms;

pub use mandatory::{
    INSTANCE_PROFILE, INSTANCE_ROLE, MandatoryResource, SECURITY_GROUP, mandatory_resources,
};
pub use transforms::{
    AttachInstanceProfile, AttachLoadBalancers, AttachSecurityGroup, InjectPorterMetadata,
    default_transforms, resource_type,
};

use crate::digest::Digest;
use crate::error::{Result, TemplateError};
use crate::key::StorageKey;
use crate::model::ServiceDescriptor;
use crate::template::Template;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// What a mutation knows about the run it belongs to
#[derive(Debug, Clone, Copy)]
pub struct MutationContext<'a> {
    pub service: &'a ServiceDescriptor,
    pub environment: &'a str,
    pub region: &'a str,
    pub payload_key: &'a StorageKey,
    pub payload_digest: &'a Digest,
}

/// A named rule applied to every resource of one type
pub trait MapResource: Send + Sync {
    fn name(&self) -> &str;

    /// Rewrite `resource` (and, if needed, the rest of `template`).
    ///
    /// The error string describes what was wrong with the resource.
    fn apply(
        &self,
        ctx: &MutationContext<'_>,
        template: &mut Template,
        resource: &str,
    ) -> std::result::Result<(), String>;
}

/// Resource type -> ordered rules
pub type ResourceTransforms = BTreeMap<String, Vec<Box<dyn MapResource>>>;

pub struct TemplateMutator {
    mandatory: Vec<MandatoryResource>,
    transforms: ResourceTransforms,
    tool_version: String,
}

impl Default for TemplateMutator {
    fn default() -> Self {
        Self::new(mandatory_resources(), default_transforms())
    }
}

impl TemplateMutator {
    pub fn new(mandatory: Vec<MandatoryResource>, transforms: ResourceTransforms) -> Self {
        Self {
            mandatory,
            transforms,
            tool_version: crate::TOOL_VERSION.to_string(),
        }
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = version.into();
        self
    }

    /// Resources `mutate` guarantees to exist afterwards
    pub fn mandatory_names(&self) -> Vec<&'static str> {
        self.mandatory.iter().map(|m| m.name).collect()
    }

    pub fn mutate(&self, template: &mut Template, ctx: &MutationContext<'_>) -> Result<()> {
        template.description = format!(
            "{} (powered by porter {})",
            ctx.service.name, self.tool_version
        );

        self.ensure_resources(template, ctx);

        self.map_resources(template, ctx)
            .inspect_err(|e| error!(error = %e, "Template mutation failed"))
    }

    /// Add every mandatory resource the template does not define yet.
    ///
    /// A user definition with the same name is left untouched.
    fn ensure_resources(&self, template: &mut Template, ctx: &MutationContext<'_>) {
        for mandatory in &self.mandatory {
            if template.resources.contains_key(mandatory.name) {
                debug!(resource = mandatory.name, "Keeping user-defined resource");
                continue;
            }
            template
                .resources
                .insert(mandatory.name.to_string(), (mandatory.build)(ctx));
            debug!(resource = mandatory.name, "Added mandatory resource");
        }
    }

    fn map_resources(&self, template: &mut Template, ctx: &MutationContext<'_>) -> Result<()> {
        for (resource_type, rules) in &self.transforms {
            for resource in template.resource_names_of_type(resource_type) {
                for rule in rules {
                    rule.apply(ctx, template, &resource)
                        .map_err(|message| TemplateError::Mutation {
                            step: "map resources",
                            rule: rule.name().to_string(),
                            resource: resource.clone(),
                            message,
                        })?;
                    debug!(rule = rule.name(), resource = %resource, "Applied rule");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::{KeyClass, StorageNamespace};
    use crate::template::Resource;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    struct Fixture {
        service: ServiceDescriptor,
        key: StorageKey,
        digest: Digest,
    }

    impl Fixture {
        fn new() -> Self {
            let service = ServiceDescriptor::new("svc", "1.0");
            let digest = Digest::of(b"payload");
            let key = StorageNamespace::new(KeyClass::Deployment, &service, "prod")
                .key_for(&digest, Some("tar"));
            Self {
                service,
                key,
                digest,
            }
        }

        fn ctx(&self) -> MutationContext<'_> {
            MutationContext {
                service: &self.service,
                environment: "prod",
                region: "us-west-2",
                payload_key: &self.key,
                payload_digest: &self.digest,
            }
        }
    }

    /// Records which resources it saw, and whether mandatory ones existed by then
    struct Recorder {
        seen: Arc<Mutex<Vec<(String, bool)>>>,
        fail_on: Option<&'static str>,
    }

    impl MapResource for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn apply(
            &self,
            _ctx: &MutationContext<'_>,
            template: &mut Template,
            resource: &str,
        ) -> std::result::Result<(), String> {
            if self.fail_on == Some(resource) {
                return Err("boom".to_string());
            }
            let mandatory_present = template.resources.contains_key(INSTANCE_ROLE);
            self.seen
                .lock()
                .unwrap()
                .push((resource.to_string(), mandatory_present));
            Ok(())
        }
    }

    fn recording_mutator(
        seen: Arc<Mutex<Vec<(String, bool)>>>,
        fail_on: Option<&'static str>,
    ) -> TemplateMutator {
        let mut transforms = ResourceTransforms::new();
        transforms.insert(
            "AWS::SQS::Queue".to_string(),
            vec![Box::new(Recorder { seen, fail_on }) as Box<dyn MapResource>],
        );
        TemplateMutator::new(mandatory_resources(), transforms)
    }

    #[test]
    fn test_description() {
        let fixture = Fixture::new();
        let mut template = Template::new();
        TemplateMutator::default()
            .with_tool_version("9.9.9")
            .mutate(&mut template, &fixture.ctx())
            .unwrap();
        assert_eq!(template.description, "svc (powered by porter 9.9.9)");
    }

    #[test]
    fn test_mandatory_resources_added_to_empty_template() {
        let fixture = Fixture::new();
        let mut template = Template::new();
        TemplateMutator::default()
            .mutate(&mut template, &fixture.ctx())
            .unwrap();

        for name in [INSTANCE_ROLE, INSTANCE_PROFILE, SECURITY_GROUP] {
            assert!(template.resources.contains_key(name), "{} missing", name);
        }
    }

    #[test]
    fn test_user_definition_wins_over_mandatory() {
        let fixture = Fixture::new();
        let mut template = Template::new();
        let custom = Resource::new("AWS::IAM::Role").with_property("Path", json!("/custom/"));
        template
            .resources
            .insert(INSTANCE_ROLE.to_string(), custom.clone());

        TemplateMutator::default()
            .mutate(&mut template, &fixture.ctx())
            .unwrap();

        assert_eq!(template.resources[INSTANCE_ROLE], custom);
    }

    #[test]
    fn test_override_named_like_mandatory_is_kept() {
        let fixture = Fixture::new();
        let mandatory = vec![MandatoryResource {
            name: "Foo",
            build: |_| Resource::new("AWS::SNS::Topic"),
        }];
        let mutator = TemplateMutator::new(mandatory, ResourceTransforms::new());

        let mut template = Template::new();
        template
            .resources
            .insert("Foo".to_string(), Resource::new("AWS::SQS::Queue"));
        mutator.mutate(&mut template, &fixture.ctx()).unwrap();

        assert_eq!(template.resources.len(), 1);
        assert_eq!(template.resources["Foo"].resource_type, "AWS::SQS::Queue");
    }

    #[test]
    fn test_ensure_runs_before_transforms() {
        let fixture = Fixture::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut template = Template::new();
        template
            .resources
            .insert("Queue".to_string(), Resource::new("AWS::SQS::Queue"));

        recording_mutator(seen.clone(), None)
            .mutate(&mut template, &fixture.ctx())
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![("Queue".to_string(), true)]);
    }

    #[test]
    fn test_rule_failure_names_rule_and_resource() {
        let fixture = Fixture::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut template = Template::new();
        template
            .resources
            .insert("A".to_string(), Resource::new("AWS::SQS::Queue"));
        template
            .resources
            .insert("B".to_string(), Resource::new("AWS::SQS::Queue"));

        let err = recording_mutator(seen.clone(), Some("B"))
            .mutate(&mut template, &fixture.ctx())
            .unwrap_err();

        match err {
            TemplateError::Mutation { rule, resource, .. } => {
                assert_eq!(rule, "recorder");
                assert_eq!(resource, "B");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // Resources are visited in name order, so A ran before B failed
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
