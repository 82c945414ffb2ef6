//! Built-in resource-mapping rules

use super::mandatory::{INSTANCE_PROFILE, SECURITY_GROUP};
use super::{MapResource, MutationContext, ResourceTransforms};
use crate::template::Template;
use serde_json::{Map, Value, json};

pub mod resource_type {
    pub const LAUNCH_CONFIGURATION: &str = "AWS::AutoScaling::LaunchConfiguration";
    pub const AUTO_SCALING_GROUP: &str = "AWS::AutoScaling::AutoScalingGroup";
    pub const LOAD_BALANCER: &str = "AWS::ElasticLoadBalancing::LoadBalancer";
}

/// Rules applied on every run, keyed by the resource type they rewrite
pub fn default_transforms() -> ResourceTransforms {
    let mut transforms = ResourceTransforms::new();
    transforms.insert(
        resource_type::LAUNCH_CONFIGURATION.to_string(),
        vec![
            Box::new(InjectPorterMetadata) as Box<dyn MapResource>,
            Box::new(AttachInstanceProfile),
            Box::new(AttachSecurityGroup),
        ],
    );
    transforms.insert(
        resource_type::AUTO_SCALING_GROUP.to_string(),
        vec![Box::new(AttachLoadBalancers) as Box<dyn MapResource>],
    );
    transforms
}

/// Writes `Metadata.porter` so instances can locate their payload
pub struct InjectPorterMetadata;

impl MapResource for InjectPorterMetadata {
    fn name(&self) -> &str {
        "inject_porter_metadata"
    }

    fn apply(
        &self,
        ctx: &MutationContext<'_>,
        template: &mut Template,
        resource: &str,
    ) -> Result<(), String> {
        let attributes = &mut resource_mut(template, resource)?.attributes;
        let metadata = attributes
            .entry("Metadata")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or("Metadata must be an object")?;

        metadata.insert(
            "porter".to_string(),
            json!({
                "serviceName": ctx.service.name,
                "serviceVersion": ctx.service.version,
                "environment": ctx.environment,
                "region": ctx.region,
                "payloadKey": ctx.payload_key.as_str(),
                "payloadChecksum": ctx.payload_digest.as_str(),
            }),
        );
        Ok(())
    }
}

/// Points the launch configuration at the mandatory instance profile
pub struct AttachInstanceProfile;

impl MapResource for AttachInstanceProfile {
    fn name(&self) -> &str {
        "attach_instance_profile"
    }

    fn apply(
        &self,
        _ctx: &MutationContext<'_>,
        template: &mut Template,
        resource: &str,
    ) -> Result<(), String> {
        resource_mut(template, resource)?
            .properties
            .entry("IamInstanceProfile")
            .or_insert_with(|| json!({ "Ref": INSTANCE_PROFILE }));
        Ok(())
    }
}

/// Adds the mandatory security group to the launch configuration
pub struct AttachSecurityGroup;

impl MapResource for AttachSecurityGroup {
    fn name(&self) -> &str {
        "attach_security_group"
    }

    fn apply(
        &self,
        _ctx: &MutationContext<'_>,
        template: &mut Template,
        resource: &str,
    ) -> Result<(), String> {
        let groups = array_property(template, resource, "SecurityGroups")?;
        push_unique(groups, json!({ "Ref": SECURITY_GROUP }));
        Ok(())
    }
}

/// Registers every classic load balancer of the template with the group
pub struct AttachLoadBalancers;

impl MapResource for AttachLoadBalancers {
    fn name(&self) -> &str {
        "attach_load_balancers"
    }

    fn apply(
        &self,
        _ctx: &MutationContext<'_>,
        template: &mut Template,
        resource: &str,
    ) -> Result<(), String> {
        let load_balancers = template.resource_names_of_type(resource_type::LOAD_BALANCER);
        if load_balancers.is_empty() {
            return Ok(());
        }

        let names = array_property(template, resource, "LoadBalancerNames")?;
        for lb in load_balancers {
            push_unique(names, json!({ "Ref": lb }));
        }
        Ok(())
    }
}

fn resource_mut<'t>(
    template: &'t mut Template,
    resource: &str,
) -> Result<&'t mut crate::template::Resource, String> {
    template
        .resources
        .get_mut(resource)
        .ok_or_else(|| format!("resource '{}' disappeared from the template", resource))
}

/// The array under `Properties.<key>`, created empty if absent
fn array_property<'t>(
    template: &'t mut Template,
    resource: &str,
    key: &str,
) -> Result<&'t mut Vec<Value>, String> {
    resource_mut(template, resource)?
        .properties
        .entry(key)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| format!("{} must be an array", key))
}

fn push_unique(items: &mut Vec<Value>, value: Value) {
    if !items.contains(&value) {
        items.push(value);
    }
}
