use super::MutationContext;
use crate::template::Resource;
use serde_json::json;

pub const INSTANCE_ROLE: &str = "PorterInstanceRole";
pub const INSTANCE_PROFILE: &str = "PorterInstanceProfile";
pub const SECURITY_GROUP: &str = "PorterSecurityGroup";

/// A resource every stack gets unless the user already defines one by that name
#[derive(Clone, Copy)]
pub struct MandatoryResource {
    pub name: &'static str,
    pub build: fn(&MutationContext<'_>) -> Resource,
}

/// Baseline IAM and networking scaffolding
pub fn mandatory_resources() -> Vec<MandatoryResource> {
    vec![
        MandatoryResource {
            name: INSTANCE_ROLE,
            build: instance_role,
        },
        MandatoryResource {
            name: INSTANCE_PROFILE,
            build: instance_profile,
        },
        MandatoryResource {
            name: SECURITY_GROUP,
            build: security_group,
        },
    ]
}

fn instance_role(_ctx: &MutationContext<'_>) -> Resource {
    Resource::new("AWS::IAM::Role")
        .with_property(
            "AssumeRolePolicyDocument",
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": {"Service": ["ec2.amazonaws.com"]},
                    "Action": ["sts:AssumeRole"]
                }]
            }),
        )
        .with_property("Path", json!("/"))
}

fn instance_profile(_ctx: &MutationContext<'_>) -> Resource {
    Resource::new("AWS::IAM::InstanceProfile")
        .with_property("Path", json!("/"))
        .with_property("Roles", json!([{ "Ref": INSTANCE_ROLE }]))
}

fn security_group(ctx: &MutationContext<'_>) -> Resource {
    Resource::new("AWS::EC2::SecurityGroup").with_property(
        "GroupDescription",
        json!(format!(
            "{} {} instances",
            ctx.service.name, ctx.environment
        )),
    )
}
