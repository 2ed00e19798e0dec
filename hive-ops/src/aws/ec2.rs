use std::io::{self, Error, ErrorKind};

use aws_sdk_ec2::{
    types::{Filter, Instance, InstanceType, Placement},
    Client,
};
use aws_types::SdkConfig as AwsSdkConfig;

use crate::{aws::ingress::IngressPlan, poller::InstanceSnapshot};

/// Implements the AWS EC2 manager.
#[derive(Debug, Clone)]
pub struct Manager {
    #[allow(dead_code)]
    shared_config: AwsSdkConfig,
    cli: Client,
}

impl Manager {
    pub fn new(shared_config: &AwsSdkConfig) -> Self {
        let cloned = shared_config.clone();
        let cli = Client::new(shared_config);
        Self {
            shared_config: cloned,
            cli,
        }
    }

    /// Lists the names of all security groups visible to the account.
    pub async fn list_security_group_names(&self) -> io::Result<Vec<String>> {
        log::info!("describing security groups");
        let resp = self
            .cli
            .describe_security_groups()
            .send()
            .await
            .map_err(|e| {
                Error::new(
                    ErrorKind::Other,
                    format!("failed describe_security_groups {:?}", e),
                )
            })?;

        let mut names = Vec::new();
        if let Some(groups) = resp.security_groups() {
            for group in groups {
                if let Some(name) = group.group_name() {
                    names.push(name.to_string());
                }
            }
        }
        log::info!("found {} security groups", names.len());
        Ok(names)
    }

    /// Executes a planned security-group creation: the group itself,
    /// the world-open fleet ports, then the named cross-account grant.
    pub async fn apply_ingress_plan(&self, plan: &IngressPlan) -> io::Result<()> {
        log::info!("creating security group '{}'", plan.group);
        self.cli
            .create_security_group()
            .group_name(&plan.group)
            .description(crate::aws::ingress::GROUP_DESCRIPTION)
            .send()
            .await
            .map_err(|e| {
                Error::new(
                    ErrorKind::Other,
                    format!("failed create_security_group {:?}", e),
                )
            })?;

        for port in plan.ports.iter() {
            log::info!("authorizing tcp port {} on '{}'", port, plan.group);
            self.cli
                .authorize_security_group_ingress()
                .group_name(&plan.group)
                .ip_protocol("tcp")
                .from_port(*port as i32)
                .to_port(*port as i32)
                .cidr_ip("0.0.0.0/0")
                .send()
                .await
                .map_err(|e| {
                    Error::new(
                        ErrorKind::Other,
                        format!("failed authorize_security_group_ingress {:?}", e),
                    )
                })?;
        }

        let (account_id, source_group) = &plan.named_grant;
        log::info!(
            "granting '{}' members of account {} access to '{}'",
            source_group,
            account_id,
            plan.group
        );
        self.cli
            .authorize_security_group_ingress()
            .group_name(&plan.group)
            .source_security_group_name(source_group)
            .source_security_group_owner_id(account_id)
            .send()
            .await
            .map_err(|e| {
                Error::new(
                    ErrorKind::Other,
                    format!("failed authorize_security_group_ingress (named) {:?}", e),
                )
            })?;

        Ok(())
    }

    /// Launches the requested number of instances into the group.
    pub async fn run_instances(
        &self,
        image_id: &str,
        count: u32,
        group: &str,
        key_name: &str,
        instance_type: &str,
        availability_zone: Option<&str>,
    ) -> io::Result<Vec<InstanceSnapshot>> {
        log::info!(
            "launching {} x {} of image '{}' into group '{}'",
            count,
            instance_type,
            image_id,
            group
        );

        let mut req = self
            .cli
            .run_instances()
            .image_id(image_id)
            .min_count(count as i32)
            .max_count(count as i32)
            .key_name(key_name)
            .security_groups(group)
            .instance_type(InstanceType::from(instance_type));
        if let Some(zone) = availability_zone {
            req = req.placement(Placement::builder().availability_zone(zone).build());
        }

        let resp = req.send().await.map_err(|e| {
            Error::new(ErrorKind::Other, format!("failed run_instances {:?}", e))
        })?;

        let mut snapshots = Vec::new();
        if let Some(instances) = resp.instances() {
            for instance in instances {
                snapshots.push(to_snapshot(instance));
            }
        }
        log::info!("launched {} instances", snapshots.len());
        Ok(snapshots)
    }

    /// Lists all instances whose first security group matches.
    pub async fn describe_by_group(&self, group: &str) -> io::Result<Vec<InstanceSnapshot>> {
        log::info!("describing instances in group '{}'", group);
        let filter = Filter::builder()
            .set_name(Some(String::from("instance.group-name")))
            .set_values(Some(vec![String::from(group)]))
            .build();
        let resp = self
            .cli
            .describe_instances()
            .set_filters(Some(vec![filter]))
            .send()
            .await
            .map_err(|e| {
                Error::new(
                    ErrorKind::Other,
                    format!("failed describe_instances {:?}", e),
                )
            })?;

        let mut snapshots = Vec::new();
        if let Some(reservations) = resp.reservations() {
            for reservation in reservations {
                if let Some(instances) = reservation.instances() {
                    for instance in instances {
                        snapshots.push(to_snapshot(instance));
                    }
                }
            }
        }
        log::info!("found {} instances", snapshots.len());
        Ok(snapshots)
    }

    /// Re-queries a single instance's live status.
    pub async fn describe_instance(&self, instance_id: &str) -> io::Result<InstanceSnapshot> {
        let resp = self
            .cli
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(|e| {
                Error::new(
                    ErrorKind::Other,
                    format!("failed describe_instances {:?}", e),
                )
            })?;

        let reservations = resp.reservations().unwrap_or_default();
        for reservation in reservations {
            if let Some(instances) = reservation.instances() {
                if let Some(instance) = instances.first() {
                    return Ok(to_snapshot(instance));
                }
            }
        }
        Err(Error::new(
            ErrorKind::NotFound,
            format!("instance '{}' not found", instance_id),
        ))
    }

    /// Terminates the instances, one batched call.
    pub async fn terminate_instances(&self, instance_ids: Vec<String>) -> io::Result<()> {
        log::info!("terminating {} instances", instance_ids.len());
        self.cli
            .terminate_instances()
            .set_instance_ids(Some(instance_ids))
            .send()
            .await
            .map_err(|e| {
                Error::new(
                    ErrorKind::Other,
                    format!("failed terminate_instances {:?}", e),
                )
            })?;
        Ok(())
    }
}

fn to_snapshot(instance: &Instance) -> InstanceSnapshot {
    let instance_id = instance.instance_id().unwrap_or_default().to_string();

    let group = instance
        .security_groups()
        .and_then(|groups| groups.first())
        .and_then(|g| g.group_name())
        .unwrap_or_default()
        .to_string();

    let state_name = instance
        .state()
        .and_then(|s| s.name())
        .map(|n| n.as_str().to_string())
        .unwrap_or_default();

    let public_dns = instance.public_dns_name().unwrap_or_default().to_string();
    let private_dns = instance.private_dns_name().unwrap_or_default().to_string();

    InstanceSnapshot {
        instance_id,
        group,
        state_name,
        public_dns,
        private_dns,
    }
}
