use anyhow::Result;
use tracing::info;

use strato_cloud::{Creation, Identity};
use strato_core::cluster::Role;
use strato_core::retry::poll_until;
use strato_core::task::join_all;

use crate::budgets::Budgets;

/// IAM path under which strato-owned roles, profiles, and policies live.
pub const IAM_PATH: &str = "/strato/";

/// Name of the customer-managed volume-driver policy.
pub const VOLUME_POLICY_NAME: &str = "VolumeDriver";

/// Managed policy granting nodes read access to object storage.
pub const STORAGE_READ_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Trust policy letting the compute service assume the node roles.
const TRUST_POLICY: &str = r#"{
    "Statement": [
        {
            "Effect": "Allow",
            "Principal": {
                "Service": ["ec2.amazonaws.com"]
            },
            "Action": ["sts:AssumeRole"]
        }]
}"#;

/// Block-storage lifecycle actions the volume driver needs.
const VOLUME_POLICY_DOCUMENT: &str = r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Sid": "VolumeDriverMin",
            "Effect": "Allow",
            "Action": [
                "ec2:AttachVolume",
                "ec2:CreateVolume",
                "ec2:CreateSnapshot",
                "ec2:CreateTags",
                "ec2:DeleteVolume",
                "ec2:DeleteSnapshot",
                "ec2:DescribeAvailabilityZones",
                "ec2:DescribeInstances",
                "ec2:DescribeVolumes",
                "ec2:DescribeVolumeAttribute",
                "ec2:DescribeVolumeStatus",
                "ec2:DescribeSnapshots",
                "ec2:CopySnapshot",
                "ec2:DescribeSnapshotAttribute",
                "ec2:DetachVolume",
                "ec2:ModifySnapshotAttribute",
                "ec2:ModifyVolumeAttribute",
                "ec2:DescribeTags"
            ],
            "Resource": [
                "*"
            ]
        }
    ]
}"#;

/// Identity facts discovered by [`SecurityProvisioner::provision`].
/// Role ids are only present when the role was created in this run;
/// conflict-as-success reuse leaves the previously persisted id alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IamFacts {
    pub master_role_id: Option<String>,
    pub worker_role_id: Option<String>,
    pub edge_role_id: Option<String>,
    pub volume_policy_arn: String,
}

impl IamFacts {
    pub fn apply(&self, state: &mut strato_core::cluster::ClusterState) {
        if self.master_role_id.is_some() {
            state.master_role_id.clone_from(&self.master_role_id);
        }
        if self.worker_role_id.is_some() {
            state.worker_role_id.clone_from(&self.worker_role_id);
        }
        if self.edge_role_id.is_some() {
            state.edge_role_id.clone_from(&self.edge_role_id);
        }
        state.volume_policy_arn = Some(self.volume_policy_arn.clone());
    }
}

/// Builds the IAM trust fabric: the volume-driver policy, one role and
/// instance profile per node role, and the policy attachments. Every
/// creation step treats "already exists" as success, which is what
/// makes re-running setup converge instead of fail.
pub struct SecurityProvisioner<'a, C: Identity> {
    cloud: &'a C,
    budgets: &'a Budgets,
}

impl<'a, C: Identity> SecurityProvisioner<'a, C> {
    pub fn new(cloud: &'a C, budgets: &'a Budgets) -> Self {
        SecurityProvisioner { cloud, budgets }
    }

    pub fn provision(&self) -> Result<IamFacts> {
        let volume_policy_arn = self.ensure_volume_policy()?;

        let mut facts = IamFacts {
            volume_policy_arn: volume_policy_arn.clone(),
            ..Default::default()
        };

        for role in Role::ALL {
            let slot = match role {
                Role::Master => &mut facts.master_role_id,
                Role::Worker => &mut facts.worker_role_id,
                Role::Edge => &mut facts.edge_role_id,
            };
            match self.cloud.create_role(IAM_PATH, role.as_str(), TRUST_POLICY)? {
                Creation::Created(id) => {
                    info!(id = %id, "New {} IAM role", role);
                    *slot = Some(id);
                }
                Creation::AlreadyExists => {
                    info!(role = %role, "IAM role already exists, reusing");
                }
            }
        }

        // Profiles are independent of each other; create them in
        // parallel, each waiting for its own visibility.
        let tasks: Vec<_> = Role::ALL
            .into_iter()
            .map(|role| move || self.ensure_profile(role))
            .collect();
        join_all(tasks)?;

        for role in Role::ALL {
            for policy in [STORAGE_READ_POLICY_ARN, volume_policy_arn.as_str()] {
                self.cloud.attach_role_policy(role.as_str(), policy)?;
                let short = policy.rsplit('/').next().unwrap_or(policy);
                info!(role = %role, policy = short, "Policy attached to role");
            }
        }

        for role in Role::ALL {
            match self.cloud.add_role_to_profile(role.as_str(), role.as_str())? {
                Creation::Created(_) => info!(role = %role, "IAM role added to profile"),
                Creation::AlreadyExists => {
                    info!(role = %role, "IAM role already in profile")
                }
            }
        }

        Ok(facts)
    }

    /// List-then-create: reuse the named volume-driver policy when it
    /// already exists under the strato path.
    fn ensure_volume_policy(&self) -> Result<String> {
        if let Some(arn) = self.cloud.find_policy(IAM_PATH, VOLUME_POLICY_NAME)? {
            info!(arn = %arn, "Using existing volume-driver policy");
            return Ok(arn);
        }
        let arn = self.cloud.create_policy(
            IAM_PATH,
            VOLUME_POLICY_NAME,
            VOLUME_POLICY_DOCUMENT,
            "Block-storage lifecycle access for the cluster volume driver",
        )?;
        info!(arn = %arn, "New volume-driver policy created");
        Ok(arn)
    }

    /// Create one instance profile and poll until it is externally
    /// visible: role attachment hits a read-after-write gap otherwise.
    fn ensure_profile(&self, role: Role) -> Result<()> {
        match self.cloud.create_instance_profile(IAM_PATH, role.as_str())? {
            Creation::Created(id) => {
                info!(id = %id, "New {} instance profile", role);
                poll_until(
                    self.budgets.profile_poll_attempts,
                    self.budgets.profile_poll_interval,
                    &format!("{} instance profile exists", role),
                    || Ok(self.cloud.instance_profile_exists(role.as_str())?),
                )?;
            }
            Creation::AlreadyExists => {
                info!(role = %role, "Instance profile already exists, reusing");
            }
        }
        Ok(())
    }
}
