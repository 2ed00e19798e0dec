//! Plans the security-group setup for a new deployment group.
//!
//! Planning is separated from execution so the decision logic stays
//! deterministic under test; `ec2::Manager::apply_ingress_plan`
//! performs the actual API calls.

/// Fleet ports opened to the world on a newly created group:
/// SSH, the internal control port, HTTP, gossip, ganglia and the
/// debug port.
pub const FLEET_PORTS: [u16; 6] = [22, 9795, 9696, 9797, 8649, 4444];

/// Description attached to a newly created group.
pub const GROUP_DESCRIPTION: &str = "Development Group";

/// The calls needed to bring a missing security group into existence.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IngressPlan {
    /// Group to create.
    pub group: String,
    /// Ports to open to 0.0.0.0/0, one authorization call each.
    pub ports: Vec<u16>,
    /// Cross-account grant: members of (account id, group name) may
    /// reach the group on any port.
    pub named_grant: (String, String),
}

/// Returns the plan for a group that does not exist yet, or `None`
/// when the group is already present (no calls to make).
pub fn plan_ingress(
    existing_group_names: &[String],
    group: &str,
    account_id: &str,
) -> Option<IngressPlan> {
    if existing_group_names.iter().any(|name| name == group) {
        log::info!("security group '{}' already exists", group);
        return None;
    }

    log::info!("security group '{}' missing, planning creation", group);
    Some(IngressPlan {
        group: group.to_string(),
        ports: FLEET_PORTS.to_vec(),
        named_grant: (account_id.to_string(), group.to_string()),
    })
}

/// RUST_LOG=debug cargo test --package hive-ops --lib -- aws::ingress::test_plan_ingress --exact --show-output
#[test]
fn test_plan_ingress() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .is_test(true)
        .try_init();

    let existing = vec![String::from("default"), String::from("hive-dev")];

    // group present: nothing to create, nothing to authorize
    assert_eq!(plan_ingress(&existing, "hive-dev", "123456789012"), None);

    // group absent: one creation, six port authorizations, one named grant
    let plan = plan_ingress(&existing, "hive-prod", "123456789012").unwrap();
    assert_eq!(plan.group, "hive-prod");
    assert_eq!(plan.ports.len(), 6);
    assert_eq!(plan.ports, vec![22, 9795, 9696, 9797, 8649, 4444]);
    assert_eq!(
        plan.named_grant,
        (String::from("123456789012"), String::from("hive-prod"))
    );
}
