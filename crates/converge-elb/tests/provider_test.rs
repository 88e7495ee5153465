mod common;

use common::{FakeElb, provider};
use converge_elb::{
    HealthPolicyConfig, HealthPolicyModel, ListenerConfig, LoadBalancerConfig, LoadBalancerFilter,
    MemberConfig, MemberModel,
};
use converge_engine::{ApiError, CancelToken, ErrorKind};
use pretty_assertions::assert_eq;

fn web_lb() -> LoadBalancerConfig {
    LoadBalancerConfig {
        name: Some("web".to_string()),
        address_type: Some("internet".to_string()),
        spec: Some("slb.s1.small".to_string()),
        vpc_id: Some("vpc-1".to_string()),
        bandwidth: Some(50),
        listener: vec![ListenerConfig {
            protocol: Some("http".to_string()),
            port: Some(80),
            backend_port: Some(8080),
            idle_timeout: None,
        }],
        ..Default::default()
    }
}

fn member(id: &str, ip: &str, port: u16, weight: u32) -> MemberModel {
    MemberModel {
        member_id: id.to_string(),
        ip: ip.to_string(),
        port,
        weight: Some(weight),
        description: String::new(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_create_load_balancer_waits_for_active() {
    let fake = FakeElb::new();
    let provider = provider(&fake);

    let (id, state) = provider.create_load_balancer("eu-1", &web_lb()).await.unwrap();

    assert_eq!(id, "lb-1");
    assert_eq!(state.name.as_deref(), Some("web"));
    assert_eq!(state.listener[0].protocol.as_deref(), Some("HTTP"));
    assert_eq!(
        fake.calls(),
        vec![
            "create_load_balancer web",
            "describe_load_balancer lb-1",
            "describe_load_balancer lb-1",
        ]
    );
    assert_eq!(provider.limiter().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_config_never_reaches_the_api() {
    let fake = FakeElb::new();
    let provider = provider(&fake);
    let mut config = web_lb();
    config.bandwidth_package_id = Some("bwp-1".to_string());

    let err = provider
        .create_load_balancer("eu-1", &config)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Validation));
    assert!(fake.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_throttled_create_is_upstream_and_retryable() {
    let fake = FakeElb::new();
    fake.fail_next(
        "create_load_balancer",
        ApiError::new(Some(429), "Throttling", "rate exceeded"),
    );
    let provider = provider(&fake);

    let err = provider
        .create_load_balancer("eu-1", &web_lb())
        .await
        .unwrap_err();

    match err {
        converge_elb::ElbError::Engine(e) => {
            assert_eq!(e.kind(), ErrorKind::Upstream);
            assert!(e.is_retryable());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(provider.limiter().in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_update_sends_changed_fields_and_reads_back() {
    let fake = FakeElb::new();
    let provider = provider(&fake);
    let (id, previous) = provider.create_load_balancer("eu-1", &web_lb()).await.unwrap();
    fake.clear_calls();

    let mut desired = previous.clone();
    desired.bandwidth = Some(200);
    let state = provider
        .update_load_balancer("eu-1", &id, &previous, &desired)
        .await
        .unwrap();

    assert_eq!(state.bandwidth, Some(200));
    assert_eq!(fake.load_balancer(&id).unwrap().bandwidth, Some(200));
    assert_eq!(fake.calls()[0], format!("modify_load_balancer {}", id));
}

#[tokio::test(start_paused = true)]
async fn test_read_and_delete_of_missing_load_balancer() {
    let fake = FakeElb::new();
    let provider = provider(&fake);

    let state = provider
        .read_load_balancer("eu-1", "lb-404", web_lb())
        .await
        .unwrap();
    assert!(state.is_none());

    provider.delete_load_balancer("eu-1", "lb-404").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_delete_waits_until_gone() {
    let fake = FakeElb::new();
    let provider = provider(&fake);
    let (id, _) = provider.create_load_balancer("eu-1", &web_lb()).await.unwrap();
    fake.clear_calls();

    provider.delete_load_balancer("eu-1", &id).await.unwrap();

    assert!(fake.load_balancer(&id).is_none());
    assert_eq!(
        fake.calls(),
        vec![
            format!("delete_load_balancer {}", id),
            format!("describe_load_balancer {}", id),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_list_load_balancers_drains_pages() {
    let fake = FakeElb::new();
    let provider = provider(&fake);
    for _ in 0..3 {
        provider.create_load_balancer("eu-1", &web_lb()).await.unwrap();
    }
    let mut other_vpc = web_lb();
    other_vpc.vpc_id = Some("vpc-2".to_string());
    provider.create_load_balancer("eu-1", &other_vpc).await.unwrap();

    let all = provider
        .list_load_balancers("eu-1", &LoadBalancerFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 4);

    let filtered = provider
        .list_load_balancers(
            "eu-1",
            &LoadBalancerFilter {
                vpc_id: Some("vpc-1".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(filtered.len(), 3);
}

#[tokio::test]
async fn test_sync_members() {
    let fake = FakeElb::new();
    fake.seed_members(
        "pool-1",
        vec![
            member("m-1", "10.0.0.1", 80, 100),
            member("m-2", "10.0.0.2", 80, 100),
            member("m-3", "10.0.0.3", 80, 100),
        ],
    );
    let provider = provider(&fake);

    let desired = vec![
        MemberConfig::new("10.0.0.1", 80).with_weight(50),
        MemberConfig::new("10.0.0.3", 80),
        MemberConfig::new("10.0.0.4", 8080),
    ];
    let summary = provider
        .sync_members("eu-1", "pool-1", &desired)
        .await
        .unwrap();

    assert_eq!(
        summary.to_string(),
        "1 to create, 1 to update, 1 to delete, 1 unchanged"
    );
    assert_eq!(
        fake.calls(),
        vec![
            "list_members pool-1 ''",
            "list_members pool-1 '2'",
            "remove_member m-2",
            "modify_member m-1",
            "add_member 10.0.0.4:8080",
        ]
    );
    let addresses: Vec<(String, Option<u32>)> = fake
        .members("pool-1")
        .into_iter()
        .map(|m| (format!("{}:{}", m.ip, m.port), m.weight))
        .collect();
    assert_eq!(
        addresses,
        vec![
            ("10.0.0.1:80".to_string(), Some(50)),
            ("10.0.0.3:80".to_string(), Some(100)),
            ("10.0.0.4:8080".to_string(), None),
        ]
    );

    // Converged: a second pass only lists
    fake.clear_calls();
    let summary = provider
        .sync_members("eu-1", "pool-1", &desired)
        .await
        .unwrap();
    assert_eq!(summary.no_change, 3);
    assert!(fake.calls().iter().all(|c| c.starts_with("list_members")));
}

#[tokio::test]
async fn test_duplicate_members_rejected_before_any_call() {
    let fake = FakeElb::new();
    let provider = provider(&fake);

    let err = provider
        .sync_members(
            "eu-1",
            "pool-1",
            &[MemberConfig::new("1.2.3.4", 80), MemberConfig::new("1.2.3.4", 80)],
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Validation));
    assert!(err.to_string().contains("1.2.3.4:80"));
    assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn test_sync_health_policies_by_type() {
    let fake = FakeElb::new();
    fake.seed_policies(
        "pool-1",
        vec![
            HealthPolicyModel {
                policy_id: "bp-1".to_string(),
                policy_type: "TCP".to_string(),
                health_check: Some(true),
                ..Default::default()
            },
            HealthPolicyModel {
                policy_id: "bp-2".to_string(),
                policy_type: "UDP".to_string(),
                ..Default::default()
            },
        ],
    );
    let provider = provider(&fake);

    let summary = provider
        .sync_health_policies(
            "eu-1",
            "pool-1",
            &[HealthPolicyConfig {
                policy_type: Some("TCP".to_string()),
                health_check: Some(false),
                ..Default::default()
            }],
        )
        .await
        .unwrap();

    assert_eq!(summary.create, 0);
    assert_eq!(summary.update, 1);
    assert_eq!(summary.delete, 1);
    assert_eq!(
        fake.calls(),
        vec![
            "list_health_policies pool-1 ''",
            "delete_health_policy bp-2",
            "modify_health_policy bp-1",
        ]
    );
    let remaining = fake.policies("pool-1");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].health_check, Some(false));
}

#[tokio::test]
async fn test_member_already_removed_counts_as_deleted() {
    let fake = FakeElb::new();
    fake.seed_members("pool-1", vec![member("m-1", "10.0.0.1", 80, 100)]);
    fake.fail_next(
        "remove_member",
        ApiError::not_found("MemberNotFound", "gone"),
    );
    let provider = provider(&fake);

    let summary = provider.sync_members("eu-1", "pool-1", &[]).await.unwrap();
    assert_eq!(summary.delete, 1);
}

#[tokio::test]
async fn test_failed_delete_stops_before_creates() {
    let fake = FakeElb::new();
    fake.seed_members("pool-1", vec![member("m-1", "10.0.0.1", 80, 100)]);
    fake.fail_next(
        "remove_member",
        ApiError::new(Some(500), "InternalError", "boom"),
    );
    let provider = provider(&fake);

    let err = provider
        .sync_members("eu-1", "pool-1", &[MemberConfig::new("10.0.0.9", 80)])
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Upstream));
    assert!(!fake.calls().iter().any(|c| c.starts_with("add_member")));
}

#[tokio::test]
async fn test_one_client_per_region() {
    let fake = FakeElb::new();
    let provider = provider(&fake);

    provider.sync_members("eu-1", "pool-1", &[]).await.unwrap();
    provider.sync_members("eu-1", "pool-2", &[]).await.unwrap();
    assert_eq!(provider.connected_regions(), 1);

    provider.sync_members("us-2", "pool-1", &[]).await.unwrap();
    assert_eq!(provider.connected_regions(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_provider_stops_waiting() {
    let fake = FakeElb::new();
    let token = CancelToken::new();
    let provider = provider(&fake).with_cancel(token.clone());
    token.cancel();

    let err = provider
        .create_load_balancer("eu-1", &web_lb())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Cancelled));
    // The load balancer exists remotely; the caller can still track it
    assert_eq!(err.resource_id(), Some("lb-1"));
    assert!(fake.load_balancer("lb-1").is_some());
}

#[tokio::test]
async fn test_failed_listing_names_region_and_pool() {
    let fake = FakeElb::new();
    let unavailable = || ApiError::new(Some(503), "ServiceUnavailable", "try again");
    let provider = provider(&fake);

    fake.fail_next("list_members", unavailable());
    let err = provider
        .sync_members("eu-1", "pool-7", &[])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Upstream));
    assert_eq!(err.resource_id(), Some("pool-7"));

    fake.fail_next("list_load_balancers", unavailable());
    let filter = LoadBalancerFilter {
        vpc_id: Some("vpc-1".to_string()),
    };
    let err = provider
        .list_load_balancers("eu-1", &filter)
        .await
        .unwrap_err();
    assert_eq!(err.resource_id(), Some("eu-1/vpc-1"));
    assert!(
        err.to_string().starts_with("list load balancer failed for 'eu-1/vpc-1'"),
        "{err}"
    );
}
