//! # Integration Tests
//!
//! End-to-end scenarios across crates.
//!
//! - Contract snapshots (wire and mirror shapes)
//! - Config to running engine with in-memory store and channel sinks
//! - Fan-out, pruning, id and failure isolation properties

#[cfg(test)]
mod contract_tests {
    use contracts::{
        time, MirrorRecord, StreamKind, Subscription, SubscriptionId, SubscriptionParams,
    };
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_mirror_record_shape() {
        let mut params = SubscriptionParams::on_change(
            StreamKind::YangPush,
            "/interfaces".parse().unwrap(),
            Duration::from_millis(500),
            true,
        );
        params.filter = Some(json!({"eth0": null}));
        let subscription = Subscription::from_params(SubscriptionId::new(12), params);

        let value = serde_json::to_value(MirrorRecord::from_subscription(&subscription)).unwrap();
        assert_eq!(value["subscription-id"], json!("12"));
        assert_eq!(value["stream"], json!("YANG-PUSH"));
        assert_eq!(value["encoding"], json!("encode-json"));
        assert_eq!(
            value["update-trigger"],
            json!({"on-change": {"dampening-period": 500, "no-synch-on-start": true}})
        );
        assert_eq!(value["filter"], json!(r#"{"eth0":null}"#));
    }

    #[test]
    fn test_time_normalization() {
        assert_eq!(
            time::ensure_format("2021-01-01T00:00:00.123456Z").unwrap(),
            "2021-01-01T00:00:00.123Z"
        );
        assert_eq!(
            time::ensure_format("2021-01-01T00:00:00Z").unwrap(),
            "2021-01-01T00:00:00.000Z"
        );
        assert_eq!(time::normalize(None).unwrap(), None);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use contracts::{
        ContractError, Datastore, InstancePath, MirrorOperation, OamStatus, StreamKind,
        SubscriptionParams, SubscriptionStatus,
    };
    use datastore::MemoryBroker;
    use dispatcher::{ChannelSink, DispatchOutcome};
    use scheduler::{SchedulerConfig, SubscriptionService};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;

    fn path(s: &str) -> InstancePath {
        s.parse().unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Bytes>) -> Vec<Value> {
        let mut out = Vec::new();
        while let Ok(payload) = rx.try_recv() {
            out.push(serde_json::from_slice(&payload).unwrap());
        }
        out
    }

    fn kind(value: &Value) -> &str {
        value
            .as_object()
            .and_then(|o| o.keys().next())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Config file -> seeded store -> configured subscriptions -> sinks
    #[tokio::test(start_paused = true)]
    async fn test_e2e_config_driven_engine() {
        let blueprint = config_loader::ConfigLoader::load_from_str(
            r#"
[service]
reply_guard_delay_ms = 20

[[seed]]
datastore = "OPERATIONAL"
path = "/interfaces"
value = { eth0 = { mtu = 1500, up = true }, eth1 = { mtu = 9000, up = false } }

[[subscriptions]]
stream = "OPERATIONAL"
path = "/interfaces"
trigger = { periodic = { period_ms = 1000 } }

[subscriptions.filter.eth1]
up = {}
"#,
            config_loader::ConfigFormat::Toml,
        )
        .unwrap();

        let broker = MemoryBroker::new();
        for entry in &blueprint.seed {
            broker.put(entry.datastore, &entry.path, entry.value.clone());
        }
        let service = SubscriptionService::new(
            Arc::new(broker.clone()),
            SchedulerConfig::from(&blueprint.service),
        );
        let (sink, mut rx) = ChannelSink::new("client-1");
        service.attach(StreamKind::Operational, Arc::new(sink));

        let id = service
            .establish(blueprint.subscriptions[0].to_params())
            .await
            .unwrap();
        assert_eq!(id.value(), 1);

        tokio::time::sleep(Duration::from_millis(30)).await;
        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert_eq!(kind(&events[0]), "subscription-started");
        assert_eq!(
            events[1]["push-update"]["datastore-contents"]["operational"],
            json!({"eth1": {"up": false}})
        );

        broker.put(Datastore::Operational, &path("/interfaces/eth1/up"), json!(true));
        tokio::time::sleep(Duration::from_secs(1)).await;
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0]["push-update"]["datastore-contents"]["operational"],
            json!({"eth1": {"up": true}})
        );

        let mirror = broker.mirror_record(id).unwrap();
        assert_eq!(mirror.stream, "OPERATIONAL");
        service.shutdown().await;
    }

    /// Two sinks receive X; after one detaches only the other receives Y
    #[tokio::test(start_paused = true)]
    async fn test_fanout_and_detach() {
        let broker = MemoryBroker::new();
        let service = SubscriptionService::new(Arc::new(broker), SchedulerConfig::default());
        let dispatcher = Arc::clone(service.dispatcher());

        let (a, mut rx_a) = ChannelSink::new("a");
        let (b, mut rx_b) = ChannelSink::new("b");
        service.attach(StreamKind::Configuration, Arc::new(a));
        service.attach(StreamKind::Configuration, Arc::new(b));

        let id = service
            .establish(SubscriptionParams::periodic(
                StreamKind::Configuration,
                path("/system"),
                Duration::from_secs(3600),
            ))
            .await
            .unwrap();

        assert_eq!(
            dispatcher.oam_notification(id, OamStatus::Error, Some("X".into())).await,
            DispatchOutcome::Queued
        );
        service.detach(StreamKind::Configuration, "a");
        assert_eq!(
            dispatcher.oam_notification(id, OamStatus::Error, Some("Y".into())).await,
            DispatchOutcome::Queued
        );

        service.shutdown().await;

        let got_a = drain(&mut rx_a);
        let got_b = drain(&mut rx_b);
        assert_eq!(got_a.len(), 1);
        assert_eq!(got_a[0]["subscription-error"]["detail"], json!("X"));
        assert_eq!(got_b.len(), 2);
        assert_eq!(got_b[1]["subscription-error"]["detail"], json!("Y"));
    }

    /// A sink whose connection went away is pruned at the next delivery
    #[tokio::test(start_paused = true)]
    async fn test_dead_sink_pruned_without_detach() {
        let service =
            SubscriptionService::new(Arc::new(MemoryBroker::new()), SchedulerConfig::default());
        let dispatcher = Arc::clone(service.dispatcher());

        let (live, mut rx_live) = ChannelSink::new("live");
        let (dead, rx_dead) = ChannelSink::new("dead");
        service.attach(StreamKind::Operational, Arc::new(live));
        service.attach(StreamKind::Operational, Arc::new(dead));
        drop(rx_dead);

        let id = service
            .establish(SubscriptionParams::periodic(
                StreamKind::Operational,
                path("/system"),
                Duration::from_secs(3600),
            ))
            .await
            .unwrap();

        dispatcher.oam_notification(id, OamStatus::Error, None).await;
        dispatcher.oam_notification(id, OamStatus::Error, None).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let metrics = service.stream_metrics();
        let (stream, snapshot) = &metrics[0];
        assert_eq!(stream, "OPERATIONAL");
        assert_eq!(snapshot.pruned_count, 1);
        assert_eq!(snapshot.sink_count, 1);
        assert_eq!(dispatcher.subscriber_count("OPERATIONAL"), 1);

        service.shutdown().await;
        assert_eq!(drain(&mut rx_live).len(), 2);
    }

    /// Ids increase from 1 and are never handed out again
    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let broker = MemoryBroker::new();
        let service = SubscriptionService::new(Arc::new(broker.clone()), SchedulerConfig::default());
        let params = || {
            SubscriptionParams::on_change(
                StreamKind::Operational,
                path("/interfaces"),
                Duration::from_millis(100),
                true,
            )
        };

        let first = service.establish(params()).await.unwrap();
        service.delete(first).await.unwrap();
        let second = service.establish(params()).await.unwrap();

        assert_eq!(first.value(), 1);
        assert!(second > first);

        let err = service.delete(first).await.unwrap_err();
        assert!(err.is_not_found());

        let ops: Vec<MirrorOperation> = broker.mirror_log().iter().map(|e| e.operation).collect();
        assert_eq!(
            ops,
            vec![
                MirrorOperation::Establish,
                MirrorOperation::Delete,
                MirrorOperation::Establish
            ]
        );
        service.shutdown().await;
    }

    /// YANG-PUSH on-change listens on both partitions
    #[tokio::test(start_paused = true)]
    async fn test_yang_push_on_change_both_partitions() {
        let broker = MemoryBroker::new();
        broker.put(Datastore::Configuration, &path("/interfaces"), json!({"eth0": {"mtu": 1500}}));
        let service = SubscriptionService::new(Arc::new(broker.clone()), SchedulerConfig::default());
        let (sink, mut rx) = ChannelSink::new("client");
        service.attach(StreamKind::YangPush, Arc::new(sink));

        let id = service
            .establish(SubscriptionParams::on_change(
                StreamKind::YangPush,
                path("/interfaces"),
                Duration::ZERO,
                true,
            ))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(service.get(id).await.unwrap().status, SubscriptionStatus::Active);
        drain(&mut rx);

        broker.merge(Datastore::Configuration, &path("/interfaces/eth0"), json!({"mtu": 9000}));
        tokio::time::sleep(Duration::from_millis(1)).await;
        broker.put(Datastore::Operational, &path("/interfaces/eth0/up"), json!(true));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let events = drain(&mut rx);
        let partitions: Vec<&Value> = events
            .iter()
            .map(|e| &e["push-change-update"]["datastore-changes"][0]["datastore"])
            .collect();
        assert_eq!(partitions, vec![&json!("configuration"), &json!("operational")]);

        service.shutdown().await;
        assert_eq!(broker.listener_count(), 0);
    }

    /// A broken subscription reports on its own stream only
    #[tokio::test(start_paused = true)]
    async fn test_failure_isolated_per_subscription() {
        let broker = MemoryBroker::new();
        broker.put(Datastore::Operational, &path("/interfaces"), json!({"eth0": {}}));
        let service = SubscriptionService::new(Arc::new(broker.clone()), SchedulerConfig::default());

        let (config_sink, mut config_rx) = ChannelSink::new("config-client");
        let (oper_sink, mut oper_rx) = ChannelSink::new("oper-client");
        service.attach(StreamKind::Configuration, Arc::new(config_sink));
        service.attach(StreamKind::Operational, Arc::new(oper_sink));

        let mut broken = SubscriptionParams::periodic(
            StreamKind::Operational,
            path("/interfaces"),
            Duration::from_secs(1),
        );
        broken.filter = Some(json!("eth0"));
        service.establish(broken).await.unwrap();
        service
            .establish(SubscriptionParams::periodic(
                StreamKind::Configuration,
                path("/system"),
                Duration::from_secs(1),
            ))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let oper: Vec<String> = drain(&mut oper_rx).iter().map(|v| kind(v).to_string()).collect();
        assert_eq!(oper[0], "subscription-started");
        assert!(oper[1..].iter().all(|k| k == "subscription-error"));
        assert_eq!(oper.len(), 4);

        let config: Vec<String> = drain(&mut config_rx).iter().map(|v| kind(v).to_string()).collect();
        assert_eq!(config.len(), 4);
        assert!(config[1..].iter().all(|k| k == "push-update"));

        service.shutdown().await;
    }

    /// Mirror failure on establish surfaces to the caller and keeps the record
    #[tokio::test]
    async fn test_mirror_failure_surfaces() {
        let broker = MemoryBroker::new();
        broker.set_fail_mirror_writes(true);
        let service = SubscriptionService::new(Arc::new(broker.clone()), SchedulerConfig::default());

        let err = service
            .establish(SubscriptionParams::periodic(
                StreamKind::Operational,
                path("/system"),
                Duration::from_secs(1),
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            scheduler::SchedulerError::Contract(ContractError::MirrorWriteFailed { .. })
        ));
        assert_eq!(service.subscriptions().await.len(), 1);
        assert!(broker.mirror_records().is_empty());
        assert_eq!(service.armed_triggers(), 1);

        service.shutdown().await;
    }
}
