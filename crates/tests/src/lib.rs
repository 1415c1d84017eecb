//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 合约快照测试
//! - 基于 InMemoryBroker 的 e2e 测试（无需真实 broker）
//! - 并发提交与 drain 行为

#[cfg(test)]
mod contract_tests {
    use contracts::{ConfigVersion, Destination, ForwarderConfig};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let _ = ConfigVersion::V1;
    }

    #[test]
    fn test_default_config_round_trips_through_loader() {
        let toml = config_loader::ConfigLoader::to_toml(&ForwarderConfig::default()).unwrap();
        let config =
            config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(config.publish.topic_prefix, "LOG4NET");
        assert_eq!(
            Destination::derive(&config.publish.topic_prefix, "MyLogger").as_str(),
            "LOG4NET.MyLogger"
        );
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use broker::{InMemoryBroker, InMemoryConnection};
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        Batch, BrokerConnection, BrokerTransport, ConnectionState, Endpoint, ErrorHandler,
        ForwarderConfig, Level, LogEvent,
    };
    use dispatcher::{
        decode, BatchDispatcher, BatchPublisher, Executor, OnlyOnceErrorHandler, TokioExecutor,
    };

    const CONFIG: &str = r#"
[connection]
uri = "failover:(tcp://primary:61613,tcp://backup:61613)"

[publish]
topic_prefix = "LOG4NET"
format = "json"
send_timeout_ms = 500

[dispatch]
max_in_flight = 0
drain_timeout_ms = 5000
"#;

    fn config() -> ForwarderConfig {
        ConfigLoader::load_from_str(CONFIG, ConfigFormat::Toml).unwrap()
    }

    async fn open(broker: &InMemoryBroker, config: &ForwarderConfig) -> InMemoryConnection {
        let endpoint = Endpoint::parse(&config.connection.uri).unwrap();
        let mut connection = broker.connect(&endpoint, "e2e-client").await.unwrap();
        connection.start().await.unwrap();
        connection
    }

    fn dispatcher_for(
        connection: &InMemoryConnection,
        config: &ForwarderConfig,
        handler: Arc<dyn ErrorHandler>,
    ) -> BatchDispatcher<broker::InMemorySession> {
        let publisher = BatchPublisher::from_config(connection.session(), &config.publish)
            .with_error_handler(handler);
        let executor: Arc<dyn Executor> = Arc::new(
            TokioExecutor::current()
                .unwrap()
                .with_max_workers(config.dispatch.max_in_flight()),
        );
        BatchDispatcher::new(publisher, executor)
    }

    fn batch(sources: &[&str]) -> Batch {
        sources
            .iter()
            .map(|s| LogEvent::new(*s, Level::Info, format!("from {s}")))
            .collect()
    }

    /// End-to-end: config -> connection -> dispatcher -> wildcard subscriber
    #[tokio::test]
    async fn test_e2e_submit_drain_close() {
        let config = config();
        let broker = InMemoryBroker::new();
        let mut all = broker.subscribe("LOG4NET.>").unwrap();
        let mut connection = open(&broker, &config).await;
        let handler = Arc::new(OnlyOnceErrorHandler::new());
        let dispatcher = dispatcher_for(&connection, &config, handler.clone());

        dispatcher.submit(batch(&["Orders", "Billing", "Orders"]));
        dispatcher.submit(batch(&["Auth"]));

        assert!(dispatcher.await_drain(config.dispatch.drain_timeout()).await);
        connection.close().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Closed);

        let deliveries = all.drain();
        assert_eq!(deliveries.len(), 4);
        for delivery in &deliveries {
            let event = decode(&delivery.message).unwrap();
            assert_eq!(
                delivery.destination.as_str(),
                format!("LOG4NET.{}", event.source)
            );
        }
        assert_eq!(handler.count(), 0);
        assert_eq!(dispatcher.metrics().events_published, 4);
    }

    /// Events of one batch arrive in order at their destination
    #[tokio::test]
    async fn test_e2e_order_within_batch() {
        let config = config();
        let broker = InMemoryBroker::new();
        let mut orders = broker.subscribe("LOG4NET.Orders").unwrap();
        let connection = open(&broker, &config).await;
        let dispatcher = dispatcher_for(&connection, &config, Arc::new(OnlyOnceErrorHandler::new()));

        let events: Batch = (0..20)
            .map(|i| LogEvent::new("Orders", Level::Debug, format!("step {i}")))
            .collect();
        dispatcher.submit(events);
        assert!(dispatcher.await_drain(Duration::from_secs(5)).await);

        let messages: Vec<String> = orders
            .drain()
            .iter()
            .map(|d| decode(&d.message).unwrap().message)
            .collect();
        let expected: Vec<String> = (0..20).map(|i| format!("step {i}")).collect();
        assert_eq!(messages, expected);
    }

    /// Many producers, one dispatcher: counter returns to zero, nothing lost
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_e2e_concurrent_producers() {
        let config = config();
        let broker = InMemoryBroker::new();
        let mut all = broker.subscribe("LOG4NET.*").unwrap();
        let connection = open(&broker, &config).await;
        let dispatcher = Arc::new(dispatcher_for(
            &connection,
            &config,
            Arc::new(OnlyOnceErrorHandler::new()),
        ));

        let producers: Vec<_> = (0..16)
            .map(|p| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    for b in 0..25 {
                        let source = format!("P{p}");
                        dispatcher.submit(batch(&[source.as_str(), source.as_str()]));
                        if b % 5 == 0 {
                            tokio::task::yield_now().await;
                        }
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        assert!(dispatcher.await_drain(Duration::from_secs(10)).await);
        assert_eq!(dispatcher.in_flight(), 0);
        assert!(dispatcher.is_drained());
        assert_eq!(all.drain().len(), 16 * 25 * 2);

        let snapshot = dispatcher.metrics();
        assert_eq!(snapshot.submitted, 400);
        assert_eq!(snapshot.completed, 400);
        assert_eq!(snapshot.failed, 0);
    }

    /// A failing destination aborts only its own batch
    #[tokio::test]
    async fn test_e2e_failure_isolation() {
        let config = config();
        let broker = InMemoryBroker::new();
        broker.reject("LOG4NET.Broken").unwrap();
        let mut all = broker.subscribe("LOG4NET.>").unwrap();
        let connection = open(&broker, &config).await;
        let handler = Arc::new(OnlyOnceErrorHandler::new());
        let dispatcher = dispatcher_for(&connection, &config, handler.clone());

        dispatcher.submit(batch(&["A", "Broken", "C"]));
        dispatcher.submit(batch(&["D", "E"]));
        dispatcher.submit(batch(&["Broken"]));

        assert!(dispatcher.await_drain(Duration::from_secs(5)).await);

        let mut destinations: Vec<String> = all
            .drain()
            .into_iter()
            .map(|d| d.destination.to_string())
            .collect();
        destinations.sort();
        // "C" never goes out: its batch stopped at "Broken"
        assert_eq!(destinations, vec!["LOG4NET.A", "LOG4NET.D", "LOG4NET.E"]);
        assert_eq!(handler.count(), 2);
        assert_eq!(dispatcher.metrics().failed, 2);
    }

    /// Batches submitted after close are dropped and reported, never published
    #[tokio::test]
    async fn test_e2e_closed_connection_drops_batches() {
        let config = config();
        let broker = InMemoryBroker::new();
        let mut all = broker.subscribe("LOG4NET.>").unwrap();
        let mut connection = open(&broker, &config).await;
        let handler = Arc::new(OnlyOnceErrorHandler::new());
        let dispatcher = dispatcher_for(&connection, &config, handler.clone());

        connection.close().await.unwrap();
        dispatcher.submit(batch(&["Late"]));

        assert!(dispatcher.await_drain(Duration::from_secs(5)).await);
        assert!(all.drain().is_empty());
        assert_eq!(dispatcher.metrics().dropped, 1);
        assert_eq!(handler.count(), 1);
    }

    /// Bincode messages decode back to the submitted event
    #[tokio::test]
    async fn test_e2e_bincode_format() {
        let mut config = config();
        config.publish.format = contracts::MessageFormat::Bincode;
        let broker = InMemoryBroker::new();
        let mut sub = broker.subscribe("LOG4NET.Payments").unwrap();
        let connection = open(&broker, &config).await;
        let dispatcher = dispatcher_for(&connection, &config, Arc::new(OnlyOnceErrorHandler::new()));

        let event = LogEvent::new("Payments", Level::Fatal, "ledger mismatch")
            .with_exception("InvariantViolation")
            .with_property("tenant", "acme");
        dispatcher.submit(Batch::new(vec![event.clone()]));
        assert!(dispatcher.await_drain(Duration::from_secs(5)).await);

        let delivery = sub
            .recv_timeout(Duration::from_secs(1))
            .await
            .expect("delivery");
        assert_eq!(delivery.message.content_type, "application/x-bincode");
        assert_eq!(decode(&delivery.message).unwrap(), event);
    }
}
