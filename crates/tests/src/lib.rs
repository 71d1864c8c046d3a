//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 组件类名与测量类型的合约测试
//! - 分发顺序与队列上限
//! - 生命周期、观察者通知与失败加载
//! - 服务器重配置与字符串端口

#[cfg(test)]
mod support {
    use std::any::Any;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use contracts::{
        ComponentId, ContractError, DataflowObserver, Measurement, MeasurementKind, Pose, Subgraph,
    };
    use facade::AdvancedFacade;
    use ports::{Component, ComponentContext, InputPort, OutputPort, PullSupplier};

    pub const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn pipeline(suffix: &str) -> String {
        format!(
            r#"{{"subgraphs": [
            {{"name": "Injector", "id": "src", "component": {{"class": "ApplicationPushSource{suffix}"}}}},
            {{"name": "Viewer", "id": "sink", "component": {{"class": "ApplicationPushSink{suffix}"}},
             "inputs": [{{"port": "Input", "source": "src", "source_port": "Output"}}]}}]}}"#
        )
    }

    pub fn started(suffix: &str) -> AdvancedFacade {
        let facade = AdvancedFacade::builder()
            .component("PoseClock", pose_clock)
            .build()
            .unwrap();
        facade.load_dataflow_str(&pipeline(suffix), true).unwrap();
        facade.start_dataflow().unwrap();
        facade
    }

    pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + TIMEOUT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    /// Records `+pattern/id` and `-pattern/id`
    #[derive(Default)]
    pub struct Recorder {
        pub events: Mutex<Vec<String>>,
    }

    impl Recorder {
        pub fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl DataflowObserver for Recorder {
        fn notify_add_component(&self, pattern: &str, id: &ComponentId, _: &Subgraph) {
            self.events.lock().unwrap().push(format!("+{pattern}/{id}"));
        }

        fn notify_delete_component(&self, pattern: &str, id: &ComponentId) {
            self.events.lock().unwrap().push(format!("-{pattern}/{id}"));
        }
    }

    /// Pull source answering identity poses from timestamp 100 on
    pub struct PoseClock {
        name: ComponentId,
        output: Arc<PullSupplier<Pose>>,
    }

    pub fn pose_clock(ctx: &ComponentContext) -> Result<Arc<dyn Component>, ContractError> {
        let output = ctx.pull_supplier::<Pose, _>("Output", |t| {
            if t < 100 {
                Err(ContractError::not_available(MeasurementKind::Pose, t, "before first sample"))
            } else {
                Ok(Measurement::new(t, Pose::identity()))
            }
        });
        Ok(Arc::new(PoseClock {
            name: ctx.name().clone(),
            output,
        }))
    }

    impl Component for PoseClock {
        fn name(&self) -> &ComponentId {
            &self.name
        }

        fn class(&self) -> &str {
            "PoseClock"
        }

        fn inputs(&self) -> Vec<Arc<dyn InputPort>> {
            Vec::new()
        }

        fn outputs(&self) -> Vec<Arc<dyn OutputPort>> {
            vec![Arc::clone(&self.output) as Arc<dyn OutputPort>]
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }
}

#[cfg(test)]
mod contract_tests {
    use contracts::MeasurementKind;
    use dataflow::ComponentRegistry;

    #[test]
    fn test_every_kind_has_three_endpoints() {
        let registry = ComponentRegistry::with_builtins();
        for kind in MeasurementKind::ALL {
            for prefix in ["ApplicationPushSink", "ApplicationPushSource", "ApplicationPullSink"] {
                let class = format!("{prefix}{}", kind.class_suffix());
                assert!(registry.contains(&class), "missing {class}");
            }
        }
        assert_eq!(registry.len(), MeasurementKind::ALL.len() * 3);
    }
}

#[cfg(test)]
mod dispatch_tests {
    use std::time::Duration;

    use bytes::Bytes;
    use contracts::{ImageData, Measurement, Pose};

    use crate::support::{started, TIMEOUT};

    #[test]
    fn test_pending_events_delivered_in_priority_order() {
        let facade = started("Pose");
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
        let (seen_tx, seen_rx) = crossbeam_channel::unbounded();

        facade
            .set_callback::<Pose, _>("sink", move |m| {
                if m.timestamp() == 1 {
                    let _ = entered_tx.send(());
                    let _ = gate_rx.recv_timeout(TIMEOUT);
                }
                let _ = seen_tx.send(m.timestamp());
            })
            .unwrap();

        let source = facade.push_source::<Pose>("src").unwrap();
        source.send(Measurement::new(1, Pose::identity()));
        entered_rx.recv_timeout(TIMEOUT).unwrap();
        for t in [30, 10, 20] {
            source.send(Measurement::new(t, Pose::identity()));
        }
        gate_tx.send(()).unwrap();

        let seen: Vec<u64> = (0..4).map(|_| seen_rx.recv_timeout(TIMEOUT).unwrap()).collect();
        assert_eq!(seen, vec![1, 10, 20, 30]);
    }

    #[test]
    fn test_image_queue_keeps_only_latest() {
        let facade = started("VisionImage");
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
        let (seen_tx, seen_rx) = crossbeam_channel::unbounded();

        facade
            .set_callback::<ImageData, _>("sink", move |m| {
                if m.timestamp() == 1 {
                    let _ = entered_tx.send(());
                    let _ = gate_rx.recv_timeout(TIMEOUT);
                }
                let _ = seen_tx.send(m.timestamp());
            })
            .unwrap();

        let image = ImageData {
            width: 2,
            height: 2,
            channels: 1,
            depth: 8,
            width_step: 2,
            data: Bytes::from_static(&[0, 1, 2, 3]),
        };
        let source = facade.push_source::<ImageData>("src").unwrap();
        source.send(Measurement::new(1, image.clone()));
        entered_rx.recv_timeout(TIMEOUT).unwrap();
        for t in [2, 3, 4] {
            source.send(Measurement::new(t, image.clone()));
        }
        gate_tx.send(()).unwrap();

        assert_eq!(seen_rx.recv_timeout(TIMEOUT).unwrap(), 1);
        assert_eq!(seen_rx.recv_timeout(TIMEOUT).unwrap(), 4);
        assert!(seen_rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use std::sync::Arc;

    use contracts::{ContractError, GraphDocument, Subgraph};
    use facade::AdvancedFacade;

    use crate::support::{pipeline, started, Recorder};

    #[test]
    fn test_removals_notified_before_additions() {
        let facade = started("Pose");
        let recorder = Arc::new(Recorder::default());
        facade.add_observer(recorder.clone()).unwrap();

        let change = GraphDocument::new(vec![
            Subgraph::component("Viewer2", "sink2", "ApplicationPushSinkPose").with_input("Input", "src", "Output"),
            Subgraph::deletion("Viewer", "sink"),
        ]);
        facade.load_document(change, false).unwrap();

        assert_eq!(recorder.take(), vec!["-Viewer/sink", "+Viewer2/sink2"]);
        let status = facade.status();
        assert!(status.component("sink").is_none());
        assert!(status.component("sink2").is_some());
        assert!(status.started);
    }

    #[test]
    fn test_failed_load_leaves_graph_intact() {
        let facade = started("Pose");
        let recorder = Arc::new(Recorder::default());
        facade.add_observer(recorder.clone()).unwrap();
        let before = facade.status();

        let change = GraphDocument::new(vec![
            Subgraph::deletion("Viewer", "sink"),
            Subgraph::component("Broken", "broken", "NoSuchClass"),
        ]);
        let result = facade.load_document(change, false);

        assert!(matches!(result, Err(ContractError::UnknownClass { .. })));
        assert!(recorder.take().is_empty());
        let after = facade.status();
        assert_eq!(after.generation, before.generation);
        assert!(after.component("sink").is_some());
        assert!(facade.push_sink::<contracts::Pose>("sink").is_ok());
    }

    #[test]
    fn test_replace_load_swaps_graph() {
        let facade = AdvancedFacade::new().unwrap();
        facade.load_dataflow_str(&pipeline("Pose"), true).unwrap();
        facade.load_dataflow_str(&pipeline("Distance"), true).unwrap();

        assert!(matches!(
            facade.push_sink::<contracts::Pose>("sink"),
            Err(ContractError::TypeMismatch { .. })
        ));
        assert!(facade.push_sink::<f64>("sink").is_ok());
    }
}

#[cfg(test)]
mod network_tests {
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::Arc;

    use contracts::{ContractError, Measurement, Pose};
    use facade::{ConnectionState, SimpleFacade};

    use crate::support::{started, wait_until, Recorder, TIMEOUT};

    const ADD_LATE_SINK: &str = r#"{"subgraphs": [
        {"name": "Late", "id": "late", "component": {"class": "ApplicationPushSinkPose"},
         "inputs": [{"port": "Input", "source": "src", "source_port": "Output"}]}]}"#;

    fn write_frame(stream: &mut std::net::TcpStream, payload: &[u8]) {
        stream.write_all(&(payload.len() as u32).to_be_bytes()).unwrap();
        stream.write_all(payload).unwrap();
    }

    #[test]
    fn test_server_document_applied_while_running() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let facade = started("Pose");
        let recorder = Arc::new(Recorder::default());
        facade.add_observer(recorder.clone()).unwrap();

        facade.connect_to_server(&address).unwrap();
        assert_eq!(facade.connection_state(), ConnectionState::Connected);
        let (mut peer, _) = listener.accept().unwrap();
        write_frame(&mut peer, ADD_LATE_SINK.as_bytes());

        assert!(wait_until(|| facade.status().component("late").is_some()));
        assert!(facade.status().started);
        assert_eq!(recorder.take(), vec!["+Late/late"]);

        let (tx, rx) = crossbeam_channel::unbounded();
        facade
            .set_callback::<Pose, _>("late", move |m| {
                let _ = tx.send(m.timestamp());
            })
            .unwrap();
        facade
            .push_source::<Pose>("src")
            .unwrap()
            .send(Measurement::new(11, Pose::identity()));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 11);
    }

    #[tokio::test]
    async fn test_status_subscription_sees_server_change() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let facade = started("Pose");
        let mut status = facade.dataflow().subscribe();
        let generation = status.borrow().generation;

        facade.connect_to_server(&address).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        write_frame(&mut peer, ADD_LATE_SINK.as_bytes());

        let changed = tokio::time::timeout(TIMEOUT, status.wait_for(|s| s.generation > generation))
            .await
            .unwrap()
            .unwrap();
        assert!(changed.component("late").is_some());
        assert!(changed.started);
    }

    #[test]
    fn test_server_document_keeps_stopped_dataflow_stopped() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let facade = started("Pose");
        facade.stop_dataflow().unwrap();

        facade.connect_to_server(&address).unwrap();
        let (mut peer, _) = listener.accept().unwrap();
        write_frame(&mut peer, ADD_LATE_SINK.as_bytes());

        assert!(wait_until(|| facade.status().component("late").is_some()));
        assert!(!facade.status().started);
    }

    #[test]
    fn test_send_without_connection() {
        let facade = started("Pose");
        assert!(matches!(facade.send_to_server_str("{}"), Err(ContractError::NotConnected)));

        let simple = SimpleFacade::new();
        assert!(!simple.send_to_server_string("{}"));
        assert_eq!(simple.last_error().as_deref(), Some("no connection to server"));
    }

    #[test]
    fn test_server_close_breaks_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let facade = started("Pose");

        facade.connect_to_server(&address).unwrap();
        let (peer, _) = listener.accept().unwrap();
        drop(peer);

        assert!(wait_until(|| facade.connection_state() == ConnectionState::Broken));
        assert!(matches!(facade.send_to_server_str("{}"), Err(ContractError::NotConnected)));
    }
}

#[cfg(test)]
mod port_tests {
    use contracts::{ContractError, Pose};
    use facade::{SimpleFacade, SimplePose};

    use crate::support::{started, TIMEOUT};

    const PULL_PIPELINE: &str = r#"{"subgraphs": [
        {"name": "Clock", "id": "clock", "component": {"class": "PoseClock"}},
        {"name": "Reader", "id": "reader", "component": {"class": "ApplicationPullSinkPose"},
         "inputs": [{"port": "Input", "source": "clock", "source_port": "Output"}]},
        {"name": "Dangling", "id": "dangling", "component": {"class": "ApplicationPullSinkPose"}}]}"#;

    #[test]
    fn test_pull_reports_not_available() {
        let facade = started("Pose");
        facade.load_dataflow_str(PULL_PIPELINE, true).unwrap();

        let reader = facade.pull_sink::<Pose>("reader").unwrap();
        assert_eq!(reader.get(150).unwrap().timestamp(), 150);
        assert!(matches!(reader.get(50), Err(ContractError::NotAvailable { timestamp: 50, .. })));

        let dangling = facade.pull_sink::<Pose>("dangling").unwrap();
        assert!(matches!(dangling.get(150), Err(ContractError::NotAvailable { .. })));
    }

    #[test]
    fn test_simple_pull_keeps_error() {
        let facade = SimpleFacade::from_advanced(started("Pose"));
        assert!(facade.load_dataflow_string(PULL_PIPELINE));

        let reader = facade.pose_pull_sink("reader").unwrap();
        let pose: SimplePose = reader.get(200).unwrap();
        assert_eq!((pose.rw, pose.timestamp), (1.0, 200));
        assert!(reader.get(1).is_none());
        assert!(reader.last_error().unwrap().contains("before first sample"));

        assert!(facade.pull_string("reader", 300).unwrap().contains("\"timestamp\":300"));
    }

    #[test]
    fn test_malformed_strings_are_swallowed() {
        let facade = started("Pose");
        let (tx, rx) = crossbeam_channel::unbounded();
        facade
            .set_string_callback("sink", move |s| {
                let _ = tx.send(s.to_string());
            })
            .unwrap();

        let source = facade.string_source("src").unwrap();
        source.receive_string("not json at all");
        source.receive_string(r#"{"timestamp": 3, "value": "wrong shape"}"#);
        assert_eq!(facade.push_source::<Pose>("src").unwrap().string_failures(), 2);

        let valid = serde_json_pose(5);
        source.receive_string(&valid);
        let delivered = rx.recv_timeout(TIMEOUT).unwrap();
        assert!(delivered.contains("\"timestamp\":5"));
    }

    fn serde_json_pose(timestamp: u64) -> String {
        ports::codec::encode(&contracts::Measurement::new(timestamp, Pose::identity())).unwrap()
    }
}
