//! Facade 指标记录模块
//!
//! 事件队列、端口适配器、观察者总线与网络会话的运行指标。
//! 所有函数在未安装 recorder 时为空操作。

use contracts::MeasurementKind;
use metrics::{counter, gauge, histogram};

/// 事件进入分发队列
pub fn record_event_enqueued(kind: MeasurementKind) {
    counter!(
        "tracking_facade_events_enqueued_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// 事件已投递到接收端口
///
/// `wait_ms` 为事件在队列中的等待时间。
pub fn record_event_delivered(kind: MeasurementKind, wait_ms: f64) {
    counter!(
        "tracking_facade_events_delivered_total",
        "kind" => kind.as_str()
    )
    .increment(1);
    histogram!(
        "tracking_facade_queue_wait_ms",
        "kind" => kind.as_str()
    )
    .record(wait_ms);
}

/// 事件被丢弃
///
/// `reason`: `overflow` (队列溢出丢弃最旧) / `no_callback` / `detached`
pub fn record_event_dropped(kind: MeasurementKind, reason: &'static str) {
    counter!(
        "tracking_facade_events_dropped_total",
        "kind" => kind.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// 当前队列深度
pub fn record_queue_depth(depth: usize) {
    gauge!("tracking_facade_queue_depth").set(depth as f64);
}

/// 字符串形式测量值编解码失败
///
/// `direction`: `decode` (receive_string) / `encode` (string callback)
pub fn record_string_failure(kind: MeasurementKind, direction: &'static str) {
    counter!(
        "tracking_facade_string_failures_total",
        "kind" => kind.as_str(),
        "direction" => direction
    )
    .increment(1);
}

/// 观察者回调失败 (panic 被捕获)
pub fn record_observer_failure(event: &'static str) {
    counter!(
        "tracking_facade_observer_failures_total",
        "event" => event
    )
    .increment(1);
}

/// 拓扑变更通知
pub fn record_topology_change(event: &'static str) {
    counter!(
        "tracking_facade_topology_changes_total",
        "event" => event
    )
    .increment(1);
}

/// 生命周期操作 (load / clear / start / stop)
pub fn record_lifecycle(operation: &'static str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "tracking_facade_lifecycle_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

/// 远端下发的重配置
pub fn record_reconfiguration(success: bool, latency_ms: f64) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "tracking_facade_reconfigurations_total",
        "status" => status
    )
    .increment(1);
    histogram!("tracking_facade_reconfiguration_latency_ms").record(latency_ms);
}

/// 网络会话状态变化
pub fn record_connection_state(state: &'static str) {
    counter!(
        "tracking_facade_connection_transitions_total",
        "state" => state
    )
    .increment(1);
    let connected = if state == "connected" { 1.0 } else { 0.0 };
    gauge!("tracking_facade_connected").set(connected);
}

/// 发送到远端的负载大小
pub fn record_bytes_sent(bytes: usize) {
    counter!("tracking_facade_bytes_sent_total").increment(bytes as u64);
}
