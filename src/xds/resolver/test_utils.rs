use std::{
    collections::HashMap,
    fmt::Display,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use tokio::sync::mpsc;

use crate::client::name_resolution::{ChannelController, ResolverUpdate};
use crate::client::service_config::ServiceConfig;
use crate::xds::bootstrap::BootstrapConfig;
use crate::xds::client::{self as xdsclient, WatchHandle, XdsClient, XdsClientFactory};
use crate::xds::resource::{
    ListenerUpdate, PathMatcher, Route, RouteActionType, RouteConfigUpdate, VirtualHost,
    WeightedCluster,
};

pub(super) enum TestEvent {
    ListenerWatchStarted(String),
    ListenerWatchCancelled(String),
    RouteConfigWatchStarted(String),
    RouteConfigWatchCancelled(String),
    UpdateState(ResolverUpdate),
    ReportError(String),
    ClientClosed,
}

impl Display for TestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ListenerWatchStarted(name) => write!(f, "ListenerWatchStarted({name})"),
            Self::ListenerWatchCancelled(name) => write!(f, "ListenerWatchCancelled({name})"),
            Self::RouteConfigWatchStarted(name) => write!(f, "RouteConfigWatchStarted({name})"),
            Self::RouteConfigWatchCancelled(name) => {
                write!(f, "RouteConfigWatchCancelled({name})")
            }
            Self::UpdateState(_) => write!(f, "UpdateState"),
            Self::ReportError(err) => write!(f, "ReportError({err})"),
            Self::ClientClosed => write!(f, "ClientClosed"),
        }
    }
}

// A watch handle that runs its cancel closure exactly once.
struct FakeWatchHandle {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl FakeWatchHandle {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Box<Self> {
        Box::new(Self {
            cancel: Mutex::new(Some(Box::new(cancel))),
        })
    }
}

impl WatchHandle for FakeWatchHandle {
    fn cancel(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap().take() {
            cancel();
        }
    }
}

type ListenerWatchers = Arc<Mutex<HashMap<String, Arc<dyn xdsclient::ListenerWatcher>>>>;
type RouteConfigWatchers = Arc<Mutex<HashMap<String, Arc<dyn xdsclient::RouteConfigWatcher>>>>;

/// An xDS client double that records watch registrations as test events and
/// lets tests push resource updates into registered watchers.
pub(super) struct FakeXdsClient {
    bootstrap: Arc<BootstrapConfig>,
    tx_events: mpsc::UnboundedSender<TestEvent>,
    listener_watchers: ListenerWatchers,
    route_config_watchers: RouteConfigWatchers,
}

impl FakeXdsClient {
    pub(super) fn new(
        bootstrap: BootstrapConfig,
        tx_events: mpsc::UnboundedSender<TestEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bootstrap: Arc::new(bootstrap),
            tx_events,
            listener_watchers: Arc::default(),
            route_config_watchers: Arc::default(),
        })
    }

    pub(super) fn listener_watcher(&self, name: &str) -> Arc<dyn xdsclient::ListenerWatcher> {
        self.listener_watchers
            .lock()
            .unwrap()
            .get(name)
            .unwrap_or_else(|| panic!("no listener watcher registered for {name}"))
            .clone()
    }

    pub(super) fn route_config_watcher(
        &self,
        name: &str,
    ) -> Arc<dyn xdsclient::RouteConfigWatcher> {
        self.route_config_watchers
            .lock()
            .unwrap()
            .get(name)
            .unwrap_or_else(|| panic!("no route config watcher registered for {name}"))
            .clone()
    }

    pub(super) fn send_listener_update(&self, name: &str, update: ListenerUpdate) {
        self.listener_watcher(name).on_update(update);
    }

    pub(super) fn send_listener_error(&self, name: &str, err: &str) {
        self.listener_watcher(name).on_error(err.to_string());
    }

    pub(super) fn send_listener_not_found(&self, name: &str) {
        self.listener_watcher(name).on_resource_not_found();
    }

    pub(super) fn send_route_config_update(&self, name: &str, update: RouteConfigUpdate) {
        self.route_config_watcher(name).on_update(update);
    }

    pub(super) fn send_route_config_error(&self, name: &str, err: &str) {
        self.route_config_watcher(name).on_error(err.to_string());
    }

    pub(super) fn send_route_config_not_found(&self, name: &str) {
        self.route_config_watcher(name).on_resource_not_found();
    }
}

impl XdsClient for FakeXdsClient {
    fn watch_listener(
        &self,
        resource_name: &str,
        watcher: Arc<dyn xdsclient::ListenerWatcher>,
    ) -> Box<dyn WatchHandle> {
        let name = resource_name.to_string();
        self.listener_watchers
            .lock()
            .unwrap()
            .insert(name.clone(), watcher);
        self.tx_events
            .send(TestEvent::ListenerWatchStarted(name.clone()))
            .unwrap();

        let watchers = self.listener_watchers.clone();
        let tx_events = self.tx_events.clone();
        FakeWatchHandle::new(move || {
            watchers.lock().unwrap().remove(&name);
            let _ = tx_events.send(TestEvent::ListenerWatchCancelled(name));
        })
    }

    fn watch_route_config(
        &self,
        resource_name: &str,
        watcher: Arc<dyn xdsclient::RouteConfigWatcher>,
    ) -> Box<dyn WatchHandle> {
        let name = resource_name.to_string();
        self.route_config_watchers
            .lock()
            .unwrap()
            .insert(name.clone(), watcher);
        self.tx_events
            .send(TestEvent::RouteConfigWatchStarted(name.clone()))
            .unwrap();

        let watchers = self.route_config_watchers.clone();
        let tx_events = self.tx_events.clone();
        FakeWatchHandle::new(move || {
            watchers.lock().unwrap().remove(&name);
            let _ = tx_events.send(TestEvent::RouteConfigWatchCancelled(name));
        })
    }

    fn bootstrap_config(&self) -> Arc<BootstrapConfig> {
        self.bootstrap.clone()
    }

    fn close(&self) {
        let _ = self.tx_events.send(TestEvent::ClientClosed);
    }
}

pub(super) struct FakeClientFactory {
    pub(super) client: Arc<FakeXdsClient>,
}

impl XdsClientFactory for FakeClientFactory {
    fn new_client(
        &self,
    ) -> Result<Arc<dyn XdsClient>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.client.clone())
    }
}

/// A channel controller double that forwards every resolver interaction to
/// the test's event stream.
pub(super) struct FakeChannel {
    pub(super) tx_events: mpsc::UnboundedSender<TestEvent>,
    // When set, parse_service_config fails, exercising the emission failure
    // path.
    pub(super) fail_service_config_parse: AtomicBool,
}

impl FakeChannel {
    pub(super) fn new(tx_events: mpsc::UnboundedSender<TestEvent>) -> Arc<Self> {
        Arc::new(Self {
            tx_events,
            fail_service_config_parse: AtomicBool::new(false),
        })
    }
}

impl ChannelController for FakeChannel {
    fn update_state(
        &self,
        update: ResolverUpdate,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.tx_events.send(TestEvent::UpdateState(update)).unwrap();
        Ok(())
    }

    fn report_error(&self, error: Box<dyn std::error::Error + Send + Sync>) {
        self.tx_events
            .send(TestEvent::ReportError(error.to_string()))
            .unwrap();
    }

    fn parse_service_config(
        &self,
        config: &str,
    ) -> Result<ServiceConfig, Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_service_config_parse.load(Ordering::Acquire) {
            return Err("service config parsing disabled by test".into());
        }
        ServiceConfig::from_json(config)
    }
}

/// A bootstrap config whose default template passes the endpoint through
/// unchanged.
pub(super) fn default_bootstrap() -> BootstrapConfig {
    BootstrapConfig::default()
}

pub(super) fn listener_with_route_config_name(name: &str) -> ListenerUpdate {
    ListenerUpdate {
        route_config_name: name.to_string(),
        ..Default::default()
    }
}

pub(super) fn prefix_route(prefix: &str, clusters: &[(&str, u32)]) -> Route {
    Route {
        path_matcher: PathMatcher::Prefix(prefix.to_string()),
        weighted_clusters: clusters
            .iter()
            .map(|(name, weight)| {
                (
                    name.to_string(),
                    WeightedCluster {
                        weight: *weight,
                        ..Default::default()
                    },
                )
            })
            .collect(),
        action_type: RouteActionType::Route,
        ..Default::default()
    }
}

pub(super) fn virtual_host_for(host: &str, routes: Vec<Route>) -> VirtualHost {
    VirtualHost {
        domains: vec![host.to_string()],
        routes,
        ..Default::default()
    }
}

/// A route configuration with a single virtual host serving `host`, routing
/// every method to the given weighted clusters.
pub(super) fn route_config_for(host: &str, clusters: &[(&str, u32)]) -> RouteConfigUpdate {
    RouteConfigUpdate {
        virtual_hosts: vec![virtual_host_for(host, vec![prefix_route("/", clusters)])],
        ..Default::default()
    }
}

pub(super) async fn verify_listener_watch_started(
    rx_events: &mut mpsc::UnboundedReceiver<TestEvent>,
) -> String {
    match rx_events.recv().await.unwrap() {
        TestEvent::ListenerWatchStarted(name) => name,
        other => panic!("unexpected event {other}"),
    }
}

pub(super) async fn verify_listener_watch_cancelled(
    rx_events: &mut mpsc::UnboundedReceiver<TestEvent>,
) -> String {
    match rx_events.recv().await.unwrap() {
        TestEvent::ListenerWatchCancelled(name) => name,
        other => panic!("unexpected event {other}"),
    }
}

pub(super) async fn verify_route_config_watch_started(
    rx_events: &mut mpsc::UnboundedReceiver<TestEvent>,
) -> String {
    match rx_events.recv().await.unwrap() {
        TestEvent::RouteConfigWatchStarted(name) => name,
        other => panic!("unexpected event {other}"),
    }
}

pub(super) async fn verify_route_config_watch_cancelled(
    rx_events: &mut mpsc::UnboundedReceiver<TestEvent>,
) -> String {
    match rx_events.recv().await.unwrap() {
        TestEvent::RouteConfigWatchCancelled(name) => name,
        other => panic!("unexpected event {other}"),
    }
}

pub(super) async fn verify_update_state(
    rx_events: &mut mpsc::UnboundedReceiver<TestEvent>,
) -> ResolverUpdate {
    match rx_events.recv().await.unwrap() {
        TestEvent::UpdateState(update) => update,
        other => panic!("unexpected event {other}"),
    }
}

pub(super) async fn verify_report_error(
    rx_events: &mut mpsc::UnboundedReceiver<TestEvent>,
) -> String {
    match rx_events.recv().await.unwrap() {
        TestEvent::ReportError(err) => err,
        other => panic!("unexpected event {other}"),
    }
}

pub(super) async fn verify_client_closed(rx_events: &mut mpsc::UnboundedReceiver<TestEvent>) {
    match rx_events.recv().await.unwrap() {
        TestEvent::ClientClosed => {}
        other => panic!("unexpected event {other}"),
    }
}

const DEFAULT_TEST_SHORT_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(100);

pub(super) async fn verify_no_activity(rx_events: &mut mpsc::UnboundedReceiver<TestEvent>) {
    tokio::select! {
        _ = tokio::time::sleep(DEFAULT_TEST_SHORT_TIMEOUT) => {}
        event = rx_events.recv() => {
            panic!("unexpected event {}", event.unwrap());
        }
    }
}

/// Extracts the cluster-manager children object from an emitted service
/// config.
pub(super) fn service_config_children(update: &ResolverUpdate) -> serde_json::Value {
    let sc = update
        .service_config
        .as_ref()
        .unwrap()
        .as_ref()
        .expect("update carries no service config");
    sc.value()["loadBalancingConfig"][0]["xds_cluster_manager"]["children"].clone()
}
