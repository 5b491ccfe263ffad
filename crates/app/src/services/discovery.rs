//! Discovery watcher: creates proxies for switch services that appear on
//! the network and retires them when they go away.
//!
//! Liveness does not rely on `delete` notifications alone: every service
//! seen on the registry gets a timestamp, refreshed by each re-announcement,
//! and a periodic sweep retires the ones that went quiet for longer than
//! the TTL. Retiring means closing the proxy; a per-proxy task then removes
//! it from the hub, so an explicit `delete` racing with the sweep still
//! removes it exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use remoteswitch_domain::error::SwitchError;
use remoteswitch_domain::service::{SERVICE_PREFIX, display_name, is_switch_service};

use crate::event_bus::StateBus;
use crate::ports::{
    RegistryAction, RegistryEvent, ServiceRegistry, StateBroker, SwitchDevice, SwitchRpc,
};
use crate::services::hub::Hub;
use crate::services::proxy::SwitchProxy;

/// Discovery tuning.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Namespace prefix identifying switch services.
    pub prefix: String,
    /// Age after which a silent service is retired.
    pub ttl: Duration,
    /// Period of the liveness sweep.
    pub sweep_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            prefix: SERVICE_PREFIX.to_string(),
            ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(1),
        }
    }
}

/// Last time each service was seen on the registry.
#[derive(Debug, Default)]
pub struct ServiceCache {
    last_seen: HashMap<String, Instant>,
}

impl ServiceCache {
    /// Record that `service` was seen at `now`.
    pub fn touch(&mut self, service: &str, now: Instant) {
        self.last_seen.insert(service.to_string(), now);
    }

    /// Drop `service`. Returns `false` when it was not tracked.
    pub fn forget(&mut self, service: &str) -> bool {
        self.last_seen.remove(service).is_some()
    }

    /// Remove and return every service last seen more than `ttl` before `now`.
    pub fn expire(&mut self, now: Instant, ttl: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        self.last_seen.retain(|service, seen| {
            let alive = now.saturating_duration_since(*seen) <= ttl;
            if !alive {
                expired.push(service.clone());
            }
            alive
        });
        expired.sort();
        expired
    }

    #[must_use]
    pub fn contains(&self, service: &str) -> bool {
        self.last_seen.contains_key(service)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

type ProxyMap<T> = Arc<Mutex<HashMap<String, SwitchProxy<T>>>>;

/// Keeps the hub's set of proxies in line with the service registry.
///
/// `D` is the hub's device type; proxies enter the hub through `D::from`.
pub struct DiscoveryWatcher<D, T> {
    hub: Arc<Hub<D>>,
    transport: T,
    bus: StateBus,
    config: DiscoveryConfig,
    cache: Mutex<ServiceCache>,
    proxies: ProxyMap<T>,
}

impl<D, T> DiscoveryWatcher<D, T>
where
    D: SwitchDevice + From<SwitchProxy<T>>,
    T: SwitchRpc + StateBroker + ServiceRegistry + Clone,
{
    pub fn new(hub: Arc<Hub<D>>, transport: T, bus: StateBus, config: DiscoveryConfig) -> Self {
        Self {
            hub,
            transport,
            bus,
            config,
            cache: Mutex::new(ServiceCache::default()),
            proxies: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn cache(&self) -> MutexGuard<'_, ServiceCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn proxies(&self) -> MutexGuard<'_, HashMap<String, SwitchProxy<T>>> {
        self.proxies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Services currently mirrored by a live proxy.
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut services: Vec<String> = self.proxies().keys().cloned().collect();
        services.sort();
        services
    }

    /// Mirror the services already registered, then follow the registry and
    /// run the liveness sweep until `cancel` fires.
    ///
    /// Proxies are seeded on their own tasks, so a slow service holds up
    /// neither the registry nor the sweep. Every proxy still alive when
    /// `cancel` fires is closed.
    ///
    /// # Errors
    ///
    /// Returns an error when the registry cannot be watched or listed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SwitchError> {
        // watch first so nothing registered during the listing is missed
        let mut events = self.transport.watch().await?;
        let mut seeding = Seeding::default();
        for service in self.transport.list_services().await? {
            if is_switch_service(&self.config.prefix, &service) {
                self.cache().touch(&service, Instant::now());
                self.seed(&service, &mut seeding);
            }
        }

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle(event, &mut seeding),
                    None => {
                        tracing::warn!("registry watch ended");
                        break;
                    }
                },
                Some(seeded) = seeding.tasks.join_next() => match seeded {
                    Ok((service, result)) => {
                        seeding.services.remove(&service);
                        self.register(&service, result);
                    }
                    Err(err) => tracing::warn!(error = %err, "seeding task failed"),
                },
                _ = sweep.tick() => self.sweep(),
            }
        }

        seeding.tasks.abort_all();
        let remaining: Vec<SwitchProxy<T>> = self.proxies().values().cloned().collect();
        for proxy in remaining {
            proxy.close();
        }
        Ok(())
    }

    fn handle(&self, event: RegistryEvent, seeding: &mut Seeding<T>) {
        if !is_switch_service(&self.config.prefix, &event.service) {
            tracing::trace!(service = %event.service, "ignoring non switch service");
            return;
        }
        match event.action {
            RegistryAction::Create | RegistryAction::Update => {
                self.cache().touch(&event.service, Instant::now());
                self.seed(&event.service, seeding);
            }
            RegistryAction::Delete => {
                self.cache().forget(&event.service);
                self.retire(&event.service);
            }
        }
    }

    /// Retire every service that has not been seen for longer than the TTL.
    fn sweep(&self) {
        let expired = self.cache().expire(Instant::now(), self.config.ttl);
        for service in expired {
            tracing::info!(service = %service, "service liveness expired");
            self.retire(&service);
        }
    }

    fn retire(&self, service: &str) {
        let proxy = self.proxies().get(service).cloned();
        if let Some(proxy) = proxy {
            proxy.close();
        }
    }

    /// Start connecting a proxy for `service` unless one exists or is on
    /// its way.
    fn seed(&self, service: &str, seeding: &mut Seeding<T>) {
        if self.proxies().contains_key(service) || seeding.services.contains(service) {
            return;
        }
        if self.hub.switch(&display_name(service)).is_some() {
            tracing::debug!(%service, "a switch with this name is already registered");
            return;
        }

        seeding.services.insert(service.to_string());
        let service = service.to_string();
        let transport = self.transport.clone();
        let bus = self.bus.clone();
        seeding.tasks.spawn(async move {
            let result = SwitchProxy::connect(&service, transport, bus).await;
            (service, result)
        });
    }

    #[tracing::instrument(skip(self, result))]
    fn register(&self, service: &str, result: Result<SwitchProxy<T>, SwitchError>) {
        let proxy = match result {
            Ok(proxy) => proxy,
            Err(err) => {
                tracing::warn!(error = %err, "unable to mirror service");
                return;
            }
        };
        if !self.cache().contains(service) {
            tracing::debug!("service went away while seeding");
            proxy.close();
            return;
        }

        let device = Arc::new(D::from(proxy.clone()));
        if let Err(err) = self.hub.add_switch(Arc::clone(&device)) {
            tracing::warn!(error = %err, "unable to register proxy");
            proxy.close();
            return;
        }
        self.proxies().insert(service.to_string(), proxy.clone());

        let hub = Arc::clone(&self.hub);
        let proxies = Arc::clone(&self.proxies);
        tokio::spawn(async move {
            proxy.disposed().await;
            hub.remove_switch(&device);
            let mut proxies = proxies.lock().unwrap_or_else(PoisonError::into_inner);
            if proxies
                .get(proxy.service())
                .is_some_and(|current| current.same_as(&proxy))
            {
                proxies.remove(proxy.service());
            }
        });
    }
}

/// Proxies being seeded, by service.
struct Seeding<T> {
    tasks: JoinSet<(String, Result<SwitchProxy<T>, SwitchError>)>,
    services: HashSet<String>,
}

impl<T> Default for Seeding<T> {
    fn default() -> Self {
        Self {
            tasks: JoinSet::new(),
            services: HashSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryTransport, two_way_port};
    use remoteswitch_domain::event::{HubEvent, HubEventKind};
    use remoteswitch_domain::switch::{Device, Port};
    use tokio::sync::broadcast;
    use tokio::sync::broadcast::error::TryRecvError;

    const STACK: &str = "shackbus.switch.Stack";

    type Proxy = SwitchProxy<MemoryTransport>;

    struct Fixture {
        hub: Arc<Hub<Proxy>>,
        transport: MemoryTransport,
        watcher: Arc<DiscoveryWatcher<Proxy, MemoryTransport>>,
        events: broadcast::Receiver<HubEvent>,
        cancel: CancellationToken,
    }

    fn remote() -> Device {
        Device::new("Stack", 0, vec![two_way_port()])
    }

    fn fixture(transport: MemoryTransport) -> Fixture {
        let hub = Arc::new(Hub::new(32));
        let events = hub.subscribe().receiver;
        let watcher = Arc::new(DiscoveryWatcher::new(
            Arc::clone(&hub),
            transport.clone(),
            StateBus::new(8),
            DiscoveryConfig::default(),
        ));
        let cancel = CancellationToken::new();
        let running = Arc::clone(&watcher);
        let token = cancel.clone();
        tokio::spawn(async move { running.run(token).await });
        Fixture {
            hub,
            transport,
            watcher,
            events,
            cancel,
        }
    }

    async fn next_event(events: &mut broadcast::Receiver<HubEvent>) -> HubEvent {
        tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("hub event expected")
            .unwrap()
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn should_mirror_services_listed_at_startup() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        transport.host("shackbus.rotator.Az", remote());
        let mut fx = fixture(transport);

        let event = next_event(&mut fx.events).await;

        assert_eq!(event.kind, HubEventKind::Add);
        assert_eq!(event.device_name, "Stack");
        settle().await;
        assert_eq!(fx.hub.len(), 1);
        assert_eq!(fx.watcher.services(), [STACK]);
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_mirror_service_announced_later() {
        let mut fx = fixture(MemoryTransport::default());
        settle().await;

        fx.transport.host(STACK, remote());
        fx.transport.announce(RegistryAction::Create, STACK);

        assert_eq!(next_event(&mut fx.events).await.kind, HubEventKind::Add);
        assert!(fx.hub.switch("Stack").is_some());
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_create_single_proxy_for_repeated_announcements() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        let mut fx = fixture(transport);
        next_event(&mut fx.events).await;

        fx.transport.announce(RegistryAction::Update, STACK);
        fx.transport.announce(RegistryAction::Update, STACK);
        settle().await;

        assert!(matches!(fx.events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(fx.hub.len(), 1);
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_skip_service_whose_seed_fails() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        transport.break_service(STACK);
        let fx = fixture(transport);
        settle().await;

        assert!(fx.hub.is_empty());
        assert!(fx.watcher.services().is_empty());
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_mirror_other_services_while_one_seed_hangs() {
        let transport = MemoryTransport::default();
        transport.host("shackbus.switch.Slow", remote());
        transport.stall_service("shackbus.switch.Slow");
        let mut fx = fixture(transport);
        settle().await;

        fx.transport.host(STACK, remote());
        fx.transport.announce(RegistryAction::Create, STACK);

        let event = next_event(&mut fx.events).await;
        assert_eq!(event.kind, HubEventKind::Add);
        assert_eq!(event.device_name, "Stack");
        assert_eq!(fx.watcher.services(), [STACK]);
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_remove_proxy_on_delete() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        let mut fx = fixture(transport);
        next_event(&mut fx.events).await;

        fx.transport.announce(RegistryAction::Delete, STACK);

        let event = next_event(&mut fx.events).await;
        assert_eq!(event.kind, HubEventKind::Remove);
        settle().await;
        assert!(fx.hub.is_empty());
        assert!(fx.watcher.services().is_empty());
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_evict_silent_proxy_exactly_once() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        let mut fx = fixture(transport);
        next_event(&mut fx.events).await;

        tokio::time::sleep(Duration::from_secs(12)).await;

        let event = next_event(&mut fx.events).await;
        assert_eq!(event.kind, HubEventKind::Remove);
        assert!(fx.hub.is_empty());

        // a late delete and further sweeps must not remove it again
        fx.transport.announce(RegistryAction::Delete, STACK);
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert!(matches!(fx.events.try_recv(), Err(TryRecvError::Empty)));
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_keep_proxy_while_service_reannounces() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        let mut fx = fixture(transport);
        next_event(&mut fx.events).await;

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(5)).await;
            fx.transport.announce(RegistryAction::Update, STACK);
        }
        settle().await;

        assert_eq!(fx.hub.len(), 1);
        assert!(matches!(fx.events.try_recv(), Err(TryRecvError::Empty)));
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_mirror_service_again_after_eviction() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        let mut fx = fixture(transport);
        next_event(&mut fx.events).await;
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(next_event(&mut fx.events).await.kind, HubEventKind::Remove);
        settle().await;

        fx.transport.announce(RegistryAction::Create, STACK);

        assert_eq!(next_event(&mut fx.events).await.kind, HubEventKind::Add);
        fx.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn should_forward_control_through_mirrored_proxy() {
        let transport = MemoryTransport::default();
        transport.host(STACK, remote());
        let mut fx = fixture(transport);
        next_event(&mut fx.events).await;

        let proxy = fx.hub.switch("Stack").unwrap();
        proxy
            .set_port(Port::request(
                "P",
                vec![remoteswitch_domain::switch::Terminal::request("X", true)],
            ))
            .await
            .unwrap();

        assert_eq!(fx.transport.set_calls().len(), 1);
        fx.cancel.cancel();
    }

    #[test]
    fn should_expire_only_stale_entries() {
        let start = Instant::now();
        let mut cache = ServiceCache::default();
        cache.touch("old", start);
        cache.touch("fresh", start + Duration::from_secs(8));

        let expired = cache.expire(start + Duration::from_secs(11), Duration::from_secs(10));

        assert_eq!(expired, ["old"]);
        assert!(cache.contains("fresh"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn should_report_forgotten_entries() {
        let mut cache = ServiceCache::default();
        cache.touch("a", Instant::now());
        assert!(cache.forget("a"));
        assert!(!cache.forget("a"));
        assert!(cache.is_empty());
    }
}
