//! Management coordinator: naming, idempotence and failure isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pretty_assertions::assert_eq;
use sluice_pool::config::{EXCLUDE_IDENTITY_TOKEN_KEY, MapSource, REGISTRY_NAME_KEY};
use sluice_pool::events::{EventBus, ManagementEvent};
use sluice_pool::identity::IdentityToken;
use sluice_pool::management::{
    ActiveManagementCoordinator, InMemoryRegistry, ManagedObject, ManagementCoordinator,
    ManagementName, ManagementRegistry, PooledResource, RegistryError,
};
use sluice_pool::ManagementSettings;
use tokio::sync::broadcast::Receiver;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct TestPool {
    token: IdentityToken,
    name: Option<String>,
}

impl TestPool {
    fn new(token: &str, name: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            token: IdentityToken::new(token),
            name: name.map(str::to_owned),
        })
    }
}

impl PooledResource for TestPool {
    fn identity_token(&self) -> &IdentityToken {
        &self.token
    }

    fn assigned_name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Registry wrapper counting mutations and optionally refusing registrations.
#[derive(Default)]
struct RecordingRegistry {
    inner: InMemoryRegistry,
    registers: AtomicUsize,
    unregisters: AtomicUsize,
    fail_register: bool,
}

impl RecordingRegistry {
    fn failing() -> Self {
        Self {
            fail_register: true,
            ..Self::default()
        }
    }

    fn mutations(&self) -> usize {
        self.registers.load(Ordering::SeqCst) + self.unregisters.load(Ordering::SeqCst)
    }
}

impl ManagementRegistry for RecordingRegistry {
    fn register(
        &self,
        name: &ManagementName,
        object: Arc<dyn ManagedObject>,
    ) -> Result<(), RegistryError> {
        self.registers.fetch_add(1, Ordering::SeqCst);
        if self.fail_register {
            return Err(RegistryError::Unavailable {
                reason: "registry offline".into(),
            });
        }
        self.inner.register(name, object)
    }

    fn unregister(&self, name: &ManagementName) -> Result<(), RegistryError> {
        self.unregisters.fetch_add(1, Ordering::SeqCst);
        self.inner.unregister(name)
    }

    fn is_registered(&self, name: &ManagementName) -> bool {
        self.inner.is_registered(name)
    }
}

fn coordinator(
    registry: Arc<RecordingRegistry>,
    settings: ManagementSettings,
) -> (ActiveManagementCoordinator, Receiver<ManagementEvent>) {
    let bus = Arc::new(EventBus::new(64));
    let rx = bus.subscribe();
    (
        ActiveManagementCoordinator::new(registry, settings).with_events(bus),
        rx,
    )
}

fn drain(rx: &mut Receiver<ManagementEvent>) -> Vec<ManagementEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn excluding() -> ManagementSettings {
    ManagementSettings {
        registry_name: None,
        exclude_identity_token: true,
    }
}

// ---------------------------------------------------------------------------
// Naming
// ---------------------------------------------------------------------------

#[test]
fn resource_name_is_deterministic() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, _rx) = coordinator(registry, ManagementSettings::default());
    let pool = TestPool::new("7f3a", Some("pool1"));

    for _ in 0..3 {
        assert_eq!(
            coordinator.resource_name(pool.as_ref()).unwrap().as_str(),
            "sluice:type=PooledDataSource,identityToken=7f3a,name=pool1"
        );
    }
}

#[test]
fn excluded_token_falls_back_to_token_as_name() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, _rx) = coordinator(registry, excluding());
    let pool = TestPool::new("7f3a", None);

    let name = coordinator.resource_name(pool.as_ref()).unwrap();
    assert_eq!(name.as_str(), "sluice:type=PooledDataSource,name=7f3a");
}

#[test]
fn settings_come_from_config_source() {
    let source = MapSource::new()
        .with(REGISTRY_NAME_KEY, "orders-app")
        .with(EXCLUDE_IDENTITY_TOKEN_KEY, " TRUE ");
    let coordinator =
        ActiveManagementCoordinator::from_source(Arc::new(InMemoryRegistry::new()), &source);

    assert_eq!(
        coordinator.directory_name().unwrap().as_str(),
        "sluice:type=Registry,name=orders-app"
    );
    assert!(coordinator.settings().exclude_identity_token);
}

#[test]
fn empty_names_are_still_published() {
    let source = MapSource::new().with(REGISTRY_NAME_KEY, "");
    let registry = Arc::new(InMemoryRegistry::new());
    let coordinator = ActiveManagementCoordinator::from_source(registry.clone(), &source);

    coordinator.publish_directory();
    coordinator.publish_resource(TestPool::new("7f3a", Some("")));

    assert_eq!(
        registry
            .names()
            .iter()
            .map(ManagementName::as_str)
            .collect::<Vec<_>>(),
        vec![
            "sluice:type=PooledDataSource,identityToken=7f3a,name=",
            "sluice:type=Registry,name=",
        ]
    );
    assert_eq!(coordinator.directory().len(), 1);
}

// ---------------------------------------------------------------------------
// Directory endpoint
// ---------------------------------------------------------------------------

#[test]
fn directory_publish_and_retract() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, mut rx) = coordinator(registry.clone(), ManagementSettings::default());
    let name = coordinator.directory_name().unwrap();

    coordinator.publish_directory();
    assert!(registry.is_registered(&name));
    assert_eq!(registry.inner.get(&name).unwrap().kind(), "Registry");

    coordinator.retract_directory();
    assert!(!registry.is_registered(&name));

    assert_eq!(
        drain(&mut rx),
        vec![
            ManagementEvent::Published {
                name: name.to_string()
            },
            ManagementEvent::Retracted {
                name: name.to_string()
            },
        ]
    );
}

#[test]
fn stale_directory_is_replaced_with_warning() {
    let registry = Arc::new(RecordingRegistry::default());
    let (previous, _) = coordinator(registry.clone(), ManagementSettings::default());
    previous.publish_directory();

    let (current, mut rx) = coordinator(registry.clone(), ManagementSettings::default());
    current.publish_directory();

    let name = current.directory_name().unwrap();
    assert!(registry.is_registered(&name));
    let events = drain(&mut rx);
    assert!(matches!(events[0], ManagementEvent::Replaced { .. }));
    assert!(matches!(events[1], ManagementEvent::Published { .. }));
}

#[test]
fn directory_lists_published_resources() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, _rx) = coordinator(registry.clone(), ManagementSettings::default());
    coordinator.publish_directory();
    coordinator.publish_resource(TestPool::new("a1", Some("orders")));
    coordinator.publish_resource(TestPool::new("b2", None));

    let directory = registry
        .inner
        .get(&coordinator.directory_name().unwrap())
        .unwrap();
    assert!(directory
        .attributes()
        .contains(&("numPooledDataSources".to_owned(), "2".to_owned())));
}

// ---------------------------------------------------------------------------
// Resource endpoints
// ---------------------------------------------------------------------------

#[test]
fn retract_of_unpublished_resource_is_a_silent_no_op() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, mut rx) = coordinator(registry.clone(), ManagementSettings::default());

    coordinator.retract_resource(TestPool::new("7f3a", Some("pool1")).as_ref());
    coordinator.retract_directory();

    assert_eq!(registry.mutations(), 0);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| matches!(e, ManagementEvent::NotRegistered { .. })));
}

#[test]
fn retract_twice_mutates_once() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, _rx) = coordinator(registry.clone(), ManagementSettings::default());
    let pool = TestPool::new("7f3a", Some("pool1"));

    coordinator.publish_resource(pool.clone());
    coordinator.retract_resource(pool.as_ref());
    coordinator.retract_resource(pool.as_ref());

    assert_eq!(registry.registers.load(Ordering::SeqCst), 1);
    assert_eq!(registry.unregisters.load(Ordering::SeqCst), 1);
}

#[test]
fn publish_failure_is_swallowed_and_reported() {
    let registry = Arc::new(RecordingRegistry::failing());
    let (coordinator, mut rx) = coordinator(registry.clone(), ManagementSettings::default());
    let pool = TestPool::new("7f3a", Some("pool1"));

    coordinator.publish_resource(pool.clone());
    coordinator.publish_directory();
    assert!(coordinator.directory().is_empty());

    let events = drain(&mut rx);
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(ManagementEvent::is_warning));
    match &events[0] {
        ManagementEvent::Failed {
            name,
            identity_token,
            operation,
            error,
        } => {
            assert_eq!(identity_token.as_deref(), Some("7f3a"));
            assert_eq!(
                name,
                "sluice:type=PooledDataSource,identityToken=7f3a,name=pool1"
            );
            assert_eq!(*operation, "publish");
            assert!(error.contains("registry offline"));
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(matches!(
        &events[1],
        ManagementEvent::Failed { identity_token: None, .. }
    ));
}

#[test]
fn failure_names_the_token_even_when_excluded_from_the_name() {
    let registry = Arc::new(RecordingRegistry::failing());
    let (coordinator, mut rx) = coordinator(registry, excluding());

    coordinator.publish_resource(TestPool::new("7f3a", Some("orders")));

    let events = drain(&mut rx);
    assert!(matches!(
        &events[..],
        [ManagementEvent::Failed { name, identity_token: Some(token), .. }]
            if name == "sluice:type=PooledDataSource,name=orders" && token == "7f3a"
    ));
}

#[test]
fn malformed_assigned_name_is_reported_by_identity_token() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, mut rx) = coordinator(registry.clone(), ManagementSettings::default());

    coordinator.publish_resource(TestPool::new("7f3a", Some("a=b")));

    assert_eq!(registry.mutations(), 0);
    assert!(coordinator.directory().is_empty());
    let events = drain(&mut rx);
    assert!(matches!(
        &events[..],
        [ManagementEvent::Failed { name, .. }] if name == "7f3a"
    ));
}

#[test]
fn duplicate_assigned_names_replace_when_token_excluded() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, mut rx) = coordinator(registry.clone(), excluding());
    let first = TestPool::new("1", Some("orders"));
    let second = TestPool::new("2", Some("orders"));

    coordinator.publish_resource(first);
    coordinator.publish_resource(second);

    assert_eq!(registry.inner.len(), 1);
    let events = drain(&mut rx);
    let replaced = events
        .iter()
        .find_map(|e| match e {
            ManagementEvent::Replaced { reason, .. } => Some(reason.clone()),
            _ => None,
        })
        .expect("collision should be reported");
    assert!(replaced.contains("unique assigned name"));

    let name = ManagementName::resource(&IdentityToken::new("2"), Some("orders"), true).unwrap();
    let view = registry.inner.get(&name).unwrap();
    assert!(view
        .attributes()
        .contains(&("identityToken".to_owned(), "2".to_owned())));
}

#[test]
fn concurrent_publish_of_distinct_resources() {
    let registry = Arc::new(RecordingRegistry::default());
    let (coordinator, _rx) = coordinator(registry.clone(), ManagementSettings::default());

    std::thread::scope(|scope| {
        for t in 0..4 {
            let coordinator = &coordinator;
            scope.spawn(move || {
                for i in 0..25 {
                    coordinator.publish_resource(TestPool::new(&format!("{t}-{i}"), None));
                }
            });
        }
    });

    assert_eq!(registry.inner.len(), 100);
    assert_eq!(coordinator.directory().len(), 100);
}
