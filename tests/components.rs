mod common;

use common::{builder, file_service, quiet};
use savestate::{BackendKind, MemoryRegistry, SaveService, SaveableComponent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Player {
    health: Mutex<u32>,
    auto_save: bool,
    auto_load: bool,
    saves: AtomicUsize,
    loads: AtomicUsize,
}

impl Player {
    fn new() -> Arc<Self> {
        Self::with_flags(true, true)
    }

    fn with_flags(auto_save: bool, auto_load: bool) -> Arc<Self> {
        Arc::new(Self {
            health: Mutex::new(0),
            auto_save,
            auto_load,
            saves: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        })
    }

    fn health(&self) -> u32 {
        *self.health.lock().unwrap()
    }

    fn set_health(&self, health: u32) {
        *self.health.lock().unwrap() = health;
    }
}

impl SaveableComponent for Player {
    fn save_key(&self) -> &str {
        "player.health"
    }

    fn auto_save(&self) -> bool {
        self.auto_save
    }

    fn auto_load(&self) -> bool {
        self.auto_load
    }

    fn save(&self, service: &SaveService) {
        self.saves.fetch_add(1, Ordering::SeqCst);
        service.save(self.save_key(), &self.health());
    }

    fn load(&self, service: &SaveService) {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.set_health(service.load(self.save_key(), 100));
    }
}

/// Panics on every call
struct Broken;

impl SaveableComponent for Broken {
    fn save_key(&self) -> &str {
        "broken"
    }

    fn save(&self, _service: &SaveService) {
        panic!("save exploded");
    }

    fn load(&self, _service: &SaveService) {
        panic!("load exploded");
    }
}

#[test]
fn registration_loads_and_flushes_collect_state() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(dir.path());
    let player = Player::new();

    service.register_component(player.clone());
    assert_eq!(player.health(), 100);
    assert_eq!(player.loads.load(Ordering::SeqCst), 1);

    service.register_component(player.clone());
    assert_eq!(service.component_count(), 1);
    assert_eq!(player.loads.load(Ordering::SeqCst), 1);

    player.set_health(55);
    service.save_all();
    assert_eq!(service.load("player.health", 0), 55);

    service.dispose();
    let restarted = file_service(dir.path());
    let revived = Player::new();
    restarted.register_component(revived.clone());
    assert_eq!(revived.health(), 55);
}

#[test]
fn unregistering_saves_once_and_stops_flushing() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(dir.path());
    let player = Player::new();
    service.register_component(player.clone());

    player.set_health(70);
    service.unregister_component(player.clone());
    assert_eq!(player.saves.load(Ordering::SeqCst), 1);
    assert_eq!(service.load("player.health", 0), 70);

    service.unregister_component(player.clone());
    player.set_health(10);
    service.save_all();
    assert_eq!(player.saves.load(Ordering::SeqCst), 1);
    assert_eq!(service.load("player.health", 0), 70);
    assert_eq!(service.component_count(), 0);
}

#[test]
fn opted_out_components_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(dir.path());
    let manual = Player::with_flags(false, false);

    service.register_component(manual.clone());
    assert_eq!(manual.loads.load(Ordering::SeqCst), 0);

    service.save_all();
    service.unregister_component(manual.clone());
    service.dispose();
    assert_eq!(manual.saves.load(Ordering::SeqCst), 0);
}

#[test]
fn dispose_flushes_components_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(MemoryRegistry::default());
    let build = || {
        builder(dir.path(), quiet(BackendKind::Registry))
            .with_registry(registry.clone())
            .build()
    };

    let service = build();
    let player = Player::new();
    service.register_component(player.clone());
    player.set_health(12);
    service.dispose();
    assert_eq!(service.component_count(), 0);

    assert_eq!(build().load("player.health", 0), 12);
}

#[test]
fn panicking_component_does_not_break_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let service = file_service(dir.path());
    let player = Player::new();

    service.register_component(Arc::new(Broken));
    service.register_component(player.clone());
    player.set_health(33);

    service.save_all();
    assert_eq!(service.load("player.health", 0), 33);

    service.dispose();
    assert!(!service.is_initialized());
    assert_eq!(file_service(dir.path()).load("player.health", 0), 33);
}
