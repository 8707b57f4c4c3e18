#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use lfgcache_core::filter::{format_timestamp, Filter};
use lfgcache_core::{
    LocalStore, MemoryTier, RawObject, ReconciliationEngine, RemoteError, RemoteSource,
    SettingsStore,
};

/// In-memory stand-in for the Parse server. `find` applies filters the same
/// way the local store does, unless told to ignore them.
#[derive(Default)]
pub struct FakeRemote {
    classes: Mutex<HashMap<String, Vec<RawObject>>>,
    fail: AtomicBool,
    ignore_filters: AtomicBool,
    next_id: AtomicUsize,
    pub created: Mutex<Vec<(String, Map<String, Value>)>>,
    pub deleted: Mutex<Vec<(String, String)>>,
    pub queries: Mutex<Vec<(String, Option<Filter>)>>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_objects(&self, class: &str, objects: Vec<Value>) {
        let objects = objects
            .into_iter()
            .map(|value| RawObject::from_value(value).unwrap())
            .collect();
        self.classes.lock().unwrap().insert(class.to_string(), objects);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Return every object of a class, whatever the query says.
    pub fn set_ignore_filters(&self, ignore: bool) {
        self.ignore_filters.store(ignore, Ordering::SeqCst);
    }

    pub fn last_query(&self, class: &str) -> Option<Filter> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(c, _)| c == class)
            .and_then(|(_, filter)| filter.clone())
    }

    fn check(&self) -> Result<(), RemoteError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(RemoteError::ServerError("service unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn find(&self, class: &str, filter: Option<&Filter>) -> Result<Vec<RawObject>, RemoteError> {
        self.queries
            .lock()
            .unwrap()
            .push((class.to_string(), filter.cloned()));
        self.check()?;
        let filter = filter.filter(|_| !self.ignore_filters.load(Ordering::SeqCst));
        let classes = self.classes.lock().unwrap();
        Ok(classes
            .get(class)
            .map(|objects| {
                objects
                    .iter()
                    .filter(|raw| filter.map_or(true, |f| f.matches(*raw)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, class: &str, fields: Map<String, Value>) -> Result<String, RemoteError> {
        self.check()?;
        let id = format!("NEW{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.created.lock().unwrap().push((class.to_string(), fields));
        Ok(id)
    }

    async fn delete_by_id(&self, class: &str, id: &str) -> Result<(), RemoteError> {
        self.check()?;
        self.deleted
            .lock()
            .unwrap()
            .push((class.to_string(), id.to_string()));
        if let Some(objects) = self.classes.lock().unwrap().get_mut(class) {
            objects.retain(|raw| raw.object_id().ok() != Some(id));
        }
        Ok(())
    }
}

pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub tier: Arc<MemoryTier>,
    pub engine: ReconciliationEngine,
}

pub fn harness() -> Harness {
    let remote = FakeRemote::new();
    let tier = Arc::new(MemoryTier::new());
    let store = Arc::new(LocalStore::open(tier.clone()).unwrap());
    let engine = ReconciliationEngine::new(
        store,
        remote.clone(),
        Arc::new(SettingsStore::in_memory()),
    );
    Harness {
        remote,
        tier,
        engine,
    }
}

pub fn game(id: &str, name: &str, expiry: i64) -> Value {
    json!({
        "objectId": id,
        "fullName": name,
        "shortName": id,
        "primaryLevelMin": 1,
        "primaryLevelMax": 40,
        "secondaryLevelMin": 0,
        "secondaryLevelMax": 0,
        "postExpiryTime": expiry,
        "platforms": ["PC", "PS"],
        "characters": ["A"],
        "playlist": ["Ranked"],
    })
}

pub fn post(id: &str, game_id: &str, created_at: DateTime<Utc>) -> Value {
    json!({
        "objectId": id,
        "gameId": game_id,
        "createdAt": format_timestamp(&created_at),
        "updatedAt": format_timestamp(&created_at),
        "deviceId": "DEVICE-OTHER",
        "platform": "PC",
        "character": "A",
        "primaryLevel": 20,
        "secondaryLevel": 0,
        "description": "LFG",
        "gameType": "Ranked",
        "mic": false,
        "playerId": "player",
    })
}
