//! Owning storage for danmaku instances

use crate::danmaku::Danmaku;
use std::collections::HashMap;

/// Opaque handle to a danmaku inside a [`DanmakuStore`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DanmakuKey(u64);

/// Owns every live danmaku; layouts and lists refer to them by key
#[derive(Debug, Default)]
pub struct DanmakuStore {
    items: HashMap<DanmakuKey, Danmaku>,
    next_key: u64,
}

impl DanmakuStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a danmaku and returns its key; keys are never reused
    pub fn insert(&mut self, danmaku: Danmaku) -> DanmakuKey {
        let key = DanmakuKey(self.next_key);
        self.next_key += 1;
        self.items.insert(key, danmaku);
        key
    }

    pub fn get(&self, key: DanmakuKey) -> Option<&Danmaku> {
        self.items.get(&key)
    }

    pub fn get_mut(&mut self, key: DanmakuKey) -> Option<&mut Danmaku> {
        self.items.get_mut(&key)
    }

    pub fn remove(&mut self, key: DanmakuKey) -> Option<Danmaku> {
        self.items.remove(&key)
    }

    pub fn contains(&self, key: DanmakuKey) -> bool {
        self.items.contains_key(&key)
    }

    /// Keeps only the danmaku for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(DanmakuKey, &Danmaku) -> bool) {
        self.items.retain(|key, danmaku| keep(*key, danmaku));
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
