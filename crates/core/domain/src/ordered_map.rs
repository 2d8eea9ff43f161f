use std::collections::HashMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::hash::Hash;

/// 保持插入顺序的并发 Map。
///
/// - `values()` / `keys()` 按首次插入顺序返回
/// - 对已有 key 再次 `set` 只更新值，不改变位置
/// - 读优先：已有读者时新读者直接进入，不排在等待中的写者之后
#[derive(Debug)]
pub struct OrderedMap<K, V> {
    inner: RwLock<Inner<K, V>>,
}

#[derive(Debug)]
struct Inner<K, V> {
    keys: Vec<K>,
    values: HashMap<K, V>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                keys: Vec::new(),
                values: HashMap::new(),
            }),
        }
    }
}

impl<K, V> OrderedMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: K, value: V) {
        let mut inner = self.write();
        if !inner.values.contains_key(&key) {
            inner.keys.push(key.clone());
        }
        inner.values.insert(key, value);
    }

    /// 仅当 key 不存在时插入，返回是否插入成功。
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        let mut inner = self.write();
        if inner.values.contains_key(&key) {
            return false;
        }
        inner.keys.push(key.clone());
        inner.values.insert(key, value);
        true
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.read().values.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read().values.contains_key(key)
    }

    /// 删除 key，O(n) 扫描并保持其余元素的相对顺序。
    pub fn delete(&self, key: &K) -> Option<V> {
        let mut inner = self.write();
        let removed = inner.values.remove(key);
        if removed.is_some() {
            inner.keys.retain(|k| k != key);
        }
        removed
    }

    pub fn keys(&self) -> Vec<K> {
        self.read().keys.clone()
    }

    pub fn values(&self) -> Vec<V> {
        let inner = self.read();
        inner
            .keys
            .iter()
            .filter_map(|k| inner.values.get(k).cloned())
            .collect()
    }

    /// 按插入顺序的 (key, value) 快照。
    pub fn entries(&self) -> Vec<(K, V)> {
        let inner = self.read();
        inner
            .keys
            .iter()
            .filter_map(|k| inner.values.get(k).map(|v| (k.clone(), v.clone())))
            .collect()
    }

    pub fn size(&self) -> usize {
        self.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.write();
        inner.keys.clear();
        inner.values.clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<K, V>> {
        self.inner.read_recursive()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<K, V>> {
        self.inner.write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order() {
        let map = OrderedMap::new();
        map.set("c", 3);
        map.set("a", 1);
        map.set("b", 2);
        assert_eq!(map.keys(), vec!["c", "a", "b"]);
        assert_eq!(map.values(), vec![3, 1, 2]);
    }

    #[test]
    fn test_reset_keeps_position() {
        let map = OrderedMap::new();
        map.set("a", 1);
        map.set("b", 2);
        map.set("a", 10);
        assert_eq!(map.keys(), vec!["a", "b"]);
        assert_eq!(map.get(&"a"), Some(10));
        assert_eq!(map.size(), 2);
    }

    #[test]
    fn test_delete_preserves_survivors() {
        let map = OrderedMap::new();
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            map.set(*k, i);
        }
        assert_eq!(map.delete(&"b"), Some(1));
        assert_eq!(map.delete(&"x"), None);
        assert_eq!(map.keys(), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_insert_if_absent() {
        let map = OrderedMap::new();
        assert!(map.insert_if_absent("a", 1));
        assert!(!map.insert_if_absent("a", 2));
        assert_eq!(map.get(&"a"), Some(1));
    }

    #[test]
    fn test_concurrent_writers() {
        let map = std::sync::Arc::new(OrderedMap::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        map.set(t * 100 + i, i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(map.size(), 400);
    }

    #[test]
    fn test_reader_not_blocked_by_waiting_writer() {
        let map = std::sync::Arc::new(OrderedMap::new());
        map.set("a", 1);
        let held = map.read();
        let writer = {
            let map = map.clone();
            std::thread::spawn(move || map.set("b", 2))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        // 写者已在排队，新读者仍可进入
        assert_eq!(map.get(&"a"), Some(1));
        assert_eq!(map.size(), 1);
        drop(held);
        writer.join().expect("join");
        assert_eq!(map.get(&"b"), Some(2));
    }
}
