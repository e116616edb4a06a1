//! 内存存储的表、键锁与暂存写集合

use dashmap::DashMap;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;
use xoidc_common::{ClientId, RequestContext, UserId};
use xoidc_errors::{AppError, AppResult};

use crate::domain::entities::{
    AccessToken, AuthCode, AuthRequest, Client, DeviceAuthorization, RefreshToken, User,
};

/// 已提交的数据
#[derive(Default)]
pub(super) struct Tables {
    pub auth_requests: DashMap<Uuid, AuthRequest>,
    pub auth_codes: DashMap<String, AuthCode>,
    pub access_tokens: DashMap<Uuid, AccessToken>,
    pub refresh_tokens: DashMap<String, RefreshToken>,
    pub clients: DashMap<ClientId, Client>,
    pub devices: DashMap<String, DeviceAuthorization>,
    /// user code -> device code
    pub user_codes: DashMap<String, String>,
    pub users: DashMap<UserId, User>,
}

/// 事务内尚未提交的写入，`None` 表示删除
#[derive(Default)]
pub(super) struct Staged {
    pub auth_requests: HashMap<Uuid, Option<AuthRequest>>,
    pub auth_codes: HashMap<String, Option<AuthCode>>,
    pub access_tokens: HashMap<Uuid, Option<AccessToken>>,
    pub refresh_tokens: HashMap<String, Option<RefreshToken>>,
    pub clients: HashMap<ClientId, Option<Client>>,
    pub devices: HashMap<String, Option<DeviceAuthorization>>,
    pub user_codes: HashMap<String, Option<String>>,
    pub users: HashMap<UserId, Option<User>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(super) enum LockKey {
    AuthRequest(Uuid),
    AuthCode(String),
    AccessToken(Uuid),
    RefreshToken(String),
    UserCode(String),
    DeviceCode(String),
}

/// 每个实体键一把异步锁，空闲时回收
#[derive(Default)]
struct LockTable {
    locks: DashMap<LockKey, Arc<AsyncMutex<()>>>,
}

impl LockTable {
    async fn acquire(&self, key: &LockKey) -> OwnedMutexGuard<()> {
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        mutex.lock_owned().await
    }

    fn release(&self, key: &LockKey, guard: OwnedMutexGuard<()>) {
        drop(guard);
        self.locks.remove_if(key, |_, m| Arc::strong_count(m) == 1);
    }
}

/// 进程内共享的存储
#[derive(Default)]
pub(super) struct MemoryStore {
    tables: Tables,
    locks: LockTable,
    /// 提交屏障：提交时独占，读取时共享，保证一次提交对读者整体可见
    barrier: RwLock<()>,
}

/// 单个事务的状态，由 Unit of Work 和它的仓储共享
pub(super) struct TxState {
    store: Arc<MemoryStore>,
    ctx: RequestContext,
    staged: Mutex<Staged>,
    held: Mutex<Vec<(LockKey, OwnedMutexGuard<()>)>>,
}

impl TxState {
    pub fn new(store: Arc<MemoryStore>, ctx: RequestContext) -> Self {
        Self {
            store,
            ctx,
            staged: Mutex::new(Staged::default()),
            held: Mutex::new(Vec::new()),
        }
    }

    pub fn ctx(&self) -> &RequestContext {
        &self.ctx
    }

    /// 获取实体键锁，直到事务结束才释放。同一事务重复获取直接返回。
    pub async fn lock(&self, key: LockKey) -> AppResult<()> {
        if self.held_guard()?.iter().any(|(k, _)| *k == key) {
            return Ok(());
        }

        let store = self.store.clone();
        let wait_key = key.clone();
        let guard = self
            .ctx
            .run(async move { Ok(store.locks.acquire(&wait_key).await) })
            .await?;

        self.held_guard()?.push((key, guard));
        Ok(())
    }

    /// 在提交屏障的共享模式下访问已提交数据与本事务的暂存写入
    pub fn with<T>(&self, f: impl FnOnce(&Tables, &mut Staged) -> AppResult<T>) -> AppResult<T> {
        self.ctx.check()?;

        let _barrier = self
            .store
            .barrier
            .read()
            .map_err(|_| AppError::internal("Store barrier poisoned"))?;
        let mut staged = self
            .staged
            .lock()
            .map_err(|_| AppError::internal("Staged writes poisoned"))?;

        f(&self.store.tables, &mut staged)
    }

    /// 原子地应用暂存写入
    pub fn apply(&self) -> AppResult<()> {
        let staged = std::mem::take(
            &mut *self
                .staged
                .lock()
                .map_err(|_| AppError::internal("Staged writes poisoned"))?,
        );

        let _barrier = self
            .store
            .barrier
            .write()
            .map_err(|_| AppError::internal("Store barrier poisoned"))?;
        let tables = &self.store.tables;

        apply(&tables.auth_requests, staged.auth_requests);
        apply(&tables.auth_codes, staged.auth_codes);
        apply(&tables.access_tokens, staged.access_tokens);
        apply(&tables.refresh_tokens, staged.refresh_tokens);
        apply(&tables.clients, staged.clients);
        apply(&tables.devices, staged.devices);
        apply(&tables.user_codes, staged.user_codes);
        apply(&tables.users, staged.users);

        Ok(())
    }

    /// 丢弃暂存写入
    pub fn discard(&self) {
        if let Ok(mut staged) = self.staged.lock() {
            *staged = Staged::default();
        }
    }

    pub fn release_locks(&self) {
        let held = match self.held.lock() {
            Ok(mut held) => std::mem::take(&mut *held),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };

        for (key, guard) in held {
            self.store.locks.release(&key, guard);
        }
    }

    fn held_guard(
        &self,
    ) -> AppResult<std::sync::MutexGuard<'_, Vec<(LockKey, OwnedMutexGuard<()>)>>> {
        self.held
            .lock()
            .map_err(|_| AppError::internal("Lock registry poisoned"))
    }
}

impl Drop for TxState {
    fn drop(&mut self) {
        self.release_locks();
    }
}

/// 本事务视角下的单行
pub(super) fn visible<K, V>(table: &DashMap<K, V>, staged: &HashMap<K, Option<V>>, key: &K) -> Option<V>
where
    K: Eq + Hash,
    V: Clone,
{
    match staged.get(key) {
        Some(entry) => entry.clone(),
        None => table.get(key).map(|entry| entry.value().clone()),
    }
}

/// 本事务视角下满足条件的所有行
pub(super) fn visible_where<K, V, F>(
    table: &DashMap<K, V>,
    staged: &HashMap<K, Option<V>>,
    pred: F,
) -> Vec<(K, V)>
where
    K: Eq + Hash + Clone,
    V: Clone,
    F: Fn(&V) -> bool,
{
    let mut rows: Vec<(K, V)> = table
        .iter()
        .filter(|entry| !staged.contains_key(entry.key()) && pred(entry.value()))
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();

    rows.extend(staged.iter().filter_map(|(key, value)| {
        value
            .as_ref()
            .filter(|v| pred(v))
            .map(|v| (key.clone(), v.clone()))
    }));

    rows
}

/// 删除本事务可见的满足条件的行，返回删除数量
pub(super) fn delete_where<K, V, F>(
    table: &DashMap<K, V>,
    staged: &mut HashMap<K, Option<V>>,
    pred: F,
) -> u64
where
    K: Eq + Hash + Clone,
    V: Clone,
    F: Fn(&V) -> bool,
{
    let rows = visible_where(table, staged, pred);
    let count = rows.len() as u64;
    for (key, _) in rows {
        staged.insert(key, None);
    }
    count
}

fn apply<K, V>(table: &DashMap<K, V>, staged: HashMap<K, Option<V>>)
where
    K: Eq + Hash,
{
    for (key, value) in staged {
        match value {
            Some(value) => {
                table.insert(key, value);
            }
            None => {
                table.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_prefers_staged_writes() {
        let table: DashMap<String, i32> = DashMap::new();
        table.insert("a".into(), 1);
        table.insert("b".into(), 2);

        let mut staged = HashMap::new();
        staged.insert("a".to_string(), None);
        staged.insert("c".to_string(), Some(3));

        assert_eq!(visible(&table, &staged, &"a".to_string()), None);
        assert_eq!(visible(&table, &staged, &"b".to_string()), Some(2));
        assert_eq!(visible(&table, &staged, &"c".to_string()), Some(3));

        let mut all = visible_where(&table, &staged, |_| true);
        all.sort();
        assert_eq!(all, vec![("b".to_string(), 2), ("c".to_string(), 3)]);
    }

    #[test]
    fn test_delete_where_counts_visible_rows() {
        let table: DashMap<u32, i32> = DashMap::new();
        table.insert(1, 10);
        table.insert(2, 20);

        let mut staged = HashMap::new();
        staged.insert(3, Some(30));

        assert_eq!(delete_where(&table, &mut staged, |v| *v >= 20), 2);
        assert!(visible_where(&table, &staged, |_| true) == vec![(1, 10)]);

        apply(&table, staged);
        assert_eq!(table.len(), 1);
        assert!(table.contains_key(&1));
    }

    #[tokio::test]
    async fn test_lock_table_reclaims_idle_keys() {
        let locks = LockTable::default();
        let key = LockKey::RefreshToken("r1".into());

        let guard = locks.acquire(&key).await;
        assert_eq!(locks.locks.len(), 1);
        locks.release(&key, guard);
        assert!(locks.locks.is_empty());
    }
}
