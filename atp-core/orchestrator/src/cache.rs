//! 命令结果缓存
//!
//! 只读查询（平台信息、许可证、是否集群等）在一次测试中结果不变，
//! 用 [`Cached`] 包装后同一命令只真正执行一次。缓存键是命令类型加
//! [`Command::name`]，SSH 命令的名称已包含目标主机，因此结果按设备区分。

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::command::Command;
use crate::Result;

type Store = HashMap<String, Box<dyn Any + Send>>;

/// 可在多个命令、多个线程间共享的结果缓存
#[derive(Clone, Default)]
pub struct CommandCache {
    entries: Arc<Mutex<Store>>,
}

impl CommandCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已缓存的结果数量
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 丢弃某个命令的缓存结果，下次执行时重新查询
    pub fn invalidate<C: Command + ?Sized>(&self, command: &C) -> bool {
        self.lock().remove(&cache_key(command)).is_some()
    }

    /// 清空缓存
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn get<C>(&self, command: &C) -> Option<C::Output>
    where
        C: Command + ?Sized,
        C::Output: Clone + 'static,
    {
        self.lock()
            .get(&cache_key(command))
            .and_then(|value| value.downcast_ref::<C::Output>())
            .cloned()
    }

    fn insert<C>(&self, command: &C, output: C::Output)
    where
        C: Command + ?Sized,
        C::Output: Send + 'static,
    {
        self.lock().insert(cache_key(command), Box::new(output));
    }

    // 缓存内容只是查询结果，持锁线程 panic 后数据仍可用
    fn lock(&self) -> MutexGuard<'_, Store> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for CommandCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCache")
            .field("entries", &self.len())
            .finish()
    }
}

fn cache_key<C: Command + ?Sized>(command: &C) -> String {
    format!("{}#{}", type_name::<C>(), Command::name(command))
}

/// 带缓存的命令
///
/// 命中缓存时跳过内部命令的全部生命周期阶段；未命中时正常执行，
/// 成功结果写入缓存。失败不缓存。
pub struct Cached<C: Command> {
    inner: C,
    cache: CommandCache,
    hit: Option<C::Output>,
    prepared: bool,
}

impl<C> Cached<C>
where
    C: Command,
    C::Output: Clone + Send + 'static,
{
    pub fn new(inner: C, cache: CommandCache) -> Self {
        Self {
            inner,
            cache,
            hit: None,
            prepared: false,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C> Command for Cached<C>
where
    C: Command,
    C::Output: Clone + Send + 'static,
{
    type Output = C::Output;

    fn name(&self) -> String {
        self.inner.name()
    }

    fn prepare(&mut self) -> Result<()> {
        self.hit = self.cache.get(&self.inner);
        if self.hit.is_some() {
            debug!("命中缓存: {}", self.inner.name());
            return Ok(());
        }
        self.inner.prepare()?;
        self.prepared = true;
        Ok(())
    }

    fn execute(&mut self) -> Result<C::Output> {
        if let Some(output) = self.hit.take() {
            return Ok(output);
        }
        let output = self.inner.execute()?;
        self.cache.insert(&self.inner, output.clone());
        Ok(output)
    }

    fn undo(&mut self) -> Result<()> {
        if self.prepared {
            self.inner.undo()
        } else {
            Ok(())
        }
    }

    fn release(&mut self) -> Result<()> {
        if std::mem::take(&mut self.prepared) {
            self.inner.release()
        } else {
            Ok(())
        }
    }
}
