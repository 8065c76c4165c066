// 该文件是 Yanshi （演示） 项目的一部分。
// src/session.rs - 会话级模型缓存
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  any::Any,
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Instant,
};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::ModelBuilder;

type Handle = Arc<dyn Any + Send + Sync>;

#[derive(Error, Debug)]
pub enum SessionError<E> {
  #[error("会话缓存 '{key}' 中的对象类型不匹配, 期望类型 {expected}")]
  TypeMismatch {
    key: &'static str,
    expected: &'static str,
  },
  #[error("模型构建失败: {0}")]
  Factory(#[source] E),
}

/// 单个用户会话的状态
///
/// 每种模型最多只保存一个实例，键为模型种类的静态名称。
/// 构建失败时不会缓存任何内容，下一次调用会重新构建。
#[derive(Default)]
pub struct SessionState {
  slots: HashMap<&'static str, Handle>,
}

impl std::fmt::Debug for SessionState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SessionState")
      .field("keys", &self.slots.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl SessionState {
  pub fn new() -> Self {
    Self::default()
  }

  /// 取出 `key` 对应的缓存实例；不存在时调用一次 `factory` 并缓存其结果
  pub fn get_or_create<T, E, F>(
    &mut self,
    key: &'static str,
    factory: F,
  ) -> Result<Arc<T>, SessionError<E>>
  where
    T: Send + Sync + 'static,
    F: FnOnce() -> Result<T, E>,
  {
    if let Some(handle) = self.slots.get(key) {
      debug!("会话缓存命中: {}", key);
      return Self::downcast(key, handle.clone());
    }

    info!("会话中没有 '{}', 开始构建", key);
    let now = Instant::now();
    let value = match factory() {
      Ok(value) => Arc::new(value),
      Err(e) => {
        warn!("构建 '{}' 失败, 不写入缓存", key);
        return Err(SessionError::Factory(e));
      }
    };
    info!("'{}' 构建完成，耗时: {:.2?}", key, now.elapsed());

    self.slots.insert(key, value.clone());
    Ok(value)
  }

  /// 以构建器的 `KEY` 作为缓存键
  pub fn get_or_build<B: ModelBuilder>(
    &mut self,
    builder: &B,
  ) -> Result<Arc<B::Model>, SessionError<B::Error>> {
    self.get_or_create(B::KEY, || builder.build())
  }

  pub fn get<T: Send + Sync + 'static>(&self, key: &'static str) -> Option<Arc<T>> {
    self
      .slots
      .get(key)
      .and_then(|handle| handle.clone().downcast::<T>().ok())
  }

  pub fn contains(&self, key: &str) -> bool {
    self.slots.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }

  fn downcast<T, E>(key: &'static str, handle: Handle) -> Result<Arc<T>, SessionError<E>>
  where
    T: Send + Sync + 'static,
  {
    handle.downcast::<T>().map_err(|_| SessionError::TypeMismatch {
      key,
      expected: std::any::type_name::<T>(),
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
  pub fn new(id: u64) -> Self {
    SessionId(id)
  }
}

impl std::fmt::Display for SessionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "session-{}", self.0)
  }
}

/// 多会话宿主使用的会话表
///
/// 每个会话有独立的锁：同一会话的并发首次访问在该锁上串行，
/// 不同会话之间互不共享模型实例。
#[derive(Debug, Default)]
pub struct SessionRegistry {
  next_id: AtomicU64,
  sessions: Mutex<HashMap<SessionId, Arc<Mutex<SessionState>>>>,
}

impl SessionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// 分配一个新的会话
  pub fn open(&self) -> SessionId {
    let id = loop {
      let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
      if !self.sessions.lock().contains_key(&id) {
        break id;
      }
    };
    self.session(id);
    info!("打开会话: {}", id);
    id
  }

  /// 获取会话状态，不存在时创建
  pub fn session(&self, id: SessionId) -> Arc<Mutex<SessionState>> {
    self
      .sessions
      .lock()
      .entry(id)
      .or_insert_with(|| {
        debug!("创建会话状态: {}", id);
        Arc::new(Mutex::new(SessionState::new()))
      })
      .clone()
  }

  /// 结束会话并释放其中的模型
  pub fn remove(&self, id: SessionId) -> bool {
    let removed = self.sessions.lock().remove(&id).is_some();
    if removed {
      info!("关闭会话: {}", id);
    }
    removed
  }

  pub fn len(&self) -> usize {
    self.sessions.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.sessions.lock().is_empty()
  }
}
