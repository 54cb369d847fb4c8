//! A small async connection pool.
//!
//! [`Pool`] hands out at most `max_size` connections at a time. Callers that
//! find the pool exhausted wait in FIFO order for up to the configured
//! timeout and then fail with [`SqlError::PoolTimeout`]. Connections go back
//! to the pool when their [`PooledConnection`] guard drops; connections older
//! than the recycle age, or that [`Manager::is_reusable`] rejects, are closed
//! instead of reused.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use supersql_core::{SqlError, SqlResult};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::base::PoolConfig;

/// Creates the connections a [`Pool`] manages.
#[async_trait::async_trait]
pub trait Manager: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Opens a new connection.
    async fn create(&self) -> SqlResult<Self::Connection>;

    /// Whether a released connection may go back to the idle queue.
    ///
    /// Called synchronously when a [`PooledConnection`] drops, e.g. to
    /// reject a session still inside a transaction.
    fn is_reusable(&self, _conn: &mut Self::Connection) -> bool {
        true
    }
}

/// Current occupancy of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Live connections, idle or checked out.
    pub size: usize,
    /// Connections waiting in the pool.
    pub idle: usize,
    pub max_size: usize,
}

struct Idle<C> {
    conn: C,
    created: Instant,
}

struct PoolState<C> {
    idle: VecDeque<Idle<C>>,
    size: usize,
    closed: bool,
}

struct PoolInner<M: Manager> {
    manager: M,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    state: Mutex<PoolState<M::Connection>>,
}

impl<M: Manager> PoolInner<M> {
    fn state(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expired(&self, created: Instant) -> bool {
        self.config
            .recycle
            .is_some_and(|age| created.elapsed() >= age)
    }
}

/// A pool of connections produced by a [`Manager`].
pub struct Pool<M: Manager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: Manager> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Manager> std::fmt::Debug for Pool<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .finish()
    }
}

impl<M: Manager> Pool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        let max_size = config.max_size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                manager,
                config: PoolConfig { max_size, ..config },
                semaphore: Arc::new(Semaphore::new(max_size)),
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(max_size),
                    size: 0,
                    closed: false,
                }),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Opens connections until `min_size` are live.
    pub async fn warm(&self) -> SqlResult<()> {
        while self.status().size < self.inner.config.min_size {
            let permit = self.permit().await?;
            let reservation = Reservation::new(&self.inner).ok_or(SqlError::PoolClosed)?;
            let conn = self.inner.manager.create().await?;
            reservation.commit();
            self.inner.state().idle.push_back(Idle {
                conn,
                created: Instant::now(),
            });
            drop(permit);
        }
        Ok(())
    }

    async fn permit(&self) -> SqlResult<OwnedSemaphorePermit> {
        let timeout = self.inner.config.timeout;
        match tokio::time::timeout(timeout, Arc::clone(&self.inner.semaphore).acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(SqlError::PoolClosed),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis(),
                    "timed out waiting for a pooled connection"
                );
                Err(SqlError::PoolTimeout(timeout))
            }
        }
    }

    /// Checks a connection out, opening one if none is idle.
    ///
    /// Fails with [`SqlError::PoolTimeout`] if no connection frees up within
    /// the configured timeout and [`SqlError::PoolClosed`] once
    /// [`close_all`](Self::close_all) has run.
    pub async fn acquire(&self) -> SqlResult<PooledConnection<M>> {
        let permit = self.permit().await?;

        loop {
            let idle = {
                let mut state = self.inner.state();
                if state.closed {
                    return Err(SqlError::PoolClosed);
                }
                state.idle.pop_front()
            };
            let Some(idle) = idle else { break };
            if self.inner.expired(idle.created) {
                tracing::debug!("closing expired pooled connection");
                self.inner.state().size -= 1;
                continue;
            }
            return Ok(PooledConnection {
                conn: Some(idle.conn),
                created: idle.created,
                pool: Arc::clone(&self.inner),
                _permit: permit,
            });
        }

        let reservation = Reservation::new(&self.inner).ok_or(SqlError::PoolClosed)?;
        let conn = self.inner.manager.create().await?;
        reservation.commit();
        tracing::debug!(size = self.status().size, "opened pooled connection");
        Ok(PooledConnection {
            conn: Some(conn),
            created: Instant::now(),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Closes every idle connection and refuses further acquires.
    ///
    /// Connections still checked out are closed when they are released.
    pub fn close_all(&self) {
        let drained = {
            let mut state = self.inner.state();
            state.closed = true;
            let drained: Vec<_> = state.idle.drain(..).collect();
            state.size -= drained.len();
            drained
        };
        self.inner.semaphore.close();
        tracing::debug!(closed = drained.len(), "pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state().closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state();
        PoolStatus {
            size: state.size,
            idle: state.idle.len(),
            max_size: self.inner.config.max_size,
        }
    }
}

/// Counts a connection that is being opened. Dropping the reservation
/// without committing gives the slot back when `create` fails or the
/// acquiring future is dropped.
struct Reservation<'a, M: Manager> {
    inner: &'a PoolInner<M>,
    committed: bool,
}

impl<'a, M: Manager> Reservation<'a, M> {
    fn new(inner: &'a PoolInner<M>) -> Option<Self> {
        let mut state = inner.state();
        if state.closed {
            return None;
        }
        state.size += 1;
        Some(Self {
            inner,
            committed: false,
        })
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl<M: Manager> Drop for Reservation<'_, M> {
    fn drop(&mut self) {
        if !self.committed {
            self.inner.state().size -= 1;
        }
    }
}

/// A connection checked out of a [`Pool`].
///
/// Dereferences to the managed connection. Dropping it returns the
/// connection to the pool.
pub struct PooledConnection<M: Manager> {
    conn: Option<M::Connection>,
    created: Instant,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: Manager> std::fmt::Debug for PooledConnection<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl<M: Manager> PooledConnection<M> {
    /// When the underlying connection was opened.
    pub const fn created(&self) -> Instant {
        self.created
    }

    /// Closes the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        if self.conn.take().is_some() {
            self.pool.state().size -= 1;
        }
    }
}

impl<M: Manager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        // `conn` is only taken in `discard` and `drop`, both of which consume
        // the guard.
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<M: Manager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<M: Manager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        let reusable = self.pool.manager.is_reusable(&mut conn);
        if !reusable {
            tracing::debug!("closing pooled connection that cannot be reused");
        }
        let mut state = self.pool.state();
        if !reusable
            || state.closed
            || self.pool.expired(self.created)
            || state.idle.len() >= self.pool.config.max_size
        {
            state.size -= 1;
            drop(state);
            drop(conn);
            return;
        }
        state.idle.push_back(Idle {
            conn,
            created: self.created,
        });
    }
}
