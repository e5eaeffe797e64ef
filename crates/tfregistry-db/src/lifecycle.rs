//! Configure-once engine state
//!
//! Engines hold their connection handle in a [`Lifecycle`]. The handle is
//! installed by `configure`, cloned out for each operation and taken back
//! by `close`. The lock is held only long enough to clone the handle, never
//! across I/O.

use std::sync::RwLock;

use crate::error::{DbError, DbResult};

enum State<T> {
    Unconfigured,
    Ready(T),
    Closed,
}

/// Connection handle slot with an unconfigured → ready → closed progression
pub struct Lifecycle<T> {
    engine: &'static str,
    state: RwLock<State<T>>,
}

impl<T: Clone> Lifecycle<T> {
    pub fn new(engine: &'static str) -> Self {
        Self {
            engine,
            state: RwLock::new(State::Unconfigured),
        }
    }

    /// Fail unless `configure` has not run yet
    pub fn ensure_unconfigured(&self) -> DbResult<()> {
        let state = self.state.read().map_err(|_| self.poisoned())?;
        match *state {
            State::Unconfigured => Ok(()),
            State::Ready(_) => Err(self.already_configured()),
            State::Closed => Err(self.closed()),
        }
    }

    /// Install the handle opened by `configure`
    pub fn install(&self, handle: T) -> DbResult<()> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        match *state {
            State::Unconfigured => {
                *state = State::Ready(handle);
                Ok(())
            }
            State::Ready(_) => Err(self.already_configured()),
            State::Closed => Err(self.closed()),
        }
    }

    /// Clone of the live handle
    pub fn handle(&self) -> DbResult<T> {
        let state = self.state.read().map_err(|_| self.poisoned())?;
        match &*state {
            State::Ready(handle) => Ok(handle.clone()),
            State::Unconfigured => Err(DbError::Configuration(format!(
                "{} engine used before configure",
                self.engine
            ))),
            State::Closed => Err(self.closed()),
        }
    }

    /// Take the handle for shutdown; later calls fail
    pub fn take(&self) -> DbResult<T> {
        let mut state = self.state.write().map_err(|_| self.poisoned())?;
        match std::mem::replace(&mut *state, State::Closed) {
            State::Ready(handle) => Ok(handle),
            State::Unconfigured => Err(DbError::Configuration(format!(
                "{} engine closed before configure",
                self.engine
            ))),
            State::Closed => Err(self.closed()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state.read().as_deref(), Ok(State::Ready(_)))
    }

    fn already_configured(&self) -> DbError {
        DbError::Configuration(format!("{} engine already configured", self.engine))
    }

    fn closed(&self) -> DbError {
        DbError::Configuration(format!("{} engine is closed", self.engine))
    }

    fn poisoned(&self) -> DbError {
        DbError::Internal(format!("{} engine state lock poisoned", self.engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_progression() {
        let lifecycle: Lifecycle<u32> = Lifecycle::new("test");
        assert!(lifecycle.handle().is_err());
        assert!(lifecycle.ensure_unconfigured().is_ok());

        lifecycle.install(7).unwrap();
        assert!(lifecycle.is_ready());
        assert_eq!(lifecycle.handle().unwrap(), 7);
        assert!(lifecycle.install(8).is_err());
        assert!(lifecycle.ensure_unconfigured().is_err());

        assert_eq!(lifecycle.take().unwrap(), 7);
        assert!(!lifecycle.is_ready());
        assert!(lifecycle.handle().is_err());
        assert!(lifecycle.take().is_err());
        assert!(lifecycle.install(9).is_err());
    }

    #[test]
    fn test_close_before_configure() {
        let lifecycle: Lifecycle<u32> = Lifecycle::new("test");
        let err = lifecycle.take().unwrap_err();
        assert!(err.to_string().contains("closed before configure"));
        assert!(lifecycle.install(1).is_err());
    }
}
