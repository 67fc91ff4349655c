//! Session Handle Allocator
//!
//! Each session receives a random 32-bit receive handle. Data frames carry
//! the receiver's handle so an inbound frame resolves to its session in
//! O(1) without trying keys.
//!
//! Handles are random rather than sequential so an observer cannot
//! correlate sessions or guess live handles.

use rand::Rng;
use std::collections::HashSet;
use thiserror::Error;

/// Errors related to handle allocation.
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("no available handles (too many active sessions)")]
    Exhausted,

    #[error("handle {0} not allocated")]
    NotFound(SessionHandle),
}

/// A 32-bit session receive handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionHandle(u32);

impl SessionHandle {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn to_le_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn from_le_bytes(bytes: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(bytes))
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Allocator for session handles within one session table.
#[derive(Debug)]
pub struct HandleAllocator {
    in_use: HashSet<u32>,
    /// Maximum random draws before giving up.
    max_attempts: usize,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self {
            in_use: HashSet::new(),
            max_attempts: 100,
        }
    }

    /// Allocate a random handle not currently in use.
    pub fn allocate(&mut self) -> Result<SessionHandle, HandleError> {
        let mut rng = rand::rng();

        for _ in 0..self.max_attempts {
            let candidate = rng.random::<u32>();
            if self.in_use.insert(candidate) {
                return Ok(SessionHandle(candidate));
            }
        }

        Err(HandleError::Exhausted)
    }

    /// Return a handle to the pool.
    pub fn free(&mut self, handle: SessionHandle) -> Result<(), HandleError> {
        if self.in_use.remove(&handle.0) {
            Ok(())
        } else {
            Err(HandleError::NotFound(handle))
        }
    }

    pub fn is_allocated(&self, handle: SessionHandle) -> bool {
        self.in_use.contains(&handle.0)
    }

    pub fn count(&self) -> usize {
        self.in_use.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_use.is_empty()
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
