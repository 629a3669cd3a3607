//! Chained instantiation.
//!
//! A [`ChainList`] owns a constructor and an ordered list of the values it
//! built. Each `chain` call forwards its argument to the constructor and
//! appends the result, so several clients can be built in one expression:
//!
//! ```rust
//! use rpc_remotes::{jsonrpc, RemoteProxy};
//!
//! let clients = jsonrpc::chain("localhost:7890")?.try_chain("example.com")?;
//! assert_eq!(clients.len(), 2);
//! assert_eq!(clients[1].url(), "example.com");
//! # Ok::<(), rpc_remotes::RpcError>(())
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};

pub struct ChainList<T, F> {
    items: Vec<T>,
    build: F,
}

impl<T, F> ChainList<T, F> {
    /// Create an empty list that builds its elements with `build`.
    pub fn new(build: F) -> Self {
        Self {
            items: Vec::new(),
            build,
        }
    }

    /// Build one element from `args` and append it.
    pub fn chain<A>(mut self, args: A) -> Self
    where
        F: FnMut(A) -> T,
    {
        let item = (self.build)(args);
        self.items.push(item);
        self
    }

    /// Like [`chain`](Self::chain) for constructors that can fail.
    ///
    /// Nothing is appended when the constructor fails.
    pub fn try_chain<A, E>(mut self, args: A) -> Result<Self, E>
    where
        F: FnMut(A) -> Result<T, E>,
    {
        let item = (self.build)(args)?;
        self.items.push(item);
        Ok(self)
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

/// Start a chain with a single element built from `args`.
pub fn client_chain<T, A, E, F>(build: F, args: A) -> Result<ChainList<T, F>, E>
where
    F: FnMut(A) -> Result<T, E>,
{
    ChainList::new(build).try_chain(args)
}

impl<T, F> Deref for ChainList<T, F> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

impl<T, F> DerefMut for ChainList<T, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.items
    }
}

impl<T, F> IntoIterator for ChainList<T, F> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T, F> IntoIterator for &'a ChainList<T, F> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug, F> fmt::Debug for ChainList<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}
