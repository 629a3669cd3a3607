//! Base client abstraction shared by every protocol flavour.
//!
//! A [`RemoteProxy`] funnels every remote call through one extension point,
//! [`RemoteProxy::api_call`]. Callers reach it in three ways:
//!
//! - [`RemoteProxy::invoke`] with a method name and [`Args`];
//! - [`RemoteProxy::method`], which hands back a callable [`RemoteMethod`];
//! - typed traits generated by [`remote_interface!`](crate::remote_interface).
//!
//! ```rust,no_run
//! use rpc_remotes::{remote_interface, JsonRpcClient, RemoteProxy};
//!
//! remote_interface! {
//!     pub trait Greeter {
//!         fn sayhi(person: String) -> String;
//!     }
//! }
//!
//! let client = JsonRpcClient::new("http://localhost:7890")?.scoped();
//! let greeting = client.sayhi("David".to_string())?;
//! assert_eq!(greeting, "Hi David");
//! # Ok::<(), rpc_remotes::RpcError>(())
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, RpcError};

/// Arguments for a remote call.
///
/// Keyword arguments are carried so that a protocol can refuse them
/// explicitly; JSON-RPC only transmits the positional list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keyword: Map<String, Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positional arguments from already-encoded values.
    pub fn positional(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            keyword: Map::new(),
        }
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Serialize) -> Result<Self> {
        self.positional.push(serde_json::to_value(value)?);
        Ok(self)
    }

    /// Add a keyword argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Serialize) -> Result<Self> {
        self.keyword.insert(name.into(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn has_keywords(&self) -> bool {
        !self.keyword.is_empty()
    }
}

/// Caller-side handle to a single remote endpoint.
pub trait RemoteProxy {
    /// Protocol family, e.g. `"JSON RPC"`.
    fn flavour(&self) -> &str;

    /// Endpoint address as given by the caller.
    fn url(&self) -> &str;

    /// How long a call waits for its response.
    fn timeout(&self) -> Duration;

    /// Perform the wire call. Every protocol flavour must override this.
    fn api_call(&self, method: &str, args: Args) -> Result<Value> {
        let _ = (method, args);
        Err(RpcError::NotImplemented("api_call"))
    }

    /// Release any transport the proxy holds. Called when a [`Session`] ends.
    fn close(&mut self) {}

    /// Call `method` on the remote endpoint.
    fn invoke(&self, method: &str, args: Args) -> Result<Value> {
        self.api_call(method, args)
    }

    /// A callable handle for `name`.
    fn method<'a>(&'a self, name: &'a str) -> RemoteMethod<'a, Self>
    where
        Self: Sized,
    {
        RemoteMethod { proxy: self, name }
    }

    /// Enter a scope that closes the proxy on every exit path.
    fn scoped(self) -> Session<Self>
    where
        Self: Sized,
    {
        Session { proxy: self }
    }
}

/// A remote method bound to its proxy.
pub struct RemoteMethod<'a, P: RemoteProxy> {
    proxy: &'a P,
    name: &'a str,
}

impl<'a, P: RemoteProxy> RemoteMethod<'a, P> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn call(&self, args: Args) -> Result<Value> {
        self.proxy.api_call(self.name, args)
    }

    /// Call with no arguments.
    pub fn call0(&self) -> Result<Value> {
        self.call(Args::new())
    }
}

/// Scoped acquisition of a proxy: derefs to it and closes it on drop.
pub struct Session<P: RemoteProxy> {
    proxy: P,
}

impl<P: RemoteProxy> Deref for Session<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.proxy
    }
}

impl<P: RemoteProxy> DerefMut for Session<P> {
    fn deref_mut(&mut self) -> &mut P {
        &mut self.proxy
    }
}

impl<P: RemoteProxy> Drop for Session<P> {
    fn drop(&mut self) {
        self.proxy.close();
    }
}

impl<P: RemoteProxy> fmt::Display for Session<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} Client for {}>", self.proxy.flavour(), self.proxy.url())
    }
}

/// Decode a call result into a concrete type.
#[doc(hidden)]
pub fn decode_result<T: serde::de::DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| RpcError::Protocol(format!("unexpected result for {}: {}", method, e)))
}

/// Generate a typed client trait implemented for every [`RemoteProxy`].
///
/// Each declared method serializes its arguments positionally, calls
/// [`RemoteProxy::invoke`] with the method's own name, and deserializes the
/// result into the declared return type.
#[macro_export]
macro_rules! remote_interface {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident {
            $(
                $(#[$fmeta:meta])*
                fn $method:ident($($arg:ident : $ty:ty),* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis trait $name {
            $(
                $(#[$fmeta])*
                fn $method(&self $(, $arg: $ty)*) -> $crate::Result<$ret>;
            )*
        }

        impl<P: $crate::RemoteProxy + ?Sized> $name for P {
            $(
                fn $method(&self $(, $arg: $ty)*) -> $crate::Result<$ret> {
                    #[allow(unused_mut)]
                    let mut args = $crate::Args::new();
                    $( args = args.arg(&$arg)?; )*
                    let value = $crate::RemoteProxy::invoke(self, stringify!($method), args)?;
                    $crate::proxy::decode_result(stringify!($method), value)
                }
            )*
        }
    };
}
