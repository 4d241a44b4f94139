mod forward;
mod listener;

#[cfg(test)]
mod testing;

pub use forward::HyperForwarder;
pub use listener::{InterceptProxy, ProxyConfig};
