use std::{future::Future, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;

use crate::config::ServerConfig;

// the services that make up this server's backend
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ServiceType {
    Db,
    Indexer,
    Thumbs,
    Http,
}

// message passing between services
//
// without higher-kinded types, we use the normal enum-of-enums to enable
// general safe message passing between services
pub type ESMSender = tokio::sync::mpsc::Sender<ESM>;
pub type ESMReceiver = tokio::sync::mpsc::Receiver<ESM>;

// message responses are carried back via oneshot channels
pub type ESMResp<T> = tokio::sync::oneshot::Sender<Result<T>>;

#[derive(Debug)]
pub enum ESM {
    Db(crate::db::msg::DbMsg),
    Indexer(crate::indexer::msg::IndexerMsg),
    Thumbs(crate::thumbs::msg::ThumbsMsg),
}

// service registry
//
// each service is instantiated once, and there is one message namespace per
// service. services that need to reach another service hold a clone of its
// sender rather than going through the registry on every call.
#[derive(Clone, Debug)]
pub struct ESMRegistry(Arc<DashMap<ServiceType, ESMSender>>);

impl Default for ESMRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ESMRegistry {
    pub fn new() -> Self {
        ESMRegistry(Arc::new(DashMap::new()))
    }

    pub fn insert(&self, k: ServiceType, v: ESMSender) -> Result<()> {
        match self.0.insert(k.clone(), v) {
            None => Ok(()),
            Some(w) => {
                self.0.insert(k, w);
                Err(anyhow::Error::msg(
                    "internal error: a sender was added twice to the registry",
                ))
            }
        }
    }

    pub fn get(&self, k: &ServiceType) -> Result<ESMSender> {
        Ok(self
            .0
            .get(k)
            .ok_or_else(|| {
                anyhow::Error::msg(format!(
                    "internal error: a service was started without a necessary dependency ({k:?})"
                ))
            })?
            .clone())
    }
}

#[async_trait]
pub trait EntanglementService: Send + Sync + 'static {
    type Inner: ESInner;

    fn create(config: Arc<ServerConfig>, registry: &ESMRegistry) -> Self;

    async fn start(&self, registry: &ESMRegistry) -> Result<()>;
}

// service message responder
//
// services may respond to external messages on other channels (http) as
// well as the registry-routed ESM channel.
#[async_trait]
pub trait ESInner: Sized + Send + Sync + 'static {
    fn new(config: Arc<ServerConfig>, registry: ESMRegistry) -> Result<Self>;

    fn registry(&self) -> ESMRegistry;

    async fn message_handler(&self, esm: ESM) -> Result<()>;

    async fn respond<T, Fut>(&self, resp: ESMResp<T>, fut: Fut) -> Result<()>
    where
        T: Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        resp.send(fut.await).map_err(|_| {
            anyhow::Error::msg(format!(
                "failed to respond to a {} message",
                std::any::type_name::<T>()
            ))
        })
    }
}
