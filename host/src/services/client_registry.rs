//! Client registry service implementation
//!
//! The registry is a single task owning the endpoint list; every mutation and
//! query is a command sent over a channel, so socket tasks never contend on a
//! shared lock.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use shared::{link_debug, link_info, ClientId, Component};

use crate::error::{HostError, HostResult};
use crate::traits::ClientRegistry;
use crate::types::{ClientInfo, ConnectionEndpoint};

type Sender = mpsc::UnboundedSender<Vec<u8>>;

enum RegistryCommand {
    Register {
        endpoint: ConnectionEndpoint,
        reply: oneshot::Sender<()>,
    },
    Unregister {
        client_id: ClientId,
        reply: oneshot::Sender<bool>,
    },
    SenderFor {
        client_id: ClientId,
        reply: oneshot::Sender<Option<Sender>>,
    },
    Clients {
        reply: oneshot::Sender<Vec<ClientInfo>>,
    },
    CloseAll {
        reply: oneshot::Sender<usize>,
    },
}

/// Real client registry backed by an actor task
#[derive(Clone)]
pub struct RealClientRegistry {
    commands: mpsc::UnboundedSender<RegistryCommand>,
}

impl RealClientRegistry {
    /// Spawn the registry task on the current runtime
    pub fn spawn() -> HostResult<Self> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| HostError::RuntimeUnavailable {
            message: e.to_string(),
        })?;

        let (commands, inbox) = mpsc::unbounded_channel();
        runtime.spawn(run_registry(inbox));
        Ok(Self { commands })
    }

    async fn ask<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand) -> HostResult<T> {
        let (reply, answer) = oneshot::channel();
        self.commands
            .send(build(reply))
            .map_err(|_| HostError::RegistryUnavailable)?;
        answer.await.map_err(|_| HostError::RegistryUnavailable)
    }
}

async fn run_registry(mut inbox: mpsc::UnboundedReceiver<RegistryCommand>) {
    let mut endpoints: Vec<ConnectionEndpoint> = Vec::new();

    while let Some(command) = inbox.recv().await {
        match command {
            RegistryCommand::Register { endpoint, reply } => {
                link_info!(
                    Component::Host,
                    "👋 Client {} connected from {}",
                    endpoint.id,
                    endpoint.remote
                );
                endpoints.retain(|existing| existing.id != endpoint.id);
                endpoints.push(endpoint);
                let _ = reply.send(());
            }
            RegistryCommand::Unregister { client_id, reply } => {
                let before = endpoints.len();
                endpoints.retain(|endpoint| endpoint.id != client_id);
                let removed = endpoints.len() < before;
                if removed {
                    link_info!(
                        Component::Host,
                        "👋 Client {} disconnected ({} remaining)",
                        client_id,
                        endpoints.len()
                    );
                }
                let _ = reply.send(removed);
            }
            RegistryCommand::SenderFor { client_id, reply } => {
                let sender = endpoints
                    .iter()
                    .find(|endpoint| endpoint.id == client_id)
                    .map(|endpoint| endpoint.sender.clone());
                let _ = reply.send(sender);
            }
            RegistryCommand::Clients { reply } => {
                let _ = reply.send(endpoints.iter().map(ConnectionEndpoint::info).collect());
            }
            RegistryCommand::CloseAll { reply } => {
                let count = endpoints.len();
                endpoints.clear();
                let _ = reply.send(count);
            }
        }
    }

    link_debug!(Component::Host, "Client registry stopped");
}

#[async_trait]
impl ClientRegistry for RealClientRegistry {
    async fn register(&self, endpoint: ConnectionEndpoint) -> HostResult<()> {
        self.ask(|reply| RegistryCommand::Register { endpoint, reply }).await
    }

    async fn unregister(&self, client_id: ClientId) -> HostResult<bool> {
        self.ask(|reply| RegistryCommand::Unregister { client_id, reply }).await
    }

    async fn sender_for(&self, client_id: ClientId) -> HostResult<Option<Sender>> {
        self.ask(|reply| RegistryCommand::SenderFor { client_id, reply }).await
    }

    async fn clients(&self) -> HostResult<Vec<ClientInfo>> {
        self.ask(|reply| RegistryCommand::Clients { reply }).await
    }

    async fn client_count(&self) -> HostResult<usize> {
        Ok(self.clients().await?.len())
    }

    async fn close_all(&self) -> HostResult<usize> {
        self.ask(|reply| RegistryCommand::CloseAll { reply }).await
    }
}
