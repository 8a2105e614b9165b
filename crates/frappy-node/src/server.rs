//! Wires a loaded [`NodeConfig`] plus a [`FactoryRegistry`] into a
//! running node: builds every module, assembles the dispatcher and
//! scheduler, binds the TCP listener, and runs the accept loop until a
//! cooperative shutdown signal fires. Mirrors the teacher's
//! "load config, build components, spawn one task per listener/
//! connection, shut down on a cancellation signal" shape in
//! `daq-server/src/grpc/server.rs`.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use frappy_core::ModuleFactory;
use frappy_dispatcher::{Dispatcher, HandlerTables, ModuleRegistry, NodeInfo};
use frappy_scheduler::{poll_entries_from_class, Poller};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::node_handle::DeferredNodeHandle;
use crate::registry::FactoryRegistry;

/// Everything `run` needs once construction has succeeded: the
/// dispatcher (also the node's single `NodeHandle` implementation) and
/// one [`Poller`] per built module, not yet spawned.
pub struct BuiltNode {
    pub dispatcher: Arc<Dispatcher>,
    pub pollers: Vec<Arc<Poller>>,
    pub bind_addr: String,
}

/// Build every module named in `config.modules` from its `class`,
/// assemble the dispatcher's handler tables and the scheduler's poll
/// table, and validate that every wired handler targets a real
/// accessible. Nothing is spawned yet and no socket is bound.
pub fn build_node(config: &NodeConfig, factories: &FactoryRegistry) -> Result<BuiltNode, NodeError> {
    let mut modules = Vec::new();
    let mut handlers = HandlerTables::default();
    let mut pollers_input = Vec::new();

    for (name, module_config) in &config.modules {
        let class_name = module_config
            .get("class")
            .and_then(frappy_core::ConfigValue::as_str)
            .ok_or_else(|| NodeError::MissingClass { module: name.clone() })?;
        let factory = factories.get(class_name).ok_or_else(|| NodeError::UnknownClass {
            module: name.clone(),
            class: class_name.to_string(),
        })?;

        let deferred = DeferredNodeHandle::new();
        let frappy_core::BuiltModule { module, reads, writes, commands, pollinterval, slowinterval_multiple } = factory
            .build(name, module_config, deferred.clone())
            .map_err(|source| NodeError::ModuleBuild { module: name.clone(), source })?;

        for handler in &reads {
            for key in handler.keys() {
                handlers.reads.insert((name.clone(), key.clone()), handler.clone());
            }
        }
        for handler in &writes {
            for key in handler.keys() {
                handlers.writes.insert((name.clone(), key.clone()), handler.clone());
            }
        }
        for handler in commands {
            let command_name = handler.name().to_string();
            handlers.commands.insert((name.clone(), command_name), handler);
        }

        modules.push(Arc::clone(&module));
        pollers_input.push((deferred, module, reads, writes, pollinterval, slowinterval_multiple));
    }

    let node_info = NodeInfo {
        equipment_id: config.equipment_id.clone(),
        firmware: format!("FRAPPY-rs/{}", env!("CARGO_PKG_VERSION")),
        version: "2021-02".to_string(),
    };
    let registry = ModuleRegistry::new(node_info, modules);
    frappy_dispatcher::validate_handler_tables(&registry, &handlers)
        .map_err(|source| NodeError::ModuleBuild { module: "<handlers>".to_string(), source })?;
    let dispatcher = Dispatcher::new(registry, handlers);

    let mut pollers = Vec::new();
    for (deferred, module, reads, writes, pollinterval, slowinterval_multiple) in pollers_input {
        deferred.bind(dispatcher.clone() as Arc<dyn frappy_core::NodeHandle>);
        let entries = poll_entries_from_class(module.class(), reads);
        let poller = Poller::new(Arc::clone(&module), entries, writes, pollinterval, slowinterval_multiple);
        pollers.push(Arc::new(poller));
    }

    Ok(BuiltNode { dispatcher, pollers, bind_addr: config.bind_addr.clone() })
}

/// Spawn every poller, bind the TCP listener, and accept connections
/// until `shutdown` reports `true`. Each accepted connection gets its
/// own task running the dispatcher's line-in/line-out loop; every
/// spawned task shares the same `watch` receiver so `ctrl_c` (wired by
/// the caller) tears the whole node down cooperatively.
pub async fn run(node: BuiltNode, mut shutdown: watch::Receiver<bool>) -> Result<(), NodeError> {
    let listener = TcpListener::bind(&node.bind_addr)
        .await
        .map_err(|source| NodeError::Bind { addr: node.bind_addr.clone(), source })?;
    tracing::info!(addr = %node.bind_addr, "frappy node listening");

    let mut tasks = Vec::new();
    for poller in node.pollers {
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            poller.run(shutdown).await;
        }));
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };
                let dispatcher = Arc::clone(&node.dispatcher);
                let conn_shutdown = shutdown.clone();
                tasks.push(tokio::spawn(async move {
                    handle_connection(dispatcher, stream, peer, conn_shutdown).await;
                }));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    for task in tasks {
        let _ = task.await;
    }
    Ok(())
}

/// One accepted connection: read lines, hand each to the dispatcher,
/// and drain its outbound channel back onto the socket, concurrently,
/// until the peer disconnects or shutdown fires. The dispatcher's
/// subscriptions for this connection are torn down on any exit path.
async fn handle_connection(
    dispatcher: Arc<Dispatcher>,
    stream: TcpStream,
    peer: std::net::SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let span = tracing::info_span!("connection", %peer);
    let _enter = span.enter();
    tracing::info!("connection accepted");

    let (conn_id, mut outbound) = dispatcher.register_connection();
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.is_empty() {
                            continue;
                        }
                        dispatcher.handle_line(conn_id, &line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "connection read error");
                        break;
                    }
                }
            }
            outgoing = outbound.recv() => {
                match outgoing {
                    Some(mut reply) => {
                        reply.push('\n');
                        if write_half.write_all(reply.as_bytes()).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    dispatcher.unregister_connection(conn_id);
    tracing::info!("connection closed");
}
