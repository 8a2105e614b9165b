//! Request routing, subscription bookkeeping, and update fan-out. One
//! [`Dispatcher`] per node, shared by every connection task and mounted
//! on every module as its [`frappy_core::NodeHandle`].

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use frappy_core::{CommandHandler, CommonReadHandler, CommonWriteHandler, Module, NodeHandle, SecopError, SecopResult};
use frappy_datatypes::Value;

use crate::message::{self, Request};
use crate::registry::ModuleRegistry;
#[cfg(test)]
use crate::registry::NodeInfo;

/// Opaque per-connection identifier handed out by [`Dispatcher::register_connection`].
pub type ConnId = u64;

/// The per-parameter or per-command handler wiring a concrete module
/// contributes to the dispatcher, keyed `(module, accessible)`. Built
/// once at node start alongside the scheduler's poll table (frappy-node
/// wires both from the same concrete module construction).
#[derive(Default)]
pub struct HandlerTables {
    pub reads: IndexMap<(String, String), CommonReadHandler>,
    pub writes: IndexMap<(String, String), Arc<CommonWriteHandler>>,
    pub commands: IndexMap<(String, String), CommandHandler>,
}

pub struct Dispatcher {
    registry: ModuleRegistry,
    handlers: HandlerTables,
    subscriptions: Mutex<IndexMap<(String, String), HashSet<ConnId>>>,
    activate_all: Mutex<HashSet<ConnId>>,
    connections: Mutex<IndexMap<ConnId, mpsc::UnboundedSender<String>>>,
    next_conn_id: AtomicU64,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: ModuleRegistry, handlers: HandlerTables) -> Arc<Self> {
        Arc::new(Dispatcher {
            registry,
            handlers,
            subscriptions: Mutex::new(IndexMap::new()),
            activate_all: Mutex::new(HashSet::new()),
            connections: Mutex::new(IndexMap::new()),
            next_conn_id: AtomicU64::new(1),
        })
    }

    #[must_use]
    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    /// Register a freshly-accepted connection and get back its id and
    /// the receiving half of its outbound line channel.
    #[must_use]
    pub fn register_connection(&self) -> (ConnId, mpsc::UnboundedReceiver<String>) {
        let id = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.lock().insert(id, tx);
        (id, rx)
    }

    /// Tear down every trace of a closed connection: its outbound
    /// channel, its per-parameter subscriptions, and its membership in
    /// the node-wide activate-all set.
    pub fn unregister_connection(&self, conn: ConnId) {
        self.connections.lock().shift_remove(&conn);
        self.activate_all.lock().remove(&conn);
        self.subscriptions.lock().values_mut().for_each(|set| {
            set.remove(&conn);
        });
    }

    fn send_to(&self, conn: ConnId, line: String) {
        if let Some(tx) = self.connections.lock().get(&conn) {
            let _ = tx.send(line);
        }
    }

    fn module(&self, name: &str) -> SecopResult<&Arc<Module>> {
        self.registry.get(name).ok_or_else(|| SecopError::NoSuchModule(name.to_string()))
    }

    fn export(&self, module: &Module, parameter: &str, value: &Value) -> SecopResult<serde_json::Value> {
        let decl = module.class().parameter(parameter).ok_or_else(|| SecopError::NoSuchParameter {
            module: module.name().to_string(),
            parameter: parameter.to_string(),
        })?;
        Ok(decl.datatype.export_value(value))
    }

    /// Handle one incoming line from `conn`, pushing every reply (and
    /// any induced `update`s, which are emitted synchronously from
    /// inside the handler call before the request's own reply) onto
    /// that connection's outbound channel in order.
    pub fn handle_line(&self, conn: ConnId, line: &str) {
        let request = match message::parse_request(line) {
            Ok(r) => r,
            Err(e) => {
                let action = line.split_whitespace().next().unwrap_or(".");
                let reply =
                    message::error_reply(action, ".", &e, now()).unwrap_or_else(|_| format!("error_{action} . []"));
                self.send_to(conn, reply);
                return;
            }
        };
        if let Err(e) = self.handle_request(conn, &request) {
            let action = request_action(&request);
            let specifier = request_specifier(&request);
            match message::error_reply(action, &specifier, &e, now()) {
                Ok(reply) => self.send_to(conn, reply),
                Err(_) => self.send_to(conn, format!("error_{action} {specifier} []")),
            }
        }
    }

    fn handle_request(&self, conn: ConnId, request: &Request) -> SecopResult<()> {
        match request {
            Request::Idn => {
                self.send_to(conn, message::IDN_REPLY.to_string());
                Ok(())
            }
            Request::Describe => {
                self.send_to(conn, message::describe_reply(self.registry.describe_json()));
                Ok(())
            }
            Request::Ping(token) => {
                self.send_to(conn, message::pong_reply(token.as_deref(), now()));
                Ok(())
            }
            Request::Activate(module) => self.handle_activate(conn, module.as_deref()),
            Request::Deactivate(module) => self.handle_deactivate(conn, module.as_deref()),
            Request::Read { module, parameter } => self.handle_read(conn, module, parameter),
            Request::Change { module, parameter, data } => self.handle_change(conn, module, parameter, data),
            Request::Do { module, command, argument } => self.handle_do(conn, module, command, argument.clone()),
        }
    }

    /// Flood the current value (or last error) of every subscribed
    /// parameter *before* registering the subscription, guaranteeing the
    /// snapshot precedes any later broadcast update for the same
    /// parameter.
    fn handle_activate(&self, conn: ConnId, module_filter: Option<&str>) -> SecopResult<()> {
        let module_names: Vec<String> = match module_filter {
            Some(m) => {
                self.module(m)?;
                vec![m.to_string()]
            }
            None => self.registry.names().map(str::to_string).collect(),
        };

        for name in &module_names {
            let module = self.module(name)?;
            for p in module.class().parameters() {
                if !p.export {
                    continue;
                }
                self.send_parameter_snapshot(conn, module, &p.name)?;
            }
        }

        match module_filter {
            Some(name) => {
                for p in self.module(name)?.class().parameters() {
                    if p.export {
                        self.subscriptions
                            .lock()
                            .entry((name.clone(), p.name.clone()))
                            .or_default()
                            .insert(conn);
                    }
                }
            }
            None => {
                self.activate_all.lock().insert(conn);
            }
        }

        self.send_to(conn, message::active_reply(module_filter));
        Ok(())
    }

    fn send_parameter_snapshot(&self, conn: ConnId, module: &Module, parameter: &str) -> SecopResult<()> {
        if let Some((kind, msg)) = module.current_error_detail(parameter) {
            let ts = module.timestamp(parameter).unwrap_or_else(now);
            let reply = message::error_update_message(module.name(), parameter, &kind, &msg, ts)?;
            self.send_to(conn, reply);
        } else if let Some(value) = module.current_value(parameter) {
            let ts = module.timestamp(parameter).unwrap_or_else(now);
            let json = self.export(module, parameter, &value)?;
            let reply = message::update_message(module.name(), parameter, &json, ts)?;
            self.send_to(conn, reply);
        }
        Ok(())
    }

    fn handle_deactivate(&self, conn: ConnId, module_filter: Option<&str>) -> SecopResult<()> {
        match module_filter {
            Some(name) => {
                self.module(name)?;
                let mut subs = self.subscriptions.lock();
                for (_, set) in subs.iter_mut().filter(|((m, _), _)| m == name) {
                    set.remove(&conn);
                }
            }
            None => {
                self.activate_all.lock().remove(&conn);
            }
        }
        self.send_to(conn, message::inactive_reply(module_filter));
        Ok(())
    }

    fn handle_read(&self, conn: ConnId, module_name: &str, parameter: &str) -> SecopResult<()> {
        let module = self.module(module_name)?;
        if let Some(handler) = self.handlers.reads.get(&(module_name.to_string(), parameter.to_string())) {
            handler.invoke(module)?;
        }
        let value = module
            .current_value(parameter)
            .ok_or_else(|| SecopError::NoSuchParameter { module: module_name.to_string(), parameter: parameter.to_string() })?;
        let ts = module.timestamp(parameter).unwrap_or_else(now);
        let json = self.export(module, parameter, &value)?;
        let reply = message::read_reply(module_name, parameter, &json, ts)?;
        self.send_to(conn, reply);
        Ok(())
    }

    fn handle_change(&self, conn: ConnId, module_name: &str, parameter: &str, data: &serde_json::Value) -> SecopResult<()> {
        let module = self.module(module_name)?;
        module.ensure_not_disabled()?;
        module.ensure_writable(parameter)?;
        let decl = module.class().parameter(parameter).ok_or_else(|| SecopError::NoSuchParameter {
            module: module_name.to_string(),
            parameter: parameter.to_string(),
        })?;
        let imported = decl.datatype.import_value(data)?;
        let validated = decl.datatype.validate(&imported)?;
        module.queue_write(parameter, validated);

        if let Some(handler) = self.handlers.writes.get(&(module_name.to_string(), parameter.to_string())) {
            handler.invoke(module)?;
        } else {
            module.take_queued_write(parameter);
        }

        let value = module
            .current_value(parameter)
            .ok_or_else(|| SecopError::NoSuchParameter { module: module_name.to_string(), parameter: parameter.to_string() })?;
        let ts = module.timestamp(parameter).unwrap_or_else(now);
        let json = self.export(module, parameter, &value)?;
        let reply = message::changed_reply(module_name, parameter, &json, ts)?;
        self.send_to(conn, reply);
        Ok(())
    }

    fn handle_do(&self, conn: ConnId, module_name: &str, command: &str, argument: Option<serde_json::Value>) -> SecopResult<()> {
        let module = self.module(module_name)?;
        let decl = module.class().command(command).ok_or_else(|| SecopError::NoSuchCommand {
            module: module_name.to_string(),
            command: command.to_string(),
        })?;
        let validated_arg = match (&decl.argument, argument) {
            (Some(dt), Some(raw)) => Some(dt.validate(&dt.import_value(&raw)?)?),
            (Some(_), None) => return Err(SecopError::BadValue(frappy_datatypes::ValidationError::BadValue(
                format!("{command} requires an argument"),
            ))),
            (None, _) => None,
        };
        let handler = self.handlers.commands.get(&(module_name.to_string(), command.to_string())).ok_or_else(|| {
            SecopError::NoSuchCommand { module: module_name.to_string(), command: command.to_string() }
        })?;
        let result = handler.invoke(module, validated_arg)?;
        let json = match (&decl.result, &result) {
            (Some(dt), Some(v)) => dt.export_value(v),
            _ => serde_json::Value::Null,
        };
        let reply = message::done_reply(module_name, command, &json, now())?;
        self.send_to(conn, reply);
        Ok(())
    }
}

impl NodeHandle for Dispatcher {
    fn announce_update(&self, module: &str, parameter: &str, value: &Value, timestamp: f64) {
        let Some(m) = self.registry.get(module) else { return };
        let Ok(json) = self.export(m, parameter, value) else { return };
        let Ok(line) = message::update_message(module, parameter, &json, timestamp) else { return };
        self.fan_out(module, parameter, line);
    }

    fn announce_error(&self, module: &str, parameter: &str, kind: &str, error: &str, timestamp: f64) {
        let Ok(line) = message::error_update_message(module, parameter, kind, error, timestamp) else {
            return;
        };
        self.fan_out(module, parameter, line);
    }

    fn has_subscribers(&self, module: &str, parameter: &str) -> bool {
        if !self.activate_all.lock().is_empty() {
            return true;
        }
        self.subscriptions
            .lock()
            .get(&(module.to_string(), parameter.to_string()))
            .is_some_and(|set| !set.is_empty())
    }
}

impl Dispatcher {
    fn fan_out(&self, module: &str, parameter: &str, line: String) {
        let mut targets: HashSet<ConnId> = self.activate_all.lock().iter().copied().collect();
        if let Some(set) = self.subscriptions.lock().get(&(module.to_string(), parameter.to_string())) {
            targets.extend(set.iter().copied());
        }
        for conn in targets {
            self.send_to(conn, line.clone());
        }
    }
}

/// The request's action word, echoed as the `error_<action>` prefix of
/// an error reply to it.
fn request_action(request: &Request) -> &'static str {
    match request {
        Request::Idn => "*IDN?",
        Request::Describe => "describe",
        Request::Activate(_) => "activate",
        Request::Deactivate(_) => "deactivate",
        Request::Read { .. } => "read",
        Request::Change { .. } => "change",
        Request::Do { .. } => "do",
        Request::Ping(_) => "ping",
    }
}

/// The bare `module[:accessible]` specifier an error reply to this
/// request carries — never prefixed with the action word, so the
/// client's `action specifier data` parse still holds.
fn request_specifier(request: &Request) -> String {
    match request {
        Request::Idn | Request::Describe => ".".to_string(),
        Request::Activate(m) | Request::Deactivate(m) => m.clone().unwrap_or_else(|| ".".to_string()),
        Request::Read { module, parameter } => format!("{module}:{parameter}"),
        Request::Change { module, parameter, .. } => format!("{module}:{parameter}"),
        Request::Do { module, command, .. } => format!("{module}:{command}"),
        Request::Ping(t) => t.clone().unwrap_or_else(|| ".".to_string()),
    }
}

fn now() -> f64 {
    frappy_core::now()
}
