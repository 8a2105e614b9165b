//! A communicator-backed `Readable`: polls a line-oriented instrument
//! over TCP for a single numeric reading, using [`frappy_io::StringIo`]
//! for the reconnect/identification machinery and a concrete
//! [`async_trait`]-backed [`Opener`] for the transport itself.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use frappy_core::{
    merge_class, validate_module_class, BuiltModule, ClassLevel, CommonReadHandler, ConfigMap, Module, ModuleFactory,
    NodeHandle, ParameterDecl, SecopError, SecopResult,
};
use frappy_datatypes::{status, Datatype, EnumMember, FloatRange, StatusType, Value};
use frappy_io::{DynStream, LineIdentEntry, Opener, StringIo};

use crate::config_support::parse_common;

/// Opens a fresh `TcpStream` to a fixed address each time the
/// communicator needs to (re)connect.
struct TcpOpener {
    addr: SocketAddr,
}

#[async_trait]
impl Opener for TcpOpener {
    async fn open(&self) -> std::io::Result<DynStream> {
        let stream = TcpStream::connect(self.addr).await?;
        Ok(Box::new(stream))
    }
}

fn idle_status() -> Value {
    Value::Tuple(vec![
        Value::Enum(EnumMember {
            label: "IDLE".to_string(),
            value: status::IDLE,
        }),
        Value::Str("ok".to_string()),
    ])
}

fn error_status(message: &str) -> Value {
    Value::Tuple(vec![
        Value::Enum(EnumMember {
            label: "ERROR".to_string(),
            value: status::ERROR,
        }),
        Value::Str(message.to_string()),
    ])
}

/// Builds `Sensor` modules: a read-only `value` backed by a `"READ?"`
/// query over a line-oriented TCP connection, reporting the connection
/// state on `status` instead of simply letting a communication failure
/// surface as a bare poll error.
pub struct SensorFactory;

impl ModuleFactory for SensorFactory {
    fn class_name(&self) -> &'static str {
        "Sensor"
    }

    fn build(&self, name: &str, config: &ConfigMap, node: Arc<dyn NodeHandle>) -> SecopResult<BuiltModule> {
        let (common, leftover) = parse_common(config)?;

        let mut host = "127.0.0.1".to_string();
        let mut port: u16 = 0;
        let mut query = "READ?".to_string();
        for key in &leftover {
            match key.as_str() {
                "host" => {
                    host = config[key]
                        .as_str()
                        .ok_or_else(|| SecopError::ConfigError("'host' must be a string".into()))?
                        .to_string();
                }
                "port" => {
                    let raw = config[key]
                        .as_i64()
                        .ok_or_else(|| SecopError::ConfigError("'port' must be an integer".into()))?;
                    port = u16::try_from(raw)
                        .map_err(|_| SecopError::ConfigError(format!("'port' out of range: {raw}")))?;
                }
                "query" => {
                    query = config[key]
                        .as_str()
                        .ok_or_else(|| SecopError::ConfigError("'query' must be a string".into()))?
                        .to_string();
                }
                other => {
                    return Err(SecopError::ConfigError(format!(
                        "Sensor module '{name}' has no such configuration key: '{other}'"
                    )))
                }
            }
        }
        if port == 0 {
            return Err(SecopError::ConfigError(format!(
                "Sensor module '{name}' requires a 'port' configuration entry"
            )));
        }

        let level = ClassLevel {
            description: common
                .description
                .clone()
                .unwrap_or_else(|| "communicator-backed numeric sensor".to_string())
                .into(),
            interface_classes: vec!["Readable".to_string()],
            properties: common.properties,
            parameters: vec![
                ParameterDecl::new("value", Datatype::FloatRange(FloatRange::new(-1e9, 1e9)))
                    .with_description("last reading"),
                ParameterDecl::new("status", Datatype::Status(StatusType::standard()))
                    .with_description("connection state")
                    .with_default(idle_status()),
            ],
            ..Default::default()
        };
        let merged = Arc::new(merge_class(&[level]).map_err(|e| SecopError::ConfigError(e.to_string()))?);
        validate_module_class(&merged)?;

        let module = Arc::new(Module::new(name, merged).with_node(node));
        module.announce_update("status", idle_status(), 0.0);

        let addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| SecopError::ConfigError(format!("invalid host/port: {e}")))?;
        let opener = Arc::new(TcpOpener { addr });
        let identification: Vec<LineIdentEntry> = Vec::new();
        let io = Arc::new(StringIo::new(
            opener,
            Duration::from_secs(2),
            Duration::ZERO,
            "\n",
            identification,
        ));

        let read_query = query.clone();
        let read_handler = CommonReadHandler::new(["value", "status"], Arc::new(move |m: &Module| {
            let io = Arc::clone(&io);
            let request = read_query.clone();
            let reply = tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(io.communicate(&request))
            });
            match reply {
                Ok(line) => match line.trim().parse::<f64>() {
                    Ok(v) => {
                        m.announce_update("value", Value::Double(v), 0.0);
                        m.announce_update("status", idle_status(), 0.0);
                        Ok(())
                    }
                    Err(_) => {
                        m.announce_update("status", error_status(&format!("unparseable reply: {line}")), 0.0);
                        Err(SecopError::HardwareError(format!("unparseable reply: {line}")))
                    }
                },
                Err(e) => {
                    m.announce_update("status", error_status(&e.to_string()), 0.0);
                    Err(e)
                }
            }
        }));

        Ok(BuiltModule::new(module)
            .with_reads(vec![read_handler])
            .with_pollinterval(common.pollinterval)
            .with_slowinterval_multiple(common.slowinterval_multiple))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frappy_core::{ConfigMap, NullNodeHandle};

    #[test]
    fn missing_port_is_a_config_error() {
        let config = ConfigMap::new();
        let err = SensorFactory.build("s1", &config, Arc::new(NullNodeHandle)).unwrap_err();
        assert!(matches!(err, SecopError::ConfigError(_)));
    }

    #[test]
    fn unknown_configuration_key_is_rejected() {
        let mut config = ConfigMap::new();
        config.insert("port".to_string(), frappy_core::ConfigValue::Int(4000));
        config.insert("bogus".to_string(), frappy_core::ConfigValue::Bool(true));
        let err = SensorFactory.build("s1", &config, Arc::new(NullNodeHandle)).unwrap_err();
        assert!(matches!(err, SecopError::ConfigError(_)));
    }

    #[test]
    fn construction_with_a_valid_port_announces_idle_status() {
        let mut config = ConfigMap::new();
        config.insert("port".to_string(), frappy_core::ConfigValue::Int(4000));
        let built = SensorFactory.build("s1", &config, Arc::new(NullNodeHandle)).unwrap();
        assert!(matches!(built.module.current_value("status"), Some(Value::Tuple(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reading_over_a_real_tcp_loopback_updates_value_and_status() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"READ?\n");
            tokio::io::AsyncWriteExt::write_all(&mut socket, b"42.5\n").await.unwrap();
        });

        let mut config = ConfigMap::new();
        config.insert("port".to_string(), frappy_core::ConfigValue::Int(i64::from(port)));
        let built = SensorFactory.build("s1", &config, Arc::new(NullNodeHandle)).unwrap();

        // The handler bridges into the async runtime itself via
        // `block_in_place`, which needs a multi-thread runtime; invoked
        // directly here rather than through `spawn_blocking`.
        built.reads[0].invoke(&built.module).unwrap();
        assert_eq!(built.module.current_value("value"), Some(Value::Double(42.5)));
    }
}
