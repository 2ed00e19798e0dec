mod message;

use std::{
    io::{self, Error, ErrorKind},
    time::{SystemTime, UNIX_EPOCH},
};

use clap::{crate_version, value_parser, Arg, Command};
use thrift::protocol::{
    TBinaryOutputProtocol, TFieldIdentifier, TMessageIdentifier, TMessageType, TOutputProtocol,
    TStructIdentifier, TType,
};
use thrift::transport::{TBufferedWriteTransport, TTcpChannel};

use crate::message::UpdateAttributesMessage;

const APP_NAME: &str = "hive-attr-client";

fn main() -> io::Result<()> {
    let matches = Command::new(APP_NAME)
        .version(crate_version!())
        .about("Signs and forwards one attribute update to a running hive node")
        .arg(
            Arg::new("LOG_LEVEL")
                .long("log-level")
                .short('l')
                .help("Sets the log level")
                .required(false)
                .num_args(1)
                .value_parser(["debug", "info"])
                .default_value("info"),
        )
        .arg(
            Arg::new("TARGET")
                .long("target")
                .help("Node host to send the update to")
                .required(true)
                .num_args(1),
        )
        .arg(
            Arg::new("PORT")
                .long("port")
                .help("Node gossip port")
                .required(false)
                .num_args(1)
                .value_parser(value_parser!(u16))
                .default_value("9797"),
        )
        .arg(
            Arg::new("ATTRIBUTE_KEY")
                .long("attribute-key")
                .help("Attribute to update")
                .required(false)
                .num_args(1)
                .default_value("test.prop.1"),
        )
        .arg(
            Arg::new("ATTRIBUTE_VALUE")
                .long("attribute-value")
                .help("Value to set, e.g. a colour")
                .required(true)
                .num_args(1),
        )
        .get_matches();

    let log_level = matches
        .get_one::<String>("LOG_LEVEL")
        .unwrap_or(&String::from("info"))
        .clone();
    // ref. https://github.com/env-logger-rs/env_logger/issues/47
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    );

    let target = matches.get_one::<String>("TARGET").unwrap().clone();
    let port = *matches.get_one::<u16>("PORT").unwrap();
    let key = matches.get_one::<String>("ATTRIBUTE_KEY").unwrap().clone();
    let value = matches
        .get_one::<String>("ATTRIBUTE_VALUE")
        .unwrap()
        .clone();

    let message_id = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::new(ErrorKind::Other, format!("clock error {}", e)))?
        .as_secs() as i64;

    let mut message = UpdateAttributesMessage::new(&key, &value, message_id);
    message
        .sign()
        .map_err(|e| Error::new(ErrorKind::Other, format!("failed to sign message {}", e)))?;

    log::info!(
        "sending updateAttributes for '{}' to {}:{}",
        key,
        target,
        port
    );
    send_update(&target, port, &message)
        .map_err(|e| Error::new(ErrorKind::Other, format!("updateAttributes failed {}", e)))?;
    log::info!("update sent");

    Ok(())
}

/// Writes a one-way "updateAttributes" call over the binary protocol.
fn send_update(target: &str, port: u16, message: &UpdateAttributesMessage) -> thrift::Result<()> {
    let mut channel = TTcpChannel::new();
    channel.open(&format!("{}:{}", target, port))?;

    let transport = TBufferedWriteTransport::new(channel);
    let mut o_prot = TBinaryOutputProtocol::new(transport, true);

    o_prot.write_message_begin(&TMessageIdentifier::new(
        "updateAttributes",
        TMessageType::Call,
        1,
    ))?;
    o_prot.write_struct_begin(&TStructIdentifier::new("updateAttributes_args"))?;
    o_prot.write_field_begin(&TFieldIdentifier::new("message", TType::Struct, 1))?;
    message.write_to(&mut o_prot)?;
    o_prot.write_field_end()?;
    o_prot.write_field_stop()?;
    o_prot.write_struct_end()?;
    o_prot.write_message_end()?;
    o_prot.flush()
}
