use std::time::Duration;

use callmux_client::{BootstrapCall, ClientConfig, Dispatcher};
use callmux_transport::ChannelTransport;
use serde_json::Value;
use tracing::debug;

use crate::cmd::CallArgs;
use crate::exit::{call_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_value, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let call_timeout = parse_duration(&args.timeout)?;
    let call_args: Value = serde_json::from_str(&args.args)
        .map_err(|err| CliError::new(USAGE, format!("--args is not valid JSON: {err}")))?;
    let bootstrap = args
        .bootstrap
        .as_deref()
        .map(parse_bootstrap)
        .transpose()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| crate::exit::io_error("failed to start runtime", err))?;

    runtime.block_on(async {
        let transport = open_transport(&args).await?;
        let config = ClientConfig {
            call_timeout,
            bootstrap,
            ..ClientConfig::default()
        };
        let dispatcher = Dispatcher::new(transport, config);

        debug!(name = %args.name, timeout = ?call_timeout, "issuing call");
        let value = dispatcher
            .call(&args.name, call_args)
            .await
            .map_err(|err| call_error("call failed", err))?;

        print_value(&value, format);
        Ok(SUCCESS)
    })
}

async fn open_transport(args: &CallArgs) -> CliResult<ChannelTransport> {
    if let Some(exec) = &args.exec {
        let (command, rest) = exec
            .split_first()
            .ok_or_else(|| CliError::new(USAGE, "--exec requires a command"))?;
        return callmux_transport::spawn(command, rest)
            .map_err(|err| transport_error("spawn failed", err));
    }

    if let Some(path) = &args.socket {
        #[cfg(unix)]
        {
            return callmux_transport::connect(path)
                .await
                .map_err(|err| transport_error("connect failed", err));
        }
        #[cfg(not(unix))]
        {
            let _ = path;
            return Err(CliError::new(
                USAGE,
                "--socket requires Unix domain socket support",
            ));
        }
    }

    Err(CliError::new(USAGE, "one of --socket or --exec is required"))
}

fn parse_bootstrap(input: &str) -> CliResult<BootstrapCall> {
    let (name, args) = match input.split_once(':') {
        Some((name, json)) => {
            let args: Value = serde_json::from_str(json).map_err(|err| {
                CliError::new(USAGE, format!("--bootstrap args are not valid JSON: {err}"))
            })?;
            (name, args)
        }
        None => (input, Value::Object(Default::default())),
    };
    if name.is_empty() {
        return Err(CliError::new(USAGE, "--bootstrap name must not be empty"));
    }
    Ok(BootstrapCall::new(name, args))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(match unit {
        "ms" => Duration::from_millis(value),
        _ => Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_seconds_and_millis() {
        assert_eq!(parse_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30").unwrap(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_zero_and_garbage_durations() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
    }

    #[test]
    fn parses_bootstrap_with_and_without_args() {
        let plain = parse_bootstrap("create_group").unwrap();
        assert_eq!(plain.name, "create_group");
        assert_eq!(plain.args, json!({}));

        let with_args = parse_bootstrap(r#"create_group:{"kind":"workspace"}"#).unwrap();
        assert_eq!(with_args.name, "create_group");
        assert_eq!(with_args.args, json!({"kind": "workspace"}));
    }

    #[test]
    fn rejects_bootstrap_with_bad_json() {
        assert!(parse_bootstrap("create_group:{nope").is_err());
        assert!(parse_bootstrap("").is_err());
    }
}
