use std::sync::Arc;
use std::time::Duration;

use hciwire_frame::{Command as HciCommand, Packet};
use hciwire_transport::{ErrorKind, HciTransport, OpenOptions, TcpTransport, TracingMonitor};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cmd::{parse_duration, MonitorArgs};
use crate::exit::{
    frame_error, internal_error, transport_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT,
};
use crate::output::{print_packet, OutputFormat};

/// HCI_Reset (OGF 0x03, OCF 0x0003).
const HCI_RESET: u16 = 0x0C03;

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let transport = build_transport(args.tcp)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| internal_error("runtime setup failed", err))?;
    runtime.block_on(monitor(transport.as_ref(), &args, timeout, format))
}

fn build_transport(tcp: bool) -> CliResult<Box<dyn HciTransport>> {
    if tcp {
        return Ok(Box::new(
            TcpTransport::new().with_monitor(Arc::new(TracingMonitor)),
        ));
    }

    #[cfg(unix)]
    {
        Ok(Box::new(
            hciwire_transport::SerialTransport::new().with_monitor(Arc::new(TracingMonitor)),
        ))
    }
    #[cfg(not(unix))]
    {
        Err(CliError::new(
            crate::exit::USAGE,
            "serial transport is only available on Unix; use --tcp",
        ))
    }
}

async fn monitor(
    transport: &dyn HciTransport,
    args: &MonitorArgs,
    timeout: Option<Duration>,
    format: OutputFormat,
) -> CliResult<i32> {
    let mut options = OpenOptions::new();
    if let Some(baudrate) = args.baudrate {
        options = options.baudrate(baudrate);
    }

    transport
        .open(&args.device, &options)
        .await
        .map_err(|err| transport_error("open failed", err))?;
    info!(transport = transport.name(), device = %args.device, "monitoring");

    let outcome = watch(transport, args, timeout, format).await;

    if let Err(err) = transport.close().await {
        debug!(error = %err, "close failed");
    }
    outcome
}

async fn watch(
    transport: &dyn HciTransport,
    args: &MonitorArgs,
    timeout: Option<Duration>,
    format: OutputFormat,
) -> CliResult<i32> {
    if args.reset {
        let reset = HciCommand::new(HCI_RESET, &[]).map_err(|err| frame_error("reset", err))?;
        transport
            .send(&Packet::from(reset))
            .await
            .map_err(|err| transport_error("send failed", err))?;
    }

    let deadline = timeout.map(|t| Instant::now() + t);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut printed = 0usize;
    loop {
        if args.count.is_some_and(|count| printed >= count) {
            return Ok(SUCCESS);
        }

        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
        let received = tokio::select! {
            _ = &mut ctrl_c => return Ok(SUCCESS),
            received = transport.receive(remaining) => received,
        };

        match received {
            Ok(Some(packet)) => {
                print_packet(&packet, &args.device, format);
                printed = printed.saturating_add(1);
            }
            Ok(None) => return end_of_stream(args.count, printed),
            // The reader faulted between two receives.
            Err(err) if err.kind() == ErrorKind::ConnectionState => {
                return end_of_stream(args.count, printed);
            }
            Err(err) if err.kind() == ErrorKind::Timeout => {
                return match args.count {
                    Some(count) => Err(CliError::new(
                        TIMEOUT,
                        format!("timed out after {printed} of {count} packets"),
                    )),
                    None => Ok(SUCCESS),
                };
            }
            Err(err) => return Err(transport_error("receive failed", err)),
        }
    }
}

fn end_of_stream(count: Option<usize>, printed: usize) -> CliResult<i32> {
    match count {
        Some(count) if printed < count => Err(CliError::new(
            FAILURE,
            format!("transport ended after {printed} of {count} packets"),
        )),
        _ => Ok(SUCCESS),
    }
}
