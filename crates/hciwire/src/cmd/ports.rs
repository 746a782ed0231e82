use serialport::SerialPortType;

use crate::cmd::PortsArgs;
use crate::exit::{CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_ports, OutputFormat, PortOutput};

pub fn run(_args: PortsArgs, format: OutputFormat) -> CliResult<i32> {
    let ports = serialport::available_ports()
        .map_err(|err| CliError::new(TRANSPORT_ERROR, format!("port enumeration failed: {err}")))?;

    let ports: Vec<PortOutput> = ports
        .into_iter()
        .map(|info| {
            let (kind, description) = describe(&info.port_type);
            PortOutput {
                name: info.port_name,
                kind: kind.to_string(),
                description,
            }
        })
        .collect();

    print_ports(&ports, format);
    Ok(SUCCESS)
}

fn describe(port_type: &SerialPortType) -> (&'static str, String) {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            let mut description = format!("{:04x}:{:04x}", usb.vid, usb.pid);
            if let Some(product) = &usb.product {
                description.push(' ');
                description.push_str(product);
            }
            ("usb", description)
        }
        SerialPortType::PciPort => ("pci", String::new()),
        SerialPortType::BluetoothPort => ("bluetooth", String::new()),
        SerialPortType::Unknown => ("unknown", String::new()),
    }
}
