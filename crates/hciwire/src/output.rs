use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hciwire_frame::{HciPacket, Packet};
use hciwire_transport::hex_dump;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    kind: &'static str,
    indicator: u8,
    header: String,
    payload_size: usize,
    payload: String,
    source: &'a str,
    timestamp: String,
}

pub fn print_packet(packet: &Packet, source: &str, format: OutputFormat) {
    let kind = packet.indicator().name();
    let header = header_summary(packet);
    let payload = hex_dump(packet.payload());

    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                kind,
                indicator: packet.indicator().as_u8(),
                header,
                payload_size: packet.payload().len(),
                payload,
                source,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["KIND", "HEADER", "SIZE", "PAYLOAD"])
                .add_row(vec![
                    kind.to_string(),
                    header,
                    packet.payload().len().to_string(),
                    payload,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{kind} {header} size={} payload={payload}",
                packet.payload().len()
            );
        }
    }
}

#[derive(Serialize)]
pub struct PortOutput {
    pub name: String,
    pub kind: String,
    pub description: String,
}

pub fn print_ports(ports: &[PortOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(ports).unwrap_or_else(|_| "[]".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PORT", "TYPE", "DESCRIPTION"]);
            for port in ports {
                table.add_row(vec![
                    port.name.clone(),
                    port.kind.clone(),
                    port.description.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if ports.is_empty() {
                println!("no serial ports found");
            }
            for port in ports {
                println!("{} ({}) {}", port.name, port.kind, port.description);
            }
        }
    }
}

/// One-line rendering of the packet header fields.
pub fn header_summary(packet: &Packet) -> String {
    match packet {
        Packet::Command(cmd) => format!(
            "opcode=0x{:04x} plen={}",
            cmd.opcode(),
            cmd.params().len()
        ),
        Packet::Event(evt) => format!("code=0x{:02x} plen={}", evt.code(), evt.params().len()),
        Packet::AclData(acl) => format!(
            "handle=0x{:03x} pb={} bc={} dlen={}",
            acl.handle(),
            acl.packet_boundary(),
            acl.broadcast(),
            acl.payload().len()
        ),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use hciwire_frame::{AclData, Command, Event};

    use super::*;

    #[test]
    fn header_summaries() {
        let reset = Packet::from(Command::new(0x0C03, &[]).unwrap());
        assert_eq!(header_summary(&reset), "opcode=0x0c03 plen=0");

        let complete = Packet::from(Event::new(0x0E, &[0x01, 0x03, 0x0C, 0x00]).unwrap());
        assert_eq!(header_summary(&complete), "code=0x0e plen=4");

        let acl = Packet::from(AclData::new(0x005, 2, 0, &[0xAA, 0xBB, 0xCC]).unwrap());
        assert_eq!(header_summary(&acl), "handle=0x005 pb=2 bc=0 dlen=3");
    }
}
